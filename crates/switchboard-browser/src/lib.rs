// Switchboard browser
//
// Client for the browser automation provider, implementing the core
// AutomationProvider trait over its HTTP API.

pub mod client;
pub mod provider;

pub use client::{BrowserUseClient, BrowserUseConfig};

// Switchboard gateway
//
// HTTP clients for the two external agent services: completions and tool
// execution. Both hang off one GatewayClient, which implements the core
// CompletionClient and ToolExecutor traits.

pub mod client;
pub mod completions;
pub mod tools;

pub use client::{GatewayClient, GatewayConfig};

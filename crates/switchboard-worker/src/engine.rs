// Automation engine
//
// Drives browser automation sessions end to end: starts provider tasks
// behind a credit gate, polls each task from its own tokio task on a fixed
// interval, mirrors provider steps into the per-session action queue, and
// walks the session state machine to a terminal status.
//
// Decision: one poller task per session, cancelled through a watch channel.
// The poller owns its entry in the poller map and removes it on exit, so
// `is_polling` reflects reality without a supervisor loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_core::automation::{
    AutomationAction, AutomationSession, SessionStatus, ACTION_MAX_ATTEMPTS,
    ACTION_RETRY_DELAY_SECS, DEFAULT_POLL_INTERVAL_SECS, MINIMUM_SESSION_CREDITS,
    TRANSPARENT_PIXEL_PNG,
};
use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::retry::RetryPolicy;
use switchboard_core::traits::{AutomationProvider, AutomationStore, ProviderTaskStatus};

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between provider status polls
    pub poll_interval: Duration,
    /// Retry policy for action execution (fixed delay)
    pub action_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            action_retry: RetryPolicy::fixed(
                ACTION_MAX_ATTEMPTS,
                Duration::from_secs(ACTION_RETRY_DELAY_SECS),
            ),
        }
    }
}

impl EngineConfig {
    /// Load tunables from the environment, falling back to the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("SWITCHBOARD_POLL_INTERVAL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                config.poll_interval = Duration::from_secs(secs);
            }
        }
        config
    }
}

struct Poller {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

enum PollOutcome {
    /// Keep the schedule
    Continue,
    /// Terminal status reached (or the session vanished); no further poll
    Finished,
}

/// Browser automation engine; one instance per process
pub struct AutomationEngine<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
    config: EngineConfig,
    /// Active pollers (session_id -> poller)
    pollers: Arc<RwLock<HashMap<Uuid, Poller>>>,
}

impl<P, S> AutomationEngine<P, S>
where
    P: AutomationProvider + 'static,
    S: AutomationStore + 'static,
{
    pub fn new(provider: Arc<P>, store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            provider,
            store,
            config,
            pollers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // ============================================
    // Session operations
    // ============================================

    /// Start a new automation session.
    ///
    /// The credit gate runs before anything is written: an insufficient
    /// balance surfaces a credit error and no session row exists afterwards.
    /// A provider rejection after the row exists marks the session failed.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        instructions: impl Into<String>,
    ) -> Result<AutomationSession> {
        let balance = self.store.user_credits(user_id).await?;
        if balance < MINIMUM_SESSION_CREDITS {
            return Err(OrchestratorError::credits(format!(
                "automation requires at least {MINIMUM_SESSION_CREDITS} credit, balance is {balance}"
            )));
        }

        let mut session = AutomationSession::new(user_id, instructions);
        self.store.create_session(&session).await?;
        info!(session_id = %session.id, user_id = %user_id, "automation session created");

        let handle = match self.provider.run_task(&session.instructions).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "provider rejected the task");
                if let Err(update_err) = self.mark_failed(&mut session, e.to_string()).await {
                    warn!(
                        session_id = %session.id,
                        error = %update_err,
                        "failed to record session failure"
                    );
                }
                return Err(e);
            }
        };

        session.provider_task_id = Some(handle.task_id);
        session.live_url = handle.live_url;
        session.transition_to(SessionStatus::Running)?;
        self.store.update_session(&session).await?;

        if !self
            .store
            .deduct_credits(user_id, MINIMUM_SESSION_CREDITS)
            .await?
        {
            // The gate passed moments ago; a concurrent spend got there first.
            warn!(session_id = %session.id, user_id = %user_id, "credit deduction failed after start");
        }

        self.spawn_poller(session.id).await;
        Ok(session)
    }

    /// Pause a running session. The poller stays alive and keeps watching
    /// the provider while paused.
    pub async fn pause_session(&self, id: Uuid) -> Result<AutomationSession> {
        let mut session = self.load_session(id).await?;
        let task_id = required_task_id(&session)?;

        self.provider.pause_task(&task_id).await?;
        session.transition_to(SessionStatus::Paused)?;
        self.store.update_session(&session).await?;
        info!(session_id = %id, "session paused");
        Ok(session)
    }

    /// Resume a paused session, restarting its poller if it is gone.
    pub async fn resume_session(&self, id: Uuid) -> Result<AutomationSession> {
        let mut session = self.load_session(id).await?;
        let task_id = required_task_id(&session)?;

        self.provider.resume_task(&task_id).await?;
        session.transition_to(SessionStatus::Running)?;
        self.store.update_session(&session).await?;

        if !self.is_polling(id).await {
            self.spawn_poller(id).await;
        }
        info!(session_id = %id, "session resumed");
        Ok(session)
    }

    /// Stop a session: the provider task is stopped, recordings are
    /// collected, and the poller is cancelled.
    pub async fn stop_session(&self, id: Uuid) -> Result<AutomationSession> {
        let mut session = self.load_session(id).await?;
        let task_id = required_task_id(&session)?;

        self.provider.stop_task(&task_id).await?;
        session.transition_to(SessionStatus::Stopped)?;
        collect_media(self.provider.as_ref(), &mut session, &task_id).await;
        self.store.update_session(&session).await?;

        self.cancel_poller(id).await;
        info!(session_id = %id, "session stopped");
        Ok(session)
    }

    /// Re-attach pollers for sessions that were active when the process
    /// stopped. Sessions that never reached the provider are failed, since
    /// there is no task to re-attach to. Returns the number of pollers
    /// started.
    pub async fn recover(&self) -> Result<usize> {
        let sessions = self.store.active_sessions().await?;
        let mut attached = 0usize;

        for mut session in sessions {
            if session.provider_task_id.is_none() {
                warn!(session_id = %session.id, "session lost before provider start, failing it");
                if let Err(e) = self
                    .mark_failed(&mut session, "interrupted before the provider task started")
                    .await
                {
                    warn!(session_id = %session.id, error = %e, "failed to record session failure");
                }
                continue;
            }

            self.spawn_poller(session.id).await;
            attached += 1;
        }

        info!(count = attached, "recovery complete");
        Ok(attached)
    }

    /// Cancel every poller and wait for them to finish
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pollers = self.pollers.write().await;
            pollers
                .drain()
                .map(|(_, poller)| {
                    let _ = poller.cancel.send(true);
                    poller.handle
                })
                .collect()
        };

        for handle in handles {
            let _ = handle.await;
        }
        info!("all pollers stopped");
    }

    pub async fn is_polling(&self, session_id: Uuid) -> bool {
        self.pollers.read().await.contains_key(&session_id)
    }

    pub async fn active_pollers(&self) -> usize {
        self.pollers.read().await.len()
    }

    // ============================================
    // Internals
    // ============================================

    async fn load_session(&self, id: Uuid) -> Result<AutomationSession> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("automation session {id}")))
    }

    async fn mark_failed(
        &self,
        session: &mut AutomationSession,
        error: impl Into<String>,
    ) -> Result<()> {
        session.fail(error)?;
        self.store.update_session(session).await
    }

    async fn spawn_poller(&self, session_id: Uuid) {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let provider = self.provider.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let pollers = self.pollers.clone();

        // Hold the map lock across spawn + insert so the poller cannot
        // remove its entry before the entry exists.
        let mut map = self.pollers.write().await;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        if *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match poll_tick(provider.as_ref(), store.as_ref(), &config, session_id).await {
                            Ok(PollOutcome::Continue) => {}
                            Ok(PollOutcome::Finished) => break,
                            Err(e) => {
                                warn!(session_id = %session_id, error = %e, "poll tick failed");
                            }
                        }
                    }
                }
            }

            pollers.write().await.remove(&session_id);
        });

        map.insert(
            session_id,
            Poller {
                handle,
                cancel: cancel_tx,
            },
        );
        info!(session_id = %session_id, "poller started");
    }

    async fn cancel_poller(&self, session_id: Uuid) {
        let pollers = self.pollers.read().await;
        if let Some(poller) = pollers.get(&session_id) {
            // The poller removes its own map entry once the loop exits.
            let _ = poller.cancel.send(true);
        }
    }
}

fn required_task_id(session: &AutomationSession) -> Result<String> {
    session
        .provider_task_id
        .clone()
        .ok_or_else(|| OrchestratorError::validation("session has no provider task"))
}

// ============================================
// Poll loop body
// ============================================

async fn poll_tick<P, S>(
    provider: &P,
    store: &S,
    config: &EngineConfig,
    session_id: Uuid,
) -> Result<PollOutcome>
where
    P: AutomationProvider,
    S: AutomationStore,
{
    let Some(mut session) = store.get_session(session_id).await? else {
        warn!(session_id = %session_id, "session disappeared, stopping poller");
        return Ok(PollOutcome::Finished);
    };
    if session.status.is_terminal() {
        return Ok(PollOutcome::Finished);
    }
    let task_id = required_task_id(&session)?;

    let status = match provider.task_status(&task_id).await {
        Ok(status) => status,
        Err(OrchestratorError::TaskExpired) => {
            info!(session_id = %session_id, "provider no longer knows the task, expiring");
            if let Err(e) = session.transition_to(SessionStatus::Expired) {
                warn!(session_id = %session_id, error = %e, "could not expire session");
            } else {
                store.update_session(&session).await?;
            }
            return Ok(PollOutcome::Finished);
        }
        Err(e) => {
            // Transient fetch failure; keep the schedule.
            warn!(session_id = %session_id, error = %e, "status poll failed");
            return Ok(PollOutcome::Continue);
        }
    };

    apply_status(&mut session, &status);

    let next = SessionStatus::from_phase(status.status);
    if let Err(e) = session.transition_to(next) {
        warn!(session_id = %session_id, error = %e, "ignoring provider-reported transition");
    }

    if session.status == SessionStatus::Running {
        pump_actions(provider, store, config, &mut session, &task_id, &status).await?;
    }

    if session.status.is_terminal() {
        collect_media(provider, &mut session, &task_id).await;
        store.update_session(&session).await?;
        info!(session_id = %session_id, status = %session.status, "session reached terminal status");
        return Ok(PollOutcome::Finished);
    }

    store.update_session(&session).await?;
    Ok(PollOutcome::Continue)
}

/// Copy the provider's view onto the session; absent fields keep their
/// last known value.
fn apply_status(session: &mut AutomationSession, status: &ProviderTaskStatus) {
    if status.progress.is_some() {
        session.progress = status.progress;
    }
    if status.current_url.is_some() {
        session.current_url = status.current_url.clone();
    }
    if status.live_url.is_some() {
        session.live_url = status.live_url.clone();
    }
    if status.output.is_some() {
        session.output = status.output.clone();
    }
    session.updated_at = Utc::now();
}

/// Advance the action queue by at most one action per tick.
///
/// The head of the queue is either a still-pending action from an earlier
/// tick or the next provider step not yet mirrored locally. Nothing new is
/// materialized while a pending action exists.
async fn pump_actions<P, S>(
    provider: &P,
    store: &S,
    config: &EngineConfig,
    session: &mut AutomationSession,
    task_id: &str,
    status: &ProviderTaskStatus,
) -> Result<()>
where
    P: AutomationProvider,
    S: AutomationStore,
{
    let action = match store.pending_action(session.id).await? {
        Some(action) => Some(action),
        None => {
            let mirrored = store.session_actions(session.id).await?.len();
            match status.steps.get(mirrored) {
                Some(step) => {
                    let action = AutomationAction::new(
                        session.id,
                        step.action_type.clone(),
                        json!({ "details": step.details }),
                    );
                    store.insert_action(&action).await?;
                    Some(action)
                }
                None => None,
            }
        }
    };

    let Some(mut action) = action else {
        return Ok(());
    };

    execute_action(provider, store, config, session, task_id, &mut action).await
}

/// Execute one action with the fixed-delay retry budget. The action ends
/// `executed` or `failed`; either way the queue advances past it.
async fn execute_action<P, S>(
    provider: &P,
    store: &S,
    config: &EngineConfig,
    session: &mut AutomationSession,
    task_id: &str,
    action: &mut AutomationAction,
) -> Result<()>
where
    P: AutomationProvider,
    S: AutomationStore,
{
    let policy = &config.action_retry;
    let mut last_err: Option<OrchestratorError> = None;

    for attempt in 1..=policy.max_attempts {
        action.attempts = attempt;
        match provider
            .execute_action(task_id, &action.action_type, &action.action_details)
            .await
        {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(e) => {
                if attempt == policy.max_attempts || !e.is_retryable() {
                    last_err = Some(e);
                    break;
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    action_id = %action.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "action attempt failed, retrying"
                );
                last_err = Some(e);
                tokio::time::sleep(delay).await;
            }
        }
    }

    match last_err {
        None => {
            action.executed();
            attach_screenshot(provider, session, task_id, action).await;
            info!(
                action_id = %action.id,
                action_type = %action.action_type,
                "action executed"
            );
        }
        Some(e) => {
            warn!(
                action_id = %action.id,
                attempts = action.attempts,
                error = %e,
                "action failed permanently, advancing past it"
            );
            action.fail(e.to_string());
        }
    }

    store.update_action(action).await
}

/// Best-effort screenshot after an executed action. Any failure falls back
/// to a transparent pixel; this path never produces an error.
async fn attach_screenshot<P>(
    provider: &P,
    session: &mut AutomationSession,
    task_id: &str,
    action: &mut AutomationAction,
) where
    P: AutomationProvider,
{
    let url = match provider.capture_screenshot(task_id).await {
        Ok(url) => url,
        Err(e) => {
            warn!(
                session_id = %session.id,
                error = %e,
                "screenshot capture failed, using placeholder"
            );
            TRANSPARENT_PIXEL_PNG.to_string()
        }
    };
    action.screenshot_url = Some(url.clone());
    session.screenshot = Some(url);
}

/// One recordings fetch at terminal status; failures are logged and dropped.
async fn collect_media<P>(provider: &P, session: &mut AutomationSession, task_id: &str)
where
    P: AutomationProvider,
{
    match provider.task_media(task_id).await {
        Ok(urls) => session.media_urls = urls,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "media fetch failed");
        }
    }
}

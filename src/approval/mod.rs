//! Lifecycle tracking for tool actions that require human approval
//!
//! The model queues sensitive tool actions server-side and announces them
//! in the stream as `<tool_pending>` tags. This module tracks those
//! actions locally, issues the approve/deny calls against the external
//! approval service, and synthesizes the follow-up turn that feeds the
//! outcome back to the model. The external service is the single source of
//! truth; the local cache only guards against duplicate UI triggers and
//! remembers resolutions across re-parses of the same stream.

pub mod http;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

pub use http::HttpApprovalClient;

/// Resolution state of one pending action. Transitions only move forward:
/// `Unresolved` to `Approved` or `Denied`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Unresolved,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn is_resolved(self) -> bool {
        self != ApprovalStatus::Unresolved
    }
}

/// A tool invocation awaiting human approval before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub request_id: String,
    pub tool: String,
    pub action: String,
    pub params: serde_json::Value,
    pub status: ApprovalStatus,
}

/// Boundary to the external approval service.
///
/// `approve` returns the executed tool's result payload. Both calls report
/// success for a request that was already resolved server-side; the
/// service, not this process, owns the authoritative state.
#[async_trait]
pub trait ApprovalClient: Send + Sync {
    async fn approve(&self, request_id: &str) -> Result<serde_json::Value>;
    async fn deny(&self, request_id: &str) -> Result<()>;
    async fn pending_count(&self) -> Result<usize>;
}

/// A synthesized conversational turn carrying a resolution outcome back to
/// the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpTurn {
    pub prompt: String,
}

/// Result of an approve/deny request against the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The action was resolved; submit the follow-up turn to the model.
    Resolved(FollowUpTurn),
    /// Terminal state already reached earlier; nothing was called.
    AlreadyResolved,
    /// Another resolution call for this id is still outstanding.
    InFlight,
    /// The id was never registered from the stream.
    Unknown,
}

#[derive(Default)]
struct TrackerState {
    actions: HashMap<String, PendingAction>,
    in_flight: HashSet<String>,
}

enum Gate {
    Proceed,
    AlreadyResolved,
    InFlight,
    Unknown,
}

/// Tracks pending actions for one session.
pub struct ApprovalTracker {
    client: Arc<dyn ApprovalClient>,
    state: Mutex<TrackerState>,
}

impl ApprovalTracker {
    pub fn new(client: Arc<dyn ApprovalClient>) -> Self {
        Self {
            client,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Record an action decoded from the stream.
    ///
    /// Resolved status is sticky: a later re-parse that still sees the
    /// originating tag must not resurrect an `Unresolved` entry.
    pub fn register(&self, action: PendingAction) {
        let mut state = self.state.lock().unwrap();
        match state.actions.get(&action.request_id) {
            Some(existing) if existing.status.is_resolved() => {}
            _ => {
                state.actions.insert(action.request_id.clone(), action);
            }
        }
    }

    pub fn get(&self, request_id: &str) -> Option<PendingAction> {
        self.state.lock().unwrap().actions.get(request_id).cloned()
    }

    /// Actions still waiting for a decision, for display.
    pub fn unresolved(&self) -> Vec<PendingAction> {
        let state = self.state.lock().unwrap();
        let mut actions: Vec<PendingAction> = state
            .actions
            .values()
            .filter(|a| !a.status.is_resolved())
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        actions
    }

    /// Approve a pending action.
    ///
    /// Exactly one call reaches the approval service per resolution; a
    /// request that is already resolved or already in flight is a no-op.
    /// On failure the action stays `Unresolved` and the error is surfaced
    /// as recoverable; the user may simply try again.
    pub async fn approve(&self, request_id: &str) -> Result<ResolveOutcome> {
        match self.begin_resolution(request_id) {
            Gate::Proceed => {}
            Gate::AlreadyResolved => return Ok(ResolveOutcome::AlreadyResolved),
            Gate::InFlight => return Ok(ResolveOutcome::InFlight),
            Gate::Unknown => return Ok(ResolveOutcome::Unknown),
        }

        let result = self.client.approve(request_id).await;
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(request_id);

        let payload = result.with_context(|| format!("approving pending action '{request_id}'"))?;
        match state.actions.get_mut(request_id) {
            Some(action) => {
                action.status = ApprovalStatus::Approved;
                Ok(ResolveOutcome::Resolved(follow_up_for_result(
                    action, &payload,
                )))
            }
            None => Ok(ResolveOutcome::Unknown),
        }
    }

    /// Deny a pending action. Symmetric to [`ApprovalTracker::approve`].
    pub async fn deny(&self, request_id: &str) -> Result<ResolveOutcome> {
        match self.begin_resolution(request_id) {
            Gate::Proceed => {}
            Gate::AlreadyResolved => return Ok(ResolveOutcome::AlreadyResolved),
            Gate::InFlight => return Ok(ResolveOutcome::InFlight),
            Gate::Unknown => return Ok(ResolveOutcome::Unknown),
        }

        let result = self.client.deny(request_id).await;
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(request_id);

        result.with_context(|| format!("denying pending action '{request_id}'"))?;
        match state.actions.get_mut(request_id) {
            Some(action) => {
                action.status = ApprovalStatus::Denied;
                Ok(ResolveOutcome::Resolved(follow_up_for_denial(action)))
            }
            None => Ok(ResolveOutcome::Unknown),
        }
    }

    fn begin_resolution(&self, request_id: &str) -> Gate {
        let mut state = self.state.lock().unwrap();
        match state.actions.get(request_id) {
            None => return Gate::Unknown,
            Some(action) if action.status.is_resolved() => return Gate::AlreadyResolved,
            Some(_) => {}
        }
        if !state.in_flight.insert(request_id.to_string()) {
            return Gate::InFlight;
        }
        Gate::Proceed
    }
}

/// Feedback turn after an approved action ran, so the model can narrate
/// the result instead of the user reading raw JSON.
fn follow_up_for_result(action: &PendingAction, payload: &serde_json::Value) -> FollowUpTurn {
    let result_block = json!({
        "tool": action.tool,
        "action": action.action,
        "result": payload,
    });
    let prompt = format!(
        "### TOOL EXECUTION RESULTS ###\n\
         <tool_result>{result_block}</tool_result>\n\n\
         **INSTRUCTIONS FOR THIS TURN:**\n\
         1. If the goal is met, provide the final answer to the user in natural language.\n\
         2. If more information is needed, you may call another tool (follow protocol).\n\
         3. DO NOT repeat the same tool call if the results above already provide the answer."
    );
    FollowUpTurn { prompt }
}

/// Feedback turn after a denial, so the model acknowledges instead of
/// retrying.
fn follow_up_for_denial(action: &PendingAction) -> FollowUpTurn {
    let prompt = format!(
        "The user DENIED the pending '{}' {} action. Do not retry it. \
         Acknowledge the refusal and continue with what you can do without it.",
        action.tool, action.action
    );
    FollowUpTurn { prompt }
}

/// Periodic query of the server-side unresolved count, for display only.
///
/// This is advisory state and never authoritative over locally tracked
/// statuses. The task is tied to the session: started explicitly, aborted
/// on [`PendingCountPoller::stop`] or drop.
pub struct PendingCountPoller {
    count: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl PendingCountPoller {
    pub fn start(client: Arc<dyn ApprovalClient>, period: Duration) -> Self {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = count.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match client.pending_count().await {
                    Ok(n) => shared.store(n, Ordering::Relaxed),
                    Err(e) => warn!("Failed to query pending action count: {e}"),
                }
            }
        });
        Self { count, handle }
    }

    /// The most recently observed server-side count.
    pub fn latest(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for PendingCountPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockApprovalClient {
        approve_calls: AtomicUsize,
        deny_calls: AtomicUsize,
        fail: bool,
    }

    impl MockApprovalClient {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                approve_calls: AtomicUsize::new(0),
                deny_calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ApprovalClient for MockApprovalClient {
        async fn approve(&self, _request_id: &str) -> Result<serde_json::Value> {
            self.approve_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(json!({"success": true, "content": "file written"}))
        }

        async fn deny(&self, _request_id: &str) -> Result<()> {
            self.deny_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }

        async fn pending_count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn sample_action(id: &str) -> PendingAction {
        PendingAction {
            request_id: id.to_string(),
            tool: "file".to_string(),
            action: "write".to_string(),
            params: json!({"path": "a.txt"}),
            status: ApprovalStatus::Unresolved,
        }
    }

    #[tokio::test]
    async fn approve_resolves_and_synthesizes_follow_up() {
        let client = MockApprovalClient::new(false);
        let tracker = ApprovalTracker::new(client.clone());
        tracker.register(sample_action("r1"));

        let outcome = tracker.approve("r1").await.unwrap();
        let ResolveOutcome::Resolved(follow_up) = outcome else {
            panic!("expected resolution, got {outcome:?}");
        };
        assert!(follow_up.prompt.contains("<tool_result>"));
        assert!(follow_up.prompt.contains("file written"));
        assert_eq!(
            tracker.get("r1").unwrap().status,
            ApprovalStatus::Approved
        );
        assert_eq!(client.approve_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn double_approve_makes_exactly_one_call() {
        let client = MockApprovalClient::new(false);
        let tracker = ApprovalTracker::new(client.clone());
        tracker.register(sample_action("r1"));

        tracker.approve("r1").await.unwrap();
        let second = tracker.approve("r1").await.unwrap();
        assert_eq!(second, ResolveOutcome::AlreadyResolved);
        assert_eq!(client.approve_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.get("r1").unwrap().status,
            ApprovalStatus::Approved
        );
    }

    #[tokio::test]
    async fn failed_call_leaves_action_retryable() {
        let failing = MockApprovalClient::new(true);
        let tracker = ApprovalTracker::new(failing.clone());
        tracker.register(sample_action("r1"));

        assert!(tracker.approve("r1").await.is_err());
        assert_eq!(
            tracker.get("r1").unwrap().status,
            ApprovalStatus::Unresolved
        );
        // The in-flight guard was released; a retry issues a new call.
        assert!(tracker.approve("r1").await.is_err());
        assert_eq!(failing.approve_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deny_is_symmetric() {
        let client = MockApprovalClient::new(false);
        let tracker = ApprovalTracker::new(client.clone());
        tracker.register(sample_action("r1"));

        let outcome = tracker.deny("r1").await.unwrap();
        let ResolveOutcome::Resolved(follow_up) = outcome else {
            panic!("expected resolution, got {outcome:?}");
        };
        assert!(follow_up.prompt.contains("DENIED"));
        assert_eq!(tracker.get("r1").unwrap().status, ApprovalStatus::Denied);
        assert_eq!(client.deny_calls.load(Ordering::SeqCst), 1);

        // Approving after a denial is a no-op, not a state change.
        let after = tracker.approve("r1").await.unwrap();
        assert_eq!(after, ResolveOutcome::AlreadyResolved);
        assert_eq!(client.approve_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_request_id_is_reported() {
        let tracker = ApprovalTracker::new(MockApprovalClient::new(false));
        assert_eq!(
            tracker.approve("nope").await.unwrap(),
            ResolveOutcome::Unknown
        );
    }

    #[tokio::test]
    async fn re_registration_does_not_resurrect_resolved_actions() {
        let client = MockApprovalClient::new(false);
        let tracker = ApprovalTracker::new(client);
        tracker.register(sample_action("r1"));
        tracker.approve("r1").await.unwrap();

        // A later re-parse of the same buffer sees the same tag again.
        tracker.register(sample_action("r1"));
        assert_eq!(
            tracker.get("r1").unwrap().status,
            ApprovalStatus::Approved
        );
        assert!(tracker.unresolved().is_empty());
    }
}

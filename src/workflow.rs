//! Shadow/live mode discipline and batch result rendering.
//!
//! The gating here is advisory. The backend decides what a batch run does;
//! this module only keeps the client from asking for, or reporting, more
//! than the backend actually confirmed.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{InvocationError, SiftApi};
use crate::types::{BatchClassifyRequest, BatchClassifyResult, BatchItem, ItemAction, Mode};

/// Errors raised by the mode workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Mode has not been fetched from the backend yet
    #[error("Mode for {email} is unknown, fetch it before acting")]
    ModeUnknown { email: String },

    /// Live batch requested while the mailbox is not in live mode
    #[error("Live apply is not permitted for {email} in {mode} mode")]
    LiveApplyNotPermitted { email: String, mode: ModeState },

    /// Gateway or backend call failed
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

/// Last mode observed from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    /// Not fetched yet
    Unknown,
    /// Observe-only
    Shadow,
    /// Enforcing
    Live,
}

impl ModeState {
    fn from_mode(mode: &Mode) -> Self {
        if mode.shadow {
            ModeState::Shadow
        } else {
            ModeState::Live
        }
    }
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeState::Unknown => "unknown",
            ModeState::Shadow => "shadow",
            ModeState::Live => "live",
        };
        f.write_str(name)
    }
}

/// Per-mailbox view state: current mode and the last batch report.
///
/// Nothing is cached across sessions; a new session starts `Unknown`.
#[derive(Debug)]
pub struct ModeSession {
    api: SiftApi,
    email: String,
    mode: ModeState,
    last_batch: Option<BatchReport>,
}

impl ModeSession {
    pub fn new(api: SiftApi, email: impl Into<String>) -> Self {
        Self {
            api,
            email: email.into(),
            mode: ModeState::Unknown,
            last_batch: None,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn mode(&self) -> ModeState {
        self.mode
    }

    pub fn last_batch(&self) -> Option<&BatchReport> {
        self.last_batch.as_ref()
    }

    /// Whether a live (non-dry-run) batch may be offered.
    pub fn can_apply_live(&self) -> bool {
        self.mode == ModeState::Live
    }

    /// Fetch the current mode from the backend.
    pub async fn load_mode(&mut self) -> Result<ModeState, WorkflowError> {
        let mode = self.api.mode(&self.email).await?;
        self.mode = ModeState::from_mode(&mode);
        debug!(email = %self.email, mode = %self.mode, "Mode loaded");
        Ok(self.mode)
    }

    /// Request a mode change and adopt whatever the backend echoes.
    pub async fn set_shadow(&mut self, shadow: bool) -> Result<ModeState, WorkflowError> {
        let echoed = self.api.set_mode(&self.email, shadow).await?;
        self.mode = ModeState::from_mode(&echoed);

        if echoed.shadow != shadow {
            warn!(
                email = %self.email,
                requested_shadow = shadow,
                echoed_shadow = echoed.shadow,
                "Backend kept a different mode than requested"
            );
        } else {
            info!(email = %self.email, mode = %self.mode, "Mode updated");
        }
        Ok(self.mode)
    }

    /// Flip between shadow and live.
    ///
    /// # Errors
    ///
    /// `WorkflowError::ModeUnknown` if the mode was never loaded.
    pub async fn toggle(&mut self) -> Result<ModeState, WorkflowError> {
        let shadow = match self.mode {
            ModeState::Unknown => {
                return Err(WorkflowError::ModeUnknown {
                    email: self.email.clone(),
                });
            }
            ModeState::Shadow => false,
            ModeState::Live => true,
        };
        self.set_shadow(shadow).await
    }

    /// Run a batch with the default label, size and threshold.
    pub async fn run_batch(&mut self, dry_run: bool) -> Result<&BatchReport, WorkflowError> {
        let request = BatchClassifyRequest::new(self.email.clone(), dry_run);
        self.run_batch_with(request).await
    }

    /// Run a batch with an explicit request.
    ///
    /// # Errors
    ///
    /// `WorkflowError::LiveApplyNotPermitted` for a live run unless the
    /// loaded mode is live.
    pub async fn run_batch_with(
        &mut self,
        request: BatchClassifyRequest,
    ) -> Result<&BatchReport, WorkflowError> {
        if !request.dry_run && !self.can_apply_live() {
            return Err(WorkflowError::LiveApplyNotPermitted {
                email: self.email.clone(),
                mode: self.mode,
            });
        }

        let result = self.api.batch_classify(&request).await?;
        if result.dry_run != request.dry_run {
            warn!(
                email = %self.email,
                requested_dry_run = request.dry_run,
                echoed_dry_run = result.dry_run,
                "Backend changed dry_run"
            );
        }

        let report = BatchReport::new(result);
        info!(
            email = %self.email,
            dry_run = report.is_dry_run(),
            count = report.result().count,
            applied = report.applied_count(),
            "Batch classified"
        );
        let report = self.last_batch.insert(report);
        Ok(&*report)
    }
}

/// What a batch item means for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Left in place
    Untouched,
    /// Flagged, nothing moved
    WouldQuarantine,
    /// Moved to quarantine by a confirmed live run
    Quarantined,
    /// Unrecognised action code, shown as-is
    Other(String),
}

impl Disposition {
    /// Classify one item given the dry-run flag the backend echoed.
    pub fn of(item: &BatchItem, dry_run: bool) -> Self {
        match &item.action {
            ItemAction::None => Disposition::Untouched,
            ItemAction::WouldQuarantine => Disposition::WouldQuarantine,
            ItemAction::Quarantine if dry_run => Disposition::WouldQuarantine,
            ItemAction::Quarantine => Disposition::Quarantined,
            ItemAction::Other(code) => Disposition::Other(code.clone()),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Disposition::Quarantined)
    }

    pub fn label(&self) -> &str {
        match self {
            Disposition::Untouched => "untouched",
            Disposition::WouldQuarantine => "would quarantine",
            Disposition::Quarantined => "quarantined",
            Disposition::Other(code) => code,
        }
    }
}

/// A batch result with per-item dispositions.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    result: BatchClassifyResult,
}

impl BatchReport {
    pub fn new(result: BatchClassifyResult) -> Self {
        Self { result }
    }

    pub fn result(&self) -> &BatchClassifyResult {
        &self.result
    }

    /// Effective dry-run flag as echoed by the backend.
    pub fn is_dry_run(&self) -> bool {
        self.result.dry_run
    }

    pub fn dispositions(&self) -> Vec<(&BatchItem, Disposition)> {
        self.result
            .items
            .iter()
            .map(|item| (item, Disposition::of(item, self.result.dry_run)))
            .collect()
    }

    /// Items actually moved. Always 0 for a dry run.
    pub fn applied_count(&self) -> usize {
        if self.result.dry_run {
            return 0;
        }
        self.result
            .items
            .iter()
            .filter(|item| Disposition::of(item, false).is_applied())
            .count()
    }

    /// One-line operator summary.
    pub fn summary(&self) -> String {
        let flagged = self
            .dispositions()
            .iter()
            .filter(|(_, d)| *d != Disposition::Untouched)
            .count();
        if self.result.dry_run {
            format!(
                "Dry run: {} scanned, {} would be quarantined, nothing moved",
                self.result.count, flagged
            )
        } else {
            format!(
                "Live run: {} scanned, {} quarantined",
                self.result.count,
                self.applied_count()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GatewayClient;
    use serde_json::json;

    fn result(dry_run: bool, actions: &[&str]) -> BatchClassifyResult {
        let items: Vec<_> = actions
            .iter()
            .enumerate()
            .map(|(i, action)| json!({"id": format!("m{i}"), "score": 0.9, "reasons": [], "action": action}))
            .collect();
        serde_json::from_value(json!({
            "dry_run": dry_run,
            "count": items.len(),
            "items": items
        }))
        .expect("result")
    }

    fn session() -> ModeSession {
        // Never contacted: every test below fails before the network call
        let client = GatewayClient::new("http://127.0.0.1:9/api/sift").expect("client");
        ModeSession::new(SiftApi::new(client), "ops@example.com")
    }

    #[test]
    fn test_dry_run_never_reports_applied() {
        let report = BatchReport::new(result(true, &["quarantine", "would_quarantine", "none"]));

        assert_eq!(report.applied_count(), 0);
        assert!(report.dispositions().iter().all(|(_, d)| !d.is_applied()));
        assert_eq!(report.dispositions()[0].1, Disposition::WouldQuarantine);
        assert!(report.summary().contains("nothing moved"));
    }

    #[test]
    fn test_live_run_reports_quarantined() {
        let report = BatchReport::new(result(false, &["quarantine", "none", "quarantine"]));

        assert_eq!(report.applied_count(), 2);
        let dispositions: Vec<_> = report.dispositions().into_iter().map(|(_, d)| d).collect();
        assert_eq!(
            dispositions,
            vec![
                Disposition::Quarantined,
                Disposition::Untouched,
                Disposition::Quarantined
            ]
        );
        assert_eq!(report.summary(), "Live run: 3 scanned, 2 quarantined");
    }

    #[test]
    fn test_unknown_action_is_not_applied() {
        let report = BatchReport::new(result(false, &["label_only"]));
        assert_eq!(report.applied_count(), 0);
        assert_eq!(
            report.dispositions()[0].1,
            Disposition::Other("label_only".to_string())
        );
    }

    #[test]
    fn test_new_session_is_unknown() {
        let session = session();
        assert_eq!(session.mode(), ModeState::Unknown);
        assert!(!session.can_apply_live());
        assert!(session.last_batch().is_none());
    }

    #[tokio::test]
    async fn test_toggle_requires_loaded_mode() {
        let mut session = session();
        let err = session.toggle().await.expect_err("should refuse");
        assert!(matches!(err, WorkflowError::ModeUnknown { .. }));
    }

    #[tokio::test]
    async fn test_live_batch_refused_unless_live() {
        let mut session = session();
        let err = session.run_batch(false).await.expect_err("should refuse");
        assert!(matches!(
            err,
            WorkflowError::LiveApplyNotPermitted {
                mode: ModeState::Unknown,
                ..
            }
        ));

        session.mode = ModeState::Shadow;
        let err = session.run_batch(false).await.expect_err("should refuse");
        assert!(err.to_string().contains("shadow mode"));
    }
}

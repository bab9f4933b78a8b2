//! Records exchanged with the Sift backend through the gateway.
//!
//! The backend owns these shapes. Decoding tolerates unknown fields so a
//! newer backend does not break an older client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default mailbox label for batch runs and message listings.
pub const DEFAULT_LABEL: &str = "INBOX";

/// Operational mode of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    /// Mailbox identifier, when the backend echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `true` = observe-only, `false` = enforcing
    pub shadow: bool,
}

/// Body of `POST mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeUpdate {
    pub email: String,
    pub shadow: bool,
}

/// Allow and block lists of a mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub block: Vec<String>,
}

/// Body of `POST rules/allow` and `POST rules/block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesUpdate {
    pub email: String,
    pub entries: Vec<String>,
}

/// Body of `POST gmail/batch-classify`.
///
/// `dry_run` is always serialized; the backend decides what it means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchClassifyRequest {
    pub email: String,
    pub label: String,
    pub max_results: u32,
    pub quarantine_threshold: f64,
    pub dry_run: bool,
}

impl BatchClassifyRequest {
    /// Request with the dashboard defaults: `INBOX`, 25 messages, 0.7.
    pub fn new(email: impl Into<String>, dry_run: bool) -> Self {
        Self {
            email: email.into(),
            label: DEFAULT_LABEL.to_string(),
            max_results: 25,
            quarantine_threshold: 0.7,
            dry_run,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, quarantine_threshold: f64) -> Self {
        self.quarantine_threshold = quarantine_threshold;
        self
    }
}

/// Action code attached to a classified message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemAction {
    /// Below threshold
    None,
    /// Would be quarantined if applied
    WouldQuarantine,
    /// Reported as moved to quarantine
    Quarantine,
    /// Any code this client does not know
    Other(String),
}

impl ItemAction {
    pub fn as_str(&self) -> &str {
        match self {
            ItemAction::None => "none",
            ItemAction::WouldQuarantine => "would_quarantine",
            ItemAction::Quarantine => "quarantine",
            ItemAction::Other(code) => code,
        }
    }
}

impl From<String> for ItemAction {
    fn from(code: String) -> Self {
        match code.as_str() {
            "none" => ItemAction::None,
            "would_quarantine" => ItemAction::WouldQuarantine,
            "quarantine" => ItemAction::Quarantine,
            _ => ItemAction::Other(code),
        }
    }
}

impl From<ItemAction> for String {
    fn from(action: ItemAction) -> Self {
        action.as_str().to_string()
    }
}

/// One classified message in a batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub action: ItemAction,
}

/// Response of `POST gmail/batch-classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchClassifyResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Effective dry-run flag as decided by the backend
    pub dry_run: bool,
    pub count: usize,
    #[serde(default)]
    pub items: Vec<BatchItem>,
}

/// One quarantined message in the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestItem {
    pub id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Response of `GET digest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    #[serde(default)]
    pub items: Vec<DigestItem>,
}

/// One audit log entry.
///
/// Event-specific fields (`shadow`, `entries`, ...) are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unix seconds
    #[serde(default)]
    pub ts: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditEntry {
    /// Entry timestamp, `None` if missing or out of range.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        if self.ts <= 0 {
            return None;
        }
        DateTime::from_timestamp(self.ts, 0)
    }
}

/// Response of `GET audit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    #[serde(default)]
    pub items: Vec<AuditEntry>,
}

/// One message in a recent-messages listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentMessage {
    pub id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Response of `GET messages/recent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentMessages {
    #[serde(default)]
    pub items: Vec<RecentMessage>,
}

/// Operator action on a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAction {
    Quarantine,
    Undo,
    Allow,
}

/// Body of `POST messages/action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageActionRequest {
    pub email: String,
    pub message_id: String,
    pub action: MessageAction,
}

/// Response of `POST messages/action`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageActionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageActionResult {
    /// Short operator-facing outcome: the action taken, else the ok flag.
    pub fn summary(&self) -> String {
        match (&self.action, self.ok) {
            (Some(action), _) => format!("Action: {}", action),
            (None, Some(ok)) => format!("Action: {}", ok),
            (None, None) => "Action: unknown".to_string(),
        }
    }
}

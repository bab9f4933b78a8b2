//! Typed wrappers over the backend endpoints reachable through the gateway.

use crate::client::{GatewayClient, InvocationError, query};
use crate::types::{
    AuditLog, BatchClassifyRequest, BatchClassifyResult, Digest, MessageAction,
    MessageActionRequest, MessageActionResult, Mode, ModeUpdate, RecentMessages, Rules,
    RulesUpdate,
};

/// Default number of audit entries requested.
pub const DEFAULT_AUDIT_LIMIT: u32 = 200;

/// Backend API as seen through the gateway.
#[derive(Debug, Clone)]
pub struct SiftApi {
    client: GatewayClient,
}

impl SiftApi {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }

    /// Underlying untyped client.
    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    /// `GET mode?email=`
    pub async fn mode(&self, email: &str) -> Result<Mode, InvocationError> {
        self.client
            .get_json(&format!("mode?{}", query(&[("email", email)])))
            .await
    }

    /// `POST mode`. Returns the mode the backend echoed, which may differ
    /// from the one requested.
    pub async fn set_mode(&self, email: &str, shadow: bool) -> Result<Mode, InvocationError> {
        let update = ModeUpdate {
            email: email.to_string(),
            shadow,
        };
        self.client.post_json("mode", &update).await
    }

    /// `GET rules?email=`
    pub async fn rules(&self, email: &str) -> Result<Rules, InvocationError> {
        self.client
            .get_json(&format!("rules?{}", query(&[("email", email)])))
            .await
    }

    /// `POST rules/allow`
    pub async fn add_allow(
        &self,
        email: &str,
        entries: Vec<String>,
    ) -> Result<Rules, InvocationError> {
        self.update_rules("rules/allow", email, entries).await
    }

    /// `POST rules/block`
    pub async fn add_block(
        &self,
        email: &str,
        entries: Vec<String>,
    ) -> Result<Rules, InvocationError> {
        self.update_rules("rules/block", email, entries).await
    }

    async fn update_rules(
        &self,
        path: &str,
        email: &str,
        entries: Vec<String>,
    ) -> Result<Rules, InvocationError> {
        let update = RulesUpdate {
            email: email.to_string(),
            entries,
        };
        self.client.post_json(path, &update).await
    }

    /// `POST gmail/batch-classify`. `dry_run` is sent as given.
    pub async fn batch_classify(
        &self,
        request: &BatchClassifyRequest,
    ) -> Result<BatchClassifyResult, InvocationError> {
        self.client.post_json("gmail/batch-classify", request).await
    }

    /// `GET digest?email=`
    pub async fn digest(&self, email: &str) -> Result<Digest, InvocationError> {
        self.client
            .get_json(&format!("digest?{}", query(&[("email", email)])))
            .await
    }

    /// `GET audit?email=&limit=`, limit defaulting to [`DEFAULT_AUDIT_LIMIT`].
    pub async fn audit(&self, email: &str, limit: Option<u32>) -> Result<AuditLog, InvocationError> {
        let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT).to_string();
        self.client
            .get_json(&format!(
                "audit?{}",
                query(&[("email", email), ("limit", &limit)])
            ))
            .await
    }

    /// `GET messages/recent?email=&label=&max_results=`
    pub async fn recent_messages(
        &self,
        email: &str,
        label: &str,
        max_results: u32,
    ) -> Result<RecentMessages, InvocationError> {
        let max_results = max_results.to_string();
        self.client
            .get_json(&format!(
                "messages/recent?{}",
                query(&[
                    ("email", email),
                    ("label", label),
                    ("max_results", &max_results),
                ])
            ))
            .await
    }

    /// `POST messages/action`
    pub async fn message_action(
        &self,
        email: &str,
        message_id: &str,
        action: MessageAction,
    ) -> Result<MessageActionResult, InvocationError> {
        let request = MessageActionRequest {
            email: email.to_string(),
            message_id: message_id.to_string(),
            action,
        };
        self.client.post_json("messages/action", &request).await
    }
}

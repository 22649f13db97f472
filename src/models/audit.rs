use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One append-only audit record. Never updated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub uuid: Uuid,
    pub actor_user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub activity_type: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: HashMap<String, String>,
    pub created_at: i64,
}

/// Request-level caller metadata carried into audit entries. Empty for
/// actions with no originating HTTP request (webhook deliveries, workers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ActivityEntry {
    pub fn new(
        actor_user_id: Uuid,
        org_id: Option<Uuid>,
        activity_type: impl Into<String>,
        meta: &ClientMeta,
        details: HashMap<String, String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            actor_user_id,
            org_id,
            activity_type: activity_type.into(),
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            details,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

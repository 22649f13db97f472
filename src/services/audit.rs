//! Fire-and-forget activity logging. A failed audit write must never fail
//! the operation that produced it.

use crate::AppCore;
use crate::error::Result;
use crate::models::{ActivityEntry, ClientMeta};
use std::collections::HashMap;
use uuid::Uuid;

pub fn log_custom_activity(
    core: &AppCore,
    actor_user_id: Uuid,
    org_id: Option<Uuid>,
    activity_type: &str,
    meta: &ClientMeta,
    details: HashMap<String, String>,
) {
    let entry = ActivityEntry::new(actor_user_id, org_id, activity_type, meta, details);
    if let Err(err) = core.storage.audit.append(&entry) {
        tracing::warn!(
            activity_type,
            error = %err,
            "failed to write audit entry"
        );
    }
}

/// Admin-only activity listing for one organization, newest first.
pub fn list_activity(
    core: &AppCore,
    acting_user_id: Uuid,
    org_id: Uuid,
    limit: usize,
) -> Result<Vec<ActivityEntry>> {
    if !core.storage.organizations.is_admin(&org_id, &acting_user_id)? {
        return Err(crate::error::AppError::Forbidden(
            "only organization admins may view the activity log".into(),
        ));
    }
    Ok(core.storage.audit.list_for_org(&org_id, limit.min(500))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_org_with_admin, test_core};

    #[test]
    fn audit_entry_captures_caller_ip_and_user_agent() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);

        let meta = ClientMeta {
            ip: Some("203.0.113.9".into()),
            user_agent: Some("vaultd-cli/1.2".into()),
        };
        log_custom_activity(&core, admin, Some(org), "item.export", &meta, HashMap::new());

        let entries = list_activity(&core, admin, org, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(entries[0].user_agent.as_deref(), Some("vaultd-cli/1.2"));
    }

    #[test]
    fn webhook_writes_leave_caller_metadata_empty() {
        let (core, _tmp) = test_core();
        let (org, admin) = seed_org_with_admin(&core);

        log_custom_activity(
            &core,
            admin,
            Some(org),
            "subscription.store_event",
            &ClientMeta::default(),
            HashMap::new(),
        );

        let entries = list_activity(&core, admin, org, 10).unwrap();
        assert!(entries[0].ip.is_none());
        assert!(entries[0].user_agent.is_none());
    }
}

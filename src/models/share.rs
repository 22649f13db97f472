use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission bits carried by a share. Re-shares are clamped so a child
/// grant can never exceed its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePermissions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_share: bool,
}

impl SharePermissions {
    pub fn view_only() -> Self {
        Self {
            can_view: true,
            can_edit: false,
            can_share: false,
        }
    }

    /// Intersect with the grantor's own bits.
    pub fn clamp_to(self, parent: SharePermissions) -> Self {
        Self {
            can_view: self.can_view && parent.can_view,
            can_edit: self.can_edit && parent.can_edit,
            can_share: self.can_share && parent.can_share,
        }
    }

    /// True when every bit set in `self` is also set in `other`.
    pub fn subset_of(&self, other: &SharePermissions) -> bool {
        (!self.can_view || other.can_view)
            && (!self.can_edit || other.can_edit)
            && (!self.can_share || other.can_share)
    }
}

/// A delegated grant of one item to one recipient.
///
/// `shared_with_user_id = None` means the recipient has not registered yet:
/// the row is a pending invitation and carries no key material
/// (`encrypted_key = None`), because there is no recipient key to wrap for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemShare {
    pub uuid: Uuid,
    pub item_uuid: Uuid,
    pub owner_id: Uuid,
    pub shared_with_user_id: Option<Uuid>,
    pub shared_with_email: String,
    pub permissions: SharePermissions,
    /// Item key re-wrapped under the recipient's key, base64. Opaque to the
    /// server; only ever returned to the recipient.
    pub encrypted_key: Option<String>,
    pub expires_at: Option<i64>,
    /// The user who issued this grant (owner, or a re-sharer).
    pub created_by: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ItemShare {
    /// A share past its expiry is inert: it stays on disk but grants nothing.
    pub fn is_active(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(ts) => ts > chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_pending_invite(&self) -> bool {
        self.shared_with_user_id.is_none()
    }
}

/// Outcome of a share creation. Callers must be able to tell an active share
/// from a sign-up invitation that is still pending.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShareOutcome {
    Created { share: ItemShare },
    InviteSent { share_uuid: Uuid, email: String },
}

//! Item Share Engine: create, re-share, permission updates, revocation and
//! recipient-scoped reads of per-item grants.
//!
//! Key material discipline: `encrypted_key` is the item key wrapped for the
//! recipient, produced client-side. It is stored verbatim and only ever
//! returned to the recipient it was wrapped for.

use crate::AppCore;
use crate::error::{AppError, Result};
use crate::models::{ClientMeta, Item, ItemShare, ShareOutcome, SharePermissions, User};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    pub recipient_user_id: Option<Uuid>,
    pub recipient_email: Option<String>,
    pub permissions: SharePermissions,
    /// Item key wrapped under the recipient's key. Required for registered
    /// recipients; absent for invites (no recipient key exists yet).
    pub encrypted_key: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePermissionsRequest {
    pub permissions: Option<SharePermissions>,
    pub expires_at: Option<i64>,
    /// `expires_at: None` means "leave unchanged"; this flag is the explicit
    /// "remove the expiry" intent. The two must not be conflated.
    #[serde(default)]
    pub clear_expiry: bool,
}

/// Item plus share as returned to a caller. The wrapped key is present only
/// when the caller is the recipient.
#[derive(Debug, Serialize)]
pub struct ShareView {
    pub item: Item,
    pub share: ItemShare,
}

enum Recipient {
    Registered(User),
    Unregistered(String),
}

fn resolve_recipient(
    core: &AppCore,
    user_id: Option<Uuid>,
    email: Option<String>,
) -> Result<Recipient> {
    match (user_id, email) {
        (Some(_), Some(_)) | (None, None) => Err(AppError::InvalidInput(
            "exactly one of recipient_user_id or recipient_email must be given".into(),
        )),
        (Some(id), None) => {
            let user = core
                .storage
                .users
                .get(&id)?
                .ok_or_else(|| AppError::NotFound("recipient user".into()))?;
            Ok(Recipient::Registered(user))
        }
        (None, Some(email)) => {
            if email.trim().is_empty() || !email.contains('@') {
                return Err(AppError::InvalidInput("malformed recipient email".into()));
            }
            match core.storage.users.find_by_email(&email)? {
                Some(user) => Ok(Recipient::Registered(user)),
                None => Ok(Recipient::Unregistered(email)),
            }
        }
    }
}

fn load_item(core: &AppCore, item_uuid: &Uuid) -> Result<Item> {
    let item = core
        .storage
        .items
        .get(item_uuid)?
        .ok_or_else(|| AppError::NotFound("item".into()))?;
    if item.is_deleted() {
        return Err(AppError::NotFound("item".into()));
    }
    Ok(item)
}

/// The acting user's own grant on the item: full bits for the owner, the
/// share's bits for an active recipient share, `Forbidden` otherwise.
fn acting_grant(core: &AppCore, item: &Item, acting_user_id: Uuid) -> Result<SharePermissions> {
    if item.owner_id == acting_user_id {
        return Ok(SharePermissions {
            can_view: true,
            can_edit: true,
            can_share: true,
        });
    }
    match core
        .storage
        .shares
        .find_active_for(&item.uuid, &acting_user_id)?
    {
        Some(share) if share.permissions.can_share => Ok(share.permissions),
        _ => Err(AppError::Forbidden(
            "caller may not share this item".into(),
        )),
    }
}

async fn send_invite_mail(core: &AppCore, email: &str, owner_id: Uuid) {
    let body = format!(
        "A vault item has been shared with you. Create an account to accept it. \
         (invited by user {owner_id})"
    );
    if let Err(err) = core
        .mailer
        .send(email, "You've been invited to a shared vault item", &body)
        .await
    {
        tracing::warn!(recipient = email, error = %err, "failed to send invite mail");
    }
}

fn persist_share(
    core: &AppCore,
    item: &Item,
    recipient: Recipient,
    perms: SharePermissions,
    encrypted_key: Option<String>,
    expires_at: Option<i64>,
    created_by: Uuid,
) -> Result<(ItemShare, bool)> {
    let now = chrono::Utc::now().timestamp_millis();
    if let Some(ts) = expires_at
        && ts <= now
    {
        return Err(AppError::InvalidInput("expiry must be in the future".into()));
    }

    let (user_id, email, key, pending) = match recipient {
        Recipient::Registered(user) => {
            let key = encrypted_key.ok_or_else(|| {
                AppError::InvalidInput(
                    "encrypted_key is required for a registered recipient".into(),
                )
            })?;
            (Some(user.id), user.email, Some(key), false)
        }
        // No key material can exist for an unregistered identity; persist a
        // keyless pending row and invite the address to sign up.
        Recipient::Unregistered(email) => (None, email, None, true),
    };

    let share = ItemShare {
        uuid: Uuid::new_v4(),
        item_uuid: item.uuid,
        owner_id: item.owner_id,
        shared_with_user_id: user_id,
        shared_with_email: email,
        permissions: perms,
        encrypted_key: key,
        expires_at,
        created_by,
        created_at: now,
        updated_at: now,
    };
    core.storage.shares.insert(&share)?;
    Ok((share, pending))
}

pub async fn create(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    item_uuid: Uuid,
    req: CreateShareRequest,
) -> Result<ShareOutcome> {
    let item = load_item(core, &item_uuid)?;
    let grant = acting_grant(core, &item, acting_user_id)?;
    let perms = req.permissions.clamp_to(grant);

    let recipient = resolve_recipient(core, req.recipient_user_id, req.recipient_email)?;
    let (share, pending) = persist_share(
        core,
        &item,
        recipient,
        perms,
        req.encrypted_key,
        req.expires_at,
        acting_user_id,
    )?;

    audit_share(core, acting_user_id, meta, &item, &share, "item_share.create");

    if pending {
        send_invite_mail(core, &share.shared_with_email, item.owner_id).await;
        Ok(ShareOutcome::InviteSent {
            share_uuid: share.uuid,
            email: share.shared_with_email,
        })
    } else {
        Ok(ShareOutcome::Created { share })
    }
}

/// Re-wrap and delegate an existing grant. The child's permission bits are
/// clamped to the acting user's own bits on the parent share.
pub async fn reshare(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    parent_share_uuid: Uuid,
    req: CreateShareRequest,
) -> Result<ShareOutcome> {
    let parent = core
        .storage
        .shares
        .get(&parent_share_uuid)?
        .ok_or_else(|| AppError::NotFound("share".into()))?;

    if parent.shared_with_user_id != Some(acting_user_id) {
        return Err(AppError::Forbidden(
            "only the share's recipient may re-share it".into(),
        ));
    }
    if !parent.is_active() || !parent.permissions.can_share {
        return Err(AppError::Forbidden(
            "share does not grant re-sharing".into(),
        ));
    }

    let item = load_item(core, &parent.item_uuid)?;
    let perms = req.permissions.clamp_to(parent.permissions);

    let recipient = resolve_recipient(core, req.recipient_user_id, req.recipient_email)?;
    let (share, pending) = persist_share(
        core,
        &item,
        recipient,
        perms,
        req.encrypted_key,
        req.expires_at,
        acting_user_id,
    )?;

    audit_share(core, acting_user_id, meta, &item, &share, "item_share.reshare");

    if pending {
        send_invite_mail(core, &share.shared_with_email, item.owner_id).await;
        Ok(ShareOutcome::InviteSent {
            share_uuid: share.uuid,
            email: share.shared_with_email,
        })
    } else {
        Ok(ShareOutcome::Created { share })
    }
}

/// Owner-only. `clear_expiry` removes the expiry; `expires_at: None` without
/// the flag leaves it as is.
pub fn update_permissions(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    share_uuid: Uuid,
    req: UpdatePermissionsRequest,
) -> Result<ItemShare> {
    let mut share = core
        .storage
        .shares
        .get(&share_uuid)?
        .ok_or_else(|| AppError::NotFound("share".into()))?;

    if share.owner_id != acting_user_id {
        return Err(AppError::Forbidden(
            "only the item owner may edit share permissions".into(),
        ));
    }

    if let Some(perms) = req.permissions {
        share.permissions = perms;
    }
    if req.clear_expiry {
        share.expires_at = None;
    } else if let Some(ts) = req.expires_at {
        if ts <= chrono::Utc::now().timestamp_millis() {
            return Err(AppError::InvalidInput("expiry must be in the future".into()));
        }
        share.expires_at = Some(ts);
    }
    share.updated_at = chrono::Utc::now().timestamp_millis();
    core.storage.shares.insert(&share)?;

    audit_share_id(core, acting_user_id, meta, &share, "item_share.update_permissions");
    Ok(share)
}

/// Owner-only. Revoking an absent (or already-revoked) share is `NotFound`,
/// never a crash.
pub fn revoke(
    core: &AppCore,
    acting_user_id: Uuid,
    meta: &ClientMeta,
    share_uuid: Uuid,
) -> Result<()> {
    let share = core
        .storage
        .shares
        .get(&share_uuid)?
        .ok_or_else(|| AppError::NotFound("share".into()))?;

    if share.owner_id != acting_user_id {
        return Err(AppError::Forbidden(
            "only the item owner may revoke a share".into(),
        ));
    }

    if !core.storage.shares.remove(&share_uuid)? {
        return Err(AppError::NotFound("share".into()));
    }

    audit_share_id(core, acting_user_id, meta, &share, "item_share.revoke");
    Ok(())
}

/// Item plus share for the owner or the recipient. The wrapped key is a
/// confidentiality boundary: it is included only when the caller is the
/// recipient it was wrapped for — never for the owner browsing outgoing
/// shares, and never for anyone else.
pub fn get(core: &AppCore, acting_user_id: Uuid, share_uuid: Uuid) -> Result<ShareView> {
    let mut share = core
        .storage
        .shares
        .get(&share_uuid)?
        .ok_or_else(|| AppError::NotFound("share".into()))?;

    let is_recipient = share.shared_with_user_id == Some(acting_user_id);
    let is_owner = share.owner_id == acting_user_id;
    if !is_recipient && !is_owner {
        return Err(AppError::Forbidden(
            "caller is neither owner nor recipient of this share".into(),
        ));
    }

    if !is_recipient {
        share.encrypted_key = None;
    }

    let item = load_item(core, &share.item_uuid)?;
    Ok(ShareView { item, share })
}

/// Owner-only listing of an item's outgoing shares, pending invites
/// included. Wrapped keys are stripped: the owner holds their own copy of
/// the item key and never sees a recipient's.
pub fn list_for_item(
    core: &AppCore,
    acting_user_id: Uuid,
    item_uuid: Uuid,
) -> Result<Vec<ItemShare>> {
    let item = load_item(core, &item_uuid)?;
    if item.owner_id != acting_user_id {
        return Err(AppError::Forbidden(
            "only the item owner may list its shares".into(),
        ));
    }

    let mut shares = core.storage.shares.list_for_item(&item_uuid)?;
    for share in &mut shares {
        share.encrypted_key = None;
    }
    Ok(shares)
}

/// Everything shared *with* the caller. Keys stay in: each one is wrapped
/// for the caller.
pub fn list_incoming(core: &AppCore, acting_user_id: Uuid) -> Result<Vec<ItemShare>> {
    Ok(core.storage.shares.list_for_recipient(&acting_user_id)?)
}

fn audit_share(
    core: &AppCore,
    actor: Uuid,
    meta: &ClientMeta,
    item: &Item,
    share: &ItemShare,
    activity: &str,
) {
    let mut details = HashMap::new();
    details.insert("item_uuid".into(), item.uuid.to_string());
    details.insert("share_uuid".into(), share.uuid.to_string());
    details.insert("recipient_email".into(), share.shared_with_email.clone());
    super::audit::log_custom_activity(core, actor, item.org_id, activity, meta, details);
}

fn audit_share_id(core: &AppCore, actor: Uuid, meta: &ClientMeta, share: &ItemShare, activity: &str) {
    let mut details = HashMap::new();
    details.insert("item_uuid".into(), share.item_uuid.to_string());
    details.insert("share_uuid".into(), share.uuid.to_string());
    super::audit::log_custom_activity(core, actor, None, activity, meta, details);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemMetadata, User};
    use crate::services::test_support::test_core;

    fn seed_item(core: &AppCore, owner: Uuid) -> Item {
        let item = Item::new(
            owner,
            None,
            "ciphertext".into(),
            "wrapped-owner-key".into(),
            ItemMetadata::default(),
        );
        core.storage.items.insert(&item).unwrap();
        item
    }

    fn seed_user(core: &AppCore, email: &str) -> User {
        let user = User::new(email.into());
        core.storage.users.insert(&user).unwrap();
        user
    }

    fn full_perms() -> SharePermissions {
        SharePermissions {
            can_view: true,
            can_edit: true,
            can_share: true,
        }
    }

    #[tokio::test]
    async fn share_with_registered_user_is_created() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let recipient = seed_user(&core, "u2@example.com");

        let outcome = create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: None,
                recipient_email: Some("u2@example.com".into()),
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped-for-u2".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap();

        match outcome {
            ShareOutcome::Created { share } => {
                assert_eq!(share.shared_with_user_id, Some(recipient.id));
                assert_eq!(share.encrypted_key.as_deref(), Some("wrapped-for-u2"));
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregistered_email_yields_invite_and_no_usable_key() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);

        let outcome = create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: None,
                recipient_email: Some("stranger@example.com".into()),
                permissions: SharePermissions::view_only(),
                encrypted_key: None,
                expires_at: None,
            },
        )
        .await
        .unwrap();

        let share_uuid = match outcome {
            ShareOutcome::InviteSent { share_uuid, email } => {
                assert_eq!(email, "stranger@example.com");
                share_uuid
            }
            other => panic!("expected InviteSent, got {other:?}"),
        };

        let stored = core.storage.shares.get(&share_uuid).unwrap().unwrap();
        assert!(stored.is_pending_invite());
        assert!(stored.encrypted_key.is_none());
    }

    #[tokio::test]
    async fn neither_user_nor_email_is_invalid_input() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);

        let err = create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: None,
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: None,
                expires_at: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn reshare_clamps_permissions_to_parent() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let middle = seed_user(&core, "middle@example.com");
        let leaf = seed_user(&core, "leaf@example.com");

        // Owner grants view+share, no edit.
        let parent = match create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(middle.id),
                recipient_email: None,
                permissions: SharePermissions {
                    can_view: true,
                    can_edit: false,
                    can_share: true,
                },
                encrypted_key: Some("wrapped-for-middle".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap()
        {
            ShareOutcome::Created { share } => share,
            other => panic!("expected Created, got {other:?}"),
        };

        // Middle asks for everything; edit must be clamped away.
        let child = match reshare(
            &core,
            middle.id,
            &ClientMeta::default(),
            parent.uuid,
            CreateShareRequest {
                recipient_user_id: Some(leaf.id),
                recipient_email: None,
                permissions: full_perms(),
                encrypted_key: Some("wrapped-for-leaf".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap()
        {
            ShareOutcome::Created { share } => share,
            other => panic!("expected Created, got {other:?}"),
        };

        assert!(child.permissions.subset_of(&parent.permissions));
        assert!(!child.permissions.can_edit);
    }

    #[tokio::test]
    async fn reshare_without_can_share_is_forbidden() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let middle = seed_user(&core, "middle@example.com");

        let parent = match create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(middle.id),
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap()
        {
            ShareOutcome::Created { share } => share,
            other => panic!("expected Created, got {other:?}"),
        };

        let err = reshare(
            &core,
            middle.id,
            &ClientMeta::default(),
            parent.uuid,
            CreateShareRequest {
                recipient_user_id: None,
                recipient_email: Some("other@example.com".into()),
                permissions: SharePermissions::view_only(),
                encrypted_key: None,
                expires_at: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn owner_never_sees_the_wrapped_key() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let recipient = seed_user(&core, "u2@example.com");

        let share = match create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(recipient.id),
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped-for-u2".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap()
        {
            ShareOutcome::Created { share } => share,
            other => panic!("expected Created, got {other:?}"),
        };

        let owner_view = get(&core, owner, share.uuid).unwrap();
        assert!(owner_view.share.encrypted_key.is_none());

        let recipient_view = get(&core, recipient.id, share.uuid).unwrap();
        assert_eq!(
            recipient_view.share.encrypted_key.as_deref(),
            Some("wrapped-for-u2")
        );

        let err = get(&core, Uuid::new_v4(), share.uuid).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn revoke_is_owner_only_and_not_found_when_absent() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let recipient = seed_user(&core, "u2@example.com");

        let share = match create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(recipient.id),
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap()
        {
            ShareOutcome::Created { share } => share,
            other => panic!("expected Created, got {other:?}"),
        };

        let err = revoke(&core, recipient.id, &ClientMeta::default(), share.uuid).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        revoke(&core, owner, &ClientMeta::default(), share.uuid).unwrap();
        // Second revoke: the share is gone.
        let err = revoke(&core, owner, &ClientMeta::default(), share.uuid).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn outgoing_listing_is_owner_only_and_keyless() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let recipient = seed_user(&core, "u2@example.com");

        create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(recipient.id),
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped-for-u2".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap();
        // A pending invite shows up in the listing too.
        create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: None,
                recipient_email: Some("stranger@example.com".into()),
                permissions: SharePermissions::view_only(),
                encrypted_key: None,
                expires_at: None,
            },
        )
        .await
        .unwrap();

        let listed = list_for_item(&core, owner, item.uuid).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.encrypted_key.is_none()));

        let err = list_for_item(&core, recipient.id, item.uuid).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn incoming_listing_keeps_the_callers_keys() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let recipient = seed_user(&core, "u2@example.com");

        create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(recipient.id),
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped-for-u2".into()),
                expires_at: None,
            },
        )
        .await
        .unwrap();

        let incoming = list_incoming(&core, recipient.id).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].encrypted_key.as_deref(), Some("wrapped-for-u2"));

        assert!(list_incoming(&core, owner).unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_expiry_is_distinct_from_unchanged() {
        let (core, _tmp) = test_core();
        let owner = Uuid::new_v4();
        let item = seed_item(&core, owner);
        let recipient = seed_user(&core, "u2@example.com");
        let future = chrono::Utc::now().timestamp_millis() + 86_400_000;

        let share = match create(
            &core,
            owner,
            &ClientMeta::default(),
            item.uuid,
            CreateShareRequest {
                recipient_user_id: Some(recipient.id),
                recipient_email: None,
                permissions: SharePermissions::view_only(),
                encrypted_key: Some("wrapped".into()),
                expires_at: Some(future),
            },
        )
        .await
        .unwrap()
        {
            ShareOutcome::Created { share } => share,
            other => panic!("expected Created, got {other:?}"),
        };

        // None without the flag: expiry unchanged.
        let updated = update_permissions(
            &core,
            owner,
            &ClientMeta::default(),
            share.uuid,
            UpdatePermissionsRequest {
                permissions: None,
                expires_at: None,
                clear_expiry: false,
            },
        )
        .unwrap();
        assert_eq!(updated.expires_at, Some(future));

        // The explicit flag clears it.
        let updated = update_permissions(
            &core,
            owner,
            &ClientMeta::default(),
            share.uuid,
            UpdatePermissionsRequest {
                permissions: None,
                expires_at: None,
                clear_expiry: true,
            },
        )
        .unwrap();
        assert_eq!(updated.expires_at, None);
    }
}

//! Minimal vault-item surface: enough CRUD for the share engine's
//! share-derived edit rights to be exercised end to end.

use crate::AppCore;
use crate::error::{AppError, Result};
use crate::models::{Item, ItemMetadata};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub org_id: Option<Uuid>,
    pub data: String,
    pub item_key_enc: String,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub data: String,
    #[serde(default)]
    pub metadata: Option<ItemMetadata>,
}

pub fn create_item(core: &AppCore, acting_user_id: Uuid, req: CreateItemRequest) -> Result<Item> {
    if req.data.is_empty() || req.item_key_enc.is_empty() {
        return Err(AppError::InvalidInput(
            "data and item_key_enc are required".into(),
        ));
    }
    let item = Item::new(
        acting_user_id,
        req.org_id,
        req.data,
        req.item_key_enc,
        req.metadata,
    );
    core.storage.items.insert(&item)?;
    Ok(item)
}

pub fn get_item(core: &AppCore, acting_user_id: Uuid, item_uuid: Uuid) -> Result<Item> {
    let item = core
        .storage
        .items
        .get(&item_uuid)?
        .filter(|i| !i.is_deleted())
        .ok_or_else(|| AppError::NotFound("item".into()))?;

    if item.owner_id == acting_user_id {
        return Ok(item);
    }
    match core
        .storage
        .shares
        .find_active_for(&item_uuid, &acting_user_id)?
    {
        Some(share) if share.permissions.can_view => Ok(item),
        _ => Err(AppError::Forbidden("caller may not view this item".into())),
    }
}

/// Mutable by the owner, or by a recipient whose active share carries
/// `can_edit`.
pub fn update_item(
    core: &AppCore,
    acting_user_id: Uuid,
    item_uuid: Uuid,
    req: UpdateItemRequest,
) -> Result<Item> {
    let mut item = core
        .storage
        .items
        .get(&item_uuid)?
        .filter(|i| !i.is_deleted())
        .ok_or_else(|| AppError::NotFound("item".into()))?;

    if item.owner_id != acting_user_id {
        let share = core
            .storage
            .shares
            .find_active_for(&item_uuid, &acting_user_id)?;
        match share {
            Some(share) if share.permissions.can_edit => {}
            _ => {
                return Err(AppError::Forbidden(
                    "caller may not edit this item".into(),
                ));
            }
        }
    }

    item.data = req.data;
    if let Some(metadata) = req.metadata {
        item.metadata = metadata;
    }
    item.updated_at = chrono::Utc::now().timestamp_millis();
    core.storage.items.update(&item)?;
    Ok(item)
}

/// Owner-only soft delete.
pub fn delete_item(core: &AppCore, acting_user_id: Uuid, item_uuid: Uuid) -> Result<()> {
    let item = core
        .storage
        .items
        .get(&item_uuid)?
        .filter(|i| !i.is_deleted())
        .ok_or_else(|| AppError::NotFound("item".into()))?;

    if item.owner_id != acting_user_id {
        return Err(AppError::Forbidden(
            "only the owner may delete an item".into(),
        ));
    }
    core.storage.items.soft_delete(&item_uuid)?;
    Ok(())
}

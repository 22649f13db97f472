use crate::storage::encryption::EncryptedFields;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single vault entry. `data` and `item_key_enc` are ciphertext produced by
/// the client; the server stores and relays them without ever holding a key
/// that could open them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub uuid: Uuid,
    pub owner_id: Uuid,
    pub org_id: Option<Uuid>,
    /// Client-encrypted payload, base64.
    pub data: String,
    /// The item's symmetric key wrapped under the owner's key, base64.
    pub item_key_enc: String,
    pub metadata: ItemMetadata,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// Structured hints alongside the opaque blob. The sensitive members are
/// sealed at rest by the field encryptor before they hit the database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Plaintext hint used for icon lookup and search.
    pub domain: Option<String>,
    /// Sealed at rest.
    pub card_number: Option<String>,
    /// Sealed at rest.
    pub server_credentials: Option<String>,
}

impl EncryptedFields for ItemMetadata {
    fn encrypted_fields(&mut self) -> Vec<&mut String> {
        let mut fields = Vec::new();
        if let Some(card) = self.card_number.as_mut() {
            fields.push(card);
        }
        if let Some(creds) = self.server_credentials.as_mut() {
            fields.push(creds);
        }
        fields
    }
}

impl Item {
    pub fn new(
        owner_id: Uuid,
        org_id: Option<Uuid>,
        data: String,
        item_key_enc: String,
        metadata: ItemMetadata,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            uuid: Uuid::new_v4(),
            owner_id,
            org_id,
            data,
            item_key_enc,
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

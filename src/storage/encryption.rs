//! At-rest sealing of sensitive structured fields.
//!
//! Vault payloads (`data`, `item_key_enc`, `encrypted_key`) are client-side
//! ciphertext and pass through here untouched. The only server-side crypto is
//! this field encryptor, applied to designated plaintext columns (card
//! numbers, server credentials) before they hit disk.
//!
//! Wire format: base64(nonce || GCM ciphertext), key = MD5(passphrase) as
//! raw 16 bytes (AES-128). The derivation is weak but byte-compatible with
//! rows encrypted by earlier deployments; changing it would orphan them.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use rand::RngCore;

const NONCE_SIZE: usize = 12;

/// Models expose their sealable members through explicit accessors instead
/// of tag-driven reflection.
pub trait EncryptedFields {
    fn encrypted_fields(&mut self) -> Vec<&mut String>;
}

pub struct FieldEncryptor {
    cipher: Aes128Gcm,
}

impl FieldEncryptor {
    pub fn new(passphrase: &str) -> Self {
        let key = Md5::digest(passphrase.as_bytes());
        let cipher = Aes128Gcm::new_from_slice(&key).expect("MD5 digest is 16 bytes");
        Self { cipher }
    }

    pub fn seal_str(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|err| anyhow::anyhow!("failed to seal field: {:?}", err))?;
        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.append(&mut ciphertext);
        Ok(STANDARD.encode(output))
    }

    pub fn open_str(&self, sealed: &str) -> Result<String> {
        let raw = STANDARD.decode(sealed)?;
        if raw.len() < NONCE_SIZE {
            return Err(anyhow::anyhow!("sealed field is too short"));
        }
        let (nonce_bytes, payload) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, payload)
            .map_err(|err| anyhow::anyhow!("failed to open sealed field: {:?}", err))?;
        Ok(String::from_utf8(plaintext)?)
    }

    /// Seal every designated field of a model in place.
    pub fn seal_fields<T: EncryptedFields>(&self, model: &mut T) -> Result<()> {
        for field in model.encrypted_fields() {
            *field = self.seal_str(field)?;
        }
        Ok(())
    }

    /// Open every designated field of a model in place.
    pub fn open_fields<T: EncryptedFields>(&self, model: &mut T) -> Result<()> {
        for field in model.encrypted_fields() {
            *field = self.open_str(field)?;
        }
        Ok(())
    }
}

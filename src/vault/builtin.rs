use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use super::DecryptionError;

/// Layout version written as the first byte of every sealed blob.
const ENVELOPE_V1: u8 = 1;
const NONCE_LEN: usize = 12;
/// 32-byte DEK plus the 16-byte GCM tag.
const SEALED_DEK_LEN: usize = 48;
const HEADER_LEN: usize = 1 + NONCE_LEN + SEALED_DEK_LEN + NONCE_LEN;

/// Envelope encryption for credential blobs.
///
/// Each call draws a fresh data-encryption key (DEK), encrypts the JSON form of
/// the credentials with it, then encrypts the DEK with the process-wide
/// key-encryption key (KEK). Both layers are AES-256-GCM. The sealed output is
/// `base64(version | dek_nonce | sealed_dek | data_nonce | ciphertext)`.
pub struct CredentialVault {
    kek: Zeroizing<[u8; 32]>,
}

impl CredentialVault {
    pub fn new(master_key_hex: &str) -> anyhow::Result<Self> {
        let kek = parse_master_key(master_key_hex)?;
        Ok(Self {
            kek: Zeroizing::new(kek),
        })
    }

    /// Serialize and seal a credential value into an opaque string.
    pub fn encrypt<T: Serialize + ?Sized>(&self, credentials: &T) -> anyhow::Result<String> {
        let plaintext = Zeroizing::new(serde_json::to_vec(credentials)?);

        let mut dek = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *dek);

        let data_cipher = Aes256Gcm::new_from_slice(&*dek)
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let data_nonce = generate_nonce();
        let ciphertext = data_cipher
            .encrypt(Nonce::from_slice(&data_nonce), plaintext.as_slice())
            .map_err(|e| anyhow::anyhow!("credential encryption failed: {}", e))?;

        let kek_cipher = Aes256Gcm::new_from_slice(&*self.kek)
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let dek_nonce = generate_nonce();
        let sealed_dek = kek_cipher
            .encrypt(Nonce::from_slice(&dek_nonce), &dek[..])
            .map_err(|e| anyhow::anyhow!("DEK encryption failed: {}", e))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.push(ENVELOPE_V1);
        out.extend_from_slice(&dek_nonce);
        out.extend_from_slice(&sealed_dek);
        out.extend_from_slice(&data_nonce);
        out.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(out))
    }

    /// Open a sealed blob and deserialize it.
    pub fn decrypt<T: DeserializeOwned>(&self, sealed: &str) -> Result<T, DecryptionError> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|_| DecryptionError::Encoding)?;
        if raw.len() <= HEADER_LEN {
            return Err(DecryptionError::Truncated);
        }
        if raw[0] != ENVELOPE_V1 {
            return Err(DecryptionError::UnsupportedVersion(raw[0]));
        }

        let (dek_nonce, rest) = raw[1..].split_at(NONCE_LEN);
        let (sealed_dek, rest) = rest.split_at(SEALED_DEK_LEN);
        let (data_nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let kek_cipher =
            Aes256Gcm::new_from_slice(&*self.kek).map_err(|_| DecryptionError::Authentication)?;
        let dek_bytes = Zeroizing::new(
            kek_cipher
                .decrypt(Nonce::from_slice(dek_nonce), sealed_dek)
                .map_err(|_| DecryptionError::Authentication)?,
        );

        let data_cipher =
            Aes256Gcm::new_from_slice(&dek_bytes).map_err(|_| DecryptionError::Authentication)?;
        let plaintext = Zeroizing::new(
            data_cipher
                .decrypt(Nonce::from_slice(data_nonce), ciphertext)
                .map_err(|_| DecryptionError::Authentication)?,
        );

        serde_json::from_slice(&plaintext).map_err(DecryptionError::Payload)
    }
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn parse_master_key(hex: &str) -> anyhow::Result<[u8; 32]> {
    if hex.len() != 64 {
        anyhow::bail!(
            "CALLHUB_MASTER_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        );
    }
    let bytes = hex::decode(hex)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Fresh random master key, hex encoded.
pub fn generate_master_key() -> String {
    let mut key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut *key);
    hex::encode(*key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const OTHER_KEY: &str = "ff0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_encryption_roundtrip() {
        let vault = CredentialVault::new(KEY).unwrap();
        let creds = json!({
            "client_id": "abc.apps.example.com",
            "client_secret": "s3cr3t",
            "expires_in": 3599,
            "scopes": ["calendar", "events"],
            "nested": {"refresh_token": null, "ratio": 0.25, "ok": true},
            "unicode": "Zürich 東京"
        });

        let sealed = vault.encrypt(&creds).unwrap();
        let opened: Value = vault.decrypt(&sealed).unwrap();
        assert_eq!(opened, creds);
    }

    #[test]
    fn test_empty_map_roundtrip() {
        let vault = CredentialVault::new(KEY).unwrap();
        let sealed = vault.encrypt(&json!({})).unwrap();
        let opened: Value = vault.decrypt(&sealed).unwrap();
        assert_eq!(opened, json!({}));
    }

    #[test]
    fn test_sealed_output_does_not_leak_plaintext() {
        let vault = CredentialVault::new(KEY).unwrap();
        let a = vault.encrypt(&json!({"token": "plain-token"})).unwrap();
        let b = vault.encrypt(&json!({"token": "plain-token"})).unwrap();
        assert_ne!(a, b, "fresh nonces and DEK per call");
        assert!(!a.contains("plain-token"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = CredentialVault::new(KEY)
            .unwrap()
            .encrypt(&json!({"k": "v"}))
            .unwrap();
        let err = CredentialVault::new(OTHER_KEY)
            .unwrap()
            .decrypt::<Value>(&sealed)
            .unwrap_err();
        assert!(matches!(err, DecryptionError::Authentication));
    }

    #[test]
    fn test_corrupted_input_fails() {
        let vault = CredentialVault::new(KEY).unwrap();
        let sealed = vault.encrypt(&json!({"k": "v"})).unwrap();

        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);

        assert!(matches!(
            vault.decrypt::<Value>(&tampered),
            Err(DecryptionError::Authentication)
        ));
        assert!(matches!(
            vault.decrypt::<Value>("not base64!"),
            Err(DecryptionError::Encoding)
        ));
        assert!(matches!(
            vault.decrypt::<Value>(&STANDARD.encode([1u8; 10])),
            Err(DecryptionError::Truncated)
        ));
    }

    #[test]
    fn test_master_key_validation() {
        assert!(parse_master_key("abcd").is_err());
        assert!(parse_master_key(&"zz".repeat(32)).is_err());
        let generated = generate_master_key();
        assert_eq!(generated.len(), 64);
        assert!(CredentialVault::new(&generated).is_ok());
    }
}

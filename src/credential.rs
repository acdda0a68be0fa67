//! Transfer credential issuance and validation
//!
//! Every transfer carries three independent proofs of redemption rights:
//!
//! - a sealed payload (machine-scannable QR content) carrying the full
//!   transfer context, encrypted with AES-256-GCM under a process-wide key
//! - a human-typeable display code (`SWIPE-XXXX-XXXX-XXXX`) as a backup
//!   path for when scanning fails
//! - a SHA-256 security hash, an integrity value usable without decryption
//!
//! The sealed payload wire format is `nonce || ciphertext`, base64-encoded.
//! GCM authentication makes the ciphertext tamper-evident on its own; the
//! display code is only a lookup key, never proof by itself.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::core_types::{SwipeCount, UserId};

/// AES-256 key length in bytes.
pub const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// Display-code alphabet: 32 unambiguous characters. 0/O and 1/I are
/// excluded because they are routinely confused when typed from a receipt.
const DISPLAY_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const DISPLAY_PREFIX: &str = "SWIPE";
const DISPLAY_GROUPS: usize = 3;
const DISPLAY_GROUP_LEN: usize = 4;

/// Credential generation failure. Underlying crypto primitive failures are
/// fatal and unretryable; they are surfaced generically to end users.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("credential sealing failed")]
    SealFailed,

    #[error("invalid credential key length: expected {KEY_LENGTH} bytes")]
    InvalidKeyLength,
}

/// Decrypted credential contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub id: Uuid,
    pub giver_id: UserId,
    pub requester_id: UserId,
    pub quantity: SwipeCount,
    pub location: String,
    pub issued_at_ms: i64,
    /// Random salt so two credentials for identical contexts never share
    /// plaintext.
    pub nonce: String,
}

/// Context captured at issuance time.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    pub giver_id: UserId,
    pub requester_id: UserId,
    pub quantity: SwipeCount,
    pub location: String,
    pub issued_at_ms: i64,
}

/// A freshly issued credential bundle.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Internal identifier embedded in the sealed payload; the redemption
    /// lookup key.
    pub credential_id: Uuid,
    /// Base64(`nonce || ciphertext`) of the JSON payload.
    pub encrypted: String,
    /// Human-readable backup code, `SWIPE-XXXX-XXXX-XXXX`.
    pub display_code: String,
    /// SHA-256 over `{id}-{giver}-{requester}-{issued_at_ms}`, hex-encoded.
    pub security_hash: String,
}

/// Issues and validates transfer credentials under a configured key.
///
/// The key is externally supplied (see `AppConfig::credential_key`); there
/// is no built-in default.
pub struct CredentialIssuer {
    cipher: Aes256Gcm,
}

impl CredentialIssuer {
    pub fn new(key: &[u8; KEY_LENGTH]) -> Self {
        // new_from_slice only fails on length mismatch, which the array
        // type already rules out.
        Self {
            cipher: Aes256Gcm::new_from_slice(key).expect("key length checked by type"),
        }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, GenerationError> {
        let key: &[u8; KEY_LENGTH] = key
            .try_into()
            .map_err(|_| GenerationError::InvalidKeyLength)?;
        Ok(Self::new(key))
    }

    /// Issue a credential for one transfer.
    pub fn issue(&self, ctx: &CredentialContext) -> Result<IssuedCredential, GenerationError> {
        let credential_id = Uuid::new_v4();

        let payload = CredentialPayload {
            id: credential_id,
            giver_id: ctx.giver_id.clone(),
            requester_id: ctx.requester_id.clone(),
            quantity: ctx.quantity,
            location: ctx.location.clone(),
            issued_at_ms: ctx.issued_at_ms,
            nonce: random_salt(),
        };

        let plaintext =
            serde_json::to_vec(&payload).map_err(|_| GenerationError::SealFailed)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| GenerationError::SealFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        let hash_input = format!(
            "{}-{}-{}-{}",
            credential_id, ctx.giver_id, ctx.requester_id, ctx.issued_at_ms
        );

        Ok(IssuedCredential {
            credential_id,
            encrypted: BASE64.encode(sealed),
            display_code: generate_display_code(),
            security_hash: security_hash(&hash_input),
        })
    }

    /// Decrypt and validate a scanned credential.
    ///
    /// Invalid credentials are an expected input, not an exceptional one:
    /// bad base64, a wrong key, truncated or tampered ciphertext, and
    /// malformed JSON all return `None`.
    pub fn validate(&self, encrypted: &str) -> Option<CredentialPayload> {
        let sealed = BASE64.decode(encrypted).ok()?;
        if sealed.len() < NONCE_LENGTH {
            return None;
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .ok()?;

        let payload: CredentialPayload = serde_json::from_slice(&plaintext).ok()?;

        if payload.id.is_nil()
            || payload.giver_id.is_empty()
            || payload.requester_id.is_empty()
        {
            return None;
        }

        Some(payload)
    }
}

/// Generate a fresh display code, `SWIPE-` plus three hyphen-separated
/// groups of four characters from the unambiguous alphabet.
pub fn generate_display_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(20);
    code.push_str(DISPLAY_PREFIX);

    for _ in 0..DISPLAY_GROUPS {
        code.push('-');
        for _ in 0..DISPLAY_GROUP_LEN {
            let idx = rng.gen_range(0..DISPLAY_ALPHABET.len());
            code.push(DISPLAY_ALPHABET[idx] as char);
        }
    }

    code
}

/// Check the `SWIPE-XXXX-XXXX-XXXX` shape against the unambiguous alphabet.
pub fn is_valid_display_code(code: &str) -> bool {
    let parts: Vec<&str> = code.split('-').collect();

    parts.len() == DISPLAY_GROUPS + 1
        && parts[0] == DISPLAY_PREFIX
        && parts[1..].iter().all(|group| {
            group.len() == DISPLAY_GROUP_LEN
                && group.bytes().all(|b| DISPLAY_ALPHABET.contains(&b))
        })
}

/// SHA-256 digest, hex-encoded.
pub fn security_hash(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Recompute and compare a security hash.
pub fn verify_security_hash(data: &str, hash: &str) -> bool {
    security_hash(data) == hash
}

fn random_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

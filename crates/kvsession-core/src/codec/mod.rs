//! Cookie codec: authenticates (and optionally encrypts) a session identifier
//! into an opaque, URL-safe cookie value.
//!
//! Wire format (before the outer base64url):
//!
//! ```text
//! <issued unix secs> "|" base64url(payload) "|" hmac-sha256
//! ```
//!
//! `payload` is the raw identifier, or `nonce || AES-256-GCM(identifier)` when
//! the key pair carries a block key. The MAC covers the cookie name, so a value
//! issued for one cookie cannot be replayed under another name.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::CookieError;
use crate::util::unix_timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Default upper bound for an encoded cookie value, in bytes.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// Default expiry bound in seconds (30 days).
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"kvsession-cookie-block-key";

/// An (authentication key, encryption key) secret pair.
///
/// The block key is optional: without one, cookie values are signed but
/// not encrypted.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    hash_key: Vec<u8>,
    block_key: Option<Vec<u8>>,
}

impl KeyPair {
    pub fn new(hash_key: impl Into<Vec<u8>>, block_key: Option<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            block_key: block_key.filter(|k| !k.is_empty()),
        }
    }

    /// Build key pairs from a flat list, consumed two at a time.
    ///
    /// An odd trailing key becomes a hash-only pair, as does any pair whose
    /// second key is empty.
    pub fn from_pairs<K: AsRef<[u8]>>(keys: &[K]) -> Vec<KeyPair> {
        keys.chunks(2)
            .map(|chunk| {
                let block = chunk.get(1).map(|k| k.as_ref().to_vec());
                KeyPair::new(chunk[0].as_ref().to_vec(), block)
            })
            .collect()
    }

    /// Generate a fresh pair: 64-byte hash key, 32-byte block key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut hash_key = vec![0u8; 64];
        let mut block_key = vec![0u8; 32];
        rng.fill_bytes(&mut hash_key);
        rng.fill_bytes(&mut block_key);
        Self::new(hash_key, Some(block_key))
    }

    pub fn hash_key(&self) -> &[u8] {
        &self.hash_key
    }

    pub fn block_key(&self) -> Option<&[u8]> {
        self.block_key.as_deref()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash_key", &"<redacted>")
            .field("encrypted", &self.block_key.is_some())
            .finish()
    }
}

/// Signing and encryption state for one key pair.
struct Signer {
    hash_key: Vec<u8>,
    cipher: Option<Aes256Gcm>,
}

impl Signer {
    fn new(pair: &KeyPair) -> Result<Self, CookieError> {
        if pair.hash_key.is_empty() {
            return Err(CookieError::InvalidKey("hash key must not be empty".into()));
        }
        let cipher = match pair.block_key() {
            Some(block_key) => Some(derive_cipher(block_key)?),
            None => None,
        };
        Ok(Self {
            hash_key: pair.hash_key.clone(),
            cipher,
        })
    }

    fn mac(&self, name: &str, body: &[u8]) -> Result<HmacSha256, CookieError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|e| CookieError::InvalidKey(e.to_string()))?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(body);
        Ok(mac)
    }

    fn encode(&self, name: &str, value: &str, now: i64) -> Result<String, CookieError> {
        let payload = match &self.cipher {
            Some(cipher) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(
                        &nonce,
                        Payload {
                            msg: value.as_bytes(),
                            aad: name.as_bytes(),
                        },
                    )
                    .map_err(|e| CookieError::Encryption(e.to_string()))?;
                let mut sealed = nonce.to_vec();
                sealed.extend_from_slice(&ciphertext);
                sealed
            }
            None => value.as_bytes().to_vec(),
        };

        let body = format!("{}|{}", now, URL_SAFE_NO_PAD.encode(&payload));
        let tag = self.mac(name, body.as_bytes())?.finalize().into_bytes();

        let mut wire = body.into_bytes();
        wire.push(b'|');
        wire.extend_from_slice(&tag);
        Ok(URL_SAFE_NO_PAD.encode(wire))
    }

    fn decode(&self, name: &str, value: &str, now: i64, max_age: i64) -> Result<String, CookieError> {
        let wire = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| CookieError::Authentication)?;

        let mut parts = wire.splitn(3, |b| *b == b'|');
        let (Some(issued), Some(payload), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CookieError::Authentication);
        };

        // Constant-time tag comparison.
        let body = &wire[..issued.len() + 1 + payload.len()];
        self.mac(name, body)?
            .verify_slice(tag)
            .map_err(|_| CookieError::Authentication)?;

        let issued: i64 = std::str::from_utf8(issued)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CookieError::Authentication)?;
        if max_age > 0 && issued.saturating_add(max_age) < now {
            return Err(CookieError::Expired);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CookieError::Authentication)?;
        let plaintext = match &self.cipher {
            Some(cipher) => {
                if payload.len() < NONCE_LEN {
                    return Err(CookieError::Authentication);
                }
                let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
                cipher
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: ciphertext,
                            aad: name.as_bytes(),
                        },
                    )
                    .map_err(|_| CookieError::Authentication)?
            }
            None => payload,
        };

        String::from_utf8(plaintext).map_err(|_| CookieError::Authentication)
    }
}

/// Derive the AES-256 key from a block key of any length.
fn derive_cipher(block_key: &[u8]) -> Result<Aes256Gcm, CookieError> {
    let hk = Hkdf::<Sha256>::new(None, block_key);
    let mut okm = [0u8; 32];
    hk.expand(HKDF_INFO, &mut okm)
        .map_err(|e| CookieError::InvalidKey(e.to_string()))?;
    Ok(Aes256Gcm::new((&okm).into()))
}

/// Encodes and decodes cookie values under one or more rotating key pairs.
///
/// Encoding uses the first pair; decoding accepts any configured pair, so new
/// keys can be prepended while cookies issued under older keys stay valid.
pub struct CookieCodec {
    signers: Vec<Signer>,
    max_age: i64,
    max_length: usize,
}

impl CookieCodec {
    pub fn new(pairs: &[KeyPair]) -> Result<Self, CookieError> {
        if pairs.is_empty() {
            return Err(CookieError::NoKeyPairs);
        }
        let signers = pairs.iter().map(Signer::new).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            signers,
            max_age: DEFAULT_MAX_AGE,
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    /// Set the expiry bound, in seconds, applied when decoding. Values <= 0
    /// disable the check.
    pub fn set_max_age(&mut self, max_age: i64) {
        self.max_age = max_age;
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn encode(&self, name: &str, value: &str) -> Result<String, CookieError> {
        self.encode_at(name, value, unix_timestamp())
    }

    pub fn decode(&self, name: &str, value: &str) -> Result<String, CookieError> {
        self.decode_at(name, value, unix_timestamp())
    }

    pub(crate) fn encode_at(&self, name: &str, value: &str, now: i64) -> Result<String, CookieError> {
        let mut last_err = CookieError::NoKeyPairs;
        for signer in &self.signers {
            match signer.encode(name, value, now) {
                Ok(encoded) if encoded.len() > self.max_length => {
                    last_err = CookieError::TooLong {
                        len: encoded.len(),
                        max: self.max_length,
                    };
                }
                Ok(encoded) => return Ok(encoded),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    pub(crate) fn decode_at(&self, name: &str, value: &str, now: i64) -> Result<String, CookieError> {
        if value.len() > self.max_length {
            return Err(CookieError::TooLong {
                len: value.len(),
                max: self.max_length,
            });
        }

        // An expired verdict means some pair authenticated the value.
        let mut expired = false;
        for signer in &self.signers {
            match signer.decode(name, value, now, self.max_age) {
                Ok(decoded) => return Ok(decoded),
                Err(CookieError::Expired) => expired = true,
                Err(_) => {}
            }
        }

        Err(if expired {
            CookieError::Expired
        } else {
            CookieError::Authentication
        })
    }
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("key_pairs", &self.signers.len())
            .field("max_age", &self.max_age)
            .field("max_length", &self.max_length)
            .finish()
    }
}

//! # Correlation tokens.
//!
//! A [`Nonce`] binds a request to its eventual reply across the process
//! boundary. Nonces are random 10-character alphanumeric strings, not
//! sequential: collisions among currently-pending requests are not actively
//! prevented, only made statistically negligible.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 10;
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Unique correlation token carried by every message that expects a reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generates a fresh random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let s: String = (0..NONCE_LEN)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect();
        Self(s)
    }

    /// Returns the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Nonce {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

//! CSRF double-submit token service.
//!
//! A token is `{base64(nonce)}.{base64(hmac_sha256(key, nonce))}`. The
//! server stores it in a script-readable cookie; the client copies the
//! cookie value into the `x-csrf-token` request header. Verification
//! needs no server-side session store: the header must equal the cookie,
//! and the embedded MAC must verify against the process key.

use rand::RngCore;

/// Number of random bytes in the token nonce.
const NONCE_LEN: usize = 32;

/// A freshly issued token pair.
///
/// `secret` is the nonce half the MAC was computed over; `token` is the
/// full value stored in the cookie and echoed back by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfTokenPair {
    pub secret: String,
    pub token: String,
}

/// Errors produced by CSRF verification.
#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("token mismatch")]
    TokenMismatch,
}

impl From<ring::error::Unspecified> for CsrfError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::TokenMismatch
    }
}

/// Issues and verifies double-submit CSRF tokens.
pub struct CsrfService {
    key: ring::hmac::Key,
}

impl CsrfService {
    /// Create a service from the raw HMAC key bytes.
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        }
    }

    /// Issue a fresh token pair.
    pub fn issue(&self) -> CsrfTokenPair {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let mac = ring::hmac::sign(&self.key, &nonce);
        let secret = fast32::base64::RFC4648_NOPAD.encode(&nonce);
        let token = format!(
            "{secret}.{}",
            fast32::base64::RFC4648_NOPAD.encode(mac.as_ref())
        );
        CsrfTokenPair { secret, token }
    }

    /// Verify a double-submit pair: the header value against the cookie
    /// value, then the embedded MAC against the process key.
    pub fn verify(&self, header: &str, cookie: &str) -> Result<(), CsrfError> {
        ring::constant_time::verify_slices_are_equal(header.as_bytes(), cookie.as_bytes())
            .map_err(|_| CsrfError::TokenMismatch)?;

        let (secret, mac) = cookie.split_once('.').ok_or(CsrfError::InvalidFormat)?;
        let nonce = fast32::base64::RFC4648_NOPAD
            .decode_str(secret)
            .map_err(|_| CsrfError::InvalidBase64)?;
        let mac = fast32::base64::RFC4648_NOPAD
            .decode_str(mac)
            .map_err(|_| CsrfError::InvalidBase64)?;

        ring::hmac::verify(&self.key, &nonce, &mac)?;
        Ok(())
    }
}

//! HMAC-SHA256 signing for the paysettle Service API.
//!
//! The storefront backend signs every Service API body with the shared
//! service secret. The header carries the signing time and the MAC:
//!
//! ```text
//! Paysettle-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The MAC input is `"{timestamp}.{json_body}"`.
//!
//! The same secret also produces the buyer cancellation token, a MAC over
//! the payment reference embedded in the gateway `cancel_url`.

use ring::hmac;

/// Header name for the Service API body signature.
pub const SIGNATURE_HEADER: &str = "Paysettle-Signature";

/// Maximum allowed age of a body signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for bodies that travel through [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn key(secret: &[u8]) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret)
}

/// A Service API body together with its raw JSON, signing time and MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Serialize and sign `body` at the current time.
    pub fn new(body: T, secret: &[u8]) -> Result<Self, serde_json::Error> {
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        Self::new_at(body, secret, timestamp)
    }

    /// Serialize and sign `body` as if signed at `timestamp`.
    pub fn new_at(body: T, secret: &[u8], timestamp: i64) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&body)?;
        let tag = hmac::sign(&key(secret), format!("{timestamp}.{json}").as_bytes());
        Ok(Self {
            body,
            timestamp,
            json,
            signature: tag.as_ref().into(),
        })
    }

    /// Parse a header value and a raw body. Does not check the MAC.
    pub fn from_header_and_body(header_value: &str, json: String) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&json)?;
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Check the MAC and the timestamp freshness, yielding the body.
    pub fn verify(self, secret: &[u8]) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        hmac::verify(&key(secret), data.as_bytes(), &self.signature)?;
        check_timestamp(self.timestamp)?;
        Ok(self.body)
    }

    /// The full `Paysettle-Signature` header value.
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

/// Split `{timestamp}.{base64}` into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature))
}

pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{timestamp}.{}",
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Reject timestamps older than [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Cancellation token for a payment reference (URL-safe base64, no padding).
pub fn sign_reference(reference: &str, secret: &[u8]) -> String {
    let tag = hmac::sign(&key(secret), reference.as_bytes());
    fast32::base64::RFC4648_URL_NOPAD.encode(tag.as_ref())
}

/// Verify a cancellation token produced by [`sign_reference`].
pub fn verify_reference(reference: &str, token: &str, secret: &[u8]) -> Result<(), SignatureError> {
    let tag = fast32::base64::RFC4648_URL_NOPAD
        .decode_str(token)
        .map_err(|_| SignatureError::InvalidBase64)?;
    hmac::verify(&key(secret), reference.as_bytes(), &tag)?;
    Ok(())
}

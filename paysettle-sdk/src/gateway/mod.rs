//! Hosted gateway request signing.
//!
//! The gateway authenticates both directions of the payment round-trip with
//! the same scheme: an MD5 digest over the canonical `key=value&...` string of
//! all non-empty fields, optionally followed by `&passphrase=...`.
//!
//! MD5 is dictated by the gateway's wire protocol. It must not be reused for
//! anything this workspace designs itself.

mod canonical;
mod digest;

pub use canonical::{SpaceEncoding, canonical_string, encode_value};
pub use digest::GatewaySigner;

/// Form field carrying the signature on both outbound and inbound payloads.
pub const SIGNATURE_FIELD: &str = "signature";

/// Key under which the passphrase is appended to the canonical string.
pub const PASSPHRASE_FIELD: &str = "passphrase";

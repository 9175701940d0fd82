//! Shared types and signing primitives for paysettle.
//!
//! * [`gateway`] – the hosted gateway's MD5 parameter signature, used to
//!   sign outbound payment requests and to verify inbound ITNs.
//! * [`signature`] – HMAC-SHA256 signing for the Service API between the
//!   storefront backend and the settlement server.
//! * [`objects`] – request/response DTOs shared by server and clients.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod gateway;
pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;

//! Client-side OAuth 2.0 / OpenID Connect protocol engine.
//!
//! Builds authenticated requests to an authorization server and validates
//! every class of response it sends back: token responses and ID Tokens,
//! UserInfo, introspection, PAR, device flow and JARM callbacks. Signed
//! responses are checked against the issuer's published key set, which is
//! fetched on demand and cached in a [`keyset::KeySetCache`].
//!
//! Most callers go through [`RelyingParty`], which binds the server and
//! client metadata to an [`HttpClient`] and the shared caches. The pure
//! building blocks (token parsing, claim validation, challenge parsing) are
//! usable on their own.

pub mod auth;
pub mod cache;
pub mod challenge;
pub mod client;
pub mod dpop;
pub mod error;
pub mod http_client;
pub mod jose;
pub mod keys;
pub mod keyset;
#[cfg(test)]
mod mock;
pub mod request;
pub mod response;
pub mod types;
pub mod utils;
pub mod validate;

pub use client::RelyingParty;
pub use error::{Error, ErrorCategory, ErrorKind, OAuth2Error, Outcome, Result};
pub use http_client::HttpClient;
pub use keys::{ClientPrivateKey, JwsAlgorithm, PrivateKey, PublicKey};

/// Default `user-agent` sent with every request that does not set one.
pub const USER_AGENT: &str = concat!("oidc-rp/", env!("CARGO_PKG_VERSION"));

/// Algorithm ID Tokens and other signed responses must use when neither the
/// client nor the issuer says otherwise.
pub const FALLBACK_ALG: &str = "RS256";

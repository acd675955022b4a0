mod client_metadata;
mod form;
mod metadata;
mod response;

pub use self::client_metadata::*;
pub use self::form::*;
pub use self::metadata::*;
pub use self::response::*;

use smol_str::SmolStr;

/// Expected `state` parameter of an authorization response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpectedState {
    /// `state` must be present and equal to this value.
    Value(SmolStr),
    /// No `state` was sent; the response must not carry one.
    #[default]
    Absent,
    /// Do not look at `state` at all. Only appropriate when `state` integrity
    /// is protected by other means.
    SkipCheck,
}

/// Expected `sub` of a UserInfo response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedSubject {
    Value(SmolStr),
    SkipCheck,
}

/// Expected `nonce` claim of an ID Token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpectedNonce {
    Value(SmolStr),
    /// No nonce was sent; the ID Token must not carry one.
    #[default]
    Absent,
}

/// Maximum authentication age for the `auth_time` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAge {
    /// Use the client's `default_max_age`, skipping the check when unset.
    #[default]
    ClientDefault,
    Seconds(u64),
    SkipCheck,
}

/// Whether a signed response's JWS signature is verified against the
/// issuer's key set.
///
/// Skipping is only sound when the response was received directly from the
/// token endpoint over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureCheck {
    #[default]
    Verify,
    Skip,
}

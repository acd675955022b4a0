use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by every request builder and response processor.
///
/// OAuth 2.0 error responses from the server are *not* reported through this
/// type; processors return them as [`Outcome::OAuth`].
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct Error {
    #[diagnostic_source]
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
}

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller passed a malformed argument or a disallowed combination.
    Usage,
    /// The server response did not conform to the protocol.
    Processing,
    /// A well-formed OAuth 2.0 error response, converted into an error via `?`.
    Protocol,
    /// An algorithm, key type or flow that is deliberately not implemented.
    Unsupported,
    /// The request never completed.
    Transport,
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ErrorKind {
    /// Invalid argument
    #[error("invalid argument: {0}")]
    #[diagnostic(
        code(oidc_rp::usage),
        help("check the arguments and the client/server metadata passed to this call")
    )]
    Usage(SmolStr),

    /// Generic protocol non-conformance
    #[error("{0}")]
    #[diagnostic(code(oidc_rp::processing))]
    Processing(SmolStr),

    /// Unexpected HTTP status
    #[error("unexpected HTTP response status code {0}")]
    #[diagnostic(
        code(oidc_rp::processing::status),
        help("the server did not answer with a conforming response for this endpoint")
    )]
    UnexpectedStatus(StatusCode),

    /// JWT `alg` rejected by the algorithm policy
    #[error("unexpected JWT \"alg\" header parameter {0:?}")]
    #[diagnostic(
        code(oidc_rp::jwt::alg),
        help("pin the algorithm in client metadata or check the issuer's advertised algorithms")
    )]
    UnexpectedAlgorithm(SmolStr),

    /// JWS signature did not verify
    #[error("JWT signature verification failed")]
    #[diagnostic(code(oidc_rp::jwt::signature))]
    InvalidSignature,

    /// `exp` is in the past
    #[error("unexpected JWT \"exp\" (expiration time) claim value, timestamp is <= now()")]
    #[diagnostic(code(oidc_rp::jwt::expired))]
    Expired { exp: i64, now: i64 },

    /// `nbf` is in the future
    #[error("unexpected JWT \"nbf\" (not before) claim value, timestamp is > now()")]
    #[diagnostic(code(oidc_rp::jwt::not_yet_valid))]
    NotYetValid { nbf: i64, now: i64 },

    /// No JWK in the issuer's key set matched the token header
    #[error("error when selecting a JWT verification key, no applicable keys found")]
    #[diagnostic(code(oidc_rp::keyset::no_applicable_key))]
    NoApplicableKey,

    /// More than one JWK matched the token header
    #[error(
        "error when selecting a JWT verification key, multiple applicable keys found, a \"kid\" JWT Header Parameter is required"
    )]
    #[diagnostic(
        code(oidc_rp::keyset::ambiguous_key),
        help("the issuer must send a \"kid\" header when its key set holds several usable keys")
    )]
    AmbiguousKey,

    /// OAuth 2.0 error response surfaced through `?`
    #[error("{0}")]
    #[diagnostic(code(oidc_rp::oauth))]
    OAuth(OAuth2Error),

    /// Unsupported algorithm, key or flow
    #[error("unsupported: {0}")]
    #[diagnostic(code(oidc_rp::unsupported))]
    Unsupported(SmolStr),

    /// Key import, signing or verification failure
    #[error("cryptographic operation failed: {0}")]
    #[diagnostic(code(oidc_rp::crypto))]
    Crypto(SmolStr),

    /// HTTP transport failure
    #[error("http transport error")]
    #[diagnostic(
        code(oidc_rp::transport),
        help("the request did not complete; it may be retried")
    )]
    Transport,

    /// Cancellation signal fired
    #[error("request cancelled")]
    #[diagnostic(code(oidc_rp::cancelled))]
    Cancelled,

    /// HTTP request construction failure
    #[error("http build error")]
    #[diagnostic(code(oidc_rp::http_build))]
    HttpBuild,

    /// JSON encoding error
    #[error("json error")]
    #[diagnostic(code(oidc_rp::serde_json))]
    SerdeJson,

    /// Form serialization error
    #[error("form serialization error")]
    #[diagnostic(code(oidc_rp::serde_form))]
    SerdeHtmlForm,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Usage(_) | ErrorKind::HttpBuild => ErrorCategory::Usage,
            ErrorKind::Unsupported(_) => ErrorCategory::Unsupported,
            ErrorKind::OAuth(_) => ErrorCategory::Protocol,
            ErrorKind::Transport | ErrorKind::Cancelled => ErrorCategory::Transport,
            _ => ErrorCategory::Processing,
        }
    }
}

impl Error {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: ErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Get the source error if present
    pub fn source_err(&self) -> Option<&BoxError> {
        self.source.as_ref()
    }

    /// Get the context string if present
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Add help text to this error
    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add context to this error
    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach an underlying cause
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn usage(message: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::Usage(message.into()), None)
    }

    pub fn processing(message: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::Processing(message.into()), None)
    }

    pub fn unsupported(message: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::Unsupported(message.into()), None)
    }

    pub fn unexpected_status(status: StatusCode) -> Self {
        Self::new(ErrorKind::UnexpectedStatus(status), None)
    }

    pub fn unexpected_algorithm(alg: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::UnexpectedAlgorithm(alg.into()), None)
    }

    pub fn invalid_signature() -> Self {
        Self::new(ErrorKind::InvalidSignature, None)
    }

    pub fn crypto(message: impl Into<SmolStr>) -> Self {
        Self::new(ErrorKind::Crypto(message.into()), None)
    }

    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::Transport, Some(Box::new(source)))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, None)
    }

    pub fn http_build(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::HttpBuild, Some(Box::new(source)))
    }

    pub fn is_usage(&self) -> bool {
        self.category() == ErrorCategory::Usage
    }

    pub fn is_processing(&self) -> bool {
        self.category() == ErrorCategory::Processing
    }

    pub fn is_unsupported(&self) -> bool {
        self.category() == ErrorCategory::Unsupported
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(ErrorKind::SerdeJson, Some(Box::new(e))).with_context(msg)
    }
}

impl From<serde_html_form::ser::Error> for Error {
    fn from(e: serde_html_form::ser::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(ErrorKind::SerdeHtmlForm, Some(Box::new(e))).with_context(msg)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Self::http_build(e)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::http_build(e)
    }
}

impl From<OAuth2Error> for Error {
    fn from(e: OAuth2Error) -> Self {
        Self::new(ErrorKind::OAuth(e), None)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// A well-formed OAuth 2.0 error response.
///
/// <https://datatracker.ietf.org/doc/html/rfc6749#section-5.2>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Error {
    pub error: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<SmolStr>,
    // https://datatracker.ietf.org/doc/html/rfc9449#section-7.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algs: Option<SmolStr>,
    // https://datatracker.ietf.org/doc/html/rfc6750#section-3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
}

impl OAuth2Error {
    pub fn new(error: impl Into<SmolStr>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
            error_uri: None,
            algs: None,
            scope: None,
        }
    }

    /// Read an error object, keeping only the registered members that carry strings.
    ///
    /// Returns `None` unless `error` is a non-empty string.
    pub(crate) fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let string = |name: &str| -> Option<SmolStr> {
            object.get(name).and_then(Value::as_str).map(SmolStr::from)
        };
        let error = string("error").filter(|e| !e.is_empty())?;
        Some(Self {
            error,
            error_description: string("error_description"),
            error_uri: string("error_uri"),
            algs: string("algs"),
            scope: string("scope"),
        })
    }
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OAuth 2.0 error response: {}", self.error)?;
        if let Some(description) = &self.error_description {
            write!(f, " ({description})")?;
        }
        Ok(())
    }
}

impl std::error::Error for OAuth2Error {}

/// Result of processing a server response that may legitimately carry an
/// OAuth 2.0 error instead of a success payload.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    Ok(T),
    OAuth(OAuth2Error),
}

impl<T> Outcome<T> {
    pub fn is_oauth2_error(&self) -> bool {
        matches!(self, Outcome::OAuth(e) if !e.error.is_empty())
    }

    pub fn oauth2_error(&self) -> Option<&OAuth2Error> {
        match self {
            Outcome::OAuth(e) => Some(e),
            Outcome::Ok(_) => None,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            Outcome::OAuth(_) => None,
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(v),
            Outcome::OAuth(e) => Outcome::OAuth(e.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::OAuth(e) => Outcome::OAuth(e),
        }
    }

    pub fn into_result(self) -> core::result::Result<T, OAuth2Error> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::OAuth(e) => Err(e),
        }
    }
}

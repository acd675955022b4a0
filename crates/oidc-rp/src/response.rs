//! Response validation.
//!
//! Every processor takes the raw `http::Response<Vec<u8>>` returned by the
//! matching builder in [`crate::request`]. Processors for endpoints that can
//! answer with an OAuth 2.0 error body return [`Outcome`]; everything else that
//! does not conform is an [`Error`].
//!
//! Processors that may need the issuer's signing keys are methods on
//! [`RelyingParty`](crate::RelyingParty); the rest are free functions.

mod authorization;
mod endpoint;
mod token;
mod userinfo;

pub use self::authorization::validate_auth_response;
pub use self::endpoint::{
    process_device_authorization_response, process_discovery_response, process_jwks_response,
    process_pushed_authorization_response, process_revocation_response,
};

use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::client::RelyingParty;
use crate::error::{Error, OAuth2Error, Result};
use crate::http_client::HttpClient;
use crate::jose::ParsedJwt;
use crate::keyset::resolve_verification_key;
use crate::request::HttpRequestOptions;
use crate::types::SignatureCheck;
use crate::validate::check_signing_algorithm;

pub const JWT_CONTENT_TYPE: &str = "application/jwt";

// https://datatracker.ietf.org/doc/html/rfc9701#section-5
pub const TOKEN_INTROSPECTION_JWT_CONTENT_TYPE: &str = "application/token-introspection+jwt";

/// Options for processors that may verify a signed response.
#[derive(Debug, Clone, Default)]
pub struct ResponseOptions {
    pub signature: SignatureCheck,
    /// Used when the issuer's key set has to be fetched.
    pub http: HttpRequestOptions,
}

impl ResponseOptions {
    /// Accept signed responses without checking their signature.
    pub fn skip_signature_check() -> Self {
        Self {
            signature: SignatureCheck::Skip,
            ..Default::default()
        }
    }
}

/// Media type of the response, lower-cased and without parameters.
pub(crate) fn content_type<B>(response: &http::Response<B>) -> Option<String> {
    let value = response.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    let media_type = value.split(';').next().unwrap_or_default().trim();
    Some(media_type.to_ascii_lowercase())
}

/// Decode a 4xx body of the form `{"error": "<non-empty string>", ...}`.
pub(crate) fn oauth_body_error(response: &http::Response<Vec<u8>>) -> Option<OAuth2Error> {
    if !response.status().is_client_error() {
        return None;
    }
    match serde_json::from_slice::<Value>(response.body()) {
        Ok(Value::Object(body)) => OAuth2Error::from_object(&body),
        _ => None,
    }
}

/// `Ok(None)` when the status is `expected`, the decoded error body when there
/// is one, and an error otherwise.
pub(crate) fn check_status(
    response: &http::Response<Vec<u8>>,
    expected: StatusCode,
    endpoint: &str,
) -> Result<Option<OAuth2Error>> {
    if response.status() == expected {
        return Ok(None);
    }
    if let Some(err) = oauth_body_error(response) {
        #[cfg(feature = "tracing")]
        tracing::debug!(status = %response.status(), error = %err.error, "oauth error response");
        return Ok(Some(err));
    }
    Err(Error::unexpected_status(response.status())
        .with_context(format!("\"response\" is not a conform {endpoint} response")))
}

pub(crate) fn parse_object(body: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(Error::processing("\"response\" body must be a top level object")),
        Err(e) => Err(Error::processing("failed to parse \"response\" body as JSON").with_source(e)),
    }
}

pub(crate) fn required_string(body: &Map<String, Value>, name: &str) -> Result<SmolStr> {
    match body.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str().into()),
        _ => Err(Error::processing(format!(
            "\"response\" body \"{name}\" property must be a non-empty string"
        ))),
    }
}

/// An optional string member. With `non_empty`, an empty string is rejected too.
pub(crate) fn optional_string(
    body: &Map<String, Value>,
    name: &str,
    non_empty: bool,
) -> Result<Option<SmolStr>> {
    match body.get(name) {
        None => Ok(None),
        Some(Value::String(s)) if !(non_empty && s.is_empty()) => Ok(Some(s.as_str().into())),
        Some(_) if non_empty => Err(Error::processing(format!(
            "\"response\" body \"{name}\" property must be a non-empty string"
        ))),
        Some(_) => Err(Error::processing(format!(
            "\"response\" body \"{name}\" property must be a string"
        ))),
    }
}

/// An optional positive number of seconds. Fractions round up.
pub(crate) fn positive_number(body: &Map<String, Value>, name: &str) -> Result<Option<u64>> {
    match body.get(name) {
        None => Ok(None),
        Some(value) => match value.as_f64() {
            Some(n) if n > 0.0 => Ok(Some(n.ceil() as u64)),
            _ => Err(Error::processing(format!(
                "\"response\" body \"{name}\" property must be a positive number"
            ))),
        },
    }
}

pub(crate) fn required_positive_number(body: &Map<String, Value>, name: &str) -> Result<u64> {
    positive_number(body, name)?.ok_or_else(|| {
        Error::processing(format!(
            "\"response\" body \"{name}\" property must be a positive number"
        ))
    })
}

impl<C: HttpClient> RelyingParty<C> {
    /// Parse `token`, apply the algorithm policy and, unless skipped, verify
    /// the signature with the matching key from the issuer's key set.
    pub(crate) async fn validate_jwt(
        &self,
        token: &str,
        client_alg: Option<&SmolStr>,
        issuer_algs: Option<&Vec<SmolStr>>,
        signature: SignatureCheck,
        options: &HttpRequestOptions,
    ) -> Result<ParsedJwt> {
        let jwt = ParsedJwt::parse(token)?;
        check_signing_algorithm(
            client_alg.map(SmolStr::as_str),
            issuer_algs.map(Vec::as_slice),
            jwt.header(),
        )?;
        if signature == SignatureCheck::Verify {
            let key = resolve_verification_key(
                &self.http,
                &self.key_sets,
                &self.server,
                jwt.header(),
                options,
            )
            .await?;
            jwt.verify_signature(&key)?;
        }
        Ok(jwt)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::json_response;
    use serde_json::json;

    #[test]
    fn content_type_is_normalized() {
        let response = http::Response::builder()
            .header(CONTENT_TYPE, "Application/JWT; charset=utf-8")
            .body(Vec::<u8>::new())
            .unwrap();
        assert_eq!(content_type(&response).as_deref(), Some(JWT_CONTENT_TYPE));
        let response = http::Response::new(Vec::<u8>::new());
        assert_eq!(content_type(&response), None);
    }

    #[test]
    fn error_bodies_only_decoded_for_client_errors() {
        let body = json!({"error": "invalid_grant", "error_description": "expired"});
        let err = check_status(&json_response(400, body.clone()), StatusCode::OK, "Token Endpoint")
            .unwrap()
            .unwrap();
        assert_eq!(err.error, "invalid_grant");
        assert_eq!(err.error_description.as_deref(), Some("expired"));

        let err = check_status(&json_response(500, body), StatusCode::OK, "Token Endpoint").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedStatus(s) if s.as_u16() == 500));
        assert_eq!(err.context(), Some("\"response\" is not a conform Token Endpoint response"));

        let err = check_status(&json_response(400, json!({"error": ""})), StatusCode::OK, "Token Endpoint")
            .unwrap_err();
        assert!(err.is_processing());

        assert!(check_status(&json_response(201, json!({})), StatusCode::CREATED, "PAR").unwrap().is_none());
    }

    #[test]
    fn member_checks() {
        let body = parse_object(br#"{"a": "", "b": "x", "n": 1.5, "z": 0, "s": 3}"#).unwrap();
        assert!(required_string(&body, "a").is_err());
        assert_eq!(required_string(&body, "b").unwrap(), "x");
        assert_eq!(optional_string(&body, "a", false).unwrap().as_deref(), Some(""));
        assert!(optional_string(&body, "a", true).is_err());
        assert!(optional_string(&body, "s", false).is_err());
        assert_eq!(optional_string(&body, "missing", true).unwrap(), None);
        assert_eq!(positive_number(&body, "n").unwrap(), Some(2));
        assert!(positive_number(&body, "z").is_err());
        assert!(positive_number(&body, "b").is_err());
        assert!(required_positive_number(&body, "missing").is_err());

        assert!(parse_object(b"[1]").unwrap_err().is_processing());
        assert!(parse_object(b"not json").unwrap_err().is_processing());
    }
}

use http::StatusCode;
use serde_json::Value;
use url::Url;

use super::{
    check_status, optional_string, parse_object, positive_number, required_positive_number,
    required_string,
};
use crate::client::RelyingParty;
use crate::error::{Error, Outcome, Result};
use crate::http_client::HttpClient;
use crate::jose::jwk::JwkSet;
use crate::types::{
    AuthorizationServerMetadata, DeviceAuthorizationResponse, PushedAuthorizationResponse,
};

/// Validate a `jwks_uri` response.
pub fn process_jwks_response(response: &http::Response<Vec<u8>>) -> Result<JwkSet> {
    if response.status() != StatusCode::OK {
        return Err(Error::unexpected_status(response.status())
            .with_context("\"response\" is not a conform JSON Web Key Set response"));
    }
    let body = parse_object(response.body())?;
    match body.get("keys") {
        Some(Value::Array(keys)) if keys.iter().all(Value::is_object) => {}
        _ => {
            return Err(Error::processing(
                "\"response\" body \"keys\" property must be an array of objects",
            ));
        }
    }
    serde_json::from_value(Value::Object(body))
        .map_err(|e| Error::processing("invalid JSON Web Key Set").with_source(e))
}

/// Validate a discovery response for the issuer identifier `expected_issuer`.
///
/// The advertised `issuer` must be the same URL as the one discovery was
/// performed for.
pub fn process_discovery_response(
    expected_issuer: &Url,
    response: &http::Response<Vec<u8>>,
) -> Result<AuthorizationServerMetadata> {
    if response.status() != StatusCode::OK {
        return Err(Error::unexpected_status(response.status()).with_context(
            "\"response\" is not a conform Authorization Server Metadata response",
        ));
    }
    let body = parse_object(response.body())?;
    let issuer = required_string(&body, "issuer")?;
    match Url::parse(&issuer) {
        Ok(issuer) if issuer == *expected_issuer => {}
        _ => {
            return Err(Error::processing(
                "\"response\" body \"issuer\" does not match \"expected_issuer\"",
            ));
        }
    }
    serde_json::from_value(Value::Object(body)).map_err(|e| {
        Error::processing("invalid Authorization Server Metadata").with_source(e)
    })
}

/// Validate a pushed authorization request response. Success is `201 Created`.
pub fn process_pushed_authorization_response(
    response: &http::Response<Vec<u8>>,
) -> Result<Outcome<PushedAuthorizationResponse>> {
    if let Some(err) = check_status(
        response,
        StatusCode::CREATED,
        "Pushed Authorization Request Endpoint",
    )? {
        return Ok(Outcome::OAuth(err));
    }
    let mut body = parse_object(response.body())?;
    let request_uri = required_string(&body, "request_uri")?;
    let expires_in = required_positive_number(&body, "expires_in")?;
    body.remove("request_uri");
    body.remove("expires_in");
    Ok(Outcome::Ok(PushedAuthorizationResponse {
        request_uri,
        expires_in,
        extra: body,
    }))
}

pub fn process_device_authorization_response(
    response: &http::Response<Vec<u8>>,
) -> Result<Outcome<DeviceAuthorizationResponse>> {
    if let Some(err) = check_status(
        response,
        StatusCode::OK,
        "Device Authorization Endpoint",
    )? {
        return Ok(Outcome::OAuth(err));
    }
    let mut body = parse_object(response.body())?;
    let device_code = required_string(&body, "device_code")?;
    let user_code = required_string(&body, "user_code")?;
    let verification_uri = required_string(&body, "verification_uri")?;
    let expires_in = required_positive_number(&body, "expires_in")?;
    let verification_uri_complete = optional_string(&body, "verification_uri_complete", true)?;
    let interval = positive_number(&body, "interval")?;
    for name in [
        "device_code",
        "user_code",
        "verification_uri",
        "verification_uri_complete",
        "expires_in",
        "interval",
    ] {
        body.remove(name);
    }
    Ok(Outcome::Ok(DeviceAuthorizationResponse {
        device_code,
        user_code,
        verification_uri,
        verification_uri_complete,
        expires_in,
        interval,
        extra: body,
    }))
}

/// Only the status matters; the body is never read on success.
pub fn process_revocation_response(response: &http::Response<Vec<u8>>) -> Result<Outcome<()>> {
    match check_status(response, StatusCode::OK, "Revocation Endpoint")? {
        Some(err) => Ok(Outcome::OAuth(err)),
        None => Ok(Outcome::Ok(())),
    }
}

impl<C: HttpClient> RelyingParty<C> {
    pub fn process_pushed_authorization_response(
        &self,
        response: &http::Response<Vec<u8>>,
    ) -> Result<Outcome<PushedAuthorizationResponse>> {
        process_pushed_authorization_response(response)
    }

    pub fn process_device_authorization_response(
        &self,
        response: &http::Response<Vec<u8>>,
    ) -> Result<Outcome<DeviceAuthorizationResponse>> {
        process_device_authorization_response(response)
    }

    pub fn process_revocation_response(
        &self,
        response: &http::Response<Vec<u8>>,
    ) -> Result<Outcome<()>> {
        process_revocation_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::json_response;
    use crate::response::fixtures::body_response;
    use serde_json::json;

    #[test]
    fn jwks_shape() {
        let set = process_jwks_response(&json_response(
            200,
            json!({"keys": [{"kty": "EC", "crv": "P-256", "x": "a", "y": "b"}]}),
        ))
        .unwrap();
        assert_eq!(set.keys.len(), 1);
        assert_eq!(set.keys[0].kty, "EC");

        for body in [json!({}), json!({"keys": {}}), json!({"keys": ["k"]}), json!([])] {
            assert!(process_jwks_response(&json_response(200, body)).unwrap_err().is_processing());
        }
        let err = process_jwks_response(&json_response(404, json!({"keys": []}))).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedStatus(_)));
    }

    #[test]
    fn discovery_issuer_must_match() {
        let expected = Url::parse("https://as.example/tenant").unwrap();
        let metadata = process_discovery_response(
            &expected,
            &json_response(
                200,
                json!({
                    "issuer": "https://as.example/tenant",
                    "token_endpoint": "https://as.example/tenant/token",
                    "custom": 1,
                }),
            ),
        )
        .unwrap();
        assert_eq!(metadata.issuer, "https://as.example/tenant");
        assert_eq!(metadata.token_endpoint.as_deref(), Some("https://as.example/tenant/token"));
        assert_eq!(metadata.extra.get("custom"), Some(&json!(1)));

        // URL normalization: default port and host case
        process_discovery_response(
            &expected,
            &json_response(200, json!({"issuer": "https://AS.example:443/tenant"})),
        )
        .unwrap();

        let err = process_discovery_response(
            &expected,
            &json_response(200, json!({"issuer": "https://evil.example/tenant"})),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("does not match")));
        assert!(process_discovery_response(&expected, &json_response(200, json!({"issuer": ""}))).is_err());
        assert!(process_discovery_response(&expected, &json_response(500, json!({}))).is_err());
    }

    #[test]
    fn par_requires_created() {
        let ok = process_pushed_authorization_response(&json_response(
            201,
            json!({"request_uri": "urn:ietf:params:oauth:request_uri:abc", "expires_in": 60}),
        ))
        .unwrap()
        .ok()
        .unwrap();
        assert_eq!(ok.request_uri, "urn:ietf:params:oauth:request_uri:abc");
        assert_eq!(ok.expires_in, 60);
        assert!(ok.extra.is_empty());

        let err = process_pushed_authorization_response(&json_response(
            200,
            json!({"request_uri": "urn:x", "expires_in": 60}),
        ))
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedStatus(s) if s.as_u16() == 200));

        let outcome = process_pushed_authorization_response(&json_response(
            400,
            json!({"error": "invalid_request"}),
        ))
        .unwrap();
        assert_eq!(outcome.oauth2_error().unwrap().error, "invalid_request");

        assert!(process_pushed_authorization_response(&json_response(
            201,
            json!({"request_uri": "urn:x", "expires_in": 0}),
        ))
        .is_err());
    }

    #[test]
    fn device_authorization_fields() {
        let body = json!({
            "device_code": "dc",
            "user_code": "UC-1",
            "verification_uri": "https://as.example/device",
            "verification_uri_complete": "https://as.example/device?user_code=UC-1",
            "expires_in": 1800,
            "interval": 5,
            "extension": true,
        });
        let response = process_device_authorization_response(&json_response(200, body.clone()))
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(response.device_code, "dc");
        assert_eq!(response.interval, Some(5));
        assert_eq!(response.extra.get("extension"), Some(&json!(true)));
        assert_eq!(serde_json::to_value(&response).unwrap(), body);

        let mut bad = body.clone();
        bad["interval"] = json!(0);
        assert!(process_device_authorization_response(&json_response(200, bad)).is_err());
        let mut bad = body.clone();
        bad["verification_uri_complete"] = json!("");
        assert!(process_device_authorization_response(&json_response(200, bad)).is_err());
        let mut bad = body;
        bad.as_object_mut().unwrap().remove("user_code");
        assert!(process_device_authorization_response(&json_response(200, bad)).is_err());
    }

    #[test]
    fn revocation_ignores_body() {
        let outcome = process_revocation_response(&body_response(200, "text/html", "<html>")).unwrap();
        assert_eq!(outcome, Outcome::Ok(()));
        let outcome = process_revocation_response(&json_response(
            400,
            json!({"error": "unsupported_token_type"}),
        ))
        .unwrap();
        assert!(outcome.is_oauth2_error());
        assert!(process_revocation_response(&body_response(503, "text/plain", "down")).is_err());
    }
}

use http::StatusCode;
use serde_json::Value;

use super::{
    ResponseOptions, check_status, optional_string, parse_object, positive_number,
    required_string,
};
use crate::client::RelyingParty;
use crate::error::{Error, Outcome, Result};
use crate::http_client::HttpClient;
use crate::jose::CLOCK_TOLERANCE;
use crate::jose::jwt::Audience;
use crate::types::{
    ExpectedNonce, IdTokenClaims, MaxAge, OpenIdTokenResponse, TokenEndpointResponse,
    TokenResponse, TokenType,
};
use crate::utils::epoch_time;
use crate::validate::RequiredClaim;

/// Members of a token response the generic checks leave unvalidated.
#[derive(Debug, Clone, Copy, Default)]
struct Ignore {
    id_token: bool,
    refresh_token: bool,
}

/// Parse and type check a token endpoint response body.
///
/// Ignored members are left in `extra` untouched.
fn parse_token_response(
    response: &http::Response<Vec<u8>>,
    ignore: Ignore,
) -> Result<Outcome<TokenEndpointResponse>> {
    if let Some(err) = check_status(response, StatusCode::OK, "Token Endpoint")? {
        return Ok(Outcome::OAuth(err));
    }
    let mut body = parse_object(response.body())?;

    let access_token = required_string(&body, "access_token")?;
    let token_type = match required_string(&body, "token_type")?.to_lowercase().as_str() {
        "bearer" => TokenType::Bearer,
        "dpop" => TokenType::DPoP,
        _ => return Err(Error::unsupported("unsupported `token_type` value")),
    };
    let expires_in = positive_number(&body, "expires_in")?;
    let refresh_token = match ignore.refresh_token {
        true => None,
        false => optional_string(&body, "refresh_token", true)?,
    };
    let scope = optional_string(&body, "scope", false)?;
    let id_token = match ignore.id_token {
        true => None,
        false => optional_string(&body, "id_token", true)?,
    };

    for name in ["access_token", "token_type", "expires_in", "scope"] {
        body.remove(name);
    }
    if !ignore.refresh_token {
        body.remove("refresh_token");
    }
    if !ignore.id_token {
        body.remove("id_token");
    }

    Ok(Outcome::Ok(TokenEndpointResponse {
        access_token,
        token_type,
        expires_in,
        refresh_token,
        scope,
        id_token,
        extra: body,
    }))
}

impl<C: HttpClient> RelyingParty<C> {
    async fn process_generic_token_response(
        &self,
        response: &http::Response<Vec<u8>>,
        ignore: Ignore,
        options: &ResponseOptions,
    ) -> Result<Outcome<TokenResponse>> {
        let response = match parse_token_response(response, ignore)? {
            Outcome::Ok(response) => response,
            Outcome::OAuth(err) => return Ok(Outcome::OAuth(err)),
        };
        let id_token_claims = match &response.id_token {
            Some(id_token) => Some(self.validate_id_token(id_token, options).await?),
            None => None,
        };
        Ok(Outcome::Ok(TokenResponse {
            response,
            id_token_claims,
        }))
    }

    /// The checks every ID Token goes through regardless of the grant.
    async fn validate_id_token(
        &self,
        id_token: &str,
        options: &ResponseOptions,
    ) -> Result<IdTokenClaims> {
        let jwt = self
            .validate_jwt(
                id_token,
                self.client.id_token_signed_response_alg.as_ref(),
                self.server.id_token_signing_alg_values_supported.as_ref(),
                options.signature,
                &options.http,
            )
            .await?;
        jwt.require_claims(&[
            RequiredClaim::Aud,
            RequiredClaim::Exp,
            RequiredClaim::Iat,
            RequiredClaim::Iss,
            RequiredClaim::Sub,
        ])?
        .require_issuer(&self.server.issuer)?
        .require_audience(&self.client.client_id)?;

        let claims = IdTokenClaims::from_claims(jwt.into_claims())?;
        if let Audience::Multiple(aud) = &claims.aud {
            if aud.len() != 1 && claims.azp.as_deref() != Some(self.client.client_id.as_str()) {
                return Err(Error::processing(
                    "unexpected ID Token \"azp\" (authorized party) claim value",
                ));
            }
        }
        if self.client.require_auth_time && claims.auth_time.is_none() {
            return Err(Error::processing(
                "unexpected ID Token \"auth_time\" (authentication time) claim value",
            ));
        }
        Ok(claims)
    }

    /// Validate a refresh token grant response.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn process_refresh_token_response(
        &self,
        response: &http::Response<Vec<u8>>,
        options: &ResponseOptions,
    ) -> Result<Outcome<TokenResponse>> {
        self.process_generic_token_response(response, Ignore::default(), options)
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn process_device_code_response(
        &self,
        response: &http::Response<Vec<u8>>,
        options: &ResponseOptions,
    ) -> Result<Outcome<TokenResponse>> {
        self.process_generic_token_response(response, Ignore::default(), options)
            .await
    }

    /// Validate a client credentials grant response. `id_token` and
    /// `refresh_token` are not looked at and stay in `extra` if sent.
    pub async fn process_client_credentials_response(
        &self,
        response: &http::Response<Vec<u8>>,
    ) -> Result<Outcome<TokenEndpointResponse>> {
        parse_token_response(
            response,
            Ignore {
                id_token: true,
                refresh_token: true,
            },
        )
    }

    /// Validate an authorization code grant response of a plain OAuth 2.0
    /// flow.
    ///
    /// A response that carries an ID Token belongs to an OpenID Connect flow
    /// and must go through
    /// [`process_authorization_code_openid_response`](Self::process_authorization_code_openid_response).
    pub async fn process_authorization_code_oauth2_response(
        &self,
        response: &http::Response<Vec<u8>>,
    ) -> Result<Outcome<TokenEndpointResponse>> {
        let ignore = Ignore {
            id_token: true,
            ..Default::default()
        };
        let response = match parse_token_response(response, ignore)? {
            Outcome::Ok(response) => response,
            Outcome::OAuth(err) => return Ok(Outcome::OAuth(err)),
        };
        if let Some(Value::String(id_token)) = response.extra.get("id_token") {
            if !id_token.is_empty() {
                return Err(Error::usage(
                    "this response contains an ID Token, use process_authorization_code_openid_response for OpenID Connect flows",
                ));
            }
        }
        Ok(Outcome::Ok(response))
    }

    /// Validate an authorization code grant response of an OpenID Connect
    /// flow. The ID Token is required.
    ///
    /// `max_age` of [`MaxAge::ClientDefault`] falls back to the client's
    /// `default_max_age`; with neither, `auth_time` is only checked when the
    /// client sets `require_auth_time`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn process_authorization_code_openid_response(
        &self,
        response: &http::Response<Vec<u8>>,
        nonce: &ExpectedNonce,
        max_age: MaxAge,
        options: &ResponseOptions,
    ) -> Result<Outcome<OpenIdTokenResponse>> {
        if let ExpectedNonce::Value(value) = nonce {
            if value.is_empty() {
                return Err(Error::usage("\"expected_nonce\" must be a non-empty string"));
            }
        }
        let TokenResponse {
            response,
            id_token_claims,
        } = match self
            .process_generic_token_response(response, Ignore::default(), options)
            .await?
        {
            Outcome::Ok(response) => response,
            Outcome::OAuth(err) => return Ok(Outcome::OAuth(err)),
        };
        let claims = id_token_claims.ok_or_else(|| {
            Error::processing("\"response\" body \"id_token\" property must be a non-empty string")
        })?;

        let max_age = match max_age {
            MaxAge::Seconds(seconds) => Some(seconds),
            MaxAge::ClientDefault => self.client.default_max_age,
            MaxAge::SkipCheck => None,
        };
        if self.client.require_auth_time || max_age.is_some() {
            let auth_time = claims
                .get("auth_time")
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    Error::processing("ID Token \"auth_time\" (authentication time) claim missing")
                })?;
            if let Some(max_age) = max_age {
                if auth_time + (max_age as f64) < (epoch_time() - CLOCK_TOLERANCE) as f64 {
                    return Err(Error::processing(
                        "too much time has elapsed since the last End-User authentication",
                    ));
                }
            }
        }

        check_nonce(&claims, nonce)?;
        Ok(Outcome::Ok(OpenIdTokenResponse {
            response,
            id_token_claims: claims,
        }))
    }
}

fn check_nonce(claims: &IdTokenClaims, expected: &ExpectedNonce) -> Result<()> {
    let unexpected = || Error::processing("unexpected ID Token \"nonce\" claim value");
    match (expected, claims.nonce.as_ref()) {
        (ExpectedNonce::Absent, None) => Ok(()),
        (ExpectedNonce::Absent, Some(_)) => Err(unexpected()),
        (ExpectedNonce::Value(_), None) => {
            Err(Error::processing("ID Token \"nonce\" claim missing"))
        }
        (ExpectedNonce::Value(expected), Some(actual)) if expected == actual => Ok(()),
        (ExpectedNonce::Value(_), Some(_)) => Err(unexpected()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::jose::jws::JwsHeader;
    use crate::keys::JwsAlgorithm;
    use crate::mock::json_response;
    use crate::response::fixtures::*;
    use crate::types::ClientMetadata;
    use serde_json::json;

    fn token_body(extra: Value) -> Value {
        let mut body = json!({"access_token": "at", "token_type": "Bearer"});
        if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), extra) {
            obj.extend(extra);
        }
        body
    }

    fn es256_header() -> JwsHeader {
        JwsHeader::from(JwsAlgorithm::Es256)
    }

    #[tokio::test]
    async fn bearer_response_is_normalized() {
        let (rp, http) = setup(ClientMetadata::new(CLIENT_ID));
        let response = json_response(
            200,
            token_body(json!({"expires_in": 3600, "scope": "", "refresh_token": "rt", "foo": "bar"})),
        );
        let result = rp
            .process_refresh_token_response(&response, &ResponseOptions::default())
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(result.response.token_type, TokenType::Bearer);
        assert_eq!(result.response.expires_in, Some(3600));
        assert_eq!(result.response.scope.as_deref(), Some(""));
        assert_eq!(result.response.refresh_token.as_deref(), Some("rt"));
        assert_eq!(result.response.extra.get("foo"), Some(&json!("bar")));
        assert!(result.id_token_claims.is_none());
        assert_eq!(http.request_count().await, 0);
    }

    #[tokio::test]
    async fn token_member_types() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let options = ResponseOptions::default();
        let cases = [
            (json!({"access_token": "", "token_type": "bearer"}), "access_token"),
            (json!({"access_token": "at"}), "token_type"),
            (token_body(json!({"expires_in": -1})), "expires_in"),
            (token_body(json!({"expires_in": "3600"})), "expires_in"),
            (token_body(json!({"refresh_token": ""})), "refresh_token"),
            (token_body(json!({"scope": ["a"]})), "scope"),
            (token_body(json!({"id_token": 1})), "id_token"),
        ];
        for (body, member) in cases {
            let err = rp
                .process_refresh_token_response(&json_response(200, body), &options)
                .await
                .unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::Processing(m) if m.contains(member)),
                "{member}: {err:?}"
            );
        }

        let err = rp
            .process_refresh_token_response(
                &json_response(200, json!({"access_token": "at", "token_type": "mac"})),
                &options,
            )
            .await
            .unwrap_err();
        assert!(err.is_unsupported());

        let ok = rp
            .process_device_code_response(
                &json_response(200, json!({"access_token": "at", "token_type": "DPoP"})),
                &options,
            )
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(ok.response.token_type, TokenType::DPoP);
    }

    #[tokio::test]
    async fn error_body_is_an_outcome() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let outcome = rp
            .process_device_code_response(
                &json_response(400, json!({"error": "authorization_pending", "foo": 1})),
                &ResponseOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.oauth2_error().unwrap().error, "authorization_pending");
    }

    #[tokio::test]
    async fn client_credentials_ignores_id_and_refresh_tokens() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let response = json_response(200, token_body(json!({"id_token": 5, "refresh_token": ""})));
        let ok = rp
            .process_client_credentials_response(&response)
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(ok.id_token, None);
        assert_eq!(ok.refresh_token, None);
        assert_eq!(ok.extra.get("id_token"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn oauth2_code_flow_rejects_id_token() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let response = json_response(200, token_body(json!({"id_token": "a.b.c"})));
        let err = rp
            .process_authorization_code_oauth2_response(&response)
            .await
            .unwrap_err();
        assert!(err.is_usage());

        let response = json_response(200, token_body(json!({"id_token": ""})));
        rp.process_authorization_code_oauth2_response(&response)
            .await
            .unwrap()
            .ok()
            .unwrap();
    }

    #[tokio::test]
    async fn id_token_is_verified_with_the_issuer_key() {
        let (rp, http) = setup(ClientMetadata::new(CLIENT_ID));
        let key = es256();
        http.push_json(200, jwks_of(&key)).await;
        let id_token = sign(&key, es256_header(), id_token_claims(json!({"nonce": "n-1"})));
        let response = json_response(200, token_body(json!({"id_token": id_token})));

        let result = rp
            .process_authorization_code_openid_response(
                &response,
                &ExpectedNonce::Value("n-1".into()),
                MaxAge::ClientDefault,
                &ResponseOptions::default(),
            )
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(result.id_token_claims.sub, "alice");
        assert_eq!(result.id_token_claims.nonce.as_deref(), Some("n-1"));
        assert_eq!(result.response.id_token.as_deref(), Some(id_token.as_str()));
        assert_eq!(http.request_count().await, 1);

        // forged with another key, same header: fails against the cached set
        let forged = sign(&es256(), es256_header(), id_token_claims(json!({"nonce": "n-1"})));
        let response = json_response(200, token_body(json!({"id_token": forged})));
        let err = rp
            .process_authorization_code_openid_response(
                &response,
                &ExpectedNonce::Value("n-1".into()),
                MaxAge::ClientDefault,
                &ResponseOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSignature), "{err:?}");
    }

    #[tokio::test]
    async fn algorithm_policy_applies_before_key_lookup() {
        let (rp, http) = setup(ClientMetadata::new(CLIENT_ID));
        let id_token = unsigned(json!({"alg": "RS256"}), id_token_claims(json!({})));
        let response = json_response(200, token_body(json!({"id_token": id_token})));
        let err = rp
            .process_refresh_token_response(&response, &ResponseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedAlgorithm(alg) if alg == "RS256"));
        assert_eq!(http.request_count().await, 0);
    }

    #[tokio::test]
    async fn id_token_claim_rules() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let options = ResponseOptions::skip_signature_check();
        let header = json!({"alg": "ES256"});
        let check = |claims: Value| {
            let id_token = unsigned(header.clone(), claims);
            json_response(200, token_body(json!({"id_token": id_token})))
        };

        let mut claims = id_token_claims(json!({}));
        claims.as_object_mut().unwrap().remove("iat");
        let err = rp.process_refresh_token_response(&check(claims), &options).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("\"iat\"")));

        let err = rp
            .process_refresh_token_response(&check(id_token_claims(json!({"iss": "https://evil.example"}))), &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("iss")));

        let err = rp
            .process_refresh_token_response(&check(id_token_claims(json!({"aud": "other"}))), &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("aud")));

        // several audiences need a matching azp
        let err = rp
            .process_refresh_token_response(&check(id_token_claims(json!({"aud": [CLIENT_ID, "rs"]}))), &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("azp")));
        let ok = rp
            .process_refresh_token_response(
                &check(id_token_claims(json!({"aud": [CLIENT_ID, "rs"], "azp": CLIENT_ID}))),
                &options,
            )
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(ok.id_token_claims.unwrap().azp.as_deref(), Some(CLIENT_ID));
        rp.process_refresh_token_response(&check(id_token_claims(json!({"aud": [CLIENT_ID]}))), &options)
            .await
            .unwrap();

        let expired = id_token_claims(json!({"exp": epoch_time() - 60}));
        let err = rp.process_refresh_token_response(&check(expired), &options).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Expired { .. }));
    }

    #[tokio::test]
    async fn auth_time_and_max_age() {
        let mut client = ClientMetadata::new(CLIENT_ID);
        client.require_auth_time = true;
        let (rp, _) = setup(client);
        let options = ResponseOptions::skip_signature_check();
        let response = |claims: Value| {
            let id_token = unsigned(json!({"alg": "ES256"}), claims);
            json_response(200, token_body(json!({"id_token": id_token})))
        };

        let err = rp
            .process_refresh_token_response(&response(id_token_claims(json!({}))), &options)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("auth_time")));

        let mut client = ClientMetadata::new(CLIENT_ID);
        client.default_max_age = Some(60);
        let (rp, _) = setup(client);
        let now = epoch_time();
        let openid = |claims: Value, max_age: MaxAge| {
            let response = response(claims);
            let rp = rp.clone();
            async move {
                rp.process_authorization_code_openid_response(
                    &response,
                    &ExpectedNonce::Absent,
                    max_age,
                    &ResponseOptions::skip_signature_check(),
                )
                .await
            }
        };

        let err = openid(id_token_claims(json!({})), MaxAge::ClientDefault).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("auth_time")));
        openid(id_token_claims(json!({})), MaxAge::SkipCheck).await.unwrap();

        // 60s max age plus 30s tolerance
        openid(id_token_claims(json!({"auth_time": now - 85})), MaxAge::ClientDefault)
            .await
            .unwrap();
        let err = openid(id_token_claims(json!({"auth_time": now - 100})), MaxAge::ClientDefault)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("too much time")));
        openid(id_token_claims(json!({"auth_time": now - 100})), MaxAge::Seconds(3600))
            .await
            .unwrap();

        // fractional auth_time is compared as is
        openid(id_token_claims(json!({"auth_time": now as f64 - 10.25})), MaxAge::ClientDefault)
            .await
            .unwrap();
        let err = openid(id_token_claims(json!({"auth_time": now as f64 - 90.5})), MaxAge::ClientDefault)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("too much time")));
    }

    #[tokio::test]
    async fn nonce_rules() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let run = |claims: Value, nonce: ExpectedNonce| {
            let id_token = unsigned(json!({"alg": "ES256"}), claims);
            let response = json_response(200, token_body(json!({"id_token": id_token})));
            let rp = rp.clone();
            async move {
                rp.process_authorization_code_openid_response(
                    &response,
                    &nonce,
                    MaxAge::SkipCheck,
                    &ResponseOptions::skip_signature_check(),
                )
                .await
            }
        };

        run(id_token_claims(json!({})), ExpectedNonce::Absent).await.unwrap();
        let err = run(id_token_claims(json!({"nonce": "x"})), ExpectedNonce::Absent)
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("unexpected ID Token \"nonce\"")));
        let err = run(id_token_claims(json!({})), ExpectedNonce::Value("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("missing")));
        let err = run(id_token_claims(json!({"nonce": "y"})), ExpectedNonce::Value("x".into()))
            .await
            .unwrap_err();
        assert!(err.is_processing());
        let err = run(id_token_claims(json!({})), ExpectedNonce::Value("".into()))
            .await
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn openid_flow_requires_id_token() {
        let (rp, _) = setup(ClientMetadata::new(CLIENT_ID));
        let err = rp
            .process_authorization_code_openid_response(
                &json_response(200, token_body(json!({}))),
                &ExpectedNonce::Absent,
                MaxAge::SkipCheck,
                &ResponseOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("id_token")));
    }
}

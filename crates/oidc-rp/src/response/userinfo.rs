use std::str;

use http::StatusCode;
use serde_json::{Map, Value};

use super::{
    JWT_CONTENT_TYPE, ResponseOptions, TOKEN_INTROSPECTION_JWT_CONTENT_TYPE, check_status,
    content_type, parse_object, required_string,
};
use crate::client::RelyingParty;
use crate::error::{Error, Outcome, Result};
use crate::http_client::HttpClient;
use crate::types::{ExpectedSubject, IntrospectionResponse, UserInfoResponse};
use crate::validate::RequiredClaim;

// https://datatracker.ietf.org/doc/html/rfc9701#section-5
const JWT_HEADER_TYP_TOKEN_INTROSPECTION: &str = "token-introspection+jwt";

fn body_text(response: &http::Response<Vec<u8>>) -> Result<&str> {
    str::from_utf8(response.body())
        .map_err(|e| Error::processing("\"response\" body is not valid UTF-8").with_source(e))
}

impl<C: HttpClient> RelyingParty<C> {
    /// Validate a UserInfo response, plain JSON or a signed JWT.
    ///
    /// A client with `userinfo_signed_response_alg` set only accepts the
    /// signed form. UserInfo errors are reported through `WWW-Authenticate`,
    /// see [`crate::challenge`], so any status but 200 is an error here.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn process_userinfo_response(
        &self,
        expected_subject: &ExpectedSubject,
        response: &http::Response<Vec<u8>>,
        options: &ResponseOptions,
    ) -> Result<UserInfoResponse> {
        if response.status() != StatusCode::OK {
            return Err(Error::unexpected_status(response.status())
                .with_context("\"response\" is not a conform UserInfo Endpoint response"));
        }

        let mut body: Map<String, Value> =
            if content_type(response).as_deref() == Some(JWT_CONTENT_TYPE) {
                let jwt = self
                    .validate_jwt(
                        body_text(response)?,
                        self.client.userinfo_signed_response_alg.as_ref(),
                        self.server.userinfo_signing_alg_values_supported.as_ref(),
                        options.signature,
                        &options.http,
                    )
                    .await?;
                jwt.require_audience_if_present(&self.client.client_id)?
                    .require_issuer_if_present(&self.server.issuer)?;
                jwt.into_claims().into_map()
            } else {
                if self.client.userinfo_signed_response_alg.is_some() {
                    return Err(Error::processing("JWT UserInfo Response expected"));
                }
                parse_object(response.body())?
            };

        let sub = required_string(&body, "sub")?;
        match expected_subject {
            ExpectedSubject::SkipCheck => {}
            ExpectedSubject::Value(expected) if expected.is_empty() => {
                return Err(Error::usage("\"expected_subject\" must be a non-empty string"));
            }
            ExpectedSubject::Value(expected) if *expected != sub => {
                return Err(Error::processing("unexpected \"response\" body \"sub\" value"));
            }
            ExpectedSubject::Value(_) => {}
        }

        body.remove("sub");
        Ok(UserInfoResponse { sub, claims: body })
    }

    /// Validate a token introspection response, plain JSON or a signed JWT
    /// per RFC 9701.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn process_introspection_response(
        &self,
        response: &http::Response<Vec<u8>>,
        options: &ResponseOptions,
    ) -> Result<Outcome<IntrospectionResponse>> {
        if let Some(err) = check_status(response, StatusCode::OK, "Introspection Endpoint")? {
            return Ok(Outcome::OAuth(err));
        }

        let mut body = if content_type(response).as_deref()
            == Some(TOKEN_INTROSPECTION_JWT_CONTENT_TYPE)
        {
            let jwt = self
                .validate_jwt(
                    body_text(response)?,
                    self.client.introspection_signed_response_alg.as_ref(),
                    self.server.introspection_signing_alg_values_supported.as_ref(),
                    options.signature,
                    &options.http,
                )
                .await?;
            jwt.require_type(JWT_HEADER_TYP_TOKEN_INTROSPECTION)?
                .require_claims(&[RequiredClaim::Aud, RequiredClaim::Iat, RequiredClaim::Iss])?
                .require_issuer(&self.server.issuer)?
                .require_audience(&self.client.client_id)?;
            match jwt.into_claims().into_map().remove("token_introspection") {
                Some(Value::Object(claims)) => claims,
                _ => {
                    return Err(Error::processing(
                        "JWT \"token_introspection\" claim must be a JSON object",
                    ));
                }
            }
        } else {
            parse_object(response.body())?
        };

        let active = match body.remove("active") {
            Some(Value::Bool(active)) => active,
            _ => {
                return Err(Error::processing(
                    "\"response\" body \"active\" property must be a boolean",
                ));
            }
        };
        Ok(Outcome::Ok(IntrospectionResponse {
            active,
            claims: body,
        }))
    }
}

use serde_json::Value;

use crate::client::RelyingParty;
use crate::error::{Error, OAuth2Error, Outcome, Result};
use crate::http_client::HttpClient;
use crate::request::HttpRequestOptions;
use crate::types::{
    AuthorizationServerMetadata, ExpectedState, FormParams, SignatureCheck, ValidatedCallback,
};
use crate::validate::RequiredClaim;

/// Validate the parameters of an authorization response (the redirect back to
/// the client).
///
/// An `error` parameter makes the result [`Outcome::OAuth`] once the `iss` and
/// `state` checks passed. Implicit and hybrid flow responses are refused.
///
/// <https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2>
/// <https://datatracker.ietf.org/doc/html/rfc9207>
pub fn validate_auth_response(
    server: &AuthorizationServerMetadata,
    params: &FormParams,
    expected_state: &ExpectedState,
) -> Result<Outcome<ValidatedCallback>> {
    if params.get_single("response")?.is_some_and(|r| !r.is_empty()) {
        return Err(Error::processing(
            "\"parameters\" contains a JARM response, use validate_jwt_auth_response instead of validate_auth_response",
        ));
    }

    let iss = params.get_single("iss")?;
    let state = params.get_single("state")?;

    match iss {
        None | Some("") if server.authorization_response_iss_parameter_supported == Some(true) => {
            return Err(Error::processing("response parameter \"iss\" (issuer) missing"));
        }
        Some(iss) if !iss.is_empty() && iss != server.issuer.as_str() => {
            return Err(Error::processing(
                "unexpected \"iss\" (issuer) response parameter value",
            ));
        }
        _ => {}
    }

    match expected_state {
        ExpectedState::Absent => {
            if state.is_some() {
                return Err(Error::processing(
                    "unexpected \"state\" response parameter encountered",
                ));
            }
        }
        ExpectedState::SkipCheck => {}
        ExpectedState::Value(expected) => {
            if expected.is_empty() {
                return Err(Error::usage("\"expected_state\" must be a non-empty string"));
            }
            match state {
                None => return Err(Error::processing("response parameter \"state\" missing")),
                Some(state) if state != expected.as_str() => {
                    return Err(Error::processing(
                        "unexpected \"state\" response parameter value",
                    ));
                }
                Some(_) => {}
            }
        }
    }

    if let Some(error) = params.get_single("error")?.filter(|e| !e.is_empty()) {
        let mut err = OAuth2Error::new(error);
        err.error_description = params.get_single("error_description")?.map(Into::into);
        err.error_uri = params.get_single("error_uri")?.map(Into::into);
        return Ok(Outcome::OAuth(err));
    }

    if params.get_single("id_token")?.is_some() || params.get_single("token")?.is_some() {
        return Err(Error::unsupported(
            "implicit and hybrid flows are not supported",
        ));
    }

    Ok(Outcome::Ok(ValidatedCallback(params.clone())))
}

impl<C: HttpClient> RelyingParty<C> {
    /// [`validate_auth_response`] against this relying party's issuer.
    pub fn validate_auth_response(
        &self,
        params: &FormParams,
        expected_state: &ExpectedState,
    ) -> Result<Outcome<ValidatedCallback>> {
        validate_auth_response(&self.server, params, expected_state)
    }

    /// Validate a JWT Secured Authorization Response (JARM).
    ///
    /// The signed `response` parameter is verified against the issuer's key
    /// set, then its string claims (all but `aud`) go through
    /// [`validate_auth_response`] as if they had been sent as plain
    /// parameters.
    ///
    /// <https://openid.net/specs/oauth-v2-jarm.html>
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn validate_jwt_auth_response(
        &self,
        params: &FormParams,
        expected_state: &ExpectedState,
        options: &HttpRequestOptions,
    ) -> Result<Outcome<ValidatedCallback>> {
        let response = params
            .get_single("response")?
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::processing("\"parameters\" does not contain a JARM response"))?;

        let jwt = self
            .validate_jwt(
                response,
                self.client.authorization_signed_response_alg.as_ref(),
                self.server.authorization_signing_alg_values_supported.as_ref(),
                SignatureCheck::Verify,
                options,
            )
            .await?;
        jwt.require_claims(&[RequiredClaim::Aud, RequiredClaim::Exp, RequiredClaim::Iss])?
            .require_issuer(&self.server.issuer)?
            .require_audience(&self.client.client_id)?;

        let projected: FormParams = jwt
            .claims()
            .as_map()
            .iter()
            .filter(|(name, _)| name.as_str() != "aud")
            .filter_map(|(name, value)| match value {
                Value::String(value) => Some((name.as_str(), value.as_str())),
                _ => None,
            })
            .collect();
        validate_auth_response(&self.server, &projected, expected_state)
    }
}

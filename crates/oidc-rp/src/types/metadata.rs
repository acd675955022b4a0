use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;
use url::Url;

use crate::error::{Error, Result};

/// Authorization server metadata, as published at the discovery endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorizationServerMetadata {
    // https://datatracker.ietf.org/doc/html/rfc8414#section-2
    pub issuer: SmolStr,
    pub authorization_endpoint: Option<SmolStr>,
    pub token_endpoint: Option<SmolStr>,
    pub jwks_uri: Option<SmolStr>,
    pub registration_endpoint: Option<SmolStr>,
    pub scopes_supported: Option<Vec<SmolStr>>,
    pub response_types_supported: Option<Vec<SmolStr>>,
    pub response_modes_supported: Option<Vec<SmolStr>>,
    pub grant_types_supported: Option<Vec<SmolStr>>,
    pub token_endpoint_auth_methods_supported: Option<Vec<SmolStr>>,
    pub token_endpoint_auth_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub service_documentation: Option<SmolStr>,
    pub ui_locales_supported: Option<Vec<SmolStr>>,
    pub op_policy_uri: Option<SmolStr>,
    pub op_tos_uri: Option<SmolStr>,
    pub revocation_endpoint: Option<SmolStr>,
    pub revocation_endpoint_auth_methods_supported: Option<Vec<SmolStr>>,
    pub revocation_endpoint_auth_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub introspection_endpoint: Option<SmolStr>,
    pub introspection_endpoint_auth_methods_supported: Option<Vec<SmolStr>>,
    pub introspection_endpoint_auth_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub code_challenge_methods_supported: Option<Vec<SmolStr>>,

    // https://datatracker.ietf.org/doc/html/rfc8628#section-4
    pub device_authorization_endpoint: Option<SmolStr>,

    // https://datatracker.ietf.org/doc/html/rfc8705#section-3.3
    pub tls_client_certificate_bound_access_tokens: Option<bool>,
    pub mtls_endpoint_aliases: Option<Map<String, Value>>,

    // https://openid.net/specs/openid-connect-discovery-1_0.html#ProviderMetadata
    pub userinfo_endpoint: Option<SmolStr>,
    pub acr_values_supported: Option<Vec<SmolStr>>,
    pub subject_types_supported: Option<Vec<SmolStr>>,
    pub id_token_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub userinfo_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub request_object_signing_alg_values_supported: Option<Vec<SmolStr>>,
    pub display_values_supported: Option<Vec<SmolStr>>,
    pub claim_types_supported: Option<Vec<SmolStr>>,
    pub claims_supported: Option<Vec<SmolStr>>,
    pub claims_parameter_supported: Option<bool>,
    pub request_parameter_supported: Option<bool>,
    pub request_uri_parameter_supported: Option<bool>,
    pub require_request_uri_registration: Option<bool>,
    pub end_session_endpoint: Option<SmolStr>,

    // https://datatracker.ietf.org/doc/html/rfc9126#section-5
    pub pushed_authorization_request_endpoint: Option<SmolStr>,
    pub require_pushed_authorization_requests: Option<bool>,

    // https://datatracker.ietf.org/doc/html/rfc9701#section-7
    pub introspection_signing_alg_values_supported: Option<Vec<SmolStr>>,

    // https://openid.net/specs/oauth-v2-jarm.html#section-4
    pub authorization_signing_alg_values_supported: Option<Vec<SmolStr>>,

    // https://datatracker.ietf.org/doc/html/rfc9207#section-3
    pub authorization_response_iss_parameter_supported: Option<bool>,

    // https://datatracker.ietf.org/doc/html/rfc9449#section-5.1
    pub dpop_signing_alg_values_supported: Option<Vec<SmolStr>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorizationServerMetadata {
    pub fn new(issuer: impl Into<SmolStr>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Check the invariants every operation relies on.
    pub fn validate(&self) -> Result<()> {
        if self.issuer.is_empty() {
            return Err(Error::usage("\"as.issuer\" must be a non-empty string"));
        }
        Url::parse(&self.issuer).map_err(|e| {
            Error::usage("\"as.issuer\" must be an absolute URL").with_source(e)
        })?;
        Ok(())
    }

    /// The URL of an optional endpoint, failing when it is not advertised.
    pub(crate) fn endpoint(&self, name: &'static str, value: Option<&SmolStr>) -> Result<Url> {
        let value = value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::usage(format!("\"as.{name}\" must be a string")))?;
        Url::parse(value)
            .map_err(|e| Error::usage(format!("\"as.{name}\" must be a valid URL")).with_source(e))
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::jose::jwt::{Audience, JwtClaims, numeric_date};

// https://datatracker.ietf.org/doc/html/rfc6749#section-7.1
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    #[serde(rename = "bearer")]
    Bearer,
    #[serde(rename = "dpop")]
    DPoP,
}

impl TokenType {
    /// Normalized, lower-case form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Bearer => "bearer",
            TokenType::DPoP => "dpop",
        }
    }

    /// `Authorization` header scheme for presenting the token.
    pub fn scheme(&self) -> &'static str {
        match self {
            TokenType::Bearer => "Bearer",
            TokenType::DPoP => "DPoP",
        }
    }
}

// https://datatracker.ietf.org/doc/html/rfc6749#section-5.1
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpointResponse {
    pub access_token: SmolStr,
    pub token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<SmolStr>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Validated claims of an ID Token.
///
/// <https://openid.net/specs/openid-connect-core-1_0.html#IDToken>
#[derive(Debug, Clone, PartialEq)]
pub struct IdTokenClaims {
    pub iss: SmolStr,
    pub sub: SmolStr,
    pub aud: Audience,
    pub iat: i64,
    pub exp: i64,
    pub nonce: Option<SmolStr>,
    pub auth_time: Option<i64>,
    pub azp: Option<SmolStr>,
    /// The complete claims set, registered claims included.
    pub claims: Map<String, Value>,
}

impl IdTokenClaims {
    pub(crate) fn from_claims(claims: JwtClaims) -> Result<Self> {
        let missing = |name: &str| {
            Error::processing(format!("missing JWT \"{name}\" claim in the ID Token"))
        };
        let optional_string = |name: &str| -> Result<Option<SmolStr>> {
            match claims.get(name) {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.as_str().into())),
                Some(_) => Err(Error::processing(format!(
                    "unexpected ID Token \"{name}\" claim type"
                ))),
            }
        };
        let nonce = optional_string("nonce")?;
        let azp = optional_string("azp")?;
        let auth_time = match claims.get("auth_time") {
            None => None,
            Some(v) => Some(numeric_date(v).ok_or_else(|| {
                Error::processing("unexpected ID Token \"auth_time\" claim type")
            })?),
        };

        Ok(Self {
            iss: claims.iss.clone().ok_or_else(|| missing("iss"))?,
            sub: claims.sub.clone().ok_or_else(|| missing("sub"))?,
            aud: claims.aud.clone().ok_or_else(|| missing("aud"))?,
            iat: claims.iat.ok_or_else(|| missing("iat"))?,
            exp: claims.exp.ok_or_else(|| missing("exp"))?,
            nonce,
            auth_time,
            azp,
            claims: claims.into_map(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// A token endpoint response paired with the claims of its ID Token, when
/// one was present and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub response: TokenEndpointResponse,
    pub id_token_claims: Option<IdTokenClaims>,
}

/// A token endpoint response from an OpenID Connect authorization code
/// exchange; the ID Token is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenIdTokenResponse {
    pub response: TokenEndpointResponse,
    pub id_token_claims: IdTokenClaims,
}

// https://openid.net/specs/openid-connect-core-1_0.html#UserInfoResponse
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserInfoResponse {
    pub sub: SmolStr,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

// https://datatracker.ietf.org/doc/html/rfc7662#section-2.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl IntrospectionResponse {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

// https://datatracker.ietf.org/doc/html/rfc9126#section-2.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PushedAuthorizationResponse {
    pub request_uri: SmolStr,
    pub expires_in: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// https://datatracker.ietf.org/doc/html/rfc8628#section-3.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorizationResponse {
    pub device_code: SmolStr,
    pub user_code: SmolStr,
    pub verification_uri: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<SmolStr>,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

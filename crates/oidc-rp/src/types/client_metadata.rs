use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::error::{Error, Result};

/// Token endpoint client authentication method.
///
/// <https://www.iana.org/assignments/oauth-parameters/oauth-parameters.xhtml#token-endpoint-auth-method>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Default)]
#[serde(from = "SmolStr", into = "SmolStr")]
pub enum ClientAuthMethod {
    #[default]
    ClientSecretBasic,
    ClientSecretPost,
    PrivateKeyJwt,
    None,
    /// Any method this crate does not implement.
    Other(SmolStr),
}

impl ClientAuthMethod {
    pub fn as_str(&self) -> &str {
        match self {
            ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
            ClientAuthMethod::ClientSecretPost => "client_secret_post",
            ClientAuthMethod::PrivateKeyJwt => "private_key_jwt",
            ClientAuthMethod::None => "none",
            ClientAuthMethod::Other(other) => other.as_str(),
        }
    }
}

impl From<SmolStr> for ClientAuthMethod {
    fn from(value: SmolStr) -> Self {
        match value.as_str() {
            "client_secret_basic" => ClientAuthMethod::ClientSecretBasic,
            "client_secret_post" => ClientAuthMethod::ClientSecretPost,
            "private_key_jwt" => ClientAuthMethod::PrivateKeyJwt,
            "none" => ClientAuthMethod::None,
            _ => ClientAuthMethod::Other(value),
        }
    }
}

impl From<&str> for ClientAuthMethod {
    fn from(value: &str) -> Self {
        SmolStr::from(value).into()
    }
}

impl From<ClientAuthMethod> for SmolStr {
    fn from(value: ClientAuthMethod) -> Self {
        match value {
            ClientAuthMethod::Other(other) => other,
            known => SmolStr::new_static(match known {
                ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
                ClientAuthMethod::ClientSecretPost => "client_secret_post",
                ClientAuthMethod::PrivateKeyJwt => "private_key_jwt",
                _ => "none",
            }),
        }
    }
}

impl fmt::Display for ClientAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered client metadata relevant to the relying party.
///
/// <https://datatracker.ietf.org/doc/html/rfc7591#section-2>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientMetadata {
    pub client_id: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<SmolStr>,
    /// Defaults to `client_secret_basic` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<ClientAuthMethod>,

    // https://openid.net/specs/openid-connect-registration-1_0.html#ClientMetadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<SmolStr>,
    #[serde(default)]
    pub require_auth_time: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_age: Option<u64>,

    // https://openid.net/specs/oauth-v2-jarm.html#section-3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_signed_response_alg: Option<SmolStr>,

    // https://datatracker.ietf.org/doc/html/rfc9701#section-6
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_signed_response_alg: Option<SmolStr>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientMetadata {
    pub fn new(client_id: impl Into<SmolStr>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_secret(mut self, secret: impl Into<SmolStr>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_auth_method(mut self, method: impl Into<ClientAuthMethod>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    pub fn auth_method(&self) -> ClientAuthMethod {
        self.token_endpoint_auth_method.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::usage("\"client.client_id\" must be a non-empty string"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_method_strings() {
        let client: ClientMetadata = serde_json::from_value(json!({
            "client_id": "c",
            "token_endpoint_auth_method": "tls_client_auth",
            "default_max_age": 600,
            "software_id": "x"
        }))
        .unwrap();
        assert_eq!(
            client.auth_method(),
            ClientAuthMethod::Other("tls_client_auth".into())
        );
        assert_eq!(client.extra.get("software_id"), Some(&json!("x")));
        assert_eq!(ClientMetadata::new("c").auth_method(), ClientAuthMethod::ClientSecretBasic);
        assert_eq!(
            serde_json::to_value(ClientAuthMethod::PrivateKeyJwt).unwrap(),
            json!("private_key_jwt")
        );
    }
}

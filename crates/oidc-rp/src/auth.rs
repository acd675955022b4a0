//! Client authentication at the token, PAR, revocation, introspection and
//! device authorization endpoints.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::jose::create_signed_jwt;
use crate::jose::jws::JwsHeader;
use crate::jose::jwt::{Audience, RegisteredClaims};
use crate::keys::ClientPrivateKey;
use crate::types::{AuthorizationServerMetadata, ClientAuthMethod, ClientMetadata, FormParams};
use crate::utils::{epoch_time, form_url_encode, random_token};

// https://datatracker.ietf.org/doc/html/rfc7523#section-2.2
pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a `private_key_jwt` client assertion, in seconds.
pub const CLIENT_ASSERTION_LIFETIME: i64 = 60;

fn client_secret(client: &ClientMetadata) -> Result<&str> {
    client
        .client_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::usage("\"client.client_secret\" property must be a non-empty string"))
}

fn no_private_key(method: &ClientAuthMethod, key: Option<&ClientPrivateKey>) -> Result<()> {
    if key.is_some() {
        return Err(Error::usage(format!(
            "a client private key must not be provided when {method} client authentication method is used"
        )));
    }
    Ok(())
}

fn no_secret(method: &ClientAuthMethod, client: &ClientMetadata) -> Result<()> {
    if client.client_secret.is_some() {
        return Err(Error::usage(format!(
            "\"client.client_secret\" property must not be provided when {method} client authentication method is used"
        )));
    }
    Ok(())
}

/// `Basic` credentials with both halves form-url-encoded first.
///
/// <https://datatracker.ietf.org/doc/html/rfc6749#section-2.3.1>
pub fn client_secret_basic(client_id: &str, client_secret: &str) -> String {
    let username = form_url_encode(client_id);
    let password = form_url_encode(client_secret);
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Claims of a `private_key_jwt` client assertion issued at `now`.
///
/// <https://datatracker.ietf.org/doc/html/rfc7523#section-3>
pub(crate) fn client_assertion_claims(
    server: &AuthorizationServerMetadata,
    client: &ClientMetadata,
    now: i64,
) -> RegisteredClaims {
    let mut aud = vec![server.issuer.clone()];
    if let Some(token_endpoint) = &server.token_endpoint {
        aud.push(token_endpoint.clone());
    }
    RegisteredClaims {
        iss: Some(client.client_id.clone()),
        sub: Some(client.client_id.clone()),
        aud: Some(Audience::Multiple(aud)),
        exp: Some(now + CLIENT_ASSERTION_LIFETIME),
        nbf: Some(now),
        iat: Some(now),
        jti: Some(random_token()),
    }
}

/// Sign a client assertion with the algorithm the key implies.
pub fn private_key_jwt(
    server: &AuthorizationServerMetadata,
    client: &ClientMetadata,
    key: &ClientPrivateKey,
) -> Result<String> {
    let header = JwsHeader::from(key.key.algorithm()).with_kid(key.kid.clone());
    let claims = client_assertion_claims(server, client, epoch_time());
    create_signed_jwt(&key.key, &header, &claims)
}

/// Apply the client's `token_endpoint_auth_method` to an outgoing request.
///
/// Any `client_secret`, `client_assertion_type` or `client_assertion` already
/// in `body` is removed first.
pub fn client_authentication(
    server: &AuthorizationServerMetadata,
    client: &ClientMetadata,
    body: &mut FormParams,
    headers: &mut HeaderMap,
    key: Option<&ClientPrivateKey>,
) -> Result<()> {
    body.delete("client_secret");
    body.delete("client_assertion_type");
    body.delete("client_assertion");

    let method = client.auth_method();
    match &method {
        ClientAuthMethod::ClientSecretBasic => {
            no_private_key(&method, key)?;
            let credentials = client_secret_basic(&client.client_id, client_secret(client)?);
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&credentials)?);
        }
        ClientAuthMethod::ClientSecretPost => {
            no_private_key(&method, key)?;
            let secret = SmolStr::new(client_secret(client)?);
            body.set("client_id", client.client_id.clone());
            body.set("client_secret", secret);
        }
        ClientAuthMethod::PrivateKeyJwt => {
            no_secret(&method, client)?;
            let key = key.ok_or_else(|| {
                Error::usage(
                    "a client private key must be provided when \"client.token_endpoint_auth_method\" is \"private_key_jwt\"",
                )
            })?;
            let assertion = private_key_jwt(server, client, key)?;
            body.set("client_id", client.client_id.clone());
            body.set("client_assertion_type", CLIENT_ASSERTION_TYPE_JWT_BEARER);
            body.set("client_assertion", assertion);
        }
        ClientAuthMethod::None => {
            no_secret(&method, client)?;
            no_private_key(&method, key)?;
            body.set("client_id", client.client_id.clone());
        }
        ClientAuthMethod::Other(other) => {
            return Err(Error::unsupported(format!(
                "unsupported client token_endpoint_auth_method {other:?}"
            )));
        }
    }
    Ok(())
}

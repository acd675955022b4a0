use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::{CryptoRng, RngCore, rngs::ThreadRng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::keys::PublicKey;

/// Characters left alone by ECMAScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Seconds since the unix epoch.
pub fn epoch_time() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn get_random_values<R, const LEN: usize>(rng: &mut R) -> [u8; LEN]
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// 32 random bytes, base64url encoded.
pub(crate) fn random_token() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, 32>(&mut ThreadRng::default()))
        .into()
}

/// Random `state` value for an authorization request.
pub fn generate_random_state() -> SmolStr {
    random_token()
}

/// Random `nonce` value for an OpenID Connect authorization request.
pub fn generate_random_nonce() -> SmolStr {
    random_token()
}

/// Random PKCE `code_verifier`.
pub fn generate_random_code_verifier() -> SmolStr {
    random_token()
}

/// S256 PKCE `code_challenge` for `verifier`.
///
/// <https://datatracker.ietf.org/doc/html/rfc7636#section-4.2>
pub fn calculate_pkce_code_challenge(verifier: &str) -> Result<SmolStr> {
    if verifier.is_empty() {
        return Err(Error::usage("\"codeVerifier\" must be a non-empty string"));
    }
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(verifier)).into())
}

/// base64url(SHA-256(value)), as used for DPoP `ath` and PKCE.
pub(crate) fn sha256_b64u(value: &str) -> SmolStr {
    URL_SAFE_NO_PAD.encode(Sha256::digest(value)).into()
}

#[derive(Serialize)]
struct EcThumbprint<'a> {
    crv: &'a str,
    kty: &'a str,
    x: &'a str,
    y: &'a str,
}

#[derive(Serialize)]
struct OkpThumbprint<'a> {
    crv: &'a str,
    kty: &'a str,
    x: &'a str,
}

#[derive(Serialize)]
struct RsaThumbprint<'a> {
    e: &'a str,
    kty: &'a str,
    n: &'a str,
}

/// JWK SHA-256 thumbprint of a public key.
///
/// <https://datatracker.ietf.org/doc/html/rfc7638>
pub fn calculate_jwk_thumbprint(key: &PublicKey) -> Result<SmolStr> {
    fn field(value: &Option<SmolStr>) -> Result<&str> {
        value
            .as_deref()
            .ok_or_else(|| Error::crypto("exported JWK is missing public key members"))
    }

    let jwk = key.to_jwk();
    let canonical = match jwk.kty.as_str() {
        "EC" => serde_json::to_vec(&EcThumbprint {
            crv: field(&jwk.crv)?,
            kty: "EC",
            x: field(&jwk.x)?,
            y: field(&jwk.y)?,
        })?,
        "OKP" => serde_json::to_vec(&OkpThumbprint {
            crv: field(&jwk.crv)?,
            kty: "OKP",
            x: field(&jwk.x)?,
        })?,
        "RSA" => serde_json::to_vec(&RsaThumbprint {
            e: field(&jwk.e)?,
            kty: "RSA",
            n: field(&jwk.n)?,
        })?,
        other => return Err(Error::unsupported(format!("unsupported JWK \"kty\" {other}"))),
    };
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical)).into())
}

/// `application/x-www-form-urlencoded` encoding of a single token, used for
/// HTTP Basic client credentials.
///
/// <https://datatracker.ietf.org/doc/html/rfc6749#section-2.3.1>
pub fn form_url_encode(token: &str) -> String {
    utf8_percent_encode(token, URI_COMPONENT)
        .to_string()
        .replace("%20", "+")
}

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;

use super::jws::JwsHeader;
use crate::error::{Error, Result};
use crate::keys::PrivateKey;

/// Sign `claims` as a compact JWS with `key`.
///
/// `header.alg` must name the algorithm implied by the key.
pub fn create_signed_jwt<T: Serialize>(
    key: &PrivateKey,
    header: &JwsHeader,
    claims: &T,
) -> Result<String> {
    if header.alg != key.algorithm().as_str() {
        return Err(Error::usage(format!(
            "JWS header \"alg\" {} does not match the {} signing key",
            header.alg,
            key.algorithm()
        )));
    }
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signature = key.sign(format!("{header}.{payload}").as_bytes())?;
    Ok(format!(
        "{header}.{payload}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

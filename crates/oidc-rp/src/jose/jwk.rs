use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

/// Members that only appear in private JWKs.
const PRIVATE_MEMBERS: &[&str] = &["d", "p", "q", "dp", "dq", "qi", "oth", "k"];

/// A JSON Web Key with the registered members used for signature keys.
///
/// Unknown members (including any private key material) are kept in `extra`.
///
/// <https://datatracker.ietf.org/doc/html/rfc7517#section-4>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Jwk {
    #[serde(default)]
    pub kty: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<SmolStr>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<SmolStr>>,

    // https://datatracker.ietf.org/doc/html/rfc7518#section-6.2.1
    // https://datatracker.ietf.org/doc/html/rfc8037#section-2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<SmolStr>,

    // https://datatracker.ietf.org/doc/html/rfc7518#section-6.3.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<SmolStr>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Jwk {
    pub fn has_private_material(&self) -> bool {
        PRIVATE_MEMBERS.iter().any(|m| self.extra.contains_key(*m))
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc7517#section-5>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

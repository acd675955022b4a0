use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use super::jwk::Jwk;
use crate::keys::JwsAlgorithm;

/// Protected header of a compact JWS.
///
/// <https://datatracker.ietf.org/doc/html/rfc7515#section-4.1>
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct JwsHeader {
    pub alg: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jku: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crit: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<JwsAlgorithm> for JwsHeader {
    fn from(alg: JwsAlgorithm) -> Self {
        Self {
            alg: alg.as_str().into(),
            ..Default::default()
        }
    }
}

impl JwsHeader {
    pub fn with_typ(mut self, typ: impl Into<SmolStr>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    pub fn with_kid(mut self, kid: Option<SmolStr>) -> Self {
        self.kid = kid;
        self
    }

    pub fn with_jwk(mut self, jwk: Jwk) -> Self {
        self.jwk = Some(jwk);
        self
    }
}

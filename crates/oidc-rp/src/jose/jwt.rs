use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::error::{Error, Result};

/// Claims of a JWT this crate issues (DPoP proofs, client assertions,
/// request objects).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Claims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
    #[serde(flatten)]
    pub public: PublicClaims,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisteredClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<SmolStr>,
}

// https://datatracker.ietf.org/doc/html/rfc9449#section-4.2
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PublicClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htm: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htu: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<SmolStr>,
}

impl From<RegisteredClaims> for Claims {
    fn from(registered: RegisteredClaims) -> Self {
        Self {
            registered,
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    Single(SmolStr),
    Multiple(Vec<SmolStr>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == value,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == value),
        }
    }

    /// Number of entries; a single string counts as one.
    pub fn len(&self) -> usize {
        match self {
            Audience::Single(_) => 1,
            Audience::Multiple(auds) => auds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claims set of a received JWT.
///
/// The registered claims have been type checked; everything else is
/// available untouched through [`JwtClaims::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct JwtClaims {
    pub iss: Option<SmolStr>,
    pub sub: Option<SmolStr>,
    pub aud: Option<Audience>,
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
    pub iat: Option<i64>,
    pub jti: Option<SmolStr>,
    raw: Map<String, Value>,
}

/// NumericDate as whole seconds, truncated. Time checks use the raw number.
pub(crate) fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

impl JwtClaims {
    pub(crate) fn from_object(raw: Map<String, Value>) -> Result<Self> {
        let date = |name: &str, label: &str| -> Result<Option<i64>> {
            match raw.get(name) {
                None => Ok(None),
                Some(v) => numeric_date(v).map(Some).ok_or_else(|| {
                    Error::processing(format!("unexpected JWT \"{name}\" ({label}) claim type"))
                }),
            }
        };
        let string = |name: &str, label: &str| -> Result<Option<SmolStr>> {
            match raw.get(name) {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.as_str().into())),
                Some(_) => Err(Error::processing(format!(
                    "unexpected JWT \"{name}\" ({label}) claim type"
                ))),
            }
        };

        let exp = date("exp", "expiration time")?;
        let iat = date("iat", "issued at")?;
        let nbf = date("nbf", "not before")?;
        let iss = string("iss", "issuer")?;
        let sub = string("sub", "subject")?;
        let jti = string("jti", "JWT ID")?;
        let aud = match raw.get("aud") {
            None => None,
            Some(v @ (Value::String(_) | Value::Array(_))) => Some(
                Audience::deserialize(v)
                    .map_err(|_| Error::processing("unexpected JWT \"aud\" (audience) claim type"))?,
            ),
            Some(_) => {
                return Err(Error::processing(
                    "unexpected JWT \"aud\" (audience) claim type",
                ));
            }
        };

        Ok(Self {
            iss,
            sub,
            aud,
            exp,
            nbf,
            iat,
            jti,
            raw,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.raw
    }
}

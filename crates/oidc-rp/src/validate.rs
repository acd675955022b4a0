//! Composable claim checks applied to a parsed JWT.
//!
//! Every check borrows the token and hands it back on success, so checks
//! chain with `?`:
//!
//! ```ignore
//! jwt.require_claims(&[RequiredClaim::Aud, RequiredClaim::Iss])?
//!     .require_issuer(&server.issuer)?
//!     .require_audience(&client.client_id)?;
//! ```

use smol_str::SmolStr;

use crate::FALLBACK_ALG;
use crate::error::{Error, Result};
use crate::jose::ParsedJwt;
use crate::jose::jws::JwsHeader;

/// Registered claims whose presence can be required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredClaim {
    Aud,
    Exp,
    Iat,
    Iss,
    Sub,
}

impl RequiredClaim {
    pub fn name(&self) -> &'static str {
        match self {
            RequiredClaim::Aud => "aud",
            RequiredClaim::Exp => "exp",
            RequiredClaim::Iat => "iat",
            RequiredClaim::Iss => "iss",
            RequiredClaim::Sub => "sub",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RequiredClaim::Aud => "audience",
            RequiredClaim::Exp => "expiration time",
            RequiredClaim::Iat => "issued at",
            RequiredClaim::Iss => "issuer",
            RequiredClaim::Sub => "subject",
        }
    }
}

/// Lower-case a media type and drop a leading `application/`.
pub fn normalize_typ(value: &str) -> String {
    let lower = value.to_lowercase();
    match lower.strip_prefix("application/") {
        Some(rest) => rest.to_owned(),
        None => lower,
    }
}

impl ParsedJwt {
    pub fn require_claims(&self, required: &[RequiredClaim]) -> Result<&Self> {
        let claims = self.claims();
        for claim in required {
            let present = match claim {
                RequiredClaim::Aud => claims.aud.is_some(),
                RequiredClaim::Exp => claims.exp.is_some(),
                RequiredClaim::Iat => claims.iat.is_some(),
                RequiredClaim::Iss => claims.iss.is_some(),
                RequiredClaim::Sub => claims.sub.is_some(),
            };
            if !present {
                return Err(Error::processing(format!(
                    "JWT \"{}\" ({}) claim missing",
                    claim.name(),
                    claim.label()
                )));
            }
        }
        Ok(self)
    }

    pub fn require_issuer(&self, expected: &str) -> Result<&Self> {
        if self.claims().iss.as_deref() != Some(expected) {
            return Err(Error::processing(
                "unexpected JWT \"iss\" (issuer) claim value",
            ));
        }
        Ok(self)
    }

    /// Same as [`ParsedJwt::require_issuer`], skipped when `iss` is absent.
    pub fn require_issuer_if_present(&self, expected: &str) -> Result<&Self> {
        match self.claims().iss {
            Some(_) => self.require_issuer(expected),
            None => Ok(self),
        }
    }

    /// `aud` must equal `expected`, or contain it when it is an array.
    pub fn require_audience(&self, expected: &str) -> Result<&Self> {
        match &self.claims().aud {
            Some(aud) if aud.contains(expected) => Ok(self),
            _ => Err(Error::processing(
                "unexpected JWT \"aud\" (audience) claim value",
            )),
        }
    }

    pub fn require_audience_if_present(&self, expected: &str) -> Result<&Self> {
        match self.claims().aud {
            Some(_) => self.require_audience(expected),
            None => Ok(self),
        }
    }

    /// The `typ` header, normalized with [`normalize_typ`], must equal `expected`.
    pub fn require_type(&self, expected: &str) -> Result<&Self> {
        match self.header().typ.as_deref() {
            Some(typ) if normalize_typ(typ) == expected => Ok(self),
            _ => Err(Error::processing(
                "unexpected JWT \"typ\" header parameter value",
            )),
        }
    }
}

/// Signing algorithm policy.
///
/// An algorithm pinned in client metadata must match exactly. Otherwise the
/// issuer's advertised list, when there is one, must contain the algorithm.
/// Otherwise only [`FALLBACK_ALG`] is accepted.
pub fn check_signing_algorithm(
    client: Option<&str>,
    issuer: Option<&[SmolStr]>,
    header: &JwsHeader,
) -> Result<()> {
    let alg = header.alg.as_str();
    let allowed = match (client, issuer) {
        (Some(pinned), _) => alg == pinned,
        (None, Some(supported)) => supported.iter().any(|s| s == alg),
        (None, None) => alg == FALLBACK_ALG,
    };
    if !allowed {
        return Err(Error::unexpected_algorithm(alg));
    }
    Ok(())
}

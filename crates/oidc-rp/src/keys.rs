//! Asymmetric keys and the JWS algorithms this crate signs and verifies with.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::jose::jwk::Jwk;

/// Smallest RSA modulus accepted for signing or verification, in bits.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// The JWS algorithms supported for every signed artifact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JwsAlgorithm {
    #[serde(rename = "PS256")]
    Ps256,
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl JwsAlgorithm {
    pub const SUPPORTED: [JwsAlgorithm; 4] = [
        JwsAlgorithm::Ps256,
        JwsAlgorithm::Es256,
        JwsAlgorithm::Rs256,
        JwsAlgorithm::EdDsa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JwsAlgorithm::Ps256 => "PS256",
            JwsAlgorithm::Es256 => "ES256",
            JwsAlgorithm::Rs256 => "RS256",
            JwsAlgorithm::EdDsa => "EdDSA",
        }
    }

    /// JWK `kty` family the algorithm needs.
    pub fn key_type(&self) -> &'static str {
        match self {
            JwsAlgorithm::Ps256 | JwsAlgorithm::Rs256 => "RSA",
            JwsAlgorithm::Es256 => "EC",
            JwsAlgorithm::EdDsa => "OKP",
        }
    }

    /// JWK `crv` the algorithm needs, for curve based key types.
    pub fn curve(&self) -> Option<&'static str> {
        match self {
            JwsAlgorithm::Es256 => Some("P-256"),
            JwsAlgorithm::EdDsa => Some("Ed25519"),
            _ => None,
        }
    }
}

impl FromStr for JwsAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JwsAlgorithm::SUPPORTED
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| Error::unsupported(format!("unsupported JWS \"alg\" identifier {s:?}")))
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_rsa_modulus(key: &RsaPublicKey) -> Result<()> {
    if key.size() * 8 < MIN_RSA_MODULUS_BITS {
        return Err(Error::unsupported(format!(
            "RSA keys must have a modulus of at least {MIN_RSA_MODULUS_BITS} bits"
        )));
    }
    Ok(())
}

fn decode_member(jwk: &Jwk, value: &Option<SmolStr>, name: &str) -> Result<Vec<u8>> {
    let encoded = value
        .as_deref()
        .ok_or_else(|| Error::processing(format!("JWK of type {} is missing \"{name}\"", jwk.kty)))?;
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::processing(format!("JWK \"{name}\" is not base64url")).with_source(e))
}

fn fixed<const N: usize>(bytes: &[u8], name: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::processing(format!("JWK \"{name}\" must be {N} bytes")))
}

/// A public key usable for JWS verification, or exported as a bare JWK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    Rsa(RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Import the public members of `jwk`.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        match jwk.kty.as_str() {
            "EC" => {
                if jwk.crv.as_deref() != Some("P-256") {
                    return Err(Error::unsupported("unsupported EC JWK \"crv\""));
                }
                let x = fixed::<32>(&decode_member(jwk, &jwk.x, "x")?, "x")?;
                let y = fixed::<32>(&decode_member(jwk, &jwk.y, "y")?, "y")?;
                let mut sec1 = Vec::with_capacity(65);
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map(PublicKey::P256)
                    .map_err(|_| Error::crypto("EC JWK is not a valid P-256 point"))
            }
            "RSA" => {
                let n = decode_member(jwk, &jwk.n, "n")?;
                let e = decode_member(jwk, &jwk.e, "e")?;
                RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
                    .map(PublicKey::Rsa)
                    .map_err(|e| Error::crypto("RSA JWK could not be imported").with_source(e))
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(Error::unsupported("unsupported OKP JWK \"crv\""));
                }
                let x = fixed::<32>(&decode_member(jwk, &jwk.x, "x")?, "x")?;
                ed25519_dalek::VerifyingKey::from_bytes(&x)
                    .map(PublicKey::Ed25519)
                    .map_err(|_| Error::crypto("OKP JWK is not a valid Ed25519 point"))
            }
            other => Err(Error::unsupported(format!("unsupported JWK \"kty\" {other:?}"))),
        }
    }

    /// Bare JWK: key type and public coordinates, nothing else.
    pub fn to_jwk(&self) -> Jwk {
        let b64 = |bytes: &[u8]| -> Option<SmolStr> { Some(URL_SAFE_NO_PAD.encode(bytes).into()) };
        match self {
            PublicKey::P256(key) => {
                let point = key.to_encoded_point(false);
                Jwk {
                    kty: "EC".into(),
                    crv: Some("P-256".into()),
                    x: point.x().and_then(|x| b64(x)),
                    y: point.y().and_then(|y| b64(y)),
                    ..Default::default()
                }
            }
            PublicKey::Rsa(key) => Jwk {
                kty: "RSA".into(),
                n: b64(&key.n().to_bytes_be()),
                e: b64(&key.e().to_bytes_be()),
                ..Default::default()
            },
            PublicKey::Ed25519(key) => Jwk {
                kty: "OKP".into(),
                crv: Some("Ed25519".into()),
                x: b64(key.as_bytes()),
                ..Default::default()
            },
        }
    }

    /// Whether this key can verify signatures made with `alg`.
    pub fn supports(&self, alg: JwsAlgorithm) -> bool {
        matches!(
            (self, alg),
            (PublicKey::P256(_), JwsAlgorithm::Es256)
                | (PublicKey::Rsa(_), JwsAlgorithm::Rs256 | JwsAlgorithm::Ps256)
                | (PublicKey::Ed25519(_), JwsAlgorithm::EdDsa)
        )
    }

    pub fn verify(&self, alg: JwsAlgorithm, message: &[u8], signature: &[u8]) -> Result<()> {
        let invalid = |_| Error::invalid_signature();
        match (self, alg) {
            (PublicKey::P256(key), JwsAlgorithm::Es256) => {
                let sig = p256::ecdsa::Signature::from_slice(signature).map_err(invalid)?;
                key.verify(message, &sig).map_err(invalid)
            }
            (PublicKey::Rsa(key), JwsAlgorithm::Rs256) => {
                check_rsa_modulus(key)?;
                let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(invalid)?;
                rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(invalid)
            }
            (PublicKey::Rsa(key), JwsAlgorithm::Ps256) => {
                check_rsa_modulus(key)?;
                let sig = rsa::pss::Signature::try_from(signature).map_err(invalid)?;
                rsa::pss::VerifyingKey::<Sha256>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(invalid)
            }
            (PublicKey::Ed25519(key), JwsAlgorithm::EdDsa) => {
                let sig = ed25519_dalek::Signature::from_slice(signature).map_err(invalid)?;
                key.verify(message, &sig).map_err(invalid)
            }
            _ => Err(Error::unsupported(format!(
                "key type does not match the {alg} JWS algorithm"
            ))),
        }
    }
}

/// A private signing key. The variant fixes the JWS algorithm.
#[derive(Clone)]
pub enum PrivateKey {
    Es256(p256::ecdsa::SigningKey),
    Rs256(RsaPrivateKey),
    /// RSASSA-PSS with SHA-256 and a 32 byte salt.
    Ps256(RsaPrivateKey),
    EdDsa(ed25519_dalek::SigningKey),
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&self.algorithm()).finish()
    }
}

impl PrivateKey {
    pub fn algorithm(&self) -> JwsAlgorithm {
        match self {
            PrivateKey::Es256(_) => JwsAlgorithm::Es256,
            PrivateKey::Rs256(_) => JwsAlgorithm::Rs256,
            PrivateKey::Ps256(_) => JwsAlgorithm::Ps256,
            PrivateKey::EdDsa(_) => JwsAlgorithm::EdDsa,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Es256(key) => PublicKey::P256(p256::ecdsa::VerifyingKey::from(key)),
            PrivateKey::Rs256(key) | PrivateKey::Ps256(key) => PublicKey::Rsa(key.to_public_key()),
            PrivateKey::EdDsa(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    /// JWS signature over `message` (raw `r || s` for ES256).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let failed = |e: signature::Error| Error::crypto("signing failed").with_source(e);
        match self {
            PrivateKey::Es256(key) => {
                let sig: p256::ecdsa::Signature = key.try_sign(message).map_err(failed)?;
                Ok(sig.to_bytes().to_vec())
            }
            PrivateKey::Rs256(key) => {
                check_rsa_modulus(&key.to_public_key())?;
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                Ok(signer.try_sign(message).map_err(failed)?.to_vec())
            }
            PrivateKey::Ps256(key) => {
                check_rsa_modulus(&key.to_public_key())?;
                let signer = rsa::pss::SigningKey::<Sha256>::new(key.clone());
                Ok(signer
                    .try_sign_with_rng(&mut rand::rngs::OsRng, message)
                    .map_err(failed)?
                    .to_vec())
            }
            PrivateKey::EdDsa(key) => {
                let sig = key.try_sign(message).map_err(failed)?;
                Ok(sig.to_bytes().to_vec())
            }
        }
    }
}

impl From<p256::ecdsa::SigningKey> for PrivateKey {
    fn from(key: p256::ecdsa::SigningKey) -> Self {
        PrivateKey::Es256(key)
    }
}

impl From<ed25519_dalek::SigningKey> for PrivateKey {
    fn from(key: ed25519_dalek::SigningKey) -> Self {
        PrivateKey::EdDsa(key)
    }
}

/// Private key used for `private_key_jwt` client authentication and request
/// objects, with the key ID the server knows it by.
#[derive(Debug, Clone)]
pub struct ClientPrivateKey {
    pub key: PrivateKey,
    pub kid: Option<SmolStr>,
}

impl ClientPrivateKey {
    pub fn new(key: impl Into<PrivateKey>) -> Self {
        Self {
            key: key.into(),
            kid: None,
        }
    }

    pub fn with_kid(mut self, kid: impl Into<SmolStr>) -> Self {
        self.kid = Some(kid.into());
        self
    }
}

//! DPoP proof construction and server nonce tracking.
//!
//! <https://datatracker.ietf.org/doc/html/rfc9449>

use http::{HeaderMap, HeaderValue, Method};
use serde_json::Map;
use smol_str::SmolStr;
use tokio::sync::Mutex;
use url::Url;

use crate::cache::GenerationCache;
use crate::error::{Error, Result};
use crate::jose::create_signed_jwt;
use crate::jose::jws::JwsHeader;
use crate::jose::jwt::{Claims, PublicClaims, RegisteredClaims};
use crate::keys::{PrivateKey, PublicKey};
use crate::utils::{epoch_time, random_token, sha256_b64u};

pub const JWT_HEADER_TYP_DPOP: &str = "dpop+jwt";

/// Request header carrying the proof.
pub const DPOP_HEADER: &str = "dpop";

/// Response header carrying a fresh server nonce.
pub const DPOP_NONCE_HEADER: &str = "dpop-nonce";

/// Number of origins whose last nonce is remembered.
pub const DPOP_NONCE_CACHE_SIZE: usize = 100;

/// The key pair a client proves possession of.
#[derive(Debug, Clone)]
pub struct DpopKeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl DpopKeyPair {
    /// Pair `private` with its public half; fails if they do not belong together.
    pub fn new(private: PrivateKey, public: PublicKey) -> Result<Self> {
        if private.public_key() != public {
            return Err(Error::usage(
                "\"DPoP.publicKey\" must be the public key of \"DPoP.privateKey\"",
            ));
        }
        Ok(Self { private, public })
    }

    pub fn from_private(private: impl Into<PrivateKey>) -> Self {
        let private = private.into();
        let public = private.public_key();
        Self { private, public }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

/// DPoP settings for one request.
#[derive(Debug, Clone)]
pub struct DpopOptions {
    pub key_pair: DpopKeyPair,
    /// Nonce to use instead of the one remembered for the target origin.
    pub nonce: Option<SmolStr>,
}

impl DpopOptions {
    pub fn new(key_pair: DpopKeyPair) -> Self {
        Self {
            key_pair,
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<SmolStr>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// Last `dpop-nonce` seen per origin.
#[derive(Debug)]
pub struct DpopNonceCache {
    nonces: Mutex<GenerationCache<SmolStr, SmolStr>>,
}

impl Default for DpopNonceCache {
    fn default() -> Self {
        Self::with_capacity(DPOP_NONCE_CACHE_SIZE)
    }
}

impl DpopNonceCache {
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            nonces: Mutex::new(GenerationCache::new(max_size)),
        }
    }

    pub async fn get(&self, origin: &str) -> Option<SmolStr> {
        self.nonces.lock().await.get(origin)
    }

    pub async fn set(&self, origin: impl Into<SmolStr>, nonce: impl Into<SmolStr>) {
        self.nonces.lock().await.set(origin.into(), nonce.into());
    }
}

/// `scheme://host[:port]` of `url`, the key nonces are remembered under.
pub(crate) fn origin(url: &Url) -> SmolStr {
    url.origin().ascii_serialization().into()
}

/// Sign a DPoP proof for `htm` `htu`.
///
/// `ath` binds the proof to an access token and is the base64url SHA-256 of it.
pub fn build_dpop_proof(
    key_pair: &DpopKeyPair,
    htm: &str,
    htu: &str,
    nonce: Option<SmolStr>,
    ath: Option<SmolStr>,
) -> Result<String> {
    let header = JwsHeader::from(key_pair.private.algorithm())
        .with_typ(JWT_HEADER_TYP_DPOP)
        .with_jwk(key_pair.public.to_jwk());

    let claims = Claims {
        registered: RegisteredClaims {
            iat: Some(epoch_time()),
            jti: Some(random_token()),
            ..Default::default()
        },
        public: PublicClaims {
            htm: Some(htm.into()),
            htu: Some(htu.into()),
            ath,
            nonce,
        },
        extra: Map::new(),
    };

    create_signed_jwt(&key_pair.private, &header, &claims)
}

/// Attach a `dpop` proof for `method` `url` to `headers`.
///
/// The nonce is `options.nonce` when set, otherwise the last one the origin
/// handed out. Query and fragment are not part of the proof's `htu`.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, fields(%method, %url)))]
pub async fn dpop_proof(
    headers: &mut HeaderMap,
    options: &DpopOptions,
    nonces: &DpopNonceCache,
    url: &Url,
    method: &Method,
    access_token: Option<&str>,
) -> Result<()> {
    let nonce = match &options.nonce {
        Some(nonce) => Some(nonce.clone()),
        None => nonces.get(&origin(url)).await,
    };
    if nonce.as_ref().is_some_and(|n| n.is_empty()) {
        return Err(Error::usage("\"DPoP.nonce\" must be a non-empty string"));
    }

    let htu = format!("{}{}", url.origin().ascii_serialization(), url.path());
    let ath = access_token.map(sha256_b64u);
    let proof = build_dpop_proof(&options.key_pair, method.as_str(), &htu, nonce, ath)?;
    headers.insert(DPOP_HEADER, HeaderValue::from_str(&proof)?);
    Ok(())
}

/// Remember the `dpop-nonce` a response from `url` carried, if any, for the
/// next proof sent to the same origin.
pub async fn process_dpop_nonce<B>(
    nonces: &DpopNonceCache,
    url: &Url,
    response: &http::Response<B>,
) {
    let Some(nonce) = response
        .headers()
        .get(DPOP_NONCE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };
    #[cfg(feature = "tracing")]
    tracing::debug!(origin = %origin(url), "storing dpop nonce");
    nonces.set(origin(url), nonce).await;
}

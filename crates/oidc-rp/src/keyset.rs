//! Issuer key set cache and verification key selection.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::sync::Mutex;

use crate::cache::GenerationCache;
use crate::error::{Error, ErrorKind, Result};
use crate::http_client::HttpClient;
use crate::jose::jwk::{Jwk, JwkSet};
use crate::jose::jws::JwsHeader;
use crate::keys::{JwsAlgorithm, PublicKey};
use crate::request::{HttpRequestOptions, jwks_request};
use crate::response::process_jwks_response;
use crate::types::AuthorizationServerMetadata;
use crate::utils::epoch_time;

/// Number of issuer key sets kept.
pub const KEY_SET_CACHE_SIZE: usize = 20;

/// Age in seconds after which a cached key set is always fetched again.
pub const KEY_SET_MAX_AGE: i64 = 300;

/// Minimum age in seconds before a key set with no matching key is fetched
/// again.
pub const KEY_SET_RETRY_AGE: i64 = 60;

/// A fetched key set and the keys imported from it so far.
#[derive(Debug)]
pub struct CachedKeySet {
    jwks: JwkSet,
    fetched_at: i64,
    imported: DashMap<(JwsAlgorithm, usize), PublicKey>,
}

impl CachedKeySet {
    pub fn new(jwks: JwkSet, fetched_at: i64) -> Self {
        Self {
            jwks,
            fetched_at,
            imported: DashMap::new(),
        }
    }

    pub fn key_set(&self) -> &JwkSet {
        &self.jwks
    }

    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    pub fn age_at(&self, now: i64) -> i64 {
        now - self.fetched_at
    }

    /// Indices of the keys that may verify a token signed with `alg` and
    /// carrying `kid`.
    pub fn candidates(&self, alg: JwsAlgorithm, kid: Option<&str>) -> Vec<usize> {
        self.jwks
            .keys
            .iter()
            .enumerate()
            .filter(|(_, jwk)| is_candidate(jwk, alg, kid))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Import key `idx` for `alg`, reusing an earlier import.
    pub fn import(&self, alg: JwsAlgorithm, idx: usize) -> Result<PublicKey> {
        if let Some(key) = self.imported.get(&(alg, idx)) {
            return Ok(key.clone());
        }
        let jwk = self
            .jwks
            .keys
            .get(idx)
            .ok_or_else(|| Error::new(ErrorKind::NoApplicableKey, None))?;
        if jwk.has_private_material() {
            return Err(Error::processing("jwks_uri must only contain public keys"));
        }
        let key = PublicKey::from_jwk(jwk)?;
        if !key.supports(alg) {
            return Err(Error::new(ErrorKind::NoApplicableKey, None));
        }
        self.imported.insert((alg, idx), key.clone());
        Ok(key)
    }
}

fn is_candidate(jwk: &Jwk, alg: JwsAlgorithm, kid: Option<&str>) -> bool {
    if jwk.kty != alg.key_type() {
        return false;
    }
    if kid.is_some_and(|kid| jwk.kid.as_deref() != Some(kid)) {
        return false;
    }
    if jwk.alg.as_ref().is_some_and(|a| a != alg.as_str()) {
        return false;
    }
    if jwk.key_use.as_ref().is_some_and(|u| u != "sig") {
        return false;
    }
    if jwk
        .key_ops
        .as_ref()
        .is_some_and(|ops| !ops.iter().any(|op| op == "verify"))
    {
        return false;
    }
    match alg.curve() {
        Some(crv) => jwk.crv.as_deref() == Some(crv),
        None => true,
    }
}

/// Key sets by `jwks_uri`.
#[derive(Debug)]
pub struct KeySetCache {
    sets: Mutex<GenerationCache<SmolStr, Arc<CachedKeySet>>>,
}

impl Default for KeySetCache {
    fn default() -> Self {
        Self::with_capacity(KEY_SET_CACHE_SIZE)
    }
}

impl KeySetCache {
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            sets: Mutex::new(GenerationCache::new(max_size)),
        }
    }

    pub async fn get(&self, jwks_uri: &str) -> Option<Arc<CachedKeySet>> {
        self.sets.lock().await.get(jwks_uri)
    }

    pub async fn insert(&self, jwks_uri: impl Into<SmolStr>, set: Arc<CachedKeySet>) {
        self.sets.lock().await.set(jwks_uri.into(), set);
    }

    pub async fn evict(&self, jwks_uri: &str) -> bool {
        self.sets.lock().await.delete(jwks_uri)
    }

    pub async fn contains(&self, jwks_uri: &str) -> bool {
        self.sets.lock().await.has(jwks_uri)
    }
}

/// Select the one key of the issuer's key set that verifies tokens with
/// `header`.
///
/// A cached key set older than [`KEY_SET_MAX_AGE`] is fetched again. When no
/// key matches and the cached set is at least [`KEY_SET_RETRY_AGE`] old, it is
/// fetched again once. More than one matching key is an error; the issuer must
/// then send a `kid`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(alg = %header.alg, kid = ?header.kid))
)]
pub async fn resolve_verification_key<C: HttpClient>(
    client: &C,
    cache: &KeySetCache,
    server: &AuthorizationServerMetadata,
    header: &JwsHeader,
    options: &HttpRequestOptions,
) -> Result<PublicKey> {
    let alg = JwsAlgorithm::from_str(&header.alg)?;
    let jwks_uri = SmolStr::new(
        server
            .endpoint("jwks_uri", server.jwks_uri.as_ref())?
            .as_str(),
    );
    let kid = header.kid.as_deref();

    let mut retried = false;
    loop {
        let now = epoch_time();
        let (set, fresh) = match cache.get(&jwks_uri).await {
            Some(set) if set.age_at(now) < KEY_SET_MAX_AGE => (set, false),
            stale => {
                if stale.is_some() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%jwks_uri, "cached key set expired");
                    cache.evict(&jwks_uri).await;
                }
                let response = jwks_request(client, server, options).await?;
                let jwks = process_jwks_response(&response)?;
                let set = Arc::new(CachedKeySet::new(jwks, epoch_time()));
                cache.insert(jwks_uri.clone(), set.clone()).await;
                (set, true)
            }
        };

        let candidates = set.candidates(alg, kid);
        match candidates.as_slice() {
            [] => {
                if !fresh && !retried && set.age_at(epoch_time()) >= KEY_SET_RETRY_AGE {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%jwks_uri, "no applicable key, fetching key set again");
                    cache.evict(&jwks_uri).await;
                    retried = true;
                    continue;
                }
                return Err(Error::new(ErrorKind::NoApplicableKey, None));
            }
            [idx] => return set.import(alg, *idx),
            _ => return Err(Error::new(ErrorKind::AmbiguousKey, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;
    use crate::mock::{MockClient, StalledClient};
    use rand::rngs::OsRng;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    fn server() -> AuthorizationServerMetadata {
        let mut server = AuthorizationServerMetadata::new("https://as.example");
        server.jwks_uri = Some("https://as.example/jwks".into());
        server
    }

    fn header(alg: &str, kid: Option<&str>) -> JwsHeader {
        JwsHeader {
            alg: alg.into(),
            kid: kid.map(Into::into),
            ..Default::default()
        }
    }

    fn ec_jwk(extra: Value) -> (PublicKey, Value) {
        let public = PrivateKey::Es256(p256::ecdsa::SigningKey::random(&mut OsRng)).public_key();
        let mut jwk = serde_json::to_value(public.to_jwk()).unwrap();
        if let (Some(obj), Value::Object(extra)) = (jwk.as_object_mut(), extra) {
            obj.extend(extra);
        }
        (public, jwk)
    }

    async fn resolve(http: &MockClient, cache: &KeySetCache, header: &JwsHeader) -> Result<PublicKey> {
        resolve_verification_key(http, cache, &server(), header, &HttpRequestOptions::default()).await
    }

    #[tokio::test]
    async fn cancelled_fetch_leaves_cache_untouched() {
        let cache = KeySetCache::default();
        let cancel = CancellationToken::new();
        let options = HttpRequestOptions {
            cancel: Some(cancel.clone()),
            ..Default::default()
        };
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            cancel.cancel();
        });
        let err = resolve_verification_key(
            &StalledClient,
            &cache,
            &server(),
            &header("ES256", None),
            &options,
        )
        .await
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cancelled));
        assert!(!cache.contains("https://as.example/jwks").await);
    }

    #[tokio::test]
    async fn fetches_once_then_uses_cache() {
        let (public, jwk) = ec_jwk(json!({"kid": "a"}));
        let http = MockClient::default();
        http.push_json(200, json!({"keys": [jwk]})).await;
        let cache = KeySetCache::default();

        let key = resolve(&http, &cache, &header("ES256", Some("a"))).await.unwrap();
        assert_eq!(key, public);
        let key = resolve(&http, &cache, &header("ES256", None)).await.unwrap();
        assert_eq!(key, public);

        let requests = http.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].uri().to_string(), "https://as.example/jwks");
        assert!(cache.contains("https://as.example/jwks").await);
    }

    #[tokio::test]
    async fn expired_set_is_refetched() {
        let (old, old_jwk) = ec_jwk(json!({}));
        let (new, new_jwk) = ec_jwk(json!({}));
        let cache = KeySetCache::default();
        let stale: JwkSet = serde_json::from_value(json!({"keys": [old_jwk]})).unwrap();
        cache
            .insert(
                "https://as.example/jwks",
                Arc::new(CachedKeySet::new(stale, epoch_time() - KEY_SET_MAX_AGE)),
            )
            .await;

        let http = MockClient::default();
        http.push_json(200, json!({"keys": [new_jwk]})).await;
        let key = resolve(&http, &cache, &header("ES256", None)).await.unwrap();
        assert_eq!(key, new);
        assert_ne!(key, old);
        assert_eq!(http.request_count().await, 1);
    }

    #[tokio::test]
    async fn missing_kid_retries_once_for_older_sets() {
        let (_, jwk_a) = ec_jwk(json!({"kid": "a"}));
        let (rotated, jwk_b) = ec_jwk(json!({"kid": "b"}));
        let set: JwkSet = serde_json::from_value(json!({"keys": [jwk_a]})).unwrap();

        // younger than the retry age: fail without touching the network
        let cache = KeySetCache::default();
        cache
            .insert("https://as.example/jwks", Arc::new(CachedKeySet::new(set.clone(), epoch_time() - 10)))
            .await;
        let http = MockClient::default();
        let err = resolve(&http, &cache, &header("ES256", Some("b"))).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoApplicableKey));
        assert_eq!(http.request_count().await, 0);

        // old enough: one refetch picks up the rotated key
        let cache = KeySetCache::default();
        cache
            .insert(
                "https://as.example/jwks",
                Arc::new(CachedKeySet::new(set.clone(), epoch_time() - KEY_SET_RETRY_AGE)),
            )
            .await;
        http.push_json(200, json!({"keys": [jwk_b]})).await;
        let key = resolve(&http, &cache, &header("ES256", Some("b"))).await.unwrap();
        assert_eq!(key, rotated);
        assert_eq!(http.request_count().await, 1);

        // a freshly fetched set that still lacks the key is final
        let cache = KeySetCache::default();
        let http = MockClient::default();
        http.push_json(200, json!({"keys": []})).await;
        let err = resolve(&http, &cache, &header("ES256", Some("c"))).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoApplicableKey));
        assert_eq!(http.request_count().await, 1);
    }

    #[tokio::test]
    async fn two_matching_keys_are_ambiguous() {
        let (_, a) = ec_jwk(json!({}));
        let (_, b) = ec_jwk(json!({}));
        let http = MockClient::default();
        http.push_json(200, json!({"keys": [a, b]})).await;
        let cache = KeySetCache::default();
        let err = resolve(&http, &cache, &header("ES256", None)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AmbiguousKey));
    }

    #[tokio::test]
    async fn declared_constraints_filter_candidates() {
        let (_, enc) = ec_jwk(json!({"use": "enc"}));
        let (_, sign_only) = ec_jwk(json!({"key_ops": ["sign"]}));
        let (_, other_alg) = ec_jwk(json!({"alg": "ES384"}));
        let (wanted, ok) = ec_jwk(json!({"use": "sig", "key_ops": ["verify"], "alg": "ES256"}));
        let http = MockClient::default();
        http.push_json(200, json!({"keys": [enc, sign_only, other_alg, ok]})).await;
        let cache = KeySetCache::default();

        let key = resolve(&http, &cache, &header("ES256", None)).await.unwrap();
        assert_eq!(key, wanted);

        let set = cache.get("https://as.example/jwks").await.unwrap();
        assert!(set.candidates(JwsAlgorithm::EdDsa, None).is_empty());
        assert!(set.candidates(JwsAlgorithm::Rs256, None).is_empty());
        assert_eq!(set.candidates(JwsAlgorithm::Es256, None), [3]);
    }

    #[tokio::test]
    async fn private_material_is_rejected() {
        let (_, mut jwk) = ec_jwk(json!({}));
        jwk["d"] = json!("c2VjcmV0");
        let http = MockClient::default();
        http.push_json(200, json!({"keys": [jwk]})).await;
        let err = resolve(&http, &KeySetCache::default(), &header("ES256", None))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("public keys")));
    }

    #[tokio::test]
    async fn unsupported_algorithm_fails_before_fetch() {
        let http = MockClient::default();
        let err = resolve(&http, &KeySetCache::default(), &header("HS256", None))
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(http.request_count().await, 0);
    }
}

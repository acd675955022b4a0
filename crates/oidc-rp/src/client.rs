use std::sync::Arc;

use crate::dpop::DpopNonceCache;
use crate::error::Result;
use crate::http_client::HttpClient;
use crate::keys::ClientPrivateKey;
use crate::keyset::KeySetCache;
use crate::types::{AuthorizationServerMetadata, ClientMetadata};

/// A relying party bound to one authorization server.
///
/// Request builders live in [`crate::request`], response processors that need
/// the issuer's keys in [`crate::response`]; both are exposed as methods here.
/// The key set and DPoP nonce caches are shared handles, so several relying
/// parties (or clones of the same one) can reuse what one of them fetched.
#[derive(Debug, Clone)]
pub struct RelyingParty<C> {
    pub(crate) server: AuthorizationServerMetadata,
    pub(crate) client: ClientMetadata,
    pub(crate) http: C,
    pub(crate) key_sets: Arc<KeySetCache>,
    pub(crate) dpop_nonces: Arc<DpopNonceCache>,
    pub(crate) client_key: Option<ClientPrivateKey>,
}

impl<C: HttpClient> RelyingParty<C> {
    /// Validates both metadata documents and creates fresh, unshared caches.
    pub fn new(
        server: AuthorizationServerMetadata,
        client: ClientMetadata,
        http: C,
    ) -> Result<Self> {
        server.validate()?;
        client.validate()?;
        Ok(Self {
            server,
            client,
            http,
            key_sets: Arc::new(KeySetCache::default()),
            dpop_nonces: Arc::new(DpopNonceCache::default()),
            client_key: None,
        })
    }

    pub fn with_key_set_cache(mut self, cache: Arc<KeySetCache>) -> Self {
        self.key_sets = cache;
        self
    }

    pub fn with_dpop_nonce_cache(mut self, cache: Arc<DpopNonceCache>) -> Self {
        self.dpop_nonces = cache;
        self
    }

    /// Key used to sign `private_key_jwt` client assertions.
    pub fn with_client_key(mut self, key: ClientPrivateKey) -> Self {
        self.client_key = Some(key);
        self
    }

    pub fn server(&self) -> &AuthorizationServerMetadata {
        &self.server
    }

    pub fn client(&self) -> &ClientMetadata {
        &self.client
    }

    pub fn http_client(&self) -> &C {
        &self.http
    }

    pub fn key_sets(&self) -> &Arc<KeySetCache> {
        &self.key_sets
    }

    pub fn dpop_nonces(&self) -> &Arc<DpopNonceCache> {
        &self.dpop_nonces
    }

    pub fn client_key(&self) -> Option<&ClientPrivateKey> {
        self.client_key.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClient;

    #[test]
    fn metadata_is_validated() {
        let err = RelyingParty::new(
            AuthorizationServerMetadata::new("not a url"),
            ClientMetadata::new("c"),
            MockClient::default(),
        )
        .unwrap_err();
        assert!(err.is_usage());

        let err = RelyingParty::new(
            AuthorizationServerMetadata::new("https://as.example"),
            ClientMetadata::new(""),
            MockClient::default(),
        )
        .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn caches_can_be_shared() {
        let server = AuthorizationServerMetadata::new("https://as.example");
        let a = RelyingParty::new(server.clone(), ClientMetadata::new("a"), MockClient::default())
            .unwrap();
        let b = RelyingParty::new(server, ClientMetadata::new("b"), MockClient::default())
            .unwrap()
            .with_key_set_cache(a.key_sets().clone())
            .with_dpop_nonce_cache(a.dpop_nonces().clone());
        assert!(Arc::ptr_eq(a.key_sets(), b.key_sets()));
        assert!(Arc::ptr_eq(a.dpop_nonces(), b.dpop_nonces()));
        assert!(b.client_key().is_none());
    }
}

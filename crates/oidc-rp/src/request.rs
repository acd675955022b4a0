//! Outgoing requests.
//!
//! Every builder sends through the [`HttpClient`] boundary and hands back the
//! raw response for the matching processor in [`crate::response`]. Requests
//! to client-authenticated endpoints go through
//! [`client_authentication`](crate::auth::client_authentication), and every
//! response from a relying party request feeds the DPoP nonce cache.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::client_authentication;
use crate::client::RelyingParty;
use crate::dpop::{DPOP_HEADER, DpopOptions, dpop_proof, process_dpop_nonce};
use crate::error::{Error, Result};
use crate::http_client::{HttpClient, send_cancellable};
use crate::jose::create_signed_jwt;
use crate::jose::jws::JwsHeader;
use crate::keys::ClientPrivateKey;
use crate::types::{AuthorizationServerMetadata, FormParams, ValidatedCallback};
use crate::utils::{calculate_jwk_thumbprint, epoch_time, random_token};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

pub const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";

pub const JWT_HEADER_TYP_REQUEST_OBJECT: &str = "oauth-authz-req+jwt";

/// Lifetime of an issued request object, in seconds.
pub const REQUEST_OBJECT_LIFETIME: i64 = 60;

/// Options every request accepts.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestOptions {
    /// Extra headers. `authorization` and `dpop` are reserved.
    pub headers: HeaderMap,
    /// Abandons the request when cancelled. There is no built-in timeout.
    pub cancel: Option<CancellationToken>,
}

/// Token endpoint and PAR requests.
#[derive(Debug, Clone, Default)]
pub struct TokenRequestOptions {
    pub http: HttpRequestOptions,
    /// Sent along with the grant's own parameters, which take precedence.
    pub additional_parameters: FormParams,
    pub dpop: Option<DpopOptions>,
}

/// Revocation and other client-authenticated requests without DPoP.
#[derive(Debug, Clone, Default)]
pub struct AuthenticatedRequestOptions {
    pub http: HttpRequestOptions,
    pub additional_parameters: FormParams,
}

#[derive(Debug, Clone, Default)]
pub struct IntrospectionRequestOptions {
    pub http: HttpRequestOptions,
    pub additional_parameters: FormParams,
    /// Ask for a signed response even when the client metadata does not
    /// require one.
    pub request_jwt_response: bool,
}

/// UserInfo and arbitrary protected resource requests.
#[derive(Debug, Clone, Default)]
pub struct ProtectedResourceRequestOptions {
    pub http: HttpRequestOptions,
    pub dpop: Option<DpopOptions>,
}

/// Well-known URI transformation applied to an issuer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryAlgorithm {
    /// OpenID Connect Discovery 1.0: `/.well-known/openid-configuration`
    /// appended to the issuer path.
    #[default]
    Oidc,
    /// RFC 8414: `/.well-known/oauth-authorization-server` inserted before
    /// the issuer path.
    OAuth2,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryRequestOptions {
    pub http: HttpRequestOptions,
    pub algorithm: DiscoveryAlgorithm,
}

/// Copy caller headers, adding the default `user-agent` and refusing the
/// headers this crate computes itself.
pub(crate) fn prepare_headers(input: &HeaderMap) -> Result<HeaderMap> {
    let mut headers = input.clone();
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::USER_AGENT));
    }
    if headers.contains_key(AUTHORIZATION) {
        return Err(Error::usage(
            "\"options.headers\" must not include the \"authorization\" header name",
        ));
    }
    if headers.contains_key(DPOP_HEADER) {
        return Err(Error::usage(
            "\"options.headers\" must not include the \"dpop\" header name",
        ));
    }
    Ok(headers)
}

fn non_empty(value: &str, name: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::usage(format!("\"{name}\" must be a non-empty string")));
    }
    Ok(())
}

async fn send<C: HttpClient>(
    http: &C,
    method: Method,
    url: &Url,
    headers: HeaderMap,
    body: Vec<u8>,
    cancel: Option<&CancellationToken>,
) -> Result<http::Response<Vec<u8>>> {
    let mut request = Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(body)?;
    *request.headers_mut() = headers;
    send_cancellable(http, request, cancel).await
}

/// Fetch the issuer's key set from `jwks_uri`.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub async fn jwks_request<C: HttpClient>(
    client: &C,
    server: &AuthorizationServerMetadata,
    options: &HttpRequestOptions,
) -> Result<http::Response<Vec<u8>>> {
    let url = server.endpoint("jwks_uri", server.jwks_uri.as_ref())?;
    let mut headers = prepare_headers(&options.headers)?;
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.append(ACCEPT, HeaderValue::from_static("application/jwk-set+json"));
    send(client, Method::GET, &url, headers, Vec::new(), options.cancel.as_ref()).await
}

/// Well-known metadata URL for `issuer`.
pub fn discovery_url(issuer: &Url, algorithm: DiscoveryAlgorithm) -> Result<Url> {
    if issuer.scheme() != "https" && issuer.scheme() != "http" {
        return Err(Error::usage("issuer URL scheme must be \"https\" or \"http\""));
    }
    let mut url = issuer.clone();
    let path = match algorithm {
        DiscoveryAlgorithm::Oidc => {
            format!("{}/.well-known/openid-configuration", issuer.path()).replacen("//", "/", 1)
        }
        DiscoveryAlgorithm::OAuth2 if issuer.path() == "/" => {
            "/.well-known/oauth-authorization-server".to_owned()
        }
        DiscoveryAlgorithm::OAuth2 => {
            format!("/.well-known/oauth-authorization-server{}", issuer.path())
        }
    };
    url.set_path(&path);
    Ok(url)
}

/// Fetch authorization server metadata for `issuer`.
///
/// Validate the result with
/// [`process_discovery_response`](crate::response::process_discovery_response).
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(issuer = %issuer))
)]
pub async fn discovery_request<C: HttpClient>(
    client: &C,
    issuer: &Url,
    options: &DiscoveryRequestOptions,
) -> Result<http::Response<Vec<u8>>> {
    let url = discovery_url(issuer, options.algorithm)?;
    let mut headers = prepare_headers(&options.http.headers)?;
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    send(client, Method::GET, &url, headers, Vec::new(), options.http.cancel.as_ref()).await
}

impl<C: HttpClient> RelyingParty<C> {
    async fn authenticated_request(
        &self,
        url: Url,
        mut body: FormParams,
        mut headers: HeaderMap,
        cancel: Option<&CancellationToken>,
    ) -> Result<http::Response<Vec<u8>>> {
        client_authentication(
            &self.server,
            &self.client,
            &mut body,
            &mut headers,
            self.client_key.as_ref(),
        )?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        let body = body.encode()?.into_bytes();
        let response = send(&self.http, Method::POST, &url, headers, body, cancel).await?;
        process_dpop_nonce(&self.dpop_nonces, &url, &response).await;
        Ok(response)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(grant_type = %grant_type))
    )]
    async fn token_endpoint_request(
        &self,
        grant_type: &str,
        mut parameters: FormParams,
        options: &TokenRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        let url = self
            .server
            .endpoint("token_endpoint", self.server.token_endpoint.as_ref())?;
        parameters.set("grant_type", grant_type);
        let mut headers = prepare_headers(&options.http.headers)?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(dpop) = &options.dpop {
            dpop_proof(&mut headers, dpop, &self.dpop_nonces, &url, &Method::POST, None).await?;
        }
        self.authenticated_request(url, parameters, headers, options.http.cancel.as_ref())
            .await
    }

    /// Push authorization request `parameters` to the PAR endpoint.
    ///
    /// With DPoP the proof's key thumbprint is sent as `dpop_jkt` unless the
    /// parameters already carry one.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn pushed_authorization_request(
        &self,
        parameters: &FormParams,
        options: &TokenRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        let url = self.server.endpoint(
            "pushed_authorization_request_endpoint",
            self.server.pushed_authorization_request_endpoint.as_ref(),
        )?;

        let mut body = options.additional_parameters.clone();
        for (name, value) in parameters.iter() {
            body.set(name, value);
        }
        body.set("client_id", self.client.client_id.clone());

        let mut headers = prepare_headers(&options.http.headers)?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(dpop) = &options.dpop {
            dpop_proof(&mut headers, dpop, &self.dpop_nonces, &url, &Method::POST, None).await?;
            if !body.has("dpop_jkt") {
                body.set(
                    "dpop_jkt",
                    calculate_jwk_thumbprint(dpop.key_pair.public_key())?,
                );
            }
        }

        self.authenticated_request(url, body, headers, options.http.cancel.as_ref())
            .await
    }

    /// Exchange the code of a validated callback.
    pub async fn authorization_code_grant_request(
        &self,
        callback: &ValidatedCallback,
        redirect_uri: &str,
        code_verifier: &str,
        options: &TokenRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        non_empty(redirect_uri, "redirect_uri")?;
        non_empty(code_verifier, "code_verifier")?;
        let code = callback
            .params()
            .get_single("code")?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::processing("no authorization code in the callback parameters"))?;

        let mut parameters = options.additional_parameters.clone();
        parameters.set("redirect_uri", redirect_uri);
        parameters.set("code_verifier", code_verifier);
        parameters.set("code", code);
        self.token_endpoint_request("authorization_code", parameters, options)
            .await
    }

    pub async fn refresh_token_grant_request(
        &self,
        refresh_token: &str,
        options: &TokenRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        non_empty(refresh_token, "refresh_token")?;
        let mut parameters = options.additional_parameters.clone();
        parameters.set("refresh_token", refresh_token);
        self.token_endpoint_request("refresh_token", parameters, options)
            .await
    }

    pub async fn client_credentials_grant_request(
        &self,
        parameters: &FormParams,
        options: &TokenRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        let mut body = options.additional_parameters.clone();
        for (name, value) in parameters.iter() {
            body.set(name, value);
        }
        self.token_endpoint_request("client_credentials", body, options)
            .await
    }

    // https://datatracker.ietf.org/doc/html/rfc8628#section-3.4
    pub async fn device_code_grant_request(
        &self,
        device_code: &str,
        options: &TokenRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        non_empty(device_code, "device_code")?;
        let mut parameters = options.additional_parameters.clone();
        parameters.set("device_code", device_code);
        self.token_endpoint_request(GRANT_TYPE_DEVICE_CODE, parameters, options)
            .await
    }

    // https://datatracker.ietf.org/doc/html/rfc8628#section-3.1
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn device_authorization_request(
        &self,
        parameters: &FormParams,
        options: &HttpRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        let url = self.server.endpoint(
            "device_authorization_endpoint",
            self.server.device_authorization_endpoint.as_ref(),
        )?;
        let mut body = parameters.clone();
        body.set("client_id", self.client.client_id.clone());
        let mut headers = prepare_headers(&options.headers)?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        self.authenticated_request(url, body, headers, options.cancel.as_ref())
            .await
    }

    // https://datatracker.ietf.org/doc/html/rfc7009#section-2.1
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn revocation_request(
        &self,
        token: &str,
        options: &AuthenticatedRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        non_empty(token, "token")?;
        let url = self
            .server
            .endpoint("revocation_endpoint", self.server.revocation_endpoint.as_ref())?;
        let mut body = options.additional_parameters.clone();
        body.set("token", token);
        let mut headers = prepare_headers(&options.http.headers)?;
        headers.remove(ACCEPT);
        self.authenticated_request(url, body, headers, options.http.cancel.as_ref())
            .await
    }

    // https://datatracker.ietf.org/doc/html/rfc7662#section-2.1
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn introspection_request(
        &self,
        token: &str,
        options: &IntrospectionRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        non_empty(token, "token")?;
        let url = self.server.endpoint(
            "introspection_endpoint",
            self.server.introspection_endpoint.as_ref(),
        )?;
        let mut body = options.additional_parameters.clone();
        body.set("token", token);
        let mut headers = prepare_headers(&options.http.headers)?;
        let accept = if options.request_jwt_response
            || self.client.introspection_signed_response_alg.is_some()
        {
            "application/token-introspection+jwt"
        } else {
            "application/json"
        };
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        self.authenticated_request(url, body, headers, options.http.cancel.as_ref())
            .await
    }

    /// UserInfo request, asking for a signed response when the client
    /// requires one.
    pub async fn userinfo_request(
        &self,
        access_token: &str,
        options: &ProtectedResourceRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        let url = self
            .server
            .endpoint("userinfo_endpoint", self.server.userinfo_endpoint.as_ref())?;
        let mut headers = prepare_headers(&options.http.headers)?;
        if self.client.userinfo_signed_response_alg.is_some() {
            headers.insert(ACCEPT, HeaderValue::from_static("application/jwt"));
        } else {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
            headers.append(ACCEPT, HeaderValue::from_static("application/jwt"));
        }
        self.resource_request(access_token, Method::GET, &url, headers, Vec::new(), options)
            .await
    }

    /// Call a resource server with `access_token`, as a DPoP-bound token when
    /// `options.dpop` is set and as a bearer token otherwise.
    pub async fn protected_resource_request(
        &self,
        access_token: &str,
        method: Method,
        url: &Url,
        body: Vec<u8>,
        options: &ProtectedResourceRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        let headers = prepare_headers(&options.http.headers)?;
        self.resource_request(access_token, method, url, headers, body, options)
            .await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(%method, %url))
    )]
    async fn resource_request(
        &self,
        access_token: &str,
        method: Method,
        url: &Url,
        mut headers: HeaderMap,
        body: Vec<u8>,
        options: &ProtectedResourceRequestOptions,
    ) -> Result<http::Response<Vec<u8>>> {
        non_empty(access_token, "access_token")?;
        let authorization = match &options.dpop {
            Some(dpop) => {
                dpop_proof(
                    &mut headers,
                    dpop,
                    &self.dpop_nonces,
                    url,
                    &method,
                    Some(access_token),
                )
                .await?;
                format!("DPoP {access_token}")
            }
            None => format!("Bearer {access_token}"),
        };
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);

        let response = send(
            &self.http,
            method,
            url,
            headers,
            body,
            options.http.cancel.as_ref(),
        )
        .await?;
        process_dpop_nonce(&self.dpop_nonces, url, &response).await;
        Ok(response)
    }

    /// Sign authorization request `parameters` as a request object.
    ///
    /// <https://datatracker.ietf.org/doc/html/rfc9101>
    pub fn issue_request_object(
        &self,
        parameters: &FormParams,
        key: &ClientPrivateKey,
    ) -> Result<String> {
        let mut claims = Map::new();
        for (name, value) in parameters.iter() {
            claims.insert(name.to_owned(), Value::String(value.to_owned()));
        }
        claims.insert(
            "client_id".into(),
            Value::String(self.client.client_id.to_string()),
        );

        if let Some(max_age) = parameters.get("max_age") {
            let max_age: u64 = max_age.parse().map_err(|_| {
                Error::usage("\"max_age\" parameter must be a non-negative integer")
            })?;
            claims.insert("max_age".into(), max_age.into());
        }
        if let Some(raw) = parameters.get("claims") {
            let value: Value = serde_json::from_str(raw).map_err(|e| {
                Error::usage("failed to parse the \"claims\" parameter as JSON").with_source(e)
            })?;
            if !value.is_object() {
                return Err(Error::usage(
                    "\"claims\" parameter must be a JSON with a top level object",
                ));
            }
            claims.insert("claims".into(), value);
        }
        if let Some(raw) = parameters.get("authorization_details") {
            let value: Value = serde_json::from_str(raw).map_err(|e| {
                Error::usage("failed to parse the \"authorization_details\" parameter as JSON")
                    .with_source(e)
            })?;
            if !value.is_array() {
                return Err(Error::usage(
                    "\"authorization_details\" parameter must be a JSON with a top level array",
                ));
            }
            claims.insert("authorization_details".into(), value);
        }

        let resource: Vec<Value> = parameters
            .get_all("resource")
            .map(|r| Value::String(r.to_owned()))
            .collect();
        if resource.len() > 1 {
            claims.insert("resource".into(), Value::Array(resource));
        }

        let now = epoch_time();
        claims.insert("jti".into(), Value::String(random_token().to_string()));
        claims.insert("aud".into(), Value::String(self.server.issuer.to_string()));
        claims.insert("exp".into(), (now + REQUEST_OBJECT_LIFETIME).into());
        claims.insert("iat".into(), now.into());
        claims.insert("nbf".into(), now.into());
        claims.insert(
            "iss".into(),
            Value::String(self.client.client_id.to_string()),
        );

        let header = JwsHeader::from(key.key.algorithm())
            .with_typ(JWT_HEADER_TYP_REQUEST_OBJECT)
            .with_kid(key.kid.clone());
        create_signed_jwt(&key.key, &header, &claims)
    }
}

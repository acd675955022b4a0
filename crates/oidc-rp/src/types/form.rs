use smol_str::SmolStr;
use url::Url;

use crate::error::{Error, Result};

/// Ordered, possibly repeated `name=value` pairs: request bodies and
/// redirect callback parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormParams(Vec<(SmolStr, SmolStr)>);

/// Redirect callback parameters, before validation.
pub type CallbackParameters = FormParams;

impl FormParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` string; a leading `?` is ignored.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (SmolStr::new(k), SmolStr::new(v)))
            .collect()
    }

    /// Parameters of a redirect URL: the fragment if it has one, else the query.
    pub fn from_url(url: &Url) -> Self {
        match url.fragment() {
            Some(fragment) if !fragment.is_empty() => Self::from_query(fragment),
            _ => Self::from_query(url.query().unwrap_or_default()),
        }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.0
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The single value of `name`; a parameter that appears twice is an error.
    pub fn get_single(&self, name: &str) -> Result<Option<&str>> {
        let mut values = self.get_all(name);
        let first = values.next();
        if values.next().is_some() {
            return Err(Error::processing(format!(
                "\"{name}\" parameter must be provided only once"
            )));
        }
        Ok(first)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k == name)
    }

    /// Replace every value of `name` with `value`, keeping the position of
    /// the first occurrence.
    pub fn set(&mut self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter().position(|(k, _)| *k == name) {
            Some(idx) => {
                self.0[idx].1 = value;
                let mut seen = 0usize;
                self.0.retain(|(k, _)| {
                    if *k != name {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.0.push((name, value)),
        }
    }

    pub fn append(&mut self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn delete(&mut self, name: &str) {
        self.0.retain(|(k, _)| k != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_html_form::to_string(&self.0)?)
    }
}

impl<K: Into<SmolStr>, V: Into<SmolStr>> FromIterator<(K, V)> for FormParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<SmolStr>, V: Into<SmolStr>, const N: usize> From<[(K, V); N]> for FormParams {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Authorization response parameters that passed
/// [`validate_auth_response`](crate::response::validate_auth_response) or
/// [`RelyingParty::validate_jwt_auth_response`](crate::client::RelyingParty::validate_jwt_auth_response).
///
/// Only a validated callback can be exchanged for tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCallback(pub(crate) FormParams);

impl ValidatedCallback {
    pub fn params(&self) -> &FormParams {
        &self.0
    }

    pub fn code(&self) -> Option<&str> {
        self.0.get("code")
    }

    pub fn into_params(self) -> FormParams {
        self.0
    }
}

//! `WWW-Authenticate` challenge parsing.
//!
//! <https://datatracker.ietf.org/doc/html/rfc9110#section-11.6.1>

use std::collections::BTreeMap;
use std::sync::LazyLock;

use http::header::WWW_AUTHENTICATE;
use regex::Regex;
use smol_str::SmolStr;

static SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|, ?)([0-9a-zA-Z!#$%&'*+\-.^_`|~]+)").unwrap());

static PARAM_SPLIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:,|, )?[0-9a-zA-Z!#$%&'*+-.^_`|~]+=)").unwrap());

static PARAM_KEY_TRIM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:, ?)|=$").unwrap());

/// One challenge of a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WwwAuthenticateChallenge {
    /// Lower-cased auth scheme, e.g. `bearer` or `dpop`.
    pub scheme: SmolStr,
    /// Lower-cased parameter names to unquoted values.
    pub parameters: BTreeMap<SmolStr, SmolStr>,
}

impl WwwAuthenticateChallenge {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(SmolStr::as_str)
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Start of every scheme token that is followed by end of input, a space or a comma.
fn scheme_matches(header: &str) -> Vec<(usize, &str)> {
    let mut found = Vec::new();
    let mut pos = 0;
    while pos <= header.len() {
        let Some(caps) = SCHEME_REGEX.captures_at(header, pos) else {
            break;
        };
        let (Some(whole), Some(scheme)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let terminated = header[scheme.end()..]
            .chars()
            .next()
            .is_none_or(|c| c == ' ' || c == ',');
        if terminated {
            found.push((whole.start(), scheme.as_str()));
            pos = scheme.end();
        } else {
            pos = whole.start() + header[whole.start()..].chars().next().map_or(1, char::len_utf8);
        }
    }
    found
}

/// Split `key=value` parameters of one challenge, keeping the separators,
/// the same way `String.prototype.split` with a capturing group does.
fn split_params(params: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut last = 0;
    for m in PARAM_SPLIT_REGEX.find_iter(params) {
        parts.push(params[last..m.start()].to_owned());
        parts.push(m.as_str().to_owned());
        last = m.end();
    }
    parts.push(params[last..].to_owned());
    parts
}

fn parse_parameters(params: &str) -> BTreeMap<SmolStr, SmolStr> {
    let mut parameters = BTreeMap::new();
    // drop whatever precedes the first `key=`
    let mut arr: Vec<String> = split_params(params).into_iter().skip(1).collect();
    if let Some(last) = arr.last_mut() {
        if last.ends_with(',') {
            last.pop();
        }
    }

    let mut i = 1;
    while i < arr.len() {
        let idx = i;
        if arr[idx].starts_with('"') {
            while !arr[idx].ends_with('"') && i + 1 < arr.len() {
                i += 1;
                let next = arr[i].clone();
                arr[idx].push_str(&next);
            }
        }
        let key = PARAM_KEY_TRIM_REGEX
            .replace_all(&arr[idx - 1], "")
            .to_lowercase();
        parameters.insert(SmolStr::new(key), SmolStr::new(unquote(&arr[idx])));
        i += 2;
    }
    parameters
}

/// Parse every challenge in a `WWW-Authenticate` header value, in order.
pub fn parse_challenges(header: &str) -> Vec<WwwAuthenticateChallenge> {
    let matches = scheme_matches(header);
    matches
        .iter()
        .enumerate()
        .map(|(n, (start, scheme))| {
            let end = matches.get(n + 1).map_or(header.len(), |(next, _)| *next);
            let params = &header[*start..end];
            WwwAuthenticateChallenge {
                scheme: SmolStr::new(scheme.to_lowercase()),
                parameters: parse_parameters(params),
            }
        })
        .collect()
}

/// Challenges of the response's `WWW-Authenticate` header.
///
/// `None` means the response carried no such header, which is different from
/// a header that holds no recognisable challenge (`Some` of an empty list).
pub fn parse_www_authenticate_challenges<B>(
    response: &http::Response<B>,
) -> Option<Vec<WwwAuthenticateChallenge>> {
    let header = response.headers().get(WWW_AUTHENTICATE)?;
    let header = String::from_utf8_lossy(header.as_bytes());
    Some(parse_challenges(&header))
}

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use super::jws::JwsHeader;
use super::jwt::JwtClaims;
use crate::error::{Error, ErrorKind, Result};
use crate::keys::{JwsAlgorithm, PublicKey};
use crate::utils::epoch_time;

/// Clock skew tolerated for `exp`, `nbf` and `auth_time` checks, in seconds.
pub const CLOCK_TOLERANCE: i64 = 30;

/// A structurally valid compact JWS whose signature has not necessarily been
/// verified yet.
#[derive(Debug, Clone)]
pub struct ParsedJwt {
    header: JwsHeader,
    claims: JwtClaims,
    signature: Vec<u8>,
    signing_input: String,
}

fn decode_object(segment: &str, what: &str) -> Result<serde_json::Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| Error::processing(format!("failed to base64url decode the JWT {what}")).with_source(e))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::processing(format!(
            "JWT {what} must be a top level object"
        ))),
        Err(e) => Err(Error::processing(format!("failed to parse the JWT {what} as JSON")).with_source(e)),
    }
}

impl ParsedJwt {
    /// Parse `token` and run the structural and temporal checks against the
    /// current time.
    pub fn parse(token: &str) -> Result<Self> {
        Self::parse_at(token, epoch_time())
    }

    /// Same as [`ParsedJwt::parse`] with an explicit "now" in epoch seconds.
    pub fn parse_at(token: &str, now: i64) -> Result<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        match parts.len() {
            3 => {}
            5 => {
                return Err(Error::unsupported(
                    "JWE structure JWTs are not supported",
                ));
            }
            _ => return Err(Error::processing("Invalid JWT")),
        }

        let header = decode_object(parts[0], "Header")?;
        if header.contains_key("crit") {
            return Err(Error::processing(
                "unexpected JWT \"crit\" header parameter",
            ));
        }
        let header: JwsHeader = serde_json::from_value(Value::Object(header))
            .map_err(|e| Error::processing("invalid JWT Header").with_source(e))?;

        let signature = URL_SAFE_NO_PAD.decode(parts[2]).map_err(|e| {
            Error::processing("failed to base64url decode the JWT Signature").with_source(e)
        })?;

        let claims = JwtClaims::from_object(decode_object(parts[1], "Payload")?)?;
        // compared on the raw number, fractional seconds included
        if let Some(exp) = claims.get("exp").and_then(Value::as_f64) {
            if exp <= (now - CLOCK_TOLERANCE) as f64 {
                let exp = exp.floor() as i64;
                return Err(Error::new(ErrorKind::Expired { exp, now }, None));
            }
        }
        if let Some(nbf) = claims.get("nbf").and_then(Value::as_f64) {
            if nbf > (now + CLOCK_TOLERANCE) as f64 {
                let nbf = nbf.ceil() as i64;
                return Err(Error::new(ErrorKind::NotYetValid { nbf, now }, None));
            }
        }

        Ok(Self {
            header,
            claims,
            signature,
            signing_input: format!("{}.{}", parts[0], parts[1]),
        })
    }

    pub fn header(&self) -> &JwsHeader {
        &self.header
    }

    pub fn claims(&self) -> &JwtClaims {
        &self.claims
    }

    pub fn into_claims(self) -> JwtClaims {
        self.claims
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// `base64url(header).base64url(payload)` exactly as received.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    pub fn header_segment(&self) -> &str {
        self.signing_input
            .split_once('.')
            .map_or(self.signing_input.as_str(), |(h, _)| h)
    }

    pub fn payload_segment(&self) -> &str {
        self.signing_input
            .split_once('.')
            .map_or("", |(_, p)| p)
    }

    /// Verify the signature with `key` under the header's algorithm.
    pub fn verify_signature(&self, key: &PublicKey) -> Result<()> {
        let alg: JwsAlgorithm = self.header.alg.parse()?;
        key.verify(alg, self.signing_input.as_bytes(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::create_signed_jwt;
    use crate::keys::PrivateKey;
    use rand::rngs::OsRng;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn es256() -> PrivateKey {
        PrivateKey::Es256(p256::ecdsa::SigningKey::random(&mut OsRng))
    }

    fn sign(key: &PrivateKey, claims: Value) -> String {
        create_signed_jwt(key, &JwsHeader::from(key.algorithm()), &claims).unwrap()
    }

    fn raw(header: Value, payload: Value) -> String {
        format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap())
        )
    }

    #[test]
    fn segments_survive_decode() {
        let key = es256();
        let token = sign(&key, json!({"iss": "https://as", "n": "é"}));
        let jwt = ParsedJwt::parse_at(&token, NOW).unwrap();
        for segment in [jwt.header_segment(), jwt.payload_segment()] {
            let decoded = URL_SAFE_NO_PAD.decode(segment).unwrap();
            assert_eq!(URL_SAFE_NO_PAD.encode(decoded), segment);
        }
        assert_eq!(jwt.header().alg, "ES256");
        assert_eq!(jwt.claims().get_str("n"), Some("é"));
        jwt.verify_signature(&key.public_key()).unwrap();
        assert!(jwt.verify_signature(&es256().public_key()).is_err());
    }

    #[test]
    fn part_count() {
        let err = ParsedJwt::parse_at("a.b.c.d.e", NOW).unwrap_err();
        assert!(err.is_unsupported());
        let err = ParsedJwt::parse_at("a.b", NOW).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m == "Invalid JWT"));
        assert!(ParsedJwt::parse_at("", NOW).is_err());
    }

    #[test]
    fn header_and_payload_must_be_objects() {
        let token = raw(json!(["ES256"]), json!({}));
        assert!(ParsedJwt::parse_at(&token, NOW).unwrap_err().is_processing());
        let token = raw(json!({"alg": "ES256"}), json!("claims"));
        assert!(ParsedJwt::parse_at(&token, NOW).unwrap_err().is_processing());
        assert!(ParsedJwt::parse_at("!!.e30.c2ln", NOW).is_err());
    }

    #[test]
    fn crit_rejected() {
        let token = raw(json!({"alg": "ES256", "crit": ["b64"]}), json!({}));
        let err = ParsedJwt::parse_at(&token, NOW).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Processing(m) if m.contains("crit")));
    }

    #[test]
    fn expiration_boundary() {
        let ok = raw(json!({"alg": "ES256"}), json!({"exp": NOW - 29}));
        assert!(ParsedJwt::parse_at(&ok, NOW).is_ok());
        let expired = raw(json!({"alg": "ES256"}), json!({"exp": NOW - 30}));
        let err = ParsedJwt::parse_at(&expired, NOW).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Expired { .. }));
    }

    #[test]
    fn not_before_boundary() {
        let ok = raw(json!({"alg": "ES256"}), json!({"nbf": NOW + 30}));
        assert!(ParsedJwt::parse_at(&ok, NOW).is_ok());
        let early = raw(json!({"alg": "ES256"}), json!({"nbf": NOW + 31}));
        let err = ParsedJwt::parse_at(&early, NOW).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotYetValid { .. }));
    }

    #[test]
    fn fractional_dates_keep_the_boundary() {
        let ok = raw(json!({"alg": "ES256"}), json!({"exp": NOW as f64 - 29.5}));
        assert!(ParsedJwt::parse_at(&ok, NOW).is_ok());
        let expired = raw(json!({"alg": "ES256"}), json!({"exp": NOW as f64 - 30.5}));
        let err = ParsedJwt::parse_at(&expired, NOW).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Expired { .. }));

        let ok = raw(json!({"alg": "ES256"}), json!({"nbf": NOW as f64 + 29.5}));
        assert!(ParsedJwt::parse_at(&ok, NOW).is_ok());
        let early = raw(json!({"alg": "ES256"}), json!({"nbf": NOW as f64 + 30.5}));
        let err = ParsedJwt::parse_at(&early, NOW).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotYetValid { .. }));
    }

    #[test]
    fn claim_types_checked() {
        let token = raw(json!({"alg": "ES256"}), json!({"iat": "yesterday"}));
        assert!(ParsedJwt::parse_at(&token, NOW).is_err());
        let token = raw(json!({"alg": "ES256"}), json!({"aud": 5}));
        assert!(ParsedJwt::parse_at(&token, NOW).is_err());
    }
}

//! JOSE building blocks: JWS headers, JWT claims, JWKs, signing and the
//! compact serialization parser.

pub mod compact;
pub mod jwk;
pub mod jws;
pub mod jwt;
pub mod signing;

pub use self::compact::{CLOCK_TOLERANCE, ParsedJwt};
pub use self::signing::create_signed_jwt;

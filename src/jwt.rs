//! Access token issuance and verification.
//!
//! Access tokens are HS256-signed JWTs carrying a fixed claim set. They are
//! stateless: verification needs only the signing secret and the wall clock.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Access token lifetime: 5 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 5 * 60;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub id: i64,
    /// Whether the bearer completed a login
    pub authorized: bool,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Mints and verifies access tokens with a server-held secret.
///
/// The secret is fixed at construction and never changes afterwards.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue an access token for a user, valid for five minutes from now.
    pub fn issue(&self, user_id: i64) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, now_secs()?)
    }

    /// Issue an access token as if it had been minted at `issued_at`.
    pub fn issue_at(&self, user_id: i64, issued_at: u64) -> Result<IssuedToken, TokenError> {
        let expires_at = issued_at + ACCESS_TOKEN_DURATION_SECS;

        let claims = AccessClaims {
            id: user_id,
            authorized: true,
            exp: expires_at,
        };

        let token = jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at,
            duration: ACCESS_TOKEN_DURATION_SECS,
        })
    }

    /// Verify a token's algorithm, signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;

        jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| classify(token, &e))
    }
}

fn now_secs() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Time)
}

/// Map a decoding failure onto the three verification outcomes.
///
/// jsonwebtoken reports an undecodable signature segment or an unknown `alg`
/// as a parse error, so those cases are told apart from genuinely malformed
/// tokens by inspecting the segments.
fn classify(token: &str, err: &jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        _ => classify_structure(token),
    }
}

fn classify_structure(token: &str) -> TokenError {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, claims, signature] = segments.as_slice() else {
        return TokenError::Malformed;
    };

    let Some(header) = decode_json_segment(header) else {
        return TokenError::Malformed;
    };
    if decode_json_segment(claims).is_none() {
        return TokenError::Malformed;
    }

    let declared_alg = header.get("alg").and_then(|alg| alg.as_str());
    if declared_alg != Some("HS256") {
        return TokenError::InvalidSignature;
    }

    if URL_SAFE_NO_PAD.decode(signature).is_err() {
        return TokenError::InvalidSignature;
    }

    TokenError::Malformed
}

fn decode_json_segment(segment: &str) -> Option<serde_json::Value> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.is_object().then_some(value)
}

/// Errors that can occur during token operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token cannot be parsed
    Malformed,
    /// Signature mismatch or unexpected algorithm
    InvalidSignature,
    /// Signature is valid but the token is past its expiry
    Expired,
    /// Error encoding the token
    Encoding(String),
    /// System time error
    Time,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            TokenError::Time => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}

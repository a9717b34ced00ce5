//! Bearer token verification — JWT signature validation and JWKS caching.
//!
//! # Verification flow
//!
//! 1. Require the compact three-segment JWT form and a `kid` header.
//! 2. Fetch the issuer's JWKS (cached; refreshed once on unknown `kid`).
//! 3. Verify the RS256 signature.
//! 4. Validate claims with zero clock leeway: `exp` strictly in the future,
//!    `aud` equal to the configured project id, `iss` equal to
//!    `https://securetoken.google.com/<project-id>`.
//!
//! The claims check is a pure function over an explicit `now` so expiry rules
//! are testable without a network or a real clock. Every failure mode is an
//! [`AuthError`]; nothing here panics on caller-supplied input.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation,
    jwk::{AlgorithmParameters, JwkSet},
};
use serde::Deserialize;
use tracing::debug;

/// Default JWK endpoint for Google secure-token (Firebase) ID tokens.
pub const DEFAULT_JWKS_URI: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Error variants for token verification failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token is not a three-segment compact JWT.
    #[error("Malformed token")]
    Malformed,

    /// The JWT header carries no `kid`.
    #[error("JWT missing 'kid' field in header")]
    MissingKeyId,

    /// The `kid` is not present in the issuer's JWKS, even after refresh.
    #[error("Unknown key ID: {0}")]
    UnknownKeyId(String),

    /// The token is signed with an algorithm the issuer never uses.
    #[error("Unsupported JWT algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// Signature or structural verification failed.
    #[error("JWT verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// The token's `exp` is not strictly in the future.
    #[error("Token expired at {exp} (now {now})")]
    Expired {
        /// Expiry claim, seconds since epoch.
        exp: u64,
        /// Validation time, seconds since epoch.
        now: u64,
    },

    /// The `aud` claim does not equal the configured project id.
    #[error("Audience mismatch: expected {expected}, got {actual}")]
    AudienceMismatch {
        /// Configured project id.
        expected: String,
        /// Audience found in the token.
        actual: String,
    },

    /// The `iss` claim does not equal the expected issuer URL.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// Expected issuer URL.
        expected: String,
        /// Issuer found in the token.
        actual: String,
    },

    /// Network or HTTP error while fetching the JWKS.
    #[error("JWKS fetch error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Claims the gateway cares about in an identity token.
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since epoch.
    pub exp: u64,
    /// Audience (the Firebase project id).
    pub aud: String,
    /// Issuer URL.
    pub iss: String,
    /// Subject (opaque user id).
    #[serde(default)]
    pub sub: Option<String>,
}

/// Expected issuer URL for a project.
#[must_use]
pub fn expected_issuer(project_id: &str) -> String {
    format!("https://securetoken.google.com/{project_id}")
}

/// Validate `exp`/`aud`/`iss` against an explicit clock.
///
/// Zero clock-skew tolerance: a token expiring exactly at `now` is rejected.
pub fn validate_claims(claims: &Claims, now: u64, project_id: &str) -> Result<(), AuthError> {
    if claims.exp <= now {
        return Err(AuthError::Expired {
            exp: claims.exp,
            now,
        });
    }

    if claims.aud != project_id {
        return Err(AuthError::AudienceMismatch {
            expected: project_id.to_string(),
            actual: claims.aud.clone(),
        });
    }

    let issuer = expected_issuer(project_id);
    if claims.iss != issuer {
        return Err(AuthError::IssuerMismatch {
            expected: issuer,
            actual: claims.iss.clone(),
        });
    }

    Ok(())
}

/// Boolean-shaped verification contract the router depends on.
///
/// Implemented by [`FirebaseVerifier`] in production and by stubs in tests.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw bearer token. `Ok(())` means the caller is authorized.
    async fn verify(&self, token: &str) -> Result<(), AuthError>;
}

/// Cached JWKS entry.
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// JWKS cache — one entry per endpoint URI.
struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    http: reqwest::Client,
    ttl: Duration,
}

impl JwksCache {
    /// Fails if the HTTP client cannot be built; the https-only and timeout
    /// settings are load-bearing and must never be silently dropped.
    fn new(ttl: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .https_only(true)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            inner: DashMap::new(),
            http,
            ttl,
        })
    }

    /// Return the cached JWKS for `uri`, fetching if stale.
    ///
    /// If `force_refresh` is `true`, the cache is bypassed regardless of TTL.
    async fn get_or_fetch(&self, uri: &str, force_refresh: bool) -> Result<JwkSet, AuthError> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(uri) {
                if !cached.is_stale() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(uri = %uri, "Fetching JWKS");
        let jwks: JwkSet = self.http.get(uri).send().await?.json().await?;

        self.inner.insert(
            uri.to_string(),
            CachedJwks {
                keys: jwks.clone(),
                fetched_at: Instant::now(),
                ttl: self.ttl,
            },
        );

        Ok(jwks)
    }
}

/// Where the verifier's keys come from.
enum KeySource {
    /// JWKS endpoint, fetched through the cache.
    Remote { uri: String, cache: JwksCache },
    /// Fixed key set for tests; no network access.
    Static(JwkSet),
}

/// Verifier for Google secure-token (Firebase) ID tokens.
pub struct FirebaseVerifier {
    project_id: String,
    keys: KeySource,
}

impl FirebaseVerifier {
    /// Create a verifier fetching keys from `jwks_uri` with the given cache TTL.
    ///
    /// Fails only if the underlying HTTP client cannot be constructed.
    pub fn new(
        project_id: impl Into<String>,
        jwks_uri: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            project_id: project_id.into(),
            keys: KeySource::Remote {
                uri: jwks_uri.into(),
                cache: JwksCache::new(ttl)?,
            },
        })
    }

    /// Create a verifier over a fixed key set (no network access).
    #[must_use]
    pub fn with_static_jwks(project_id: impl Into<String>, jwks: JwkSet) -> Self {
        Self {
            project_id: project_id.into(),
            keys: KeySource::Static(jwks),
        }
    }

    /// Find a decoding key by `kid`, refreshing the JWKS cache if not found.
    async fn find_decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let (uri, cache) = match &self.keys {
            KeySource::Static(jwks) => {
                return find_key_in_jwks(jwks, kid)
                    .ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()));
            }
            KeySource::Remote { uri, cache } => (uri, cache),
        };

        let jwks = cache.get_or_fetch(uri, false).await?;
        if let Some(key) = find_key_in_jwks(&jwks, kid) {
            return Ok(key);
        }

        // Unknown kid: refresh once and retry (key rotation)
        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let jwks = cache.get_or_fetch(uri, true).await?;
        find_key_in_jwks(&jwks, kid).ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<(), AuthError> {
        if token.split('.').count() != 3 {
            return Err(AuthError::Malformed);
        }

        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        let decoding_key = self.find_decoding_key(&kid).await?;

        // Signature check only; exp/aud/iss are validated below against an
        // explicit clock so the rules stay in one testable place.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        validate_claims(&token_data.claims, now, &self.project_id)
    }
}

/// Find a JWK by `kid` in a `JwkSet` and convert it to a `DecodingKey`.
fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        let jwk_kid = jwk.common.key_id.as_deref().unwrap_or("");
        if jwk_kid != kid {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            _ => None,
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: u64, aud: &str, iss: &str) -> Claims {
        Claims {
            exp,
            aud: aud.to_string(),
            iss: iss.to_string(),
            sub: Some("user-1".to_string()),
        }
    }

    const PROJECT: &str = "ridgemont-studio";

    fn good_issuer() -> String {
        expected_issuer(PROJECT)
    }

    #[test]
    fn expired_token_is_rejected_regardless_of_other_claims() {
        let c = claims(999, PROJECT, &good_issuer());
        let err = validate_claims(&c, 1_000, PROJECT).unwrap_err();
        assert!(matches!(err, AuthError::Expired { exp: 999, now: 1_000 }));
    }

    #[test]
    fn expiry_has_zero_leeway() {
        // exp == now is already expired
        let c = claims(1_000, PROJECT, &good_issuer());
        assert!(validate_claims(&c, 1_000, PROJECT).is_err());
        assert!(validate_claims(&c, 999, PROJECT).is_ok());
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let c = claims(2_000, "someone-elses-project", &good_issuer());
        let err = validate_claims(&c, 1_000, PROJECT).unwrap_err();
        assert!(matches!(err, AuthError::AudienceMismatch { .. }));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let c = claims(2_000, PROJECT, "https://evil.example.com/ridgemont-studio");
        let err = validate_claims(&c, 1_000, PROJECT).unwrap_err();
        assert!(matches!(err, AuthError::IssuerMismatch { .. }));
    }

    #[test]
    fn issuer_must_match_exactly() {
        // Same host, wrong project segment
        let c = claims(2_000, PROJECT, "https://securetoken.google.com/other");
        assert!(validate_claims(&c, 1_000, PROJECT).is_err());
    }

    #[test]
    fn expected_issuer_embeds_project_id() {
        assert_eq!(
            expected_issuer("my-app"),
            "https://securetoken.google.com/my-app"
        );
    }

    #[tokio::test]
    async fn malformed_tokens_are_rejected_without_panicking() {
        let verifier =
            FirebaseVerifier::with_static_jwks(PROJECT, JwkSet { keys: vec![] });

        for token in ["", "a", "a.b", "a.b.c.d", "not a jwt at all"] {
            let err = verifier.verify(token).await.unwrap_err();
            assert!(matches!(err, AuthError::Malformed), "token: {token:?}");
        }

        // Right segment count, undecodable header
        let err = verifier.verify("!!!.###.$$$").await.unwrap_err();
        assert!(matches!(err, AuthError::Jwt(_)));
    }

    #[test]
    fn remote_verifier_construction_is_fallible_and_succeeds_normally() {
        // Builder errors must surface instead of degrading to a client
        // without the https-only and timeout settings
        let verifier = FirebaseVerifier::new(PROJECT, DEFAULT_JWKS_URI, Duration::from_secs(60));
        assert!(verifier.is_ok());
    }

    #[test]
    fn find_key_ignores_non_matching_kids() {
        let jwks = JwkSet { keys: vec![] };
        assert!(find_key_in_jwks(&jwks, "anything").is_none());
    }
}

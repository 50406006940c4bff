//! ID-token verification

use std::time::Duration;

use http::header::{HeaderValue, ACCEPT};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::auth::{AuthError, Credential, BEARER, DPOP};
use crate::client::HttpService;
use crate::dpop::ProofKeyPair;
use crate::message::Request;

/// Options for verifying an ID token and using it.
///
/// - `expected_audience`: when set, the `aud` claim must contain it
/// - `public_key_location`: JWKS URL; when set, signatures are verified
/// - `exp_grace_period`: clock skew tolerated on `exp`
/// - `proof_key_pairs`: keys for DPoP proofs; none disables DPoP
#[derive(Debug, Clone, Default)]
pub struct OpenIdVerificationConfig {
    pub expected_audience: Option<String>,
    pub public_key_location: Option<Url>,
    pub exp_grace_period: Duration,
    pub proof_key_pairs: Vec<ProofKeyPair>,
}

impl OpenIdVerificationConfig {
    pub fn with_expected_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }

    pub fn with_public_key_location(mut self, location: Url) -> Self {
        self.public_key_location = Some(location);
        self
    }

    pub fn with_exp_grace_period(mut self, grace: Duration) -> Self {
        self.exp_grace_period = grace;
        self
    }

    pub fn with_proof_key_pair(mut self, key: ProofKeyPair) -> Self {
        self.proof_key_pairs.push(key);
        self
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    sub: String,
    exp: i64,
    #[allow(dead_code)]
    iat: i64,
    #[serde(default)]
    webid: Option<String>,
    #[serde(default)]
    cnf: Option<Confirmation>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    #[serde(default)]
    jkt: Option<String>,
}

/// Largest tolerated clock skew on `exp`.
pub const MAX_EXP_GRACE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedIdToken {
    pub credential: Credential,
    /// SHA-256 hex of the WebID, or of `iss|sub` without one.
    pub session_id: String,
}

/// Verify `token` and turn it into the session's long-lived credential.
///
/// The credential expires at `exp` plus the grace period, so the strict
/// expiry check of [`Credential`] honors the configured skew.
pub async fn verify_id_token(
    token: &str,
    config: &OpenIdVerificationConfig,
    transport: &dyn HttpService,
) -> Result<VerifiedIdToken, AuthError> {
    let header = decode_header(token)
        .map_err(|e| AuthError::InvalidCredential(format!("malformed ID token: {}", e)))?;

    if config.exp_grace_period > MAX_EXP_GRACE_PERIOD {
        return Err(AuthError::InvalidCredential(format!(
            "exp grace period of {}s exceeds {}s",
            config.exp_grace_period.as_secs(),
            MAX_EXP_GRACE_PERIOD.as_secs()
        )));
    }

    let mut validation = Validation::new(header.alg);
    validation.leeway = config.exp_grace_period.as_secs();
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    match &config.expected_audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let key = match &config.public_key_location {
        Some(location) => fetch_decoding_key(location, header.kid.as_deref(), transport).await?,
        None => {
            validation.insecure_disable_signature_validation();
            DecodingKey::from_secret(&[])
        }
    };

    let claims = decode::<IdTokenClaims>(token, &key, &validation)
        .map_err(|e| AuthError::InvalidCredential(format!("unable to verify ID token: {}", e)))?
        .claims;

    let issuer = Url::parse(&claims.iss)
        .map_err(|e| AuthError::InvalidCredential(format!("issuer is not a URL: {}", e)))?;

    let principal = claims
        .webid
        .as_deref()
        .and_then(|webid| Url::parse(webid).ok())
        .or_else(|| Url::parse(&claims.sub).ok());

    let session_id = match &claims.webid {
        Some(webid) => sha256_hex(webid),
        None => sha256_hex(&format!("{}|{}", claims.iss, claims.sub)),
    };

    let expiration = i64::try_from(config.exp_grace_period.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .zip(chrono::DateTime::from_timestamp(claims.exp, 0))
        .and_then(|(grace, exp)| exp.checked_add_signed(grace))
        .ok_or_else(|| AuthError::InvalidCredential("exp is out of range".to_string()))?;

    let jkt = claims.cnf.and_then(|cnf| cnf.jkt);
    let scheme = if jkt.is_some() { DPOP } else { BEARER };

    debug!(issuer = %issuer, session = %session_id, scheme, "Verified ID token");

    let credential = Credential::new(scheme, issuer, token, expiration)
        .with_principal(principal)
        .with_proof_thumbprint(jkt);

    Ok(VerifiedIdToken {
        credential,
        session_id,
    })
}

async fn fetch_decoding_key(
    location: &Url,
    kid: Option<&str>,
    transport: &dyn HttpService,
) -> Result<DecodingKey, AuthError> {
    let request = Request::builder(http::Method::GET, location.clone())
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .build();
    let response = transport.send(request).await?;
    if !response.status().is_success() {
        return Err(AuthError::InvalidCredential(format!(
            "unable to fetch signing keys from {}: HTTP {}",
            location,
            response.status().as_u16()
        )));
    }

    let jwks: JwkSet = serde_json::from_slice(response.body())
        .map_err(|e| AuthError::InvalidCredential(format!("invalid JWKS at {}: {}", location, e)))?;

    let jwk = match kid {
        Some(kid) => jwks.find(kid),
        None => jwks.keys.first(),
    }
    .ok_or_else(|| AuthError::InvalidCredential(format!("no matching signing key at {}", location)))?;

    DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::InvalidCredential(format!("unusable signing key: {}", e)))
}

pub(crate) fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReqwestService;
    use crate::dpop::ProofAlgorithm;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hs256(claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    fn claims(exp_offset: i64) -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": "https://issuer.example",
            "sub": "https://id.example/alice#me",
            "aud": "solid",
            "iat": now,
            "exp": now + exp_offset,
            "webid": "https://id.example/alice#me",
        })
    }

    #[tokio::test]
    async fn test_unsigned_verification() {
        let token = hs256(claims(300));
        let verified = verify_id_token(&token, &OpenIdVerificationConfig::default(), &ReqwestService::shared())
            .await
            .unwrap();

        assert_eq!(verified.credential.scheme(), "Bearer");
        assert_eq!(verified.credential.token(), token);
        assert_eq!(verified.credential.principal().unwrap().as_str(), "https://id.example/alice#me");
        assert_eq!(verified.session_id, sha256_hex("https://id.example/alice#me"));
        assert!(!verified.credential.is_expired());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let token = hs256(claims(-600));
        let err = verify_id_token(&token, &OpenIdVerificationConfig::default(), &ReqwestService::shared())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_times_are_rejected() {
        let transport = ReqwestService::shared();

        let huge_grace = OpenIdVerificationConfig::default().with_exp_grace_period(Duration::from_secs(u64::MAX));
        let err = verify_id_token(&hs256(claims(300)), &huge_grace, &transport)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));

        let mut far_exp = claims(300);
        far_exp["exp"] = json!(i64::MAX);
        let err = verify_id_token(&hs256(far_exp), &OpenIdVerificationConfig::default(), &transport)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_grace_period_tolerates_skew() {
        let token = hs256(claims(-30));
        let config = OpenIdVerificationConfig::default().with_exp_grace_period(Duration::from_secs(120));
        let verified = verify_id_token(&token, &config, &ReqwestService::shared()).await.unwrap();
        assert!(!verified.credential.is_expired());
    }

    #[tokio::test]
    async fn test_audience_and_required_claims() {
        let transport = ReqwestService::shared();
        let token = hs256(claims(300));

        let wrong = OpenIdVerificationConfig::default().with_expected_audience("other");
        assert!(verify_id_token(&token, &wrong, &transport).await.is_err());

        let right = OpenIdVerificationConfig::default().with_expected_audience("solid");
        assert!(verify_id_token(&token, &right, &transport).await.is_ok());

        let mut no_iat = claims(300);
        no_iat.as_object_mut().unwrap().remove("iat");
        let err = verify_id_token(&hs256(no_iat), &OpenIdVerificationConfig::default(), &transport)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_session_id_without_webid() {
        let mut value = claims(300);
        value.as_object_mut().unwrap().remove("webid");
        value["sub"] = json!("alice");

        let verified = verify_id_token(&hs256(value), &OpenIdVerificationConfig::default(), &ReqwestService::shared())
            .await
            .unwrap();
        assert_eq!(verified.session_id, sha256_hex("https://issuer.example|alice"));
        assert!(verified.credential.principal().is_none());
    }

    #[tokio::test]
    async fn test_bound_token_uses_dpop_scheme() {
        let mut value = claims(300);
        value["cnf"] = json!({ "jkt": "thumb" });
        let verified = verify_id_token(&hs256(value), &OpenIdVerificationConfig::default(), &ReqwestService::shared())
            .await
            .unwrap();
        assert_eq!(verified.credential.scheme(), "DPoP");
        assert_eq!(verified.credential.proof_thumbprint(), Some("thumb"));
    }

    #[tokio::test]
    async fn test_signature_verified_against_jwks() {
        let server = MockServer::start().await;
        let signer = ProofKeyPair::generate(ProofAlgorithm::ES256).unwrap();
        let mut jwk = signer.jwk().clone();
        jwk.common.key_id = Some("key-1".to_string());

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [jwk] })))
            .mount(&server)
            .await;

        let mut header = Header::new(jsonwebtoken::Algorithm::ES256);
        header.kid = Some("key-1".to_string());
        let token = encode(&header, &claims(300), signer.encoding_key()).unwrap();

        let config = OpenIdVerificationConfig::default()
            .with_public_key_location(Url::parse(&format!("{}/jwks", server.uri())).unwrap());
        let transport = ReqwestService::shared();
        assert!(verify_id_token(&token, &config, &transport).await.is_ok());

        let forged = hs256(claims(300));
        assert!(verify_id_token(&forged, &config, &transport).await.is_err());
    }
}

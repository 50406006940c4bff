//! Claim gathering for `need_info` responses

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::UmaError;

/// A claim token presented to the authorization server, with its
/// `claim_token_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimToken {
    pub token: String,
    pub token_type: String,
}

impl ClaimToken {
    pub fn new(token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: token_type.into(),
        }
    }
}

/// One entry of `required_claims` in a `need_info` response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RequiredClaims {
    #[serde(default)]
    pub claim_token_format: Vec<String>,
    #[serde(default)]
    pub issuer: Vec<String>,
    #[serde(default)]
    pub claim_type: Option<String>,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The `need_info` error: a new ticket plus what the server wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeedInfo {
    pub ticket: String,
    pub redirect_user: Option<Url>,
    pub required_claims: Vec<RequiredClaims>,
}

/// Produces a claim token of one format from one issuer.
#[async_trait]
pub trait ClaimGatheringHandler: Send + Sync {
    fn claim_token_format(&self) -> &str;

    fn issuer(&self) -> &str;

    fn claim_type(&self) -> &str;

    async fn gather(&self) -> Result<Option<ClaimToken>, UmaError>;

    /// Empty format or issuer lists accept anything; the claim type must
    /// be present and equal.
    fn is_compatible_with(&self, requirements: &RequiredClaims) -> bool {
        if !requirements.claim_token_format.is_empty()
            && !requirements
                .claim_token_format
                .iter()
                .any(|f| f == self.claim_token_format())
        {
            return false;
        }

        if !requirements.issuer.is_empty() && !requirements.issuer.iter().any(|i| i == self.issuer()) {
            return false;
        }

        requirements.claim_type.as_deref() == Some(self.claim_type())
    }
}

/// Ordered set of claim-gathering handlers.
#[derive(Clone, Default)]
pub struct NeedInfoHandler {
    handlers: Vec<Arc<dyn ClaimGatheringHandler>>,
}

impl NeedInfoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Arc<dyn ClaimGatheringHandler>) {
        self.handlers.push(handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn ClaimGatheringHandler>) -> Self {
        self.add_handler(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Claim token from the first handler compatible with any requirement,
    /// requirements taken in server order.
    pub async fn claim_token(&self, need_info: &NeedInfo) -> Result<Option<ClaimToken>, UmaError> {
        for requirements in &need_info.required_claims {
            if let Some(handler) = self.handlers.iter().find(|h| h.is_compatible_with(requirements)) {
                debug!(
                    format = %handler.claim_token_format(),
                    issuer = %handler.issuer(),
                    "Gathering claims"
                );
                return handler.gather().await;
            }
        }
        debug!(requirements = need_info.required_claims.len(), "No compatible claim gathering handler");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticHandler {
        issuer: &'static str,
        token: &'static str,
    }

    #[async_trait]
    impl ClaimGatheringHandler for StaticHandler {
        fn claim_token_format(&self) -> &str {
            "urn:ietf:params:oauth:token-type:id_token"
        }

        fn issuer(&self) -> &str {
            self.issuer
        }

        fn claim_type(&self) -> &str {
            "webid"
        }

        async fn gather(&self) -> Result<Option<ClaimToken>, UmaError> {
            Ok(Some(ClaimToken::new(self.token, self.claim_token_format())))
        }
    }

    fn requirements(formats: &[&str], issuers: &[&str], claim_type: Option<&str>) -> RequiredClaims {
        RequiredClaims {
            claim_token_format: formats.iter().map(|s| s.to_string()).collect(),
            issuer: issuers.iter().map(|s| s.to_string()).collect(),
            claim_type: claim_type.map(String::from),
            ..RequiredClaims::default()
        }
    }

    #[test]
    fn test_compatibility() {
        let handler = StaticHandler {
            issuer: "https://idp.example",
            token: "t",
        };
        assert!(handler.is_compatible_with(&requirements(&[], &[], Some("webid"))));
        assert!(handler.is_compatible_with(&requirements(
            &["urn:ietf:params:oauth:token-type:id_token"],
            &["https://idp.example"],
            Some("webid")
        )));
        assert!(!handler.is_compatible_with(&requirements(&["other"], &[], Some("webid"))));
        assert!(!handler.is_compatible_with(&requirements(&[], &["https://other.example"], Some("webid"))));
        assert!(!handler.is_compatible_with(&requirements(&[], &[], None)));
        assert!(!handler.is_compatible_with(&requirements(&[], &[], Some("email"))));
    }

    #[test]
    fn test_required_claims_json() {
        let claims: RequiredClaims = serde_json::from_str(
            r#"{"claim_token_format":["jwt"],"issuer":["https://idp.example"],"claim_type":"webid","friendly_name":"WebID","name":"webid"}"#,
        )
        .unwrap();
        assert_eq!(claims.claim_token_format, vec!["jwt"]);
        assert_eq!(claims.friendly_name.as_deref(), Some("WebID"));
    }

    #[tokio::test]
    async fn test_first_compatible_handler_wins() {
        let handler = NeedInfoHandler::new()
            .with_handler(Arc::new(StaticHandler {
                issuer: "https://a.example",
                token: "from-a",
            }))
            .with_handler(Arc::new(StaticHandler {
                issuer: "https://b.example",
                token: "from-b",
            }));

        let need_info = NeedInfo {
            ticket: "t2".to_string(),
            redirect_user: None,
            required_claims: vec![
                requirements(&[], &["https://c.example"], Some("webid")),
                requirements(&[], &["https://b.example"], Some("webid")),
            ],
        };
        let token = handler.claim_token(&need_info).await.unwrap().unwrap();
        assert_eq!(token.token, "from-b");

        let unmatched = NeedInfo {
            required_claims: vec![requirements(&[], &[], Some("email"))],
            ..need_info
        };
        assert!(handler.claim_token(&unmatched).await.unwrap().is_none());
    }
}

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::account::{AuthMethod, Credential, Subscription};
use crate::config::{Endpoints, ProviderConfig};
use crate::errors::{CkAuthError, Result};
use crate::models::*;
use crate::provider::{
    CheckOutcome, CheckReport, Failure, RefreshOutcome, TokenProvider, classify_http,
    classify_transport,
};

/// Token provider talking to the social and IdC token endpoints over HTTP
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    config: ProviderConfig,
    http: Client,
}

impl HttpTokenProvider {
    /// Create a new provider
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.endpoints.validate()?;

        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("credkeeper"))
            .build()?;

        Ok(Self { config, http })
    }

    /// Refresh a social-login credential
    #[instrument(skip(self, credential), fields(region = %credential.region))]
    async fn refresh_social(&self, credential: &Credential) -> std::result::Result<Credential, Failure> {
        let url = Endpoints::resolve(&self.config.endpoints.social_refresh, &credential.region);
        let request = SocialRefreshRequest {
            refresh_token: &credential.refresh_token,
        };

        debug!("Refreshing social credential");
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let body: SocialRefreshResponse = read_json(response).await?;
        let expires_at = expiry_from(body.expires_in)?;

        Ok(Credential {
            access_token: body.access_token,
            refresh_token: body
                .refresh_token
                .unwrap_or_else(|| credential.refresh_token.clone()),
            profile_arn: body.profile_arn.or_else(|| credential.profile_arn.clone()),
            expires_at,
            ..credential.clone()
        })
    }

    /// Refresh an IdC credential through the OIDC token endpoint
    #[instrument(skip(self, credential), fields(region = %credential.region))]
    async fn refresh_idc(&self, credential: &Credential) -> std::result::Result<Credential, Failure> {
        let client_id = credential
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Failure::Expired(CkAuthError::MissingClientCredentials("clientId").to_string())
            })?;
        let client_secret = credential
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Failure::Expired(CkAuthError::MissingClientCredentials("clientSecret").to_string())
            })?;

        let url = Endpoints::resolve(&self.config.endpoints.idc_token, &credential.region);
        let request = IdcTokenRequest {
            client_id,
            client_secret,
            grant_type: "refresh_token",
            refresh_token: &credential.refresh_token,
        };

        debug!("Refreshing IdC credential");
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let body: IdcTokenResponse = read_json(response).await?;
        let expires_at = expiry_from(body.expires_in)?;

        Ok(Credential {
            access_token: body.access_token,
            refresh_token: body
                .refresh_token
                .unwrap_or_else(|| credential.refresh_token.clone()),
            expires_at,
            ..credential.clone()
        })
    }

    /// Fetch usage limits, which doubles as an access-token validation
    #[instrument(skip(self, credential), fields(region = %credential.region))]
    async fn fetch_usage(&self, credential: &Credential) -> std::result::Result<CheckReport, Failure> {
        let url = Endpoints::resolve(&self.config.endpoints.usage_limits, &credential.region);
        let mut query = vec![("origin", "AI_EDITOR")];
        if let Some(arn) = credential.profile_arn.as_deref() {
            query.push(("profileArn", arn));
        }

        debug!("Checking credential against usage limits");
        let response = self
            .http
            .get(url)
            .query(&query)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", credential.access_token))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let body: UsageLimitsResponse = read_json(response).await?;
        let subscription = body.subscription_info.map(|info| Subscription {
            plan_type: info.plan_type,
            title: info.subscription_title,
        });

        Ok(CheckReport { subscription })
    }
}

#[async_trait::async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn refresh(&self, credential: &Credential) -> RefreshOutcome {
        let result = match credential.auth_method {
            AuthMethod::Social => self.refresh_social(credential).await,
            AuthMethod::Idc => self.refresh_idc(credential).await,
        };

        match result {
            Ok(refreshed) => RefreshOutcome::Refreshed(refreshed),
            Err(failure) => {
                debug!(kind = failure.kind(), "Refresh failed");
                RefreshOutcome::Failed(failure)
            }
        }
    }

    async fn check(&self, credential: &Credential) -> CheckOutcome {
        match self.fetch_usage(credential).await {
            Ok(report) => CheckOutcome::Valid(report),
            Err(failure) => {
                debug!(kind = failure.kind(), "Check failed");
                CheckOutcome::Failed(failure)
            }
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> std::result::Result<T, Failure> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_http(status, &body));
    }

    let bytes = response.bytes().await.map_err(|e| classify_transport(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        warn!("Provider returned an unexpected payload: {}", e);
        Failure::Unknown(CkAuthError::InvalidResponse(e.to_string()).to_string())
    })
}

/// Absolute expiry for a relative `expiresIn`; unusable values are `Unknown`
fn expiry_from(expires_in: Option<i64>) -> std::result::Result<DateTime<Utc>, Failure> {
    let unusable = |reason: &str| {
        Failure::Unknown(CkAuthError::InvalidResponse(reason.to_string()).to_string())
    };

    let secs = match expires_in {
        Some(secs) if secs > 0 => secs,
        _ => return Err(unusable("response carried no usable expiresIn")),
    };

    Duration::try_seconds(secs)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| unusable("expiresIn out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(auth_method: AuthMethod) -> Credential {
        Credential {
            access_token: "old-access".to_string(),
            refresh_token: "old-refresh".to_string(),
            client_id: Some("client-1".to_string()),
            client_secret: Some("secret-1".to_string()),
            region: "us-east-1".to_string(),
            provider: Some("BuilderId".to_string()),
            auth_method,
            profile_arn: Some("arn:aws:codewhisperer:us-east-1:1:profile/X".to_string()),
            expires_at: Utc::now(),
        }
    }

    async fn provider(server: &MockServer) -> HttpTokenProvider {
        HttpTokenProvider::new(ProviderConfig::with_base_url(&server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_idc_refresh_rotates_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_partial_json(serde_json::json!({
                "clientId": "client-1",
                "clientSecret": "secret-1",
                "grantType": "refresh_token",
                "refreshToken": "old-refresh"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "new-access",
                "refreshToken": "new-refresh",
                "expiresIn": 3600
            })))
            .mount(&server)
            .await;

        let old = credential(AuthMethod::Idc);
        let outcome = provider(&server).await.refresh(&old).await;

        let new = match outcome {
            RefreshOutcome::Refreshed(new) => new,
            other => panic!("expected refresh, got {other:?}"),
        };
        assert_eq!(new.access_token, "new-access");
        assert_eq!(new.refresh_token, "new-refresh");
        assert_eq!(new.client_id, old.client_id);
        assert!(new.expires_at > old.expires_at + Duration::seconds(3500));
    }

    #[tokio::test]
    async fn test_social_refresh_keeps_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refreshToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "new-access",
                "expiresIn": 1800
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server).await.refresh(&credential(AuthMethod::Social)).await;

        let new = match outcome {
            RefreshOutcome::Refreshed(new) => new,
            other => panic!("expected refresh, got {other:?}"),
        };
        assert_eq!(new.refresh_token, "old-refresh");
        assert_eq!(new.auth_method, AuthMethod::Social);
    }

    #[tokio::test]
    async fn test_refresh_without_expiry_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refreshToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "new-access"
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server).await.refresh(&credential(AuthMethod::Social)).await;
        assert!(matches!(outcome, RefreshOutcome::Failed(Failure::Unknown(_))));
    }

    #[tokio::test]
    async fn test_refresh_with_huge_expiry_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refreshToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "new-access",
                "expiresIn": 9_000_000_000_000_000_i64
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server).await.refresh(&credential(AuthMethod::Social)).await;
        match outcome {
            RefreshOutcome::Failed(Failure::Unknown(detail)) => {
                assert!(detail.contains("out of range"));
            }
            other => panic!("expected unknown failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_suspended_account() {
        let server = MockServer::start().await;
        let body = r#"{"message":"Your account is TEMPORARILY_SUSPENDED"}"#;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(403).set_body_string(body))
            .mount(&server)
            .await;

        let outcome = provider(&server).await.refresh(&credential(AuthMethod::Idc)).await;
        assert_eq!(outcome, RefreshOutcome::Failed(Failure::Suspended(body.to_string())));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = provider(&server).await.refresh(&credential(AuthMethod::Idc)).await;
        assert!(matches!(outcome, RefreshOutcome::Failed(Failure::Transient(_))));
    }

    #[tokio::test]
    async fn test_idc_without_client_secret_needs_reauth() {
        let server = MockServer::start().await;
        let mut cred = credential(AuthMethod::Idc);
        cred.client_secret = None;

        let outcome = provider(&server).await.refresh(&cred).await;
        assert!(matches!(outcome, RefreshOutcome::Failed(Failure::Expired(_))));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_check_reads_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getUsageLimits"))
            .and(query_param("origin", "AI_EDITOR"))
            .and(header("Authorization", "Bearer old-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "subscriptionInfo": {
                    "type": "Q_DEVELOPER_STANDALONE_PRO",
                    "subscriptionTitle": "KIRO PRO"
                }
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server).await.check(&credential(AuthMethod::Social)).await;

        let report = match outcome {
            CheckOutcome::Valid(report) => report,
            other => panic!("expected valid check, got {other:?}"),
        };
        let subscription = report.subscription.unwrap();
        assert_eq!(subscription.title.as_deref(), Some("KIRO PRO"));
        assert!(!subscription.is_first_time());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let provider =
            HttpTokenProvider::new(ProviderConfig::with_base_url("http://127.0.0.1:1")).unwrap();
        let outcome = provider.refresh(&credential(AuthMethod::Social)).await;
        assert!(matches!(outcome, RefreshOutcome::Failed(Failure::Transient(_))));
    }
}

use std::time::Duration;

use crate::errors::Result;

/// Default provider endpoints; `{region}` is substituted per credential
pub mod endpoints {
    pub const SOCIAL_REFRESH: &str = "https://prod.{region}.auth.desktop.kiro.dev/refreshToken";
    pub const IDC_TOKEN: &str = "https://oidc.{region}.amazonaws.com/token";
    pub const USAGE_LIMITS: &str = "https://codewhisperer.{region}.amazonaws.com/getUsageLimits";
}

/// Lead time before expiry at which a token counts as expiring (refresh 5 minutes early)
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Endpoint templates used by the HTTP token provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub social_refresh: String,
    pub idc_token: String,
    pub usage_limits: String,
}

impl Endpoints {
    /// Point every endpoint at one base URL (mock servers, proxies)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            social_refresh: format!("{}/refreshToken", base),
            idc_token: format!("{}/token", base),
            usage_limits: format!("{}/getUsageLimits", base),
        }
    }

    /// Substitute the credential's region into an endpoint template
    pub fn resolve(template: &str, region: &str) -> String {
        template.replace("{region}", region)
    }

    /// Check every template resolves to a valid URL
    pub fn validate(&self) -> Result<()> {
        for template in [&self.social_refresh, &self.idc_token, &self.usage_limits] {
            url::Url::parse(&Self::resolve(template, "us-east-1"))?;
        }
        Ok(())
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            social_refresh: endpoints::SOCIAL_REFRESH.to_string(),
            idc_token: endpoints::IDC_TOKEN.to_string(),
            usage_limits: endpoints::USAGE_LIMITS.to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Configuration for HttpTokenProvider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoints: Endpoints,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl ProviderConfig {
    /// Config targeting a single base URL, used against mock servers
    pub fn with_base_url(base: &str) -> Self {
        Self {
            endpoints: Endpoints::with_base(base),
            ..Self::default()
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some(concat!("credkeeper/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

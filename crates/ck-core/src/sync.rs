use ck_auth::Account;
use serde::{Deserialize, Serialize};

/// Flat credential record handed to the downstream sync consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAccount {
    pub id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub region: String,
    /// Lowercase `idc` / `social`
    pub auth_method: String,
    pub provider: Option<String>,
    pub profile_arn: Option<String>,
    /// Epoch milliseconds
    pub expires_at: i64,
}

impl SyncAccount {
    /// Build the record, or `None` if the account has no access token
    pub fn from_account(account: &Account) -> Option<Self> {
        let credential = account.credentials.as_ref()?;
        if credential.access_token.is_empty() {
            return None;
        }

        Some(Self {
            id: account.id.clone(),
            email: account.email.clone(),
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            region: credential.region.clone(),
            auth_method: credential.auth_method.as_str().to_string(),
            provider: credential.provider.clone(),
            profile_arn: credential.profile_arn.clone(),
            expires_at: credential.expires_at.timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AccountRegistry;
    use ck_auth::{AuthMethod, Credential};
    use chrono::DateTime;

    fn credential(access_token: &str) -> Credential {
        Credential {
            access_token: access_token.to_string(),
            refresh_token: "refresh".to_string(),
            client_id: None,
            client_secret: None,
            region: "us-east-1".to_string(),
            provider: Some("Google".to_string()),
            auth_method: AuthMethod::Social,
            profile_arn: None,
            expires_at: DateTime::from_timestamp_millis(1_900_000_000_000).unwrap(),
        }
    }

    #[test]
    fn test_only_accounts_with_access_tokens_are_exported() {
        let registry = AccountRegistry::new();
        let usable = registry.upsert(Account::new("a@example.com", Some(credential("token"))));
        registry.upsert(Account::new("b@example.com", Some(credential(""))));
        registry.upsert(Account::new("c@example.com", None));

        let exported = registry.snapshot().sync_accounts();

        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].id, usable.id);
        assert_eq!(exported[0].auth_method, "social");
        assert_eq!(exported[0].expires_at, 1_900_000_000_000);
    }

    #[test]
    fn test_export_uses_camel_case() {
        let account = Account::new("a@example.com", Some(credential("token")));
        let json = serde_json::to_value(SyncAccount::from_account(&account).unwrap()).unwrap();

        assert_eq!(json["accessToken"], "token");
        assert_eq!(json["authMethod"], "social");
        assert!(json.get("access_token").is_none());
    }
}

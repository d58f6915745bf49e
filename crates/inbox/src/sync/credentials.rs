//! Access token lookup for polling

/// Supplies the current bearer token for an account
///
/// `None` means the account cannot poll right now (signed out, token not
/// yet loaded); the scheduler skips the cycle instead of failing.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self, account_id: &str) -> Option<String>;
}

/// A fixed token, e.g. a personal access token from the environment
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticToken {
    fn access_token(&self, _account_id: &str) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

impl<F> CredentialProvider for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn access_token(&self, account_id: &str) -> Option<String> {
        self(account_id)
    }
}

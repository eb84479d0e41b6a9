use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::services::secret_store::SecretStore;

/// Bitget API credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl Credentials {
    /// Key and secret are both present. Passphrase may legitimately be empty.
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }

    /// Build from a secret-store document, accepting camelCase and snake_case keys.
    pub fn from_secret_map(map: &HashMap<String, String>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| map.get(*k).filter(|v| !v.is_empty()).cloned())
                .unwrap_or_default()
        };

        Self {
            api_key: pick(&["apiKey", "api_key"]),
            secret_key: pick(&["secretKey", "secret_key"]),
            passphrase: pick(&["passphrase"]),
        }
    }

    /// Fill empty fields from `other`
    fn or(self, other: Credentials) -> Self {
        let choose = |a: String, b: String| if a.is_empty() { b } else { a };
        Self {
            api_key: choose(self.api_key, other.api_key),
            secret_key: choose(self.secret_key, other.secret_key),
            passphrase: choose(self.passphrase, other.passphrase),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("passphrase", &redact(&self.passphrase))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

/// Resolves credentials: environment first, secret store for whatever is missing.
#[derive(Clone)]
pub struct CredentialResolver {
    env: Credentials,
    secret_store: Option<Arc<dyn SecretStore>>,
    secret_name: Option<String>,
}

impl CredentialResolver {
    pub fn new(
        env: Credentials,
        secret_store: Option<Arc<dyn SecretStore>>,
        secret_name: Option<String>,
    ) -> Self {
        Self {
            env,
            secret_store,
            secret_name,
        }
    }

    pub fn fixed(credentials: Credentials) -> Self {
        Self::new(credentials, None, None)
    }

    pub async fn resolve(&self) -> Credentials {
        if self.env.is_complete() {
            return self.env.clone();
        }

        let (Some(store), Some(name)) = (&self.secret_store, &self.secret_name) else {
            return self.env.clone();
        };

        let secret = store.get_secret(name).await;
        if secret.is_empty() {
            tracing::warn!("Secret {} is missing or empty", name);
            return self.env.clone();
        }

        tracing::debug!("Loaded Bitget credentials from secret {}", name);
        self.env.clone().or(Credentials::from_secret_map(&secret))
    }
}

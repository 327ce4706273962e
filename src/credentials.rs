//! Per-provider API key storage.
//!
//! Each provider gets one small text file in the data directory. The file
//! holds the API key on the first line and, optionally, an organization
//! record `name:=key` on the second (OpenAI organization billing). When no
//! file exists the provider's environment variable is consulted instead.

use crate::registry::Provider;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// What a request needs to authenticate against one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAuth {
    pub api_key: String,
    pub organization_key: Option<String>,
}

/// One provider's stored credential. Empty fields mean "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub organization_name: String,
    pub organization_key: String,
    pub use_organization: bool,
}

impl Credential {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn serialize(&self) -> String {
        let mut out = self.api_key.trim().to_string();
        if !self.organization_name.trim().is_empty() || !self.organization_key.trim().is_empty() {
            out.push('\n');
            out.push_str(self.organization_name.trim());
            out.push_str(":=");
            out.push_str(self.organization_key.trim());
        }
        out.push('\n');
        out
    }

    fn parse(raw: &str) -> Self {
        let mut lines = raw.lines();
        let api_key = lines.next().unwrap_or_default().trim().to_string();
        let mut organization_name = String::new();
        let mut organization_key = String::new();
        if let Some(org_line) = lines.next() {
            if let Some((name, key)) = org_line.split_once(":=") {
                organization_name = name.trim().to_string();
                organization_key = key.trim().to_string();
            }
        }
        let use_organization = !organization_key.is_empty();
        Self {
            api_key,
            organization_name,
            organization_key,
            use_organization,
        }
    }
}

fn key_file_name(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "openai.key",
        Provider::OpenRouter => "openrouter.key",
        Provider::MistralAi => "mistral.key",
    }
}

/// File-backed credential store with an in-memory cache. Reads hit the
/// filesystem once per provider; `set`/`clear` write through and refresh
/// the cache.
pub struct CredentialStore {
    dir: PathBuf,
    cache: HashMap<Provider, Credential>,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    fn key_path(&self, provider: Provider) -> PathBuf {
        self.dir.join(key_file_name(provider))
    }

    fn load(&mut self, provider: Provider) -> &Credential {
        if !self.cache.contains_key(&provider) {
            let credential = match fs::read_to_string(self.key_path(provider)) {
                Ok(raw) => Credential::parse(&raw),
                Err(_) => Credential::default(),
            };
            self.cache.insert(provider, credential);
        }
        &self.cache[&provider]
    }

    pub fn get(&mut self, provider: Provider) -> Credential {
        self.load(provider).clone()
    }

    pub fn set(&mut self, provider: Provider, credential: Credential) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.key_path(provider);
        fs::write(&path, credential.serialize())
            .with_context(|| format!("failed to write {}", path.display()))?;
        restrict_permissions(&path);
        self.cache.insert(provider, credential);
        Ok(())
    }

    pub fn clear(&mut self, provider: Provider) -> Result<()> {
        let path = self.key_path(provider);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        self.cache.insert(provider, Credential::default());
        Ok(())
    }

    /// Resolve what a request to `provider` should authenticate with: the
    /// stored key first, the environment variable as fallback. `None` means
    /// submission must be blocked with a corrective message.
    pub fn auth_for(&mut self, provider: Provider) -> Option<ProviderAuth> {
        let credential = self.load(provider);
        if credential.is_configured() {
            let organization_key = (credential.use_organization
                && !credential.organization_key.is_empty())
            .then(|| credential.organization_key.clone());
            return Some(ProviderAuth {
                api_key: credential.api_key.trim().to_string(),
                organization_key,
            });
        }
        let from_env = env::var(provider.env_key_var()).ok()?;
        let from_env = from_env.trim();
        if from_env.is_empty() {
            return None;
        }
        Some(ProviderAuth {
            api_key: from_env.to_string(),
            organization_key: None,
        })
    }

    /// True when at least one provider can authenticate.
    pub fn any_configured(&mut self) -> bool {
        Provider::all()
            .into_iter()
            .any(|provider| self.auth_for(provider).is_some())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_key_with_organization_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = CredentialStore::new(dir.path());

        let credential = Credential {
            api_key: "sk-test".into(),
            organization_name: "acme".into(),
            organization_key: "org-123".into(),
            use_organization: true,
        };
        store.set(Provider::OpenAi, credential.clone()).expect("set");

        let mut fresh = CredentialStore::new(dir.path());
        assert_eq!(fresh.get(Provider::OpenAi), credential);

        let auth = fresh.auth_for(Provider::OpenAi).expect("auth");
        assert_eq!(auth.api_key, "sk-test");
        assert_eq!(auth.organization_key.as_deref(), Some("org-123"));
    }

    #[test]
    fn key_without_organization_parses_clean() {
        let credential = Credential::parse("sk-solo\n");
        assert_eq!(credential.api_key, "sk-solo");
        assert!(!credential.use_organization);
        assert!(credential.organization_key.is_empty());
    }

    #[test]
    fn clear_removes_file_and_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = CredentialStore::new(dir.path());
        store
            .set(
                Provider::MistralAi,
                Credential {
                    api_key: "mk-1".into(),
                    ..Default::default()
                },
            )
            .expect("set");
        assert!(store.get(Provider::MistralAi).is_configured());

        store.clear(Provider::MistralAi).expect("clear");
        assert!(!store.get(Provider::MistralAi).is_configured());
        assert!(!dir.path().join("mistral.key").exists());
    }

    #[test]
    fn missing_key_yields_no_auth() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = CredentialStore::new(dir.path());
        // OpenRouter has no key file here and the test environment does not
        // set OPENROUTER_API_KEY.
        std::env::remove_var(Provider::OpenRouter.env_key_var());
        assert!(store.auth_for(Provider::OpenRouter).is_none());
    }
}

//! Credential loading from the runtime `.env` file or the process environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::config::config_dir;

/// `.env` key holding the OAuth client id.
pub const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
/// `.env` key holding the OAuth client secret (optional for desktop clients).
pub const GOOGLE_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
/// `.env` key holding a long-lived refresh token that skips browser consent.
pub const GOOGLE_REFRESH_TOKEN: &str = "GOOGLE_REFRESH_TOKEN";
/// `.env` key holding the hosted model API key.
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

const KNOWN_KEYS: &[&str] = &[
    GOOGLE_CLIENT_ID,
    GOOGLE_CLIENT_SECRET,
    GOOGLE_REFRESH_TOKEN,
    GEMINI_API_KEY,
];

/// Runtime credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Collect the known keys from an env resolver.
    pub fn from_env_with(env: impl Fn(&str) -> Option<String>) -> Self {
        let vars = KNOWN_KEYS
            .iter()
            .filter_map(|key| env(key).map(|value| ((*key).to_owned(), value)))
            .collect();
        Self { vars }
    }

    /// Returns a non-blank credential value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Returns a required credential or an error when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is absent or blank.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.get(key)
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }

    /// The OAuth client registration.
    ///
    /// # Errors
    ///
    /// Returns an error when `GOOGLE_CLIENT_ID` is missing.
    pub fn google_client(&self) -> anyhow::Result<GoogleClientCredentials> {
        Ok(GoogleClientCredentials {
            client_id: self.require(GOOGLE_CLIENT_ID)?,
            client_secret: self.get(GOOGLE_CLIENT_SECRET).map(str::to_owned),
        })
    }
}

/// OAuth client registration for the installed-app flow.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleClientCredentials {
    /// Public client identifier.
    pub client_id: String,
    /// Client secret; desktop clients may omit it.
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for GoogleClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Load credentials from a specific `.env` path.
///
/// # Errors
///
/// Returns an error if the file does not exist, permissions are too broad,
/// or parsing fails.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "credentials file does not exist: {}",
            path.display()
        ));
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials { vars })
}

/// Load credentials from `~/.deskmate/.env`, falling back to the process
/// environment when that file does not exist.
///
/// # Errors
///
/// Returns an error when the file exists but is invalid.
pub fn load_default_credentials() -> anyhow::Result<Credentials> {
    let path = config_dir()?.join(".env");
    if path.exists() {
        return load_credentials(&path);
    }
    debug!(path = %path.display(), "no credentials file, reading process environment");
    Ok(Credentials::from_env_with(|key| std::env::var(key).ok()))
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

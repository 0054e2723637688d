use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use config::{Config, Environment, File};

use secrecy::Secret;

use serde::Deserialize;
use serde_aux::prelude::*;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use url::Url;

use crate::domain::ListId;
use crate::mapping::FieldMapEntry;

/// Runtime environment, either `Dev` for local development, or `Prod` for release
#[derive(Debug)]
pub enum Runtime {
    Dev,
    Prod,
}

impl Runtime {
    pub fn as_str(&self) -> &str {
        match self {
            Runtime::Dev => "dev",
            Runtime::Prod => "prod",
        }
    }
}

impl TryFrom<String> for Runtime {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => anyhow::bail!("{} is not a valid runtime environment", other),
        }
    }
}

/// Application settings wrapper
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: ApplicationSettings,
    pub database: DatabaseSettings,
    pub mailchimp: MailchimpSettings,
    pub admin: AdminSettings,
    /// Locally configured lists, keyed by a settings-friendly name
    #[serde(default)]
    pub lists: BTreeMap<String, ListSettings>,
}

impl Settings {
    /// Load application settings from the settings directory
    pub fn load() -> anyhow::Result<Self> {
        // Get the path to the settings directory
        let path = env::current_dir()?.join("settings");
        // Get the current environment based on the `APP_ENV` environment variable, default to `Dev`
        let runtime: Runtime = env::var("APP_ENV")
            .unwrap_or_else(|_| "dev".into())
            .try_into()?;

        Self::load_from(runtime, &path)
    }
    /// Load application settings from a specified path and runtime
    pub fn load_from(runtime: Runtime, base_path: &Path) -> anyhow::Result<Self> {
        Config::builder()
            .add_source(File::from(base_path.join("base")).required(true))
            .add_source(File::from(base_path.join(runtime.as_str())).required(true))
            // NOTE: Should be used for any prod secrets. Takes the form `APP_<settings category>__<setting name>`.
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
            .context("Failed to load/deserialize settings")
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    port: u16,
}

impl ApplicationSettings {
    /// The application address to bind to
    pub fn addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    port: u16,
    host: String,
    name: String,
    username: String,
    password: Secret<String>,
    require_ssl: bool,
}

impl DatabaseSettings {
    /// The database connection options, without specifying the database name
    pub fn without_db(&self) -> PgConnectOptions {
        use secrecy::ExposeSecret;

        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .port(self.port)
            .host(&self.host)
            .ssl_mode(ssl_mode)
            .username(&self.username)
            .password(self.password.expose_secret())
    }
    /// The database connection options, with the database name
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct MailchimpSettings {
    api_key: Secret<String>,
    /// Overrides the data-center URL derived from the API key
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    api_timeout_milliseconds: u64,
}

impl MailchimpSettings {
    pub fn new(
        api_key: Secret<String>,
        api_base_url: Option<String>,
        api_timeout_milliseconds: u64,
    ) -> Self {
        Self {
            api_key,
            api_base_url,
            api_timeout_milliseconds,
        }
    }
    /// The API timeout duration
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_milliseconds)
    }
    /// The API key to include in every request
    pub fn api_key(&self) -> Secret<String> {
        self.api_key.clone()
    }
    /// The API base URL, either configured or derived from the data center
    /// suffix of the key (`<key>-us1` talks to `us1`)
    pub fn api_base_url(&self) -> anyhow::Result<Url> {
        use secrecy::ExposeSecret;

        let raw = match &self.api_base_url {
            Some(url) => url.clone(),
            None => {
                let (_, dc) = self
                    .api_key
                    .expose_secret()
                    .rsplit_once('-')
                    .context("API key has no data center suffix")?;
                anyhow::ensure!(
                    !dc.is_empty() && dc.chars().all(|c| c.is_ascii_alphanumeric()),
                    "API key has an invalid data center suffix"
                );
                format!("https://{}.api.mailchimp.com/2.0/", dc)
            }
        };
        // Relative joins drop the last segment unless the path ends with a slash
        let raw = if raw.ends_with('/') {
            raw
        } else {
            format!("{}/", raw)
        };

        Url::parse(&raw).context("Failed to parse API base URL")
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminSettings {
    username: String,
    password_hash: Secret<String>,
}

impl AdminSettings {
    pub fn new(username: String, password_hash: Secret<String>) -> Self {
        Self {
            username,
            password_hash,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
    /// The PHC-formatted argon2 hash of the administrator password
    pub fn password_hash(&self) -> Secret<String> {
        self.password_hash.clone()
    }
}

/// A list configured on the host side
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSettings {
    /// Remote list id, defaults to the settings key
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Shared secret expected on webhook callbacks for this list
    #[serde(default)]
    pub webhook_secret: Option<Secret<String>>,
    /// Merge tag to extraction rule
    #[serde(default)]
    pub field_map: BTreeMap<String, FieldMapEntry>,
}

impl ListSettings {
    /// The remote list id, falling back to the settings key
    pub fn list_id(&self, key: &str) -> ListId {
        ListId::new(self.id.as_deref().unwrap_or(key))
    }
}

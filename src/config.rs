use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Runtime settings, layered from an optional `backoffice.{toml,yaml,json}`
/// file and `BACKOFFICE_*` environment variables (nested keys use `__`,
/// e.g. `BACKOFFICE_IDENTITY__PROJECT_ID`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// MongoDB connection string. When absent, in-memory stores are used.
    #[serde(default)]
    pub mongodb_uri: Option<String>,
    #[serde(default = "default_database")]
    pub mongodb_database: String,
    /// Object storage bucket. When absent, media is kept in memory.
    #[serde(default)]
    pub s3_bucket: Option<String>,
    /// Custom S3 endpoint for MinIO / LocalStack.
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    /// Use the built-in demo identity provider and seed demo data.
    #[serde(default)]
    pub demo_mode: bool,
    /// Set the `Secure` attribute on the session cookie.
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    /// HMAC secret for demo tokens. Generated at start-up when absent.
    #[serde(default)]
    pub demo_secret: Option<String>,
    #[serde(default)]
    pub identity: Option<IdentitySettings>,
}

/// Identity platform project credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    pub project_id: String,
    /// Web API key used for password sign-in.
    pub api_key: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_database() -> String {
    "backoffice".to_string()
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load settings from `backoffice.*` in the working directory (optional)
    /// and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(
            config::Config::builder()
                .add_source(File::with_name("backoffice").required(false))
                .add_source(
                    Environment::with_prefix("BACKOFFICE")
                        .prefix_separator("_")
                        .separator("__"),
                ),
        )
    }

    pub fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Reject combinations the server cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.demo_mode && self.identity.is_none() {
            anyhow::bail!(
                "identity.project_id and identity.api_key are required unless demo_mode is enabled"
            );
        }
        if let Some(identity) = &self.identity {
            if identity.project_id.trim().is_empty() {
                anyhow::bail!("identity.project_id cannot be empty");
            }
        }
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("bind_addr '{}' is not a socket address", self.bind_addr);
        }
        Ok(())
    }
}

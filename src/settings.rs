use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

use crate::errors::LocalError;
use crate::reconcile::ReconcileRule;

pub const ENV_PREFIX: &str = "RECONCILER";

#[derive(Debug, Clone, serde_derive::Deserialize)]
pub struct Settings {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub web: WebSettings,
    pub rozetka: RozetkaSettings,
    #[serde(default)]
    pub brain: Option<BrainSettings>,
    #[serde(default)]
    pub rules: Vec<ReconcileRule>,
}

#[derive(Debug, Clone, serde_derive::Deserialize)]
pub struct WebSettings {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for WebSettings {
    fn default() -> Self {
        WebSettings {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, serde_derive::Deserialize)]
pub struct RozetkaSettings {
    #[serde(default = "default_rozetka_url")]
    pub base_url: Url,
    pub username: String,
    pub password: String,
    /// Pause between two page fetches.
    #[serde(default = "default_page_delay", deserialize_with = "human_duration")]
    pub page_delay: Duration,
    /// Pause between two status writes.
    #[serde(default = "default_write_delay", deserialize_with = "human_duration")]
    pub write_delay: Duration,
    #[serde(default = "default_timeout", deserialize_with = "human_duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, serde_derive::Deserialize)]
pub struct BrainSettings {
    #[serde(default = "default_brain_url")]
    pub base_url: Url,
    pub login: String,
    pub password: String,
    #[serde(default = "default_timeout", deserialize_with = "human_duration")]
    pub timeout: Duration,
}

impl Settings {
    /// Reads `path` (any extension `config` understands, missing file is
    /// fine) and then `RECONCILER_*` environment variables on top of it.
    pub fn load(path: &str) -> Result<Self, LocalError> {
        let mut conf = Config::default();
        conf.merge(File::with_name(path).required(false))?
            .merge(Environment::with_prefix(ENV_PREFIX).separator("__"))?;
        Ok(conf.try_into()?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, LocalError> {
        let mut conf = Config::default();
        conf.merge(File::from_str(text, FileFormat::Yaml))?;
        Ok(conf.try_into()?)
    }
}

/// Accepts `"500ms"`, `"30s"`, `"15m"` and the like.
pub fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(raw.trim()).map_err(serde::de::Error::custom)
}

fn default_db_path() -> String {
    "db".to_string()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_rozetka_url() -> Url {
    Url::parse("https://api-seller.rozetka.com.ua/").expect("static url")
}

fn default_brain_url() -> Url {
    Url::parse("http://api.brain.com.ua/").expect("static url")
}

fn default_page_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_write_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::errors::{decode, LocalError};
use crate::session::{Session, SessionSource};
use crate::settings::BrainSettings;
use crate::store::Store;

pub const SERVICE: &str = "brain";

const SID_EXPIRED: &str = "Session identifier is outdated or wrong";

/// Every Brain reply: `status` 1 with a `result`, or 0 with an error.
#[derive(Debug, serde_derive::Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct Reply<T> {
    status: i64,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error_message: Option<String>,
}

impl<T> Reply<T> {
    fn into_result(self, endpoint: &str) -> Result<T, LocalError> {
        match (self.status, self.result) {
            (1, Some(result)) => Ok(result),
            (1, None) => Err(LocalError::api(endpoint, "reply has no result")),
            _ => Err(LocalError::api(
                endpoint,
                self.error_message.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct BrainCategory {
    #[serde(rename = "categoryID")]
    pub id: i64,
    #[serde(rename = "parentID", default)]
    pub parent_id: i64,
    pub name: String,
}

pub struct BrainLogin {
    http: reqwest::Client,
    base_url: Url,
    login: String,
    password_md5: String,
}

#[async_trait]
impl SessionSource for BrainLogin {
    fn service(&self) -> &'static str {
        SERVICE
    }

    async fn login(&self) -> Result<String, LocalError> {
        let endpoint = "auth";
        let reply = self
            .http
            .post([self.base_url.as_str().trim_end_matches('/'), "/", endpoint].concat())
            .form(&[("login", &self.login), ("password", &self.password_md5)])
            .send()
            .await?
            .text()
            .await?;
        let reply: Reply<String> = decode(endpoint, &reply)?;
        reply.into_result(endpoint).map_err(|e| LocalError::Login {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

/// Brain.com.ua supplier API. Calls carry the session id as the last path
/// segment.
pub struct BrainApi {
    http: reqwest::Client,
    base_url: Url,
    session: Session<BrainLogin>,
}

impl BrainApi {
    pub fn new(settings: &BrainSettings, store: Store) -> Result<Self, LocalError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        let login = BrainLogin {
            http: http.clone(),
            base_url: settings.base_url.clone(),
            login: settings.login.clone(),
            password_md5: format!("{:x}", Md5::digest(settings.password.as_bytes())),
        };
        Ok(BrainApi {
            http,
            base_url: settings.base_url.clone(),
            session: Session::new(login, store),
        })
    }

    pub async fn get<T: DeserializeOwned>(&mut self, endpoint: &str) -> Result<T, LocalError> {
        for attempt in 1..=2 {
            let sid = self.session.token().await?;
            let url = [
                self.base_url.as_str().trim_end_matches('/'),
                "/",
                endpoint.trim_matches('/'),
                "/",
                &sid,
            ]
            .concat();
            let reply = self.http.get(url).send().await?.text().await?;

            if reply.contains(SID_EXPIRED) {
                log::warn!("{SERVICE} - {endpoint}: session id expired");
                if attempt == 1 {
                    self.session.refresh().await?;
                    continue;
                }
                break;
            }
            let reply: Reply<T> = decode(endpoint, &reply)?;
            return reply.into_result(endpoint);
        }
        Err(LocalError::TokenRejected { service: SERVICE })
    }

    pub async fn categories(&mut self) -> Result<Vec<BrainCategory>, LocalError> {
        self.get("categories").await
    }

    /// Raw product card; the shape differs between categories.
    pub async fn product(&mut self, product_id: i64) -> Result<Value, LocalError> {
        self.get(&format!("product/{product_id}")).await
    }
}

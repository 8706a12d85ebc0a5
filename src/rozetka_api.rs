use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use crate::errors::{decode, LocalError};
use crate::models::{orders_from_page, Order, OrderStatus};
use crate::pace::Pacer;
use crate::reconcile::OrderSource;
use crate::session::{Session, SessionSource};
use crate::settings::RozetkaSettings;
use crate::store::Store;

pub const SERVICE: &str = "rozetka";

/// Substring Rozetka puts in the reply once the bearer token has expired.
const BAD_TOKEN: &str = "incorrect_access_token";

#[derive(Debug, serde_derive::Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    content: Option<T>,
    #[serde(default)]
    errors: Option<Value>,
}

impl<T> Envelope<T> {
    fn into_content(self, endpoint: &str) -> Result<Option<T>, LocalError> {
        if self.success {
            Ok(self.content)
        } else {
            Err(LocalError::api(endpoint, error_message(self.errors.as_ref())))
        }
    }
}

fn error_message(errors: Option<&Value>) -> String {
    let first = match errors {
        Some(Value::Array(list)) => list.first(),
        other => other,
    };
    match first {
        Some(Value::Object(map)) => {
            let message = map.get("message").and_then(Value::as_str).unwrap_or("unknown error");
            match map.get("description").and_then(Value::as_str) {
                Some(description) => format!("{message} ({description})"),
                None => message.to_string(),
            }
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    }
}

#[derive(Debug, serde_derive::Deserialize)]
struct LoginContent {
    access_token: String,
}

#[derive(Debug, serde_derive::Deserialize)]
struct SearchContent {
    #[serde(default)]
    orders: Vec<Value>,
    #[serde(rename = "_meta")]
    meta: PageMeta,
}

#[derive(Debug, serde_derive::Deserialize)]
struct PageMeta {
    #[serde(rename = "pageCount", default)]
    page_count: u32,
    #[serde(rename = "totalCount", default)]
    total_count: u32,
}

fn endpoint_url(base_url: &Url, endpoint: &str) -> String {
    [
        base_url.as_str().trim_end_matches('/'),
        "/",
        endpoint.trim_start_matches('/'),
    ]
    .concat()
}

pub struct RozetkaLogin {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

#[async_trait]
impl SessionSource for RozetkaLogin {
    fn service(&self) -> &'static str {
        SERVICE
    }

    async fn login(&self) -> Result<String, LocalError> {
        let endpoint = "sites";
        let body = json!({
            "username": self.username,
            "password": STANDARD.encode(&self.password),
        });
        let reply = self
            .http
            .post(endpoint_url(&self.base_url, endpoint))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?
            .text()
            .await?;

        let envelope: Envelope<LoginContent> = decode(endpoint, &reply)?;
        match envelope.into_content(endpoint) {
            Ok(Some(content)) => Ok(content.access_token),
            Ok(None) => Err(LocalError::Login {
                service: SERVICE,
                message: "reply has no access token".to_string(),
            }),
            Err(e) => Err(LocalError::Login {
                service: SERVICE,
                message: e.to_string(),
            }),
        }
    }
}

/// Rozetka seller API client. One instance lives for one scheduled run.
pub struct RozetkaApi {
    http: reqwest::Client,
    base_url: Url,
    session: Session<RozetkaLogin>,
    page_delay: Duration,
}

impl RozetkaApi {
    pub fn new(settings: &RozetkaSettings, store: Store) -> Result<Self, LocalError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        let login = RozetkaLogin {
            http: http.clone(),
            base_url: settings.base_url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        };
        Ok(RozetkaApi {
            http,
            base_url: settings.base_url.clone(),
            session: Session::new(login, store),
            page_delay: settings.page_delay,
        })
    }

    /// Sends one authorized call. If Rozetka says the token is no good, the
    /// token is refreshed and the call is repeated once.
    async fn call<T: DeserializeOwned>(
        &mut self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<T>, LocalError> {
        let url = endpoint_url(&self.base_url, endpoint);
        for attempt in 1..=2 {
            let token = self.session.token().await?;
            let mut request = self
                .http
                .request(method.clone(), url.as_str())
                .query(query)
                .header("Authorization", ["Bearer ", &token].concat());
            if let Some(body) = body {
                request = request.json(body);
            }
            let res = request.send().await?;
            let status = res.status();
            let reply = res.text().await?;

            if reply.contains(BAD_TOKEN) {
                log::warn!("{SERVICE} - {endpoint}: access token rejected");
                if attempt == 1 {
                    self.session.refresh().await?;
                    continue;
                }
                break;
            }

            let envelope: Envelope<T> = match decode(endpoint, &reply) {
                Ok(envelope) => envelope,
                Err(_) if !status.is_success() => {
                    return Err(LocalError::api(endpoint, format!("HTTP {status}")))
                }
                Err(e) => return Err(e),
            };
            return envelope.into_content(endpoint);
        }
        Err(LocalError::TokenRejected { service: SERVICE })
    }

    /// All orders currently in any of `statuses`, walking every result page.
    /// An order listed twice is kept once.
    pub async fn search_orders(&mut self, statuses: &[OrderStatus]) -> Result<Vec<Order>, LocalError> {
        let endpoint = "orders/search";
        let mut orders = Vec::new();
        let mut seen = HashSet::new();
        let mut pacer = Pacer::new(self.page_delay);

        for status in statuses {
            let mut page: u32 = 1;
            loop {
                pacer.wait().await;

                let query = [("status", status.code().to_string()), ("page", page.to_string())];
                let content: SearchContent = self
                    .call(Method::GET, endpoint, &query, None)
                    .await?
                    .ok_or_else(|| LocalError::api(endpoint, "reply has no content"))?;

                let received = content.orders.len();
                log::debug!(
                    "{SERVICE} - status {status} page {page}/{} ({received} of {} orders)",
                    content.meta.page_count,
                    content.meta.total_count
                );
                orders.extend(
                    orders_from_page(content.orders)
                        .into_iter()
                        .filter(|o| seen.insert(o.id)),
                );

                if received == 0 || page >= content.meta.page_count {
                    break;
                }
                page += 1;
            }
        }
        Ok(orders)
    }

    pub async fn set_status(&mut self, order_id: i64, status: OrderStatus) -> Result<(), LocalError> {
        let endpoint = format!("orders/{order_id}");
        let body = json!({ "status": status.code() });
        self.call::<Value>(Method::PUT, &endpoint, &[], Some(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderSource for RozetkaApi {
    async fn fetch_orders(&mut self, statuses: &[OrderStatus]) -> Result<Vec<Order>, LocalError> {
        self.search_orders(statuses).await
    }

    async fn change_status(&mut self, order_id: i64, status: OrderStatus) -> Result<(), LocalError> {
        self.set_status(order_id, status).await
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::dates;
use crate::errors::LocalError;

/// Order lifecycle stage as Rozetka numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde_derive::Serialize, serde_derive::Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum OrderStatus {
    New,
    Confirmed,
    HandedToCarrier,
    InTransit,
    AwaitingPickup,
    Received,
    NotProcessed,
    NotReceived,
    CanceledBySeller,
    CanceledByBuyer,
}

impl OrderStatus {
    pub fn code(self) -> i64 {
        match self {
            OrderStatus::New => 1,
            OrderStatus::Confirmed => 2,
            OrderStatus::HandedToCarrier => 3,
            OrderStatus::InTransit => 4,
            OrderStatus::AwaitingPickup => 5,
            OrderStatus::Received => 6,
            OrderStatus::NotProcessed => 7,
            OrderStatus::NotReceived => 11,
            OrderStatus::CanceledBySeller => 12,
            OrderStatus::CanceledByBuyer => 13,
        }
    }
}

impl TryFrom<i64> for OrderStatus {
    type Error = LocalError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => OrderStatus::New,
            2 => OrderStatus::Confirmed,
            3 => OrderStatus::HandedToCarrier,
            4 => OrderStatus::InTransit,
            5 => OrderStatus::AwaitingPickup,
            6 => OrderStatus::Received,
            7 => OrderStatus::NotProcessed,
            11 => OrderStatus::NotReceived,
            12 => OrderStatus::CanceledBySeller,
            13 => OrderStatus::CanceledByBuyer,
            other => return Err(LocalError::UnknownStatus(other)),
        })
    }
}

impl From<OrderStatus> for i64 {
    fn from(status: OrderStatus) -> i64 {
        status.code()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[derive(Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct Order {
    pub id: i64,
    pub status: OrderStatus,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

const ORDER_ALIASES: &[(&str, &[&str])] = &[
    ("created", &["created_at", "createdAt", "date"]),
    ("recipient_phone", &["user_phone", "phone"]),
    ("purchases", &["items", "line_items"]),
];

const DELIVERY_ALIASES: &[(&str, &[&str])] = &[
    ("city", &["city_name"]),
    ("carrier", &["delivery_service_name"]),
];

const PURCHASE_ALIASES: &[(&str, &[&str])] = &[("name", &["item_name", "title"])];

const CITY_ALIASES: &[(&str, &[&str])] = &[("name", &["name_ua", "title"])];

/// Moves the first alias present onto the canonical key when the canonical
/// key itself is missing. Other aliases are left alone and ignored later.
fn fold_aliases(value: &mut Value, table: &[(&str, &[&str])]) {
    let map = match value {
        Value::Object(map) => map,
        _ => return,
    };
    for (canonical, aliases) in table {
        if map.contains_key(*canonical) {
            continue;
        }
        if let Some(v) = aliases.iter().find_map(|a| map.remove(*a)) {
            map.insert(canonical.to_string(), v);
        }
    }
}

impl Order {
    /// Decodes one raw record, tolerating the field names the different
    /// feeds use.
    pub fn from_value(mut value: Value) -> Result<Self, serde_json::Error> {
        fold_aliases(&mut value, ORDER_ALIASES);
        if let Some(delivery) = value.get_mut("delivery") {
            fold_aliases(delivery, DELIVERY_ALIASES);
            if let Some(city) = delivery.get_mut("city") {
                fold_aliases(city, CITY_ALIASES);
            }
        }
        if let Some(Value::Array(purchases)) = value.get_mut("purchases") {
            purchases
                .iter_mut()
                .for_each(|p| fold_aliases(p, PURCHASE_ALIASES));
        }
        serde_json::from_value(value)
    }

    /// Creation time, if the raw value is a date at all.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.as_deref().and_then(dates::normalize)
    }
}

#[derive(Default, Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub city: Option<City>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub place_street: Option<String>,
    #[serde(default)]
    pub place_house: Option<String>,
    #[serde(default)]
    pub place_number: Option<String>,
}

impl Delivery {
    pub fn address(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.place_street, &self.place_house, &self.place_number]
            .iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Rozetka sends the city as an object, older feeds as a bare string.
#[derive(Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
#[serde(untagged)]
pub enum City {
    Name(String),
    Object {
        #[serde(default)]
        name: Option<String>,
    },
}

impl City {
    pub fn name(&self) -> Option<&str> {
        match self {
            City::Name(n) => Some(n),
            City::Object { name } => name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct Purchase {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "one")]
    pub quantity: i64,
    #[serde(default)]
    pub price: Option<Value>,
}

fn one() -> i64 {
    1
}

/// Decodes a page of orders one record at a time so a single odd record
/// doesn't cost the rest of the page.
pub fn orders_from_page(raw: Vec<Value>) -> Vec<Order> {
    raw.into_iter()
        .filter_map(|value| {
            let id = value.get("id").cloned().unwrap_or(Value::Null);
            match Order::from_value(value) {
                Ok(order) => Some(order),
                Err(e) => {
                    log::warn!("Skipping order {id}: {e}");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, serde_derive::Serialize, serde_derive::Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub obtained_at: DateTime<Utc>,
}

impl Tokens {
    pub fn new(access_token: String) -> Self {
        Tokens {
            access_token,
            obtained_at: Utc::now(),
        }
    }
}

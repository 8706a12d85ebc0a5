use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::age_filter;
use crate::dates::to_iso;
use crate::errors::LocalError;
use crate::models::{Order, OrderStatus};
use crate::pace::Pacer;
use crate::settings::human_duration;

/// A marketplace we can read orders from and push statuses to.
#[async_trait]
pub trait OrderSource: Send {
    async fn fetch_orders(&mut self, statuses: &[OrderStatus]) -> Result<Vec<Order>, LocalError>;

    async fn change_status(&mut self, order_id: i64, status: OrderStatus) -> Result<(), LocalError>;
}

#[derive(Debug, Clone, serde_derive::Deserialize)]
pub struct ReconcileRule {
    pub name: String,
    pub statuses: Vec<OrderStatus>,
    pub older_than_days: i64,
    pub target_status: OrderStatus,
    #[serde(deserialize_with = "human_duration")]
    pub every: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, serde_derive::Serialize)]
pub struct ReconcileReport {
    pub rule: String,
    pub fetched: usize,
    pub old: usize,
    pub undated: usize,
    pub changed: Vec<i64>,
    pub failed: Vec<FailedChange>,
}

#[derive(Debug, Clone, PartialEq, serde_derive::Serialize)]
pub struct FailedChange {
    pub order_id: i64,
    pub message: String,
}

/// Moves every order matching `rule` that is older than the rule allows to
/// the rule's target status.
///
/// A fetch failure fails the run. A failed write is logged and reported, and
/// the loop goes on with the next order.
pub async fn run<S: OrderSource + ?Sized>(
    source: &mut S,
    rule: &ReconcileRule,
    now: DateTime<Utc>,
    write_delay: Duration,
) -> Result<ReconcileReport, LocalError> {
    if rule.older_than_days < 0 {
        return Err(LocalError::InvalidRule(format!(
            "{} has a negative age threshold ({} days)",
            rule.name, rule.older_than_days
        )));
    }
    let threshold = chrono::Duration::try_days(rule.older_than_days)
        .filter(|t| now.checked_sub_signed(*t).is_some())
        .ok_or_else(|| {
            LocalError::InvalidRule(format!(
                "{} age threshold of {} days is out of range",
                rule.name, rule.older_than_days
            ))
        })?;

    let orders = source.fetch_orders(&rule.statuses).await?;
    let old: Vec<&Order> = age_filter::older_than(&orders, threshold, now)
        .into_iter()
        .filter(|o| o.status != rule.target_status)
        .collect();

    let mut report = ReconcileReport {
        rule: rule.name.clone(),
        fetched: orders.len(),
        old: old.len(),
        undated: age_filter::undated(&orders),
        ..Default::default()
    };

    let mut pacer = Pacer::new(write_delay);
    for order in &old {
        pacer.wait().await;
        match source.change_status(order.id, rule.target_status).await {
            Ok(()) => {
                log::info!(
                    "{} - order {} from {} ({}) {} -> {}",
                    rule.name,
                    order.id,
                    order.created_at().map(to_iso).unwrap_or_default(),
                    destination(order),
                    order.status,
                    rule.target_status
                );
                report.changed.push(order.id);
            }
            Err(e) => {
                log::error!("{} - order {} status change failed: {}", rule.name, order.id, e);
                report.failed.push(FailedChange {
                    order_id: order.id,
                    message: e.to_string(),
                });
            }
        }
    }

    log::info!(
        "{} - fetched {}, old {}, changed {}, failed {}, undated {}",
        report.rule,
        report.fetched,
        report.old,
        report.changed.len(),
        report.failed.len(),
        report.undated
    );
    Ok(report)
}

fn destination(order: &Order) -> String {
    let delivery = match &order.delivery {
        Some(d) => d,
        None => return "no delivery".to_string(),
    };
    let city = delivery
        .city
        .as_ref()
        .and_then(|c| c.name())
        .unwrap_or("unknown city");
    match delivery.address() {
        Some(address) => format!("{city}, {address}"),
        None => city.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    struct FakeShop {
        orders: Vec<Order>,
        broken: HashSet<i64>,
        fetch_fails: bool,
        asked_for: Vec<OrderStatus>,
        attempted: Vec<i64>,
    }

    impl FakeShop {
        fn new(orders: Vec<Order>) -> Self {
            FakeShop {
                orders,
                broken: HashSet::new(),
                fetch_fails: false,
                asked_for: vec![],
                attempted: vec![],
            }
        }
    }

    #[async_trait]
    impl OrderSource for FakeShop {
        async fn fetch_orders(&mut self, statuses: &[OrderStatus]) -> Result<Vec<Order>, LocalError> {
            self.asked_for.extend_from_slice(statuses);
            if self.fetch_fails {
                return Err(LocalError::api("/orders/search", "maintenance"));
            }
            Ok(self.orders.clone())
        }

        async fn change_status(&mut self, order_id: i64, _status: OrderStatus) -> Result<(), LocalError> {
            self.attempted.push(order_id);
            if self.broken.contains(&order_id) {
                Err(LocalError::api(format!("/orders/{order_id}"), "order is locked"))
            } else {
                Ok(())
            }
        }
    }

    fn order(id: i64, status: OrderStatus, created: &str) -> Order {
        Order {
            id,
            status,
            created: Some(created.to_string()),
            recipient_phone: None,
            delivery: None,
            purchases: vec![],
        }
    }

    fn rule() -> ReconcileRule {
        ReconcileRule {
            name: "stale_in_transit".to_string(),
            statuses: vec![OrderStatus::HandedToCarrier, OrderStatus::InTransit],
            older_than_days: 14,
            target_status: OrderStatus::Received,
            every: Duration::from_secs(1800),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn one_failed_write_does_not_stop_the_batch() {
        let mut shop = FakeShop::new(vec![
            order(1, OrderStatus::InTransit, "2024-06-01 10:00:00"),
            order(2, OrderStatus::InTransit, "02.06.2024"),
            order(3, OrderStatus::HandedToCarrier, "2024-06-03T10:00:00Z"),
        ]);
        shop.broken.insert(2);

        let report = run(&mut shop, &rule(), now(), Duration::ZERO).await.unwrap();

        assert_eq!(shop.attempted, vec![1, 2, 3]);
        assert_eq!(report.changed, vec![1, 3]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].order_id, 2);
        assert!(report.failed[0].message.contains("order is locked"));
    }

    #[tokio::test]
    async fn young_undated_and_settled_orders_are_left_alone() {
        let mut shop = FakeShop::new(vec![
            order(1, OrderStatus::InTransit, "2024-06-29 10:00:00"),
            order(2, OrderStatus::InTransit, "someday"),
            order(3, OrderStatus::Received, "2024-01-01"),
            order(4, OrderStatus::InTransit, "2024-01-01"),
        ]);

        let report = run(&mut shop, &rule(), now(), Duration::ZERO).await.unwrap();

        assert_eq!(shop.asked_for, rule().statuses);
        assert_eq!(report.fetched, 4);
        assert_eq!(report.undated, 1);
        assert_eq!(report.old, 1);
        assert_eq!(report.changed, vec![4]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_run() {
        let mut shop = FakeShop::new(vec![order(1, OrderStatus::InTransit, "2024-01-01")]);
        shop.fetch_fails = true;

        let err = run(&mut shop, &rule(), now(), Duration::ZERO).await.unwrap_err();

        assert!(matches!(err, LocalError::Api { .. }));
        assert!(shop.attempted.is_empty());
    }

    #[tokio::test]
    async fn negative_age_threshold_is_refused() {
        let mut shop = FakeShop::new(vec![order(1, OrderStatus::InTransit, "2024-06-30 08:59:00")]);
        let mut rule = rule();
        rule.older_than_days = -14;

        let err = run(&mut shop, &rule, now(), Duration::ZERO).await.unwrap_err();

        assert!(matches!(err, LocalError::InvalidRule(_)));
        assert!(shop.asked_for.is_empty());
        assert!(shop.attempted.is_empty());
    }

    #[tokio::test]
    async fn huge_age_threshold_is_an_error_not_a_panic() {
        let mut shop = FakeShop::new(vec![order(1, OrderStatus::InTransit, "2024-01-01")]);
        for days in [i64::MAX, 1_000_000_000] {
            let mut rule = rule();
            rule.older_than_days = days;

            let err = run(&mut shop, &rule, now(), Duration::ZERO).await.unwrap_err();

            assert!(matches!(err, LocalError::InvalidRule(_)), "{days}: {err}");
        }
        assert!(shop.attempted.is_empty());
    }

    #[tokio::test]
    async fn zero_age_threshold_takes_everything_already_created() {
        let mut shop = FakeShop::new(vec![
            order(1, OrderStatus::InTransit, "2024-06-30 08:59:00"),
            order(2, OrderStatus::InTransit, "2024-06-30 09:00:00"),
        ]);
        let mut rule = rule();
        rule.older_than_days = 0;

        let report = run(&mut shop, &rule, now(), Duration::ZERO).await.unwrap();

        assert_eq!(report.changed, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_are_spaced_out() {
        let mut shop = FakeShop::new(vec![
            order(1, OrderStatus::InTransit, "2024-01-01"),
            order(2, OrderStatus::InTransit, "2024-01-02"),
            order(3, OrderStatus::InTransit, "2024-01-03"),
        ]);
        let started = tokio::time::Instant::now();

        run(&mut shop, &rule(), now(), Duration::from_millis(500))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(shop.attempted, vec![1, 2, 3]);
    }
}

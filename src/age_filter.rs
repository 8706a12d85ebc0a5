use chrono::{DateTime, Duration, Utc};

use crate::models::Order;

/// Orders created strictly before `now - threshold`.
///
/// An order whose creation date is missing or can't be read is never treated
/// as old; it is logged and left out.
pub fn older_than<'a>(orders: &'a [Order], threshold: Duration, now: DateTime<Utc>) -> Vec<&'a Order> {
    let cutoff = now - threshold;
    orders
        .iter()
        .filter(|order| match order.created_at() {
            Some(created) => created < cutoff,
            None => {
                log::warn!(
                    "Order {} has an unreadable creation date {:?}, skipping",
                    order.id,
                    order.created
                );
                false
            }
        })
        .collect()
}

/// How many of `orders` `older_than` would skip for a bad date.
pub fn undated(orders: &[Order]) -> usize {
    orders.iter().filter(|o| o.created_at().is_none()).count()
}

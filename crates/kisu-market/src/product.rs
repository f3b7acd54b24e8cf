//! Listing records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expiry::{remaining_time, RemainingTime};

/// A past price of a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub price: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub changed_at: DateTime<Utc>,
}

/// One marketplace listing as stored in a page map.
///
/// The item itself lives in the item store under `item_key`; the record
/// only references it. Field names on the wire match what the in-game
/// market reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductData {
    #[serde(rename = "itemStack")]
    pub item_key: String,
    pub owner: String,
    #[serde(rename = "prices")]
    pub price: i64,
    #[serde(rename = "releaseDate", with = "chrono::serde::ts_milliseconds")]
    pub release_date: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<PriceChange>,
    #[serde(rename = "isHide", default)]
    pub hidden: bool,
}

impl ProductData {
    pub fn new(
        item_key: impl Into<String>,
        owner: impl Into<String>,
        price: i64,
        release_date: DateTime<Utc>,
    ) -> Self {
        Self {
            item_key: item_key.into(),
            owner: owner.into(),
            price,
            release_date,
            history: Vec::new(),
            hidden: false,
        }
    }

    /// Time left before this listing expires.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Option<RemainingTime> {
        remaining_time(self.release_date, now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_time(now).is_none()
    }

    /// Change the price, remembering the old one.
    pub fn reprice(&mut self, price: i64, now: DateTime<Utc>) {
        if price == self.price {
            return;
        }
        self.history.push(PriceChange {
            price: self.price,
            changed_at: now,
        });
        self.price = price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn released() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_714_557_600_000).unwrap()
    }

    #[test]
    fn wire_format() {
        let p = ProductData::new("ab3x9", "Alice", 50, released());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "itemStack": "ab3x9",
                "owner": "Alice",
                "prices": 50,
                "releaseDate": 1_714_557_600_000i64,
                "history": [],
                "isHide": false,
            })
        );
    }

    #[test]
    fn reads_records_without_optional_fields() {
        let p: ProductData = serde_json::from_str(
            r#"{"itemStack":"k1","owner":"Bob","prices":5,"releaseDate":1714557600000}"#,
        )
        .unwrap();
        assert!(!p.hidden);
        assert!(p.history.is_empty());
        assert_eq!(p.release_date, released());
    }

    #[test]
    fn reprice_keeps_history() {
        let mut p = ProductData::new("k", "Alice", 50, released());
        let later = released() + Duration::minutes(5);
        p.reprice(50, later);
        assert!(p.history.is_empty());
        p.reprice(80, later);
        assert_eq!(p.price, 80);
        assert_eq!(
            p.history,
            vec![PriceChange {
                price: 50,
                changed_at: later
            }]
        );
    }

    #[test]
    fn expiry() {
        let p = ProductData::new("k", "Alice", 1, released());
        assert!(!p.is_expired(released() + Duration::minutes(179)));
        assert!(p.is_expired(released() + Duration::hours(3)));
    }
}

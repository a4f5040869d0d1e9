//! Reservation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Paid,
    Expired,
    #[serde(alias = "canceled")]
    Cancelled,
}

/// Contact details left by the customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// One line of the extras cart attached to a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub qty: u32,
}

/// A reservation of one tent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub tent_id: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub cart: Vec<CartLine>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reservation {
    /// Whether a pending hold has run past its deadline at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending
            && self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Total of the extras in the cart.
    pub fn extras_total(&self) -> f64 {
        self.cart
            .iter()
            .map(|line| line.price * f64::from(line.qty))
            .sum()
    }
}

/// Client-supplied reservation fields for a new hold. Anything missing is filled in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub cart: Vec<CartLine>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

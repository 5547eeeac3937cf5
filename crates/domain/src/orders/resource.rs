use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Backend order status. Parsed from the wire once so the rest of the crate
/// matches on variants, never on strings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum OrderStatus {
    /// Still modifiable by the client
    Pending,
    /// Waiting for staff to accept the order
    PendingStaffConfirmation,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    /// Expired by the backend before being confirmed
    Expired,
}

impl OrderStatus {
    /// Only a pending resource accepts new items.
    pub fn is_modifiable(self) -> bool {
        match self {
            OrderStatus::Pending => true,
            OrderStatus::PendingStaffConfirmation
            | OrderStatus::Confirmed
            | OrderStatus::InProgress
            | OrderStatus::Completed
            | OrderStatus::Cancelled
            | OrderStatus::Expired => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PendingStaffConfirmation => "PENDING_STAFF_CONFIRMATION",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    /// Accepts any casing and `-`/space separators, plus the legacy
    /// spellings the backend has used for the same states.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace(&['-', ' '][..], "_");
        let status = match normalized.as_str() {
            "PENDING" | "OPEN" | "DRAFT" => OrderStatus::Pending,
            "PENDING_STAFF_CONFIRMATION" | "AWAITING_STAFF" => {
                OrderStatus::PendingStaffConfirmation
            }
            "CONFIRMED" => OrderStatus::Confirmed,
            "IN_PROGRESS" => OrderStatus::InProgress,
            "COMPLETED" | "DONE" => OrderStatus::Completed,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            "EXPIRED" => OrderStatus::Expired,
            _ => return Err(format!("unknown order status '{}'", raw)),
        };
        Ok(status)
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrderItem {
    pub service_id: String,
    pub quantity: u32,
}

/// Snapshot of the external order resource as last read from the backend.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrderResource {
    pub id: String,
    #[serde(default)]
    pub booking_id: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl OrderResource {
    pub fn contains_service(&self, service_id: &str) -> bool {
        self.items.iter().any(|item| item.service_id == service_id)
    }
}

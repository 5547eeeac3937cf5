use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct ServiceRequest {
    pub service_id: String,
    pub quantity: u32,
}

impl ServiceRequest {
    pub fn validate(&self) -> Result<()> {
        if self.service_id.trim().is_empty() {
            return Err(Error::validation("service id is required"));
        }
        if self.quantity == 0 {
            return Err(Error::validation("quantity must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct Assignment {
    pub handler_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl Assignment {
    pub fn validate(&self) -> Result<()> {
        if self.handler_id.trim().is_empty() {
            return Err(Error::validation("handler id is required"));
        }
        Ok(())
    }
}

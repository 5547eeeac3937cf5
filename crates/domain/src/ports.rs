//! Narrow interfaces to the collaborators this crate drives but does not own:
//! the reservation, enrollment and order endpoints, plus the auth provider.

use async_trait::async_trait;
use chrono::NaiveDate;
use derive_new::new;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enrollment::EnrollmentPayload;
use crate::errors::{Error, Result};
use crate::orders::{Assignment, OrderResource, ServiceRequest};

/// Backend failures as reported by a gateway, classified just enough for the
/// order workflow to pick a recovery branch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("resource {resource_id} cannot be modified: {message}")]
    NotModifiable { resource_id: String, message: String },

    #[error("item not found on resource {resource_id}: {message}")]
    ItemNotFound { resource_id: String, message: String },

    #[error("not found: {entity}")]
    NotFound { entity: String },

    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn validate(&self) -> Result<()> {
        if self.check_out <= self.check_in {
            return Err(Error::validation(format!(
                "check-out {} must be after check-in {}",
                self.check_out, self.check_in
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait ReservationGateway: Send + Sync {
    async fn create_reservation(
        &self,
        room_id: &str,
        dates: &DateRange,
    ) -> std::result::Result<String, GatewayError>;
}

#[async_trait]
pub trait EnrollmentGateway: Send + Sync {
    /// One atomic multipart upload of every attachment.
    async fn submit_enrollment(
        &self,
        payload: &EnrollmentPayload,
    ) -> std::result::Result<(), GatewayError>;
}

/// The external order ("cart") resource. None of these calls are idempotent.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn list_resources(
        &self,
        booking_id: &str,
    ) -> std::result::Result<Vec<OrderResource>, GatewayError>;

    async fn create_resource(&self, booking_id: &str) -> std::result::Result<String, GatewayError>;

    async fn get_resource(
        &self,
        resource_id: &str,
    ) -> std::result::Result<OrderResource, GatewayError>;

    async fn add_item(
        &self,
        resource_id: &str,
        item: &ServiceRequest,
    ) -> std::result::Result<(), GatewayError>;

    async fn assign_handler(
        &self,
        resource_id: &str,
        assignment: &Assignment,
    ) -> std::result::Result<(), GatewayError>;
}

/// Session handling lives elsewhere; adapters only ask for the current token.
pub trait AuthProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

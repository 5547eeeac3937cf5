use std::sync::Arc;

use thiserror::Error;

use crate::capture::CaptureSession;
use crate::enrollment::{EnrollmentReceipt, EnrollmentSubmitter};
use crate::errors::Error;
use crate::ports::{DateRange, ReservationGateway};

/// Failure of the reserve-then-enroll sequence. When the reservation was
/// already created its id is kept here; nothing cancels it.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct BookingFailure {
    pub reservation_id: Option<String>,
    #[source]
    pub error: Error,
}

impl From<Error> for BookingFailure {
    fn from(error: Error) -> Self {
        Self { reservation_id: None, error }
    }
}

pub struct BookingCoordinator {
    reservations: Arc<dyn ReservationGateway>,
    submitter: EnrollmentSubmitter,
}

impl BookingCoordinator {
    pub fn new(reservations: Arc<dyn ReservationGateway>, submitter: EnrollmentSubmitter) -> Self {
        Self { reservations, submitter }
    }

    pub async fn reserve_and_enroll(
        &self,
        room_id: &str,
        dates: &DateRange,
        session: &CaptureSession,
    ) -> Result<EnrollmentReceipt, BookingFailure> {
        if room_id.trim().is_empty() {
            return Err(Error::validation("room id is required").into());
        }
        dates.validate()?;
        self.submitter.validate_session(session)?;

        let reservation_id = self
            .reservations
            .create_reservation(room_id, dates)
            .await
            .map_err(Error::from)?;
        tracing::info!(room_id, reservation_id = %reservation_id, "Reservation created");

        self.submitter
            .submit(session, &reservation_id)
            .await
            .map_err(|error| BookingFailure { reservation_id: Some(reservation_id.clone()), error })
    }
}

//! Packages a finished capture session into one enrollment upload.
//!
//! The downstream verifier expects at least `min_biometric_samples` face
//! images. A session that captured fewer is padded with copies of its first
//! biometric image. The reservation the upload belongs to is created
//! upstream and is left in place if the upload fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureSession, Frame};
use crate::clock::Clock;
use crate::config::EnrollmentConfig;
use crate::errors::{Error, Result};
use crate::ports::EnrollmentGateway;

pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Attachment {
    pub slot_id: String,
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl Attachment {
    fn from_frame(slot_id: &str, file_name: String, frame: &Frame) -> Self {
        Self {
            slot_id: slot_id.to_string(),
            file_name,
            content_type: IMAGE_CONTENT_TYPE.to_string(),
            bytes: frame.data.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnrollmentPayload {
    pub reservation_id: String,
    pub biometric: Vec<Attachment>,
    pub documents: Vec<Attachment>,
}

impl EnrollmentPayload {
    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.biometric.iter().chain(self.documents.iter())
    }

    pub fn attachment_count(&self) -> usize {
        self.biometric.len() + self.documents.len()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnrollmentReceipt {
    pub reservation_id: String,
    pub attachment_count: usize,
    /// Biometric attachments that are copies of the first capture
    pub padded_count: usize,
    pub submitted_at: DateTime<Utc>,
}

pub struct EnrollmentSubmitter {
    gateway: Arc<dyn EnrollmentGateway>,
    config: EnrollmentConfig,
    clock: Arc<dyn Clock>,
}

impl EnrollmentSubmitter {
    pub fn new(
        gateway: Arc<dyn EnrollmentGateway>,
        config: EnrollmentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { gateway, config, clock }
    }

    /// Local checks only; never touches the network.
    pub fn validate_session(&self, session: &CaptureSession) -> Result<()> {
        if !session.is_complete() {
            return Err(Error::validation("capture session is not complete"));
        }
        if session.biometric_captures().next().is_none() {
            return Err(Error::validation("capture session has no biometric image"));
        }
        Ok(())
    }

    pub fn build_payload(
        &self,
        session: &CaptureSession,
        reservation_id: &str,
    ) -> Result<EnrollmentPayload> {
        if reservation_id.trim().is_empty() {
            return Err(Error::validation("reservation id is required"));
        }
        self.validate_session(session)?;

        let mut biometric: Vec<Attachment> = session
            .biometric_captures()
            .map(|(slot, frame)| {
                Attachment::from_frame(&slot.id, format!("{}.jpg", slot.id), frame)
            })
            .collect();

        // Copies keep the first capture's slot id; only the file name differs.
        if let Some(first) = biometric.first().cloned() {
            let mut pad = 1;
            while biometric.len() < self.config.min_biometric_samples {
                biometric.push(Attachment {
                    file_name: format!("{}-pad{}.jpg", first.slot_id, pad),
                    ..first.clone()
                });
                pad += 1;
            }
        }

        let documents = session
            .document_captures()
            .map(|(slot, frame)| {
                Attachment::from_frame(&slot.id, format!("{}.jpg", slot.id), frame)
            })
            .collect();

        Ok(EnrollmentPayload {
            reservation_id: reservation_id.to_string(),
            biometric,
            documents,
        })
    }

    pub async fn submit(
        &self,
        session: &CaptureSession,
        reservation_id: &str,
    ) -> Result<EnrollmentReceipt> {
        let payload = self.build_payload(session, reservation_id)?;
        let captured = session.biometric_captures().count();
        let padded_count = payload.biometric.len() - captured;
        if padded_count > 0 {
            tracing::warn!(
                reservation_id,
                captured,
                padded_count,
                "Padding enrollment with duplicated biometric images"
            );
        }

        self.gateway.submit_enrollment(&payload).await.map_err(|e| {
            tracing::error!(
                reservation_id,
                "Enrollment upload failed, reservation left in place: {}",
                e
            );
            Error::from(e)
        })?;

        tracing::info!(
            reservation_id,
            attachments = payload.attachment_count(),
            "Enrollment submitted"
        );
        Ok(EnrollmentReceipt {
            reservation_id: reservation_id.to_string(),
            attachment_count: payload.attachment_count(),
            padded_count,
            submitted_at: self.clock.now(),
        })
    }
}

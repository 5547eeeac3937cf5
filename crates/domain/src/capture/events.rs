use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::{Frame, SlotSpec};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        id: String,
        slots: Vec<SlotSpec>,
        started_at: DateTime<Utc>,
    },

    ImageCaptured {
        id: String,
        slot_id: String,
        image: Frame,
        captured_at: DateTime<Utc>,
        next_pointer: usize,
    },

    SlotReopened {
        id: String,
        slot_id: String,
        pointer: usize,
        updated_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::SessionStarted { .. } => "CaptureSession:Started".to_string(),
            Event::ImageCaptured { .. } => "CaptureSession:ImageCaptured".to_string(),
            Event::SlotReopened { .. } => "CaptureSession:SlotReopened".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}

use std::{collections::HashSet, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::Aggregate;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::errors::Error;

use super::{Command, Event};

/// Raw camera frame, also the stored image of a filled slot.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// How a slot is filled
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Face photo, auto-captured once detection is stable
    Biometric,
    /// Identity document, captured manually
    Document,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Biometric => f.write_str("biometric"),
            SlotKind::Document => f.write_str("document"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct SlotSpec {
    pub id: String,
    pub label: String,
    pub kind: SlotKind,
    pub required: bool,
}

impl SlotSpec {
    /// Front, left and right face followed by the ID card.
    pub fn default_sequence() -> Vec<SlotSpec> {
        vec![
            SlotSpec::new(
                "face-front".into(),
                "Look straight at the camera".into(),
                SlotKind::Biometric,
                true,
            ),
            SlotSpec::new(
                "face-left".into(),
                "Turn slightly to your left".into(),
                SlotKind::Biometric,
                true,
            ),
            SlotSpec::new(
                "face-right".into(),
                "Turn slightly to your right".into(),
                SlotKind::Biometric,
                true,
            ),
            SlotSpec::new(
                "id-card".into(),
                "Hold your ID card to the camera".into(),
                SlotKind::Document,
                true,
            ),
        ]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CaptureSlot {
    pub id: String,
    pub label: String,
    pub kind: SlotKind,
    pub required: bool,
    pub image: Option<Frame>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl From<SlotSpec> for CaptureSlot {
    fn from(spec: SlotSpec) -> Self {
        Self {
            id: spec.id,
            label: spec.label,
            kind: spec.kind,
            required: spec.required,
            image: None,
            captured_at: None,
        }
    }
}

impl CaptureSlot {
    pub fn is_filled(&self) -> bool {
        self.image.is_some()
    }
}

/// Capture session aggregate. Lives in memory for the duration of one
/// booking flow; its events are applied locally and never stored.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct CaptureSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub slots: Vec<CaptureSlot>,
    /// Index of the slot awaiting capture; `slots.len()` once all are filled
    pub pointer: usize,
}

pub const AGGREGATE_TYPE: &str = "CaptureSession";

#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
}

impl Services {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self { clock: Arc::new(SystemClock) }
    }
}

#[async_trait]
impl Aggregate for CaptureSession {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::StartSession { id, slots } => {
                self.validate_new()?;
                validate_specs(&slots)?;

                Ok(vec![Event::SessionStarted {
                    id,
                    slots,
                    started_at: services.clock.now(),
                }])
            }

            Command::CaptureImage { slot_id, image } => {
                self.validate_existing()?;
                let expected = self
                    .current_slot()
                    .ok_or_else(|| Error::validation("every slot is already captured"))?;
                if expected.id != slot_id {
                    return Err(Error::OutOfOrderCapture {
                        expected: expected.id.clone(),
                        received: slot_id,
                    });
                }
                if image.is_empty() {
                    return Err(Error::validation(format!("empty image for slot {}", slot_id)));
                }

                Ok(vec![Event::ImageCaptured {
                    id: self.id.clone(),
                    slot_id,
                    image,
                    captured_at: services.clock.now(),
                    next_pointer: self.next_open_slot(self.pointer),
                }])
            }

            Command::RetakeSlot { slot_id } => {
                self.validate_existing()?;
                let index = self.slot_index(&slot_id)?;
                if !self.slots[index].is_filled() {
                    return Err(Error::validation(format!(
                        "slot {} has not been captured",
                        slot_id
                    )));
                }

                Ok(vec![Event::SlotReopened {
                    id: self.id.clone(),
                    slot_id,
                    pointer: index,
                    updated_at: services.clock.now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::SessionStarted { id, slots, started_at } => {
                self.id = id;
                self.started_at = started_at;
                self.updated_at = started_at;
                self.slots = slots.into_iter().map(CaptureSlot::from).collect();
                self.pointer = 0;
            }

            Event::ImageCaptured { slot_id, image, captured_at, next_pointer, .. } => {
                if let Some(slot) = self.slots.iter_mut().find(|s| s.id == slot_id) {
                    slot.image = Some(image);
                    slot.captured_at = Some(captured_at);
                }
                self.pointer = next_pointer;
                self.updated_at = captured_at;
            }

            Event::SlotReopened { slot_id, pointer, updated_at, .. } => {
                if let Some(slot) = self.slots.iter_mut().find(|s| s.id == slot_id) {
                    slot.image = None;
                    slot.captured_at = None;
                }
                self.pointer = pointer;
                self.updated_at = updated_at;
            }
        }
    }
}

impl CaptureSession {
    pub fn current_slot(&self) -> Option<&CaptureSlot> {
        self.slots.get(self.pointer)
    }

    pub fn is_complete(&self) -> bool {
        !self.slots.is_empty()
            && self.slots.iter().filter(|s| s.required).all(CaptureSlot::is_filled)
    }

    /// Captured biometric images in slot order.
    pub fn biometric_captures(&self) -> impl Iterator<Item = (&CaptureSlot, &Frame)> {
        self.captures_of(SlotKind::Biometric)
    }

    pub fn document_captures(&self) -> impl Iterator<Item = (&CaptureSlot, &Frame)> {
        self.captures_of(SlotKind::Document)
    }

    fn captures_of(&self, kind: SlotKind) -> impl Iterator<Item = (&CaptureSlot, &Frame)> {
        self.slots
            .iter()
            .filter(move |s| s.kind == kind)
            .filter_map(|s| s.image.as_ref().map(|image| (s, image)))
    }

    /// In the forward flow this is `filled + 1`; after a retake it skips
    /// slots that still hold their earlier capture.
    fn next_open_slot(&self, filled: usize) -> usize {
        self.slots
            .iter()
            .enumerate()
            .position(|(i, s)| i != filled && !s.is_filled())
            .unwrap_or(self.slots.len())
    }

    fn slot_index(&self, slot_id: &str) -> Result<usize, Error> {
        self.slots
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| Error::NotFound { entity: format!("slot {}", slot_id) })
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness { field: "id".to_string() });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound { entity: AGGREGATE_TYPE.to_string() });
        }
        Ok(())
    }
}

fn validate_specs(slots: &[SlotSpec]) -> Result<(), Error> {
    if slots.is_empty() {
        return Err(Error::validation("a capture session needs at least one slot"));
    }
    let mut seen = HashSet::new();
    for spec in slots {
        if !seen.insert(spec.id.as_str()) {
            return Err(Error::Uniqueness { field: format!("slot id {}", spec.id) });
        }
    }
    Ok(())
}

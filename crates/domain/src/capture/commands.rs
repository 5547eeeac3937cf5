use serde::{Deserialize, Serialize};

use super::aggregate::{Frame, SlotSpec};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Open a session over an ordered list of slots
    StartSession {
        id: String,
        slots: Vec<SlotSpec>,
    },

    /// Store an image in the slot at the pointer
    CaptureImage {
        slot_id: String,
        image: Frame,
    },

    /// Clear a filled slot and move the pointer back to it
    RetakeSlot {
        slot_id: String,
    },
}

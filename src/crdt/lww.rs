//! Last-writer-wins register.

use serde::{Deserialize, Serialize};

use crate::model::EventId;

/// `(eventId, value)` pair; a write wins iff its event id is strictly
/// greater than the incumbent's, under the total order on [`EventId`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Lww<V> {
    event_id: EventId,
    value: V,
}

impl<V> Lww<V> {
    /// Creates a register initialized to `value` written at `event_id`.
    pub fn new(event_id: EventId, value: V) -> Self {
        Lww { event_id, value }
    }

    /// The current value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The event id of the current (winning) write.
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Attempts to write `value` at `event_id`. Applies and returns `true`
    /// iff `event_id` is strictly greater than the incumbent's.
    pub fn write(&mut self, event_id: EventId, value: V) -> bool {
        if event_id > self.event_id {
            self.event_id = event_id;
            self.value = value;
            true
        } else {
            false
        }
    }
}

//! Checkpoint creation, loading, and incremental materialization.

mod message;
mod serialize;
mod service;

pub use message::Message;
pub use serialize::{
    compute_state_hash, compute_visible_projection, deserialize_full_state, serialize_full_state,
    VisibleProjection, VisibleProp, FULL_STATE_VERSION,
};
pub use service::{CheckpointHandle, CheckpointSchema, CheckpointService, LoadedCheckpoint, PatchLoader};

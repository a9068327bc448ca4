//! CRDT data types and the patch-folding reducer.

mod lww;
mod orset;
mod patch;
mod reducer;
mod state;
mod value;

pub use lww::Lww;
pub use orset::OrSet;
pub use patch::{Op, Patch, PropTarget, PATCH_SCHEMA};
pub use reducer::{JoinReducer, OpOutcome, OpReceipt, ReceiptMode};
pub use state::WarpState;
pub use value::PropValue;

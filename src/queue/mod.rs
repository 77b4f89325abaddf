//! Pending-update storage for the scheduler
//!
//! - `MergeKey`: identifies mergeable updates of the same kind and key
//! - `StageBucket`: FIFO of pending updates for one stage plus its merge registry
//! - `Frame`: one execution level, a PRESEND and a POSTSEND bucket
//! - `ScopeStack`: the stack of frames; depth 0 is "not inside any drain"

pub mod key;
mod bucket;
mod frame;

pub use key::MergeKey;
pub use bucket::{EnqueueOutcome, StageBucket};
pub use frame::{Frame, ScopeStack};

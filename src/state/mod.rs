//! The state table and snapshot projection.
//!
//! One [`StateTable`] per application maps store ids to their immutable
//! slices. Slices are replaced whole, never edited in place. The snapshot
//! helpers project the table to plain data and back.

mod snapshot;
mod table;

pub use snapshot::{capture, decode_snapshot, diff_against, encode_snapshot};
pub use table::StateTable;

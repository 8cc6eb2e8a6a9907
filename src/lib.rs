//! Range allocator for a discrete accelerator's on-device memory (VRAM).
//!
//! The manager carves a fixed linear space into non-overlapping extents on
//! demand and keeps two byte counters current: total usage and usage inside
//! the CPU-visible BAR window. Eviction policy, page tables and the rest of
//! the device stack live above this crate; see [`vram::RangeManager`] for the
//! contract they drive it through.

pub mod error;
pub mod mm;
pub mod utils;
pub mod vram;

pub use error::{VramError, VramResult};
pub use mm::{Extent, InsertMode, RangeSpace, SpanState};
pub use vram::{Placement, RangeManager, VramAllocation, VramConfig, VramManager};

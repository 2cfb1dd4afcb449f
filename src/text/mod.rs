//! Span bookkeeping over a unit's text: conflict detection and addressing.

pub mod interval;
pub mod offset;

pub use interval::{Interval, IntervalIndex};
pub use offset::{escape_for_codec, map_offset, Addressing, Located, UnitOffsets};

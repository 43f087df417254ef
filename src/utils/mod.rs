//! Utility helpers: generational allocator, math extensions, and logging.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, ArenaKey, GenerationalId, GroupId, ObjectId};
pub use math::*;

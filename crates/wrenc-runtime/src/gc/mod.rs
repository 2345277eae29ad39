//! Garbage collection (spec 4.L, component L): tri-color mark-sweep over
//! the slab allocator.
//!
//! # Architecture
//!
//! - [`GarbageCollector`]: owns the [`crate::slab::SlabAllocator`], drives
//!   mark/trace/sweep cycles, and is the only allocation entry point for
//!   heap objects.
//! - [`ptr::GcPtr`]: address-comparable handle over a live object header,
//!   for code that needs identity rather than a `Value` round-trip.
//!
//! Marking is "stop the world" by construction (spec §5: single-threaded
//! cooperative execution), so there is no write barrier.

mod collector;
mod ptr;

pub use collector::{GarbageCollector, GcStats, Traceable};
pub use ptr::GcPtr;

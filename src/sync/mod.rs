//! Coordination primitives shared by the pipeline workers.
//!
//! - [`MutexList`] - lock-guarded FIFO/LIFO inbox that never blocks on content
//! - [`MutexMap`] - lock-guarded map with accumulate, reserve and prune operations
//! - [`KeyedCache`] - construct-once-per-key cache with per-key locking
//! - [`PhaseGate`] - countdown latch released by the last worker of a stage

mod cache;
mod gate;
mod list;
mod map;

pub use cache::KeyedCache;
pub use gate::PhaseGate;
pub use list::MutexList;
pub use map::MutexMap;

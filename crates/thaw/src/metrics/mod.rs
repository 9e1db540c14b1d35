//! Metric events for resume cycles.
//!
//! Events are emitted with [`thaw_core::emit!`] and carry a `target` label
//! naming the job or table.

pub mod events;

//! Metric events and the Prometheus exporter.
//!
//! Events are plain structs implementing [`events::InternalEvent`]; emitting
//! one records it through the `metrics` facade. Binaries install the global
//! recorder with [`exporter::init_global`].

pub mod events;
pub mod exporter;

/// Emit a metric event.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        <_ as $crate::metrics::events::InternalEvent>::emit($event)
    };
}

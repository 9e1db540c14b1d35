//! Configuration plumbing shared by thaw binaries.
//!
//! Handles multi-file YAML loading, `$VAR` interpolation, command line
//! arguments, metrics exporter settings and exclusive resource declarations. Domain-specific config
//! structs live in the crates that own them.

mod loader;
mod metrics;
mod path;
mod resource;
mod vars;

pub use loader::{Mergeable, load_from_paths};
pub use self::metrics::{MetricsConfig, PushGatewayConfig};
pub use path::{CliArgs, ConfigPath, is_yaml_file};
pub use resource::Resource;
pub use vars::{InterpolationResult, interpolate};

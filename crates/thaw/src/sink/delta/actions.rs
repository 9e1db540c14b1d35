//! Delta Lake log actions.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use deltalake::kernel::{Action, Add, Remove};

use crate::partition::PartitionValue;

/// Partition values in the textual form stored in the Delta log.
pub fn delta_partition_values(
    columns: &[String],
    values: &[Option<PartitionValue>],
) -> HashMap<String, Option<String>> {
    columns
        .iter()
        .cloned()
        .zip(values.iter().map(|v| v.map(|v| v.to_delta_string())))
        .collect()
}

/// Add a newly written data file.
pub fn add_action(
    path: &str,
    size: usize,
    partition_values: HashMap<String, Option<String>>,
) -> Action {
    Action::Add(Add {
        path: path.trim_start_matches('/').to_string(),
        size: i64::try_from(size).unwrap_or(i64::MAX),
        partition_values,
        modification_time: now_millis(),
        data_change: true,
        ..Default::default()
    })
}

/// Logically delete a data file.
pub fn remove_action(
    path: &str,
    size: Option<i64>,
    partition_values: HashMap<String, Option<String>>,
) -> Action {
    Action::Remove(Remove {
        path: path.to_string(),
        data_change: true,
        deletion_timestamp: Some(now_millis()),
        extended_file_metadata: Some(true),
        partition_values: Some(partition_values),
        size,
        ..Default::default()
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

//! Committing actions to the Delta log.

use std::time::Instant;

use deltalake::DeltaTable;
use deltalake::kernel::Action;
use deltalake::kernel::transaction::CommitBuilder;
use deltalake::protocol::DeltaOperation;
use snafu::prelude::*;
use thaw_core::emit;
use tracing::debug;

use crate::error::{DeltaSnafu, TableError};
use crate::metrics::events::TableCommitted;

/// Commit `actions` as one transaction and reload the table.
///
/// Returns the new table version.
pub async fn commit(
    table: &mut DeltaTable,
    actions: Vec<Action>,
    operation: DeltaOperation,
    name: &str,
) -> Result<i64, TableError> {
    let start = Instant::now();
    let operation_name = operation.name().to_string();
    let action_count = actions.len();

    let version = CommitBuilder::default()
        .with_actions(actions)
        .build(
            Some(table.snapshot().context(DeltaSnafu)?),
            table.log_store(),
            operation,
        )
        .await
        .context(DeltaSnafu)?
        .version;

    table.load().await.context(DeltaSnafu)?;

    debug!(
        target = %name,
        operation = %operation_name,
        actions = action_count,
        "Committed Delta version {version}"
    );
    emit!(TableCommitted {
        operation: operation_name,
        duration: start.elapsed(),
        target: name.to_string(),
    });
    Ok(version)
}

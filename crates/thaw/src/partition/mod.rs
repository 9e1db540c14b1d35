//! Partition schemes and partition specifications.
//!
//! A table is partitioned either by a single timestamp column (`pdate`) or by
//! the integer hierarchy `y`/`m`/`d` with an optional `h`. A [`PartitionSpec`]
//! names one concrete partition and can build a row mask selecting it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use deltalake::arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Int64Array};
use deltalake::arrow::compute::kernels::cmp::eq;
use deltalake::arrow::compute::{and, cast};
use deltalake::arrow::datatypes::{DataType, Int64Type, TimeUnit};
use deltalake::arrow::error::ArrowError;
use deltalake::arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::error::PartitionError;

pub const PDATE: &str = "pdate";
pub const YEAR: &str = "y";
pub const MONTH: &str = "m";
pub const DAY: &str = "d";
pub const HOUR: &str = "h";

/// Columns that a capture source derives from its directory layout.
pub const RESERVED_COLUMNS: [&str; 5] = [PDATE, YEAR, MONTH, DAY, HOUR];

/// How a table or capture archive is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionScheme {
    /// Single timestamp key.
    Pdate,
    /// `y`, `m`, `d`.
    Ymd,
    /// `y`, `m`, `d`, `h`.
    Ymdh,
}

impl PartitionScheme {
    /// Partition column names, outermost first.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            PartitionScheme::Pdate => &[PDATE],
            PartitionScheme::Ymd => &[YEAR, MONTH, DAY],
            PartitionScheme::Ymdh => &[YEAR, MONTH, DAY, HOUR],
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.to_string()).collect()
    }

    /// The scheme declared by an ordered list of partition columns.
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Option<Self> {
        [PartitionScheme::Pdate, PartitionScheme::Ymd, PartitionScheme::Ymdh]
            .into_iter()
            .find(|scheme| {
                let expected = scheme.columns();
                expected.len() == columns.len()
                    && expected.iter().zip(columns).all(|(e, c)| *e == c.as_ref())
            })
    }

    pub fn is_hierarchical(&self) -> bool {
        !matches!(self, PartitionScheme::Pdate)
    }
}

/// Strategy for finding the resume point of a target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Maximum of the `pdate` column.
    SingleKey,
    /// Greedy descent through `y`, `m`, `d` and optionally `h`.
    Hierarchical(PartitionScheme),
}

impl ResumeMode {
    /// Pick the resume strategy for a target and capture source layout.
    ///
    /// A `pdate` target can be fed from any capture layout. Otherwise both
    /// sides must declare the same hierarchical columns in the same order.
    pub fn select(
        table: &str,
        target: &[String],
        capture: &[String],
    ) -> Result<Self, PartitionError> {
        let unsupported = || PartitionError::UnsupportedScheme {
            table: table.to_string(),
            columns: target.to_vec(),
        };

        match PartitionScheme::from_columns(target).ok_or_else(unsupported)? {
            PartitionScheme::Pdate => Ok(ResumeMode::SingleKey),
            scheme if target == capture => Ok(ResumeMode::Hierarchical(scheme)),
            _ => Err(PartitionError::IncompatiblePartitioning {
                table: table.to_string(),
                target: target.to_vec(),
                capture: capture.to_vec(),
            }),
        }
    }
}

/// The value of one partition column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionValue {
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl PartitionValue {
    /// Textual form used in Delta Lake partition values.
    pub fn to_delta_string(&self) -> String {
        match self {
            PartitionValue::Int(v) => v.to_string(),
            PartitionValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionValue::Int(v) => write!(f, "{v}"),
            PartitionValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Kind of value a partition column holds, derived from its Arrow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Int,
    Timestamp,
}

impl PartitionKind {
    pub fn of(data_type: &DataType) -> Option<Self> {
        match data_type {
            t if t.is_integer() => Some(PartitionKind::Int),
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
                Some(PartitionKind::Timestamp)
            }
            _ => None,
        }
    }

    /// Per-row partition values of `array`, `None` for nulls.
    pub fn values(&self, array: &dyn Array) -> Result<Vec<Option<PartitionValue>>, ArrowError> {
        let raw = match self {
            PartitionKind::Int => as_int64(array)?,
            PartitionKind::Timestamp => as_timestamp_micros(array)?,
        };
        raw.iter()
            .map(|v| match (self, v) {
                (_, None) => Ok(None),
                (PartitionKind::Int, Some(v)) => Ok(Some(PartitionValue::Int(v))),
                (PartitionKind::Timestamp, Some(v)) => DateTime::from_timestamp_micros(v)
                    .map(|ts| Some(PartitionValue::Timestamp(ts)))
                    .ok_or_else(|| {
                        ArrowError::ComputeError(format!("timestamp {v} is out of range"))
                    }),
            })
            .collect()
    }
}

/// One concrete partition, such as `y=2024,m=1,d=2`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSpec {
    entries: Vec<(String, PartitionValue)>,
}

impl PartitionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: PartitionValue) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: PartitionValue) {
        self.entries.push((column.into(), value));
    }

    pub fn entries(&self) -> &[(String, PartitionValue)] {
        &self.entries
    }

    pub fn get(&self, column: &str) -> Option<PartitionValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| *value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows of `batch` that belong to this partition.
    ///
    /// Null partition values never match. Every column of the spec must be
    /// present in the batch.
    pub fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray, ArrowError> {
        let mut mask = BooleanArray::from(vec![true; batch.num_rows()]);
        for (column, value) in &self.entries {
            let array = batch.column_by_name(column).ok_or_else(|| {
                ArrowError::SchemaError(format!("partition column '{column}' not found"))
            })?;
            mask = and(&mask, &equals(array, value)?)?;
        }
        Ok(mask)
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (column, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{column}={value}")?;
        }
        Ok(())
    }
}

/// Row-wise `array == value` with nulls mapped to `false`.
pub fn equals(array: &ArrayRef, value: &PartitionValue) -> Result<BooleanArray, ArrowError> {
    let (values, scalar) = match value {
        PartitionValue::Int(v) => (as_int64(array.as_ref())?, *v),
        PartitionValue::Timestamp(ts) => (
            as_timestamp_micros(array.as_ref())?,
            ts.timestamp_micros(),
        ),
    };
    let matched = eq(&values, &Int64Array::new_scalar(scalar))?;
    Ok(matched.iter().map(|m| Some(m.unwrap_or(false))).collect())
}

/// Cast any integer-like column to `Int64`.
pub fn as_int64(array: &dyn Array) -> Result<Int64Array, ArrowError> {
    let values = cast(array, &DataType::Int64)?;
    Ok(values.as_primitive::<Int64Type>().clone())
}

/// Cast a date, timestamp or timestamp-like string column to UTC microseconds.
pub fn as_timestamp_micros(array: &dyn Array) -> Result<Int64Array, ArrowError> {
    let utc = DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC")));
    let timestamps = cast(array, &utc)?;
    as_int64(timestamps.as_ref())
}

//! Resume point resolution.
//!
//! The target table is the only durable record of progress. Its highest
//! partition is found from the stored partition values alone, without
//! touching the capture archive.

use chrono::{DateTime, TimeZone, Utc};
use deltalake::arrow::compute::{concat_batches, filter_record_batch, max};
use deltalake::arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use crate::error::{
    InvalidInstantSnafu, MissingPartitionColumnSnafu, WatermarkArrowSnafu, WatermarkError,
};
use crate::partition::{
    HOUR, PDATE, PartitionSpec, PartitionValue, ResumeMode, as_int64, as_timestamp_micros, equals,
};

/// Where a resume cycle restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// Inclusive lower bound for re-reading the capture archive.
    pub boundary: DateTime<Utc>,
    /// Target partition to remove before re-reading.
    pub truncate: PartitionSpec,
}

/// Outcome of watermark resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watermark {
    /// The target holds no partitions; load the whole archive.
    Empty,
    Resume(ResumePoint),
}

impl Watermark {
    pub fn boundary(&self) -> Option<DateTime<Utc>> {
        match self {
            Watermark::Empty => None,
            Watermark::Resume(point) => Some(point.boundary),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Watermark::Empty => "empty",
            Watermark::Resume(_) => "resume",
        }
    }
}

/// Finds the highest stored partition of a target table.
pub struct WatermarkResolver;

impl WatermarkResolver {
    /// Resolve the watermark from the partition columns of a target.
    ///
    /// `partitions` are batches holding at least the partition columns. For
    /// hierarchical layouts each level is maximised only among rows matching
    /// the levels already resolved, so the result is always a partition that
    /// exists. A missing hour level resolves to midnight.
    pub fn resolve(
        mode: ResumeMode,
        partitions: &[RecordBatch],
    ) -> Result<Watermark, WatermarkError> {
        let Some(first) = partitions.first() else {
            return Ok(Watermark::Empty);
        };
        let rows = concat_batches(&first.schema(), partitions).context(WatermarkArrowSnafu)?;
        if rows.num_rows() == 0 {
            return Ok(Watermark::Empty);
        }

        match mode {
            ResumeMode::SingleKey => Self::resolve_single_key(&rows),
            ResumeMode::Hierarchical(scheme) => Self::resolve_hierarchical(rows, scheme.columns()),
        }
    }

    fn resolve_single_key(rows: &RecordBatch) -> Result<Watermark, WatermarkError> {
        let column = column(rows, PDATE)?;
        let micros = as_timestamp_micros(column.as_ref()).context(WatermarkArrowSnafu)?;
        let Some(latest) = max(&micros) else {
            return Ok(Watermark::Empty);
        };

        let boundary = DateTime::from_timestamp_micros(latest).context(InvalidInstantSnafu {
            spec: format!("{PDATE}={latest}"),
        })?;
        Ok(Watermark::Resume(ResumePoint {
            boundary,
            truncate: PartitionSpec::new().with(PDATE, PartitionValue::Timestamp(boundary)),
        }))
    }

    fn resolve_hierarchical(
        mut rows: RecordBatch,
        columns: &[&str],
    ) -> Result<Watermark, WatermarkError> {
        let mut spec = PartitionSpec::new();
        let mut components = [0_i64; 4];

        for (level, name) in columns.iter().enumerate() {
            let values = as_int64(column(&rows, name)?.as_ref()).context(WatermarkArrowSnafu)?;
            let Some(highest) = max(&values) else {
                return Ok(Watermark::Empty);
            };
            let value = PartitionValue::Int(highest);
            let matching = equals(column(&rows, name)?, &value).context(WatermarkArrowSnafu)?;
            rows = filter_record_batch(&rows, &matching).context(WatermarkArrowSnafu)?;

            spec.push(*name, value);
            components[level] = highest;
        }

        let [year, month, day, hour] = components;
        let hour = if columns.contains(&HOUR) { hour } else { 0 };
        let boundary = instant(year, month, day, hour).context(InvalidInstantSnafu {
            spec: spec.to_string(),
        })?;
        Ok(Watermark::Resume(ResumePoint {
            boundary,
            truncate: spec,
        }))
    }
}

fn column<'a>(
    rows: &'a RecordBatch,
    name: &str,
) -> Result<&'a deltalake::arrow::array::ArrayRef, WatermarkError> {
    rows.column_by_name(name)
        .context(MissingPartitionColumnSnafu { column: name })
}

fn instant(year: i64, month: i64, day: i64, hour: i64) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
        u32::try_from(hour).ok()?,
        0,
        0,
    )
    .single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionScheme;
    use deltalake::arrow::array::{Array, Int32Array, Int64Array, TimestampMicrosecondArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn ymd(rows: &[(Option<i32>, Option<i32>, Option<i32>)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("y", DataType::Int32, true),
            Field::new("m", DataType::Int32, true),
            Field::new("d", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.0))),
                Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.1))),
                Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.2))),
            ],
        )
        .unwrap()
    }

    fn resume_point(watermark: Watermark) -> ResumePoint {
        match watermark {
            Watermark::Resume(point) => point,
            Watermark::Empty => panic!("expected a resume point"),
        }
    }

    const YMD: ResumeMode = ResumeMode::Hierarchical(PartitionScheme::Ymd);

    #[test]
    fn test_ymd_resolution() {
        let batch = ymd(&[
            (Some(2023), Some(5), Some(1)),
            (Some(2023), Some(6), Some(15)),
            (Some(2024), Some(1), Some(2)),
        ]);
        let point = resume_point(WatermarkResolver::resolve(YMD, &[batch]).unwrap());

        assert_eq!(point.truncate.to_string(), "y=2024,m=1,d=2");
        assert_eq!(point.boundary, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(point.boundary.to_rfc3339(), "2024-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_descent_restricts_before_maximising() {
        // Largest month and day overall belong to earlier years.
        let batch = ymd(&[
            (Some(2022), Some(12), Some(31)),
            (Some(2023), Some(2), Some(28)),
            (Some(2023), Some(1), Some(30)),
            (Some(2023), Some(2), Some(3)),
        ]);
        let point = resume_point(WatermarkResolver::resolve(YMD, &[batch]).unwrap());
        assert_eq!(point.truncate.to_string(), "y=2023,m=2,d=28");
    }

    #[test]
    fn test_rows_split_across_batches() {
        let older = ymd(&[(Some(2024), Some(3), Some(9))]);
        let newer = ymd(&[(Some(2024), Some(3), Some(10)), (Some(2024), Some(2), Some(29))]);
        let point = resume_point(WatermarkResolver::resolve(YMD, &[older, newer]).unwrap());
        assert_eq!(point.truncate.to_string(), "y=2024,m=3,d=10");
    }

    #[test]
    fn test_nulls_are_ignored() {
        let batch = ymd(&[
            (None, Some(12), Some(31)),
            (Some(2024), None, Some(1)),
            (Some(2024), Some(4), Some(7)),
        ]);
        let point = resume_point(WatermarkResolver::resolve(YMD, &[batch]).unwrap());
        assert_eq!(point.truncate.to_string(), "y=2024,m=4,d=7");
    }

    #[test]
    fn test_empty_target() {
        assert_eq!(WatermarkResolver::resolve(YMD, &[]).unwrap(), Watermark::Empty);
        assert_eq!(
            WatermarkResolver::resolve(YMD, &[ymd(&[])]).unwrap(),
            Watermark::Empty
        );
        assert_eq!(
            WatermarkResolver::resolve(YMD, &[ymd(&[(None, None, None)])]).unwrap(),
            Watermark::Empty
        );
    }

    #[test]
    fn test_hourly_resolution() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("y", DataType::Int64, false),
            Field::new("m", DataType::Int64, false),
            Field::new("d", DataType::Int64, false),
            Field::new("h", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![2024, 2024, 2024])),
                Arc::new(Int64Array::from(vec![3, 3, 3])),
                Arc::new(Int64Array::from(vec![9, 10, 10])),
                Arc::new(Int64Array::from(vec![23, 4, 7])),
            ],
        )
        .unwrap();

        let mode = ResumeMode::Hierarchical(PartitionScheme::Ymdh);
        let point = resume_point(WatermarkResolver::resolve(mode, &[batch]).unwrap());
        assert_eq!(point.truncate.to_string(), "y=2024,m=3,d=10,h=7");
        assert_eq!(point.boundary, Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_calendar_date() {
        let batch = ymd(&[(Some(2023), Some(2), Some(30))]);
        let err = WatermarkResolver::resolve(YMD, &[batch]).unwrap_err();
        assert!(matches!(err, WatermarkError::InvalidInstant { .. }));
        assert!(err.to_string().contains("y=2023,m=2,d=30"));
    }

    #[test]
    fn test_pdate_resolution() {
        let ts = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap().timestamp_micros();
        let pdate = TimestampMicrosecondArray::from(vec![Some(ts(3)), None, Some(ts(5)), Some(ts(4))])
            .with_timezone("UTC");
        let schema = Arc::new(Schema::new(vec![Field::new(
            "pdate",
            pdate.data_type().clone(),
            true,
        )]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(pdate)]).unwrap();

        let point = resume_point(WatermarkResolver::resolve(ResumeMode::SingleKey, &[batch]).unwrap());
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(point.boundary, expected);
        assert_eq!(point.truncate.get("pdate"), Some(PartitionValue::Timestamp(expected)));
    }

    #[test]
    fn test_missing_partition_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("y", DataType::Int32, true)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![2024]))])
            .unwrap();
        let err = WatermarkResolver::resolve(YMD, &[batch]).unwrap_err();
        assert!(matches!(err, WatermarkError::MissingPartitionColumn { .. }));
    }
}

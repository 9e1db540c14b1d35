//! Target-driven reshaping of capture records.
//!
//! The target schema decides everything. Columns the capture batch already
//! carries under a target column name are copied verbatim after a type check.
//! When the payload column itself is one of those, it passes through as an
//! opaque value. Otherwise every remaining target column is decoded from the
//! payload.

mod decode;

pub use decode::{JsonPayloadDecoder, PayloadDecoder};

use std::sync::Arc;

use deltalake::arrow::array::{ArrayRef, RecordBatch};
use deltalake::arrow::compute::cast;
use deltalake::arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    MissingPayloadColumnSnafu, PayloadDecodeSnafu, ReconcileArrowSnafu, ReconcileError,
    TypeMismatchSnafu,
};

/// How the payload column is treated.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadHandling {
    /// The payload is itself a target column and is copied unchanged.
    PassThrough,
    /// Target columns missing from the capture batch are decoded from the payload.
    Decode { residual: SchemaRef },
}

/// Column classification for one capture schema against one target schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    /// Target fields present in the capture batch, in target order.
    pub direct: Vec<FieldRef>,
    pub payload: PayloadHandling,
    /// Name of the raw payload text column, when retained.
    pub raw: Option<String>,
}

impl ReconcilePlan {
    /// Schema of the reconciled output: decoded fields, direct fields, then
    /// the raw payload column. Every output field is nullable.
    pub fn output_schema(&self) -> SchemaRef {
        let decoded = match &self.payload {
            PayloadHandling::PassThrough => Vec::new(),
            PayloadHandling::Decode { residual } => residual.fields().iter().cloned().collect(),
        };
        let mut fields: Vec<Field> = decoded
            .iter()
            .chain(&self.direct)
            .map(|f| Field::new(f.name(), f.data_type().clone(), true))
            .collect();
        if let Some(raw) = &self.raw {
            fields.push(Field::new(raw, DataType::Utf8, true));
        }
        Arc::new(Schema::new(fields))
    }
}

/// Reshapes capture batches to a target schema.
#[derive(Debug)]
pub struct SchemaReconciler {
    payload_column: String,
    raw_payload_column: Option<String>,
    decoder: Box<dyn PayloadDecoder>,
}

impl SchemaReconciler {
    /// A reconciler decoding JSON from `payload_column`.
    pub fn new(payload_column: impl Into<String>) -> Self {
        Self {
            payload_column: payload_column.into(),
            raw_payload_column: None,
            decoder: Box::new(JsonPayloadDecoder),
        }
    }

    /// Also emit the undecoded payload as text in `column`.
    pub fn with_raw_payload(mut self, column: impl Into<String>) -> Self {
        self.raw_payload_column = Some(column.into());
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn PayloadDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn payload_column(&self) -> &str {
        &self.payload_column
    }

    /// Classify target columns against a capture schema.
    ///
    /// Fails when a direct column's type differs between the two schemas, or
    /// when the payload is needed but absent from the capture schema.
    pub fn plan(
        &self,
        table: &str,
        source: &Schema,
        target: &Schema,
    ) -> Result<ReconcilePlan, ReconcileError> {
        let raw = self.raw_payload_column.as_deref();
        let mut direct = Vec::new();
        let mut residual = Vec::new();

        for field in target.fields().iter().filter(|f| Some(f.name().as_str()) != raw) {
            match source.field_with_name(field.name()) {
                Ok(captured) => {
                    ensure!(
                        captured.data_type() == field.data_type(),
                        TypeMismatchSnafu {
                            table,
                            column: field.name(),
                            expected: field.data_type().clone(),
                            actual: captured.data_type().clone(),
                        }
                    );
                    direct.push(field.clone());
                }
                Err(_) => residual.push(Field::new(field.name(), field.data_type().clone(), true)),
            }
        }

        let has_payload = source.field_with_name(&self.payload_column).is_ok();
        let payload = if direct.iter().any(|f| f.name() == &self.payload_column) {
            PayloadHandling::PassThrough
        } else {
            ensure!(
                has_payload || residual.is_empty(),
                MissingPayloadColumnSnafu {
                    table,
                    column: &self.payload_column,
                }
            );
            PayloadHandling::Decode {
                residual: Arc::new(Schema::new(residual)),
            }
        };
        ensure!(
            has_payload || raw.is_none(),
            MissingPayloadColumnSnafu {
                table,
                column: &self.payload_column,
            }
        );

        Ok(ReconcilePlan {
            direct,
            payload,
            raw: raw.map(str::to_string),
        })
    }

    /// Reshape `batch` to the columns of `target`.
    pub fn reconcile(
        &self,
        table: &str,
        batch: &RecordBatch,
        target: &Schema,
    ) -> Result<RecordBatch, ReconcileError> {
        let plan = self.plan(table, &batch.schema(), target)?;
        let schema = plan.output_schema();
        if batch.num_rows() == 0 {
            return Ok(RecordBatch::new_empty(schema));
        }

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        if let PayloadHandling::Decode { residual } = &plan.payload
            && !residual.fields().is_empty()
        {
            let decoded = self.decoder.decode(self.payload(table, batch)?.as_ref(), residual.clone())?;
            ensure!(
                decoded.num_rows() == batch.num_rows(),
                PayloadDecodeSnafu {
                    message: format!(
                        "decoder returned {} rows for {} payloads",
                        decoded.num_rows(),
                        batch.num_rows()
                    ),
                }
            );
            columns.extend(decoded.columns().iter().cloned());
        }
        for field in &plan.direct {
            // Present by construction of the plan.
            if let Some(column) = batch.column_by_name(field.name()) {
                columns.push(column.clone());
            }
        }
        if plan.raw.is_some() {
            let raw = cast(self.payload(table, batch)?.as_ref(), &DataType::Utf8)
                .context(ReconcileArrowSnafu)?;
            columns.push(raw);
        }

        debug!(
            target = %table,
            rows = batch.num_rows(),
            direct = plan.direct.len(),
            decoded = matches!(plan.payload, PayloadHandling::Decode { .. }),
            "Reconciled capture batch"
        );
        RecordBatch::try_new(schema, columns).context(ReconcileArrowSnafu)
    }

    fn payload<'a>(
        &self,
        table: &str,
        batch: &'a RecordBatch,
    ) -> Result<&'a ArrayRef, ReconcileError> {
        batch
            .column_by_name(&self.payload_column)
            .context(MissingPayloadColumnSnafu {
                table,
                column: &self.payload_column,
            })
    }
}

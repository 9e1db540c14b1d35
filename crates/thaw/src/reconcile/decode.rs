//! Structured payload decoding.

use std::fmt::Debug;

use deltalake::arrow::array::{Array, AsArray, RecordBatch};
use deltalake::arrow::compute::{cast, concat_batches};
use deltalake::arrow::datatypes::{DataType, SchemaRef};
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::error::{MalformedPayloadSnafu, PayloadDecodeSnafu, ReconcileArrowSnafu, ReconcileError};
use crate::source::{coerce_object_fields, decode_rows};

/// Decodes an opaque payload column into structured columns.
pub trait PayloadDecoder: Debug + Send + Sync {
    /// Decode `payload` against `schema`, producing one row per payload row.
    fn decode(&self, payload: &dyn Array, schema: SchemaRef) -> Result<RecordBatch, ReconcileError>;
}

/// Decodes payloads holding one JSON object per row.
///
/// Null payloads decode to all-null rows and unknown keys are ignored. Any
/// payload that is not a JSON object fails the whole batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadDecoder;

impl PayloadDecoder for JsonPayloadDecoder {
    fn decode(&self, payload: &dyn Array, schema: SchemaRef) -> Result<RecordBatch, ReconcileError> {
        let text = cast(payload, &DataType::Utf8).context(ReconcileArrowSnafu)?;
        let text = text.as_string::<i32>();

        let mut rows = Vec::with_capacity(text.len());
        for (row, value) in text.iter().enumerate() {
            let Some(value) = value else {
                rows.push(Value::Object(Map::new()));
                continue;
            };
            let mut parsed: Value = serde_json::from_str(value).map_err(|e| {
                ReconcileError::MalformedPayload {
                    row,
                    message: e.to_string(),
                }
            })?;
            let Value::Object(obj) = &mut parsed else {
                return MalformedPayloadSnafu {
                    row,
                    message: "expected a JSON object",
                }
                .fail();
            };
            coerce_object_fields(obj, schema.fields());
            rows.push(parsed);
        }

        if rows.is_empty() {
            return Ok(RecordBatch::new_empty(schema));
        }
        let batches = decode_rows(&schema, &rows, rows.len())
            .map_err(|message| PayloadDecodeSnafu { message }.build())?;
        concat_batches(&schema, &batches).context(ReconcileArrowSnafu)
    }
}

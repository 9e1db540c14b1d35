//! NDJSON capture file reader.
//!
//! Each line is parsed with serde_json, objects and arrays found in string
//! typed fields are re-serialised to JSON text, and the rows are handed to
//! Arrow's JSON decoder. Capture archives routinely carry nested documents in
//! fields declared as strings (`SystemProperties`, `Properties`), which the
//! Arrow decoder alone rejects.

use std::io::BufRead;

use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::{DataType, Fields, SchemaRef};
use deltalake::arrow::json::ReaderBuilder;
use serde_json::{Map, Value};
use snafu::prelude::*;
use tracing::debug;

use super::compression::CompressionFormat;
use crate::error::{DecompressionSnafu, JsonDecodeSnafu, SourceError};

/// Decodes NDJSON files against a fixed schema.
#[derive(Debug, Clone)]
pub struct NdjsonReader {
    schema: SchemaRef,
    batch_size: usize,
    compression: CompressionFormat,
}

impl NdjsonReader {
    pub fn new(schema: SchemaRef, batch_size: usize, compression: CompressionFormat) -> Self {
        Self {
            schema,
            batch_size: batch_size.max(1),
            compression,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Decode one (possibly compressed) file.
    pub fn read(&self, data: &[u8], path: &str) -> Result<Vec<RecordBatch>, SourceError> {
        let mut rows = Vec::new();
        for (line_num, line) in self.compression.reader(data).lines().enumerate() {
            let line = line.context(DecompressionSnafu { path })?;
            if line.trim().is_empty() {
                continue;
            }

            let mut value: Value =
                serde_json::from_str(&line).map_err(|e| SourceError::JsonDecode {
                    path: path.to_string(),
                    message: format!("line {}: {e}", line_num + 1),
                })?;
            match value {
                Value::Object(ref mut obj) => coerce_object_fields(obj, self.schema.fields()),
                _ => {
                    return JsonDecodeSnafu {
                        path,
                        message: format!("line {}: expected a JSON object", line_num + 1),
                    }
                    .fail();
                }
            }
            rows.push(value);
        }

        let batches = decode_rows(&self.schema, &rows, self.batch_size).map_err(|message| {
            SourceError::JsonDecode {
                path: path.to_string(),
                message,
            }
        })?;
        debug!(
            path,
            records = rows.len(),
            batches = batches.len(),
            compression = self.compression.name(),
            "Decoded capture file"
        );
        Ok(batches)
    }
}

/// Decode parsed JSON rows into batches of at most `batch_size` rows.
///
/// Keys absent from the schema are ignored.
pub(crate) fn decode_rows(
    schema: &SchemaRef,
    rows: &[Value],
    batch_size: usize,
) -> Result<Vec<RecordBatch>, String> {
    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(batch_size)
        .with_strict_mode(false)
        .build_decoder()
        .map_err(|e| e.to_string())?;

    let mut batches = Vec::new();
    for chunk in rows.chunks(batch_size) {
        decoder.serialize(chunk).map_err(|e| e.to_string())?;
        if let Some(batch) = decoder.flush().map_err(|e| e.to_string())? {
            batches.push(batch);
        }
    }
    Ok(batches)
}

/// Stringify objects and arrays found where `fields` expect text.
pub(crate) fn coerce_object_fields(obj: &mut Map<String, Value>, fields: &Fields) {
    for field in fields.iter() {
        if let Some(value) = obj.get_mut(field.name()) {
            coerce_value_for_field(value, field.data_type());
        }
    }
}

fn coerce_value_for_field(value: &mut Value, data_type: &DataType) {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => match value {
            Value::String(_) | Value::Null => {}
            Value::Number(n) => *value = Value::String(n.to_string()),
            Value::Bool(b) => *value = Value::String(b.to_string()),
            Value::Object(_) | Value::Array(_) => *value = Value::String(value.to_string()),
        },
        DataType::Struct(fields) => {
            if let Value::Object(obj) = value {
                coerce_object_fields(obj, fields);
            }
        }
        DataType::List(field) | DataType::LargeList(field) => {
            if let Value::Array(items) = value {
                for item in items.iter_mut() {
                    coerce_value_for_field(item, field.data_type());
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::{AsArray, Int64Array};
    use deltalake::arrow::datatypes::{Field, Int64Type, Schema};
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    fn make_schema(fields: Vec<(&str, DataType)>) -> SchemaRef {
        Arc::new(Schema::new(
            fields
                .into_iter()
                .map(|(name, dt)| Field::new(name, dt, true))
                .collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn test_coerce_object_to_string() {
        let schema = make_schema(vec![("data", DataType::Utf8)]);
        let mut obj = Map::new();
        obj.insert("data".to_string(), json!({"nested": "value"}));

        coerce_object_fields(&mut obj, schema.fields());

        assert_eq!(obj["data"], json!(r#"{"nested":"value"}"#));
    }

    #[test]
    fn test_coerce_scalars_to_string() {
        let schema = make_schema(vec![("n", DataType::Utf8), ("b", DataType::Utf8)]);
        let mut obj = Map::new();
        obj.insert("n".to_string(), json!(0.25));
        obj.insert("b".to_string(), json!(true));

        coerce_object_fields(&mut obj, schema.fields());

        assert_eq!(obj["n"], json!("0.25"));
        assert_eq!(obj["b"], json!("true"));
    }

    #[test]
    fn test_coerce_preserves_non_utf8_types() {
        let schema = make_schema(vec![("id", DataType::Int64), ("ok", DataType::Boolean)]);
        let mut obj = Map::new();
        obj.insert("id".to_string(), json!(42));
        obj.insert("ok".to_string(), json!(true));

        coerce_object_fields(&mut obj, schema.fields());

        assert_eq!(obj["id"], json!(42));
        assert_eq!(obj["ok"], json!(true));
    }

    #[test]
    fn test_coerce_nested_struct_and_list() {
        let inner = Fields::from(vec![Field::new("meta", DataType::Utf8, true)]);
        let schema = make_schema(vec![
            ("user", DataType::Struct(inner)),
            (
                "tags",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            ),
        ]);
        let mut obj = Map::new();
        obj.insert("user".to_string(), json!({"meta": {"role": "admin"}}));
        obj.insert("tags".to_string(), json!(["a", {"b": 1}]));

        coerce_object_fields(&mut obj, schema.fields());

        assert!(obj["user"]["meta"].is_string());
        assert_eq!(obj["tags"][1], json!(r#"{"b":1}"#));
    }

    #[test]
    fn test_read_plain_with_nested_properties() {
        let schema = make_schema(vec![
            ("SequenceNumber", DataType::Int64),
            ("Properties", DataType::Utf8),
        ]);
        let reader = NdjsonReader::new(schema, 1024, CompressionFormat::None);
        let data = b"{\"SequenceNumber\": 1, \"Properties\": {\"k\": \"v\"}}\n\n{\"SequenceNumber\": 2, \"Properties\": \"x\", \"Extra\": 1}\n";

        let batches = reader.read(data, "events.json").unwrap();

        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        let seq = batch.column(0).as_primitive::<Int64Type>();
        assert_eq!(seq, &Int64Array::from(vec![1, 2]));
        let props = batch.column(1).as_string::<i32>();
        assert_eq!(props.value(0), r#"{"k":"v"}"#);
        assert_eq!(props.value(1), "x");
    }

    #[test]
    fn test_read_gzip_respects_batch_size() {
        let schema = make_schema(vec![("id", DataType::Int64)]);
        let reader = NdjsonReader::new(schema, 2, CompressionFormat::Gzip);
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        for i in 0..5 {
            writeln!(encoder, "{{\"id\": {i}}}").unwrap();
        }
        let data = encoder.finish().unwrap();

        let batches = reader.read(&data, "part.json.gz").unwrap();

        let sizes: Vec<_> = batches.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_read_invalid_json_names_line() {
        let schema = make_schema(vec![("id", DataType::Int64)]);
        let reader = NdjsonReader::new(schema, 16, CompressionFormat::None);

        let err = reader.read(b"{\"id\": 1}\n{oops\n", "bad.json").unwrap_err();

        match err {
            SourceError::JsonDecode { path, message } => {
                assert_eq!(path, "bad.json");
                assert!(message.starts_with("line 2"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_rejects_non_object_lines() {
        let schema = make_schema(vec![("id", DataType::Int64)]);
        let reader = NdjsonReader::new(schema, 16, CompressionFormat::None);

        assert!(reader.read(b"[1, 2]\n", "array.json").is_err());
    }

    #[test]
    fn test_read_corrupt_gzip_is_decompression_error() {
        let schema = make_schema(vec![("id", DataType::Int64)]);
        let reader = NdjsonReader::new(schema, 16, CompressionFormat::Gzip);

        let err = reader.read(b"not gzip at all", "bad.json.gz").unwrap_err();

        assert!(matches!(err, SourceError::Decompression { .. }));
    }
}

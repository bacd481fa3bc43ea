//! Iceberg table metadata model and type mapping from Iceberg types to Arrow types

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Fields, Schema, TimeUnit};
use object_store::ObjectStore;
use object_store::path::Path;
use serde::Deserialize;
use url::Url;

use crate::{Result, SyncError};

/// Arrow field metadata key carrying the Iceberg field id
pub const FIELD_ID_META_KEY: &str = "PARQUET:field_id";

/// Subset of an Iceberg `*.metadata.json` document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub format_version: i32,
    /// Absent in some format v1 files
    pub table_uuid: Option<String>,
    pub location: String,
    pub current_schema_id: Option<i32>,
    #[serde(default)]
    pub schemas: Vec<IcebergSchema>,
    /// Format v1 single schema
    pub schema: Option<IcebergSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IcebergSchema {
    #[serde(default)]
    pub schema_id: i32,
    pub fields: Vec<NestedField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: IcebergType,
}

/// Either a primitive type name (`long`, `decimal(10,2)`) or a nested type object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IcebergType {
    Primitive(String),
    Nested(NestedType),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NestedType {
    Struct {
        fields: Vec<NestedField>,
    },
    List {
        #[serde(rename = "element-id")]
        element_id: i32,
        element: Box<IcebergType>,
        #[serde(rename = "element-required")]
        element_required: bool,
    },
    Map {
        #[serde(rename = "key-id")]
        key_id: i32,
        key: Box<IcebergType>,
        #[serde(rename = "value-id")]
        value_id: i32,
        value: Box<IcebergType>,
        #[serde(rename = "value-required")]
        value_required: bool,
    },
}

impl TableMetadata {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read and parse the metadata file at `location` (`scheme://bucket/key`).
    pub async fn load(store: &dyn ObjectStore, location: &str) -> Result<Self> {
        let url = Url::parse(location)?;
        let path = Path::from_url_path(url.path().trim_start_matches('/'))
            .map_err(object_store::Error::from)?;
        let bytes = store.get(&path).await?.bytes().await?;
        Self::from_json(&bytes)
    }

    /// The schema tables are currently read with.
    pub fn current_schema(&self) -> Result<&IcebergSchema> {
        if let Some(current_id) = self.current_schema_id
            && let Some(schema) = self.schemas.iter().find(|s| s.schema_id == current_id)
        {
            return Ok(schema);
        }
        self.schema
            .as_ref()
            .or_else(|| self.schemas.last())
            .ok_or_else(|| {
                SyncError::InvalidMetadata(format!(
                    "table at {} has no current schema",
                    self.location
                ))
            })
    }

    /// Arrow view of the current schema.
    ///
    /// Columns whose Iceberg type has no Arrow mapping are left out with a
    /// warning, so the table can still be registered.
    pub fn arrow_schema(&self) -> Result<Schema> {
        let schema = self.current_schema()?;
        let mut fields = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            match build_field(field) {
                Ok(arrow_field) => fields.push(arrow_field),
                Err(SyncError::UnsupportedType(iceberg_type)) => {
                    tracing::warn!(
                        location = %self.location,
                        column = %field.name,
                        iceberg_type = %iceberg_type,
                        "column type has no Arrow mapping, omitting it from the schema"
                    );
                },
                Err(e) => return Err(e),
            }
        }
        Ok(Schema::new(fields))
    }
}

/// Convert an Iceberg primitive type name to an Arrow DataType
pub fn iceberg_primitive_to_arrow_type(iceberg_type: &str) -> Result<DataType> {
    let normalized = iceberg_type.trim().to_lowercase();

    if let Some(decimal) = parse_decimal(&normalized) {
        return Ok(decimal);
    }
    if let Some(length) = parse_fixed(&normalized) {
        return Ok(DataType::FixedSizeBinary(length));
    }

    match normalized.as_str() {
        "boolean" => Ok(DataType::Boolean),
        "int" => Ok(DataType::Int32),
        "long" => Ok(DataType::Int64),
        "float" => Ok(DataType::Float32),
        "double" => Ok(DataType::Float64),

        "date" => Ok(DataType::Date32),
        "time" => Ok(DataType::Time64(TimeUnit::Microsecond)),
        "timestamp" => Ok(DataType::Timestamp(TimeUnit::Microsecond, None)),
        "timestamptz" => Ok(DataType::Timestamp(
            TimeUnit::Microsecond,
            Some("+00:00".into()),
        )),
        "timestamp_ns" => Ok(DataType::Timestamp(TimeUnit::Nanosecond, None)),
        "timestamptz_ns" => Ok(DataType::Timestamp(
            TimeUnit::Nanosecond,
            Some("+00:00".into()),
        )),

        "string" => Ok(DataType::Utf8),
        "uuid" => Ok(DataType::FixedSizeBinary(16)),
        "binary" => Ok(DataType::Binary),

        _ => Err(SyncError::UnsupportedType(iceberg_type.to_string())),
    }
}

/// Convert an Iceberg type (primitive or nested) to an Arrow DataType
pub fn iceberg_to_arrow_type(iceberg_type: &IcebergType) -> Result<DataType> {
    match iceberg_type {
        IcebergType::Primitive(name) => iceberg_primitive_to_arrow_type(name),
        IcebergType::Nested(NestedType::Struct { fields }) => {
            let fields = fields
                .iter()
                .map(build_field)
                .collect::<Result<Vec<_>>>()?;
            Ok(DataType::Struct(Fields::from(fields)))
        },
        IcebergType::Nested(NestedType::List {
            element_id,
            element,
            element_required,
        }) => {
            let element = with_field_id(
                Field::new("element", iceberg_to_arrow_type(element)?, !element_required),
                *element_id,
            );
            Ok(DataType::List(Arc::new(element)))
        },
        IcebergType::Nested(NestedType::Map {
            key_id,
            key,
            value_id,
            value,
            value_required,
        }) => {
            let key = with_field_id(Field::new("key", iceberg_to_arrow_type(key)?, false), *key_id);
            let value = with_field_id(
                Field::new("value", iceberg_to_arrow_type(value)?, !value_required),
                *value_id,
            );
            let entries = Field::new(
                "key_value",
                DataType::Struct(Fields::from(vec![key, value])),
                false,
            );
            Ok(DataType::Map(Arc::new(entries), false))
        },
    }
}

/// Parse decimal type with precision and scale
/// Format: "decimal(precision, scale)"
fn parse_decimal(type_str: &str) -> Option<DataType> {
    let params = type_str
        .strip_prefix("decimal")?
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    let (precision, scale) = params.split_once(',')?;
    let precision: u8 = precision.trim().parse().ok()?;
    let scale: i8 = scale.trim().parse().ok()?;
    Some(DataType::Decimal128(precision, scale))
}

/// Parse fixed-length binary. Format: "fixed[length]"
fn parse_fixed(type_str: &str) -> Option<i32> {
    type_str
        .strip_prefix("fixed")?
        .trim()
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim()
        .parse()
        .ok()
}

fn with_field_id(field: Field, id: i32) -> Field {
    field.with_metadata(HashMap::from([(
        FIELD_ID_META_KEY.to_string(),
        id.to_string(),
    )]))
}

fn build_field(field: &NestedField) -> Result<Field> {
    let data_type = iceberg_to_arrow_type(&field.field_type)?;
    Ok(with_field_id(
        Field::new(&field.name, data_type, !field.required),
        field.id,
    ))
}

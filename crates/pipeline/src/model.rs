//! Target model registry for the PostgreSQL backend.
//!
//! Each entity configuration names a `target_model`. The registry maps that
//! identifier to a [`PgTargetModel`] implementation, populated once at
//! start-up instead of being resolved per record.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use syncbridge_core::error::CoreError;
use syncbridge_core::naming::validate_identifier;
use syncbridge_core::record::TargetFields;
use syncbridge_core::types::Timestamp;

use crate::error::StoreError;

/// Create, read and update operations for one target record type.
#[async_trait]
pub trait PgTargetModel: Send + Sync {
    /// Identifier referenced by `MappingConfig::target_model`.
    fn name(&self) -> &str;

    /// Insert a record and return its id.
    async fn create(&self, conn: &mut PgConnection, fields: &TargetFields)
        -> Result<String, StoreError>;

    async fn get_by_id(
        &self,
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<TargetFields>, StoreError>;

    /// Overwrite `fields` on record `id`. [`StoreError::NotFound`] if absent.
    async fn update(
        &self,
        conn: &mut PgConnection,
        id: &str,
        fields: &TargetFields,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Column-mapped table model
// ---------------------------------------------------------------------------

/// Storage type of a writable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Json,
    Timestamp,
}

/// A JSON field value coerced to its column's type.
#[derive(Debug, Clone, PartialEq)]
enum ColumnValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Float(Option<f64>),
    Boolean(Option<bool>),
    Json(Option<Value>),
    Timestamp(Option<Timestamp>),
}

impl ColumnKind {
    fn coerce(self, column: &str, value: &Value) -> Result<ColumnValue, StoreError> {
        let mismatch = |expected: &str| {
            StoreError::Rejected(format!(
                "Column '{column}' expects {expected}, got {value}"
            ))
        };
        if value.is_null() {
            return Ok(match self {
                Self::Text => ColumnValue::Text(None),
                Self::Integer => ColumnValue::Integer(None),
                Self::Float => ColumnValue::Float(None),
                Self::Boolean => ColumnValue::Boolean(None),
                Self::Json => ColumnValue::Json(None),
                Self::Timestamp => ColumnValue::Timestamp(None),
            });
        }
        let coerced = match self {
            Self::Text => ColumnValue::Text(Some(match value {
                Value::String(s) => s.clone(),
                Value::Number(_) | Value::Bool(_) => value.to_string(),
                _ => return Err(mismatch("text")),
            })),
            Self::Integer => {
                let n = match value {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().and_then(integral_f64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                ColumnValue::Integer(Some(n.ok_or_else(|| mismatch("an integer"))?))
            }
            Self::Float => {
                let n = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                ColumnValue::Float(Some(n.ok_or_else(|| mismatch("a number"))?))
            }
            Self::Boolean => match value {
                Value::Bool(b) => ColumnValue::Boolean(Some(*b)),
                _ => return Err(mismatch("a boolean")),
            },
            Self::Json => ColumnValue::Json(Some(value.clone())),
            Self::Timestamp => {
                let parsed = value
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                ColumnValue::Timestamp(Some(parsed.ok_or_else(|| mismatch("an RFC 3339 timestamp"))?))
            }
        };
        Ok(coerced)
    }
}

/// `f` as an `i64` when it is integral and within range.
///
/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn integral_f64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: ColumnValue) {
    match value {
        ColumnValue::Text(v) => builder.push_bind(v),
        ColumnValue::Integer(v) => builder.push_bind(v),
        ColumnValue::Float(v) => builder.push_bind(v),
        ColumnValue::Boolean(v) => builder.push_bind(v),
        ColumnValue::Json(v) => builder.push_bind(v.map(sqlx::types::Json)),
        ColumnValue::Timestamp(v) => builder.push_bind(v),
    };
}

/// Target model backed by one table with a `BIGSERIAL id` primary key and a
/// whitelisted set of writable columns.
///
/// Transformed fields that name an undeclared column reject the record.
#[derive(Debug, Clone)]
pub struct ColumnTableModel {
    name: String,
    table: String,
    columns: IndexMap<String, ColumnKind>,
    updated_at_column: Option<String>,
}

impl ColumnTableModel {
    pub fn new(name: &str, table: &str) -> Result<Self, CoreError> {
        validate_identifier("target model", name)?;
        validate_identifier("table", table)?;
        Ok(Self {
            name: name.to_string(),
            table: table.to_string(),
            columns: IndexMap::new(),
            updated_at_column: None,
        })
    }

    /// Declare a writable column.
    pub fn column(mut self, column: &str, kind: ColumnKind) -> Result<Self, CoreError> {
        validate_identifier("column", column)?;
        if column == "id" {
            return Err(CoreError::Validation(
                "Column 'id' is managed by the database".to_string(),
            ));
        }
        if self.columns.insert(column.to_string(), kind).is_some() {
            return Err(CoreError::Conflict(format!(
                "Column '{column}' declared twice on model '{}'",
                self.name
            )));
        }
        Ok(self)
    }

    /// Column set to `now()` on every update.
    pub fn touching(mut self, column: &str) -> Result<Self, CoreError> {
        validate_identifier("column", column)?;
        self.updated_at_column = Some(column.to_string());
        Ok(self)
    }

    /// Pair each transformed field with its declared column, in field order.
    fn bind_values<'f>(
        &self,
        fields: &'f TargetFields,
    ) -> Result<Vec<(&'f str, ColumnValue)>, StoreError> {
        fields
            .iter()
            .map(|(field, value)| {
                let kind = self.columns.get(field).ok_or_else(|| {
                    StoreError::Rejected(format!(
                        "Model '{}' has no column '{field}'",
                        self.name
                    ))
                })?;
                Ok((field.as_str(), kind.coerce(field, value)?))
            })
            .collect()
    }

    fn insert_query(&self, values: Vec<(&str, ColumnValue)>) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!("INSERT INTO {} ", self.table));
        if values.is_empty() {
            builder.push("DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
            builder.push(format!("({}) VALUES (", columns.join(", ")));
            let mut separated = false;
            for (_, value) in values {
                if separated {
                    builder.push(", ");
                }
                push_value(&mut builder, value);
                separated = true;
            }
            builder.push(")");
        }
        builder.push(" RETURNING id::text");
        builder
    }

    fn update_query(
        &self,
        id: i64,
        values: Vec<(&str, ColumnValue)>,
    ) -> Option<QueryBuilder<'static, Postgres>> {
        if values.is_empty() && self.updated_at_column.is_none() {
            return None;
        }
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", self.table));
        let mut separated = false;
        for (column, value) in values {
            if separated {
                builder.push(", ");
            }
            builder.push(format!("{column} = "));
            push_value(&mut builder, value);
            separated = true;
        }
        if let Some(column) = &self.updated_at_column {
            if separated {
                builder.push(", ");
            }
            builder.push(format!("{column} = now()"));
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        Some(builder)
    }
}

/// Target ids are stringified `BIGSERIAL` values; anything else cannot exist.
fn parse_id(id: &str) -> Option<i64> {
    id.trim().parse().ok()
}

#[async_trait]
impl PgTargetModel for ColumnTableModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(
        &self,
        conn: &mut PgConnection,
        fields: &TargetFields,
    ) -> Result<String, StoreError> {
        let values = self.bind_values(fields)?;
        let mut query = self.insert_query(values);
        let id = query
            .build_query_scalar::<String>()
            .fetch_one(&mut *conn)
            .await?;
        Ok(id)
    }

    async fn get_by_id(
        &self,
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<TargetFields>, StoreError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let query = format!("SELECT to_jsonb(t) FROM {} t WHERE t.id = $1", self.table);
        let row: Option<Value> = sqlx::query_scalar(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            None => Ok(None),
            Some(Value::Object(fields)) => Ok(Some(fields)),
            Some(other) => Err(StoreError::Rejected(format!(
                "Unexpected row shape from '{}': {other}",
                self.table
            ))),
        }
    }

    async fn update(
        &self,
        conn: &mut PgConnection,
        id: &str,
        fields: &TargetFields,
    ) -> Result<(), StoreError> {
        let not_found = || StoreError::NotFound(format!("{} record '{id}'", self.name));
        let record_id = parse_id(id).ok_or_else(not_found)?;
        let values = self.bind_values(fields)?;
        let Some(mut query) = self.update_query(record_id, values) else {
            return match self.get_by_id(&mut *conn, id).await? {
                Some(_) => Ok(()),
                None => Err(not_found()),
            };
        };
        let result = query.build().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Target model identifier -> implementation.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn PgTargetModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model. Each identifier may be registered once.
    pub fn register(&mut self, model: Arc<dyn PgTargetModel>) -> Result<(), CoreError> {
        let name = model.name().to_string();
        if self.models.contains_key(&name) {
            return Err(CoreError::Conflict(format!(
                "Target model '{name}' is already registered"
            )));
        }
        self.models.insert(name, model);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PgTargetModel>> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Registry with the `customers` and `products` tables shipped in the
/// migrations.
pub fn builtin_models() -> Result<ModelRegistry, CoreError> {
    let customers = ColumnTableModel::new("customers", "customers")?
        .column("customer_number", ColumnKind::Text)?
        .column("name", ColumnKind::Text)?
        .column("email", ColumnKind::Text)?
        .column("phone", ColumnKind::Text)?
        .column("credit_limit", ColumnKind::Float)?
        .column("is_active", ColumnKind::Boolean)?
        .touching("updated_at")?;
    let products = ColumnTableModel::new("products", "products")?
        .column("product_sku", ColumnKind::Text)?
        .column("name", ColumnKind::Text)?
        .column("description", ColumnKind::Text)?
        .column("price", ColumnKind::Float)?
        .column("stock", ColumnKind::Integer)?
        .column("is_active", ColumnKind::Boolean)?
        .column("attributes", ColumnKind::Json)?
        .column("released_at", ColumnKind::Timestamp)?
        .touching("updated_at")?;

    let mut registry = ModelRegistry::new();
    registry.register(Arc::new(customers))?;
    registry.register(Arc::new(products))?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

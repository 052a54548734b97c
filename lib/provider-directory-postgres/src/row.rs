//! Conversion of PostgreSQL rows into attribute items.
//!
//! Every non-null column becomes an attribute named after the column, typed
//! by its PostgreSQL type. The directory decides whether the resulting item
//! is a valid provider record; this module only reports what is stored.

use provider_directory::{Item, StorageError, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

/// Convert a row into an `Item`, omitting NULL columns.
pub fn row_to_item(row: &PgRow) -> Result<Item, StorageError> {
    let mut item = Item::new();

    for (idx, col) in row.columns().iter().enumerate() {
        if let Some(value) = extract_column_value(row, idx, col.type_info().name())? {
            item.insert(col.name(), value);
        }
    }

    Ok(item)
}

/// Extract a column value, or `None` for NULL.
fn extract_column_value(
    row: &PgRow,
    idx: usize,
    type_name: &str,
) -> Result<Option<Value>, StorageError> {
    let value = match type_name {
        "BYTEA" => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        "INT2" => get::<i16>(row, idx)?.map(|n| Value::Number(n.into())),
        "INT4" => get::<i32>(row, idx)?.map(|n| Value::Number(n.into())),
        "INT8" => get::<i64>(row, idx)?.map(Value::Number),
        "BOOL" => get::<bool>(row, idx)?.map(Value::Bool),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => get::<String>(row, idx)?.map(Value::String),
        other => {
            return Err(StorageError::Backend(format!(
                "unsupported column type {} at index {}",
                other, idx
            )));
        }
    };

    Ok(value)
}

fn get<T>(row: &PgRow, idx: usize) -> Result<Option<T>, StorageError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(|e| StorageError::Backend(e.to_string()))
}

//! Source side of [`MysqlStore`].

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Row, Value};
use tracing::debug;

use super::MysqlStore;
use crate::core::identifier::quote_ident;
use crate::core::traits::SourceReader;
use crate::core::value::SourceRow;
use crate::error::{MigrateError, Result};

/// Render a MySQL value as text; `NULL` becomes `None`.
pub fn stringify_value(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let base = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            Some(if *micros > 0 {
                format!("{}.{:06}", base, micros)
            } else {
                base
            })
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let base = format!(
                "{}{:02}:{:02}:{:02}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            Some(if *micros > 0 {
                format!("{}.{:06}", base, micros)
            } else {
                base
            })
        }
    }
}

fn row_to_source(row: &Row) -> SourceRow {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = row.as_ref(idx).and_then(stringify_value);
            (column.name_str().into_owned(), value)
        })
        .collect()
}

#[async_trait]
impl SourceReader for MysqlStore {
    async fn get_all(&self, table: &str) -> Result<Vec<SourceRow>> {
        let sql = format!("select * from {}", quote_ident(table)?);
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::store(e, format!("reading {}", table)))?;
        let rows: Vec<Row> = conn
            .query(sql.as_str())
            .await
            .map_err(|e| MigrateError::store(e, sql.clone()))?;
        debug!("{}: fetched {} rows from {}", self.label, rows.len(), table);
        Ok(rows.iter().map(row_to_source).collect())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }
}

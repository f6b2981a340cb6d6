//! Target side of [`MysqlStore`].

use async_trait::async_trait;
use mysql_async::prelude::*;
use tracing::debug;

use super::{MysqlStore, StoreAccess};
use crate::core::identifier::quote_ident;
use crate::core::statement::Statement;
use crate::core::traits::TargetStore;
use crate::core::value::FormattedRow;
use crate::error::{MigrateError, Result};

/// `select 1 from <table> where <pk> = <literal> limit 1`
pub fn exists_query(table: &str, pk_field: &str, pk_value: &str) -> Result<String> {
    Ok(format!(
        "select 1 from {} where {} = {} limit 1",
        quote_ident(table)?,
        quote_ident(pk_field)?,
        pk_value
    ))
}

/// `select 1 from <table> where <f1> = <v1> and ... limit 1`
pub fn match_query(table: &str, row: &FormattedRow) -> Result<String> {
    let mut conditions = Vec::with_capacity(row.len());
    for (field, literal) in row.iter() {
        conditions.push(format!("{} = {}", quote_ident(field)?, literal));
    }
    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!(" where {}", conditions.join(" and "))
    };
    Ok(format!("select 1 from {}{} limit 1", quote_ident(table)?, filter))
}

impl MysqlStore {
    async fn query_any(&self, sql: String) -> Result<bool> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::store(e, "getting MySQL connection"))?;
        let found: Option<u8> = conn
            .query_first(sql.as_str())
            .await
            .map_err(|e| MigrateError::store(e, sql.clone()))?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TargetStore for MysqlStore {
    async fn record_exists(&self, table: &str, pk_field: &str, pk_value: &str) -> Result<bool> {
        self.query_any(exists_query(table, pk_field, pk_value)?).await
    }

    async fn matches(&self, table: &str, row: &FormattedRow) -> Result<bool> {
        self.query_any(match_query(table, row)?).await
    }

    async fn execute(&self, statement: &Statement) -> Result<Option<u64>> {
        if self.access == StoreAccess::ReadOnly {
            return Err(MigrateError::store(
                "store is read-only",
                format!("executing on {}", self.label),
            ));
        }

        let sql = statement.to_sql()?;
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::store(e, "getting MySQL connection"))?;
        conn.query_drop(sql.as_str())
            .await
            .map_err(|e| MigrateError::store(e, sql.clone()))?;
        debug!("{}", sql);

        Ok(match statement {
            Statement::Insert { .. } => conn.last_insert_id(),
            _ => None,
        })
    }

    fn db_type(&self) -> &str {
        "mysql"
    }
}

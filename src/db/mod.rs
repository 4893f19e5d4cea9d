//! Database abstraction: a typed wrapper over a SQL connection exposing
//! `exec`, per-table transaction boundaries, a flavor tag, and helpers for
//! literal encoding and flavor-specific type names.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

/// SQL dialect family. Redshift is wire-compatible with Postgres, so it is
/// modeled here as a second [`Flavor`] value over the same driver rather
/// than a second connection implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    Postgres,
    Redshift,
}

impl Flavor {
    /// Column type used to store the verbatim source document.
    pub fn json_type_name(&self) -> &'static str {
        match self {
            Flavor::Postgres => "JSONB",
            Flavor::Redshift => "SUPER",
        }
    }

    /// Trailing distribution/sort-key clause appended to `CREATE TABLE`.
    /// Empty on Postgres; `PRIMARY KEY (id)` is always added later via
    /// `ALTER TABLE` (see `TableStager::index`), not here.
    pub fn key_clause(&self) -> &'static str {
        match self {
            Flavor::Postgres => "",
            Flavor::Redshift => " DISTSTYLE EVEN SORTKEY (id)",
        }
    }

    /// Per-column secondary indexes are only built on Postgres.
    pub fn supports_secondary_indexes(&self) -> bool {
        matches!(self, Flavor::Postgres)
    }
}

/// Quote an identifier for safe inclusion in DDL/DML text, doubling any
/// embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!(r#""{}""#, ident.replace('"', r#""""#))
}

/// Quote a string literal for safe inclusion in SQL text, doubling any
/// embedded single quotes. Assumes `standard_conforming_strings = on`
/// (the Postgres/Redshift default), so backslashes are not re-escaped.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A connection in manual-commit mode, wrapping a pooled Postgres
/// connection. Each table owns exactly one of these for the lifetime of its
/// load (see `StageError`'s "shared-resource policy": nothing is shared
/// across tables).
pub struct DbConn {
    pool: PgPool,
    flavor: Flavor,
    txn: Option<Transaction<'static, Postgres>>,
}

impl DbConn {
    pub async fn connect(database_url: &str, flavor: Flavor) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self {
            pool,
            flavor,
            txn: None,
        })
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Execute a statement outside of any table transaction (run-level DDL
    /// such as `CREATE SCHEMA IF NOT EXISTS`).
    pub async fn exec_unscoped(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Open a fresh per-table transaction. Must be paired with exactly one
    /// of `commit_table` / `rollback_table`.
    pub async fn begin_table(&mut self) -> Result<()> {
        let tx = self.pool.begin().await?;
        self.txn = Some(tx);
        Ok(())
    }

    /// Execute a statement inside the current table transaction.
    pub async fn exec(&mut self, sql: &str) -> Result<()> {
        let tx = self
            .txn
            .as_mut()
            .ok_or_else(|| Error::Config("exec called with no open table transaction".into()))?;
        sqlx::query(sql).execute(tx.as_mut()).await?;
        Ok(())
    }

    /// Commit the current table's transaction.
    pub async fn commit_table(&mut self) -> Result<()> {
        let tx = self
            .txn
            .take()
            .ok_or_else(|| Error::Config("commit called with no open table transaction".into()))?;
        tx.commit().await?;
        Ok(())
    }

    /// Roll back the current table's transaction. This really rolls back —
    /// it does not call `commit` under any name.
    pub async fn rollback_table(&mut self) -> Result<()> {
        if let Some(tx) = self.txn.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    pub async fn grant_select(&mut self, table_name: &str, role: &str) -> Result<()> {
        let sql = format!(
            "GRANT SELECT ON {} TO {}",
            quote_ident(table_name),
            quote_ident(role)
        );
        self.exec(&sql).await
    }

    pub async fn grant_select_schema(&self, schema: &str, role: &str) -> Result<()> {
        let sql = format!(
            "GRANT SELECT ON ALL TABLES IN SCHEMA {} TO {}",
            quote_ident(schema),
            quote_ident(role)
        );
        self.exec_unscoped(&sql).await
    }

    pub async fn create_schema_if_not_exists(&self, schema: &str) -> Result<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
        self.exec_unscoped(&sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_controls_json_type_and_indexes() {
        assert_eq!(Flavor::Postgres.json_type_name(), "JSONB");
        assert_eq!(Flavor::Redshift.json_type_name(), "SUPER");
        assert!(Flavor::Postgres.supports_secondary_indexes());
        assert!(!Flavor::Redshift.supports_secondary_indexes());
        assert_eq!(Flavor::Postgres.key_clause(), "");
        assert!(Flavor::Redshift.key_clause().contains("SORTKEY"));
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident(r#"weird"name"#), r#""weird""name""#);
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}

// PostgreSQL row sink - one parameterised insert per row
use crate::application::error::InsertError;
use crate::application::exporter::RowSink;
use crate::domain::row::{ROW_FIELDS, Row, RowField};
use crate::infrastructure::config::Conversion;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::collections::BTreeMap;

pub struct PostgresSink {
    pool: PgPool,
    statement: String,
}

impl PostgresSink {
    pub async fn connect(
        database_url: &str,
        table: &str,
        conversions: &BTreeMap<RowField, Conversion>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self {
            pool,
            statement: insert_statement(table, conversions),
        })
    }
}

/// `INSERT INTO <table> VALUES ($1, ..)` with optional per-field conversions.
pub fn insert_statement(table: &str, conversions: &BTreeMap<RowField, Conversion>) -> String {
    let params: Vec<String> = ROW_FIELDS
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let param = format!("${}", i + 1);
            match conversions.get(field).copied().unwrap_or_default() {
                Conversion::Default => param,
                Conversion::ToTimestamp => format!("to_timestamp({})", param),
            }
        })
        .collect();
    format!("INSERT INTO {} VALUES ({})", table, params.join(", "))
}

#[async_trait]
impl RowSink for PostgresSink {
    async fn insert_row(&self, row: &Row) -> Result<(), InsertError> {
        let result = sqlx::query(&self.statement)
            .bind(&row.node)
            .bind(&row.sensor)
            .bind(&row.unit)
            .bind(row.timestamp)
            .bind(row.value)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(InsertError::Duplicate(db.message().to_string()))
            }
            Err(e) => Err(InsertError::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_insert_statement() {
        assert_eq!(
            insert_statement("readings", &BTreeMap::new()),
            "INSERT INTO readings VALUES ($1, $2, $3, $4, $5)"
        );
    }

    #[test]
    fn test_timestamp_conversion() {
        let mut conversions = BTreeMap::new();
        conversions.insert(RowField::Timestamp, Conversion::ToTimestamp);
        assert_eq!(
            insert_statement("public.readings", &conversions),
            "INSERT INTO public.readings VALUES ($1, $2, $3, to_timestamp($4), $5)"
        );
    }
}

//! PostgreSQL identity store
//!
//! Statements are assembled with [`QueryBuilder`] from the table and column
//! names carried by [`IdentityQuery`] / [`InsertStatement`] (all compile-time
//! constants) with every value bound as a parameter. Each statement runs on a
//! pooled connection outside an explicit transaction, so it commits on its own.

use async_trait::async_trait;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info};

use super::{EntityTable, IdentityQuery, IdentityStore, InsertStatement, MatchMode, SqlValue};
use crate::error::{IngestError, Result};
use crate::models::{Id, Variant};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Int(v) => {
            builder.push_bind(*v);
        },
        SqlValue::Float(v) => {
            builder.push_bind(*v);
        },
        SqlValue::Text(v) => {
            builder.push_bind(v.clone());
        },
        SqlValue::IntArray(v) => {
            builder.push_bind(v.clone());
        },
        // untyped literal so it fits any column type
        SqlValue::Null => {
            builder.push("NULL");
        },
    }
}

fn select_builder(query: &IdentityQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE ",
        query.table.id_column(),
        query.table.name()
    ));

    for (i, key) in query.key.iter().enumerate() {
        if i > 0 {
            builder.push(" AND ");
        }
        match (&key.value, key.mode) {
            (SqlValue::Null, _) => {
                builder.push(key.column).push(" IS NULL");
            },
            (value, MatchMode::CaseInsensitive) => {
                builder.push("LOWER(").push(key.column).push(") = LOWER(");
                push_value(&mut builder, value);
                builder.push(")");
            },
            (value, MatchMode::Exact) => {
                builder.push(key.column).push(" = ");
                push_value(&mut builder, value);
            },
        }
    }
    builder.push(" LIMIT 1");
    builder
}

fn insert_builder(insert: &InsertStatement) -> QueryBuilder<'static, Postgres> {
    let columns: Vec<&str> = insert.columns.iter().map(|(c, _)| *c).collect();
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        insert.table.name(),
        columns.join(", ")
    ));

    let mut values = builder.separated(", ");
    for (_, value) in &insert.columns {
        match value {
            SqlValue::Int(v) => {
                values.push_bind(*v);
            },
            SqlValue::Float(v) => {
                values.push_bind(*v);
            },
            SqlValue::Text(v) => {
                values.push_bind(v.clone());
            },
            SqlValue::IntArray(v) => {
                values.push_bind(v.clone());
            },
            SqlValue::Null => {
                values.push("NULL");
            },
        }
    }
    builder.push(")");
    builder
}

/// CSV payload for `COPY variant ... FROM STDIN`
fn variant_copy_payload(variants: &[Variant]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(variants.len() * 24));
    for variant in variants {
        writer
            .write_record(&[
                variant.species.to_string(),
                variant.chromosome.to_string(),
                variant.position.to_string(),
            ])
            .map_err(|e| IngestError::Io(e.into()))?;
    }
    writer
        .into_inner()
        .map_err(|e| IngestError::Io(e.into_error()))
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_id(&self, query: &IdentityQuery) -> Result<Option<Id>> {
        let mut builder = select_builder(query);
        builder
            .build_query_scalar::<Id>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    table = %query.table,
                    key = %query,
                    error = %e,
                    "Identity lookup failed"
                );
                IngestError::Database(e)
            })
    }

    async fn insert_ignoring_conflict(&self, insert: &InsertStatement) -> Result<Option<Id>> {
        let mut builder = insert_builder(insert);
        builder
            .push(" ON CONFLICT DO NOTHING RETURNING ")
            .push(insert.table.id_column());

        let id = builder
            .build_query_scalar::<Id>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    table = %insert.table,
                    statement = %insert.shape(),
                    params = %insert.params(),
                    error = %e,
                    "Insert failed"
                );
                IngestError::Database(e)
            })?;

        debug!(table = %insert.table, id = ?id, "Insert ignoring conflict");
        Ok(id)
    }

    async fn insert(&self, insert: &InsertStatement) -> Result<Id> {
        let mut builder = insert_builder(insert);
        builder.push(" RETURNING ").push(insert.table.id_column());

        builder
            .build_query_scalar::<Id>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    table = %insert.table,
                    statement = %insert.shape(),
                    params = %insert.params(),
                    error = %e,
                    "Insert failed"
                );
                IngestError::Database(e)
            })
    }

    async fn append_variants(&self, variants: &[Variant]) -> Result<u64> {
        if variants.is_empty() {
            return Ok(0);
        }
        let payload = variant_copy_payload(variants)?;

        let mut copy = self
            .pool
            .copy_in_raw(
                "COPY variant (variant_species, variant_chromosome, variant_pos) \
                 FROM STDIN WITH (FORMAT csv)",
            )
            .await?;
        if let Err(e) = copy.send(payload).await {
            error!(rows = variants.len(), error = %e, "Variant COPY failed while sending");
            // abort rolls the whole COPY back
            copy.abort(e.to_string()).await.ok();
            return Err(IngestError::Database(e));
        }
        let rows = copy.finish().await.map_err(|e| {
            error!(rows = variants.len(), error = %e, "Variant COPY failed");
            IngestError::Database(e)
        })?;

        info!(rows, "Appended variants");
        Ok(rows)
    }

    async fn truncate_all(&self) -> Result<()> {
        let tables: Vec<&str> = EntityTable::ALL.iter().map(|t| t.name()).collect();
        let statement = format!("TRUNCATE {} RESTART IDENTITY CASCADE", tables.join(", "));
        sqlx::query(&statement).execute(&self.pool).await?;
        info!(tables = tables.len(), "Truncated all tables");
        Ok(())
    }
}

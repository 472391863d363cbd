//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. Every collection is kept in a
//! single `documents` table whose `fields` column holds the typed-field map as JSONB.

use async_trait::async_trait;
use carelink_core::fields::{FieldValue, Fields};
use carelink_core::ports::{DocumentStore, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
    timeout: Duration,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`; every store call is bounded by `timeout`.
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> PortResult<T>
    where
        F: Future<Output = PortResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PortError::Timeout(format!("{} exceeded {:?}", operation, self.timeout)))?
    }

    /// Reads a document under a row lock, lets `change` edit it and writes it back.
    async fn modify<F>(&self, collection: &str, id: &str, change: F) -> PortResult<()>
    where
        F: FnOnce(&mut Fields) -> PortResult<()> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut fields = lock_document(&mut tx, collection, id).await?;
        change(&mut fields)?;
        sqlx::query(
            "UPDATE documents SET fields = $3, updated_at = now() WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&fields))
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn exists(&self, collection: &str, id: &str) -> PortResult<bool> {
        let found: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(found.is_some())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(collection: &str, id: &str) -> PortError {
    PortError::NotFound(format!("{}/{}", collection, id))
}

async fn lock_document(
    tx: &mut Transaction<'_, Postgres>,
    collection: &str,
    id: &str,
) -> PortResult<Fields> {
    let record: Option<DocumentRecord> = sqlx::query_as(
        "SELECT id, fields FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(unexpected)?;
    record
        .map(|r| r.fields.0)
        .ok_or_else(|| not_found(collection, id))
}

fn string_array_mut<'a>(fields: &'a mut Fields, field: &str) -> PortResult<&'a mut Vec<String>> {
    match fields
        .entry(field.to_string())
        .or_insert_with(|| FieldValue::StringArrayValue(Vec::new()))
    {
        FieldValue::StringArrayValue(values) => Ok(values),
        other => Err(PortError::Unexpected(format!(
            "field '{}' is {}, not a string-array",
            field,
            other.type_name()
        ))),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: String,
    fields: Json<Fields>,
}

impl DocumentRecord {
    fn into_pair(self) -> (String, Fields) {
        (self.id, self.fields.0)
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn get_document(&self, collection: &str, id: &str) -> PortResult<Fields> {
        self.bounded("get_document", async {
            let record: Option<DocumentRecord> =
                sqlx::query_as("SELECT id, fields FROM documents WHERE collection = $1 AND id = $2")
                    .bind(collection)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(unexpected)?;
            record
                .map(|r| r.fields.0)
                .ok_or_else(|| not_found(collection, id))
        })
        .await
    }

    async fn upsert_document(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()> {
        self.bounded("upsert_document", async {
            sqlx::query(
                "INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3)
                 ON CONFLICT (collection, id) DO UPDATE SET fields = EXCLUDED.fields, updated_at = now()",
            )
            .bind(collection)
            .bind(id)
            .bind(Json(&fields))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
            debug!(collection, id, "document upserted");
            Ok(())
        })
        .await
    }

    async fn patch_document(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()> {
        self.bounded("patch_document", async {
            let result = sqlx::query(
                "UPDATE documents SET fields = fields || $3, updated_at = now()
                 WHERE collection = $1 AND id = $2",
            )
            .bind(collection)
            .bind(id)
            .bind(Json(&fields))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
            if result.rows_affected() == 0 {
                return Err(not_found(collection, id));
            }
            Ok(())
        })
        .await
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        guard_field: &str,
        guard_value: &FieldValue,
    ) -> PortResult<()> {
        self.bounded("update_if", async {
            let result = sqlx::query(
                "UPDATE documents SET fields = fields || $3, updated_at = now()
                 WHERE collection = $1 AND id = $2 AND fields -> $4 = $5",
            )
            .bind(collection)
            .bind(id)
            .bind(Json(&fields))
            .bind(guard_field)
            .bind(Json(guard_value))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
            if result.rows_affected() == 1 {
                return Ok(());
            }
            if self.exists(collection, id).await? {
                Err(PortError::Conflict(format!(
                    "{}/{}: '{}' changed",
                    collection, id, guard_field
                )))
            } else {
                Err(not_found(collection, id))
            }
        })
        .await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> PortResult<bool> {
        self.bounded("delete_document", async {
            let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> PortResult<Vec<(String, Fields)>> {
        self.bounded("query_equals", async {
            let records: Vec<DocumentRecord> = sqlx::query_as(
                "SELECT id, fields FROM documents
                 WHERE collection = $1 AND fields -> $2 = $3
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(collection)
            .bind(field)
            .bind(Json(value))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
            Ok(records.into_iter().map(DocumentRecord::into_pair).collect())
        })
        .await
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> PortResult<()> {
        self.bounded(
            "array_union",
            self.modify(collection, id, |fields| {
                let array = string_array_mut(fields, field)?;
                for value in values {
                    if !array.contains(value) {
                        array.push(value.clone());
                    }
                }
                Ok(())
            }),
        )
        .await
    }

    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> PortResult<()> {
        self.bounded(
            "array_remove",
            self.modify(collection, id, |fields| {
                let array = string_array_mut(fields, field)?;
                array.retain(|v| !values.contains(v));
                Ok(())
            }),
        )
        .await
    }
}

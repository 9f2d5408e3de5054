//! Versioned schema migrations.
//!
//! Migrations are applied in order at startup and the highest applied
//! version is recorded in `schema_migrations`. A database whose recorded
//! version is newer than this binary knows about is refused.

use anyhow::{Context, Result};
use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use thiserror::Error;
use tracing::info;

use super::Database;

const SCHEMA_COLLECTION: &str = "schema_migrations";

/// One index created by a migration.
#[derive(Debug)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub name: &'static str,
    /// Field name and direction (1 ascending, -1 descending).
    pub keys: &'static [(&'static str, i32)],
    pub unique: bool,
}

impl IndexSpec {
    fn model(&self) -> IndexModel {
        let mut keys = Document::new();
        for (field, direction) in self.keys {
            keys.insert(*field, *direction);
        }
        IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(self.name.to_string())
                    .unique(self.unique)
                    .build(),
            )
            .build()
    }
}

#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub indexes: &'static [IndexSpec],
}

/// Known migrations, ascending by version.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "unique account emails and sequential ids",
        indexes: &[
            IndexSpec {
                collection: "users",
                name: "users_email_unique",
                keys: &[("email", 1)],
                unique: true,
            },
            IndexSpec {
                collection: "users",
                name: "users_id_unique",
                keys: &[("id", 1)],
                unique: true,
            },
        ],
    },
    Migration {
        version: 2,
        description: "transaction lookups by id, sender and status",
        indexes: &[
            IndexSpec {
                collection: "transactions",
                name: "transactions_id_unique",
                keys: &[("id", 1)],
                unique: true,
            },
            IndexSpec {
                collection: "transactions",
                name: "transactions_sender_created",
                keys: &[("sender", 1), ("created_at", -1)],
                unique: false,
            },
            IndexSpec {
                collection: "transactions",
                name: "transactions_status",
                keys: &[("status", 1)],
                unique: false,
            },
        ],
    },
    Migration {
        version: 3,
        description: "one kyc record per user",
        indexes: &[IndexSpec {
            collection: "kyc_status",
            name: "kyc_status_user_unique",
            keys: &[("user_id", 1)],
            unique: true,
        }],
    },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },
}

/// Migrations still to apply on top of `current`.
pub fn pending(current: u32, migrations: &[Migration]) -> Result<&[Migration], MigrationError> {
    let supported = migrations.last().map(|m| m.version).unwrap_or(0);
    if current > supported {
        return Err(MigrationError::SchemaTooNew {
            found: current,
            supported,
        });
    }
    let start = migrations.partition_point(|m| m.version <= current);
    Ok(&migrations[start..])
}

async fn current_version(db: &Database) -> Result<u32> {
    let latest = db
        .collection::<Document>(SCHEMA_COLLECTION)
        .find_one(doc! {})
        .sort(doc! { "version": -1 })
        .await
        .context("reading schema version")?;

    Ok(latest
        .and_then(|d| d.get_i64("version").ok())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0))
}

/// Apply outstanding migrations. Returns the resulting schema version.
pub async fn run(db: &Database) -> Result<u32> {
    let current = current_version(db).await?;
    let todo = pending(current, MIGRATIONS)?;

    if todo.is_empty() {
        info!("Schema up to date at version {}", current);
        return Ok(current);
    }

    let mut version = current;
    for migration in todo {
        for index in migration.indexes {
            db.collection::<Document>(index.collection)
                .create_index(index.model())
                .await
                .with_context(|| format!("creating index {}", index.name))?;
        }

        db.collection::<Document>(SCHEMA_COLLECTION)
            .insert_one(doc! {
                "version": i64::from(migration.version),
                "description": migration.description,
                "applied_at": Utc::now().to_rfc3339(),
            })
            .await
            .with_context(|| format!("recording migration {}", migration.version))?;

        info!("Applied migration {}: {}", migration.version, migration.description);
        version = migration.version;
    }

    Ok(version)
}

//! Reference implementation of [`SharedMediaCatalog`] on SQLite.
//!
//! Behaves like the system media store the host normally provides: items
//! are owned by the package that inserted them, other packages are denied
//! deletion, and the way a denial can be overturned depends on the platform
//! version. Consent tickets are issued and honoured by the store itself, so
//! a forged, mismatched or replayed ticket is refused.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::playground::consent::{ConsentTicket, TicketId};
use crate::playground::database::{Database, DatabaseError, parse_timestamp};
use crate::playground::host::{
    CatalogError, CatalogRow, RecoverySignal, SharedMediaCatalog, SortKey,
};
use crate::playground::images::MediaLocator;
use crate::playground::platform::{ConsentChannel, PlatformVersion};
use crate::playground::storage::write_atomic;

/// Prefix of every locator handed out by the store.
pub const LOCATOR_PREFIX: &str = "content://media/external/images/media/";

const DATABASE_FILE: &str = "media_store.sqlite";
const MEDIA_DIR: &str = "media";

const TICKET_KIND_BATCH: &str = "batch_delete_request";
const TICKET_KIND_RECOVERABLE: &str = "recoverable_access";

/// Full record of one shared item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub locator: MediaLocator,
    pub display_name: String,
    pub mime_type: String,
    pub owner_package: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MediaImageRow {
    id: i64,
    display_name: String,
    mime_type: String,
    owner_package: String,
    file_path: String,
    content_hash: String,
    size_bytes: i64,
    date_added: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ConsentTicketRow {
    kind: String,
    locators: String,
    consumed_at: Option<i64>,
}

#[derive(Debug)]
pub struct SqliteMediaStore {
    database: Database,
    media_dir: PathBuf,
    platform: PlatformVersion,
    package_name: String,
}

impl SqliteMediaStore {
    /// Opens (or creates) the store under `root_dir`. `package_name` is the
    /// identity used as owner for [`SharedMediaCatalog::insert`] and as the
    /// caller identity for [`SharedMediaCatalog::delete`].
    pub async fn new(
        root_dir: &Path,
        platform: PlatformVersion,
        package_name: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let media_dir = root_dir.join(MEDIA_DIR);
        tokio::fs::create_dir_all(&media_dir).await?;

        let database = Database::new(root_dir.join(DATABASE_FILE)).await?;

        Ok(Self {
            database,
            media_dir,
            platform,
            package_name: package_name.into(),
        })
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn locator_for(id: i64) -> MediaLocator {
        MediaLocator::new(format!("{LOCATOR_PREFIX}{id}"))
    }

    fn id_of(locator: &MediaLocator) -> Option<i64> {
        locator
            .as_str()
            .strip_prefix(LOCATOR_PREFIX)
            .and_then(|id| id.parse().ok())
    }

    /// Inserts an item on behalf of `owner_package`.
    pub async fn insert_as(
        &self,
        owner_package: &str,
        display_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<MediaLocator, CatalogError> {
        let file_path = self
            .media_dir
            .join(format!("{}_{}", uuid::Uuid::new_v4(), display_name.replace('/', "_")));
        write_atomic(&file_path, bytes).await?;

        let content_hash = hex::encode(Sha256::digest(bytes));
        let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
            "INSERT INTO media_images (display_name, mime_type, owner_package, file_path, content_hash, size_bytes, date_added)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(display_name)
        .bind(mime_type)
        .bind(owner_package)
        .bind(file_path.to_string_lossy().into_owned())
        .bind(&content_hash)
        .bind(bytes.len() as i64)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.database.pool)
        .await;

        let (id,) = match inserted {
            Ok(row) => row,
            Err(e) => {
                let _ = tokio::fs::remove_file(&file_path).await;
                return Err(e.into());
            }
        };

        let locator = Self::locator_for(id);
        tracing::debug!(
            target: "storage_playground::media_store",
            "Inserted {} as {} for {} ({} bytes, sha256 {})",
            display_name,
            locator,
            owner_package,
            bytes.len(),
            content_hash
        );
        Ok(locator)
    }

    /// Deletes an item on behalf of `caller_package`.
    pub async fn delete_as(
        &self,
        caller_package: &str,
        locator: &MediaLocator,
    ) -> Result<(), CatalogError> {
        let row = self.fetch_row(locator).await?;

        if row.owner_package != caller_package {
            return Err(CatalogError::AuthorizationDenied {
                locator: locator.clone(),
                recovery: self.recovery_for(locator).await?,
            });
        }

        sqlx::query("DELETE FROM media_images WHERE id = ?")
            .bind(row.id)
            .execute(&self.database.pool)
            .await?;
        self.remove_file(&row).await;
        Ok(())
    }

    pub async fn entry(&self, locator: &MediaLocator) -> Result<MediaEntry, CatalogError> {
        let row = self.fetch_row(locator).await?;
        Ok(MediaEntry {
            locator: locator.clone(),
            date_added: parse_timestamp(row.date_added)?,
            display_name: row.display_name,
            mime_type: row.mime_type,
            owner_package: row.owner_package,
            content_hash: row.content_hash,
            size_bytes: row.size_bytes,
        })
    }

    /// Reads the stored bytes of an item.
    pub async fn open(&self, locator: &MediaLocator) -> Result<Vec<u8>, CatalogError> {
        let row = self.fetch_row(locator).await?;
        Ok(tokio::fs::read(&row.file_path).await?)
    }

    async fn fetch_row(&self, locator: &MediaLocator) -> Result<MediaImageRow, CatalogError> {
        let id = Self::id_of(locator).ok_or_else(|| CatalogError::NotFound(locator.clone()))?;

        sqlx::query_as::<_, MediaImageRow>("SELECT * FROM media_images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.database.pool)
            .await?
            .ok_or_else(|| CatalogError::NotFound(locator.clone()))
    }

    async fn remove_file(&self, row: &MediaImageRow) {
        if let Err(e) = tokio::fs::remove_file(&row.file_path).await {
            tracing::warn!(
                target: "storage_playground::media_store",
                "Row {} deleted but its file {} could not be removed: {}",
                row.id,
                row.file_path,
                e
            );
        }
    }

    /// Issues a ticket for `locators`. An unconsumed ticket of the same kind
    /// for the same items is superseded and dropped.
    async fn issue_ticket(
        &self,
        kind: &str,
        locators: &[MediaLocator],
    ) -> Result<TicketId, CatalogError> {
        let id = TicketId::new();
        let encoded = serde_json::to_string(locators).map_err(DatabaseError::from)?;

        let mut txn = self.database.pool.begin().await?;

        let superseded = sqlx::query(
            "DELETE FROM consent_tickets
             WHERE consumed_at IS NULL AND kind = ? AND locators = ?",
        )
        .bind(kind)
        .bind(encoded.as_str())
        .execute(&mut *txn)
        .await?
        .rows_affected();

        sqlx::query(
            "INSERT INTO consent_tickets (id, kind, locators, issued_at, consumed_at)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(id.to_string())
        .bind(kind)
        .bind(encoded)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;

        if superseded > 0 {
            tracing::debug!(
                target: "storage_playground::media_store",
                "Ticket {} supersedes {} unanswered ticket(s)",
                id,
                superseded
            );
        }
        Ok(id)
    }

    async fn recovery_for(
        &self,
        locator: &MediaLocator,
    ) -> Result<Option<RecoverySignal>, CatalogError> {
        if self.platform.consent_channel() != ConsentChannel::RecoverableDenial {
            return Ok(None);
        }

        let action_id = self
            .issue_ticket(TICKET_KIND_RECOVERABLE, std::slice::from_ref(locator))
            .await?;
        Ok(Some(RecoverySignal {
            action_id,
            locator: locator.clone(),
        }))
    }

    /// Honours `ticket` for `row`: the ticket is marked consumed and the row
    /// deleted in one transaction.
    async fn delete_with_ticket(
        &self,
        row: &MediaImageRow,
        locator: &MediaLocator,
        ticket: &ConsentTicket,
    ) -> Result<(), CatalogError> {
        let ticket_id = ticket.id();
        let expected_kind = match ticket {
            ConsentTicket::BatchDeleteRequest { .. } => TICKET_KIND_BATCH,
            ConsentTicket::RecoverableAccess { .. } => TICKET_KIND_RECOVERABLE,
        };

        let mut txn = self.database.pool.begin().await?;

        let stored: Option<ConsentTicketRow> = sqlx::query_as(
            "SELECT kind, locators, consumed_at FROM consent_tickets WHERE id = ?",
        )
        .bind(ticket_id.to_string())
        .fetch_optional(&mut *txn)
        .await?;

        let Some(stored) = stored else {
            return Err(CatalogError::InvalidTicket(ticket_id));
        };
        let issued_for: Vec<MediaLocator> =
            serde_json::from_str(&stored.locators).map_err(DatabaseError::from)?;

        let valid = stored.consumed_at.is_none()
            && stored.kind == expected_kind
            && issued_for.contains(locator)
            && ticket.covers(locator);
        if !valid {
            tracing::warn!(
                target: "storage_playground::media_store",
                "Refusing ticket {} for {}",
                ticket_id,
                locator
            );
            return Err(CatalogError::InvalidTicket(ticket_id));
        }

        sqlx::query("UPDATE consent_tickets SET consumed_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(ticket_id.to_string())
            .execute(&mut *txn)
            .await?;
        sqlx::query("DELETE FROM media_images WHERE id = ?")
            .bind(row.id)
            .execute(&mut *txn)
            .await?;
        txn.commit().await?;

        self.remove_file(row).await;
        Ok(())
    }
}

#[async_trait]
impl SharedMediaCatalog for SqliteMediaStore {
    async fn query(&self, sort: SortKey) -> Result<Vec<CatalogRow>, CatalogError> {
        let sql = match sort {
            SortKey::DisplayNameAscending => {
                "SELECT id, display_name FROM media_images ORDER BY display_name ASC, id ASC"
            }
            SortKey::DateAddedDescending => {
                "SELECT id, display_name FROM media_images ORDER BY date_added DESC, id DESC"
            }
        };

        let rows: Vec<(i64, String)> = sqlx::query_as(sql)
            .fetch_all(&self.database.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, display_name)| CatalogRow {
                id,
                display_name,
                locator: Self::locator_for(id),
            })
            .collect())
    }

    async fn insert(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<MediaLocator, CatalogError> {
        self.insert_as(&self.package_name, display_name, mime_type, bytes)
            .await
    }

    async fn delete(
        &self,
        locator: &MediaLocator,
        consent: Option<&ConsentTicket>,
    ) -> Result<(), CatalogError> {
        match consent {
            None => self.delete_as(&self.package_name, locator).await,
            Some(ticket) => {
                let row = self.fetch_row(locator).await?;
                if row.owner_package == self.package_name {
                    return self.delete_as(&self.package_name, locator).await;
                }
                self.delete_with_ticket(&row, locator, ticket).await
            }
        }
    }

    async fn create_delete_request(
        &self,
        locators: &[MediaLocator],
    ) -> Result<ConsentTicket, CatalogError> {
        if self.platform.consent_channel() != ConsentChannel::BatchDeleteRequest {
            return Err(CatalogError::Unsupported(format!(
                "delete requests need API level 30, running {}",
                self.platform.api_level()
            )));
        }

        let id = self.issue_ticket(TICKET_KIND_BATCH, locators).await?;
        tracing::debug!(
            target: "storage_playground::media_store",
            "Issued delete request {} for {} item(s)",
            id,
            locators.len()
        );

        Ok(ConsentTicket::BatchDeleteRequest {
            id,
            locators: locators.to_vec(),
        })
    }
}

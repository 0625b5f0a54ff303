//! Collaborators supplied by the host platform.
//!
//! The host (the mobile app shell) implements these traits on top of the OS
//! APIs: the app-private files directory, the system media catalog, the
//! runtime permission subsystem and the system consent prompt. The crate
//! ships [`OwnedFileStorage`](crate::playground::storage::OwnedFileStorage)
//! and [`SqliteMediaStore`](crate::playground::media_store::SqliteMediaStore)
//! as reference implementations of the two storage traits.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::playground::capabilities::Credential;
use crate::playground::consent::{ConsentTicket, TicketId};
use crate::playground::database::DatabaseError;
use crate::playground::images::MediaLocator;

/// A raw file from app-private storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// App-private storage. No permission model.
#[async_trait]
pub trait OwnedStorageMedium: Send + Sync + std::fmt::Debug {
    async fn list(&self) -> std::io::Result<Vec<OwnedEntry>>;

    async fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;

    /// Fails with [`std::io::ErrorKind::NotFound`] when nothing is stored under `name`.
    async fn delete(&self, name: &str) -> std::io::Result<()>;
}

/// Ordering requested from the shared catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    DisplayNameAscending,
    DateAddedDescending,
}

/// One row returned by a shared catalog query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub id: i64,
    pub display_name: String,
    pub locator: MediaLocator,
}

/// Payload attached to a denial that the user can still overturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySignal {
    /// System-issued identifier of the pending user action.
    pub action_id: TicketId,
    pub locator: MediaLocator,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Authorization denied for {locator}")]
    AuthorizationDenied {
        locator: MediaLocator,
        recovery: Option<RecoverySignal>,
    },

    #[error("Media item not found: {0}")]
    NotFound(MediaLocator),

    #[error("Consent ticket {0} is not valid for this request")]
    InvalidTicket(TicketId),

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        CatalogError::Database(DatabaseError::Sqlx(err))
    }
}

/// The system-indexed media store.
#[async_trait]
pub trait SharedMediaCatalog: Send + Sync + std::fmt::Debug {
    async fn query(&self, sort: SortKey) -> Result<Vec<CatalogRow>, CatalogError>;

    async fn insert(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<MediaLocator, CatalogError>;

    /// Deletes the item at `locator`.
    ///
    /// `consent` is `None` on a first attempt. A replay after the user approved
    /// a prompt passes the ticket that authorized it; the catalog must refuse a
    /// ticket it did not issue, one that does not cover `locator`, or one it has
    /// already honoured.
    async fn delete(
        &self,
        locator: &MediaLocator,
        consent: Option<&ConsentTicket>,
    ) -> Result<(), CatalogError>;

    /// Issues a batch delete-request ticket covering `locators`.
    async fn create_delete_request(
        &self,
        locators: &[MediaLocator],
    ) -> Result<ConsentTicket, CatalogError>;
}

/// The runtime permission subsystem.
#[async_trait]
pub trait CredentialSubsystem: Send + Sync + std::fmt::Debug {
    /// Current grant status as known by the OS.
    fn check_granted(&self, credentials: &[Credential]) -> HashMap<Credential, bool>;

    /// Asks the user. Suspends until the permission dialog is answered.
    async fn request(&self, credentials: &[Credential]) -> HashMap<Credential, bool>;

    /// Whether the OS still allows asking for `credential` after an explanation.
    /// `false` after a denial means the user chose not to be asked again.
    fn should_show_rationale(&self, credential: Credential) -> bool;
}

/// Outcome of a system consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentDecision {
    Approved,
    Declined,
}

/// The system consent prompt. May suspend for an unbounded time.
#[async_trait]
pub trait ConsentPrompt: Send + Sync + std::fmt::Debug {
    async fn present(&self, ticket: &ConsentTicket) -> ConsentDecision;
}

//! Guarded executor for reads, writes and deletes on both storage kinds.
//!
//! The gateway never asks the user for anything. Shared writes are checked
//! against the caller's [`AccessCoordinator`]; a denied shared delete is
//! turned into a [`ConsentTicket`] and handed back as
//! [`DeletionOutcome::Denied`] for the caller to resolve.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use crate::playground::access::{AccessCoordinator, AccessDecision};
use crate::playground::capabilities::StorageOperation;
use crate::playground::consent::ConsentTicket;
use crate::playground::error::{PlaygroundError, Result};
use crate::playground::host::{
    CatalogError, OwnedStorageMedium, RecoverySignal, SharedMediaCatalog, SortKey,
};
use crate::playground::images::{
    ExternalImage, ImageIdentity, InternalImage, PNG_EXTENSION, PNG_MIME_TYPE, StorageKind,
    decode_image, encode_png, validate_image_name,
};
use crate::playground::platform::{ConsentChannel, PlatformVersion};

/// Result of a delete attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted,
    /// The platform refused, but the user can still authorize the deletion.
    Denied(ConsentTicket),
    Failed,
}

/// The current contents of one storage kind, sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageList {
    Owned(Vec<InternalImage>),
    Shared(Vec<ExternalImage>),
}

impl ImageList {
    pub fn kind(&self) -> StorageKind {
        match self {
            ImageList::Owned(_) => StorageKind::Owned,
            ImageList::Shared(_) => StorageKind::Shared,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ImageList::Owned(images) => images.len(),
            ImageList::Shared(images) => images.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            ImageList::Owned(images) => images.iter().map(|i| i.name.as_str()).collect(),
            ImageList::Shared(images) => images.iter().map(|i| i.name.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageGateway {
    owned: Arc<dyn OwnedStorageMedium>,
    shared: Arc<dyn SharedMediaCatalog>,
    platform: PlatformVersion,
}

impl StorageGateway {
    pub fn new(
        owned: Arc<dyn OwnedStorageMedium>,
        shared: Arc<dyn SharedMediaCatalog>,
        platform: PlatformVersion,
    ) -> Self {
        Self {
            owned,
            shared,
            platform,
        }
    }

    pub fn platform(&self) -> PlatformVersion {
        self.platform
    }

    pub async fn read_all(&self, kind: StorageKind) -> Result<ImageList> {
        match kind {
            StorageKind::Owned => Ok(ImageList::Owned(self.read_all_owned().await?)),
            StorageKind::Shared => Ok(ImageList::Shared(self.read_all_shared().await?)),
        }
    }

    /// Decodes every `.png` file in owned storage. Files that do not decode are skipped.
    pub async fn read_all_owned(&self) -> Result<Vec<InternalImage>> {
        let entries = self.owned.list().await?;

        let mut images: Vec<InternalImage> = entries
            .into_iter()
            .filter(|entry| {
                Path::new(&entry.name)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(PNG_EXTENSION))
            })
            .filter_map(|entry| match decode_image(&entry.bytes) {
                Ok(image) => Some(InternalImage {
                    name: entry.name,
                    image,
                }),
                Err(e) => {
                    tracing::warn!(
                        target: "storage_playground::gateway",
                        "Skipping undecodable owned file {}: {}",
                        entry.name,
                        e
                    );
                    None
                }
            })
            .collect();

        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    /// Lists the shared catalog sorted by display name, whatever order the
    /// catalog returned its rows in. An empty catalog is not an error.
    pub async fn read_all_shared(&self) -> Result<Vec<ExternalImage>> {
        let rows = self.shared.query(SortKey::DisplayNameAscending).await?;

        let mut images: Vec<ExternalImage> = rows
            .into_iter()
            .map(|row| ExternalImage {
                id: row.id,
                name: row.display_name,
                locator: row.locator,
            })
            .collect();

        images.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(images)
    }

    /// Encodes `image` as PNG and stores it under `name`.
    ///
    /// Shared writes fail with [`PlaygroundError::AccessNotGranted`] unless
    /// `access` allows [`StorageOperation::WriteShared`]; credentials are never
    /// requested from here.
    pub async fn write(
        &self,
        kind: StorageKind,
        image: &DynamicImage,
        name: &str,
        access: &AccessCoordinator,
    ) -> Result<ImageIdentity> {
        let shared_access = match kind {
            StorageKind::Owned => AccessDecision::Proceed,
            StorageKind::Shared => access.evaluate(StorageOperation::WriteShared),
        };
        self.write_checked(kind, image, name, shared_access).await
    }

    /// Like [`write`](Self::write) with the shared-write decision already
    /// taken, so callers need not hold the coordinator across the I/O.
    pub async fn write_checked(
        &self,
        kind: StorageKind,
        image: &DynamicImage,
        name: &str,
        shared_access: AccessDecision,
    ) -> Result<ImageIdentity> {
        validate_image_name(name)?;

        if kind == StorageKind::Shared {
            let decision = shared_access;
            if !decision.is_proceed() {
                tracing::debug!(
                    target: "storage_playground::gateway",
                    "Shared write of {} refused: {:?}",
                    name,
                    decision
                );
                return Err(PlaygroundError::AccessNotGranted(decision));
            }
        }

        let bytes = encode_png(image)?;

        let identity = match kind {
            StorageKind::Owned => {
                self.owned.write(name, &bytes).await?;
                ImageIdentity::Owned(name.to_string())
            }
            StorageKind::Shared => {
                let locator = self.shared.insert(name, PNG_MIME_TYPE, &bytes).await?;
                ImageIdentity::Shared(locator)
            }
        };

        tracing::info!(
            target: "storage_playground::gateway",
            "Wrote {} ({} bytes)",
            identity,
            bytes.len()
        );
        Ok(identity)
    }

    /// First delete attempt. Owned items are removed directly; a shared item
    /// the platform refuses to delete comes back as `Denied` with a ticket
    /// when the running platform offers a consent path.
    pub async fn delete(&self, identity: &ImageIdentity) -> DeletionOutcome {
        match identity {
            ImageIdentity::Owned(name) => self.delete_owned(name).await,
            ImageIdentity::Shared(locator) => match self.shared.delete(locator, None).await {
                Ok(()) => {
                    tracing::info!(target: "storage_playground::gateway", "Deleted {}", identity);
                    DeletionOutcome::Deleted
                }
                Err(CatalogError::AuthorizationDenied { recovery, .. }) => {
                    self.consent_ticket_for(identity, recovery).await
                }
                Err(e) => {
                    tracing::warn!(
                        target: "storage_playground::gateway",
                        "Deleting {} failed: {}",
                        identity,
                        e
                    );
                    DeletionOutcome::Failed
                }
            },
        }
    }

    /// Replays a shared deletion once with the ticket the user approved.
    /// The ticket is consumed; any refusal now is final.
    pub async fn delete_with_consent(
        &self,
        identity: &ImageIdentity,
        ticket: ConsentTicket,
    ) -> DeletionOutcome {
        let ImageIdentity::Shared(locator) = identity else {
            tracing::warn!(
                target: "storage_playground::gateway",
                "Consent ticket {} presented for owned item {}",
                ticket.id(),
                identity
            );
            return DeletionOutcome::Failed;
        };

        match self.shared.delete(locator, Some(&ticket)).await {
            Ok(()) => {
                tracing::info!(
                    target: "storage_playground::gateway",
                    "Deleted {} with consent ticket {}",
                    identity,
                    ticket.id()
                );
                DeletionOutcome::Deleted
            }
            Err(e) => {
                tracing::warn!(
                    target: "storage_playground::gateway",
                    "Replay of {} with ticket {} failed: {}",
                    identity,
                    ticket.id(),
                    e
                );
                DeletionOutcome::Failed
            }
        }
    }

    async fn delete_owned(&self, name: &str) -> DeletionOutcome {
        match self.owned.delete(name).await {
            Ok(()) => {
                tracing::info!(target: "storage_playground::gateway", "Deleted owned:{}", name);
                DeletionOutcome::Deleted
            }
            Err(e) => {
                tracing::warn!(
                    target: "storage_playground::gateway",
                    "Deleting owned:{} failed: {}",
                    name,
                    e
                );
                DeletionOutcome::Failed
            }
        }
    }

    async fn consent_ticket_for(
        &self,
        identity: &ImageIdentity,
        recovery: Option<RecoverySignal>,
    ) -> DeletionOutcome {
        let ImageIdentity::Shared(locator) = identity else {
            return DeletionOutcome::Failed;
        };

        let ticket = match self.platform.consent_channel() {
            ConsentChannel::BatchDeleteRequest => {
                match self
                    .shared
                    .create_delete_request(std::slice::from_ref(locator))
                    .await
                {
                    Ok(ticket) => Some(ticket),
                    Err(e) => {
                        tracing::warn!(
                            target: "storage_playground::gateway",
                            "Could not create delete request for {}: {}",
                            locator,
                            e
                        );
                        None
                    }
                }
            }
            ConsentChannel::RecoverableDenial => recovery.map(ConsentTicket::from_recovery_signal),
            ConsentChannel::None => None,
        };

        match ticket {
            Some(ticket) => {
                tracing::info!(
                    target: "storage_playground::gateway",
                    "Deleting {} needs user consent (ticket {})",
                    identity,
                    ticket.id()
                );
                DeletionOutcome::Denied(ticket)
            }
            None => {
                tracing::warn!(
                    target: "storage_playground::gateway",
                    "Deleting {} was denied with no way to recover on API {}",
                    identity,
                    self.platform.api_level()
                );
                DeletionOutcome::Failed
            }
        }
    }
}

//! One broadcast channel per storage kind.
//!
//! Every update carries the complete list, so a receiver that lags behind
//! (`RecvError::Lagged`) loses nothing by skipping to the newest update.

use tokio::sync::broadcast;

use super::types::ImageListUpdate;
use crate::playground::images::StorageKind;

const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug)]
pub struct ImageStreamManager {
    owned: broadcast::Sender<ImageListUpdate>,
    shared: broadcast::Sender<ImageListUpdate>,
}

impl ImageStreamManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` updates are buffered per kind before slow receivers lag.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            owned: broadcast::channel(capacity).0,
            shared: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe(&self, kind: StorageKind) -> broadcast::Receiver<ImageListUpdate> {
        self.sender(kind).subscribe()
    }

    pub fn has_subscribers(&self, kind: StorageKind) -> bool {
        self.sender(kind).receiver_count() > 0
    }

    /// Publishes `update` on its kind's channel and returns how many
    /// receivers it reached.
    pub fn emit(&self, update: ImageListUpdate) -> usize {
        let kind = update.kind;
        let trigger = update.trigger;
        let images = update.images.len();

        // `send` only fails when nobody is listening
        let reached = self.sender(kind).send(update).unwrap_or(0);
        tracing::trace!(
            target: "storage_playground::image_streaming",
            "{:?} update for {} images ({}) reached {} receiver(s)",
            trigger,
            kind,
            images,
            reached
        );
        reached
    }

    fn sender(&self, kind: StorageKind) -> &broadcast::Sender<ImageListUpdate> {
        match kind {
            StorageKind::Owned => &self.owned,
            StorageKind::Shared => &self.shared,
        }
    }
}

impl Default for ImageStreamManager {
    fn default() -> Self {
        Self::new()
    }
}

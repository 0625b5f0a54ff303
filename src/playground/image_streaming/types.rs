use serde::{Deserialize, Serialize};

use crate::playground::gateway::ImageList;
use crate::playground::images::StorageKind;

/// What caused a list to be re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateTrigger {
    /// The list was (re)loaded on request.
    Loaded,

    /// An image was written.
    Saved,

    /// An image was deleted, directly or after user consent.
    Deleted,
}

/// A single update sent to subscribers.
///
/// `images` is always the complete, current list for `kind`.
#[derive(Debug, Clone)]
pub struct ImageListUpdate {
    pub trigger: UpdateTrigger,
    pub kind: StorageKind,
    pub images: ImageList,
}

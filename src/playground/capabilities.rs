//! Static mapping from storage operations to the credentials they need.
//!
//! Owned (app-private) storage never needs a credential. Shared storage needs
//! a tier-dependent set for reads and writes. Shared deletion needs none: it
//! is authorized per item through the consent flow instead.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::playground::platform::PlatformVersionTier;

/// A named platform permission tracked as granted or ungranted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Credential {
    ReadExternalStorage,
    WriteExternalStorage,
    ReadMediaImages,
    ReadMediaVideo,
    ReadMediaAudio,
}

impl Credential {
    pub const ALL: [Credential; 5] = [
        Credential::ReadExternalStorage,
        Credential::WriteExternalStorage,
        Credential::ReadMediaImages,
        Credential::ReadMediaVideo,
        Credential::ReadMediaAudio,
    ];

    /// The platform permission string identifying this credential.
    pub fn id(&self) -> &'static str {
        match self {
            Credential::ReadExternalStorage => "android.permission.READ_EXTERNAL_STORAGE",
            Credential::WriteExternalStorage => "android.permission.WRITE_EXTERNAL_STORAGE",
            Credential::ReadMediaImages => "android.permission.READ_MEDIA_IMAGES",
            Credential::ReadMediaVideo => "android.permission.READ_MEDIA_VIDEO",
            Credential::ReadMediaAudio => "android.permission.READ_MEDIA_AUDIO",
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Credential {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Credential::ALL
            .into_iter()
            .find(|credential| credential.id() == s)
            .ok_or_else(|| format!("Unknown credential: {}", s))
    }
}

/// Abstract storage operations a caller can ask for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StorageOperation {
    ReadOwned,
    WriteOwned,
    DeleteOwned,
    ReadShared,
    WriteShared,
    DeleteShared,
}

impl StorageOperation {
    pub const ALL: [StorageOperation; 6] = [
        StorageOperation::ReadOwned,
        StorageOperation::WriteOwned,
        StorageOperation::DeleteOwned,
        StorageOperation::ReadShared,
        StorageOperation::WriteShared,
        StorageOperation::DeleteShared,
    ];

    pub fn is_shared(&self) -> bool {
        matches!(
            self,
            StorageOperation::ReadShared
                | StorageOperation::WriteShared
                | StorageOperation::DeleteShared
        )
    }
}

/// Kinds of shared media with their own read credential on newer platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Images,
    Video,
    Audio,
}

impl MediaKind {
    fn read_credential(&self) -> Credential {
        match self {
            MediaKind::Images => Credential::ReadMediaImages,
            MediaKind::Video => Credential::ReadMediaVideo,
            MediaKind::Audio => Credential::ReadMediaAudio,
        }
    }
}

/// Credentials needed to perform `operation` on a platform in `tier`.
pub fn required_credentials(
    operation: StorageOperation,
    tier: PlatformVersionTier,
) -> BTreeSet<Credential> {
    match operation {
        StorageOperation::ReadShared | StorageOperation::WriteShared => match tier {
            PlatformVersionTier::Tier33Plus => BTreeSet::from([
                Credential::ReadMediaImages,
                Credential::ReadMediaVideo,
                Credential::ReadMediaAudio,
            ]),
            PlatformVersionTier::Tier29 => BTreeSet::from([Credential::ReadExternalStorage]),
            PlatformVersionTier::Legacy => BTreeSet::from([
                Credential::ReadExternalStorage,
                Credential::WriteExternalStorage,
            ]),
        },
        StorageOperation::ReadOwned
        | StorageOperation::WriteOwned
        | StorageOperation::DeleteOwned
        | StorageOperation::DeleteShared => BTreeSet::new(),
    }
}

/// Like [`required_credentials`], narrowed to the single media credential
/// relevant to `media` where the platform splits read access per media kind.
pub fn required_credentials_for_media(
    operation: StorageOperation,
    tier: PlatformVersionTier,
    media: MediaKind,
) -> BTreeSet<Credential> {
    let required = required_credentials(operation, tier);
    if tier == PlatformVersionTier::Tier33Plus {
        required
            .into_iter()
            .filter(|credential| *credential == media.read_credential())
            .collect()
    } else {
        required
    }
}

/// Every credential any shared operation may need on `tier`; what the app asks
/// for on first launch.
pub fn startup_credentials(tier: PlatformVersionTier) -> BTreeSet<Credential> {
    StorageOperation::ALL
        .into_iter()
        .flat_map(|operation| required_credentials(operation, tier))
        .collect()
}

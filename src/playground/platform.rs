//! Platform version detection.
//!
//! The running OS version is read exactly once and then consulted as data.
//! Credential requirements change at the [`PlatformVersionTier`] boundaries,
//! while the recovery path for a denied shared-storage deletion has its own
//! boundary (see [`ConsentChannel`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::playground::error::{PlaygroundError, Result};

/// Environment variable holding the platform API level when the host does not pass it in.
pub const API_LEVEL_ENV_VAR: &str = "PLAYGROUND_API_LEVEL";

/// API level that introduced scoped storage (Android 10).
pub const API_LEVEL_Q: u32 = 29;
/// API level that introduced batch delete requests (Android 11).
pub const API_LEVEL_R: u32 = 30;
/// API level that split read access into per-media credentials (Android 13).
pub const API_LEVEL_TIRAMISU: u32 = 33;

/// Ordered platform bands with a fixed credential-requirement mapping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PlatformVersionTier {
    Legacy,
    Tier29,
    Tier33Plus,
}

impl fmt::Display for PlatformVersionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformVersionTier::Legacy => write!(f, "legacy"),
            PlatformVersionTier::Tier29 => write!(f, "tier29"),
            PlatformVersionTier::Tier33Plus => write!(f, "tier33plus"),
        }
    }
}

/// How the platform lets the user authorize deleting a shared item the app
/// does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentChannel {
    /// The system issues a batch delete-request ticket (API 30+).
    BatchDeleteRequest,
    /// The denial itself carries a recoverable-access signal (API 29 only).
    RecoverableDenial,
    /// No recoverable path exists.
    None,
}

/// The running platform version, captured once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVersion {
    api_level: u32,
}

impl PlatformVersion {
    pub fn from_api_level(api_level: u32) -> Self {
        Self { api_level }
    }

    /// Reads the API level from [`API_LEVEL_ENV_VAR`], loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine, the variable may be set in the process environment
        let _ = dotenvy::dotenv();

        let raw = dotenvy::var(API_LEVEL_ENV_VAR).map_err(|e| {
            PlaygroundError::Configuration(format!("{API_LEVEL_ENV_VAR} is not set: {e}"))
        })?;
        let api_level = raw.trim().parse::<u32>().map_err(|e| {
            PlaygroundError::Configuration(format!(
                "{API_LEVEL_ENV_VAR} must be an integer API level, got {raw:?}: {e}"
            ))
        })?;

        Ok(Self::from_api_level(api_level))
    }

    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    pub fn tier(&self) -> PlatformVersionTier {
        if self.api_level >= API_LEVEL_TIRAMISU {
            PlatformVersionTier::Tier33Plus
        } else if self.api_level >= API_LEVEL_Q {
            PlatformVersionTier::Tier29
        } else {
            PlatformVersionTier::Legacy
        }
    }

    pub fn consent_channel(&self) -> ConsentChannel {
        if self.api_level >= API_LEVEL_R {
            ConsentChannel::BatchDeleteRequest
        } else if self.api_level == API_LEVEL_Q {
            ConsentChannel::RecoverableDenial
        } else {
            ConsentChannel::None
        }
    }
}

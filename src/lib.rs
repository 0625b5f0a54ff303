use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod playground;

pub use crate::playground::access::{
    AccessCoordinator, AccessDecision, CredentialGrant, DenialFollowUp,
};
pub use crate::playground::capabilities::{
    Credential, MediaKind, StorageOperation, required_credentials, required_credentials_for_media,
    startup_credentials,
};
pub use crate::playground::consent::{
    ConsentFlowError, ConsentFlowState, ConsentResolution, ConsentRetryFlow, ConsentTicket,
    TicketId,
};
pub use crate::playground::database::{Database, DatabaseError};
pub use crate::playground::error::{PlaygroundError, Result};
pub use crate::playground::gateway::{DeletionOutcome, ImageList, StorageGateway};
pub use crate::playground::host::{
    CatalogError, CatalogRow, ConsentDecision, ConsentPrompt, CredentialSubsystem, OwnedEntry,
    OwnedStorageMedium, RecoverySignal, SharedMediaCatalog, SortKey,
};
pub use crate::playground::image_streaming::{ImageListUpdate, UpdateTrigger};
pub use crate::playground::images::{
    ExternalImage, ImageIdentity, InternalImage, MediaLocator, PNG_MIME_TYPE, StorageKind,
    decode_image, encode_png,
};
pub use crate::playground::media_store::{MediaEntry, SqliteMediaStore};
pub use crate::playground::platform::{
    API_LEVEL_ENV_VAR, ConsentChannel, PlatformVersion, PlatformVersionTier,
};
pub use crate::playground::storage::OwnedFileStorage;
pub use crate::playground::{
    CredentialRequestReport, DEFAULT_PACKAGE_NAME, PlatformServices, PlaygroundConfig,
    StoragePlayground,
};

static TRACING_GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once per process: stdout plus a daily
/// rolling `storage_playground.*.log` file in `logs_dir`.
fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let mut guards = Vec::with_capacity(2);

        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(stdout_guard);
        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = match tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("storage_playground")
            .filename_suffix("log")
            .build(logs_dir)
        {
            Ok(file_appender) => {
                let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
                guards.push(file_guard);
                Some(
                    Layer::new()
                        .with_writer(non_blocking_file)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Failed to create log file appender in {logs_dir:?}: {e}");
                None
            }
        };

        TRACING_GUARDS.set(Mutex::new(guards)).ok();

        let installed = Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .try_init();
        if let Err(e) = installed {
            eprintln!("Tracing subscriber already installed: {e}");
        }
    });
}

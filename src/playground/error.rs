use thiserror::Error;

use crate::playground::access::AccessDecision;
use crate::playground::consent::ConsentFlowError;
use crate::playground::host::CatalogError;

pub type Result<T> = core::result::Result<T, PlaygroundError>;

#[derive(Error, Debug)]
pub enum PlaygroundError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Image codec error: {0}")]
    ImageCodec(#[from] image::ImageError),

    #[error("Invalid image name: {0}")]
    InvalidImageName(String),

    #[error("Access not granted: {0:?}")]
    AccessNotGranted(AccessDecision),

    #[error("Shared media catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Consent flow error: {0}")]
    ConsentFlow(#[from] ConsentFlowError),

    #[error("Operation guard error: {0}")]
    OperationGuard(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

//! Image list streaming.
//!
//! Every mutation made through the facade re-reads the affected list and
//! pushes the complete new list to subscribers of that storage kind, so
//! presentation code never has to poll or mutate shared lists itself.

mod manager;
mod types;

pub use manager::ImageStreamManager;
pub use types::{ImageListUpdate, UpdateTrigger};

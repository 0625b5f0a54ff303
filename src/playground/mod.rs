use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use image::DynamicImage;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore, broadcast};

pub mod access;
pub mod capabilities;
pub mod consent;
pub mod database;
pub mod error;
pub mod gateway;
pub mod host;
pub mod image_streaming;
pub mod images;
pub mod media_store;
pub mod platform;
pub mod storage;

use crate::init_tracing;

use access::{AccessCoordinator, AccessDecision, CredentialGrant, DenialFollowUp};
use capabilities::{Credential, MediaKind, StorageOperation, startup_credentials};
use consent::{
    ConsentFlowState, ConsentResolution, ConsentRetryFlow, ConsentTicket, PromptTeardown,
};
use error::{PlaygroundError, Result};
use gateway::{DeletionOutcome, ImageList, StorageGateway};
use host::{ConsentPrompt, CredentialSubsystem, OwnedStorageMedium, SharedMediaCatalog};
use image_streaming::{ImageListUpdate, ImageStreamManager, UpdateTrigger};
use images::{ImageIdentity, PNG_EXTENSION, StorageKind};
use media_store::SqliteMediaStore;
use platform::PlatformVersion;
use storage::Storage;

/// Package name used as the owner of shared items when none is configured.
pub const DEFAULT_PACKAGE_NAME: &str = "com.example.storageplayground";

#[derive(Clone, Debug)]
pub struct PlaygroundConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Identity of this app in the shared media store
    pub package_name: String,
}

impl PlaygroundConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            data_dir: data_dir.join(env_suffix),
            logs_dir: logs_dir.join(env_suffix),
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
        }
    }

    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }
}

/// The host-provided collaborators.
///
/// Storage backends are optional: when absent, the app-private directory
/// under `data_dir` and the SQLite reference media store are used.
#[derive(Clone, Debug)]
pub struct PlatformServices {
    pub platform: PlatformVersion,
    pub credentials: Arc<dyn CredentialSubsystem>,
    pub consent_prompt: Arc<dyn ConsentPrompt>,
    pub shared_catalog: Option<Arc<dyn SharedMediaCatalog>>,
    pub owned_storage: Option<Arc<dyn OwnedStorageMedium>>,
}

impl PlatformServices {
    pub fn new(
        platform: PlatformVersion,
        credentials: Arc<dyn CredentialSubsystem>,
        consent_prompt: Arc<dyn ConsentPrompt>,
    ) -> Self {
        Self {
            platform,
            credentials,
            consent_prompt,
            shared_catalog: None,
            owned_storage: None,
        }
    }

    pub fn with_shared_catalog(mut self, catalog: Arc<dyn SharedMediaCatalog>) -> Self {
        self.shared_catalog = Some(catalog);
        self
    }

    pub fn with_owned_storage(mut self, storage: Arc<dyn OwnedStorageMedium>) -> Self {
        self.owned_storage = Some(storage);
        self
    }
}

/// Outcome of asking the user for the credentials an operation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequestReport {
    /// Decision for the operation after the request was answered.
    pub decision: AccessDecision,
    /// How to follow up on each credential the user denied.
    pub follow_ups: BTreeMap<Credential, DenialFollowUp>,
}

pub struct StoragePlayground {
    pub config: PlaygroundConfig,
    platform: PlatformVersion,
    access: RwLock<AccessCoordinator>,
    gateway: StorageGateway,
    credentials: Arc<dyn CredentialSubsystem>,
    consent_prompt: Arc<dyn ConsentPrompt>,
    consent_flow: Arc<Mutex<ConsentRetryFlow>>,
    image_streams: ImageStreamManager,
    /// Serialises repeated invocations of the same operation
    operation_guards: DashMap<StorageOperation, Arc<Semaphore>>,
}

impl std::fmt::Debug for StoragePlayground {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePlayground")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("gateway", &self.gateway)
            .field("credentials", &"<HOST>")
            .field("consent_prompt", &"<HOST>")
            .finish()
    }
}

impl StoragePlayground {
    /// Sets up directories and logging, opens both storage backends and seeds
    /// the grant state from the platform's credential subsystem.
    pub async fn initialize(config: PlaygroundConfig, services: PlatformServices) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory: {:?}", config.data_dir)
        })?;
        std::fs::create_dir_all(&config.logs_dir).map_err(|e| {
            PlaygroundError::LoggingSetup(format!(
                "Failed to create logs directory {:?}: {}",
                config.logs_dir, e
            ))
        })?;

        init_tracing(&config.logs_dir);

        let platform = services.platform;

        let owned = match services.owned_storage {
            Some(owned) => owned,
            None => Storage::new(&config.data_dir)?.owned_medium(),
        };
        let shared = match services.shared_catalog {
            Some(shared) => shared,
            None => {
                let store = SqliteMediaStore::new(
                    &config.data_dir.join("media_store"),
                    platform,
                    config.package_name.clone(),
                )
                .await?;
                Arc::new(store)
            }
        };

        let access = AccessCoordinator::from_platform(platform.tier(), services.credentials.as_ref());

        tracing::info!(
            target: "storage_playground::playground",
            "Initialized for API level {} ({}), package {}",
            platform.api_level(),
            platform.tier(),
            config.package_name
        );

        Ok(Self {
            config,
            platform,
            access: RwLock::new(access),
            gateway: StorageGateway::new(owned, shared, platform),
            credentials: services.credentials,
            consent_prompt: services.consent_prompt,
            consent_flow: Arc::new(Mutex::new(ConsentRetryFlow::new())),
            image_streams: ImageStreamManager::new(),
            operation_guards: DashMap::new(),
        })
    }

    pub fn platform(&self) -> PlatformVersion {
        self.platform
    }

    /// The credentials the app asks for on first launch.
    pub fn startup_credentials(&self) -> BTreeSet<Credential> {
        startup_credentials(self.platform.tier())
    }

    pub async fn credentials(&self) -> Vec<CredentialGrant> {
        self.access.read().await.credentials()
    }

    /// Re-reads grant state from the platform, picking up grants and
    /// revocations made outside the app.
    pub async fn refresh_credentials(&self) {
        let tracked: Vec<Credential> = self.startup_credentials().into_iter().collect();
        let snapshot = self.credentials.check_granted(&tracked);
        self.access.write().await.sync_with_platform(&snapshot);
    }

    pub async fn evaluate(&self, operation: StorageOperation) -> AccessDecision {
        self.refresh_credentials().await;
        self.access.read().await.evaluate(operation)
    }

    /// Asks the user for whatever `operation` is still missing.
    ///
    /// Nothing is requested when the operation may already proceed or when a
    /// missing credential is blocked; the report then carries that decision.
    pub async fn request_credentials(
        &self,
        operation: StorageOperation,
    ) -> Result<CredentialRequestReport> {
        let _permit = self.guard(operation).await?;

        let missing = match self.evaluate(operation).await {
            AccessDecision::RequestCredentials(missing) => missing,
            decision => {
                return Ok(CredentialRequestReport {
                    decision,
                    follow_ups: BTreeMap::new(),
                });
            }
        };

        let follow_ups = self.request_and_record(missing).await;
        let decision = self.access.read().await.evaluate(operation);

        Ok(CredentialRequestReport {
            decision,
            follow_ups,
        })
    }

    /// Asks for every startup credential not yet granted or blocked, as the
    /// app does on first launch. The decision reported is for shared reads.
    pub async fn request_startup_credentials(&self) -> Result<CredentialRequestReport> {
        self.refresh_credentials().await;

        let missing: BTreeSet<Credential> = {
            let access = self.access.read().await;
            self.startup_credentials()
                .into_iter()
                .filter(|c| !access.is_granted(*c) && !access.is_blocked(*c))
                .collect()
        };

        let follow_ups = if missing.is_empty() {
            BTreeMap::new()
        } else {
            self.request_and_record(missing).await
        };
        let decision = self.access.read().await.evaluate(StorageOperation::ReadShared);

        Ok(CredentialRequestReport {
            decision,
            follow_ups,
        })
    }

    async fn request_and_record(
        &self,
        missing: BTreeSet<Credential>,
    ) -> BTreeMap<Credential, DenialFollowUp> {
        let requested: Vec<Credential> = missing.into_iter().collect();
        tracing::debug!(
            target: "storage_playground::playground",
            "Requesting credentials {:?}",
            requested
        );

        let results = self.credentials.request(&requested).await;

        let mut access = self.access.write().await;
        access.record_request_result(&results);
        access.classify_denials(&results, self.credentials.as_ref())
    }

    /// Reads the current list for `kind` and publishes it to subscribers.
    ///
    /// Shared reads need the image credential on the running platform; without
    /// it this fails with [`PlaygroundError::AccessNotGranted`].
    pub async fn load_images(&self, kind: StorageKind) -> Result<ImageList> {
        let operation = match kind {
            StorageKind::Owned => StorageOperation::ReadOwned,
            StorageKind::Shared => StorageOperation::ReadShared,
        };
        let _permit = self.guard(operation).await?;

        if kind == StorageKind::Shared {
            self.refresh_credentials().await;
            let decision = self
                .access
                .read()
                .await
                .evaluate_for_media(StorageOperation::ReadShared, MediaKind::Images);
            if !decision.is_proceed() {
                return Err(PlaygroundError::AccessNotGranted(decision));
            }
        }

        let images = self.gateway.read_all(kind).await?;
        self.image_streams.emit(ImageListUpdate {
            trigger: UpdateTrigger::Loaded,
            kind,
            images: images.clone(),
        });
        Ok(images)
    }

    pub async fn save_image(
        &self,
        kind: StorageKind,
        image: &DynamicImage,
        name: &str,
    ) -> Result<ImageIdentity> {
        let operation = match kind {
            StorageKind::Owned => StorageOperation::WriteOwned,
            StorageKind::Shared => StorageOperation::WriteShared,
        };
        let _permit = self.guard(operation).await?;

        if kind == StorageKind::Shared {
            self.refresh_credentials().await;
        }

        let shared_access = match kind {
            StorageKind::Owned => AccessDecision::Proceed,
            StorageKind::Shared => self.access.read().await.evaluate(StorageOperation::WriteShared),
        };
        let identity = self
            .gateway
            .write_checked(kind, image, name, shared_access)
            .await?;

        self.refresh_list(kind, UpdateTrigger::Saved).await;
        Ok(identity)
    }

    /// Saves a freshly captured image under a generated `<uuid>.png` name.
    pub async fn save_captured_image(
        &self,
        kind: StorageKind,
        image: &DynamicImage,
    ) -> Result<ImageIdentity> {
        let name = format!("{}.{}", uuid::Uuid::new_v4(), PNG_EXTENSION);
        self.save_image(kind, image, &name).await
    }

    /// Deletes one image. A shared deletion the platform refuses is put to the
    /// user through the consent prompt and replayed once if approved.
    pub async fn delete_image(&self, identity: &ImageIdentity) -> Result<ConsentResolution> {
        let operation = match identity.kind() {
            StorageKind::Owned => StorageOperation::DeleteOwned,
            StorageKind::Shared => StorageOperation::DeleteShared,
        };
        let _permit = self.guard(operation).await?;

        let resolution = match self.gateway.delete(identity).await {
            DeletionOutcome::Deleted => ConsentResolution::Deleted,
            DeletionOutcome::Failed => ConsentResolution::Failed,
            DeletionOutcome::Denied(ticket) => self.seek_consent(identity, ticket).await?,
        };

        if resolution == ConsentResolution::Deleted {
            self.refresh_list(identity.kind(), UpdateTrigger::Deleted)
                .await;
        }
        Ok(resolution)
    }

    /// Puts a denied deletion to the user. The flow is only locked to enter
    /// and to resolve, so its state stays observable while the prompt shows;
    /// dropping this future mid-prompt cancels the ticket.
    async fn seek_consent(
        &self,
        identity: &ImageIdentity,
        ticket: ConsentTicket,
    ) -> Result<ConsentResolution> {
        let ticket = {
            let mut flow = self.consent_flow.lock().await;
            flow.begin(identity.clone(), ticket)?;
            flow.take_for_prompt()?
        };
        let mut teardown = PromptTeardown::new(Arc::clone(&self.consent_flow), ticket.id());

        let decision = self.consent_prompt.present(&ticket).await;
        let resolution = self
            .consent_flow
            .lock()
            .await
            .resolve_presented(ticket, decision, &self.gateway)
            .await;
        teardown.disarm();

        Ok(resolution?)
    }

    /// State of the consent flow after the most recent denied deletion, or
    /// `AwaitingUserDecision` while a prompt is showing.
    pub async fn consent_state(&self) -> ConsentFlowState {
        self.consent_flow.lock().await.state()
    }

    /// Receives every list update for `kind` from now on.
    pub fn subscribe(&self, kind: StorageKind) -> broadcast::Receiver<ImageListUpdate> {
        self.image_streams.subscribe(kind)
    }

    async fn guard(&self, operation: StorageOperation) -> Result<OwnedSemaphorePermit> {
        let semaphore = self
            .operation_guards
            .entry(operation)
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        semaphore.acquire_owned().await.map_err(|_| {
            PlaygroundError::OperationGuard(format!(
                "Failed to acquire permit for {:?}",
                operation
            ))
        })
    }

    /// Re-reads `kind` after a mutation. The mutation already succeeded, so a
    /// failed re-read is only logged.
    async fn refresh_list(&self, kind: StorageKind, trigger: UpdateTrigger) {
        if !self.image_streams.has_subscribers(kind) {
            return;
        }

        match self.gateway.read_all(kind).await {
            Ok(images) => {
                self.image_streams.emit(ImageListUpdate {
                    trigger,
                    kind,
                    images,
                });
            }
            Err(e) => {
                tracing::warn!(
                    target: "storage_playground::playground",
                    "Could not re-read {} images after {:?}: {}",
                    kind,
                    trigger,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    use super::*;
    use crate::playground::consent::ConsentTicket;
    use crate::playground::host::{CatalogError, CatalogRow, ConsentDecision, SortKey};
    use crate::playground::images::MediaLocator;
    use crate::playground::storage::OwnedFileStorage;

    pub(crate) const TEST_PACKAGE: &str = "com.example.storageplayground.test";
    pub(crate) const OTHER_PACKAGE: &str = "com.example.camera";

    /// Scriptable permission subsystem. Requests are answered from
    /// `answers` (default: denied) and granted answers stick, like the OS.
    #[derive(Debug, Default)]
    pub(crate) struct FakeCredentialSubsystem {
        granted: StdMutex<HashMap<Credential, bool>>,
        rationale: HashMap<Credential, bool>,
        answers: HashMap<Credential, bool>,
        requests: StdMutex<Vec<Vec<Credential>>>,
    }

    impl FakeCredentialSubsystem {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_granted(self, credential: Credential) -> Self {
            self.granted.lock().unwrap().insert(credential, true);
            self
        }

        pub(crate) fn with_rationale(mut self, credential: Credential, show: bool) -> Self {
            self.rationale.insert(credential, show);
            self
        }

        pub(crate) fn with_answer(mut self, credential: Credential, granted: bool) -> Self {
            self.answers.insert(credential, granted);
            self
        }

        /// Simulates the user toggling a credential in system settings.
        pub(crate) fn set_granted(&self, credential: Credential, granted: bool) {
            self.granted.lock().unwrap().insert(credential, granted);
        }

        pub(crate) fn requests(&self) -> Vec<Vec<Credential>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialSubsystem for FakeCredentialSubsystem {
        fn check_granted(&self, credentials: &[Credential]) -> HashMap<Credential, bool> {
            let granted = self.granted.lock().unwrap();
            credentials
                .iter()
                .map(|c| (*c, granted.get(c).copied().unwrap_or(false)))
                .collect()
        }

        async fn request(&self, credentials: &[Credential]) -> HashMap<Credential, bool> {
            self.requests.lock().unwrap().push(credentials.to_vec());

            let mut granted = self.granted.lock().unwrap();
            credentials
                .iter()
                .map(|c| {
                    let answer = self.answers.get(c).copied().unwrap_or(false);
                    if answer {
                        granted.insert(*c, true);
                    }
                    (*c, answer)
                })
                .collect()
        }

        fn should_show_rationale(&self, credential: Credential) -> bool {
            self.rationale.get(&credential).copied().unwrap_or(false)
        }
    }

    /// Consent prompt that answers `decision`. The first `stalls`
    /// presentations never answer, like a dialog whose screen goes away.
    #[derive(Debug)]
    pub(crate) struct FakeConsentPrompt {
        decision: ConsentDecision,
        stalls: usize,
        presented: AtomicUsize,
    }

    impl FakeConsentPrompt {
        pub(crate) fn new(decision: ConsentDecision) -> Self {
            Self {
                decision,
                stalls: 0,
                presented: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_stalls(mut self, stalls: usize) -> Self {
            self.stalls = stalls;
            self
        }

        pub(crate) fn presented(&self) -> usize {
            self.presented.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConsentPrompt for FakeConsentPrompt {
        async fn present(&self, _ticket: &ConsentTicket) -> ConsentDecision {
            let shown_before = self.presented.fetch_add(1, Ordering::SeqCst);
            if shown_before < self.stalls {
                std::future::pending::<()>().await;
            }
            self.decision
        }
    }

    /// Wraps a store and returns query rows in a scrambled order.
    #[derive(Debug)]
    pub(crate) struct ReorderingCatalog {
        inner: Arc<SqliteMediaStore>,
        rotation: usize,
    }

    impl ReorderingCatalog {
        pub(crate) fn new(inner: Arc<SqliteMediaStore>, rotation: usize) -> Self {
            Self { inner, rotation }
        }
    }

    #[async_trait]
    impl SharedMediaCatalog for ReorderingCatalog {
        async fn query(&self, sort: SortKey) -> core::result::Result<Vec<CatalogRow>, CatalogError> {
            let mut rows = self.inner.query(sort).await?;
            if !rows.is_empty() {
                let shift = self.rotation % rows.len();
                rows.rotate_left(shift);
            }
            if self.rotation % 2 == 1 {
                rows.reverse();
            }
            Ok(rows)
        }

        async fn insert(
            &self,
            display_name: &str,
            mime_type: &str,
            bytes: &[u8],
        ) -> core::result::Result<MediaLocator, CatalogError> {
            self.inner.insert(display_name, mime_type, bytes).await
        }

        async fn delete(
            &self,
            locator: &MediaLocator,
            consent: Option<&ConsentTicket>,
        ) -> core::result::Result<(), CatalogError> {
            self.inner.delete(locator, consent).await
        }

        async fn create_delete_request(
            &self,
            locators: &[MediaLocator],
        ) -> core::result::Result<ConsentTicket, CatalogError> {
            self.inner.create_delete_request(locators).await
        }
    }

    /// Signals `entered` when an insert starts and holds it until `release`.
    #[derive(Debug)]
    pub(crate) struct StallingCatalog {
        inner: Arc<SqliteMediaStore>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl StallingCatalog {
        pub(crate) fn new(
            inner: Arc<SqliteMediaStore>,
            entered: Arc<Notify>,
            release: Arc<Notify>,
        ) -> Self {
            Self {
                inner,
                entered,
                release,
            }
        }
    }

    #[async_trait]
    impl SharedMediaCatalog for StallingCatalog {
        async fn query(&self, sort: SortKey) -> core::result::Result<Vec<CatalogRow>, CatalogError> {
            self.inner.query(sort).await
        }

        async fn insert(
            &self,
            display_name: &str,
            mime_type: &str,
            bytes: &[u8],
        ) -> core::result::Result<MediaLocator, CatalogError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.insert(display_name, mime_type, bytes).await
        }

        async fn delete(
            &self,
            locator: &MediaLocator,
            consent: Option<&ConsentTicket>,
        ) -> core::result::Result<(), CatalogError> {
            self.inner.delete(locator, consent).await
        }

        async fn create_delete_request(
            &self,
            locators: &[MediaLocator],
        ) -> core::result::Result<ConsentTicket, CatalogError> {
            self.inner.create_delete_request(locators).await
        }
    }

    pub(crate) fn sample_image() -> DynamicImage {
        let mut pixels = RgbaImage::new(4, 4);
        pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        pixels.put_pixel(3, 3, Rgba([0, 255, 0, 200]));
        DynamicImage::ImageRgba8(pixels)
    }

    pub(crate) fn sample_png() -> Vec<u8> {
        images::encode_png(&sample_image()).unwrap()
    }

    pub(crate) async fn create_test_store(api_level: u32) -> (SqliteMediaStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteMediaStore::new(
            temp_dir.path(),
            PlatformVersion::from_api_level(api_level),
            TEST_PACKAGE,
        )
        .await
        .unwrap();
        (store, temp_dir)
    }

    /// Gateway over owned storage at `<temp>/files` and a reference store at
    /// `<temp>/media_store`.
    pub(crate) async fn create_test_gateway(
        api_level: u32,
    ) -> (StorageGateway, Arc<SqliteMediaStore>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let platform = PlatformVersion::from_api_level(api_level);

        let owned = Arc::new(OwnedFileStorage::new(temp_dir.path()).unwrap());
        let store = Arc::new(
            SqliteMediaStore::new(&temp_dir.path().join("media_store"), platform, TEST_PACKAGE)
                .await
                .unwrap(),
        );

        let gateway = StorageGateway::new(owned, store.clone(), platform);
        (gateway, store, temp_dir)
    }

    pub(crate) fn create_test_config() -> (PlaygroundConfig, TempDir, TempDir) {
        let data_temp_dir = TempDir::new().expect("Failed to create temp data dir");
        let logs_temp_dir = TempDir::new().expect("Failed to create temp logs dir");
        let config = PlaygroundConfig::new(data_temp_dir.path(), logs_temp_dir.path())
            .with_package_name(TEST_PACKAGE);
        (config, data_temp_dir, logs_temp_dir)
    }

    pub(crate) struct TestPlayground {
        pub playground: Arc<StoragePlayground>,
        pub store: Arc<SqliteMediaStore>,
        pub credentials: Arc<FakeCredentialSubsystem>,
        pub prompt: Arc<FakeConsentPrompt>,
        _data_dir: TempDir,
        _logs_dir: TempDir,
    }

    pub(crate) async fn create_test_playground(
        api_level: u32,
        credentials: FakeCredentialSubsystem,
        decision: ConsentDecision,
    ) -> TestPlayground {
        create_test_playground_with(
            api_level,
            credentials,
            FakeConsentPrompt::new(decision),
            |store| store as Arc<dyn SharedMediaCatalog>,
        )
        .await
    }

    /// Like [`create_test_playground`] with a custom prompt, and the shared
    /// catalog given to the facade built from the reference store by `catalog`.
    pub(crate) async fn create_test_playground_with(
        api_level: u32,
        credentials: FakeCredentialSubsystem,
        prompt: FakeConsentPrompt,
        catalog: impl FnOnce(Arc<SqliteMediaStore>) -> Arc<dyn SharedMediaCatalog>,
    ) -> TestPlayground {
        let (config, data_dir, logs_dir) = create_test_config();
        let platform = PlatformVersion::from_api_level(api_level);

        let store = Arc::new(
            SqliteMediaStore::new(&config.data_dir.join("media_store"), platform, TEST_PACKAGE)
                .await
                .unwrap(),
        );
        let credentials = Arc::new(credentials);
        let prompt = Arc::new(prompt);

        let services = PlatformServices::new(platform, credentials.clone(), prompt.clone())
            .with_shared_catalog(catalog(store.clone()));
        let playground = StoragePlayground::initialize(config, services).await.unwrap();

        TestPlayground {
            playground: Arc::new(playground),
            store,
            credentials,
            prompt,
            _data_dir: data_dir,
            _logs_dir: logs_dir,
        }
    }
}

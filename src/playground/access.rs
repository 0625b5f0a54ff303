//! Credential grant tracking and access decisions.
//!
//! [`AccessCoordinator`] owns the grant state for the running process. It
//! never performs I/O itself: the caller feeds it request results and OS
//! snapshots, and asks it to classify operations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::playground::capabilities::{
    Credential, MediaKind, StorageOperation, required_credentials,
    required_credentials_for_media, startup_credentials,
};
use crate::playground::host::CredentialSubsystem;
use crate::playground::platform::PlatformVersionTier;

/// Result of evaluating a storage operation against the current grant state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    /// Every required credential is granted.
    Proceed,
    /// These credentials are missing and may be requested.
    RequestCredentials(BTreeSet<Credential>),
    /// These credentials are missing and the platform will not show a request
    /// dialog for them any more; the user has to grant them in system settings.
    Blocked(BTreeSet<Credential>),
}

impl AccessDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, AccessDecision::Proceed)
    }
}

/// What the caller should show the user after a credential was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialFollowUp {
    /// Explain why the credential is needed, then ask again.
    ShowRationale,
    /// Send the user to the app's system settings page.
    OpenSettings,
}

/// Last known status of one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialGrant {
    pub credential: Credential,
    pub granted: bool,
    pub granted_at_start: bool,
}

#[derive(Debug, Clone)]
pub struct AccessCoordinator {
    tier: PlatformVersionTier,
    grants: BTreeMap<Credential, bool>,
    granted_at_start: BTreeMap<Credential, bool>,
    blocked: BTreeSet<Credential>,
}

impl AccessCoordinator {
    /// Creates a coordinator with nothing granted.
    pub fn new(tier: PlatformVersionTier) -> Self {
        Self {
            tier,
            grants: BTreeMap::new(),
            granted_at_start: BTreeMap::new(),
            blocked: BTreeSet::new(),
        }
    }

    /// Creates a coordinator seeded from the OS, as on a cold start.
    ///
    /// Grant state is never persisted; it is rebuilt from the credential
    /// subsystem every time the process starts.
    pub fn from_platform(tier: PlatformVersionTier, subsystem: &dyn CredentialSubsystem) -> Self {
        let tracked: Vec<Credential> = startup_credentials(tier).into_iter().collect();
        let snapshot = subsystem.check_granted(&tracked);

        let mut coordinator = Self::new(tier);
        for credential in tracked {
            let granted = snapshot.get(&credential).copied().unwrap_or(false);
            coordinator.grants.insert(credential, granted);
            coordinator.granted_at_start.insert(credential, granted);
        }

        tracing::debug!(
            target: "storage_playground::access",
            "Seeded grant state for {} from platform: {:?}",
            tier,
            coordinator.grants
        );

        coordinator
    }

    pub fn tier(&self) -> PlatformVersionTier {
        self.tier
    }

    pub fn is_granted(&self, credential: Credential) -> bool {
        self.grants.get(&credential).copied().unwrap_or(false)
    }

    pub fn is_blocked(&self, credential: Credential) -> bool {
        self.blocked.contains(&credential)
    }

    /// Classifies `operation` against the current grant state.
    ///
    /// Repeated calls without an intervening state change return the same decision.
    pub fn evaluate(&self, operation: StorageOperation) -> AccessDecision {
        self.decide(required_credentials(operation, self.tier))
    }

    /// Like [`evaluate`](Self::evaluate), only considering the credential for `media`
    /// on platforms that split read access per media kind.
    pub fn evaluate_for_media(
        &self,
        operation: StorageOperation,
        media: MediaKind,
    ) -> AccessDecision {
        self.decide(required_credentials_for_media(operation, self.tier, media))
    }

    fn decide(&self, required: BTreeSet<Credential>) -> AccessDecision {
        let missing: BTreeSet<Credential> = required
            .into_iter()
            .filter(|credential| !self.is_granted(*credential))
            .collect();

        if missing.is_empty() {
            return AccessDecision::Proceed;
        }

        let blocked: BTreeSet<Credential> = missing
            .iter()
            .copied()
            .filter(|credential| self.blocked.contains(credential))
            .collect();

        if blocked.is_empty() {
            AccessDecision::RequestCredentials(missing)
        } else {
            AccessDecision::Blocked(blocked)
        }
    }

    /// Merges the answer to a credential request into the grant state.
    ///
    /// A grant overwrites a previous denial. A denial never revokes an earlier
    /// grant; only [`sync_with_platform`](Self::sync_with_platform) can do that.
    pub fn record_request_result(&mut self, results: &HashMap<Credential, bool>) {
        for (credential, granted) in results {
            if *granted {
                self.grants.insert(*credential, true);
                self.blocked.remove(credential);
            } else {
                self.grants.entry(*credential).or_insert(false);
            }
        }

        tracing::debug!(
            target: "storage_playground::access",
            "Recorded request result {:?}, grant state now {:?}",
            results,
            self.grants
        );
    }

    /// Applies an authoritative snapshot from the OS permission subsystem.
    ///
    /// This is the only path by which a granted credential can become ungranted,
    /// e.g. after the user revoked it in system settings.
    pub fn sync_with_platform(&mut self, snapshot: &HashMap<Credential, bool>) {
        for (credential, granted) in snapshot {
            let previous = self.grants.insert(*credential, *granted);
            if *granted {
                self.blocked.remove(credential);
            } else if previous == Some(true) {
                tracing::info!(
                    target: "storage_playground::access",
                    "Credential {} was revoked outside the app",
                    credential
                );
            }
        }
    }

    /// Decides how to follow up on every credential `results` reports as denied.
    ///
    /// Credentials for which the platform no longer offers a rationale are
    /// marked blocked, so later evaluations return [`AccessDecision::Blocked`]
    /// until they are granted.
    pub fn classify_denials(
        &mut self,
        results: &HashMap<Credential, bool>,
        subsystem: &dyn CredentialSubsystem,
    ) -> BTreeMap<Credential, DenialFollowUp> {
        let mut follow_ups = BTreeMap::new();

        for (credential, granted) in results {
            if *granted || self.is_granted(*credential) {
                continue;
            }

            let follow_up = if subsystem.should_show_rationale(*credential) {
                DenialFollowUp::ShowRationale
            } else {
                self.blocked.insert(*credential);
                DenialFollowUp::OpenSettings
            };

            tracing::warn!(
                target: "storage_playground::access",
                "Credential {} denied, follow-up: {:?}",
                credential,
                follow_up
            );
            follow_ups.insert(*credential, follow_up);
        }

        follow_ups
    }

    /// Snapshot of every credential relevant on this tier.
    pub fn credentials(&self) -> Vec<CredentialGrant> {
        startup_credentials(self.tier)
            .into_iter()
            .map(|credential| CredentialGrant {
                credential,
                granted: self.is_granted(credential),
                granted_at_start: self
                    .granted_at_start
                    .get(&credential)
                    .copied()
                    .unwrap_or(false),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playground::test_utils::FakeCredentialSubsystem;

    fn results(entries: &[(Credential, bool)]) -> HashMap<Credential, bool> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_newest_tier_partial_grant_still_requests_remaining() {
        let mut coordinator = AccessCoordinator::new(PlatformVersionTier::Tier33Plus);

        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::RequestCredentials(BTreeSet::from([
                Credential::ReadMediaImages,
                Credential::ReadMediaVideo,
                Credential::ReadMediaAudio,
            ]))
        );

        coordinator.record_request_result(&results(&[
            (Credential::ReadMediaImages, true),
            (Credential::ReadMediaVideo, false),
            (Credential::ReadMediaAudio, false),
        ]));

        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::RequestCredentials(BTreeSet::from([
                Credential::ReadMediaVideo,
                Credential::ReadMediaAudio,
            ]))
        );
    }

    #[test]
    fn test_legacy_write_requests_only_missing_write_credential() {
        let mut coordinator = AccessCoordinator::new(PlatformVersionTier::Legacy);
        coordinator.record_request_result(&results(&[
            (Credential::ReadExternalStorage, true),
            (Credential::WriteExternalStorage, false),
        ]));

        assert_eq!(
            coordinator.evaluate(StorageOperation::WriteShared),
            AccessDecision::RequestCredentials(BTreeSet::from([Credential::WriteExternalStorage]))
        );
    }

    #[test]
    fn test_owned_operations_always_proceed() {
        let coordinator = AccessCoordinator::new(PlatformVersionTier::Legacy);
        for operation in [
            StorageOperation::ReadOwned,
            StorageOperation::WriteOwned,
            StorageOperation::DeleteOwned,
            StorageOperation::DeleteShared,
        ] {
            assert_eq!(coordinator.evaluate(operation), AccessDecision::Proceed);
        }
    }

    #[test]
    fn test_evaluate_for_media_only_needs_matching_credential() {
        let mut coordinator = AccessCoordinator::new(PlatformVersionTier::Tier33Plus);
        coordinator.record_request_result(&results(&[(Credential::ReadMediaImages, true)]));

        assert_eq!(
            coordinator.evaluate_for_media(StorageOperation::ReadShared, MediaKind::Images),
            AccessDecision::Proceed
        );
        assert_eq!(
            coordinator.evaluate_for_media(StorageOperation::ReadShared, MediaKind::Video),
            AccessDecision::RequestCredentials(BTreeSet::from([Credential::ReadMediaVideo]))
        );
        assert!(!coordinator.evaluate(StorageOperation::ReadShared).is_proceed());
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let coordinator = AccessCoordinator::new(PlatformVersionTier::Tier29);
        let first = coordinator.evaluate(StorageOperation::ReadShared);
        for _ in 0..5 {
            assert_eq!(coordinator.evaluate(StorageOperation::ReadShared), first);
        }
    }

    #[test]
    fn test_denial_never_revokes_grant() {
        let mut coordinator = AccessCoordinator::new(PlatformVersionTier::Tier29);
        coordinator.record_request_result(&results(&[(Credential::ReadExternalStorage, true)]));
        coordinator.record_request_result(&results(&[(Credential::ReadExternalStorage, false)]));

        assert!(coordinator.is_granted(Credential::ReadExternalStorage));
        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::Proceed
        );
    }

    #[test]
    fn test_platform_snapshot_can_revoke() {
        let mut coordinator = AccessCoordinator::new(PlatformVersionTier::Tier29);
        coordinator.record_request_result(&results(&[(Credential::ReadExternalStorage, true)]));
        coordinator.sync_with_platform(&results(&[(Credential::ReadExternalStorage, false)]));

        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::RequestCredentials(BTreeSet::from([Credential::ReadExternalStorage]))
        );
    }

    #[test]
    fn test_proceed_iff_all_required_granted_for_every_reachable_state() {
        let tier = PlatformVersionTier::Tier33Plus;
        let media = [
            Credential::ReadMediaImages,
            Credential::ReadMediaVideo,
            Credential::ReadMediaAudio,
        ];

        // Apply every sequence of two request results drawn from all grant combinations
        let combos: Vec<HashMap<Credential, bool>> = (0u8..8)
            .map(|mask| {
                media
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (*c, mask & (1 << i) != 0))
                    .collect()
            })
            .collect();

        for first in &combos {
            for second in &combos {
                let mut coordinator = AccessCoordinator::new(tier);
                coordinator.record_request_result(first);
                coordinator.record_request_result(second);

                let all_granted = media.iter().all(|c| coordinator.is_granted(*c));
                let decision = coordinator.evaluate(StorageOperation::ReadShared);
                assert_eq!(decision.is_proceed(), all_granted);

                for c in media {
                    let expected = first[&c] || second[&c];
                    assert_eq!(coordinator.is_granted(c), expected);
                }
            }
        }
    }

    #[test]
    fn test_classify_denials_rationale_and_settings() {
        let subsystem = FakeCredentialSubsystem::new()
            .with_rationale(Credential::ReadMediaVideo, true)
            .with_rationale(Credential::ReadMediaAudio, false);
        let mut coordinator = AccessCoordinator::new(PlatformVersionTier::Tier33Plus);
        let answer = results(&[
            (Credential::ReadMediaImages, true),
            (Credential::ReadMediaVideo, false),
            (Credential::ReadMediaAudio, false),
        ]);
        coordinator.record_request_result(&answer);

        let follow_ups = coordinator.classify_denials(&answer, &subsystem);
        assert_eq!(
            follow_ups,
            BTreeMap::from([
                (Credential::ReadMediaVideo, DenialFollowUp::ShowRationale),
                (Credential::ReadMediaAudio, DenialFollowUp::OpenSettings),
            ])
        );

        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::Blocked(BTreeSet::from([Credential::ReadMediaAudio]))
        );

        // Granting in settings shows up through the platform snapshot and clears the block
        coordinator.sync_with_platform(&results(&[
            (Credential::ReadMediaAudio, true),
            (Credential::ReadMediaVideo, true),
        ]));
        assert!(!coordinator.is_blocked(Credential::ReadMediaAudio));
        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::Proceed
        );
    }

    #[test]
    fn test_from_platform_records_start_state() {
        let subsystem = FakeCredentialSubsystem::new().with_granted(Credential::ReadExternalStorage);
        let mut coordinator =
            AccessCoordinator::from_platform(PlatformVersionTier::Legacy, &subsystem);

        assert_eq!(
            coordinator.evaluate(StorageOperation::ReadShared),
            AccessDecision::RequestCredentials(BTreeSet::from([Credential::WriteExternalStorage]))
        );

        coordinator.record_request_result(&results(&[(Credential::WriteExternalStorage, true)]));

        let grants = coordinator.credentials();
        assert_eq!(grants.len(), 2);
        let write = grants
            .iter()
            .find(|g| g.credential == Credential::WriteExternalStorage)
            .unwrap();
        assert!(write.granted);
        assert!(!write.granted_at_start);
        let read = grants
            .iter()
            .find(|g| g.credential == Credential::ReadExternalStorage)
            .unwrap();
        assert!(read.granted);
        assert!(read.granted_at_start);
    }
}

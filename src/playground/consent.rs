//! Consent tickets and the retry flow for denied shared-storage deletions.
//!
//! A denied deletion is not terminal. The gateway turns the denial into a
//! [`ConsentTicket`], the host shows the system consent prompt for it, and
//! [`ConsentRetryFlow`] replays the deletion exactly once if the user approves.
//!
//! ```text
//! Idle ──begin──▶ AwaitingUserDecision ──resolve(Approved)──▶ Resolved(Deleted | Failed)
//!   ▲                     │
//!   │                     └──resolve(Declined) / cancel──▶ Resolved(Denied)
//!   └──────── begin with a fresh ticket ◀── Resolved(*)
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::playground::gateway::{DeletionOutcome, StorageGateway};
use crate::playground::host::{ConsentDecision, ConsentPrompt, RecoverySignal};
use crate::playground::images::{ImageIdentity, MediaLocator};

/// Identifier of a system-issued consent ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TicketId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-time authorization to delete specific shared items.
///
/// Deliberately neither `Clone` nor `Copy`: replaying a deletion moves the
/// ticket, so it cannot be presented twice.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentTicket {
    /// Issued by the system's batch delete-request API. Approval is granted
    /// through the system's own batch UI.
    BatchDeleteRequest {
        id: TicketId,
        locators: Vec<MediaLocator>,
    },
    /// Derived from the recoverable signal carried by a denial. Approval
    /// grants this app access to the single item.
    RecoverableAccess { id: TicketId, locator: MediaLocator },
}

impl ConsentTicket {
    pub fn from_recovery_signal(signal: RecoverySignal) -> Self {
        ConsentTicket::RecoverableAccess {
            id: signal.action_id,
            locator: signal.locator,
        }
    }

    pub fn id(&self) -> TicketId {
        match self {
            ConsentTicket::BatchDeleteRequest { id, .. } => *id,
            ConsentTicket::RecoverableAccess { id, .. } => *id,
        }
    }

    pub fn covers(&self, target: &MediaLocator) -> bool {
        match self {
            ConsentTicket::BatchDeleteRequest { locators, .. } => locators.contains(target),
            ConsentTicket::RecoverableAccess { locator, .. } => locator == target,
        }
    }

    pub fn locators(&self) -> Vec<&MediaLocator> {
        match self {
            ConsentTicket::BatchDeleteRequest { locators, .. } => locators.iter().collect(),
            ConsentTicket::RecoverableAccess { locator, .. } => vec![locator],
        }
    }
}

/// Terminal result of a consent cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentResolution {
    /// The user approved and the replayed deletion succeeded.
    Deleted,
    /// The user declined, dismissed the prompt, or the cycle was cancelled.
    Denied,
    /// The user approved but the replayed deletion failed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentFlowState {
    Idle,
    AwaitingUserDecision,
    Resolved(ConsentResolution),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsentFlowError {
    #[error("A consent decision is already pending")]
    AlreadyAwaiting,

    #[error("No consent decision is pending")]
    NoPendingDecision,

    #[error("Consent ticket {0} was already consumed")]
    TicketAlreadyConsumed(TicketId),

    #[error("Consent ticket {ticket} does not cover {identity}")]
    TicketMismatch {
        ticket: TicketId,
        identity: ImageIdentity,
    },

    #[error("Consent ticket {0} is out on a prompt")]
    TicketOnPrompt(TicketId),

    #[error("Consent ticket {0} is not the one awaiting a decision")]
    StaleTicket(TicketId),
}

#[derive(Debug)]
struct PendingConsent {
    identity: ImageIdentity,
    ticket_id: TicketId,
    /// `None` while lent out through [`ConsentRetryFlow::take_for_prompt`].
    ticket: Option<ConsentTicket>,
}

/// State machine driving one denied deletion at a time through user consent.
#[derive(Debug)]
pub struct ConsentRetryFlow {
    state: ConsentFlowState,
    pending: Option<PendingConsent>,
    consumed: HashSet<TicketId>,
}

impl Default for ConsentRetryFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentRetryFlow {
    pub fn new() -> Self {
        Self {
            state: ConsentFlowState::Idle,
            pending: None,
            consumed: HashSet::new(),
        }
    }

    pub fn state(&self) -> ConsentFlowState {
        self.state
    }

    /// The ticket awaiting a user decision, if any.
    pub fn pending_ticket(&self) -> Option<&ConsentTicket> {
        self.pending.as_ref().and_then(|pending| pending.ticket.as_ref())
    }

    /// Id of the ticket awaiting a decision, whether or not it is lent out.
    pub fn pending_ticket_id(&self) -> Option<TicketId> {
        self.pending.as_ref().map(|pending| pending.ticket_id)
    }

    /// Takes a freshly issued ticket for `identity` and waits for the user.
    ///
    /// Accepted from `Idle` or any `Resolved` state. The ticket must cover the
    /// identity and must not have been consumed by this flow before.
    pub fn begin(
        &mut self,
        identity: ImageIdentity,
        ticket: ConsentTicket,
    ) -> Result<&ConsentTicket, ConsentFlowError> {
        if self.state == ConsentFlowState::AwaitingUserDecision {
            return Err(ConsentFlowError::AlreadyAwaiting);
        }

        let ticket_id = ticket.id();
        if self.consumed.contains(&ticket_id) {
            return Err(ConsentFlowError::TicketAlreadyConsumed(ticket_id));
        }

        let covered = match &identity {
            ImageIdentity::Shared(locator) => ticket.covers(locator),
            ImageIdentity::Owned(_) => false,
        };
        if !covered {
            return Err(ConsentFlowError::TicketMismatch {
                ticket: ticket_id,
                identity,
            });
        }

        tracing::debug!(
            target: "storage_playground::consent",
            "Awaiting user decision for {} with ticket {}",
            identity,
            ticket_id
        );

        self.state = ConsentFlowState::AwaitingUserDecision;
        let pending = self.pending.insert(PendingConsent {
            identity,
            ticket_id,
            ticket: None,
        });
        Ok(pending.ticket.insert(ticket))
    }

    /// Lends the pending ticket out so a prompt can show it without holding
    /// the flow. The flow keeps awaiting a decision; the ticket comes back
    /// through [`resolve_presented`](Self::resolve_presented).
    pub fn take_for_prompt(&mut self) -> Result<ConsentTicket, ConsentFlowError> {
        let pending = self
            .pending
            .as_mut()
            .ok_or(ConsentFlowError::NoPendingDecision)?;
        pending
            .ticket
            .take()
            .ok_or(ConsentFlowError::TicketOnPrompt(pending.ticket_id))
    }

    /// Returns a ticket lent out by [`take_for_prompt`](Self::take_for_prompt)
    /// together with the user's decision.
    pub async fn resolve_presented(
        &mut self,
        ticket: ConsentTicket,
        decision: ConsentDecision,
        gateway: &StorageGateway,
    ) -> Result<ConsentResolution, ConsentFlowError> {
        let ticket_id = ticket.id();
        let pending = self
            .pending
            .as_mut()
            .filter(|pending| pending.ticket_id == ticket_id && pending.ticket.is_none())
            .ok_or(ConsentFlowError::StaleTicket(ticket_id))?;
        pending.ticket = Some(ticket);
        self.resolve(decision, gateway).await
    }

    /// Applies the user's decision. On approval the deletion is replayed once
    /// through `gateway`; the ticket is consumed whatever the outcome.
    pub async fn resolve(
        &mut self,
        decision: ConsentDecision,
        gateway: &StorageGateway,
    ) -> Result<ConsentResolution, ConsentFlowError> {
        let pending = self
            .pending
            .as_mut()
            .ok_or(ConsentFlowError::NoPendingDecision)?;
        let ticket = pending
            .ticket
            .take()
            .ok_or(ConsentFlowError::TicketOnPrompt(pending.ticket_id))?;
        let PendingConsent {
            identity,
            ticket_id,
            ..
        } = self
            .pending
            .take()
            .ok_or(ConsentFlowError::NoPendingDecision)?;
        self.consumed.insert(ticket_id);
        // An interrupted replay must not leave the flow awaiting a decision
        self.state = ConsentFlowState::Resolved(ConsentResolution::Failed);

        let resolution = match decision {
            ConsentDecision::Approved => {
                match gateway.delete_with_consent(&identity, ticket).await {
                    DeletionOutcome::Deleted => ConsentResolution::Deleted,
                    DeletionOutcome::Denied(_) | DeletionOutcome::Failed => {
                        ConsentResolution::Failed
                    }
                }
            }
            ConsentDecision::Declined => ConsentResolution::Denied,
        };

        tracing::info!(
            target: "storage_playground::consent",
            "Consent for {} ({}) resolved as {:?}",
            identity,
            ticket_id,
            resolution
        );

        self.state = ConsentFlowState::Resolved(resolution);
        Ok(resolution)
    }

    /// Discards a pending ticket without touching storage, e.g. when the
    /// surface that showed the prompt is torn down.
    pub fn cancel(&mut self) -> Option<TicketId> {
        let pending = self.pending.take()?;
        let ticket_id = pending.ticket_id;
        self.consumed.insert(ticket_id);
        self.state = ConsentFlowState::Resolved(ConsentResolution::Denied);

        tracing::debug!(
            target: "storage_playground::consent",
            "Cancelled pending consent for {} ({})",
            pending.identity,
            ticket_id
        );

        Some(ticket_id)
    }

    /// Cancels only if `ticket_id` is still the one awaiting a decision.
    pub fn cancel_ticket(&mut self, ticket_id: TicketId) -> bool {
        if self.pending_ticket_id() != Some(ticket_id) {
            return false;
        }
        self.cancel().is_some()
    }

    /// Runs a whole cycle: begin, present the prompt, resolve.
    pub async fn run(
        &mut self,
        identity: ImageIdentity,
        ticket: ConsentTicket,
        prompt: &dyn ConsentPrompt,
        gateway: &StorageGateway,
    ) -> Result<ConsentResolution, ConsentFlowError> {
        let ticket = self.begin(identity, ticket)?;
        let decision = prompt.present(ticket).await;
        self.resolve(decision, gateway).await
    }
}

/// Cancels a lent-out ticket if the cycle presenting it is dropped before the
/// decision comes back, so the next denied deletion can enter the flow.
pub(crate) struct PromptTeardown {
    flow: Arc<Mutex<ConsentRetryFlow>>,
    ticket_id: TicketId,
    armed: bool,
}

impl PromptTeardown {
    pub(crate) fn new(flow: Arc<Mutex<ConsentRetryFlow>>, ticket_id: TicketId) -> Self {
        Self {
            flow,
            ticket_id,
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PromptTeardown {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let ticket_id = self.ticket_id;
        if let Ok(mut flow) = self.flow.try_lock() {
            flow.cancel_ticket(ticket_id);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let flow = Arc::clone(&self.flow);
                handle.spawn(async move {
                    flow.lock().await.cancel_ticket(ticket_id);
                });
            }
            Err(_) => {
                tracing::warn!(
                    target: "storage_playground::consent",
                    "Could not cancel consent ticket {} after teardown",
                    ticket_id
                );
            }
        }
    }
}

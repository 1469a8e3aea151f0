//! The link consumption state machine.
//!
//! `evaluate` is pure: given a locked snapshot of a link and the facts of one
//! view attempt it decides the outcome and the mutation, and the stores apply
//! that decision inside the same critical section that read the row.

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use crate::error::DomainError;
use crate::models::link::{ClientContext, LinkRecord, LinkState};

/// Outcome of checking the supplied password against the link's hash.
///
/// Computed before the row lock is taken; the hash never changes after
/// creation, so the result stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    /// The link has no password.
    NotRequired,
    NotSupplied,
    Matched,
    Mismatched,
}

/// Everything the state machine needs to know about one view attempt.
#[derive(Debug, Clone)]
pub struct ViewAttempt {
    pub password: PasswordCheck,
    pub client: ClientContext,
    /// Whether the vault still held the content key when prefetched.
    pub key_available: bool,
    pub now: DateTime<Utc>,
}

/// Decision for one view attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Refuse the view. `deactivate` destroys the link as part of refusing.
    Reject {
        reason: DomainError,
        deactivate: bool,
    },
    /// Ask for a password. Nothing changes.
    PasswordRequired,
    /// Count one view and reveal the content. `last_view` deactivates.
    Reveal { last_view: bool },
}

impl Transition {
    /// True when applying this transition sets `active = false`.
    pub fn deactivates(&self) -> bool {
        match self {
            Transition::Reject { deactivate, .. } => *deactivate,
            Transition::PasswordRequired => false,
            Transition::Reveal { last_view } => *last_view,
        }
    }

    /// True when the row must be written.
    pub fn mutates(&self) -> bool {
        matches!(self, Transition::Reveal { .. }) || self.deactivates()
    }

    fn reject(reason: DomainError, deactivate: bool) -> Self {
        Transition::Reject { reason, deactivate }
    }
}

/// Evaluates the gates in order. The first gate that fails decides.
pub fn evaluate(link: &LinkRecord, attempt: &ViewAttempt) -> Transition {
    if !link.active {
        return Transition::reject(DomainError::LinkDestroyed, false);
    }

    if link.is_expired_at(attempt.now) {
        return Transition::reject(DomainError::LinkExpired, true);
    }

    if link.views >= link.max_views {
        return Transition::reject(DomainError::LinkConsumed, true);
    }

    if link.password_hash.is_some() {
        match attempt.password {
            PasswordCheck::Matched => {}
            PasswordCheck::Mismatched => {
                return Transition::reject(DomainError::InvalidPassword, false);
            }
            PasswordCheck::NotSupplied | PasswordCheck::NotRequired => {
                return Transition::PasswordRequired;
            }
        }
    }

    if let Some(allowed) = &link.allowed_regions {
        let permitted = attempt
            .client
            .region
            .as_deref()
            .is_some_and(|region| allowed.iter().any(|a| a.eq_ignore_ascii_case(region)));
        if !permitted {
            return Transition::reject(DomainError::RegionBlocked, true);
        }
    }

    if let Some(locked) = &link.device_id {
        let matches = attempt.client.device_id.as_deref().is_some_and(|device| {
            device.len() == locked.len() && bool::from(device.as_bytes().ct_eq(locked.as_bytes()))
        });
        if !matches {
            return Transition::reject(DomainError::DeviceMismatch, true);
        }
    }

    if !attempt.key_available {
        return Transition::reject(DomainError::KeyExpired, true);
    }

    Transition::Reveal {
        last_view: link.views + 1 >= link.max_views,
    }
}

/// Applies a transition to an in-memory row.
pub fn apply(link: &mut LinkRecord, transition: &Transition) {
    if let Transition::Reveal { .. } = transition {
        link.views += 1;
    }
    if transition.deactivates() {
        link.active = false;
    }
}

/// Derived lifecycle state for listings.
pub fn state_of(link: &LinkRecord, now: DateTime<Utc>) -> LinkState {
    derive_state(link.active, link.views, link.max_views, link.expires_at, now)
}

pub fn derive_state(
    active: bool,
    views: i32,
    max_views: i32,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> LinkState {
    if views >= max_views {
        LinkState::Consumed
    } else if expires_at.is_some_and(|at| at <= now) {
        LinkState::Expired
    } else if !active {
        LinkState::Destroyed
    } else {
        LinkState::Active
    }
}

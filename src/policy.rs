//! Role-based authorization for scheduling actions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ProviderId;

/// Who is performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Actor {
    Admin,
    Receptionist,
    Doctor { provider: ProviderId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Book,
    Confirm,
    CheckIn,
    Complete,
    Cancel,
    Reschedule,
    MarkNoShow,
    ViewAgenda,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Book => "book appointments",
            Action::Confirm => "confirm appointments",
            Action::CheckIn => "check in patients",
            Action::Complete => "complete appointments",
            Action::Cancel => "cancel appointments",
            Action::Reschedule => "reschedule appointments",
            Action::MarkNoShow => "mark appointments as no-show",
            Action::ViewAgenda => "view this agenda",
        };
        f.write_str(name)
    }
}

/// Decides whether an actor owns a provider's calendar.
pub trait Authorizer: Send + Sync {
    fn current_actor_owns_provider(&self, actor: &Actor, provider: ProviderId) -> bool;
}

/// Doctors own exactly their own calendar; staff roles own none.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn current_actor_owns_provider(&self, actor: &Actor, provider: ProviderId) -> bool {
        matches!(actor, Actor::Doctor { provider: own } if *own == provider)
    }
}

/// Permission matrix. `owns_provider` is the authorizer's verdict for the
/// provider the action targets.
pub fn permits(actor: &Actor, action: Action, owns_provider: bool) -> bool {
    match (actor, action) {
        (Actor::Admin, Action::CheckIn) => false,
        (Actor::Admin, _) => true,
        (Actor::Receptionist, Action::Complete) => false,
        (Actor::Receptionist, _) => true,
        (Actor::Doctor { .. }, Action::Book | Action::Confirm | Action::CheckIn) => false,
        (Actor::Doctor { .. }, _) => owns_provider,
    }
}

/// Whether the actor is held to the cancellation notice period.
pub fn bound_by_cancellation_notice(actor: &Actor) -> bool {
    !matches!(actor, Actor::Admin)
}

//! Interview lifecycle as an explicit transition table.
//!
//! Every status change in the service goes through [`transition`]; handlers
//! never compare status strings themselves.

use crate::config::ReschedulePolicy;
use crate::models::interview::InterviewStatus;
use crate::models::user::ActorRole;

use InterviewStatus::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewAction {
    Publish,
    Accept,
    Propose { by: ActorRole },
    Reschedule,
    Complete,
    Cancel,
    Reject,
    /// The linked provider event was edited out-of-band.
    ExternalUpdate,
    /// The linked provider event was deleted out-of-band.
    ExternalDelete,
}

impl InterviewAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Accept => "accept",
            Self::Propose { .. } => "propose new slots for",
            Self::Reschedule => "reschedule",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Reject => "reject",
            Self::ExternalUpdate => "apply a calendar update to",
            Self::ExternalDelete => "apply a calendar deletion to",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved {
        from: InterviewStatus,
        to: InterviewStatus,
    },
    /// The action is already reflected in the current state; nothing to write.
    Unchanged(InterviewStatus),
}

impl Transition {
    pub fn source(&self) -> InterviewStatus {
        match *self {
            Self::Moved { from, .. } => from,
            Self::Unchanged(status) => status,
        }
    }

    pub fn target(&self) -> InterviewStatus {
        match *self {
            Self::Moved { to, .. } => to,
            Self::Unchanged(status) => status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot {action} an interview in status {from}")]
pub struct TransitionError {
    pub from: InterviewStatus,
    pub action: &'static str,
}

pub fn transition(
    from: InterviewStatus,
    action: InterviewAction,
) -> Result<Transition, TransitionError> {
    let moved = |to| Ok(Transition::Moved { from, to });
    let invalid = || {
        Err(TransitionError {
            from,
            action: action.name(),
        })
    };

    match (action, from) {
        (InterviewAction::Publish, Draft) => moved(PendingAcceptance),

        (InterviewAction::Accept, PendingAcceptance | PendingConfirmation) => moved(Accepted),
        (InterviewAction::Accept, Accepted) => Ok(Transition::Unchanged(Accepted)),

        // A super user proposing while the vendor still has to accept escalates
        // the interview into confirmation instead of bouncing it back.
        (InterviewAction::Propose { by }, PendingAcceptance)
            if by.is_vendor_side() || by == ActorRole::SuperUser =>
        {
            moved(PendingConfirmation)
        }
        (InterviewAction::Propose { by }, PendingAcceptance | PendingConfirmation) => {
            if by.is_vendor_side() {
                moved(PendingConfirmation)
            } else {
                moved(PendingAcceptance)
            }
        }

        (InterviewAction::Reschedule, _) => moved(PendingAcceptance),

        (InterviewAction::Complete, Accepted) => moved(Completed),

        (InterviewAction::Cancel, Draft | PendingAcceptance | PendingConfirmation | Accepted) => {
            moved(Cancelled)
        }
        (InterviewAction::Reject, Draft | PendingAcceptance | PendingConfirmation | Accepted) => {
            moved(Rejected)
        }

        (InterviewAction::ExternalUpdate, _) => moved(PendingAcceptance),

        (
            InterviewAction::ExternalDelete,
            Draft | PendingAcceptance | PendingConfirmation | Accepted,
        ) => moved(Cancelled),
        (InterviewAction::ExternalDelete, Completed | Rejected | Cancelled) => {
            Ok(Transition::Unchanged(from))
        }

        _ => invalid(),
    }
}

/// Advisory flag surfaced to callers.
pub fn reschedule_allowed(status: InterviewStatus) -> bool {
    status != Accepted
}

pub fn enforce_reschedule_policy(
    status: InterviewStatus,
    policy: ReschedulePolicy,
) -> Result<(), TransitionError> {
    match policy {
        ReschedulePolicy::DenyAccepted if !reschedule_allowed(status) => Err(TransitionError {
            from: status,
            action: InterviewAction::Reschedule.name(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InterviewStatus; 7] = [
        Draft,
        PendingAcceptance,
        PendingConfirmation,
        Accepted,
        Completed,
        Rejected,
        Cancelled,
    ];

    fn propose(by: ActorRole) -> InterviewAction {
        InterviewAction::Propose { by }
    }

    #[test]
    fn accept_moves_pending_states_to_accepted() {
        for from in [PendingAcceptance, PendingConfirmation] {
            assert_eq!(
                transition(from, InterviewAction::Accept).unwrap(),
                Transition::Moved { from, to: Accepted }
            );
        }
    }

    #[test]
    fn accept_on_accepted_is_a_no_op() {
        assert_eq!(
            transition(Accepted, InterviewAction::Accept).unwrap(),
            Transition::Unchanged(Accepted)
        );
    }

    #[test]
    fn accept_is_rejected_outside_pending_states() {
        for from in [Draft, Completed, Rejected, Cancelled] {
            let err = transition(from, InterviewAction::Accept).unwrap_err();
            assert_eq!(err.from, from);
            assert!(err.to_string().contains("accept"));
        }
    }

    #[test]
    fn vendor_proposal_requires_confirmation() {
        assert_eq!(
            transition(PendingAcceptance, propose(ActorRole::Vendor)).unwrap().target(),
            PendingConfirmation
        );
        assert_eq!(
            transition(PendingConfirmation, propose(ActorRole::Vendor)).unwrap().target(),
            PendingConfirmation
        );
    }

    #[test]
    fn buyer_proposal_requires_acceptance() {
        for role in [ActorRole::Msp, ActorRole::Client, ActorRole::Interviewer] {
            assert_eq!(
                transition(PendingConfirmation, propose(role)).unwrap().target(),
                PendingAcceptance
            );
            assert_eq!(
                transition(PendingAcceptance, propose(role)).unwrap().target(),
                PendingAcceptance
            );
        }
    }

    #[test]
    fn super_user_escalates_from_pending_acceptance() {
        assert_eq!(
            transition(PendingAcceptance, propose(ActorRole::SuperUser)).unwrap().target(),
            PendingConfirmation
        );
        assert_eq!(
            transition(PendingConfirmation, propose(ActorRole::SuperUser)).unwrap().target(),
            PendingAcceptance
        );
    }

    #[test]
    fn proposals_need_an_open_negotiation() {
        for from in [Draft, Accepted, Completed, Rejected, Cancelled] {
            assert!(transition(from, propose(ActorRole::Vendor)).is_err());
        }
    }

    #[test]
    fn reschedule_always_restarts_acceptance() {
        for from in ALL {
            assert_eq!(
                transition(from, InterviewAction::Reschedule).unwrap().target(),
                PendingAcceptance
            );
        }
    }

    #[test]
    fn complete_only_from_accepted() {
        assert_eq!(
            transition(Accepted, InterviewAction::Complete).unwrap().target(),
            Completed
        );
        for from in [Draft, PendingAcceptance, PendingConfirmation, Completed, Rejected, Cancelled] {
            assert!(transition(from, InterviewAction::Complete).is_err());
        }
    }

    #[test]
    fn side_exits_from_non_terminal_states() {
        for from in [Draft, PendingAcceptance, PendingConfirmation, Accepted] {
            assert_eq!(transition(from, InterviewAction::Cancel).unwrap().target(), Cancelled);
            assert_eq!(transition(from, InterviewAction::Reject).unwrap().target(), Rejected);
        }
        for from in [Completed, Rejected, Cancelled] {
            assert!(transition(from, InterviewAction::Cancel).is_err());
            assert!(transition(from, InterviewAction::Reject).is_err());
        }
    }

    #[test]
    fn external_delete_is_idempotent_on_closed_interviews() {
        assert_eq!(
            transition(Accepted, InterviewAction::ExternalDelete).unwrap(),
            Transition::Moved { from: Accepted, to: Cancelled }
        );
        for from in [Completed, Rejected, Cancelled] {
            assert_eq!(
                transition(from, InterviewAction::ExternalDelete).unwrap(),
                Transition::Unchanged(from)
            );
        }
    }

    #[test]
    fn external_update_restarts_acceptance_from_anywhere() {
        for from in ALL {
            assert_eq!(
                transition(from, InterviewAction::ExternalUpdate).unwrap().target(),
                PendingAcceptance
            );
        }
    }

    #[test]
    fn publish_only_from_draft() {
        assert_eq!(
            transition(Draft, InterviewAction::Publish).unwrap().target(),
            PendingAcceptance
        );
        assert!(transition(PendingAcceptance, InterviewAction::Publish).is_err());
    }

    #[test]
    fn reschedule_policy_is_explicit() {
        assert!(!reschedule_allowed(Accepted));
        assert!(reschedule_allowed(PendingConfirmation));

        assert!(enforce_reschedule_policy(Accepted, ReschedulePolicy::AllowAccepted).is_ok());
        assert!(enforce_reschedule_policy(Accepted, ReschedulePolicy::DenyAccepted).is_err());
        assert!(enforce_reschedule_policy(Cancelled, ReschedulePolicy::DenyAccepted).is_ok());
    }
}

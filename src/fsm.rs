//! Auction status state machine.
//!
//! Transition table:
//! - `idle`       -> configure -> `configured`
//! - `configured` -> start -> `running`, reset -> `idle`
//! - `running`    -> pause -> `paused`, finish -> `finished`
//! - `paused`     -> resume -> `running`, finish -> `finished`
//! - `finished`   -> archive -> `archived`, reset -> `idle`
//! - `archived`   -> terminal

use crate::error::{AuctionError, AuctionResult};
use crate::models::{AuctionEvent, AuctionStatus};
use serde::{Deserialize, Serialize};

/// Events accepted in `status`
pub fn allowed_events(status: AuctionStatus) -> &'static [AuctionEvent] {
    use AuctionEvent::*;
    match status {
        AuctionStatus::Idle => &[Configure],
        AuctionStatus::Configured => &[Start, Reset],
        AuctionStatus::Running => &[Pause, Finish],
        AuctionStatus::Paused => &[Resume, Finish],
        AuctionStatus::Finished => &[Archive, Reset],
        AuctionStatus::Archived => &[],
    }
}

/// Statuses reachable from `status` in one step
pub fn allowed_transitions(status: AuctionStatus) -> &'static [AuctionStatus] {
    use AuctionStatus::*;
    match status {
        Idle => &[Configured],
        Configured => &[Running, Idle],
        Running => &[Paused, Finished],
        Paused => &[Running, Finished],
        Finished => &[Archived, Idle],
        Archived => &[],
    }
}

pub fn is_transition_allowed(current: AuctionStatus, target: AuctionStatus) -> bool {
    allowed_transitions(current).contains(&target)
}

pub fn is_event_allowed(current: AuctionStatus, event: AuctionEvent) -> bool {
    allowed_events(current).contains(&event)
}

/// Status produced by `event`, or `None` when the event is not allowed
pub fn target_status(current: AuctionStatus, event: AuctionEvent) -> Option<AuctionStatus> {
    use AuctionEvent::*;
    use AuctionStatus::*;
    match (current, event) {
        (Idle, Configure) => Some(Configured),
        (Configured, Start) => Some(Running),
        (Configured, Reset) => Some(Idle),
        (Running, Pause) => Some(Paused),
        (Running, Finish) => Some(Finished),
        (Paused, Resume) => Some(Running),
        (Paused, Finish) => Some(Finished),
        (Finished, Archive) => Some(Archived),
        (Finished, Reset) => Some(Idle),
        _ => None,
    }
}

/// Resolve `event` against `current`, failing with `InvalidTransition`
pub fn next_status(current: AuctionStatus, event: AuctionEvent) -> AuctionResult<AuctionStatus> {
    target_status(current, event).ok_or(AuctionError::InvalidTransition { from: current, event })
}

/// Validate a client-supplied `(event, target)` pair.
///
/// The event must be allowed, the target must be reachable, and the target
/// must be exactly the one the event leads to.
pub fn validate_transition(
    current: AuctionStatus,
    event: AuctionEvent,
    target: AuctionStatus,
) -> Result<(), String> {
    if !is_event_allowed(current, event) {
        return Err(format!("Event '{}' is not allowed in status '{}'", event, current));
    }

    if !is_transition_allowed(current, target) {
        return Err(format!("Transition '{}' -> '{}' is not allowed", current, target));
    }

    match target_status(current, event) {
        Some(expected) if expected == target => Ok(()),
        Some(expected) => Err(format!(
            "Event '{}' leads to '{}', not '{}'",
            event, expected, target
        )),
        None => Err(format!("Event '{}' is not allowed in status '{}'", event, current)),
    }
}

/// Styling hint for operator buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionVariant {
    Primary,
    Secondary,
    Destructive,
}

/// An operator control available in the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailableAction {
    pub event: AuctionEvent,
    pub label: &'static str,
    pub variant: ActionVariant,
}

/// Controls to render for `status`, in table order
pub fn available_actions(status: AuctionStatus) -> Vec<AvailableAction> {
    allowed_events(status)
        .iter()
        .map(|&event| {
            let (label, variant) = match event {
                AuctionEvent::Configure => ("Configure auction", ActionVariant::Primary),
                AuctionEvent::Start => ("Start auction", ActionVariant::Primary),
                AuctionEvent::Pause => ("Pause", ActionVariant::Secondary),
                AuctionEvent::Resume => ("Resume", ActionVariant::Primary),
                AuctionEvent::Finish => ("Finish", ActionVariant::Destructive),
                AuctionEvent::Archive => ("Archive", ActionVariant::Secondary),
                AuctionEvent::Reset => ("Reset", ActionVariant::Secondary),
            };
            AvailableAction { event, label, variant }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pair_matches_table() {
        for status in AuctionStatus::ALL {
            for event in AuctionEvent::ALL {
                let target = target_status(status, event);
                assert_eq!(target.is_some(), is_event_allowed(status, event));
                if let Some(target) = target {
                    assert!(is_transition_allowed(status, target));
                    assert!(validate_transition(status, event, target).is_ok());
                } else {
                    assert_eq!(
                        next_status(status, event),
                        Err(AuctionError::InvalidTransition { from: status, event })
                    );
                }
            }
        }
    }

    #[test]
    fn test_events_and_transitions_have_same_arity() {
        for status in AuctionStatus::ALL {
            assert_eq!(allowed_events(status).len(), allowed_transitions(status).len());
        }
    }

    #[test]
    fn test_archived_is_terminal() {
        assert!(allowed_events(AuctionStatus::Archived).is_empty());
        assert!(allowed_transitions(AuctionStatus::Archived).is_empty());
        for event in AuctionEvent::ALL {
            assert!(target_status(AuctionStatus::Archived, event).is_none());
        }
    }

    #[test]
    fn test_validate_transition_rejects_mismatched_target() {
        // pause is allowed and finished is reachable, but pause leads to paused
        let err = validate_transition(
            AuctionStatus::Running,
            AuctionEvent::Pause,
            AuctionStatus::Finished,
        )
        .unwrap_err();
        assert!(err.contains("leads to 'paused'"));
    }

    #[test]
    fn test_available_actions_follow_allowed_events() {
        let actions = available_actions(AuctionStatus::Paused);
        let events: Vec<_> = actions.iter().map(|a| a.event).collect();
        assert_eq!(events, vec![AuctionEvent::Resume, AuctionEvent::Finish]);
        assert_eq!(actions[1].variant, ActionVariant::Destructive);
        assert!(available_actions(AuctionStatus::Archived).is_empty());
    }
}

//! Lifecycle state machines and who may drive them.
//!
//! The cache records whatever it is given; this module is what producers run
//! before recording, so illegal moves are rejected instead of applied.

use crate::error::Error;
use crate::snapshot::{OrderStatus, StateTag, StatusSnapshot, UploadStatus};
pub use events::{Actor, Role};
use serde::{Deserialize, Serialize};

/// Who is attached to a resource. For uploads only `customer_id` (the owner)
/// is set, and likewise for support chats (the customer who opened it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub customer_id: Option<String>,
    pub restaurant_id: Option<String>,
    pub driver_id: Option<String>,
}

impl Assignment {
    pub fn is_restaurant(&self, actor: &Actor) -> bool {
        actor.role == Role::Restaurant && self.restaurant_id.as_deref() == Some(actor.id.as_str())
    }

    pub fn is_driver(&self, actor: &Actor) -> bool {
        actor.role == Role::Driver && self.driver_id.as_deref() == Some(actor.id.as_str())
    }

    pub fn is_customer(&self, actor: &Actor) -> bool {
        actor.role == Role::Customer && self.customer_id.as_deref() == Some(actor.id.as_str())
    }

    /// True when the actor is any party attached to the resource.
    pub fn involves(&self, actor: &Actor) -> bool {
        self.is_customer(actor) || self.is_restaurant(actor) || self.is_driver(actor)
    }
}

/// Checks that moving from `current` to (`next`, `progress`) is legal for `actor`.
///
/// `current` is `None` when the resource has no recorded state yet, in which case
/// only the initial state of a lifecycle is accepted.
pub fn validate(
    current: Option<&StatusSnapshot>,
    next: StateTag,
    progress: Option<u8>,
    actor: &Actor,
    assignment: &Assignment,
) -> Result<(), Error> {
    if let Some(progress) = progress {
        if progress > 100 {
            return Err(Error::invalid_transition(format!(
                "progress {progress} is outside 0..=100"
            )));
        }
    }

    match (current.map(|snapshot| snapshot.state), next) {
        (None, StateTag::Order(to)) => validate_order_start(to),
        (None, StateTag::Upload(to)) => {
            validate_upload_reporter(actor, assignment)?;
            validate_upload_start(to)
        }
        (Some(StateTag::Order(from)), StateTag::Order(to)) => {
            validate_order(from, to, actor, assignment)
        }
        (Some(StateTag::Upload(from)), StateTag::Upload(to)) => {
            validate_upload_reporter(actor, assignment)?;
            let previous = current.and_then(|snapshot| snapshot.progress);
            validate_upload(from, to, previous, progress)
        }
        (Some(from), to) => Err(Error::invalid_transition(format!(
            "{from} and {to} belong to different lifecycles"
        ))),
    }
}

fn validate_order_start(to: OrderStatus) -> Result<(), Error> {
    if to == OrderStatus::Confirmed {
        Ok(())
    } else {
        Err(Error::invalid_transition(format!(
            "orders start as confirmed, not {to}"
        )))
    }
}

/// Upload progress comes from the owner's client or the processing pipeline.
fn validate_upload_reporter(actor: &Actor, assignment: &Assignment) -> Result<(), Error> {
    if actor.role == Role::System || assignment.is_customer(actor) {
        Ok(())
    } else {
        Err(Error::invalid_transition(format!(
            "{} {} does not own this upload",
            actor.role, actor.id
        )))
    }
}

fn validate_upload_start(to: UploadStatus) -> Result<(), Error> {
    if to == UploadStatus::Uploading {
        Ok(())
    } else {
        Err(Error::invalid_transition(format!(
            "uploads start as uploading, not {to}"
        )))
    }
}

fn validate_order(
    from: OrderStatus,
    to: OrderStatus,
    actor: &Actor,
    assignment: &Assignment,
) -> Result<(), Error> {
    use OrderStatus::*;

    let allowed = match (from, to) {
        (Confirmed, Preparing) | (Preparing, Ready) => assignment.is_restaurant(actor),
        (Ready, PickedUp) | (PickedUp, Delivered) => assignment.is_driver(actor),
        (Confirmed | Preparing | Ready, Cancelled) => assignment.is_restaurant(actor),
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(Error::invalid_transition(format!(
            "{} {} may not move order from {from} to {to}",
            actor.role, actor.id
        )))
    }
}

fn validate_upload(
    from: UploadStatus,
    to: UploadStatus,
    previous: Option<u8>,
    progress: Option<u8>,
) -> Result<(), Error> {
    use UploadStatus::*;

    match (from, to) {
        (Uploading, Uploading | Processing | Failed) => Ok(()),
        (Processing, Processing) => match (previous, progress) {
            (Some(previous), Some(progress)) if progress < previous => {
                Err(Error::invalid_transition(format!(
                    "processing progress may not go back from {previous} to {progress}"
                )))
            }
            _ => Ok(()),
        },
        (Processing, Completed | Failed) => Ok(()),
        _ => Err(Error::invalid_transition(format!(
            "upload may not move from {from} to {to}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn assignment() -> Assignment {
        Assignment {
            customer_id: Some("c1".to_string()),
            restaurant_id: Some("r1".to_string()),
            driver_id: Some("d1".to_string()),
        }
    }

    fn order(state: OrderStatus) -> StatusSnapshot {
        StatusSnapshot::new("O1", state)
    }

    fn check(from: OrderStatus, to: OrderStatus, actor: &Actor) -> Result<(), Error> {
        validate(Some(&order(from)), to.into(), None, actor, &assignment())
    }

    #[test]
    fn test_full_order_lifecycle_is_valid_for_assigned_actors() {
        let restaurant = Actor::new("r1", Role::Restaurant);
        let driver = Actor::new("d1", Role::Driver);

        assert!(validate(
            None,
            OrderStatus::Confirmed.into(),
            None,
            &restaurant,
            &assignment()
        )
        .is_ok());
        assert!(check(OrderStatus::Confirmed, OrderStatus::Preparing, &restaurant).is_ok());
        assert!(check(OrderStatus::Preparing, OrderStatus::Ready, &restaurant).is_ok());
        assert!(check(OrderStatus::Ready, OrderStatus::PickedUp, &driver).is_ok());
        assert!(check(OrderStatus::PickedUp, OrderStatus::Delivered, &driver).is_ok());
    }

    #[test]
    fn test_skipping_or_repeating_states_is_invalid() {
        let restaurant = Actor::new("r1", Role::Restaurant);
        let driver = Actor::new("d1", Role::Driver);

        let err = check(OrderStatus::Confirmed, OrderStatus::Delivered, &driver).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidTransition);

        let err = check(OrderStatus::Preparing, OrderStatus::Preparing, &restaurant).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_transitions_are_role_gated() {
        let driver = Actor::new("d1", Role::Driver);
        let other_restaurant = Actor::new("r2", Role::Restaurant);
        let restaurant = Actor::new("r1", Role::Restaurant);

        assert!(check(OrderStatus::Confirmed, OrderStatus::Preparing, &driver).is_err());
        assert!(check(OrderStatus::Confirmed, OrderStatus::Preparing, &other_restaurant).is_err());
        assert!(check(OrderStatus::Ready, OrderStatus::PickedUp, &restaurant).is_err());
    }

    #[test]
    fn test_cancellation_only_by_restaurant_before_pickup() {
        let restaurant = Actor::new("r1", Role::Restaurant);
        let customer = Actor::new("c1", Role::Customer);

        assert!(check(OrderStatus::Ready, OrderStatus::Cancelled, &restaurant).is_ok());
        assert!(check(OrderStatus::Confirmed, OrderStatus::Cancelled, &customer).is_err());
        assert!(check(OrderStatus::PickedUp, OrderStatus::Cancelled, &restaurant).is_err());
        assert!(check(OrderStatus::Delivered, OrderStatus::Cancelled, &restaurant).is_err());
        assert!(check(OrderStatus::Cancelled, OrderStatus::Cancelled, &restaurant).is_err());
    }

    #[test]
    fn test_orders_must_start_confirmed() {
        let restaurant = Actor::new("r1", Role::Restaurant);
        assert!(validate(
            None,
            OrderStatus::Preparing.into(),
            None,
            &restaurant,
            &assignment()
        )
        .is_err());
    }

    #[test]
    fn test_upload_lifecycle_and_monotonic_progress() {
        let system = Actor::new("pipeline", Role::System);
        let none = Assignment::default();
        let processing = StatusSnapshot::new("U1", UploadStatus::Processing).with_progress(40);

        assert!(validate(None, UploadStatus::Uploading.into(), Some(0), &system, &none).is_ok());
        assert!(validate(
            Some(&processing),
            UploadStatus::Processing.into(),
            Some(60),
            &system,
            &none
        )
        .is_ok());
        assert!(validate(
            Some(&processing),
            UploadStatus::Processing.into(),
            Some(20),
            &system,
            &none
        )
        .is_err());
        assert!(validate(
            Some(&processing),
            UploadStatus::Completed.into(),
            Some(100),
            &system,
            &none
        )
        .is_ok());

        let completed = StatusSnapshot::new("U1", UploadStatus::Completed);
        assert!(validate(
            Some(&completed),
            UploadStatus::Processing.into(),
            None,
            &system,
            &none
        )
        .is_err());
    }

    #[test]
    fn test_only_owner_or_pipeline_reports_uploads() {
        let owner = Assignment {
            customer_id: Some("c1".to_string()),
            ..Default::default()
        };
        let uploading = StatusSnapshot::new("U1", UploadStatus::Uploading);

        assert!(validate(
            Some(&uploading),
            UploadStatus::Processing.into(),
            Some(5),
            &Actor::new("c1", Role::Customer),
            &owner
        )
        .is_ok());
        assert!(validate(
            Some(&uploading),
            UploadStatus::Processing.into(),
            Some(5),
            &Actor::new("c2", Role::Customer),
            &owner
        )
        .is_err());
    }

    #[test]
    fn test_progress_above_hundred_is_rejected() {
        let system = Actor::new("pipeline", Role::System);
        let err = validate(
            None,
            UploadStatus::Uploading.into(),
            Some(101),
            &system,
            &Assignment::default(),
        )
        .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_lifecycles_do_not_mix() {
        let system = Actor::new("pipeline", Role::System);
        let snapshot = order(OrderStatus::Confirmed);
        assert!(validate(
            Some(&snapshot),
            UploadStatus::Processing.into(),
            None,
            &system,
            &assignment()
        )
        .is_err());
    }
}

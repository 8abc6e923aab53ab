//! The visit status state machine.
//!
//! ```text
//! draft ──► pending ──► confirmed ◄──► disputed
//!   │          │            │              │
//!   └──────────┴─────┬──────┴──────────────┘
//!                    ▼
//!                cancelled (terminal)
//! ```
//!
//! Entering or leaving `confirmed` is adjudication and needs an administrator.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  Error, Result,
  visit::{Visit, VisitStatus},
};

/// Who is asking for a transition.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Actor {
  #[default]
  Member,
  Admin,
}

/// How a transition moves a visit relative to the scoring-eligible set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
  /// Becomes eligible: score it and rebalance discovery bonuses.
  Enters,
  /// Stops being eligible: drop its rows and rebalance.
  Leaves,
  /// No point-log impact.
  Unchanged,
}

fn is_allowed(from: VisitStatus, to: VisitStatus) -> bool {
  use VisitStatus::*;
  matches!(
    (from, to),
    (Draft, Pending)
      | (Pending, Confirmed)
      | (Confirmed, Disputed)
      | (Disputed, Confirmed)
      | (Draft | Pending | Confirmed | Disputed, Cancelled)
  )
}

fn needs_admin(from: VisitStatus, to: VisitStatus) -> bool {
  from == VisitStatus::Confirmed || to == VisitStatus::Confirmed
}

/// Validate moving `visit` to `to` on behalf of `actor`.
///
/// Rejections have no side effects. Confirming also requires a bath and at
/// least one participant.
pub fn check_transition(
  visit: &Visit,
  to: VisitStatus,
  actor: Actor,
) -> Result<Eligibility> {
  let from = visit.status;
  if !is_allowed(from, to) {
    return Err(Error::InvalidTransition { visit_id: visit.visit_id, from, to });
  }
  if needs_admin(from, to) && actor != Actor::Admin {
    return Err(Error::Forbidden { visit_id: visit.visit_id, from, to });
  }
  if to.is_scoring_eligible() {
    check_complete(visit)?;
  }

  Ok(match (from.is_scoring_eligible(), to.is_scoring_eligible()) {
    (false, true) => Eligibility::Enters,
    (true, false) => Eligibility::Leaves,
    _ => Eligibility::Unchanged,
  })
}

/// A scoring-eligible visit needs a bath and at least one participant.
pub fn check_complete(visit: &Visit) -> Result<()> {
  if visit.bath_id.is_none() {
    return Err(Error::IncompleteVisit {
      visit_id: visit.visit_id,
      missing:  "no bath assigned",
    });
  }
  if visit.participants.is_empty() {
    return Err(Error::IncompleteVisit {
      visit_id: visit.visit_id,
      missing:  "no participants",
    });
  }
  Ok(())
}

/// Statuses reachable from `from` for `actor`.
pub fn next_statuses(from: VisitStatus, actor: Actor) -> Vec<VisitStatus> {
  use VisitStatus::*;
  [Draft, Pending, Confirmed, Disputed, Cancelled]
    .into_iter()
    .filter(|&to| is_allowed(from, to))
    .filter(|&to| actor == Actor::Admin || !needs_admin(from, to))
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::ids::{BathId, UserId, VisitId};

  fn visit(status: VisitStatus) -> Visit {
    let now = Utc::now();
    Visit {
      visit_id: VisitId(1),
      bath_id: Some(BathId(1)),
      participants: vec![UserId(1)],
      created_by: None,
      status,
      visited_at: now,
      flag_long: false,
      flag_ultraunique: false,
      revision: 1,
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn happy_path() {
    use VisitStatus::*;
    assert_eq!(
      check_transition(&visit(Draft), Pending, Actor::Member).unwrap(),
      Eligibility::Unchanged
    );
    assert_eq!(
      check_transition(&visit(Pending), Confirmed, Actor::Admin).unwrap(),
      Eligibility::Enters
    );
    assert_eq!(
      check_transition(&visit(Confirmed), Disputed, Actor::Admin).unwrap(),
      Eligibility::Leaves
    );
    assert_eq!(
      check_transition(&visit(Disputed), Confirmed, Actor::Admin).unwrap(),
      Eligibility::Enters
    );
  }

  #[test]
  fn skipping_pending_is_invalid() {
    let err =
      check_transition(&visit(VisitStatus::Draft), VisitStatus::Confirmed, Actor::Admin)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
  }

  #[test]
  fn cancelled_is_terminal() {
    use VisitStatus::*;
    for to in [Draft, Pending, Confirmed, Disputed, Cancelled] {
      assert!(check_transition(&visit(Cancelled), to, Actor::Admin).is_err());
    }
    assert!(next_statuses(Cancelled, Actor::Admin).is_empty());
  }

  #[test]
  fn members_cannot_adjudicate() {
    use VisitStatus::*;
    let err = check_transition(&visit(Pending), Confirmed, Actor::Member).unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));
    let err = check_transition(&visit(Confirmed), Cancelled, Actor::Member).unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));
    assert!(check_transition(&visit(Pending), Cancelled, Actor::Member).is_ok());
  }

  #[test]
  fn confirming_incomplete_visit_is_rejected() {
    let mut v = visit(VisitStatus::Pending);
    v.bath_id = None;
    let err = check_transition(&v, VisitStatus::Confirmed, Actor::Admin).unwrap_err();
    assert!(matches!(err, Error::IncompleteVisit { missing: "no bath assigned", .. }));

    let mut v = visit(VisitStatus::Pending);
    v.participants.clear();
    let err = check_transition(&v, VisitStatus::Confirmed, Actor::Admin).unwrap_err();
    assert!(matches!(err, Error::IncompleteVisit { missing: "no participants", .. }));
  }

  #[test]
  fn self_transition_is_invalid() {
    let err =
      check_transition(&visit(VisitStatus::Pending), VisitStatus::Pending, Actor::Admin)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
  }

  #[test]
  fn member_options_from_confirmed_are_empty() {
    assert!(next_statuses(VisitStatus::Confirmed, Actor::Member).is_empty());
    assert_eq!(
      next_statuses(VisitStatus::Confirmed, Actor::Admin),
      vec![VisitStatus::Disputed, VisitStatus::Cancelled]
    );
  }
}

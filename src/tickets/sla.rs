//! SLA deadline computation and breach detection.
//!
//! Deadlines are anchored to the ticket's original `created_at` and are only
//! recomputed on priority change, never on ordinary status transitions. A
//! priority upgrade therefore tightens the deadline relative to when the
//! ticket entered the system instead of restarting the clock.

use crate::shared::enums::TicketPriority;
use crate::tickets::Ticket;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Active SLA policy row for one priority, as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub priority: TicketPriority,
    pub response_time_minutes: i32,
    pub resolution_time_minutes: i32,
}

/// Compute `(response_deadline, resolution_deadline)` from the ticket's
/// creation time. No active policy means no SLA is enforced: both deadlines
/// stay `None` and breach evaluation is suspended.
pub fn deadlines(
    created_at: DateTime<Utc>,
    policy: Option<&SlaPolicy>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match policy {
        Some(p) => (
            Some(created_at + Duration::minutes(i64::from(p.response_time_minutes))),
            Some(created_at + Duration::minutes(i64::from(p.resolution_time_minutes))),
        ),
        None => (None, None),
    }
}

/// Resolution-deadline breach check. Uses the actual resolution time when
/// the ticket has been resolved, otherwise the supplied `now`. Idempotent
/// and side-effect free, so it is safe to call lazily on every read.
pub fn is_breached(ticket: &Ticket, now: DateTime<Utc>) -> bool {
    match ticket.sla_resolution_deadline {
        None => false,
        Some(deadline) => match ticket.resolved_at {
            Some(resolved_at) => resolved_at > deadline,
            None => now > deadline,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::{TicketChannel, TicketStatus};
    use uuid::Uuid;

    fn policy(response: i32, resolution: i32) -> SlaPolicy {
        SlaPolicy {
            priority: TicketPriority::Urgent,
            response_time_minutes: response,
            resolution_time_minutes: resolution,
        }
    }

    fn ticket_at(created_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            title: "printer on fire".to_string(),
            description: String::new(),
            status: TicketStatus::New,
            priority: TicketPriority::Urgent,
            category_id: Uuid::new_v4(),
            channel: TicketChannel::Web,
            requester_id: None,
            requester_name: "Dev User".to_string(),
            requester_email: "dev@example.com".to_string(),
            assignee_id: None,
            team_id: None,
            sla_response_deadline: None,
            sla_resolution_deadline: None,
            sla_breached: false,
            satisfaction_rating: None,
            satisfaction_comment: None,
            created_at,
            updated_at: created_at,
            resolved_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn deadlines_are_exact_minute_offsets_from_creation() {
        let t0 = Utc::now();
        let (response, resolution) = deadlines(t0, Some(&policy(60, 240)));
        assert_eq!(response.unwrap() - t0, Duration::minutes(60));
        assert_eq!(resolution.unwrap() - t0, Duration::minutes(240));
    }

    #[test]
    fn no_active_policy_means_no_deadlines() {
        let (response, resolution) = deadlines(Utc::now(), None);
        assert!(response.is_none());
        assert!(resolution.is_none());
    }

    #[test]
    fn breach_is_suspended_without_a_deadline() {
        let t0 = Utc::now();
        let ticket = ticket_at(t0);
        assert!(!is_breached(&ticket, t0 + Duration::days(365)));
    }

    #[test]
    fn unresolved_ticket_breaches_once_now_passes_deadline() {
        let t0 = Utc::now();
        let mut ticket = ticket_at(t0);
        ticket.sla_resolution_deadline = Some(t0 + Duration::minutes(240));
        assert!(!is_breached(&ticket, t0 + Duration::minutes(239)));
        assert!(is_breached(&ticket, t0 + Duration::minutes(241)));
    }

    #[test]
    fn resolved_ticket_is_judged_by_resolution_time_not_now() {
        let t0 = Utc::now();
        let mut ticket = ticket_at(t0);
        ticket.sla_resolution_deadline = Some(t0 + Duration::minutes(240));
        ticket.resolved_at = Some(t0 + Duration::minutes(100));
        // resolved in time, so a later read never reports breach
        assert!(!is_breached(&ticket, t0 + Duration::minutes(10_000)));

        ticket.resolved_at = Some(t0 + Duration::minutes(300));
        assert!(is_breached(&ticket, t0));
    }
}

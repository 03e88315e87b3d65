//! Ticket lifecycle engine: the status state machine, SLA bookkeeping and
//! satisfaction recording.
//!
//! All ticket mutations flow through this engine. It is generic over the
//! persistence, clock and event-sink ports so the semantics can be exercised
//! in isolation; the HTTP boundary supplies the Postgres-backed
//! implementations.

use crate::shared::enums::{TicketChannel, TicketPriority, TicketStatus};
use crate::shared::error::TicketError;
use crate::tickets::events::{EventSink, TicketEvent};
use crate::tickets::sla;
use crate::tickets::store::{SlaPolicyLookup, TicketStore};
use crate::tickets::{StatusHistory, Ticket};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who performed an operation. Identity arrives from the boundary layer;
/// both fields are optional because unauthenticated channels exist.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: Option<String>,
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Allowed outbound transitions per status. `Closed` is terminal,
/// `Assigned -> New` is unassignment, `Resolved -> InProgress` is reopen.
pub fn allowed_transitions(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::*;
    match from {
        New => &[Assigned, InProgress, Closed],
        Assigned => &[InProgress, PendingUser, Resolved, Closed, New],
        InProgress => &[PendingUser, Resolved, Assigned, Closed],
        PendingUser => &[InProgress, Resolved, Closed],
        Resolved => &[Closed, InProgress],
        Closed => &[],
    }
}

fn is_reopen(from: TicketStatus, to: TicketStatus) -> bool {
    from == TicketStatus::Resolved && to != TicketStatus::Closed
}

/// Input for ticket creation, already validated by the boundary.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category_id: Uuid,
    pub priority: TicketPriority,
    pub channel: TicketChannel,
    pub requester_id: Option<Uuid>,
    pub requester_name: String,
    pub requester_email: String,
}

pub struct LifecycleEngine<C: Clock, E: EventSink> {
    clock: C,
    sink: E,
}

impl<C: Clock, E: EventSink> LifecycleEngine<C, E> {
    pub fn new(clock: C, sink: E) -> Self {
        Self { clock, sink }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub(crate) fn publish(&self, event: &TicketEvent) {
        self.sink.publish(event);
    }

    /// Create a ticket in status `new` with deadlines computed from the
    /// matching active SLA config.
    pub fn create<S>(&self, store: &mut S, input: NewTicket, actor: &Actor) -> Result<Ticket, TicketError>
    where
        S: TicketStore + SlaPolicyLookup,
    {
        let now = self.clock.now();
        let policy = store.active_for(input.priority)?;
        let (response_deadline, resolution_deadline) = sla::deadlines(now, policy.as_ref());

        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            status: TicketStatus::New,
            priority: input.priority,
            category_id: input.category_id,
            channel: input.channel,
            requester_id: input.requester_id,
            requester_name: input.requester_name,
            requester_email: input.requester_email,
            assignee_id: None,
            team_id: None,
            sla_response_deadline: response_deadline,
            sla_resolution_deadline: resolution_deadline,
            sla_breached: false,
            satisfaction_rating: None,
            satisfaction_comment: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
        };
        store.insert(&ticket)?;

        self.publish(&TicketEvent::TicketCreated {
            ticket_id: ticket.id,
            priority: ticket.priority,
            actor_id: actor.id,
        });
        Ok(ticket)
    }

    /// Validate and apply a status transition, recording history and SLA
    /// side effects.
    pub fn apply_transition<S: TicketStore>(
        &self,
        store: &mut S,
        ticket_id: Uuid,
        to: TicketStatus,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<Ticket, TicketError> {
        let mut ticket = store.load(ticket_id)?;
        let from = ticket.status;

        if !allowed_transitions(from).contains(&to) {
            return Err(TicketError::InvalidTransition { from, to });
        }

        let now = self.clock.now();
        ticket.status = to;
        ticket.updated_at = now;

        if to == TicketStatus::Resolved {
            if ticket.resolved_at.is_none() {
                ticket.resolved_at = Some(now);
            }
            // Breach is sticky: once the resolution came in late the flag
            // stays set, even if the ticket is reopened later.
            if let Some(deadline) = ticket.sla_resolution_deadline {
                if now > deadline {
                    ticket.sla_breached = true;
                }
            }
        }
        if to == TicketStatus::Closed {
            ticket.closed_at = Some(now);
        }
        if is_reopen(from, to) {
            ticket.resolved_at = None;
            ticket.closed_at = None;
        }

        store.save(&ticket)?;
        store.append_history(&StatusHistory {
            id: Uuid::new_v4(),
            ticket_id,
            from_status: from,
            to_status: to,
            comment,
            changed_by_id: actor.id,
            changed_by_name: actor.name.clone(),
            changed_at: now,
        })?;

        self.publish(&TicketEvent::TicketStatusChanged {
            ticket_id,
            from,
            to,
            actor_id: actor.id,
        });
        Ok(ticket)
    }

    /// Change priority and recompute both deadlines from the ticket's
    /// original `created_at`, not the time of the change.
    pub fn change_priority<S>(
        &self,
        store: &mut S,
        ticket_id: Uuid,
        priority: TicketPriority,
        actor: &Actor,
    ) -> Result<Ticket, TicketError>
    where
        S: TicketStore + SlaPolicyLookup,
    {
        let mut ticket = store.load(ticket_id)?;
        if ticket.priority == priority {
            return Ok(ticket);
        }
        let from = ticket.priority;

        let policy = store.active_for(priority)?;
        let (response_deadline, resolution_deadline) =
            sla::deadlines(ticket.created_at, policy.as_ref());
        ticket.priority = priority;
        ticket.sla_response_deadline = response_deadline;
        ticket.sla_resolution_deadline = resolution_deadline;
        ticket.updated_at = self.clock.now();
        store.save(&ticket)?;

        self.publish(&TicketEvent::TicketPriorityChanged {
            ticket_id,
            from,
            to: priority,
            actor_id: actor.id,
        });
        Ok(ticket)
    }

    /// Record a satisfaction rating. Only permitted once the ticket is
    /// resolved or closed; the latest rating overwrites any prior one.
    pub fn record_satisfaction<S: TicketStore>(
        &self,
        store: &mut S,
        ticket_id: Uuid,
        rating: i32,
        comment: Option<String>,
        actor: &Actor,
    ) -> Result<Ticket, TicketError> {
        let mut ticket = store.load(ticket_id)?;
        if !matches!(ticket.status, TicketStatus::Resolved | TicketStatus::Closed) {
            return Err(TicketError::InvalidState(ticket.status));
        }
        if !(1..=5).contains(&rating) {
            return Err(TicketError::Validation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }

        ticket.satisfaction_rating = Some(rating);
        ticket.satisfaction_comment = comment;
        ticket.updated_at = self.clock.now();
        store.save(&ticket)?;

        self.publish(&TicketEvent::SatisfactionRecorded {
            ticket_id,
            rating,
            actor_id: actor.id,
        });
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::{FixedClock, MemoryStore, RecordingSink};
    use chrono::Duration;

    fn engine_at(t0: DateTime<Utc>) -> (LifecycleEngine<FixedClock, RecordingSink>, RecordingSink) {
        let sink = RecordingSink::new();
        (LifecycleEngine::new(FixedClock::at(t0), sink.clone()), sink)
    }

    fn new_ticket() -> NewTicket {
        NewTicket {
            title: "VPN drops every hour".to_string(),
            description: "started after the last update".to_string(),
            category_id: Uuid::new_v4(),
            priority: TicketPriority::Urgent,
            channel: TicketChannel::Web,
            requester_id: None,
            requester_name: "Dev User".to_string(),
            requester_email: "dev@example.com".to_string(),
        }
    }

    #[test]
    fn create_computes_deadlines_from_active_config() {
        let t0 = Utc::now();
        let (engine, _) = engine_at(t0);
        let mut store = MemoryStore::with_default_policies();

        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();
        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(
            ticket.sla_response_deadline.unwrap() - ticket.created_at,
            Duration::minutes(60)
        );
        assert_eq!(
            ticket.sla_resolution_deadline.unwrap() - ticket.created_at,
            Duration::minutes(240)
        );
        assert!(!ticket.sla_breached);
    }

    #[test]
    fn create_without_active_config_leaves_deadlines_null() {
        let t0 = Utc::now();
        let (engine, _) = engine_at(t0);
        let mut store = MemoryStore::new();

        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();
        assert!(ticket.sla_response_deadline.is_none());
        assert!(ticket.sla_resolution_deadline.is_none());
    }

    #[test]
    fn transition_to_unknown_ticket_is_not_found() {
        let (engine, _) = engine_at(Utc::now());
        let mut store = MemoryStore::new();
        let err = engine
            .apply_transition(
                &mut store,
                Uuid::new_v4(),
                TicketStatus::Assigned,
                &Actor::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }

    #[test]
    fn disallowed_transition_is_rejected() {
        let (engine, _) = engine_at(Utc::now());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();

        let err = engine
            .apply_transition(
                &mut store,
                ticket.id,
                TicketStatus::Resolved,
                &Actor::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TicketError::InvalidTransition {
                from: TicketStatus::New,
                to: TicketStatus::Resolved
            }
        ));
        // rejection leaves the ticket untouched
        assert_eq!(store.ticket(ticket.id).status, TicketStatus::New);
        assert!(store.history.is_empty());
    }

    #[test]
    fn closed_is_terminal() {
        let (engine, _) = engine_at(Utc::now());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();
        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Closed, &Actor::default(), None)
            .unwrap();

        for to in [
            TicketStatus::New,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::PendingUser,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            let err = engine
                .apply_transition(&mut store, ticket.id, to, &Actor::default(), None)
                .unwrap_err();
            assert!(matches!(err, TicketError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn successful_transition_appends_history_and_emits_event() {
        let (engine, sink) = engine_at(Utc::now());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();

        let actor = Actor {
            id: Some(Uuid::new_v4()),
            name: Some("Agent Kim".to_string()),
        };
        engine
            .apply_transition(
                &mut store,
                ticket.id,
                TicketStatus::Assigned,
                &actor,
                Some("taking this".to_string()),
            )
            .unwrap();

        assert_eq!(store.history.len(), 1);
        let entry = &store.history[0];
        assert_eq!(entry.from_status, TicketStatus::New);
        assert_eq!(entry.to_status, TicketStatus::Assigned);
        assert_eq!(entry.comment.as_deref(), Some("taking this"));
        assert_eq!(entry.changed_by_id, actor.id);

        let events = sink.events();
        assert!(matches!(
            events.last().unwrap(),
            TicketEvent::TicketStatusChanged {
                from: TicketStatus::New,
                to: TicketStatus::Assigned,
                ..
            }
        ));
    }

    #[test]
    fn late_resolution_sets_sticky_breach() {
        let t0 = Utc::now();
        let (engine, _) = engine_at(t0);
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();

        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Assigned, &Actor::default(), None)
            .unwrap();
        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::InProgress, &Actor::default(), None)
            .unwrap();

        engine.clock().advance(Duration::minutes(300));
        let resolved = engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Resolved, &Actor::default(), None)
            .unwrap();
        assert!(resolved.sla_breached);
        assert_eq!(resolved.resolved_at.unwrap(), t0 + Duration::minutes(300));

        // reopen clears the timestamps but the breach flag survives
        let reopened = engine
            .apply_transition(&mut store, ticket.id, TicketStatus::InProgress, &Actor::default(), None)
            .unwrap();
        assert!(reopened.resolved_at.is_none());
        assert!(reopened.closed_at.is_none());
        assert!(reopened.sla_breached);
    }

    #[test]
    fn on_time_resolution_does_not_breach() {
        let t0 = Utc::now();
        let (engine, _) = engine_at(t0);
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();

        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::InProgress, &Actor::default(), None)
            .unwrap();
        engine.clock().advance(Duration::minutes(100));
        let resolved = engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Resolved, &Actor::default(), None)
            .unwrap();
        assert!(!resolved.sla_breached);
        assert_eq!(resolved.resolved_at.unwrap(), t0 + Duration::minutes(100));
    }

    #[test]
    fn closing_sets_closed_at() {
        let t0 = Utc::now();
        let (engine, _) = engine_at(t0);
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();

        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::InProgress, &Actor::default(), None)
            .unwrap();
        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Resolved, &Actor::default(), None)
            .unwrap();
        engine.clock().advance(Duration::minutes(5));
        let closed = engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Closed, &Actor::default(), None)
            .unwrap();
        assert_eq!(closed.closed_at.unwrap(), t0 + Duration::minutes(5));
        // resolved_at from the earlier resolution is preserved on close
        assert_eq!(closed.resolved_at.unwrap(), t0);
    }

    #[test]
    fn deadlines_survive_non_priority_transitions() {
        let (engine, _) = engine_at(Utc::now());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();
        let before = (ticket.sla_response_deadline, ticket.sla_resolution_deadline);

        for to in [
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::PendingUser,
            TicketStatus::InProgress,
        ] {
            engine
                .apply_transition(&mut store, ticket.id, to, &Actor::default(), None)
                .unwrap();
        }
        let after = store.ticket(ticket.id);
        assert_eq!(
            (after.sla_response_deadline, after.sla_resolution_deadline),
            before
        );
    }

    #[test]
    fn priority_change_recomputes_from_original_created_at() {
        let t0 = Utc::now();
        let (engine, _) = engine_at(t0);
        let mut store = MemoryStore::with_default_policies();
        let mut input = new_ticket();
        input.priority = TicketPriority::Low;
        let ticket = engine.create(&mut store, input, &Actor::default()).unwrap();

        engine.clock().advance(Duration::minutes(50));
        let updated = engine
            .change_priority(&mut store, ticket.id, TicketPriority::Urgent, &Actor::default())
            .unwrap();

        assert_eq!(
            updated.sla_response_deadline.unwrap(),
            ticket.created_at + Duration::minutes(60)
        );
        assert_eq!(
            updated.sla_resolution_deadline.unwrap(),
            ticket.created_at + Duration::minutes(240)
        );
    }

    #[test]
    fn satisfaction_requires_resolved_or_closed() {
        let (engine, _) = engine_at(Utc::now());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();

        let err = engine
            .record_satisfaction(&mut store, ticket.id, 5, None, &Actor::default())
            .unwrap_err();
        assert!(matches!(err, TicketError::InvalidState(TicketStatus::New)));

        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::InProgress, &Actor::default(), None)
            .unwrap();
        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Resolved, &Actor::default(), None)
            .unwrap();

        let rated = engine
            .record_satisfaction(&mut store, ticket.id, 4, Some("quick fix".to_string()), &Actor::default())
            .unwrap();
        assert_eq!(rated.satisfaction_rating, Some(4));

        // idempotent overwrite
        let rated = engine
            .record_satisfaction(&mut store, ticket.id, 2, None, &Actor::default())
            .unwrap();
        assert_eq!(rated.satisfaction_rating, Some(2));
        assert_eq!(rated.satisfaction_comment, None);
    }

    #[test]
    fn out_of_range_rating_is_a_validation_error() {
        let (engine, _) = engine_at(Utc::now());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine.create(&mut store, new_ticket(), &Actor::default()).unwrap();
        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::InProgress, &Actor::default(), None)
            .unwrap();
        engine
            .apply_transition(&mut store, ticket.id, TicketStatus::Resolved, &Actor::default(), None)
            .unwrap();

        for rating in [0, 6, -1] {
            let err = engine
                .record_satisfaction(&mut store, ticket.id, rating, None, &Actor::default())
                .unwrap_err();
            assert!(matches!(err, TicketError::Validation(_)));
        }
    }
}

//! Assignment resolver: validates assignee/team consistency against the
//! user directory and applies the assignment. Assigning a `new` ticket
//! implies the `new -> assigned` transition, so callers never have to issue
//! two requests.

use crate::shared::enums::TicketStatus;
use crate::shared::error::TicketError;
use crate::tickets::events::{EventSink, TicketEvent};
use crate::tickets::lifecycle::{Actor, Clock, LifecycleEngine};
use crate::tickets::store::{TicketStore, UserDirectory};
use crate::tickets::Ticket;
use uuid::Uuid;

pub fn assign<S, C, E>(
    engine: &LifecycleEngine<C, E>,
    store: &mut S,
    ticket_id: Uuid,
    assignee_id: Uuid,
    team_id: Option<Uuid>,
    actor: &Actor,
) -> Result<Ticket, TicketError>
where
    S: TicketStore + UserDirectory,
    C: Clock,
    E: EventSink,
{
    if !store.user_exists(assignee_id)? {
        return Err(TicketError::NotFound("assignee"));
    }
    if let Some(team_id) = team_id {
        if !store.is_team_member(assignee_id, team_id)? {
            return Err(TicketError::InvalidAssignment(format!(
                "user {assignee_id} is not a member of team {team_id}"
            )));
        }
    }

    let mut ticket = store.load(ticket_id)?;
    ticket.assignee_id = Some(assignee_id);
    ticket.team_id = team_id;
    ticket.updated_at = engine.now();
    store.save(&ticket)?;

    // Assignment of a fresh ticket carries the status along with it; past
    // that point it only rebinds assignee/team.
    if ticket.status == TicketStatus::New {
        ticket = engine.apply_transition(store, ticket_id, TicketStatus::Assigned, actor, None)?;
    }

    engine.publish(&TicketEvent::TicketAssigned {
        ticket_id,
        assignee_id,
        team_id,
        actor_id: actor.id,
    });
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::{TicketChannel, TicketPriority};
    use crate::shared::test_utils::{FixedClock, MemoryStore, RecordingSink};
    use crate::tickets::lifecycle::NewTicket;
    use chrono::Utc;

    fn setup() -> (
        LifecycleEngine<FixedClock, RecordingSink>,
        RecordingSink,
        MemoryStore,
        Ticket,
    ) {
        let sink = RecordingSink::new();
        let engine = LifecycleEngine::new(FixedClock::at(Utc::now()), sink.clone());
        let mut store = MemoryStore::with_default_policies();
        let ticket = engine
            .create(
                &mut store,
                NewTicket {
                    title: "laptop will not boot".to_string(),
                    description: String::new(),
                    category_id: Uuid::new_v4(),
                    priority: TicketPriority::High,
                    channel: TicketChannel::Phone,
                    requester_id: None,
                    requester_name: "Dev User".to_string(),
                    requester_email: "dev@example.com".to_string(),
                },
                &Actor::default(),
            )
            .unwrap();
        (engine, sink, store, ticket)
    }

    #[test]
    fn assigning_a_new_ticket_auto_transitions() {
        let (engine, sink, mut store, ticket) = setup();
        let agent = store.add_user();

        let assigned = assign(&engine, &mut store, ticket.id, agent, None, &Actor::default()).unwrap();
        assert_eq!(assigned.status, TicketStatus::Assigned);
        assert_eq!(assigned.assignee_id, Some(agent));
        assert_eq!(store.history.len(), 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, TicketEvent::TicketAssigned { .. })));
    }

    #[test]
    fn reassigning_past_new_keeps_the_status() {
        let (engine, _, mut store, ticket) = setup();
        let first = store.add_user();
        let second = store.add_user();

        assign(&engine, &mut store, ticket.id, first, None, &Actor::default()).unwrap();
        engine
            .apply_transition(
                &mut store,
                ticket.id,
                TicketStatus::InProgress,
                &Actor::default(),
                None,
            )
            .unwrap();

        let reassigned =
            assign(&engine, &mut store, ticket.id, second, None, &Actor::default()).unwrap();
        assert_eq!(reassigned.status, TicketStatus::InProgress);
        assert_eq!(reassigned.assignee_id, Some(second));
    }

    #[test]
    fn unknown_assignee_is_not_found() {
        let (engine, _, mut store, ticket) = setup();
        let err = assign(
            &engine,
            &mut store,
            ticket.id,
            Uuid::new_v4(),
            None,
            &Actor::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TicketError::NotFound("assignee")));
    }

    #[test]
    fn assignee_outside_the_team_is_rejected() {
        let (engine, _, mut store, ticket) = setup();
        let agent = store.add_user();
        let team = Uuid::new_v4();

        let err = assign(
            &engine,
            &mut store,
            ticket.id,
            agent,
            Some(team),
            &Actor::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TicketError::InvalidAssignment(_)));

        store.add_member(team, agent);
        let assigned =
            assign(&engine, &mut store, ticket.id, agent, Some(team), &Actor::default()).unwrap();
        assert_eq!(assigned.team_id, Some(team));
    }
}

//! Domain events raised by the lifecycle engine.
//!
//! The sink is a fire-and-forget side channel: implementations must swallow
//! their own failures (at most logging them) so a publish error can never
//! roll back the ticket mutation that produced it.

use crate::shared::enums::{TicketPriority, TicketStatus};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketEvent {
    TicketCreated {
        ticket_id: Uuid,
        priority: TicketPriority,
        actor_id: Option<Uuid>,
    },
    TicketStatusChanged {
        ticket_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        actor_id: Option<Uuid>,
    },
    TicketAssigned {
        ticket_id: Uuid,
        assignee_id: Uuid,
        team_id: Option<Uuid>,
        actor_id: Option<Uuid>,
    },
    TicketPriorityChanged {
        ticket_id: Uuid,
        from: TicketPriority,
        to: TicketPriority,
        actor_id: Option<Uuid>,
    },
    SatisfactionRecorded {
        ticket_id: Uuid,
        rating: i32,
        actor_id: Option<Uuid>,
    },
}

impl TicketEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "ticket.created",
            Self::TicketStatusChanged { .. } => "ticket.status_changed",
            Self::TicketAssigned { .. } => "ticket.assigned",
            Self::TicketPriorityChanged { .. } => "ticket.priority_changed",
            Self::SatisfactionRecorded { .. } => "ticket.satisfaction_recorded",
        }
    }

    pub fn actor_id(&self) -> Option<Uuid> {
        match self {
            Self::TicketCreated { actor_id, .. }
            | Self::TicketStatusChanged { actor_id, .. }
            | Self::TicketAssigned { actor_id, .. }
            | Self::TicketPriorityChanged { actor_id, .. }
            | Self::SatisfactionRecorded { actor_id, .. } => *actor_id,
        }
    }
}

pub trait EventSink {
    fn publish(&self, event: &TicketEvent);
}

/// Sink that drops every event, for callers that do not care about the
/// side channel.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &TicketEvent) {}
}

/// Sink that holds events until the caller drains it. Handlers run the
/// engine inside a database transaction and only forward the drained
/// events to the real sinks after the transaction commits, so a rolled
/// back mutation never leaves audit or notification rows behind.
#[derive(Default)]
pub struct BufferedSink {
    events: Mutex<Vec<TicketEvent>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<TicketEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for BufferedSink {
    fn publish(&self, event: &TicketEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_sink_holds_events_until_drained() {
        let sink = BufferedSink::new();
        sink.publish(&TicketEvent::TicketCreated {
            ticket_id: Uuid::new_v4(),
            priority: TicketPriority::High,
            actor_id: None,
        });
        sink.publish(&TicketEvent::SatisfactionRecorded {
            ticket_id: Uuid::new_v4(),
            rating: 5,
            actor_id: None,
        });

        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].action(), "ticket.created");
        assert_eq!(drained[1].action(), "ticket.satisfaction_recorded");

        // a second drain finds nothing; undelivered events cannot leak
        // into a later request
        assert!(sink.drain().is_empty());
    }
}

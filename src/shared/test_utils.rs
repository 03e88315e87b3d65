//! In-memory implementations of the engine ports, used by unit and
//! integration tests.

use crate::shared::enums::TicketPriority;
use crate::shared::error::TicketError;
use crate::tickets::events::{EventSink, TicketEvent};
use crate::tickets::lifecycle::Clock;
use crate::tickets::sla::SlaPolicy;
use crate::tickets::store::{SlaPolicyLookup, TicketStore, UserDirectory};
use crate::tickets::{StatusHistory, Ticket};
use chrono::{DateTime, Duration, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use uuid::Uuid;

/// Clock pinned to a settable instant.
#[derive(Clone)]
pub struct FixedClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Event sink that records everything it is handed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<TicketEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TicketEvent> {
        self.events.borrow().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &TicketEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// In-memory ticket store implementing every engine port.
#[derive(Default)]
pub struct MemoryStore {
    pub tickets: HashMap<Uuid, Ticket>,
    pub history: Vec<StatusHistory>,
    pub policies: HashMap<TicketPriority, SlaPolicy>,
    pub users: HashSet<Uuid>,
    pub memberships: HashSet<(Uuid, Uuid)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the default SLA table (same offsets the bootstrap
    /// seeder installs).
    pub fn with_default_policies() -> Self {
        let mut store = Self::new();
        for (priority, response, resolution) in [
            (TicketPriority::Urgent, 60, 240),
            (TicketPriority::High, 240, 480),
            (TicketPriority::Medium, 480, 1440),
            (TicketPriority::Low, 1440, 4320),
        ] {
            store.policies.insert(
                priority,
                SlaPolicy {
                    priority,
                    response_time_minutes: response,
                    resolution_time_minutes: resolution,
                },
            );
        }
        store
    }

    pub fn ticket(&self, id: Uuid) -> Ticket {
        self.tickets.get(&id).expect("ticket not in store").clone()
    }

    pub fn add_user(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.insert(id);
        id
    }

    pub fn add_member(&mut self, team_id: Uuid, user_id: Uuid) {
        self.memberships.insert((team_id, user_id));
    }
}

impl TicketStore for MemoryStore {
    fn load(&mut self, id: Uuid) -> Result<Ticket, TicketError> {
        self.tickets
            .get(&id)
            .cloned()
            .ok_or(TicketError::NotFound("ticket"))
    }

    fn insert(&mut self, ticket: &Ticket) -> Result<(), TicketError> {
        self.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    fn save(&mut self, ticket: &Ticket) -> Result<(), TicketError> {
        self.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    fn append_history(&mut self, entry: &StatusHistory) -> Result<(), TicketError> {
        self.history.push(entry.clone());
        Ok(())
    }
}

impl SlaPolicyLookup for MemoryStore {
    fn active_for(&mut self, priority: TicketPriority) -> Result<Option<SlaPolicy>, TicketError> {
        Ok(self.policies.get(&priority).cloned())
    }
}

impl UserDirectory for MemoryStore {
    fn user_exists(&mut self, user_id: Uuid) -> Result<bool, TicketError> {
        Ok(self.users.contains(&user_id))
    }

    fn is_team_member(&mut self, user_id: Uuid, team_id: Uuid) -> Result<bool, TicketError> {
        Ok(self.memberships.contains(&(team_id, user_id)))
    }
}

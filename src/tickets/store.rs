//! Persistence ports consumed by the lifecycle engine, plus the Postgres
//! implementation used by the HTTP handlers.
//!
//! `PgStore` binds a single connection, which the handlers wrap in one
//! transaction per engine operation; `load` takes a `FOR UPDATE` row lock so
//! concurrent transitions against the same ticket serialize instead of both
//! succeeding into inconsistent states.

use crate::shared::enums::TicketPriority;
use crate::shared::error::TicketError;
use crate::shared::schema::{sla_configs, team_memberships, ticket_status_history, tickets, users};
use crate::tickets::sla::SlaPolicy;
use crate::tickets::{StatusHistory, Ticket};
use diesel::prelude::*;
use uuid::Uuid;

pub trait TicketStore {
    fn load(&mut self, id: Uuid) -> Result<Ticket, TicketError>;
    fn insert(&mut self, ticket: &Ticket) -> Result<(), TicketError>;
    fn save(&mut self, ticket: &Ticket) -> Result<(), TicketError>;
    fn append_history(&mut self, entry: &StatusHistory) -> Result<(), TicketError>;
}

pub trait SlaPolicyLookup {
    /// The active config row for a priority, if any. `None` is the
    /// deliberate "no SLA enforced" state, not an error.
    fn active_for(&mut self, priority: TicketPriority) -> Result<Option<SlaPolicy>, TicketError>;
}

/// Existence and membership checks delegated to the user directory.
pub trait UserDirectory {
    fn user_exists(&mut self, user_id: Uuid) -> Result<bool, TicketError>;
    fn is_team_member(&mut self, user_id: Uuid, team_id: Uuid) -> Result<bool, TicketError>;
}

pub struct PgStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl TicketStore for PgStore<'_> {
    fn load(&mut self, id: Uuid) -> Result<Ticket, TicketError> {
        tickets::table
            .find(id)
            .for_update()
            .first::<Ticket>(self.conn)
            .optional()?
            .ok_or(TicketError::NotFound("ticket"))
    }

    fn insert(&mut self, ticket: &Ticket) -> Result<(), TicketError> {
        diesel::insert_into(tickets::table)
            .values(ticket)
            .execute(self.conn)?;
        Ok(())
    }

    fn save(&mut self, ticket: &Ticket) -> Result<(), TicketError> {
        diesel::update(tickets::table.find(ticket.id))
            .set(ticket)
            .execute(self.conn)?;
        Ok(())
    }

    fn append_history(&mut self, entry: &StatusHistory) -> Result<(), TicketError> {
        diesel::insert_into(ticket_status_history::table)
            .values(entry)
            .execute(self.conn)?;
        Ok(())
    }
}

impl SlaPolicyLookup for PgStore<'_> {
    fn active_for(&mut self, priority: TicketPriority) -> Result<Option<SlaPolicy>, TicketError> {
        let row = sla_configs::table
            .filter(sla_configs::priority.eq(priority))
            .filter(sla_configs::is_active.eq(true))
            .select((
                sla_configs::priority,
                sla_configs::response_time_minutes,
                sla_configs::resolution_time_minutes,
            ))
            .first::<(TicketPriority, i32, i32)>(self.conn)
            .optional()?;
        Ok(row.map(|(priority, response_time_minutes, resolution_time_minutes)| SlaPolicy {
            priority,
            response_time_minutes,
            resolution_time_minutes,
        }))
    }
}

impl UserDirectory for PgStore<'_> {
    fn user_exists(&mut self, user_id: Uuid) -> Result<bool, TicketError> {
        let count: i64 = users::table
            .find(user_id)
            .count()
            .get_result(self.conn)?;
        Ok(count > 0)
    }

    fn is_team_member(&mut self, user_id: Uuid, team_id: Uuid) -> Result<bool, TicketError> {
        let count: i64 = team_memberships::table
            .filter(team_memberships::team_id.eq(team_id))
            .filter(team_memberships::user_id.eq(user_id))
            .count()
            .get_result(self.conn)?;
        Ok(count > 0)
    }
}

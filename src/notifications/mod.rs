//! In-app notifications. A second consumer of the engine's event stream:
//! where the audit sink records what happened, this one tells the people
//! involved. Rows are plain table entries the frontend polls and marks read.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::enums::UserRole;
use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{notifications, tickets, users};
use crate::shared::state::{AppState, DbPool};
use crate::tickets::events::{EventSink, TicketEvent};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub ticket_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// The ticket fields notification routing needs.
#[derive(Debug, Clone)]
pub struct TicketContext {
    pub title: String,
    pub requester_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
}

/// Who gets a row for a given event. The actor never notifies themselves;
/// ticket creation fans out to the support staff, everything else goes to
/// the requester and/or assignee involved.
pub fn recipients(event: &TicketEvent, ticket: &TicketContext, staff: &[Uuid]) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = match event {
        TicketEvent::TicketCreated { .. } => staff.to_vec(),
        TicketEvent::TicketAssigned { assignee_id, .. } => vec![*assignee_id],
        TicketEvent::TicketStatusChanged { .. } => ticket
            .requester_id
            .into_iter()
            .chain(ticket.assignee_id)
            .collect(),
        TicketEvent::TicketPriorityChanged { .. } => ticket.assignee_id.into_iter().collect(),
        TicketEvent::SatisfactionRecorded { .. } => ticket.assignee_id.into_iter().collect(),
    };
    if let Some(actor) = event.actor_id() {
        out.retain(|id| *id != actor);
    }
    out.dedup();
    out
}

fn title_and_message(event: &TicketEvent, ticket: &TicketContext) -> (String, String) {
    match event {
        TicketEvent::TicketCreated { priority, .. } => (
            format!("New ticket: {}", ticket.title),
            format!("A new {priority} priority ticket has been created."),
        ),
        TicketEvent::TicketAssigned { .. } => (
            format!("Ticket assigned: {}", ticket.title),
            "You have been assigned to this ticket.".to_string(),
        ),
        TicketEvent::TicketStatusChanged { from, to, .. } => (
            format!("Ticket updated: {}", ticket.title),
            format!("Status changed from {from} to {to}."),
        ),
        TicketEvent::TicketPriorityChanged { from, to, .. } => (
            format!("Ticket updated: {}", ticket.title),
            format!("Priority changed from {from} to {to}."),
        ),
        TicketEvent::SatisfactionRecorded { rating, .. } => (
            format!("Ticket rated: {}", ticket.title),
            format!("The requester rated this ticket {rating}/5."),
        ),
    }
}

/// Event sink that turns engine events into notification rows. Like the
/// audit sink, every failure is logged and swallowed; the ticket mutation
/// already committed and must not be affected.
pub struct NotificationSink {
    pool: DbPool,
}

impl NotificationSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn deliver(&self, event: &TicketEvent) -> Result<(), TicketError> {
        let ticket_id = match event {
            TicketEvent::TicketCreated { ticket_id, .. }
            | TicketEvent::TicketStatusChanged { ticket_id, .. }
            | TicketEvent::TicketAssigned { ticket_id, .. }
            | TicketEvent::TicketPriorityChanged { ticket_id, .. }
            | TicketEvent::SatisfactionRecorded { ticket_id, .. } => *ticket_id,
        };

        let mut conn = self.pool.get()?;
        let ticket = tickets::table
            .find(ticket_id)
            .select((tickets::title, tickets::requester_id, tickets::assignee_id))
            .first::<(String, Option<Uuid>, Option<Uuid>)>(&mut conn)
            .optional()?
            .map(|(title, requester_id, assignee_id)| TicketContext {
                title,
                requester_id,
                assignee_id,
            });
        let Some(ticket) = ticket else {
            return Ok(());
        };

        let staff: Vec<Uuid> = if matches!(event, TicketEvent::TicketCreated { .. }) {
            users::table
                .filter(users::is_active.eq(true))
                .filter(users::role.eq_any([
                    UserRole::SupportStaff,
                    UserRole::Manager,
                    UserRole::Admin,
                ]))
                .select(users::id)
                .load(&mut conn)?
        } else {
            Vec::new()
        };

        let (title, message) = title_and_message(event, &ticket);
        let now = Utc::now();
        let rows: Vec<Notification> = recipients(event, &ticket, &staff)
            .into_iter()
            .map(|recipient_id| Notification {
                id: Uuid::new_v4(),
                recipient_id,
                kind: event.action().to_string(),
                title: title.clone(),
                message: message.clone(),
                ticket_id: Some(ticket_id),
                is_read: false,
                created_at: now,
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }

        diesel::insert_into(notifications::table)
            .values(&rows)
            .execute(&mut conn)?;
        Ok(())
    }
}

impl EventSink for NotificationSink {
    fn publish(&self, event: &TicketEvent) {
        if let Err(e) = self.deliver(event) {
            warn!("notification sink: failed to deliver {}: {e}", event.action());
        }
    }
}

/// Comment notifications are not engine events; the comment handler calls
/// this directly. Internal comments only reach the assignee, public ones
/// reach requester and assignee.
pub fn notify_comment(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    ticket: &TicketContext,
    is_internal: bool,
    author_id: Option<Uuid>,
) -> Result<(), TicketError> {
    let mut recipient_ids: Vec<Uuid> = if is_internal {
        ticket.assignee_id.into_iter().collect()
    } else {
        ticket
            .requester_id
            .into_iter()
            .chain(ticket.assignee_id)
            .collect()
    };
    if let Some(author) = author_id {
        recipient_ids.retain(|id| *id != author);
    }
    recipient_ids.dedup();
    if recipient_ids.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let rows: Vec<Notification> = recipient_ids
        .into_iter()
        .map(|recipient_id| Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind: "ticket.comment".to_string(),
            title: format!("New comment on: {}", ticket.title),
            message: "A new comment has been added to the ticket.".to_string(),
            ticket_id: Some(ticket_id),
            is_read: false,
            created_at: now,
        })
        .collect();

    diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub recipient_id: Uuid,
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
) -> Result<ApiResponse<Vec<Notification>>, TicketError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = notifications::table
        .filter(notifications::recipient_id.eq(query.recipient_id))
        .into_boxed();
    if query.unread_only.unwrap_or(false) {
        q = q.filter(notifications::is_read.eq(false));
    }

    let rows: Vec<Notification> = q
        .order(notifications::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(ApiResponse::ok(rows))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Notification>, TicketError> {
    let mut conn = state.conn.get()?;

    let row: Notification = diesel::update(notifications::table.find(id))
        .set(notifications::is_read.eq(true))
        .get_result(&mut conn)
        .optional()?
        .ok_or(TicketError::NotFound("notification"))?;

    Ok(ApiResponse::ok(row))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
) -> Result<ApiResponse<serde_json::Value>, TicketError> {
    let mut conn = state.conn.get()?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::recipient_id.eq(query.recipient_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)?;

    Ok(ApiResponse::ok(serde_json::json!({ "updated": updated })))
}

pub fn configure_notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read_all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::{TicketPriority, TicketStatus};

    fn ctx(requester: Option<Uuid>, assignee: Option<Uuid>) -> TicketContext {
        TicketContext {
            title: "monitor flickers".to_string(),
            requester_id: requester,
            assignee_id: assignee,
        }
    }

    #[test]
    fn status_change_notifies_requester_and_assignee_but_never_the_actor() {
        let requester = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        let event = TicketEvent::TicketStatusChanged {
            ticket_id: Uuid::new_v4(),
            from: TicketStatus::Assigned,
            to: TicketStatus::InProgress,
            actor_id: Some(assignee),
        };

        let ids = recipients(&event, &ctx(Some(requester), Some(assignee)), &[]);
        assert_eq!(ids, vec![requester]);
    }

    #[test]
    fn creation_fans_out_to_staff_minus_the_creator() {
        let creator = Uuid::new_v4();
        let staff = [creator, Uuid::new_v4(), Uuid::new_v4()];
        let event = TicketEvent::TicketCreated {
            ticket_id: Uuid::new_v4(),
            priority: TicketPriority::Urgent,
            actor_id: Some(creator),
        };

        let ids = recipients(&event, &ctx(Some(creator), None), &staff);
        assert_eq!(ids, vec![staff[1], staff[2]]);
    }

    #[test]
    fn assignment_notifies_the_new_assignee() {
        let assignee = Uuid::new_v4();
        let event = TicketEvent::TicketAssigned {
            ticket_id: Uuid::new_v4(),
            assignee_id: assignee,
            team_id: None,
            actor_id: Some(Uuid::new_v4()),
        };

        let ids = recipients(&event, &ctx(None, Some(assignee)), &[]);
        assert_eq!(ids, vec![assignee]);
    }

    #[test]
    fn self_assignment_stays_silent() {
        let assignee = Uuid::new_v4();
        let event = TicketEvent::TicketAssigned {
            ticket_id: Uuid::new_v4(),
            assignee_id: assignee,
            team_id: None,
            actor_id: Some(assignee),
        };

        assert!(recipients(&event, &ctx(None, Some(assignee)), &[]).is_empty());
    }

    #[test]
    fn anonymous_ticket_has_no_status_change_recipients() {
        let event = TicketEvent::TicketStatusChanged {
            ticket_id: Uuid::new_v4(),
            from: TicketStatus::New,
            to: TicketStatus::Closed,
            actor_id: None,
        };

        assert!(recipients(&event, &ctx(None, None), &[]).is_empty());
    }
}

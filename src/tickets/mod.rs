pub mod analytics;
pub mod assignment;
pub mod events;
pub mod lifecycle;
pub mod sla;
pub mod store;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditEventSink;
use crate::notifications::{self, NotificationSink, TicketContext};
use crate::shared::enums::{TicketChannel, TicketPriority, TicketStatus};
use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{
    sla_configs, ticket_attachments, ticket_categories, ticket_comments, ticket_status_history,
    tickets,
};
use crate::shared::state::AppState;
use crate::tickets::events::{BufferedSink, EventSink, TicketEvent};
use crate::tickets::lifecycle::{Actor, LifecycleEngine, NewTicket, SystemClock};
use crate::tickets::store::{PgStore, TicketStore};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets, treat_none_as_null = true)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category_id: Uuid,
    pub channel: TicketChannel,
    pub requester_id: Option<Uuid>,
    pub requester_name: String,
    pub requester_email: String,
    pub assignee_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub sla_response_deadline: Option<DateTime<Utc>>,
    pub sla_resolution_deadline: Option<DateTime<Utc>>,
    pub sla_breached: bool,
    pub satisfaction_rating: Option<i32>,
    pub satisfaction_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Read-time breach evaluation. The stored flag only ever goes from
    /// false to true, so this is idempotent and never persisted.
    pub fn with_breach_evaluated(mut self, now: DateTime<Utc>) -> Self {
        if !self.sla_breached && sla::is_breached(&self, now) {
            self.sla_breached = true;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_categories)]
pub struct TicketCategory {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_attachments)]
pub struct TicketAttachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub file_size: i32,
    pub mime_type: String,
    pub uploaded_by_id: Option<Uuid>,
    pub uploaded_by_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_status_history)]
pub struct StatusHistory {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub from_status: TicketStatus,
    pub to_status: TicketStatus,
    pub comment: Option<String>,
    pub changed_by_id: Option<Uuid>,
    pub changed_by_name: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = sla_configs)]
pub struct SlaConfig {
    pub id: Uuid,
    pub priority: TicketPriority,
    pub response_time_minutes: i32,
    pub resolution_time_minutes: i32,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Uuid,
    pub priority: TicketPriority,
    pub channel: Option<TicketChannel>,
    pub requester_id: Option<Uuid>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub category_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assignee_id: Uuid,
    pub team_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: TicketStatus,
    pub comment: Option<String>,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SatisfactionRequest {
    pub rating: i32,
    pub comment: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub is_internal: Option<bool>,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentRequest {
    pub filename: String,
    pub file_size: Option<i32>,
    pub mime_type: Option<String>,
    pub uploaded_by_id: Option<Uuid>,
    pub uploaded_by_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertSlaConfigRequest {
    pub response_time_minutes: i32,
    pub resolution_time_minutes: i32,
    #[serde(default)]
    pub description: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Engine with a buffering sink: events stay local to the request until
/// the wrapping transaction has committed, then `dispatch` forwards them.
fn engine() -> LifecycleEngine<SystemClock, BufferedSink> {
    LifecycleEngine::new(SystemClock, BufferedSink::new())
}

fn dispatch(state: &AppState, events: Vec<TicketEvent>) {
    let audit = AuditEventSink::new(state.conn.clone());
    let notify = NotificationSink::new(state.conn.clone());
    for event in &events {
        audit.publish(event);
        notify.publish(event);
    }
}

fn actor(id: Option<Uuid>, name: Option<String>) -> Actor {
    Actor { id, name }
}

fn category_exists(conn: &mut PgConnection, id: Uuid) -> Result<(), TicketError> {
    let count: i64 = ticket_categories::table
        .find(id)
        .count()
        .get_result(conn)?;
    if count == 0 {
        return Err(TicketError::Validation("category_id not found".to_string()));
    }
    Ok(())
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<ApiResponse<Ticket>, TicketError> {
    let eng = engine();
    let mut conn = state.conn.get()?;

    let ticket = conn.transaction::<Ticket, TicketError, _>(|conn| {
        category_exists(conn, req.category_id)?;
        let mut store = PgStore::new(conn);
        eng.create(
            &mut store,
            NewTicket {
                title: req.title,
                description: req.description,
                category_id: req.category_id,
                priority: req.priority,
                channel: req.channel.unwrap_or_default(),
                requester_id: req.requester_id,
                requester_name: req.requester_name.unwrap_or_else(|| "Dev User".to_string()),
                requester_email: req
                    .requester_email
                    .unwrap_or_else(|| "dev@example.com".to_string()),
            },
            &actor(req.requester_id, None),
        )
    })?;
    dispatch(&state, eng.sink().drain());

    Ok(ApiResponse::created(ticket))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<Ticket>>, TicketError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = tickets::table.into_boxed();

    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(status));
    }
    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority.eq(priority));
    }
    if let Some(category_id) = query.category_id {
        q = q.filter(tickets::category_id.eq(category_id));
    }
    if let Some(assignee_id) = query.assignee_id {
        q = q.filter(tickets::assignee_id.eq(assignee_id));
    }
    if let Some(requester_id) = query.requester_id {
        q = q.filter(tickets::requester_id.eq(requester_id));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern)),
        );
    }

    let rows: Vec<Ticket> = q
        .order(tickets::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    let now = Utc::now();
    let rows = rows
        .into_iter()
        .map(|t| t.with_breach_evaluated(now))
        .collect();
    Ok(ApiResponse::ok(rows))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Ticket>, TicketError> {
    let mut conn = state.conn.get()?;

    let ticket: Ticket = tickets::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or(TicketError::NotFound("ticket"))?;

    Ok(ApiResponse::ok(ticket.with_breach_evaluated(Utc::now())))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<ApiResponse<Ticket>, TicketError> {
    let eng = engine();
    let mut conn = state.conn.get()?;
    let who = actor(req.actor_id, req.actor_name.clone());

    let ticket = conn.transaction::<Ticket, TicketError, _>(|conn| {
        if let Some(category_id) = req.category_id {
            category_exists(conn, category_id)?;
        }
        let mut store = PgStore::new(conn);
        let mut ticket = store.load(id)?;

        if let Some(title) = req.title {
            ticket.title = title;
        }
        if let Some(description) = req.description {
            ticket.description = description;
        }
        if let Some(category_id) = req.category_id {
            ticket.category_id = category_id;
        }
        ticket.updated_at = eng.now();
        store.save(&ticket)?;

        // Priority goes through the engine so deadlines are recomputed
        // from the original created_at.
        if let Some(priority) = req.priority {
            ticket = eng.change_priority(&mut store, id, priority, &who)?;
        }
        Ok(ticket)
    })?;
    dispatch(&state, eng.sink().drain());

    Ok(ApiResponse::ok(ticket))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<ApiResponse<Ticket>, TicketError> {
    let eng = engine();
    let mut conn = state.conn.get()?;
    let who = actor(req.actor_id, req.actor_name.clone());

    let ticket = conn.transaction::<Ticket, TicketError, _>(|conn| {
        let mut store = PgStore::new(conn);
        assignment::assign(&eng, &mut store, id, req.assignee_id, req.team_id, &who)
    })?;
    dispatch(&state, eng.sink().drain());

    Ok(ApiResponse::ok(ticket))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<ApiResponse<Ticket>, TicketError> {
    let eng = engine();
    let mut conn = state.conn.get()?;
    let who = actor(req.actor_id, req.actor_name.clone());

    let ticket = conn.transaction::<Ticket, TicketError, _>(|conn| {
        let mut store = PgStore::new(conn);
        eng.apply_transition(&mut store, id, req.status, &who, req.comment)
    })?;
    dispatch(&state, eng.sink().drain());

    Ok(ApiResponse::ok(ticket))
}

pub async fn record_satisfaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SatisfactionRequest>,
) -> Result<ApiResponse<Ticket>, TicketError> {
    let eng = engine();
    let mut conn = state.conn.get()?;
    let who = actor(req.actor_id, None);

    let ticket = conn.transaction::<Ticket, TicketError, _>(|conn| {
        let mut store = PgStore::new(conn);
        eng.record_satisfaction(&mut store, id, req.rating, req.comment, &who)
    })?;
    dispatch(&state, eng.sink().drain());

    Ok(ApiResponse::ok(ticket))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<ApiResponse<TicketComment>, TicketError> {
    let mut conn = state.conn.get()?;

    let context = tickets::table
        .find(ticket_id)
        .select((tickets::title, tickets::requester_id, tickets::assignee_id))
        .first::<(String, Option<Uuid>, Option<Uuid>)>(&mut conn)
        .optional()?
        .map(|(title, requester_id, assignee_id)| TicketContext {
            title,
            requester_id,
            assignee_id,
        })
        .ok_or(TicketError::NotFound("ticket"))?;

    let now = Utc::now();
    let comment = TicketComment {
        id: Uuid::new_v4(),
        ticket_id,
        author_id: req.author_id,
        author_name: req.author_name,
        author_email: req.author_email,
        content: req.content,
        is_internal: req.is_internal.unwrap_or(false),
        created_at: now,
    };

    diesel::insert_into(ticket_comments::table)
        .values(&comment)
        .execute(&mut conn)?;

    diesel::update(tickets::table.find(ticket_id))
        .set(tickets::updated_at.eq(now))
        .execute(&mut conn)?;

    if let Err(e) = notifications::notify_comment(
        &mut conn,
        ticket_id,
        &context,
        comment.is_internal,
        comment.author_id,
    ) {
        log::warn!("comment notification failed for ticket {ticket_id}: {e}");
    }

    Ok(ApiResponse::created(comment))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<TicketComment>>, TicketError> {
    let mut conn = state.conn.get()?;

    let comments: Vec<TicketComment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .order(ticket_comments::created_at.asc())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(comments))
}

pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<StatusHistory>>, TicketError> {
    let mut conn = state.conn.get()?;

    let entries: Vec<StatusHistory> = ticket_status_history::table
        .filter(ticket_status_history::ticket_id.eq(ticket_id))
        .order(ticket_status_history::changed_at.asc())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(entries))
}

/// Storage key for an uploaded file, partitioned by upload date the same
/// way the media directory is laid out on disk.
fn attachment_storage_path(id: Uuid, filename: &str, now: DateTime<Utc>) -> String {
    format!(
        "ticket_attachments/{}/{id}_{filename}",
        now.format("%Y/%m/%d")
    )
}

pub async fn add_attachment(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CreateAttachmentRequest>,
) -> Result<ApiResponse<TicketAttachment>, TicketError> {
    if req.filename.trim().is_empty() {
        return Err(TicketError::Validation("filename must not be empty".to_string()));
    }

    let mut conn = state.conn.get()?;
    let exists: i64 = tickets::table.find(ticket_id).count().get_result(&mut conn)?;
    if exists == 0 {
        return Err(TicketError::NotFound("ticket"));
    }

    let now = Utc::now();
    let id = Uuid::new_v4();
    let attachment = TicketAttachment {
        id,
        ticket_id,
        storage_path: attachment_storage_path(id, &req.filename, now),
        filename: req.filename,
        file_size: req.file_size.unwrap_or(0),
        mime_type: req.mime_type.unwrap_or_default(),
        uploaded_by_id: req.uploaded_by_id,
        uploaded_by_name: req.uploaded_by_name,
        uploaded_at: now,
    };

    diesel::insert_into(ticket_attachments::table)
        .values(&attachment)
        .execute(&mut conn)?;

    Ok(ApiResponse::created(attachment))
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<TicketAttachment>>, TicketError> {
    let mut conn = state.conn.get()?;

    let rows: Vec<TicketAttachment> = ticket_attachments::table
        .filter(ticket_attachments::ticket_id.eq(ticket_id))
        .order(ticket_attachments::uploaded_at.desc())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(rows))
}

pub async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    Path((ticket_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<serde_json::Value>, TicketError> {
    let mut conn = state.conn.get()?;

    let removed = diesel::delete(
        ticket_attachments::table
            .find(attachment_id)
            .filter(ticket_attachments::ticket_id.eq(ticket_id)),
    )
    .execute(&mut conn)?;

    if removed == 0 {
        return Err(TicketError::NotFound("attachment"));
    }
    Ok(ApiResponse::ok(serde_json::json!({ "removed": removed })))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<TicketCategory>>, TicketError> {
    let mut conn = state.conn.get()?;

    let categories: Vec<TicketCategory> = ticket_categories::table
        .order(ticket_categories::name.asc())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(categories))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<ApiResponse<TicketCategory>, TicketError> {
    let mut conn = state.conn.get()?;

    let category = TicketCategory {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        parent_id: req.parent_id,
        created_at: Utc::now(),
    };

    diesel::insert_into(ticket_categories::table)
        .values(&category)
        .execute(&mut conn)?;

    Ok(ApiResponse::created(category))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<TicketCategory>, TicketError> {
    let mut conn = state.conn.get()?;

    let category: TicketCategory = ticket_categories::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or(TicketError::NotFound("category"))?;

    Ok(ApiResponse::ok(category))
}

pub async fn list_sla_configs(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<SlaConfig>>, TicketError> {
    let mut conn = state.conn.get()?;

    let configs: Vec<SlaConfig> = sla_configs::table
        .order(sla_configs::priority.asc())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(configs))
}

pub async fn upsert_sla_config(
    State(state): State<Arc<AppState>>,
    Path(priority): Path<TicketPriority>,
    Json(req): Json<UpsertSlaConfigRequest>,
) -> Result<ApiResponse<SlaConfig>, TicketError> {
    if req.response_time_minutes <= 0 || req.resolution_time_minutes <= 0 {
        return Err(TicketError::Validation(
            "SLA offsets must be positive minute counts".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let config = SlaConfig {
        id: Uuid::new_v4(),
        priority,
        response_time_minutes: req.response_time_minutes,
        resolution_time_minutes: req.resolution_time_minutes,
        description: req.description,
        is_active: req.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let saved: SlaConfig = diesel::insert_into(sla_configs::table)
        .values(&config)
        .on_conflict(sla_configs::priority)
        .do_update()
        .set((
            sla_configs::response_time_minutes.eq(req.response_time_minutes),
            sla_configs::resolution_time_minutes.eq(req.resolution_time_minutes),
            sla_configs::description.eq(&config.description),
            sla_configs::is_active.eq(config.is_active),
            sla_configs::updated_at.eq(now),
        ))
        .get_result(&mut conn)?;

    Ok(ApiResponse::ok(saved))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/categories", get(list_categories).post(create_category))
        .route("/api/tickets/categories/:id", get(get_category))
        .route("/api/tickets/:id", get(get_ticket).put(update_ticket))
        .route("/api/tickets/:id/assign", post(assign_ticket))
        .route("/api/tickets/:id/status", post(change_status))
        .route("/api/tickets/:id/satisfaction", post(record_satisfaction))
        .route("/api/tickets/:id/comments", get(list_comments).post(add_comment))
        .route("/api/tickets/:id/attachments", get(list_attachments).post(add_attachment))
        .route(
            "/api/tickets/:id/attachments/:attachment_id",
            delete(delete_attachment),
        )
        .route("/api/tickets/:id/history", get(list_history))
        .route("/api/sla/configs", get(list_sla_configs))
        .route("/api/sla/configs/:priority", put(upsert_sla_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn attachment_paths_are_date_partitioned_and_collision_free() {
        let id = Uuid::new_v4();
        let when = Utc.with_ymd_and_hms(2026, 8, 25, 9, 30, 0).single().unwrap();

        let path = attachment_storage_path(id, "crash.log", when);
        assert_eq!(path, format!("ticket_attachments/2026/08/25/{id}_crash.log"));

        // same filename uploaded twice still yields distinct keys
        let other = attachment_storage_path(Uuid::new_v4(), "crash.log", when);
        assert_ne!(path, other);
    }
}

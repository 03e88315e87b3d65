//! Append-only audit trail. Doubles as the event sink the lifecycle engine
//! publishes to: every domain event becomes one audit row.

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::audit_logs;
use crate::shared::state::{AppState, DbPool};
use crate::tickets::events::{EventSink, TicketEvent};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event sink backed by the audit_logs table. Publish failures are logged
/// and swallowed: the audit trail is a side channel and must never fail the
/// ticket mutation that produced the event.
pub struct AuditEventSink {
    pool: DbPool,
}

impl AuditEventSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventSink for AuditEventSink {
    fn publish(&self, event: &TicketEvent) {
        let details = match serde_json::to_string(event) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("failed to serialize {} event: {e}", event.action());
                None
            }
        };
        let row = AuditLog {
            id: Uuid::new_v4(),
            actor_id: event.actor_id(),
            action: event.action().to_string(),
            details,
            created_at: Utc::now(),
        };

        let mut conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("audit sink: no connection for {}: {e}", row.action);
                return;
            }
        };
        if let Err(e) = diesel::insert_into(audit_logs::table)
            .values(&row)
            .execute(&mut conn)
        {
            warn!("audit sink: failed to record {}: {e}", row.action);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<ApiResponse<Vec<AuditLog>>, TicketError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = audit_logs::table.into_boxed();
    if let Some(actor_id) = query.actor_id {
        q = q.filter(audit_logs::actor_id.eq(actor_id));
    }
    if let Some(action) = query.action {
        q = q.filter(audit_logs::action.eq(action));
    }

    let rows: Vec<AuditLog> = q
        .order(audit_logs::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(ApiResponse::ok(rows))
}

pub fn configure_audit_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/audit", get(list_audit_logs))
}

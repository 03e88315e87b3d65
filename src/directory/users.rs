use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::enums::UserRole;
use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub role: Option<UserRole>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<ApiResponse<User>, TicketError> {
    if req.email.trim().is_empty() || !req.email.contains('@') {
        return Err(TicketError::Validation("invalid email address".to_string()));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: req.email,
        name: req.name,
        role: req.role.unwrap_or_default(),
        department: req.department,
        phone: req.phone,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)?;

    info!("created user {} ({})", user.name, user.email);
    Ok(ApiResponse::created(user))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<ApiResponse<Vec<User>>, TicketError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = users::table.into_boxed();
    if let Some(role) = query.role {
        q = q.filter(users::role.eq(role));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(users::name.ilike(pattern.clone()).or(users::email.ilike(pattern)));
    }

    let rows: Vec<User> = q
        .order(users::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(ApiResponse::ok(rows))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<User>, TicketError> {
    let mut conn = state.conn.get()?;

    let user: User = users::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or(TicketError::NotFound("user"))?;

    Ok(ApiResponse::ok(user))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<ApiResponse<User>, TicketError> {
    let mut conn = state.conn.get()?;

    let mut user: User = users::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or(TicketError::NotFound("user"))?;

    if let Some(email) = req.email {
        if !email.contains('@') {
            return Err(TicketError::Validation("invalid email address".to_string()));
        }
        user.email = email;
    }
    if let Some(name) = req.name {
        user.name = name;
    }
    if let Some(role) = req.role {
        user.role = role;
    }
    if req.department.is_some() {
        user.department = req.department;
    }
    if req.phone.is_some() {
        user.phone = req.phone;
    }
    user.updated_at = Utc::now();

    diesel::update(users::table.find(id))
        .set(&user)
        .execute(&mut conn)?;

    Ok(ApiResponse::ok(user))
}

/// Users are never deleted, only deactivated; tickets keep their historical
/// requester/assignee references.
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<User>, TicketError> {
    let mut conn = state.conn.get()?;

    let user: User = diesel::update(users::table.find(id))
        .set((users::is_active.eq(false), users::updated_at.eq(Utc::now())))
        .get_result(&mut conn)
        .optional()?
        .ok_or(TicketError::NotFound("user"))?;

    Ok(ApiResponse::ok(user))
}

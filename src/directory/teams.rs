use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::users::User;
use crate::shared::enums::MemberRole;
use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{team_memberships, teams, users};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = teams)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = team_memberships)]
pub struct TeamMembership {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub leader_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Option<MemberRole>,
}

#[derive(Debug, Serialize)]
pub struct TeamWithMembers {
    pub team: Team,
    pub members: Vec<User>,
}

fn load_team(conn: &mut PgConnection, id: Uuid) -> Result<Team, TicketError> {
    teams::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or(TicketError::NotFound("team"))
}

pub async fn create_team(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTeamRequest>,
) -> Result<ApiResponse<Team>, TicketError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let team = Team {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        leader_id: req.leader_id,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<(), TicketError, _>(|conn| {
        diesel::insert_into(teams::table)
            .values(&team)
            .execute(conn)?;

        // the leader is a member from day one
        if let Some(leader_id) = team.leader_id {
            diesel::insert_into(team_memberships::table)
                .values(&TeamMembership {
                    id: Uuid::new_v4(),
                    team_id: team.id,
                    user_id: leader_id,
                    role: MemberRole::Leader,
                    joined_at: now,
                })
                .execute(conn)?;
        }
        Ok(())
    })?;

    Ok(ApiResponse::created(team))
}

pub async fn list_teams(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<Team>>, TicketError> {
    let mut conn = state.conn.get()?;

    let rows: Vec<Team> = teams::table.order(teams::name.asc()).load(&mut conn)?;
    Ok(ApiResponse::ok(rows))
}

pub async fn get_team(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<TeamWithMembers>, TicketError> {
    let mut conn = state.conn.get()?;
    let team = load_team(&mut conn, id)?;

    let members: Vec<User> = team_memberships::table
        .filter(team_memberships::team_id.eq(id))
        .inner_join(users::table)
        .select(users::all_columns)
        .load(&mut conn)?;

    Ok(ApiResponse::ok(TeamWithMembers { team, members }))
}

pub async fn update_team(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTeamRequest>,
) -> Result<ApiResponse<Team>, TicketError> {
    let mut conn = state.conn.get()?;
    let mut team = load_team(&mut conn, id)?;

    if let Some(name) = req.name {
        team.name = name;
    }
    if req.description.is_some() {
        team.description = req.description;
    }
    if req.leader_id.is_some() {
        team.leader_id = req.leader_id;
    }
    team.updated_at = Utc::now();

    diesel::update(teams::table.find(id))
        .set(&team)
        .execute(&mut conn)?;

    Ok(ApiResponse::ok(team))
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Vec<TeamMembership>>, TicketError> {
    let mut conn = state.conn.get()?;
    load_team(&mut conn, id)?;

    let rows: Vec<TeamMembership> = team_memberships::table
        .filter(team_memberships::team_id.eq(id))
        .order(team_memberships::joined_at.asc())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(rows))
}

pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<ApiResponse<TeamMembership>, TicketError> {
    let mut conn = state.conn.get()?;
    load_team(&mut conn, id)?;

    let user_count: i64 = users::table.find(req.user_id).count().get_result(&mut conn)?;
    if user_count == 0 {
        return Err(TicketError::NotFound("user"));
    }

    let already: i64 = team_memberships::table
        .filter(team_memberships::team_id.eq(id))
        .filter(team_memberships::user_id.eq(req.user_id))
        .count()
        .get_result(&mut conn)?;
    if already > 0 {
        return Err(TicketError::Validation(
            "user is already a member of this team".to_string(),
        ));
    }

    let membership = TeamMembership {
        id: Uuid::new_v4(),
        team_id: id,
        user_id: req.user_id,
        role: req.role.unwrap_or_default(),
        joined_at: Utc::now(),
    };

    diesel::insert_into(team_memberships::table)
        .values(&membership)
        .execute(&mut conn)?;

    Ok(ApiResponse::created(membership))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<serde_json::Value>, TicketError> {
    let mut conn = state.conn.get()?;

    let removed = diesel::delete(
        team_memberships::table
            .filter(team_memberships::team_id.eq(id))
            .filter(team_memberships::user_id.eq(user_id)),
    )
    .execute(&mut conn)?;

    if removed == 0 {
        return Err(TicketError::NotFound("membership"));
    }
    Ok(ApiResponse::ok(serde_json::json!({ "removed": removed })))
}

pub mod teams;
pub mod users;

use crate::shared::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub fn configure_directory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:id",
            get(users::get_user).put(users::update_user),
        )
        .route("/api/users/:id/deactivate", post(users::deactivate_user))
        .route("/api/teams", get(teams::list_teams).post(teams::create_team))
        .route("/api/teams/:id", get(teams::get_team).put(teams::update_team))
        .route(
            "/api/teams/:id/members",
            get(teams::list_members).post(teams::add_member),
        )
        .route(
            "/api/teams/:id/members/:user_id",
            delete(teams::remove_member),
        )
}

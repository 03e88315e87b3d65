//! Knowledge-base articles: markdown content with draft/published/archived
//! lifecycle, soft delete and view/feedback counters.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::enums::{AccessLevel, ArticleStatus};
use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::kb_articles;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = kb_articles, treat_none_as_null = true)]
pub struct KnowledgeArticle {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: String,
    pub status: ArticleStatus,
    pub access_level: AccessLevel,
    pub is_faq: bool,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub view_count: i32,
    pub helpful_count: i32,
    pub not_helpful_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: String,
    pub access_level: Option<AccessLevel>,
    pub is_faq: Option<bool>,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub access_level: Option<AccessLevel>,
    pub is_faq: Option<bool>,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub helpful: bool,
}

#[derive(Debug, Deserialize)]
pub struct ArticleQuery {
    pub status: Option<ArticleStatus>,
    pub category: Option<String>,
    pub is_faq: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn load_article(conn: &mut PgConnection, id: Uuid) -> Result<KnowledgeArticle, TicketError> {
    kb_articles::table
        .find(id)
        .filter(kb_articles::deleted_at.is_null())
        .first(conn)
        .optional()?
        .ok_or(TicketError::NotFound("article"))
}

pub async fn create_article(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateArticleRequest>,
) -> Result<ApiResponse<KnowledgeArticle>, TicketError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let article = KnowledgeArticle {
        id: Uuid::new_v4(),
        title: req.title,
        content: req.content,
        summary: req.summary,
        category: req.category,
        status: ArticleStatus::Draft,
        access_level: req.access_level.unwrap_or_default(),
        is_faq: req.is_faq.unwrap_or(false),
        created_by: req.author_id,
        updated_by: req.author_id,
        view_count: 0,
        helpful_count: 0,
        not_helpful_count: 0,
        created_at: now,
        updated_at: now,
        published_at: None,
        deleted_at: None,
    };

    diesel::insert_into(kb_articles::table)
        .values(&article)
        .execute(&mut conn)?;

    Ok(ApiResponse::created(article))
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> Result<ApiResponse<Vec<KnowledgeArticle>>, TicketError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = kb_articles::table
        .filter(kb_articles::deleted_at.is_null())
        .into_boxed();

    if let Some(status) = query.status {
        q = q.filter(kb_articles::status.eq(status));
    }
    if let Some(category) = query.category {
        q = q.filter(kb_articles::category.eq(category));
    }
    if let Some(is_faq) = query.is_faq {
        q = q.filter(kb_articles::is_faq.eq(is_faq));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            kb_articles::title
                .ilike(pattern.clone())
                .or(kb_articles::content.ilike(pattern)),
        );
    }

    let rows: Vec<KnowledgeArticle> = q
        .order(kb_articles::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(ApiResponse::ok(rows))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<KnowledgeArticle>, TicketError> {
    let mut conn = state.conn.get()?;

    // detail reads count as views; the increment happens in SQL so
    // concurrent readers cannot lose counts to each other
    let article: KnowledgeArticle = diesel::update(
        kb_articles::table
            .find(id)
            .filter(kb_articles::deleted_at.is_null()),
    )
    .set(kb_articles::view_count.eq(kb_articles::view_count + 1))
    .get_result(&mut conn)
    .optional()?
    .ok_or(TicketError::NotFound("article"))?;

    Ok(ApiResponse::ok(article))
}

pub async fn update_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateArticleRequest>,
) -> Result<ApiResponse<KnowledgeArticle>, TicketError> {
    let mut conn = state.conn.get()?;
    let mut article = load_article(&mut conn, id)?;

    if let Some(title) = req.title {
        article.title = title;
    }
    if let Some(content) = req.content {
        article.content = content;
    }
    if req.summary.is_some() {
        article.summary = req.summary;
    }
    if let Some(category) = req.category {
        article.category = category;
    }
    if let Some(access_level) = req.access_level {
        article.access_level = access_level;
    }
    if let Some(is_faq) = req.is_faq {
        article.is_faq = is_faq;
    }
    article.updated_by = req.author_id;
    article.updated_at = Utc::now();

    diesel::update(kb_articles::table.find(id))
        .set(&article)
        .execute(&mut conn)?;

    Ok(ApiResponse::ok(article))
}

pub async fn publish_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<KnowledgeArticle>, TicketError> {
    let mut conn = state.conn.get()?;
    let mut article = load_article(&mut conn, id)?;
    let now = Utc::now();

    article.status = ArticleStatus::Published;
    if article.published_at.is_none() {
        article.published_at = Some(now);
    }
    article.updated_at = now;

    diesel::update(kb_articles::table.find(id))
        .set(&article)
        .execute(&mut conn)?;

    Ok(ApiResponse::ok(article))
}

pub async fn archive_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<KnowledgeArticle>, TicketError> {
    let mut conn = state.conn.get()?;
    let mut article = load_article(&mut conn, id)?;

    article.status = ArticleStatus::Archived;
    article.updated_at = Utc::now();

    diesel::update(kb_articles::table.find(id))
        .set(&article)
        .execute(&mut conn)?;

    Ok(ApiResponse::ok(article))
}

/// Soft delete: the row stays for auditability, list/detail stop returning it.
pub async fn delete_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, TicketError> {
    let mut conn = state.conn.get()?;
    load_article(&mut conn, id)?;

    diesel::update(kb_articles::table.find(id))
        .set(kb_articles::deleted_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": true })))
}

pub async fn article_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<ApiResponse<KnowledgeArticle>, TicketError> {
    let mut conn = state.conn.get()?;

    let target = kb_articles::table
        .find(id)
        .filter(kb_articles::deleted_at.is_null());
    let updated = if req.helpful {
        diesel::update(target)
            .set(kb_articles::helpful_count.eq(kb_articles::helpful_count + 1))
            .get_result::<KnowledgeArticle>(&mut conn)
            .optional()?
    } else {
        diesel::update(target)
            .set(kb_articles::not_helpful_count.eq(kb_articles::not_helpful_count + 1))
            .get_result::<KnowledgeArticle>(&mut conn)
            .optional()?
    };

    let article = updated.ok_or(TicketError::NotFound("article"))?;
    Ok(ApiResponse::ok(article))
}

pub fn configure_kb_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/kb/articles", get(list_articles).post(create_article))
        .route(
            "/api/kb/articles/:id",
            get(get_article).put(update_article).delete(delete_article),
        )
        .route("/api/kb/articles/:id/publish", post(publish_article))
        .route("/api/kb/articles/:id/archive", post(archive_article))
        .route("/api/kb/articles/:id/feedback", post(article_feedback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::debug_query;
    use diesel::pg::Pg;

    #[test]
    fn counter_bumps_read_the_current_value_inside_the_update() {
        let view = diesel::update(
            kb_articles::table
                .find(Uuid::new_v4())
                .filter(kb_articles::deleted_at.is_null()),
        )
        .set(kb_articles::view_count.eq(kb_articles::view_count + 1));
        let sql = debug_query::<Pg, _>(&view).to_string();
        assert!(
            sql.contains(r#""view_count" = ("kb_articles"."view_count" + "#),
            "expected an in-place increment, got: {sql}"
        );

        let helpful = diesel::update(kb_articles::table.find(Uuid::new_v4()))
            .set(kb_articles::helpful_count.eq(kb_articles::helpful_count + 1));
        let sql = debug_query::<Pg, _>(&helpful).to_string();
        assert!(sql.contains(r#""helpful_count" = ("kb_articles"."helpful_count" + "#));
    }
}

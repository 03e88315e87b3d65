//! Reporting rollups over tickets, agents, knowledge articles and SLA
//! compliance. Handlers load the rows for the requested window and the
//! aggregation itself is plain in-memory arithmetic, shared with the tests.

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::users::User;
use crate::kb::KnowledgeArticle;
use crate::shared::enums::{TicketPriority, TicketStatus, UserRole};
use crate::shared::error::TicketError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{kb_articles, ticket_categories, tickets, users};
use crate::shared::state::AppState;
use crate::tickets::{sla, Ticket};

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl DateRangeQuery {
    /// Resolve the window, defaulting to the last 30 days.
    fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = self.date_to.unwrap_or(now);
        let from = self.date_from.unwrap_or(to - Duration::days(30));
        (from, to)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn compliance_rate(met: i64, total: i64) -> f64 {
    if total == 0 {
        100.0
    } else {
        round2(met as f64 / total as f64 * 100.0)
    }
}

fn average_resolution_hours(tickets: &[Ticket]) -> Option<f64> {
    let durations: Vec<f64> = tickets
        .iter()
        .filter_map(|t| t.resolved_at.map(|r| (r - t.created_at).num_seconds() as f64 / 3600.0))
        .collect();
    if durations.is_empty() {
        return None;
    }
    Some(round2(durations.iter().sum::<f64>() / durations.len() as f64))
}

#[derive(Debug, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct SlaSummary {
    pub total: i64,
    pub met: i64,
    pub breached: i64,
    pub compliance_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct TicketAnalytics {
    pub total_created: i64,
    pub total_open: i64,
    pub total_closed: i64,
    pub average_resolution_hours: Option<f64>,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub by_category: Vec<CategoryCount>,
    pub daily_trend: Vec<DailyCount>,
    pub sla: SlaSummary,
}

const OPEN_STATUSES: &[TicketStatus] = &[
    TicketStatus::New,
    TicketStatus::Assigned,
    TicketStatus::InProgress,
    TicketStatus::PendingUser,
];

fn breached(ticket: &Ticket, now: DateTime<Utc>) -> bool {
    ticket.sla_breached || sla::is_breached(ticket, now)
}

fn sla_summary(tickets: &[Ticket], now: DateTime<Utc>) -> SlaSummary {
    let total = tickets.len() as i64;
    let breached = tickets.iter().filter(|t| breached(t, now)).count() as i64;
    let met = total - breached;
    SlaSummary {
        total,
        met,
        breached,
        compliance_rate: compliance_rate(met, total),
    }
}

pub fn ticket_rollup(
    tickets: &[Ticket],
    category_names: &HashMap<Uuid, String>,
    now: DateTime<Utc>,
) -> TicketAnalytics {
    let total_created = tickets.len() as i64;
    let total_open = tickets
        .iter()
        .filter(|t| OPEN_STATUSES.contains(&t.status))
        .count() as i64;
    let total_closed = total_created - total_open;

    let mut by_status: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_priority: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for t in tickets {
        *by_status.entry(t.status.to_string()).or_default() += 1;
        *by_priority.entry(t.priority.to_string()).or_default() += 1;
        let category = category_names
            .get(&t.category_id)
            .cloned()
            .unwrap_or_else(|| "Uncategorized".to_string());
        *by_category.entry(category).or_default() += 1;
        *by_day.entry(t.created_at.date_naive()).or_default() += 1;
    }

    TicketAnalytics {
        total_created,
        total_open,
        total_closed,
        average_resolution_hours: average_resolution_hours(tickets),
        by_status,
        by_priority,
        by_category: by_category
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect(),
        daily_trend: by_day
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect(),
        sla: sla_summary(tickets, now),
    }
}

#[derive(Debug, Serialize)]
pub struct AgentPerformance {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub tickets_assigned: i64,
    pub tickets_resolved: i64,
    pub average_resolution_hours: Option<f64>,
    pub satisfaction_rating: Option<f64>,
}

pub fn agent_rollup(agent_id: Uuid, agent_name: &str, tickets: &[Ticket]) -> AgentPerformance {
    let assigned: Vec<&Ticket> = tickets
        .iter()
        .filter(|t| t.assignee_id == Some(agent_id))
        .collect();
    let resolved = assigned
        .iter()
        .filter(|t| matches!(t.status, TicketStatus::Resolved | TicketStatus::Closed))
        .count() as i64;

    let owned: Vec<Ticket> = assigned.iter().map(|t| (*t).clone()).collect();
    let ratings: Vec<f64> = assigned
        .iter()
        .filter_map(|t| t.satisfaction_rating.map(f64::from))
        .collect();
    let satisfaction = if ratings.is_empty() {
        None
    } else {
        Some(round2(ratings.iter().sum::<f64>() / ratings.len() as f64))
    };

    AgentPerformance {
        agent_id,
        agent_name: agent_name.to_string(),
        tickets_assigned: assigned.len() as i64,
        tickets_resolved: resolved,
        average_resolution_hours: average_resolution_hours(&owned),
        satisfaction_rating: satisfaction,
    }
}

#[derive(Debug, Serialize)]
pub struct SlaAnalytics {
    pub total: i64,
    pub met: i64,
    pub breached: i64,
    pub compliance_rate: f64,
    pub by_priority: BTreeMap<String, SlaSummary>,
}

pub fn sla_rollup(tickets: &[Ticket], now: DateTime<Utc>) -> SlaAnalytics {
    let overall = sla_summary(tickets, now);
    let mut by_priority = BTreeMap::new();
    for priority in [
        TicketPriority::Low,
        TicketPriority::Medium,
        TicketPriority::High,
        TicketPriority::Urgent,
    ] {
        let bucket: Vec<Ticket> = tickets
            .iter()
            .filter(|t| t.priority == priority)
            .cloned()
            .collect();
        by_priority.insert(priority.to_string(), sla_summary(&bucket, now));
    }
    SlaAnalytics {
        total: overall.total,
        met: overall.met,
        breached: overall.breached,
        compliance_rate: overall.compliance_rate,
        by_priority,
    }
}

#[derive(Debug, Serialize)]
pub struct TopArticle {
    pub id: Uuid,
    pub title: String,
    pub view_count: i32,
    pub helpful_count: i32,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeAnalytics {
    pub total_articles: i64,
    pub total_views: i64,
    pub total_helpful: i64,
    pub new_articles: i64,
    pub by_category: Vec<CategoryCount>,
    pub top_articles: Vec<TopArticle>,
}

pub fn knowledge_rollup(
    articles: &[KnowledgeArticle],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> KnowledgeAnalytics {
    let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
    for a in articles {
        *by_category.entry(a.category.clone()).or_default() += 1;
    }

    let mut ranked: Vec<&KnowledgeArticle> = articles.iter().collect();
    ranked.sort_by(|a, b| b.view_count.cmp(&a.view_count));

    KnowledgeAnalytics {
        total_articles: articles.len() as i64,
        total_views: articles.iter().map(|a| i64::from(a.view_count)).sum(),
        total_helpful: articles.iter().map(|a| i64::from(a.helpful_count)).sum(),
        new_articles: articles
            .iter()
            .filter(|a| a.created_at >= from && a.created_at <= to)
            .count() as i64,
        by_category: by_category
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect(),
        top_articles: ranked
            .into_iter()
            .take(10)
            .map(|a| TopArticle {
                id: a.id,
                title: a.title.clone(),
                view_count: a.view_count,
                helpful_count: a.helpful_count,
            })
            .collect(),
    }
}

fn tickets_in_range(
    conn: &mut PgConnection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Ticket>, TicketError> {
    Ok(tickets::table
        .filter(tickets::created_at.ge(from))
        .filter(tickets::created_at.le(to))
        .load(conn)?)
}

pub async fn ticket_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateRangeQuery>,
) -> Result<ApiResponse<TicketAnalytics>, TicketError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let (from, to) = query.resolve(now);

    let rows = tickets_in_range(&mut conn, from, to)?;
    let category_names: HashMap<Uuid, String> = ticket_categories::table
        .select((ticket_categories::id, ticket_categories::name))
        .load::<(Uuid, String)>(&mut conn)?
        .into_iter()
        .collect();

    Ok(ApiResponse::ok(ticket_rollup(&rows, &category_names, now)))
}

pub async fn agent_performance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateRangeQuery>,
) -> Result<ApiResponse<Vec<AgentPerformance>>, TicketError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let (from, to) = query.resolve(now);

    let staff: Vec<User> = users::table
        .filter(users::role.eq_any([
            UserRole::SupportStaff,
            UserRole::Manager,
            UserRole::Admin,
        ]))
        .load(&mut conn)?;
    let rows = tickets_in_range(&mut conn, from, to)?;

    let report = staff
        .iter()
        .map(|u| agent_rollup(u.id, &u.name, &rows))
        .collect();
    Ok(ApiResponse::ok(report))
}

pub async fn knowledge_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateRangeQuery>,
) -> Result<ApiResponse<KnowledgeAnalytics>, TicketError> {
    let mut conn = state.conn.get()?;
    let (from, to) = query.resolve(Utc::now());

    let articles: Vec<KnowledgeArticle> = kb_articles::table
        .filter(kb_articles::deleted_at.is_null())
        .load(&mut conn)?;

    Ok(ApiResponse::ok(knowledge_rollup(&articles, from, to)))
}

pub async fn sla_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateRangeQuery>,
) -> Result<ApiResponse<SlaAnalytics>, TicketError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let (from, to) = query.resolve(now);

    let rows = tickets_in_range(&mut conn, from, to)?;
    Ok(ApiResponse::ok(sla_rollup(&rows, now)))
}

pub fn configure_analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analytics/tickets", get(ticket_analytics))
        .route("/api/analytics/agents", get(agent_performance))
        .route("/api/analytics/knowledge", get(knowledge_analytics))
        .route("/api/analytics/sla", get(sla_analytics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::TicketChannel;

    fn ticket(
        created_at: DateTime<Utc>,
        status: TicketStatus,
        priority: TicketPriority,
    ) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            title: "sample".to_string(),
            description: String::new(),
            status,
            priority,
            category_id: Uuid::new_v4(),
            channel: TicketChannel::Web,
            requester_id: None,
            requester_name: "Dev User".to_string(),
            requester_email: "dev@example.com".to_string(),
            assignee_id: None,
            team_id: None,
            sla_response_deadline: None,
            sla_resolution_deadline: None,
            sla_breached: false,
            satisfaction_rating: None,
            satisfaction_comment: None,
            created_at,
            updated_at: created_at,
            resolved_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn ticket_rollup_counts_open_closed_and_buckets() {
        let t0 = Utc::now();
        let mut resolved = ticket(t0, TicketStatus::Resolved, TicketPriority::High);
        resolved.resolved_at = Some(t0 + Duration::hours(3));
        let rows = vec![
            ticket(t0, TicketStatus::New, TicketPriority::Urgent),
            ticket(t0 + Duration::days(1), TicketStatus::InProgress, TicketPriority::Urgent),
            resolved,
        ];

        let report = ticket_rollup(&rows, &HashMap::new(), t0 + Duration::days(2));
        assert_eq!(report.total_created, 3);
        assert_eq!(report.total_open, 2);
        assert_eq!(report.total_closed, 1);
        assert_eq!(report.by_priority["urgent"], 2);
        assert_eq!(report.by_status["resolved"], 1);
        assert_eq!(report.average_resolution_hours, Some(3.0));
        assert_eq!(report.daily_trend.len(), 2);
        assert_eq!(report.daily_trend[0].count, 2);
        // unknown category ids fold into one bucket
        assert_eq!(report.by_category.len(), 1);
        assert_eq!(report.by_category[0].name, "Uncategorized");
    }

    #[test]
    fn sla_rollup_counts_stored_and_lazy_breaches() {
        let t0 = Utc::now();
        let mut late = ticket(t0, TicketStatus::Resolved, TicketPriority::Urgent);
        late.sla_breached = true;
        late.resolved_at = Some(t0 + Duration::minutes(300));
        let mut overdue = ticket(t0, TicketStatus::InProgress, TicketPriority::Urgent);
        overdue.sla_resolution_deadline = Some(t0 + Duration::minutes(240));
        let on_track = ticket(t0, TicketStatus::New, TicketPriority::Low);

        let report = sla_rollup(&[late, overdue, on_track], t0 + Duration::minutes(250));
        assert_eq!(report.total, 3);
        assert_eq!(report.breached, 2);
        assert_eq!(report.met, 1);
        assert_eq!(report.compliance_rate, 33.33);
        assert_eq!(report.by_priority["urgent"].breached, 2);
        assert_eq!(report.by_priority["low"].compliance_rate, 100.0);
        // empty buckets report full compliance
        assert_eq!(report.by_priority["medium"].total, 0);
        assert_eq!(report.by_priority["medium"].compliance_rate, 100.0);
    }

    #[test]
    fn agent_rollup_only_counts_their_tickets() {
        let t0 = Utc::now();
        let agent = Uuid::new_v4();
        let mut mine = ticket(t0, TicketStatus::Resolved, TicketPriority::Medium);
        mine.assignee_id = Some(agent);
        mine.resolved_at = Some(t0 + Duration::hours(2));
        mine.satisfaction_rating = Some(4);
        let mut also_mine = ticket(t0, TicketStatus::InProgress, TicketPriority::Medium);
        also_mine.assignee_id = Some(agent);
        let theirs = ticket(t0, TicketStatus::Resolved, TicketPriority::Medium);

        let report = agent_rollup(agent, "Agent Riley", &[mine, also_mine, theirs]);
        assert_eq!(report.tickets_assigned, 2);
        assert_eq!(report.tickets_resolved, 1);
        assert_eq!(report.average_resolution_hours, Some(2.0));
        assert_eq!(report.satisfaction_rating, Some(4.0));
    }

    #[test]
    fn knowledge_rollup_ranks_by_views_and_windows_new_articles() {
        let now = Utc::now();
        let article = |title: &str, views: i32, created_at: DateTime<Utc>| KnowledgeArticle {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: String::new(),
            summary: None,
            category: "Network".to_string(),
            status: crate::shared::enums::ArticleStatus::Published,
            access_level: crate::shared::enums::AccessLevel::Public,
            is_faq: false,
            created_by: None,
            updated_by: None,
            view_count: views,
            helpful_count: 1,
            not_helpful_count: 0,
            created_at,
            updated_at: created_at,
            published_at: None,
            deleted_at: None,
        };

        let articles = vec![
            article("old quiet", 2, now - Duration::days(90)),
            article("popular", 50, now - Duration::days(5)),
            article("recent", 10, now - Duration::days(1)),
        ];
        let report = knowledge_rollup(&articles, now - Duration::days(30), now);

        assert_eq!(report.total_articles, 3);
        assert_eq!(report.total_views, 62);
        assert_eq!(report.new_articles, 2);
        assert_eq!(report.top_articles[0].title, "popular");
        assert_eq!(report.by_category[0].count, 3);
    }

    #[test]
    fn empty_window_reports_full_compliance_and_no_average() {
        let now = Utc::now();
        let report = ticket_rollup(&[], &HashMap::new(), now);
        assert_eq!(report.total_created, 0);
        assert_eq!(report.sla.compliance_rate, 100.0);
        assert!(report.average_resolution_hours.is_none());
    }
}

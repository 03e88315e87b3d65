//! First-run setup: run pending migrations and seed the baseline reference
//! data (SLA targets per priority, default ticket categories).

use chrono::Utc;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use uuid::Uuid;

use crate::shared::enums::TicketPriority;
use crate::shared::error::TicketError;
use crate::shared::schema::{sla_configs, ticket_categories};
use crate::shared::state::DbPool;
use crate::tickets::{SlaConfig, TicketCategory};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DEFAULT_CATEGORIES: &[&str] = &[
    "Network", "Hardware", "Software", "Account", "Email", "Security", "Printing", "Other",
];

// (priority, response minutes, resolution minutes)
const DEFAULT_SLA: &[(TicketPriority, i32, i32)] = &[
    (TicketPriority::Urgent, 60, 240),
    (TicketPriority::High, 240, 480),
    (TicketPriority::Medium, 480, 1440),
    (TicketPriority::Low, 1440, 4320),
];

pub fn run(pool: &DbPool) -> Result<(), TicketError> {
    let mut conn = pool.get()?;

    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| TicketError::Database(format!("migrations failed: {e}")))?;

    seed_sla_configs(&mut conn)?;
    seed_categories(&mut conn)?;
    Ok(())
}

/// Insert the default SLA targets for any priority that has no row yet.
/// Existing rows are never touched, operators own them after first boot.
fn seed_sla_configs(conn: &mut PgConnection) -> Result<(), TicketError> {
    let now = Utc::now();
    for &(priority, response, resolution) in DEFAULT_SLA {
        let existing: i64 = sla_configs::table
            .filter(sla_configs::priority.eq(priority))
            .count()
            .get_result(conn)?;
        if existing > 0 {
            continue;
        }
        diesel::insert_into(sla_configs::table)
            .values(&SlaConfig {
                id: Uuid::new_v4(),
                priority,
                response_time_minutes: response,
                resolution_time_minutes: resolution,
                description: format!("Default {priority} priority targets"),
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .execute(conn)?;
        info!("seeded SLA config for {priority} priority");
    }
    Ok(())
}

fn seed_categories(conn: &mut PgConnection) -> Result<(), TicketError> {
    let now = Utc::now();
    for &name in DEFAULT_CATEGORIES {
        let existing: i64 = ticket_categories::table
            .filter(ticket_categories::name.eq(name))
            .count()
            .get_result(conn)?;
        if existing > 0 {
            continue;
        }
        diesel::insert_into(ticket_categories::table)
            .values(&TicketCategory {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: String::new(),
                parent_id: None,
                created_at: now,
            })
            .execute(conn)?;
    }
    Ok(())
}

//! Database enum types shared across the helpdesk schema.
//!
//! Enums are stored as their lowercase snake_case text form so the database
//! stays readable and the wire format matches the frontend contract. All
//! enums derive the traits needed for Diesel ORM integration.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;

macro_rules! text_enum_sql {
    ($name:ident) => {
        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let s = std::str::from_utf8(bytes.as_bytes())?;
                s.parse::<$name>().map_err(Into::into)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ============================================================================
// TICKETS
// ============================================================================

/// Ticket lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    Assigned,
    InProgress,
    PendingUser,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::PendingUser => "pending_user",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::New
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "assigned" => Ok(Self::Assigned),
            "in_progress" => Ok(Self::InProgress),
            "pending_user" => Ok(Self::PendingUser),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(format!("Unknown TicketStatus: {other}")),
        }
    }
}

text_enum_sql!(TicketStatus);

/// Ticket priority, drives the SLA deadline lookup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::str::FromStr for TicketPriority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("Unknown TicketPriority: {other}")),
        }
    }
}

text_enum_sql!(TicketPriority);

/// Channel the ticket arrived through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketChannel {
    Web,
    Email,
    Phone,
    Mobile,
}

impl TicketChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Mobile => "mobile",
        }
    }
}

impl Default for TicketChannel {
    fn default() -> Self {
        Self::Web
    }
}

impl std::str::FromStr for TicketChannel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "mobile" => Ok(Self::Mobile),
            other => Err(format!("Unknown TicketChannel: {other}")),
        }
    }
}

text_enum_sql!(TicketChannel);

// ============================================================================
// DIRECTORY
// ============================================================================

/// Role of a helpdesk user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    EndUser,
    SupportStaff,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndUser => "end_user",
            Self::SupportStaff => "support_staff",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::EndUser
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "end_user" => Ok(Self::EndUser),
            "support_staff" => Ok(Self::SupportStaff),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            other => Err(format!("Unknown UserRole: {other}")),
        }
    }
}

text_enum_sql!(UserRole);

/// Role of a user within a team.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Leader,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Member => "member",
        }
    }
}

impl Default for MemberRole {
    fn default() -> Self {
        Self::Member
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leader" => Ok(Self::Leader),
            "member" => Ok(Self::Member),
            other => Err(format!("Unknown MemberRole: {other}")),
        }
    }
}

text_enum_sql!(MemberRole);

// ============================================================================
// KNOWLEDGE BASE
// ============================================================================

/// Publication status of a knowledge article.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Published,
    Archived,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::str::FromStr for ArticleStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(format!("Unknown ArticleStatus: {other}")),
        }
    }
}

text_enum_sql!(ArticleStatus);

/// Visibility of a knowledge article.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Internal,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
        }
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::Public
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            other => Err(format!("Unknown AccessLevel: {other}")),
        }
    }
}

text_enum_sql!(AccessLevel);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for s in [
            TicketStatus::New,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::PendingUser,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(s.as_str().parse::<TicketStatus>().unwrap(), s);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("open".parse::<TicketStatus>().is_err());
    }
}

pub mod api_router;
pub mod audit;
pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod kb;
pub mod notifications;
pub mod shared;
pub mod tickets;

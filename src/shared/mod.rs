pub mod enums;
pub mod error;
pub mod response;
pub mod schema;
pub mod state;
pub mod test_utils;

pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod users;

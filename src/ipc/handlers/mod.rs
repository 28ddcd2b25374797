pub mod attendance;
pub mod auth;
pub mod core;
pub mod dashboard;
pub mod grades;
pub mod users;
pub mod watch;

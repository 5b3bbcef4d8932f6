pub mod attendance;
pub mod auth;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod reports;
pub mod students;

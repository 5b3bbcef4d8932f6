//! School attendance service.
//!
//! Classes, students and per-day attendance marks live in a SQLite workspace.
//! The same method dispatcher ([`ipc::handle_request`]) serves two
//! transports: JSON lines over stdio ([`sidecar`]) and a REST API ([`http`]).
//!
//! Attendance is written replace-on-write per (class, date): saving a day's
//! batch removes whatever was there and inserts the batch, in one transaction.
//! Dashboard and report percentages come from [`calc::attendance_percentage`].

pub mod auth;
pub mod calc;
pub mod config;
pub mod db;
pub mod http;
pub mod ipc;
pub mod sidecar;

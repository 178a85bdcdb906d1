//! Student ID card submission portal.
//!
//! The admin dashboard's record view model (filter, sort, paginate, export)
//! over records fetched from the submissions backend, the student-side
//! submission draft, and the static frontend server with its reverse proxy.

pub mod config;
pub mod export;
pub mod models;
pub mod report;
pub mod server;
pub mod source;
pub mod stats;
pub mod submission;
pub mod view;

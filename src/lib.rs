//! Patient intake backend
//!
//! User onboarding and verification, visit records, and the visit-ingest
//! pipeline that classifies uploaded medical documents, stores them in S3 and
//! persists the visit aggregate in PostgreSQL.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod testing;

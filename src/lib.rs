//! Repurpose - anonymous upload, transcription and claim service.
//!
//! Visitors upload audio without an account, receive an opaque session token and
//! poll while the file is transcribed in the background. A blurred preview is shown
//! until the visitor signs up and claims the session, which moves the project and
//! transcription to their account in one transaction.

pub mod auth;
pub mod cli;
pub mod config;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
pub mod storage;
pub mod transcription;

//! Rustrak Merge Library
//!
//! Group merge worker and its HTTP trigger, exposed for testing purposes.

pub mod auth;
pub mod backends;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod routes;
pub mod services;
pub mod store;
pub mod tasks;
pub mod worker;

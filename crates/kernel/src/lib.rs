//! Waymark listing kernel library
//!
//! Composes directory-listing search and filter requests into queries,
//! resolves ordering and popularity, and executes them against PostgreSQL
//! or an in-memory listing set. The `waymark` binary is the command-line
//! entry point.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod store;

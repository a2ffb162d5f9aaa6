//! # Ignitor
//!
//! Backend scaffold for JSON resources over SQLite with live change feeds.
//!
//! ## Architecture
//!
//! - **Axum** serves the HTTP API and Server-Sent-Events streams
//! - **SQLx** stores each resource as JSON documents in SQLite
//! - **Tokio** runs the server, the dead-subscriber sweep and limiter cleanup
//!
//! ## Core Components
//!
//! - [`sse`]: channel registry and broadcast engine
//! - [`store`]: record store capability and its SQLite implementation
//! - [`service`]: generic data service (pagination, soft delete, filters, slugs)
//! - [`resources`]: concrete resources built on the data service
//! - [`routes`] / [`middleware`] / [`app`]: the HTTP front door
//! - [`config`], [`logging`], [`error`], [`metrics`]: ambient plumbing

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod resources;
pub mod routes;
pub mod service;
pub mod sse;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

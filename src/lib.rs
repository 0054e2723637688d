/// Basic application code
pub mod app;
/// Application authorization
pub mod auth;
/// REST clients for the email-marketing service
pub mod client;
/// Controllers for REST endpoints
pub mod controller;
/// Cryptography-related helpers
pub mod crypto;
/// Domain objects
pub mod domain;
/// REST error types
pub mod error;
/// Interfaces to the host application
pub mod host;
/// Declarative merge-field mapping
pub mod mapping;
/// Repositories
pub mod repo;
/// Application settings
pub mod settings;
/// Subscription synchronization
pub mod sync;
/// Application telemetry for tracing and logging
pub mod telemetry;

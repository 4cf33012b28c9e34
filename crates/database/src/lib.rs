//! # MarketPulse Database Crate
//!
//! This crate is the engine's interface to persistent storage: it reads price
//! history and writes findings.
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Adapter:** The engine only sees the `BarSource` and `FindingSink`
//!   traits. SQL and connection handling stay in this crate.
//! - **Idempotent Writes:** Findings are upserted on their natural key inside one
//!   transaction per batch, so a re-run or a retried batch never duplicates rows.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and it uses a
//!   connection pool (`PgPool`) for concurrent database access.
//!
//! ## Public API
//!
//! - `connect`: The async function to establish the database connection pool.
//! - `run_migrations`: Applies the embedded schema migrations.
//! - `BarSource` / `FindingSink`: The collaborator traits the engine depends on.
//! - `DbRepository`: The PostgreSQL implementation of both traits.
//! - `MemoryStore`: An in-process implementation for tests and dry runs.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryStore;
pub use repository::DbRepository;
pub use store::{BarSource, FindingSink};

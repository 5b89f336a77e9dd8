//! Database layer for the Orca room engine.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations for users, topics, rooms and room memberships.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: concurrent readers with a single writer. Room
//!   mutations take the writer lock up front (`BEGIN IMMEDIATE`), so capacity
//!   checks and the writes that depend on them are serialized.
//! - **`r2d2` connection pool**: bounded connection reuse; every pooled
//!   connection carries a busy timeout so contending writers wait their turn.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` and cannot drift from the code that depends on them.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};

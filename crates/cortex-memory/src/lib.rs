//! `cortex-memory` – the durable store.
//!
//! - [`checkpointer`] – [`Checkpointer`][checkpointer::Checkpointer]: the
//!   SQLite-backed checkpoint log, chat history, and side-effect ledger
//!   that back the orchestrator's resume-after-crash and idempotent-
//!   dispatch guarantees (§6, §4.15, §9).

pub mod checkpointer;

pub use checkpointer::{ChatHistoryEntry, Checkpoint, Checkpointer, CheckpointerError};

//! Core chat orchestration
//!
//! This module contains the per-turn pipeline and the remote memory client.

pub mod chat;
pub mod memory;

pub use chat::{ChatEngine, ChatOutcome};
pub use memory::{MemMachineClient, MemoryError, MemoryRecord, MemorySource, MemoryStore};

//! Installation state management.
//!
//! This module provides:
//! - Progress ledger transitions
//! - The saga manager that runs steps and compensates on failure

pub mod manager;
pub mod progress;

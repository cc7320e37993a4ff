//! # Types
//!
//! Architecture-agnostic types used throughout the trap layer.
//!
//! These types abstract away machine-specific details, allowing the dispatch
//! engine and stack walker to work with concepts like "address" and "thread"
//! without knowing which architecture backend is active.

pub mod address;
pub mod thread;

// Re-export all public types
pub use address::Address;
pub use thread::{StackBounds, ThreadId};

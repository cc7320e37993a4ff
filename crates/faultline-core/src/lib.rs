//! # faultline-core
//!
//! Per-architecture trap handling and exception dispatch for Faultline.
//!
//! This crate provides the runtime layer that sits between raw operating
//! system signals and a cooperating debugger:
//! - Capturing and restoring a thread's full register state across traps
//! - Classifying raw signals into a portable exception taxonomy
//! - Walking a per-thread exception handler chain with well-defined
//!   continuation semantics
//! - Reconstructing call stacks from a suspended thread's register state
//! - Installing and removing instruction-patching breakpoints
//!
//! ## Architecture Support
//!
//! - **PPC64**: full backend (context translation, unwinding, breakpoints)
//! - Other architectures: capability probes return a typed
//!   [`error::FaultlineError::Unsupported`] rather than fabricating data
//!
//! ## Safety
//!
//! The OS-native trap context is modeled as a tagged value type
//! ([`context::TrapContext`]) rather than an overlapping union, so the whole
//! crate is `forbid(unsafe_code)`. The thin trampoline that copies a kernel
//! `ucontext` into a [`context::Ppc64TrapFrame`] belongs to the embedding
//! runtime, not to this crate.

pub mod arch;
pub mod chain;
pub mod classify;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod exception;
pub mod mem;
pub mod registry;
pub mod signals;
pub mod types;
pub mod unwind;

pub use arch::{Capability, CpuBackend, Ppc64Backend};
pub use context::{ContextFlags, Ppc64Context, TrapContext};
// Re-export commonly used types
pub use error::{FaultlineError, FaultlineResult};
pub use exception::{ExceptionCode, ExceptionFlags, ExceptionRecord};
pub use registry::SignalRegistry;
pub use types::{Address, StackBounds, ThreadId};

//! # Error Types
//!
//! General error handling for the trap and dispatch layer.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::arch::Capability;
use crate::types::Address;

/// Main error type for trap-layer operations
///
/// This enum represents all the ways an operation in this crate can fail.
/// The variants follow the error taxonomy of the dispatch design:
///
/// 1. **Dispatch protocol errors**: InvalidDisposition, NonContinuable,
///    CorruptChain — the handler search is aborted, never retried
/// 2. **Fatal chain errors**: StackInvalid (a chain entry lies outside the
///    thread's stack bounds)
/// 3. **Capability gaps**: Unsupported — an architecture backend lacks a
///    feature and says so instead of fabricating data
/// 4. **Memory transfer errors**: ShortTransfer — a breakpoint patch read or
///    wrote fewer bytes than the instruction width
/// 5. **Registration errors**: AlreadyClaimed, SignalOutOfRange
///
/// Classification gaps are deliberately *not* represented here: an unknown
/// trap subcode maps to a safe default exception code, never to an error.
#[derive(Error, Debug)]
pub enum FaultlineError
{
    /// A handler returned a disposition outside the dispatch protocol
    ///
    /// The chain search is aborted and the exception proceeds to last-chance
    /// handling. This is never retried.
    #[error("exception handler returned an invalid disposition")]
    InvalidDisposition,

    /// A handler claimed "continue execution" on a non-continuable exception
    ///
    /// Continuing after a non-continuable exception is itself a dispatch
    /// protocol error, treated the same as an invalid disposition.
    #[error("attempt to continue execution after a noncontinuable exception")]
    NonContinuable,

    /// A handler chain handle no longer refers to a live entry
    ///
    /// This happens when a scope pops its registration while a dispatch that
    /// captured the handle is still in flight, or when a handle from another
    /// thread's chain is presented.
    #[error("exception chain entry {0} is not present in the chain")]
    CorruptChain(usize),

    /// A chain entry's scope address lies outside the thread's stack bounds
    ///
    /// The search is aborted, the exception record is flagged
    /// `STACK_INVALID`, and the exception becomes fatal at last chance.
    #[error("exception chain entry at {0} is outside the stack limits")]
    StackInvalid(Address),

    /// The architecture backend does not implement the requested capability
    ///
    /// Backends must report missing features explicitly rather than silently
    /// no-opping in a way that looks like success.
    #[error("capability not supported by this architecture backend: {capability:?}")]
    Unsupported
    {
        /// The capability the caller asked for.
        capability: Capability,
    },

    /// A target-memory read or write moved fewer bytes than required
    ///
    /// Breakpoint patching requires exact-width transfers; a partial
    /// transfer is a failure, not a partial success.
    #[error("short memory transfer at {address}: expected {expected} bytes, got {actual}")]
    ShortTransfer
    {
        /// Address of the attempted transfer.
        address: Address,
        /// Width the operation required.
        expected: usize,
        /// Width actually transferred.
        actual: usize,
    },

    /// A raw signal slot already has a registered handler
    ///
    /// The process-wide signal routing table accepts exactly one handler per
    /// slot for the lifetime of the process.
    #[error("signal {0} already has a registered handler")]
    AlreadyClaimed(u32),

    /// A signal number lies outside the routing table
    #[error("signal {0} is out of range for the routing table")]
    SignalOutOfRange(u32),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, FaultlineError>`
///
/// ```rust
/// use faultline_core::error::FaultlineResult;
/// fn foo() -> FaultlineResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type FaultlineResult<T> = std::result::Result<T, FaultlineError>;

//! Portable exception records.
//!
//! A raw trap (signal number plus machine subcode) is translated into an
//! [`ExceptionRecord`] before dispatch. The record is the only description
//! of the fault that handlers, debug-event sinks, and the termination path
//! ever see, so classification must always produce a fully initialized one.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::types::Address;

/// Maximum number of additional parameters an exception record can carry.
pub const MAX_PARAMETERS: usize = 15;

/// Portable exception code
///
/// Machine trap subcodes from every signal family collapse into this single
/// taxonomy. Each code carries a stable 32-bit status value used as the
/// process exit status when the exception goes unhandled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode
{
    /// Read or write to an inaccessible address.
    AccessViolation,
    /// Misaligned data access on an architecture that enforces alignment.
    DatatypeMisalignment,
    /// Breakpoint trap (patched instruction or debug break).
    Breakpoint,
    /// Hardware single-step trap.
    SingleStep,
    /// Array bounds check failure (reported via the float-subscript subcode).
    ArrayBoundsExceeded,
    /// Floating-point divide by zero.
    FltDivideByZero,
    /// Floating-point result was rounded.
    FltInexactResult,
    /// Invalid floating-point operation; also the default for unrecognized
    /// floating-point subcodes.
    FltInvalidOperation,
    /// Floating-point overflow.
    FltOverflow,
    /// Floating-point underflow.
    FltUnderflow,
    /// Integer divide by zero.
    IntDivideByZero,
    /// Integer overflow trap.
    IntOverflow,
    /// Undecodable or reserved instruction; also the default for
    /// unrecognized illegal-instruction subcodes.
    IllegalInstruction,
    /// Instruction legal only at a higher privilege level.
    PrivilegedInstruction,
    /// Stack limit exceeded (bad-stack trap subcode).
    StackOverflow,
    /// A handler tried to continue a noncontinuable exception.
    NoncontinuableException,
    /// A handler returned a disposition outside the protocol.
    InvalidDisposition,
    /// Interactive interrupt (console control).
    ControlCExit,
    /// Runtime assertion failure (process abort signal).
    AssertionFailure,
}

impl ExceptionCode
{
    /// Stable 32-bit status value for this code
    ///
    /// Used as the process exit status when an exception reaches last-chance
    /// handling unclaimed, and by wire protocols that exchange raw status
    /// values.
    #[must_use]
    pub const fn status(self) -> u32
    {
        match self {
            ExceptionCode::AccessViolation => 0xC000_0005,
            ExceptionCode::DatatypeMisalignment => 0x8000_0002,
            ExceptionCode::Breakpoint => 0x8000_0003,
            ExceptionCode::SingleStep => 0x8000_0004,
            ExceptionCode::ArrayBoundsExceeded => 0xC000_008C,
            ExceptionCode::FltDivideByZero => 0xC000_008E,
            ExceptionCode::FltInexactResult => 0xC000_008F,
            ExceptionCode::FltInvalidOperation => 0xC000_0090,
            ExceptionCode::FltOverflow => 0xC000_0091,
            ExceptionCode::FltUnderflow => 0xC000_0093,
            ExceptionCode::IntDivideByZero => 0xC000_0094,
            ExceptionCode::IntOverflow => 0xC000_0095,
            ExceptionCode::IllegalInstruction => 0xC000_001D,
            ExceptionCode::PrivilegedInstruction => 0xC000_0096,
            ExceptionCode::StackOverflow => 0xC000_00FD,
            ExceptionCode::NoncontinuableException => 0xC000_0025,
            ExceptionCode::InvalidDisposition => 0xC000_0026,
            ExceptionCode::ControlCExit => 0xC000_013A,
            ExceptionCode::AssertionFailure => 0xC000_0420,
        }
    }

    /// Exit status to use when terminating the process over this exception.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn exit_status(self) -> i32
    {
        self.status() as i32
    }
}

bitflags! {
    /// Flags qualifying an exception record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionFlags: u32
    {
        /// Execution cannot legally resume at the faulting instruction.
        const NONCONTINUABLE = 0x01;
        /// A chain entry fell outside the stack bounds during the search;
        /// the exception is fatal.
        const STACK_INVALID = 0x08;
        /// The chain search is currently inside a nested dispatch.
        const NESTED_CALL = 0x10;
    }
}

/// Portable description of a single fault
///
/// Built by the signal classifier and threaded through every stage of
/// dispatch. Handlers may mutate the flags (the dispatcher itself sets
/// `STACK_INVALID` and `NESTED_CALL`), but the code and faulting address
/// describe the original trap and do not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord
{
    /// Portable exception code.
    pub code: ExceptionCode,
    /// Continuability and dispatch-state flags.
    pub flags: ExceptionFlags,
    /// Address of the faulting instruction.
    pub address: Address,
    /// Additional parameters; for access violations, `[access_kind, fault_address]`.
    pub parameters: SmallVec<[u64; 4]>,
    /// Previous record when this exception was raised while dispatching
    /// another one.
    pub nested: Option<Box<ExceptionRecord>>,
}

impl ExceptionRecord
{
    /// Create a continuable record with no parameters.
    #[must_use]
    pub fn new(code: ExceptionCode, address: Address) -> Self
    {
        Self {
            code,
            flags: ExceptionFlags::empty(),
            address,
            parameters: SmallVec::new(),
            nested: None,
        }
    }

    /// Mark the record noncontinuable.
    #[must_use]
    pub fn noncontinuable(mut self) -> Self
    {
        self.flags |= ExceptionFlags::NONCONTINUABLE;
        self
    }

    /// Append a parameter, silently dropping anything past the fixed cap.
    pub fn push_parameter(&mut self, value: u64)
    {
        if self.parameters.len() < MAX_PARAMETERS {
            self.parameters.push(value);
        }
    }

    /// Whether execution may resume at the faulting instruction.
    #[must_use]
    pub fn is_continuable(&self) -> bool
    {
        !self.flags.contains(ExceptionFlags::NONCONTINUABLE)
    }
}

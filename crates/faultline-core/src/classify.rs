//! Signal classification.
//!
//! Maps a raw trap (signal family plus machine subcode) to a portable
//! [`ExceptionRecord`]. Classification is total: every subcode, including
//! values this build has never seen, lands on a defined exception code. An
//! unrecognized subcode picks the family's safe default and leaves a
//! diagnostic in the log, it never panics and never invents a new code.
//!
//! Access faults go through the registered [`PageFaultResolver`] first; a
//! resolved fault produces no record at all and the thread resumes silently.

use tracing::warn;

use crate::exception::{ExceptionCode, ExceptionRecord};
use crate::types::Address;

/// Signal family of a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapSignal
{
    /// Invalid memory reference.
    SegmentationFault,
    /// Bus error (alignment or physical address problem).
    BusError,
    /// Illegal or privileged instruction.
    IllegalInstruction,
    /// Arithmetic fault.
    FloatingPoint,
    /// Trace or breakpoint trap.
    Trace,
    /// Interactive interrupt.
    Interrupt,
    /// Process abort.
    Abort,
    /// Suspend request from another thread.
    Suspend,
}

impl TrapSignal
{
    /// The OS signal number that delivers this family.
    #[must_use]
    pub const fn signal_number(self) -> i32
    {
        match self {
            TrapSignal::SegmentationFault => libc::SIGSEGV,
            TrapSignal::BusError => libc::SIGBUS,
            TrapSignal::IllegalInstruction => libc::SIGILL,
            TrapSignal::FloatingPoint => libc::SIGFPE,
            TrapSignal::Trace => libc::SIGTRAP,
            TrapSignal::Interrupt => libc::SIGINT,
            TrapSignal::Abort => libc::SIGABRT,
            TrapSignal::Suspend => libc::SIGUSR1,
        }
    }
}

/// Segmentation fault subcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegvCode
{
    /// Address not mapped to an object.
    MapError,
    /// Invalid permissions for the mapped object.
    AccessError,
    /// Bounds-check failure.
    BoundsError,
    /// Protection-key violation.
    ProtectionKeyError,
    /// Subcode this build does not recognize.
    Other(i32),
}

/// Bus error subcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCode
{
    /// Invalid address alignment.
    Alignment,
    /// Nonexistent physical address.
    AddressError,
    /// Object-specific hardware error.
    ObjectError,
    /// Subcode this build does not recognize.
    Other(i32),
}

/// Illegal instruction subcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllCode
{
    /// Illegal opcode.
    Opcode,
    /// Illegal operand.
    Operand,
    /// Illegal addressing mode.
    AddressingMode,
    /// Illegal trap.
    Trap,
    /// Coprocessor error.
    Coprocessor,
    /// Privileged opcode.
    PrivilegedOpcode,
    /// Privileged register.
    PrivilegedRegister,
    /// Internal stack error.
    BadStack,
    /// Subcode this build does not recognize.
    Other(i32),
}

/// Arithmetic fault subcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpeCode
{
    /// Integer divide by zero.
    IntDivide,
    /// Integer overflow.
    IntOverflow,
    /// Floating-point divide by zero.
    FltDivide,
    /// Floating-point overflow.
    FltOverflow,
    /// Floating-point underflow.
    FltUnderflow,
    /// Floating-point inexact result.
    FltInexact,
    /// Subscript out of range.
    FltSubscript,
    /// Invalid floating-point operation.
    FltInvalid,
    /// Subcode this build does not recognize.
    Other(i32),
}

/// Trace trap subcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceCode
{
    /// Hardware single step.
    Trace,
    /// Breakpoint instruction.
    Breakpoint,
    /// Subcode this build does not recognize.
    Other(i32),
}

/// Machine subcode of a trap, tagged by signal family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCode
{
    /// Subcode of a segmentation fault.
    Segv(SegvCode),
    /// Subcode of a bus error.
    Bus(BusCode),
    /// Subcode of an illegal instruction trap.
    Ill(IllCode),
    /// Subcode of an arithmetic fault.
    Fpe(FpeCode),
    /// Subcode of a trace trap.
    Trace(TraceCode),
    /// Families without meaningful subcodes.
    None,
}

/// Kind of access that triggered a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind
{
    /// Data read.
    Read,
    /// Data write.
    Write,
    /// Instruction fetch.
    Execute,
}

impl AccessKind
{
    /// Parameter value placed in access-violation records.
    #[must_use]
    pub const fn as_parameter(self) -> u64
    {
        match self {
            AccessKind::Read => 0,
            AccessKind::Write => 1,
            AccessKind::Execute => 8,
        }
    }
}

/// Hook consulted before an access fault becomes an exception
///
/// The embedding runtime implements this to service demand paging, guard
/// pages, and write-watch ranges. Returning `None` means the fault was
/// resolved in place and the thread resumes at the faulting instruction
/// with no record ever built; returning a code overrides the default
/// classification (for example a guard-page hit becoming a stack overflow).
pub trait PageFaultResolver
{
    /// Attempt to resolve a fault at `address`.
    fn resolve(&self, address: Address, access: AccessKind) -> Option<ExceptionCode>;
}

/// Build an access-violation record with the standard two parameters.
fn access_violation(address: Address, pc: Address, access: AccessKind) -> ExceptionRecord
{
    let mut record = ExceptionRecord::new(ExceptionCode::AccessViolation, pc);
    record.push_parameter(access.as_parameter());
    record.push_parameter(address.value());
    record
}

/// Classify a segmentation fault or bus error at a data address
///
/// `pc` is the faulting instruction, `fault_address` the address the
/// instruction touched. Returns `None` when the resolver handled the fault
/// and execution should resume with no exception raised.
pub fn classify_fault(
    code: TrapCode,
    pc: Address,
    fault_address: Address,
    access: AccessKind,
    resolver: Option<&dyn PageFaultResolver>,
) -> Option<ExceptionRecord>
{
    match code {
        TrapCode::Segv(segv) => {
            match segv {
                SegvCode::MapError
                | SegvCode::AccessError
                | SegvCode::BoundsError
                | SegvCode::ProtectionKeyError => {}
                SegvCode::Other(raw) => {
                    warn!(subcode = raw, %fault_address, "unknown segmentation fault subcode");
                }
            }
            if let Some(resolver) = resolver {
                match resolver.resolve(fault_address, access) {
                    None => return None,
                    Some(code) => {
                        let mut record = ExceptionRecord::new(code, pc);
                        if code == ExceptionCode::AccessViolation {
                            record.push_parameter(access.as_parameter());
                            record.push_parameter(fault_address.value());
                        }
                        return Some(record);
                    }
                }
            }
            Some(access_violation(fault_address, pc, access))
        }
        TrapCode::Bus(bus) => match bus {
            BusCode::Alignment => Some(ExceptionRecord::new(ExceptionCode::DatatypeMisalignment, pc)),
            BusCode::AddressError | BusCode::ObjectError => {
                if let Some(resolver) = resolver {
                    match resolver.resolve(fault_address, access) {
                        None => return None,
                        Some(code) => {
                            let mut record = ExceptionRecord::new(code, pc);
                            if code == ExceptionCode::AccessViolation {
                                record.push_parameter(access.as_parameter());
                                record.push_parameter(fault_address.value());
                            }
                            return Some(record);
                        }
                    }
                }
                Some(access_violation(fault_address, pc, access))
            }
            BusCode::Other(raw) => {
                warn!(subcode = raw, %fault_address, "unknown bus error subcode");
                Some(access_violation(fault_address, pc, access))
            }
        },
        other => {
            warn!(?other, "fault classifier called with a non-fault subcode");
            Some(access_violation(fault_address, pc, access))
        }
    }
}

/// Classify an illegal-instruction trap.
#[must_use]
pub fn classify_illegal(code: IllCode, pc: Address) -> ExceptionRecord
{
    let exception = match code {
        IllCode::Opcode
        | IllCode::Operand
        | IllCode::AddressingMode
        | IllCode::Trap
        | IllCode::Coprocessor => ExceptionCode::IllegalInstruction,
        IllCode::PrivilegedOpcode | IllCode::PrivilegedRegister => ExceptionCode::PrivilegedInstruction,
        IllCode::BadStack => ExceptionCode::StackOverflow,
        IllCode::Other(raw) => {
            warn!(subcode = raw, %pc, "unknown illegal instruction subcode");
            ExceptionCode::IllegalInstruction
        }
    };
    ExceptionRecord::new(exception, pc)
}

/// Classify an arithmetic fault.
#[must_use]
pub fn classify_arithmetic(code: FpeCode, pc: Address) -> ExceptionRecord
{
    let exception = match code {
        FpeCode::IntDivide => ExceptionCode::IntDivideByZero,
        FpeCode::IntOverflow => ExceptionCode::IntOverflow,
        FpeCode::FltDivide => ExceptionCode::FltDivideByZero,
        FpeCode::FltOverflow => ExceptionCode::FltOverflow,
        FpeCode::FltUnderflow => ExceptionCode::FltUnderflow,
        FpeCode::FltInexact => ExceptionCode::FltInexactResult,
        FpeCode::FltSubscript => ExceptionCode::ArrayBoundsExceeded,
        FpeCode::FltInvalid => ExceptionCode::FltInvalidOperation,
        FpeCode::Other(raw) => {
            warn!(subcode = raw, %pc, "unknown arithmetic fault subcode");
            ExceptionCode::FltInvalidOperation
        }
    };
    ExceptionRecord::new(exception, pc)
}

/// Classify a trace trap.
#[must_use]
pub fn classify_trace(code: TraceCode, pc: Address) -> ExceptionRecord
{
    let exception = match code {
        TraceCode::Trace => ExceptionCode::SingleStep,
        TraceCode::Breakpoint => ExceptionCode::Breakpoint,
        TraceCode::Other(raw) => {
            warn!(subcode = raw, %pc, "unknown trace trap subcode");
            ExceptionCode::Breakpoint
        }
    };
    ExceptionRecord::new(exception, pc)
}

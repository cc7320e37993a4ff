//! Per-signal trap entry points.
//!
//! [`handle_trap`] is the single entry called for every delivered trap
//! signal. Each family follows the same shape: capture the register
//! snapshot from the native context, classify the trap, dispatch the
//! resulting exception, and restore the possibly-modified snapshot back
//! into the native context before resuming.
//!
//! A handler-protocol violation during dispatch is not swallowed: it is
//! wrapped in a fresh noncontinuable exception that nests the original
//! record and dispatched once more, so a debugger still gets to see it
//! before the process goes down.

use tracing::error;

use crate::chain::HandlerChain;
use crate::classify::{
    classify_arithmetic, classify_fault, classify_illegal, classify_trace, AccessKind, FpeCode,
    IllCode, TraceCode, TrapCode, TrapSignal,
};
use crate::context::{Ppc64Context, TrapContext};
use crate::dispatch::{raise_exception, DispatchOutcome};
use crate::error::FaultlineError;
use crate::exception::{ExceptionCode, ExceptionRecord};
use crate::registry::SignalRegistry;
use crate::types::{Address, StackBounds, ThreadId};

/// Store bit of the data storage interrupt status register.
const DSISR_STORE: u64 = 0x0200_0000;

/// Space reserved below the alternate stack for thread bookkeeping.
const RESERVED_BLOCK: usize = 0x20000;

/// Floor for the usable alternate stack, whatever the OS minimum is.
const MIN_ALT_STACK: usize = 0x20000;

/// Raw description of one delivered trap.
#[derive(Debug, Clone, Copy)]
pub struct FaultInfo
{
    /// Signal family.
    pub signal: TrapSignal,
    /// Machine subcode.
    pub code: TrapCode,
    /// Faulting data address, when the family reports one.
    pub fault_address: Address,
}

/// Alternate signal stack for one thread
///
/// Sized so that the usable stack plus the reserved bookkeeping block is a
/// power of two, with the usable part never smaller than both the OS
/// minimum and our own floor. Freed when the thread's trap state drops.
#[derive(Debug)]
pub struct AltStack
{
    buffer: Vec<u8>,
}

impl AltStack
{
    /// Allocate the alternate stack.
    #[must_use]
    pub fn new() -> Self
    {
        let wanted = RESERVED_BLOCK + MIN_ALT_STACK.max(libc::MINSIGSTKSZ);
        let total = wanted.next_power_of_two();
        Self {
            buffer: vec![0; total - RESERVED_BLOCK],
        }
    }

    /// Usable stack size in bytes.
    #[must_use]
    pub fn size(&self) -> usize
    {
        self.buffer.len()
    }

    /// Base address of the usable stack.
    #[must_use]
    pub fn base(&self) -> Address
    {
        Address::new(self.buffer.as_ptr() as u64)
    }
}

impl Default for AltStack
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Per-thread state of the trap layer.
#[derive(Debug)]
pub struct ThreadTrapState
{
    /// Owning thread.
    pub thread: ThreadId,
    /// The thread's exception handler chain.
    pub chain: HandlerChain,
    /// Stack bounds used to validate chain entries.
    pub bounds: StackBounds,
    /// Alternate stack traps are delivered on.
    pub alt_stack: AltStack,
}

impl ThreadTrapState
{
    /// Create trap state for a thread with the given stack bounds.
    #[must_use]
    pub fn new(thread: ThreadId, bounds: StackBounds) -> Self
    {
        Self {
            thread,
            chain: HandlerChain::new(),
            bounds,
            alt_stack: AltStack::new(),
        }
    }
}

/// How a trap was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome
{
    /// The native context was restored; the thread resumes.
    Resumed,
    /// The process control hook was told to terminate.
    Terminated,
}

/// Dispatch a record, escalating protocol violations to their own exception
///
/// The protocol-error exception nests the original record and is itself
/// dispatched first-chance once; a second violation terminates outright.
fn raise_or_escalate(
    registry: &SignalRegistry,
    state: &ThreadTrapState,
    record: &mut ExceptionRecord,
    context: &mut Ppc64Context,
) -> DispatchOutcome
{
    match raise_exception(registry, &state.chain, state.bounds, record, context, true) {
        Ok(outcome) => outcome,
        Err(err) => {
            let code = match err {
                FaultlineError::NonContinuable => ExceptionCode::NoncontinuableException,
                _ => ExceptionCode::InvalidDisposition,
            };
            let mut protocol = ExceptionRecord::new(code, record.address).noncontinuable();
            protocol.nested = Some(Box::new(record.clone()));
            match raise_exception(registry, &state.chain, state.bounds, &mut protocol, context, true) {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(code = ?protocol.code, "handler protocol violated twice, terminating");
                    registry.control().terminate(protocol.code.exit_status());
                    DispatchOutcome::Terminated
                }
            }
        }
    }
}

/// Handle one delivered trap signal
///
/// The caller (the embedding runtime's signal trampoline) has already
/// translated the kernel's context into `trap`; on [`TrapOutcome::Resumed`]
/// the trap context has been rewritten and must be resumed from.
pub fn handle_trap(
    registry: &SignalRegistry,
    state: &ThreadTrapState,
    info: FaultInfo,
    trap: &mut TrapContext,
) -> TrapOutcome
{
    let mut context = Ppc64Context::new();

    match info.signal {
        TrapSignal::SegmentationFault | TrapSignal::BusError => {
            context.capture(trap);
            let access = if context.dsisr & DSISR_STORE == 0 {
                AccessKind::Read
            } else {
                AccessKind::Write
            };
            let pc = Address::new(context.iar);
            let Some(mut record) =
                classify_fault(info.code, pc, info.fault_address, access, registry.resolver())
            else {
                // fault resolved in place
                context.restore(trap);
                return TrapOutcome::Resumed;
            };
            match raise_or_escalate(registry, state, &mut record, &mut context) {
                DispatchOutcome::Handled => {
                    context.restore(trap);
                    TrapOutcome::Resumed
                }
                DispatchOutcome::Terminated => TrapOutcome::Terminated,
            }
        }
        TrapSignal::IllegalInstruction => {
            context.capture(trap);
            let code = match info.code {
                TrapCode::Ill(code) => code,
                _ => IllCode::Other(-1),
            };
            let mut record = classify_illegal(code, Address::new(context.iar));
            match raise_or_escalate(registry, state, &mut record, &mut context) {
                DispatchOutcome::Handled => {
                    context.restore(trap);
                    TrapOutcome::Resumed
                }
                DispatchOutcome::Terminated => TrapOutcome::Terminated,
            }
        }
        TrapSignal::FloatingPoint => {
            context.capture(trap);
            context.capture_fpu(trap);
            let code = match info.code {
                TrapCode::Fpe(code) => code,
                _ => FpeCode::Other(-1),
            };
            let mut record = classify_arithmetic(code, Address::new(context.iar));
            match raise_or_escalate(registry, state, &mut record, &mut context) {
                DispatchOutcome::Handled => {
                    context.restore(trap);
                    context.restore_fpu(trap);
                    TrapOutcome::Resumed
                }
                DispatchOutcome::Terminated => TrapOutcome::Terminated,
            }
        }
        TrapSignal::Trace => {
            context.capture(trap);
            let code = match info.code {
                TrapCode::Trace(code) => code,
                _ => TraceCode::Breakpoint,
            };
            let mut record = classify_trace(code, Address::new(context.iar));
            match raise_or_escalate(registry, state, &mut record, &mut context) {
                DispatchOutcome::Handled => {
                    context.restore(trap);
                    TrapOutcome::Resumed
                }
                DispatchOutcome::Terminated => TrapOutcome::Terminated,
            }
        }
        TrapSignal::Interrupt => {
            #[allow(clippy::cast_sign_loss)]
            if registry.dispatch_raw(TrapSignal::Interrupt.signal_number() as u32) {
                return TrapOutcome::Resumed;
            }
            context.capture(trap);
            let mut record =
                ExceptionRecord::new(ExceptionCode::ControlCExit, Address::new(context.iar));
            match raise_or_escalate(registry, state, &mut record, &mut context) {
                DispatchOutcome::Handled => {
                    context.restore(trap);
                    TrapOutcome::Resumed
                }
                DispatchOutcome::Terminated => TrapOutcome::Terminated,
            }
        }
        TrapSignal::Abort => {
            context.capture(trap);
            let mut record =
                ExceptionRecord::new(ExceptionCode::AssertionFailure, Address::new(context.iar))
                    .noncontinuable();
            match raise_or_escalate(registry, state, &mut record, &mut context) {
                DispatchOutcome::Handled => {
                    context.restore(trap);
                    TrapOutcome::Resumed
                }
                DispatchOutcome::Terminated => TrapOutcome::Terminated,
            }
        }
        TrapSignal::Suspend => {
            context.capture(trap);
            if let Some(waiter) = registry.suspend_waiter() {
                waiter.wait_suspend(&mut context);
            }
            context.restore(trap);
            TrapOutcome::Resumed
        }
    }
}

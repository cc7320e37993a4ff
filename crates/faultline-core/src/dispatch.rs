//! Exception dispatch.
//!
//! Drives an [`ExceptionRecord`] through the fixed handler sequence: debug
//! event sink (first chance), vectored handlers, the per-thread handler
//! chain, then the sink again (last chance), and finally process
//! termination when nothing claims the fault.
//!
//! Handler protocol violations, a handler continuing a noncontinuable
//! exception or returning a disposition outside the protocol, surface as
//! errors so the trap layer can raise them as new exceptions instead of
//! silently resuming.

use tracing::{debug, error, trace};

use crate::chain::{ChainHandle, HandlerChain};
use crate::context::Ppc64Context;
use crate::error::{FaultlineError, FaultlineResult};
use crate::exception::{ExceptionFlags, ExceptionRecord};
use crate::registry::SignalRegistry;
use crate::types::{Address, StackBounds};

/// Disposition returned by a chain handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition
{
    /// The handler fixed the fault; resume at the (possibly modified)
    /// context.
    ContinueExecution,
    /// The handler declines; try the next outer scope.
    ContinueSearch,
    /// A new exception was raised while this handler's dispatch was in
    /// progress; the handle names the outermost scope of that dispatch.
    NestedException(ChainHandle),
    /// Anything a buggy handler might produce outside the protocol.
    Invalid,
}

/// One entry in the per-thread handler chain
///
/// Handlers receive the record and snapshot mutably and may repair the
/// context before returning [`Disposition::ContinueExecution`].
pub trait ChainHandler
{
    /// Handle or decline the exception guarding this scope.
    fn handle(
        &self,
        record: &mut ExceptionRecord,
        context: &mut Ppc64Context,
        handle: ChainHandle,
    ) -> Disposition;
}

/// Disposition returned by a vectored handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectoredDisposition
{
    /// The handler fixed the fault; stop dispatch and resume.
    ContinueExecution,
    /// Keep searching.
    ContinueSearch,
}

/// Process-wide handler run before the per-thread chain
///
/// Vectored handlers run in registration order and are not tied to any
/// stack scope.
pub trait VectoredHandler
{
    /// Handle or decline the exception.
    fn handle(&self, record: &mut ExceptionRecord, context: &mut Ppc64Context) -> VectoredDisposition;
}

/// Response from the debug event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEventResponse
{
    /// The attached debugger handled the exception; resume.
    Handled,
    /// No debugger, or the debugger declined.
    Unhandled,
}

/// Observer for exception announcements
///
/// Called once before any handler runs (first chance) and once more when
/// every handler has declined (last chance). An attached debugger plugs in
/// here; the default sink declines everything.
pub trait DebugEventSink
{
    /// Announce the exception; a debugger may mutate the context before
    /// responding.
    fn announce(
        &self,
        record: &ExceptionRecord,
        context: &mut Ppc64Context,
        first_chance: bool,
    ) -> DebugEventResponse;
}

/// Final authority for taking the process down.
pub trait ProcessControl
{
    /// Terminate the process with the given exit status.
    fn terminate(&self, exit_status: i32);
}

/// How a dispatch concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome
{
    /// Something claimed the exception; resume from the current snapshot.
    Handled,
    /// Nothing claimed it; the process control hook was told to terminate.
    Terminated,
}

/// Walk the handler chain from innermost to outermost
///
/// Returns `Ok(true)` when a handler claimed the exception, `Ok(false)`
/// when every handler declined or the chain was cut short by an invalid
/// entry, and an error on a protocol violation.
fn call_chain_handlers(
    chain: &HandlerChain,
    bounds: StackBounds,
    record: &mut ExceptionRecord,
    context: &mut Ppc64Context,
) -> FaultlineResult<bool>
{
    let mut nested_until: Option<ChainHandle> = None;

    for handle in chain.walk() {
        let Some(scope) = chain.scope(handle) else {
            continue;
        };
        if !bounds.holds_frame(scope) {
            record.flags |= ExceptionFlags::STACK_INVALID;
            break;
        }
        let Some(handler) = chain.handler(handle) else {
            continue;
        };
        trace!(entry = handle.index(), %scope, "calling chain handler");
        let disposition = handler.handle(record, context, handle);

        if nested_until == Some(handle) {
            record.flags -= ExceptionFlags::NESTED_CALL;
            nested_until = None;
        }

        match disposition {
            Disposition::ContinueExecution => {
                if !record.is_continuable() {
                    return Err(FaultlineError::NonContinuable);
                }
                return Ok(true);
            }
            Disposition::ContinueSearch => {}
            Disposition::NestedException(extent) => {
                // the nested dispatch extends to its outermost scope
                if nested_until.is_none_or(|current| extent < current) {
                    nested_until = Some(extent);
                }
                record.flags |= ExceptionFlags::NESTED_CALL;
            }
            Disposition::Invalid => return Err(FaultlineError::InvalidDisposition),
        }
    }
    Ok(false)
}

/// Dispatch one exception through the full handler sequence
///
/// On the first chance the sink, the vectored handlers, and the chain are
/// tried in that order; if all decline (or `first_chance` is false) the
/// sink gets a last chance before the process control hook terminates the
/// process with the exception's status value.
///
/// Protocol violations inside the chain walk are returned as errors and
/// must be re-raised by the caller as their own exceptions.
pub fn raise_exception(
    registry: &SignalRegistry,
    chain: &HandlerChain,
    bounds: StackBounds,
    record: &mut ExceptionRecord,
    context: &mut Ppc64Context,
    first_chance: bool,
) -> FaultlineResult<DispatchOutcome>
{
    if first_chance {
        debug!(
            code = ?record.code,
            flags = ?record.flags,
            address = %record.address,
            parameters = ?record.parameters,
            "first chance exception"
        );
        trace!(
            iar = %Address::new(context.iar),
            lr = %Address::new(context.lr),
            sp = %Address::new(context.stack_pointer()),
            msr = context.msr,
            "register snapshot"
        );

        if registry.sink().announce(record, context, true) == DebugEventResponse::Handled {
            return Ok(DispatchOutcome::Handled);
        }
        for vectored in registry.vectored() {
            if vectored.handle(record, context) == VectoredDisposition::ContinueExecution {
                return Ok(DispatchOutcome::Handled);
            }
        }
        if call_chain_handlers(chain, bounds, record, context)? {
            return Ok(DispatchOutcome::Handled);
        }
    }

    // last chance
    if registry.sink().announce(record, context, false) == DebugEventResponse::Handled {
        return Ok(DispatchOutcome::Handled);
    }

    if record.flags.contains(ExceptionFlags::STACK_INVALID) {
        error!(address = %record.address, "invalid exception frame while dispatching");
    } else if !record.is_continuable() {
        error!(code = ?record.code, address = %record.address, "unhandled noncontinuable exception");
    } else {
        error!(code = ?record.code, address = %record.address, "unhandled exception, terminating");
    }
    registry.control().terminate(record.code.exit_status());
    Ok(DispatchOutcome::Terminated)
}

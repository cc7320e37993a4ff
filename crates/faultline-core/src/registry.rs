//! Process-wide signal and handler registration.
//!
//! All cross-thread state of the trap layer lives in one explicit
//! [`SignalRegistry`] owned by the embedding runtime: raw signal handlers,
//! vectored exception handlers, the page-fault resolver, the debug event
//! sink, and the process control hook. Nothing here is global; tests build
//! as many registries as they like.

use tracing::debug;

use crate::classify::PageFaultResolver;
use crate::context::Ppc64Context;
use crate::dispatch::{DebugEventResponse, DebugEventSink, ProcessControl, VectoredHandler};
use crate::error::{FaultlineError, FaultlineResult};
use crate::exception::ExceptionRecord;

/// Number of raw signal slots.
pub const MAX_RAW_SIGNALS: usize = 256;

/// Raw signal callback, invoked with the signal number.
pub type RawSignalHandler = Box<dyn Fn(u32)>;

/// Hook invoked when a suspend request arrives
///
/// The implementation parks the thread until the suspender releases it; the
/// register snapshot is writable so the suspender can adjust it before the
/// thread resumes.
pub trait SuspendWaiter
{
    /// Block until the suspension is lifted.
    fn wait_suspend(&self, context: &mut Ppc64Context);
}

/// Default sink: no debugger attached, decline everything.
#[derive(Debug, Default)]
pub struct NullDebugSink;

impl DebugEventSink for NullDebugSink
{
    fn announce(
        &self,
        _record: &ExceptionRecord,
        _context: &mut Ppc64Context,
        _first_chance: bool,
    ) -> DebugEventResponse
    {
        DebugEventResponse::Unhandled
    }
}

/// Default process control: exit the current process.
#[derive(Debug, Default)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl
{
    fn terminate(&self, exit_status: i32)
    {
        std::process::exit(exit_status);
    }
}

/// Registration table for the whole trap layer
///
/// Built once by the embedding runtime and shared (immutably after setup)
/// with every trap entry point.
pub struct SignalRegistry
{
    raw_handlers: Vec<Option<RawSignalHandler>>,
    vectored: Vec<Box<dyn VectoredHandler>>,
    resolver: Option<Box<dyn PageFaultResolver>>,
    sink: Box<dyn DebugEventSink>,
    control: Box<dyn ProcessControl>,
    suspend: Option<Box<dyn SuspendWaiter>>,
}

impl Default for SignalRegistry
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl SignalRegistry
{
    /// Create a registry with no handlers, the null debug sink, and
    /// process-exit termination.
    #[must_use]
    pub fn new() -> Self
    {
        let mut raw_handlers = Vec::with_capacity(MAX_RAW_SIGNALS);
        raw_handlers.resize_with(MAX_RAW_SIGNALS, || None);
        Self {
            raw_handlers,
            vectored: Vec::new(),
            resolver: None,
            sink: Box::new(NullDebugSink),
            control: Box::new(SystemProcessControl),
            suspend: None,
        }
    }

    /// Replace the debug event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn DebugEventSink>) -> Self
    {
        self.sink = sink;
        self
    }

    /// Replace the process control hook.
    #[must_use]
    pub fn with_process_control(mut self, control: Box<dyn ProcessControl>) -> Self
    {
        self.control = control;
        self
    }

    /// Install the page-fault resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn PageFaultResolver>) -> Self
    {
        self.resolver = Some(resolver);
        self
    }

    /// Install the suspend waiter.
    #[must_use]
    pub fn with_suspend_waiter(mut self, waiter: Box<dyn SuspendWaiter>) -> Self
    {
        self.suspend = Some(waiter);
        self
    }

    /// Claim a raw signal slot
    ///
    /// Fails when the signal number is out of range or the slot is already
    /// claimed; a claimed signal short-circuits classification entirely.
    pub fn register_raw_handler(&mut self, signal: u32, handler: RawSignalHandler) -> FaultlineResult<()>
    {
        let slot = self
            .raw_handlers
            .get_mut(signal as usize)
            .ok_or(FaultlineError::SignalOutOfRange(signal))?;
        if slot.is_some() {
            return Err(FaultlineError::AlreadyClaimed(signal));
        }
        debug!(signal, "raw signal handler registered");
        *slot = Some(handler);
        Ok(())
    }

    /// Release a raw signal slot.
    pub fn unregister_raw_handler(&mut self, signal: u32) -> FaultlineResult<()>
    {
        let slot = self
            .raw_handlers
            .get_mut(signal as usize)
            .ok_or(FaultlineError::SignalOutOfRange(signal))?;
        *slot = None;
        Ok(())
    }

    /// Invoke the raw handler for `signal`, if one is claimed
    ///
    /// Returns whether a handler ran.
    #[must_use]
    pub fn dispatch_raw(&self, signal: u32) -> bool
    {
        match self.raw_handlers.get(signal as usize).and_then(Option::as_ref) {
            Some(handler) => {
                handler(signal);
                true
            }
            None => false,
        }
    }

    /// Append a vectored exception handler (runs in registration order).
    pub fn add_vectored(&mut self, handler: Box<dyn VectoredHandler>)
    {
        self.vectored.push(handler);
    }

    /// Registered vectored handlers in registration order.
    #[must_use]
    pub fn vectored(&self) -> &[Box<dyn VectoredHandler>]
    {
        &self.vectored
    }

    /// The page-fault resolver, if installed.
    #[must_use]
    pub fn resolver(&self) -> Option<&dyn PageFaultResolver>
    {
        self.resolver.as_deref()
    }

    /// The debug event sink.
    #[must_use]
    pub fn sink(&self) -> &dyn DebugEventSink
    {
        self.sink.as_ref()
    }

    /// The process control hook.
    #[must_use]
    pub fn control(&self) -> &dyn ProcessControl
    {
        self.control.as_ref()
    }

    /// The suspend waiter, if installed.
    #[must_use]
    pub fn suspend_waiter(&self) -> Option<&dyn SuspendWaiter>
    {
        self.suspend.as_deref()
    }
}

impl std::fmt::Debug for SignalRegistry
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("SignalRegistry")
            .field("raw_handlers", &self.raw_handlers.iter().filter(|slot| slot.is_some()).count())
            .field("vectored", &self.vectored.len())
            .field("has_resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

//! Exception dispatch tests.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::TerminateRecorder;
use faultline_core::chain::{ChainHandle, HandlerChain};
use faultline_core::classify::{classify_fault, AccessKind, SegvCode, TrapCode};
use faultline_core::context::Ppc64Context;
use faultline_core::dispatch::{
    raise_exception, ChainHandler, DebugEventResponse, DebugEventSink, DispatchOutcome, Disposition,
    VectoredDisposition, VectoredHandler,
};
use faultline_core::error::FaultlineError;
use faultline_core::exception::{ExceptionCode, ExceptionFlags, ExceptionRecord};
use faultline_core::registry::SignalRegistry;
use faultline_core::types::{Address, StackBounds};

const BOUNDS: StackBounds = StackBounds::new(Address::new(0x1000), Address::new(0x2000));

struct Scripted
{
    id: u32,
    disposition: Disposition,
    calls: Rc<RefCell<Vec<u32>>>,
}

impl ChainHandler for Scripted
{
    fn handle(
        &self,
        _record: &mut ExceptionRecord,
        _context: &mut Ppc64Context,
        _handle: ChainHandle,
    ) -> Disposition
    {
        self.calls.borrow_mut().push(self.id);
        self.disposition
    }
}

fn registry_with_recorder() -> (SignalRegistry, TerminateRecorder)
{
    let recorder = TerminateRecorder::new();
    let registry = SignalRegistry::new().with_process_control(Box::new(recorder.clone()));
    (registry, recorder)
}

#[test]
fn chain_runs_innermost_first_each_handler_once()
{
    common::init_test_logging();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    for (id, scope) in [(1, 0x1f00), (2, 0x1800), (3, 0x1400)] {
        chain.push(
            Address::from(scope),
            Box::new(Scripted {
                id,
                disposition: Disposition::ContinueSearch,
                calls: Rc::clone(&calls),
            }),
        );
    }

    let (registry, recorder) = registry_with_recorder();
    let mut record = ExceptionRecord::new(ExceptionCode::IllegalInstruction, Address::from(0x4000));
    let mut context = Ppc64Context::new();

    let outcome =
        raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();
    assert_eq!(outcome, DispatchOutcome::Terminated);
    assert_eq!(*calls.borrow(), vec![3, 2, 1]);
    assert_eq!(
        recorder.exit_status(),
        Some(ExceptionCode::IllegalInstruction.exit_status())
    );
}

#[test]
fn continue_execution_stops_the_search()
{
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    chain.push(
        Address::from(0x1f00),
        Box::new(Scripted {
            id: 1,
            disposition: Disposition::ContinueSearch,
            calls: Rc::clone(&calls),
        }),
    );
    chain.push(
        Address::from(0x1800),
        Box::new(Scripted {
            id: 2,
            disposition: Disposition::ContinueExecution,
            calls: Rc::clone(&calls),
        }),
    );

    let (registry, recorder) = registry_with_recorder();
    let mut record = ExceptionRecord::new(ExceptionCode::Breakpoint, Address::from(0x4000));
    let mut context = Ppc64Context::new();

    let outcome =
        raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(*calls.borrow(), vec![2]);
    assert_eq!(recorder.exit_status(), None);
}

#[test]
fn continuing_a_noncontinuable_exception_is_a_protocol_error()
{
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    chain.push(
        Address::from(0x1800),
        Box::new(Scripted {
            id: 1,
            disposition: Disposition::ContinueExecution,
            calls: Rc::clone(&calls),
        }),
    );

    let (registry, _recorder) = registry_with_recorder();
    let mut record =
        ExceptionRecord::new(ExceptionCode::AssertionFailure, Address::from(0x4000)).noncontinuable();
    let mut context = Ppc64Context::new();

    let err = raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap_err();
    assert!(matches!(err, FaultlineError::NonContinuable));
}

#[test]
fn invalid_disposition_aborts_the_search()
{
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    chain.push(
        Address::from(0x1f00),
        Box::new(Scripted {
            id: 1,
            disposition: Disposition::ContinueSearch,
            calls: Rc::clone(&calls),
        }),
    );
    chain.push(
        Address::from(0x1800),
        Box::new(Scripted {
            id: 2,
            disposition: Disposition::Invalid,
            calls: Rc::clone(&calls),
        }),
    );

    let (registry, _recorder) = registry_with_recorder();
    let mut record = ExceptionRecord::new(ExceptionCode::Breakpoint, Address::from(0x4000));
    let mut context = Ppc64Context::new();

    let err = raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap_err();
    assert!(matches!(err, FaultlineError::InvalidDisposition));
    // the outer handler never ran
    assert_eq!(*calls.borrow(), vec![2]);
}

#[test]
fn out_of_bounds_chain_entry_makes_the_exception_fatal()
{
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    // outer entry lies beyond the stack base
    chain.push(
        Address::from(0x3000),
        Box::new(Scripted {
            id: 1,
            disposition: Disposition::ContinueExecution,
            calls: Rc::clone(&calls),
        }),
    );
    chain.push(
        Address::from(0x1800),
        Box::new(Scripted {
            id: 2,
            disposition: Disposition::ContinueSearch,
            calls: Rc::clone(&calls),
        }),
    );

    let (registry, recorder) = registry_with_recorder();
    let mut record = ExceptionRecord::new(ExceptionCode::Breakpoint, Address::from(0x4000));
    let mut context = Ppc64Context::new();

    let outcome =
        raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();
    assert_eq!(outcome, DispatchOutcome::Terminated);
    assert_eq!(*calls.borrow(), vec![2]);
    assert!(record.flags.contains(ExceptionFlags::STACK_INVALID));
    assert_eq!(recorder.exit_status(), Some(ExceptionCode::Breakpoint.exit_status()));
}

struct ClaimingVectored;

impl VectoredHandler for ClaimingVectored
{
    fn handle(&self, _record: &mut ExceptionRecord, _context: &mut Ppc64Context) -> VectoredDisposition
    {
        VectoredDisposition::ContinueExecution
    }
}

#[test]
fn vectored_handlers_run_before_the_chain()
{
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    chain.push(
        Address::from(0x1800),
        Box::new(Scripted {
            id: 1,
            disposition: Disposition::ContinueSearch,
            calls: Rc::clone(&calls),
        }),
    );

    let (mut registry, _recorder) = registry_with_recorder();
    registry.add_vectored(Box::new(ClaimingVectored));

    let mut record = ExceptionRecord::new(ExceptionCode::Breakpoint, Address::from(0x4000));
    let mut context = Ppc64Context::new();
    let outcome =
        raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert!(calls.borrow().is_empty());
}

struct LastChanceSink;

impl DebugEventSink for LastChanceSink
{
    fn announce(
        &self,
        _record: &ExceptionRecord,
        _context: &mut Ppc64Context,
        first_chance: bool,
    ) -> DebugEventResponse
    {
        if first_chance {
            DebugEventResponse::Unhandled
        } else {
            DebugEventResponse::Handled
        }
    }
}

#[test]
fn last_chance_sink_can_rescue_an_unhandled_exception()
{
    let chain = HandlerChain::new();
    let recorder = TerminateRecorder::new();
    let registry = SignalRegistry::new()
        .with_sink(Box::new(LastChanceSink))
        .with_process_control(Box::new(recorder.clone()));

    let mut record = ExceptionRecord::new(ExceptionCode::AccessViolation, Address::from(0x4000));
    let mut context = Ppc64Context::new();
    let outcome =
        raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(recorder.exit_status(), None);
}

#[test]
fn unclaimed_access_violation_terminates_with_its_status()
{
    // a read of unmapped address 0x1000 with no resolver installed
    let record = classify_fault(
        TrapCode::Segv(SegvCode::MapError),
        Address::from(0x0000_7fff_0000_0400),
        Address::from(0x1000),
        AccessKind::Read,
        None,
    );
    let mut record = record.unwrap();
    assert_eq!(record.code, ExceptionCode::AccessViolation);
    assert_eq!(record.parameters.as_slice(), &[0, 0x1000]);

    let chain = HandlerChain::new();
    let (registry, recorder) = registry_with_recorder();
    let mut context = Ppc64Context::new();
    let outcome =
        raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();
    assert_eq!(outcome, DispatchOutcome::Terminated);
    assert_eq!(recorder.exit_status(), Some(0xC000_0005u32 as i32));
}

struct NestedReporter
{
    id: u32,
    extent: Rc<RefCell<Option<ChainHandle>>>,
    disposition_flags: Rc<RefCell<Vec<(u32, ExceptionFlags)>>>,
}

impl ChainHandler for NestedReporter
{
    fn handle(
        &self,
        record: &mut ExceptionRecord,
        _context: &mut Ppc64Context,
        _handle: ChainHandle,
    ) -> Disposition
    {
        self.disposition_flags.borrow_mut().push((self.id, record.flags));
        match self.extent.borrow().as_ref() {
            Some(extent) if self.id == 2 => Disposition::NestedException(*extent),
            _ => Disposition::ContinueSearch,
        }
    }
}

#[test]
fn nested_call_flag_covers_exactly_the_nested_extent()
{
    let extent = Rc::new(RefCell::new(None));
    let flags_seen = Rc::new(RefCell::new(Vec::new()));
    let mut chain = HandlerChain::new();
    let outer = chain.push(
        Address::from(0x1f00),
        Box::new(NestedReporter {
            id: 1,
            extent: Rc::clone(&extent),
            disposition_flags: Rc::clone(&flags_seen),
        }),
    );
    chain.push(
        Address::from(0x1800),
        Box::new(NestedReporter {
            id: 2,
            extent: Rc::clone(&extent),
            disposition_flags: Rc::clone(&flags_seen),
        }),
    );
    // the inner handler reports a nested dispatch reaching the outer scope
    *extent.borrow_mut() = Some(outer);

    let (registry, _recorder) = registry_with_recorder();
    let mut record = ExceptionRecord::new(ExceptionCode::Breakpoint, Address::from(0x4000));
    let mut context = Ppc64Context::new();
    raise_exception(&registry, &chain, BOUNDS, &mut record, &mut context, true).unwrap();

    let seen = flags_seen.borrow();
    // inner handler ran before the flag was set, outer one inside the extent
    assert_eq!(seen[0], (2, ExceptionFlags::empty()));
    assert_eq!(seen[1], (1, ExceptionFlags::NESTED_CALL));
    // cleared once the walk passed the extent's outermost scope
    assert!(!record.flags.contains(ExceptionFlags::NESTED_CALL));
}

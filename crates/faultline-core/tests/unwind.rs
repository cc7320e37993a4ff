//! Stack walker tests.

use std::cell::RefCell;
use std::collections::HashMap;

use faultline_core::context::Ppc64Context;
use faultline_core::types::Address;
use faultline_core::unwind::{NoUnwindInfo, StackWalker, UnwindInfo};

/// Fake unwind metadata: maps a probe address to the caller's frame address
/// and the link register value of the caller's frame.
struct TableUnwind
{
    frames: HashMap<u64, (u64, u64)>,
    probes: RefCell<Vec<u64>>,
}

impl TableUnwind
{
    fn new(frames: &[(u64, (u64, u64))]) -> Self
    {
        Self {
            frames: frames.iter().copied().collect(),
            probes: RefCell::new(Vec::new()),
        }
    }
}

impl UnwindInfo for TableUnwind
{
    fn virtual_unwind(&self, pc: Address, context: &mut Ppc64Context) -> Option<u64>
    {
        self.probes.borrow_mut().push(pc.value());
        let (frame_address, caller_lr) = self.frames.get(&pc.value()).copied()?;
        context.lr = caller_lr;
        Some(frame_address)
    }
}

fn faulted_context(pc: u64, sp: u64, lr: u64) -> Ppc64Context
{
    let mut ctx = Ppc64Context::new();
    ctx.iar = pc;
    ctx.gpr[1] = sp;
    ctx.lr = lr;
    ctx
}

#[test]
fn walks_three_frames_to_a_null_return_address()
{
    // bar (faulted at 0x3008) <- foo (returns to 0x2044) <- main (returns to 0x1044)
    let unwind = TableUnwind::new(&[
        (0x3008, (0xf100, 0x1044)),
        (0x2040, (0xf200, 0)),
    ]);
    let mut ctx = faulted_context(0x3008, 0xf000, 0x2044);
    let mut walker = StackWalker::new(&unwind);

    let f1 = walker.next_frame(&mut ctx).unwrap();
    assert_eq!(f1.pc, Address::from(0x3008));
    assert_eq!(f1.stack, Address::from(0xf000));
    assert_eq!(f1.return_address, Address::from(0x2044));
    assert!(f1.is_full_width);
    assert!(f1.is_virtual);

    let f2 = walker.next_frame(&mut ctx).unwrap();
    assert_eq!(f2.pc, Address::from(0x2044));
    assert_eq!(f2.stack, Address::from(0xf100));
    assert_eq!(f2.return_address, Address::from(0x1044));
    assert!(f2.is_virtual);

    let f3 = walker.next_frame(&mut ctx).unwrap();
    assert_eq!(f3.pc, Address::from(0x1044));
    assert_eq!(f3.stack, Address::from(0xf200));
    assert_eq!(f3.return_address, Address::ZERO);

    assert_eq!(walker.next_frame(&mut ctx), None);
    assert_eq!(walker.frames_walked(), 3);
}

#[test]
fn lookup_backs_up_one_instruction_from_the_third_call_onward()
{
    let unwind = TableUnwind::new(&[
        (0x3008, (0xf100, 0x1044)),
        (0x2040, (0xf200, 0)),
    ]);
    let mut ctx = faulted_context(0x3008, 0xf000, 0x2044);
    let mut walker = StackWalker::new(&unwind);
    while walker.next_frame(&mut ctx).is_some() {}

    // first probe uses the faulting pc as-is; the second backs up one
    // instruction from the return address 0x2044
    assert_eq!(*unwind.probes.borrow(), vec![0x3008, 0x2040]);
}

#[test]
fn link_register_fallback_cannot_walk_in_place()
{
    // no metadata and pc == lr: following lr again would loop forever
    let mut ctx = faulted_context(0x5000, 0xf000, 0x5000);
    let mut walker = StackWalker::new(&NoUnwindInfo);

    assert!(walker.next_frame(&mut ctx).is_some());
    assert_eq!(walker.next_frame(&mut ctx), None);
    assert_eq!(walker.frames_walked(), 1);
}

#[test]
fn link_register_fallback_makes_bounded_progress()
{
    let mut ctx = faulted_context(0x6000, 0xf000, 0x5000);
    let mut walker = StackWalker::new(&NoUnwindInfo);

    let f1 = walker.next_frame(&mut ctx).unwrap();
    assert_eq!(f1.pc, Address::from(0x6000));

    // one step of lr fallback, then the pc == lr check ends the walk
    let f2 = walker.next_frame(&mut ctx).unwrap();
    assert_eq!(f2.pc, Address::from(0x5000));
    assert!(f2.is_virtual);
    assert_eq!(walker.next_frame(&mut ctx), None);
}

#[test]
fn stale_metadata_cycle_is_bounded_by_the_lr_check()
{
    // metadata that never advances lr: frame addresses move but the pc
    // chain collapses onto lr after one virtual step
    struct Stuck;
    impl UnwindInfo for Stuck
    {
        fn virtual_unwind(&self, _pc: Address, _context: &mut Ppc64Context) -> Option<u64>
        {
            None
        }
    }

    let mut ctx = faulted_context(0x7010, 0xf000, 0x7000);
    let mut walker = StackWalker::new(&Stuck);
    let mut frames = 0;
    while walker.next_frame(&mut ctx).is_some() {
        frames += 1;
        assert!(frames < 16, "walker failed to terminate");
    }
    assert_eq!(frames, 2);
}

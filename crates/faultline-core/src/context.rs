//! Register snapshots and trap-context translation.
//!
//! A [`Ppc64Context`] is the fixed-layout snapshot of one thread's register
//! file plus a validity bitmask saying which register groups were actually
//! captured. The [`TrapContext`] is the OS-native register blob delivered to
//! a trap handler, re-architected as a tagged value type keyed by
//! architecture so that no overlapping-union reinterpretation is needed.
//!
//! Translation is a pure structural copy in a fixed order: general-purpose
//! registers ascending, then control registers, then floating-point
//! registers, then the floating-point status word. It cannot fail; a field
//! the native layout lacks keeps its prior snapshot value.

use bitflags::bitflags;

bitflags! {
    /// Which register groups of a snapshot hold captured values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContextFlags: u32
    {
        /// Program counter, machine state, link/count and fault registers.
        const CONTROL = 0x0001;
        /// General-purpose registers plus XER and CR.
        const INTEGER = 0x0002;
        /// Floating-point registers and FPSCR.
        const FLOATING_POINT = 0x0004;
        /// Hardware debug registers (no PPC64 backing; reserved).
        const DEBUG = 0x0008;
        /// Everything a trap capture normally provides.
        const FULL = Self::CONTROL.bits() | Self::INTEGER.bits() | Self::FLOATING_POINT.bits();
    }
}

/// Byte layout of a serialized snapshot
///
/// The remote register protocol and the symbolic register table both index
/// into this layout; the offsets are fixed for the lifetime of the process.
pub mod layout
{
    /// Offset of general-purpose register `n` (0..=31).
    #[must_use]
    pub const fn gpr(n: usize) -> usize
    {
        n * 8
    }

    /// Frame pointer slot.
    pub const FP: usize = 256;
    /// Link register.
    pub const LR: usize = 264;
    /// Count register.
    pub const CTR: usize = 272;
    /// Instruction address register (program counter).
    pub const IAR: usize = 280;
    /// Machine state register.
    pub const MSR: usize = 288;
    /// Fixed-point exception register.
    pub const XER: usize = 296;
    /// Condition register.
    pub const CR: usize = 304;
    /// Data address register (faulting address).
    pub const DAR: usize = 312;
    /// Data storage interrupt status register.
    pub const DSISR: usize = 320;
    /// Raw kernel trap number.
    pub const TRAP: usize = 328;

    /// Offset of floating-point register `n` (0..=31).
    #[must_use]
    pub const fn fpr(n: usize) -> usize
    {
        336 + n * 8
    }

    /// Floating-point status and control register.
    pub const FPSCR: usize = 592;
    /// Total serialized size in bytes.
    pub const TOTAL: usize = 600;
}

/// Identifier for a single PPC64 register
///
/// Used by the symbolic register table and the checked [`Ppc64Context::get`]
/// / [`Ppc64Context::set`] accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ppc64Register
{
    /// General-purpose register r0..r31 (r1 is the stack pointer).
    Gpr(u8),
    /// Frame pointer slot (filled by capture intrinsics and the unwinder,
    /// not present in the kernel trap frame).
    Fp,
    /// Link register.
    Lr,
    /// Count register.
    Ctr,
    /// Instruction address register.
    Iar,
    /// Machine state register.
    Msr,
    /// Fixed-point exception register.
    Xer,
    /// Condition register.
    Cr,
    /// Data address register.
    Dar,
    /// Data storage interrupt status register.
    Dsisr,
    /// Raw kernel trap number.
    Trap,
    /// Floating-point register f0..f31 (raw IEEE-754 bits).
    Fpr(u8),
    /// Floating-point status and control register.
    Fpscr,
}

impl Ppc64Register
{
    /// Validity group this register belongs to.
    #[must_use]
    pub const fn group(self) -> ContextFlags
    {
        match self {
            Ppc64Register::Gpr(_) | Ppc64Register::Xer | Ppc64Register::Cr => ContextFlags::INTEGER,
            Ppc64Register::Fp
            | Ppc64Register::Lr
            | Ppc64Register::Ctr
            | Ppc64Register::Iar
            | Ppc64Register::Msr
            | Ppc64Register::Dar
            | Ppc64Register::Dsisr
            | Ppc64Register::Trap => ContextFlags::CONTROL,
            Ppc64Register::Fpr(_) | Ppc64Register::Fpscr => ContextFlags::FLOATING_POINT,
        }
    }
}

/// PPC64 register snapshot
///
/// Fixed-layout value type holding every register the trap layer can
/// capture, plus the validity bitmask. Pure data: all behavior lives in the
/// translator functions and the architecture backend.
///
/// Floating-point registers are stored as raw IEEE-754 bit patterns so that
/// capture/restore round-trips are exact even for NaN payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ppc64Context
{
    /// Which register groups below hold captured values.
    pub flags: ContextFlags,
    /// General-purpose registers r0..r31; r1 is the stack pointer.
    pub gpr: [u64; 32],
    /// Frame pointer slot.
    pub fp: u64,
    /// Link register.
    pub lr: u64,
    /// Count register.
    pub ctr: u64,
    /// Instruction address register (program counter).
    pub iar: u64,
    /// Machine state register.
    pub msr: u64,
    /// Fixed-point exception register.
    pub xer: u64,
    /// Condition register.
    pub cr: u64,
    /// Data address register (faulting address of the last storage trap).
    pub dar: u64,
    /// Data storage interrupt status register.
    pub dsisr: u64,
    /// Raw kernel trap number.
    pub trap: u64,
    /// Floating-point registers f0..f31 as raw bits.
    pub fpr: [u64; 32],
    /// Floating-point status and control register.
    pub fpscr: u64,
}

impl Default for Ppc64Context
{
    fn default() -> Self
    {
        Self {
            flags: ContextFlags::empty(),
            gpr: [0; 32],
            fp: 0,
            lr: 0,
            ctr: 0,
            iar: 0,
            msr: 0,
            xer: 0,
            cr: 0,
            dar: 0,
            dsisr: 0,
            trap: 0,
            fpr: [0; 32],
            fpscr: 0,
        }
    }
}

impl Ppc64Context
{
    /// Create an empty snapshot with no valid groups.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Read a register, checking group validity first
    ///
    /// Returns `None` when the register's group was never captured, or when
    /// a `Gpr`/`Fpr` index is out of range.
    #[must_use]
    pub fn get(&self, register: Ppc64Register) -> Option<u64>
    {
        if !self.flags.contains(register.group()) {
            return None;
        }
        match register {
            Ppc64Register::Gpr(n) => self.gpr.get(n as usize).copied(),
            Ppc64Register::Fp => Some(self.fp),
            Ppc64Register::Lr => Some(self.lr),
            Ppc64Register::Ctr => Some(self.ctr),
            Ppc64Register::Iar => Some(self.iar),
            Ppc64Register::Msr => Some(self.msr),
            Ppc64Register::Xer => Some(self.xer),
            Ppc64Register::Cr => Some(self.cr),
            Ppc64Register::Dar => Some(self.dar),
            Ppc64Register::Dsisr => Some(self.dsisr),
            Ppc64Register::Trap => Some(self.trap),
            Ppc64Register::Fpr(n) => self.fpr.get(n as usize).copied(),
            Ppc64Register::Fpscr => Some(self.fpscr),
        }
    }

    /// Write a register, implicitly marking its group valid
    ///
    /// Returns `None` when a `Gpr`/`Fpr` index is out of range.
    pub fn set(&mut self, register: Ppc64Register, value: u64) -> Option<()>
    {
        match register {
            Ppc64Register::Gpr(n) => *self.gpr.get_mut(n as usize)? = value,
            Ppc64Register::Fp => self.fp = value,
            Ppc64Register::Lr => self.lr = value,
            Ppc64Register::Ctr => self.ctr = value,
            Ppc64Register::Iar => self.iar = value,
            Ppc64Register::Msr => self.msr = value,
            Ppc64Register::Xer => self.xer = value,
            Ppc64Register::Cr => self.cr = value,
            Ppc64Register::Dar => self.dar = value,
            Ppc64Register::Dsisr => self.dsisr = value,
            Ppc64Register::Trap => self.trap = value,
            Ppc64Register::Fpr(n) => *self.fpr.get_mut(n as usize)? = value,
            Ppc64Register::Fpscr => self.fpscr = value,
        }
        self.flags |= register.group();
        Some(())
    }

    /// Set the integer and control registers from a native trap context
    ///
    /// Copies every field the native layout defines, exactly once, in a
    /// fixed order. The frame pointer slot has no counterpart in the kernel
    /// trap frame and keeps its prior value. Cannot fail.
    pub fn capture(&mut self, trap: &TrapContext)
    {
        let TrapContext::Ppc64(frame) = trap;
        self.gpr = frame.gpr;
        self.iar = frame.nip;
        self.msr = frame.msr;
        self.ctr = frame.ctr;
        self.xer = frame.xer;
        self.lr = frame.link;
        self.cr = frame.ccr;
        self.dar = frame.dar;
        self.dsisr = frame.dsisr;
        self.trap = frame.trap;
        self.flags |= ContextFlags::INTEGER | ContextFlags::CONTROL;
    }

    /// Set the floating-point registers from a native trap context
    ///
    /// Distinct from [`Ppc64Context::capture`]: integer-only trap paths skip it.
    pub fn capture_fpu(&mut self, trap: &TrapContext)
    {
        let TrapContext::Ppc64(frame) = trap;
        self.fpr = frame.fpr;
        self.fpscr = frame.fpscr;
        self.flags |= ContextFlags::FLOATING_POINT;
    }

    /// Build the integer and control fields of a native trap context back
    /// from this snapshot, for resumption.
    pub fn restore(&self, trap: &mut TrapContext)
    {
        let TrapContext::Ppc64(frame) = trap;
        frame.gpr = self.gpr;
        frame.nip = self.iar;
        frame.msr = self.msr;
        frame.ctr = self.ctr;
        frame.xer = self.xer;
        frame.link = self.lr;
        frame.ccr = self.cr;
        frame.dar = self.dar;
        frame.dsisr = self.dsisr;
        frame.trap = self.trap;
    }

    /// Restore the floating-point registers to a native trap context.
    pub fn restore_fpu(&self, trap: &mut TrapContext)
    {
        let TrapContext::Ppc64(frame) = trap;
        frame.fpr = self.fpr;
        frame.fpscr = self.fpscr;
    }

    /// Copy the register groups selected by `flags` from another snapshot
    ///
    /// Groups not selected are untouched; selected groups become valid in
    /// the destination.
    pub fn copy_from(&mut self, from: &Ppc64Context, flags: ContextFlags)
    {
        if flags.contains(ContextFlags::CONTROL) {
            self.fp = from.fp;
            self.lr = from.lr;
            self.ctr = from.ctr;
            self.iar = from.iar;
            self.msr = from.msr;
            self.dar = from.dar;
            self.dsisr = from.dsisr;
            self.trap = from.trap;
            self.flags |= ContextFlags::CONTROL;
        }
        if flags.contains(ContextFlags::INTEGER) {
            self.gpr = from.gpr;
            self.xer = from.xer;
            self.cr = from.cr;
            self.flags |= ContextFlags::INTEGER;
        }
        if flags.contains(ContextFlags::FLOATING_POINT) {
            self.fpr = from.fpr;
            self.fpscr = from.fpscr;
            self.flags |= ContextFlags::FLOATING_POINT;
        }
    }

    /// Stack pointer (general-purpose register r1 by convention).
    #[must_use]
    pub const fn stack_pointer(&self) -> u64
    {
        self.gpr[1]
    }

    /// Serialize the selected register groups into a wire buffer
    ///
    /// Values land at their [`layout`] offsets, little-endian; bytes of
    /// unselected groups are left as the caller provided them.
    pub fn encode(&self, flags: ContextFlags, buffer: &mut [u8; layout::TOTAL])
    {
        if flags.contains(ContextFlags::INTEGER) {
            for (n, value) in self.gpr.iter().enumerate() {
                put_u64(buffer, layout::gpr(n), *value);
            }
            put_u64(buffer, layout::XER, self.xer);
            put_u64(buffer, layout::CR, self.cr);
        }
        if flags.contains(ContextFlags::CONTROL) {
            put_u64(buffer, layout::FP, self.fp);
            put_u64(buffer, layout::LR, self.lr);
            put_u64(buffer, layout::CTR, self.ctr);
            put_u64(buffer, layout::IAR, self.iar);
            put_u64(buffer, layout::MSR, self.msr);
            put_u64(buffer, layout::DAR, self.dar);
            put_u64(buffer, layout::DSISR, self.dsisr);
            put_u64(buffer, layout::TRAP, self.trap);
        }
        if flags.contains(ContextFlags::FLOATING_POINT) {
            for (n, value) in self.fpr.iter().enumerate() {
                put_u64(buffer, layout::fpr(n), *value);
            }
            put_u64(buffer, layout::FPSCR, self.fpscr);
        }
    }

    /// Load the selected register groups from a wire buffer, marking them
    /// valid.
    pub fn decode(&mut self, flags: ContextFlags, buffer: &[u8; layout::TOTAL])
    {
        if flags.contains(ContextFlags::INTEGER) {
            for (n, value) in self.gpr.iter_mut().enumerate() {
                *value = take_u64(buffer, layout::gpr(n));
            }
            self.xer = take_u64(buffer, layout::XER);
            self.cr = take_u64(buffer, layout::CR);
            self.flags |= ContextFlags::INTEGER;
        }
        if flags.contains(ContextFlags::CONTROL) {
            self.fp = take_u64(buffer, layout::FP);
            self.lr = take_u64(buffer, layout::LR);
            self.ctr = take_u64(buffer, layout::CTR);
            self.iar = take_u64(buffer, layout::IAR);
            self.msr = take_u64(buffer, layout::MSR);
            self.dar = take_u64(buffer, layout::DAR);
            self.dsisr = take_u64(buffer, layout::DSISR);
            self.trap = take_u64(buffer, layout::TRAP);
            self.flags |= ContextFlags::CONTROL;
        }
        if flags.contains(ContextFlags::FLOATING_POINT) {
            for (n, value) in self.fpr.iter_mut().enumerate() {
                *value = take_u64(buffer, layout::fpr(n));
            }
            self.fpscr = take_u64(buffer, layout::FPSCR);
            self.flags |= ContextFlags::FLOATING_POINT;
        }
    }
}

fn put_u64(buffer: &mut [u8], offset: usize, value: u64)
{
    buffer[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn take_u64(buffer: &[u8], offset: usize) -> u64
{
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Native trap context delivered alongside a signal
///
/// Tagged by architecture instead of the traditional overlapping union; each
/// variant holds its own flat register struct, so translation is plain field
/// copying with no reinterpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapContext
{
    /// Linux PPC64 trap frame.
    Ppc64(Ppc64TrapFrame),
}

/// Flat view of the Linux PPC64 kernel trap frame
///
/// Field names follow the kernel's `pt_regs`: `nip` is the program counter,
/// `link` the link register, `ccr` the condition register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ppc64TrapFrame
{
    /// General-purpose registers r0..r31.
    pub gpr: [u64; 32],
    /// Next instruction pointer (program counter).
    pub nip: u64,
    /// Machine state register.
    pub msr: u64,
    /// Count register.
    pub ctr: u64,
    /// Link register.
    pub link: u64,
    /// Fixed-point exception register.
    pub xer: u64,
    /// Condition register.
    pub ccr: u64,
    /// Data address register.
    pub dar: u64,
    /// Data storage interrupt status register.
    pub dsisr: u64,
    /// Raw kernel trap number.
    pub trap: u64,
    /// Floating-point registers f0..f31 as raw bits.
    pub fpr: [u64; 32],
    /// Floating-point status and control register.
    pub fpscr: u64,
}

impl Default for Ppc64TrapFrame
{
    fn default() -> Self
    {
        Self {
            gpr: [0; 32],
            nip: 0,
            msr: 0,
            ctr: 0,
            link: 0,
            xer: 0,
            ccr: 0,
            dar: 0,
            dsisr: 0,
            trap: 0,
            fpr: [0; 32],
            fpscr: 0,
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn get_checks_group_validity()
    {
        let mut ctx = Ppc64Context::new();
        assert_eq!(ctx.get(Ppc64Register::Gpr(3)), None);
        ctx.set(Ppc64Register::Gpr(3), 42);
        assert_eq!(ctx.get(Ppc64Register::Gpr(3)), Some(42));
        // setting a GPR marks the whole integer group valid
        assert_eq!(ctx.get(Ppc64Register::Xer), Some(0));
        // but not the control group
        assert_eq!(ctx.get(Ppc64Register::Iar), None);
    }

    #[test]
    fn out_of_range_register_indexes_are_rejected()
    {
        let mut ctx = Ppc64Context::new();
        assert_eq!(ctx.set(Ppc64Register::Gpr(32), 1), None);
        assert_eq!(ctx.set(Ppc64Register::Fpr(32), 1), None);
        assert!(ctx.flags.is_empty());
    }

    #[test]
    fn capture_leaves_frame_pointer_alone()
    {
        let mut ctx = Ppc64Context::new();
        ctx.fp = 0xdead_0000;
        let trap = TrapContext::Ppc64(Ppc64TrapFrame {
            nip: 0x1000,
            ..Ppc64TrapFrame::default()
        });
        ctx.capture(&trap);
        assert_eq!(ctx.iar, 0x1000);
        assert_eq!(ctx.fp, 0xdead_0000);
    }

    #[test]
    fn copy_from_moves_only_selected_groups()
    {
        let mut from = Ppc64Context::new();
        from.set(Ppc64Register::Gpr(0), 7);
        from.set(Ppc64Register::Iar, 0x2000);
        from.set(Ppc64Register::Fpr(0), 0x3ff0_0000_0000_0000);

        let mut to = Ppc64Context::new();
        to.copy_from(&from, ContextFlags::INTEGER);
        assert_eq!(to.get(Ppc64Register::Gpr(0)), Some(7));
        assert_eq!(to.get(Ppc64Register::Iar), None);
        assert_eq!(to.get(Ppc64Register::Fpr(0)), None);
    }
}

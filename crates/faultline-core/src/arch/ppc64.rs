//! PPC64 backend.

use smallvec::SmallVec;
use tracing::debug;

use crate::arch::{unsupported, Breakpoint, Capability, CpuAddrKind, CpuBackend, RegisterEntry};
use crate::context::{layout, ContextFlags, Ppc64Context, Ppc64Register};
use crate::error::{FaultlineError, FaultlineResult};
use crate::mem::ProcessMemory;
use crate::types::Address;

/// `twge r2, r2` — unconditional trap, big-endian encoding.
const TRAP_INSTRUCTION: [u8; 4] = 0x7d82_1008u32.to_be_bytes();

/// Single-step enable bit in the machine state register.
const MSR_SE: u64 = 1 << 10;

/// Every PPC64 instruction is four bytes.
const INSN_SIZE: u64 = 4;

macro_rules! reg {
    ($name:literal, $offset:expr, $group:expr) => {
        RegisterEntry {
            name: $name,
            offset: $offset,
            size: 8,
            group: $group,
        }
    };
}

const INT: ContextFlags = ContextFlags::INTEGER;
const CTL: ContextFlags = ContextFlags::CONTROL;
const FLT: ContextFlags = ContextFlags::FLOATING_POINT;

/// Symbolic register table, offsets into the serialized snapshot layout.
static REGISTER_TABLE: &[RegisterEntry] = &[
    reg!("r0", layout::gpr(0), INT),
    reg!("r1", layout::gpr(1), INT),
    reg!("r2", layout::gpr(2), INT),
    reg!("r3", layout::gpr(3), INT),
    reg!("r4", layout::gpr(4), INT),
    reg!("r5", layout::gpr(5), INT),
    reg!("r6", layout::gpr(6), INT),
    reg!("r7", layout::gpr(7), INT),
    reg!("r8", layout::gpr(8), INT),
    reg!("r9", layout::gpr(9), INT),
    reg!("r10", layout::gpr(10), INT),
    reg!("r11", layout::gpr(11), INT),
    reg!("r12", layout::gpr(12), INT),
    reg!("r13", layout::gpr(13), INT),
    reg!("r14", layout::gpr(14), INT),
    reg!("r15", layout::gpr(15), INT),
    reg!("r16", layout::gpr(16), INT),
    reg!("r17", layout::gpr(17), INT),
    reg!("r18", layout::gpr(18), INT),
    reg!("r19", layout::gpr(19), INT),
    reg!("r20", layout::gpr(20), INT),
    reg!("r21", layout::gpr(21), INT),
    reg!("r22", layout::gpr(22), INT),
    reg!("r23", layout::gpr(23), INT),
    reg!("r24", layout::gpr(24), INT),
    reg!("r25", layout::gpr(25), INT),
    reg!("r26", layout::gpr(26), INT),
    reg!("r27", layout::gpr(27), INT),
    reg!("r28", layout::gpr(28), INT),
    reg!("r29", layout::gpr(29), INT),
    reg!("r30", layout::gpr(30), INT),
    reg!("r31", layout::gpr(31), INT),
    reg!("fp", layout::FP, CTL),
    reg!("lr", layout::LR, CTL),
    reg!("ctr", layout::CTR, CTL),
    reg!("pc", layout::IAR, CTL),
    reg!("msr", layout::MSR, CTL),
    reg!("xer", layout::XER, INT),
    reg!("cr", layout::CR, INT),
    reg!("dar", layout::DAR, CTL),
    reg!("dsisr", layout::DSISR, CTL),
    reg!("trap", layout::TRAP, CTL),
    reg!("f0", layout::fpr(0), FLT),
    reg!("f1", layout::fpr(1), FLT),
    reg!("f2", layout::fpr(2), FLT),
    reg!("f3", layout::fpr(3), FLT),
    reg!("f4", layout::fpr(4), FLT),
    reg!("f5", layout::fpr(5), FLT),
    reg!("f6", layout::fpr(6), FLT),
    reg!("f7", layout::fpr(7), FLT),
    reg!("f8", layout::fpr(8), FLT),
    reg!("f9", layout::fpr(9), FLT),
    reg!("f10", layout::fpr(10), FLT),
    reg!("f11", layout::fpr(11), FLT),
    reg!("f12", layout::fpr(12), FLT),
    reg!("f13", layout::fpr(13), FLT),
    reg!("f14", layout::fpr(14), FLT),
    reg!("f15", layout::fpr(15), FLT),
    reg!("f16", layout::fpr(16), FLT),
    reg!("f17", layout::fpr(17), FLT),
    reg!("f18", layout::fpr(18), FLT),
    reg!("f19", layout::fpr(19), FLT),
    reg!("f20", layout::fpr(20), FLT),
    reg!("f21", layout::fpr(21), FLT),
    reg!("f22", layout::fpr(22), FLT),
    reg!("f23", layout::fpr(23), FLT),
    reg!("f24", layout::fpr(24), FLT),
    reg!("f25", layout::fpr(25), FLT),
    reg!("f26", layout::fpr(26), FLT),
    reg!("f27", layout::fpr(27), FLT),
    reg!("f28", layout::fpr(28), FLT),
    reg!("f29", layout::fpr(29), FLT),
    reg!("f30", layout::fpr(30), FLT),
    reg!("f31", layout::fpr(31), FLT),
    reg!("fpscr", layout::FPSCR, FLT),
];

/// The complete PPC64 backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ppc64Backend;

impl Ppc64Backend
{
    /// Create the backend.
    #[must_use]
    pub const fn new() -> Self
    {
        Self
    }
}

impl CpuBackend for Ppc64Backend
{
    fn name(&self) -> &'static str
    {
        "ppc64"
    }

    fn resolve_addr(&self, context: &Ppc64Context, kind: CpuAddrKind) -> Option<Address>
    {
        let value = match kind {
            CpuAddrKind::ProgramCounter => context.get(Ppc64Register::Iar),
            CpuAddrKind::Stack => context.get(Ppc64Register::Gpr(1)),
            CpuAddrKind::Frame => context.get(Ppc64Register::Fp),
        }?;
        Some(Address::new(value))
    }

    fn register_table(&self) -> &'static [RegisterEntry]
    {
        REGISTER_TABLE
    }

    fn single_step(&self, context: &mut Ppc64Context, enable: bool)
    {
        let msr = if enable {
            context.msr | MSR_SE
        } else {
            context.msr & !MSR_SE
        };
        context.set(Ppc64Register::Msr, msr);
    }

    fn insert_breakpoint(
        &self,
        memory: &mut dyn ProcessMemory,
        address: Address,
    ) -> FaultlineResult<Breakpoint>
    {
        let mut saved = [0u8; TRAP_INSTRUCTION.len()];
        let read = memory.read(address, &mut saved)?;
        if read != saved.len() {
            return Err(FaultlineError::ShortTransfer {
                address,
                expected: saved.len(),
                actual: read,
            });
        }
        let written = memory.write(address, &TRAP_INSTRUCTION)?;
        if written != TRAP_INSTRUCTION.len() {
            return Err(FaultlineError::ShortTransfer {
                address,
                expected: TRAP_INSTRUCTION.len(),
                actual: written,
            });
        }
        debug!(%address, "breakpoint inserted");
        Ok(Breakpoint {
            address,
            saved_bytes: SmallVec::from_slice(&saved),
        })
    }

    fn remove_breakpoint(
        &self,
        memory: &mut dyn ProcessMemory,
        breakpoint: &Breakpoint,
    ) -> FaultlineResult<()>
    {
        let written = memory.write(breakpoint.address, &breakpoint.saved_bytes)?;
        if written != breakpoint.saved_bytes.len() {
            return Err(FaultlineError::ShortTransfer {
                address: breakpoint.address,
                expected: breakpoint.saved_bytes.len(),
                actual: written,
            });
        }
        debug!(address = %breakpoint.address, "breakpoint removed");
        Ok(())
    }

    fn adjust_pc_for_break(&self, context: &mut Ppc64Context, backward: bool)
    {
        let iar = if backward {
            context.iar.wrapping_sub(INSN_SIZE)
        } else {
            context.iar.wrapping_add(INSN_SIZE)
        };
        context.set(Ppc64Register::Iar, iar);
    }

    fn fetch_minidump_thread(&self, _data: &[u8], _context: &mut Ppc64Context) -> FaultlineResult<()>
    {
        Err(unsupported(Capability::MinidumpFetch))
    }
}

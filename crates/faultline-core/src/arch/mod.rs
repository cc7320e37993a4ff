//! Architecture backends.
//!
//! A [`CpuBackend`] packages everything about one CPU architecture that the
//! rest of the crate must not hard-code: the breakpoint instruction, the
//! single-step mechanism, address resolution out of a register snapshot,
//! and the symbolic register table used by remote protocols.
//!
//! A backend that lacks a feature reports it with a typed
//! [`FaultlineError::Unsupported`] carrying the missing [`Capability`];
//! callers can match on the capability instead of parsing a message. The
//! first report of each missing capability also leaves a log line.

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use smallvec::SmallVec;
use tracing::warn;

use crate::context::{ContextFlags, Ppc64Context};
use crate::error::{FaultlineError, FaultlineResult};
use crate::mem::ProcessMemory;
use crate::types::Address;

mod ppc64;

pub use ppc64::Ppc64Backend;

/// Optional backend feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability
{
    /// Hardware watchpoints.
    Watchpoints,
    /// Reconstructing thread or module state out of a minidump stream.
    MinidumpFetch,
    /// Instruction disassembly.
    Disassembly,
}

static REPORTED: Lazy<Mutex<HashSet<Capability>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Build an `Unsupported` error, logging the first occurrence per capability.
pub(crate) fn unsupported(capability: Capability) -> FaultlineError
{
    if let Ok(mut reported) = REPORTED.lock() {
        if reported.insert(capability) {
            warn!(?capability, "capability not implemented by this architecture backend");
        }
    }
    FaultlineError::Unsupported { capability }
}

/// Kind of address to resolve out of a register snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuAddrKind
{
    /// Current instruction.
    ProgramCounter,
    /// Top of stack.
    Stack,
    /// Current frame.
    Frame,
}

/// One row of the symbolic register table
///
/// `offset` and `size` index into the serialized snapshot layout
/// ([`crate::context::layout`]), so a remote peer can slice register values
/// straight out of a transferred snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry
{
    /// Protocol-visible register name.
    pub name: &'static str,
    /// Byte offset within the serialized snapshot.
    pub offset: usize,
    /// Width in bytes.
    pub size: usize,
    /// Validity group the register belongs to.
    pub group: ContextFlags,
}

/// An installed software breakpoint
///
/// Holds the bytes the trap instruction replaced; removal writes them back
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint
{
    /// Address the breakpoint is patched at.
    pub address: Address,
    /// Original instruction bytes.
    pub saved_bytes: SmallVec<[u8; 8]>,
}

/// Everything architecture-specific the trap layer needs
///
/// One implementation per supported CPU; the PPC64 backend is the only
/// complete one. Default methods cover the optional capabilities so a
/// backend only overrides what it actually supports.
pub trait CpuBackend
{
    /// Short architecture name for logs and protocol handshakes.
    fn name(&self) -> &'static str;

    /// Resolve a well-known address out of a snapshot
    ///
    /// Returns `None` when the register group holding the address was never
    /// captured.
    fn resolve_addr(&self, context: &Ppc64Context, kind: CpuAddrKind) -> Option<Address>;

    /// The symbolic register table for this architecture.
    fn register_table(&self) -> &'static [RegisterEntry];

    /// Enable or disable hardware single-stepping in a snapshot
    ///
    /// Takes effect when the snapshot is restored into a trap context.
    fn single_step(&self, context: &mut Ppc64Context, enable: bool);

    /// Patch a software breakpoint at `address`
    ///
    /// Reads the instruction currently there, writes the architecture's
    /// trap instruction, and returns the saved bytes. Both transfers must
    /// move the exact instruction width or the patch fails.
    fn insert_breakpoint(
        &self,
        memory: &mut dyn ProcessMemory,
        address: Address,
    ) -> FaultlineResult<Breakpoint>;

    /// Restore the instruction a breakpoint replaced.
    fn remove_breakpoint(
        &self,
        memory: &mut dyn ProcessMemory,
        breakpoint: &Breakpoint,
    ) -> FaultlineResult<()>;

    /// Adjust the program counter after a breakpoint trap
    ///
    /// `backward` moves the counter back onto the patched instruction so it
    /// can be re-executed after the patch is removed; forward skips it.
    fn adjust_pc_for_break(&self, context: &mut Ppc64Context, backward: bool);

    /// Install a hardware watchpoint.
    fn insert_watchpoint(
        &self,
        _memory: &mut dyn ProcessMemory,
        _address: Address,
        _size: usize,
    ) -> FaultlineResult<()>
    {
        Err(unsupported(Capability::Watchpoints))
    }

    /// Remove a hardware watchpoint.
    fn remove_watchpoint(&self, _memory: &mut dyn ProcessMemory, _address: Address) -> FaultlineResult<()>
    {
        Err(unsupported(Capability::Watchpoints))
    }

    /// Disassemble the instruction at `address` into display text.
    fn disassemble(&self, _memory: &dyn ProcessMemory, _address: Address) -> FaultlineResult<String>
    {
        Err(unsupported(Capability::Disassembly))
    }

    /// Rebuild a thread's snapshot from a minidump stream.
    fn fetch_minidump_thread(&self, _data: &[u8], _context: &mut Ppc64Context) -> FaultlineResult<()>
    {
        Err(unsupported(Capability::MinidumpFetch))
    }

    /// Extract module information from a minidump stream.
    fn fetch_minidump_module(&self, _data: &[u8]) -> FaultlineResult<()>
    {
        Err(unsupported(Capability::MinidumpFetch))
    }
}

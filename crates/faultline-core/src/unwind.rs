//! Architecture-specific stack walking.
//!
//! The walker produces one [`StackFrame`] per call and threads a register
//! snapshot through the whole walk; each step rewrites the snapshot's stack
//! pointer and program counter so the next step sees the caller's state.
//!
//! Unwind metadata comes in through the [`UnwindInfo`] seam. When no
//! metadata covers the current program counter the walker falls back to the
//! link register, with a cycle check so a stale link register cannot loop
//! the walk forever.

use tracing::warn;

use crate::context::Ppc64Context;
use crate::types::Address;

/// Source of call-frame unwind metadata
///
/// `virtual_unwind` restores the caller's registers into the snapshot for
/// the frame containing `pc` and returns the caller's canonical frame
/// address, or `None` when no metadata covers `pc`. Implementations may
/// freely mutate the snapshot even on the failure path.
pub trait UnwindInfo
{
    /// Unwind one frame at `pc`.
    fn virtual_unwind(&self, pc: Address, context: &mut Ppc64Context) -> Option<u64>;
}

/// Unwind source with no metadata at all; every walk falls back to the
/// link register.
#[derive(Debug, Default)]
pub struct NoUnwindInfo;

impl UnwindInfo for NoUnwindInfo
{
    fn virtual_unwind(&self, _pc: Address, _context: &mut Ppc64Context) -> Option<u64>
    {
        None
    }
}

/// One frame produced by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame
{
    /// Program counter within the frame's function.
    pub pc: Address,
    /// Stack pointer of the frame.
    pub stack: Address,
    /// Frame pointer slot of the snapshot at this frame.
    pub frame: Address,
    /// Return address that will leave this frame.
    pub return_address: Address,
    /// Addresses use the full 64-bit width.
    pub is_full_width: bool,
    /// The frame is software-reconstructed rather than hardware state.
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkMode
{
    Start,
    Active,
    Done,
}

/// Iterative stack walker over a register snapshot
///
/// Call [`StackWalker::next_frame`] repeatedly with the same snapshot; the
/// walk ends when it returns `None` (null return address, or no way to make
/// progress past a frame).
pub struct StackWalker<'a>
{
    unwind: &'a dyn UnwindInfo,
    mode: WalkMode,
    count: u32,
    current: StackFrame,
}

impl<'a> StackWalker<'a>
{
    /// Create a walker backed by the given unwind metadata source.
    #[must_use]
    pub fn new(unwind: &'a dyn UnwindInfo) -> Self
    {
        Self {
            unwind,
            mode: WalkMode::Start,
            count: 0,
            current: StackFrame {
                pc: Address::ZERO,
                stack: Address::ZERO,
                frame: Address::ZERO,
                return_address: Address::ZERO,
                is_full_width: false,
                is_virtual: false,
            },
        }
    }

    /// Number of frames produced so far.
    #[must_use]
    pub const fn frames_walked(&self) -> u32
    {
        self.count
    }

    /// Produce the next frame, advancing the snapshot to the caller
    ///
    /// The first call reports the interrupted frame straight from the
    /// snapshot. Later calls unwind one level. From the third call onward
    /// the lookup address backs up one instruction from the reported
    /// program counter, so a return address just past a call site resolves
    /// to the calling function rather than whatever follows it.
    pub fn next_frame(&mut self, context: &mut Ppc64Context) -> Option<StackFrame>
    {
        let delta_pc: u64 = if self.count <= 1 { 0 } else { 4 };

        match self.mode {
            WalkMode::Done => return None,
            WalkMode::Start => {
                self.current = StackFrame {
                    pc: Address::new(context.iar),
                    stack: Address::new(context.stack_pointer()),
                    frame: Address::new(context.fp),
                    return_address: Address::new(context.lr),
                    is_full_width: true,
                    is_virtual: true,
                };
                self.mode = WalkMode::Active;
            }
            WalkMode::Active => {
                if self.current.pc != Address::new(context.iar) {
                    warn!(
                        frame_pc = %self.current.pc,
                        snapshot_pc = %Address::new(context.iar),
                        "stack walk program counter diverged from snapshot"
                    );
                }
                if self.current.stack != Address::new(context.stack_pointer()) {
                    warn!(
                        frame_sp = %self.current.stack,
                        snapshot_sp = %Address::new(context.stack_pointer()),
                        "stack walk stack pointer diverged from snapshot"
                    );
                }
                if self.current.return_address == Address::ZERO {
                    self.mode = WalkMode::Done;
                    return None;
                }
                if !self.fetch_next_frame(context, self.current.pc - delta_pc) {
                    self.mode = WalkMode::Done;
                    return None;
                }
                self.current = StackFrame {
                    pc: Address::new(context.iar),
                    stack: Address::new(context.stack_pointer()),
                    frame: Address::new(context.fp),
                    return_address: Address::new(context.lr),
                    is_full_width: true,
                    is_virtual: true,
                };
            }
        }
        self.count += 1;
        Some(self.current)
    }

    /// Rewrite the snapshot to the caller of the frame at `pc`
    ///
    /// Returns `false` when no progress is possible: no unwind metadata and
    /// the program counter already equals the link register, so following
    /// the link register again would walk in place.
    fn fetch_next_frame(&self, context: &mut Ppc64Context, pc: Address) -> bool
    {
        // read before the unwind source can rewrite the snapshot
        let old_return = context.lr;

        match self.unwind.virtual_unwind(pc, context) {
            Some(frame_address) => {
                context.gpr[1] = frame_address;
                context.iar = old_return;
                true
            }
            None => {
                if context.iar == context.lr {
                    return false;
                }
                context.iar = old_return;
                true
            }
        }
    }
}

impl std::fmt::Debug for StackWalker<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("StackWalker")
            .field("mode", &self.mode)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

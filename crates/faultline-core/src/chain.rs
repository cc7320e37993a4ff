//! Per-thread exception handler chain.
//!
//! Handlers are kept in an arena owned by the thread's trap state instead of
//! as raw linked-list nodes threaded through stack memory. Each entry still
//! carries the stack address of the scope it guards, so the dispatcher can
//! validate entries against the thread's stack bounds exactly as the
//! traditional in-stack chain would be validated.
//!
//! Entries obey strict stack discipline: the most recently pushed entry is
//! the innermost scope and is searched first.

use crate::dispatch::ChainHandler;
use crate::error::{FaultlineError, FaultlineResult};
use crate::types::Address;

/// Stable handle to one handler chain entry
///
/// Handles order the same way the scopes nest: a smaller handle is an outer
/// scope. The dispatcher uses this ordering to track how far a nested
/// dispatch extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainHandle(usize);

impl ChainHandle
{
    /// Arena slot index of this entry.
    #[must_use]
    pub const fn index(self) -> usize
    {
        self.0
    }
}

struct ChainEntry
{
    scope: Address,
    handler: Box<dyn ChainHandler>,
}

/// Arena of one thread's registered exception handlers
///
/// `push` and `pop` follow scope entry and exit; the dispatcher walks the
/// arena from innermost to outermost without removing anything.
#[derive(Default)]
pub struct HandlerChain
{
    entries: Vec<ChainEntry>,
}

impl HandlerChain
{
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Register a handler guarding the scope rooted at `scope`
    ///
    /// `scope` is the stack address of the guarded frame; the dispatcher
    /// checks it against the thread's stack bounds before the handler runs.
    pub fn push(&mut self, scope: Address, handler: Box<dyn ChainHandler>) -> ChainHandle
    {
        let handle = ChainHandle(self.entries.len());
        self.entries.push(ChainEntry { scope, handler });
        handle
    }

    /// Unregister the innermost handler
    ///
    /// Fails with [`FaultlineError::CorruptChain`] when `handle` is not the
    /// innermost live entry; unregistration must mirror registration.
    pub fn pop(&mut self, handle: ChainHandle) -> FaultlineResult<()>
    {
        match self.innermost() {
            Some(innermost) if innermost == handle => {
                self.entries.truncate(handle.0);
                Ok(())
            }
            _ => Err(FaultlineError::CorruptChain(handle.0)),
        }
    }

    /// Handle of the innermost live entry, if any.
    #[must_use]
    pub fn innermost(&self) -> Option<ChainHandle>
    {
        self.entries.len().checked_sub(1).map(ChainHandle)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Scope address of an entry, or `None` for a dead handle.
    #[must_use]
    pub fn scope(&self, handle: ChainHandle) -> Option<Address>
    {
        self.entries.get(handle.0).map(|entry| entry.scope)
    }

    /// Handler of an entry, or `None` for a dead handle.
    #[must_use]
    pub fn handler(&self, handle: ChainHandle) -> Option<&dyn ChainHandler>
    {
        self.entries.get(handle.0).map(|entry| entry.handler.as_ref())
    }

    /// Walk live entries from innermost to outermost.
    pub fn walk(&self) -> impl Iterator<Item = ChainHandle> + '_
    {
        (0..self.entries.len()).rev().map(ChainHandle)
    }
}

impl std::fmt::Debug for HandlerChain
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("HandlerChain").field("len", &self.len()).finish()
    }
}

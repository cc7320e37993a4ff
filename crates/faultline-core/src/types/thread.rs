//! Thread identity and stack bounds.

use super::Address;

/// Thread identifier
///
/// A thread identifier uniquely identifies a thread within a process. The
/// exact representation is platform-specific (a kernel TID on Linux, a Mach
/// thread port on macOS); we store it as a `u64` to provide a
/// platform-agnostic interface.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::ThreadId;
///
/// let thread = ThreadId::from(12345);
/// assert_eq!(thread.raw(), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

/// Stack limits of a single thread
///
/// The exception dispatcher validates every handler chain entry against
/// these bounds before invoking it; an entry that lies outside the owning
/// thread's stack is treated as chain corruption and aborts the search.
///
/// `limit` is the lowest valid stack address, `base` the address one past
/// the highest (stacks grow downward on every supported architecture).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBounds
{
    /// Lowest address that belongs to the stack (inclusive).
    pub limit: Address,
    /// Address just past the top of the stack (exclusive).
    pub base: Address,
}

impl StackBounds
{
    /// Create bounds from the stack limit and base addresses.
    #[must_use]
    pub const fn new(limit: Address, base: Address) -> Self
    {
        Self { limit, base }
    }

    /// Check whether a chain entry address is a plausible stack location
    ///
    /// Mirrors the classic frame validation: the address must be pointer
    /// aligned and must leave room for at least one pointer below the stack
    /// base.
    #[must_use]
    pub fn holds_frame(&self, address: Address) -> bool
    {
        if !address.is_aligned(4) {
            return false;
        }
        address >= self.limit && address < self.base.saturating_sub(std::mem::size_of::<u64>() as u64)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn frame_validation_rejects_misaligned_addresses()
    {
        let bounds = StackBounds::new(Address::from(0x1000), Address::from(0x2000));
        assert!(bounds.holds_frame(Address::from(0x1800)));
        assert!(!bounds.holds_frame(Address::from(0x1801)));
        assert!(!bounds.holds_frame(Address::from(0x1802)));
    }

    #[test]
    fn frame_validation_rejects_out_of_range_addresses()
    {
        let bounds = StackBounds::new(Address::from(0x1000), Address::from(0x2000));
        assert!(!bounds.holds_frame(Address::from(0x0ff8)));
        assert!(bounds.holds_frame(Address::from(0x1000)));
        assert!(!bounds.holds_frame(Address::from(0x1ff8)));
        assert!(!bounds.holds_frame(Address::from(0x2000)));
    }
}

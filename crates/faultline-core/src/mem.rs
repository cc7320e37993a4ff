//! Target memory access.

use crate::error::FaultlineResult;
use crate::types::Address;

/// Read and write access to the inspected process's memory
///
/// The breakpoint layer patches instructions through this trait, so the
/// implementation decides whether access is in-process, via ptrace, or over
/// a remote protocol. Partial transfers are reported through the returned
/// byte count rather than an error; callers that need an exact length must
/// check it themselves.
pub trait ProcessMemory
{
    /// Read up to `buffer.len()` bytes starting at `address`
    ///
    /// Returns the number of bytes actually read.
    fn read(&self, address: Address, buffer: &mut [u8]) -> FaultlineResult<usize>;

    /// Write up to `data.len()` bytes starting at `address`
    ///
    /// Returns the number of bytes actually written.
    fn write(&mut self, address: Address, data: &[u8]) -> FaultlineResult<usize>;
}

//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use faultline_core::dispatch::ProcessControl;
use faultline_core::error::FaultlineResult;
use faultline_core::mem::ProcessMemory;
use faultline_core::types::Address;
use faultline_utils::{LogFormat, LogLevel};

static LOGGING: std::sync::Once = std::sync::Once::new();

/// Install a verbose subscriber once per test binary.
pub fn init_test_logging()
{
    LOGGING.call_once(|| {
        let _ = faultline_utils::init_logging_with_level(LogLevel::Trace, LogFormat::Pretty);
    });
}

/// In-memory target address space backed by a byte vector.
pub struct VecMemory
{
    base: Address,
    bytes: Vec<u8>,
}

impl VecMemory
{
    pub fn new(base: u64, bytes: Vec<u8>) -> Self
    {
        Self {
            base: Address::from(base),
            bytes,
        }
    }

    pub fn bytes_at(&self, address: u64, len: usize) -> &[u8]
    {
        let offset = (address - self.base.value()) as usize;
        &self.bytes[offset..offset + len]
    }
}

impl ProcessMemory for VecMemory
{
    fn read(&self, address: Address, buffer: &mut [u8]) -> FaultlineResult<usize>
    {
        let Some(offset) = address.value().checked_sub(self.base.value()) else {
            return Ok(0);
        };
        let offset = offset as usize;
        if offset >= self.bytes.len() {
            return Ok(0);
        }
        let available = (self.bytes.len() - offset).min(buffer.len());
        buffer[..available].copy_from_slice(&self.bytes[offset..offset + available]);
        Ok(available)
    }

    fn write(&mut self, address: Address, data: &[u8]) -> FaultlineResult<usize>
    {
        let Some(offset) = address.value().checked_sub(self.base.value()) else {
            return Ok(0);
        };
        let offset = offset as usize;
        if offset >= self.bytes.len() {
            return Ok(0);
        }
        let available = (self.bytes.len() - offset).min(data.len());
        self.bytes[offset..offset + available].copy_from_slice(&data[..available]);
        Ok(available)
    }
}

/// Process control hook that records the exit status instead of exiting.
#[derive(Clone, Default)]
pub struct TerminateRecorder
{
    status: Rc<RefCell<Option<i32>>>,
}

impl TerminateRecorder
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn exit_status(&self) -> Option<i32>
    {
        *self.status.borrow()
    }
}

impl ProcessControl for TerminateRecorder
{
    fn terminate(&self, exit_status: i32)
    {
        *self.status.borrow_mut() = Some(exit_status);
    }
}

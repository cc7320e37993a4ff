//! Breakpoint patching tests.

mod common;

use common::VecMemory;
use faultline_core::arch::{CpuBackend, Ppc64Backend};
use faultline_core::error::FaultlineError;
use faultline_core::types::Address;

const TRAP: [u8; 4] = [0x7d, 0x82, 0x10, 0x08];

#[test]
fn insert_patches_the_trap_instruction()
{
    let mut memory = VecMemory::new(0x4000, vec![0xaa, 0xbb, 0xcc, 0xdd, 0x60, 0x00, 0x00, 0x00]);
    let backend = Ppc64Backend::new();

    let bp = backend.insert_breakpoint(&mut memory, Address::from(0x4000)).unwrap();
    assert_eq!(bp.saved_bytes.as_slice(), &[0xaa, 0xbb, 0xcc, 0xdd]);
    assert_eq!(memory.bytes_at(0x4000, 4), &TRAP);
    // the following instruction is untouched
    assert_eq!(memory.bytes_at(0x4004, 4), &[0x60, 0x00, 0x00, 0x00]);
}

#[test]
fn remove_restores_the_original_bytes()
{
    let mut memory = VecMemory::new(0x4000, vec![0xaa, 0xbb, 0xcc, 0xdd]);
    let backend = Ppc64Backend::new();

    let bp = backend.insert_breakpoint(&mut memory, Address::from(0x4000)).unwrap();
    backend.remove_breakpoint(&mut memory, &bp).unwrap();
    assert_eq!(memory.bytes_at(0x4000, 4), &[0xaa, 0xbb, 0xcc, 0xdd]);
}

#[test]
fn short_read_fails_the_patch_and_leaves_memory_alone()
{
    // only two readable bytes at the patch address
    let mut memory = VecMemory::new(0x4000, vec![0xaa, 0xbb]);
    let backend = Ppc64Backend::new();

    let err = backend
        .insert_breakpoint(&mut memory, Address::from(0x4000))
        .unwrap_err();
    assert!(matches!(
        err,
        FaultlineError::ShortTransfer {
            expected: 4,
            actual: 2,
            ..
        }
    ));
    assert_eq!(memory.bytes_at(0x4000, 2), &[0xaa, 0xbb]);
}

#[test]
fn unmapped_address_is_a_short_transfer()
{
    let mut memory = VecMemory::new(0x4000, vec![0; 16]);
    let backend = Ppc64Backend::new();

    let err = backend
        .insert_breakpoint(&mut memory, Address::from(0x9000))
        .unwrap_err();
    assert!(matches!(err, FaultlineError::ShortTransfer { actual: 0, .. }));
}

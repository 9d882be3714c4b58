//! Address space integration tests

use od_memory::constants::*;
use od_memory::{DspMemory, DspRam, MemoryManager};

#[test]
fn test_big_endian_operations() {
    let mem = MemoryManager::new().unwrap();
    let addr = MEM1_CACHED_BASE + 0x1000;

    mem.write_be16(addr, 0x1234).unwrap();
    assert_eq!(mem.read_be16(addr).unwrap(), 0x1234);
    assert_eq!(mem.read_u8(addr).unwrap(), 0x12);

    mem.write_be32(addr + 2, 0x12345678).unwrap();
    assert_eq!(mem.read_be32(addr + 2).unwrap(), 0x12345678);

    mem.write_be64(addr + 8, 0xDEADBEEFCAFEBABE).unwrap();
    assert_eq!(mem.read_be64(addr + 8).unwrap(), 0xDEADBEEFCAFEBABE);
    assert_eq!(mem.read_be32(addr + 12).unwrap(), 0xCAFEBABE);
}

#[test]
fn test_unaligned_access() {
    let mem = MemoryManager::new().unwrap();
    let addr = MEM1_CACHED_BASE + 1;

    mem.write_be32(addr, 0x12345678).unwrap();
    assert_eq!(mem.read_be32(addr).unwrap(), 0x12345678);

    mem.write_be64(addr, 0xDEADBEEFCAFEBABE).unwrap();
    assert_eq!(mem.read_be64(addr).unwrap(), 0xDEADBEEFCAFEBABE);
}

#[test]
fn test_image_load_at_entry_point() {
    let mem = MemoryManager::new().unwrap();
    mem.load_image(DEFAULT_LOAD_ADDR, &[0x60, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(mem.read_be32(DEFAULT_LOAD_ADDR).unwrap(), 0x6000_0000);

    let too_big = vec![0u8; 16];
    assert!(mem
        .load_image(MEM1_CACHED_BASE + MEM1_SIZE - 8, &too_big)
        .is_err());

    mem.clear();
    assert_eq!(mem.read_be32(DEFAULT_LOAD_ADDR).unwrap(), 0);
}

#[test]
fn test_concurrent_access() {
    use std::thread;

    let mem = MemoryManager::new().unwrap();
    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let mem = mem.clone();
            thread::spawn(move || {
                let addr = MEM1_CACHED_BASE + i * 0x1000;
                for j in 0..100u32 {
                    mem.write_be32(addr, i * 1000 + j).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    for i in 0..4u32 {
        assert_eq!(mem.read_be32(MEM1_CACHED_BASE + i * 0x1000).unwrap(), i * 1000 + 99);
    }
}

#[test]
fn test_dsp_dram_wraps_within_page_window() {
    let mut ram = DspRam::new();
    ram.write_dmem(0x0400, 0x1111);
    ram.write_dmem(0x0800, 0x2222);
    assert_eq!(ram.read_dmem(0x0400), 0x1111);
    assert_eq!(ram.read_dmem(0x0800), 0x2222);

    ram.load_iram_words(&[1, 2, 3]).unwrap();
    ram.clear_iram();
    assert_eq!(ram.read_imem(1), 0);
}

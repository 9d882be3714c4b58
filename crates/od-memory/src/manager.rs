//! Gekko main memory

use std::sync::Arc;

use od_core::error::MemoryError;
use parking_lot::RwLock;

use crate::constants::*;

/// Big-endian MEM1 backing store, visible through the physical window and
/// both the cached and uncached virtual mirrors.
pub struct MemoryManager {
    mem1: RwLock<Vec<u8>>,
}

impl MemoryManager {
    /// Allocate a zeroed MEM1
    pub fn new() -> Result<Arc<Self>, MemoryError> {
        tracing::debug!("Allocating {} MB of MEM1", MEM1_SIZE >> 20);
        Ok(Arc::new(Self {
            mem1: RwLock::new(vec![0; MEM1_SIZE as usize]),
        }))
    }

    /// Translate a guest address to an offset into MEM1
    fn offset(addr: u32, size: usize) -> Result<usize, MemoryError> {
        let phys = match addr >> 30 {
            0 => addr,
            2 => addr - MEM1_CACHED_BASE,
            3 => addr - MEM1_UNCACHED_BASE,
            _ => return Err(MemoryError::Unmapped { addr }),
        };
        if phys >= MEM1_SIZE {
            return Err(MemoryError::Unmapped { addr });
        }
        let start = phys as usize;
        if start + size > MEM1_SIZE as usize {
            return Err(MemoryError::OutOfRange { addr, size });
        }
        Ok(start)
    }

    fn read_array<const N: usize>(&self, addr: u32) -> Result<[u8; N], MemoryError> {
        let start = Self::offset(addr, N)?;
        let mem = self.mem1.read();
        let mut out = [0u8; N];
        out.copy_from_slice(&mem[start..start + N]);
        Ok(out)
    }

    fn write_array<const N: usize>(&self, addr: u32, bytes: [u8; N]) -> Result<(), MemoryError> {
        let start = Self::offset(addr, N)?;
        self.mem1.write()[start..start + N].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.read_array::<1>(addr)?[0])
    }

    pub fn write_u8(&self, addr: u32, value: u8) -> Result<(), MemoryError> {
        self.write_array(addr, [value])
    }

    pub fn read_be16(&self, addr: u32) -> Result<u16, MemoryError> {
        self.read_array(addr).map(u16::from_be_bytes)
    }

    pub fn write_be16(&self, addr: u32, value: u16) -> Result<(), MemoryError> {
        self.write_array(addr, value.to_be_bytes())
    }

    pub fn read_be32(&self, addr: u32) -> Result<u32, MemoryError> {
        self.read_array(addr).map(u32::from_be_bytes)
    }

    pub fn write_be32(&self, addr: u32, value: u32) -> Result<(), MemoryError> {
        self.write_array(addr, value.to_be_bytes())
    }

    pub fn read_be64(&self, addr: u32) -> Result<u64, MemoryError> {
        self.read_array(addr).map(u64::from_be_bytes)
    }

    pub fn write_be64(&self, addr: u32, value: u64) -> Result<(), MemoryError> {
        self.write_array(addr, value.to_be_bytes())
    }

    /// Copy a raw image into guest memory
    pub fn load_image(&self, addr: u32, image: &[u8]) -> Result<(), MemoryError> {
        let start = Self::offset(addr, 0)?;
        if start + image.len() > MEM1_SIZE as usize {
            return Err(MemoryError::ImageTooLarge { addr, len: image.len() });
        }
        self.mem1.write()[start..start + image.len()].copy_from_slice(image);
        tracing::debug!("Loaded {} byte image at 0x{:08x}", image.len(), addr);
        Ok(())
    }

    /// Zero all of MEM1
    pub fn clear(&self) {
        self.mem1.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrors_alias() {
        let mem = MemoryManager::new().unwrap();
        mem.write_be32(MEM1_CACHED_BASE + 0x100, 0xdead_beef).unwrap();
        assert_eq!(mem.read_be32(0x100).unwrap(), 0xdead_beef);
        assert_eq!(mem.read_be32(MEM1_UNCACHED_BASE + 0x100).unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_unmapped_window() {
        let mem = MemoryManager::new().unwrap();
        assert_eq!(
            mem.read_be32(0x4000_0000),
            Err(MemoryError::Unmapped { addr: 0x4000_0000 })
        );
        assert!(mem.read_u8(MEM1_CACHED_BASE + MEM1_SIZE).is_err());
    }

    #[test]
    fn test_access_straddling_end() {
        let mem = MemoryManager::new().unwrap();
        let addr = MEM1_CACHED_BASE + MEM1_SIZE - 2;
        assert_eq!(
            mem.read_be32(addr),
            Err(MemoryError::OutOfRange { addr, size: 4 })
        );
    }
}

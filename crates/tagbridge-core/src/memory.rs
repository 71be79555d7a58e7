//! Guest linear memory as a bounds-checked arena.
//!
//! Guest pointers never reach calling code as raw addresses. They are
//! [`GuestPtr`] offsets, resolved only through the checked accessors on
//! [`Arena`]. An offset that does not resolve inside memory is a
//! [`BridgeError::MemoryFault`], which means host and guest disagree about
//! the ABI.

use std::fmt;
use std::num::NonZeroU32;

use tagbridge_common::BridgeError;

/// Width of a guest pointer in bytes (wasm32).
pub const POINTER_WIDTH: u32 = 4;

/// A non-null offset into guest linear memory.
///
/// Zero is the guest's null/allocation-failure sentinel and cannot be
/// represented, so nothing can be written through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestPtr(NonZeroU32);

impl GuestPtr {
    /// Interpret a raw guest word; zero yields `None`.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw offset, for passing back to the guest.
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The offset `bytes` further on, or `None` past the 32-bit address space.
    pub fn checked_add(self, bytes: u32) -> Option<Self> {
        self.get().checked_add(bytes).and_then(Self::new)
    }
}

impl fmt::Display for GuestPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

/// A guest linear memory plus the guest's allocator.
///
/// Implemented by live instances; tests also implement it over a plain
/// byte vector.
pub trait Arena {
    /// Current contents of linear memory.
    fn data(&self) -> &[u8];

    /// Current contents of linear memory, mutable.
    fn data_mut(&mut self) -> &mut [u8];

    /// Call the guest allocator, returning its raw result word.
    fn malloc(&mut self, size: u32) -> Result<u32, BridgeError>;

    /// Allocate `size` bytes, mapping the null sentinel to
    /// [`BridgeError::AllocationFailed`].
    fn alloc(&mut self, size: u32) -> Result<GuestPtr, BridgeError> {
        let raw = self.malloc(size)?;
        GuestPtr::new(raw).ok_or(BridgeError::AllocationFailed { size })
    }

    /// The pointer `bytes` past `ptr`.
    ///
    /// Overflowing the address space is a [`BridgeError::MemoryFault`]
    /// against the current memory size.
    fn offset(&self, ptr: GuestPtr, bytes: u32) -> Result<GuestPtr, BridgeError> {
        ptr.checked_add(bytes).ok_or_else(|| {
            BridgeError::memory_fault(u64::from(ptr.get()), u64::from(bytes), self.data().len())
        })
    }

    /// Borrow `len` bytes at `ptr`.
    fn read(&self, ptr: GuestPtr, len: u32) -> Result<&[u8], BridgeError> {
        let data = self.data();
        let range = checked_range(ptr, len, data.len())?;
        Ok(&data[range])
    }

    /// Borrow up to `len` bytes at `ptr`, stopping early at the end of memory.
    ///
    /// Fails only if `ptr` itself lies at or beyond the end of memory.
    fn read_window(&self, ptr: GuestPtr, len: u32) -> Result<&[u8], BridgeError> {
        let data = self.data();
        let start = ptr.get() as usize;
        if start >= data.len() {
            return Err(BridgeError::memory_fault(
                u64::from(ptr.get()),
                u64::from(len),
                data.len(),
            ));
        }
        let end = start.saturating_add(len as usize).min(data.len());
        Ok(&data[start..end])
    }

    /// Copy `bytes` into memory at `ptr`.
    fn write(&mut self, ptr: GuestPtr, bytes: &[u8]) -> Result<(), BridgeError> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            BridgeError::memory_fault(u64::from(ptr.get()), bytes.len() as u64, self.data().len())
        })?;
        let data = self.data_mut();
        let range = checked_range(ptr, len, data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a little-endian `u32` at `ptr`.
    fn read_u32(&self, ptr: GuestPtr) -> Result<u32, BridgeError> {
        let bytes = self.read(ptr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write a little-endian `u32` at `ptr`.
    fn write_u32(&mut self, ptr: GuestPtr, value: u32) -> Result<(), BridgeError> {
        self.write(ptr, &value.to_le_bytes())
    }
}

fn checked_range(
    ptr: GuestPtr,
    len: u32,
    memory_size: usize,
) -> Result<std::ops::Range<usize>, BridgeError> {
    let start = ptr.get() as usize;
    match start.checked_add(len as usize) {
        Some(end) if end <= memory_size => Ok(start..end),
        _ => Err(BridgeError::memory_fault(
            u64::from(ptr.get()),
            u64::from(len),
            memory_size,
        )),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::VecArena;
    use super::*;

    fn ptr(raw: u32) -> GuestPtr {
        GuestPtr::new(raw).unwrap()
    }

    #[test]
    fn test_zero_is_not_a_pointer() {
        assert!(GuestPtr::new(0).is_none());
        assert_eq!(GuestPtr::new(16).map(GuestPtr::get), Some(16));
    }

    #[test]
    fn test_ptr_checked_add() {
        assert_eq!(ptr(8).checked_add(4).map(GuestPtr::get), Some(12));
        assert_eq!(ptr(u32::MAX).checked_add(1), None);
    }

    #[test]
    fn test_offset_overflow_reports_memory_size() {
        let arena = VecArena::new(48);

        assert_eq!(arena.offset(ptr(8), 4).unwrap().get(), 12);
        assert!(matches!(
            arena.offset(ptr(u32::MAX), 1),
            Err(BridgeError::MemoryFault {
                offset: 0xFFFF_FFFF,
                len: 1,
                memory_size: 48,
            })
        ));
    }

    #[test]
    fn test_alloc_maps_null_to_allocation_failed() {
        let mut arena = VecArena::failing_after(64, 0);
        assert!(matches!(
            arena.alloc(4),
            Err(BridgeError::AllocationFailed { size: 4 })
        ));
    }

    #[test]
    fn test_read_write_u32() {
        let mut arena = VecArena::new(64);
        arena.write_u32(ptr(12), 0xDEAD_BEEF).unwrap();

        assert_eq!(arena.read_u32(ptr(12)).unwrap(), 0xDEAD_BEEF);
        assert_eq!(arena.read(ptr(12), 4).unwrap(), &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_out_of_bounds_is_memory_fault() {
        let mut arena = VecArena::new(32);

        assert!(matches!(
            arena.read(ptr(30), 4),
            Err(BridgeError::MemoryFault { offset: 30, len: 4, memory_size: 32 })
        ));
        assert!(matches!(
            arena.write(ptr(31), &[1, 2]),
            Err(BridgeError::MemoryFault { .. })
        ));
        assert!(matches!(
            arena.read_u32(ptr(1000)),
            Err(BridgeError::MemoryFault { .. })
        ));
    }

    #[test]
    fn test_read_window_clamps_to_memory_end() {
        let arena = VecArena::new(32);

        assert_eq!(arena.read_window(ptr(24), 64).unwrap().len(), 8);
        assert!(matches!(
            arena.read_window(ptr(32), 1),
            Err(BridgeError::MemoryFault { .. })
        ));
    }
}

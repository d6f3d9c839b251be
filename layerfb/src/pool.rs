//! Frame buffer memory.
//!
//! Frame buffers live in memory the CPU cache does not keep coherent
//! with the display controller, so they are carved out of dedicated,
//! aligned regions rather than the general heap. Two strategies are
//! provided behind [`FrameAllocator`]:
//!
//! - [`LayerReservations`]: one region per layer, split into equal
//!   slots sized for the layer's maximum geometry.
//! - [`BumpArena`]: one shared region handed out front to back and
//!   never reclaimed.

use alloc::alloc::{alloc_zeroed, Layout};
use alloc::vec::Vec;

use crate::config::LayerGeometry;
use crate::display::LayerId;
use crate::error::{DisplayError, Result};

/// A region handed out by a frame allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRegion {
    /// Layer the region belongs to.
    pub layer: LayerId,
    /// Base address.
    pub address: usize,
    /// Length in bytes.
    pub len: usize,
}

impl FrameRegion {
    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.address + self.len
    }

    /// Whether two regions share any byte.
    pub fn overlaps(&self, other: &FrameRegion) -> bool {
        self.address < other.end() && other.address < self.end()
    }
}

/// Source of frame buffer memory.
pub trait FrameAllocator {
    /// Hand out `size` bytes for `layer`.
    fn allocate(&mut self, layer: LayerId, size: usize) -> Result<FrameRegion>;

    /// Fill a previously allocated region with zeros.
    fn zero(&mut self, region: &FrameRegion) -> Result<()>;

    /// Whether regions may carry stale pixels from earlier use, making
    /// an initial clear meaningful.
    fn reuses_memory(&self) -> bool;

    /// Bytes handed out so far.
    fn used(&self) -> usize;

    /// Total bytes under management.
    fn capacity(&self) -> usize;
}

/// Aligned block suitable for a non-cacheable link section.
#[repr(C, align(64))]
pub struct FrameMemory<const N: usize>(pub [u8; N]);

impl<const N: usize> FrameMemory<N> {
    pub const fn new() -> Self {
        FrameMemory([0; N])
    }

    /// Hand the block over to an allocator.
    pub fn as_region(&'static mut self) -> &'static mut [u8] {
        &mut self.0
    }
}

impl<const N: usize> Default for FrameMemory<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Obtain zeroed, aligned memory that lives for the rest of the process.
pub fn alloc_frame_memory(len: usize, align: usize) -> Result<&'static mut [u8]> {
    let layout = Layout::from_size_align(len.max(1), align)
        .map_err(|_| DisplayError::InvalidConfig("frame memory layout"))?;

    // SAFETY: the layout has non-zero size.
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(DisplayError::OutOfMemory {
            requested: len,
            available: 0,
        });
    }

    // SAFETY: `ptr` is a fresh allocation of at least `len` bytes that is
    // never freed, so handing out a unique 'static borrow is sound.
    Ok(unsafe { core::slice::from_raw_parts_mut(ptr, len) })
}

/// Align `value` up to `align`, a power of two.
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

fn check_aligned(memory: &[u8], align: usize) -> Result<()> {
    if !align.is_power_of_two() {
        return Err(DisplayError::InvalidConfig("alignment must be a power of two"));
    }
    let address = memory.as_ptr() as usize;
    if address % align != 0 {
        return Err(DisplayError::Misaligned { address, align });
    }
    Ok(())
}

fn zero_within(memory: &mut [u8], region: &FrameRegion) -> bool {
    let base = memory.as_ptr() as usize;
    if region.address < base || region.end() > base + memory.len() {
        return false;
    }
    let offset = region.address - base;
    memory[offset..offset + region.len].fill(0);
    true
}

/// Shared bump-pointer arena.
pub struct BumpArena {
    /// Backing memory.
    memory: &'static mut [u8],
    /// Allocation alignment.
    align: usize,
    /// Next free offset.
    offset: usize,
}

impl BumpArena {
    /// Create an arena over `memory`, which must be aligned to `align`.
    pub fn new(memory: &'static mut [u8], align: usize) -> Result<Self> {
        check_aligned(memory, align)?;
        Ok(BumpArena {
            memory,
            align,
            offset: 0,
        })
    }

    /// Base address of the arena.
    pub fn base(&self) -> usize {
        self.memory.as_ptr() as usize
    }

    /// Bytes still available at the next aligned offset.
    pub fn remaining(&self) -> usize {
        self.memory
            .len()
            .saturating_sub(align_up(self.offset, self.align))
    }
}

impl FrameAllocator for BumpArena {
    fn allocate(&mut self, layer: LayerId, size: usize) -> Result<FrameRegion> {
        let start = align_up(self.offset, self.align);
        let available = self.memory.len().saturating_sub(start);
        if size > available {
            log::error!(
                "[layerfb] arena exhausted: layer {} wants {} bytes, {} left",
                layer.0,
                size,
                available
            );
            return Err(DisplayError::OutOfMemory {
                requested: size,
                available,
            });
        }

        self.offset = start + size;
        let region = FrameRegion {
            layer,
            address: self.base() + start,
            len: size,
        };
        log::debug!(
            "[layerfb] arena: layer {} gets {:#x}+{}",
            layer.0,
            region.address,
            size
        );
        Ok(region)
    }

    fn zero(&mut self, region: &FrameRegion) -> Result<()> {
        if zero_within(self.memory, region) {
            Ok(())
        } else {
            Err(DisplayError::InvalidConfig("region not owned by arena"))
        }
    }

    fn reuses_memory(&self) -> bool {
        true
    }

    fn used(&self) -> usize {
        self.offset
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

/// Static reservation for one layer.
struct Reservation {
    layer: LayerId,
    memory: &'static mut [u8],
    /// Aligned distance between slots.
    slot_size: usize,
    slots: usize,
    next_slot: usize,
}

/// Per-layer static reservations.
pub struct LayerReservations {
    reservations: Vec<Reservation>,
    align: usize,
}

impl LayerReservations {
    /// Create an empty reservation table.
    pub fn new(align: usize) -> Result<Self> {
        if !align.is_power_of_two() {
            return Err(DisplayError::InvalidConfig("alignment must be a power of two"));
        }
        Ok(LayerReservations {
            reservations: Vec::new(),
            align,
        })
    }

    /// Register `memory` as the reservation of `layer`, split into
    /// `slots` buffers of `buffer_size` bytes each.
    pub fn reserve(
        &mut self,
        layer: LayerId,
        memory: &'static mut [u8],
        buffer_size: usize,
        slots: usize,
    ) -> Result<()> {
        check_aligned(memory, self.align)?;
        if self.reservations.iter().any(|r| r.layer == layer) {
            return Err(DisplayError::InvalidConfig("layer already reserved"));
        }

        let slot_size = align_up(buffer_size, self.align);
        let needed = slot_size * slots;
        if memory.len() < needed {
            return Err(DisplayError::OutOfMemory {
                requested: needed,
                available: memory.len(),
            });
        }

        self.reservations.push(Reservation {
            layer,
            memory,
            slot_size,
            slots,
            next_slot: 0,
        });
        Ok(())
    }

    /// Reserve heap-backed memory for every layer of `geometry`.
    pub fn for_geometry(
        geometry: &[LayerGeometry],
        bytes_per_pixel: u32,
        slots: usize,
        align: usize,
    ) -> Result<Self> {
        let mut table = Self::new(align)?;
        for (index, layer) in geometry.iter().enumerate() {
            let buffer_size = layer.buffer_size(bytes_per_pixel);
            let memory = alloc_frame_memory(align_up(buffer_size, align) * slots, align)?;
            table.reserve(LayerId(index as u8), memory, buffer_size, slots)?;
        }
        Ok(table)
    }

    /// Address of `slot` in the reservation of `layer`.
    pub fn slot_address(&self, layer: LayerId, slot: usize) -> Option<usize> {
        let r = self.reservations.iter().find(|r| r.layer == layer)?;
        if slot >= r.slots {
            return None;
        }
        Some(r.memory.as_ptr() as usize + slot * r.slot_size)
    }
}

impl FrameAllocator for LayerReservations {
    fn allocate(&mut self, layer: LayerId, size: usize) -> Result<FrameRegion> {
        let r = self
            .reservations
            .iter_mut()
            .find(|r| r.layer == layer)
            .ok_or(DisplayError::OutOfMemory {
                requested: size,
                available: 0,
            })?;

        if size > r.slot_size || r.next_slot >= r.slots {
            let available = if r.next_slot < r.slots { r.slot_size } else { 0 };
            return Err(DisplayError::OutOfMemory {
                requested: size,
                available,
            });
        }

        let address = r.memory.as_ptr() as usize + r.next_slot * r.slot_size;
        log::debug!(
            "[layerfb] layer {} slot {} at {:#x}",
            layer.0,
            r.next_slot,
            address
        );
        r.next_slot += 1;

        Ok(FrameRegion {
            layer,
            address,
            len: size,
        })
    }

    fn zero(&mut self, region: &FrameRegion) -> Result<()> {
        for r in self.reservations.iter_mut().filter(|r| r.layer == region.layer) {
            if zero_within(r.memory, region) {
                return Ok(());
            }
        }
        Err(DisplayError::InvalidConfig("region not owned by reservation"))
    }

    fn reuses_memory(&self) -> bool {
        false
    }

    fn used(&self) -> usize {
        self.reservations
            .iter()
            .map(|r| r.next_slot * r.slot_size)
            .sum()
    }

    fn capacity(&self) -> usize {
        self.reservations.iter().map(|r| r.memory.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    fn small_block() -> &'static mut [u8] {
        Box::leak(Box::new(FrameMemory::<1024>::new())).as_region()
    }

    #[test]
    fn test_arena_exhaustion() {
        let mut arena = BumpArena::new(small_block(), 16).unwrap();

        let first = arena.allocate(LayerId(0), 600).unwrap();
        assert_eq!(first.address, arena.base());

        let err = arena.allocate(LayerId(0), 600).unwrap_err();
        assert_eq!(
            err,
            DisplayError::OutOfMemory {
                requested: 600,
                available: 1024 - 608,
            }
        );
        assert_eq!(arena.used(), 600);
    }

    #[test]
    fn test_arena_failure_point_is_deterministic() {
        let sizes = [100usize, 250, 300, 90, 500];
        let run = || {
            let mut arena = BumpArena::new(small_block(), 16).unwrap();
            sizes
                .iter()
                .position(|&s| arena.allocate(LayerId(1), s).is_err())
        };
        let first = run();
        assert_eq!(first, Some(4));
        assert_eq!(run(), first);
    }

    #[test]
    fn test_arena_alignment_and_monotonic() {
        let mut arena = BumpArena::new(small_block(), 64).unwrap();
        let a = arena.allocate(LayerId(0), 10).unwrap();
        let b = arena.allocate(LayerId(0), 10).unwrap();
        assert_eq!(b.address - a.address, 64);
        assert_eq!(b.address % 64, 0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_arena_rejects_misaligned_backing() {
        let block = small_block();
        let (_, tail) = block.split_at_mut(1);
        assert!(matches!(
            BumpArena::new(tail, 16),
            Err(DisplayError::Misaligned { align: 16, .. })
        ));
    }

    #[test]
    fn test_arena_zero() {
        let mut arena = BumpArena::new(small_block(), 16).unwrap();
        let region = arena.allocate(LayerId(0), 32).unwrap();
        // SAFETY: region lies inside the leaked test block.
        let bytes = unsafe { core::slice::from_raw_parts_mut(region.address as *mut u8, region.len) };
        bytes.fill(0xAB);
        arena.zero(&region).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reservations_do_not_overlap() {
        let geometry = [LayerGeometry::new(16, 8), LayerGeometry::new(8, 8)];
        let mut pool = LayerReservations::for_geometry(&geometry, 4, 2, 64).unwrap();

        let mut regions = Vec::new();
        for layer in 0..2u8 {
            let size = geometry[layer as usize].buffer_size(4);
            for _ in 0..2 {
                regions.push(pool.allocate(LayerId(layer), size).unwrap());
            }
        }
        for (i, a) in regions.iter().enumerate() {
            assert_eq!(a.address % 64, 0);
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
        assert_eq!(pool.slot_address(LayerId(0), 1), Some(regions[1].address));
    }

    #[test]
    fn test_reservation_slots_exhaust() {
        let geometry = [LayerGeometry::new(4, 4)];
        let mut pool = LayerReservations::for_geometry(&geometry, 2, 2, 64).unwrap();
        pool.allocate(LayerId(0), 32).unwrap();
        pool.allocate(LayerId(0), 32).unwrap();
        assert!(matches!(
            pool.allocate(LayerId(0), 32),
            Err(DisplayError::OutOfMemory { available: 0, .. })
        ));
        assert!(pool.allocate(LayerId(3), 32).is_err());
        assert!(!pool.reuses_memory());
    }

    #[test]
    fn test_reservation_rejects_oversized_request() {
        let geometry = [LayerGeometry::new(4, 4)];
        let mut pool = LayerReservations::for_geometry(&geometry, 2, 1, 64).unwrap();
        assert!(pool.allocate(LayerId(0), 65).is_err());
    }
}

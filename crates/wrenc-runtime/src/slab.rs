//! Slab object allocator (spec 4.K, component K).
//!
//! Heap objects live in fixed-size **slabs** (16 KiB, page-aligned), each
//! dedicated to one size category. Free space inside a slab is tracked with
//! in-place **free-shims**: small records written directly into unused
//! object slots, identified by a magic value that can never collide with a
//! live object's header (a real `ObjHeader.class` pointer always has its
//! high tag bits set; the magic does not).

use std::alloc::Layout;

use rand::RngCore;
use thiserror::Error;

use crate::object::ObjHeader;

/// Slab size: 16 KiB, matching a typical page-aligned allocation unit.
pub const SLAB_SIZE: usize = 16 * 1024;

/// Magic value identifying a free-shim. Deliberately placed at byte offset 0
/// of the shim (the same position a live object's class pointer occupies)
/// so "is this slot free" is a single 8-byte compare.
pub const FREE_SHIM_MAGIC: u64 = 0xA8AC_DBA2;

/// Explicit preferred small-object sizes, covering strings/lists/common
/// shapes without rounding waste.
const PREFERRED_SIZES: &[usize] = &[16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512];

/// Rounds a requested allocation size up to its size category: the nearest
/// preferred size, or else the next step in a power-of-`sqrt(2)` series.
pub fn size_category(requested: usize) -> usize {
    let requested = requested.max(std::mem::size_of::<FreeShim>());
    if let Some(&preferred) = PREFERRED_SIZES.iter().find(|&&s| s >= requested) {
        return preferred;
    }
    let mut size = *PREFERRED_SIZES.last().unwrap();
    while size < requested {
        size = ((size as f64) * std::f64::consts::SQRT_2).ceil() as usize;
        size = (size + 7) & !7;
    }
    size
}

#[repr(C)]
struct FreeShim {
    magic: u64,
    length: u32,
    prev: i32,
    next: i32,
}

const NONE_OFFSET: i32 = -1;

/// A single 16 KiB slab dedicated to one object size.
struct Slab {
    base: *mut u8,
    object_size: usize,
    /// Byte offset, relative to `base`, of the first free-shim; `-1` if full.
    free_head: i32,
    live_count: u32,
}

impl Slab {
    unsafe fn shim_at(&self, offset: i32) -> *mut FreeShim {
        self.base.add(offset as usize) as *mut FreeShim
    }

    fn capacity(&self) -> usize {
        SLAB_SIZE / self.object_size
    }
}

/// One size category: all slabs holding objects of `object_size` bytes.
struct SizeCategory {
    object_size: usize,
    slabs: Vec<Slab>,
    /// Indices into `slabs` known to have free space, most-recently-used last.
    free_slabs: Vec<usize>,
}

impl SizeCategory {
    fn new(object_size: usize) -> Self {
        Self { object_size, slabs: Vec::new(), free_slabs: Vec::new() }
    }
}

#[derive(Debug, Error)]
pub enum SlabError {
    #[error("failed to map a new slab: {0}")]
    MapFailed(std::io::Error),
}

/// Size-bucketed slab allocator. Single-threaded (spec §5): no locking.
pub struct SlabAllocator {
    categories: Vec<SizeCategory>,
}

impl Default for SlabAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SlabAllocator {
    pub fn new() -> Self {
        Self { categories: Vec::new() }
    }

    fn category_mut(&mut self, object_size: usize) -> usize {
        if let Some(idx) = self.categories.iter().position(|c| c.object_size == object_size) {
            return idx;
        }
        self.categories.push(SizeCategory::new(object_size));
        self.categories.len() - 1
    }

    /// Allocates one zeroed object-sized chunk. Returns a pointer suitable
    /// for placing an `ObjHeader` (or any object beginning with one).
    pub fn allocate(&mut self, requested_size: usize) -> Result<*mut ObjHeader, SlabError> {
        let size = size_category(requested_size);
        let cat_idx = self.category_mut(size);

        loop {
            if let Some(&slab_idx) = self.categories[cat_idx].free_slabs.last() {
                let slab = &mut self.categories[cat_idx].slabs[slab_idx];
                let shim_offset = slab.free_head;
                debug_assert!(shim_offset >= 0);

                unsafe {
                    let shim_ptr = slab.shim_at(shim_offset);
                    let shim = std::ptr::read(shim_ptr);
                    let remaining = shim.length as usize - slab.object_size;

                    if remaining >= slab.object_size {
                        // Shrink the shim in place, leaving it at the same head.
                        let new_shim_offset = shim_offset + slab.object_size as i32;
                        let new_shim = FreeShim { magic: FREE_SHIM_MAGIC, length: remaining as u32, prev: shim.prev, next: shim.next };
                        std::ptr::write(slab.shim_at(new_shim_offset), new_shim);
                        slab.free_head = new_shim_offset;
                        relink_neighbors(slab, shim.prev, shim.next, new_shim_offset);
                    } else {
                        // Consume the whole shim.
                        slab.free_head = shim.next;
                        relink_neighbors(slab, shim.prev, shim.next, shim.next);
                        if shim.next == NONE_OFFSET {
                            self.categories[cat_idx].free_slabs.pop();
                        }
                    }

                    let obj_ptr = slab.base.add(shim_offset as usize);
                    std::ptr::write_bytes(obj_ptr, 0, slab.object_size);
                    slab.live_count += 1;
                    return Ok(obj_ptr as *mut ObjHeader);
                }
            }

            self.add_slab(cat_idx, size)?;
        }
    }

    fn add_slab(&mut self, cat_idx: usize, object_size: usize) -> Result<(), SlabError> {
        let base = map_high_entropy_slab()?;
        let slab = Slab { base, object_size, free_head: 0, live_count: 0 };
        unsafe {
            let shim = FreeShim { magic: FREE_SHIM_MAGIC, length: SLAB_SIZE as u32, prev: NONE_OFFSET, next: NONE_OFFSET };
            std::ptr::write(slab.shim_at(0), shim);
        }
        let slabs = &mut self.categories[cat_idx].slabs;
        slabs.push(slab);
        self.categories[cat_idx].free_slabs.push(slabs.len() - 1);
        Ok(())
    }

    /// Walks every slab, reclaiming objects whose header color does not
    /// match `live_color`. Reclaimed slots become free-shims, merged with an
    /// immediately preceding shim when possible.
    pub fn sweep(&mut self, is_live: impl Fn(*mut ObjHeader) -> bool) -> SweepStats {
        let mut stats = SweepStats::default();
        for cat in &mut self.categories {
            cat.free_slabs.clear();
            for (idx, slab) in cat.slabs.iter_mut().enumerate() {
                sweep_slab(slab, &is_live, &mut stats);
                if slab.free_head != NONE_OFFSET {
                    cat.free_slabs.push(idx);
                }
            }
        }
        stats
    }

    pub fn total_live_objects(&self) -> usize {
        self.categories.iter().flat_map(|c| c.slabs.iter()).map(|s| s.live_count as usize).sum()
    }
}

unsafe fn relink_neighbors(slab: &Slab, prev: i32, next: i32, new_offset: i32) {
    if prev != NONE_OFFSET {
        (*slab.shim_at(prev)).next = new_offset;
    }
    if next != NONE_OFFSET {
        (*slab.shim_at(next)).prev = new_offset;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub objects_freed: usize,
    pub bytes_freed: usize,
}

fn sweep_slab(slab: &mut Slab, is_live: &impl Fn(*mut ObjHeader) -> bool, stats: &mut SweepStats) {
    let capacity = slab.capacity();
    let object_size = slab.object_size;
    let mut pending_free_start: Option<usize> = None;
    let mut offset = 0usize;

    let mut push_shim = |start: usize, len: usize, slab: &mut Slab| unsafe {
        let shim = FreeShim { magic: FREE_SHIM_MAGIC, length: len as u32, prev: NONE_OFFSET, next: slab.free_head };
        if slab.free_head != NONE_OFFSET {
            (*slab.shim_at(slab.free_head)).prev = start as i32;
        }
        std::ptr::write(slab.shim_at(start as i32), shim);
        slab.free_head = start as i32;
    };

    for _ in 0..capacity {
        unsafe {
            let ptr = slab.base.add(offset);
            let magic_word = std::ptr::read(ptr as *const u64);
            let is_free_shim = magic_word == FREE_SHIM_MAGIC;

            if is_free_shim {
                let shim = std::ptr::read(ptr as *const FreeShim);
                match pending_free_start {
                    Some(_) => {}
                    None => pending_free_start = Some(offset),
                }
                let _ = shim;
            } else {
                let header = ptr as *mut ObjHeader;
                if is_live(header) {
                    if let Some(start) = pending_free_start.take() {
                        push_shim(start, offset - start, slab);
                    }
                } else {
                    std::ptr::write_bytes(ptr, 0, object_size);
                    stats.objects_freed += 1;
                    stats.bytes_freed += object_size;
                    slab.live_count = slab.live_count.saturating_sub(1);
                    if pending_free_start.is_none() {
                        pending_free_start = Some(offset);
                    }
                }
            }
        }
        offset += object_size;
    }

    if let Some(start) = pending_free_start {
        unsafe { push_shim(start, SLAB_SIZE - start, slab) };
    }
}

/// Maps a new slab at a randomized, high-entropy, slab-aligned address
/// (spec 4.K: "top-17 bits zeroed for user space... on collision retries").
fn map_high_entropy_slab() -> Result<*mut u8, SlabError> {
    use std::ptr;

    for _ in 0..8 {
        let hint = random_user_space_hint();
        let ptr = unsafe {
            libc::mmap(
                hint as *mut libc::c_void,
                SLAB_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            continue;
        }
        return Ok(ptr as *mut u8);
    }

    // Fall back to letting the kernel choose, rather than fail outright —
    // entropy is defense in depth, not a correctness requirement.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            SLAB_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(SlabError::MapFailed(std::io::Error::last_os_error()));
    }
    Ok(ptr as *mut u8)
}

fn random_user_space_hint() -> usize {
    let mut rng = rand::thread_rng();
    let mut bits = rng.next_u64();
    // Zero the top 17 bits (user-space canonical range) and align to slab size.
    bits &= 0x0000_7fff_ffff_ffff;
    bits &= !(SLAB_SIZE as u64 - 1);
    bits as usize
}

#[allow(dead_code)]
fn layout_for(size: usize) -> Layout {
    Layout::from_size_align(size, std::mem::align_of::<ObjHeader>()).expect("valid layout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_category_uses_preferred_list() {
        assert_eq!(size_category(10), 16);
        assert_eq!(size_category(20), 24);
        assert_eq!(size_category(512), 512);
    }

    #[test]
    fn size_category_grows_by_sqrt2_past_preferred() {
        let next = size_category(600);
        assert!(next > 512);
        assert_eq!(next % 8, 0);
    }

    #[test]
    fn allocate_returns_zeroed_distinct_objects() {
        let mut alloc = SlabAllocator::new();
        let a = alloc.allocate(32).unwrap();
        let b = alloc.allocate(32).unwrap();
        assert_ne!(a, b);
        unsafe {
            assert_ne!(std::ptr::read(a as *const u64), FREE_SHIM_MAGIC);
            assert_ne!(std::ptr::read(b as *const u64), FREE_SHIM_MAGIC);
        }
    }

    #[test]
    fn sweep_recycles_unreachable_objects() {
        let mut alloc = SlabAllocator::new();
        let mut live = Vec::new();
        for _ in 0..50 {
            live.push(alloc.allocate(32).unwrap());
        }
        assert_eq!(alloc.total_live_objects(), 50);

        // Nothing survives.
        let stats = alloc.sweep(|_| false);
        assert_eq!(stats.objects_freed, 50);
        assert_eq!(alloc.total_live_objects(), 0);

        for ptr in live {
            unsafe {
                assert_eq!(std::ptr::read(ptr as *const u64), FREE_SHIM_MAGIC);
            }
        }
    }

    #[test]
    fn sweep_keeps_marked_survivors() {
        let mut alloc = SlabAllocator::new();
        let keep = alloc.allocate(32).unwrap();
        let _discard = alloc.allocate(32).unwrap();

        let stats = alloc.sweep(|p| p == keep);
        assert_eq!(stats.objects_freed, 1);
        assert_eq!(alloc.total_live_objects(), 1);
    }

    #[test]
    fn recycled_slab_reused_on_next_allocation_round() {
        let mut alloc = SlabAllocator::new();
        let mut first_round = Vec::new();
        for _ in 0..20 {
            first_round.push(alloc.allocate(64).unwrap() as usize);
        }
        alloc.sweep(|_| false);

        let mut second_round = Vec::new();
        for _ in 0..20 {
            second_round.push(alloc.allocate(64).unwrap() as usize);
        }

        let first_slabs: std::collections::HashSet<usize> =
            first_round.iter().map(|&p| p & !(SLAB_SIZE - 1)).collect();
        let second_slabs: std::collections::HashSet<usize> =
            second_round.iter().map(|&p| p & !(SLAB_SIZE - 1)).collect();
        assert_eq!(first_slabs, second_slabs);
    }
}

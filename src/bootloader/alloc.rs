// CLASSIFICATION: COMMUNITY
// Filename: alloc.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Heap allocator interface fed by the claim negotiator.
//!
//! The negotiator only ever calls [`HeapAllocator::init_region`]; how the
//! regions are carved up afterwards is the allocator's business.
//! [`LinkedListRegions`] backs every region with a
//! `linked_list_allocator::Heap` and serves requests first-fit across them.

#![allow(unsafe_code)]

use core::alloc::Layout;
use core::ptr::NonNull;

use linked_list_allocator::Heap;
use log::debug;

/// A region handed to the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimedRegion {
    /// First byte.
    pub base: u64,
    /// Length in bytes.
    pub length: u64,
}

/// Receiver of claimed memory.
pub trait HeapAllocator {
    /// Take ownership of `[base, base + length)`; the range is never handed back.
    fn init_region(&mut self, base: u64, length: u64);
}

/// Allocator stand-in that only records what it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTable {
    regions: Vec<ClaimedRegion>,
}

impl RegionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions in registration order.
    pub fn regions(&self) -> &[ClaimedRegion] {
        &self.regions
    }

    /// Sum of region lengths.
    pub fn total(&self) -> u64 {
        self.regions.iter().map(|r| r.length).sum()
    }
}

impl HeapAllocator for RegionTable {
    fn init_region(&mut self, base: u64, length: u64) {
        self.regions.push(ClaimedRegion { base, length });
    }
}

/// Regions smaller than this cannot hold a free-list node and are dropped.
pub const MIN_REGION: usize = 4 * core::mem::size_of::<usize>();

/// First-fit allocator over any number of disjoint regions.
pub struct LinkedListRegions {
    heaps: Vec<Heap>,
}

impl LinkedListRegions {
    /// Allocator with no regions yet.
    ///
    /// # Safety
    ///
    /// Every range later passed to [`HeapAllocator::init_region`] must be
    /// valid, writable memory, unused by anything else, for the lifetime of
    /// this value.
    pub unsafe fn new() -> Self {
        Self { heaps: Vec::new() }
    }

    /// Number of regions in use.
    pub fn region_count(&self) -> usize {
        self.heaps.len()
    }

    /// Free bytes across all regions.
    pub fn free(&self) -> usize {
        self.heaps.iter().map(Heap::free).sum()
    }

    /// Allocate from the first region that can satisfy `layout`.
    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        self.heaps
            .iter_mut()
            .find_map(|heap| heap.allocate_first_fit(layout).ok())
    }

    /// Return an allocation to the region it came from.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Self::allocate`] on this value with the same
    /// `layout`, and must not be freed twice.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let addr = ptr.as_ptr() as usize;
        if let Some(heap) = self
            .heaps
            .iter_mut()
            .find(|heap| heap.bottom() as usize <= addr && addr < heap.top() as usize)
        {
            heap.deallocate(ptr, layout);
        }
    }
}

impl HeapAllocator for LinkedListRegions {
    fn init_region(&mut self, base: u64, length: u64) {
        let (Ok(base), Ok(length)) = (usize::try_from(base), usize::try_from(length)) else {
            debug!("alloc: region {base:#x}+{length:#x} not addressable, ignored");
            return;
        };
        if length < MIN_REGION {
            debug!("alloc: region {base:#x}+{length:#x} too small, ignored");
            return;
        }
        // SAFETY: `new` obliges the caller to hand over only owned, valid memory.
        let heap = unsafe { Heap::new(base as *mut u8, length) };
        self.heaps.push(heap);
    }
}

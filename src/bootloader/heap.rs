// CLASSIFICATION: COMMUNITY
// Filename: heap.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19
//
// ─────────────────────────────────────────────────────────────
// ofboot · Heap claim negotiator
//
// Two walks over the firmware memory map:
//
//  1. sizing   – total usable bytes and the single largest block
//  2. claiming – claim `clamp(total / divisor, min, max)` bytes,
//                preferring the largest block, and hand every
//                claimed range to the allocator
//
// Both walks push every region through the same `RegionFilter`, so
// block numbering cannot drift between them.
// ─────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use log::{debug, info, warn};
use thiserror::Error;

use crate::bootloader::alloc::HeapAllocator;
use crate::firmware::{Firmware, FirmwareError, MemoryKind, MemoryMapSource, MemoryRegion};
use crate::platform::{align_up, FirmwareQuirks, HeapStrategy, ImageLayout, PlatformConfig};

/// `mode` argument for identity maps of claimed heap memory.
pub const HEAP_MAP_MODE: u32 = 0;

/// Why a block contributes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Entirely below the low-memory floor.
    LowMemory,
    /// Intersects the running loader image.
    SelfOverlap,
}

/// A memory map region after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Position among regions that survived the kind and ceiling checks.
    pub index: u32,
    /// Base after clamping and splitting.
    pub base: u64,
    /// Length after clamping and splitting.
    pub length: u64,
    /// Set when the block must not be used.
    pub excluded: Option<Exclusion>,
}

impl Block {
    /// Bytes this block offers to the heap.
    pub fn usable(&self) -> u64 {
        match self.excluded {
            Some(_) => 0,
            None => self.length,
        }
    }
}

/// The filter shared by the sizing and claiming walks.
#[derive(Debug, Clone, Copy)]
pub struct RegionFilter {
    ceiling: u64,
    rmo_top: Option<u64>,
    low_floor: Option<u64>,
    image: ImageLayout,
}

impl RegionFilter {
    /// Filter for `config` protecting `image`.
    pub fn new(config: &PlatformConfig, image: ImageLayout) -> Self {
        Self {
            ceiling: config.address_ceiling,
            rmo_top: config.rmo_top,
            low_floor: config.avoid_low_memory.then_some(config.low_memory_floor),
            image,
        }
    }

    /// Filter one region.
    ///
    /// Returns `None` for regions that are not blocks at all (wrong kind,
    /// above the ceiling); those do not consume a block index.  The
    /// returned block has index 0; use [`RegionFilter::blocks`] for numbering.
    pub fn apply(&self, region: &MemoryRegion) -> Option<Block> {
        if region.kind != MemoryKind::Available || region.base > self.ceiling {
            return None;
        }
        let mut base = region.base;
        let mut length = region.length.min(self.ceiling - base);

        if let Some(top) = self.rmo_top {
            let end = base.saturating_add(length);
            if base < top && end > top {
                length = end - top;
                base = top;
            }
        }

        let mut excluded = None;
        if let Some(floor) = self.low_floor {
            let end = base.saturating_add(length);
            if end <= floor {
                excluded = Some(Exclusion::LowMemory);
            } else if base < floor {
                length = end - floor;
                base = floor;
            }
        }
        if excluded.is_none() && self.image.overlaps(base, length) {
            excluded = Some(Exclusion::SelfOverlap);
        }

        Some(Block {
            index: 0,
            base,
            length,
            excluded,
        })
    }

    /// Filter and number a full enumeration.
    pub fn blocks<'a, I>(&'a self, regions: I) -> impl Iterator<Item = Block> + 'a
    where
        I: IntoIterator<Item = MemoryRegion>,
        I::IntoIter: 'a,
    {
        regions
            .into_iter()
            .filter_map(move |region| self.apply(&region))
            .zip(0u32..)
            .map(|(block, index)| Block { index, ..block })
    }
}

/// Negotiator state for one bring-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimContext {
    /// Blocks seen so far in the current walk.
    pub block_index: u32,
    /// Usable bytes found by the sizing walk.
    pub total_available: u64,
    /// Usable bytes of the largest block.
    pub largest_block_len: u64,
    /// Index of the largest block, if any block had usable bytes.
    pub largest_block_index: Option<u32>,
    /// Bytes still to claim.
    pub remaining_to_claim: u64,
}

/// One successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// Block the claim came from.
    pub block_index: u32,
    /// Claimed base.
    pub base: u64,
    /// Claimed length.
    pub length: u64,
}

/// Outcome of a heap negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReport {
    /// Context as it stood after the sizing walk.
    pub sizing: ClaimContext,
    /// Heap target.
    pub desired_size: u64,
    /// Claims in the order they were made.
    pub claims: Vec<Claim>,
}

impl HeapReport {
    /// Bytes handed to the allocator.
    pub fn claimed_bytes(&self) -> u64 {
        self.claims.iter().map(|c| c.length).sum()
    }

    /// Bytes of the target that could not be found.
    pub fn shortfall(&self) -> u64 {
        self.desired_size.saturating_sub(self.claimed_bytes())
    }
}

/// Fatal heap negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// The firmware refused a claim.
    #[error("firmware rejected claim of {length:#x} bytes at {base:#x}: {source}")]
    FirmwareRejected {
        /// Requested base.
        base: u64,
        /// Requested length.
        length: u64,
        /// Firmware status.
        source: FirmwareError,
    },
    /// The claim succeeded but mapping it failed; the claim was released.
    #[error("could not map claimed heap {length:#x} bytes at {base:#x}: {source}")]
    MapRejected {
        /// Requested base.
        base: u64,
        /// Requested length.
        length: u64,
        /// Firmware status.
        source: FirmwareError,
    },
}

/// Sizing walk.
///
/// An unreadable map counts as zero available memory.
pub fn size_memory<M>(map: &M, filter: &RegionFilter) -> ClaimContext
where
    M: MemoryMapSource + ?Sized,
{
    let mut ctx = ClaimContext::default();
    let regions = match map.regions() {
        Ok(regions) => regions,
        Err(err) => {
            warn!("heap: memory map unreadable while sizing ({err}), assuming none");
            return ctx;
        }
    };
    for block in filter.blocks(regions) {
        let usable = block.usable();
        ctx.total_available = ctx.total_available.saturating_add(usable);
        if usable > ctx.largest_block_len {
            ctx.largest_block_len = usable;
            ctx.largest_block_index = Some(block.index);
        }
        ctx.block_index = block.index + 1;
    }
    ctx
}

/// Claim `[base, base + length)` and identity-map it.
///
/// No mapping is made under the `REAL_MODE` quirk.  A failed mapping
/// releases the claim before reporting.
pub fn claim_map<F>(
    firmware: &F,
    base: u64,
    length: u64,
    quirks: FirmwareQuirks,
) -> Result<(), ClaimError>
where
    F: Firmware + ?Sized,
{
    firmware
        .claim(base, length)
        .map_err(|source| ClaimError::FirmwareRejected {
            base,
            length,
            source,
        })?;
    if quirks.contains(FirmwareQuirks::REAL_MODE) {
        return Ok(());
    }
    if let Err(source) = firmware.map(base, base, length, HEAP_MAP_MODE) {
        if let Err(err) = firmware.release(base, length) {
            warn!("heap: release of unmapped {base:#x}+{length:#x} failed: {err}");
        }
        return Err(ClaimError::MapRejected {
            base,
            length,
            source,
        });
    }
    Ok(())
}

fn claim_amount(ctx: &ClaimContext, block: &Block, largest_pending: bool) -> u64 {
    let len = block.usable();
    let amount = if ctx.largest_block_index == Some(block.index) {
        len.min(ctx.remaining_to_claim)
    } else {
        let reserved = if largest_pending { ctx.largest_block_len } else { 0 };
        if ctx.remaining_to_claim > reserved {
            len.min(ctx.remaining_to_claim - reserved)
        } else {
            0
        }
    };
    amount.min(ctx.remaining_to_claim)
}

/// Negotiate the bring-up heap with the firmware.
///
/// Claims are issued in map order; each one is registered with
/// `allocator` as soon as it succeeds.  Running out of map before the
/// target is met is reported through [`HeapReport::shortfall`], not as an
/// error.
pub fn negotiate_heap<M, F, A>(
    map: &M,
    firmware: &F,
    allocator: &mut A,
    image: ImageLayout,
    config: &PlatformConfig,
) -> Result<HeapReport, ClaimError>
where
    M: MemoryMapSource + ?Sized,
    F: Firmware + ?Sized,
    A: HeapAllocator + ?Sized,
{
    let filter = RegionFilter::new(config, image);
    let sizing = size_memory(map, &filter);
    info!(
        "heap: {} blocks, {:#x} bytes addressable, largest block {:?} of {:#x}",
        sizing.block_index,
        sizing.total_available,
        sizing.largest_block_index,
        sizing.largest_block_len
    );

    let desired_size = config.desired_heap_size(sizing.total_available);
    let mut ctx = ClaimContext {
        block_index: 0,
        remaining_to_claim: desired_size,
        ..sizing
    };
    let mut report = HeapReport {
        sizing,
        desired_size,
        claims: Vec::new(),
    };
    let mut largest_pending = sizing.largest_block_index.is_some();

    let regions = match map.regions() {
        Ok(regions) => regions,
        Err(err) => {
            warn!("heap: memory map unreadable while claiming ({err}), nothing claimed");
            return Ok(report);
        }
    };
    for block in filter.blocks(regions) {
        if ctx.remaining_to_claim == 0 {
            break;
        }
        ctx.block_index = block.index + 1;

        match block.excluded {
            Some(Exclusion::SelfOverlap) => {
                warn!(
                    "heap: block {} at {:#x}+{:#x} overlaps loader image {:#x}..{:#x}, skipped",
                    block.index, block.base, block.length, image.start, image.end
                );
                continue;
            }
            Some(Exclusion::LowMemory) => {
                debug!("heap: block {} below low-memory floor, skipped", block.index);
                continue;
            }
            None => {}
        }

        let length = claim_amount(&ctx, &block, largest_pending);
        if ctx.largest_block_index == Some(block.index) {
            largest_pending = false;
        }
        if length == 0 {
            continue;
        }

        info!("heap: claiming {:#x}+{:#x}", block.base, length);
        claim_map(firmware, block.base, length, config.quirks)?;
        if length < config.small_block_warn {
            warn!("heap: block {} yields only {length:#x} bytes", block.index);
        }
        allocator.init_region(block.base, length);
        ctx.remaining_to_claim -= length;
        report.claims.push(Claim {
            block_index: block.index,
            base: block.base,
            length,
        });
    }

    if ctx.remaining_to_claim > 0 {
        warn!(
            "heap: memory map exhausted, {:#x} of {desired_size:#x} bytes unclaimed",
            ctx.remaining_to_claim
        );
    }
    Ok(report)
}

/// Provide the bring-up heap according to `config.heap_strategy`.
///
/// The static strategy registers a fixed window above the module area and
/// the loader stack without asking the firmware.
pub fn claim_heap<M, F, A>(
    map: &M,
    firmware: &F,
    allocator: &mut A,
    image: ImageLayout,
    config: &PlatformConfig,
) -> Result<HeapReport, ClaimError>
where
    M: MemoryMapSource + ?Sized,
    F: Firmware + ?Sized,
    A: HeapAllocator + ?Sized,
{
    match config.heap_strategy {
        HeapStrategy::Claim => negotiate_heap(map, firmware, allocator, image, config),
        HeapStrategy::Static { length } => {
            let base = align_up(image.modules_end, config.module_align)
                .saturating_add(config.stack_size);
            info!("heap: static window {base:#x}+{length:#x}");
            allocator.init_region(base, length);
            Ok(HeapReport {
                sizing: ClaimContext::default(),
                desired_size: length,
                claims: vec![Claim {
                    block_index: 0,
                    base,
                    length,
                }],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootloader::alloc::{ClaimedRegion, RegionTable};
    use crate::firmware::emulated::{EmulatedFirmware, FirmwareDescription, RangeSpec};

    fn firmware_for(map: &[MemoryRegion]) -> EmulatedFirmware {
        EmulatedFirmware::new(FirmwareDescription {
            memory: map
                .iter()
                .map(|r| RangeSpec {
                    base: r.base,
                    length: r.length,
                })
                .collect(),
            ..FirmwareDescription::default()
        })
    }

    fn far_image() -> ImageLayout {
        ImageLayout::new(0x1000, 0x2000)
    }

    #[test]
    fn huge_regions_saturate_the_sizing_total() {
        let map = [
            MemoryRegion::available(0x1_0000_0000, u64::MAX - 0x1_0000_0000),
            MemoryRegion::available(0x10_0000, u64::MAX - 0x1000_0000),
        ];
        let config = PlatformConfig {
            address_ceiling: u64::MAX,
            rmo_top: None,
            ..PlatformConfig::powerpc()
        };
        let filter = RegionFilter::new(&config, far_image());
        let sizing = size_memory(&map[..], &filter);
        assert_eq!(sizing.total_available, u64::MAX);
        assert_eq!(sizing.largest_block_index, Some(1));

        let fw = firmware_for(&map);
        let mut table = RegionTable::new();
        let report = negotiate_heap(&map[..], &fw, &mut table, far_image(), &config).unwrap();
        assert_eq!(report.desired_size, config.heap_max);
        assert_eq!(
            table.regions(),
            &[ClaimedRegion {
                base: 0x10_0000,
                length: config.heap_max
            }]
        );
    }

    #[test]
    fn rmo_split_keeps_only_the_upper_part() {
        let filter = RegionFilter::new(&PlatformConfig::powerpc(), far_image());
        let block = filter
            .apply(&MemoryRegion::available(0x2000_0000, 0x2000_0000))
            .unwrap();
        assert_eq!((block.base, block.length), (0x3000_0000, 0x1000_0000));
    }

    #[test]
    fn ceiling_skips_and_clamps() {
        let filter = RegionFilter::new(&PlatformConfig::powerpc(), far_image());
        assert!(filter
            .apply(&MemoryRegion::available(0x1_0000_0000, 0x1000))
            .is_none());
        let block = filter
            .apply(&MemoryRegion::available(0xf000_0000, 0x2000_0000))
            .unwrap();
        assert_eq!(block.base + block.length, 0xffff_ffff);
    }

    #[test]
    fn reserved_regions_take_no_index() {
        let filter = RegionFilter::new(&PlatformConfig::powerpc(), far_image());
        let map = vec![
            MemoryRegion::available(0x10_0000, 0x1000),
            MemoryRegion::reserved(0x20_0000, 0x1000),
            MemoryRegion::available(0x30_0000, 0x1000),
        ];
        let indices: Vec<_> = filter.blocks(map).map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn low_memory_is_clipped_when_requested() {
        let config = PlatformConfig {
            avoid_low_memory: true,
            ..PlatformConfig::powerpc()
        };
        let filter = RegionFilter::new(&config, far_image());
        let below = filter.apply(&MemoryRegion::available(0x4000, 0x1_0000)).unwrap();
        assert_eq!(below.excluded, Some(Exclusion::LowMemory));
        let straddle = filter
            .apply(&MemoryRegion::available(0x10_0000, 0x10_0000))
            .unwrap();
        assert_eq!((straddle.base, straddle.length), (0x18_0000, 0x8_0000));
    }

    #[test]
    fn largest_block_serves_the_whole_target() {
        let map = [
            MemoryRegion::available(0x10_0000, 0x10_0000),
            MemoryRegion::available(0x100_0000, 0x800_0000),
        ];
        let fw = firmware_for(&map);
        let mut table = RegionTable::new();
        let report = negotiate_heap(
            &map[..],
            &fw,
            &mut table,
            far_image(),
            &PlatformConfig::powerpc(),
        )
        .unwrap();
        assert_eq!(report.desired_size, 0x408_0000);
        assert_eq!(report.claims.len(), 1);
        assert_eq!(report.claims[0].base, 0x100_0000);
        assert_eq!(table.total(), report.desired_size);
    }

    #[test]
    fn shortfall_is_taken_from_other_blocks() {
        let map = [
            MemoryRegion::available(0x10_0000, 0x40_0000),
            MemoryRegion::available(0x100_0000, 0x80_0000),
            MemoryRegion::available(0x200_0000, 0x40_0000),
        ];
        let config = PlatformConfig {
            heap_divisor: 1,
            ..PlatformConfig::powerpc()
        };
        let fw = firmware_for(&map);
        let mut table = RegionTable::new();
        let report = negotiate_heap(&map[..], &fw, &mut table, far_image(), &config).unwrap();
        assert_eq!(report.claimed_bytes(), 0x100_0000);
        assert_eq!(report.shortfall(), 0);
        assert_eq!(fw.claims().len(), 3);
    }

    #[test]
    fn image_overlap_is_never_claimed() {
        let map = [
            MemoryRegion::available(0x10_0000, 0x100_0000),
            MemoryRegion::available(0x200_0000, 0x10_0000),
        ];
        let image = ImageLayout::new(0x20_0000, 0x30_0000);
        let fw = firmware_for(&map);
        let mut table = RegionTable::new();
        let report =
            negotiate_heap(&map[..], &fw, &mut table, image, &PlatformConfig::powerpc()).unwrap();
        assert!(report
            .claims
            .iter()
            .all(|c| !image.overlaps(c.base, c.length)));
        assert_eq!(report.claims[0].block_index, 1);
    }

    #[test]
    fn refused_claim_is_fatal() {
        let map = [MemoryRegion::available(0x100_0000, 0x100_0000)];
        let fw = EmulatedFirmware::new(FirmwareDescription {
            memory: vec![RangeSpec { base: 0x100_0000, length: 0x100_0000 }],
            refuse_claims: vec![RangeSpec { base: 0x100_0000, length: 0x1000 }],
            ..FirmwareDescription::default()
        });
        let mut table = RegionTable::new();
        let err = negotiate_heap(
            &map[..],
            &fw,
            &mut table,
            far_image(),
            &PlatformConfig::powerpc(),
        )
        .unwrap_err();
        assert!(matches!(err, ClaimError::FirmwareRejected { base: 0x100_0000, .. }));
        assert!(table.regions().is_empty());
    }

    #[test]
    fn failed_map_releases_the_claim() {
        let fw = EmulatedFirmware::new(FirmwareDescription {
            memory: vec![RangeSpec { base: 0x100_0000, length: 0x100_0000 }],
            fail_map: true,
            ..FirmwareDescription::default()
        });
        let err = claim_map(&fw, 0x100_0000, 0x1000, FirmwareQuirks::empty()).unwrap_err();
        assert!(matches!(err, ClaimError::MapRejected { .. }));
        assert!(fw.claims().is_empty());
        assert!(claim_map(&fw, 0x100_0000, 0x1000, FirmwareQuirks::REAL_MODE).is_ok());
        assert!(fw.mappings().is_empty());
    }

    #[test]
    fn static_strategy_skips_the_firmware() {
        let config = PlatformConfig::sparc64();
        let image = ImageLayout {
            start: 0x40_0000,
            end: 0x41_0000,
            modules_end: 0x42_0100,
        };
        let fw = EmulatedFirmware::new(FirmwareDescription::default());
        let empty: [MemoryRegion; 0] = [];
        let mut table = RegionTable::new();
        let report = claim_heap(&empty[..], &fw, &mut table, image, &config).unwrap();
        assert_eq!(report.claims[0].base, 0x42_2000 + config.stack_size);
        assert_eq!(table.total(), 0x20_0000);
        assert!(fw.claims().is_empty());
    }
}

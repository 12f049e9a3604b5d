// CLASSIFICATION: COMMUNITY
// Filename: memory.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Physical memory map as reported by firmware.
//!
//! A [`MemoryMapSource`] is a restartable, finite sequence of
//! [`MemoryRegion`]s.  The heap negotiator walks it twice per bring-up, so
//! every call to [`MemoryMapSource::regions`] starts again from the first
//! region.

use log::warn;
use serde::{Deserialize, Serialize};

use super::{Firmware, FirmwareError, MEMORY_NODE, ROOT_NODE};
use crate::platform::FirmwareQuirks;

/// Largest `available` property decoded, in bytes (128 cells).
pub const AVAILABLE_PROPERTY_MAX: usize = 512;

/// Region classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryKind {
    /// Free RAM the loader may claim.
    Available,
    /// Firmware- or platform-owned.
    Reserved,
    /// Firmware non-volatile storage.
    Nvs,
    /// RAM known to be faulty.
    BadRam,
}

/// One `(base, length, kind)` entry of the memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryRegion {
    /// First byte of the region.
    pub base: u64,
    /// Length in bytes.
    pub length: u64,
    /// Classification.
    pub kind: MemoryKind,
}

impl MemoryRegion {
    /// An `Available` region.
    pub const fn available(base: u64, length: u64) -> Self {
        Self {
            base,
            length,
            kind: MemoryKind::Available,
        }
    }

    /// A `Reserved` region.
    pub const fn reserved(base: u64, length: u64) -> Self {
        Self {
            base,
            length,
            kind: MemoryKind::Reserved,
        }
    }

    /// One past the last byte, saturating at `u64::MAX`.
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }
}

/// Restartable memory map enumerator.
pub trait MemoryMapSource {
    /// Iterator over one full enumeration.
    type Regions<'a>: Iterator<Item = MemoryRegion>
    where
        Self: 'a;

    /// Start a fresh enumeration from the first region.
    fn regions(&self) -> Result<Self::Regions<'_>, FirmwareError>;
}

impl MemoryMapSource for [MemoryRegion] {
    type Regions<'a> = core::iter::Copied<core::slice::Iter<'a, MemoryRegion>>;

    fn regions(&self) -> Result<Self::Regions<'_>, FirmwareError> {
        Ok(self.iter().copied())
    }
}

/// Memory map read from the `/memory` node's `available` property.
///
/// Addresses and sizes are encoded as big-endian 32-bit cells; the
/// number of cells per value comes from the root node's
/// `#address-cells` / `#size-cells` (1 when absent).
pub struct OfMemoryMap<'f, F: Firmware + ?Sized> {
    firmware: &'f F,
    quirks: FirmwareQuirks,
}

impl<'f, F: Firmware + ?Sized> OfMemoryMap<'f, F> {
    /// Wrap a firmware handle.
    pub fn new(firmware: &'f F, quirks: FirmwareQuirks) -> Self {
        Self { firmware, quirks }
    }

    fn cells(&self, root: super::Phandle, name: &'static str) -> Result<usize, FirmwareError> {
        if self.quirks.contains(FirmwareQuirks::BROKEN_ADDRESS_CELLS) {
            return Ok(1);
        }
        let cells = match self.firmware.get_integer_property(root, name) {
            Ok(cells) => cells,
            Err(FirmwareError::PropertyMissing(_)) => 1,
            Err(err) => {
                warn!("memory map: {name} unreadable ({err}), assuming 1");
                1
            }
        };
        match cells {
            1 | 2 => Ok(cells as usize),
            _ => Err(FirmwareError::CallFailed(name)),
        }
    }
}

impl<F: Firmware + ?Sized> MemoryMapSource for OfMemoryMap<'_, F> {
    type Regions<'a> = CellRegions where Self: 'a;

    fn regions(&self) -> Result<Self::Regions<'_>, FirmwareError> {
        let root = self.firmware.find_device(ROOT_NODE)?;
        let memory = self.firmware.find_device(MEMORY_NODE)?;
        let address_cells = self.cells(root, "#address-cells")?;
        let size_cells = self.cells(root, "#size-cells")?;

        let mut raw = [0u8; AVAILABLE_PROPERTY_MAX];
        let actual = self.firmware.get_property(memory, "available", &mut raw)?;
        if actual > raw.len() {
            warn!(
                "memory map: available is {actual} bytes, decoding first {}",
                raw.len()
            );
        }
        Ok(CellRegions {
            raw,
            len: actual.min(AVAILABLE_PROPERTY_MAX),
            pos: 0,
            address_cells,
            size_cells,
        })
    }
}

/// Lazy decoder over a copied `available` property.
#[derive(Debug, Clone)]
pub struct CellRegions {
    raw: [u8; AVAILABLE_PROPERTY_MAX],
    len: usize,
    pos: usize,
    address_cells: usize,
    size_cells: usize,
}

impl CellRegions {
    fn read(&mut self, cells: usize) -> u64 {
        let mut value = 0u64;
        for _ in 0..cells {
            let mut cell = [0u8; 4];
            cell.copy_from_slice(&self.raw[self.pos..self.pos + 4]);
            value = (value << 32) | u64::from(u32::from_be_bytes(cell));
            self.pos += 4;
        }
        value
    }
}

impl Iterator for CellRegions {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<MemoryRegion> {
        let stride = (self.address_cells + self.size_cells) * 4;
        if self.pos + stride > self.len {
            return None;
        }
        let base = self.read(self.address_cells);
        let length = self.read(self.size_cells);
        Some(MemoryRegion::available(base, length))
    }
}

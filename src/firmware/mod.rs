// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19
//
// ─────────────────────────────────────────────────────────────
// ofboot · Open Firmware call interface
//
// Every firmware service the bring-up path touches goes through
// the [`Firmware`] trait.  Calls are synchronous and may block on
// hardware; each one returns a `Result` so callers decide what is
// fatal (a refused claim) and what is advisory (a missing property).
//
// Sub-modules
// -----------
// * `memory`   – memory map regions and the `/memory` decoder
// * `devpath`  – boot path parsing and loader device-name encoding
// * `emulated` – in-process firmware used by tests and `ofboot-sim`
// ─────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use thiserror::Error;

/// Boot path parsing and device-name encoding.
pub mod devpath;
/// In-process firmware tree for tests and the simulator.
#[cfg(not(target_os = "none"))]
pub mod emulated;
/// Memory map regions and sources.
pub mod memory;

pub use memory::{MemoryKind, MemoryMapSource, MemoryRegion, OfMemoryMap};

/// Opaque handle of a device-tree node.
pub type Phandle = u32;

/// Device-tree root node.
pub const ROOT_NODE: &str = "/";
/// Node carrying boot-time selections made by the firmware.
pub const CHOSEN_NODE: &str = "/chosen";
/// Node describing physical memory.
pub const MEMORY_NODE: &str = "/memory";

/// Failures reported by the firmware client interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FirmwareError {
    /// `finddevice` did not resolve the path.
    #[error("no such device {0}")]
    NoSuchDevice(String),
    /// The node exists but does not carry the property.
    #[error("property {0} missing")]
    PropertyMissing(String),
    /// The property value is shorter than the caller requires.
    #[error("property {name} is {len} bytes, too short")]
    PropertyTooShort {
        /// Property name.
        name: String,
        /// Reported property length.
        len: usize,
    },
    /// A firmware method returned a failure status.
    #[error("firmware call {0} failed")]
    CallFailed(&'static str),
    /// `claim` refused the range.
    #[error("claim of {length:#x} bytes at {base:#x} refused")]
    ClaimFailed {
        /// Requested base.
        base: u64,
        /// Requested length.
        length: u64,
    },
    /// The MMU `map` method refused the range.
    #[error("map of {length:#x} bytes at {base:#x} refused")]
    MapFailed {
        /// Requested base.
        base: u64,
        /// Requested length.
        length: u64,
    },
}

/// Synchronous Open Firmware client interface.
///
/// All methods take `&self`: the client interface is a single entry
/// point that firmware serialises internally.  Implementations that keep
/// state (claimed ranges, mappings) use interior mutability.
pub trait Firmware {
    /// Resolve a device path to a node handle.
    fn find_device(&self, path: &str) -> Result<Phandle, FirmwareError>;

    /// Length in bytes of a property value.
    fn get_property_len(&self, node: Phandle, name: &str) -> Result<usize, FirmwareError>;

    /// Copy a property value into `buf`.
    ///
    /// Copies at most `buf.len()` bytes and returns the property's full
    /// length, which may exceed what was copied.
    fn get_property(&self, node: Phandle, name: &str, buf: &mut [u8])
        -> Result<usize, FirmwareError>;

    /// Read a big-endian 32-bit cell property.
    fn get_integer_property(&self, node: Phandle, name: &str) -> Result<u32, FirmwareError> {
        let mut cell = [0u8; 4];
        let len = self.get_property(node, name, &mut cell)?;
        if len < cell.len() {
            return Err(FirmwareError::PropertyTooShort {
                name: name.to_owned(),
                len,
            });
        }
        Ok(u32::from_be_bytes(cell))
    }

    /// Mark `[base, base + length)` as owned by the caller.
    fn claim(&self, base: u64, length: u64) -> Result<(), FirmwareError>;

    /// Return a previously claimed range to the firmware.
    fn release(&self, base: u64, length: u64) -> Result<(), FirmwareError>;

    /// Install a translation through the firmware MMU node.
    fn map(&self, phys: u64, virt: u64, length: u64, mode: u32) -> Result<(), FirmwareError>;

    /// Resolve aliases in a device path to its canonical full path.
    fn canonicalise(&self, path: &str) -> Result<String, FirmwareError>;

    /// Firmware millisecond counter.
    fn milliseconds(&self) -> Result<u32, FirmwareError>;
}

/// Read a string property, dropping trailing NUL bytes.
pub fn read_string_property<F: Firmware + ?Sized>(
    firmware: &F,
    node: Phandle,
    name: &str,
) -> Result<String, FirmwareError> {
    let len = firmware.get_property_len(node, name)?;
    let mut buf = vec![0u8; len];
    let actual = firmware.get_property(node, name, &mut buf)?;
    buf.truncate(actual.min(len));
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::emulated::{EmulatedFirmware, FirmwareDescription};
    use super::*;

    #[test]
    fn string_property_drops_trailing_nul() {
        let fw = EmulatedFirmware::new(FirmwareDescription::default())
            .with_property(CHOSEN_NODE, "bootpath", b"/pci/disk@0\0\0".to_vec());
        let chosen = fw.find_device(CHOSEN_NODE).unwrap();
        assert_eq!(
            read_string_property(&fw, chosen, "bootpath").unwrap(),
            "/pci/disk@0"
        );
    }

    #[test]
    fn integer_property_is_big_endian() {
        let fw = EmulatedFirmware::new(FirmwareDescription::default())
            .with_property(ROOT_NODE, "ibm,secure-boot", vec![0, 0, 0, 2]);
        let root = fw.find_device(ROOT_NODE).unwrap();
        assert_eq!(fw.get_integer_property(root, "ibm,secure-boot").unwrap(), 2);
    }

    #[test]
    fn short_integer_property_is_rejected() {
        let fw = EmulatedFirmware::new(FirmwareDescription::default())
            .with_property(ROOT_NODE, "odd", vec![1, 2]);
        let root = fw.find_device(ROOT_NODE).unwrap();
        assert!(matches!(
            fw.get_integer_property(root, "odd"),
            Err(FirmwareError::PropertyTooShort { len: 2, .. })
        ));
    }
}

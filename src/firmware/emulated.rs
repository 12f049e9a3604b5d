// CLASSIFICATION: COMMUNITY
// Filename: emulated.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! In-process Open Firmware used by the test suite and `ofboot-sim`.
//!
//! The device tree is built from a [`FirmwareDescription`] (usually
//! deserialised from TOML).  Claims are checked against the advertised
//! `available` ranges and against each other, so a negotiator that claims
//! the same byte twice or claims unadvertised memory fails here the same
//! way it would on real firmware.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Instant;

use log::debug;
use serde::Deserialize;

use super::{Firmware, FirmwareError, Phandle, CHOSEN_NODE, MEMORY_NODE, ROOT_NODE};
use crate::bootloader::init::Devices;
use crate::platform::{ConfigError, ImageLayout, PlatformConfig, TimeSource};

/// `[base, base + length)` in a description file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeSpec {
    /// First byte.
    pub base: u64,
    /// Length in bytes.
    pub length: u64,
}

impl RangeSpec {
    fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    fn intersects(&self, base: u64, length: u64) -> bool {
        base < self.end() && base.saturating_add(length) > self.base
    }
}

/// A device node in a description file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceSpec {
    /// Full node path, e.g. `/pci@800/ethernet@1`.
    pub path: String,
    /// `device_type` property.
    pub device_type: Option<String>,
    /// Alias names resolving to this node.
    pub aliases: Vec<String>,
    /// Result of canonicalising this node or one of its aliases.
    pub canonical: Option<String>,
}

/// Firmware contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FirmwareDescription {
    /// Root `#address-cells`; property omitted when `None`.
    pub address_cells: Option<u32>,
    /// Root `#size-cells`; property omitted when `None`.
    pub size_cells: Option<u32>,
    /// `/memory` `available` ranges.
    pub memory: Vec<RangeSpec>,
    /// `/chosen` `bootpath`.
    pub bootpath: Option<String>,
    /// `/chosen` `bootargs`.
    pub bootargs: Option<String>,
    /// Root `ibm,secure-boot`.
    pub secure_boot: Option<u32>,
    /// Additional device nodes.
    pub devices: Vec<DeviceSpec>,
    /// Ranges the firmware refuses to hand out.
    pub refuse_claims: Vec<RangeSpec>,
    /// Make every MMU `map` call fail.
    pub fail_map: bool,
}

/// A complete machine for the simulator: platform, image and firmware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MachineDescription {
    /// Named preset the `platform` table is layered over.
    pub preset: Option<String>,
    /// Platform overrides.
    pub platform: Option<toml::Table>,
    /// Loader image placement.
    pub image: ImageLayout,
    /// Firmware contents.
    pub firmware: FirmwareDescription,
}

impl MachineDescription {
    /// Parse a machine description.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a machine description from disk.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&text)
    }

    /// Resolve the platform: preset first, then the `platform` overrides.
    pub fn platform_config(&self) -> Result<PlatformConfig, ConfigError> {
        let base = match &self.preset {
            Some(name) => PlatformConfig::preset(name)?,
            None => PlatformConfig::default(),
        };
        match &self.platform {
            Some(overrides) => base.with_overrides(overrides),
            None => {
                base.validate()?;
                Ok(base)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Node {
    path: String,
    aliases: Vec<String>,
    canonical: Option<String>,
    props: BTreeMap<String, Vec<u8>>,
}

/// Device tree plus claim/map bookkeeping.
#[derive(Debug)]
pub struct EmulatedFirmware {
    nodes: Vec<Node>,
    available: Vec<RangeSpec>,
    refuse: Vec<RangeSpec>,
    fail_map: bool,
    claims: RefCell<Vec<RangeSpec>>,
    maps: RefCell<Vec<RangeSpec>>,
    started: Instant,
}

fn encode_cells(out: &mut Vec<u8>, value: u64, cells: u32) {
    for i in (0..cells).rev() {
        let cell = if i < 2 { (value >> (32 * i)) as u32 } else { 0 };
        out.extend_from_slice(&cell.to_be_bytes());
    }
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

impl EmulatedFirmware {
    /// Build the tree described by `desc`.
    pub fn new(desc: FirmwareDescription) -> Self {
        let mut fw = Self {
            nodes: Vec::new(),
            available: desc.memory.clone(),
            refuse: desc.refuse_claims.clone(),
            fail_map: desc.fail_map,
            claims: RefCell::new(Vec::new()),
            maps: RefCell::new(Vec::new()),
            started: Instant::now(),
        };
        fw.node_mut(ROOT_NODE);
        fw.node_mut(CHOSEN_NODE);
        fw.node_mut(MEMORY_NODE);

        if let Some(cells) = desc.address_cells {
            fw = fw.with_property(ROOT_NODE, "#address-cells", cells.to_be_bytes().to_vec());
        }
        if let Some(cells) = desc.size_cells {
            fw = fw.with_property(ROOT_NODE, "#size-cells", cells.to_be_bytes().to_vec());
        }
        let mut available = Vec::new();
        for range in &desc.memory {
            encode_cells(&mut available, range.base, desc.address_cells.unwrap_or(1));
            encode_cells(&mut available, range.length, desc.size_cells.unwrap_or(1));
        }
        fw = fw.with_property(MEMORY_NODE, "available", available);

        if let Some(path) = &desc.bootpath {
            fw = fw.with_property(CHOSEN_NODE, "bootpath", nul_terminated(path));
        }
        if let Some(args) = &desc.bootargs {
            fw = fw.with_property(CHOSEN_NODE, "bootargs", nul_terminated(args));
        }
        if let Some(level) = desc.secure_boot {
            fw = fw.with_property(ROOT_NODE, "ibm,secure-boot", level.to_be_bytes().to_vec());
        }
        for dev in desc.devices {
            let node = fw.node_mut(&dev.path);
            node.aliases = dev.aliases;
            node.canonical = dev.canonical;
            if let Some(ty) = &dev.device_type {
                node.props.insert("device_type".into(), nul_terminated(ty));
            }
        }
        fw
    }

    /// Set a raw property, creating the node if needed.
    pub fn with_property(mut self, path: &str, name: &str, value: Vec<u8>) -> Self {
        self.node_mut(path).props.insert(name.to_owned(), value);
        self
    }

    /// Ranges claimed so far, in claim order.
    pub fn claims(&self) -> Vec<(u64, u64)> {
        self.claims.borrow().iter().map(|r| (r.base, r.length)).collect()
    }

    /// Ranges mapped so far, in map order.
    pub fn mappings(&self) -> Vec<(u64, u64)> {
        self.maps.borrow().iter().map(|r| (r.base, r.length)).collect()
    }

    fn node_mut(&mut self, path: &str) -> &mut Node {
        let idx = match self.nodes.iter().position(|n| n.path == path) {
            Some(idx) => idx,
            None => {
                self.nodes.push(Node {
                    path: path.to_owned(),
                    ..Node::default()
                });
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx]
    }

    fn lookup(&self, path: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.path == path || n.aliases.iter().any(|a| a == path))
    }

    fn node(&self, handle: Phandle) -> Result<&Node, FirmwareError> {
        (handle as usize)
            .checked_sub(1)
            .and_then(|idx| self.nodes.get(idx))
            .ok_or(FirmwareError::CallFailed("getprop"))
    }
}

impl Firmware for EmulatedFirmware {
    fn find_device(&self, path: &str) -> Result<Phandle, FirmwareError> {
        self.lookup(path)
            .map(|idx| idx as Phandle + 1)
            .ok_or_else(|| FirmwareError::NoSuchDevice(path.to_owned()))
    }

    fn get_property_len(&self, node: Phandle, name: &str) -> Result<usize, FirmwareError> {
        self.node(node)?
            .props
            .get(name)
            .map(Vec::len)
            .ok_or_else(|| FirmwareError::PropertyMissing(name.to_owned()))
    }

    fn get_property(
        &self,
        node: Phandle,
        name: &str,
        buf: &mut [u8],
    ) -> Result<usize, FirmwareError> {
        let value = self
            .node(node)?
            .props
            .get(name)
            .ok_or_else(|| FirmwareError::PropertyMissing(name.to_owned()))?;
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(value.len())
    }

    fn claim(&self, base: u64, length: u64) -> Result<(), FirmwareError> {
        let refused = FirmwareError::ClaimFailed { base, length };
        let end = base.checked_add(length).ok_or_else(|| refused.clone())?;
        let advertised = self
            .available
            .iter()
            .any(|r| r.base <= base && end <= r.end());
        if length == 0 || !advertised || self.refuse.iter().any(|r| r.intersects(base, length)) {
            return Err(refused);
        }
        let mut claims = self.claims.borrow_mut();
        if claims.iter().any(|r| r.intersects(base, length)) {
            return Err(refused);
        }
        debug!("emulated firmware: claim {base:#x}+{length:#x}");
        claims.push(RangeSpec { base, length });
        Ok(())
    }

    fn release(&self, base: u64, length: u64) -> Result<(), FirmwareError> {
        let mut claims = self.claims.borrow_mut();
        let idx = claims
            .iter()
            .position(|r| r.base == base && r.length == length)
            .ok_or(FirmwareError::CallFailed("release"))?;
        claims.remove(idx);
        Ok(())
    }

    fn map(&self, phys: u64, _virt: u64, length: u64, _mode: u32) -> Result<(), FirmwareError> {
        if self.fail_map {
            return Err(FirmwareError::MapFailed { base: phys, length });
        }
        self.maps.borrow_mut().push(RangeSpec { base: phys, length });
        Ok(())
    }

    fn canonicalise(&self, path: &str) -> Result<String, FirmwareError> {
        let idx = self
            .lookup(path)
            .ok_or_else(|| FirmwareError::NoSuchDevice(path.to_owned()))?;
        let node = &self.nodes[idx];
        Ok(node.canonical.clone().unwrap_or_else(|| node.path.clone()))
    }

    fn milliseconds(&self) -> Result<u32, FirmwareError> {
        Ok(self.started.elapsed().as_millis() as u32)
    }
}

/// Device bring-up step observed by [`RecordingDevices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Early console.
    ConsoleEarly,
    /// Console after the heap exists.
    ConsoleLate,
    /// Disk driver registration.
    DiskInit,
    /// Millisecond clock installed.
    Timer(TimeSource),
    /// Disk driver teardown.
    DiskFini,
    /// Console teardown.
    ConsoleFini,
}

/// [`Devices`] implementation that records the call order.
#[derive(Debug, Default, Clone)]
pub struct RecordingDevices {
    /// Calls in order.
    pub events: Vec<DeviceEvent>,
}

impl Devices for RecordingDevices {
    fn console_init_early(&mut self) {
        self.events.push(DeviceEvent::ConsoleEarly);
    }

    fn console_init_lately(&mut self) {
        self.events.push(DeviceEvent::ConsoleLate);
    }

    fn disk_init(&mut self) {
        self.events.push(DeviceEvent::DiskInit);
    }

    fn timer_init(&mut self, source: TimeSource) {
        self.events.push(DeviceEvent::Timer(source));
    }

    fn disk_fini(&mut self) {
        self.events.push(DeviceEvent::DiskFini);
    }

    fn console_fini(&mut self) {
        self.events.push(DeviceEvent::ConsoleFini);
    }
}

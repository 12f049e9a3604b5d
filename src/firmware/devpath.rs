// CLASSIFICATION: COMMUNITY
// Filename: devpath.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Open Firmware boot path helpers.
//!
//! A firmware boot path looks like `device-path[:arguments]`, e.g.
//! `/pci@80000000/scsi@1/disk@0,0:2,\boot\grub\core.elf`.  For block
//! devices the arguments are `partition[,filename]`; network devices carry
//! interface options such as `speed=auto`.

use super::{read_string_property, Firmware, CHOSEN_NODE};
use crate::platform::FirmwareQuirks;

/// Prefix of loader device names backed by firmware devices.
pub const DEVICE_PREFIX: &str = "ieee1275/";

/// Device part of a boot path (everything before the first `:`).
pub fn devname(path: &str) -> &str {
    path.split_once(':').map_or(path, |(dev, _)| dev)
}

/// Argument part of a boot path, if any.
pub fn devargs(path: &str) -> Option<&str> {
    path.split_once(':').map(|(_, args)| args)
}

/// Alias name used for canonicalisation: the device part of the path.
pub fn alias_devname(path: &str) -> &str {
    devname(path)
}

/// Partition number given as the first boot path argument.
pub fn partition(path: &str) -> Option<u32> {
    let first = devargs(path)?.split(',').next()?;
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    first.parse().ok()
}

/// Boot filename: the last argument that starts with a backslash.
pub fn filename(path: &str) -> Option<&str> {
    devargs(path)?
        .rsplit(',')
        .next()
        .filter(|arg| arg.starts_with('\\'))
}

/// Encode a firmware boot path into the loader's device-name syntax.
///
/// Commas inside the device path are escaped with a backslash; a numeric
/// partition argument becomes a `,N` suffix.
pub fn encode_devname(path: &str, quirks: FirmwareQuirks) -> String {
    let mut encoded = String::with_capacity(DEVICE_PREFIX.len() + path.len() + 8);
    encoded.push_str(DEVICE_PREFIX);
    for c in devname(path).chars() {
        if c == ',' {
            encoded.push('\\');
        }
        encoded.push(c);
    }
    if let Some(mut part) = partition(path) {
        if quirks.contains(FirmwareQuirks::ZERO_BASED_PARTITIONS) {
            part += 1;
        }
        encoded.push(',');
        encoded.push_str(&part.to_string());
    }
    encoded
}

/// Drop trailing `,` and `:` markers from a canonical device name.
///
/// The first character is always kept.
pub fn strip_child_suffix(canonical: &str) -> &str {
    let trimmed = canonical.trim_end_matches(&[',', ':'][..]);
    if trimmed.is_empty() {
        &canonical[..canonical.len().min(1)]
    } else {
        trimmed
    }
}

/// Rewrite firmware `\` separators to loader `/` separators.
pub fn translate_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Raw boot path the firmware recorded in `/chosen`.
pub fn boot_device<F: Firmware + ?Sized>(firmware: &F) -> Option<String> {
    let chosen = firmware.find_device(CHOSEN_NODE).ok()?;
    read_string_property(firmware, chosen, "bootpath")
        .ok()
        .filter(|path| !path.is_empty())
}

/// `device_type` of the node a boot path refers to.
pub fn device_type<F: Firmware + ?Sized>(firmware: &F, path: &str) -> Option<String> {
    let node = firmware.find_device(devname(path)).ok()?;
    read_string_property(firmware, node, "device_type").ok()
}

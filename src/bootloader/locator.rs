// CLASSIFICATION: COMMUNITY
// Filename: locator.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19
//
// ─────────────────────────────────────────────────────────────
// ofboot · Boot locator
//
// Turns the firmware's `/chosen` bootpath into a loader device name
// and a boot directory.
//
//   disk:    /pci/scsi/disk@0,0:2,\boot\grub\core.elf
//            → device ieee1275//pci/scsi/disk@0\,0,2  path /boot/grub
//   network: /pci@800/ethernet@1:speed=auto
//            → canonical name handed to the network hook
// ─────────────────────────────────────────────────────────────

use log::{debug, warn};

use crate::firmware::devpath;
use crate::firmware::Firmware;
use crate::platform::FirmwareQuirks;

/// `device_type` value of network interfaces.
pub const NETWORK_DEVICE_TYPE: &str = "network";

/// Where the loader was started from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootLocation {
    /// Loader device name.
    pub device: Option<String>,
    /// Boot directory in loader path syntax.
    pub path: Option<String>,
}

/// Network configuration hook.
///
/// Receives the canonical interface name and the raw boot path and
/// returns the loader device plus an optional boot directory.
pub trait NetConfig {
    /// Bring the interface up and name it.
    fn configure(&self, canonical: &str, bootpath: &str) -> (String, Option<String>);
}

impl<T> NetConfig for T
where
    T: Fn(&str, &str) -> (String, Option<String>),
{
    fn configure(&self, canonical: &str, bootpath: &str) -> (String, Option<String>) {
        self(canonical, bootpath)
    }
}

/// Directory part of a firmware boot filename, in loader syntax.
///
/// `None` when the filename has no directory separator.
pub fn boot_directory(filename: &str) -> Option<String> {
    let (dir, _) = filename.rsplit_once('\\')?;
    Some(devpath::translate_path(dir))
}

/// Resolve the boot device and directory.
///
/// Returns `None` when the firmware records no boot path, or when a
/// network boot path cannot be canonicalised.
pub fn resolve_boot_location<F>(
    firmware: &F,
    net_config: Option<&dyn NetConfig>,
    quirks: FirmwareQuirks,
) -> Option<BootLocation>
where
    F: Firmware + ?Sized,
{
    let bootpath = devpath::boot_device(firmware)?;
    let mut location = BootLocation::default();

    let device_type = devpath::device_type(firmware, &bootpath);
    if device_type.as_deref() == Some(NETWORK_DEVICE_TYPE) {
        let alias = devpath::alias_devname(&bootpath);
        let canonical = match firmware.canonicalise(alias) {
            Ok(canonical) => canonical,
            Err(err) => {
                warn!("boot locator: cannot canonicalise {alias}: {err}");
                return None;
            }
        };
        let canonical = devpath::strip_child_suffix(&canonical);
        match net_config {
            Some(hook) => {
                let (device, path) = hook.configure(canonical, &bootpath);
                location.device = Some(device);
                location.path = path;
            }
            None => debug!("boot locator: network boot from {canonical}, no network hook"),
        }
    } else {
        location.device = Some(devpath::encode_devname(&bootpath, quirks));
    }

    if let Some(dir) = devpath::filename(&bootpath).and_then(boot_directory) {
        location.path = Some(dir);
    }
    Some(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_drops_leaf_name() {
        assert_eq!(
            boot_directory("\\boot\\grub\\core.elf").as_deref(),
            Some("/boot/grub")
        );
        assert_eq!(boot_directory("\\core.elf").as_deref(), Some(""));
        assert_eq!(boot_directory("core.elf"), None);
    }
}

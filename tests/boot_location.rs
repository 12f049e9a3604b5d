// CLASSIFICATION: COMMUNITY
// Filename: boot_location.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

use std::cell::RefCell;
use std::rc::Rc;

use ofboot::bootloader::locator::{resolve_boot_location, BootLocation, NetConfig};
use ofboot::firmware::emulated::{DeviceSpec, EmulatedFirmware, FirmwareDescription};
use ofboot::platform::FirmwareQuirks;

fn firmware(bootpath: Option<&str>, devices: Vec<DeviceSpec>) -> EmulatedFirmware {
    EmulatedFirmware::new(FirmwareDescription {
        bootpath: bootpath.map(str::to_owned),
        devices,
        ..FirmwareDescription::default()
    })
}

fn device(path: &str, device_type: &str) -> DeviceSpec {
    DeviceSpec {
        path: path.to_owned(),
        device_type: Some(device_type.to_owned()),
        ..DeviceSpec::default()
    }
}

#[test]
fn no_bootpath_means_no_location() {
    let fw = firmware(None, Vec::new());
    assert_eq!(resolve_boot_location(&fw, None, FirmwareQuirks::empty()), None);
}

#[test]
fn disk_bootpath_is_encoded_without_network_hook() {
    let fw = firmware(
        Some("/pci/scsi/disk@0,0"),
        vec![device("/pci/scsi/disk@0,0", "block")],
    );
    let called = Rc::new(RefCell::new(false));
    let seen = Rc::clone(&called);
    let hook = move |_: &str, _: &str| {
        *seen.borrow_mut() = true;
        ("net".to_string(), None::<String>)
    };
    let location = resolve_boot_location(&fw, Some(&hook as &dyn NetConfig), FirmwareQuirks::empty())
        .unwrap();
    assert_eq!(
        location,
        BootLocation {
            device: Some("ieee1275//pci/scsi/disk@0\\,0".to_string()),
            path: None,
        }
    );
    assert!(!*called.borrow());
}

#[test]
fn disk_bootpath_with_partition_and_file() {
    let fw = firmware(
        Some("/pci/scsi/disk@0,0:2,\\ppc\\grub\\core.elf"),
        vec![device("/pci/scsi/disk@0,0", "block")],
    );
    let location = resolve_boot_location(&fw, None, FirmwareQuirks::ZERO_BASED_PARTITIONS).unwrap();
    assert_eq!(location.device.as_deref(), Some("ieee1275//pci/scsi/disk@0\\,0,3"));
    assert_eq!(location.path.as_deref(), Some("/ppc/grub"));
}

#[test]
fn network_bootpath_goes_through_the_hook() {
    let fw = firmware(
        Some("/pci/ethernet:speed=auto"),
        vec![DeviceSpec {
            canonical: Some("/pci@800/ethernet@1:,".to_string()),
            ..device("/pci/ethernet", "network")
        }],
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let hook = move |canonical: &str, bootpath: &str| {
        log.borrow_mut().push((canonical.to_string(), bootpath.to_string()));
        ("tftp".to_string(), Some("/srv/boot".to_string()))
    };
    let location = resolve_boot_location(&fw, Some(&hook as &dyn NetConfig), FirmwareQuirks::empty())
        .unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![(
            "/pci@800/ethernet@1".to_string(),
            "/pci/ethernet:speed=auto".to_string()
        )]
    );
    assert_eq!(location.device.as_deref(), Some("tftp"));
    assert_eq!(location.path.as_deref(), Some("/srv/boot"));
}

#[test]
fn network_without_hook_leaves_device_unset() {
    let fw = firmware(
        Some("/pci/ethernet:speed=auto"),
        vec![device("/pci/ethernet", "network")],
    );
    let location = resolve_boot_location(&fw, None, FirmwareQuirks::empty()).unwrap();
    assert_eq!(location, BootLocation::default());
}

#[test]
fn network_filename_overrides_hook_path() {
    let fw = firmware(
        Some("/pci/ethernet:speed=auto,\\boot\\grub\\core.elf"),
        vec![device("/pci/ethernet", "network")],
    );
    let hook = |_: &str, _: &str| ("tftp".to_string(), Some("/other".to_string()));
    let location = resolve_boot_location(&fw, Some(&hook as &dyn NetConfig), FirmwareQuirks::empty())
        .unwrap();
    assert_eq!(location.path.as_deref(), Some("/boot/grub"));
}

// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v1.1
// Date Modified: 2026-10-19
// Author: Lukas Bower

//! Open Firmware (IEEE1275) platform bring-up for a boot loader.
//!
//! Heap claim negotiation, boot device location, secure boot policy and
//! command-line handling, driven by a [`bootloader::init::Machine`] over any
//! [`firmware::Firmware`] implementation.

/// Bring-up components and the machine orchestrator.
pub mod bootloader;

/// Firmware client interface, memory map and device paths.
pub mod firmware;

/// Per-platform configuration.
pub mod platform;

pub use bootloader::init::{BootError, BringUpReport, Devices, LoaderFlags, Machine};
pub use firmware::{Firmware, FirmwareError};
pub use platform::PlatformConfig;

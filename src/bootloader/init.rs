// CLASSIFICATION: COMMUNITY
// Filename: init.rs v0.5
// Date Modified: 2026-10-19
// Author: Lukas Bower
//
// ─────────────────────────────────────────────────────────────
// ofboot · Machine bring-up and teardown
//
// `Machine::init` runs once, in this order:
//
//  1. early console
//  2. heap (claim negotiation or static window)
//  3. late console
//  4. disk drivers
//  5. firmware `bootargs` → environment
//  6. millisecond timer
//  7. secure boot policy
//
// `Machine::fini` only tears devices down when the caller is about
// to jump into a payload that never returns.
// ─────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use bitflags::bitflags;
use log::{debug, info, warn};
use thiserror::Error;

use crate::bootloader::alloc::HeapAllocator;
use crate::bootloader::args::apply_bootargs;
use crate::bootloader::env::Environment;
use crate::bootloader::heap::{claim_heap, ClaimError, HeapReport};
use crate::bootloader::locator::{resolve_boot_location, BootLocation, NetConfig};
use crate::bootloader::secure_boot::{resolve_secure_boot, SecureBootLevel};
use crate::firmware::{Firmware, OfMemoryMap, CHOSEN_NODE};
use crate::platform::{ConfigError, ImageLayout, PlatformConfig, TimeSource};

/// Bytes of `/chosen` `bootargs` read at bring-up.
pub const BOOTARGS_MAX: usize = 256;

bitflags! {
    /// Flags passed to [`Machine::fini`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LoaderFlags: u32 {
        /// The payload never returns to the loader.
        const NORETURN = 1 << 0;
    }
}

/// Console, disk and timer drivers driven by bring-up.
pub trait Devices {
    /// Console usable before any heap exists.
    fn console_init_early(&mut self);
    /// Full console once the heap is up.
    fn console_init_lately(&mut self);
    /// Register disk drivers.
    fn disk_init(&mut self);
    /// Install the millisecond clock.
    fn timer_init(&mut self, source: TimeSource);
    /// Unregister disk drivers.
    fn disk_fini(&mut self);
    /// Shut the console down.
    fn console_fini(&mut self);
}

/// Fatal bring-up failures.
#[derive(Debug, Error)]
pub enum BootError {
    /// No heap could be set up.
    #[error("heap bring-up failed: {0}")]
    Heap(#[from] ClaimError),
    /// The platform description is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What bring-up did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpReport {
    /// Heap negotiation outcome.
    pub heap: HeapReport,
    /// Environment assignments taken from `bootargs`.
    pub bootargs_applied: usize,
    /// Secure boot level in force.
    pub secure_boot: SecureBootLevel,
    /// Base of the module area.
    pub modbase: u64,
}

/// One machine's firmware, drivers and platform description.
pub struct Machine<F, D> {
    firmware: F,
    devices: D,
    config: PlatformConfig,
    image: ImageLayout,
    modbase: u64,
    net_config: Option<Box<dyn NetConfig>>,
}

impl<F: Firmware, D: Devices> Machine<F, D> {
    /// Validate `config` and compute the module base.
    pub fn new(
        firmware: F,
        devices: D,
        config: PlatformConfig,
        image: ImageLayout,
    ) -> Result<Self, BootError> {
        config.validate()?;
        let modbase = image.module_base(config.module_gap, config.module_align);
        Ok(Self {
            firmware,
            devices,
            config,
            image,
            modbase,
            net_config: None,
        })
    }

    /// Install the network configuration hook used for network boot paths.
    pub fn with_net_config<N: NetConfig + 'static>(mut self, hook: N) -> Self {
        self.net_config = Some(Box::new(hook));
        self
    }

    /// Bring the machine up.
    ///
    /// Claimed heap regions go to `allocator`; `bootargs` assignments and
    /// the secure boot flag go to `env`.
    pub fn init<A, E>(&mut self, allocator: &mut A, env: &mut E) -> Result<BringUpReport, BootError>
    where
        A: HeapAllocator + ?Sized,
        E: Environment + ?Sized,
    {
        self.devices.console_init_early();

        let map = OfMemoryMap::new(&self.firmware, self.config.quirks);
        let heap = claim_heap(&map, &self.firmware, allocator, self.image, &self.config)?;
        info!(
            "bring-up: heap {:#x} of {:#x} bytes in {} regions",
            heap.claimed_bytes(),
            heap.desired_size,
            heap.claims.len()
        );

        self.devices.console_init_lately();
        self.devices.disk_init();

        let bootargs_applied = self.ingest_bootargs(env);

        self.devices.timer_init(self.config.timer);

        let secure_boot = resolve_secure_boot(&self.firmware, env);

        Ok(BringUpReport {
            heap,
            bootargs_applied,
            secure_boot,
            modbase: self.modbase,
        })
    }

    fn ingest_bootargs<E: Environment + ?Sized>(&self, env: &mut E) -> usize {
        let Ok(chosen) = self.firmware.find_device(CHOSEN_NODE) else {
            warn!("bring-up: no {CHOSEN_NODE} node");
            return 0;
        };
        let mut buf = [0u8; BOOTARGS_MAX];
        let actual = match self.firmware.get_property(chosen, "bootargs", &mut buf) {
            Ok(actual) => actual,
            Err(err) => {
                debug!("bring-up: no bootargs ({err})");
                return 0;
            }
        };
        if actual <= 1 {
            return 0;
        }
        let raw = &buf[..actual.min(BOOTARGS_MAX)];
        let raw = match raw.iter().position(|&b| b == 0) {
            Some(nul) => &raw[..nul],
            None => raw,
        };
        apply_bootargs(env, &String::from_utf8_lossy(raw))
    }

    /// Tear devices down before a non-returning payload takes over.
    pub fn fini(&mut self, flags: LoaderFlags) {
        if flags.contains(LoaderFlags::NORETURN) {
            self.devices.disk_fini();
            self.devices.console_fini();
        }
    }

    /// Boot device and directory, using the installed network hook.
    pub fn boot_location(&self) -> Option<BootLocation> {
        resolve_boot_location(&self.firmware, self.net_config.as_deref(), self.config.quirks)
    }

    /// Firmware millisecond counter; 0 when the firmware cannot tell.
    pub fn rtc_get_time_ms(&self) -> u32 {
        self.firmware.milliseconds().unwrap_or_else(|err| {
            debug!("rtc: milliseconds failed ({err})");
            0
        })
    }

    /// Base of the module area.
    pub fn modbase(&self) -> u64 {
        self.modbase
    }

    /// Platform description in use.
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Firmware handle.
    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    /// Device drivers.
    pub fn devices(&self) -> &D {
        &self.devices
    }
}

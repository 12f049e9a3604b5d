// CLASSIFICATION: COMMUNITY
// Filename: secure_boot.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Secure boot policy for firmware that publishes `ibm,secure-boot`.
//! Only enforcement is acted on: it forces appended-signature checking.

use log::{info, warn};

use crate::bootloader::env::Environment;
use crate::firmware::{Firmware, FirmwareError, ROOT_NODE};

/// Root-node property carrying the policy level.
pub const SECURE_BOOT_PROPERTY: &str = "ibm,secure-boot";
/// Environment variable that turns on appended-signature checks.
pub const SIGNATURE_CHECK_VAR: &str = "check_appended_signatures";
/// Value of [`SIGNATURE_CHECK_VAR`] under enforcement.
pub const SIGNATURE_CHECK_FORCED: &str = "forced";

/// Firmware secure boot level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SecureBootLevel(pub u32);

impl SecureBootLevel {
    /// No checking.
    pub const DISABLED: Self = Self(0);
    /// Check and log, never refuse.
    pub const AUDIT: Self = Self(1);
    /// Refuse unsigned payloads.
    pub const ENFORCE: Self = Self(2);
    /// Enforce, plus OS-specific checks.
    pub const ENFORCE_OS: Self = Self(3);

    /// Whether unsigned payloads must be refused.
    pub fn is_enforcing(self) -> bool {
        self >= Self::ENFORCE
    }
}

/// Read the level; anything unreadable counts as disabled.
pub fn read_secure_boot_level<F: Firmware + ?Sized>(firmware: &F) -> SecureBootLevel {
    let level = firmware
        .find_device(ROOT_NODE)
        .and_then(|root| firmware.get_integer_property(root, SECURE_BOOT_PROPERTY));
    match level {
        Ok(level) => SecureBootLevel(level),
        Err(FirmwareError::PropertyMissing(_)) => SecureBootLevel::DISABLED,
        Err(err) => {
            warn!("secure boot: {SECURE_BOOT_PROPERTY} unreadable ({err}), treating as disabled");
            SecureBootLevel::DISABLED
        }
    }
}

/// Resolve the level and force signature checks when it enforces.
pub fn resolve_secure_boot<F, E>(firmware: &F, env: &mut E) -> SecureBootLevel
where
    F: Firmware + ?Sized,
    E: Environment + ?Sized,
{
    let level = read_secure_boot_level(firmware);
    if level.is_enforcing() {
        info!("secure boot: level {} enforced", level.0);
        env.set(SIGNATURE_CHECK_VAR, SIGNATURE_CHECK_FORCED);
    }
    level
}

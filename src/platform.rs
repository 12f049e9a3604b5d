// CLASSIFICATION: COMMUNITY
// Filename: platform.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19
//
// ─────────────────────────────────────────────────────────────
// ofboot · Platform configuration
//
// Everything that differs between firmware platforms (address
// ceiling, heap bounds, RMO boundary, firmware quirks, timer
// source) lives in one `PlatformConfig` resolved once at start-up.
// Presets cover the known platforms; a TOML file can override any
// field.
//
// Example `platform.toml`:
//
//   address_ceiling = 0xffffffff
//   heap_max = 0x4000000
//   avoid_low_memory = true
//   quirks = "REAL_MODE"
//   timer = "tsc"
// ─────────────────────────────────────────────────────────────

#![warn(missing_docs)]

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest addressable byte for a 32-bit loader image.
pub const ADDRESS_CEILING_32: u64 = 0xffff_ffff;
/// Top of the real-mode area an OS loader reserves for itself.
pub const LINUX_RMO_TOP: u64 = 0x3000_0000;
/// Memory below this address is avoided on firmware that dislikes claims there.
pub const LOW_MEMORY_FLOOR: u64 = 0x18_0000;
/// Smallest heap target worth running with.
pub const HEAP_MIN_SIZE: u64 = 2 * 1024 * 1024;
/// Heap ceiling on i386 firmware.
pub const HEAP_MAX_SIZE_I386: u64 = 64 * 1024 * 1024;
/// Heap ceiling elsewhere.
pub const HEAP_MAX_SIZE: u64 = 0x8000_0000;

/// Environment variable naming a platform TOML file.
pub const PLATFORM_FILE_VAR: &str = "OFBOOT_PLATFORM";
/// Environment variable naming a preset (`powerpc`, `i386`, `sparc64`).
pub const PLATFORM_PRESET_VAR: &str = "OFBOOT_PRESET";

bitflags! {
    /// Firmware behaviours that need special handling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FirmwareQuirks: u32 {
        /// Running untranslated; claimed memory needs no MMU mapping.
        const REAL_MODE = 1 << 0;
        /// Firmware numbers partitions from zero.
        const ZERO_BASED_PARTITIONS = 1 << 1;
        /// Root `#address-cells`/`#size-cells` are unreliable; use one cell.
        const BROKEN_ADDRESS_CELLS = 1 << 2;
    }
}

/// How the bring-up heap is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum HeapStrategy {
    /// Negotiate claims against the firmware memory map.
    Claim,
    /// Use a fixed window above the loaded modules and stack.
    Static {
        /// Window size in bytes.
        length: u64,
    },
}

/// Millisecond clock installed during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    /// CPU time-stamp counter.
    Tsc,
    /// Firmware `milliseconds` call.
    FirmwareClock,
}

/// Address range of the running loader image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLayout {
    /// First byte of code.
    pub start: u64,
    /// One past the last byte of data/bss.
    pub end: u64,
    /// One past the last byte of the embedded module area.
    pub modules_end: u64,
}

impl ImageLayout {
    /// Layout with the module area ending at `end`.
    pub const fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            modules_end: end,
        }
    }

    /// Whether `[base, base + length)` intersects the image.
    pub fn overlaps(&self, base: u64, length: u64) -> bool {
        base < self.end && base.saturating_add(length) > self.start
    }

    /// Base of the module area: `end + gap`, aligned up.
    pub fn module_base(&self, gap: u64, align: u64) -> u64 {
        align_up(self.end.saturating_add(gap), align)
    }
}

/// Round `value` up to a power-of-two `align`.
pub const fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    match value.checked_add(align - 1) {
        Some(v) => v & !(align - 1),
        None => value & !(align - 1),
    }
}

/// Errors raised while loading or validating a platform description.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("malformed platform config: {0}")]
    Parse(String),
    /// A field combination makes no sense.
    #[error("invalid platform config: {0}")]
    Invalid(&'static str),
    /// Unknown preset name.
    #[error("unknown platform preset {0}")]
    UnknownPreset(String),
}

/// Platform parameters consumed by bring-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Highest byte address the loader may use.
    pub address_ceiling: u64,
    /// Lower bound of the heap target.
    pub heap_min: u64,
    /// Upper bound of the heap target.
    pub heap_max: u64,
    /// Heap target is `total_available / heap_divisor` before clamping.
    pub heap_divisor: u64,
    /// Regions straddling this boundary keep only the part above it.
    pub rmo_top: Option<u64>,
    /// Skip memory below `low_memory_floor`.
    pub avoid_low_memory: bool,
    /// Floor used when `avoid_low_memory` is set.
    pub low_memory_floor: u64,
    /// Firmware quirks.
    pub quirks: FirmwareQuirks,
    /// Heap acquisition strategy.
    pub heap_strategy: HeapStrategy,
    /// Millisecond clock.
    pub timer: TimeSource,
    /// Gap between image end and module area.
    pub module_gap: u64,
    /// Module area alignment.
    pub module_align: u64,
    /// Stack reserved above the modules on static-heap platforms.
    pub stack_size: u64,
    /// Claimed blocks below this size are reported.
    pub small_block_warn: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::powerpc()
    }
}

impl PlatformConfig {
    /// 32-bit PowerPC under PAPR firmware.
    pub fn powerpc() -> Self {
        Self {
            address_ceiling: ADDRESS_CEILING_32,
            heap_min: HEAP_MIN_SIZE,
            heap_max: HEAP_MAX_SIZE,
            heap_divisor: 2,
            rmo_top: Some(LINUX_RMO_TOP),
            avoid_low_memory: false,
            low_memory_floor: LOW_MEMORY_FLOOR,
            quirks: FirmwareQuirks::empty(),
            heap_strategy: HeapStrategy::Claim,
            timer: TimeSource::FirmwareClock,
            module_gap: 0,
            module_align: 4096,
            stack_size: 0x10_0000,
            small_block_warn: 0x1_0000,
        }
    }

    /// i386 Open Firmware (e.g. OLPC).
    pub fn i386() -> Self {
        Self {
            heap_max: HEAP_MAX_SIZE_I386,
            rmo_top: None,
            timer: TimeSource::Tsc,
            ..Self::powerpc()
        }
    }

    /// SPARC64 OpenBoot: fixed heap above the modules.
    pub fn sparc64() -> Self {
        Self {
            address_ceiling: u64::MAX,
            heap_max: HEAP_MAX_SIZE,
            rmo_top: None,
            heap_strategy: HeapStrategy::Static { length: 0x20_0000 },
            module_align: 8192,
            ..Self::powerpc()
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "powerpc" | "ppc" => Ok(Self::powerpc()),
            "i386" => Ok(Self::i386()),
            "sparc64" | "sparc" => Ok(Self::sparc64()),
            other => Err(ConfigError::UnknownPreset(other.to_owned())),
        }
    }

    /// Reject field combinations the negotiator cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heap_divisor == 0 {
            return Err(ConfigError::Invalid("heap_divisor must be non-zero"));
        }
        if self.heap_min > self.heap_max {
            return Err(ConfigError::Invalid("heap_min exceeds heap_max"));
        }
        if self.module_align != 0 && !self.module_align.is_power_of_two() {
            return Err(ConfigError::Invalid("module_align must be a power of two"));
        }
        if let HeapStrategy::Static { length: 0 } = self.heap_strategy {
            return Err(ConfigError::Invalid("static heap length must be non-zero"));
        }
        Ok(())
    }

    /// Heap target for `total_available` bytes of usable memory.
    pub fn desired_heap_size(&self, total_available: u64) -> u64 {
        let wanted = total_available / self.heap_divisor.max(1);
        wanted.max(self.heap_min).min(self.heap_max)
    }
}

#[cfg(not(target_os = "none"))]
impl PlatformConfig {
    /// Parse and validate a TOML description; unset fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overwrite the fields named in `table`, then validate.
    pub fn with_overrides(mut self, table: &toml::Table) -> Result<Self, ConfigError> {
        fn field<T: serde::de::DeserializeOwned>(
            key: &str,
            value: &toml::Value,
        ) -> Result<T, ConfigError> {
            value
                .clone()
                .try_into()
                .map_err(|e| ConfigError::Parse(format!("{key}: {e}")))
        }

        for (key, value) in table {
            match key.as_str() {
                "address_ceiling" => self.address_ceiling = field(key, value)?,
                "heap_min" => self.heap_min = field(key, value)?,
                "heap_max" => self.heap_max = field(key, value)?,
                "heap_divisor" => self.heap_divisor = field(key, value)?,
                "rmo_top" => self.rmo_top = Some(field(key, value)?),
                "avoid_low_memory" => self.avoid_low_memory = field(key, value)?,
                "low_memory_floor" => self.low_memory_floor = field(key, value)?,
                "quirks" => self.quirks = field(key, value)?,
                "heap_strategy" => self.heap_strategy = field(key, value)?,
                "timer" => self.timer = field(key, value)?,
                "module_gap" => self.module_gap = field(key, value)?,
                "module_align" => self.module_align = field(key, value)?,
                "stack_size" => self.stack_size = field(key, value)?,
                "small_block_warn" => self.small_block_warn = field(key, value)?,
                other => return Err(ConfigError::Parse(format!("unknown field {other}"))),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Load a TOML description from disk.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolve from `OFBOOT_PLATFORM` (file) or `OFBOOT_PRESET` (name),
    /// falling back to the PowerPC preset.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(PLATFORM_FILE_VAR) {
            return Self::load(path);
        }
        match std::env::var(PLATFORM_PRESET_VAR) {
            Ok(name) => Self::preset(&name),
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_size_is_half_clamped() {
        let cfg = PlatformConfig::powerpc();
        assert_eq!(cfg.desired_heap_size(0), HEAP_MIN_SIZE);
        assert_eq!(cfg.desired_heap_size(0x2000_0000), 0x1000_0000);
        assert_eq!(cfg.desired_heap_size(u64::MAX), HEAP_MAX_SIZE);
        assert_eq!(PlatformConfig::i386().desired_heap_size(0x4000_0000), HEAP_MAX_SIZE_I386);
    }

    #[test]
    fn divisor_is_configurable() {
        let cfg = PlatformConfig {
            heap_divisor: 4,
            ..PlatformConfig::powerpc()
        };
        assert_eq!(cfg.desired_heap_size(0x4000_0000), 0x1000_0000);
    }

    #[test]
    fn validation_rejects_inverted_bounds() {
        let cfg = PlatformConfig {
            heap_min: 2,
            heap_max: 1,
            ..PlatformConfig::powerpc()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn toml_overrides_preset_fields() {
        let cfg = PlatformConfig::from_toml_str(
            "heap_max = 0x4000000\navoid_low_memory = true\nquirks = \"REAL_MODE | ZERO_BASED_PARTITIONS\"\ntimer = \"tsc\"\n",
        )
        .unwrap();
        assert_eq!(cfg.heap_max, 0x400_0000);
        assert!(cfg.avoid_low_memory);
        assert!(cfg.quirks.contains(FirmwareQuirks::REAL_MODE));
        assert!(cfg.quirks.contains(FirmwareQuirks::ZERO_BASED_PARTITIONS));
        assert_eq!(cfg.timer, TimeSource::Tsc);
        assert_eq!(cfg.rmo_top, Some(LINUX_RMO_TOP));
    }

    #[test]
    fn overrides_keep_unnamed_preset_fields() {
        let table: toml::Table = toml::from_str("heap_min = 0x100000\n").unwrap();
        let cfg = PlatformConfig::sparc64().with_overrides(&table).unwrap();
        assert_eq!(cfg.heap_min, 0x10_0000);
        assert_eq!(cfg.address_ceiling, u64::MAX);

        let bad: toml::Table = toml::from_str("heap_minimum = 1\n").unwrap();
        assert!(PlatformConfig::i386().with_overrides(&bad).is_err());
    }

    #[test]
    fn static_strategy_parses() {
        let cfg = PlatformConfig::from_toml_str(
            "[heap_strategy]\nkind = \"static\"\nlength = 0x200000\n",
        )
        .unwrap();
        assert_eq!(cfg.heap_strategy, HeapStrategy::Static { length: 0x20_0000 });
    }

    #[test]
    fn module_base_is_aligned() {
        let image = ImageLayout::new(0x20_0000, 0x21_0123);
        assert_eq!(image.module_base(0, 4096), 0x21_1000);
        assert_eq!(image.module_base(0x1000, 4096), 0x21_2000);
    }

    #[test]
    fn overlap_is_half_open() {
        let image = ImageLayout::new(0x1000, 0x2000);
        assert!(image.overlaps(0x1fff, 1));
        assert!(!image.overlaps(0x2000, 0x1000));
        assert!(!image.overlaps(0, 0x1000));
    }
}

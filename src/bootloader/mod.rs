// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.3
// Date Modified: 2026-10-19
// Author: Lukas Bower
//
// ─────────────────────────────────────────────────────────────
// ofboot · Bootloader platform bring-up (root module)
//
// Everything the loader does under Open Firmware before its own
// command loop starts.
//
// Sub-modules
// -----------
// * `alloc`       – allocator interface fed with claimed memory
// * `heap`        – two-pass heap claim negotiation
// * `locator`     – boot device and directory from `/chosen`
// * `secure_boot` – `ibm,secure-boot` policy
// * `args`        – firmware `bootargs` → environment
// * `cmdline`     – kernel/module command-line serialization
// * `env`         – environment store interface
// * `init`        – `Machine` bring-up and teardown
// ─────────────────────────────────────────────────────────────

/// Allocator interface and adapters.
pub mod alloc;
/// Firmware `bootargs` ingestion.
pub mod args;
/// Command-line serialization and verification.
pub mod cmdline;
/// Environment store.
pub mod env;
/// Heap claim negotiation.
pub mod heap;
/// Machine bring-up entry point.
///
/// See [`init::Machine::init`].
pub mod init;
/// Boot device and directory resolution.
pub mod locator;
/// Secure boot policy.
pub mod secure_boot;

//! shrinkfs-core: Core library for shrinking logical volumes to an
//! fstab-declared size.
//!
//! A device opts in by carrying `x-systemd.shrinkfs=<size>` in the options
//! column of its `/etc/fstab` entry. When the volume is larger than that and
//! not mounted, it is checked and reduced with `lvreduce --resizefs`.
//!
//! # Modules
//!
//! - [`fstab`]: Fstab and mount table parsing
//! - [`tag`]: Shrink tag extraction and decoding
//! - [`size`]: Unit-suffixed size conversion
//! - [`resolve`]: `UUID=`/`LABEL=` specifier resolution
//! - [`inspect`]: Device size, type and mount-state queries
//! - [`mount`]: Scoped read-only mounts for usage measurement
//! - [`shrink`]: The shrink state machine
//! - [`executor`]: External command execution
//! - [`config`]: Run configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use shrinkfs_core::{ShrinkConfig, ShrinkOutcome};
//!
//! let config = ShrinkConfig::new().with_dry_run(true);
//! match shrinkfs_core::run(&config, "/dev/mapper/vg0-home").unwrap() {
//!     Some(ShrinkOutcome::Planned { plan, .. }) => {
//!         for command in plan {
//!             println!("{}", command);
//!         }
//!     }
//!     Some(other) => println!("{:?}", other),
//!     None => println!("not in fstab"),
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod fstab;
pub mod inspect;
pub mod mount;
pub mod resolve;
pub mod shrink;
pub mod size;
pub mod tag;

// Re-export commonly used types
pub use config::ShrinkConfig;
pub use error::{Error, Result};
pub use executor::{CommandOutput, CommandRunner, ExecutionContext, PrivilegeEscalation};
pub use fstab::FstabEntry;
pub use inspect::{SystemInspector, VolumeInspector};
pub use shrink::{ShrinkDecision, ShrinkOrchestrator, ShrinkOutcome, SkipReason};
pub use tag::{SHRINK_TAG, ShrinkTag};

/// Shrinks the device whose fstab device column equals `device_name`.
///
/// Returns `Ok(None)` when no fstab entry matches. Only the first matching
/// entry is processed.
pub fn run(config: &ShrinkConfig, device_name: &str) -> Result<Option<ShrinkOutcome>> {
    let entries = fstab::read_fstab(config.fstab_path())?;
    let Some(entry) = fstab::find_entry(&entries, device_name) else {
        return Ok(None);
    };

    let ctx = ExecutionContext::with_escalation(config.escalation);
    let inspector = SystemInspector::new(&ctx).with_mounts_path(&config.mounts_path);
    let orchestrator = ShrinkOrchestrator::new(&ctx, &inspector, config);

    orchestrator.process(entry).map(Some)
}

//! Shrink orchestration.
//!
//! [`ShrinkOrchestrator::process`] takes one fstab entry through
//! `Idle -> Evaluating -> {Skipped | Guarded | Shrinking -> Done | Failed}`.
//! Nothing is executed until every guard has passed, and the resize sequence
//! stops at the first failing step.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ShrinkConfig;
use crate::error::{Error, Result};
use crate::executor::CommandRunner;
use crate::fstab::FstabEntry;
use crate::inspect::VolumeInspector;
use crate::resolve::DeviceResolver;
use crate::size::format_bytes;
use crate::tag::{self, SHRINK_TAG, ShrinkTag};

/// Filesystems that `lvreduce --resizefs` can shrink in place.
pub const SHRINKABLE_FILESYSTEMS: [&str; 3] = ["ext2", "ext3", "ext4"];

/// What the size comparison asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkDecision {
    ShrinkRequired(u64),
    /// Current size is at or below the target.
    AlreadySmaller,
    NoTagPresent,
}

/// Compares the current size against the tag's target.
///
/// Equal sizes need no action and count as already smaller.
pub fn decide(current_bytes: u64, tag: Option<&ShrinkTag>) -> ShrinkDecision {
    match tag {
        None => ShrinkDecision::NoTagPresent,
        Some(tag) if current_bytes > tag.target_bytes => {
            ShrinkDecision::ShrinkRequired(tag.target_bytes)
        }
        Some(_) => ShrinkDecision::AlreadySmaller,
    }
}

/// Why an entry was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoTag,
    AlreadySmaller,
}

/// Successful end state of processing one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShrinkOutcome {
    Skipped(SkipReason),
    /// Dry run: every guard passed and this plan would have run.
    Planned {
        device: PathBuf,
        plan: Vec<PlannedCommand>,
    },
    Done {
        device: PathBuf,
        target: ShrinkTag,
    },
}

/// One step of the resize sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkStep {
    /// Forced consistency check before resizing.
    CheckFilesystem,
    /// Filesystem resize and logical volume reduce in one lvm call.
    ReduceVolume,
}

impl fmt::Display for ShrinkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShrinkStep::CheckFilesystem => f.write_str("e2fsck"),
            ShrinkStep::ReduceVolume => f.write_str("lvreduce"),
        }
    }
}

/// A command the shrink sequence will run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    pub step: ShrinkStep,
    pub program: &'static str,
    pub args: Vec<String>,
}

impl fmt::Display for PlannedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// Builds the ordered resize sequence.
///
/// `device` is the filesystem checked by e2fsck; `volume` is the lvm name of
/// the same block device handed to lvreduce.
pub fn shrink_plan(device: &Path, volume: &Path, tag: &ShrinkTag) -> Vec<PlannedCommand> {
    let device = device.display().to_string();
    vec![
        PlannedCommand {
            step: ShrinkStep::CheckFilesystem,
            program: "e2fsck",
            args: vec!["-f".to_string(), "-p".to_string(), device],
        },
        PlannedCommand {
            step: ShrinkStep::ReduceVolume,
            program: "lvreduce",
            args: vec![
                "--resizefs".to_string(),
                "--yes".to_string(),
                "-L".to_string(),
                tag.lvm_size(),
                volume.display().to_string(),
            ],
        },
    ]
}

enum ShrinkState<'s> {
    Evaluating,
    Skipped(SkipReason),
    Guarded(&'s str),
    Shrinking,
    Done,
    Failed(ShrinkStep),
}

impl fmt::Display for ShrinkState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShrinkState::Evaluating => f.write_str("evaluating"),
            ShrinkState::Skipped(reason) => write!(f, "skipped ({:?})", reason),
            ShrinkState::Guarded(reason) => write!(f, "guarded ({})", reason),
            ShrinkState::Shrinking => f.write_str("shrinking"),
            ShrinkState::Done => f.write_str("done"),
            ShrinkState::Failed(step) => write!(f, "failed at {}", step),
        }
    }
}

/// Drives one fstab entry to a shrink outcome.
pub struct ShrinkOrchestrator<'a> {
    runner: &'a dyn CommandRunner,
    inspector: &'a dyn VolumeInspector,
    resolver: DeviceResolver,
    require_tag: bool,
    verify_usage: bool,
    dry_run: bool,
}

impl<'a> ShrinkOrchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        inspector: &'a dyn VolumeInspector,
        config: &ShrinkConfig,
    ) -> Self {
        Self {
            runner,
            inspector,
            resolver: DeviceResolver::new(&config.dev_disk_dir),
            require_tag: config.require_tag,
            verify_usage: config.verify_usage,
            dry_run: config.dry_run,
        }
    }

    fn transition(&self, device: &str, state: ShrinkState<'_>) {
        debug!(device, state = %state, "shrink state");
    }

    /// Processes an fstab entry, shrinking its device if it is larger than
    /// the declared target.
    pub fn process(&self, entry: &FstabEntry) -> Result<ShrinkOutcome> {
        let spec = entry.fs_spec.as_str();
        self.transition(spec, ShrinkState::Evaluating);

        let Some(raw_value) = entry.shrink_tag_value() else {
            if self.require_tag {
                return Err(Error::TagNotFound {
                    device: spec.to_string(),
                    tag: SHRINK_TAG.to_string(),
                });
            }
            self.transition(spec, ShrinkState::Skipped(SkipReason::NoTag));
            return Ok(ShrinkOutcome::Skipped(SkipReason::NoTag));
        };

        let tag = tag::decode(raw_value)?;
        let device = self.resolver.resolve(spec)?;
        let current = self.inspector.current_size_bytes(&device)?;

        match decide(current, Some(&tag)) {
            ShrinkDecision::ShrinkRequired(target_bytes) => {
                info!(
                    device = spec,
                    current = %format_bytes(current),
                    target = %tag,
                    target_bytes,
                    "volume exceeds its shrink target"
                );
            }
            ShrinkDecision::AlreadySmaller => {
                info!(
                    device = spec,
                    current = %format_bytes(current),
                    target = %tag,
                    "volume is already smaller than the expected size"
                );
                self.transition(spec, ShrinkState::Skipped(SkipReason::AlreadySmaller));
                return Ok(ShrinkOutcome::Skipped(SkipReason::AlreadySmaller));
            }
            ShrinkDecision::NoTagPresent => {
                self.transition(spec, ShrinkState::Skipped(SkipReason::NoTag));
                return Ok(ShrinkOutcome::Skipped(SkipReason::NoTag));
            }
        }

        self.check_preconditions(entry, &device, &tag)?;

        let volume = self.inspector.volume_path(&device)?;
        let plan = shrink_plan(&device, &volume, &tag);
        if self.dry_run {
            for command in &plan {
                info!(device = spec, command = %command, "dry run");
            }
            return Ok(ShrinkOutcome::Planned { device, plan });
        }

        self.transition(spec, ShrinkState::Shrinking);
        self.execute(spec, &device, &plan)?;
        self.transition(spec, ShrinkState::Done);

        Ok(ShrinkOutcome::Done {
            device,
            target: tag,
        })
    }

    fn guarded(&self, spec: &str, reason: String) -> Error {
        self.transition(spec, ShrinkState::Guarded(&reason));
        Error::PreconditionFailed {
            device: spec.to_string(),
            reason,
        }
    }

    fn check_preconditions(&self, entry: &FstabEntry, device: &Path, tag: &ShrinkTag) -> Result<()> {
        let spec = entry.fs_spec.as_str();

        if !SHRINKABLE_FILESYSTEMS.contains(&entry.vfs_type.as_str()) {
            return Err(self.guarded(
                spec,
                format!("filesystem type {} cannot be shrunk", entry.vfs_type),
            ));
        }

        if !self.inspector.is_logical_volume(device)? {
            return Err(self.guarded(
                spec,
                format!("{} is not a logical volume", device.display()),
            ));
        }

        self.check_not_mounted(spec, device)?;

        if self.verify_usage {
            let used = self.inspector.used_bytes(device)?;
            if used > tag.target_bytes {
                return Err(self.guarded(
                    spec,
                    format!(
                        "filesystem uses {}, more than the target {}",
                        format_bytes(used),
                        tag
                    ),
                ));
            }
            // The measurement mounted the device; make sure it is gone again.
            self.check_not_mounted(spec, device)?;
        }

        Ok(())
    }

    fn check_not_mounted(&self, spec: &str, device: &Path) -> Result<()> {
        if self.inspector.is_mounted(device)? {
            return Err(self.guarded(spec, "device is mounted".to_string()));
        }
        Ok(())
    }

    fn execute(&self, spec: &str, device: &Path, plan: &[PlannedCommand]) -> Result<()> {
        for command in plan {
            let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
            let output = self.runner.run(command.program, &args)?;

            if output.authentication_cancelled() {
                self.transition(spec, ShrinkState::Failed(command.step));
                return Err(Error::AuthenticationCancelled);
            }
            if !output.success() {
                self.transition(spec, ShrinkState::Failed(command.step));
                return Err(Error::ShrinkFailed {
                    device: device.display().to_string(),
                    step: command.step.to_string(),
                    code: output.exit_code(),
                    stderr: output.stderr.trim().to_string(),
                });
            }
        }
        Ok(())
    }
}

//! shrinkfs CLI - shrinks an unmounted logical volume to the size declared
//! with `x-systemd.shrinkfs` in its fstab entry.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use shrinkfs_core::fstab::{self, FSTAB_PATH, MOUNTS_PATH};
use shrinkfs_core::resolve::DEV_DISK_DIR;
use shrinkfs_core::{PrivilegeEscalation, SHRINK_TAG, ShrinkConfig, ShrinkOutcome, SkipReason};
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

/// Shrinks an unmounted partition to the size defined with option
/// x-systemd.shrinkfs in the /etc/fstab entry of the device.
#[derive(Parser)]
#[command(name = "shrinkfs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Name of the device as found in the first column of the fstab
    #[arg(required_unless_present = "list")]
    device_name: Option<String>,

    /// Fstab file to read
    #[arg(long, default_value = FSTAB_PATH)]
    fstab: PathBuf,

    /// Live mount table used to detect mounted devices
    #[arg(long, default_value = MOUNTS_PATH)]
    mounts: PathBuf,

    /// Directory holding the by-uuid/by-label symlinks
    #[arg(long, default_value = DEV_DISK_DIR)]
    dev_disk: PathBuf,

    /// Fail if the matched entry has no shrink tag
    #[arg(long)]
    require_tag: bool,

    /// Mount read-only first and refuse to shrink below the used space
    #[arg(long)]
    verify_usage: bool,

    /// Print the commands that would run without running them
    #[arg(long)]
    dry_run: bool,

    /// Run privileged commands through sudo or pkexec
    #[arg(long, value_enum, default_value_t = Escalation::None)]
    escalate: Escalation,

    /// List fstab entries that carry a shrink tag and exit
    #[arg(long)]
    list: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Escalation {
    None,
    Sudo,
    Pkexec,
}

impl From<Escalation> for PrivilegeEscalation {
    fn from(value: Escalation) -> Self {
        match value {
            Escalation::None => PrivilegeEscalation::None,
            Escalation::Sudo => PrivilegeEscalation::Sudo,
            Escalation::Pkexec => PrivilegeEscalation::Pkexec,
        }
    }
}

impl Cli {
    fn config(&self) -> ShrinkConfig {
        ShrinkConfig::new()
            .with_fstab_path(&self.fstab)
            .with_mounts_path(&self.mounts)
            .with_dev_disk_dir(&self.dev_disk)
            .with_require_tag(self.require_tag)
            .with_verify_usage(self.verify_usage)
            .with_dry_run(self.dry_run)
            .with_escalation(self.escalate.into())
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }
}

fn list_candidates(config: &ShrinkConfig) -> shrinkfs_core::Result<()> {
    let entries = fstab::read_fstab(config.fstab_path())?;
    for entry in fstab::shrink_candidates(&entries) {
        println!("{}", entry.to_fstab_line());
    }
    Ok(())
}

fn shrink(config: &ShrinkConfig, device_name: &str) -> shrinkfs_core::Result<()> {
    match shrinkfs_core::run(config, device_name)? {
        None => println!("device {} not found", device_name),
        Some(ShrinkOutcome::Skipped(SkipReason::NoTag)) => {
            println!("device {} has no {} option", device_name, SHRINK_TAG)
        }
        Some(ShrinkOutcome::Skipped(SkipReason::AlreadySmaller)) => println!(
            "volume {} is already smaller than the expected size",
            device_name
        ),
        Some(ShrinkOutcome::Planned { plan, .. }) => {
            for command in plan {
                println!("{}", command);
            }
        }
        Some(ShrinkOutcome::Done { device, target }) => {
            println!("shrunk {} to {}", device.display(), target)
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config();

    if cli.list {
        return match list_candidates(&config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let device_name = cli.device_name.as_deref().unwrap_or_default();
    if device_name.is_empty() {
        eprintln!("Missing device name argument");
        return ExitCode::FAILURE;
    }

    if !nix::unistd::geteuid().is_root() && config.escalation == PrivilegeEscalation::None {
        warn!("not running as root; resize commands are likely to fail (see --escalate)");
    }

    match shrink(&config, device_name) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

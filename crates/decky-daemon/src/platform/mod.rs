//! Desktop integration.
//!
//! Everything the daemon needs from the desktop session (lock state,
//! launching applications, media and volume keys) goes through the
//! [`Platform`] trait so unsupported sessions degrade to no-ops.

mod bus;
mod generic;
mod kde;

pub use bus::DesktopBus;
pub use generic::GenericPlatform;
pub use kde::KdePlatform;

use std::fmt;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Media transport command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    PlayPause,
    Next,
    Previous,
    Stop,
}

impl MediaCommand {
    /// Config spelling of the command.
    pub fn name(&self) -> &'static str {
        match self {
            MediaCommand::PlayPause => "play_pause",
            MediaCommand::Next => "next",
            MediaCommand::Previous => "previous",
            MediaCommand::Stop => "stop",
        }
    }
}

impl FromStr for MediaCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "play_pause" | "playpause" | "toggle" => Ok(MediaCommand::PlayPause),
            "next" => Ok(MediaCommand::Next),
            "previous" | "prev" => Ok(MediaCommand::Previous),
            "stop" => Ok(MediaCommand::Stop),
            _ => Err(format!("unknown media command: {}", s)),
        }
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default volume step in percent.
pub const DEFAULT_VOLUME_STEP: u8 = 5;

/// Volume change on the default output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeCommand {
    Up(u8),
    Down(u8),
    ToggleMute,
    Set(u8),
}

impl VolumeCommand {
    /// Builds a command from an action name and optional amount.
    pub fn parse(action: &str, amount: Option<i64>) -> Result<Self, String> {
        let amount = amount.map(|a| a.clamp(0, 150) as u8);
        match action.to_lowercase().as_str() {
            "up" | "increase" => Ok(VolumeCommand::Up(amount.unwrap_or(DEFAULT_VOLUME_STEP))),
            "down" | "decrease" => Ok(VolumeCommand::Down(amount.unwrap_or(DEFAULT_VOLUME_STEP))),
            "mute" => Ok(VolumeCommand::ToggleMute),
            "set" => amount
                .map(VolumeCommand::Set)
                .ok_or_else(|| "volume set requires 'amount'".to_string()),
            _ => Err(format!("unknown volume action: {}", action)),
        }
    }

    /// Arguments for `pactl`.
    pub fn pactl_args(&self) -> Vec<String> {
        let sink = "@DEFAULT_SINK@".to_string();
        match self {
            VolumeCommand::Up(n) => vec!["set-sink-volume".into(), sink, format!("+{}%", n)],
            VolumeCommand::Down(n) => vec!["set-sink-volume".into(), sink, format!("-{}%", n)],
            VolumeCommand::ToggleMute => vec!["set-sink-mute".into(), sink, "toggle".into()],
            VolumeCommand::Set(n) => vec!["set-sink-volume".into(), sink, format!("{}%", n)],
        }
    }
}

/// Desktop session capabilities.
pub trait Platform: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the session is locked. Unknown counts as unlocked.
    fn is_screen_locked(&self) -> bool;

    /// Launches a desktop application by id or command name.
    fn launch_application(&self, app: &str) -> bool;

    /// Sends a media transport command to the active player.
    fn media_command(&self, command: MediaCommand) -> bool;

    /// Changes output volume.
    fn volume_command(&self, command: VolumeCommand) -> bool;
}

/// Platform for sessions nothing else recognizes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlatform;

impl Platform for NullPlatform {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_screen_locked(&self) -> bool {
        false
    }

    fn launch_application(&self, _app: &str) -> bool {
        false
    }

    fn media_command(&self, _command: MediaCommand) -> bool {
        false
    }

    fn volume_command(&self, _command: VolumeCommand) -> bool {
        false
    }
}

/// Picks the platform matching the running session.
pub fn detect_platform() -> Arc<dyn Platform> {
    let bus = DesktopBus::new();
    let platform: Arc<dyn Platform> = if KdePlatform::detect(&bus) {
        Arc::new(KdePlatform::new(bus))
    } else if GenericPlatform::detect() {
        Arc::new(GenericPlatform::new(bus))
    } else {
        Arc::new(NullPlatform)
    };
    info!("Using desktop platform: {}", platform.name());
    platform
}

/// Starts `program` with stdio detached. The child is reaped on a
/// background thread.
pub(crate) fn spawn_detached(program: &str, args: &[&str]) -> bool {
    let spawned = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(mut child) => {
            thread::spawn(move || {
                let _ = child.wait();
            });
            true
        }
        Err(e) => {
            debug!("Cannot start {}: {}", program, e);
            false
        }
    }
}

/// Runs a `pactl` volume change and waits for it to finish.
pub(crate) fn pactl(command: VolumeCommand) -> bool {
    let output = Command::new("pactl")
        .args(command.pactl_args())
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            debug!(
                "pactl failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            debug!("Cannot run pactl: {}", e);
            false
        }
    }
}

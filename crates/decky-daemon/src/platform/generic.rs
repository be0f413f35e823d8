//! Freedesktop session support for desktops without a dedicated platform.

use super::{pactl, spawn_detached, DesktopBus, MediaCommand, Platform, VolumeCommand};

/// Any Linux graphical session: logind, `gtk-launch`, MPRIS and PulseAudio.
pub struct GenericPlatform {
    bus: DesktopBus,
}

impl GenericPlatform {
    pub fn new(bus: DesktopBus) -> Self {
        Self { bus }
    }

    /// Whether a graphical or logind session is present.
    pub fn detect() -> bool {
        cfg!(target_os = "linux")
            && ["WAYLAND_DISPLAY", "DISPLAY", "XDG_SESSION_ID"]
                .iter()
                .any(|var| std::env::var_os(var).is_some())
    }
}

impl Platform for GenericPlatform {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn is_screen_locked(&self) -> bool {
        self.bus.logind_locked_hint().unwrap_or(false)
    }

    fn launch_application(&self, app: &str) -> bool {
        spawn_detached("gtk-launch", &[app])
            || spawn_detached("xdg-open", &[format!("application://{}.desktop", app).as_str()])
            || spawn_detached(app, &[])
    }

    fn media_command(&self, command: MediaCommand) -> bool {
        self.bus.media_command(command)
    }

    fn volume_command(&self, command: VolumeCommand) -> bool {
        pactl(command)
    }
}

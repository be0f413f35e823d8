//! KDE Plasma session support.

use std::path::PathBuf;
use tracing::debug;

use super::{pactl, spawn_detached, DesktopBus, MediaCommand, Platform, VolumeCommand};

/// Screensaver services queried for the lock state, in order.
const SCREENSAVER_SERVICES: &[&str] = &["org.freedesktop.ScreenSaver", "org.kde.screensaver"];

/// Bus name the Plasma shell claims.
const PLASMASHELL_SERVICE: &str = "org.kde.plasmashell";

/// KDE Plasma.
pub struct KdePlatform {
    bus: DesktopBus,
}

impl KdePlatform {
    pub fn new(bus: DesktopBus) -> Self {
        Self { bus }
    }

    /// Whether a Plasma session is running.
    pub fn detect(bus: &DesktopBus) -> bool {
        let current = std::env::var("XDG_CURRENT_DESKTOP").ok();
        let session = std::env::var("XDG_SESSION_DESKTOP").ok();
        is_kde_session(current.as_deref(), session.as_deref())
            || bus.session_name_has_owner(PLASMASHELL_SERVICE)
    }
}

fn is_kde_session(current: Option<&str>, session: Option<&str>) -> bool {
    [current, session].into_iter().flatten().any(|value| {
        let value = value.to_lowercase();
        value.contains("kde") || value.contains("plasma")
    })
}

/// Locations of `<app>.desktop` checked before falling back to `xdg-open`.
fn desktop_file_candidates(app: &str) -> Vec<PathBuf> {
    let file = format!("{}.desktop", app);
    let mut dirs = vec![
        PathBuf::from("/usr/share/applications"),
        PathBuf::from("/usr/local/share/applications"),
        PathBuf::from("/var/lib/flatpak/exports/share/applications"),
    ];
    if let Ok(home) = std::env::var("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".local/share/applications"));
        dirs.push(home.join(".local/share/flatpak/exports/share/applications"));
    }
    dirs.into_iter().map(|dir| dir.join(&file)).collect()
}

impl Platform for KdePlatform {
    fn name(&self) -> &'static str {
        "kde"
    }

    fn is_screen_locked(&self) -> bool {
        SCREENSAVER_SERVICES
            .iter()
            .find_map(|service| self.bus.screensaver_active(service))
            .or_else(|| self.bus.logind_locked_hint())
            .unwrap_or(false)
    }

    fn launch_application(&self, app: &str) -> bool {
        if spawn_detached("gtk-launch", &[app]) {
            debug!("Launched {} via gtk-launch", app);
            return true;
        }

        if let Some(path) = desktop_file_candidates(app).into_iter().find(|p| p.exists()) {
            let path = path.to_string_lossy();
            if spawn_detached("kioclient", &["exec", path.as_ref()]) {
                debug!("Launched {} via kioclient", path);
                return true;
            }
        }

        let url = format!("application://{}.desktop", app);
        if spawn_detached("xdg-open", &[url.as_str()]) {
            debug!("Launched {} via xdg-open", app);
            return true;
        }

        spawn_detached(app, &[])
    }

    fn media_command(&self, command: MediaCommand) -> bool {
        self.bus.media_command(command)
    }

    fn volume_command(&self, command: VolumeCommand) -> bool {
        pactl(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_kde_session() {
        assert!(is_kde_session(Some("KDE"), None));
        assert!(is_kde_session(None, Some("plasmawayland")));
        assert!(!is_kde_session(Some("GNOME"), Some("gnome")));
        assert!(!is_kde_session(None, None));
    }

    #[test]
    fn test_desktop_file_candidates() {
        let candidates = desktop_file_candidates("org.kde.dolphin");
        assert_eq!(
            candidates[0],
            PathBuf::from("/usr/share/applications/org.kde.dolphin.desktop")
        );
        assert!(candidates
            .iter()
            .all(|p| p.ends_with("org.kde.dolphin.desktop")));
    }
}

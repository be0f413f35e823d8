//! Application launch action.

use std::path::PathBuf;
use tracing::{info, warn};

use super::{Action, ActionContext};
use crate::config::ActionSpec;
use crate::platform::spawn_detached;

/// User launcher script tried when the platform cannot launch an app.
fn launcher_script() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    let path = PathBuf::from(home).join(".decky/scripts/launch-application.sh");
    path.is_file().then_some(path)
}

/// Launches `app` through the platform, then a user script, then the shell.
#[derive(Default)]
pub struct ApplicationAction;

impl Action for ApplicationAction {
    fn execute(&self, ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let Some(app) = action.param_str("app").filter(|a| !a.trim().is_empty()) else {
            warn!("application action requires 'app'");
            return false;
        };
        info!("Launching application: {}", app);

        if ctx.platform.launch_application(app) {
            return true;
        }
        if let Some(script) = launcher_script() {
            if spawn_detached(&script.to_string_lossy(), &[app]) {
                return true;
            }
        }
        spawn_detached("sh", &["-c", app])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{action, run, RecordingController, RecordingPlatform};

    #[test]
    fn test_launch_through_platform() {
        let controller = RecordingController::default();
        let platform = RecordingPlatform::default();
        assert!(run(
            &controller,
            &platform,
            &action("type = \"application\"\napp = \"org.kde.konsole\"")
        ));
        assert_eq!(*platform.launched.lock(), vec!["org.kde.konsole"]);
    }

    #[test]
    fn test_missing_app() {
        let controller = RecordingController::default();
        let platform = RecordingPlatform::default();
        assert!(!run(&controller, &platform, &action("type = \"application\"")));
        assert!(platform.launched.lock().is_empty());
    }
}

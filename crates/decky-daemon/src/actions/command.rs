//! Shell command action.

use tracing::{info, warn};

use super::{Action, ActionContext};
use crate::config::ActionSpec;
use crate::platform::spawn_detached;

/// Runs `command` through `sh -c` without waiting for it.
#[derive(Default)]
pub struct CommandAction;

impl Action for CommandAction {
    fn execute(&self, _ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let Some(command) = action.param_str("command").filter(|c| !c.trim().is_empty()) else {
            warn!("command action requires 'command'");
            return false;
        };
        info!("Executing command: {}", command);
        spawn_detached("sh", &["-c", command])
    }
}

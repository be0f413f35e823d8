//! Open-URL action.

use tracing::{info, warn};

use super::{Action, ActionContext};
use crate::config::ActionSpec;

/// Opens `url` with the desktop's default handler.
#[derive(Default)]
pub struct UrlAction;

impl Action for UrlAction {
    fn execute(&self, _ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let Some(url) = action.param_str("url").filter(|u| !u.trim().is_empty()) else {
            warn!("url action requires 'url'");
            return false;
        };
        info!("Opening URL: {}", url);
        match open::that_detached(url) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to open {}: {}", url, e);
                false
            }
        }
    }
}

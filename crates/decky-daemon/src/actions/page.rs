//! Page switch action.

use tracing::warn;

use super::{Action, ActionContext};
use crate::config::ActionSpec;

/// Switches the controller to `page`.
#[derive(Default)]
pub struct PageAction;

impl Action for PageAction {
    fn execute(&self, ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let Some(target) = action.page_target() else {
            warn!("page action requires 'page'");
            return false;
        };
        if target == ctx.controller.current_page() {
            return true;
        }
        ctx.controller.switch_page(target)
    }
}

//! Button actions.
//!
//! Every action type is listed in a static table and instantiated once when
//! the registry is built. Executing an action never fails loudly: problems
//! are logged and reported as `false`.

mod application;
mod command;
mod media;
mod page;
mod url;

pub use application::ApplicationAction;
pub use command::CommandAction;
pub use media::{MediaAction, VolumeAction};
pub use page::PageAction;
pub use url::UrlAction;

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::{ActionSpec, ButtonSpec};
use crate::platform::Platform;

/// The operations actions may perform on the running controller.
pub trait ControllerHandle: Send + Sync {
    /// Switches the active page. Returns false if the page does not exist.
    fn switch_page(&self, name: &str) -> bool;

    /// Name of the active page.
    fn current_page(&self) -> String;
}

/// Everything an action can see while it runs.
pub struct ActionContext<'a> {
    pub controller: &'a dyn ControllerHandle,
    pub button: &'a ButtonSpec,
    /// Zero-based key index that was pressed.
    pub key: usize,
    pub platform: &'a dyn Platform,
}

/// A button action type.
pub trait Action: Send + Sync {
    /// Runs the action. Returns whether it was carried out.
    fn execute(&self, ctx: &ActionContext<'_>, action: &ActionSpec) -> bool;
}

type ActionFactory = fn() -> Box<dyn Action>;

/// Every built-in action type, by config name.
const BUILTIN: &[(&str, ActionFactory)] = &[
    ("command", boxed::<CommandAction>),
    ("application", boxed::<ApplicationAction>),
    ("url", boxed::<UrlAction>),
    ("page", boxed::<PageAction>),
    ("media", boxed::<MediaAction>),
    ("volume", boxed::<VolumeAction>),
];

fn boxed<A: Action + Default + 'static>() -> Box<dyn Action> {
    Box::new(A::default())
}

/// Whether `kind` names a built-in action.
pub fn is_registered(kind: &str) -> bool {
    BUILTIN.iter().any(|(name, _)| *name == kind)
}

/// Instantiated action types.
pub struct ActionRegistry {
    actions: BTreeMap<&'static str, Box<dyn Action>>,
}

impl ActionRegistry {
    /// Registry holding every built-in action.
    pub fn builtin() -> Self {
        let actions = BUILTIN
            .iter()
            .map(|&(name, factory)| (name, factory()))
            .collect();
        Self { actions }
    }

    /// Registered type names in sorted order.
    pub fn types(&self) -> Vec<&'static str> {
        self.actions.keys().copied().collect()
    }

    /// Runs `action`, returning false for unknown types.
    pub fn execute(&self, ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let Some(handler) = self.actions.get(action.kind.as_str()) else {
            warn!("Key {}: unknown action type '{}'", ctx.key + 1, action.kind);
            return false;
        };
        debug!(
            "Key {} ({}): running {} action",
            ctx.key + 1,
            ctx.button.text.as_deref().unwrap_or("-"),
            action.kind
        );
        handler.execute(ctx, action)
    }
}

//! Widgets: buttons whose text is produced at runtime and refreshed on an
//! interval.

mod clock;
mod system;

pub use clock::DateTimeWidget;
pub use system::{CpuWidget, DiskWidget, MemoryWidget, NetworkWidget, UptimeWidget};

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::config::WidgetSpec;

/// Format used by clock widgets without an explicit `format`.
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M";

/// A source of button text.
pub trait Widget: Send {
    /// Produces the text to show now.
    fn render_text(&mut self) -> String;
}

type WidgetFactory = fn(&WidgetSpec) -> Box<dyn Widget>;

/// Every widget type, by config name.
const WIDGETS: &[(&str, WidgetFactory)] = &[
    ("datetime", datetime),
    ("clock", datetime),
    ("cpu", cpu),
    ("memory", memory),
    ("uptime", uptime),
    ("disk", disk),
    ("network", network),
];

fn datetime(spec: &WidgetSpec) -> Box<dyn Widget> {
    Box::new(DateTimeWidget::from_spec(spec))
}

fn cpu(_: &WidgetSpec) -> Box<dyn Widget> {
    Box::new(CpuWidget::new())
}

fn memory(spec: &WidgetSpec) -> Box<dyn Widget> {
    Box::new(MemoryWidget::from_spec(spec))
}

fn uptime(_: &WidgetSpec) -> Box<dyn Widget> {
    Box::new(UptimeWidget)
}

fn disk(spec: &WidgetSpec) -> Box<dyn Widget> {
    Box::new(DiskWidget::from_spec(spec))
}

fn network(spec: &WidgetSpec) -> Box<dyn Widget> {
    Box::new(NetworkWidget::from_spec(spec))
}

/// Whether `kind` names a known widget.
pub fn is_registered(kind: &str) -> bool {
    WIDGETS.iter().any(|(name, _)| *name == kind)
}

/// Instantiates the widget a spec describes.
pub fn create_widget(spec: &WidgetSpec) -> Option<Box<dyn Widget>> {
    WIDGETS
        .iter()
        .find(|(name, _)| *name == spec.kind)
        .map(|(_, factory)| factory(spec))
}

struct WidgetInstance {
    widget: Box<dyn Widget>,
    interval: Duration,
    next_due: Instant,
    text: String,
}

/// Widgets of the active page, keyed by key index.
#[derive(Default)]
pub struct WidgetEngine {
    widgets: BTreeMap<usize, WidgetInstance>,
}

impl WidgetEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a widget on `key` and renders its first text immediately.
    pub fn insert(&mut self, key: usize, mut widget: Box<dyn Widget>, interval: Duration, now: Instant) {
        let text = widget.render_text();
        self.widgets.insert(
            key,
            WidgetInstance {
                widget,
                interval,
                next_due: now + interval,
                text,
            },
        );
    }

    /// Latest text for `key`.
    pub fn text(&self, key: usize) -> Option<&str> {
        self.widgets.get(&key).map(|w| w.text.as_str())
    }

    /// Refreshes widgets whose interval has elapsed and returns the keys
    /// whose text changed.
    pub fn refresh_due(&mut self, now: Instant) -> BTreeSet<usize> {
        let mut changed = BTreeSet::new();
        for (&key, instance) in self.widgets.iter_mut() {
            if now < instance.next_due {
                continue;
            }
            instance.next_due = now + instance.interval;
            let text = instance.widget.render_text();
            if text != instance.text {
                instance.text = text;
                changed.insert(key);
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.widgets.clear();
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}

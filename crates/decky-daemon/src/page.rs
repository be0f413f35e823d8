//! Active page tracking and key rendering.

use decky_hw::{DeckDevice, KeyImage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::animation::{decode_gif, AnimationEngine};
use crate::config::{ButtonSpec, Config, Page};
use crate::rendering::{fit_icon, icon_area, resolve_style, ButtonRenderer};
use crate::widgets::{create_widget, WidgetEngine};

/// Page operation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PageError {
    #[error("page '{0}' does not exist")]
    NotFound(String),
}

/// Per-page runtime state. Rebuilt whenever a page is rendered in full.
struct PageState {
    current: String,
    animations: AnimationEngine,
    widgets: WidgetEngine,
}

/// Tracks the active page and pushes its keys to the panel.
///
/// Callers pass the device in while holding the connection's device lock;
/// the page lock is always taken inside it.
pub struct PageManager {
    config: Arc<Config>,
    renderer: ButtonRenderer,
    state: Mutex<PageState>,
}

impl PageManager {
    /// Starts on the configured main page.
    pub fn new(config: Arc<Config>, renderer: ButtonRenderer) -> Self {
        let state = PageState {
            current: config.main_page.clone(),
            animations: AnimationEngine::new(),
            widgets: WidgetEngine::new(),
        };
        Self {
            config,
            renderer,
            state: Mutex::new(state),
        }
    }

    /// Name of the active page.
    pub fn current_page(&self) -> String {
        self.state.lock().current.clone()
    }

    /// Every configured page.
    pub fn page_names(&self) -> Vec<String> {
        self.config.page_names()
    }

    /// Button bound to `key` on the active page.
    pub fn button(&self, key: usize) -> Option<ButtonSpec> {
        let state = self.state.lock();
        self.config.page(&state.current)?.button(key).cloned()
    }

    /// Makes `name` the active page and renders it if a device is attached.
    ///
    /// On error the previous page stays active and nothing is pushed.
    pub fn switch_page(
        &self,
        name: &str,
        device: Option<&mut dyn DeckDevice>,
    ) -> Result<(), PageError> {
        let page = self
            .config
            .page(name)
            .ok_or_else(|| PageError::NotFound(name.to_string()))?;

        let mut state = self.state.lock();
        state.animations.clear();
        state.widgets.clear();
        state.current = page.name.clone();
        info!("Switched to page '{}'", page.name);

        if let Some(device) = device {
            self.load_page(&mut state, page, device);
        }
        Ok(())
    }

    /// Renders and pushes every key of the active page. Returns the number
    /// of keys pushed.
    pub fn update_page(&self, device: &mut dyn DeckDevice) -> usize {
        let mut state = self.state.lock();
        let Some(page) = self.config.page(&state.current) else {
            warn!("Active page '{}' vanished", state.current);
            return 0;
        };
        self.load_page(&mut state, page, device)
    }

    /// Pushes only keys whose animation frame advanced or whose widget text
    /// changed. Returns the number of keys pushed.
    pub fn update_animated_buttons(&self, device: &mut dyn DeckDevice, now: Instant) -> usize {
        let mut state = self.state.lock();
        let Some(page) = self.config.page(&state.current) else {
            return 0;
        };

        let mut keys = state.animations.update_animations(now);
        keys.extend(state.widgets.refresh_due(now));

        let size = device.key_size();
        let key_count = device.key_count();
        let mut pushed = 0;
        for key in keys.into_iter().filter(|&k| k < key_count) {
            let image = self.render_key(&state, page, key, size);
            match device.set_key_image(key, &image) {
                Ok(()) => pushed += 1,
                Err(e) if e.is_disconnect() => {
                    debug!("Key {} update failed: {}", key, e);
                    break;
                }
                Err(e) => debug!("Key {} update failed: {}", key, e),
            }
        }
        pushed
    }

    /// Whether the active page has anything to refresh on a tick.
    pub fn has_live_content(&self) -> bool {
        let state = self.state.lock();
        !state.animations.is_empty() || !state.widgets.is_empty()
    }

    /// Drops animation and widget state, e.g. when the panel goes away.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        state.animations.clear();
        state.widgets.clear();
    }

    fn load_page(&self, state: &mut PageState, page: &Page, device: &mut dyn DeckDevice) -> usize {
        let now = Instant::now();
        let size = device.key_size();
        let key_count = device.key_count();

        state.animations.clear();
        state.widgets.clear();

        for (&key, spec) in page.buttons.range(..key_count) {
            if let Some(source) = spec.animation_source() {
                self.setup_animation(state, key, spec, source, size, now);
            }
            if let Some(widget_spec) = &spec.widget {
                if let Some(widget) = create_widget(widget_spec) {
                    state.widgets.insert(key, widget, widget_spec.interval(), now);
                }
            }
        }
        state.animations.synchronize_animations(now);

        let mut pushed = 0;
        for key in 0..key_count {
            let image = self.render_key(state, page, key, size);
            match device.set_key_image(key, &image) {
                Ok(()) => pushed += 1,
                Err(e) if e.is_disconnect() => {
                    warn!("Panel stopped responding while rendering page: {}", e);
                    break;
                }
                Err(e) => warn!("Failed to update key {}: {}", key, e),
            }
        }
        debug!("Rendered page '{}' ({} keys)", page.name, pushed);
        pushed
    }

    fn setup_animation(
        &self,
        state: &mut PageState,
        key: usize,
        spec: &ButtonSpec,
        source: &str,
        size: u32,
        now: Instant,
    ) {
        let style = resolve_style(&self.config.styles, spec);
        let bound = icon_area(size, &style);
        let frames = self
            .renderer
            .icons()
            .read(source)
            .map_err(|e| e.to_string())
            .and_then(|bytes| decode_gif(source, &bytes).map_err(|e| e.to_string()));

        let result = frames.and_then(|mut frames| {
            for frame in &mut frames {
                frame.image = fit_icon(&frame.image, bound);
            }
            state
                .animations
                .setup_animated_button(key, source, frames, spec.looping, now)
                .map_err(|e| e.to_string())
        });
        if let Err(e) = result {
            warn!("Key {}: animation unavailable, rendering static: {}", key + 1, e);
        }
    }

    fn render_key(&self, state: &PageState, page: &Page, key: usize, size: u32) -> KeyImage {
        let Some(spec) = page.button(key) else {
            let style = resolve_style(&self.config.styles, &ButtonSpec::default());
            return self.renderer.render_blank(&style, size);
        };
        let style = resolve_style(&self.config.styles, spec);
        let text = state.widgets.text(key);

        if let Some(frame) = state.animations.current_frame(key) {
            let text = text.or(spec.text.as_deref());
            return self.renderer.compose(text, Some(&frame.image), &style, size);
        }
        self.renderer.render_button(spec, text, &style, size)
    }
}

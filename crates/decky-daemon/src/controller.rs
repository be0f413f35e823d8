//! Top-level orchestration.
//!
//! The controller wires the connection manager, page manager and action
//! registry together and runs the background workers: the connection
//! monitor (owned by [`ConnectionManager`]), the animation tick and the
//! screen lock poll. Every worker watches the same shutdown token.

use decky_hw::{DeckKind, DeviceProvider};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::{ActionContext, ActionRegistry, ControllerHandle};
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionSettings, ConnectionState};
use crate::page::{PageError, PageManager};
use crate::platform::Platform;
use crate::rendering::ButtonRenderer;

/// Runs the panel.
pub struct Controller {
    config: Arc<Config>,
    connection: Arc<ConnectionManager>,
    pages: Arc<PageManager>,
    actions: ActionRegistry,
    platform: Arc<dyn Platform>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    screen_locked: AtomicBool,
}

impl Controller {
    pub fn new(
        config: Arc<Config>,
        provider: Arc<dyn DeviceProvider>,
        platform: Arc<dyn Platform>,
        renderer: ButtonRenderer,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let connection = Arc::new(ConnectionManager::new(
            provider,
            ConnectionSettings::from_config(&config),
            shutdown.clone(),
        ));
        let pages = Arc::new(PageManager::new(config.clone(), renderer));
        Arc::new(Self {
            config,
            connection,
            pages,
            actions: ActionRegistry::builtin(),
            platform,
            shutdown,
            workers: Mutex::new(Vec::new()),
            screen_locked: AtomicBool::new(false),
        })
    }

    /// Connects, renders the main page and starts the background workers.
    ///
    /// A missing panel is not an error: the monitor keeps retrying.
    pub async fn start(self: &Arc<Self>) {
        info!(
            "Starting on page '{}' with {} pages",
            self.config.main_page,
            self.config.pages.len()
        );

        let initial = self.clone();
        let connected = tokio::task::spawn_blocking(move || {
            if !initial.connection.connect() {
                return false;
            }
            initial
                .connection
                .with_device(|device| initial.pages.update_page(device));
            true
        })
        .await
        .unwrap_or(false);
        if !connected {
            info!("No panel available yet, waiting for one to be attached");
        }

        let pages = self.pages.clone();
        let on_disconnect = Arc::new(move || pages.teardown());
        let pages = self.pages.clone();
        let weak = Arc::downgrade(&self.connection);
        let on_reconnect = Arc::new(move || {
            if let Some(connection) = weak.upgrade() {
                connection.with_device(|device| pages.update_page(device));
            }
        });
        self.connection.start_monitoring(on_disconnect, on_reconnect);

        let handle = tokio::runtime::Handle::current();
        let weak = Arc::downgrade(self);
        self.connection.set_key_callback(Arc::new(move |key: usize, pressed: bool| {
            if !pressed {
                return;
            }
            if let Some(controller) = weak.upgrade() {
                handle.spawn_blocking(move || controller.handle_key(key));
            }
        }));

        let mut workers = self.workers.lock();
        workers.push(tokio::spawn(Self::animation_loop(
            Arc::downgrade(self),
            self.config.timing.animation_tick(),
            self.shutdown.clone(),
        )));
        workers.push(tokio::spawn(Self::lock_poll_loop(
            Arc::downgrade(self),
            self.config.timing.lock_poll(),
            self.shutdown.clone(),
        )));
    }

    async fn animation_loop(weak: Weak<Self>, tick: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let Some(controller) = weak.upgrade() else {
                break;
            };
            if controller.connection.state() != ConnectionState::Connected
                || !controller.pages.has_live_content()
            {
                continue;
            }
            let step = tokio::task::spawn_blocking(move || {
                let pages = controller.pages.clone();
                controller
                    .connection
                    .with_device(|device| pages.update_animated_buttons(device, Instant::now()))
            });
            if let Err(e) = step.await {
                warn!("Animation tick failed: {}", e);
            }
        }
        debug!("Animation loop stopped");
    }

    async fn lock_poll_loop(weak: Weak<Self>, poll: Duration, shutdown: CancellationToken) {
        let mut consecutive_errors: u32 = 0;
        let mut last_error_log = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll) => {}
            }
            let Some(controller) = weak.upgrade() else {
                break;
            };
            let step = tokio::task::spawn_blocking(move || controller.check_screen_lock());
            if let Err(e) = step.await {
                consecutive_errors += 1;
                // Only log once per minute or on first error
                let elapsed = last_error_log.elapsed();
                if consecutive_errors == 1 || elapsed >= Duration::from_secs(60) {
                    warn!(
                        "Screen lock check failed (repeated {} times): {}",
                        consecutive_errors, e
                    );
                    last_error_log = Instant::now();
                    consecutive_errors = 0;
                }
            } else {
                consecutive_errors = 0;
            }
        }
        debug!("Screen lock poll stopped");
    }

    /// Polls the platform once and suspends or resumes the panel on a lock
    /// transition.
    fn check_screen_lock(&self) {
        if self.is_shutting_down() {
            return;
        }
        let locked = self.platform.is_screen_locked();
        if locked == self.screen_locked.swap(locked, Ordering::SeqCst) {
            return;
        }
        // The platform call may block for a while
        if self.is_shutting_down() {
            return;
        }

        if locked {
            info!("Screen locked, releasing panel");
            self.connection.suspend();
            self.pages.teardown();
        } else {
            info!("Screen unlocked, reconnecting panel");
            if self.connection.resume() {
                self.connection
                    .with_device(|device| self.pages.update_page(device));
            }
        }
    }

    /// Runs the action bound to `key` on the active page. Ignored once
    /// shutdown has begun.
    pub fn handle_key(&self, key: usize) {
        if self.is_shutting_down() {
            debug!("Ignoring key {} during shutdown", key + 1);
            return;
        }
        let Some(button) = self.pages.button(key) else {
            debug!("Key {} has no binding", key + 1);
            return;
        };
        let Some(action) = &button.action else {
            return;
        };
        let ctx = ActionContext {
            controller: self,
            button: &button,
            key,
            platform: self.platform.as_ref(),
        };
        if !self.actions.execute(&ctx, action) {
            warn!("Key {}: {} action failed", key + 1, action.kind);
        }
    }

    /// Switches the active page, rendering it if a panel is attached.
    pub fn switch_page(&self, name: &str) -> Result<(), PageError> {
        self.connection
            .with_slot(|device| self.pages.switch_page(name, device))
    }

    pub fn current_page(&self) -> String {
        self.pages.current_page()
    }

    pub fn page_names(&self) -> Vec<String> {
        self.pages.page_names()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.state() == ConnectionState::Connected
    }

    pub fn device_kind(&self) -> Option<DeckKind> {
        self.connection.device_info().map(|info| info.kind)
    }

    pub fn set_brightness(&self, percent: u8) -> decky_hw::Result<()> {
        self.connection.set_brightness(percent)
    }

    /// Signals every worker to stop. Only the first call has an effect.
    pub fn request_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutdown requested");
            self.shutdown.cancel();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }

    /// Stops all workers, waits for them, then closes the panel.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        self.connection.stop_monitoring().await;

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Worker ended abnormally: {}", e);
            }
        }

        let connection = self.connection.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || connection.disconnect()).await {
            warn!("Final disconnect failed: {}", e);
        }
        self.pages.teardown();
        info!("Shutdown complete");
    }
}

impl ControllerHandle for Controller {
    fn switch_page(&self, name: &str) -> bool {
        match Controller::switch_page(self, name) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn current_page(&self) -> String {
        Controller::current_page(self)
    }
}

//! Device connection lifecycle.
//!
//! The [`ConnectionManager`] owns the only handle to the panel. All device
//! I/O goes through its slot mutex, so the monitor, the key reader, the
//! animation tick and page switches never write to the panel concurrently.
//! A handle is dropped on every disconnect and a fresh one is opened on
//! reconnect.

use decky_hw::{DeckDevice, DeckKind, DeviceProvider, Error, Rotation};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// How long one key read may hold the device.
const KEY_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Pause between key reads so writers get the device.
const KEY_READ_GAP: Duration = Duration::from_millis(2);

/// Key reader back-off while no panel is attached.
const KEY_READ_IDLE: Duration = Duration::from_millis(50);

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Snapshot of the attached panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: DeckKind,
    pub serial: String,
    pub key_count: usize,
    pub key_size: u32,
    pub brightness: u8,
}

/// Connection tuning.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub brightness: u8,
    pub rotation: Rotation,
    /// Health check cadence while connected.
    pub check_interval: Duration,
    /// Reconnect cadence while disconnected.
    pub reconnect_interval: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            brightness: config.device.brightness(),
            rotation: config.device.rotation(),
            check_interval: config.timing.connection_check(),
            reconnect_interval: config.timing.reconnect(),
        }
    }
}

/// Called with (key index, pressed).
pub type KeyCallback = Arc<dyn Fn(usize, bool) + Send + Sync>;

/// Called on connection transitions detected by the monitor.
pub type ConnectionCallback = Arc<dyn Fn() + Send + Sync>;

/// Result of an open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectOutcome {
    Opened,
    AlreadyConnected,
    Failed,
}

/// The device handle and what was learned from it.
#[derive(Default)]
struct Slot {
    device: Option<Box<dyn DeckDevice>>,
    /// Set when I/O failure dropped the handle; cleared by the monitor.
    lost: bool,
    key_states: Vec<bool>,
    last_failure: Option<String>,
}

/// Non-blocking view of the connection for status queries.
#[derive(Default)]
struct Status {
    state: ConnectionState,
    info: Option<DeviceInfo>,
}

struct Monitor {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the panel connection and the background monitor.
pub struct ConnectionManager {
    provider: Arc<dyn DeviceProvider>,
    settings: ConnectionSettings,
    brightness: AtomicU8,
    shutdown: CancellationToken,
    // Lock order: slot before status
    slot: Mutex<Slot>,
    status: Mutex<Status>,
    suspended: AtomicBool,
    permission_reported: AtomicBool,
    key_callback: Mutex<Option<KeyCallback>>,
    monitor: Mutex<Option<Monitor>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager. Once `shutdown` is cancelled no new
    /// connection is ever opened.
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        settings: ConnectionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            brightness: AtomicU8::new(settings.brightness),
            settings,
            shutdown,
            slot: Mutex::new(Slot::default()),
            status: Mutex::new(Status::default()),
            suspended: AtomicBool::new(false),
            permission_reported: AtomicBool::new(false),
            key_callback: Mutex::new(None),
            monitor: Mutex::new(None),
        }
    }

    /// Opens the first available panel and configures it.
    ///
    /// Returns true if a panel is connected afterwards. Never panics; every
    /// failure is logged and leaves the manager disconnected. Does nothing
    /// while suspended or after shutdown.
    pub fn connect(&self) -> bool {
        self.try_connect() != ConnectOutcome::Failed
    }

    fn try_connect(&self) -> ConnectOutcome {
        if self.shutdown.is_cancelled() {
            return ConnectOutcome::Failed;
        }

        let mut slot = self.slot.lock();
        if slot.device.is_some() {
            return ConnectOutcome::AlreadyConnected;
        }
        if self.is_suspended() {
            return ConnectOutcome::Failed;
        }
        self.set_state(ConnectionState::Connecting, None);

        let mut device = match self.provider.open_first() {
            Ok(device) => device,
            Err(e) => {
                self.report_failure(&mut slot, &e);
                self.set_state(ConnectionState::Disconnected, None);
                return ConnectOutcome::Failed;
            }
        };

        device.set_rotation(self.settings.rotation);
        if let Err(e) = device.set_brightness(self.brightness.load(Ordering::SeqCst)) {
            if e.is_disconnect() {
                self.report_failure(&mut slot, &e);
                self.set_state(ConnectionState::Disconnected, None);
                return ConnectOutcome::Failed;
            }
            warn!("Failed to set brightness: {}", e);
        }

        let info = DeviceInfo {
            kind: device.kind(),
            serial: device.serial().to_string(),
            key_count: device.key_count(),
            key_size: device.key_size(),
            brightness: device.brightness(),
        };
        info!(
            "Connected to {} (serial {}, {} keys)",
            info.kind, info.serial, info.key_count
        );

        slot.key_states = vec![false; info.key_count];
        slot.device = Some(device);
        slot.lost = false;
        slot.last_failure = None;
        self.permission_reported.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected, Some(info));
        ConnectOutcome::Opened
    }

    fn report_failure(&self, slot: &mut Slot, e: &Error) {
        if e.is_permission_denied() {
            if !self.permission_reported.swap(true, Ordering::SeqCst) {
                error!("{}", e);
            } else {
                debug!("Still no permission to open panel");
            }
            return;
        }
        if matches!(e, Error::DeviceNotFound) {
            debug!("No panel found");
            return;
        }
        let message = e.to_string();
        if slot.last_failure.as_deref() != Some(message.as_str()) {
            warn!("Failed to open panel: {}", message);
        }
        slot.last_failure = Some(message);
    }

    /// Closes the panel if one is open. Safe to call repeatedly.
    ///
    /// Returns true if a panel was closed.
    pub fn disconnect(&self) -> bool {
        let mut slot = self.slot.lock();
        let Some(mut device) = slot.device.take() else {
            return false;
        };
        if let Err(e) = device.reset() {
            debug!("Reset on disconnect failed: {}", e);
        }
        drop(device);
        slot.key_states.clear();
        self.set_state(ConnectionState::Disconnected, None);
        info!("Disconnected from panel");
        true
    }

    /// Probes the panel. A failed probe drops the handle and marks the
    /// connection lost.
    pub fn is_connected(&self) -> bool {
        let mut slot = self.slot.lock();
        let Some(device) = slot.device.as_mut() else {
            return false;
        };
        match device.probe() {
            Ok(()) => true,
            Err(e) => {
                debug!("Health check failed: {}", e);
                self.drop_lost(&mut slot);
                false
            }
        }
    }

    fn drop_lost(&self, slot: &mut Slot) {
        slot.device = None;
        slot.lost = true;
        slot.key_states.clear();
        self.set_state(ConnectionState::Disconnected, None);
    }

    fn set_state(&self, state: ConnectionState, info: Option<DeviceInfo>) {
        let mut status = self.status.lock();
        status.state = state;
        status.info = info;
    }

    /// Current state without touching the device.
    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    /// Details of the attached panel.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.status.lock().info.clone()
    }

    /// Runs `f` with exclusive access to the panel, if one is attached.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut dyn DeckDevice) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        let device = slot.device.as_mut()?;
        Some(f(device.as_mut()))
    }

    /// Runs `f` holding the device lock whether or not a panel is attached.
    pub fn with_slot<R>(&self, f: impl FnOnce(Option<&mut dyn DeckDevice>) -> R) -> R {
        let mut slot = self.slot.lock();
        f(slot.device.as_mut().map(|d| d.as_mut() as &mut dyn DeckDevice))
    }

    /// Sets brightness now and for future connections.
    pub fn set_brightness(&self, percent: u8) -> decky_hw::Result<()> {
        if percent > 100 {
            return Err(Error::InvalidBrightness(percent));
        }
        self.brightness.store(percent, Ordering::SeqCst);
        let mut slot = self.slot.lock();
        let device = slot.device.as_mut().ok_or(Error::Disconnected)?;
        device.set_brightness(percent)?;
        if let Some(info) = self.status.lock().info.as_mut() {
            info.brightness = percent;
        }
        Ok(())
    }

    /// Closes the panel and keeps the monitor from reopening it.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        self.disconnect();
    }

    /// Lets the monitor reconnect again and reconnects now.
    ///
    /// Returns true if a panel is connected afterwards.
    pub fn resume(&self) -> bool {
        self.suspended.store(false, Ordering::SeqCst);
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.connect()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Registers the key press handler used by the key reader.
    pub fn set_key_callback(&self, callback: KeyCallback) {
        *self.key_callback.lock() = Some(callback);
    }

    /// Starts the health check/reconnect monitor and the key reader.
    ///
    /// `on_disconnect` fires once when the monitor finds the panel gone;
    /// `on_reconnect` fires once each time the monitor opens a panel. Both
    /// run on a blocking thread without the device lock held.
    pub fn start_monitoring(
        self: &Arc<Self>,
        on_disconnect: ConnectionCallback,
        on_reconnect: ConnectionCallback,
    ) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            warn!("Connection monitor already running");
            return;
        }

        let token = self.shutdown.child_token();
        let health = tokio::spawn(Self::monitor_loop(
            self.clone(),
            token.clone(),
            on_disconnect,
            on_reconnect,
        ));

        let manager = self.clone();
        let reader_token = token.clone();
        let reader = tokio::task::spawn_blocking(move || manager.key_reader(&reader_token));

        *monitor = Some(Monitor {
            token,
            tasks: vec![health, reader],
        });
        debug!("Connection monitor started");
    }

    async fn monitor_loop(
        manager: Arc<Self>,
        token: CancellationToken,
        on_disconnect: ConnectionCallback,
        on_reconnect: ConnectionCallback,
    ) {
        loop {
            let delay = if manager.state() == ConnectionState::Connected {
                manager.settings.check_interval
            } else {
                manager.settings.reconnect_interval
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let step_manager = manager.clone();
            let step_token = token.clone();
            let on_disconnect = on_disconnect.clone();
            let on_reconnect = on_reconnect.clone();
            let step = tokio::task::spawn_blocking(move || {
                step_manager.monitor_step(&step_token, &*on_disconnect, &*on_reconnect)
            });
            if let Err(e) = step.await {
                warn!("Connection monitor step failed: {}", e);
            }
        }
        debug!("Connection monitor stopped");
    }

    fn monitor_step(
        &self,
        token: &CancellationToken,
        on_disconnect: &(dyn Fn() + Send + Sync),
        on_reconnect: &(dyn Fn() + Send + Sync),
    ) {
        if token.is_cancelled() {
            return;
        }

        if self.state() == ConnectionState::Connected {
            self.is_connected();
        }

        let lost = std::mem::take(&mut self.slot.lock().lost);
        if lost {
            info!("Panel disconnected");
            on_disconnect();
            return;
        }

        if self.state() == ConnectionState::Connected
            || self.is_suspended()
            || token.is_cancelled()
        {
            return;
        }
        if self.try_connect() == ConnectOutcome::Opened {
            info!("Panel reconnected");
            on_reconnect();
        }
    }

    fn key_reader(&self, token: &CancellationToken) {
        while !token.is_cancelled() {
            match self.poll_keys() {
                Some(events) => {
                    if !events.is_empty() {
                        let callback = self.key_callback.lock().clone();
                        if let Some(callback) = callback {
                            for (key, pressed) in events {
                                callback(key, pressed);
                            }
                        }
                    }
                    thread::sleep(KEY_READ_GAP);
                }
                None => thread::sleep(KEY_READ_IDLE),
            }
        }
        debug!("Key reader stopped");
    }

    /// Reads one key report and returns the keys whose state changed.
    /// Returns `None` while disconnected.
    fn poll_keys(&self) -> Option<Vec<(usize, bool)>> {
        let mut slot = self.slot.lock();
        let device = slot.device.as_mut()?;
        match device.read_key_states(KEY_READ_TIMEOUT) {
            Ok(Some(states)) => {
                let previous = std::mem::replace(&mut slot.key_states, states.clone());
                Some(
                    states
                        .iter()
                        .enumerate()
                        .filter(|&(i, &pressed)| {
                            previous.get(i).copied().unwrap_or(false) != pressed
                        })
                        .map(|(i, &pressed)| (i, pressed))
                        .collect(),
                )
            }
            Ok(None) => Some(Vec::new()),
            Err(e) if e.is_disconnect() => {
                debug!("Key read failed: {}", e);
                self.drop_lost(&mut slot);
                None
            }
            Err(e) => {
                debug!("Key read error: {}", e);
                Some(Vec::new())
            }
        }
    }

    /// Stops the monitor and key reader and waits for both to exit.
    pub async fn stop_monitoring(&self) {
        let monitor = self.monitor.lock().take();
        let Some(monitor) = monitor else {
            return;
        };
        monitor.token.cancel();
        for task in monitor.tasks {
            if let Err(e) = task.await {
                warn!("Connection worker ended abnormally: {}", e);
            }
        }
        debug!("Connection monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for, FakeProvider};
    use std::sync::atomic::AtomicUsize;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            brightness: 60,
            rotation: Rotation::Rot0,
            check_interval: Duration::from_millis(20),
            reconnect_interval: Duration::from_millis(40),
        }
    }

    fn manager(provider: &Arc<FakeProvider>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            provider.clone(),
            settings(),
            CancellationToken::new(),
        ))
    }

    fn counter() -> (Arc<AtomicUsize>, ConnectionCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let callback: ConnectionCallback = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_connect_and_probe() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);

        assert!(!manager.is_connected());
        assert!(manager.connect());
        assert!(manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Connected);

        let info = manager.device_info().unwrap();
        assert_eq!(info.kind, DeckKind::Mk2);
        assert_eq!(info.key_count, 15);
        assert_eq!(provider.state.lock().brightness, 60);

        // Already connected: no new handle
        assert!(manager.connect());
        assert_eq!(provider.attempts(), 1);
    }

    #[test]
    fn test_connect_without_device() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        provider.set_plugged(false);
        let manager = manager(&provider);

        assert!(!manager.connect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.device_info().is_none());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);
        assert!(manager.connect());

        assert!(manager.disconnect());
        assert!(!manager.disconnect());
        assert_eq!(provider.state.lock().resets, 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_failed_probe_drops_handle() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);
        assert!(manager.connect());

        provider.set_plugged(false);
        assert!(!manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Replugging does not revive the old handle
        provider.set_plugged(true);
        assert!(!manager.is_connected());
        assert!(manager.connect());
        assert_eq!(provider.attempts(), 2);
    }

    #[test]
    fn test_permission_reported_once() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        provider.state.lock().deny_access = true;
        let manager = manager(&provider);

        assert!(!manager.connect());
        assert!(manager.permission_reported.load(Ordering::SeqCst));
        assert!(!manager.connect());
        assert_eq!(provider.attempts(), 2);

        // A successful connection re-arms the report
        provider.state.lock().deny_access = false;
        assert!(manager.connect());
        assert!(!manager.permission_reported.load(Ordering::SeqCst));
    }

    #[test]
    fn test_set_brightness_survives_reconnect() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);
        assert!(manager.set_brightness(30).is_err());
        assert!(manager.connect());
        assert_eq!(provider.state.lock().brightness, 30);

        manager.set_brightness(80).unwrap();
        assert_eq!(manager.device_info().unwrap().brightness, 80);
        assert!(matches!(
            manager.set_brightness(101),
            Err(Error::InvalidBrightness(101))
        ));

        manager.disconnect();
        provider.state.lock().brightness = 0;
        assert!(manager.connect());
        assert_eq!(provider.state.lock().brightness, 80);
    }

    #[tokio::test]
    async fn test_unplug_and_replug_fire_callbacks_once() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);
        assert!(manager.connect());

        let (disconnects, on_disconnect) = counter();
        let (reconnects, on_reconnect) = counter();
        manager.start_monitoring(on_disconnect, on_reconnect);

        provider.set_plugged(false);
        let gone = || manager.state() == ConnectionState::Disconnected;
        assert!(wait_for(Duration::from_secs(2), gone).await);
        let fired = || disconnects.load(Ordering::SeqCst) == 1;
        assert!(wait_for(Duration::from_secs(2), fired).await);

        // Several reconnect intervals without a panel
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(reconnects.load(Ordering::SeqCst), 0);

        provider.set_plugged(true);
        let fired = || reconnects.load(Ordering::SeqCst) == 1;
        assert!(wait_for(Duration::from_secs(2), fired).await);
        assert_eq!(manager.state(), ConnectionState::Connected);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);

        manager.stop_monitoring().await;
    }

    #[tokio::test]
    async fn test_no_connect_after_shutdown() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        provider.set_plugged(false);
        let shutdown = CancellationToken::new();
        let manager = Arc::new(ConnectionManager::new(
            provider.clone(),
            settings(),
            shutdown.clone(),
        ));

        let (_, on_disconnect) = counter();
        let (reconnects, on_reconnect) = counter();
        manager.start_monitoring(on_disconnect, on_reconnect);
        assert!(wait_for(Duration::from_secs(2), || provider.attempts() >= 1).await);

        shutdown.cancel();
        // Let any in-flight step finish
        tokio::time::sleep(Duration::from_millis(20)).await;
        let attempts = provider.attempts();

        provider.set_plugged(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!manager.connect());
        assert!(!manager.resume());
        assert_eq!(provider.attempts(), attempts);
        assert_eq!(reconnects.load(Ordering::SeqCst), 0);

        manager.stop_monitoring().await;
    }

    #[tokio::test]
    async fn test_suspend_blocks_reconnect() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);
        assert!(manager.connect());

        let (disconnects, on_disconnect) = counter();
        let (reconnects, on_reconnect) = counter();
        manager.start_monitoring(on_disconnect, on_reconnect);

        manager.suspend();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(reconnects.load(Ordering::SeqCst), 0);
        // An explicit disconnect is not a lost panel
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);

        assert!(manager.resume());
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.stop_monitoring().await;
    }

    #[tokio::test]
    async fn test_key_events() {
        let provider = Arc::new(FakeProvider::new(DeckKind::Mk2));
        let manager = manager(&provider);
        assert!(manager.connect());

        let events = Arc::new(Mutex::new(Vec::<(usize, bool)>::new()));
        let sink = events.clone();
        manager.set_key_callback(Arc::new(move |key: usize, pressed: bool| {
            sink.lock().push((key, pressed))
        }));

        let mut down = vec![false; 15];
        down[3] = true;
        {
            let mut state = provider.state.lock();
            state.key_reports.push_back(down);
            state.key_reports.push_back(vec![false; 15]);
        }

        let (_, on_disconnect) = counter();
        let (_, on_reconnect) = counter();
        manager.start_monitoring(on_disconnect, on_reconnect);

        assert!(wait_for(Duration::from_secs(2), || events.lock().len() == 2).await);
        assert_eq!(*events.lock(), vec![(3, true), (3, false)]);

        manager.stop_monitoring().await;
    }
}

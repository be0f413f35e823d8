//! In-memory panel for exercising the daemon without hardware.

use decky_hw::{DeckDevice, DeckKind, DeviceProvider, Error, KeyImage, Result, Rotation};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observable state shared by a fake panel and its provider.
#[derive(Debug, Default)]
pub struct FakeState {
    /// Whether the panel is attached.
    pub plugged: bool,
    /// Fail opens with a permission error.
    pub deny_access: bool,
    /// Last image pushed per key.
    pub images: HashMap<usize, KeyImage>,
    /// Every key push in order.
    pub pushes: Vec<usize>,
    pub brightness: u8,
    pub rotation: Rotation,
    pub resets: usize,
    /// Key reports returned by successive reads.
    pub key_reports: VecDeque<Vec<bool>>,
    /// Keys whose image uploads are rejected while the panel stays attached.
    pub failing_keys: HashSet<usize>,
}

pub type SharedState = Arc<Mutex<FakeState>>;

/// Panel backed by [`FakeState`].
pub struct FakeDeck {
    kind: DeckKind,
    state: SharedState,
}

impl FakeDeck {
    pub fn new(kind: DeckKind, state: SharedState) -> Self {
        Self { kind, state }
    }

    fn check_plugged(&self) -> Result<()> {
        if self.state.lock().plugged {
            Ok(())
        } else {
            Err(Error::Disconnected)
        }
    }
}

impl DeckDevice for FakeDeck {
    fn kind(&self) -> DeckKind {
        self.kind
    }

    fn serial(&self) -> &str {
        "FAKE0001"
    }

    fn brightness(&self) -> u8 {
        self.state.lock().brightness
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        self.check_plugged()?;
        if percent > 100 {
            return Err(Error::InvalidBrightness(percent));
        }
        self.state.lock().brightness = percent;
        Ok(())
    }

    fn set_rotation(&mut self, rotation: Rotation) {
        self.state.lock().rotation = rotation;
    }

    fn set_key_image(&mut self, key: usize, image: &KeyImage) -> Result<()> {
        self.check_plugged()?;
        let mut state = self.state.lock();
        if key >= self.kind.key_count() || state.failing_keys.contains(&key) {
            return Err(Error::InvalidKey {
                key,
                count: self.kind.key_count(),
            });
        }
        state.images.insert(key, image.clone());
        state.pushes.push(key);
        Ok(())
    }

    fn read_key_states(&mut self, timeout: Duration) -> Result<Option<Vec<bool>>> {
        self.check_plugged()?;
        let report = self.state.lock().key_reports.pop_front();
        if report.is_none() {
            std::thread::sleep(timeout);
        }
        Ok(report)
    }

    fn probe(&mut self) -> Result<()> {
        self.check_plugged()
    }

    fn reset(&mut self) -> Result<()> {
        self.check_plugged()?;
        self.state.lock().resets += 1;
        Ok(())
    }
}

/// Provider handing out [`FakeDeck`]s while the shared state says plugged.
pub struct FakeProvider {
    pub kind: DeckKind,
    pub state: SharedState,
    attempts: AtomicUsize,
}

impl FakeProvider {
    pub fn new(kind: DeckKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(FakeState {
                plugged: true,
                brightness: 100,
                ..Default::default()
            })),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of open attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_plugged(&self, plugged: bool) {
        self.state.lock().plugged = plugged;
    }
}

impl DeviceProvider for FakeProvider {
    fn open_first(&self) -> Result<Box<dyn DeckDevice>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.deny_access {
            return Err(Error::PermissionDenied {
                path: "/dev/hidraw-fake".to_string(),
            });
        }
        if !state.plugged {
            return Err(Error::DeviceNotFound);
        }
        drop(state);
        Ok(Box::new(FakeDeck::new(self.kind, self.state.clone())))
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// elapses.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

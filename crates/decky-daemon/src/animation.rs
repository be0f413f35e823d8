//! Per-key frame animation.
//!
//! Frames are decoded up front when a page becomes active. The engine is
//! driven by an external tick and only reports which keys changed; turning
//! a frame into a key bitmap is the page manager's job.

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Duration used for frames that declare none.
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(100);

/// Errors raised while preparing an animation.
#[derive(Error, Debug)]
pub enum AnimationError {
    /// The animation bytes could not be decoded.
    #[error("cannot decode animation {name}: {reason}")]
    Decode { name: String, reason: String },

    /// The source decoded but has nothing to show.
    #[error("animation {0} has no frames")]
    NoFrames(String),

    /// The source has a single frame and is shown as a still icon.
    #[error("animation {0} has a single frame")]
    SingleFrame(String),
}

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub duration: Duration,
}

/// Playback state of one animated key.
#[derive(Debug)]
pub struct AnimationState {
    frames: Vec<Frame>,
    current: usize,
    last_advance: Instant,
    looping: bool,
}

impl AnimationState {
    /// Starts at frame 0. Fewer than two frames are rejected.
    pub fn new(frames: Vec<Frame>, looping: bool, now: Instant) -> Option<Self> {
        if frames.len() < 2 {
            return None;
        }
        Some(Self {
            frames,
            current: 0,
            last_advance: now,
            looping,
        })
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn last_advance(&self) -> Instant {
        self.last_advance
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    /// Advances one frame if the current one has been shown long enough.
    fn advance(&mut self, now: Instant) -> bool {
        let due = now.saturating_duration_since(self.last_advance) >= self.current_frame().duration;
        if !due {
            return false;
        }
        let next = if self.current + 1 < self.frames.len() {
            self.current + 1
        } else if self.looping {
            0
        } else {
            // Parked on the final frame
            return false;
        };
        self.current = next;
        self.last_advance = now;
        true
    }

    fn restart(&mut self, now: Instant) {
        self.current = 0;
        self.last_advance = now;
    }
}

/// Tracks every animated key of the active page.
#[derive(Debug, Default)]
pub struct AnimationEngine {
    animations: BTreeMap<usize, AnimationState>,
}

impl AnimationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `key`. Fails when `frames` has fewer than two
    /// frames, leaving any previous state for the key untouched.
    pub fn setup_animated_button(
        &mut self,
        key: usize,
        name: &str,
        frames: Vec<Frame>,
        looping: bool,
        now: Instant,
    ) -> Result<(), AnimationError> {
        let count = frames.len();
        let state = AnimationState::new(frames, looping, now).ok_or_else(|| match count {
            0 => AnimationError::NoFrames(name.to_string()),
            _ => AnimationError::SingleFrame(name.to_string()),
        })?;
        self.animations.insert(key, state);
        Ok(())
    }

    /// Whether `key` is animated.
    pub fn is_animated(&self, key: usize) -> bool {
        self.animations.contains_key(&key)
    }

    /// Playback state for `key`.
    pub fn state(&self, key: usize) -> Option<&AnimationState> {
        self.animations.get(&key)
    }

    /// Frame currently shown on `key`.
    pub fn current_frame(&self, key: usize) -> Option<&Frame> {
        self.animations.get(&key).map(AnimationState::current_frame)
    }

    /// Advances every animation that is due and returns the keys that changed.
    pub fn update_animations(&mut self, now: Instant) -> BTreeSet<usize> {
        self.animations
            .iter_mut()
            .filter_map(|(&key, state)| state.advance(now).then_some(key))
            .collect()
    }

    /// Restarts every animation at frame 0 with the same timestamp.
    pub fn synchronize_animations(&mut self, now: Instant) {
        for state in self.animations.values_mut() {
            state.restart(now);
        }
    }

    /// Drops all animation state.
    pub fn clear(&mut self) {
        self.animations.clear();
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }
}

/// Decodes a GIF into frames with their display durations.
pub fn decode_gif(name: &str, bytes: &[u8]) -> Result<Vec<Frame>, AnimationError> {
    let decode_err = |e: image::ImageError| AnimationError::Decode {
        name: name.to_string(),
        reason: e.to_string(),
    };

    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode_err)?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(decode_err)?;

    let frames: Vec<Frame> = frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let millis = if denom == 0 { 0 } else { numer / denom };
            let duration = if millis == 0 {
                DEFAULT_FRAME_DURATION
            } else {
                Duration::from_millis(u64::from(millis))
            };
            Frame {
                image: frame.into_buffer(),
                duration,
            }
        })
        .collect();

    if frames.is_empty() {
        return Err(AnimationError::NoFrames(name.to_string()));
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::Delay;

    fn frames(count: usize, millis: u64) -> Vec<Frame> {
        (0..count)
            .map(|i| Frame {
                image: RgbaImage::from_pixel(4, 4, image::Rgba([i as u8 * 40, 0, 0, 255])),
                duration: Duration::from_millis(millis),
            })
            .collect()
    }

    #[test]
    fn test_four_frames_after_250ms() {
        let start = Instant::now();
        let mut engine = AnimationEngine::new();
        engine
            .setup_animated_button(3, "spin", frames(4, 100), true, start)
            .unwrap();

        let mut advanced = 0;
        for tick in 1..=5 {
            let now = start + Duration::from_millis(50 * tick);
            advanced += engine.update_animations(now).len();
        }

        assert_eq!(advanced, 2);
        assert_eq!(engine.state(3).unwrap().current_index(), 2);
    }

    #[test]
    fn test_loop_wraps_and_clamp_stops() {
        let start = Instant::now();
        let mut engine = AnimationEngine::new();
        engine
            .setup_animated_button(0, "loop", frames(2, 10), true, start)
            .unwrap();
        engine
            .setup_animated_button(1, "once", frames(2, 10), false, start)
            .unwrap();

        let t1 = start + Duration::from_millis(10);
        assert_eq!(engine.update_animations(t1), BTreeSet::from([0, 1]));

        let t2 = t1 + Duration::from_millis(10);
        // Only the looping key changes
        assert_eq!(engine.update_animations(t2), BTreeSet::from([0]));
        assert_eq!(engine.state(0).unwrap().current_index(), 0);
        assert_eq!(engine.state(1).unwrap().current_index(), 1);
    }

    #[test]
    fn test_index_stays_in_range() {
        let start = Instant::now();
        let mut engine = AnimationEngine::new();
        engine
            .setup_animated_button(0, "a", frames(3, 7), true, start)
            .unwrap();
        for ms in (0..500).step_by(3) {
            engine.update_animations(start + Duration::from_millis(ms));
            let state = engine.state(0).unwrap();
            assert!(state.current_index() < state.frame_count());
        }
    }

    #[test]
    fn test_synchronize() {
        let start = Instant::now();
        let mut engine = AnimationEngine::new();
        engine
            .setup_animated_button(0, "a", frames(4, 10), true, start)
            .unwrap();
        engine
            .setup_animated_button(5, "b", frames(3, 30), true, start)
            .unwrap();
        engine.update_animations(start + Duration::from_millis(40));

        let sync = start + Duration::from_millis(45);
        engine.synchronize_animations(sync);
        for key in [0, 5] {
            let state = engine.state(key).unwrap();
            assert_eq!(state.current_index(), 0);
            assert_eq!(state.last_advance(), sync);
        }
    }

    #[test]
    fn test_empty_frames_rejected() {
        let mut engine = AnimationEngine::new();
        let err = engine
            .setup_animated_button(0, "none", Vec::new(), true, Instant::now())
            .unwrap_err();
        assert!(matches!(err, AnimationError::NoFrames(_)));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_single_frame_is_not_animated() {
        let start = Instant::now();
        let mut engine = AnimationEngine::new();
        let err = engine
            .setup_animated_button(2, "still", frames(1, 10), true, start)
            .unwrap_err();
        assert!(matches!(err, AnimationError::SingleFrame(_)));
        assert!(!engine.is_animated(2));
        assert!(engine
            .update_animations(start + Duration::from_secs(1))
            .is_empty());
    }

    #[test]
    fn test_clear() {
        let mut engine = AnimationEngine::new();
        engine
            .setup_animated_button(0, "a", frames(2, 10), true, Instant::now())
            .unwrap();
        engine.clear();
        assert!(engine.current_frame(0).is_none());
    }

    #[test]
    fn test_decode_gif() {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let gif_frames = (0..3).map(|i| {
                image::Frame::from_parts(
                    RgbaImage::from_pixel(8, 8, image::Rgba([0, i * 80, 0, 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(if i == 1 { 0 } else { 50 }, 1),
                )
            });
            encoder.encode_frames(gif_frames).unwrap();
        }

        let frames = decode_gif("test.gif", &bytes).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].duration, Duration::from_millis(50));
        assert_eq!(frames[1].duration, DEFAULT_FRAME_DURATION);
        assert_eq!(frames[0].image.dimensions(), (8, 8));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_gif("bad.gif", b"GIF89a nope"),
            Err(AnimationError::Decode { .. })
        ));
    }
}

//! Key image rotation.
//!
//! The panel has no rotation command; rotation is applied in software to
//! every image before it is handed to the driver, which adds the model's
//! native mounting flip.

use crate::{Error, Result};
use std::str::FromStr;

/// Clockwise rotation applied to key images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Rot0,
    Rot90,
    Rot180,
    Rot270,
}

impl Rotation {
    /// Rotation in degrees.
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Rot0 => 0,
            Rotation::Rot90 => 90,
            Rotation::Rot180 => 180,
            Rotation::Rot270 => 270,
        }
    }

    /// Rotate a square row-major buffer of `size * size` pixels.
    pub fn apply<T: Copy>(&self, buffer: &[T], size: usize) -> Vec<T> {
        match self {
            Rotation::Rot0 => buffer.to_vec(),
            // 180° on a row-major buffer is a plain reversal
            Rotation::Rot180 => buffer.iter().rev().copied().collect(),
            Rotation::Rot90 | Rotation::Rot270 => {
                let mut out = buffer.to_vec();
                for y in 0..size {
                    for x in 0..size {
                        let (sx, sy) = if *self == Rotation::Rot90 {
                            (y, size - 1 - x)
                        } else {
                            (size - 1 - y, x)
                        };
                        out[y * size + x] = buffer[sy * size + sx];
                    }
                }
                out
            }
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = Error;

    fn try_from(degrees: u16) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Rot0),
            90 => Ok(Rotation::Rot90),
            180 => Ok(Rotation::Rot180),
            270 => Ok(Rotation::Rot270),
            other => Err(Error::InvalidRotation(other.to_string())),
        }
    }
}

impl FromStr for Rotation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u16>()
            .map_err(|_| Error::InvalidRotation(s.to_string()))
            .and_then(Rotation::try_from)
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("0".parse::<Rotation>().unwrap(), Rotation::Rot0);
        assert_eq!("270".parse::<Rotation>().unwrap(), Rotation::Rot270);
        assert!("45".parse::<Rotation>().is_err());
        assert!("upside".parse::<Rotation>().is_err());
    }

    #[test]
    fn test_apply() {
        // 0 1
        // 2 3
        let buf = [0, 1, 2, 3];
        assert_eq!(Rotation::Rot0.apply(&buf, 2), vec![0, 1, 2, 3]);
        assert_eq!(Rotation::Rot180.apply(&buf, 2), vec![3, 2, 1, 0]);
        assert_eq!(Rotation::Rot90.apply(&buf, 2), vec![2, 0, 3, 1]);
        assert_eq!(Rotation::Rot270.apply(&buf, 2), vec![1, 3, 0, 2]);
    }
}

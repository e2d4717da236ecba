//! The open palm rule.
//!
//! A finger counts as *extended* when its tip lies strictly above its PIP joint in the image
//! (smaller Y). The hand is *open* when all four non-thumb fingers are extended. The thumb never
//! takes part in the decision.
//!
//! The comparison is axis-aligned in image space, so it assumes an upright hand facing the camera.
//! Sideways or upside-down hands can produce wrong verdicts.

use std::fmt;

use super::landmark::{Hand, Landmark, LandmarkIdx, NUM_LANDMARKS};

/// Number of extended fingers required for a hand to be considered open.
pub const OPEN_THRESHOLD: usize = 4;

/// The fingers taking part in the open palm rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 4] = [Finger::Index, Finger::Middle, Finger::Ring, Finger::Pinky];

    pub fn tip(self) -> LandmarkIdx {
        match self {
            Finger::Index => LandmarkIdx::IndexFingerTip,
            Finger::Middle => LandmarkIdx::MiddleFingerTip,
            Finger::Ring => LandmarkIdx::RingFingerTip,
            Finger::Pinky => LandmarkIdx::PinkyTip,
        }
    }

    pub fn pip(self) -> LandmarkIdx {
        match self {
            Finger::Index => LandmarkIdx::IndexFingerPip,
            Finger::Middle => LandmarkIdx::MiddleFingerPip,
            Finger::Ring => LandmarkIdx::RingFingerPip,
            Finger::Pinky => LandmarkIdx::PinkyPip,
        }
    }

    fn is_extended(self, landmarks: &[Landmark]) -> bool {
        landmarks[self.tip() as usize].y < landmarks[self.pip() as usize].y
    }
}

/// Per-finger extension state of a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Openness {
    extended: [bool; 4],
}

impl Openness {
    pub fn of(hand: &Hand) -> Self {
        Self::from_slice(hand.landmarks())
    }

    /// `landmarks` must hold at least [`NUM_LANDMARKS`] entries.
    fn from_slice(landmarks: &[Landmark]) -> Self {
        Self {
            extended: Finger::ALL.map(|finger| finger.is_extended(landmarks)),
        }
    }

    pub fn is_extended(&self, finger: Finger) -> bool {
        self.extended[finger as usize]
    }

    pub fn extended_fingers(&self) -> impl Iterator<Item = Finger> + '_ {
        Finger::ALL
            .into_iter()
            .filter(|finger| self.is_extended(*finger))
    }

    /// Returns the number of extended non-thumb fingers.
    pub fn count(&self) -> usize {
        self.extended.iter().filter(|e| **e).count()
    }

    pub fn is_open(&self) -> bool {
        self.count() >= OPEN_THRESHOLD
    }
}

impl fmt::Display for Openness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/4 extended", self.count())?;
        let mut fingers = self.extended_fingers().peekable();
        if fingers.peek().is_some() {
            f.write_str(" (")?;
            for (i, finger) in fingers.enumerate() {
                if i != 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{finger:?}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Returns whether `hand` is an open palm.
pub fn is_open(hand: &Hand) -> bool {
    Openness::of(hand).is_open()
}

/// Returns whether `landmarks` describe an open palm.
///
/// Fails closed: fewer than [`NUM_LANDMARKS`] landmarks always yield `false`. Extra landmarks past
/// the standard 21 are ignored.
pub fn is_open_landmarks(landmarks: &[Landmark]) -> bool {
    if landmarks.len() < NUM_LANDMARKS {
        return false;
    }
    Openness::from_slice(landmarks).is_open()
}

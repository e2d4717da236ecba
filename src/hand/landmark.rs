//! Hand landmark types.

use nalgebra::{Point2, Rotation2, Vector2};

/// Number of landmarks making up a [`Hand`].
pub const NUM_LANDMARKS: usize = 21;

/// A landmark position, normalized to the size of the image it was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    /// Horizontal position; `0.0` is the left image edge, `1.0` the right one.
    pub x: f32,
    /// Vertical position; `0.0` is the top image edge, `1.0` the bottom one.
    pub y: f32,
    /// Relative depth, `0.0` if the provider does not estimate depth.
    pub z: f32,
}

impl Landmark {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    #[inline]
    pub fn with_z(self, z: f32) -> Self {
        Self { z, ..self }
    }

    /// Converts the normalized position to pixel coordinates in an image of the given size.
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        (
            (self.x * width as f32) as i32,
            (self.y * height as f32) as i32,
        )
    }
}

/// Error returned when building a [`Hand`] from the wrong number of landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a hand needs exactly 21 landmarks, got {0}")]
pub struct MalformedHand(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// A single detected hand.
///
/// Holds the 21 landmarks in the order given by [`LandmarkIdx`]. A `Hand` is produced fresh by
/// every detection and carries no identity across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [Landmark; NUM_LANDMARKS],
    presence: f32,
    handedness: Option<Handedness>,
}

impl Hand {
    /// Creates a hand from exactly [`NUM_LANDMARKS`] landmarks.
    pub fn from_landmarks<I>(landmarks: I) -> Result<Self, MalformedHand>
    where
        I: IntoIterator<Item = Landmark>,
    {
        let landmarks: Vec<Landmark> = landmarks.into_iter().collect();
        let landmarks: [Landmark; NUM_LANDMARKS] = landmarks
            .try_into()
            .map_err(|rejected: Vec<Landmark>| MalformedHand(rejected.len()))?;

        Ok(Self {
            landmarks,
            presence: 1.0,
            handedness: None,
        })
    }

    /// Sets the provider's confidence that a hand is present, between 0.0 and 1.0.
    pub fn with_presence(self, presence: f32) -> Self {
        Self { presence, ..self }
    }

    pub fn with_handedness(self, handedness: Handedness) -> Self {
        Self {
            handedness: Some(handedness),
            ..self
        }
    }

    #[inline]
    pub fn landmark(&self, idx: LandmarkIdx) -> Landmark {
        self.landmarks[idx as usize]
    }

    #[inline]
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn landmark_mut(&mut self, idx: LandmarkIdx) -> &mut Landmark {
        &mut self.landmarks[idx as usize]
    }

    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }

    #[inline]
    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that fingers are pointed upwards. This is only meaningful for
    /// images with square pixels and roughly square aspect ratio, since the landmarks are
    /// normalized per axis.
    pub fn rotation_radians(&self) -> f32 {
        let p = self.landmark(LandmarkIdx::MiddleFingerMcp);
        let finger = Point2::new(p.x, p.y);
        let p = self.landmark(LandmarkIdx::Wrist);
        let wrist = Point2::new(p.x, p.y);

        let rel = wrist - finger;
        Rotation2::rotation_between(&Vector2::y(), &rel).angle()
    }
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// The landmarks belonging to the thumb.
    pub const THUMB: [LandmarkIdx; 4] = [
        LandmarkIdx::ThumbCmc,
        LandmarkIdx::ThumbMcp,
        LandmarkIdx::ThumbIp,
        LandmarkIdx::ThumbTip,
    ];
}

/// Pairs of landmarks connected by a bone, used to draw the hand skeleton.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

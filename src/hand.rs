//! Hand landmarks and the open palm rule.
//!
//! TODO:
//!
//! - the openness rule compares raw image Y coordinates and misjudges hands that are not upright;
//!   [`Hand::rotation_radians`] could be used to rotate the landmarks before comparing.

pub mod landmark;
pub mod openness;

pub use landmark::{Hand, Handedness, Landmark, LandmarkIdx, MalformedHand};
pub use openness::{is_open, is_open_landmarks, Finger, Openness};

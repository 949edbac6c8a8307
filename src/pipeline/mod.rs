//! The real-time response pipeline: segmentation, ordered playback and the
//! interaction state machine that drives them.

pub mod controller;
pub mod messages;
pub mod playback;
pub mod segmenter;

//! Frames handed to the monitor: the camera image (when available) plus the poses the
//! landmark extractor found in it. Both producers live outside this crate; the replay
//! source stands in for them.

mod replay;

pub use replay::ReplaySource;

use anyhow::Result;
use image::RgbImage;

use crate::posture::LandmarkSet;

#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub image: Option<RgbImage>,
    pub poses: Vec<LandmarkSet>,
}

pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

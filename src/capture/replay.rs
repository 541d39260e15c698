use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use super::{CapturedFrame, FrameSource};
use crate::posture::LandmarkSet;

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "replay";

use crate::{log_info, log_warn};

#[derive(Debug, Deserialize)]
struct FeedRecord {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    image_path: Option<PathBuf>,
    #[serde(default)]
    poses: Vec<LandmarkSet>,
}

/// Replays a JSON-lines landmark feed, one frame per line:
/// `{"width":320,"height":240,"image_path":"f0001.jpg","poses":[[[x,y,z], ...]]}`.
///
/// Relative image paths resolve against the feed's directory. Lines without a size use the
/// configured frame size. Lines that fail to parse are skipped with a warning; an image that
/// fails to load leaves the frame without one.
pub struct ReplaySource<R: BufRead + Send> {
    lines: std::io::Lines<R>,
    base_dir: Option<PathBuf>,
    line_no: usize,
    frame_size: (u32, u32),
}

const DEFAULT_FRAME_SIZE: (u32, u32) = (320, 240);

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open landmark feed {}", path.display()))?;
        log_info!("replaying landmark feed {}", path.display());
        Ok(Self {
            lines: BufReader::new(file).lines(),
            base_dir: path.parent().map(Path::to_path_buf),
            line_no: 0,
            frame_size: DEFAULT_FRAME_SIZE,
        })
    }
}

impl<R: BufRead + Send> ReplaySource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            base_dir: None,
            line_no: 0,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }

    /// Size assumed for lines that do not carry one.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    fn load_image(&self, path: &Path) -> Option<image::RgbImage> {
        let resolved = match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        match image::open(&resolved) {
            Ok(img) => Some(img.to_rgb8()),
            Err(err) => {
                log_warn!("line {}: image {} unreadable: {err}", self.line_no, resolved.display());
                None
            }
        }
    }
}

impl<R: BufRead + Send> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.context("Failed to read landmark feed")?;
            if line.trim().is_empty() {
                continue;
            }

            let record: FeedRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(err) => {
                    log_warn!("line {}: skipping malformed frame: {err}", self.line_no);
                    continue;
                }
            };

            let image = record
                .image_path
                .as_deref()
                .and_then(|path| self.load_image(path));

            return Ok(Some(CapturedFrame {
                width: record.width.unwrap_or(self.frame_size.0),
                height: record.height.unwrap_or(self.frame_size.1),
                image,
                poses: record.poses,
            }));
        }
    }
}

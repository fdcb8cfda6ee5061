//! Frame source that replays still images from a directory, in file name
//! order. Used for offline runs and demos without a camera.

use image::RgbImage;
use rollcall_core::{CaptureError, FrameSource};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub struct ImageDirectorySource {
    pending: VecDeque<PathBuf>,
}

impl ImageDirectorySource {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_frame(p))
            .collect();
        paths.sort();

        tracing::info!(dir = %dir.display(), frames = paths.len(), "opened replay source");
        Ok(Self {
            pending: paths.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FRAME_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

impl FrameSource for ImageDirectorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .map_err(|e| CaptureError::Failed(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "replaying frame");
        Ok(Some(image.to_rgb8()))
    }
}

//! In-memory stand-ins for the external collaborators, shared by unit tests.

use crate::capabilities::{
    Account, AccountLookup, CaptureError, EncoderError, FaceEncoder, FrameSource, LookupError,
};
use crate::log_store::{AttendanceLogStore, LogError};
use crate::record::AttendanceRecord;
use crate::types::{BoundingBox, Embedding};
use chrono::{NaiveDate, NaiveDateTime};
use image::{Rgb, RgbImage};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

pub fn fixed_clock() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 14)
        .unwrap()
        .and_hms_opt(9, 26, 53)
        .unwrap()
}

/// A 10×10 face at `(x, 20)` with the given embedding.
pub fn face(x: f32, values: Vec<f32>) -> (BoundingBox, Embedding) {
    let bbox = BoundingBox {
        x,
        y: 20.0,
        width: 10.0,
        height: 10.0,
        confidence: 0.9,
    };
    (bbox, Embedding::new(values))
}

/// Save a uniformly colored 8×8 PNG, creating parent directories.
pub fn write_photo(path: &Path, rgb: [u8; 3]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(8, 8, Rgb(rgb)).save(path).unwrap();
}

/// Sees a face wherever the red channel is non-zero; the embedding is the
/// normalized color under the box origin.
pub struct ColorEncoder;

impl FaceEncoder for ColorEncoder {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        if image.get_pixel(0, 0)[0] == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: image.width() as f32,
            height: image.height() as f32,
            confidence: 1.0,
        }])
    }

    fn encode(
        &mut self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncoderError> {
        Ok(boxes
            .iter()
            .map(|b| {
                let px = image.get_pixel(b.x as u32, b.y as u32);
                Embedding::new(px.0.iter().map(|&c| c as f32 / 255.0).collect())
            })
            .collect())
    }
}

/// Replays a fixed list of detections, one list per `detect_faces` call.
/// Fails once the script is exhausted.
pub struct ScriptedEncoder {
    script: VecDeque<Vec<(BoundingBox, Embedding)>>,
    current: Vec<Embedding>,
    pub drop_embeddings: bool,
}

impl ScriptedEncoder {
    pub fn new(script: Vec<Vec<(BoundingBox, Embedding)>>) -> Self {
        Self {
            script: script.into(),
            current: Vec::new(),
            drop_embeddings: false,
        }
    }
}

impl FaceEncoder for ScriptedEncoder {
    fn detect_faces(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        let faces = self
            .script
            .pop_front()
            .ok_or_else(|| EncoderError("script exhausted".into()))?;
        let (boxes, embeddings): (Vec<_>, Vec<_>) = faces.into_iter().unzip();
        self.current = embeddings;
        Ok(boxes)
    }

    fn encode(
        &mut self,
        _image: &RgbImage,
        _boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncoderError> {
        if self.drop_embeddings {
            return Ok(Vec::new());
        }
        Ok(std::mem::take(&mut self.current))
    }
}

#[derive(Default)]
pub struct MapAccounts {
    names: HashMap<String, String>,
    fail: bool,
}

impl MapAccounts {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        Self {
            names: entries
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl AccountLookup for MapAccounts {
    fn get_user_by_id(&self, user_id: &str) -> Result<Option<Account>, LookupError> {
        if self.fail {
            return Err(LookupError("account store offline".into()));
        }
        Ok(self.names.get(user_id).map(|name| Account {
            user_id: user_id.to_string(),
            display_name: name.clone(),
        }))
    }
}

#[derive(Default)]
pub struct MemoryLogStore {
    logs: RefCell<HashMap<NaiveDate, Vec<AttendanceRecord>>>,
    writes: Cell<usize>,
    fail: bool,
}

impl MemoryLogStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl AttendanceLogStore for MemoryLogStore {
    fn read(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LogError> {
        Ok(self.logs.borrow().get(&date).cloned().unwrap_or_default())
    }

    fn write(&self, date: NaiveDate, records: &[AttendanceRecord]) -> Result<(), LogError> {
        if self.fail {
            return Err(LogError::Io {
                path: "memory".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.writes.set(self.writes.get() + 1);
        self.logs.borrow_mut().insert(date, records.to_vec());
        Ok(())
    }

    fn dates(&self) -> Result<Vec<NaiveDate>, LogError> {
        let mut dates: Vec<NaiveDate> = self.logs.borrow().keys().copied().collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}

/// Frames from memory, optionally failing once they run out.
pub struct VecSource {
    frames: VecDeque<RgbImage>,
    fail_when_empty: bool,
    released: Option<Rc<Cell<bool>>>,
}

impl VecSource {
    pub fn blank(count: usize) -> Self {
        Self {
            frames: (0..count).map(|_| RgbImage::new(64, 64)).collect(),
            fail_when_empty: false,
            released: None,
        }
    }

    pub fn failing_after(mut self) -> Self {
        self.fail_when_empty = true;
        self
    }

    pub fn on_drop(mut self, flag: Rc<Cell<bool>>) -> Self {
        self.released = Some(flag);
        self
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.fail_when_empty => Err(CaptureError::Failed("device unplugged".into())),
            None => Ok(None),
        }
    }
}

impl Drop for VecSource {
    fn drop(&mut self) {
        if let Some(flag) = &self.released {
            flag.set(true);
        }
    }
}

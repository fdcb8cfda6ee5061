use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Values as they appear in the TOML file. Unset paths are derived from
/// `data_dir` when the config is resolved.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    enrollment_dir: Option<PathBuf>,
    database_path: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    users_file: Option<PathBuf>,
    camera_device: Option<String>,
    camera_width: Option<u32>,
    camera_height: Option<u32>,
    model_dir: Option<PathBuf>,
    detector_model: Option<String>,
    recognizer_model: Option<String>,
    tolerance: Option<f32>,
    embedding_dim: Option<usize>,
    recognizer_input_size: Option<u32>,
    detector_confidence: Option<f32>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// One sub-directory of photos per user.
    pub enrollment_dir: PathBuf,
    /// Embedding database snapshot.
    pub database_path: PathBuf,
    /// Directory of daily attendance CSV files.
    pub log_dir: PathBuf,
    /// Flat user file used for display names.
    pub users_file: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub recognizer_model: String,
    /// Euclidean distance below which a face matches. The recognizer
    /// L2-normalizes embeddings, so a distance `d` corresponds to cosine
    /// similarity `1 - d²/2`: the default 0.5 requires cosine above 0.875.
    /// Tune it to the embedding model in use.
    pub tolerance: f32,
    pub embedding_dim: usize,
    pub recognizer_input_size: u32,
    pub detector_confidence: f32,
}

impl Config {
    /// Load from `path` (or `ROLLCALL_CONFIG`) if given, then apply
    /// `ROLLCALL_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from));
        let file = match &path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(mut file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        apply_env(&mut file, &env);

        let data_dir = file.data_dir.unwrap_or_else(|| PathBuf::from("data"));
        let config = Self {
            enrollment_dir: file.enrollment_dir.unwrap_or_else(|| data_dir.join("faces")),
            database_path: file
                .database_path
                .unwrap_or_else(|| data_dir.join("model").join("face_encodings.json")),
            log_dir: file.log_dir.unwrap_or_else(|| data_dir.join("attendance_logs")),
            users_file: file.users_file.unwrap_or_else(|| data_dir.join("users.csv")),
            data_dir,
            camera_device: file
                .camera_device
                .unwrap_or_else(|| "/dev/video0".to_string()),
            camera_width: file.camera_width.unwrap_or(640),
            camera_height: file.camera_height.unwrap_or(480),
            model_dir: file.model_dir.unwrap_or_else(|| PathBuf::from("models")),
            detector_model: file
                .detector_model
                .unwrap_or_else(|| "det_500m.onnx".to_string()),
            recognizer_model: file
                .recognizer_model
                .unwrap_or_else(|| "face_embed.onnx".to_string()),
            tolerance: file.tolerance.unwrap_or(rollcall_core::DEFAULT_TOLERANCE),
            embedding_dim: file.embedding_dim.unwrap_or(128),
            recognizer_input_size: file.recognizer_input_size.unwrap_or(112),
            detector_confidence: file.detector_confidence.unwrap_or(0.5),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            bail!("tolerance must be a positive number, got {}", self.tolerance);
        }
        if self.embedding_dim == 0 {
            bail!("embedding_dim must be at least 1");
        }
        if self.recognizer_input_size == 0 {
            bail!("recognizer_input_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.detector_confidence) {
            bail!(
                "detector_confidence must be within 0..=1, got {}",
                self.detector_confidence
            );
        }
        Ok(())
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }
}

fn apply_env(file: &mut FileConfig, env: &impl Fn(&str) -> Option<String>) {
    let path = |key: &str| env(key).map(PathBuf::from);
    file.data_dir = path("ROLLCALL_DATA_DIR").or(file.data_dir.take());
    file.enrollment_dir = path("ROLLCALL_ENROLLMENT_DIR").or(file.enrollment_dir.take());
    file.database_path = path("ROLLCALL_DATABASE_PATH").or(file.database_path.take());
    file.log_dir = path("ROLLCALL_LOG_DIR").or(file.log_dir.take());
    file.users_file = path("ROLLCALL_USERS_FILE").or(file.users_file.take());
    file.model_dir = path("ROLLCALL_MODEL_DIR").or(file.model_dir.take());
    file.camera_device = env("ROLLCALL_CAMERA_DEVICE").or(file.camera_device.take());
    file.detector_model = env("ROLLCALL_DETECTOR_MODEL").or(file.detector_model.take());
    file.recognizer_model = env("ROLLCALL_RECOGNIZER_MODEL").or(file.recognizer_model.take());

    file.camera_width = env_parse(env, "ROLLCALL_CAMERA_WIDTH").or(file.camera_width);
    file.camera_height = env_parse(env, "ROLLCALL_CAMERA_HEIGHT").or(file.camera_height);
    file.tolerance = env_parse(env, "ROLLCALL_TOLERANCE").or(file.tolerance);
    file.embedding_dim = env_parse(env, "ROLLCALL_EMBEDDING_DIM").or(file.embedding_dim);
    file.recognizer_input_size =
        env_parse(env, "ROLLCALL_RECOGNIZER_INPUT_SIZE").or(file.recognizer_input_size);
    file.detector_confidence =
        env_parse(env, "ROLLCALL_DETECTOR_CONFIDENCE").or(file.detector_confidence);
}

/// Parse a numeric override; unparsable values are ignored with a warning.
fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::PipelineError;
use crate::util::ensure_directory;

pub const CREDENTIAL_ENV_VAR: &str = "GEMINI_GIGA";

/// Process configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub model_id: String,
    pub output_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env(model_id: &str, output_dir: &Path) -> Result<Self> {
        let api_key = env::var(CREDENTIAL_ENV_VAR)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or(PipelineError::MissingCredential)?;

        ensure_directory(output_dir)?;

        Ok(Self {
            api_key,
            model_id: model_id.to_string(),
            output_dir: output_dir.to_path_buf(),
        })
    }
}

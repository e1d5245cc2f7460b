use std::{fs, path::PathBuf};

use genai_client::{GeminiConfig, DEFAULT_BASE_URL, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use media_capture::SimulatedPresence;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub image_model: String,
    pub text_model: String,
    pub presence_probability: f64,
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: DEFAULT_BASE_URL.into(),
            image_model: DEFAULT_IMAGE_MODEL.into(),
            text_model: DEFAULT_TEXT_MODEL.into(),
            presence_probability: SimulatedPresence::DEFAULT_PROBABILITY,
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl Settings {
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.gemini_api_key.clone().unwrap_or_default(),
            base_url: self.gemini_base_url.clone(),
            image_model: self.image_model.clone(),
            text_model: self.text_model.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    gemini_api_key: Option<String>,
    gemini_base_url: Option<String>,
    image_model: Option<String>,
    text_model: Option<String>,
    presence_probability: Option<f64>,
    output_dir: Option<PathBuf>,
}

pub fn load_settings(config_path: &std::path::Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("config: ignoring unreadable settings file err={err}");
            return;
        }
    };

    if let Some(v) = file_cfg.gemini_api_key {
        settings.gemini_api_key = Some(v);
    }
    if let Some(v) = file_cfg.gemini_base_url {
        settings.gemini_base_url = v;
    }
    if let Some(v) = file_cfg.image_model {
        settings.image_model = v;
    }
    if let Some(v) = file_cfg.text_model {
        settings.text_model = v;
    }
    if let Some(v) = file_cfg.presence_probability {
        settings.presence_probability = v;
    }
    if let Some(v) = file_cfg.output_dir {
        settings.output_dir = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("GEMINI_API_KEY") {
        settings.gemini_api_key = Some(v);
    }
    if let Some(v) = var("APP__GEMINI_API_KEY") {
        settings.gemini_api_key = Some(v);
    }

    if let Some(v) = var("APP__GEMINI_BASE_URL") {
        settings.gemini_base_url = v;
    }
    if let Some(v) = var("APP__IMAGE_MODEL") {
        settings.image_model = v;
    }
    if let Some(v) = var("APP__TEXT_MODEL") {
        settings.text_model = v;
    }

    if let Some(v) = var("APP__PRESENCE_PROBABILITY") {
        match v.parse::<f64>() {
            Ok(parsed) => settings.presence_probability = parsed,
            Err(_) => warn!("config: ignoring APP__PRESENCE_PROBABILITY value={v}"),
        }
    }

    if let Some(v) = var("APP__OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(v);
    }

    if settings
        .gemini_api_key
        .as_deref()
        .is_some_and(|key| key.trim().is_empty())
    {
        settings.gemini_api_key = None;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

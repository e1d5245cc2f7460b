use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use shared::{
    domain::SizeTier,
    protocol::{
        Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse,
        GenerationConfig, ImageConfig, Part, PNG_MIME_TYPE,
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
const API_KEY_HEADER: &str = "x-goog-api-key";
const ENTITY_NOT_FOUND_MARKER: &str = "requested entity was not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    Image { mime_type: String, bytes: Vec<u8> },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::Image {
            mime_type: PNG_MIME_TYPE.to_string(),
            bytes,
        }
    }

    fn to_wire(&self) -> Part {
        match self {
            Self::Text(text) => Part::text(text.clone()),
            Self::Image { mime_type, bytes } => Part::inline(mime_type.clone(), STANDARD.encode(bytes)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedContent {
    pub image: Option<Vec<u8>>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerativeServiceError {
    #[error("credential rejected: {0}")]
    Unauthorized(String),
    #[error("requested entity was not found: {0}")]
    EntityNotFound(String),
    #[error("service returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed service response: {0}")]
    Malformed(String),
    #[error("generative service is not configured")]
    NotConfigured,
}

impl GenerativeServiceError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::EntityNotFound(_))
    }
}

#[async_trait]
pub trait GenerativeImageService: Send + Sync {
    async fn generate_image(
        &self,
        parts: Vec<PromptPart>,
        size: SizeTier,
    ) -> Result<GeneratedContent, GenerativeServiceError>;
}

#[async_trait]
pub trait GenerativeTextService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerativeServiceError>;
}

pub struct MissingGenerativeService;

#[async_trait]
impl GenerativeImageService for MissingGenerativeService {
    async fn generate_image(
        &self,
        _parts: Vec<PromptPart>,
        _size: SizeTier,
    ) -> Result<GeneratedContent, GenerativeServiceError> {
        Err(GenerativeServiceError::NotConfigured)
    }
}

#[async_trait]
impl GenerativeTextService for MissingGenerativeService {
    async fn complete(
        &self,
        _prompt: &str,
        _system_instruction: &str,
    ) -> Result<String, GenerativeServiceError> {
        Err(GenerativeServiceError::NotConfigured)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str) -> Result<Url, GenerativeServiceError> {
        let mut base = self.config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|base| base.join(&format!("v1beta/models/{model}:generateContent")))
            .map_err(|err| {
                GenerativeServiceError::Transport(format!(
                    "invalid service url '{}': {err}",
                    self.config.base_url
                ))
            })
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerativeServiceError> {
        if self.config.api_key.trim().is_empty() {
            return Err(GenerativeServiceError::Unauthorized(
                "no api key selected".to_string(),
            ));
        }

        let url = self.endpoint(model)?;
        debug!(
            "genai: request model={model} parts={}",
            request.contents.iter().map(|c| c.parts.len()).sum::<usize>()
        );

        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| GenerativeServiceError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &body);
            warn!("genai: request failed model={model} status={} err={err}", status.as_u16());
            return Err(err);
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| GenerativeServiceError::Malformed(err.to_string()))
    }
}

fn classify_failure(status: StatusCode, body: &str) -> GenerativeServiceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if status == StatusCode::NOT_FOUND
        || message.to_ascii_lowercase().contains(ENTITY_NOT_FOUND_MARKER)
    {
        GenerativeServiceError::EntityNotFound(message)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        GenerativeServiceError::Unauthorized(message)
    } else {
        GenerativeServiceError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl GenerativeImageService for GeminiClient {
    async fn generate_image(
        &self,
        parts: Vec<PromptPart>,
        size: SizeTier,
    ) -> Result<GeneratedContent, GenerativeServiceError> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(parts.iter().map(PromptPart::to_wire).collect())],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                response_mime_type: None,
                image_config: Some(ImageConfig::square(size)),
            }),
        };

        let response = self
            .generate_content(&self.config.image_model, &request)
            .await?;

        let image = response
            .first_inline_data()
            .map(|inline| STANDARD.decode(inline.data.as_bytes()))
            .transpose()
            .map_err(|err| GenerativeServiceError::Malformed(format!("image payload: {err}")))?;

        Ok(GeneratedContent {
            image,
            text: response.text(),
        })
    }
}

#[async_trait]
impl GenerativeTextService for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerativeServiceError> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: Some(Content::instruction(system_instruction)),
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("text/plain".to_string()),
                ..GenerationConfig::default()
            }),
        };

        let response = self
            .generate_content(&self.config.text_model, &request)
            .await?;
        Ok(response.text().unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

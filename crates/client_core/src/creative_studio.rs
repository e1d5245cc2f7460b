use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use genai_client::{GenerativeImageService, PromptPart};
use image::RgbaImage;
use raster::RasterError;
use shared::{
    domain::{FilterParams, FilterUpdate, GenerationMode, SizeTier},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

const STYLE_TRANSFER_INSTRUCTION: &str = "Redraw the first image by applying the artistic style, textures, lighting, and color palette of the second image. Maintain the original subject and basic composition.";
const STYLE_ONLY_INSTRUCTION: &str =
    "Generate an image in the artistic style and aesthetic of the attached reference image.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("a generation request is already in progress")]
    RequestInProgress,
    #[error("studio is not authorized; select an api key first")]
    NotAuthorized,
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),
    #[error("the model completed without returning visual data")]
    NoVisualData,
    #[error("credential expired or invalid: {0}")]
    AuthExpired(String),
    #[error("generation failed: {0}")]
    TransferFailed(String),
    #[error("no generated image to work on")]
    NoImage,
    #[error("no edit session is open")]
    NoEditSession,
    #[error("image processing failed: {0}")]
    Raster(String),
}

impl StudioError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RequestInProgress => ErrorCode::RequestInProgress,
            Self::NotAuthorized => ErrorCode::NotAuthorized,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::NoVisualData => ErrorCode::NoVisualData,
            Self::AuthExpired(_) => ErrorCode::AuthExpired,
            Self::TransferFailed(_) => ErrorCode::TransferFailed,
            Self::NoImage => ErrorCode::NoImage,
            Self::NoEditSession => ErrorCode::NoEditSession,
            Self::Raster(_) => ErrorCode::Internal,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RequestInProgress => "A generation is already running. Please wait for it to finish.",
            Self::NotAuthorized => "A paid API key is required for high-resolution generation.",
            Self::InvalidRequest(_) => "Describe your vision or attach a style reference first.",
            Self::NoVisualData => "The model completed but didn't return visual data. Try a more descriptive prompt or a different style image.",
            Self::AuthExpired(_) => "Session expired or API Key invalid. Please re-authorize.",
            Self::TransferFailed(_) => "Style transfer failed. Ensure your reference images are clear and try again.",
            Self::NoImage => "Generate an image first.",
            Self::NoEditSession => "Open the editor first.",
            Self::Raster(_) => "The image could not be processed.",
        }
    }
}

impl From<RasterError> for StudioError {
    fn from(value: RasterError) -> Self {
        Self::Raster(value.to_string())
    }
}

impl From<&StudioError> for ApiError {
    fn from(value: &StudioError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub mode: GenerationMode,
    pub size: SizeTier,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::New,
            size: SizeTier::default(),
        }
    }

    pub fn style_transfer() -> Self {
        Self {
            prompt: String::new(),
            mode: GenerationMode::StyleTransfer,
            size: SizeTier::default(),
        }
    }

    pub fn with_size(mut self, size: SizeTier) -> Self {
        self.size = size;
        self
    }
}

fn build_parts(
    request: &GenerationRequest,
    generated: Option<&[u8]>,
    style_reference: Option<&[u8]>,
) -> Result<Vec<PromptPart>, StudioError> {
    let prompt = request.prompt.trim();
    match request.mode {
        GenerationMode::StyleTransfer => {
            let base = generated.ok_or_else(|| {
                StudioError::InvalidRequest("style transfer needs a generated image".to_string())
            })?;
            let style = style_reference.ok_or_else(|| {
                StudioError::InvalidRequest("style transfer needs a style reference".to_string())
            })?;
            Ok(vec![
                PromptPart::png(base.to_vec()),
                PromptPart::png(style.to_vec()),
                PromptPart::text(STYLE_TRANSFER_INSTRUCTION),
            ])
        }
        GenerationMode::New => match (prompt.is_empty(), style_reference) {
            (true, None) => Err(StudioError::InvalidRequest(
                "a prompt or a style reference is required".to_string(),
            )),
            (true, Some(style)) => Ok(vec![
                PromptPart::png(style.to_vec()),
                PromptPart::text(STYLE_ONLY_INSTRUCTION),
            ]),
            (false, Some(style)) => Ok(vec![
                PromptPart::png(style.to_vec()),
                PromptPart::text(format!(
                    "Generate an image based on this prompt: \"{prompt}\". Apply the artistic style and aesthetic of the attached reference image."
                )),
            ]),
            (false, None) => Ok(vec![PromptPart::text(prompt)]),
        },
    }
}

/// Any decodable payload is normalised to PNG so downstream parts can be labelled `image/png`.
fn normalize_png(bytes: &[u8]) -> Result<Vec<u8>, RasterError> {
    raster::encode_png(&raster::decode(bytes)?)
}

struct EditSession {
    base: RgbaImage,
    params: FilterParams,
    preview: Vec<u8>,
}

impl EditSession {
    fn open(base_png: &[u8]) -> Result<Self, StudioError> {
        let base = raster::decode(base_png)?;
        let mut session = Self {
            base,
            params: FilterParams::default(),
            preview: Vec::new(),
        };
        session.render()?;
        Ok(session)
    }

    fn render(&mut self) -> Result<(), StudioError> {
        self.preview = raster::encode_png(&raster::apply(&self.base, &self.params))?;
        Ok(())
    }
}

struct StudioState {
    authorized: bool,
    style_reference: Option<Vec<u8>>,
    generated: Option<Vec<u8>>,
    edit: Option<EditSession>,
}

pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CreativeStudio {
    service: Arc<dyn GenerativeImageService>,
    busy: AtomicBool,
    state: Mutex<StudioState>,
}

impl CreativeStudio {
    /// The studio starts unauthorized; call [`authorize`](Self::authorize) once a key is selected.
    pub fn new(service: Arc<dyn GenerativeImageService>) -> Self {
        Self {
            service,
            busy: AtomicBool::new(false),
            state: Mutex::new(StudioState {
                authorized: false,
                style_reference: None,
                generated: None,
                edit: None,
            }),
        }
    }

    pub async fn authorize(&self) {
        self.state.lock().await.authorized = true;
    }

    pub async fn is_authorized(&self) -> bool {
        self.state.lock().await.authorized
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn set_style_reference(&self, bytes: &[u8]) -> Result<(), StudioError> {
        let normalized = normalize_png(bytes)?;
        self.state.lock().await.style_reference = Some(normalized);
        Ok(())
    }

    pub async fn clear_style_reference(&self) {
        self.state.lock().await.style_reference = None;
    }

    pub async fn has_style_reference(&self) -> bool {
        self.state.lock().await.style_reference.is_some()
    }

    pub async fn generated_image(&self) -> Option<Vec<u8>> {
        self.state.lock().await.generated.clone()
    }

    pub async fn preview_image(&self) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .edit
            .as_ref()
            .map(|edit| edit.preview.clone())
    }

    pub async fn edit_params(&self) -> Option<FilterParams> {
        self.state.lock().await.edit.as_ref().map(|edit| edit.params)
    }

    pub async fn is_editing(&self) -> bool {
        self.state.lock().await.edit.is_some()
    }

    pub async fn visible_image(&self) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state
            .edit
            .as_ref()
            .map(|edit| edit.preview.clone())
            .or_else(|| state.generated.clone())
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<Vec<u8>, StudioError> {
        let _busy = BusyGuard::acquire(&self.busy).ok_or(StudioError::RequestInProgress)?;

        let parts = {
            let mut state = self.state.lock().await;
            if !state.authorized {
                return Err(StudioError::NotAuthorized);
            }
            let parts = build_parts(
                &request,
                state.generated.as_deref(),
                state.style_reference.as_deref(),
            )?;
            state.edit = None;
            if request.mode == GenerationMode::New {
                state.generated = None;
            }
            parts
        };

        info!(
            "studio: generation requested mode={:?} size={} parts={}",
            request.mode,
            request.size,
            parts.len()
        );
        let result = self.service.generate_image(parts, request.size).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(content) => {
                let Some(bytes) = content.image else {
                    warn!("studio: generation returned no image data");
                    return Err(StudioError::NoVisualData);
                };
                let png = normalize_png(&bytes).map_err(|err| {
                    StudioError::TransferFailed(format!("undecodable image payload: {err}"))
                })?;
                state.edit = None;
                state.generated = Some(png.clone());
                info!("studio: generation stored bytes={}", png.len());
                Ok(png)
            }
            Err(err) if err.is_auth_failure() => {
                warn!("studio: credential rejected, re-authorization required err={err}");
                state.authorized = false;
                Err(StudioError::AuthExpired(err.to_string()))
            }
            Err(err) => {
                warn!("studio: generation failed err={err}");
                Err(StudioError::TransferFailed(err.to_string()))
            }
        }
    }

    // Image tools are locked while a generation is outstanding.
    fn ensure_idle(&self) -> Result<(), StudioError> {
        if self.is_busy() {
            return Err(StudioError::RequestInProgress);
        }
        Ok(())
    }

    pub async fn import_image(&self, bytes: &[u8]) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let png = normalize_png(bytes)?;
        let mut state = self.state.lock().await;
        state.edit = None;
        state.generated = Some(png.clone());
        Ok(png)
    }

    /// Opens an edit session with neutral filters. An open session is kept as is.
    pub async fn begin_edit(&self) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().await;
        if let Some(edit) = state.edit.as_ref() {
            return Ok(edit.preview.clone());
        }
        let generated = state.generated.as_deref().ok_or(StudioError::NoImage)?;
        let session = EditSession::open(generated)?;
        let preview = session.preview.clone();
        state.edit = Some(session);
        Ok(preview)
    }

    pub async fn update_filter(&self, update: FilterUpdate) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().await;
        let edit = state.edit.as_mut().ok_or(StudioError::NoEditSession)?;
        edit.params.merge(update);
        edit.render()?;
        Ok(edit.preview.clone())
    }

    pub async fn rotate90(&self) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().await;
        let edit = state.edit.as_mut().ok_or(StudioError::NoEditSession)?;
        edit.params.rotation = edit.params.rotation.clockwise();
        edit.render()?;
        Ok(edit.preview.clone())
    }

    /// Permanently turns the generated image a quarter clockwise. An open edit
    /// session is rebased onto the rotated image with its filters kept.
    pub async fn quick_rotate(&self) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().await;
        let generated = state.generated.as_deref().ok_or(StudioError::NoImage)?;
        let rotated = raster::rotate_png_clockwise(generated)?;

        if let Some(edit) = state.edit.as_mut() {
            edit.base = raster::decode(&rotated)?;
            edit.render()?;
        }
        state.generated = Some(rotated.clone());
        Ok(rotated)
    }

    /// Crops the visible image to its centred square and commits it, closing any edit session.
    pub async fn crop_to_square(&self) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().await;
        let visible = match state.edit.as_ref() {
            Some(edit) => edit.preview.as_slice(),
            None => state.generated.as_deref().ok_or(StudioError::NoImage)?,
        };
        let cropped = raster::crop_png_to_square(visible)?;
        state.generated = Some(cropped.clone());
        state.edit = None;
        Ok(cropped)
    }

    pub async fn commit_edit(&self) -> Result<Vec<u8>, StudioError> {
        self.ensure_idle()?;
        let mut state = self.state.lock().await;
        let edit = state.edit.take().ok_or(StudioError::NoEditSession)?;
        state.generated = Some(edit.preview.clone());
        Ok(edit.preview)
    }

    pub async fn cancel_edit(&self) -> bool {
        self.state.lock().await.edit.take().is_some()
    }
}

#[cfg(test)]
#[path = "tests/creative_studio_tests.rs"]
mod tests;

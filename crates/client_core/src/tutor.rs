use std::sync::{atomic::AtomicBool, Arc};

use chrono::{DateTime, Utc};
use genai_client::GenerativeTextService;
use shared::{
    domain::{ChatMessageId, ModerationVerdict},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::creative_studio::BusyGuard;

pub const TUTOR_PERSONA: &str = "You are NOVA AI, a smart tutor for a Learning Management System. Help students with academic questions, provide study tips, and keep explanations concise and encouraging.";
pub const MODERATOR_INSTRUCTION: &str = "You are a content moderator for an educational group chat. Determine if the text is 'CLEAN' or 'ABUSIVE' or 'OFF-TOPIC'. Reply ONLY with one of those three words.";
pub const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I couldn't process that request.";
pub const CONNECTION_ERROR_REPLY: &str = "Error connecting to AI helper. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TutorError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("the tutor is still answering the previous question")]
    AskInProgress,
}

impl TutorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyQuestion => ErrorCode::InvalidRequest,
            Self::AskInProgress => ErrorCode::RequestInProgress,
        }
    }
}

impl From<&TutorError> for ApiError {
    fn from(value: &TutorError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub text: String,
    pub is_ai: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn user(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    fn ai(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    fn new(text: impl Into<String>, is_ai: bool) -> Self {
        Self {
            id: ChatMessageId::new(),
            text: text.into(),
            is_ai,
            timestamp: Utc::now(),
        }
    }
}

/// Conversation with the tutor persona. Service faults are answered with a
/// canned reply instead of surfacing as errors.
pub struct TutorChat {
    service: Arc<dyn GenerativeTextService>,
    pending: AtomicBool,
    transcript: Mutex<Vec<ChatMessage>>,
}

impl TutorChat {
    pub fn new(service: Arc<dyn GenerativeTextService>, user_name: &str) -> Self {
        let greeting = format!(
            "Hello {user_name}! I'm your NOVA AI helper. Ask me anything about your modules, assignments, or study topics!"
        );
        Self {
            service,
            pending: AtomicBool::new(false),
            transcript: Mutex::new(vec![ChatMessage::ai(greeting)]),
        }
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.lock().await.clone()
    }

    pub async fn ask(&self, question: &str) -> Result<ChatMessage, TutorError> {
        if question.trim().is_empty() {
            return Err(TutorError::EmptyQuestion);
        }
        let _pending = BusyGuard::acquire(&self.pending).ok_or(TutorError::AskInProgress)?;

        self.transcript
            .lock()
            .await
            .push(ChatMessage::user(question));

        let reply = match self.service.complete(question, TUTOR_PERSONA).await {
            Ok(text) if text.trim().is_empty() => {
                debug!("tutor: empty reply, using fallback");
                EMPTY_REPLY_FALLBACK.to_string()
            }
            Ok(text) => text,
            Err(err) => {
                warn!("tutor: text service failed err={err}");
                CONNECTION_ERROR_REPLY.to_string()
            }
        };

        let message = ChatMessage::ai(reply);
        self.transcript.lock().await.push(message.clone());
        info!("tutor: answered chars={}", message.text.len());
        Ok(message)
    }
}

/// Classifies group-chat text. Failures and unrecognised answers count as clean.
pub async fn moderate(service: &dyn GenerativeTextService, text: &str) -> ModerationVerdict {
    let prompt = format!("Moderation check for: \"{text}\"");
    match service.complete(&prompt, MODERATOR_INSTRUCTION).await {
        Ok(answer) => {
            let verdict = ModerationVerdict::parse_lenient(&answer);
            debug!("moderation: verdict={verdict:?} raw={}", answer.trim());
            verdict
        }
        Err(err) => {
            warn!("moderation: check failed, allowing text err={err}");
            ModerationVerdict::Clean
        }
    }
}

#[cfg(test)]
#[path = "tests/tutor_tests.rs"]
mod tests;

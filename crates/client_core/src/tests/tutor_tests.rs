use super::*;
use async_trait::async_trait;
use genai_client::GenerativeServiceError;
use tokio::sync::Notify;

struct ScriptedTextService {
    reply: Result<String, GenerativeServiceError>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    entered: Arc<Notify>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTextService {
    fn replying(reply: Result<String, GenerativeServiceError>) -> Self {
        Self {
            reply,
            calls: Arc::new(Mutex::new(Vec::new())),
            entered: Arc::new(Notify::new()),
            gate: None,
        }
    }
}

#[async_trait]
impl GenerativeTextService for ScriptedTextService {
    async fn complete(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerativeServiceError> {
        self.calls
            .lock()
            .await
            .push((prompt.to_string(), system_instruction.to_string()));
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply.clone()
    }
}

#[tokio::test]
async fn transcript_starts_with_personal_greeting() {
    let chat = TutorChat::new(
        Arc::new(ScriptedTextService::replying(Ok(String::new()))),
        "Ada",
    );
    let transcript = chat.transcript().await;
    assert_eq!(transcript.len(), 1);
    assert!(transcript[0].is_ai);
    assert!(transcript[0].text.starts_with("Hello Ada! I'm your NOVA AI helper."));
}

#[tokio::test]
async fn ask_appends_question_and_answer_with_persona() {
    let service = ScriptedTextService::replying(Ok("Mitochondria make ATP.".to_string()));
    let calls = service.calls.clone();
    let chat = TutorChat::new(Arc::new(service), "Ada");

    let reply = chat.ask("What do mitochondria do?").await.expect("ask");
    assert!(reply.is_ai);
    assert_eq!(reply.text, "Mitochondria make ATP.");

    let transcript = chat.transcript().await;
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1].text, "What do mitochondria do?");
    assert!(!transcript[1].is_ai);
    assert_eq!(transcript[2], reply);

    let calls = calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, TUTOR_PERSONA);
}

#[tokio::test]
async fn blank_question_is_rejected_without_a_call() {
    let service = ScriptedTextService::replying(Ok("unused".to_string()));
    let calls = service.calls.clone();
    let chat = TutorChat::new(Arc::new(service), "Ada");

    assert_eq!(chat.ask("   ").await, Err(TutorError::EmptyQuestion));
    assert_eq!(chat.transcript().await.len(), 1);
    assert!(calls.lock().await.is_empty());
}

#[tokio::test]
async fn empty_reply_and_service_failure_use_canned_answers() {
    let chat = TutorChat::new(
        Arc::new(ScriptedTextService::replying(Ok("  ".to_string()))),
        "Ada",
    );
    assert_eq!(
        chat.ask("hello?").await.expect("ask").text,
        EMPTY_REPLY_FALLBACK
    );

    let chat = TutorChat::new(
        Arc::new(ScriptedTextService::replying(Err(
            GenerativeServiceError::Transport("dns failure".to_string()),
        ))),
        "Ada",
    );
    assert_eq!(
        chat.ask("hello?").await.expect("ask").text,
        CONNECTION_ERROR_REPLY
    );
}

#[tokio::test]
async fn second_ask_while_pending_is_rejected() {
    let gate = Arc::new(Notify::new());
    let mut service = ScriptedTextService::replying(Ok("Sure.".to_string()));
    service.gate = Some(gate.clone());
    let entered = service.entered.clone();
    let calls = service.calls.clone();
    let chat = Arc::new(TutorChat::new(Arc::new(service), "Ada"));

    let first = {
        let chat = chat.clone();
        tokio::spawn(async move { chat.ask("first").await })
    };
    entered.notified().await;

    let err = chat.ask("second").await.expect_err("pending");
    assert_eq!(err, TutorError::AskInProgress);
    assert_eq!(err.code(), ErrorCode::RequestInProgress);

    gate.notify_one();
    first.await.expect("join").expect("first ask");
    assert_eq!(calls.lock().await.len(), 1);
    assert_eq!(chat.transcript().await.len(), 3);
}

#[tokio::test]
async fn moderation_parses_verdicts_and_defaults_to_clean() {
    let service = ScriptedTextService::replying(Ok(" OFF-TOPIC\n".to_string()));
    let calls = service.calls.clone();
    assert_eq!(
        moderate(&service, "who won the match?").await,
        ModerationVerdict::OffTopic
    );
    let calls = calls.lock().await;
    assert_eq!(calls[0].0, "Moderation check for: \"who won the match?\"");
    assert_eq!(calls[0].1, MODERATOR_INSTRUCTION);

    let abusive = ScriptedTextService::replying(Ok("ABUSIVE".to_string()));
    assert_eq!(moderate(&abusive, "...").await, ModerationVerdict::Abusive);

    let unsure = ScriptedTextService::replying(Ok("maybe?".to_string()));
    assert_eq!(moderate(&unsure, "...").await, ModerationVerdict::Clean);

    let failing = ScriptedTextService::replying(Err(GenerativeServiceError::NotConfigured));
    assert_eq!(moderate(&failing, "...").await, ModerationVerdict::Clean);
}

#[test]
fn tutor_errors_convert_to_api_errors_with_their_code() {
    let api = ApiError::from(&TutorError::AskInProgress);
    assert_eq!(api.code, ErrorCode::RequestInProgress);
    assert_eq!(
        ApiError::from(&TutorError::EmptyQuestion).code,
        ErrorCode::InvalidRequest
    );
}

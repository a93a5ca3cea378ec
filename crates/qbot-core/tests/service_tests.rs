use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use qbot_core::{
    ArchiveQueue, ConversationStore, MemoryStore, ProgressionController, QuestionnaireConfig,
    QuestionnaireService, Reply, ServiceError, SinkError, Stage, Transcript, TranscriptSink,
    DEFAULT_FIRST_QUESTION,
};
use qbot_llm::{LlmError, ScriptedModel};
use qbot_logging::Logger;

/// Sink that remembers every transcript it receives
#[derive(Default)]
struct RecordingSink {
    transcripts: Mutex<Vec<Transcript>>,
}

impl TranscriptSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn deliver(&self, transcript: &Transcript) -> Result<(), SinkError> {
        self.transcripts.lock().unwrap().push(transcript.clone());
        Ok(())
    }
}

struct BrokenSink;

impl TranscriptSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn deliver(&self, _transcript: &Transcript) -> Result<(), SinkError> {
        Err(SinkError::new("authentication required"))
    }
}

/// Helper: service with a two-question limit over an in-memory store.
fn service(model: ScriptedModel, store: Arc<MemoryStore>) -> QuestionnaireService {
    let logger = Arc::new(Logger::silent());
    let controller = ProgressionController::new(
        Arc::new(model),
        QuestionnaireConfig::default().with_max_questions(2),
        logger.clone(),
    );
    QuestionnaireService::new(controller, store, logger)
}

#[tokio::test]
async fn test_unknown_session_starts_fresh() {
    let store = Arc::new(MemoryStore::new());
    let service = service(ScriptedModel::new(), store.clone());

    let response = service.turn("session-a", Some("ignored")).await.unwrap();
    assert_eq!(response.reply, Reply::Question(DEFAULT_FIRST_QUESTION.to_string()));
    assert_eq!(response.stage, Stage::AwaitingAnswer);
    assert_eq!(response.transcript.question_count, 1);

    let stored = store.load("session-a").unwrap().unwrap();
    assert_eq!(stored.conversation.assistant_count(), 1);
}

#[tokio::test]
async fn test_turns_persist_between_calls() {
    let store = Arc::new(MemoryStore::new());
    let service = service(
        ScriptedModel::with_replies(["What is your average lead time?"]),
        store.clone(),
    );

    service.turn("s1", None).await.unwrap();
    let second = service.turn("s1", Some("Fasteners")).await.unwrap();
    assert_eq!(
        second.reply,
        Reply::Question("What is your average lead time?".to_string())
    );

    let third = service.turn("s1", Some("Two weeks")).await.unwrap();
    assert_eq!(third.reply, Reply::Complete(None));
    assert_eq!(third.stage, Stage::Complete);
    assert_eq!(third.transcript.answer_count, 2);
    assert_eq!(
        third.transcript.items[1].answer.as_deref(),
        Some("Two weeks")
    );
}

#[tokio::test]
async fn test_blank_answer_does_not_write() {
    let store = Arc::new(MemoryStore::new());
    let service = service(ScriptedModel::new(), store.clone());
    service.turn("s1", None).await.unwrap();

    let written = store.load("s1").unwrap().unwrap().updated_at;
    let response = service.turn("s1", Some("  ")).await.unwrap();
    assert_eq!(response.reply, Reply::Question(DEFAULT_FIRST_QUESTION.to_string()));
    assert_eq!(store.load("s1").unwrap().unwrap().updated_at, written);
}

#[tokio::test]
async fn test_expired_session_restarts() {
    let store = Arc::new(MemoryStore::new());
    let service = service(
        ScriptedModel::with_replies(["What is your average lead time?"]),
        store.clone(),
    )
    .with_session_ttl(Duration::from_secs(60 * 60));

    service.turn("s1", None).await.unwrap();
    service.turn("s1", Some("Fasteners")).await.unwrap();
    store.set_updated_at("s1", Utc::now() - chrono::Duration::hours(2));

    let response = service.turn("s1", Some("Two weeks")).await.unwrap();
    assert_eq!(response.reply, Reply::Question(DEFAULT_FIRST_QUESTION.to_string()));
    assert_eq!(response.transcript.question_count, 1);
    assert_eq!(response.transcript.answer_count, 0);
}

#[tokio::test]
async fn test_completed_session_never_expires() {
    let store = Arc::new(MemoryStore::new());
    let service = service(
        ScriptedModel::with_replies(["What is your average lead time?"]),
        store.clone(),
    )
    .with_session_ttl(Duration::from_secs(60 * 60));

    service.turn("s1", None).await.unwrap();
    service.turn("s1", Some("Fasteners")).await.unwrap();
    service.turn("s1", Some("Two weeks")).await.unwrap();
    store.set_updated_at("s1", Utc::now() - chrono::Duration::hours(2));

    let response = service.turn("s1", Some("One more thing")).await.unwrap();
    assert_eq!(response.reply, Reply::Complete(None));
    assert_eq!(response.stage, Stage::Complete);
    assert_eq!(response.transcript.answer_count, 2);

    let transcript = service.transcript("s1").unwrap();
    assert_eq!(transcript.question_count, 2);
    assert_eq!(transcript.answer_count, 2);
}

#[tokio::test]
async fn test_model_failure_keeps_stored_state() {
    let store = Arc::new(MemoryStore::new());
    let service = service(
        ScriptedModel::new().fail(LlmError::Auth("invalid key".to_string())),
        store.clone(),
    );
    service.turn("s1", None).await.unwrap();

    let err = service.turn("s1", Some("Fasteners")).await.unwrap_err();
    assert!(err.is_model_failure());

    let stored = store.load("s1").unwrap().unwrap();
    assert_eq!(stored.conversation.user_answer_count(), 0);
    assert_eq!(
        stored.conversation.pending_question(),
        Some(DEFAULT_FIRST_QUESTION)
    );
}

#[tokio::test]
async fn test_transcript_lookup() {
    let store = Arc::new(MemoryStore::new());
    let service = service(
        ScriptedModel::with_replies(["What is your average lead time?"]),
        store,
    );

    assert!(matches!(
        service.transcript("missing"),
        Err(ServiceError::NotFound(id)) if id == "missing"
    ));

    service.turn("s1", None).await.unwrap();
    // in progress is not a completed transcript
    assert!(matches!(service.transcript("s1"), Err(ServiceError::NotFound(_))));

    service.turn("s1", Some("Fasteners")).await.unwrap();
    service.turn("s1", Some("Two weeks")).await.unwrap();
    let transcript = service.transcript("s1").unwrap();
    assert_eq!(transcript.question_count, 2);
    assert!(transcript.completed_at.is_some());
}

#[tokio::test]
async fn test_completion_is_archived_once() {
    let sink = Arc::new(RecordingSink::default());
    let sinks: Vec<Arc<dyn TranscriptSink>> = vec![
        Arc::new(BrokenSink) as Arc<dyn TranscriptSink>,
        sink.clone() as Arc<dyn TranscriptSink>,
    ];
    let archive = Arc::new(ArchiveQueue::start(sinks, Arc::new(Logger::silent())));
    let service = service(
        ScriptedModel::with_replies(["What is your average lead time?"]),
        Arc::new(MemoryStore::new()),
    )
    .with_archive(archive);

    service.turn("s1", None).await.unwrap();
    service.turn("s1", Some("Fasteners")).await.unwrap();
    let done = service.turn("s1", Some("Two weeks")).await.unwrap();
    assert_eq!(done.stage, Stage::Complete);

    // turns after completion do not archive again
    service.turn("s1", Some("anything else?")).await.unwrap();
    service.shutdown().await;

    let delivered = sink.transcripts.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].session_id, "s1");
    assert_eq!(delivered[0].answer_count, 2);
}

#[tokio::test]
async fn test_concurrent_submits_are_serialized() {
    let store = Arc::new(MemoryStore::new());
    let logger = Arc::new(Logger::silent());
    let model = Arc::new(ScriptedModel::with_replies([
        "What is your average lead time?",
        "How many units can you supply per month?",
    ]));
    let controller = ProgressionController::new(
        model.clone(),
        QuestionnaireConfig::default(),
        logger.clone(),
    );
    let service = Arc::new(QuestionnaireService::new(controller, store.clone(), logger));
    service.turn("s1", None).await.unwrap();

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.turn("s1", Some("Fasteners")).await })
    };
    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.turn("s1", Some("Fasteners")).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // both answers landed; neither overwrote the other
    let stored = store.load("s1").unwrap().unwrap().conversation;
    assert_eq!(stored.user_answer_count(), 2);
    assert_eq!(stored.assistant_count(), 3);
    assert_eq!(model.call_count(), 2);
}

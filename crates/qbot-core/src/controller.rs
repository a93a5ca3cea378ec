use std::sync::Arc;
use tracing::{debug, warn};

use qbot_llm::LanguageModel;
use qbot_logging::{LogEvent, Logger};

use crate::{
    Conversation, Generated, QaItem, QuestionGenerator, QuestionnaireConfig, Stage, TurnError,
};

/// What the caller should show after a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The question now awaiting an answer
    Question(String),
    /// The questionnaire is over; carries the closing sentence if one was emitted
    Complete(Option<String>),
}

impl Reply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Question(q) => Some(q),
            Reply::Complete(closing) => closing.as_deref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Reply::Complete(_))
    }
}

/// Result of one controller turn
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub conversation: Conversation,
    pub reply: Reply,
    /// False when the turn was a no-op
    pub changed: bool,
}

/// Runs the questionnaire state machine one turn at a time.
///
/// `advance` never mutates its input: it returns a new conversation, so a
/// failed turn leaves the caller's state exactly as it was.
pub struct ProgressionController {
    model: Arc<dyn LanguageModel>,
    config: QuestionnaireConfig,
    logger: Arc<Logger>,
}

impl ProgressionController {
    pub fn new(model: Arc<dyn LanguageModel>, config: QuestionnaireConfig, logger: Arc<Logger>) -> Self {
        Self {
            model,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &QuestionnaireConfig {
        &self.config
    }

    /// An empty conversation sized by the configured question limit
    pub fn start(&self) -> Conversation {
        Conversation::new(self.config.max_questions)
    }

    /// The question currently shown to the user
    pub fn current_reply(&self, conversation: &Conversation) -> Reply {
        match conversation.stage() {
            Stage::AwaitingFirstQuestion => Reply::Question(self.config.first_question.clone()),
            Stage::Complete => Reply::Complete(conversation.closing_message().map(str::to_string)),
            Stage::AwaitingAnswer => match conversation.pending_question() {
                Some(question) => Reply::Question(question.to_string()),
                None => Reply::Complete(None),
            },
        }
    }

    /// Run one turn. `answer` may be absent or blank, which re-emits the
    /// pending question without touching the transcript.
    pub async fn advance(&self, conversation: &Conversation, answer: Option<&str>) -> Result<Turn, TurnError> {
        match conversation.stage() {
            Stage::Complete => Ok(self.unchanged(conversation)),
            Stage::AwaitingFirstQuestion => {
                let mut next = conversation.clone();
                let first = self.config.first_question.clone();
                next.append(QaItem::question(first.clone())?)?;
                self.logger.log(&LogEvent::QuestionAsked {
                    number: 1,
                    question: first.clone(),
                    generated: false,
                });
                Ok(Turn {
                    conversation: next,
                    reply: Reply::Question(first),
                    changed: true,
                })
            }
            Stage::AwaitingAnswer => {
                let answer = answer.map(str::trim).filter(|a| !a.is_empty());
                let pending = conversation.pending_question().is_some();

                match (answer, pending) {
                    (None, true) => Ok(self.unchanged(conversation)),
                    (Some(answer), true) => {
                        let mut next = conversation.clone();
                        next.append(QaItem::answer(answer)?)?;
                        self.logger.log(&LogEvent::AnswerRecorded {
                            number: next.user_answer_count(),
                        });
                        if let Some(question) = next.pending_question() {
                            // resumed transcript with more than one open question
                            let reply = Reply::Question(question.to_string());
                            return Ok(Turn {
                                conversation: next,
                                reply,
                                changed: true,
                            });
                        }
                        self.progress(next).await
                    }
                    // every question answered but the turn that follows never ran
                    (answer, false) => {
                        if let Some(answer) = answer {
                            debug!(
                                answer_len = answer.len(),
                                "Answer ignored, no question is waiting for one"
                            );
                        }
                        debug!("No pending question, deciding next step");
                        self.progress(conversation.clone()).await
                    }
                }
            }
        }
    }

    /// Decide between terminating and asking the next question
    async fn progress(&self, mut next: Conversation) -> Result<Turn, TurnError> {
        if next.is_complete() {
            next.finish();
            return Ok(Turn {
                conversation: next,
                reply: Reply::Complete(None),
                changed: true,
            });
        }

        let coverage = next.coverage();
        if next.remaining_questions() == 1 && !coverage.is_complete() {
            let missing = coverage
                .uncovered()
                .iter()
                .map(|t| t.label().to_string())
                .collect::<Vec<_>>();
            warn!(
                missing = %missing.join(", "),
                "Final question reached with mandatory topics uncovered"
            );
            self.logger.log(&LogEvent::TopicsUncovered {
                number: next.assistant_count() + 1,
                missing,
            });
        }

        let generator = QuestionGenerator::new(self.model.as_ref(), &self.config);
        let outcome = match generator.generate_next_question(&next).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.logger.log(&LogEvent::ModelFailed { error: e.to_string() });
                return Err(e.into());
            }
        };

        for rejected in &outcome.rejected {
            self.logger.log(&LogEvent::CandidateRejected {
                attempt: rejected.attempt,
                reason: rejected.reason.to_string(),
                candidate: rejected.candidate.clone(),
            });
        }

        let number = next.assistant_count() + 1;
        match outcome.generated {
            Generated::Question(question) => {
                next.append(QaItem::question(question.clone())?)?;
                self.logger.log(&LogEvent::QuestionAsked {
                    number,
                    question: question.clone(),
                    generated: true,
                });
                Ok(Turn {
                    conversation: next,
                    reply: Reply::Question(question),
                    changed: true,
                })
            }
            Generated::Fallback(sentence) => {
                next.close_with(QaItem::question(sentence.clone())?)?;
                self.logger.log(&LogEvent::FallbackUsed { number });
                Ok(Turn {
                    conversation: next,
                    reply: Reply::Complete(Some(sentence)),
                    changed: true,
                })
            }
        }
    }

    fn unchanged(&self, conversation: &Conversation) -> Turn {
        Turn {
            conversation: conversation.clone(),
            reply: self.current_reply(conversation),
            changed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_llm::ScriptedModel;

    fn controller(model: ScriptedModel) -> (ProgressionController, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let controller = ProgressionController::new(
            model.clone(),
            QuestionnaireConfig::default(),
            Arc::new(Logger::silent()),
        );
        (controller, model)
    }

    #[tokio::test]
    async fn test_first_turn_asks_fixed_question() {
        let (controller, model) = controller(ScriptedModel::new());
        let turn = controller.advance(&controller.start(), None).await.unwrap();

        assert_eq!(
            turn.reply,
            Reply::Question("What is your product and what does it do?".to_string())
        );
        assert_eq!(turn.conversation.stage(), Stage::AwaitingAnswer);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_answer_is_noop() {
        let (controller, model) = controller(ScriptedModel::new());
        let opened = controller.advance(&controller.start(), None).await.unwrap().conversation;

        for blank in [None, Some(""), Some("   \n")] {
            let turn = controller.advance(&opened, blank).await.unwrap();
            assert!(!turn.changed);
            assert_eq!(turn.conversation, opened);
            assert_eq!(
                turn.reply.text(),
                Some("What is your product and what does it do?")
            );
        }
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_triggers_generation() {
        let (controller, _model) = controller(ScriptedModel::new().reply("What is your lead time?"));
        let opened = controller.advance(&controller.start(), None).await.unwrap().conversation;

        let turn = controller.advance(&opened, Some("  Bolts  ")).await.unwrap();
        assert_eq!(turn.reply, Reply::Question("What is your lead time?".to_string()));
        assert_eq!(turn.conversation.answers().next(), Some("Bolts"));
        assert_eq!(turn.conversation.assistant_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_input_untouched() {
        let (controller, _model) = controller(ScriptedModel::new());
        let opened = controller.advance(&controller.start(), None).await.unwrap().conversation;
        let before = opened.clone();

        let err = controller.advance(&opened, Some("Bolts")).await.unwrap_err();
        assert!(err.is_model_failure());
        assert_eq!(opened, before);
    }

    #[tokio::test]
    async fn test_fallback_completes_conversation() {
        let (controller, _model) = controller(
            ScriptedModel::new()
                .reply("What is the market size?")
                .reply("What is the market outlook?"),
        );
        let opened = controller.advance(&controller.start(), None).await.unwrap().conversation;

        let turn = controller.advance(&opened, Some("Bolts")).await.unwrap();
        assert!(turn.reply.is_complete());
        assert_eq!(
            turn.reply.text(),
            Some("Thank you, that's all the questions we needed for now.")
        );
        assert!(turn.conversation.is_finished());
        assert_eq!(turn.conversation.assistant_count(), 2);
        assert_eq!(turn.conversation.user_answer_count(), 1);

        let again = controller.advance(&turn.conversation, Some("more")).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.reply, turn.reply);
    }

    #[tokio::test]
    async fn test_answer_without_pending_question_is_ignored() {
        let (controller, model) = controller(ScriptedModel::new().reply("What is your lead time?"));
        let dangling = Conversation::restore(
            vec![
                QaItem::question(crate::DEFAULT_FIRST_QUESTION).unwrap(),
                QaItem::answer("Bolts").unwrap(),
            ],
            10,
            Stage::AwaitingAnswer,
            chrono::Utc::now(),
            None,
        )
        .unwrap();

        let turn = controller.advance(&dangling, Some("extra")).await.unwrap();
        assert_eq!(turn.reply, Reply::Question("What is your lead time?".to_string()));
        assert_eq!(turn.conversation.user_answer_count(), 1);
        assert!(turn.conversation.answers().all(|a| a != "extra"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_final_question_reports_uncovered_topics() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let controller = ProgressionController::new(
            Arc::new(ScriptedModel::new().reply("What is your average lead time?")),
            QuestionnaireConfig::default().with_max_questions(2),
            Arc::new(Logger::file_only(&path).unwrap()),
        );
        let opened = controller.advance(&controller.start(), None).await.unwrap().conversation;
        controller.advance(&opened, Some("Bolts")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let event = contents
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .find(|event| event["event"] == "topics_uncovered")
            .expect("uncovered topics event");
        assert_eq!(event["number"], 2);
        let missing = event["missing"].as_array().unwrap();
        assert_eq!(missing.len(), crate::Topic::ALL.len());
        assert!(missing.iter().any(|t| t == "Supply Capacity"));
    }
}

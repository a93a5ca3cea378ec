use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ConversationError, TopicCoverage};

/// Who produced a transcript item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    Assistant,
    User,
}

impl ItemRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemRole::Assistant => "assistant",
            ItemRole::User => "user",
        }
    }
}

impl fmt::Display for ItemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemRole {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assistant" => Ok(ItemRole::Assistant),
            "user" => Ok(ItemRole::User),
            other => Err(ConversationError::UnknownValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// One slot in the transcript: a question from the assistant or an answer from the user.
///
/// Exactly one of `question` and `answer` is non-empty, chosen by `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQaItem")]
pub struct QaItem {
    role: ItemRole,
    question: String,
    answer: String,
}

#[derive(Deserialize)]
struct RawQaItem {
    role: ItemRole,
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
}

impl TryFrom<RawQaItem> for QaItem {
    type Error = ConversationError;

    fn try_from(raw: RawQaItem) -> Result<Self, Self::Error> {
        QaItem::new(raw.role, raw.question, raw.answer)
    }
}

impl QaItem {
    pub fn new(
        role: ItemRole,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<Self, ConversationError> {
        let question = question.into();
        let answer = answer.into();
        let (filled, spare) = match role {
            ItemRole::Assistant => (&question, &answer),
            ItemRole::User => (&answer, &question),
        };
        if !spare.is_empty() {
            return Err(ConversationError::MismatchedFields { role });
        }
        if filled.trim().is_empty() {
            return Err(ConversationError::EmptyItem { role });
        }
        Ok(Self {
            role,
            question,
            answer,
        })
    }

    pub fn question(text: impl Into<String>) -> Result<Self, ConversationError> {
        Self::new(ItemRole::Assistant, text, String::new())
    }

    pub fn answer(text: impl Into<String>) -> Result<Self, ConversationError> {
        Self::new(ItemRole::User, String::new(), text)
    }

    pub fn role(&self) -> ItemRole {
        self.role
    }

    /// The populated field
    pub fn text(&self) -> &str {
        match self.role {
            ItemRole::Assistant => &self.question,
            ItemRole::User => &self.answer,
        }
    }

    pub fn is_question(&self) -> bool {
        self.role == ItemRole::Assistant
    }
}

/// Where the controller is in the questionnaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingFirstQuestion,
    AwaitingAnswer,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AwaitingFirstQuestion => "awaiting_first_question",
            Stage::AwaitingAnswer => "awaiting_answer",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_first_question" => Ok(Stage::AwaitingFirstQuestion),
            "awaiting_answer" => Ok(Stage::AwaitingAnswer),
            "complete" => Ok(Stage::Complete),
            other => Err(ConversationError::UnknownValue {
                kind: "stage",
                value: other.to_string(),
            }),
        }
    }
}

/// A question paired with its answer by ordinal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// 1-based question number
    pub number: usize,
    pub question: String,
    pub answer: Option<String>,
}

/// Export form of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub question_count: usize,
    pub answer_count: usize,
    pub items: Vec<QaPair>,
}

/// Ordered question/answer transcript for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    items: Vec<QaItem>,
    max_questions: usize,
    stage: Stage,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(max_questions: usize) -> Self {
        Self {
            items: Vec::new(),
            max_questions: max_questions.max(1),
            stage: Stage::AwaitingFirstQuestion,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Rebuild a conversation from stored parts, checking its invariants.
    ///
    /// Stored transcripts may hold several unanswered questions in a row;
    /// answers are paired with questions by ordinal.
    pub fn restore(
        items: Vec<QaItem>,
        max_questions: usize,
        stage: Stage,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ConversationError> {
        let mut questions = 0;
        let mut answers = 0;
        for item in &items {
            match item.role() {
                ItemRole::Assistant => questions += 1,
                ItemRole::User => answers += 1,
            }
            if answers > questions {
                return Err(ConversationError::InvalidHistory(format!(
                    "answer {} has no question before it",
                    answers
                )));
            }
        }
        if questions > max_questions {
            return Err(ConversationError::InvalidHistory(format!(
                "{} questions exceed the limit of {}",
                questions, max_questions
            )));
        }

        match stage {
            Stage::AwaitingFirstQuestion if !items.is_empty() => {
                return Err(ConversationError::invalid_stage(stage, "with items present"));
            }
            Stage::AwaitingAnswer | Stage::Complete if items.is_empty() => {
                return Err(ConversationError::invalid_stage(stage, "with no items"));
            }
            _ => {}
        }

        Ok(Self {
            items,
            max_questions,
            stage,
            started_at,
            completed_at,
        })
    }

    pub fn items(&self) -> &[QaItem] {
        &self.items
    }

    pub fn max_questions(&self) -> usize {
        self.max_questions
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.role() == ItemRole::Assistant)
            .map(QaItem::text)
    }

    pub fn answers(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.role() == ItemRole::User)
            .map(QaItem::text)
    }

    pub fn assistant_count(&self) -> usize {
        self.questions().count()
    }

    pub fn user_answer_count(&self) -> usize {
        self.answers().count()
    }

    /// True once the question limit has been reached
    pub fn is_complete(&self) -> bool {
        self.assistant_count() >= self.max_questions
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Complete
    }

    pub fn remaining_questions(&self) -> usize {
        self.max_questions.saturating_sub(self.assistant_count())
    }

    /// 1-based number of the first question without an answer
    pub fn pending_number(&self) -> Option<usize> {
        if self.stage == Stage::Complete {
            return None;
        }
        let answered = self.user_answer_count();
        (self.assistant_count() > answered).then_some(answered + 1)
    }

    /// The first question not yet answered, located by ordinal.
    ///
    /// Returns `None` for an empty or finished conversation; the controller
    /// supplies the opening question in the empty case.
    pub fn pending_question(&self) -> Option<&str> {
        let number = self.pending_number()?;
        self.questions().nth(number - 1)
    }

    /// Closing sentence of a conversation that ended without its last answer
    pub fn closing_message(&self) -> Option<&str> {
        if self.stage != Stage::Complete || self.assistant_count() <= self.user_answer_count() {
            return None;
        }
        self.questions().last()
    }

    pub fn append(&mut self, item: QaItem) -> Result<(), ConversationError> {
        if self.stage == Stage::Complete {
            return Err(ConversationError::Closed);
        }
        match item.role() {
            ItemRole::Assistant => {
                if let Some(number) = self.pending_number() {
                    return Err(ConversationError::QuestionPending { number });
                }
                if self.is_complete() {
                    return Err(ConversationError::LimitReached {
                        max: self.max_questions,
                    });
                }
                self.items.push(item);
                self.stage = Stage::AwaitingAnswer;
            }
            ItemRole::User => {
                if self.pending_number().is_none() {
                    return Err(ConversationError::NoPendingQuestion);
                }
                self.items.push(item);
            }
        }
        Ok(())
    }

    /// Append a closing sentence as the final assistant item and finish
    pub fn close_with(&mut self, closing: QaItem) -> Result<(), ConversationError> {
        self.append(closing)?;
        self.finish();
        Ok(())
    }

    /// Enter the terminal stage
    pub fn finish(&mut self) {
        if self.stage != Stage::Complete {
            self.stage = Stage::Complete;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Mandatory topics touched by the questions asked so far
    pub fn coverage(&self) -> TopicCoverage {
        TopicCoverage::from_questions(self.questions())
    }

    pub fn pairs(&self) -> Vec<QaPair> {
        let answers: Vec<&str> = self.answers().collect();
        self.questions()
            .enumerate()
            .map(|(i, question)| QaPair {
                number: i + 1,
                question: question.to_string(),
                answer: answers.get(i).map(|a| a.to_string()),
            })
            .collect()
    }

    pub fn transcript(&self, session_id: &str) -> Transcript {
        Transcript {
            session_id: session_id.to_string(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            question_count: self.assistant_count(),
            answer_count: self.user_answer_count(),
            items: self.pairs(),
        }
    }
}

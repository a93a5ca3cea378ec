/// Opening question asked of every new conversation
pub const DEFAULT_FIRST_QUESTION: &str = "What is your product and what does it do?";

/// Closing sentence used when no admissible question could be generated
pub const DEFAULT_FALLBACK_SENTENCE: &str = "Thank you, that's all the questions we needed for now.";

pub const DEFAULT_MAX_QUESTIONS: usize = 10;

/// Similarity score (0-100) at which a candidate counts as a repeat
pub const DEFAULT_DUPLICATE_THRESHOLD: u8 = 80;

/// Questionnaire behaviour shared by the controller and service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionnaireConfig {
    pub max_questions: usize,
    pub duplicate_threshold: u8,
    pub first_question: String,
    pub fallback_sentence: String,
}

impl Default for QuestionnaireConfig {
    fn default() -> Self {
        Self {
            max_questions: DEFAULT_MAX_QUESTIONS,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            first_question: DEFAULT_FIRST_QUESTION.to_string(),
            fallback_sentence: DEFAULT_FALLBACK_SENTENCE.to_string(),
        }
    }
}

impl QuestionnaireConfig {
    /// A zero limit is clamped to one so the opening question can always be asked
    pub fn with_max_questions(mut self, max: usize) -> Self {
        self.max_questions = max.max(1);
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: u8) -> Self {
        self.duplicate_threshold = threshold.min(100);
        self
    }

    pub fn with_first_question(mut self, question: impl Into<String>) -> Self {
        self.first_question = question.into();
        self
    }

    pub fn with_fallback_sentence(mut self, sentence: impl Into<String>) -> Self {
        self.fallback_sentence = sentence.into();
        self
    }
}

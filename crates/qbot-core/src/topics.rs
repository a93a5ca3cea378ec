use serde::{Deserialize, Serialize};
use std::fmt;

/// A business fact every questionnaire should elicit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    TurnaroundTime,
    SupplyCapacity,
    PresentDemand,
    ExpectedDemand,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::TurnaroundTime,
        Topic::SupplyCapacity,
        Topic::PresentDemand,
        Topic::ExpectedDemand,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Topic::TurnaroundTime => "Average Turnaround Time",
            Topic::SupplyCapacity => "Supply Capacity",
            Topic::PresentDemand => "Present Demand",
            Topic::ExpectedDemand => "Expected Demand",
        }
    }

    /// Lowercase phrases that mark a question as addressing the topic.
    ///
    /// Expected demand avoids the literal phrase "expected demand", which the
    /// validator rejects as a forecasting question.
    pub fn cues(&self) -> &'static [&'static str] {
        match self {
            Topic::TurnaroundTime => &[
                "turnaround",
                "lead time",
                "delivery time",
                "processing time",
                "how long does it take",
                "how quickly",
                "how fast",
            ],
            Topic::SupplyCapacity => &[
                "capacity",
                "how many units",
                "production volume",
                "supply",
                "produce per",
                "manufacture per",
                "maximum volume",
            ],
            Topic::PresentDemand => &[
                "current demand",
                "present demand",
                "current order",
                "currently sell",
                "currently serve",
                "existing customers",
                "current customers",
                "orders per month",
                "monthly orders",
                "sales volume",
            ],
            Topic::ExpectedDemand => &[
                "next year",
                "next quarter",
                "coming months",
                "upcoming",
                "anticipate",
                "projected",
                "expect to",
                "plan to grow",
                "future orders",
            ],
        }
    }

    pub fn matches(&self, question: &str) -> bool {
        let lowered = question.to_lowercase();
        self.cues().iter().any(|cue| lowered.contains(cue))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which mandatory topics the asked questions have touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicCoverage {
    covered: [bool; 4],
}

impl TopicCoverage {
    pub fn from_questions<I, S>(questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut coverage = Self::default();
        for question in questions {
            coverage.record(question.as_ref());
        }
        coverage
    }

    pub fn record(&mut self, question: &str) {
        for (i, topic) in Topic::ALL.iter().enumerate() {
            if topic.matches(question) {
                self.covered[i] = true;
            }
        }
    }

    pub fn is_covered(&self, topic: Topic) -> bool {
        Topic::ALL
            .iter()
            .position(|t| *t == topic)
            .map(|i| self.covered[i])
            .unwrap_or(false)
    }

    pub fn uncovered(&self) -> Vec<Topic> {
        Topic::ALL
            .iter()
            .zip(self.covered.iter())
            .filter(|(_, covered)| !**covered)
            .map(|(topic, _)| *topic)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.covered.iter().all(|c| *c)
    }
}

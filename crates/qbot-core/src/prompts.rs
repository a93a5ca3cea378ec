use qbot_llm::ChatMessage;

use crate::{Conversation, ItemRole, Topic, TopicCoverage};

/// Prompt templates for question generation
pub struct QuestionPrompts;

impl QuestionPrompts {
    /// The fixed business-discovery instruction
    pub fn discovery_prompt(max_questions: usize) -> String {
        let topics = Topic::ALL
            .iter()
            .enumerate()
            .map(|(i, topic)| format!("{}. {}", i + 1, topic.label()))
            .collect::<Vec<_>>()
            .join(" ");

        format!(
            "You are a business discovery bot helping a B2B lead generation platform. \
Your goal is to ask {max_questions} intelligent and product-relevant questions to understand the user's offering \
so that your company can find the right customers (buyers) for them. \
Do not ask questions about industry trends or market predictions. \
Do not ask questions the user wouldn't know the answer to. \
Focus on product-specific, logistical, and operational information. \
You must include these {count} mandatory questions (distributed naturally): {topics}.",
            count = Topic::ALL.len(),
        )
    }

    /// Instruction for the next question, given what has been covered so far
    pub fn task_instruction(next_number: usize, max_questions: usize, coverage: &TopicCoverage) -> String {
        let mut instruction = format!(
            "Ask question {next_number} of {max_questions}. \
Reply with exactly one short question and nothing else. \
Never ask about market trends, market size, forecasts or predictions."
        );

        let uncovered = coverage.uncovered();
        if !uncovered.is_empty() {
            let labels = uncovered
                .iter()
                .map(Topic::label)
                .collect::<Vec<_>>()
                .join(", ");
            instruction.push_str(&format!(
                " Mandatory topics not yet covered: {labels}."
            ));

            // Slots left including this one
            let remaining = (max_questions + 1).saturating_sub(next_number);
            if remaining <= uncovered.len() {
                instruction.push_str(" This question must address one of the uncovered mandatory topics.");
            }
        }

        instruction
    }

    /// Clause appended on the retry after a rejected candidate
    pub fn stricter_clause(prior_questions: &[&str]) -> String {
        let mut clause = String::from(
            "IMPORTANT: Avoid forbidden topics such as expected demand, market forecasts, \
market size, market trends and industry predictions. \
Do not repeat or rephrase previously asked questions.",
        );
        if !prior_questions.is_empty() {
            clause.push_str(" Already asked:");
            for question in prior_questions {
                clause.push_str("\n- ");
                clause.push_str(question);
            }
        }
        clause
    }

    /// Full system instruction for one attempt
    pub fn system_instruction(conversation: &Conversation, strict: bool) -> String {
        let max = conversation.max_questions();
        let next_number = conversation.assistant_count() + 1;
        let coverage = conversation.coverage();

        let mut system = Self::discovery_prompt(max);
        system.push_str("\n\n");
        system.push_str(&Self::task_instruction(next_number, max, &coverage));

        if strict {
            let prior: Vec<&str> = conversation.questions().collect();
            system.push_str("\n\n");
            system.push_str(&Self::stricter_clause(&prior));
        }

        system
    }

    /// System instruction followed by the transcript as chat history
    pub fn build_messages(conversation: &Conversation, strict: bool) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(conversation.items().len() + 1);
        messages.push(ChatMessage::system(Self::system_instruction(conversation, strict)));
        messages.extend(conversation.items().iter().map(|item| match item.role() {
            ItemRole::Assistant => ChatMessage::assistant(item.text()),
            ItemRole::User => ChatMessage::user(item.text()),
        }));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QaItem;
    use qbot_llm::Role;

    #[test]
    fn test_discovery_prompt_lists_topics() {
        let prompt = QuestionPrompts::discovery_prompt(10);
        assert!(prompt.contains("ask 10 intelligent"));
        assert!(prompt.contains("1. Average Turnaround Time"));
        assert!(prompt.contains("4. Expected Demand"));
    }

    #[test]
    fn test_task_instruction_forces_topic_when_slots_run_out() {
        let coverage = TopicCoverage::from_questions(["What is your typical lead time?"]);

        let early = QuestionPrompts::task_instruction(2, 10, &coverage);
        assert!(early.contains("Supply Capacity"));
        assert!(!early.contains("must address"));

        // three slots left, three topics uncovered
        let late = QuestionPrompts::task_instruction(8, 10, &coverage);
        assert!(late.contains("must address"));
    }

    #[test]
    fn test_task_instruction_when_all_covered() {
        let coverage = TopicCoverage::from_questions([
            "What is your lead time?",
            "What is your capacity?",
            "What is your current demand?",
            "What volume do you anticipate next year?",
        ]);
        let instruction = QuestionPrompts::task_instruction(10, 10, &coverage);
        assert!(!instruction.contains("Mandatory topics"));
    }

    #[test]
    fn test_build_messages_maps_roles() {
        let mut conv = Conversation::new(10);
        conv.append(QaItem::question("What is your product?").unwrap())
            .unwrap();
        conv.append(QaItem::answer("Steel bolts").unwrap()).unwrap();

        let messages = QuestionPrompts::build_messages(&conv, false);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].content, "Steel bolts");
        assert!(!messages[0].content.contains("IMPORTANT"));

        let strict = QuestionPrompts::build_messages(&conv, true);
        assert!(strict[0].content.contains("Do not repeat"));
        assert!(strict[0].content.contains("- What is your product?"));
    }
}

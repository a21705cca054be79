//! Prompt composition for query generation.

use crate::fewshot::Demonstration;
use crate::provider::ChatMessage;
use crate::state::PlanConstraints;

const SYSTEM_PROMPT: &str = "You translate business questions into a single SQLite query.
Rules:
- Reply with one SELECT (or WITH ... SELECT) statement and nothing else.
- Use only tables and columns listed in the schema.
- SQLite dialect: strftime('%Y', col) for date parts, date('now') for today, LIMIT n instead of TOP n.
- Apply every constraint exactly as given.
- Never modify data.";

/// The failed attempt fed back during repair
#[derive(Debug, Clone, PartialEq)]
pub struct PriorAttempt {
    pub query: Option<String>,
    pub error: String,
}

/// Everything the generator prompt is built from
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub question: &'a str,
    pub schema: &'a str,
    pub constraints: &'a PlanConstraints,
    pub demonstrations: Vec<&'a Demonstration>,
    pub prior: Option<&'a PriorAttempt>,
}

impl PromptContext<'_> {
    fn constraint_block(&self) -> String {
        if self.constraints.is_empty() {
            return "none".to_string();
        }
        self.constraints
            .iter()
            .map(|(name, constraint)| format!("- {}", constraint.render(name)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn request_block(&self) -> String {
        let mut text = format!(
            "Schema:\n{}\n\nConstraints:\n{}\n\nQuestion: {}",
            self.schema.trim(),
            self.constraint_block(),
            self.question.trim()
        );
        if let Some(prior) = self.prior {
            if let Some(query) = &prior.query {
                text.push_str(&format!("\n\nPrevious query:\n{}", query));
            }
            text.push_str(&format!(
                "\n\nThe previous attempt failed with:\n{}\nReturn a corrected query.",
                prior.error
            ));
        }
        text
    }

    /// Render to chat messages: system rules, demonstrations as turns, then the request.
    pub fn render(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        for demo in &self.demonstrations {
            let mut user = String::new();
            if !demo.input.context.trim().is_empty() {
                user.push_str(&format!("Context: {}\n", demo.input.context.trim()));
            }
            user.push_str(&format!("Question: {}", demo.input.question.trim()));
            messages.push(ChatMessage::user(user));
            messages.push(ChatMessage::assistant(demo.expected_query.trim()));
        }
        messages.push(ChatMessage::user(self.request_block()));
        messages
    }
}

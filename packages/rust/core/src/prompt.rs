//! Prompt text for the assistant.

use studycards_shared::helpers::truncate_text;
use studycards_shared::{Card, Deck, UserProgress};

/// Card text longer than this is cut in the context block.
const MAX_CARD_CHARS: usize = 500;

/// System message for answering a learner's question.
pub const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful learning assistant. Your goal is to help users understand their study materials better and provide relevant suggestions.";

/// System message for generating suggestion lists.
pub const SUGGESTIONS_SYSTEM_PROMPT: &str =
    "Generate relevant learning suggestions based on the user's context.";

/// Everything the answer prompt can mention.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub question: &'a str,
    pub current_card: Option<&'a Card>,
    pub current_deck: Option<&'a Deck>,
    pub user_progress: Option<&'a UserProgress>,
}

/// Build the user message for an assistant question.
pub fn build_answer_prompt(ctx: &PromptContext<'_>) -> String {
    let mut context = String::new();

    if let Some(card) = ctx.current_card {
        context.push_str(&format!(
            "Current card: {}\n",
            truncate_text(&card.front, MAX_CARD_CHARS)
        ));
    }
    if let Some(deck) = ctx.current_deck {
        context.push_str(&format!("Current deck: {}\n", deck.name));
    }
    if let Some(progress) = ctx.user_progress {
        let json = serde_json::to_string(progress).unwrap_or_default();
        context.push_str(&format!("User progress: {json}\n"));
    }

    format!(
        "Context:
{context}
User question: {question}

Please provide:
1. A helpful answer to the user's question
2. Related topics that might be helpful
3. Confidence level in your response (0-1)
4. Follow-up suggestions for learning

Format your reply using these line prefixes:
Answer: <your answer>
Related topics: <comma-separated topics>
Confidence: <a number between 0 and 1>
Suggestions:
- <one suggestion per line>
",
        question = ctx.question.trim(),
    )
}

/// Build the user message for a suggestions request.
pub fn build_suggestions_prompt(context: &serde_json::Value) -> String {
    let json = serde_json::to_string_pretty(context).unwrap_or_default();
    format!(
        "Based on the following context, generate relevant learning suggestions:

{json}

Please provide 3-5 specific suggestions that would help the user learn more effectively.
"
    )
}

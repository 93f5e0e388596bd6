//! The study assistant: question answering, suggestions and related cards.
//!
//! `ask` runs the whole pipeline for one question:
//!
//! 1. Load the user's progress (unknown user is unauthorized)
//! 2. Resolve the current deck and card referenced by the request
//! 3. Build the prompt and make one completion call
//! 4. Parse the reply into answer / topics / confidence / suggestions
//! 5. Cross-reference related topics against stored cards

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use studycards_shared::{OpenAiConfig, Result, StudyCardsError};
use studycards_storage::Storage;

use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::{
    ANSWER_SYSTEM_PROMPT, PromptContext, SUGGESTIONS_SYSTEM_PROMPT, build_answer_prompt,
    build_suggestions_prompt,
};
use crate::reply::{parse_reply, parse_suggestions};
use crate::study;

/// Reference to a card or deck the learner is looking at.
///
/// Clients send whole objects; only the id is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantContext {
    #[serde(default)]
    pub current_card: Option<ContextRef>,
    #[serde(default)]
    pub current_deck: Option<ContextRef>,
}

/// A learner's question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: Option<AssistantContext>,
}

/// The assistant's structured answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponse {
    pub answer: String,
    pub suggestions: Vec<String>,
    pub related_cards: Vec<String>,
    pub confidence: f64,
}

/// Progress callback for assistant calls.
pub trait AssistantProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
}

/// No-op assistant progress.
pub struct SilentProgress;

impl AssistantProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
}

/// Assistant bound to a store and a completion client.
pub struct Assistant {
    storage: Arc<Storage>,
    llm: LlmClient,
    max_tokens: u32,
    suggestions_max_tokens: u32,
}

impl Assistant {
    pub fn new(storage: Arc<Storage>, config: &OpenAiConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            storage,
            llm: LlmClient::new(config, api_key)?,
            max_tokens: config.max_tokens,
            suggestions_max_tokens: config.suggestions_max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Answer a learner's question.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn ask(
        &self,
        user_id: &str,
        request: &AssistantRequest,
        progress: &dyn AssistantProgress,
    ) -> Result<AssistantResponse> {
        progress.phase("Loading study context");
        let user_progress = study::user_progress(&self.storage, user_id)
            .await
            .map_err(unauthorized_if_missing)?;

        let context = request.context.as_ref();
        let current_deck = match context.and_then(|c| c.current_deck.as_ref()) {
            Some(deck) => self.storage.get_deck(&deck.id).await?,
            None => None,
        };
        let current_card = match context.and_then(|c| c.current_card.as_ref()) {
            Some(card) => self.storage.get_card(&card.id).await?,
            None => None,
        };

        let prompt = build_answer_prompt(&PromptContext {
            question: &request.prompt,
            current_card: current_card.as_ref(),
            current_deck: current_deck.as_ref(),
            user_progress: Some(&user_progress),
        });

        progress.phase("Asking the assistant");
        let messages = [
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let reply = self.llm.complete(&messages, self.max_tokens).await?;
        let parsed = parse_reply(&reply);

        progress.phase("Finding related cards");
        let related_cards = self
            .cards_for_topics(
                &parsed.related_topics,
                current_card.as_ref().map(|c| c.id.as_str()),
            )
            .await;

        info!(
            topics = parsed.related_topics.len(),
            related = related_cards.len(),
            confidence = parsed.confidence,
            "assistant answered"
        );

        Ok(AssistantResponse {
            answer: parsed.answer,
            suggestions: parsed.suggestions,
            related_cards,
            confidence: parsed.confidence,
        })
    }

    /// Generate up to five learning suggestions for an arbitrary context.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn suggest(&self, user_id: &str, context: &serde_json::Value) -> Result<Vec<String>> {
        self.storage
            .require_user(user_id)
            .await
            .map_err(unauthorized_if_missing)?;

        let messages = [
            ChatMessage::system(SUGGESTIONS_SYSTEM_PROMPT),
            ChatMessage::user(build_suggestions_prompt(context)),
        ];
        let reply = self
            .llm
            .complete(&messages, self.suggestions_max_tokens)
            .await?;

        let suggestions = parse_suggestions(&reply);
        info!(count = suggestions.len(), "suggestions generated");
        Ok(suggestions)
    }

    /// IDs of cards sharing a tag with `card_id`.
    #[instrument(skip(self))]
    pub async fn related_cards(&self, card_id: &str) -> Result<Vec<String>> {
        self.storage.related_card_ids(card_id).await
    }

    /// Lookup failures are logged and treated as "no related cards".
    async fn cards_for_topics(&self, topics: &[String], exclude_id: Option<&str>) -> Vec<String> {
        if topics.is_empty() {
            return Vec::new();
        }

        match self.storage.find_cards_by_topics(topics, exclude_id).await {
            Ok(cards) => cards.into_iter().map(|c| c.id).collect(),
            Err(e) => {
                warn!(error = %e, "related card lookup failed");
                Vec::new()
            }
        }
    }
}

fn unauthorized_if_missing(e: StudyCardsError) -> StudyCardsError {
    if e.is_not_found() {
        StudyCardsError::Unauthorized("Unauthorized".into())
    } else {
        e
    }
}

//! Reviews, deck statistics and user progress.

use chrono::{DateTime, Utc};
use tracing::instrument;

use studycards_shared::{Card, Deck, DeckStats, Difficulty, Result, UserProgress};
use studycards_storage::Storage;

/// Record a review of a card with the difficulty the learner rated it.
#[instrument(skip(storage))]
pub async fn review_card(storage: &Storage, card_id: &str, difficulty: Difficulty) -> Result<Card> {
    storage.record_review(card_id, difficulty).await
}

/// Aggregate review statistics for a deck.
pub fn deck_stats(deck: &Deck) -> DeckStats {
    let total_cards = deck.cards.len();
    let reviewed_cards = deck
        .cards
        .iter()
        .filter(|c| c.last_reviewed.is_some())
        .count();

    let average_difficulty = if total_cards == 0 {
        0.0
    } else {
        let sum: f64 = deck.cards.iter().map(|c| c.difficulty.weight()).sum();
        sum / total_cards as f64
    };

    DeckStats {
        total_cards,
        reviewed_cards,
        average_difficulty,
        last_reviewed: deck.cards.iter().filter_map(|c| c.last_reviewed).max(),
    }
}

/// Learning progress for `user_id`. Fails with `NotFound` for unknown users.
#[instrument(skip(storage))]
pub async fn user_progress(storage: &Storage, user_id: &str) -> Result<UserProgress> {
    let user = storage.require_user(user_id).await?;
    let cards = storage.list_cards().await?;
    let decks = storage.list_decks_by_author(user_id).await?;

    Ok(progress_from(
        &cards,
        decks.len(),
        user.preferences.daily_goal,
        Utc::now(),
    ))
}

fn progress_from(
    cards: &[Card],
    deck_count: usize,
    daily_goal: u32,
    now: DateTime<Utc>,
) -> UserProgress {
    let today = now.date_naive();

    UserProgress {
        total_cards: cards.len(),
        reviewed_cards: cards.iter().filter(|c| c.review_count > 0).count(),
        total_reviews: cards.iter().map(|c| u64::from(c.review_count)).sum(),
        deck_count,
        daily_goal,
        reviewed_today: cards
            .iter()
            .filter(|c| c.last_reviewed.is_some_and(|t| t.date_naive() == today))
            .count(),
    }
}

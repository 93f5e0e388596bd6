//! Card records.

use chrono::{DateTime, Utc};
use libsql::params;
use studycards_shared::helpers::normalize_tags;
use studycards_shared::{Card, CardCreate, CardUpdate, Difficulty, Result, StudyCardsError, new_id};

use crate::{Storage, get_string, get_time, storage_err, tags_from_json, tags_to_json};

const CARD_COLUMNS: &str =
    "id, front, back, tags_json, difficulty, review_count, last_reviewed, created_at, updated_at";

impl Storage {
    /// Insert a new card built from `dto` and return it.
    pub async fn insert_card(&self, dto: &CardCreate) -> Result<Card> {
        let now = Utc::now();
        let card = Card {
            id: new_id(),
            front: dto.front.trim().to_string(),
            back: dto.back.trim().to_string(),
            tags: normalize_tags(&dto.tags),
            created_at: now,
            updated_at: now,
            last_reviewed: None,
            difficulty: dto.difficulty.unwrap_or_default(),
            review_count: 0,
        };

        let _guard = self.write_lock().await;
        self.conn
            .execute(
                "INSERT INTO cards (id, front, back, tags_json, difficulty, review_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![
                    card.id.as_str(),
                    card.front.as_str(),
                    card.back.as_str(),
                    tags_to_json(&card.tags)?,
                    card.difficulty.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(card_id = %card.id, "card created");
        Ok(card)
    }

    /// Get a card by ID.
    pub async fn get_card(&self, id: &str) -> Result<Option<Card>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_card(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get a card by ID, failing with `NotFound` when absent.
    pub async fn require_card(&self, id: &str) -> Result<Card> {
        self.get_card(id)
            .await?
            .ok_or_else(|| StudyCardsError::not_found("card", id))
    }

    /// List all cards in insertion order.
    pub async fn list_cards(&self) -> Result<Vec<Card>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY rowid"),
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_card(&row)?);
        }
        Ok(results)
    }

    /// Apply a partial update and return the updated card.
    pub async fn update_card(&self, id: &str, update: &CardUpdate) -> Result<Card> {
        let _guard = self.write_lock().await;
        let mut card = self.require_card(id).await?;

        if let Some(front) = &update.front {
            card.front = front.trim().to_string();
        }
        if let Some(back) = &update.back {
            card.back = back.trim().to_string();
        }
        if let Some(tags) = &update.tags {
            card.tags = normalize_tags(tags);
        }
        if let Some(difficulty) = update.difficulty {
            card.difficulty = difficulty;
        }
        card.updated_at = Utc::now();

        self.write_card(&card).await?;
        Ok(card)
    }

    /// Record a review: bump the count, stamp `last_reviewed`, store the rating.
    ///
    /// The increment happens in SQL so concurrent reviews all count.
    pub async fn record_review(&self, id: &str, difficulty: Difficulty) -> Result<Card> {
        let _guard = self.write_lock().await;
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn
            .execute(
                "UPDATE cards SET review_count = review_count + 1, last_reviewed = ?1,
                   difficulty = ?2, updated_at = ?1
                 WHERE id = ?3",
                params![now, difficulty.as_str(), id],
            )
            .await
            .map_err(storage_err)?;

        if updated == 0 {
            return Err(StudyCardsError::not_found("card", id));
        }

        let card = self.require_card(id).await?;
        tracing::debug!(card_id = %id, %difficulty, reviews = card.review_count, "review recorded");
        Ok(card)
    }

    /// Delete a card and drop it from every deck.
    pub async fn delete_card(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock().await;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let deleted = tx
            .execute("DELETE FROM cards WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        if deleted == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(StudyCardsError::not_found("card", id));
        }

        tx.execute("DELETE FROM deck_cards WHERE card_id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Cards matching any of `topics`, never including `exclude_id`.
    ///
    /// A topic matches a card when it equals one of the card's tags or
    /// occurs in its front or back text (case-insensitive).
    pub async fn find_cards_by_topics(
        &self,
        topics: &[String],
        exclude_id: Option<&str>,
    ) -> Result<Vec<Card>> {
        let topics: Vec<String> = topics
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        if topics.is_empty() {
            return Ok(Vec::new());
        }

        let cards = self.list_cards().await?;
        Ok(cards
            .into_iter()
            .filter(|card| Some(card.id.as_str()) != exclude_id)
            .filter(|card| {
                let front = card.front.to_lowercase();
                let back = card.back.to_lowercase();
                topics.iter().any(|topic| {
                    card.tags.iter().any(|tag| tag == topic)
                        || front.contains(topic.as_str())
                        || back.contains(topic.as_str())
                })
            })
            .collect())
    }

    /// IDs of other cards sharing at least one tag with `card_id`.
    pub async fn related_card_ids(&self, card_id: &str) -> Result<Vec<String>> {
        let card = self.require_card(card_id).await?;
        if card.tags.is_empty() {
            return Ok(Vec::new());
        }

        let cards = self.list_cards().await?;
        Ok(cards
            .into_iter()
            .filter(|other| other.id != card.id)
            .filter(|other| other.tags.iter().any(|t| card.tags.contains(t)))
            .map(|other| other.id)
            .collect())
    }

    async fn write_card(&self, card: &Card) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cards SET front = ?1, back = ?2, tags_json = ?3, difficulty = ?4,
                   review_count = ?5, last_reviewed = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    card.front.as_str(),
                    card.back.as_str(),
                    tags_to_json(&card.tags)?,
                    card.difficulty.as_str(),
                    i64::from(card.review_count),
                    card.last_reviewed.map(|t| t.to_rfc3339()),
                    card.updated_at.to_rfc3339(),
                    card.id.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

/// Convert a row selected with `CARD_COLUMNS` to a [`Card`].
pub(crate) fn row_to_card(row: &libsql::Row) -> Result<Card> {
    let difficulty: String = get_string(row, 4)?;
    let last_reviewed: Option<DateTime<Utc>> = match row.get::<String>(6).ok() {
        Some(s) => Some(crate::parse_time(&s)?),
        None => None,
    };

    Ok(Card {
        id: get_string(row, 0)?,
        front: get_string(row, 1)?,
        back: get_string(row, 2)?,
        tags: tags_from_json(&get_string(row, 3)?)?,
        difficulty: difficulty.parse().map_err(StudyCardsError::Storage)?,
        review_count: row.get::<i64>(5).map_err(storage_err)? as u32,
        last_reviewed,
        created_at: get_time(row, 7)?,
        updated_at: get_time(row, 8)?,
    })
}

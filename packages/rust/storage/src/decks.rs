//! Deck records and ordered deck membership.

use chrono::Utc;
use libsql::params;
use studycards_shared::helpers::normalize_tags;
use studycards_shared::{Card, Deck, DeckCreate, DeckUpdate, Result, StudyCardsError, new_id};

use crate::cards::row_to_card;
use crate::{Storage, get_string, get_time, storage_err, tags_from_json, tags_to_json};

const DECK_COLUMNS: &str =
    "id, name, description, tags_json, is_public, author_id, created_at, updated_at";

impl Storage {
    /// Insert a new, empty deck.
    pub async fn insert_deck(&self, dto: &DeckCreate, author_id: Option<&str>) -> Result<Deck> {
        let now = Utc::now();
        let deck = Deck {
            id: new_id(),
            name: dto.name.trim().to_string(),
            description: dto.description.trim().to_string(),
            cards: Vec::new(),
            created_at: now,
            updated_at: now,
            tags: normalize_tags(&dto.tags),
            is_public: dto.is_public,
            author_id: author_id.map(String::from),
        };

        let _guard = self.write_lock().await;
        self.conn
            .execute(
                "INSERT INTO decks (id, name, description, tags_json, is_public, author_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    deck.id.as_str(),
                    deck.name.as_str(),
                    deck.description.as_str(),
                    tags_to_json(&deck.tags)?,
                    deck.is_public as i64,
                    deck.author_id.as_deref(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(deck_id = %deck.id, name = %deck.name, "deck created");
        Ok(deck)
    }

    /// Get a deck (with its cards) by ID.
    pub async fn get_deck(&self, id: &str) -> Result<Option<Deck>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(storage_err)?;

        let mut deck = match rows.next().await {
            Ok(Some(row)) => row_to_deck(&row)?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };
        deck.cards = self.deck_cards(&deck.id).await?;
        Ok(Some(deck))
    }

    /// Get a deck by ID, failing with `NotFound` when absent.
    pub async fn require_deck(&self, id: &str) -> Result<Deck> {
        self.get_deck(id)
            .await?
            .ok_or_else(|| StudyCardsError::not_found("deck", id))
    }

    /// List all decks (with cards) in insertion order.
    pub async fn list_decks(&self) -> Result<Vec<Deck>> {
        self.query_decks(
            &format!("SELECT {DECK_COLUMNS} FROM decks ORDER BY rowid"),
            None,
        )
        .await
    }

    /// List the decks authored by `author_id`.
    pub async fn list_decks_by_author(&self, author_id: &str) -> Result<Vec<Deck>> {
        self.query_decks(
            &format!("SELECT {DECK_COLUMNS} FROM decks WHERE author_id = ?1 ORDER BY rowid"),
            Some(author_id),
        )
        .await
    }

    /// Apply a partial update and return the updated deck.
    pub async fn update_deck(&self, id: &str, update: &DeckUpdate) -> Result<Deck> {
        let _guard = self.write_lock().await;
        let mut deck = self.require_deck(id).await?;

        if let Some(name) = &update.name {
            deck.name = name.trim().to_string();
        }
        if let Some(description) = &update.description {
            deck.description = description.trim().to_string();
        }
        if let Some(tags) = &update.tags {
            deck.tags = normalize_tags(tags);
        }
        if let Some(is_public) = update.is_public {
            deck.is_public = is_public;
        }
        deck.updated_at = Utc::now();

        self.conn
            .execute(
                "UPDATE decks SET name = ?1, description = ?2, tags_json = ?3, is_public = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    deck.name.as_str(),
                    deck.description.as_str(),
                    tags_to_json(&deck.tags)?,
                    deck.is_public as i64,
                    deck.updated_at.to_rfc3339(),
                    deck.id.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(deck)
    }

    /// Delete a deck and its membership rows. Cards themselves are kept.
    pub async fn delete_deck(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock().await;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let deleted = tx
            .execute("DELETE FROM decks WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        if deleted == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(StudyCardsError::not_found("deck", id));
        }

        tx.execute("DELETE FROM deck_cards WHERE deck_id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Append a card to the end of a deck. Adding a card twice is a no-op.
    pub async fn add_card_to_deck(&self, deck_id: &str, card_id: &str) -> Result<Deck> {
        let _guard = self.write_lock().await;
        self.require_deck(deck_id).await?;
        self.require_card(card_id).await?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO deck_cards (deck_id, card_id, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM deck_cards WHERE deck_id = ?1))",
                params![deck_id, card_id],
            )
            .await
            .map_err(storage_err)?;

        self.touch_deck(deck_id).await?;
        self.require_deck(deck_id).await
    }

    /// Remove a card from a deck.
    pub async fn remove_card_from_deck(&self, deck_id: &str, card_id: &str) -> Result<Deck> {
        let _guard = self.write_lock().await;
        let removed = self
            .conn
            .execute(
                "DELETE FROM deck_cards WHERE deck_id = ?1 AND card_id = ?2",
                params![deck_id, card_id],
            )
            .await
            .map_err(storage_err)?;

        if removed == 0 {
            self.require_deck(deck_id).await?;
            return Err(StudyCardsError::not_found("deck card", card_id));
        }

        self.touch_deck(deck_id).await?;
        self.require_deck(deck_id).await
    }

    async fn touch_deck(&self, deck_id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE decks SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), deck_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Cards belonging to a deck, in deck order.
    async fn deck_cards(&self, deck_id: &str) -> Result<Vec<Card>> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.id, c.front, c.back, c.tags_json, c.difficulty, c.review_count,
                        c.last_reviewed, c.created_at, c.updated_at
                 FROM deck_cards dc
                 JOIN cards c ON c.id = dc.card_id
                 WHERE dc.deck_id = ?1
                 ORDER BY dc.position",
                params![deck_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_card(&row)?);
        }
        Ok(results)
    }

    async fn query_decks(&self, sql: &str, author_id: Option<&str>) -> Result<Vec<Deck>> {
        let mut rows = match author_id {
            Some(author) => self.conn.query(sql, params![author]).await,
            None => self.conn.query(sql, params![]).await,
        }
        .map_err(storage_err)?;

        let mut decks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            decks.push(row_to_deck(&row)?);
        }
        for deck in &mut decks {
            deck.cards = self.deck_cards(&deck.id).await?;
        }
        Ok(decks)
    }
}

/// Convert a row selected with `DECK_COLUMNS` to a [`Deck`] without cards.
fn row_to_deck(row: &libsql::Row) -> Result<Deck> {
    Ok(Deck {
        id: get_string(row, 0)?,
        name: get_string(row, 1)?,
        description: get_string(row, 2)?,
        tags: tags_from_json(&get_string(row, 3)?)?,
        is_public: row.get::<i64>(4).map_err(storage_err)? != 0,
        author_id: row.get::<String>(5).ok(),
        cards: Vec::new(),
        created_at: get_time(row, 6)?,
        updated_at: get_time(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_storage;
    use studycards_shared::{CardCreate, DeckCreate, DeckUpdate};

    fn deck(name: &str) -> DeckCreate {
        DeckCreate {
            name: name.into(),
            description: "Systems programming".into(),
            tags: vec!["Rust".into()],
            is_public: false,
        }
    }

    fn card(front: &str) -> CardCreate {
        CardCreate {
            front: front.into(),
            back: "answer".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deck_crud() {
        let storage = test_storage().await;

        let created = storage
            .insert_deck(&deck("Rust basics"), Some("user-1"))
            .await
            .expect("insert deck");
        assert!(created.cards.is_empty());
        assert_eq!(created.tags, vec!["rust"]);
        assert_eq!(created.author_id.as_deref(), Some("user-1"));

        let updated = storage
            .update_deck(
                &created.id,
                &DeckUpdate {
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("update deck");
        assert!(updated.is_public);
        assert_eq!(updated.name, "Rust basics");

        let found = storage.get_deck(&created.id).await.unwrap().unwrap();
        assert!(found.is_public);

        let by_author = storage.list_decks_by_author("user-1").await.unwrap();
        assert_eq!(by_author.len(), 1);
        assert!(storage.list_decks_by_author("user-2").await.unwrap().is_empty());

        storage.delete_deck(&created.id).await.expect("delete deck");
        assert!(storage.get_deck(&created.id).await.unwrap().is_none());
        assert!(storage.delete_deck(&created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn deck_membership_is_ordered() {
        let storage = test_storage().await;
        let d = storage.insert_deck(&deck("Ordered"), None).await.unwrap();
        let first = storage.insert_card(&card("first")).await.unwrap();
        let second = storage.insert_card(&card("second")).await.unwrap();

        storage.add_card_to_deck(&d.id, &second.id).await.unwrap();
        storage.add_card_to_deck(&d.id, &first.id).await.unwrap();
        // Re-adding keeps the original position.
        let with_cards = storage.add_card_to_deck(&d.id, &second.id).await.unwrap();

        let fronts: Vec<_> = with_cards.cards.iter().map(|c| c.front.as_str()).collect();
        assert_eq!(fronts, vec!["second", "first"]);

        let after_remove = storage.remove_card_from_deck(&d.id, &second.id).await.unwrap();
        assert_eq!(after_remove.cards.len(), 1);
        assert!(
            storage
                .remove_card_from_deck(&d.id, &second.id)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn deleting_card_removes_membership() {
        let storage = test_storage().await;
        let d = storage.insert_deck(&deck("Cascade"), None).await.unwrap();
        let c = storage.insert_card(&card("gone soon")).await.unwrap();
        storage.add_card_to_deck(&d.id, &c.id).await.unwrap();

        storage.delete_card(&c.id).await.unwrap();
        let reloaded = storage.get_deck(&d.id).await.unwrap().unwrap();
        assert!(reloaded.cards.is_empty());
        assert_eq!(membership_rows(&storage).await, 0);
    }

    #[tokio::test]
    async fn adding_unknown_card_fails() {
        let storage = test_storage().await;
        let d = storage.insert_deck(&deck("Strict"), None).await.unwrap();
        let err = storage.add_card_to_deck(&d.id, "missing").await.unwrap_err();
        assert!(err.is_not_found());
        let err = storage.add_card_to_deck("missing", "missing").await.unwrap_err();
        assert!(err.to_string().contains("deck"));
    }

    async fn membership_rows(storage: &crate::Storage) -> i64 {
        let mut rows = storage
            .conn
            .query("SELECT COUNT(*) FROM deck_cards", libsql::params![])
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test]
    async fn deleting_deck_clears_membership_rows() {
        let storage = test_storage().await;
        let d = storage.insert_deck(&deck("Doomed"), None).await.unwrap();
        let c = storage.insert_card(&card("survivor")).await.unwrap();
        storage.add_card_to_deck(&d.id, &c.id).await.unwrap();
        assert_eq!(membership_rows(&storage).await, 1);

        assert!(storage.delete_deck("missing").await.unwrap_err().is_not_found());
        assert_eq!(membership_rows(&storage).await, 1);

        storage.delete_deck(&d.id).await.unwrap();
        assert_eq!(membership_rows(&storage).await, 0);
        assert!(storage.get_card(&c.id).await.unwrap().is_some());

        // The connection is usable after a rolled back delete.
        let again = storage.insert_deck(&deck("Next"), None).await.unwrap();
        assert!(storage.get_deck(&again.id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_get_distinct_positions() {
        let storage = std::sync::Arc::new(test_storage().await);
        let d = storage.insert_deck(&deck("Busy"), None).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..20 {
            let storage = std::sync::Arc::clone(&storage);
            let deck_id = d.id.clone();
            handles.push(tokio::spawn(async move {
                let c = storage.insert_card(&card(&format!("card {n}"))).await?;
                storage.add_card_to_deck(&deck_id, &c.id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut rows = storage
            .conn
            .query(
                "SELECT COUNT(DISTINCT position) FROM deck_cards WHERE deck_id = ?1",
                libsql::params![d.id.as_str()],
            )
            .await
            .unwrap();
        let distinct: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(distinct, 20);
        assert_eq!(storage.require_deck(&d.id).await.unwrap().cards.len(), 20);
    }
}

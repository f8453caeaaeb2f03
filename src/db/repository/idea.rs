use chrono::Utc;

use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Ideas Repository
// ============================================================================

pub struct IdeaRepository;

impl IdeaRepository {
    pub async fn list_sections(pool: &SqlitePool) -> AppResult<Vec<IdeaSection>> {
        let rows = sqlx::query("SELECT key, title FROM idea_sections ORDER BY key ASC")
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows
            .iter()
            .map(|r| IdeaSection {
                key: r.get("key"),
                title: r.get("title"),
            })
            .collect())
    }

    /// Sections with their items, in the grouped wire shape the board page
    /// consumes.
    pub async fn fetch_grouped(pool: &SqlitePool) -> AppResult<Vec<IdeaSectionPayload>> {
        let sections = Self::list_sections(pool).await?;

        let items = sqlx::query(
            "SELECT id, section_key, text, created_at FROM idea_items ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        let items: Vec<IdeaItem> = items
            .iter()
            .map(|r| IdeaItem {
                id: r.get("id"),
                section_key: r.get("section_key"),
                text: r.get("text"),
                created_at: r.get("created_at"),
            })
            .collect();

        Ok(sections
            .into_iter()
            .map(|sec| {
                let grouped = items
                    .iter()
                    .filter(|it| it.section_key == sec.key)
                    .map(|it| IdeaItemPayload {
                        id: it.id.clone(),
                        text: it.text.clone(),
                    })
                    .collect();
                IdeaSectionPayload {
                    key: sec.key,
                    title: sec.title,
                    items: grouped,
                }
            })
            .collect())
    }

    /// Whole-document replace, as the board page saves: clear everything and
    /// insert the payload in one transaction. Items arriving without an id
    /// get a freshly minted token.
    pub async fn replace_all(pool: &SqlitePool, data: &[IdeaSectionPayload]) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("DELETE FROM idea_items")
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        sqlx::query("DELETE FROM idea_sections")
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        for sec in data {
            sqlx::query("INSERT INTO idea_sections (key, title) VALUES (?, ?)")
                .bind(&sec.key)
                .bind(&sec.title)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;

            for item in &sec.items {
                let id = if item.id.trim().is_empty() {
                    new_item_token()
                } else {
                    item.id.clone()
                };
                // OR REPLACE: a client re-sending the same token twice keeps
                // the last occurrence instead of failing the whole swap.
                sqlx::query(
                    "INSERT OR REPLACE INTO idea_items (id, section_key, text, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(&sec.key)
                .bind(&item.text)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(AppError::Database)?;
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Create a section, or retitle it when the key already exists.
    pub async fn upsert_section(pool: &SqlitePool, key: &str, title: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idea_sections (key, title)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET title = excluded.title
            "#,
        )
        .bind(key)
        .bind(title)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Delete a section and all of its items in one transaction, so no
    /// orphaned items are ever observable. Returns `false` when the key does
    /// not exist.
    pub async fn delete_section(pool: &SqlitePool, key: &str) -> AppResult<bool> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("DELETE FROM idea_items WHERE section_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        let result = sqlx::query("DELETE FROM idea_sections WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Add one item under an existing section. Returns the stored item, with
    /// a minted id when the caller supplied none.
    pub async fn add_item(
        pool: &SqlitePool,
        section_key: &str,
        id: Option<&str>,
        text: &str,
    ) -> AppResult<Option<IdeaItemPayload>> {
        let section = sqlx::query("SELECT key FROM idea_sections WHERE key = ?")
            .bind(section_key)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;
        if section.is_none() {
            return Ok(None);
        }

        let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => new_item_token(),
        };

        sqlx::query("INSERT INTO idea_items (id, section_key, text, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(section_key)
            .bind(text)
            .bind(Utc::now().naive_utc())
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(Some(IdeaItemPayload {
            id,
            text: text.to_string(),
        }))
    }

    pub async fn update_item(
        pool: &SqlitePool,
        section_key: &str,
        id: &str,
        text: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query("UPDATE idea_items SET text = ? WHERE section_key = ? AND id = ?")
            .bind(text)
            .bind(section_key)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_item(pool: &SqlitePool, section_key: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM idea_items WHERE section_key = ? AND id = ?")
            .bind(section_key)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Items for one section, earliest first.
    pub async fn items_for_section(pool: &SqlitePool, key: &str) -> AppResult<Vec<IdeaItem>> {
        let rows = sqlx::query(
            "SELECT id, section_key, text, created_at FROM idea_items WHERE section_key = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(key)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .iter()
            .map(|r| IdeaItem {
                id: r.get("id"),
                section_key: r.get("section_key"),
                text: r.get("text"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}

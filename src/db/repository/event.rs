use chrono::Utc;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};
use crate::services::schedule;

// ============================================================================
// Event Repository
// ============================================================================

pub struct EventRepository;

const EVENT_COLUMNS: &str = r#"
    id, title, img, description, location, provisional,
    starts_at, attendees, tags, created_at, updated_at
"#;

fn row_to_event(r: &SqliteRow) -> Event {
    let attendees: String = r.get("attendees");
    let tags: String = r.get("tags");
    Event {
        id: r.get("id"),
        title: r.get("title"),
        img: r.get("img"),
        description: r.get("description"),
        location: r.get("location"),
        provisional: r.get("provisional"),
        starts_at: r.get("starts_at"),
        attendees: serde_json::from_str(&attendees).unwrap_or_default(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

impl EventRepository {
    /// All events, earliest first. The listing pages rely on this order.
    pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Event>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events ORDER BY starts_at ASC, id ASC",
            EVENT_COLUMNS
        ))
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Event>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM events WHERE id = ?",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.as_ref().map(row_to_event))
    }

    /// Resolve a lookup key to a row. Id lookups are direct; natural-key
    /// lookups fetch the title's candidates and filter on the derived civil
    /// strings, since those only exist in the fixed timezone. First match in
    /// `starts_at` order wins.
    pub async fn resolve(pool: &SqlitePool, key: &EventMatch) -> AppResult<Option<Event>> {
        match key {
            EventMatch::ById { id } => Self::find_by_id(pool, *id).await,
            EventMatch::ByKey {
                title,
                date,
                time,
                starts_at,
            } => {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM events WHERE title = ? ORDER BY starts_at ASC, id ASC",
                    EVENT_COLUMNS
                ))
                .bind(title)
                .fetch_all(pool)
                .await
                .map_err(AppError::Database)?;

                let want_date = normalized(date);
                let want_time = normalized(time);

                Ok(rows.iter().map(row_to_event).find(|ev| {
                    let (d, t) = schedule::civil_parts(ev.starts_at);
                    want_date.map_or(true, |w| d == w)
                        && want_time.map_or(true, |w| t == w)
                        && starts_at.map_or(true, |s| ev.starts_at == s.naive_utc())
                }))
            }
        }
    }

    pub async fn create(pool: &SqlitePool, new: NewEvent) -> AppResult<Event> {
        let now = Utc::now().naive_utc();
        let attendees = serde_json::to_string(&dedup_attendees(&new.attendees))
            .map_err(|e| AppError::Internal(e.into()))?;
        let tags =
            serde_json::to_string(&new.tags).map_err(|e| AppError::Internal(e.into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                title, img, description, location, provisional,
                starts_at, attendees, tags, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.title)
        .bind(&new.img)
        .bind(&new.description)
        .bind(&new.location)
        .bind(new.provisional)
        .bind(new.starts_at.naive_utc())
        .bind(&attendees)
        .bind(&tags)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        let id = result.last_insert_rowid();
        Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("inserted event {} not found", id)))
    }

    /// Apply a partial patch to the row the key resolves to. A patched civil
    /// `date` or `time` recomputes the stored instant from the patched-or-
    /// current strings; everything is written in one statement so the patch
    /// commits wholly or not at all. Returns `None` when nothing matched.
    pub async fn update(
        pool: &SqlitePool,
        key: &EventMatch,
        patch: &EventPatch,
    ) -> AppResult<Option<Event>> {
        let Some(current) = Self::resolve(pool, key).await? else {
            return Ok(None);
        };

        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(AppError::Validation("title requerido".to_string()));
            }
        }

        let starts_at = if patch.date.is_some() || patch.time.is_some() {
            let (cur_date, cur_time) = schedule::civil_parts(current.starts_at);
            let date = normalized(&patch.date).unwrap_or(&cur_date);
            let time = normalized(&patch.time).unwrap_or(&cur_time);
            schedule::combine_civil(date, time)?.naive_utc()
        } else {
            current.starts_at
        };

        let title = patch.title.clone().unwrap_or(current.title);
        let img = patch.img.clone().unwrap_or(current.img);
        let description = patch.description.clone().unwrap_or(current.description);
        let location = patch.location.clone().unwrap_or(current.location);
        let provisional = patch.provisional.unwrap_or(current.provisional);
        let attendees = dedup_attendees(patch.attendees.as_ref().unwrap_or(&current.attendees));
        let tags = patch.tags.clone().unwrap_or(current.tags);

        let attendees_json =
            serde_json::to_string(&attendees).map_err(|e| AppError::Internal(e.into()))?;
        let tags_json = serde_json::to_string(&tags).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            UPDATE events SET
                title = ?, img = ?, description = ?, location = ?, provisional = ?,
                starts_at = ?, attendees = ?, tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&title)
        .bind(&img)
        .bind(&description)
        .bind(&location)
        .bind(provisional)
        .bind(starts_at)
        .bind(&attendees_json)
        .bind(&tags_json)
        .bind(Utc::now().naive_utc())
        .bind(current.id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_id(pool, current.id).await
    }

    /// Delete the row the key resolves to. Returns `false` when nothing
    /// matched so the handler can report not-found distinctly from success.
    pub async fn delete(pool: &SqlitePool, key: &EventMatch) -> AppResult<bool> {
        let Some(current) = Self::resolve(pool, key).await? else {
            return Ok(false);
        };

        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(current.id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Authoritative attendance mutation: re-read the stored attendee set,
    /// recompute membership for `user` and apply the requested action,
    /// reporting the concrete action performed. A client's optimistic guess
    /// never enters this computation.
    pub async fn apply_attendance(
        pool: &SqlitePool,
        key: &EventMatch,
        user: &str,
        requested: AttendAction,
    ) -> AppResult<Option<(Event, EffectiveAction)>> {
        let Some(current) = Self::resolve(pool, key).await? else {
            return Ok(None);
        };

        let is_member = current.attendees.iter().any(|a| a == user);
        let effective = match requested {
            AttendAction::Toggle => {
                if is_member {
                    EffectiveAction::Remove
                } else {
                    EffectiveAction::Add
                }
            }
            AttendAction::Add => {
                if is_member {
                    EffectiveAction::Noop
                } else {
                    EffectiveAction::Add
                }
            }
            AttendAction::Remove => {
                if is_member {
                    EffectiveAction::Remove
                } else {
                    EffectiveAction::Noop
                }
            }
        };

        if effective == EffectiveAction::Noop {
            return Ok(Some((current, EffectiveAction::Noop)));
        }

        let mut attendees = current.attendees.clone();
        match effective {
            EffectiveAction::Add => attendees.push(user.to_string()),
            EffectiveAction::Remove => attendees.retain(|a| a != user),
            EffectiveAction::Noop => unreachable!(),
        }
        let attendees = dedup_attendees(&attendees);
        let attendees_json =
            serde_json::to_string(&attendees).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query("UPDATE events SET attendees = ?, updated_at = ? WHERE id = ?")
            .bind(&attendees_json)
            .bind(Utc::now().naive_utc())
            .bind(current.id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        let updated = Self::find_by_id(pool, current.id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("event {} vanished", current.id)))?;

        Ok(Some((updated, effective)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::test_pool;

    fn new_event(title: &str, date: &str, time: &str) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            img: String::new(),
            description: String::new(),
            location: String::new(),
            provisional: false,
            starts_at: schedule::combine_civil(date, time).unwrap(),
            attendees: vec![],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_list_orders_by_start() {
        let pool = test_pool().await;

        EventRepository::create(&pool, new_event("Cordà", "2025-09-17", "23:30"))
            .await
            .unwrap();
        EventRepository::create(&pool, new_event("Ofrenda", "2025-09-16", "20:00"))
            .await
            .unwrap();

        let events = EventRepository::list(&pool).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Ofrenda");
        assert_eq!(events[1].title, "Cordà");
        assert_eq!(events[0].location, "");
        assert!(!events[0].provisional);
        assert!(events[0].attendees.is_empty());
    }

    #[tokio::test]
    async fn natural_key_without_time_is_a_wildcard() {
        let pool = test_pool().await;

        let morning = EventRepository::create(&pool, new_event("Pasacalle", "2025-09-14", "10:00"))
            .await
            .unwrap();
        EventRepository::create(&pool, new_event("Pasacalle", "2025-09-15", "10:00"))
            .await
            .unwrap();

        // No time dimension: any row with that title on that date matches.
        let key = EventMatch::by_key("Pasacalle", Some("2025-09-14"), None);
        let found = EventRepository::resolve(&pool, &key).await.unwrap().unwrap();
        assert_eq!(found.id, morning.id);

        // Blank time behaves the same as absent.
        let key = EventMatch::ByKey {
            title: "Pasacalle".to_string(),
            date: Some("2025-09-14".to_string()),
            time: Some("".to_string()),
            starts_at: None,
        };
        let found = EventRepository::resolve(&pool, &key).await.unwrap().unwrap();
        assert_eq!(found.id, morning.id);
    }

    #[tokio::test]
    async fn id_and_natural_key_resolve_the_same_row() {
        let pool = test_pool().await;

        let created = EventRepository::create(&pool, new_event("Ofrenda", "2025-09-16", "20:00"))
            .await
            .unwrap();

        let by_id = EventRepository::resolve(&pool, &EventMatch::by_id(created.id))
            .await
            .unwrap()
            .unwrap();
        let by_key = EventRepository::resolve(
            &pool,
            &EventMatch::by_key("Ofrenda", Some("2025-09-16"), Some("20:00")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(by_id.id, by_key.id);
    }

    #[tokio::test]
    async fn partial_patch_leaves_other_fields_alone() {
        let pool = test_pool().await;

        let mut new = new_event("Ofrenda", "2025-09-16", "20:00");
        new.location = "Iglesia".to_string();
        new.attendees = vec!["Alba".to_string()];
        let created = EventRepository::create(&pool, new).await.unwrap();

        let patch = EventPatch {
            location: Some("Plaza".to_string()),
            ..Default::default()
        };
        let updated = EventRepository::update(&pool, &EventMatch::by_id(created.id), &patch)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.location, "Plaza");
        assert_eq!(updated.title, "Ofrenda");
        assert_eq!(updated.starts_at, created.starts_at);
        assert_eq!(updated.attendees, vec!["Alba"]);
        assert!(!updated.provisional);
    }

    #[tokio::test]
    async fn patching_time_shifts_the_instant_in_the_fixed_timezone() {
        let pool = test_pool().await;

        let created = EventRepository::create(&pool, new_event("Ofrenda", "2025-09-16", "20:00"))
            .await
            .unwrap();

        let patch = EventPatch {
            time: Some("21:00".to_string()),
            ..Default::default()
        };
        let key = EventMatch::by_key("Ofrenda", Some("2025-09-16"), Some("20:00"));
        let updated = EventRepository::update(&pool, &key, &patch)
            .await
            .unwrap()
            .unwrap();

        let (date, time) = schedule::civil_parts(updated.starts_at);
        assert_eq!(date, "2025-09-16");
        assert_eq!(time, "21:00");
        assert_eq!(
            updated.starts_at - created.starts_at,
            chrono::Duration::hours(1)
        );
    }

    #[tokio::test]
    async fn update_on_missing_row_reports_none() {
        let pool = test_pool().await;
        let patch = EventPatch::default();
        let res = EventRepository::update(&pool, &EventMatch::by_id(99), &patch)
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn delete_distinguishes_missing_from_deleted() {
        let pool = test_pool().await;
        let created = EventRepository::create(&pool, new_event("Cordà", "2025-09-17", "23:30"))
            .await
            .unwrap();

        assert!(EventRepository::delete(&pool, &EventMatch::by_id(created.id))
            .await
            .unwrap());
        assert!(!EventRepository::delete(&pool, &EventMatch::by_id(created.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn attendance_toggle_flips_membership_and_reports_it() {
        let pool = test_pool().await;
        let created = EventRepository::create(&pool, new_event("Ofrenda", "2025-09-16", "20:00"))
            .await
            .unwrap();
        let key = EventMatch::by_id(created.id);

        let (ev, action) =
            EventRepository::apply_attendance(&pool, &key, "Alba", AttendAction::Toggle)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(action, EffectiveAction::Add);
        assert_eq!(ev.attendees, vec!["Alba"]);

        let (ev, action) =
            EventRepository::apply_attendance(&pool, &key, "Alba", AttendAction::Toggle)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(action, EffectiveAction::Remove);
        assert!(ev.attendees.is_empty());
    }

    #[tokio::test]
    async fn explicit_add_and_remove_report_noop_when_already_satisfied() {
        let pool = test_pool().await;
        let created = EventRepository::create(&pool, new_event("Cordà", "2025-09-17", "23:30"))
            .await
            .unwrap();
        let key = EventMatch::by_id(created.id);

        let (_, action) = EventRepository::apply_attendance(&pool, &key, "Pau", AttendAction::Add)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action, EffectiveAction::Add);

        let (ev, action) = EventRepository::apply_attendance(&pool, &key, "Pau", AttendAction::Add)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action, EffectiveAction::Noop);
        assert_eq!(ev.attendees, vec!["Pau"]);

        let (_, action) =
            EventRepository::apply_attendance(&pool, &key, "Pau", AttendAction::Remove)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(action, EffectiveAction::Remove);

        let (ev, action) =
            EventRepository::apply_attendance(&pool, &key, "Pau", AttendAction::Remove)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(action, EffectiveAction::Noop);
        assert!(ev.attendees.is_empty());
    }

    #[tokio::test]
    async fn attendance_on_unknown_event_is_none() {
        let pool = test_pool().await;
        let res = EventRepository::apply_attendance(
            &pool,
            &EventMatch::by_key("Nada", None, None),
            "Alba",
            AttendAction::Toggle,
        )
        .await
        .unwrap();
        assert!(res.is_none());
    }
}

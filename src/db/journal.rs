use super::predicate::{text, QueryBuilder};
use super::projects::find_project;
use super::tasks::find_task;
use super::{
    format_date, format_time, merge_metadata, new_id, parse_date, parse_metadata, parse_string_list,
    parse_time, Database,
};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Attachment, EntryType, JournalEntry, JournalFilters, JournalReferences, JournalUpdate,
    NewJournalEntry, TimeOfDay,
};
use crate::rules::{count_words, reading_time_minutes, validate_rating};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

const ENTRY_COLUMNS: &str = "j.id, j.user_id, j.title, j.content, j.entry_type, j.entry_date, j.time_of_day, \
     j.tags_json, j.mood_rating, j.energy_level, j.related_task_ids_json, j.related_project_ids_json, \
     j.attachments_json, j.metadata_json, j.word_count, j.reading_time_minutes, j.created_at, j.updated_at";

const ENTRY_ORDER: &str = "j.entry_date DESC, j.created_at DESC, j.id ASC";
const DEFAULT_SEARCH_LIMIT: u32 = 10;

impl Database {
    pub fn create_journal_entry(&self, owner: &str, payload: NewJournalEntry) -> AppResult<JournalEntry> {
        if payload.content.trim().is_empty() {
            return Err(AppError::Validation("Content is required".to_string()));
        }
        let mood_rating = validate_rating(payload.mood_rating, "Mood rating")?;
        let energy_level = validate_rating(payload.energy_level, "Energy level")?;
        let now = Utc::now();
        let word_count = count_words(&payload.content);

        let entry = JournalEntry {
            id: new_id(),
            user_id: owner.to_string(),
            title: clean_title(payload.title),
            entry_type: payload.entry_type.unwrap_or_default(),
            entry_date: payload.entry_date.unwrap_or_else(|| now.date_naive()),
            time_of_day: payload.time_of_day,
            tags: clean_list(payload.tags),
            mood_rating,
            energy_level,
            related_task_ids: clean_list(payload.related_task_ids),
            related_project_ids: clean_list(payload.related_project_ids),
            attachments: payload.attachments,
            metadata: payload.metadata.unwrap_or_default(),
            word_count,
            reading_time_minutes: reading_time_minutes(word_count),
            content: payload.content,
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO journal_entries (
               id, user_id, title, content, entry_type, entry_date, time_of_day, tags_json,
               mood_rating, energy_level, related_task_ids_json, related_project_ids_json,
               attachments_json, metadata_json, word_count, reading_time_minutes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
            params![
                entry.id,
                entry.user_id,
                entry.title,
                entry.content,
                entry.entry_type.as_str(),
                format_date(&entry.entry_date),
                entry.time_of_day.map(TimeOfDay::as_str),
                serde_json::to_string(&entry.tags)?,
                entry.mood_rating,
                entry.energy_level,
                serde_json::to_string(&entry.related_task_ids)?,
                serde_json::to_string(&entry.related_project_ids)?,
                serde_json::to_string(&entry.attachments)?,
                serde_json::to_string(&entry.metadata)?,
                entry.word_count,
                entry.reading_time_minutes,
                format_time(&now),
            ],
        )?;
        Ok(entry)
    }

    pub fn get_journal_entry(&self, owner: &str, id: &str) -> AppResult<Option<JournalEntry>> {
        let conn = self.lock()?;
        find_entry(&conn, owner, id).map_err(AppError::from)
    }

    /// Owned entries matching every supplied filter, newest entry date first.
    pub fn list_journal_entries(
        &self,
        owner: &str,
        filters: Option<&JournalFilters>,
    ) -> AppResult<Vec<JournalEntry>> {
        let default_filters = JournalFilters::default();
        let filters = filters.unwrap_or(&default_filters);

        let mut query = owned_entries_query(owner);
        query
            .eq("j.entry_type", filters.entry_type.map(|kind| text(kind.as_str())))
            .at_least("j.entry_date", filters.date_from.as_ref().map(|date| text(format_date(date))))
            .at_most("j.entry_date", filters.date_to.as_ref().map(|date| text(format_date(date))))
            .eq("j.time_of_day", filters.time_of_day.map(|slot| text(slot.as_str())))
            .json_array_contains_any("j.tags_json", filters.tags.as_deref().unwrap_or_default())
            .at_least("j.mood_rating", filters.mood_min)
            .at_most("j.mood_rating", filters.mood_max)
            .at_least("j.energy_level", filters.energy_min)
            .at_most("j.energy_level", filters.energy_max)
            .contains_text(&["j.title", "j.content"], filters.search.as_deref())
            .json_array_contains("j.related_task_ids_json", filters.related_to_task.as_deref())
            .json_array_contains("j.related_project_ids_json", filters.related_to_project.as_deref())
            .order_by(ENTRY_ORDER)
            .paginate(filters.limit, filters.offset);

        let conn = self.lock()?;
        query.query(&conn, parse_entry_row).map_err(AppError::from)
    }

    /// Title/content search capped at `limit` entries (ten when unset).
    pub fn search_journal(&self, owner: &str, term: &str, limit: Option<u32>) -> AppResult<Vec<JournalEntry>> {
        let mut query = owned_entries_query(owner);
        query
            .contains_text(&["j.title", "j.content"], Some(term))
            .order_by(ENTRY_ORDER)
            .paginate(Some(limit.unwrap_or(DEFAULT_SEARCH_LIMIT)), None);
        let conn = self.lock()?;
        query.query(&conn, parse_entry_row).map_err(AppError::from)
    }

    pub fn update_journal_entry(&self, owner: &str, id: &str, update: JournalUpdate) -> AppResult<JournalEntry> {
        if let Some(content) = &update.content {
            if content.trim().is_empty() {
                return Err(AppError::Validation("Content cannot be empty".to_string()));
            }
        }
        let mood_rating = update
            .mood_rating
            .map(|rating| validate_rating(rating, "Mood rating"))
            .transpose()?;
        let energy_level = update
            .energy_level
            .map(|level| validate_rating(level, "Energy level"))
            .transpose()?;

        let conn = self.lock()?;
        let mut entry = find_entry(&conn, owner, id)?
            .ok_or_else(|| AppError::not_found("Journal entry", "update"))?;

        if let Some(title) = update.title {
            entry.title = clean_title(title);
        }
        if let Some(content) = update.content {
            entry.word_count = count_words(&content);
            entry.reading_time_minutes = reading_time_minutes(entry.word_count);
            entry.content = content;
        }
        if let Some(entry_type) = update.entry_type {
            entry.entry_type = entry_type;
        }
        if let Some(entry_date) = update.entry_date {
            entry.entry_date = entry_date;
        }
        if let Some(time_of_day) = update.time_of_day {
            entry.time_of_day = time_of_day;
        }
        if let Some(tags) = update.tags {
            entry.tags = clean_list(tags);
        }
        if let Some(mood_rating) = mood_rating {
            entry.mood_rating = mood_rating;
        }
        if let Some(energy_level) = energy_level {
            entry.energy_level = energy_level;
        }
        if let Some(ids) = update.related_task_ids {
            entry.related_task_ids = clean_list(ids);
        }
        if let Some(ids) = update.related_project_ids {
            entry.related_project_ids = clean_list(ids);
        }
        if let Some(attachments) = update.attachments {
            entry.attachments = attachments;
        }
        if let Some(metadata) = update.metadata {
            merge_metadata(&mut entry.metadata, metadata);
        }
        entry.updated_at = Utc::now();

        conn.execute(
            "UPDATE journal_entries SET
               title = ?1, content = ?2, entry_type = ?3, entry_date = ?4, time_of_day = ?5, tags_json = ?6,
               mood_rating = ?7, energy_level = ?8, related_task_ids_json = ?9, related_project_ids_json = ?10,
               attachments_json = ?11, metadata_json = ?12, word_count = ?13, reading_time_minutes = ?14,
               updated_at = ?15
             WHERE id = ?16 AND user_id = ?17",
            params![
                entry.title,
                entry.content,
                entry.entry_type.as_str(),
                format_date(&entry.entry_date),
                entry.time_of_day.map(TimeOfDay::as_str),
                serde_json::to_string(&entry.tags)?,
                entry.mood_rating,
                entry.energy_level,
                serde_json::to_string(&entry.related_task_ids)?,
                serde_json::to_string(&entry.related_project_ids)?,
                serde_json::to_string(&entry.attachments)?,
                serde_json::to_string(&entry.metadata)?,
                entry.word_count,
                entry.reading_time_minutes,
                format_time(&entry.updated_at),
                id,
                owner,
            ],
        )?;
        Ok(entry)
    }

    pub fn delete_journal_entry(&self, owner: &str, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM journal_entries WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
        )?;
        Ok(changed > 0)
    }

    /// Resolves an entry's soft references. Ids that no longer resolve (deleted,
    /// or not visible to `owner`) are reported back rather than treated as errors.
    pub fn resolve_journal_references(&self, owner: &str, entry_id: &str) -> AppResult<JournalReferences> {
        let conn = self.lock()?;
        let entry = find_entry(&conn, owner, entry_id)?
            .ok_or_else(|| AppError::not_found("Journal entry", "access"))?;

        let mut references = JournalReferences::default();
        for task_id in &entry.related_task_ids {
            match find_task(&conn, owner, task_id)? {
                Some(task) => references.tasks.push(task),
                None => references.missing_task_ids.push(task_id.clone()),
            }
        }
        for project_id in &entry.related_project_ids {
            match find_project(&conn, owner, project_id)? {
                Some(project) => references.projects.push(project),
                None => references.missing_project_ids.push(project_id.clone()),
            }
        }
        Ok(references)
    }
}

fn owned_entries_query(owner: &str) -> QueryBuilder {
    QueryBuilder::new(
        &format!("SELECT {} FROM journal_entries j WHERE j.user_id = ?", ENTRY_COLUMNS),
        vec![text(owner)],
    )
}

fn find_entry(conn: &Connection, owner: &str, id: &str) -> rusqlite::Result<Option<JournalEntry>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM journal_entries j WHERE j.id = ?1 AND j.user_id = ?2",
            ENTRY_COLUMNS
        ),
        params![id, owner],
        parse_entry_row,
    )
    .optional()
}

fn clean_title(title: Option<String>) -> Option<String> {
    title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Trims, drops blanks and repeats, keeps first-seen order.
fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !cleaned.iter().any(|existing| existing == value) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}

fn parse_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalEntry> {
    let entry_type_raw: String = row.get(4)?;
    let time_of_day_raw: Option<String> = row.get(6)?;
    let attachments_raw: String = row.get(12)?;
    Ok(JournalEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        entry_type: EntryType::parse(&entry_type_raw).unwrap_or_default(),
        entry_date: parse_date(&row.get::<_, String>(5)?)?,
        time_of_day: time_of_day_raw.as_deref().and_then(TimeOfDay::parse),
        tags: parse_string_list(&row.get::<_, String>(7)?),
        mood_rating: row.get(8)?,
        energy_level: row.get(9)?,
        related_task_ids: parse_string_list(&row.get::<_, String>(10)?),
        related_project_ids: parse_string_list(&row.get::<_, String>(11)?),
        attachments: serde_json::from_str::<Vec<Attachment>>(&attachments_raw).unwrap_or_default(),
        metadata: parse_metadata(&row.get::<_, String>(13)?),
        word_count: row.get(14)?,
        reading_time_minutes: row.get(15)?,
        created_at: parse_time(&row.get::<_, String>(16)?)?,
        updated_at: parse_time(&row.get::<_, String>(17)?)?,
    })
}

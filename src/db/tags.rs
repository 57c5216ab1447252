use super::predicate::{escape_like, text, QueryBuilder};
use super::tasks::{parse_task_row, TASK_COLUMNS};
use super::{format_time, new_id, parse_time, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{NewTag, Tag, TagUpdate, TagUsage, Task};
use crate::rules::{normalize_tag_name, validate_color, validate_tag_name, DEFAULT_TAG_COLOR};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) const TAG_COLUMNS: &str = "g.id, g.user_id, g.name, g.color, g.created_at, g.updated_at";

const SUGGESTION_LIMIT: u32 = 5;
const MAX_SUGGESTION_KEYWORDS: usize = 20;

impl Database {
    pub fn create_tag(&self, owner: &str, payload: NewTag) -> AppResult<Tag> {
        let name = normalize_tag_name(&payload.name);
        validate_tag_name(&name)?;
        let color = match payload.color.as_deref() {
            Some(color) if !color.trim().is_empty() => validate_color(color)?,
            _ => DEFAULT_TAG_COLOR.to_string(),
        };

        let conn = self.lock()?;
        if name_taken(&conn, owner, &name, None)? {
            return Err(AppError::Conflict("A tag with this name already exists".to_string()));
        }
        insert_tag(&conn, owner, &name, &color)
    }

    pub fn get_tag(&self, owner: &str, id: &str) -> AppResult<Option<Tag>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM tags g WHERE g.id = ?1 AND g.user_id = ?2", TAG_COLUMNS),
            params![id, owner],
            parse_tag_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn find_tag_by_name(&self, owner: &str, name: &str) -> AppResult<Option<Tag>> {
        let name = normalize_tag_name(name);
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM tags g WHERE g.name = ?1 AND g.user_id = ?2", TAG_COLUMNS),
            params![name, owner],
            parse_tag_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Every owned tag with how many tasks carry it, alphabetically.
    pub fn list_tags(&self, owner: &str) -> AppResult<Vec<TagUsage>> {
        let mut query = usage_query(owner);
        query.order_by("g.name ASC");
        let conn = self.lock()?;
        query.query(&conn, parse_usage_row).map_err(AppError::from)
    }

    pub fn update_tag(&self, owner: &str, id: &str, update: TagUpdate) -> AppResult<Tag> {
        let name = match update.name.as_deref() {
            Some(raw) => {
                let name = normalize_tag_name(raw);
                validate_tag_name(&name)?;
                Some(name)
            }
            None => None,
        };
        let color = update.color.as_deref().map(validate_color).transpose()?;

        let conn = self.lock()?;
        let mut tag = conn
            .query_row(
                &format!("SELECT {} FROM tags g WHERE g.id = ?1 AND g.user_id = ?2", TAG_COLUMNS),
                params![id, owner],
                parse_tag_row,
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("Tag", "update"))?;

        if let Some(name) = name {
            if name_taken(&conn, owner, &name, Some(id))? {
                return Err(AppError::Conflict("A tag with this name already exists".to_string()));
            }
            tag.name = name;
        }
        if let Some(color) = color {
            tag.color = color;
        }
        tag.updated_at = Utc::now();

        conn.execute(
            "UPDATE tags SET name = ?1, color = ?2, updated_at = ?3 WHERE id = ?4 AND user_id = ?5",
            params![tag.name, tag.color, format_time(&tag.updated_at), id, owner],
        )?;
        Ok(tag)
    }

    /// Drops the tag's task links and the tag itself in one transaction.
    pub fn delete_tag(&self, owner: &str, id: &str) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let owned = tx
            .query_row(
                "SELECT 1 FROM tags WHERE id = ?1 AND user_id = ?2",
                params![id, owner],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !owned {
            return Ok(false);
        }

        let unlinked = tx.execute("DELETE FROM task_tags WHERE tag_id = ?1", [id])?;
        tx.execute("DELETE FROM tags WHERE id = ?1 AND user_id = ?2", params![id, owner])?;
        tx.commit()?;

        tracing::info!(tag_id = %id, unlinked, "tag deleted");
        Ok(true)
    }

    pub fn tags_by_color(&self, owner: &str, color: &str) -> AppResult<Vec<Tag>> {
        let color = validate_color(color)?;
        let mut query = owned_tags_query(owner);
        query.eq_text("g.color", Some(color.as_str())).order_by("g.name ASC");
        let conn = self.lock()?;
        query.query(&conn, parse_tag_row).map_err(AppError::from)
    }

    /// Tags attached to at least one task, busiest first.
    pub fn most_used_tags(&self, owner: &str, limit: u32) -> AppResult<Vec<TagUsage>> {
        let mut query = usage_query(owner);
        query
            .and_clause("EXISTS (SELECT 1 FROM task_tags tt WHERE tt.tag_id = g.id)")
            .order_by("task_count DESC, g.name ASC")
            .paginate(Some(limit), None);
        let conn = self.lock()?;
        query.query(&conn, parse_usage_row).map_err(AppError::from)
    }

    /// Tags no task carries, newest first.
    pub fn unused_tags(&self, owner: &str) -> AppResult<Vec<Tag>> {
        let mut query = owned_tags_query(owner);
        query
            .and_clause("NOT EXISTS (SELECT 1 FROM task_tags tt WHERE tt.tag_id = g.id)")
            .order_by("g.created_at DESC, g.id ASC");
        let conn = self.lock()?;
        query.query(&conn, parse_tag_row).map_err(AppError::from)
    }

    /// Visible tasks carrying the tag, most recently touched first.
    pub fn tasks_by_tag(&self, owner: &str, tag_id: &str) -> AppResult<Vec<Task>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM tasks t
             JOIN task_tags tt ON tt.task_id = t.id
             JOIN tags g ON g.id = tt.tag_id AND g.user_id = ?1
             LEFT JOIN projects p ON p.id = t.project_id
             WHERE tt.tag_id = ?2 AND (t.user_id = ?1 OR p.user_id = ?1)
             ORDER BY t.updated_at DESC, t.id ASC",
            TASK_COLUMNS
        ))?;
        let rows = statement.query_map(params![owner, tag_id], parse_task_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn search_tags(&self, owner: &str, term: &str) -> AppResult<Vec<Tag>> {
        let mut query = owned_tags_query(owner);
        query
            .contains_text(&["g.name"], Some(term))
            .order_by("g.name ASC");
        let conn = self.lock()?;
        query.query(&conn, parse_tag_row).map_err(AppError::from)
    }

    /// Existing tags whose name overlaps a keyword (longer than two characters)
    /// of the task text.
    pub fn suggest_tags(&self, owner: &str, title: &str, description: &str) -> AppResult<Vec<Tag>> {
        let mut keywords = format!("{} {}", title, description)
            .to_lowercase()
            .split_whitespace()
            .filter(|word| word.chars().count() > 2)
            .map(str::to_string)
            .collect::<Vec<_>>();
        keywords.sort();
        keywords.dedup();
        keywords.truncate(MAX_SUGGESTION_KEYWORDS);
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let clause = vec!["g.name LIKE ? ESCAPE '\\'"; keywords.len()].join(" OR ");
        let mut query = owned_tags_query(owner);
        query
            .and(
                &clause,
                keywords
                    .iter()
                    .map(|word| text(format!("%{}%", escape_like(word)))),
            )
            .order_by("g.name ASC")
            .paginate(Some(SUGGESTION_LIMIT), None);
        let conn = self.lock()?;
        query.query(&conn, parse_tag_row).map_err(AppError::from)
    }

    pub fn is_tag_name_unique(&self, owner: &str, name: &str, exclude_id: Option<&str>) -> AppResult<bool> {
        let name = normalize_tag_name(name);
        let conn = self.lock()?;
        Ok(!name_taken(&conn, owner, &name, exclude_id)?)
    }

    pub fn used_tag_colors(&self, owner: &str) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut statement =
            conn.prepare("SELECT DISTINCT color FROM tags WHERE user_id = ?1 ORDER BY color ASC")?;
        let rows = statement.query_map([owner], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Creates every valid, not yet existing name in one transaction and
    /// returns only the tags that were created.
    pub fn bulk_create_tags(&self, owner: &str, names: &[String]) -> AppResult<Vec<Tag>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut created: Vec<Tag> = Vec::new();
        for raw in names {
            let name = normalize_tag_name(raw);
            if let Err(error) = validate_tag_name(&name) {
                tracing::debug!(name = %raw, error = %error, "skipping invalid tag name");
                continue;
            }
            if created.iter().any(|tag| tag.name == name) || name_taken(&tx, owner, &name, None)? {
                continue;
            }
            created.push(insert_tag(&tx, owner, &name, DEFAULT_TAG_COLOR)?);
        }
        tx.commit()?;
        Ok(created)
    }
}

fn insert_tag(conn: &Connection, owner: &str, name: &str, color: &str) -> AppResult<Tag> {
    let now = Utc::now();
    let id = new_id();
    conn.execute(
        "INSERT INTO tags (id, user_id, name, color, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, owner, name, color, format_time(&now)],
    )?;
    Ok(Tag {
        id,
        user_id: owner.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        created_at: now,
        updated_at: now,
    })
}

fn owned_tags_query(owner: &str) -> QueryBuilder {
    QueryBuilder::new(
        &format!("SELECT {} FROM tags g WHERE g.user_id = ?", TAG_COLUMNS),
        vec![text(owner)],
    )
}

fn usage_query(owner: &str) -> QueryBuilder {
    QueryBuilder::new(
        &format!(
            "SELECT {}, (SELECT COUNT(*) FROM task_tags tt WHERE tt.tag_id = g.id) AS task_count
             FROM tags g WHERE g.user_id = ?",
            TAG_COLUMNS
        ),
        vec![text(owner)],
    )
}

fn name_taken(conn: &Connection, owner: &str, name: &str, exclude_id: Option<&str>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM tags WHERE user_id = ?1 AND name = ?2 AND (?3 IS NULL OR id <> ?3)",
        params![owner, name, exclude_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

pub(super) fn parse_tag_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_usage_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagUsage> {
    Ok(TagUsage {
        tag: parse_tag_row(row)?,
        task_count: row.get(6)?,
    })
}

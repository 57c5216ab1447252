use super::predicate::{text, QueryBuilder};
use super::tags::{parse_tag_row, TAG_COLUMNS};
use super::{
    format_time, merge_metadata, new_id, owned_project_exists, parse_metadata, parse_optional_time,
    parse_time, Database,
};
use crate::errors::{AppError, AppResult};
use crate::models::{NewTask, Priority, Tag, Task, TaskFilters, TaskStatus, TaskUpdate};
use crate::rules::{normalize_tag_name, require_text};
use chrono::Utc;
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) const TASK_COLUMNS: &str = "t.id, t.user_id, t.project_id, t.parent_task_id, t.title, t.description, t.status, \
     t.priority, t.due_date, t.completed_at, t.metadata_json, t.created_at, t.updated_at";

/// A task is visible to its owner and to the owner of its project.
const VISIBLE_TASKS: &str = "FROM tasks t LEFT JOIN projects p ON p.id = t.project_id \
     WHERE (t.user_id = ? OR p.user_id = ?)";

/// Most urgent first, then earliest due date with undated tasks last.
static TASK_ORDER: Lazy<String> = Lazy::new(|| {
    let ranks = [Priority::Urgent, Priority::High, Priority::Medium, Priority::Low]
        .iter()
        .map(|priority| format!("WHEN '{}' THEN {}", priority.as_str(), priority.rank()))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "CASE t.priority {} ELSE 5 END ASC, t.due_date IS NULL ASC, t.due_date ASC, t.created_at ASC, t.id ASC",
        ranks
    )
});

impl Database {
    pub fn create_task(&self, owner: &str, payload: NewTask) -> AppResult<Task> {
        let title = require_text(&payload.title, "Task title is required and cannot be empty")?;
        let project_id = payload
            .project_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let parent_task_id = payload
            .parent_task_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let status = payload.status.unwrap_or_default();
        let now = Utc::now();

        let task = Task {
            id: new_id(),
            user_id: owner.to_string(),
            project_id,
            parent_task_id,
            title,
            description: payload.description.unwrap_or_default().trim().to_string(),
            status,
            priority: payload.priority.unwrap_or_default(),
            due_date: payload.due_date,
            completed_at: (status == TaskStatus::Completed).then_some(now),
            metadata: payload.metadata.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock()?;
        if let Some(project_id) = &task.project_id {
            if !owned_project_exists(&conn, owner, project_id)? {
                return Err(AppError::not_found("Project", "add tasks to"));
            }
        }
        if let Some(parent_id) = &task.parent_task_id {
            let parent = find_task(&conn, owner, parent_id)?
                .ok_or_else(|| AppError::not_found("Parent task", "access"))?;
            if parent.parent_task_id.is_some() {
                return Err(AppError::Validation(
                    "Subtasks cannot have subtasks of their own".to_string(),
                ));
            }
        }

        conn.execute(
            "INSERT INTO tasks (
               id, user_id, project_id, parent_task_id, title, description, status, priority,
               due_date, completed_at, metadata_json, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                task.id,
                task.user_id,
                task.project_id,
                task.parent_task_id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date.as_ref().map(format_time),
                task.completed_at.as_ref().map(format_time),
                serde_json::to_string(&task.metadata)?,
                format_time(&now),
            ],
        )?;
        Ok(task)
    }

    pub fn get_task(&self, owner: &str, id: &str) -> AppResult<Option<Task>> {
        let conn = self.lock()?;
        find_task(&conn, owner, id).map_err(AppError::from)
    }

    /// Visible tasks matching every supplied filter. `None` lists everything visible.
    pub fn list_tasks(&self, owner: &str, filters: Option<&TaskFilters>) -> AppResult<Vec<Task>> {
        let default_filters = TaskFilters::default();
        let filters = filters.unwrap_or(&default_filters);

        let mut query = visible_tasks_query(owner);
        query
            .eq_text("t.project_id", filters.project_id.as_deref())
            .eq("t.status", filters.status.map(|status| text(status.as_str())))
            .eq("t.priority", filters.priority.map(|priority| text(priority.as_str())))
            .contains_text(&["t.title", "t.description"], filters.search.as_deref())
            .at_most("t.due_date", filters.due_before.as_ref().map(|due| text(format_time(due))))
            .at_least("t.due_date", filters.due_after.as_ref().map(|due| text(format_time(due))))
            .eq_text("t.parent_task_id", filters.parent_task_id.as_deref());

        if let Some(tag) = filters.tag.as_deref() {
            let tag = normalize_tag_name(tag);
            if !tag.is_empty() {
                query.and(
                    "EXISTS (SELECT 1 FROM task_tags tt JOIN tags tg ON tg.id = tt.tag_id
                             WHERE tt.task_id = t.id AND tg.name = ? AND tg.user_id = ?)",
                    [text(tag), text(owner)],
                );
            }
        }

        query
            .order_by(&TASK_ORDER)
            .paginate(filters.limit, filters.offset);

        let conn = self.lock()?;
        query.query(&conn, parse_task_row).map_err(AppError::from)
    }

    pub fn tasks_for_project(&self, owner: &str, project_id: &str) -> AppResult<Vec<Task>> {
        let filters = TaskFilters {
            project_id: Some(project_id.to_string()),
            ..TaskFilters::default()
        };
        self.list_tasks(owner, Some(&filters))
    }

    /// Direct children of `parent_id`, oldest first.
    pub fn subtasks(&self, owner: &str, parent_id: &str) -> AppResult<Vec<Task>> {
        let mut query = visible_tasks_query(owner);
        query
            .eq_text("t.parent_task_id", Some(parent_id))
            .order_by("t.created_at ASC, t.id ASC");
        let conn = self.lock()?;
        query.query(&conn, parse_task_row).map_err(AppError::from)
    }

    /// Free-text lookup across title and description, most recently touched first.
    pub fn search_tasks(&self, owner: &str, term: &str) -> AppResult<Vec<Task>> {
        let mut query = visible_tasks_query(owner);
        query
            .contains_text(&["t.title", "t.description"], Some(term))
            .order_by("t.updated_at DESC, t.id ASC");
        let conn = self.lock()?;
        query.query(&conn, parse_task_row).map_err(AppError::from)
    }

    /// First visible task whose metadata holds `value` under the top-level `key`.
    pub fn find_task_by_metadata(&self, owner: &str, key: &str, value: &str) -> AppResult<Option<Task>> {
        let mut query = visible_tasks_query(owner);
        query
            .and(
                "json_extract(t.metadata_json, ?) = ?",
                [text(format!("$.\"{}\"", key.replace('"', ""))), text(value)],
            )
            .order_by("t.created_at ASC, t.id ASC")
            .paginate(Some(1), None);
        let conn = self.lock()?;
        Ok(query.query(&conn, parse_task_row)?.into_iter().next())
    }

    pub fn update_task(&self, owner: &str, id: &str, update: TaskUpdate) -> AppResult<Task> {
        let title = update
            .title
            .as_deref()
            .map(|title| require_text(title, "Task title is required and cannot be empty"))
            .transpose()?;

        let conn = self.lock()?;
        let mut task = find_task(&conn, owner, id)?.ok_or_else(|| AppError::not_found("Task", "update"))?;
        let now = Utc::now();

        if let Some(project_id) = update.project_id {
            let project_id = project_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty());
            if let Some(project_id) = &project_id {
                if !owned_project_exists(&conn, owner, project_id)? {
                    return Err(AppError::not_found("Project", "add tasks to"));
                }
            }
            task.project_id = project_id;
        }
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description.trim().to_string();
        }
        if let Some(status) = update.status {
            apply_status(&mut task, status, now);
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(due_date) = update.due_date {
            task.due_date = due_date;
        }
        if let Some(metadata) = update.metadata {
            merge_metadata(&mut task.metadata, metadata);
        }
        task.updated_at = now;

        write_task(&conn, &task)?;
        Ok(task)
    }

    pub fn complete_task(&self, owner: &str, id: &str) -> AppResult<Task> {
        self.update_task(
            owner,
            id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                ..TaskUpdate::default()
            },
        )
    }

    pub fn delete_task(&self, owner: &str, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM tasks
             WHERE id = ?1
               AND (user_id = ?2 OR project_id IN (SELECT id FROM projects WHERE user_id = ?2))",
            params![id, owner],
        )?;
        Ok(changed > 0)
    }

    /// Links a tag to a task. Linking twice is a no-op.
    pub fn add_tag_to_task(&self, owner: &str, task_id: &str, tag_id: &str) -> AppResult<()> {
        let conn = self.lock()?;
        if find_task(&conn, owner, task_id)?.is_none() {
            return Err(AppError::not_found("Task", "tag"));
        }
        if !owned_tag_exists(&conn, owner, tag_id)? {
            return Err(AppError::not_found("Tag", "use"));
        }
        conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag_id, created_at) VALUES (?1, ?2, ?3)",
            params![task_id, tag_id, format_time(&Utc::now())],
        )?;
        Ok(())
    }

    pub fn remove_tag_from_task(&self, owner: &str, task_id: &str, tag_id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        if find_task(&conn, owner, task_id)?.is_none() {
            return Err(AppError::not_found("Task", "untag"));
        }
        let changed = conn.execute(
            "DELETE FROM task_tags
             WHERE task_id = ?1 AND tag_id IN (SELECT id FROM tags WHERE id = ?2 AND user_id = ?3)",
            params![task_id, tag_id, owner],
        )?;
        Ok(changed > 0)
    }

    pub fn tags_for_task(&self, owner: &str, task_id: &str) -> AppResult<Vec<Tag>> {
        let conn = self.lock()?;
        if find_task(&conn, owner, task_id)?.is_none() {
            return Err(AppError::not_found("Task", "access"));
        }
        let mut query = QueryBuilder::new(
            &format!(
                "SELECT {} FROM tags g JOIN task_tags tt ON tt.tag_id = g.id
                 WHERE tt.task_id = ? AND g.user_id = ?",
                TAG_COLUMNS
            ),
            vec![text(task_id), text(owner)],
        );
        query.order_by("g.name ASC");
        query.query(&conn, parse_tag_row).map_err(AppError::from)
    }
}

/// Entering `completed` stamps the completion time; leaving it clears the stamp.
fn apply_status(task: &mut Task, status: TaskStatus, now: chrono::DateTime<Utc>) {
    if status == TaskStatus::Completed {
        if task.status != TaskStatus::Completed || task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    } else {
        task.completed_at = None;
    }
    task.status = status;
}

fn visible_tasks_query(owner: &str) -> QueryBuilder {
    QueryBuilder::new(
        &format!("SELECT {} {}", TASK_COLUMNS, VISIBLE_TASKS),
        vec![text(owner), text(owner)],
    )
}

pub(super) fn find_task(conn: &Connection, owner: &str, id: &str) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {} {} AND t.id = ?", TASK_COLUMNS, VISIBLE_TASKS),
        params![owner, owner, id],
        parse_task_row,
    )
    .optional()
}

fn owned_tag_exists(conn: &Connection, owner: &str, tag_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM tags WHERE id = ?1 AND user_id = ?2",
        params![tag_id, owner],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn write_task(conn: &Connection, task: &Task) -> AppResult<()> {
    conn.execute(
        "UPDATE tasks SET project_id = ?1, title = ?2, description = ?3, status = ?4, priority = ?5,
           due_date = ?6, completed_at = ?7, metadata_json = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            task.project_id,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.due_date.as_ref().map(format_time),
            task.completed_at.as_ref().map(format_time),
            serde_json::to_string(&task.metadata)?,
            format_time(&task.updated_at),
            task.id,
        ],
    )?;
    Ok(())
}

pub(super) fn parse_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_raw: String = row.get(6)?;
    let priority_raw: String = row.get(7)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        project_id: row.get(2)?,
        parent_task_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        status: TaskStatus::parse(&status_raw).unwrap_or_default(),
        priority: Priority::parse(&priority_raw).unwrap_or_default(),
        due_date: parse_optional_time(row.get(8)?)?,
        completed_at: parse_optional_time(row.get(9)?)?,
        metadata: parse_metadata(&row.get::<_, String>(10)?),
        created_at: parse_time(&row.get::<_, String>(11)?)?,
        updated_at: parse_time(&row.get::<_, String>(12)?)?,
    })
}

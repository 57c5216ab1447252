use super::predicate::{text, QueryBuilder};
use super::{format_time, new_id, owned_project_exists, parse_time, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{
    DeleteOutcome, NewProject, Project, ProjectFilters, ProjectOrder, ProjectSummary,
    ProjectUpdate, ProjectWithStats,
};
use crate::rules::{require_text, validate_color, DEFAULT_PROJECT_COLOR};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

const PROJECT_COLUMNS: &str =
    "p.id, p.user_id, p.name, p.description, p.color, p.order_index, p.is_archived, p.created_at, p.updated_at";

impl Database {
    pub fn create_project(&self, owner: &str, payload: NewProject) -> AppResult<Project> {
        let name = require_text(&payload.name, "Project name is required and cannot be empty")?;
        let color = match payload.color.as_deref() {
            Some(color) if !color.trim().is_empty() => validate_color(color)?,
            _ => DEFAULT_PROJECT_COLOR.to_string(),
        };
        let description = payload.description.unwrap_or_default().trim().to_string();

        let conn = self.lock()?;
        insert_project(&conn, owner, &name, &description, &color)
    }

    pub fn get_project(&self, owner: &str, id: &str) -> AppResult<Option<Project>> {
        let conn = self.lock()?;
        find_project(&conn, owner, id).map_err(AppError::from)
    }

    /// Owned projects with task counts, in manual order.
    pub fn list_projects(&self, owner: &str, filters: &ProjectFilters) -> AppResult<Vec<ProjectSummary>> {
        let conn = self.lock()?;
        let mut query = QueryBuilder::new(
            &format!(
                "SELECT {},
                   (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id),
                   (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id AND t.status = 'completed')
                 FROM projects p WHERE p.user_id = ?",
                PROJECT_COLUMNS
            ),
            vec![text(owner)],
        );
        if !filters.include_archived {
            query.and_clause("p.is_archived = 0");
        }
        query
            .contains_text(&["p.name", "p.description"], filters.search.as_deref())
            .order_by("p.order_index ASC, p.created_at DESC, p.id ASC")
            .paginate(filters.limit, filters.offset);

        query
            .query(&conn, |row| {
                Ok(ProjectSummary {
                    project: parse_project_row(row)?,
                    task_count: row.get(9)?,
                    completed_tasks: row.get(10)?,
                })
            })
            .map_err(AppError::from)
    }

    pub fn update_project(&self, owner: &str, id: &str, update: ProjectUpdate) -> AppResult<Project> {
        let name = update
            .name
            .as_deref()
            .map(|name| require_text(name, "Project name is required and cannot be empty"))
            .transpose()?;
        let color = update.color.as_deref().map(validate_color).transpose()?;

        let conn = self.lock()?;
        let mut project = find_project(&conn, owner, id)?
            .ok_or_else(|| AppError::not_found("Project", "update"))?;

        if let Some(name) = name {
            if name_taken(&conn, owner, &name, Some(id))? {
                return Err(AppError::Conflict(
                    "A project with this name already exists".to_string(),
                ));
            }
            project.name = name;
        }
        if let Some(description) = update.description {
            project.description = description.trim().to_string();
        }
        if let Some(color) = color {
            project.color = color;
        }
        if let Some(archived) = update.is_archived {
            project.is_archived = archived;
        }
        project.updated_at = Utc::now();

        conn.execute(
            "UPDATE projects SET name = ?1, description = ?2, color = ?3, is_archived = ?4, updated_at = ?5
             WHERE id = ?6 AND user_id = ?7",
            params![
                project.name,
                project.description,
                project.color,
                project.is_archived,
                format_time(&project.updated_at),
                id,
                owner
            ],
        )?;
        Ok(project)
    }

    pub fn archive_project(&self, owner: &str, id: &str, archived: bool) -> AppResult<Project> {
        self.update_project(
            owner,
            id,
            ProjectUpdate {
                is_archived: Some(archived),
                ..ProjectUpdate::default()
            },
        )
    }

    /// Deleting a project that still has tasks archives it instead.
    pub fn delete_project(&self, owner: &str, id: &str) -> AppResult<DeleteOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !owned_project_exists(&tx, owner, id)? {
            return Err(AppError::not_found("Project", "delete"));
        }

        let task_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE project_id = ?1",
            [id],
            |row| row.get(0),
        )?;

        let outcome = if task_count > 0 {
            tx.execute(
                "UPDATE projects SET is_archived = 1, updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
                params![format_time(&Utc::now()), id, owner],
            )?;
            tracing::info!(project_id = %id, task_count, "project has tasks, archived instead of deleted");
            DeleteOutcome::Archived
        } else {
            tx.execute(
                "DELETE FROM projects WHERE id = ?1 AND user_id = ?2",
                params![id, owner],
            )?;
            DeleteOutcome::Deleted
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Applies every new order index or none of them.
    pub fn reorder_projects(&self, owner: &str, orders: &[ProjectOrder]) -> AppResult<()> {
        let now = format_time(&Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for order in orders {
            let changed = tx.execute(
                "UPDATE projects SET order_index = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![order.order_index, now, order.id, owner],
            )?;
            if changed == 0 {
                tracing::warn!(project_id = %order.id, "reorder aborted on unknown project");
                return Err(AppError::not_found("Project", "reorder"));
            }
        }
        tx.commit()?;
        tracing::info!(count = orders.len(), "projects reordered");
        Ok(())
    }

    pub fn project_with_stats(&self, owner: &str, id: &str) -> AppResult<Option<ProjectWithStats>> {
        let now = format_time(&Utc::now());
        let conn = self.lock()?;
        let Some(project) = find_project(&conn, owner, id)? else {
            return Ok(None);
        };
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'todo' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN due_date < ?2 AND status <> 'completed' THEN 1 ELSE 0 END), 0)
             FROM tasks WHERE project_id = ?1",
            params![id, now],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?;
        Ok(Some(ProjectWithStats {
            project,
            total_tasks: stats.0,
            completed_tasks: stats.1,
            todo_tasks: stats.2,
            in_progress_tasks: stats.3,
            overdue_tasks: stats.4,
        }))
    }

    pub fn recently_updated_projects(&self, owner: &str, limit: u32) -> AppResult<Vec<Project>> {
        let conn = self.lock()?;
        let mut query = QueryBuilder::new(
            &format!("SELECT {} FROM projects p WHERE p.user_id = ?", PROJECT_COLUMNS),
            vec![text(owner)],
        );
        query
            .and_clause("p.is_archived = 0")
            .order_by("p.updated_at DESC, p.id ASC")
            .paginate(Some(limit), None);
        query.query(&conn, parse_project_row).map_err(AppError::from)
    }

    /// Active projects whose name or description contains `term`, most recently touched first.
    pub fn search_projects(&self, owner: &str, term: &str) -> AppResult<Vec<Project>> {
        let conn = self.lock()?;
        let mut query = QueryBuilder::new(
            &format!("SELECT {} FROM projects p WHERE p.user_id = ?", PROJECT_COLUMNS),
            vec![text(owner)],
        );
        query
            .and_clause("p.is_archived = 0")
            .contains_text(&["p.name", "p.description"], Some(term))
            .order_by("p.updated_at DESC, p.id ASC");
        query.query(&conn, parse_project_row).map_err(AppError::from)
    }

    /// Copies name, description and color into a new project at the end of the order.
    pub fn duplicate_project(&self, owner: &str, id: &str, new_name: Option<&str>) -> AppResult<Project> {
        let conn = self.lock()?;
        let source = find_project(&conn, owner, id)?
            .ok_or_else(|| AppError::not_found("Project", "duplicate"))?;

        let name = match new_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let base = format!("{} (Copy)", source.name);
                let mut candidate = base.clone();
                let mut counter = 2;
                while name_taken(&conn, owner, &candidate, None)? {
                    candidate = format!("{} {}", base, counter);
                    counter += 1;
                }
                candidate
            }
        };
        insert_project(&conn, owner, &name, &source.description, &source.color)
    }

    pub fn used_project_colors(&self, owner: &str) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT DISTINCT color FROM projects WHERE user_id = ?1 ORDER BY color ASC",
        )?;
        let rows = statement.query_map([owner], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn is_project_name_unique(&self, owner: &str, name: &str, exclude_id: Option<&str>) -> AppResult<bool> {
        let conn = self.lock()?;
        Ok(!name_taken(&conn, owner, name.trim(), exclude_id)?)
    }
}

fn insert_project(
    conn: &Connection,
    owner: &str,
    name: &str,
    description: &str,
    color: &str,
) -> AppResult<Project> {
    if name_taken(conn, owner, name, None)? {
        return Err(AppError::Conflict(
            "A project with this name already exists".to_string(),
        ));
    }
    let order_index: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_index), -1) + 1 FROM projects WHERE user_id = ?1",
        [owner],
        |row| row.get(0),
    )?;
    let now = Utc::now();
    let id = new_id();
    conn.execute(
        "INSERT INTO projects (id, user_id, name, description, color, order_index, is_archived, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        params![id, owner, name, description, color, order_index, format_time(&now)],
    )?;
    Ok(Project {
        id,
        user_id: owner.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        color: color.to_string(),
        order_index,
        is_archived: false,
        created_at: now,
        updated_at: now,
    })
}

pub(super) fn find_project(conn: &Connection, owner: &str, id: &str) -> rusqlite::Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {} FROM projects p WHERE p.id = ?1 AND p.user_id = ?2", PROJECT_COLUMNS),
        params![id, owner],
        parse_project_row,
    )
    .optional()
}

/// Case-insensitive, so "Home" and "home" cannot coexist for one owner.
fn name_taken(conn: &Connection, owner: &str, name: &str, exclude_id: Option<&str>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM projects
         WHERE user_id = ?1 AND name = ?2 COLLATE NOCASE AND (?3 IS NULL OR id <> ?3)",
        params![owner, name, exclude_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

pub(super) fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        order_index: row.get(5)?,
        is_archived: row.get(6)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
        updated_at: parse_time(&row.get::<_, String>(8)?)?,
    })
}

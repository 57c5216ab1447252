use super::{format_date, format_time, Database};
use crate::errors::AppResult;
use crate::models::{JournalStats, ProjectStats, TagStats, TaskStats, UserStats};
use crate::rules::{completion_rate, round2};
use chrono::{Datelike, Months, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

// Rollups never fail: a broken query is logged and reported as all zeros.
impl Database {
    pub fn task_stats(&self, owner: &str) -> TaskStats {
        or_default(self.query_task_stats(owner), "task", owner)
    }

    pub fn project_stats(&self, owner: &str) -> ProjectStats {
        or_default(self.query_project_stats(owner), "project", owner)
    }

    pub fn journal_stats(&self, owner: &str) -> JournalStats {
        or_default(self.query_journal_stats(owner), "journal", owner)
    }

    pub fn tag_stats(&self, owner: &str) -> TagStats {
        or_default(self.query_tag_stats(owner), "tag", owner)
    }

    pub fn user_stats(&self, owner: &str) -> UserStats {
        or_default(self.query_user_stats(owner), "user", owner)
    }

    fn query_task_stats(&self, owner: &str) -> AppResult<TaskStats> {
        let now = format_time(&Utc::now());
        let conn = self.lock()?;
        let mut stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(t.status = 'todo'), 0),
                    COALESCE(SUM(t.status = 'in_progress'), 0),
                    COALESCE(SUM(t.status = 'completed'), 0),
                    COALESCE(SUM(t.status = 'cancelled'), 0),
                    COALESCE(SUM(t.due_date IS NOT NULL AND t.due_date < ?2 AND t.status <> 'completed'), 0)
             FROM tasks t LEFT JOIN projects p ON p.id = t.project_id
             WHERE (t.user_id = ?1 OR p.user_id = ?1)",
            params![owner, now],
            |row| {
                Ok(TaskStats {
                    total: row.get(0)?,
                    todo: row.get(1)?,
                    in_progress: row.get(2)?,
                    completed: row.get(3)?,
                    cancelled: row.get(4)?,
                    overdue: row.get(5)?,
                    completion_rate: 0.0,
                })
            },
        )?;
        stats.completion_rate = completion_rate(stats.completed, stats.total);
        Ok(stats)
    }

    fn query_project_stats(&self, owner: &str) -> AppResult<ProjectStats> {
        let conn = self.lock()?;
        let (total_projects, active_projects, archived_projects) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_archived = 0), 0), COALESCE(SUM(is_archived = 1), 0)
             FROM projects WHERE user_id = ?1",
            [owner],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let (total_tasks, completed_tasks) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(t.status = 'completed'), 0)
             FROM tasks t JOIN projects p ON p.id = t.project_id
             WHERE p.user_id = ?1",
            [owner],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let most_active_project = conn
            .query_row(
                "SELECT name FROM projects WHERE user_id = ?1 AND is_archived = 0
                 ORDER BY updated_at DESC, id ASC LIMIT 1",
                [owner],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ProjectStats {
            total_projects,
            active_projects,
            archived_projects,
            total_tasks,
            completed_tasks,
            completion_rate: completion_rate(completed_tasks, total_tasks),
            most_active_project,
        })
    }

    fn query_journal_stats(&self, owner: &str) -> AppResult<JournalStats> {
        let (month_start, next_month) = month_bounds(Utc::now().date_naive());

        let conn = self.lock()?;
        let mut stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(word_count), 0),
                    COALESCE(SUM(reading_time_minutes), 0),
                    COALESCE(SUM(entry_date >= ?2 AND entry_date < ?3), 0),
                    AVG(mood_rating),
                    AVG(energy_level)
             FROM journal_entries WHERE user_id = ?1",
            params![owner, format_date(&month_start), format_date(&next_month)],
            |row| {
                Ok(JournalStats {
                    total_entries: row.get(0)?,
                    total_words: row.get(1)?,
                    total_reading_time: row.get(2)?,
                    entries_this_month: row.get(3)?,
                    average_mood: row.get::<_, Option<f64>>(4)?.map(round2),
                    average_energy: row.get::<_, Option<f64>>(5)?.map(round2),
                    entry_types: BTreeMap::new(),
                })
            },
        )?;

        let mut statement = conn.prepare(
            "SELECT entry_type, COUNT(*) FROM journal_entries WHERE user_id = ?1 GROUP BY entry_type",
        )?;
        let rows = statement.query_map([owner], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (entry_type, count) = row?;
            stats.entry_types.insert(entry_type, count);
        }
        Ok(stats)
    }

    fn query_tag_stats(&self, owner: &str) -> AppResult<TagStats> {
        let conn = self.lock()?;
        let (total_tags, unique_colors) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT color) FROM tags WHERE user_id = ?1",
            [owner],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        let (tagged_tasks, attached_tags, attachments) = conn.query_row(
            "SELECT COUNT(DISTINCT tt.task_id), COUNT(DISTINCT tt.tag_id), COUNT(*)
             FROM task_tags tt JOIN tags g ON g.id = tt.tag_id
             WHERE g.user_id = ?1",
            [owner],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )?;

        let avg_usage_per_tag = if total_tags > 0 {
            round2(attachments as f64 / total_tags as f64)
        } else {
            0.0
        };
        Ok(TagStats {
            total_tags,
            tagged_tasks,
            attached_tags,
            avg_usage_per_tag,
            unique_colors,
        })
    }

    fn query_user_stats(&self, owner: &str) -> AppResult<UserStats> {
        let conn = self.lock()?;
        let (total_tasks, completed_tasks) = conn.query_row(
            "SELECT COALESCE(SUM(t.status <> 'cancelled'), 0), COALESCE(SUM(t.status = 'completed'), 0)
             FROM tasks t LEFT JOIN projects p ON p.id = t.project_id
             WHERE (t.user_id = ?1 OR p.user_id = ?1)",
            [owner],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let active_projects = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE user_id = ?1 AND is_archived = 0",
            [owner],
            |row| row.get(0),
        )?;
        let total_tags = conn.query_row("SELECT COUNT(*) FROM tags WHERE user_id = ?1", [owner], |row| {
            row.get(0)
        })?;
        Ok(UserStats {
            total_tasks,
            completed_tasks,
            active_projects,
            total_tags,
        })
    }
}

/// First day of the month containing `day`, and the first day of the next one.
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = day.with_day(1).unwrap_or(day);
    let next = start.checked_add_months(Months::new(1)).unwrap_or(NaiveDate::MAX);
    (start, next)
}

fn or_default<T: Default>(result: AppResult<T>, rollup: &str, owner: &str) -> T {
    result.unwrap_or_else(|error| {
        tracing::warn!(rollup, user_id = %owner, error = %error, "statistics query failed, reporting defaults");
        T::default()
    })
}

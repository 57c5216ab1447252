#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use daybook_lib::models::{
    JournalEntry, NewJournalEntry, NewProject, NewTag, NewTask, NewUser, Priority, Project, Tag, Task,
    TaskStatus,
};
use daybook_lib::Database;
use tempfile::TempDir;

pub fn fresh_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::new(&dir.path().join("test.db")).expect("db");
    (dir, db)
}

pub fn user(db: &Database, email: &str) -> String {
    db.create_user(NewUser {
        name: "Test User".to_string(),
        email: email.to_string(),
        password: "correct horse".to_string(),
        settings: None,
    })
    .expect("user")
    .id
}

pub fn project(db: &Database, owner: &str, name: &str) -> Project {
    db.create_project(
        owner,
        NewProject {
            name: name.to_string(),
            ..NewProject::default()
        },
    )
    .expect("project")
}

pub fn tag(db: &Database, owner: &str, name: &str) -> Tag {
    db.create_tag(
        owner,
        NewTag {
            name: name.to_string(),
            color: None,
        },
    )
    .expect("tag")
}

pub fn task(db: &Database, owner: &str, title: &str) -> Task {
    task_with(db, owner, title, |_| {})
}

pub fn task_with(db: &Database, owner: &str, title: &str, configure: impl FnOnce(&mut NewTask)) -> Task {
    let mut payload = NewTask {
        title: title.to_string(),
        ..NewTask::default()
    };
    configure(&mut payload);
    db.create_task(owner, payload).expect("task")
}

pub fn task_in_state(db: &Database, owner: &str, title: &str, status: TaskStatus, priority: Priority) -> Task {
    task_with(db, owner, title, |payload| {
        payload.status = Some(status);
        payload.priority = Some(priority);
    })
}

pub fn entry(
    db: &Database,
    owner: &str,
    content: &str,
    configure: impl FnOnce(&mut NewJournalEntry),
) -> JournalEntry {
    let mut payload = NewJournalEntry {
        content: content.to_string(),
        ..NewJournalEntry::default()
    };
    configure(&mut payload);
    db.create_journal_entry(owner, payload).expect("journal entry")
}

pub fn days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

pub fn ids(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|task| task.id.clone()).collect()
}

pub fn titles(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|task| task.title.clone()).collect()
}

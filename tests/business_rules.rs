mod common;

use common::{entry, fresh_db, project, tag, task, task_with, user};
use daybook_lib::models::{
    DeleteOutcome, JournalUpdate, Metadata, NewJournalEntry, NewProject, NewTag, NewTask, ProjectFilters,
    ProjectOrder, ProjectUpdate, TagUpdate, TaskStatus, TaskUpdate,
};

#[test]
fn deleting_a_project_with_tasks_archives_it() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let busy = project(&db, &owner, "Busy");
    let kept = task_with(&db, &owner, "keep me", |payload| payload.project_id = Some(busy.id.clone()));

    assert_eq!(db.delete_project(&owner, &busy.id).expect("delete"), DeleteOutcome::Archived);
    let archived = db.get_project(&owner, &busy.id).expect("get").expect("still stored");
    assert!(archived.is_archived);
    assert!(db.get_task(&owner, &kept.id).expect("get").is_some());

    let active = db.list_projects(&owner, &ProjectFilters::default()).expect("list");
    assert!(active.is_empty());
    let all = db
        .list_projects(
            &owner,
            &ProjectFilters {
                include_archived: true,
                ..ProjectFilters::default()
            },
        )
        .expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].task_count, 1);
}

#[test]
fn deleting_an_empty_project_removes_it() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let empty = project(&db, &owner, "Empty");

    assert_eq!(db.delete_project(&owner, &empty.id).expect("delete"), DeleteOutcome::Deleted);
    assert!(db.get_project(&owner, &empty.id).expect("get").is_none());

    let error = db.delete_project(&owner, &empty.id).expect_err("gone");
    assert_eq!(error.kind(), "NOT_FOUND");
}

#[test]
fn foreign_projects_look_missing() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let other = user(&db, "bob@example.com");
    let theirs = project(&db, &other, "Theirs");

    let delete = db.delete_project(&owner, &theirs.id).expect_err("not mine");
    let missing = db.delete_project(&owner, "no-such-id").expect_err("missing");
    assert_eq!(delete.to_string(), missing.to_string());

    let add = db
        .create_task(
            &owner,
            NewTask {
                title: "sneak in".to_string(),
                project_id: Some(theirs.id.clone()),
                ..NewTask::default()
            },
        )
        .expect_err("foreign project");
    assert_eq!(add.kind(), "NOT_FOUND");
}

#[test]
fn renaming_a_project_to_its_own_name_is_allowed() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let home = project(&db, &owner, "Home");
    project(&db, &owner, "Work");

    let same = db
        .update_project(
            &owner,
            &home.id,
            ProjectUpdate {
                name: Some("Home".to_string()),
                ..ProjectUpdate::default()
            },
        )
        .expect("same name");
    assert_eq!(same.name, "Home");

    let clash = db
        .update_project(
            &owner,
            &home.id,
            ProjectUpdate {
                name: Some("work".to_string()),
                ..ProjectUpdate::default()
            },
        )
        .expect_err("taken");
    assert_eq!(clash.kind(), "CONFLICT");

    let other = user(&db, "bob@example.com");
    assert!(db
        .create_project(
            &other,
            NewProject {
                name: "Home".to_string(),
                ..NewProject::default()
            },
        )
        .is_ok());
}

#[test]
fn reorder_is_all_or_nothing() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let a = project(&db, &owner, "A");
    let b = project(&db, &owner, "B");

    let error = db
        .reorder_projects(
            &owner,
            &[
                ProjectOrder {
                    id: b.id.clone(),
                    order_index: 0,
                },
                ProjectOrder {
                    id: "missing".to_string(),
                    order_index: 1,
                },
            ],
        )
        .expect_err("unknown id");
    assert_eq!(error.kind(), "NOT_FOUND");

    assert_eq!(db.get_project(&owner, &a.id).expect("get").expect("a").order_index, 0);
    assert_eq!(db.get_project(&owner, &b.id).expect("get").expect("b").order_index, 1);
}

#[test]
fn duplicates_get_unique_copy_names() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let source = db
        .create_project(
            &owner,
            NewProject {
                name: "Garden".to_string(),
                description: Some("  Vegetables  ".to_string()),
                color: Some("#22C55E".to_string()),
            },
        )
        .expect("project");
    assert_eq!(source.description, "Vegetables");
    assert_eq!(source.color, "#22c55e");

    let first = db.duplicate_project(&owner, &source.id, None).expect("copy");
    let second = db.duplicate_project(&owner, &source.id, None).expect("copy");
    let named = db.duplicate_project(&owner, &source.id, Some("Orchard")).expect("copy");
    assert_eq!(first.name, "Garden (Copy)");
    assert_eq!(second.name, "Garden (Copy) 2");
    assert_eq!(named.name, "Orchard");
    assert_eq!(first.color, source.color);
    assert_eq!(named.order_index, 3);
}

#[test]
fn invalid_project_colors_are_rejected() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let error = db
        .create_project(
            &owner,
            NewProject {
                name: "Paint".to_string(),
                color: Some("red".to_string()),
                ..NewProject::default()
            },
        )
        .expect_err("bad color");
    assert_eq!(error.kind(), "VALIDATION_ERROR");
    assert!(db.list_projects(&owner, &ProjectFilters::default()).expect("list").is_empty());
}

#[test]
fn blank_titles_and_content_are_rejected_before_writing() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");

    let task_error = db
        .create_task(
            &owner,
            NewTask {
                title: "   ".to_string(),
                ..NewTask::default()
            },
        )
        .expect_err("blank title");
    assert_eq!(task_error.kind(), "VALIDATION_ERROR");

    let entry_error = db
        .create_journal_entry(
            &owner,
            NewJournalEntry {
                content: "\n\t ".to_string(),
                ..NewJournalEntry::default()
            },
        )
        .expect_err("blank content");
    assert_eq!(entry_error.kind(), "VALIDATION_ERROR");

    let project_error = db
        .create_project(&owner, NewProject::default())
        .expect_err("blank name");
    assert_eq!(project_error.kind(), "VALIDATION_ERROR");

    assert!(db.list_tasks(&owner, None).expect("list").is_empty());
    assert!(db.list_journal_entries(&owner, None).expect("list").is_empty());
}

#[test]
fn completion_time_tracks_status() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let item = task(&db, &owner, "laundry");
    assert!(item.completed_at.is_none());

    let done = db.complete_task(&owner, &item.id).expect("complete");
    assert_eq!(done.status, TaskStatus::Completed);
    let stamp = done.completed_at.expect("stamped");

    let again = db
        .update_task(
            &owner,
            &item.id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                ..TaskUpdate::default()
            },
        )
        .expect("re-complete");
    assert_eq!(again.completed_at.map(|at| at.timestamp_millis()), Some(stamp.timestamp_millis()));

    let reopened = db
        .update_task(
            &owner,
            &item.id,
            TaskUpdate {
                status: Some(TaskStatus::Todo),
                ..TaskUpdate::default()
            },
        )
        .expect("reopen");
    assert!(reopened.completed_at.is_none());
    assert!(db.get_task(&owner, &item.id).expect("get").expect("task").completed_at.is_none());
}

#[test]
fn task_updates_clear_fields_and_merge_metadata() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let home = project(&db, &owner, "Home");
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::json!("manual"));
    metadata.insert("flags".to_string(), serde_json::json!({ "pinned": true }));
    let item = task_with(&db, &owner, "fix sink", |payload| {
        payload.project_id = Some(home.id.clone());
        payload.due_date = Some(common::days_from_now(2));
        payload.metadata = Some(metadata);
    });

    let mut patch = Metadata::new();
    patch.insert("flags".to_string(), serde_json::json!({ "starred": true }));
    let update: TaskUpdate = serde_json::from_value(serde_json::json!({
        "project_id": null,
        "due_date": null,
        "description": "  call plumber  "
    }))
    .expect("update");
    let updated = db
        .update_task(
            &owner,
            &item.id,
            TaskUpdate {
                metadata: Some(patch),
                ..update
            },
        )
        .expect("update");

    assert!(updated.project_id.is_none());
    assert!(updated.due_date.is_none());
    assert_eq!(updated.description, "call plumber");
    assert_eq!(updated.metadata["source"], serde_json::json!("manual"));
    assert_eq!(updated.metadata["flags"], serde_json::json!({ "pinned": true, "starred": true }));

    let stored = db.get_task(&owner, &item.id).expect("get").expect("task");
    assert_eq!(stored.metadata, updated.metadata);
}

#[test]
fn subtasks_are_one_level_deep() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let parent = task(&db, &owner, "move house");
    let child = task_with(&db, &owner, "pack books", |payload| {
        payload.parent_task_id = Some(parent.id.clone());
    });

    let error = db
        .create_task(
            &owner,
            NewTask {
                title: "buy boxes".to_string(),
                parent_task_id: Some(child.id.clone()),
                ..NewTask::default()
            },
        )
        .expect_err("too deep");
    assert_eq!(error.kind(), "VALIDATION_ERROR");

    assert!(db.delete_task(&owner, &parent.id).expect("delete"));
    assert!(db.get_task(&owner, &child.id).expect("get").is_none());
}

#[test]
fn tag_names_are_normalized_and_validated() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");

    let created = tag(&db, &owner, "  Urgent Work  ");
    assert_eq!(created.name, "urgent-work");
    assert_eq!(created.color, "#6b7280");

    let duplicate = db
        .create_tag(
            &owner,
            NewTag {
                name: "URGENT work".to_string(),
                color: None,
            },
        )
        .expect_err("duplicate");
    assert_eq!(duplicate.kind(), "CONFLICT");

    let too_long = "x".repeat(51);
    for bad in ["", "what?", too_long.as_str()] {
        let error = db
            .create_tag(
                &owner,
                NewTag {
                    name: bad.to_string(),
                    color: None,
                },
            )
            .expect_err("invalid");
        assert_eq!(error.kind(), "VALIDATION_ERROR", "{:?}", bad);
    }

    let renamed = db
        .update_tag(
            &owner,
            &created.id,
            TagUpdate {
                name: Some("Deep Focus".to_string()),
                ..TagUpdate::default()
            },
        )
        .expect("rename");
    assert_eq!(renamed.name, "deep-focus");
    assert!(db.find_tag_by_name(&owner, "deep focus").expect("find").is_some());
}

#[test]
fn deleting_a_tag_leaves_no_links_behind() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let errand = tag(&db, &owner, "errand");
    let keep = tag(&db, &owner, "keep");
    let first = task(&db, &owner, "post office");
    let second = task(&db, &owner, "bank");
    for item in [&first, &second] {
        db.add_tag_to_task(&owner, &item.id, &errand.id).expect("tag");
    }
    db.add_tag_to_task(&owner, &first.id, &keep.id).expect("tag");

    assert!(db.delete_tag(&owner, &errand.id).expect("delete"));
    assert!(!db.delete_tag(&owner, &errand.id).expect("second delete"));

    assert!(db.tasks_by_tag(&owner, &errand.id).expect("by tag").is_empty());
    let remaining: Vec<String> = db
        .tags_for_task(&owner, &first.id)
        .expect("tags")
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert_eq!(remaining, vec!["keep"]);
    assert_eq!(db.tag_stats(&owner).attached_tags, 1);
    assert_eq!(db.tag_stats(&owner).tagged_tasks, 1);
}

#[test]
fn tagging_is_idempotent_and_owner_scoped() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let other = user(&db, "bob@example.com");
    let mine = tag(&db, &owner, "mine");
    let theirs = tag(&db, &other, "theirs");
    let item = task(&db, &owner, "read");

    db.add_tag_to_task(&owner, &item.id, &mine.id).expect("tag");
    db.add_tag_to_task(&owner, &item.id, &mine.id).expect("tag twice");
    assert_eq!(db.tags_for_task(&owner, &item.id).expect("tags").len(), 1);

    let error = db.add_tag_to_task(&owner, &item.id, &theirs.id).expect_err("foreign tag");
    assert_eq!(error.kind(), "NOT_FOUND");

    assert!(db.remove_tag_from_task(&owner, &item.id, &mine.id).expect("untag"));
    assert!(!db.remove_tag_from_task(&owner, &item.id, &mine.id).expect("untag again"));
}

#[test]
fn bulk_tag_creation_skips_invalid_and_existing_names() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    tag(&db, &owner, "home");

    let names = ["Home", "Side Project", "side project", "bad!", "reading"]
        .iter()
        .map(|name| name.to_string())
        .collect::<Vec<_>>();
    let created: Vec<String> = db
        .bulk_create_tags(&owner, &names)
        .expect("bulk")
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert_eq!(created, vec!["side-project", "reading"]);
    assert_eq!(db.list_tags(&owner).expect("tags").len(), 3);
}

#[test]
fn tag_suggestions_match_task_keywords() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    tag(&db, &owner, "garden");
    tag(&db, &owner, "finance");
    tag(&db, &owner, "go");

    let suggested: Vec<String> = db
        .suggest_tags(&owner, "Plant the garden", "before it rains, go")
        .expect("suggest")
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert_eq!(suggested, vec!["garden"]);
}

#[test]
fn journal_entries_derive_reading_metrics() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let long = entry(&db, &owner, &"word ".repeat(400), |_| {});
    assert_eq!(long.word_count, 400);
    assert_eq!(long.reading_time_minutes, 2);
    assert_eq!(long.entry_date, chrono::Utc::now().date_naive());

    let updated = db
        .update_journal_entry(
            &owner,
            &long.id,
            JournalUpdate {
                content: Some("just five words right here".to_string()),
                ..JournalUpdate::default()
            },
        )
        .expect("update");
    assert_eq!(updated.word_count, 5);
    assert_eq!(updated.reading_time_minutes, 1);

    let emptied = db
        .update_journal_entry(
            &owner,
            &long.id,
            JournalUpdate {
                content: Some("  ".to_string()),
                ..JournalUpdate::default()
            },
        )
        .expect_err("empty content");
    assert_eq!(emptied.kind(), "VALIDATION_ERROR");
}

#[test]
fn ratings_outside_range_are_rejected() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    for (mood, energy) in [(Some(0), None), (Some(11), None), (None, Some(-1))] {
        let error = db
            .create_journal_entry(
                &owner,
                NewJournalEntry {
                    content: "hello".to_string(),
                    mood_rating: mood,
                    energy_level: energy,
                    ..NewJournalEntry::default()
                },
            )
            .expect_err("out of range");
        assert_eq!(error.kind(), "VALIDATION_ERROR");
    }

    let cleared = entry(&db, &owner, "fine", |payload| payload.mood_rating = Some(6));
    let update: JournalUpdate = serde_json::from_value(serde_json::json!({ "mood_rating": null })).expect("update");
    let updated = db.update_journal_entry(&owner, &cleared.id, update).expect("clear");
    assert!(updated.mood_rating.is_none());
}

#[test]
fn soft_references_report_missing_ids() {
    let (_dir, db) = fresh_db();
    let owner = user(&db, "ada@example.com");
    let kept = task(&db, &owner, "kept");
    let dropped = task(&db, &owner, "dropped");
    let home = project(&db, &owner, "Home");

    let note = entry(&db, &owner, "linked note", |payload| {
        payload.related_task_ids = vec![kept.id.clone(), dropped.id.clone(), kept.id.clone()];
        payload.related_project_ids = vec![home.id.clone(), "gone".to_string()];
    });
    assert_eq!(note.related_task_ids.len(), 2);
    assert!(db.delete_task(&owner, &dropped.id).expect("delete"));

    let refs = db.resolve_journal_references(&owner, &note.id).expect("resolve");
    assert_eq!(refs.tasks.len(), 1);
    assert_eq!(refs.tasks[0].id, kept.id);
    assert_eq!(refs.missing_task_ids, vec![dropped.id]);
    assert_eq!(refs.projects.len(), 1);
    assert_eq!(refs.missing_project_ids, vec!["gone"]);
}

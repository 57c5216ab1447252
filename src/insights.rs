use crate::models::{EntryType, JournalEntry, Priority, Project, Task, TaskStatus};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

const MIN_TASKS_FOR_COMPLETION: usize = 5;
const MIN_MOOD_ENTRIES: usize = 3;
const MIN_RECENT_ENTRIES: usize = 3;
const RECENT_DAYS: i64 = 7;
const BUSY_WEEK_TASKS: usize = 10;
const MAX_SUGGESTIONS: usize = 5;
const MAX_PROMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Productivity,
    Mood,
    Pattern,
    Suggestion,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub actionable: bool,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub data_points: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSuggestion {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub suggested_tags: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalPrompt {
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub context: Option<String>,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

/// Everything the analyses look at for one account.
#[derive(Debug, Clone, Default)]
pub struct ActivitySnapshot {
    pub tasks: Vec<Task>,
    pub entries: Vec<JournalEntry>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    pub task_suggestions: Vec<TaskSuggestion>,
    pub journal_prompts: Vec<JournalPrompt>,
}

/// Post-processing hook for a language model. It receives the locally
/// computed insights and may rewrite, reorder or extend them.
pub trait InsightModel: Send + Sync {
    fn refine(&self, insights: Vec<Insight>, snapshot: &ActivitySnapshot) -> anyhow::Result<Vec<Insight>>;
}

/// Analyses always run on the caller's own data. `Ready` adds a refinement
/// pass through a model; only a failing model yields the sample insights.
pub enum InsightEngine {
    Ready(Box<dyn InsightModel>),
    Unavailable,
}

impl std::fmt::Debug for InsightEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("InsightEngine::Ready"),
            Self::Unavailable => f.write_str("InsightEngine::Unavailable"),
        }
    }
}

impl InsightEngine {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn productivity_insights(&self, snapshot: &ActivitySnapshot, now: DateTime<Utc>) -> Vec<Insight> {
        let local = analyze(snapshot, now);
        let model = match self {
            Self::Ready(model) if !local.is_empty() => model,
            _ => return local,
        };
        match model.refine(local, snapshot) {
            Ok(refined) => refined,
            Err(error) => {
                tracing::warn!(error = %error, "insight model failed, using sample insights");
                sample_insights()
            }
        }
    }

    pub fn task_suggestions(&self, snapshot: &ActivitySnapshot, now: DateTime<Utc>) -> Vec<TaskSuggestion> {
        suggest_tasks(&snapshot.tasks, &snapshot.entries, now)
    }

    pub fn journal_prompts(&self, snapshot: &ActivitySnapshot) -> Vec<JournalPrompt> {
        journal_prompts(&snapshot.tasks, &snapshot.entries)
    }

    pub fn report(&self, snapshot: &ActivitySnapshot, now: DateTime<Utc>) -> InsightReport {
        InsightReport {
            insights: self.productivity_insights(snapshot, now),
            task_suggestions: self.task_suggestions(snapshot, now),
            journal_prompts: self.journal_prompts(snapshot),
        }
    }
}

/// Runs every local analysis, in a fixed order.
pub fn analyze(snapshot: &ActivitySnapshot, now: DateTime<Utc>) -> Vec<Insight> {
    [
        completion_pattern(&snapshot.tasks),
        mood_correlation(&snapshot.tasks, &snapshot.entries),
        stalled_projects(&snapshot.projects, &snapshot.tasks, now),
        journaling_time_pattern(&snapshot.entries, now),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn completion_pattern(tasks: &[Task]) -> Option<Insight> {
    if tasks.len() < MIN_TASKS_FOR_COMPLETION {
        return None;
    }
    let completed = tasks.iter().filter(|task| task.status == TaskStatus::Completed).count();
    let rate = completed as f64 / tasks.len() as f64;
    let percent = (rate * 100.0).round();

    if rate > 0.8 {
        Some(insight(
            InsightKind::Productivity,
            "High Task Completion Rate",
            format!("You're completing {}% of your tasks. Great job staying on track!", percent),
            0.9,
            &[
                "Consider taking on more challenging tasks",
                "Share your productivity strategies with others",
            ],
        ))
    } else if rate < 0.5 {
        Some(insight(
            InsightKind::Warning,
            "Low Task Completion Rate",
            format!(
                "Your task completion rate is {}%. This might indicate overcommitment or unclear priorities.",
                percent
            ),
            0.8,
            &[
                "Review and prioritize your task list",
                "Break large tasks into smaller, manageable pieces",
                "Consider if you're taking on too much",
            ],
        ))
    } else {
        None
    }
}

pub fn mood_correlation(tasks: &[Task], entries: &[JournalEntry]) -> Option<Insight> {
    let moods: Vec<f64> = entries
        .iter()
        .filter_map(|entry| entry.mood_rating)
        .map(f64::from)
        .collect();
    if moods.len() < MIN_MOOD_ENTRIES {
        return None;
    }
    let average = moods.iter().sum::<f64>() / moods.len() as f64;
    let any_completed = tasks.iter().any(|task| task.status == TaskStatus::Completed);

    if average > 7.0 && any_completed {
        Some(insight(
            InsightKind::Mood,
            "Positive Mood Boost",
            format!(
                "Your average mood rating is {:.1}/10, and you're staying productive. Keep up the great work!",
                average
            ),
            0.7,
            &[
                "Note what activities contribute to your positive mood",
                "Schedule more of these mood-boosting activities",
            ],
        ))
    } else if average < 5.0 {
        Some(insight(
            InsightKind::Mood,
            "Mood Impact on Productivity",
            format!(
                "Your recent mood ratings average {:.1}/10. Consider focusing on self-care and manageable goals.",
                average
            ),
            0.8,
            &[
                "Schedule some self-care activities",
                "Focus on completing smaller, achievable tasks",
                "Consider talking to someone about how you're feeling",
            ],
        ))
    } else {
        None
    }
}

/// Active projects that have tasks, none of which changed in the last week.
pub fn stalled_projects(projects: &[Project], tasks: &[Task], now: DateTime<Utc>) -> Option<Insight> {
    let cutoff = now - Duration::days(RECENT_DAYS);
    let stalled: Vec<&Project> = projects
        .iter()
        .filter(|project| !project.is_archived)
        .filter(|project| {
            let mut project_tasks = tasks
                .iter()
                .filter(|task| task.project_id.as_deref() == Some(project.id.as_str()))
                .peekable();
            project_tasks.peek().is_some() && project_tasks.all(|task| task.updated_at <= cutoff)
        })
        .collect();
    if stalled.is_empty() {
        return None;
    }

    let mut found = insight(
        InsightKind::Warning,
        "Stalled Projects Detected",
        format!(
            "{} project(s) haven't had activity in the past week. They might need attention.",
            stalled.len()
        ),
        0.8,
        &[
            "Review stalled projects and identify blockers",
            "Break down next steps into specific tasks",
            "Consider if project scope needs adjustment",
        ],
    );
    found.data_points = stalled
        .iter()
        .map(|project| serde_json::json!({ "id": project.id, "name": project.name }))
        .collect();
    Some(found)
}

pub fn journaling_time_pattern(entries: &[JournalEntry], now: DateTime<Utc>) -> Option<Insight> {
    let cutoff = now - Duration::days(RECENT_DAYS);
    let hours: Vec<f64> = entries
        .iter()
        .filter(|entry| entry.created_at > cutoff)
        .map(|entry| f64::from(entry.created_at.hour()))
        .collect();
    if hours.len() < MIN_RECENT_ENTRIES {
        return None;
    }
    let average = hours.iter().sum::<f64>() / hours.len() as f64;
    let habit = if average < 8.0 {
        "You tend to be most reflective in the early morning hours."
    } else if average > 20.0 {
        "You often do your journaling in the evening hours."
    } else {
        "You journal throughout the day at various times."
    };

    Some(insight(
        InsightKind::Pattern,
        "Journaling Time Pattern",
        format!("{} This consistency can help build a strong reflection habit.", habit),
        0.6,
        &[
            "Consider setting a regular time for journaling",
            "Use this natural timing to your advantage",
        ],
    ))
}

pub fn suggest_tasks(tasks: &[Task], entries: &[JournalEntry], now: DateTime<Utc>) -> Vec<TaskSuggestion> {
    let mut suggestions = Vec::new();

    let overdue = tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .filter(|task| task.due_date.is_some_and(|due| due < now))
        .count();
    if overdue > 0 {
        suggestions.push(suggestion(
            "Review Overdue Tasks",
            "You have overdue tasks that might need attention, rescheduling, or breaking down into smaller steps.",
            Priority::High,
            30,
            &["review", "planning"],
            format!("You have {} overdue task(s) that need attention.", overdue),
        ));
    }

    let goal_entries = entries.iter().filter(|e| e.entry_type == EntryType::GoalProgress).count();
    let learning_entries = entries.iter().filter(|e| e.entry_type == EntryType::Learning).count();
    if goal_entries > learning_entries {
        suggestions.push(suggestion(
            "Schedule Learning Time",
            "Based on your journal patterns, you focus a lot on goals. Consider scheduling dedicated time for learning new skills.",
            Priority::Medium,
            60,
            &["learning", "development"],
            "Your journal shows strong goal focus but limited learning entries.".to_string(),
        ));
    }

    let cutoff = now - Duration::days(RECENT_DAYS);
    let created_this_week = tasks.iter().filter(|task| task.created_at > cutoff).count();
    if created_this_week > BUSY_WEEK_TASKS {
        suggestions.push(suggestion(
            "Organize Task List",
            "You've been creating many tasks lately. Take time to organize, prioritize, and clean up your task list.",
            Priority::Medium,
            20,
            &["organization", "maintenance"],
            format!("You've created {} tasks in the past week.", created_this_week),
        ));
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

pub fn journal_prompts(tasks: &[Task], entries: &[JournalEntry]) -> Vec<JournalPrompt> {
    let mut prompts = Vec::new();

    if tasks.iter().any(|task| task.status == TaskStatus::Completed) {
        prompts.push(prompt(
            "What accomplishment from today are you most proud of, and what made it meaningful?",
            EntryType::Achievement,
            None,
            &["What skills did you use to achieve this?", "How can you build on this success?"],
        ));
    }

    let last_mood = entries
        .iter()
        .filter(|entry| entry.mood_rating.is_some())
        .max_by_key(|entry| entry.created_at)
        .and_then(|entry| entry.mood_rating);
    match last_mood {
        Some(mood) if mood < 5 => prompts.push(prompt(
            "What's one small thing that could make tomorrow better than today?",
            EntryType::Reflection,
            Some("Based on your recent mood patterns"),
            &[],
        )),
        Some(_) => prompts.push(prompt(
            "What positive energy are you feeling right now, and how can you share it?",
            EntryType::Gratitude,
            Some("You seem to be in a good mood lately"),
            &[],
        )),
        None => {}
    }

    if !tasks.is_empty() {
        prompts.push(prompt(
            "Looking at your current tasks, what's the biggest obstacle you're facing and how might you overcome it?",
            EntryType::GoalProgress,
            None,
            &["What resources do you need?", "Who could help you with this?"],
        ));
    }

    prompts.push(prompt(
        "What's something new you learned recently, and how will you apply it?",
        EntryType::Learning,
        None,
        &["What sparked your interest in this topic?", "What would you like to learn next?"],
    ));

    prompts.truncate(MAX_PROMPTS);
    prompts
}

pub fn sample_insights() -> Vec<Insight> {
    vec![
        insight(
            InsightKind::Productivity,
            "Strong Morning Productivity",
            "You complete most of your tasks between 9-11 AM. Consider scheduling important work during this time."
                .to_string(),
            0.8,
            &[
                "Block calendar time from 9-11 AM for focused work",
                "Schedule meetings outside your peak productivity hours",
            ],
        ),
        insight(
            InsightKind::Mood,
            "Mood-Task Correlation",
            "Your task completion rate is 25% higher on days when you journal about achievements.".to_string(),
            0.7,
            &[
                "Start each day by noting one small win from yesterday",
                "Keep an achievement log to boost motivation",
            ],
        ),
        insight(
            InsightKind::Pattern,
            "Weekly Planning Gap",
            "You tend to create many tasks on Mondays but fewer throughout the week. Consider better weekly planning."
                .to_string(),
            0.6,
            &[
                "Schedule 15 minutes each Friday for next week planning",
                "Review and adjust tasks mid-week",
            ],
        ),
    ]
}

fn insight(kind: InsightKind, title: &str, description: String, confidence: f64, actions: &[&str]) -> Insight {
    Insight {
        kind,
        title: title.to_string(),
        description,
        confidence,
        actionable: true,
        suggested_actions: actions.iter().map(|action| action.to_string()).collect(),
        data_points: Vec::new(),
    }
}

fn suggestion(
    title: &str,
    description: &str,
    priority: Priority,
    minutes: u32,
    tags: &[&str],
    reasoning: String,
) -> TaskSuggestion {
    TaskSuggestion {
        title: title.to_string(),
        description: description.to_string(),
        priority,
        estimated_minutes: Some(minutes),
        suggested_tags: tags.iter().map(|tag| tag.to_string()).collect(),
        reasoning,
    }
}

fn prompt(text: &str, kind: EntryType, context: Option<&str>, follow_ups: &[&str]) -> JournalPrompt {
    JournalPrompt {
        prompt: text.to_string(),
        kind,
        context: context.map(str::to_string),
        follow_up_questions: follow_ups.iter().map(|q| q.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).single().expect("time")
    }

    fn task(id: &str, status: TaskStatus, updated_days_ago: i64) -> Task {
        let stamp = now() - Duration::days(updated_days_ago);
        Task {
            id: id.to_string(),
            user_id: "u1".to_string(),
            project_id: None,
            parent_task_id: None,
            title: id.to_string(),
            description: String::new(),
            status,
            priority: Priority::Medium,
            due_date: None,
            completed_at: None,
            metadata: Metadata::new(),
            created_at: stamp,
            updated_at: stamp,
        }
    }

    fn entry(kind: EntryType, mood: Option<u8>, created_at: DateTime<Utc>) -> JournalEntry {
        JournalEntry {
            id: format!("j-{}", created_at.timestamp()),
            user_id: "u1".to_string(),
            title: None,
            content: "note".to_string(),
            entry_type: kind,
            entry_date: NaiveDate::from_ymd_opt(2024, 5, 19).expect("date"),
            time_of_day: None,
            tags: Vec::new(),
            mood_rating: mood,
            energy_level: None,
            related_task_ids: Vec::new(),
            related_project_ids: Vec::new(),
            attachments: Vec::new(),
            metadata: Metadata::new(),
            word_count: 1,
            reading_time_minutes: 1,
            created_at,
            updated_at: created_at,
        }
    }

    fn project(id: &str, archived: bool) -> Project {
        Project {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: format!("Project {}", id),
            description: String::new(),
            color: "#6366f1".to_string(),
            order_index: 0,
            is_archived: archived,
            created_at: now(),
            updated_at: now(),
        }
    }

    struct BrokenModel;

    impl InsightModel for BrokenModel {
        fn refine(&self, _insights: Vec<Insight>, _snapshot: &ActivitySnapshot) -> anyhow::Result<Vec<Insight>> {
            anyhow::bail!("model offline")
        }
    }

    #[test]
    fn completion_rate_thresholds() {
        let mostly_done: Vec<Task> = (0..5)
            .map(|i| task(&format!("t{}", i), TaskStatus::Completed, 0))
            .collect();
        let high = completion_pattern(&mostly_done).expect("insight");
        assert_eq!(high.kind, InsightKind::Productivity);
        assert!(high.description.contains("100%"));

        let mut mixed = mostly_done.clone();
        for t in mixed.iter_mut().take(3) {
            t.status = TaskStatus::Todo;
        }
        let low = completion_pattern(&mixed).expect("insight");
        assert_eq!(low.kind, InsightKind::Warning);
        assert!(low.description.contains("40%"));

        assert!(completion_pattern(&mostly_done[..4]).is_none());
    }

    #[test]
    fn mood_insights_need_three_ratings() {
        let done = vec![task("t1", TaskStatus::Completed, 0)];
        let happy: Vec<JournalEntry> = (0..3)
            .map(|i| entry(EntryType::General, Some(9), now() - Duration::hours(i)))
            .collect();
        let boost = mood_correlation(&done, &happy).expect("insight");
        assert_eq!(boost.title, "Positive Mood Boost");
        assert!(boost.description.contains("9.0/10"));

        let sad: Vec<JournalEntry> = (0..3)
            .map(|i| entry(EntryType::General, Some(3), now() - Duration::hours(i)))
            .collect();
        assert_eq!(mood_correlation(&[], &sad).expect("insight").title, "Mood Impact on Productivity");
        assert!(mood_correlation(&done, &happy[..2]).is_none());
    }

    #[test]
    fn stalled_projects_skip_archived_and_empty() {
        let projects = vec![project("a", false), project("b", true), project("c", false), project("d", false)];
        let mut old_a = task("old-a", TaskStatus::Todo, 10);
        old_a.project_id = Some("a".to_string());
        let mut old_b = task("old-b", TaskStatus::Todo, 10);
        old_b.project_id = Some("b".to_string());
        let mut fresh_d = task("fresh-d", TaskStatus::Todo, 1);
        fresh_d.project_id = Some("d".to_string());

        let found = stalled_projects(&projects, &[old_a, old_b, fresh_d], now()).expect("insight");
        assert_eq!(found.data_points, vec![serde_json::json!({ "id": "a", "name": "Project a" })]);
        assert!(found.description.starts_with("1 project(s)"));
    }

    #[test]
    fn journaling_hour_buckets() {
        let morning: Vec<JournalEntry> = (1..=3)
            .map(|day| entry(EntryType::General, None, Utc.with_ymd_and_hms(2024, 5, 20 - day, 6, 0, 0).single().expect("time")))
            .collect();
        let found = journaling_time_pattern(&morning, now()).expect("insight");
        assert!(found.description.starts_with("You tend to be most reflective"));

        let stale: Vec<JournalEntry> = (0..3)
            .map(|_| entry(EntryType::General, None, now() - Duration::days(30)))
            .collect();
        assert!(journaling_time_pattern(&stale, now()).is_none());
    }

    #[test]
    fn suggestions_from_overdue_goals_and_volume() {
        let mut tasks: Vec<Task> = (0..11).map(|i| task(&format!("t{}", i), TaskStatus::Todo, 1)).collect();
        tasks[0].due_date = Some(now() - Duration::days(2));
        let entries = vec![entry(EntryType::GoalProgress, None, now())];

        let titles: Vec<String> = suggest_tasks(&tasks, &entries, now())
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Review Overdue Tasks", "Schedule Learning Time", "Organize Task List"]);

        tasks[0].status = TaskStatus::Completed;
        assert!(suggest_tasks(&tasks[..5], &[], now()).is_empty());
    }

    #[test]
    fn prompts_capped_at_three() {
        let done = vec![task("t1", TaskStatus::Completed, 0)];
        let low = vec![
            entry(EntryType::General, Some(8), now() - Duration::days(2)),
            entry(EntryType::General, Some(2), now() - Duration::days(1)),
        ];
        let kinds: Vec<EntryType> = journal_prompts(&done, &low).into_iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![EntryType::Achievement, EntryType::Reflection, EntryType::GoalProgress]);

        let kinds: Vec<EntryType> = journal_prompts(&[], &[]).into_iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![EntryType::Learning]);
    }

    struct Reversing;

    impl InsightModel for Reversing {
        fn refine(&self, mut insights: Vec<Insight>, _snapshot: &ActivitySnapshot) -> anyhow::Result<Vec<Insight>> {
            insights.reverse();
            Ok(insights)
        }
    }

    fn busy_snapshot() -> ActivitySnapshot {
        let mut tasks: Vec<Task> = (0..5).map(|i| task(&format!("t{}", i), TaskStatus::Completed, 0)).collect();
        tasks.extend((5..11).map(|i| task(&format!("t{}", i), TaskStatus::Todo, 0)));
        ActivitySnapshot {
            tasks,
            entries: (0..3)
                .map(|i| entry(EntryType::General, Some(3), now() - Duration::hours(i)))
                .collect(),
            ..ActivitySnapshot::default()
        }
    }

    #[test]
    fn unavailable_engine_analyzes_real_activity() {
        let snapshot = busy_snapshot();
        let engine = InsightEngine::Unavailable;
        assert!(!engine.is_ready());

        let report = engine.report(&snapshot, now());
        assert_eq!(report.insights, analyze(&snapshot, now()));
        assert_ne!(report.insights, sample_insights());
        let titles: Vec<&str> = report.insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(&titles[..2], &["Low Task Completion Rate", "Mood Impact on Productivity"]);
        assert_eq!(report.task_suggestions[0].title, "Organize Task List");

        assert!(engine.productivity_insights(&ActivitySnapshot::default(), now()).is_empty());
    }

    #[test]
    fn ready_engine_refines_and_falls_back_on_failure() {
        let snapshot = busy_snapshot();
        let mut expected = analyze(&snapshot, now());
        expected.reverse();
        let refined = InsightEngine::Ready(Box::new(Reversing));
        assert_eq!(refined.productivity_insights(&snapshot, now()), expected);

        let broken = InsightEngine::Ready(Box::new(BrokenModel));
        assert_eq!(broken.productivity_insights(&snapshot, now()), sample_insights());
        assert_eq!(
            broken.task_suggestions(&snapshot, now()),
            suggest_tasks(&snapshot.tasks, &snapshot.entries, now())
        );
        assert!(broken.productivity_insights(&ActivitySnapshot::default(), now()).is_empty());
    }
}

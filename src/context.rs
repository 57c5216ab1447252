use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::insights::{ActivitySnapshot, InsightEngine, InsightModel, InsightReport};
use crate::intake::{EmailTaskDraft, MailClient, MailSource};
use crate::models::{ProjectFilters, Task};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailImport {
    pub created: Vec<Task>,
    /// E-mail ids that already had a task.
    pub skipped: Vec<String>,
}

/// Store plus integration strategies, assembled once at startup.
#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    pub db: Database,
    pub mail: MailSource,
    pub insights: InsightEngine,
}

impl AppContext {
    pub fn new(config: AppConfig, db: Database, mail: MailSource, insights: InsightEngine) -> Self {
        Self {
            config,
            db,
            mail,
            insights,
        }
    }

    /// No mail or model client ships with the crate. Both start unavailable
    /// and are attached with [`AppContext::with_mail_client`] and
    /// [`AppContext::with_insight_model`].
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let db = Database::open(&config.database_path, Duration::from_millis(config.busy_timeout_ms))?;
        tracing::info!(
            mail_configured = config.mail_configured(),
            insights_configured = config.insights_configured(),
            "context ready"
        );
        Ok(Self::new(config, db, MailSource::Unavailable, InsightEngine::Unavailable))
    }

    pub fn with_mail_client(mut self, client: Box<dyn MailClient>) -> Self {
        self.mail = MailSource::Ready(client);
        self
    }

    pub fn with_insight_model(mut self, model: Box<dyn InsightModel>) -> Self {
        self.insights = InsightEngine::Ready(model);
        self
    }

    /// Drafts for display only; falls back to the sample inbox.
    pub fn preview_email_tasks(&self, max_results: usize) -> Vec<EmailTaskDraft> {
        self.mail.preview_drafts(max_results, Utc::now().date_naive())
    }

    /// Turns actionable e-mails into tasks. E-mails whose id is already
    /// recorded on one of the owner's tasks are skipped. Without a working
    /// mail client nothing is imported.
    pub fn import_email_tasks(
        &self,
        owner: &str,
        max_results: usize,
        project_id: Option<&str>,
    ) -> AppResult<EmailImport> {
        if let Some(project_id) = project_id {
            if self.db.get_project(owner, project_id)?.is_none() {
                return Err(AppError::not_found("Project", "add tasks to"));
            }
        }

        let mut import = EmailImport::default();
        if !self.mail.is_ready() {
            tracing::warn!(user_id = %owner, "no mail client attached, nothing to import");
            return Ok(import);
        }

        let today = Utc::now().date_naive();
        for draft in self.mail.task_drafts(max_results, today) {
            let email_id = draft.email_id().unwrap_or_default().to_string();
            if !email_id.is_empty() && self.db.find_task_by_metadata(owner, "email_id", &email_id)?.is_some() {
                import.skipped.push(email_id);
                continue;
            }
            let task = self
                .db
                .create_task(owner, draft.into_new_task(project_id.map(str::to_string)))?;
            import.created.push(task);
        }

        tracing::info!(
            user_id = %owner,
            created = import.created.len(),
            skipped = import.skipped.len(),
            "email import finished"
        );
        Ok(import)
    }

    pub fn activity_snapshot(&self, owner: &str) -> AppResult<ActivitySnapshot> {
        let filters = ProjectFilters {
            include_archived: true,
            ..ProjectFilters::default()
        };
        Ok(ActivitySnapshot {
            tasks: self.db.list_tasks(owner, None)?,
            entries: self.db.list_journal_entries(owner, None)?,
            projects: self
                .db
                .list_projects(owner, &filters)?
                .into_iter()
                .map(|summary| summary.project)
                .collect(),
        })
    }

    pub fn insight_report(&self, owner: &str) -> AppResult<InsightReport> {
        let snapshot = self.activity_snapshot(owner)?;
        Ok(self.insights.report(&snapshot, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::EmailMessage;
    use crate::models::{EntryType, NewProject, NewTask, NewUser, Priority};

    fn context(dir: &tempfile::TempDir) -> AppContext {
        let config = AppConfig {
            database_path: dir.path().join("test.db"),
            ..AppConfig::default()
        };
        AppContext::from_config(config).expect("context")
    }

    fn user(ctx: &AppContext) -> String {
        ctx.db
            .create_user(NewUser {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "secret".to_string(),
                settings: None,
            })
            .expect("user")
            .id
    }

    struct StaticInbox(Vec<EmailMessage>);

    impl MailClient for StaticInbox {
        fn actionable_emails(&self, _max_results: usize) -> anyhow::Result<Vec<EmailMessage>> {
            Ok(self.0.clone())
        }
    }

    struct Offline;

    impl MailClient for Offline {
        fn actionable_emails(&self, _max_results: usize) -> anyhow::Result<Vec<EmailMessage>> {
            anyhow::bail!("token expired")
        }
    }

    fn contract_email(id: &str) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            subject: "Re: Contract".to_string(),
            body: "Please sign the contract by 12/31/2030.".to_string(),
            sender: "legal@example.com".to_string(),
            date: Utc::now(),
            labels: Vec::new(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn unavailable_mail_imports_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir);
        let owner = user(&ctx);

        let import = ctx.import_email_tasks(&owner, 10, None).expect("import");
        assert_eq!(import, EmailImport::default());
        assert!(ctx.db.list_tasks(&owner, None).expect("list").is_empty());
        assert_eq!(ctx.preview_email_tasks(10).len(), 3);
        assert!(ctx.db.list_tasks(&owner, None).expect("list").is_empty());
    }

    #[test]
    fn failing_mail_client_imports_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir).with_mail_client(Box::new(Offline));
        let owner = user(&ctx);

        let import = ctx.import_email_tasks(&owner, 10, None).expect("import");
        assert!(import.created.is_empty());
        assert!(ctx.db.list_tasks(&owner, None).expect("list").is_empty());
    }

    #[test]
    fn repeated_import_skips_known_emails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inbox = StaticInbox(vec![contract_email("real-1"), contract_email("real-2")]);
        let ctx = context(&dir).with_mail_client(Box::new(inbox));
        let owner = user(&ctx);

        let first = ctx.import_email_tasks(&owner, 10, None).expect("import");
        assert_eq!(first.created.len(), 2);
        assert!(first.skipped.is_empty());
        assert_eq!(first.created[0].priority, Priority::Low);

        let second = ctx.import_email_tasks(&owner, 10, None).expect("import");
        assert!(second.created.is_empty());
        assert_eq!(second.skipped, vec!["real-1", "real-2"]);
    }

    #[test]
    fn import_into_project_checks_ownership() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inbox = StaticInbox(vec![contract_email("real-1"), contract_email("real-2")]);
        let ctx = context(&dir).with_mail_client(Box::new(inbox));
        let owner = user(&ctx);

        let error = ctx
            .import_email_tasks(&owner, 10, Some("missing"))
            .expect_err("unknown project");
        assert_eq!(error.kind(), "NOT_FOUND");

        let project = ctx
            .db
            .create_project(
                &owner,
                NewProject {
                    name: "Inbox".to_string(),
                    ..NewProject::default()
                },
            )
            .expect("project");
        let import = ctx.import_email_tasks(&owner, 1, Some(&project.id)).expect("import");
        assert_eq!(import.created.len(), 1);
        assert_eq!(import.created[0].project_id.as_deref(), Some(project.id.as_str()));
    }

    #[test]
    fn attached_client_feeds_the_import() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inbox = StaticInbox(vec![contract_email("real-1")]);
        let ctx = context(&dir).with_mail_client(Box::new(inbox));
        let owner = user(&ctx);

        let import = ctx.import_email_tasks(&owner, 5, None).expect("import");
        assert_eq!(import.created.len(), 1);
        let task = &import.created[0];
        assert_eq!(task.title, "Contract");
        assert_eq!(
            task.due_date.map(|due| due.date_naive().to_string()).as_deref(),
            Some("2030-12-31")
        );
        assert_eq!(task.metadata.get("email_id"), Some(&serde_json::json!("real-1")));
    }

    #[test]
    fn unconfigured_insights_use_account_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir);
        let owner = user(&ctx);
        assert!(!ctx.insights.is_ready());

        let empty = ctx.insight_report(&owner).expect("report");
        assert!(empty.insights.is_empty());
        assert!(empty.task_suggestions.is_empty());
        assert_eq!(empty.journal_prompts.len(), 1);

        for n in 0..5 {
            let task = ctx
                .db
                .create_task(
                    &owner,
                    NewTask {
                        title: format!("chore {}", n),
                        ..NewTask::default()
                    },
                )
                .expect("task");
            ctx.db.complete_task(&owner, &task.id).expect("complete");
        }
        let report = ctx.insight_report(&owner).expect("report");
        assert_eq!(report.insights.len(), 1);
        assert_eq!(report.insights[0].title, "High Task Completion Rate");
        assert_eq!(report.journal_prompts[0].kind, EntryType::Achievement);
    }
}

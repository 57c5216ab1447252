use crate::models::{Metadata, NewTask, Priority};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_BODY_CHARS: usize = 1000;
const DESCRIPTION_EXCERPT_CHARS: usize = 300;
const MAX_ACTION_ITEMS: usize = 5;

const URGENT_KEYWORDS: &[&str] = &["urgent", "asap", "immediately", "critical", "deadline"];
const IMPORTANT_SENDERS: &[&str] = &["boss", "manager", "client", "customer"];
const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static ACTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:please|could you|can you|need to|should|must)\s+[^.!?]+")
            .expect("valid regex"),
        Regex::new(r"(?i)\b(?:todo|to do|action item|task):\s*[^.!?\n]+").expect("valid regex"),
        Regex::new(r"(?i)\b(?:deadline|due|by)\s+[^.!?\n]+").expect("valid regex"),
    ]
});

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:due|deadline|by)\s+([a-z]+)\.?\s+(\d{1,2})\b").expect("valid regex")
});
static FULL_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:due|deadline|by)\s+(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex")
});
static SHORT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:due|deadline|by)\s+(\d{1,2})/(\d{1,2})\b").expect("valid regex")
});
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// A task proposal derived from one e-mail, ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub action_items: Vec<String>,
    pub metadata: Metadata,
}

impl EmailTaskDraft {
    pub fn email_id(&self) -> Option<&str> {
        self.metadata.get("email_id").and_then(serde_json::Value::as_str)
    }

    pub fn into_new_task(self, project_id: Option<String>) -> NewTask {
        NewTask {
            title: self.title,
            description: Some(self.description),
            priority: Some(self.priority),
            project_id,
            due_date: self
                .due_date
                .map(|date| date.and_time(NaiveTime::MIN).and_utc()),
            metadata: Some(self.metadata),
            ..NewTask::default()
        }
    }
}

/// Source of actionable mail. Implementations wrap a real provider client.
pub trait MailClient: Send + Sync {
    fn actionable_emails(&self, max_results: usize) -> anyhow::Result<Vec<EmailMessage>>;
}

/// Chosen once at startup: a configured client, or nothing. The sample
/// inbox only ever backs read-only previews.
pub enum MailSource {
    Ready(Box<dyn MailClient>),
    Unavailable,
}

impl std::fmt::Debug for MailSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("MailSource::Ready"),
            Self::Unavailable => f.write_str("MailSource::Unavailable"),
        }
    }
}

impl MailSource {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Real mail only. No client and a failing client both yield nothing.
    pub fn actionable_emails(&self, max_results: usize) -> Vec<EmailMessage> {
        let emails = match self {
            Self::Ready(client) => match client.actionable_emails(max_results) {
                Ok(emails) => emails,
                Err(error) => {
                    tracing::warn!(error = %error, "mail client failed, treating inbox as empty");
                    Vec::new()
                }
            },
            Self::Unavailable => Vec::new(),
        };
        emails.into_iter().take(max_results).collect()
    }

    /// Real mail when a client answers, otherwise the sample inbox. Never
    /// feed the result into the store.
    pub fn preview_emails(&self, max_results: usize) -> Vec<EmailMessage> {
        let emails = match self {
            Self::Ready(client) => match client.actionable_emails(max_results) {
                Ok(emails) => emails,
                Err(error) => {
                    tracing::warn!(error = %error, "mail client failed, previewing sample inbox");
                    sample_emails()
                }
            },
            Self::Unavailable => sample_emails(),
        };
        emails.into_iter().take(max_results).collect()
    }

    pub fn task_drafts(&self, max_results: usize, today: NaiveDate) -> Vec<EmailTaskDraft> {
        drafts(&self.actionable_emails(max_results), today)
    }

    pub fn preview_drafts(&self, max_results: usize, today: NaiveDate) -> Vec<EmailTaskDraft> {
        drafts(&self.preview_emails(max_results), today)
    }
}

fn drafts(emails: &[EmailMessage], today: NaiveDate) -> Vec<EmailTaskDraft> {
    emails.iter().map(|email| to_task_draft(email, today)).collect()
}

/// Normalizes line endings, squeezes blank runs and caps the length.
pub fn clean_body(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n");
    let squeezed = EXCESS_NEWLINES.replace_all(&unified, "\n\n");
    squeezed.trim().chars().take(MAX_BODY_CHARS).collect()
}

pub fn extract_action_items(body: &str) -> Vec<String> {
    ACTION_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.find_iter(body))
        .map(|found| found.as_str().trim().to_string())
        .filter(|item| !item.is_empty())
        .take(MAX_ACTION_ITEMS)
        .collect()
}

pub fn suggest_priority(email: &EmailMessage) -> Priority {
    let content = format!("{} {}", email.subject, email.body).to_lowercase();
    if URGENT_KEYWORDS.iter().any(|keyword| content.contains(keyword)) {
        return Priority::High;
    }
    let sender = email.sender.to_lowercase();
    if IMPORTANT_SENDERS.iter().any(|marker| sender.contains(marker)) {
        return Priority::High;
    }
    if email.labels.iter().any(|label| label == "IMPORTANT") {
        return Priority::Medium;
    }
    Priority::Low
}

/// First deadline phrase that names a real calendar date. Dates without a
/// year fall in the year of `today`.
pub fn extract_due_date(body: &str, today: NaiveDate) -> Option<NaiveDate> {
    let month_day = MONTH_DAY.captures_iter(body).find_map(|caps| {
        let month = month_number(&caps[1])?;
        let day = caps[2].parse().ok()?;
        NaiveDate::from_ymd_opt(today.year(), month, day)
    });
    if month_day.is_some() {
        return month_day;
    }

    let full = FULL_DATE.captures_iter(body).find_map(|caps| {
        let month = caps[1].parse().ok()?;
        let day = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });
    if full.is_some() {
        return full;
    }

    SHORT_DATE.captures_iter(body).find_map(|caps| {
        let month = caps[1].parse().ok()?;
        let day = caps[2].parse().ok()?;
        NaiveDate::from_ymd_opt(today.year(), month, day)
    })
}

pub fn to_task_draft(email: &EmailMessage, today: NaiveDate) -> EmailTaskDraft {
    let body = clean_body(&email.body);
    let action_items = extract_action_items(&body);

    let subject = email.subject.trim();
    let title = match subject.strip_prefix("Re:") {
        Some(rest) => rest.trim().to_string(),
        None => subject.to_string(),
    };

    let excerpt: String = body.chars().take(DESCRIPTION_EXCERPT_CHARS).collect();
    let ellipsis = if body.chars().count() > DESCRIPTION_EXCERPT_CHARS { "..." } else { "" };
    let items = action_items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n");
    let description = format!(
        "Email from: {}\n\nContent: {}{}\n\nAction items:\n{}",
        email.sender, excerpt, ellipsis, items
    );

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), "gmail".into());
    metadata.insert("email_id".to_string(), email.id.clone().into());
    metadata.insert("sender".to_string(), email.sender.clone().into());
    metadata.insert("original_date".to_string(), email.date.to_rfc3339().into());

    EmailTaskDraft {
        title,
        description,
        priority: suggest_priority(email),
        due_date: extract_due_date(&body, today),
        action_items,
        metadata,
    }
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| name.starts_with(month))
        .map(|index| index as u32 + 1)
}

/// Fixed inbox served when no mail provider is configured or reachable.
pub fn sample_emails() -> Vec<EmailMessage> {
    let now = Utc::now();
    vec![
        EmailMessage {
            id: "mock-1".to_string(),
            subject: "Please review the quarterly report".to_string(),
            body: "Hi, could you please review the Q4 report and provide feedback by Friday? Thanks!"
                .to_string(),
            sender: "manager@company.com".to_string(),
            date: now,
            labels: vec!["IMPORTANT".to_string()],
            attachments: Vec::new(),
        },
        EmailMessage {
            id: "mock-2".to_string(),
            subject: "Action required: Update project timeline".to_string(),
            body: "The project timeline needs to be updated with the new deadline. Please complete this ASAP."
                .to_string(),
            sender: "team@company.com".to_string(),
            date: now,
            labels: vec!["INBOX".to_string()],
            attachments: Vec::new(),
        },
        EmailMessage {
            id: "mock-3".to_string(),
            subject: "Follow up on client meeting".to_string(),
            body: "TODO: Send the proposal to the client and schedule a follow-up meeting for next week."
                .to_string(),
            sender: "sales@company.com".to_string(),
            date: now,
            labels: vec!["INBOX".to_string()],
            attachments: Vec::new(),
        },
    ]
}

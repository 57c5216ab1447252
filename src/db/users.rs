use super::{format_time, merge_metadata, new_id, parse_metadata, parse_time, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Metadata, NewUser, User, UserUpdate};
use crate::rules::{normalize_email, require_text};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

const USER_COLUMNS: &str = "id, name, email, settings_json, created_at, updated_at";

impl Database {
    pub fn create_user(&self, payload: NewUser) -> AppResult<User> {
        let name = require_text(&payload.name, "Email, password, and name are required")?;
        let email = normalize_email(&payload.email)?;
        if payload.password.is_empty() {
            return Err(AppError::Validation(
                "Email, password, and name are required".to_string(),
            ));
        }

        let password_hash = hash_password(&payload.password)?;
        let settings = payload.settings.unwrap_or_default();
        let settings_json = serde_json::to_string(&settings)?;
        let now = Utc::now();
        let id = new_id();

        let conn = self.lock()?;
        if email_taken(&conn, &email, None)? {
            return Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, settings_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, name, email, password_hash, settings_json, format_time(&now)],
        )?;

        tracing::info!(user_id = %id, "user registered");
        Ok(User {
            id,
            name,
            email,
            settings,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            [email],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn update_user(&self, id: &str, update: UserUpdate) -> AppResult<User> {
        let name = update
            .name
            .as_deref()
            .map(|name| require_text(name, "Name cannot be empty"))
            .transpose()?;
        let email = update.email.as_deref().map(normalize_email).transpose()?;

        let conn = self.lock()?;
        let mut user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                parse_user_row,
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("User", "update"))?;

        if let Some(email) = email {
            if email_taken(&conn, &email, Some(id))? {
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }
            user.email = email;
        }
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(settings) = update.settings {
            merge_metadata(&mut user.settings, settings);
        }
        user.updated_at = Utc::now();

        conn.execute(
            "UPDATE users SET name = ?1, email = ?2, settings_json = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                user.name,
                user.email,
                serde_json::to_string(&user.settings)?,
                format_time(&user.updated_at),
                id
            ],
        )?;
        Ok(user)
    }

    /// Flags the account as deleted inside its settings and keeps every row.
    pub fn soft_delete_user(&self, id: &str) -> AppResult<bool> {
        let mut flag = Metadata::new();
        flag.insert("deleted".to_string(), serde_json::Value::Bool(true));
        flag.insert(
            "deleted_at".to_string(),
            serde_json::Value::String(format_time(&Utc::now())),
        );
        match self.update_user_settings(id, flag) {
            Ok(_) => Ok(true),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Removes the account and, through foreign keys, everything it owns.
    pub fn hard_delete_user(&self, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if changed > 0 {
            tracing::info!(user_id = %id, "user and owned data removed");
        }
        Ok(changed > 0)
    }

    /// Returns the user when the credentials match an active account.
    pub fn verify_password(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let conn = self.lock()?;
        let found = conn
            .query_row(
                &format!("SELECT {}, password_hash FROM users WHERE email = ?1", USER_COLUMNS),
                [email],
                |row| Ok((parse_user_row(row)?, row.get::<_, String>(6)?)),
            )
            .optional()?;

        let Some((user, password_hash)) = found else {
            return Ok(None);
        };
        if is_soft_deleted(&user.settings) || !password_matches(&password_hash, password) {
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub fn update_password(&self, id: &str, new_password: &str) -> AppResult<bool> {
        if new_password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }
        let password_hash = hash_password(new_password)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, format_time(&Utc::now()), id],
        )?;
        Ok(changed > 0)
    }

    pub fn user_settings(&self, id: &str) -> AppResult<Metadata> {
        self.get_user(id)?
            .map(|user| user.settings)
            .ok_or_else(|| AppError::not_found("User", "access"))
    }

    pub fn update_user_settings(&self, id: &str, settings: Metadata) -> AppResult<Metadata> {
        let update = UserUpdate {
            settings: Some(settings),
            ..UserUpdate::default()
        };
        self.update_user(id, update).map(|user| user.settings)
    }

    pub fn email_exists(&self, email: &str, exclude_id: Option<&str>) -> AppResult<bool> {
        let email = email.trim().to_lowercase();
        let conn = self.lock()?;
        email_taken(&conn, &email, exclude_id).map_err(AppError::from)
    }
}

fn email_taken(conn: &Connection, email: &str, exclude_id: Option<&str>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM users WHERE email = ?1 AND (?2 IS NULL OR id <> ?2)",
        params![email, exclude_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn is_soft_deleted(settings: &Metadata) -> bool {
    settings
        .get("deleted")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|error| AppError::Internal(format!("salt encoding failed: {}", error)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AppError::Internal(format!("password hashing failed: {}", error)))
}

fn password_matches(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(error) => {
            tracing::warn!(error = %error, "stored password hash is malformed");
            false
        }
    }
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        settings: parse_metadata(&row.get::<_, String>(3)?),
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

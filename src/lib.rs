pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod insights;
pub mod intake;
pub mod models;
pub mod rules;

pub use crate::config::AppConfig;
pub use crate::context::{AppContext, EmailImport};
pub use crate::db::Database;
pub use crate::errors::{AppError, AppResult, ErrorBody};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// JSON logs to a daily file under `log_dir`. `RUST_LOG` wins over `level`.
pub fn init_tracing(log_dir: &Path, level: &str) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "daybook.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

/// Boundary conversion for anything shown to a caller. Internal details are
/// logged here and replaced by a generic message.
pub fn to_client_error(error: AppError) -> ErrorBody {
    match &error {
        AppError::Storage(_) | AppError::Io(_) | AppError::Internal(_) => {
            tracing::error!(kind = error.kind(), error = %error, "request failed");
        }
        _ => tracing::debug!(kind = error.kind(), error = %error, "request rejected"),
    }
    ErrorBody::from(error)
}

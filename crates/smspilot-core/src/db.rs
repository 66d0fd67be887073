//! Append-only execution log in SQLite.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

use crate::command::{Command, Intent};
use crate::dispatch::Dispatch;

const CONNECT_ATTEMPTS: u32 = 3;

/// One processed command as shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub command_id: String,
    pub received_at: DateTime<Utc>,
    pub sender: String,
    pub command: String,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub status: String,
    pub summary: String,
    pub reply: String,
    pub attempts: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogStats {
    pub total_messages: i64,
    pub successful_actions: i64,
    pub errors: i64,
}

#[derive(Clone)]
pub struct ExecutionLog {
    pool: SqlitePool,
}

impl ExecutionLog {
    /// Open (creating if missing) the log database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let mut retry_count = 0;
        loop {
            let options = SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

            match try_connect_and_migrate(options).await {
                Ok(pool) => {
                    tracing::info!("execution log ready at {}", db_path.display());
                    return Ok(Self { pool });
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= CONNECT_ATTEMPTS {
                        tracing::error!(
                            "execution log unavailable after {} attempts: {:#}, path: {}",
                            CONNECT_ATTEMPTS,
                            e,
                            db_path.display()
                        );
                        return Err(e);
                    }
                    tracing::warn!(
                        "execution log connect failed, retrying ({}/{}): {:#}",
                        retry_count,
                        CONNECT_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    /// Use an existing pool, applying migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("execution log migration failed")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record one processed command. Returns the row id.
    pub async fn append(
        &self,
        command: &Command,
        intent: &Intent,
        dispatch: &Dispatch,
        reply: &str,
    ) -> Result<i64> {
        let attempts_json = serde_json::to_string(&dispatch.attempts)?;
        let result = sqlx::query(
            r#"
            INSERT INTO execution_log
                (command_id, received_at, sender, command_text, intent, channel, status, summary, reply, attempts_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(command.id.to_string())
        .bind(command.received_at)
        .bind(&command.sender)
        .bind(&command.text)
        .bind(intent.kind.as_str())
        .bind(dispatch.summary.channel.map(|c| c.as_str()))
        .bind(dispatch.summary.status.as_str())
        .bind(&dispatch.summary.description)
        .bind(reply)
        .bind(attempts_json)
        .execute(&self.pool)
        .await
        .context("failed to append execution log entry")?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, command_id, received_at, sender, command_text, intent, channel, status, summary, reply, attempts_json
            FROM execution_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let attempts_json: String = row.try_get("attempts_json")?;
                Ok(LogEntry {
                    id: row.try_get("id")?,
                    command_id: row.try_get("command_id")?,
                    received_at: row.try_get("received_at")?,
                    sender: row.try_get("sender")?,
                    command: row.try_get("command_text")?,
                    intent: row.try_get("intent")?,
                    channel: row.try_get("channel")?,
                    status: row.try_get("status")?,
                    summary: row.try_get("summary")?,
                    reply: row.try_get("reply")?,
                    attempts: serde_json::from_str(&attempts_json)
                        .unwrap_or(serde_json::Value::Array(Vec::new())),
                })
            })
            .collect()
    }

    pub async fn stats(&self) -> Result<LogStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed
            FROM execution_log
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LogStats {
            total_messages: row.try_get("total")?,
            successful_actions: row.try_get("completed")?,
            errors: row.try_get("failed")?,
        })
    }
}

async fn try_connect_and_migrate(options: SqliteConnectOptions) -> Result<SqlitePool> {
    let pool = SqlitePool::connect_with(options).await?;
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("execution log migration failed: {}", e);
        pool.close().await;
        return Err(anyhow::anyhow!("Database migration failed: {}", e));
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelKind, ErrorKind};
    use crate::command::IntentKind;
    use crate::dispatch::{AttemptOutcome, ExecutionAttempt, ExecutionSummary, SummaryStatus};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_log() -> ExecutionLog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ExecutionLog::from_pool(pool).await.unwrap()
    }

    fn dispatch(status: SummaryStatus, channel: Option<ChannelKind>) -> Dispatch {
        let now = Utc::now();
        Dispatch {
            attempts: vec![ExecutionAttempt {
                channel: ChannelKind::ToolProtocol,
                started_at: now,
                finished_at: now,
                outcome: if status == SummaryStatus::Completed {
                    AttemptOutcome::Success
                } else {
                    AttemptOutcome::Failure
                },
                output: "ok".into(),
                error: (status != SummaryStatus::Completed).then_some(ErrorKind::ConnectionRefused),
                payload: None,
            }],
            summary: ExecutionSummary {
                status,
                channel,
                description: "Creating hello.py".into(),
                last_error: None,
            },
        }
    }

    #[tokio::test]
    async fn appends_and_reads_back_newest_first() {
        let log = memory_log().await;
        let command = Command::new("create hello.py", "+15550001111", "+15550002222");
        let intent = Intent::new(IntentKind::CreateFile, "create hello.py", "Creating hello.py");

        log.append(&command, &intent, &dispatch(SummaryStatus::Failed, None), "Could not complete")
            .await
            .unwrap();
        let id = log
            .append(
                &command,
                &intent,
                &dispatch(SummaryStatus::Completed, Some(ChannelKind::ToolProtocol)),
                "Done: Creating hello.py",
            )
            .await
            .unwrap();

        let entries = log.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].channel.as_deref(), Some("tool_protocol"));
        assert_eq!(entries[0].intent, "create_file");
        assert_eq!(entries[0].reply, "Done: Creating hello.py");
        assert_eq!(entries[0].attempts[0]["channel"], "tool_protocol");
        assert_eq!(entries[1].status, "failed");
        assert_eq!(entries[1].received_at, command.received_at);

        assert_eq!(log.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_count_completed_and_failed() {
        let log = memory_log().await;
        assert_eq!(log.stats().await.unwrap(), LogStats::default());

        let command = Command::new("run tests", "+1", "+2");
        let intent = Intent::new(IntentKind::RunCommand, "run tests", "Running tests");
        for status in [SummaryStatus::Completed, SummaryStatus::Predicted, SummaryStatus::Failed] {
            log.append(&command, &intent, &dispatch(status, None), "r").await.unwrap();
        }

        let stats = log.stats().await.unwrap();
        assert_eq!(
            stats,
            LogStats {
                total_messages: 3,
                successful_actions: 1,
                errors: 1
            }
        );
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("smspilot.db");
        let log = ExecutionLog::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(log.stats().await.unwrap().total_messages, 0);
    }
}

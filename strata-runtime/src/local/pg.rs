use crate::services::DatabaseTool;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use strata_storage::admin::validate_identifier;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

/// Maximum stderr captured from a tool run (1MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Connection parameters handed to `pg_dump` / `pg_restore`
#[derive(Clone)]
pub struct PgConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for PgConnection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgToolConfig {
    pub pg_dump_path: PathBuf,
    pub pg_restore_path: PathBuf,
    pub connection: PgConnection,
    /// Hard limit per tool invocation; the process is killed when exceeded
    pub timeout: Duration,
}

impl Default for PgToolConfig {
    fn default() -> Self {
        Self {
            pg_dump_path: PathBuf::from("pg_dump"),
            pg_restore_path: PathBuf::from("pg_restore"),
            connection: PgConnection::default(),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// [`DatabaseTool`] that shells out to the PostgreSQL client tools
pub struct PgDumpTool {
    config: PgToolConfig,
}

impl PgDumpTool {
    pub fn new(config: PgToolConfig) -> Self {
        Self { config }
    }

    fn command(&self, program: &Path) -> tokio::process::Command {
        let conn = &self.config.connection;
        let mut cmd = tokio::process::Command::new(program);
        cmd.arg("--host")
            .arg(&conn.host)
            .arg("--port")
            .arg(conn.port.to_string())
            .arg("--username")
            .arg(&conn.user)
            .arg("--no-password")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &conn.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd
    }

    /// Run to completion under the configured timeout, killing on expiry
    async fn run(&self, tool: &str, mut cmd: tokio::process::Command) -> Result<()> {
        let mut child = cmd.spawn().map_err(|e| {
            Error::DatabaseTool(format!("Failed to spawn {}: {}", tool, e))
        })?;

        let stderr_handle = child.stderr.take();
        let result = tokio::time::timeout(self.config.timeout, async {
            let mut stderr_buf = Vec::with_capacity(4096);
            if let Some(stderr) = stderr_handle {
                stderr
                    .take(MAX_OUTPUT_SIZE as u64)
                    .read_to_end(&mut stderr_buf)
                    .await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr_buf))
        })
        .await;

        match result {
            Ok(Ok((status, stderr_buf))) => {
                let stderr = String::from_utf8_lossy(&stderr_buf);
                if !status.success() {
                    let exit_code = status.code().unwrap_or(-1);
                    error!(tool = tool, exit_code = exit_code, stderr = %stderr, "Database tool failed");
                    return Err(Error::DatabaseTool(format!(
                        "{} exited with status {}: {}",
                        tool,
                        exit_code,
                        truncate_end(stderr.trim(), 500)
                    )));
                }
                if !stderr.is_empty() {
                    debug!(tool = tool, stderr = %stderr, "Database tool output");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(Error::DatabaseTool(format!(
                "I/O error while running {}: {}",
                tool, e
            ))),
            Err(_) => {
                warn!(
                    tool = tool,
                    timeout_seconds = self.config.timeout.as_secs(),
                    "Database tool timed out, killing process"
                );
                if let Err(e) = child.kill().await {
                    error!(tool = tool, error = %e, "Failed to kill timed-out process");
                }
                Err(Error::Timeout(format!(
                    "{} timed out after {} seconds",
                    tool,
                    self.config.timeout.as_secs()
                )))
            }
        }
    }
}

/// Keep the last `max_len` bytes of tool output
fn truncate_end(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut start = s.len() - max_len;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}

#[async_trait]
impl DatabaseTool for PgDumpTool {
    async fn dump(&self, database: &str, output: &Path) -> Result<()> {
        validate_identifier(database, "Database name")?;

        let mut cmd = self.command(&self.config.pg_dump_path);
        cmd.arg("--format=custom")
            .arg("--file")
            .arg(output)
            .arg("--dbname")
            .arg(database);

        info!(database = database, output = %output.display(), "Running pg_dump");
        self.run("pg_dump", cmd).await
    }

    async fn restore(&self, database: &str, input: &Path, clean: bool) -> Result<()> {
        validate_identifier(database, "Database name")?;

        let mut cmd = self.command(&self.config.pg_restore_path);
        cmd.arg("--dbname").arg(database).arg("--no-owner");
        if clean {
            cmd.arg("--clean").arg("--if-exists");
        }
        cmd.arg(input);

        info!(database = database, clean = clean, input = %input.display(), "Running pg_restore");
        self.run("pg_restore", cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_not_debug_printed() {
        let conn = PgConnection {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let printed = format!("{:?}", conn);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_truncate_end() {
        assert_eq!(truncate_end("short", 10), "short");
        assert_eq!(truncate_end("0123456789", 4), "...6789");
    }

    #[tokio::test]
    async fn test_rejects_unsafe_database_name() {
        let tool = PgDumpTool::new(PgToolConfig::default());
        let err = tool
            .dump("teachlink; rm -rf /", Path::new("/tmp/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(strata_storage::Error::ValidationError(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_tool_error() {
        let tool = PgDumpTool::new(PgToolConfig {
            pg_dump_path: PathBuf::from("false"),
            ..Default::default()
        });
        let err = tool.dump("teachlink", Path::new("/tmp/x")).await.unwrap_err();
        assert!(matches!(err, Error::DatabaseTool(_)));
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_binary_is_tool_error() {
        let tool = PgDumpTool::new(PgToolConfig {
            pg_restore_path: PathBuf::from("/nonexistent/pg_restore"),
            ..Default::default()
        });
        let err = tool
            .restore("teachlink", Path::new("/tmp/x"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DatabaseTool(ref m) if m.contains("spawn")));
    }
}

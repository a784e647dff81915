// Copyright (c) 2025 - Cowboy AI, Inc.
//! Metastore Database Bootstrap
//!
//! The statements that prepare the RDS instance for the Hive metastore,
//! matching the database, user and grant the stack declares through the
//! MySQL provider. They can be printed for an operator or run directly
//! against the instance when the MySQL provider is unavailable.
//!
//! Passwords only ever appear in [`SqlStatement::sql`]; everything logged
//! or printed uses [`SqlStatement::redacted`].

#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "mysql")]
pub use mysql::MySqlExecutor;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{RdsConfig, Secret};
use crate::stack::database::{HIVE_DATABASE, HIVE_PRIVILEGES};

const REDACTED: &str = "'********'";

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A name cannot be used as a MySQL identifier
    #[error("Invalid MySQL identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// The password is only available as ciphertext
    #[error("Password for {0} is encrypted; supply its plaintext through the environment")]
    SecretUnavailable(String),

    /// The server rejected a statement
    #[error("Statement failed ({statement}): {reason}")]
    Execution { statement: String, reason: String },

    /// The server could not be reached
    #[error("Failed to connect to {url}: {reason}")]
    Connection { url: String, reason: String },
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// One SQL statement and its loggable form
#[derive(Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub redacted: String,
}

impl SqlStatement {
    fn plain(sql: String) -> Self {
        Self {
            redacted: sql.clone(),
            sql,
        }
    }
}

impl std::fmt::Debug for SqlStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SqlStatement").field(&self.redacted).finish()
    }
}

/// Check a database or user name against MySQL's unquoted identifier rules
pub fn validate_identifier(name: &str) -> BootstrapResult<()> {
    let invalid = |reason| BootstrapError::InvalidIdentifier {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > 32 {
        return Err(invalid("longer than 32 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(invalid("only letters, digits, '_' and '$' are allowed"));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("must not be all digits"));
    }
    Ok(())
}

/// Quote a string literal, escaping backslashes and single quotes
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Statements creating the metastore database, user and grant
pub fn metastore_statements(
    hive_username: &str,
    hive_password: &Secret,
) -> BootstrapResult<Vec<SqlStatement>> {
    validate_identifier(HIVE_DATABASE)?;
    validate_identifier(hive_username)?;
    let password = hive_password
        .expose()
        .ok_or_else(|| BootstrapError::SecretUnavailable(hive_username.to_string()))?;

    let account = format!("'{}'@'%'", hive_username);
    let create_user = format!("CREATE USER IF NOT EXISTS {} IDENTIFIED BY ", account);
    let privileges = HIVE_PRIVILEGES
        .iter()
        .map(|p| p.to_uppercase())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(vec![
        SqlStatement::plain(format!("CREATE DATABASE IF NOT EXISTS `{}`", HIVE_DATABASE)),
        SqlStatement {
            sql: format!("{}{}", create_user, quote_literal(password)),
            redacted: format!("{}{}", create_user, REDACTED),
        },
        SqlStatement::plain(format!(
            "GRANT {} ON `{}`.* TO {}",
            privileges, HIVE_DATABASE, account
        )),
        SqlStatement::plain("FLUSH PRIVILEGES".to_string()),
    ])
}

/// Statements for a stack's RDS settings
pub fn statements_for(rds: &RdsConfig, hive_password: &Secret) -> BootstrapResult<Vec<SqlStatement>> {
    metastore_statements(&rds.hive_username, hive_password)
}

/// Runs bootstrap statements
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&mut self, statement: &SqlStatement) -> BootstrapResult<()>;
}

/// Records statements instead of running them
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    executed: Vec<SqlStatement>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> &[SqlStatement] {
        &self.executed
    }
}

#[async_trait]
impl SqlExecutor for DryRunExecutor {
    async fn execute(&mut self, statement: &SqlStatement) -> BootstrapResult<()> {
        info!(statement = %statement.redacted, "[DRY RUN] would execute");
        self.executed.push(statement.clone());
        Ok(())
    }
}

/// Run every statement in order, stopping at the first failure
pub async fn run_bootstrap<E>(executor: &mut E, statements: &[SqlStatement]) -> BootstrapResult<()>
where
    E: SqlExecutor + ?Sized,
{
    for statement in statements {
        executor.execute(statement).await?;
    }
    info!(statements = statements.len(), "metastore bootstrap complete");
    Ok(())
}

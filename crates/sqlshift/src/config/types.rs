//! Configuration type definitions: the in-memory migration plan.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::TableRef;

/// Database provider for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    SqlServer,
    AzureSql,
    Oracle,
    MySql,
    PostgreSql,
}

impl Provider {
    /// Parse the provider name as it appears in configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SqlServer" => Some(Provider::SqlServer),
            "AzureSql" => Some(Provider::AzureSql),
            "Oracle" => Some(Provider::Oracle),
            "MySql" => Some(Provider::MySql),
            "PostgreSql" => Some(Provider::PostgreSql),
            _ => None,
        }
    }

    /// Default TCP port when the connection does not specify one.
    #[must_use]
    pub fn default_port(&self) -> u16 {
        match self {
            Provider::SqlServer | Provider::AzureSql => 1433,
            Provider::Oracle => 1521,
            Provider::MySql => 3306,
            Provider::PostgreSql => 5432,
        }
    }

    /// Whether this provider speaks TDS (valid as a migration target).
    #[must_use]
    pub fn is_mssql_family(&self) -> bool {
        matches!(self, Provider::SqlServer | Provider::AzureSql)
    }

    /// Authentication modes this provider recognizes; anything else fails
    /// loudly at validation.
    #[must_use]
    pub fn supported_auth(&self) -> &'static [AuthMode] {
        match self {
            Provider::SqlServer => &[AuthMode::SqlAuth, AuthMode::WindowsAuth],
            Provider::AzureSql => &[
                AuthMode::SqlAuth,
                AuthMode::InteractiveBrowser,
                AuthMode::CliDelegated,
            ],
            Provider::Oracle | Provider::MySql | Provider::PostgreSql => &[AuthMode::SqlAuth],
        }
    }

    /// Schema assumed when a table identifier carries none.
    #[must_use]
    pub fn default_schema(&self, database: &str, user: Option<&str>) -> String {
        match self {
            Provider::SqlServer | Provider::AzureSql => "dbo".to_string(),
            Provider::PostgreSql => "public".to_string(),
            Provider::MySql => database.to_string(),
            Provider::Oracle => user
                .map(|u| u.to_uppercase())
                .unwrap_or_else(|| database.to_uppercase()),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::SqlServer => "SqlServer",
            Provider::AzureSql => "AzureSql",
            Provider::Oracle => "Oracle",
            Provider::MySql => "MySql",
            Provider::PostgreSql => "PostgreSql",
        };
        f.write_str(s)
    }
}

/// Authentication mode for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    /// Username + password; missing credentials are solicited interactively.
    SqlAuth,
    /// Windows integrated authentication (SQL Server on Windows hosts).
    WindowsAuth,
    /// Azure AD interactive browser sign-in.
    InteractiveBrowser,
    /// Azure AD token delegated to the installed `az` CLI session.
    CliDelegated,
}

impl AuthMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SqlAuth" => Some(AuthMode::SqlAuth),
            "WindowsAuth" => Some(AuthMode::WindowsAuth),
            "InteractiveBrowser" => Some(AuthMode::InteractiveBrowser),
            "CliDelegated" => Some(AuthMode::CliDelegated),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthMode::SqlAuth => "SqlAuth",
            AuthMode::WindowsAuth => "WindowsAuth",
            AuthMode::InteractiveBrowser => "InteractiveBrowser",
            AuthMode::CliDelegated => "CliDelegated",
        };
        f.write_str(s)
    }
}

/// A source or target connection descriptor.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub provider: Provider,
    pub server: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub auth: AuthMode,
}

impl ConnectionConfig {
    /// Effective port, falling back to the provider default.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.provider.default_port())
    }

    /// Schema assumed for unqualified table identifiers on this connection.
    #[must_use]
    pub fn default_schema(&self) -> String {
        self.provider
            .default_schema(&self.database, self.user.as_deref())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("provider", &self.provider)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("auth", &self.auth)
            .finish()
    }
}

/// Log verbosity recognized on the command line and in the global config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Error" => Some(LogLevel::Error),
            "Warning" => Some(LogLevel::Warning),
            "Info" => Some(LogLevel::Info),
            "Verbose" => Some(LogLevel::Verbose),
            "Debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// The tracing filter directive for this level.
    #[must_use]
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Verbose => "debug",
            LogLevel::Debug => "trace",
        }
    }
}

/// Per-table identity handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentityMode {
    /// The engine supplies identity values (explicit identity insert).
    #[default]
    Preserve,
    /// The target generates identity values; the engine records the
    /// old-key → new-key mapping for descendants.
    Generate,
}

/// What to do with rows already present in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExistingDataAction {
    Truncate,
    #[default]
    Append,
}

/// Table-level settings from the table-map file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSettings {
    pub identity_mode: IdentityMode,
    pub identity_column: Option<String>,
    pub existing_data: ExistingDataAction,
}

/// A plain column copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleMapping {
    pub source: String,
    pub target: String,
    /// When set, the source text is parsed as a date with this format.
    pub source_date_format: Option<String>,
}

/// One piece of a concat program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConcatPart {
    Column(String),
    Literal(String),
}

/// One output of a split program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub index: usize,
    pub column: String,
}

/// Where a conditional branch takes its output value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSpec {
    Literal(String),
    Column(String),
}

/// A predicate → value branch of a conditional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenClause {
    pub predicate: String,
    pub value: ValueSpec,
}

/// Generator functions available to `static` transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaticFunction {
    NowLocal,
    NowUtc,
    NewGuid,
    CurrentUser,
}

impl StaticFunction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nowLocal" => Some(StaticFunction::NowLocal),
            "nowUtc" => Some(StaticFunction::NowUtc),
            "newGuid" => Some(StaticFunction::NewGuid),
            "currentUser" => Some(StaticFunction::CurrentUser),
            _ => None,
        }
    }
}

/// Output of a `static` transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StaticSource {
    Literal(String),
    Function(StaticFunction),
}

/// Target SQL type for a `convert` transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    DateTime,
    DateTime2,
    Date,
    SmallDateTime,
    Int,
    BigInt,
    Decimal,
    Float,
    Bit,
    Varchar,
    NVarchar,
    UniqueIdentifier,
}

impl TargetType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "datetime" => Some(TargetType::DateTime),
            "datetime2" => Some(TargetType::DateTime2),
            "date" => Some(TargetType::Date),
            "smalldatetime" => Some(TargetType::SmallDateTime),
            "int" => Some(TargetType::Int),
            "bigint" => Some(TargetType::BigInt),
            "decimal" => Some(TargetType::Decimal),
            "float" => Some(TargetType::Float),
            "bit" => Some(TargetType::Bit),
            "varchar" => Some(TargetType::Varchar),
            "nvarchar" => Some(TargetType::NVarchar),
            "uniqueidentifier" => Some(TargetType::UniqueIdentifier),
            _ => None,
        }
    }
}

/// One step of a table's transformation program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transformation {
    Simple {
        source: String,
        target: String,
        null_default: Option<String>,
    },
    Concat {
        parts: Vec<ConcatPart>,
        target: String,
        null_default: Option<String>,
    },
    Split {
        source: String,
        delimiter: String,
        targets: Vec<SplitTarget>,
    },
    Lookup {
        source: String,
        target: String,
        table: HashMap<String, String>,
        default: Option<String>,
        null_default: Option<String>,
    },
    Calculated {
        expression: String,
        target: String,
        null_default: Option<String>,
    },
    Static {
        target: String,
        value: StaticSource,
    },
    Conditional {
        target: String,
        whens: Vec<WhenClause>,
        otherwise: Option<ValueSpec>,
    },
    Convert {
        source: String,
        source_format: Option<String>,
        target: String,
        target_type: TargetType,
        null_default: Option<String>,
    },
    KeyLookup {
        source: String,
        target: String,
        parent_table: String,
        parent_key_column: String,
        null_default: Option<String>,
    },
}

impl Transformation {
    /// Target columns this transformation writes.
    #[must_use]
    pub fn target_columns(&self) -> Vec<&str> {
        match self {
            Transformation::Simple { target, .. }
            | Transformation::Concat { target, .. }
            | Transformation::Lookup { target, .. }
            | Transformation::Calculated { target, .. }
            | Transformation::Static { target, .. }
            | Transformation::Conditional { target, .. }
            | Transformation::Convert { target, .. }
            | Transformation::KeyLookup { target, .. } => vec![target.as_str()],
            Transformation::Split { targets, .. } => {
                targets.iter().map(|t| t.column.as_str()).collect()
            }
        }
    }

    /// Source columns this transformation reads.
    #[must_use]
    pub fn source_columns(&self) -> Vec<String> {
        match self {
            Transformation::Simple { source, .. }
            | Transformation::Split { source, .. }
            | Transformation::Lookup { source, .. }
            | Transformation::Convert { source, .. }
            | Transformation::KeyLookup { source, .. } => vec![source.clone()],
            Transformation::Concat { parts, .. } => parts
                .iter()
                .filter_map(|p| match p {
                    ConcatPart::Column(c) => Some(c.clone()),
                    ConcatPart::Literal(_) => None,
                })
                .collect(),
            Transformation::Calculated { expression, .. } => {
                crate::transform::expr::referenced_columns(expression)
            }
            Transformation::Static { .. } => Vec::new(),
            Transformation::Conditional { whens, otherwise, .. } => {
                let mut cols: Vec<String> = whens
                    .iter()
                    .filter_map(|w| crate::transform::predicate::predicate_column(&w.predicate))
                    .collect();
                for spec in whens
                    .iter()
                    .map(|w| &w.value)
                    .chain(otherwise.iter())
                {
                    if let ValueSpec::Column(c) = spec {
                        cols.push(c.clone());
                    }
                }
                cols
            }
        }
    }

    /// Short name used in logs and validation messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Transformation::Simple { .. } => "simple",
            Transformation::Concat { .. } => "concat",
            Transformation::Split { .. } => "split",
            Transformation::Lookup { .. } => "lookup",
            Transformation::Calculated { .. } => "calculated",
            Transformation::Static { .. } => "static",
            Transformation::Conditional { .. } => "conditional",
            Transformation::Convert { .. } => "convert",
            Transformation::KeyLookup { .. } => "keyLookup",
        }
    }
}

/// One table's migration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableJob {
    /// Execution order; unique across the plan (duplicates warn).
    pub order: u32,
    /// Inclusion flag consulted when the run is filtered.
    pub include: bool,
    pub source: TableRef,
    pub target: TableRef,
    /// Column used to order and page the source; its latest value is the
    /// resume key.
    pub batch_column: String,
    pub mappings: Vec<SimpleMapping>,
    pub transformations: Vec<Transformation>,
    pub settings: TableSettings,
}

impl TableJob {
    /// Whether this table feeds a key map (parents of keyLookup children).
    #[must_use]
    pub fn generates_keys(&self) -> bool {
        self.settings.identity_mode == IdentityMode::Generate
    }
}

/// The complete, immutable migration plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub name: String,
    /// Rows per page; 0 disables paging (one full read per table).
    pub batch_size: usize,
    pub query_timeout_seconds: u64,
    pub source: ConnectionConfig,
    pub target: ConnectionConfig,
    /// Jobs sorted by declared order.
    pub tables: Vec<TableJob>,
    pub environment: Option<String>,
    pub default_log_level: Option<LogLevel>,
}

impl MigrationPlan {
    /// Query timeout as a duration.
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    /// Parent tables that require key remapping, in execution order.
    #[must_use]
    pub fn keymap_parents(&self) -> Vec<&TableJob> {
        self.tables.iter().filter(|t| t.generates_keys()).collect()
    }

    /// Find a job by its source identifier (`schema.table`).
    #[must_use]
    pub fn job_for_source(&self, qualified: &str) -> Option<&TableJob> {
        self.tables.iter().find(|t| t.source.qualified() == qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_round_trip() {
        for name in ["SqlServer", "AzureSql", "Oracle", "MySql", "PostgreSql"] {
            let p = Provider::parse(name).unwrap();
            assert_eq!(p.to_string(), name);
        }
        assert!(Provider::parse("Sqlite").is_none());
    }

    #[test]
    fn test_auth_matrix() {
        assert!(Provider::SqlServer.supported_auth().contains(&AuthMode::WindowsAuth));
        assert!(!Provider::AzureSql.supported_auth().contains(&AuthMode::WindowsAuth));
        assert!(Provider::AzureSql.supported_auth().contains(&AuthMode::CliDelegated));
        assert_eq!(Provider::Oracle.supported_auth(), &[AuthMode::SqlAuth]);
    }

    #[test]
    fn test_default_ports_and_schemas() {
        assert_eq!(Provider::AzureSql.default_port(), 1433);
        assert_eq!(Provider::Oracle.default_port(), 1521);
        assert_eq!(Provider::MySql.default_schema("crm", None), "crm");
        assert_eq!(Provider::Oracle.default_schema("orcl", Some("scott")), "SCOTT");
        assert_eq!(Provider::PostgreSql.default_schema("crm", None), "public");
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let conn = ConnectionConfig {
            provider: Provider::SqlServer,
            server: "localhost".into(),
            port: None,
            database: "db".into(),
            user: Some("sa".into()),
            password: Some("super_secret_123".into()),
            auth: AuthMode::SqlAuth,
        };
        let debug = format!("{:?}", conn);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret_123"));
    }

    #[test]
    fn test_transformation_columns() {
        let t = Transformation::Concat {
            parts: vec![
                ConcatPart::Column("FirstName".into()),
                ConcatPart::Literal(" ".into()),
                ConcatPart::Column("LastName".into()),
            ],
            target: "FullName".into(),
            null_default: None,
        };
        assert_eq!(t.target_columns(), vec!["FullName"]);
        assert_eq!(t.source_columns(), vec!["FirstName", "LastName"]);

        let s = Transformation::Split {
            source: "Addr".into(),
            delimiter: ", ".into(),
            targets: vec![
                SplitTarget { index: 0, column: "Street".into() },
                SplitTarget { index: 1, column: "City".into() },
            ],
        };
        assert_eq!(s.target_columns(), vec!["Street", "City"]);
    }

    #[test]
    fn test_keymap_parents_ordering() {
        let mk = |order: u32, mode: IdentityMode| TableJob {
            order,
            include: true,
            source: TableRef::new("dbo", format!("T{}", order)),
            target: TableRef::new("dbo", format!("T{}", order)),
            batch_column: "Id".into(),
            mappings: Vec::new(),
            transformations: Vec::new(),
            settings: TableSettings {
                identity_mode: mode,
                identity_column: Some("Id".into()),
                existing_data: ExistingDataAction::Append,
            },
        };
        let plan = MigrationPlan {
            name: "m".into(),
            batch_size: 100,
            query_timeout_seconds: 30,
            source: sample_conn(Provider::SqlServer),
            target: sample_conn(Provider::SqlServer),
            tables: vec![
                mk(1, IdentityMode::Generate),
                mk(2, IdentityMode::Preserve),
                mk(3, IdentityMode::Generate),
            ],
            environment: None,
            default_log_level: None,
        };
        let parents: Vec<u32> = plan.keymap_parents().iter().map(|t| t.order).collect();
        assert_eq!(parents, vec![1, 3]);
    }

    fn sample_conn(provider: Provider) -> ConnectionConfig {
        ConnectionConfig {
            provider,
            server: "localhost".into(),
            port: None,
            database: "db".into(),
            user: Some("u".into()),
            password: Some("p".into()),
            auth: AuthMode::SqlAuth,
        }
    }
}

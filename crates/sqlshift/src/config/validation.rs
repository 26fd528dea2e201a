//! Structural validation of the migration plan.

use std::collections::{HashMap, HashSet};

use crate::config::types::{MigrationPlan, Transformation};

/// Outcome of structural validation.
///
/// Errors make the plan unusable; warnings are surfaced (CLI log, validation
/// artefact) but do not stop a run.
#[derive(Debug, Default, Clone)]
pub struct StructuralReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl StructuralReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate the plan's internal consistency.
pub fn validate(plan: &MigrationPlan) -> StructuralReport {
    let mut report = StructuralReport::default();

    if plan.name.is_empty() {
        report.errors.push("migration name is required".into());
    }

    if !plan.target.provider.is_mssql_family() {
        report.errors.push(format!(
            "target provider must be SqlServer or AzureSql, got {}",
            plan.target.provider
        ));
    }

    for (what, conn) in [("source", &plan.source), ("target", &plan.target)] {
        if !conn.provider.supported_auth().contains(&conn.auth) {
            report.errors.push(format!(
                "{} connection: provider {} does not support authMode {}",
                what, conn.provider, conn.auth
            ));
        }
    }

    if plan.source.provider == plan.target.provider
        && plan.source.server == plan.target.server
        && plan.source.port() == plan.target.port()
        && plan.source.database == plan.target.database
    {
        report
            .errors
            .push("source and target cannot be the same database".into());
    }

    if plan.tables.is_empty() {
        report.errors.push("at least one table is required".into());
    }

    // Duplicate orders are a warning, not an error
    let mut seen_orders = HashSet::new();
    for job in &plan.tables {
        if !seen_orders.insert(job.order) {
            report
                .warnings
                .push(format!("duplicate table order {}", job.order));
        }
    }

    // Parent lookup for keyLookup rules: source identifier -> (order, generates)
    let parents: HashMap<String, (u32, bool)> = plan
        .tables
        .iter()
        .map(|t| (t.source.qualified(), (t.order, t.generates_keys())))
        .collect();

    for job in &plan.tables {
        let label = job.source.qualified();

        // Within one table, at most one transformation writes a target column
        let mut claimed = HashSet::new();
        for t in &job.transformations {
            for col in t.target_columns() {
                if !claimed.insert(col.to_string()) {
                    report.errors.push(format!(
                        "{}: target column '{}' written by more than one transformation",
                        label, col
                    ));
                }
            }
        }

        for t in &job.transformations {
            if let Transformation::KeyLookup { parent_table, .. } = t {
                match parents.get(parent_table) {
                    None => report.errors.push(format!(
                        "{}: keyLookup references unknown parent table '{}'",
                        label, parent_table
                    )),
                    Some((parent_order, generates)) => {
                        if *parent_order >= job.order {
                            report.errors.push(format!(
                                "{}: keyLookup parent '{}' must have a lower order (parent {} >= {})",
                                label, parent_table, parent_order, job.order
                            ));
                        }
                        if !generates {
                            report.errors.push(format!(
                                "{}: keyLookup parent '{}' must use identity mode generate",
                                label, parent_table
                            ));
                        }
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        AuthMode, ConnectionConfig, ExistingDataAction, IdentityMode, Provider, TableJob,
        TableSettings,
    };
    use crate::core::TableRef;

    fn conn(provider: Provider, server: &str) -> ConnectionConfig {
        ConnectionConfig {
            provider,
            server: server.into(),
            port: None,
            database: "db".into(),
            user: Some("u".into()),
            password: Some("p".into()),
            auth: AuthMode::SqlAuth,
        }
    }

    fn job(order: u32, source: &str, mode: IdentityMode) -> TableJob {
        TableJob {
            order,
            include: true,
            source: TableRef::parse(source, "dbo"),
            target: TableRef::parse(source, "dbo"),
            batch_column: "Id".into(),
            mappings: Vec::new(),
            transformations: Vec::new(),
            settings: TableSettings {
                identity_mode: mode,
                identity_column: Some("Id".into()),
                existing_data: ExistingDataAction::Append,
            },
        }
    }

    fn valid_plan() -> MigrationPlan {
        MigrationPlan {
            name: "m".into(),
            batch_size: 100,
            query_timeout_seconds: 30,
            source: conn(Provider::MySql, "src"),
            target: conn(Provider::SqlServer, "tgt"),
            tables: vec![job(1, "dbo.Customers", IdentityMode::Generate)],
            environment: None,
            default_log_level: None,
        }
    }

    #[test]
    fn test_valid_plan() {
        let report = validate(&valid_plan());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_target_must_be_mssql_family() {
        let mut plan = valid_plan();
        plan.target = conn(Provider::PostgreSql, "tgt");
        let report = validate(&plan);
        assert!(report.errors.iter().any(|e| e.contains("target provider")));
    }

    #[test]
    fn test_unsupported_auth_mode() {
        let mut plan = valid_plan();
        plan.source.auth = AuthMode::WindowsAuth; // MySql only does SqlAuth
        let report = validate(&plan);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("does not support authMode WindowsAuth")));
    }

    #[test]
    fn test_duplicate_orders_warn_only() {
        let mut plan = valid_plan();
        plan.tables.push(job(1, "dbo.Orders", IdentityMode::Preserve));
        let report = validate(&plan);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("duplicate table order 1")));
    }

    #[test]
    fn test_key_lookup_parent_rules() {
        let mut plan = valid_plan();
        let mut child = job(2, "dbo.Orders", IdentityMode::Preserve);
        child.transformations.push(Transformation::KeyLookup {
            source: "CustID".into(),
            target: "CustomerId".into(),
            parent_table: "dbo.Customers".into(),
            parent_key_column: "CustID".into(),
            null_default: None,
        });
        plan.tables.push(child);
        assert!(validate(&plan).is_valid());

        // Parent later than child: error
        plan.tables[0].order = 5;
        let report = validate(&plan);
        assert!(report.errors.iter().any(|e| e.contains("lower order")));

        // Parent without generate mode: error
        plan.tables[0].order = 1;
        plan.tables[0].settings.identity_mode = IdentityMode::Preserve;
        let report = validate(&plan);
        assert!(report.errors.iter().any(|e| e.contains("identity mode generate")));

        // Unknown parent: error
        plan.tables[1].transformations = vec![Transformation::KeyLookup {
            source: "CustID".into(),
            target: "CustomerId".into(),
            parent_table: "dbo.Nowhere".into(),
            parent_key_column: "CustID".into(),
            null_default: None,
        }];
        let report = validate(&plan);
        assert!(report.errors.iter().any(|e| e.contains("unknown parent")));
    }

    #[test]
    fn test_double_claimed_target_column() {
        let mut plan = valid_plan();
        plan.tables[0].transformations = vec![
            Transformation::Static {
                target: "X".into(),
                value: crate::config::types::StaticSource::Literal("a".into()),
            },
            Transformation::Simple {
                source: "s".into(),
                target: "X".into(),
                null_default: None,
            },
        ];
        let report = validate(&plan);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("written by more than one transformation")));
    }

    #[test]
    fn test_same_database_rejected() {
        let mut plan = valid_plan();
        plan.source = conn(Provider::SqlServer, "tgt");
        let report = validate(&plan);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("cannot be the same database")));
    }
}

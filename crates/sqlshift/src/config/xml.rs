//! XML configuration documents.
//!
//! Three document kinds arrive from the outside: the global config, the
//! master migration config, and per-table map files. The on-disk syntax is
//! an external contract; these structs are its serde image, and
//! [`build_plan`] turns the parsed documents into the typed
//! [`MigrationPlan`], collecting conversion errors instead of stopping at
//! the first one.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::types::{
    AuthMode, ConcatPart, ConnectionConfig, ExistingDataAction, IdentityMode, LogLevel,
    MigrationPlan, Provider, SimpleMapping, SplitTarget, StaticFunction, StaticSource, TableJob,
    TableSettings, TargetType, Transformation, ValueSpec, WhenClause,
};
use crate::core::TableRef;
use crate::error::Result;

/// `<GlobalConfig>` document.
#[derive(Debug, Deserialize)]
pub struct XmlGlobalConfig {
    #[serde(rename = "Environment")]
    pub environment: Option<String>,
    #[serde(rename = "DefaultLogLevel")]
    pub default_log_level: Option<String>,
}

/// `<Migration>` master document.
#[derive(Debug, Deserialize)]
pub struct XmlMigration {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "BatchSize")]
    pub batch_size: Option<u64>,
    #[serde(rename = "QueryTimeoutSeconds")]
    pub query_timeout_seconds: Option<u64>,
    #[serde(rename = "SourceConnection")]
    pub source: XmlConnection,
    #[serde(rename = "TargetConnection")]
    pub target: XmlConnection,
    #[serde(rename = "Tables")]
    pub tables: XmlTables,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlTables {
    #[serde(rename = "Table", default)]
    pub tables: Vec<XmlTable>,
}

#[derive(Debug, Deserialize)]
pub struct XmlConnection {
    #[serde(rename = "@provider")]
    pub provider: String,
    #[serde(rename = "@server")]
    pub server: String,
    #[serde(rename = "@port")]
    pub port: Option<u16>,
    #[serde(rename = "@database")]
    pub database: String,
    #[serde(rename = "@user")]
    pub user: Option<String>,
    #[serde(rename = "@password")]
    pub password: Option<String>,
    #[serde(rename = "@authMode")]
    pub auth_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlTable {
    #[serde(rename = "@order")]
    pub order: u32,
    #[serde(rename = "@include")]
    pub include: Option<bool>,
    #[serde(rename = "@mapFile")]
    pub map_file: Option<String>,
    #[serde(rename = "@sourceSchema")]
    pub source_schema: Option<String>,
    #[serde(rename = "@sourceTable")]
    pub source_table: String,
    #[serde(rename = "@targetSchema")]
    pub target_schema: Option<String>,
    #[serde(rename = "@targetTable")]
    pub target_table: String,
    #[serde(rename = "@batchColumn")]
    pub batch_column: String,
    #[serde(rename = "Mappings")]
    pub mappings: Option<XmlMappings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlMappings {
    #[serde(rename = "Mapping", default)]
    pub mappings: Vec<XmlMapping>,
}

#[derive(Debug, Deserialize)]
pub struct XmlMapping {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@dateFormat")]
    pub date_format: Option<String>,
}

/// `<TableMap>` document referenced from a master table entry.
#[derive(Debug, Default, Deserialize)]
pub struct XmlTableMap {
    #[serde(rename = "Settings")]
    pub settings: Option<XmlSettings>,
    #[serde(rename = "Transformations")]
    pub transformations: Option<XmlTransformations>,
}

#[derive(Debug, Deserialize)]
pub struct XmlSettings {
    #[serde(rename = "@identityMode")]
    pub identity_mode: Option<String>,
    #[serde(rename = "@identityColumn")]
    pub identity_column: Option<String>,
    #[serde(rename = "@existingDataAction")]
    pub existing_data_action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlTransformations {
    #[serde(rename = "$value", default)]
    pub items: Vec<XmlTransformation>,
}

/// One transformation element; the element name selects the variant.
#[derive(Debug, Deserialize)]
pub enum XmlTransformation {
    Simple(XmlSimple),
    Concat(XmlConcat),
    Split(XmlSplit),
    Lookup(XmlLookup),
    Calculated(XmlCalculated),
    Static(XmlStatic),
    Conditional(XmlConditional),
    Convert(XmlConvert),
    KeyLookup(XmlKeyLookup),
}

#[derive(Debug, Deserialize)]
pub struct XmlSimple {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@nullDefault")]
    pub null_default: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlConcat {
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@nullDefault")]
    pub null_default: Option<String>,
    #[serde(rename = "Part", default)]
    pub parts: Vec<XmlPart>,
}

#[derive(Debug, Deserialize)]
pub struct XmlPart {
    #[serde(rename = "@column")]
    pub column: Option<String>,
    #[serde(rename = "@literal")]
    pub literal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlSplit {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@delimiter")]
    pub delimiter: String,
    #[serde(rename = "Target", default)]
    pub targets: Vec<XmlSplitTarget>,
}

#[derive(Debug, Deserialize)]
pub struct XmlSplitTarget {
    #[serde(rename = "@index")]
    pub index: usize,
    #[serde(rename = "@column")]
    pub column: String,
}

#[derive(Debug, Deserialize)]
pub struct XmlLookup {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@default")]
    pub default: Option<String>,
    #[serde(rename = "@nullDefault")]
    pub null_default: Option<String>,
    #[serde(rename = "Entry", default)]
    pub entries: Vec<XmlLookupEntry>,
}

#[derive(Debug, Deserialize)]
pub struct XmlLookupEntry {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct XmlCalculated {
    #[serde(rename = "@expression")]
    pub expression: String,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@nullDefault")]
    pub null_default: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlStatic {
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@value")]
    pub value: Option<String>,
    #[serde(rename = "@function")]
    pub function: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlConditional {
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "When", default)]
    pub whens: Vec<XmlWhen>,
    #[serde(rename = "Else")]
    pub otherwise: Option<XmlElse>,
}

#[derive(Debug, Deserialize)]
pub struct XmlWhen {
    #[serde(rename = "@predicate")]
    pub predicate: String,
    #[serde(rename = "@value")]
    pub value: Option<String>,
    #[serde(rename = "@column")]
    pub column: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlElse {
    #[serde(rename = "@value")]
    pub value: Option<String>,
    #[serde(rename = "@column")]
    pub column: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlConvert {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@sourceFormat")]
    pub source_format: Option<String>,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@targetType")]
    pub target_type: String,
    #[serde(rename = "@nullDefault")]
    pub null_default: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct XmlKeyLookup {
    #[serde(rename = "@source")]
    pub source: String,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@parentTable")]
    pub parent_table: String,
    #[serde(rename = "@parentKeyColumn")]
    pub parent_key_column: String,
    #[serde(rename = "@nullDefault")]
    pub null_default: Option<String>,
}

/// Parse a master document.
pub fn parse_master(xml: &str) -> Result<XmlMigration> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Parse a global config document.
pub fn parse_global(xml: &str) -> Result<XmlGlobalConfig> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Parse a table-map document.
pub fn parse_table_map(xml: &str) -> Result<XmlTableMap> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Assemble the typed plan from parsed documents.
///
/// `maps` carries the table-map document for each table order that declared
/// one. Conversion problems are collected into `errors`; the plan is only
/// returned when there are none.
pub fn build_plan(
    master: XmlMigration,
    maps: HashMap<u32, XmlTableMap>,
    global: Option<XmlGlobalConfig>,
    errors: &mut Vec<String>,
) -> Option<MigrationPlan> {
    let source = convert_connection(&master.source, "sourceConnection", errors);
    let target = convert_connection(&master.target, "targetConnection", errors);

    let mut maps = maps;
    let mut tables = Vec::with_capacity(master.tables.tables.len());
    for xml_table in &master.tables.tables {
        let map = maps.remove(&xml_table.order);
        if let (Some(src), Some(tgt)) = (&source, &target) {
            if let Some(job) = convert_table(xml_table, map, src, tgt, errors) {
                tables.push(job);
            }
        }
    }
    tables.sort_by_key(|t: &TableJob| t.order);

    let (environment, default_log_level) = match global {
        Some(g) => {
            let level = match g.default_log_level.as_deref() {
                Some(s) => match LogLevel::parse(s) {
                    Some(l) => Some(l),
                    None => {
                        errors.push(format!("unknown defaultLogLevel '{}'", s));
                        None
                    }
                },
                None => None,
            };
            (g.environment, level)
        }
        None => (None, None),
    };

    if !errors.is_empty() {
        return None;
    }

    Some(MigrationPlan {
        name: master.name,
        batch_size: master.batch_size.unwrap_or(0) as usize,
        query_timeout_seconds: master.query_timeout_seconds.unwrap_or(30),
        source: source?,
        target: target?,
        tables,
        environment,
        default_log_level,
    })
}

fn convert_connection(
    xml: &XmlConnection,
    what: &str,
    errors: &mut Vec<String>,
) -> Option<ConnectionConfig> {
    let provider = match Provider::parse(&xml.provider) {
        Some(p) => p,
        None => {
            errors.push(format!("{}: unknown provider '{}'", what, xml.provider));
            return None;
        }
    };
    let auth = match xml.auth_mode.as_deref() {
        None => AuthMode::SqlAuth,
        Some(s) => match AuthMode::parse(s) {
            Some(a) => a,
            None => {
                errors.push(format!("{}: unknown authMode '{}'", what, s));
                return None;
            }
        },
    };
    if xml.server.is_empty() {
        errors.push(format!("{}: server is required", what));
        return None;
    }
    if xml.database.is_empty() {
        errors.push(format!("{}: database is required", what));
        return None;
    }
    Some(ConnectionConfig {
        provider,
        server: xml.server.clone(),
        port: xml.port,
        database: xml.database.clone(),
        user: xml.user.clone(),
        password: xml.password.clone(),
        auth,
    })
}

fn convert_table(
    xml: &XmlTable,
    map: Option<XmlTableMap>,
    source_conn: &ConnectionConfig,
    target_conn: &ConnectionConfig,
    errors: &mut Vec<String>,
) -> Option<TableJob> {
    let label = format!("table order={}", xml.order);

    if xml.source_table.is_empty() {
        errors.push(format!("{}: sourceTable is required", label));
        return None;
    }
    if xml.target_table.is_empty() {
        errors.push(format!("{}: targetTable is required", label));
        return None;
    }
    if xml.batch_column.is_empty() {
        errors.push(format!("{}: batchColumn is required", label));
        return None;
    }

    let source = match &xml.source_schema {
        Some(schema) => TableRef::new(schema.clone(), xml.source_table.clone()),
        None => TableRef::parse(&xml.source_table, &source_conn.default_schema()),
    };
    let target = match &xml.target_schema {
        Some(schema) => TableRef::new(schema.clone(), xml.target_table.clone()),
        None => TableRef::parse(&xml.target_table, &target_conn.default_schema()),
    };

    let mappings = xml
        .mappings
        .as_ref()
        .map(|m| {
            m.mappings
                .iter()
                .map(|m| SimpleMapping {
                    source: m.source.clone(),
                    target: m.target.clone(),
                    source_date_format: m.date_format.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let (settings, transformations) = match map {
        Some(map) => {
            let settings = convert_settings(map.settings.as_ref(), &label, errors);
            let transformations = map
                .transformations
                .map(|t| {
                    t.items
                        .into_iter()
                        .filter_map(|x| convert_transformation(x, &label, errors))
                        .collect()
                })
                .unwrap_or_default();
            (settings, transformations)
        }
        None => (TableSettings::default(), Vec::new()),
    };

    Some(TableJob {
        order: xml.order,
        include: xml.include.unwrap_or(true),
        source,
        target,
        batch_column: xml.batch_column.clone(),
        mappings,
        transformations,
        settings,
    })
}

fn convert_settings(
    xml: Option<&XmlSettings>,
    label: &str,
    errors: &mut Vec<String>,
) -> TableSettings {
    let Some(xml) = xml else {
        return TableSettings::default();
    };

    let identity_mode = match xml.identity_mode.as_deref() {
        None => IdentityMode::default(),
        Some("preserve") => IdentityMode::Preserve,
        Some("generate") => IdentityMode::Generate,
        Some(other) => {
            errors.push(format!("{}: unknown identityMode '{}'", label, other));
            IdentityMode::default()
        }
    };
    let existing_data = match xml.existing_data_action.as_deref() {
        None => ExistingDataAction::default(),
        Some("truncate") => ExistingDataAction::Truncate,
        Some("append") => ExistingDataAction::Append,
        Some(other) => {
            errors.push(format!("{}: unknown existingDataAction '{}'", label, other));
            ExistingDataAction::default()
        }
    };

    TableSettings {
        identity_mode,
        identity_column: xml.identity_column.clone(),
        existing_data,
    }
}

fn convert_transformation(
    xml: XmlTransformation,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<Transformation> {
    match xml {
        XmlTransformation::Simple(x) => Some(Transformation::Simple {
            source: x.source,
            target: x.target,
            null_default: x.null_default,
        }),
        XmlTransformation::Concat(x) => {
            let mut parts = Vec::with_capacity(x.parts.len());
            for part in x.parts {
                match (part.column, part.literal) {
                    (Some(c), None) => parts.push(ConcatPart::Column(c)),
                    (None, Some(l)) => parts.push(ConcatPart::Literal(l)),
                    _ => {
                        errors.push(format!(
                            "{}: concat part must set exactly one of column/literal",
                            label
                        ));
                        return None;
                    }
                }
            }
            if parts.is_empty() {
                errors.push(format!("{}: concat '{}' has no parts", label, x.target));
                return None;
            }
            Some(Transformation::Concat {
                parts,
                target: x.target,
                null_default: x.null_default,
            })
        }
        XmlTransformation::Split(x) => {
            if x.targets.is_empty() {
                errors.push(format!("{}: split '{}' has no targets", label, x.source));
                return None;
            }
            Some(Transformation::Split {
                source: x.source,
                delimiter: x.delimiter,
                targets: x
                    .targets
                    .into_iter()
                    .map(|t| SplitTarget {
                        index: t.index,
                        column: t.column,
                    })
                    .collect(),
            })
        }
        XmlTransformation::Lookup(x) => Some(Transformation::Lookup {
            source: x.source,
            target: x.target,
            table: x.entries.into_iter().map(|e| (e.key, e.value)).collect(),
            default: x.default,
            null_default: x.null_default,
        }),
        XmlTransformation::Calculated(x) => Some(Transformation::Calculated {
            expression: x.expression,
            target: x.target,
            null_default: x.null_default,
        }),
        XmlTransformation::Static(x) => {
            let value = match (x.value, x.function) {
                (Some(v), None) => StaticSource::Literal(v),
                (None, Some(f)) => match StaticFunction::parse(&f) {
                    Some(func) => StaticSource::Function(func),
                    None => {
                        errors.push(format!("{}: unknown static function '{}'", label, f));
                        return None;
                    }
                },
                _ => {
                    errors.push(format!(
                        "{}: static '{}' must set exactly one of value/function",
                        label, x.target
                    ));
                    return None;
                }
            };
            Some(Transformation::Static {
                target: x.target,
                value,
            })
        }
        XmlTransformation::Conditional(x) => {
            let mut whens = Vec::with_capacity(x.whens.len());
            for w in x.whens {
                let value = match value_spec(w.value, w.column) {
                    Some(v) => v,
                    None => {
                        errors.push(format!(
                            "{}: conditional '{}' when must set exactly one of value/column",
                            label, x.target
                        ));
                        return None;
                    }
                };
                whens.push(WhenClause {
                    predicate: w.predicate,
                    value,
                });
            }
            if whens.is_empty() {
                errors.push(format!(
                    "{}: conditional '{}' has no when branches",
                    label, x.target
                ));
                return None;
            }
            let otherwise = match x.otherwise {
                None => None,
                Some(e) => match value_spec(e.value, e.column) {
                    Some(v) => Some(v),
                    None => {
                        errors.push(format!(
                            "{}: conditional '{}' else must set exactly one of value/column",
                            label, x.target
                        ));
                        return None;
                    }
                },
            };
            Some(Transformation::Conditional {
                target: x.target,
                whens,
                otherwise,
            })
        }
        XmlTransformation::Convert(x) => {
            let target_type = match TargetType::parse(&x.target_type) {
                Some(t) => t,
                None => {
                    errors.push(format!(
                        "{}: unknown convert targetType '{}'",
                        label, x.target_type
                    ));
                    return None;
                }
            };
            Some(Transformation::Convert {
                source: x.source,
                source_format: x.source_format,
                target: x.target,
                target_type,
                null_default: x.null_default,
            })
        }
        XmlTransformation::KeyLookup(x) => Some(Transformation::KeyLookup {
            source: x.source,
            target: x.target,
            parent_table: x.parent_table,
            parent_key_column: x.parent_key_column,
            null_default: x.null_default,
        }),
    }
}

fn value_spec(value: Option<String>, column: Option<String>) -> Option<ValueSpec> {
    match (value, column) {
        (Some(v), None) => Some(ValueSpec::Literal(v)),
        (None, Some(c)) => Some(ValueSpec::Column(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = r#"
        <Migration name="CustomerMigration">
          <BatchSize>500</BatchSize>
          <QueryTimeoutSeconds>45</QueryTimeoutSeconds>
          <SourceConnection provider="PostgreSql" server="src" database="crm"
                            user="reader" password="pw"/>
          <TargetConnection provider="SqlServer" server="tgt" database="crm_new"
                            user="sa" password="pw" authMode="SqlAuth"/>
          <Tables>
            <Table order="1" include="true" sourceTable="public.customers"
                   targetTable="dbo.Customers" batchColumn="id">
              <Mappings>
                <Mapping source="id" target="LegacyId"/>
                <Mapping source="joined" target="JoinedOn" dateFormat="yyyy-MM-dd"/>
              </Mappings>
            </Table>
            <Table order="2" sourceTable="public.orders"
                   targetTable="dbo.Orders" batchColumn="order_id"/>
          </Tables>
        </Migration>"#;

    const TABLE_MAP: &str = r#"
        <TableMap>
          <Settings identityMode="generate" identityColumn="CustomerId"
                    existingDataAction="truncate"/>
          <Transformations>
            <Concat target="FullName" nullDefault="Unknown">
              <Part column="first_name"/>
              <Part literal=" "/>
              <Part column="last_name"/>
            </Concat>
            <Lookup source="status" target="StatusId" default="0">
              <Entry key="active" value="1"/>
              <Entry key="inactive" value="2"/>
            </Lookup>
            <Static target="MigratedAt" function="nowUtc"/>
            <Conditional target="Tier">
              <When predicate="spend &gt; 1000" value="gold"/>
              <Else value="standard"/>
            </Conditional>
            <Convert source="joined" target="JoinedOn" targetType="datetime2"
                     sourceFormat="yyyyMMdd"/>
            <KeyLookup source="region_id" target="RegionId"
                       parentTable="public.regions" parentKeyColumn="id"/>
          </Transformations>
        </TableMap>"#;

    #[test]
    fn test_parse_master() {
        let m = parse_master(MASTER).unwrap();
        assert_eq!(m.name, "CustomerMigration");
        assert_eq!(m.batch_size, Some(500));
        assert_eq!(m.query_timeout_seconds, Some(45));
        assert_eq!(m.tables.tables.len(), 2);
        assert_eq!(m.source.provider, "PostgreSql");
        let t1 = &m.tables.tables[0];
        assert_eq!(t1.order, 1);
        assert_eq!(t1.batch_column, "id");
        assert_eq!(t1.mappings.as_ref().unwrap().mappings.len(), 2);
    }

    #[test]
    fn test_parse_table_map_variants() {
        let map = parse_table_map(TABLE_MAP).unwrap();
        let settings = map.settings.as_ref().unwrap();
        assert_eq!(settings.identity_mode.as_deref(), Some("generate"));
        let items = &map.transformations.as_ref().unwrap().items;
        assert_eq!(items.len(), 6);
        assert!(matches!(items[0], XmlTransformation::Concat(_)));
        assert!(matches!(items[1], XmlTransformation::Lookup(_)));
        assert!(matches!(items[5], XmlTransformation::KeyLookup(_)));
    }

    #[test]
    fn test_build_plan() {
        let master = parse_master(MASTER).unwrap();
        let mut maps = HashMap::new();
        maps.insert(1, parse_table_map(TABLE_MAP).unwrap());
        let mut errors = Vec::new();
        let plan = build_plan(master, maps, None, &mut errors).unwrap();
        assert!(errors.is_empty());

        assert_eq!(plan.name, "CustomerMigration");
        assert_eq!(plan.batch_size, 500);
        assert_eq!(plan.tables.len(), 2);

        let customers = &plan.tables[0];
        assert_eq!(customers.source.qualified(), "public.customers");
        assert_eq!(customers.target.qualified(), "dbo.Customers");
        assert!(customers.generates_keys());
        assert_eq!(customers.transformations.len(), 6);

        let orders = &plan.tables[1];
        assert!(orders.transformations.is_empty());
        assert_eq!(orders.settings.identity_mode, IdentityMode::Preserve);
    }

    #[test]
    fn test_build_plan_rejects_unknown_provider() {
        let xml = MASTER.replace("PostgreSql", "Sqlite");
        let master = parse_master(&xml).unwrap();
        let mut errors = Vec::new();
        let plan = build_plan(master, HashMap::new(), None, &mut errors);
        assert!(plan.is_none());
        assert!(errors.iter().any(|e| e.contains("unknown provider 'Sqlite'")));
    }

    #[test]
    fn test_static_requires_exactly_one_source() {
        let xml = r#"
            <TableMap>
              <Transformations>
                <Static target="X" value="a" function="nowUtc"/>
              </Transformations>
            </TableMap>"#;
        let map = parse_table_map(xml).unwrap();
        let mut errors = Vec::new();
        let items = map.transformations.unwrap().items;
        let converted: Vec<_> = items
            .into_iter()
            .filter_map(|x| convert_transformation(x, "table order=1", &mut errors))
            .collect();
        assert!(converted.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_unqualified_tables_get_provider_default_schema() {
        let xml = MASTER
            .replace("public.customers", "customers")
            .replace("dbo.Customers", "Customers");
        let master = parse_master(&xml).unwrap();
        let mut errors = Vec::new();
        let plan = build_plan(master, HashMap::new(), None, &mut errors).unwrap();
        assert_eq!(plan.tables[0].source.qualified(), "public.customers");
        assert_eq!(plan.tables[0].target.qualified(), "dbo.Customers");
    }
}

//! Transform evaluator.
//!
//! A pure per-row function: `(source row, transformation program, simple
//! mappings, key maps) → target row`. Simple mappings whose target is not
//! claimed by any transformation run first, then transformations in
//! declaration order; later writes override earlier ones.
//!
//! The evaluator performs no I/O. Time, GUIDs, and the process principal
//! come in through [`ValuePorts`] so output is reproducible under test.

pub mod convert;
pub mod expr;
pub mod predicate;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{
    ConcatPart, SimpleMapping, StaticFunction, StaticSource, Transformation, ValueSpec,
};
use crate::core::{Row, Value};

/// In-memory key maps, keyed by the parent's source identifier
/// (`schema.table`), each mapping oldKey → newKey.
pub type KeyMaps = HashMap<String, HashMap<String, String>>;

/// Ambient inputs to `static` function values.
pub trait ValuePorts: Send + Sync {
    fn now_local(&self) -> NaiveDateTime;
    fn now_utc(&self) -> NaiveDateTime;
    fn new_guid(&self) -> Uuid;
    fn current_user(&self) -> String;
}

/// Production ports: wall clock, fresh v4 GUIDs, process user.
pub struct SystemPorts;

impl ValuePorts for SystemPorts {
    fn now_local(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn now_utc(&self) -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn new_guid(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn current_user(&self) -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Deterministic ports for tests: fixed instant, fixed GUID, fixed user.
#[derive(Debug, Clone)]
pub struct FixedPorts {
    pub now: NaiveDateTime,
    pub guid: Uuid,
    pub user: String,
}

impl ValuePorts for FixedPorts {
    fn now_local(&self) -> NaiveDateTime {
        self.now
    }

    fn now_utc(&self) -> NaiveDateTime {
        self.now
    }

    fn new_guid(&self) -> Uuid {
        self.guid
    }

    fn current_user(&self) -> String {
        self.user.clone()
    }
}

/// A row-level transform failure; captured to RowErrors, never fatal.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unknown source column '{0}'")]
    UnknownColumn(String),
    #[error("expression error in '{expression}': {message}")]
    Expression { expression: String, message: String },
    #[error("predicate error in '{predicate}': {message}")]
    Predicate { predicate: String, message: String },
    #[error("no key map loaded for parent table '{0}'")]
    MissingKeyMap(String),
}

/// The evaluated target row plus any row-level warnings (convert failures).
#[derive(Debug)]
pub struct EvalOutcome {
    pub row: Row,
    pub warnings: Vec<String>,
}

/// Evaluate one source row through the table's program.
pub fn evaluate(
    source: &Row,
    transformations: &[Transformation],
    mappings: &[SimpleMapping],
    keymaps: &KeyMaps,
    ports: &dyn ValuePorts,
) -> Result<EvalOutcome, TransformError> {
    let mut target = Row::new();
    let mut warnings = Vec::new();

    // Simple mappings run first, skipping targets claimed by a transformation
    let claimed: HashSet<&str> = transformations
        .iter()
        .flat_map(|t| t.target_columns())
        .collect();

    for mapping in mappings {
        if claimed.contains(mapping.target.as_str()) {
            continue;
        }
        let value = source_value(source, &mapping.source)?;
        let value = match (&mapping.source_date_format, &value) {
            (Some(format), Value::Text(text)) => {
                match convert::parse_datetime(text, Some(format)) {
                    Some(dt) => Value::DateTime(dt),
                    None => {
                        warnings.push(format!(
                            "column '{}': '{}' does not match date format '{}'",
                            mapping.source, text, format
                        ));
                        Value::Null
                    }
                }
            }
            _ => value,
        };
        target.set(mapping.target.clone(), value);
    }

    for transformation in transformations {
        apply(
            transformation,
            source,
            &mut target,
            &mut warnings,
            keymaps,
            ports,
        )?;
    }

    Ok(EvalOutcome { row: target, warnings })
}

fn apply(
    transformation: &Transformation,
    source: &Row,
    target: &mut Row,
    warnings: &mut Vec<String>,
    keymaps: &KeyMaps,
    ports: &dyn ValuePorts,
) -> Result<(), TransformError> {
    match transformation {
        Transformation::Simple {
            source: src,
            target: tgt,
            null_default,
        } => {
            let value = source_value(source, src)?;
            let value = if value.is_null() {
                null_or_default(null_default)
            } else {
                value
            };
            target.set(tgt.clone(), value);
        }

        Transformation::Concat {
            parts,
            target: tgt,
            null_default,
        } => {
            let mut out = String::new();
            let mut any_column_non_null = false;
            for part in parts {
                match part {
                    ConcatPart::Column(col) => {
                        let v = source_value(source, col)?;
                        if !v.is_null() {
                            any_column_non_null = true;
                        }
                        out.push_str(&v.display_text());
                    }
                    ConcatPart::Literal(lit) => out.push_str(lit),
                }
            }
            // Only an all-null concat that trims to nothing takes the default
            let value = if !any_column_non_null && out.trim().is_empty() {
                null_or_default(null_default)
            } else {
                Value::Text(out)
            };
            target.set(tgt.clone(), value);
        }

        Transformation::Split {
            source: src,
            delimiter,
            targets,
        } => {
            let value = source_value(source, src)?;
            match value.to_text() {
                None => {
                    for t in targets {
                        target.set(t.column.clone(), Value::Null);
                    }
                }
                Some(text) => {
                    let fragments: Vec<&str> = text.split(delimiter.as_str()).collect();
                    for t in targets {
                        let value = fragments
                            .get(t.index)
                            .map(|f| Value::Text(f.trim().to_string()))
                            .unwrap_or(Value::Null);
                        target.set(t.column.clone(), value);
                    }
                }
            }
        }

        Transformation::Lookup {
            source: src,
            target: tgt,
            table,
            default,
            null_default,
        } => {
            let value = source_value(source, src)?;
            let out = match value.to_text() {
                None => null_or_default(null_default),
                Some(key) => match table.get(&key) {
                    Some(mapped) => Value::Text(mapped.clone()),
                    None => default
                        .as_ref()
                        .map(|d| Value::Text(d.clone()))
                        .unwrap_or(Value::Null),
                },
            };
            target.set(tgt.clone(), out);
        }

        Transformation::Calculated {
            expression,
            target: tgt,
            null_default,
        } => {
            let parsed = expr::parse(expression).map_err(|message| TransformError::Expression {
                expression: expression.clone(),
                message,
            })?;
            let value =
                expr::evaluate(&parsed, source).map_err(|message| TransformError::Expression {
                    expression: expression.clone(),
                    message,
                })?;
            let value = if value.is_null() {
                null_or_default(null_default)
            } else {
                value
            };
            target.set(tgt.clone(), value);
        }

        Transformation::Static { target: tgt, value } => {
            let out = match value {
                StaticSource::Literal(lit) => Value::Text(lit.clone()),
                StaticSource::Function(func) => match func {
                    StaticFunction::NowLocal => Value::DateTime(ports.now_local()),
                    StaticFunction::NowUtc => Value::DateTime(ports.now_utc()),
                    StaticFunction::NewGuid => Value::Text(ports.new_guid().to_string()),
                    StaticFunction::CurrentUser => Value::Text(ports.current_user()),
                },
            };
            target.set(tgt.clone(), out);
        }

        Transformation::Conditional {
            target: tgt,
            whens,
            otherwise,
        } => {
            let mut out = None;
            for when in whens {
                let parsed =
                    predicate::parse(&when.predicate).map_err(|message| TransformError::Predicate {
                        predicate: when.predicate.clone(),
                        message,
                    })?;
                let matched = predicate::evaluate(&parsed, source).map_err(|message| {
                    TransformError::Predicate {
                        predicate: when.predicate.clone(),
                        message,
                    }
                })?;
                if matched {
                    out = Some(value_spec(&when.value, source)?);
                    break;
                }
            }
            let value = match out {
                Some(v) => v,
                None => match otherwise {
                    Some(spec) => value_spec(spec, source)?,
                    None => Value::Null,
                },
            };
            target.set(tgt.clone(), value);
        }

        Transformation::Convert {
            source: src,
            source_format,
            target: tgt,
            target_type,
            null_default,
        } => {
            let value = source_value(source, src)?;
            let out = if value.is_null() {
                null_or_default(null_default)
            } else {
                match convert::convert_value(&value, *target_type, source_format.as_deref()) {
                    Ok(converted) => converted,
                    Err(message) => {
                        warnings.push(format!("column '{}': {}", src, message));
                        null_or_default(null_default)
                    }
                }
            };
            target.set(tgt.clone(), out);
        }

        Transformation::KeyLookup {
            source: src,
            target: tgt,
            parent_table,
            parent_key_column: _,
            null_default,
        } => {
            let value = source_value(source, src)?;
            let out = match value.to_text() {
                None => null_or_default(null_default),
                Some(old_key) => {
                    let map = keymaps
                        .get(parent_table)
                        .ok_or_else(|| TransformError::MissingKeyMap(parent_table.clone()))?;
                    match map.get(&old_key) {
                        Some(new_key) => Value::Text(new_key.clone()),
                        None => null_or_default(null_default),
                    }
                }
            };
            target.set(tgt.clone(), out);
        }
    }

    Ok(())
}

fn source_value(source: &Row, column: &str) -> Result<Value, TransformError> {
    source
        .get(column)
        .cloned()
        .ok_or_else(|| TransformError::UnknownColumn(column.to_string()))
}

fn null_or_default(null_default: &Option<String>) -> Value {
    null_default
        .as_ref()
        .map(|d| Value::Text(d.clone()))
        .unwrap_or(Value::Null)
}

fn value_spec(spec: &ValueSpec, source: &Row) -> Result<Value, TransformError> {
    match spec {
        ValueSpec::Literal(lit) => Ok(Value::Text(lit.clone())),
        ValueSpec::Column(col) => source_value(source, col),
    }
}

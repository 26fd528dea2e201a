//! Key-map store: persistent oldKey → newKey tables on the target.
//!
//! Each parent table migrated with identity mode = generate owns one map
//! table, named from its source identifier under a fixed prefix. The maps
//! are the engine's only persistent footprint outside the data tables; they
//! are dropped at run start (stale leftovers) and unconditionally at run
//! end.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::core::{escape_literal, quote_bracket, TableRef};
use crate::drivers::TargetWriter;
use crate::error::Result;

/// Prefix for every key-map table the engine owns.
pub const KEYMAP_PREFIX: &str = "sqlshift_keymap_";

/// Schema key-map tables live in.
pub const KEYMAP_SCHEMA: &str = "dbo";

/// Keys are user data of unknown length; 450 keeps the primary key inside
/// MSSQL's index key size limit.
const KEY_LENGTH: usize = 450;

/// Rows per INSERT statement when persisting mappings.
const INSERT_CHUNK: usize = 1000;

/// The key-map table for a parent's source identifier
/// (`dbo.Customers` → `dbo.sqlshift_keymap_dbo_Customers`).
#[must_use]
pub fn table_for(parent: &TableRef) -> TableRef {
    TableRef::new(KEYMAP_SCHEMA, parent.keymap_name(KEYMAP_PREFIX))
}

/// DDL for a parent's key-map table: primary key on old_key, secondary
/// index on new_key.
#[must_use]
pub fn create_sql(parent: &TableRef) -> Vec<String> {
    let map = table_for(parent);
    let qualified = format!(
        "{}.{}",
        quote_bracket(&map.schema),
        quote_bracket(&map.table)
    );
    vec![
        format!(
            "CREATE TABLE {} (old_key NVARCHAR({}) NOT NULL PRIMARY KEY, new_key NVARCHAR({}) NOT NULL)",
            qualified, KEY_LENGTH, KEY_LENGTH
        ),
        format!(
            "CREATE INDEX {} ON {} (new_key)",
            quote_bracket(&format!("IX_{}_new_key", map.table)),
            qualified
        ),
    ]
}

/// INSERT statements for a set of mappings, chunked and escaped.
///
/// Keys are user data; every value is quote-doubled before interpolation.
#[must_use]
pub fn insert_sql(parent: &TableRef, pairs: &[(String, String)]) -> Vec<String> {
    let map = table_for(parent);
    let qualified = format!(
        "{}.{}",
        quote_bracket(&map.schema),
        quote_bracket(&map.table)
    );
    pairs
        .chunks(INSERT_CHUNK)
        .map(|chunk| {
            let values = chunk
                .iter()
                .map(|(old, new)| {
                    format!("('{}', '{}')", escape_literal(old), escape_literal(new))
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {} (old_key, new_key) VALUES {}",
                qualified, values
            )
        })
        .collect()
}

/// Create a parent's key-map table, replacing any stale leftover.
pub async fn create(target: &mut TargetWriter, parent: &TableRef) -> Result<()> {
    let map = table_for(parent);
    target.drop_table(&map).await?;
    for sql in create_sql(parent) {
        target.exec_non_query(&sql).await?;
    }
    debug!("created key-map table {}", map.qualified());
    Ok(())
}

/// Persist a page's worth of mappings.
pub async fn append(
    target: &mut TargetWriter,
    parent: &TableRef,
    pairs: &[(String, String)],
) -> Result<()> {
    if pairs.is_empty() {
        return Ok(());
    }
    for sql in insert_sql(parent, pairs) {
        target.exec_non_query(&sql).await?;
    }
    Ok(())
}

/// Load a parent's complete map into memory for descendant tables.
pub async fn load_all(
    target: &mut TargetWriter,
    parent: &TableRef,
) -> Result<HashMap<String, String>> {
    let map = table_for(parent);
    let sql = format!(
        "SELECT old_key, new_key FROM {}.{}",
        quote_bracket(&map.schema),
        quote_bracket(&map.table)
    );
    let pairs = target.query_pairs(&sql).await?;
    debug!("loaded {} key mappings from {}", pairs.len(), map.qualified());
    Ok(pairs.into_iter().collect())
}

/// Drop every key-map table on the target, whatever run created it.
pub async fn drop_all(target: &mut TargetWriter) -> Result<()> {
    let sql = format!(
        "SELECT name FROM sys.tables WHERE name LIKE '{}%'",
        KEYMAP_PREFIX
    );
    let names = target.query_single_column(&sql).await?;
    let count = names.len();
    for name in names {
        target.drop_table(&TableRef::new(KEYMAP_SCHEMA, name)).await?;
    }
    if count > 0 {
        info!("dropped {} key-map table(s)", count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_naming_replaces_dots() {
        let parent = TableRef::new("dbo", "Customers");
        let map = table_for(&parent);
        assert_eq!(map.schema, "dbo");
        assert_eq!(map.table, "sqlshift_keymap_dbo_Customers");
    }

    #[test]
    fn test_create_sql_shape() {
        let sql = create_sql(&TableRef::new("public", "regions"));
        assert_eq!(sql.len(), 2);
        assert!(sql[0].contains("CREATE TABLE [dbo].[sqlshift_keymap_public_regions]"));
        assert!(sql[0].contains("old_key NVARCHAR(450) NOT NULL PRIMARY KEY"));
        assert!(sql[1].starts_with("CREATE INDEX [IX_sqlshift_keymap_public_regions_new_key]"));
    }

    #[test]
    fn test_insert_sql_escapes_quotes() {
        let pairs = vec![("O'Brien".to_string(), "10".to_string())];
        let sql = insert_sql(&TableRef::new("dbo", "Customers"), &pairs);
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("('O''Brien', '10')"));
    }

    #[test]
    fn test_insert_sql_chunks_at_1000() {
        let pairs: Vec<(String, String)> =
            (0..2500).map(|i| (i.to_string(), (i + 1).to_string())).collect();
        let sql = insert_sql(&TableRef::new("dbo", "Customers"), &pairs);
        assert_eq!(sql.len(), 3);
        assert_eq!(sql[0].matches("(").count(), 1001); // 1000 value groups + column list
    }

    #[test]
    fn test_mapping_is_partial_function() {
        // oldKey unique: later inserts for the same key would violate the PK;
        // in-memory the last write wins, which load_all mirrors via HashMap
        let pairs = vec![
            ("100".to_string(), "5001".to_string()),
            ("101".to_string(), "5002".to_string()),
        ];
        let map: HashMap<String, String> = pairs.into_iter().collect();
        assert_eq!(map.get("100"), Some(&"5001".to_string()));
        assert_eq!(map.len(), 2);
    }
}

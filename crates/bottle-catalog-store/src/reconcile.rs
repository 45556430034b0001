//! Child-collection reconciliation.
//!
//! When a projection is saved over an existing row, each child collection is
//! diffed against what is stored: rows whose identity (position, or key) is
//! still present are updated in place, new identities are inserted, and the
//! leftovers are deleted.

use std::collections::HashMap;
use std::hash::Hash;

use rusqlite::types::{FromSql, Value};
use rusqlite::{params, params_from_iter, Connection};

use bottle_catalog_core::RowId;

use crate::error::Result;

/// A child table hanging off a parent row.
pub(crate) struct ChildTable {
    pub table: &'static str,
    pub parent: &'static str,
    /// Data columns, in the order row values are supplied.
    pub columns: &'static [&'static str],
}

/// What a reconciliation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reconciled {
    pub updated: usize,
    pub inserted: usize,
    pub deleted: usize,
}

/// Reconcile rows identified by their position in the payload.
pub(crate) fn reconcile_by_index(
    conn: &Connection,
    child: &ChildTable,
    parent_id: RowId,
    rows: Vec<Vec<Value>>,
) -> Result<Reconciled> {
    let mut existing: HashMap<i64, RowId> = load_identities(conn, child, "location", parent_id)?;
    let update = update_sql(child);
    let insert = format!(
        "INSERT INTO {} ({}, location, {}) VALUES ({})",
        child.table,
        child.parent,
        child.columns.join(", "),
        placeholders(child.columns.len() + 2)
    );

    let mut stats = Reconciled::default();
    for (location, values) in rows.into_iter().enumerate() {
        let location = location as i64;
        match existing.remove(&location) {
            Some(id) => {
                conn.execute(&update, params_from_iter(with_trailing_id(values, id)))?;
                stats.updated += 1;
            }
            None => {
                let mut params = vec![Value::Integer(parent_id), Value::Integer(location)];
                params.extend(values);
                conn.execute(&insert, params_from_iter(params))?;
                stats.inserted += 1;
            }
        }
    }
    stats.deleted = delete_rows(conn, child, existing.into_values())?;
    Ok(stats)
}

/// Reconcile rows identified by a key. The key is the first column.
pub(crate) fn reconcile_by_key(
    conn: &Connection,
    child: &ChildTable,
    parent_id: RowId,
    rows: Vec<(String, Vec<Value>)>,
) -> Result<Reconciled> {
    let key_column = child.columns[0];
    let mut existing: HashMap<String, RowId> = load_identities(conn, child, key_column, parent_id)?;
    let update = update_sql(child);
    let insert = format!(
        "INSERT INTO {} ({}, {}) VALUES ({})",
        child.table,
        child.parent,
        child.columns.join(", "),
        placeholders(child.columns.len() + 1)
    );

    let mut stats = Reconciled::default();
    for (key, values) in rows {
        match existing.remove(&key) {
            Some(id) => {
                conn.execute(&update, params_from_iter(with_trailing_id(values, id)))?;
                stats.updated += 1;
            }
            None => {
                let mut params = vec![Value::Integer(parent_id)];
                params.extend(values);
                conn.execute(&insert, params_from_iter(params))?;
                stats.inserted += 1;
            }
        }
    }
    stats.deleted = delete_rows(conn, child, existing.into_values())?;
    Ok(stats)
}

fn load_identities<K: FromSql + Eq + Hash>(
    conn: &Connection,
    child: &ChildTable,
    identity: &str,
    parent_id: RowId,
) -> Result<HashMap<K, RowId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {identity}, id FROM {} WHERE {} = ?1",
        child.table, child.parent
    ))?;
    let map = stmt
        .query_map(params![parent_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(map)
}

fn delete_rows(
    conn: &Connection,
    child: &ChildTable,
    ids: impl Iterator<Item = RowId>,
) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", child.table);
    let mut deleted = 0;
    for id in ids {
        deleted += conn.execute(&sql, params![id])?;
    }
    Ok(deleted)
}

fn update_sql(child: &ChildTable) -> String {
    let assignments: Vec<String> = child
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        child.table,
        assignments.join(", "),
        child.columns.len() + 1
    )
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

fn with_trailing_id(mut values: Vec<Value>, id: RowId) -> Vec<Value> {
    values.push(Value::Integer(id));
    values
}

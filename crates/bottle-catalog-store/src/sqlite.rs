//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for the catalog. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use bottle_catalog_core::{
    format_timestamp, Digest, ListEntry, Location, ObjectKind, Projection, RowId,
    SignatureValid, SignatureValidationSummary,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::reconcile::{reconcile_by_index, reconcile_by_key, ChildTable};
use crate::traits::{
    BottleRef, ManifestRef, ObjectRow, ObjectView, Store, StoreStats, StoredObject, Upserted,
};

const SOURCES: ChildTable = ChildTable {
    table: "bottle_sources",
    parent: "bottle_id",
    columns: &["name", "uri", "bottle_digest", "part_selectors"],
};
const AUTHORS: ChildTable = ChildTable {
    table: "bottle_authors",
    parent: "bottle_id",
    columns: &["name", "url", "email"],
};
const METRICS: ChildTable = ChildTable {
    table: "bottle_metrics",
    parent: "bottle_id",
    columns: &["name", "description", "value"],
};
const PUBLIC_ARTIFACTS: ChildTable = ChildTable {
    table: "bottle_public_artifacts",
    parent: "bottle_id",
    columns: &["name", "media_type", "path", "digest", "content_id"],
};
const LABELS: ChildTable = ChildTable {
    table: "bottle_labels",
    parent: "bottle_id",
    columns: &["key", "value", "numeric_value"],
};
const ANNOTATIONS: ChildTable = ChildTable {
    table: "bottle_annotations",
    parent: "bottle_id",
    columns: &["key", "value"],
};
const DEPRECATES: ChildTable = ChildTable {
    table: "bottle_deprecates",
    parent: "bottle_id",
    columns: &["deprecated_digest"],
};
const PARTS: ChildTable = ChildTable {
    table: "bottle_parts",
    parent: "bottle_id",
    columns: &["name", "size", "digest", "labels"],
};
const LAYERS: ChildTable = ChildTable {
    table: "manifest_layers",
    parent: "manifest_id",
    columns: &["digest"],
};
const SIGNATURE_DETAILS: ChildTable = ChildTable {
    table: "signature_details",
    parent: "signature_id",
    columns: &[
        "signature_type",
        "signature",
        "public_key",
        "fingerprint",
        "valid",
        "annotations",
    ],
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Creation time for a new row of `table`: now, or just after the newest row
/// if the clock has not moved past it.
fn next_created_at(conn: &Connection, table: &str) -> Result<i64> {
    let last: Option<i64> = conn.query_row(
        &format!("SELECT MAX(created_at) FROM {table}"),
        [],
        |row| row.get(0),
    )?;
    let now = now_nanos();
    Ok(match last {
        Some(last) if last >= now => last + 1,
        _ => now,
    })
}

fn parse_digest(s: &str) -> Result<Digest> {
    Digest::parse(s).map_err(|e| StoreError::InvalidData(format!("stored digest {s:?}: {e}")))
}

fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

fn real(v: f64) -> Value {
    if v.is_nan() {
        Value::Null
    } else {
        Value::Real(v)
    }
}

fn integer(v: u64) -> Value {
    Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
}

fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectRow> {
    Ok(ObjectRow {
        id: row.get(0)?,
        content_id: row.get(1)?,
        processor_version: row.get(2)?,
    })
}

/// Write the kind-specific columns and child collections of a projection.
fn write_projection(tx: &Transaction<'_>, id: RowId, projection: &Projection) -> Result<()> {
    match projection {
        Projection::Blob => {}
        Projection::Bottle(b) => {
            tx.execute(
                "UPDATE bottles SET api_version = ?1, description = ?2 WHERE id = ?3",
                params![b.api_version, b.description, id],
            )?;

            let mut sources = Vec::with_capacity(b.sources.len());
            for s in &b.sources {
                sources.push(vec![
                    text(&s.name),
                    text(&s.uri),
                    s.bottle_digest.as_ref().map_or(Value::Null, |d| text(d.to_string())),
                    text(serde_json::to_string(&s.part_selectors)?),
                ]);
            }
            reconcile_by_index(tx, &SOURCES, id, sources)?;

            let authors = b
                .authors
                .iter()
                .map(|a| vec![text(&a.name), text(&a.url), text(&a.email)])
                .collect();
            reconcile_by_index(tx, &AUTHORS, id, authors)?;

            let metrics = b
                .metrics
                .iter()
                .map(|m| vec![text(&m.name), text(&m.description), real(m.value)])
                .collect();
            reconcile_by_index(tx, &METRICS, id, metrics)?;

            let artifacts = b
                .public_artifacts
                .iter()
                .map(|a| {
                    vec![
                        text(&a.name),
                        text(&a.media_type),
                        text(&a.path),
                        text(a.digest.to_string()),
                        Value::Integer(a.content_id),
                    ]
                })
                .collect();
            reconcile_by_index(tx, &PUBLIC_ARTIFACTS, id, artifacts)?;

            let labels = b
                .labels
                .iter()
                .map(|l| {
                    (
                        l.key.clone(),
                        vec![text(&l.key), text(&l.value), real(l.numeric_value)],
                    )
                })
                .collect();
            reconcile_by_key(tx, &LABELS, id, labels)?;

            let annotations = b
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), vec![text(k), text(v)]))
                .collect();
            reconcile_by_key(tx, &ANNOTATIONS, id, annotations)?;

            let deprecates = b
                .deprecates
                .iter()
                .map(|d| vec![text(d.to_string())])
                .collect();
            reconcile_by_index(tx, &DEPRECATES, id, deprecates)?;

            let mut parts = Vec::with_capacity(b.parts.len());
            for p in &b.parts {
                parts.push(vec![
                    text(&p.name),
                    integer(p.size),
                    text(p.digest.to_string()),
                    text(serde_json::to_string(&p.labels)?),
                ]);
            }
            reconcile_by_index(tx, &PARTS, id, parts)?;
        }
        Projection::Manifest(m) => {
            tx.execute(
                "UPDATE manifests SET bottle_id = ?1, bottle_digest = ?2, media_type = ?3 WHERE id = ?4",
                params![m.bottle_id, m.bottle_digest.to_string(), m.media_type, id],
            )?;
            let layers = m.layers.iter().map(|d| vec![text(d.to_string())]).collect();
            reconcile_by_index(tx, &LAYERS, id, layers)?;
        }
        Projection::Event(e) => {
            tx.execute(
                "UPDATE events SET manifest_id = ?1, manifest_digest = ?2, bottle_id = ?3,
                    bottle_digest = ?4, action = ?5, repository = ?6, tag = ?7,
                    auth_required = ?8, bandwidth = ?9, timestamp = ?10, username = ?11
                 WHERE id = ?12",
                params![
                    e.manifest_id,
                    e.manifest_digest.to_string(),
                    e.bottle_id,
                    e.bottle_digest.to_string(),
                    e.action,
                    e.repository,
                    e.tag,
                    e.auth_required,
                    i64::try_from(e.bandwidth).unwrap_or(i64::MAX),
                    format_timestamp(&e.timestamp),
                    e.username,
                    id,
                ],
            )?;
        }
        Projection::Signature(s) => {
            tx.execute(
                "UPDATE signatures SET manifest_id = ?1, manifest_digest = ?2, bottle_id = ?3,
                    bottle_digest = ?4
                 WHERE id = ?5",
                params![
                    s.manifest_id,
                    s.manifest_digest.to_string(),
                    s.bottle_id,
                    s.bottle_digest.to_string(),
                    id,
                ],
            )?;
            let mut details = Vec::with_capacity(s.details.len());
            for d in &s.details {
                details.push(vec![
                    text(&d.signature_type),
                    Value::Blob(d.signature.clone()),
                    text(&d.public_key),
                    text(&d.fingerprint),
                    Value::Integer(i64::from(d.valid)),
                    text(serde_json::to_string(&d.annotations)?),
                ]);
            }
            reconcile_by_index(tx, &SIGNATURE_DETAILS, id, details)?;
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectView for SqliteStore {
    async fn content_for_alias(&self, digest: &Digest) -> Result<Option<RowId>> {
        let digest = digest.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT content_id FROM digests WHERE digest = ?1",
                params![digest],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_bottle(&self, digest: &Digest) -> Result<Option<BottleRef>> {
        let digest = digest.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT b.id, (SELECT COUNT(*) FROM bottle_parts p WHERE p.bottle_id = b.id)
                 FROM digests d JOIN bottles b ON b.content_id = d.content_id
                 WHERE d.digest = ?1",
                params![digest],
                |row| {
                    Ok(BottleRef {
                        id: row.get(0)?,
                        parts: row.get::<_, i64>(1)? as usize,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_manifest(&self, digest: &Digest) -> Result<Option<ManifestRef>> {
        let digest = digest.to_string();
        self.blocking(move |conn| {
            let row: Option<(RowId, Option<RowId>, String)> = conn
                .query_row(
                    "SELECT m.id, m.bottle_id, m.bottle_digest
                     FROM digests d JOIN manifests m ON m.content_id = d.content_id
                     WHERE d.digest = ?1",
                    params![digest],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            match row {
                None => Ok(None),
                Some((id, Some(bottle_id), bottle_digest)) => Ok(Some(ManifestRef {
                    id,
                    bottle_id,
                    bottle_digest: parse_digest(&bottle_digest)?,
                })),
                Some((id, None, _)) => Err(StoreError::InvalidData(format!(
                    "manifest {id} has no bottle"
                ))),
            }
        })
        .await
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_content(&self, canonical: &Digest, bytes: &[u8]) -> Result<Upserted> {
        let canonical = canonical.to_string();
        let bytes = bytes.to_vec();
        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO contents (canonical_digest, raw_bytes, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(canonical_digest) DO NOTHING",
                params![canonical, bytes, now_nanos()],
            )?;
            let id: RowId = conn.query_row(
                "SELECT id FROM contents WHERE canonical_digest = ?1",
                params![canonical],
                |row| row.get(0),
            )?;
            Ok(if inserted == 1 {
                Upserted::Inserted(id)
            } else {
                Upserted::Existing(id)
            })
        })
        .await
    }

    async fn upsert_alias(&self, content_id: RowId, alias: &Digest) -> Result<Upserted> {
        let algorithm = alias.algorithm().to_string();
        let alias = alias.to_string();
        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO digests (content_id, digest, algorithm) VALUES (?1, ?2, ?3)
                 ON CONFLICT(digest) DO NOTHING",
                params![content_id, alias, algorithm],
            )?;
            let (id, existing): (RowId, RowId) = conn.query_row(
                "SELECT id, content_id FROM digests WHERE digest = ?1",
                params![alias],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if existing != content_id {
                return Err(StoreError::IntegrityViolation {
                    alias,
                    existing,
                    new: content_id,
                });
            }
            Ok(if inserted == 1 {
                Upserted::Inserted(id)
            } else {
                Upserted::Existing(id)
            })
        })
        .await
    }

    async fn content_bytes(&self, content_id: RowId) -> Result<Option<Vec<u8>>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT raw_bytes FROM contents WHERE id = ?1",
                params![content_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.blocking(|conn| {
            conn.query_row(
                "SELECT (SELECT COUNT(*) FROM contents), (SELECT COUNT(*) FROM digests)",
                [],
                |row| {
                    Ok(StoreStats {
                        contents: row.get::<_, i64>(0)? as u64,
                        aliases: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_object(&self, kind: ObjectKind, content_id: RowId) -> Result<Option<ObjectRow>> {
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT id, content_id, processor_version FROM {} WHERE content_id = ?1",
                    kind.table()
                ),
                params![content_id],
                row_to_object,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn save_projection(
        &self,
        content_id: RowId,
        version: u32,
        projection: &Projection,
    ) -> Result<RowId> {
        let projection = projection.clone();
        let kind = projection.kind();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let table = kind.table();
            let now = now_nanos();

            tx.execute(
                &format!(
                    "INSERT INTO {table} (content_id, processor_version, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(content_id) DO NOTHING"
                ),
                params![content_id, version, next_created_at(&tx, table)?, now],
            )?;
            let id: RowId = tx.query_row(
                &format!("SELECT id FROM {table} WHERE content_id = ?1"),
                params![content_id],
                |row| row.get(0),
            )?;
            tx.execute(
                &format!(
                    "UPDATE {table} SET processor_version = MAX(processor_version, ?1), updated_at = ?2
                     WHERE id = ?3"
                ),
                params![version, now, id],
            )?;

            write_projection(&tx, id, &projection)?;
            tx.commit()?;

            tracing::debug!(%kind, id, content_id, version, "saved projection");
            Ok(id)
        })
        .await
    }

    async fn next_stale(
        &self,
        kind: ObjectKind,
        version: u32,
        after_id: RowId,
    ) -> Result<Option<ObjectRow>> {
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT id, content_id, processor_version FROM {}
                     WHERE processor_version < ?1 AND id > ?2
                     ORDER BY id LIMIT 1",
                    kind.table()
                ),
                params![version, after_id],
                row_to_object,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_by_digest(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<StoredObject>> {
        let digest = digest.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT c.id, c.raw_bytes, o.created_at
                     FROM digests d
                     JOIN {} o ON o.content_id = d.content_id
                     JOIN contents c ON c.id = d.content_id
                     WHERE d.digest = ?1",
                    kind.table()
                ),
                params![digest],
                |row| {
                    Ok(StoredObject {
                        content_id: row.get(0)?,
                        bytes: row.get(1)?,
                        created_at: from_nanos(row.get(2)?),
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_since(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>> {
        let since = match since {
            None => i64::MIN,
            Some(ts) => match ts.timestamp_nanos_opt() {
                Some(nanos) => nanos,
                // Past the representable range nothing can be newer.
                None if ts.timestamp() > 0 => return Ok(Vec::new()),
                None => i64::MIN,
            },
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT o.created_at, c.raw_bytes, GROUP_CONCAT(d.digest, ',')
                 FROM {} o
                 JOIN contents c ON c.id = o.content_id
                 LEFT JOIN digests d ON d.content_id = o.content_id
                 WHERE o.created_at > ?1
                 GROUP BY o.id
                 ORDER BY o.created_at ASC
                 LIMIT ?2",
                kind.table()
            ))?;
            let rows = stmt
                .query_map(params![since, limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut entries = Vec::with_capacity(rows.len());
            for (created_at, data, digests) in rows {
                let mut digests = digests
                    .as_deref()
                    .unwrap_or_default()
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(parse_digest)
                    .collect::<Result<Vec<_>>>()?;
                digests.sort();
                entries.push(ListEntry {
                    created_at: from_nanos(created_at),
                    digests,
                    data,
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn signatures_for_bottle(&self, bottle: &Digest) -> Result<Vec<SignatureValidationSummary>> {
        let bottle = bottle.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.manifest_digest, s.bottle_digest, sd.valid, sd.fingerprint, sd.annotations
                 FROM digests d
                 JOIN bottles b ON b.content_id = d.content_id
                 JOIN signatures s ON s.bottle_id = b.id
                 JOIN signature_details sd ON sd.signature_id = s.id
                 WHERE d.digest = ?1
                 ORDER BY s.id, sd.location",
            )?;
            let rows = stmt
                .query_map(params![bottle], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(manifest, bottle, valid, fingerprint, annotations)| {
                    Ok(SignatureValidationSummary {
                        subject_manifest: parse_digest(&manifest)?,
                        subject_bottle: parse_digest(&bottle)?,
                        valid,
                        fingerprint,
                        annotations: serde_json::from_str(&annotations)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn bottle_labels(&self, bottle: &Digest) -> Result<BTreeMap<String, String>> {
        let bottle = bottle.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT l.key, l.value
                 FROM digests d
                 JOIN bottles b ON b.content_id = d.content_id
                 JOIN bottle_labels l ON l.bottle_id = b.id
                 WHERE d.digest = ?1",
            )?;
            let labels = stmt
                .query_map(params![bottle], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
            Ok(labels)
        })
        .await
    }

    async fn deprecated_by(&self, bottle: &Digest) -> Result<Vec<Digest>> {
        let bottle = bottle.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT d.digest
                 FROM bottle_deprecates dep
                 JOIN bottles b ON b.id = dep.bottle_id
                 JOIN digests d ON d.content_id = b.content_id
                 WHERE dep.deprecated_digest = ?1
                 ORDER BY d.digest",
            )?;
            let digests = stmt
                .query_map(params![bottle], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            digests.iter().map(|d| parse_digest(d)).collect()
        })
        .await
    }

    async fn locations_for_bottle(&self, bottle: &Digest) -> Result<Vec<Location>> {
        let bottle = bottle.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT e.repository, e.auth_required, e.manifest_digest
                 FROM digests d
                 JOIN bottles b ON b.content_id = d.content_id
                 JOIN events e ON e.bottle_id = b.id
                 WHERE d.digest = ?1
                 ORDER BY e.repository, e.manifest_digest, e.auth_required",
            )?;
            let rows = stmt
                .query_map(params![bottle], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(repository, auth_required, manifest)| {
                    Ok(Location {
                        repository,
                        auth_required,
                        digest: parse_digest(&manifest)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn signatures_by_key(
        &self,
        bottle: &Digest,
        fingerprint: &Digest,
    ) -> Result<Vec<SignatureValid>> {
        let bottle = bottle.to_string();
        let fingerprint = fingerprint.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.bottle_digest, sd.fingerprint, sd.valid
                 FROM digests d
                 JOIN bottles b ON b.content_id = d.content_id
                 JOIN signatures s ON s.bottle_id = b.id
                 JOIN signature_details sd ON sd.signature_id = s.id
                 WHERE d.digest = ?1 AND sd.fingerprint = ?2
                 ORDER BY s.id, sd.location",
            )?;
            let rows = stmt
                .query_map(params![bottle, fingerprint], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(bottle, key_fingerprint, validated)| {
                    Ok(SignatureValid {
                        subject_bottle: parse_digest(&bottle)?,
                        key_fingerprint,
                        validated,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_catalog_core::{
        Algorithm, BottleProjection, EventProjection, LabelRow, ManifestProjection, PartRow,
        SignatureProjection, SignatureRow,
    };

    async fn content(store: &SqliteStore, bytes: &[u8]) -> RowId {
        let id = store
            .upsert_content(&Digest::canonical(bytes), bytes)
            .await
            .unwrap()
            .id();
        store
            .upsert_alias(id, &Digest::compute(Algorithm::Sha256, bytes))
            .await
            .unwrap();
        id
    }

    fn label(key: &str, value: &str) -> LabelRow {
        LabelRow {
            key: key.to_string(),
            value: value.to_string(),
            numeric_value: value.parse().unwrap_or(f64::NAN),
        }
    }

    fn part(name: &str) -> PartRow {
        PartRow {
            name: name.to_string(),
            size: 10,
            digest: Digest::compute(Algorithm::Sha256, name.as_bytes()),
            labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_content_dedup() {
        let store = SqliteStore::open_memory().unwrap();
        let canonical = Digest::canonical(b"same bytes");
        let first = store.upsert_content(&canonical, b"same bytes").await.unwrap();
        let second = store.upsert_content(&canonical, b"same bytes").await.unwrap();
        assert!(first.is_inserted());
        assert_eq!(second, Upserted::Existing(first.id()));
        assert_eq!(store.stats().await.unwrap().contents, 1);
    }

    #[tokio::test]
    async fn test_alias_idempotent_and_integrity() {
        let store = SqliteStore::open_memory().unwrap();
        let a = content(&store, b"a").await;
        let b = content(&store, b"b").await;
        let alias = Digest::compute(Algorithm::Sha256, b"a");

        assert!(!store.upsert_alias(a, &alias).await.unwrap().is_inserted());
        let err = store.upsert_alias(b, &alias).await.unwrap_err();
        assert!(matches!(err, StoreError::IntegrityViolation { existing, new, .. } if existing == a && new == b));
        assert_eq!(store.content_for_alias(&alias).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn test_save_projection_updates_in_place() {
        let store = SqliteStore::open_memory().unwrap();
        let cid = content(&store, b"bottle").await;
        let digest = Digest::compute(Algorithm::Sha256, b"bottle");

        let mut bottle = BottleProjection {
            labels: vec![label("env", "prod"), label("score", "3.5")],
            parts: vec![part("a"), part("b")],
            ..Default::default()
        };
        let id = store
            .save_projection(cid, 1, &Projection::Bottle(bottle.clone()))
            .await
            .unwrap();
        assert_eq!(store.find_bottle(&digest).await.unwrap().unwrap().parts, 2);

        bottle.labels = vec![label("score", "4")];
        bottle.parts = vec![part("a")];
        let again = store
            .save_projection(cid, 2, &Projection::Bottle(bottle))
            .await
            .unwrap();
        assert_eq!(again, id);

        let row = store.find_object(ObjectKind::Bottle, cid).await.unwrap().unwrap();
        assert_eq!(row.processor_version, 2);
        assert_eq!(store.find_bottle(&digest).await.unwrap().unwrap().parts, 1);
        let labels = store.bottle_labels(&digest).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["score"], "4");
    }

    #[tokio::test]
    async fn test_non_numeric_label_stored_as_null() {
        let store = SqliteStore::open_memory().unwrap();
        let cid = content(&store, b"bottle").await;
        let bottle = BottleProjection {
            labels: vec![label("env", "prod")],
            ..Default::default()
        };
        let id = store
            .save_projection(cid, 1, &Projection::Bottle(bottle))
            .await
            .unwrap();
        let numeric: Option<f64> = store
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT numeric_value FROM bottle_labels WHERE bottle_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .await
            .unwrap();
        assert!(numeric.is_none());
    }

    #[tokio::test]
    async fn test_find_manifest() {
        let store = SqliteStore::open_memory().unwrap();
        let bottle_cid = content(&store, b"bottle").await;
        let bottle_digest = Digest::compute(Algorithm::Sha256, b"bottle");
        let bottle_id = store
            .save_projection(bottle_cid, 1, &Projection::Bottle(BottleProjection::default()))
            .await
            .unwrap();

        let manifest_cid = content(&store, b"manifest").await;
        let manifest_id = store
            .save_projection(
                manifest_cid,
                1,
                &Projection::Manifest(ManifestProjection {
                    bottle_id,
                    bottle_digest: bottle_digest.clone(),
                    media_type: "m".into(),
                    layers: vec![],
                }),
            )
            .await
            .unwrap();

        let found = store
            .find_manifest(&Digest::compute(Algorithm::Sha256, b"manifest"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, manifest_id);
        assert_eq!(found.bottle_id, bottle_id);
        assert_eq!(found.bottle_digest, bottle_digest);
        assert!(store.find_manifest(&bottle_digest).await.unwrap().is_none());
    }

    /// A bottle and one manifest of it, returning their row ids.
    async fn bottle_and_manifest(store: &SqliteStore) -> (RowId, RowId) {
        let bottle_cid = content(store, b"bottle").await;
        let bottle_id = store
            .save_projection(bottle_cid, 1, &Projection::Bottle(BottleProjection::default()))
            .await
            .unwrap();
        let manifest_cid = content(store, b"manifest").await;
        let manifest_id = store
            .save_projection(
                manifest_cid,
                1,
                &Projection::Manifest(ManifestProjection {
                    bottle_id,
                    bottle_digest: Digest::compute(Algorithm::Sha256, b"bottle"),
                    media_type: "m".into(),
                    layers: vec![],
                }),
            )
            .await
            .unwrap();
        (bottle_id, manifest_id)
    }

    #[tokio::test]
    async fn test_locations_for_bottle_are_distinct() {
        let store = SqliteStore::open_memory().unwrap();
        let (bottle_id, manifest_id) = bottle_and_manifest(&store).await;
        let bottle_digest = Digest::compute(Algorithm::Sha256, b"bottle");
        let manifest_digest = Digest::compute(Algorithm::Sha256, b"manifest");

        let repositories = ["reg.example/a", "reg.example/a", "reg.example/b"];
        for (i, repository) in repositories.iter().enumerate() {
            let cid = content(&store, format!("event {i}").as_bytes()).await;
            let event = EventProjection {
                manifest_id,
                manifest_digest: manifest_digest.clone(),
                bottle_id,
                bottle_digest: bottle_digest.clone(),
                action: Some("push".into()),
                repository: repository.to_string(),
                tag: String::new(),
                auth_required: i == 2,
                bandwidth: 0,
                timestamp: Utc::now(),
                username: String::new(),
            };
            store.save_projection(cid, 3, &Projection::Event(event)).await.unwrap();
        }

        let locations = store.locations_for_bottle(&bottle_digest).await.unwrap();
        assert_eq!(
            locations,
            vec![
                Location {
                    repository: "reg.example/a".into(),
                    auth_required: false,
                    digest: manifest_digest.clone(),
                },
                Location {
                    repository: "reg.example/b".into(),
                    auth_required: true,
                    digest: manifest_digest,
                },
            ]
        );
        assert!(store
            .locations_for_bottle(&Digest::compute(Algorithm::Sha256, b"other"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_signatures_by_key_filters_on_fingerprint() {
        let store = SqliteStore::open_memory().unwrap();
        let (bottle_id, manifest_id) = bottle_and_manifest(&store).await;
        let bottle_digest = Digest::compute(Algorithm::Sha256, b"bottle");
        let key = Digest::compute(Algorithm::Sha256, b"key one");
        let other = Digest::compute(Algorithm::Sha256, b"key two");

        let detail = |fingerprint: &Digest| SignatureRow {
            signature_type: "t".into(),
            signature: vec![1, 2, 3],
            public_key: "pk".into(),
            fingerprint: fingerprint.to_string(),
            valid: true,
            annotations: BTreeMap::new(),
        };
        let cid = content(&store, b"signature").await;
        let signature = SignatureProjection {
            manifest_id,
            manifest_digest: Digest::compute(Algorithm::Sha256, b"manifest"),
            bottle_id,
            bottle_digest: bottle_digest.clone(),
            details: vec![detail(&key), detail(&other)],
        };
        store.save_projection(cid, 1, &Projection::Signature(signature)).await.unwrap();

        let found = store.signatures_by_key(&bottle_digest, &key).await.unwrap();
        assert_eq!(
            found,
            vec![SignatureValid {
                subject_bottle: bottle_digest.clone(),
                key_fingerprint: key.to_string(),
                validated: true,
            }]
        );
        let unknown = Digest::compute(Algorithm::Sha256, b"key three");
        assert!(store.signatures_by_key(&bottle_digest, &unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_since_orders_and_aggregates_digests() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..5u8 {
            let cid = content(&store, &[i]).await;
            store.upsert_alias(cid, &Digest::compute(Algorithm::Blake3, &[i])).await.unwrap();
            store.save_projection(cid, 3, &Projection::Blob).await.unwrap();
        }

        let all = store.list_since(ObjectKind::Blob, None, 100).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(all[0].digests.len(), 2);
        assert_eq!(all[0].data, vec![0u8]);

        let tail = store
            .list_since(ObjectKind::Blob, Some(all[1].created_at), 2)
            .await
            .unwrap();
        assert_eq!(tail, all[2..4].to_vec());

        assert!(store.list_since(ObjectKind::Bottle, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_since_out_of_nanosecond_range() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..3u8 {
            let cid = content(&store, &[i]).await;
            store.save_projection(cid, 3, &Projection::Blob).await.unwrap();
        }

        let far_future = bottle_catalog_core::parse_timestamp("2300-01-01T00:00:00Z").unwrap();
        assert!(store
            .list_since(ObjectKind::Blob, Some(far_future), 10)
            .await
            .unwrap()
            .is_empty());

        let far_past = bottle_catalog_core::parse_timestamp("1600-01-01T00:00:00Z").unwrap();
        let all = store.list_since(ObjectKind::Blob, Some(far_past), 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_next_stale_walks_forward() {
        let store = SqliteStore::open_memory().unwrap();
        let mut ids = Vec::new();
        for (i, version) in [1u32, 3, 1].iter().enumerate() {
            let cid = content(&store, &[i as u8]).await;
            ids.push(store.save_projection(cid, *version, &Projection::Blob).await.unwrap());
        }

        let first = store.next_stale(ObjectKind::Blob, 3, 0).await.unwrap().unwrap();
        assert_eq!(first.id, ids[0]);
        let second = store.next_stale(ObjectKind::Blob, 3, first.id).await.unwrap().unwrap();
        assert_eq!(second.id, ids[2]);
        assert!(store.next_stale(ObjectKind::Blob, 3, second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_digest_requires_kind() {
        let store = SqliteStore::open_memory().unwrap();
        let cid = content(&store, b"blob").await;
        let digest = Digest::compute(Algorithm::Sha256, b"blob");
        assert!(store.get_by_digest(ObjectKind::Blob, &digest).await.unwrap().is_none());

        store.save_projection(cid, 3, &Projection::Blob).await.unwrap();
        let found = store.get_by_digest(ObjectKind::Blob, &digest).await.unwrap().unwrap();
        assert_eq!(found.bytes, b"blob");
        assert!(store.get_by_digest(ObjectKind::Bottle, &digest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deprecated_by() {
        let store = SqliteStore::open_memory().unwrap();
        let old = Digest::compute(Algorithm::Sha256, b"old");
        let cid = content(&store, b"new").await;
        let bottle = BottleProjection {
            deprecates: vec![old.clone()],
            ..Default::default()
        };
        store.save_projection(cid, 1, &Projection::Bottle(bottle)).await.unwrap();

        let by = store.deprecated_by(&old).await.unwrap();
        assert_eq!(by, vec![Digest::compute(Algorithm::Sha256, b"new")]);
    }

    #[tokio::test]
    async fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            content(&store, b"persisted").await;
        }
        let store = SqliteStore::open(&path).unwrap();
        let found = store
            .content_for_alias(&Digest::compute(Algorithm::Sha256, b"persisted"))
            .await
            .unwrap();
        assert!(found.is_some());
    }
}

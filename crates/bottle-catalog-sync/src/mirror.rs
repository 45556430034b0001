//! Local mirrors: bulk upload from and incremental download into a directory.
//!
//! A mirror has one directory per kind. Each holds the raw objects, named
//! `<alg>-<hex>` after their first digest, an `index.csv` with one row per
//! object (`<file name>,<algorithm>,<algorithm>,...`) and an `index.latest`
//! checkpoint holding the creation time of the last object downloaded.

use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use bottle_catalog_core::{
    format_timestamp, parse_timestamp, Algorithm, Digest, ObjectKind, TOPOLOGICAL_ORDER,
};

use crate::client::{SyncClient, TransferReport};
use crate::error::{Result, SyncError};
use crate::transport::{PutOutcome, Transport};

/// Name of the per-kind index file.
pub const INDEX_FILE: &str = "index.csv";

/// Name of the per-kind checkpoint file.
pub const LATEST_FILE: &str = "index.latest";

/// One row of a mirror index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// Data file name, relative to the kind directory.
    pub file_name: String,
    /// Algorithms the object is known under.
    pub algorithms: Vec<Algorithm>,
}

impl IndexRow {
    /// The row for an object stored under the first of `digests`.
    pub fn for_digests(digests: &[Digest]) -> Option<Self> {
        let primary = digests.first()?;
        Some(Self {
            file_name: primary.file_name(),
            algorithms: digests.iter().map(Digest::algorithm).collect(),
        })
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split(',').map(str::trim);
        let file_name = match fields.next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(SyncError::Index(format!("row without file name: {line:?}"))),
        };
        // Only `<alg>-<hex>` names, so a row cannot point outside its directory.
        Digest::from_file_name(&file_name)
            .map_err(|_| SyncError::Index(format!("not an object file name: {file_name:?}")))?;
        let algorithms = fields
            .map(|alg| {
                alg.parse::<Algorithm>()
                    .map_err(|_| SyncError::Index(format!("unknown digest algorithm {alg:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if algorithms.is_empty() {
            return Err(SyncError::Index(format!("row without algorithms: {line:?}")));
        }
        Ok(Self {
            file_name,
            algorithms,
        })
    }

    pub fn to_line(&self) -> String {
        let mut line = self.file_name.clone();
        for alg in &self.algorithms {
            line.push(',');
            line.push_str(alg.as_str());
        }
        line.push('\n');
        line
    }
}

/// Read every row of an index file.
pub async fn read_index(path: &Path) -> Result<Vec<IndexRow>> {
    let text = tokio::fs::read_to_string(path).await?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(IndexRow::parse)
        .collect()
}

/// Read a checkpoint file.
pub async fn read_latest(path: &Path) -> Result<DateTime<Utc>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_timestamp(&text).map_err(|e| SyncError::Index(format!("{}: {e}", path.display())))
}

/// Write a checkpoint file.
pub async fn write_latest(path: &Path, latest: &DateTime<Utc>) -> Result<()> {
    tokio::fs::write(path, format_timestamp(latest)).await?;
    Ok(())
}

impl<T: Transport> SyncClient<T> {
    // ─────────────────────────────────────────────────────────────────────────
    // Upload
    // ─────────────────────────────────────────────────────────────────────────

    /// Push every object listed in `dir/index.csv`, once per listed algorithm.
    ///
    /// With `skip_invalid`, objects the destination reports missing
    /// dependencies for are logged and skipped instead of aborting.
    pub async fn upload(&self, kind: ObjectKind, dir: &Path) -> Result<TransferReport> {
        let rows = read_index(&dir.join(INDEX_FILE)).await?;
        let mut report = TransferReport::default();

        for row in rows {
            let data = tokio::fs::read(dir.join(&row.file_name)).await?;
            for algorithm in &row.algorithms {
                let digest = algorithm.hash(&data);
                match self.put(kind, &data, Some(&digest)).await {
                    Ok(PutOutcome::Created(_)) => report.transferred += 1,
                    Ok(PutOutcome::Unchanged(_)) => report.unchanged += 1,
                    Err(e) if e.is_missing_dependencies() && self.config().skip_invalid => {
                        tracing::warn!(%kind, file = %row.file_name, error = %e, "skipping upload");
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(
            %kind,
            destination = self.name(),
            rows = report.transferred,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "uploaded"
        );
        Ok(report)
    }

    /// Upload every kind under `root`, dependencies first.
    ///
    /// Kinds without an index are skipped.
    pub async fn upload_all(&self, root: &Path) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        for kind in TOPOLOGICAL_ORDER {
            let dir = root.join(kind.as_str());
            if !tokio::fs::try_exists(dir.join(INDEX_FILE)).await? {
                tracing::debug!(%kind, dir = %dir.display(), "no index, skipping");
                continue;
            }
            report += self.upload(kind, &dir).await?;
        }
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Download
    // ─────────────────────────────────────────────────────────────────────────

    /// Mirror objects of `kind` created after `since` into `dir`.
    ///
    /// With `from_latest` the start point is read from `index.latest`,
    /// falling back to `since` when there is no usable checkpoint. The
    /// checkpoint is rewritten after every full page and at the end, so an
    /// interrupted download resumes where it stopped.
    pub async fn download(
        &self,
        kind: ObjectKind,
        dir: &Path,
        since: Option<DateTime<Utc>>,
        from_latest: bool,
    ) -> Result<TransferReport> {
        tokio::fs::create_dir_all(dir).await?;
        let latest_path = dir.join(LATEST_FILE);

        let mut latest = since;
        if from_latest {
            match read_latest(&latest_path).await {
                Ok(ts) => {
                    tracing::info!(%kind, since = %format_timestamp(&ts), "resuming from checkpoint");
                    latest = Some(ts);
                }
                Err(e) => tracing::info!(%kind, error = %e, "no checkpoint"),
            }
        }

        let mut index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(INDEX_FILE))
            .await?;
        let batch_size = self.config().batch_size.max(1);
        let mut report = TransferReport::default();

        loop {
            if self.cancellation().is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let page = self.list(kind, latest, batch_size).await?;
            report.pages += 1;

            for entry in &page {
                let row = IndexRow::for_digests(&entry.digests).ok_or_else(|| {
                    SyncError::Index(format!("{kind} listed without digests"))
                })?;
                tokio::fs::write(dir.join(&row.file_name), &entry.data).await?;
                index.write_all(row.to_line().as_bytes()).await?;
                tracing::debug!(%kind, file = %row.file_name, "saved");
                latest = Some(entry.created_at);
                report.transferred += 1;
            }
            index.flush().await?;

            if page.len() < batch_size {
                break;
            }
            if let Some(latest) = &latest {
                write_latest(&latest_path, latest).await?;
            }
        }

        if let Some(latest) = &latest {
            write_latest(&latest_path, latest).await?;
        }
        tracing::info!(
            %kind,
            source = self.name(),
            rows = report.transferred,
            pages = report.pages,
            "downloaded"
        );
        Ok(report)
    }

    /// Mirror every kind into `root/<kind>`, dependencies first.
    pub async fn download_all(
        &self,
        root: &Path,
        since: Option<DateTime<Utc>>,
        from_latest: bool,
    ) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        for kind in TOPOLOGICAL_ORDER {
            report += self
                .download(kind, &root.join(kind.as_str()), since, from_latest)
                .await?;
        }
        Ok(report)
    }
}

//! Ingestion batch driver.
//!
//! Resolves CLI paths to PDF files, then runs each through extract → chunk →
//! embed → persist. Files are isolated: one unreadable or duplicate file is
//! recorded in the report and the batch moves on.
//!
//! Nothing is written until embedding succeeds, and the document row and its
//! chunks then land in a single transaction. A failed or cancelled file
//! leaves no rows behind and can simply be ingested again.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::embedding::{embed_chunks, Embedder};
use crate::error::{Error, Result};
use crate::extract::extract_pages;
use crate::models::{EmbeddedChunk, NewDocument};
use crate::store::Store;

/// One successfully ingested file.
#[derive(Debug)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub document_id: String,
    pub pages: usize,
    pub chunks: usize,
}

/// One file that failed, with the error that stopped it.
#[derive(Debug)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: Error,
}

/// Outcome of an ingestion batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub succeeded: Vec<IngestedFile>,
    pub failed: Vec<FailedFile>,
}

/// Ingest every PDF reachable from `paths` (files directly, directories
/// recursively).
pub async fn run_ingest(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    paths: &[PathBuf],
) -> IngestReport {
    let mut report = IngestReport::default();
    let files = resolve_paths(paths, &mut report);

    for path in files {
        match ingest_file(store, embedder, config, &path).await {
            Ok(file) => {
                info!(
                    path = %file.path.display(),
                    pages = file.pages,
                    chunks = file.chunks,
                    "ingested"
                );
                report.succeeded.push(file);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ingestion failed");
                report.failed.push(FailedFile { path, error });
            }
        }
    }
    report
}

/// Expand paths into concrete PDF files. Directories are walked recursively
/// for `.pdf` entries; unreadable paths go straight into the failure list.
fn resolve_paths(paths: &[PathBuf], report: &mut IngestReport) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && is_pdf(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            report.failed.push(FailedFile {
                path: path.clone(),
                error: Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such file or directory: {}", path.display()),
                )),
            });
        }
    }
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

async fn ingest_file(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    path: &Path,
) -> Result<IngestedFile> {
    let bytes = std::fs::read(path)?;
    let pages = extract_pages(&bytes)?;

    let filename = path.display().to_string();
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.clone());

    let drafts = chunk_pages(&pages, config.chunking.window_max_chars, &filename)?;

    let vectors = embed_chunks(
        embedder,
        &drafts,
        config.embedding.batch_size,
        config.embedding.max_concurrent_batches,
    )
    .await?;

    let chunk_count = drafts.len();
    let chunks: Vec<EmbeddedChunk> = drafts
        .into_iter()
        .zip(vectors)
        .map(|(draft, vector)| EmbeddedChunk { draft, vector })
        .collect();

    let document_id = store
        .insert_document(
            &NewDocument {
                title,
                filename,
                total_pages: pages.len() as i64,
            },
            &chunks,
        )
        .await?;

    Ok(IngestedFile {
        path: path.to_path_buf(),
        document_id,
        pages: pages.len(),
        chunks: chunk_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_walks_directories_for_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("B.PDF"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("c.pdf"), b"x").unwrap();

        let mut report = IngestReport::default();
        let files = resolve_paths(&[dir.path().to_path_buf()], &mut report);

        assert_eq!(files.len(), 3);
        assert!(report.failed.is_empty());
        assert!(files.iter().all(|p| is_pdf(p)));
    }

    #[test]
    fn resolve_records_missing_paths_as_failures() {
        let mut report = IngestReport::default();
        let files = resolve_paths(&[PathBuf::from("/nonexistent/x.pdf")], &mut report);
        assert!(files.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, Error::Io(_)));
    }

    #[test]
    fn resolve_accepts_explicit_files_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.bin");
        std::fs::write(&path, b"x").unwrap();

        let mut report = IngestReport::default();
        let files = resolve_paths(&[path.clone()], &mut report);
        assert_eq!(files, vec![path]);
    }
}

//! Directory ingestion.
//!
//! Walks a site directory, reads every file matching the glob and turns it
//! into a [`PreparedDocument`] on a rayon pool. Nothing here touches the
//! index; the caller inserts the results one by one.

use crate::error::{Result, SitefindError};
use crate::index::normalize::Normalizer;
use crate::index::partition::PreparedDocument;
use crate::utils::progress;
use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A file found by the walker
#[derive(Debug, Clone)]
struct SiteEntry {
    path: PathBuf,
    /// Path relative to the site root, `/`-separated
    rel_path: String,
}

/// Resolve a possibly relative directory against the current directory
pub fn resolve_site_root(path: &Path) -> Result<PathBuf> {
    let root = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };
    if !root.is_dir() {
        return Err(SitefindError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }
    Ok(root.canonicalize()?)
}

/// Enumerate files under `root` whose relative path matches `glob`.
///
/// Walk failures are returned in place of the entry they concern so the
/// caller can report them alongside document errors.
fn walk(root: &Path, glob: &GlobMatcher) -> Vec<Result<SiteEntry>> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(SitefindError::Walk(e))),
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                return None;
            }
            let rel = entry.path().strip_prefix(root).ok()?;
            let rel_path = rel.to_string_lossy().replace('\\', "/");
            glob.is_match(&rel_path).then(|| {
                Ok(SiteEntry {
                    path: entry.path().to_path_buf(),
                    rel_path,
                })
            })
        })
        .collect()
}

/// Read and normalize one file
fn prepare_file(entry: &SiteEntry, normalizer: &Normalizer) -> Result<PreparedDocument> {
    let max_file_size = normalizer.config().max_file_size;
    let size = fs::metadata(&entry.path).map_err(|e| with_path(&entry.rel_path, e))?.len();
    if size > max_file_size {
        return Err(SitefindError::normalization(format!(
            "{}: {} bytes exceeds max_file_size of {}",
            entry.rel_path, size, max_file_size
        )));
    }

    let bytes = fs::read(&entry.path).map_err(|e| with_path(&entry.rel_path, e))?;
    let document = normalizer.html_bytes(&entry.rel_path, bytes)?;
    Ok(PreparedDocument::new(document))
}

fn with_path(rel_path: &str, e: io::Error) -> SitefindError {
    SitefindError::Io(io::Error::new(e.kind(), format!("{}: {}", rel_path, e)))
}

/// Walk `root` and prepare every matching file in parallel.
///
/// The outer error covers problems with the request itself (bad glob, missing
/// directory, no thread pool); per-file failures are returned as `Err` items
/// in walk order. Once `cancel` is raised, files not yet started are skipped.
pub fn prepare_directory(
    root: &Path,
    glob: Option<&str>,
    normalizer: &Normalizer,
    cancel: Option<&AtomicBool>,
    silent: bool,
) -> Result<Vec<Result<PreparedDocument>>> {
    let root = resolve_site_root(root)?;
    let pattern = glob.unwrap_or(normalizer.config().glob.as_str());
    let matcher = Glob::new(pattern)?.compile_matcher();

    let discover = progress::spinner("Discovering files...", silent);
    let entries = walk(&root, &matcher);
    if let Some(spinner) = discover {
        spinner.finish_with_message(format!("Found {} files", entries.len()));
    }
    info!(root = %root.display(), glob = pattern, files = entries.len(), "walking site");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(normalizer.config().effective_threads())
        .build()
        .map_err(|e| SitefindError::initialization(format!("cannot start worker pool: {}", e)))?;

    let bar = progress::bar(entries.len() as u64, "Processing files...", silent);
    let prepared: Vec<Result<PreparedDocument>> = pool.install(|| {
        entries
            .into_par_iter()
            .filter_map(|entry| {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return None;
                }
                let result = entry.and_then(|entry| {
                    let result = prepare_file(&entry, normalizer);
                    match &result {
                        Ok(doc) => debug!(path = %entry.rel_path, words = doc.word_count, "prepared"),
                        Err(e) => warn!(path = %entry.rel_path, error = %e, "cannot prepare file"),
                    }
                    result
                });
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                Some(result)
            })
            .collect()
    });
    if let Some(bar) = bar {
        bar.finish_with_message(format!("Processed {} files", prepared.len()));
    }

    Ok(prepared)
}

//! The index service.
//!
//! An [`Index`] is a cloneable handle to a worker thread that owns one
//! [`IndexWriter`]. Every mutation and every snapshot travels through a
//! channel to that worker, so operations from any number of handles are
//! applied one at a time in arrival order. Expensive preparation (HTML
//! extraction, tokenization, directory walking) runs in the calling thread
//! before the command is sent.
//!
//! Every operation reports failures in an `errors` list instead of returning
//! `Err`; a missing result value means the call failed as a whole.

use crate::config::IndexConfig;
use crate::error::{Result, SitefindError};
use crate::index::build::prepare_directory;
use crate::index::bundle::{self, Bundle, BundleFile, DEFAULT_BUNDLE_DIR};
use crate::index::normalize::{Normalizer, custom_record};
use crate::index::partition::PreparedDocument;
use crate::index::types::{CustomRecord, HtmlFile, IndexingResponse, NewFile};
use crate::index::writer::IndexWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// A site directory to ingest
#[derive(Debug, Clone, Default)]
pub struct SiteDirectory {
    /// Resolved against the current directory when relative
    pub path: PathBuf,
    /// Overrides the configured glob
    pub glob: Option<String>,
}

/// Knobs for long-running directory ingestion
#[derive(Debug, Clone, Default)]
pub struct DirectoryOptions {
    /// Raise to abandon the ingestion; documents inserted so far are kept
    pub cancel: Option<Arc<AtomicBool>>,
    pub progress: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Resolved against the current directory when relative
    pub bundle_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct NewIndexResponse {
    pub errors: Vec<String>,
    pub index: Option<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileResponse {
    pub errors: Vec<String>,
    pub file: Option<NewFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFilesResponse {
    pub errors: Vec<String>,
    pub bundle_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFilesResponse {
    pub errors: Vec<String>,
    pub files: Vec<BundleFile>,
}

enum Command {
    Insert {
        document: PreparedDocument,
        reply: Sender<Result<NewFile>>,
    },
    InsertBatch {
        batch: Vec<Result<PreparedDocument>>,
        cancel: Option<Arc<AtomicBool>>,
        reply: Sender<IndexingResponse>,
    },
    Snapshot {
        reply: Sender<Result<Bundle>>,
    },
}

/// Handle to a running index; clones share the same index
#[derive(Clone)]
pub struct Index {
    commands: Sender<Command>,
    normalizer: Arc<Normalizer>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").finish_non_exhaustive()
    }
}

/// Create an index with the default configuration
pub fn create_index() -> NewIndexResponse {
    Index::create(IndexConfig::default())
}

fn failed<T>(e: SitefindError) -> (Vec<String>, Option<T>) {
    (vec![e.to_string()], None)
}

impl Index {
    /// Allocate an empty index and start its worker
    pub fn create(config: IndexConfig) -> NewIndexResponse {
        let (errors, index) = match Self::spawn(config) {
            Ok(index) => (Vec::new(), Some(index)),
            Err(e) => {
                error!(error = %e, "cannot create index");
                failed(e)
            }
        };
        NewIndexResponse { errors, index }
    }

    fn spawn(config: IndexConfig) -> Result<Self> {
        let normalizer = Arc::new(Normalizer::new(&config)?);
        let writer = IndexWriter::new(config)?;
        let (commands, receiver) = mpsc::channel();

        thread::Builder::new()
            .name("sitefind-index".to_string())
            .spawn(move || run_worker(writer, receiver))
            .map_err(|e| SitefindError::initialization(format!("cannot spawn index worker: {}", e)))?;

        debug!("index worker started");
        Ok(Self {
            commands,
            normalizer,
        })
    }

    /// Send a command and wait for its reply
    fn call<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| worker_gone())?;
        response.recv().map_err(|_| worker_gone())
    }

    fn insert(&self, document: Result<PreparedDocument>) -> NewFileResponse {
        let result = document.and_then(|document| {
            self.call(|reply| Command::Insert { document, reply })?
        });
        let (errors, file) = match result {
            Ok(file) => (Vec::new(), Some(file)),
            Err(e) => failed(e),
        };
        NewFileResponse { errors, file }
    }

    /// Index one HTML page; its URL is derived from `file.path`
    pub fn add_html_file(&self, file: HtmlFile) -> NewFileResponse {
        let document = self.normalizer.html_file(&file).map(PreparedDocument::new);
        self.insert(document)
    }

    /// Index a record that has no HTML source
    pub fn add_custom_record(&self, record: CustomRecord) -> NewFileResponse {
        let document = custom_record(record).map(PreparedDocument::new);
        self.insert(document)
    }

    /// Index every file under a directory that matches the glob
    pub fn add_directory(&self, directory: SiteDirectory) -> IndexingResponse {
        self.add_directory_with(directory, DirectoryOptions::default())
    }

    /// Like [`add_directory`](Self::add_directory), with cancellation and progress output.
    ///
    /// Cancellation does not roll back: documents inserted before the flag
    /// was seen stay in the index.
    pub fn add_directory_with(&self, directory: SiteDirectory, options: DirectoryOptions) -> IndexingResponse {
        let cancel = options.cancel.clone();
        let batch = match prepare_directory(
            &directory.path,
            directory.glob.as_deref(),
            &self.normalizer,
            cancel.as_deref(),
            !options.progress,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                error!(path = %directory.path.display(), error = %e, "cannot ingest directory");
                return IndexingResponse {
                    errors: vec![e.to_string()],
                    page_count: 0,
                };
            }
        };

        let empty = batch.is_empty();
        let mut response = match self.call(|reply| Command::InsertBatch { batch, cancel, reply }) {
            Ok(response) => response,
            Err(e) => IndexingResponse {
                errors: vec![e.to_string()],
                page_count: 0,
            },
        };
        if empty && is_raised(options.cancel.as_deref()) {
            response
                .errors
                .push("indexing cancelled before any document was inserted".to_string());
        }
        response
    }

    fn snapshot(&self) -> Result<Bundle> {
        self.call(|reply| Command::Snapshot { reply })?
    }

    /// Serialize the index and write the bundle to disk
    pub fn write_files(&self, options: Option<WriteOptions>) -> WriteFilesResponse {
        let target = options
            .and_then(|o| o.bundle_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUNDLE_DIR));
        let (errors, bundle_path) = match self.snapshot().and_then(|b| b.write(&target)) {
            Ok(path) => (Vec::new(), Some(path)),
            Err(e) => {
                error!(path = %target.display(), error = %e, "bundle write failed");
                failed(e)
            }
        };
        WriteFilesResponse { errors, bundle_path }
    }

    /// Serialize the index into in-memory files without touching disk
    pub fn get_files(&self) -> GetFilesResponse {
        match self.snapshot().and_then(|b| b.to_memory()) {
            Ok(files) => GetFilesResponse {
                errors: Vec::new(),
                files,
            },
            Err(e) => GetFilesResponse {
                errors: vec![e.to_string()],
                files: Vec::new(),
            },
        }
    }
}

fn is_raised(flag: Option<&AtomicBool>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::Relaxed))
}

fn worker_gone() -> SitefindError {
    SitefindError::initialization("index worker is no longer running")
}

/// Apply commands until every handle is dropped
fn run_worker(mut writer: IndexWriter, commands: Receiver<Command>) {
    for command in commands {
        // A caller that gave up waiting has dropped its receiver; nothing to do
        match command {
            Command::Insert { document, reply } => {
                let _ = reply.send(writer.insert_prepared(document));
            }
            Command::InsertBatch {
                batch,
                cancel,
                reply,
            } => {
                let _ = reply.send(writer.insert_batch(batch, cancel.as_deref()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(bundle::serialize(&writer));
            }
        }
    }
    info!(documents = writer.doc_count(), "index worker stopped");
}

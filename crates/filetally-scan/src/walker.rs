//! JWalk-based directory walker.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use globset::GlobSet;
use jwalk::{DirEntry, Parallelism, WalkDir};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use filetally_core::manifest::unsupported_path;
use filetally_core::{ScanConfig, ScanError, ScanWarning, WarningKind};

use crate::progress::WalkProgress;

type EntryIter = Box<dyn Iterator<Item = Result<DirEntry<((), ())>, jwalk::Error>>>;

/// Walks one or more roots and yields absolute file paths.
///
/// Directories that cannot be read are recorded as warnings and their
/// subtree is skipped; nothing short of an invalid configuration stops a walk.
pub struct DirectoryWalker {
    config: ScanConfig,
    ignore: Arc<GlobSet>,
    progress_tx: broadcast::Sender<WalkProgress>,
}

impl DirectoryWalker {
    /// Create a walker for the given configuration.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        if config.roots.is_empty() {
            return Err(ScanError::InvalidConfig {
                message: "At least one root is required".to_string(),
            });
        }
        let ignore = Arc::new(config.ignore_matcher()?);
        let (progress_tx, _) = broadcast::channel(100);
        Ok(Self {
            config,
            ignore,
            progress_tx,
        })
    }

    /// The walker's configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Subscribe to walk progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<WalkProgress> {
        self.progress_tx.subscribe()
    }

    /// Start a lazy walk over every configured root, in order.
    ///
    /// Each call starts from scratch.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            walker: self,
            roots: self.config.roots.iter().cloned().collect(),
            current: None,
            current_root: PathBuf::new(),
            files_found: 0,
            dirs_walked: 0,
            warnings: Vec::new(),
            start: Instant::now(),
        }
    }

    /// Walk every root to completion and collect the results.
    pub fn collect(&self) -> WalkSummary {
        let mut walk = self.walk();
        let files: Vec<PathBuf> = walk.by_ref().collect();
        WalkSummary {
            files,
            dirs_walked: walk.dirs_walked,
            warnings: walk.warnings,
            duration: walk.start.elapsed(),
        }
    }

    fn open_root(&self, root: &Path) -> Result<(PathBuf, EntryIter), ScanWarning> {
        let root = root.canonicalize().map_err(|e| {
            ScanWarning::new(root, format!("Cannot open root: {e}"), WarningKind::RootUnavailable)
        })?;
        if !root.is_dir() {
            return Err(ScanWarning::new(
                &root,
                "Root is not a directory",
                WarningKind::RootUnavailable,
            ));
        }

        let ignore = Arc::clone(&self.ignore);
        let walker = WalkDir::new(&root)
            .parallelism(Parallelism::Serial)
            .sort(true)
            .skip_hidden(!self.config.include_hidden)
            .follow_links(self.config.follow_symlinks)
            .min_depth(1)
            .max_depth(
                self.config
                    .max_depth
                    .map(|d| d as usize)
                    .unwrap_or(usize::MAX),
            )
            .process_read_dir(move |_depth, _path, _state, children| {
                if ignore.is_empty() {
                    return;
                }
                children.retain(|child| match child {
                    Ok(entry) => !ignore.is_match(entry.file_name()),
                    Err(_) => true,
                });
            });

        Ok((root, Box::new(walker.into_iter())))
    }

    fn send_progress(&self, walk: &Walk<'_>) {
        // Lagging or absent receivers miss updates.
        let _ = self.progress_tx.send(WalkProgress {
            files_found: walk.files_found,
            dirs_walked: walk.dirs_walked,
            current_root: walk.current_root.clone(),
            warnings_count: walk.warnings.len() as u64,
            elapsed: walk.start.elapsed(),
        });
    }
}

/// A lazy walk in progress. Yields absolute paths of regular files.
///
/// Files whose paths cannot be stored in a manifest row are reported as
/// [`WarningKind::UnsupportedName`] warnings instead of being yielded.
pub struct Walk<'a> {
    walker: &'a DirectoryWalker,
    roots: VecDeque<PathBuf>,
    current: Option<EntryIter>,
    current_root: PathBuf,
    files_found: u64,
    dirs_walked: u64,
    warnings: Vec<ScanWarning>,
    start: Instant,
}

impl Walk<'_> {
    /// Number of files yielded so far.
    pub fn files_found(&self) -> u64 {
        self.files_found
    }

    /// Warnings collected so far.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Consume the walk, returning its warnings.
    pub fn into_warnings(self) -> Vec<ScanWarning> {
        self.warnings
    }

    fn record_error(&mut self, err: jwalk::Error) {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        let denied = err
            .io_error()
            .map(|e| e.kind() == std::io::ErrorKind::PermissionDenied)
            .unwrap_or(false);
        warn!(path = %path.display(), error = %err, "skipping unreadable subtree");
        let warning = if denied {
            ScanWarning::permission_denied(path)
        } else {
            ScanWarning::read_error(path, &err)
        };
        self.warnings.push(warning);
    }

    fn next_root(&mut self) -> bool {
        while let Some(root) = self.roots.pop_front() {
            match self.walker.open_root(&root) {
                Ok((root, iter)) => {
                    debug!(root = %root.display(), "walking root");
                    self.current_root = root;
                    self.current = Some(iter);
                    return true;
                }
                Err(warning) => {
                    warn!(root = %root.display(), message = %warning.message, "skipping root");
                    self.warnings.push(warning);
                }
            }
        }
        false
    }
}

impl Iterator for Walk<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if self.current.is_none() && !self.next_root() {
                return None;
            }
            let next = self.current.as_mut().and_then(|iter| iter.next());
            let entry = match next {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    self.record_error(err);
                    continue;
                }
                None => {
                    self.current = None;
                    self.walker.send_progress(self);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                self.dirs_walked += 1;
                continue;
            }

            let path = entry.path();
            if file_type.is_symlink() {
                if !path.exists() {
                    let target = std::fs::read_link(&path)
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_default();
                    self.warnings.push(ScanWarning::new(
                        &path,
                        format!("Broken symlink: {} -> {target}", path.display()),
                        WarningKind::BrokenSymlink,
                    ));
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let unsupported = match path.to_str() {
                Some(text) => unsupported_path(text),
                None => Some("name is not valid UTF-8"),
            };
            if let Some(reason) = unsupported {
                warn!(path = %path.display(), reason, "skipping file");
                self.warnings.push(ScanWarning::new(
                    &path,
                    format!("Skipped file, {reason}"),
                    WarningKind::UnsupportedName,
                ));
                continue;
            }

            self.files_found += 1;
            let interval = self.walker.config.progress_interval;
            if interval > 0 && self.files_found % interval == 0 {
                self.walker.send_progress(self);
            }
            return Some(path);
        }
    }
}

/// Result of walking every root to completion.
#[derive(Debug, Clone)]
pub struct WalkSummary {
    /// Files discovered, in walk order.
    pub files: Vec<PathBuf>,
    /// Directories entered.
    pub dirs_walked: u64,
    /// Non-fatal problems encountered.
    pub warnings: Vec<ScanWarning>,
    /// Wall-clock duration of the walk.
    pub duration: Duration,
}

//! Asset loading for widgets (models, motion clips, textures, fonts).
//!
//! Loads run off the frame loop and complete through an [`AssetTicket`] that
//! the owning widget polls once per frame, so nothing in the coordination
//! path ever blocks.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Failed to read asset {path}: {message}")]
    Io { path: String, message: String },

    #[error("Asset load failed for {path}: {reason}")]
    Rejected { path: String, reason: String },

    #[error("Asset load abandoned: {0}")]
    Abandoned(String),
}

pub type AssetResult = Result<Vec<u8>, AssetError>;

/// Pending result of one asset load.
#[derive(Debug)]
pub struct AssetTicket {
    path: String,
    receiver: Receiver<AssetResult>,
    finished: bool,
}

/// Write side of an [`AssetTicket`].
#[derive(Debug, Clone)]
pub struct AssetCompleter {
    path: String,
    sender: Sender<AssetResult>,
}

impl AssetCompleter {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn complete(&self, bytes: Vec<u8>) {
        // A dropped ticket means the widget is gone
        let _ = self.sender.send(Ok(bytes));
    }

    pub fn fail(&self, error: AssetError) {
        let _ = self.sender.send(Err(error));
    }
}

impl AssetTicket {
    /// A connected ticket/completer pair for `path`.
    pub fn pending(path: impl Into<String>) -> (AssetCompleter, AssetTicket) {
        let path = path.into();
        let (sender, receiver) = mpsc::channel();
        (
            AssetCompleter {
                path: path.clone(),
                sender,
            },
            AssetTicket {
                path,
                receiver,
                finished: false,
            },
        )
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The load result, once. `None` while still loading or after it was taken.
    pub fn poll(&mut self) -> Option<AssetResult> {
        if self.finished {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.finished = true;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                Some(Err(AssetError::Abandoned(self.path.clone())))
            }
        }
    }
}

/// Source of asset bytes.
pub trait AssetLoader {
    fn load(&self, path: &str) -> AssetTicket;
}

/// Reads assets from disk on a background thread, relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetLoader for FileAssetLoader {
    fn load(&self, path: &str) -> AssetTicket {
        let (completer, ticket) = AssetTicket::pending(path);
        let full_path = self.root.join(path);
        log::debug!("Loading asset {:?}", full_path);

        thread::spawn(move || match std::fs::read(&full_path) {
            Ok(bytes) => completer.complete(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                completer.fail(AssetError::NotFound(completer.path().to_string()))
            }
            Err(e) => completer.fail(AssetError::Io {
                path: completer.path().to_string(),
                message: e.to_string(),
            }),
        });
        ticket
    }
}

/// Loader whose requests are completed by hand. Used by hosts that fetch
/// assets themselves and by tests.
#[derive(Debug, Default)]
pub struct ManualAssetLoader {
    requests: RefCell<Vec<AssetCompleter>>,
}

impl ManualAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths requested and not yet completed, in request order.
    pub fn pending_paths(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|c| c.path().to_string())
            .collect()
    }

    fn take(&self, path: &str) -> Option<AssetCompleter> {
        let mut requests = self.requests.borrow_mut();
        let index = requests.iter().position(|c| c.path() == path)?;
        Some(requests.remove(index))
    }

    /// Complete the oldest pending request for `path`. False if none is pending.
    pub fn complete(&self, path: &str, bytes: Vec<u8>) -> bool {
        match self.take(path) {
            Some(completer) => {
                completer.complete(bytes);
                true
            }
            None => false,
        }
    }

    /// Reject the oldest pending request for `path`.
    pub fn fail(&self, path: &str, reason: &str) -> bool {
        match self.take(path) {
            Some(completer) => {
                completer.fail(AssetError::Rejected {
                    path: path.to_string(),
                    reason: reason.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub fn complete_all(&self) {
        for completer in self.requests.borrow_mut().drain(..) {
            completer.complete(Vec::new());
        }
    }
}

impl AssetLoader for ManualAssetLoader {
    fn load(&self, path: &str) -> AssetTicket {
        let (completer, ticket) = AssetTicket::pending(path);
        self.requests.borrow_mut().push(completer);
        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_yields_result_once() {
        let (completer, mut ticket) = AssetTicket::pending("a.glb");
        assert!(ticket.poll().is_none());
        completer.complete(vec![1, 2, 3]);
        assert_eq!(ticket.poll(), Some(Ok(vec![1, 2, 3])));
        assert!(ticket.poll().is_none());
        assert!(ticket.is_finished());
    }

    #[test]
    fn test_dropped_completer_abandons() {
        let (completer, mut ticket) = AssetTicket::pending("a.glb");
        drop(completer);
        assert_eq!(
            ticket.poll(),
            Some(Err(AssetError::Abandoned("a.glb".to_string())))
        );
    }

    #[test]
    fn test_manual_loader() {
        let loader = ManualAssetLoader::new();
        let mut model = loader.load("model.glb");
        let mut clip = loader.load("walk.vmd");
        assert_eq!(loader.pending_paths(), vec!["model.glb", "walk.vmd"]);

        assert!(loader.fail("walk.vmd", "404"));
        assert!(!loader.fail("walk.vmd", "404"));
        assert!(matches!(clip.poll(), Some(Err(AssetError::Rejected { .. }))));

        loader.complete_all();
        assert_eq!(model.poll(), Some(Ok(Vec::new())));
    }

    #[test]
    fn test_file_loader_missing_file() {
        let loader = FileAssetLoader::new(std::env::temp_dir());
        let mut ticket = loader.load("scene-extra-definitely-missing.glb");
        let result = loop {
            if let Some(result) = ticket.poll() {
                break result;
            }
            thread::yield_now();
        };
        assert!(matches!(result, Err(AssetError::NotFound(_))));
    }
}

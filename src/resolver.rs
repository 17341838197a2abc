//! Entry resolution: entry identifier -> server script body + client URL.

use crate::error::ResolveError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Maps an entry identifier to the script to execute and the client bundle.
pub trait Resolver {
    /// Literal source of the server bundle for `entry`.
    fn server_script(&self, entry: &str) -> Result<String, ResolveError>;

    /// URL of the client bundle for `entry`, if there is one.
    fn client_script_url(&self, entry: &str) -> Option<String>;
}

/// A resolver reading `<entry>-server.js` from a scripts directory and
/// pointing the client at `<public_path>/<entry>-client.js`.
///
/// Reads are confined to the scripts directory: paths are canonicalized,
/// so `..` segments and symlinks cannot escape it.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    public_path: String,
}

impl PathResolver {
    /// Create a resolver for `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>, public_path: impl Into<String>) -> Result<Self, ResolveError> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|source| ResolveError::InvalidRoot {
            path: root.to_path_buf(),
            source,
        })?;

        if !canonical.is_dir() {
            return Err(ResolveError::InvalidRoot {
                path: root.to_path_buf(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "not a directory"),
            });
        }

        Ok(Self {
            root: canonical,
            public_path: public_path.into(),
        })
    }

    /// Path the server script for `entry` is expected at.
    pub fn server_script_path(&self, entry: &str) -> PathBuf {
        self.root.join(format!("{}-server.js", entry.trim_matches('/')))
    }
}

impl Resolver for PathResolver {
    fn server_script(&self, entry: &str) -> Result<String, ResolveError> {
        let path = self.server_script_path(entry);

        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ResolveError::NotFound { path });
            }
            Err(source) => return Err(ResolveError::NotReadable { path, source }),
        };

        if !canonical.starts_with(&self.root) {
            return Err(ResolveError::OutsideRoot { path });
        }

        std::fs::read_to_string(&canonical).map_err(|source| ResolveError::NotReadable { path, source })
    }

    fn client_script_url(&self, entry: &str) -> Option<String> {
        Some(format!(
            "{}/{}-client.js",
            self.public_path.trim_end_matches('/'),
            entry.trim_matches('/')
        ))
    }
}

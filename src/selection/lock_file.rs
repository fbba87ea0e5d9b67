use bitcoin::OutPoint;
use std::{
    collections::BTreeSet,
    ffi::OsString,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// File name of the lock list inside the data directory.
pub const DEFAULT_LOCK_FILE: &str = "locked-outputs.txt";

/// Where a lock set is persisted. One `txid:vout` per line, `#` starts a comment.
///
/// Holds no outpoints itself: the [`SelectionStore`](super::SelectionStore) owns the lock
/// set, this only reads and replaces its on-disk copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Lock file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lock file named by the `lock_file` config value.
    ///
    /// Blank selects [`DEFAULT_LOCK_FILE`]. Relative names live under `data_dir`.
    pub fn from_config(data_dir: &Path, configured: &str) -> Self {
        let name = configured.trim().trim_matches('"');
        let name = if name.is_empty() { DEFAULT_LOCK_FILE } else { name };
        // `join` keeps absolute paths as they are.
        Self::new(data_dir.join(name))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted lock set. A missing file is an empty set.
    pub fn read(&self) -> io::Result<BTreeSet<OutPoint>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e),
        };

        let locked = contents
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, entry)| !entry.is_empty() && !entry.starts_with('#'))
            .map(|(line_number, entry)| {
                entry.parse::<OutPoint>().map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "{}:{}: bad outpoint '{}': {}",
                            self.path.display(),
                            line_number,
                            entry,
                            e
                        ),
                    )
                })
            })
            .collect::<io::Result<BTreeSet<_>>>()?;

        log::debug!("Read {} locks from {}", locked.len(), self.path.display());
        Ok(locked)
    }

    /// Replaces the persisted lock set.
    ///
    /// The list is written to a sibling temp file and renamed over the old one, so a
    /// crash leaves either the old or the new list, never a truncated one.
    pub fn write(&self, locked: &BTreeSet<OutPoint>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path();
        let result = Self::write_list(&staging, locked)
            .and_then(|()| fs::rename(&staging, &self.path));
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result
    }

    fn write_list(path: &Path, locked: &BTreeSet<OutPoint>) -> io::Result<()> {
        let mut file = File::create(path)?;
        for outpoint in locked {
            writeln!(file, "{outpoint}")?;
        }
        file.sync_all()
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(DEFAULT_LOCK_FILE));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

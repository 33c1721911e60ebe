//! Read-through cache of small text resources used by plugins.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{FileError, FileResult};

/// Bytes counted per line for the terminator used on reassembly.
const TERMINATOR: &str = "\r\n";

/// A text resource split into lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    lines: Arc<[String]>,
    total_size: usize,
}

impl CachedFile {
    fn from_lines(lines: Arc<[String]>) -> Self {
        let total_size = lines.iter().map(|l| l.len() + TERMINATOR.len()).sum();
        Self { lines, total_size }
    }

    fn parse(text: &str) -> Self {
        Self::from_lines(text.lines().map(str::to_owned).collect())
    }

    /// Returns the lines without terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Size of the reassembled text in bytes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Reassembles the text, ending every line with `\r\n`.
    ///
    /// Sources terminated by a bare `\n` do not round-trip byte for byte.
    pub fn text(&self) -> String {
        let mut buffer = String::with_capacity(self.total_size);
        for line in self.lines.iter() {
            buffer.push_str(line);
            buffer.push_str(TERMINATOR);
        }
        buffer
    }
}

/// Name → lines map consulted before touching the filesystem.
#[derive(Debug, Default, Clone)]
pub struct FileCache {
    preloaded: HashMap<String, Arc<[String]>>,
}

impl FileCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every path once and stores it under its path string.
    pub fn with_preloaded<I, P>(paths: I) -> FileResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut cache = Self::new();
        for path in paths {
            cache.preload(path)?;
        }
        Ok(cache)
    }

    /// Reads `path` and caches its lines under the path string.
    ///
    /// Returns the number of lines read.
    pub fn preload(&mut self, path: impl AsRef<Path>) -> FileResult<usize> {
        let path = path.as_ref();
        let file = read(path)?;
        let key = path.to_string_lossy().into_owned();
        let count = file.line_count();
        debug!(path = %key, lines = count, "Preloaded file");
        self.preloaded.insert(key, file.lines);
        Ok(count)
    }

    /// Caches `text` under `name` without touching the filesystem.
    pub fn insert(&mut self, name: impl Into<String>, text: &str) {
        self.preloaded.insert(name.into(), CachedFile::parse(text).lines);
    }

    /// Returns `true` if `name` is served from the cache.
    pub fn contains(&self, name: &str) -> bool {
        self.preloaded.contains_key(name)
    }

    /// Number of cached resources.
    pub fn len(&self) -> usize {
        self.preloaded.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.preloaded.is_empty()
    }

    /// Returns the lines of `name`, from the cache if present and from the
    /// filesystem otherwise. Filesystem reads are not added to the cache.
    pub fn load(&self, name: &str) -> FileResult<CachedFile> {
        if let Some(lines) = self.preloaded.get(name) {
            trace!(name, "File served from cache");
            return Ok(CachedFile::from_lines(Arc::clone(lines)));
        }
        read(Path::new(name))
    }
}

/// Reads `path` line by line. Bytes that are not UTF-8 are replaced rather
/// than rejected, so Latin-1 text still loads.
fn read(path: &Path) -> FileResult<CachedFile> {
    let file = File::open(path).map_err(|e| FileError::from_io(PathBuf::from(path), e))?;
    let lines = BufReader::new(file)
        .split(b'\n')
        .map(|line| {
            line.map(|mut bytes| {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                String::from_utf8_lossy(&bytes).into_owned()
            })
        })
        .collect::<io::Result<Vec<String>>>()
        .map_err(|e| FileError::from_io(PathBuf::from(path), e))?;
    Ok(CachedFile::from_lines(lines.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_disk_counts_terminators() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "one\ntwo\n").unwrap();

        let cache = FileCache::new();
        let loaded = cache.load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.lines(), ["one", "two"]);
        assert_eq!(loaded.total_size(), 10);
        assert_eq!(loaded.text(), "one\r\ntwo\r\n");
        assert_eq!(loaded.text().len(), loaded.total_size());
    }

    #[test]
    fn test_non_utf8_file_loads_lossily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9 motd\r\nline two\n").unwrap();

        let loaded = FileCache::new().load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.lines(), ["caf\u{FFFD} motd", "line two"]);
        assert_eq!(loaded.total_size(), loaded.text().len());
        assert_eq!(loaded.total_size(), 23);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        let err = FileCache::new().load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, FileError::FileNotFound(p) if p == path));
    }

    #[test]
    fn test_directory_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileCache::new().load(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, FileError::FileNotReadable { .. }));
    }

    #[test]
    fn test_cache_wins_over_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "disk\n").unwrap();
        let name = file.path().to_str().unwrap().to_owned();

        let mut cache = FileCache::new();
        cache.insert(name.clone(), "cached\r\nlines");
        let loaded = cache.load(&name).unwrap();
        assert_eq!(loaded.lines(), ["cached", "lines"]);
        assert_eq!(loaded.total_size(), 15);
    }

    #[test]
    fn test_preload_reads_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "motd\n").unwrap();

        let cache = FileCache::with_preloaded([file.path()]).unwrap();
        let name = file.path().to_string_lossy().into_owned();
        assert!(cache.contains(&name));

        std::fs::write(file.path(), "changed\n").unwrap();
        assert_eq!(cache.load(&name).unwrap().lines(), ["motd"]);
    }

    #[test]
    fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let loaded = FileCache::new().load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.line_count(), 0);
        assert_eq!(loaded.text(), "");
    }
}

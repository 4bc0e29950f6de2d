//! Destinations for received files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Longest file name a [`DirectorySink`] will write, in bytes.
const MAX_NAME_LEN: usize = 200;

/// Where a download puts each finished file.
pub trait FileSink {
    /// Persist one file. Called once per file, in delivery order.
    fn store(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Writes files into a directory.
///
/// Names coming from the relay are reduced to a single safe path component.
/// Existing files are never overwritten; a ` (N)` suffix is added instead.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl DirectorySink {
    /// Sink into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            saved: Vec::new(),
        })
    }

    /// Paths written so far.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }
}

impl FileSink for DirectorySink {
    fn store(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = find_available_path(self.dir.join(sanitize_file_name(file_name)));
        fs::write(&path, bytes)?;
        self.saved.push(path);
        Ok(())
    }
}

/// Keeps files in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Received files as `(name, bytes)`, in delivery order.
    pub fn files(&self) -> &[(String, Vec<u8>)] {
        &self.files
    }

    /// Take the received files.
    pub fn into_files(self) -> Vec<(String, Vec<u8>)> {
        self.files
    }
}

impl FileSink for MemorySink {
    fn store(&mut self, file_name: &str, bytes: &[u8]) -> io::Result<()> {
        self.files.push((file_name.to_owned(), bytes.to_vec()));
        Ok(())
    }
}

/// Reduce a sender-chosen name to one harmless path component.
pub fn sanitize_file_name(name: &str) -> String {
    // Last component only: no directories, no traversal.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    let mut out: String = base
        .chars()
        .map(|ch| match ch {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();

    if out.len() > MAX_NAME_LEN {
        let mut cut = MAX_NAME_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }

    if out.is_empty() || out.chars().all(|c| c == '.') {
        return "file.bin".to_string();
    }
    out
}

/// First of `path`, `name (1).ext`, `name (2).ext`, ... that does not exist.
fn find_available_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file.bin")
        .to_string();

    // Hidden files keep their leading dot as part of the stem.
    let (stem, ext) = match file_name.char_indices().skip(1).find(|&(_, c)| c == '.') {
        Some((pos, _)) => file_name.split_at(pos),
        None => (file_name.as_str(), ""),
    };

    let mut counter = 1u32;
    loop {
        let candidate = parent.join(format!("{stem} ({counter}){ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("a<b>?.txt"), "a_b__.txt");
    }

    #[test]
    fn test_sanitize_degenerate_names() {
        assert_eq!(sanitize_file_name(""), "file.bin");
        assert_eq!(sanitize_file_name(".."), "file.bin");
        assert_eq!(sanitize_file_name("dir/"), "file.bin");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let out = sanitize_file_name(&long);
        assert!(out.len() <= MAX_NAME_LEN);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_directory_sink_never_overwrites() {
        let dir = tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path()).unwrap();
        sink.store("report.tar.gz", b"one").unwrap();
        sink.store("report.tar.gz", b"two").unwrap();
        sink.store("report.tar.gz", b"three").unwrap();

        let names: Vec<_> = sink
            .saved()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["report.tar.gz", "report (1).tar.gz", "report (2).tar.gz"]);
        assert_eq!(fs::read(&sink.saved()[1]).unwrap(), b"two");
    }

    #[test]
    fn test_hidden_file_collision() {
        let dir = tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path()).unwrap();
        sink.store(".env", b"a").unwrap();
        sink.store(".env", b"b").unwrap();
        assert_eq!(sink.saved()[1].file_name().unwrap(), ".env (1)");
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        sink.store("b", b"2").unwrap();
        sink.store("a", b"1").unwrap();
        assert_eq!(sink.files()[0].0, "b");
        assert_eq!(sink.into_files()[1], ("a".to_string(), b"1".to_vec()));
    }
}

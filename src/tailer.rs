/// Incremental reader for a log file another process is appending to.
///
/// Each poll checks the file size, reads only the bytes past the last offset,
/// and returns the newly completed lines. Bytes after the last newline are
/// held back until a later poll completes them, so a write torn mid-line is
/// never handed out early.
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed from the file so far (complete and pending).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read any growth since the last poll and return the complete lines,
    /// without their terminators, in file order.
    ///
    /// A file that does not exist yet counts as empty.
    pub fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "log file shrank, restarting from the beginning"
            );
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let read = file.take(len - self.offset).read_to_end(&mut self.pending)?;
        self.offset += read as u64;

        Ok(self.take_complete_lines())
    }

    /// Return whatever unterminated text is left. Only meaningful once the
    /// writer has exited and the tail can no longer grow.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

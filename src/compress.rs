//! Raw event log compression using zstd.
//!
//! With `run.compress_logs` enabled, each run's event log is compressed once
//! the run is over. Compressed logs are named `{name}.jsonl.zst` and remain
//! readable by `analyze`.

use std::path::{Path, PathBuf};

const ZSTD_LEVEL: i32 = 3;

/// Compress `path` to `{path}.zst` and remove the original.
///
/// The original is only removed after the compressed file is fully written.
pub fn compress_log(path: &Path) -> std::io::Result<PathBuf> {
    let mut dest = path.as_os_str().to_owned();
    dest.push(".zst");
    let dest = PathBuf::from(dest);

    let input = std::fs::read(path)?;
    let compressed = zstd::encode_all(input.as_slice(), ZSTD_LEVEL)?;
    std::fs::write(&dest, compressed)?;
    std::fs::remove_file(path)?;

    tracing::debug!(
        file = %dest.display(),
        original_bytes = input.len(),
        "compressed event log"
    );
    Ok(dest)
}

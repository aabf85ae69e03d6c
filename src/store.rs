use std::fs;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use tempfile::Builder;

use crate::error::SyndccError;
use crate::frame::Frame;

/// Writes `frame` as CSV next to `path` and persists it into place, so a
/// failed write leaves any previous file untouched.
pub fn write_frame_atomic(path: &Utf8Path, frame: &Frame) -> Result<(), SyndccError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SyndccError::Filesystem(err.to_string()))?;
    let temp = Builder::new()
        .prefix(".syndccutils")
        .suffix(".csv.tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SyndccError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        frame.write_csv(&mut writer)?;
        writer
            .flush()
            .map_err(|err| SyndccError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| SyndccError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}

pub fn read_frame(path: &Utf8Path) -> Result<Frame, SyndccError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| SyndccError::Filesystem(format!("read {path}: {err}")))?;
    Frame::read_csv(&content)
}

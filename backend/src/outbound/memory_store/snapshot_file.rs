//! JSON store dumps on disk, accessed through `cap_std`.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use cap_std::{ambient_authority, fs::Dir};
use thiserror::Error;

use super::StoreDump;

/// Failures reading or writing a dump file.
#[derive(Debug, Error)]
pub enum SnapshotFileError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot {path} is not a valid store dump: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a dump; a missing file yields an empty store.
pub fn read_dump(path: &Path) -> Result<StoreDump, SnapshotFileError> {
    let io_error = |source| SnapshotFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let (parent, file_name) = parent_and_file_name(path).map_err(io_error)?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
    let contents = match directory.read_to_string(Path::new(&file_name)) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(StoreDump::new()),
        Err(error) => return Err(io_error(error)),
    };
    serde_json::from_str(&contents).map_err(|source| SnapshotFileError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a dump as pretty-printed JSON, replacing any existing file.
pub fn write_dump(path: &Path, dump: &StoreDump) -> Result<(), SnapshotFileError> {
    let io_error = |source| SnapshotFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut encoded = serde_json::to_vec_pretty(dump).map_err(|source| SnapshotFileError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    encoded.push(b'\n');
    let (parent, file_name) = parent_and_file_name(path).map_err(io_error)?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
    directory.write(Path::new(&file_name), encoded).map_err(io_error)
}

fn parent_and_file_name(path: &Path) -> io::Result<(&Path, OsString)> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path must include a file name")
    })?;
    Ok((parent, file_name.to_os_string()))
}

//! Stage outputs handed between pipeline stages

use std::fmt;
use std::path::Path;

use tempfile::TempPath;
use zeroize::Zeroizing;

/// Output of one stage: an in-memory buffer or a scratch file.
///
/// Scratch files are deleted when the artifact is dropped.
pub enum Artifact {
    /// Buffer produced in process, wiped on drop
    Memory(Zeroizing<Vec<u8>>),
    /// Temporary file owned by this artifact
    File(TempPath),
}

impl Artifact {
    /// Wrap an in-memory buffer
    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Memory(Zeroizing::new(bytes.into()))
    }

    /// Take ownership of a scratch file
    pub fn file(path: TempPath) -> Self {
        Self::File(path)
    }

    /// Path of a file-backed artifact
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory(_) => None,
            Self::File(path) => Some(&**path),
        }
    }

    /// Read the artifact's full contents
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Memory(bytes) => Ok(bytes.to_vec()),
            Self::File(path) => tokio::fs::read(path).await,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
            Self::File(path) => f.debug_tuple("File").field(&path.display()).finish(),
        }
    }
}

//! CA serial-number counter persisted next to the CA files

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Length of a freshly created serial, the RFC 5280 maximum
const NEW_SERIAL_LEN: usize = 20;

/// The `<base>.srl` counter.
///
/// The file holds one upper-case hex serial followed by a newline, the same
/// format the openssl `x509 -CAserial` option reads and writes. Every access
/// goes through [`SerialStore::lock`] so two issuances never see the same value.
#[derive(Debug)]
pub struct SerialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SerialStore {
    /// Counter backed by `path`, which does not need to exist yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the counter file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take exclusive access to the counter
    pub async fn lock(&self) -> SerialGuard<'_> {
        SerialGuard {
            path: &self.path,
            _guard: self.lock.lock().await,
        }
    }
}

/// Exclusive access to the serial counter, released on drop
#[derive(Debug)]
pub struct SerialGuard<'a> {
    path: &'a Path,
    _guard: MutexGuard<'a, ()>,
}

impl SerialGuard<'_> {
    /// Location of the counter file
    pub fn path(&self) -> &Path {
        self.path
    }

    /// Whether the counter file has been created
    pub async fn exists(&self) -> io::Result<bool> {
        tokio::fs::try_exists(self.path).await
    }

    /// Reserve the next serial and persist it.
    ///
    /// Continues an existing counter by adding one; otherwise starts from a
    /// random positive 160-bit value and creates the file.
    pub async fn allocate(&mut self) -> io::Result<Vec<u8>> {
        let next = match tokio::fs::read_to_string(self.path).await {
            Ok(content) => increment(&parse_serial(&content)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No serial file at {}, starting a new one", self.path.display());
                random_serial()?
            }
            Err(err) => return Err(err),
        };

        tokio::fs::write(self.path, format!("{}\n", hex::encode_upper(&next))).await?;
        Ok(next)
    }
}

/// Decode the hex serial stored in a counter file
pub(crate) fn parse_serial(content: &str) -> io::Result<Vec<u8>> {
    let digits = content.trim();
    if digits.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "serial file is empty"));
    }

    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{digits}");
        padded.as_str()
    } else {
        digits
    };

    hex::decode(digits).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("serial file is not hex: {e}"))
    })
}

/// Big-endian increment, growing by one byte on overflow
pub(crate) fn increment(serial: &[u8]) -> Vec<u8> {
    let mut next = serial.to_vec();
    for byte in next.iter_mut().rev() {
        let (value, overflow) = byte.overflowing_add(1);
        *byte = value;
        if !overflow {
            return next;
        }
    }
    next.insert(0, 1);
    next
}

fn random_serial() -> io::Result<Vec<u8>> {
    let mut serial = [0u8; NEW_SERIAL_LEN];
    getrandom::fill(&mut serial).map_err(|e| io::Error::other(e.to_string()))?;
    // positive, and no leading zero byte to strip
    serial[0] &= 0x7f;
    serial[0] |= 0x40;
    Ok(serial.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn trimmed(value: u128) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        bytes[start..].to_vec()
    }

    #[test]
    fn increment_carries() {
        assert_eq!(increment(&[0x01, 0xff]), vec![0x02, 0x00]);
        assert_eq!(increment(&[0xff, 0xff]), vec![0x01, 0x00, 0x00]);
    }

    #[test]
    fn parse_accepts_odd_length_and_newline() {
        assert_eq!(parse_serial("ABC\n").unwrap(), vec![0x0a, 0xbc]);
        assert!(parse_serial("\n").is_err());
        assert!(parse_serial("XYZ").is_err());
    }

    proptest! {
        #[test]
        fn increment_adds_one(value in 0u128..u128::MAX / 2) {
            prop_assert_eq!(increment(&trimmed(value)), trimmed(value + 1));
        }
    }

    #[tokio::test]
    async fn allocate_creates_then_continues() {
        let dir = tempfile::tempdir().unwrap();
        let store = SerialStore::new(dir.path().join("rootCA.srl"));

        let mut guard = store.lock().await;
        assert!(!guard.exists().await.unwrap());
        let first = guard.allocate().await.unwrap();
        assert_eq!(first.len(), NEW_SERIAL_LEN);
        assert_eq!(first[0] & 0xc0, 0x40);
        assert!(guard.exists().await.unwrap());

        let second = guard.allocate().await.unwrap();
        assert_eq!(second, increment(&first));
        drop(guard);

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(on_disk, format!("{}\n", hex::encode_upper(&second)));
    }

    #[tokio::test]
    async fn allocate_continues_openssl_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rootCA.srl");
        std::fs::write(&path, "5E3A0F\n").unwrap();

        let store = SerialStore::new(&path);
        let next = store.lock().await.allocate().await.unwrap();
        assert_eq!(next, vec![0x5e, 0x3a, 0x10]);
    }
}

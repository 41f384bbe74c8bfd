//! Owner-only files for private keys

use std::io;
use std::path::Path;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Write `data` to `path` with mode 0600 from the moment the file exists.
///
/// With `create_new` an existing file is an error. Otherwise an existing file
/// is narrowed to 0600 before it is truncated and rewritten.
pub(crate) async fn write_owner_only(path: &Path, data: &[u8], create_new: bool) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true);
    }
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }
    file.set_len(0).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

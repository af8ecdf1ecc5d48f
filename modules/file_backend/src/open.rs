//! Opening log and superblock files, with the directio-downgrade retry
//! (§C.3): "directio open retries without the flag and the configuration is
//! silently downgraded" — here surfaced as a `bool` the caller folds back
//! into the live config tree rather than silent, since §4.7 requires
//! `get_config` to reflect reality ("Automatically downgraded with a
//! warning if the device rejects it").

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use bake_common::error::BakeError;

/// Opens `path` read/write, creating it if absent. Tries O_DIRECT first
/// when `want_directio` is set; on failure (common on tmpfs/overlayfs,
/// where O_DIRECT is rejected with EINVAL) retries without it and reports
/// the downgrade via the returned bool.
pub fn open_rw(path: &Path, want_directio: bool) -> Result<(File, bool), BakeError> {
    if want_directio {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true).custom_flags(libc::O_DIRECT);
        match opts.open(path) {
            Ok(f) => return Ok((f, true)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "O_DIRECT rejected by device, downgrading to buffered I/O"
                );
            }
        }
    }
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| BakeError::Io(format!("open {}: {e}", path.display())))?;
    Ok((f, false))
}

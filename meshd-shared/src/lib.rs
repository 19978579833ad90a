pub use anyhow::Error;
use std::{
    fs::{File, Permissions},
    io,
    os::unix::fs::PermissionsExt,
    path::Path,
};

pub mod config;
pub mod peer;

pub use config::{AgentConfig, ConfigError};
pub use peer::{Peer, PeerDecodeError, PublicKey};

pub trait IoErrorContext<T> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> Result<T, WrappedIoError>;
    fn with_str<S: Into<String>>(self, context: S) -> Result<T, WrappedIoError>;
}

impl<T> IoErrorContext<T> for Result<T, io::Error> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> Result<T, WrappedIoError> {
        self.with_str(path.as_ref().to_string_lossy())
    }

    fn with_str<S: Into<String>>(self, context: S) -> Result<T, WrappedIoError> {
        self.map_err(|e| WrappedIoError {
            io_error: e,
            context: context.into(),
        })
    }
}

#[derive(Debug)]
pub struct WrappedIoError {
    io_error: io::Error,
    context: String,
}

impl std::fmt::Display for WrappedIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.context, self.io_error)
    }
}

impl std::ops::Deref for WrappedIoError {
    type Target = io::Error;

    fn deref(&self) -> &Self::Target {
        &self.io_error
    }
}

impl std::error::Error for WrappedIoError {}

/// Warns (but doesn't fail) if a file is readable or writable by anyone but its owner.
///
/// Used on the private key file, which has no business being group- or world-readable.
pub fn warn_on_dangerous_mode(path: &Path) -> Result<(), io::Error> {
    let file = File::open(path)?;
    let mode = file.metadata()?.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        log::warn!(
            "{} is accessible by users other than its owner (mode is {:#05o}). This is probably not what you want.",
            path.to_string_lossy(),
            mode
        );
    }
    Ok(())
}

/// Updates the permissions of a file. Returns `Ok(true)` if permissions had to be
/// changed, `Ok(false)` if they were already correct.
pub fn chmod(file: &File, new_mode: u32) -> Result<bool, io::Error> {
    let metadata = file.metadata()?;
    let mut permissions = metadata.permissions();
    let mode = permissions.mode() & 0o777;
    let updated = if mode != new_mode {
        permissions.set_mode(new_mode);
        file.set_permissions(permissions)?;
        true
    } else {
        false
    };

    Ok(updated)
}

pub fn set_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    std::fs::set_permissions(path, Permissions::from_mode(mode))
}

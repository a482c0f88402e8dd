//! On-disk module encoding.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "PVMD"
//! 4       2     format version (u16 LE)
//! 6       2     flags (u16 LE, reserved)
//! 8       8     payload length (u64 LE)
//! 16      32    BLAKE3 of payload
//! 48      ..    JSON payload
//! ```

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Module;

pub const MAGIC: &[u8; 4] = b"PVMD";
/// Bumped whenever the payload layout changes; older artifacts are stale.
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 48;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("cannot access module `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("not a module (bad magic)")]
    BadMagic,

    #[error("module is truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("module checksum mismatch")]
    ChecksumMismatch,

    #[error("module format version {found} is not supported (expected {FORMAT_VERSION})")]
    UnsupportedVersion { found: u16 },

    #[error("module payload is malformed")]
    Decode(#[from] serde_json::Error),
}

/// Encode a module with header and checksum.
pub fn to_bytes(module: &Module) -> Result<Vec<u8>, ModuleError> {
    let payload = serde_json::to_vec(module)?;
    let checksum = blake3::hash(&payload);

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(checksum.as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode and verify a module.
pub fn from_bytes(bytes: &[u8]) -> Result<Module, ModuleError> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(ModuleError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(ModuleError::Truncated {
            expected: HEADER_LEN,
            found: bytes.len(),
        });
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(ModuleError::UnsupportedVersion { found: version });
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[8..16]);
    let payload_len = usize::try_from(u64::from_le_bytes(len)).unwrap_or(usize::MAX);
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != payload_len {
        return Err(ModuleError::Truncated {
            expected: HEADER_LEN.saturating_add(payload_len),
            found: bytes.len(),
        });
    }

    if blake3::hash(payload).as_bytes() != &bytes[16..HEADER_LEN] {
        return Err(ModuleError::ChecksumMismatch);
    }

    Ok(serde_json::from_slice(payload)?)
}

pub fn read(path: &Path) -> Result<Module, ModuleError> {
    let bytes = fs::read(path).map_err(|e| ModuleError::Io(path.to_path_buf(), e))?;
    from_bytes(&bytes)
}

/// Write a module atomically (temporary sibling, then rename).
pub fn write(path: &Path, module: &Module) -> Result<(), ModuleError> {
    write_bytes(path, &to_bytes(module)?)
}

/// Atomically replace `path` with `bytes`.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), ModuleError> {
    let io_err = |e| ModuleError::Io(path.to_path_buf(), e);

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    if result.is_err() {
        _ = fs::remove_file(&tmp);
    }
    result.map_err(io_err)
}

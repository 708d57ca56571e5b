//! Serde representation for paths that may not be valid Unicode.
//!
//! Unicode paths are written as plain strings. Anything else is written as
//! the raw platform encoding (bytes on Unix, UTF-16 units on Windows), so
//! every path read back compares equal to the one written.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    #[cfg(unix)]
    Bytes(Vec<u8>),
    #[cfg(windows)]
    Wide(Vec<u16>),
}

pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    let repr = match path.to_str() {
        Some(text) => Repr::Text(text.to_string()),
        None => raw(path),
    };
    repr.serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
    let os: OsString = match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text.into(),
        #[cfg(unix)]
        Repr::Bytes(bytes) => {
            use std::os::unix::ffi::OsStringExt;
            OsString::from_vec(bytes)
        }
        #[cfg(windows)]
        Repr::Wide(units) => {
            use std::os::windows::ffi::OsStringExt;
            OsString::from_wide(&units)
        }
    };
    Ok(PathBuf::from(os))
}

#[cfg(unix)]
fn raw(path: &Path) -> Repr {
    use std::os::unix::ffi::OsStrExt;
    Repr::Bytes(path.as_os_str().as_bytes().to_vec())
}

#[cfg(windows)]
fn raw(path: &Path) -> Repr {
    use std::os::windows::ffi::OsStrExt;
    Repr::Wide(path.as_os_str().encode_wide().collect())
}

#[cfg(not(any(unix, windows)))]
fn raw(path: &Path) -> Repr {
    Repr::Text(path.to_string_lossy().into_owned())
}

/// Serialize a path as a lossy display string, for reports read by people
/// and by tools that expect text.
pub fn serialize_lossy<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

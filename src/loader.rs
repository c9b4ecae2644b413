//! Loading contract code and interface files.
//!
//! Local paths are read from disk. `http://` and `https://` sources are fetched
//! when the crate is built with the `remote` feature.

use std::io;
use std::path::Path;

use log::debug;

use crate::error::{Result, SimError};

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Raw bytes of `source`.
pub fn load(source: &str) -> Result<Vec<u8>> {
    if is_remote(source) {
        return fetch(source);
    }
    debug!("loading {}", source);
    Ok(std::fs::read(Path::new(source))?)
}

/// Text content of `source`.
pub fn load_text(source: &str) -> Result<String> {
    let bytes = load(source)?;
    String::from_utf8(bytes).map_err(|e| SimError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Like [`load_text`], but a missing local file yields `None`.
pub fn load_text_optional(source: &str) -> Result<Option<String>> {
    match load_text(source) {
        Ok(text) => Ok(Some(text)),
        Err(SimError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(feature = "remote")]
fn fetch(url: &str) -> Result<Vec<u8>> {
    debug!("fetching {}", url);
    let to_io = |e: reqwest::Error| SimError::Io(io::Error::new(io::ErrorKind::Other, e));
    let response = reqwest::blocking::get(url).map_err(to_io)?;
    let response = response.error_for_status().map_err(to_io)?;
    Ok(response.bytes().map_err(to_io)?.to_vec())
}

#[cfg(not(feature = "remote"))]
fn fetch(url: &str) -> Result<Vec<u8>> {
    Err(SimError::Io(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot fetch {url}: built without the `remote` feature"),
    )))
}

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::Utc;

use crate::error::{BalancerError, Result};

pub const CHUNK_SIZE: usize = 1024;

/// `Location` value used when a response redirects nowhere.
pub const NO_LOCATION: &str = "NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    MovedPermanently,
    ServiceUnavailable,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::MovedPermanently => 301,
            Status::ServiceUnavailable => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::MovedPermanently => "Moved Permanently",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

fn header_block(status: Status, content_length: u64, location: &str) -> String {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 {} {}\r\nDate: {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nLocation: {}\r\n\r\n",
        status.code(),
        status.reason(),
        date,
        content_length,
        location
    )
}

/// Writes the status line and headers, then the page at `file` as body.
///
/// The page is opened before anything is written, so a missing page leaves
/// the connection untouched and returns [`BalancerError::MissingAsset`].
pub fn send_response<W: Write + ?Sized>(
    writer: &mut W,
    status: Status,
    file: &Path,
    location: &str,
) -> Result<()> {
    let missing = |source| BalancerError::MissingAsset {
        path: file.to_path_buf(),
        source,
    };
    let mut page = File::open(file).map_err(missing)?;
    let size = page.metadata().map_err(missing)?.len();

    writer.write_all(header_block(status, size, location).as_bytes())?;

    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = page.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        writer.write_all(&chunk[..n])?;
    }
    writer.flush()?;

    Ok(())
}

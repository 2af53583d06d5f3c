//! Just enough HTTP/1.1 to talk to backends and clients over a raw stream.

use std::io::{self, Read};

/// Reads one line a byte at a time. CR bytes are dropped and the LF
/// terminator is not returned. End of input ends the line, so a closed
/// connection yields whatever was accumulated (possibly an empty string).
pub fn read_line<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => match byte[0] {
                b'\r' => {}
                b'\n' => break,
                b => line.push(b),
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Reads header lines up to and including the blank separator line.
pub fn read_headers<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<String>> {
    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            return Ok(headers);
        }
        headers.push(line);
    }
}

/// Raw value of the `Content-Length` header, if one is present.
pub fn content_length(headers: &[String]) -> Option<&str> {
    headers.iter().find_map(|header| {
        let (name, value) = header.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// Second token of a response status line, e.g. `200`.
pub fn status_code(status_line: &str) -> Option<&str> {
    status_line.split(' ').nth(1).filter(|code| !code.is_empty())
}

/// Second token of a request line, e.g. `/index.html`.
pub fn request_path(request_line: &str) -> Option<&str> {
    request_line.split_whitespace().nth(1)
}

pub fn strip_leading_slashes(path: &str) -> &str {
    path.trim_start_matches('/')
}

pub fn get_request(path: &str, host: &str, port: u16) -> String {
    format!("GET {} HTTP/1.1\r\nHost: {}:{}\r\n\r\n", path, host, port)
}

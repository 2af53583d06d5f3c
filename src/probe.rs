//! Measuring how long a backend takes to hand over the test file.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::backend::Backend;
use crate::error::ProbeError;
use crate::protocol::{content_length, get_request, read_headers, read_line, status_code};
use crate::transport::Connector;

/// Elapsed transfer time on success.
pub type ProbeResult = Result<Duration, ProbeError>;

pub trait Prober {
    fn probe(&self, backend: &Backend) -> ProbeResult;
}

/// Requests the test file over HTTP and times the full transfer, from before
/// the connection is opened until the last body byte arrives.
pub struct HttpProber<C> {
    connector: C,
    test_file: String,
}

impl<C: Connector> HttpProber<C> {
    pub fn new(connector: C, test_file: impl Into<String>) -> Self {
        HttpProber {
            connector,
            test_file: test_file.into(),
        }
    }

    fn exchange(&self, backend: &Backend, conn: &mut C::Conn) -> Result<(), ProbeError> {
        let request = get_request(&self.test_file, &backend.host, backend.port);
        conn.write_all(request.as_bytes())?;
        conn.flush()?;

        let status_line = read_line(conn)?;
        let code = status_code(&status_line)
            .ok_or_else(|| ProbeError::MalformedStatusLine(status_line.clone()))?
            .to_string();
        let headers = read_headers(conn)?;

        if code != "200" {
            warn!("❌ {} answered with an error: {}", backend, status_line);
            for header in &headers {
                warn!("   {}", header);
            }
            let length = match content_length(&headers) {
                Some(raw) => parse_length(raw)?,
                None => 0,
            };
            let body = read_body(conn, length)?;
            if !body.is_empty() {
                warn!("{}", String::from_utf8_lossy(&body));
            }
            return Err(ProbeError::Status(code));
        }

        let raw = content_length(&headers).ok_or(ProbeError::MissingContentLength)?;
        drain_body(conn, parse_length(raw)?)
    }
}

impl<C: Connector> Prober for HttpProber<C> {
    fn probe(&self, backend: &Backend) -> ProbeResult {
        info!("⏱️ Running performance test on {} ...", backend);
        let start = Instant::now();

        let mut conn = self.connector.connect(backend).map_err(ProbeError::Connect)?;
        self.exchange(backend, &mut conn)?;

        let elapsed = start.elapsed();
        info!("✅ {} delivered {} in {:?}", backend, self.test_file, elapsed);
        Ok(elapsed)
    }
}

fn parse_length(raw: &str) -> Result<u64, ProbeError> {
    raw.parse()
        .map_err(|_| ProbeError::InvalidContentLength(raw.to_string()))
}

/// Reads and discards exactly `expected` body bytes.
fn drain_body<R: Read>(reader: &mut R, expected: u64) -> Result<(), ProbeError> {
    let received = io::copy(&mut reader.take(expected), &mut io::sink())?;
    if received < expected {
        return Err(ProbeError::TruncatedBody { expected, received });
    }
    Ok(())
}

fn read_body<R: Read>(reader: &mut R, expected: u64) -> Result<Vec<u8>, ProbeError> {
    let mut body = Vec::new();
    let received = reader.take(expected).read_to_end(&mut body)? as u64;
    if received < expected {
        return Err(ProbeError::TruncatedBody { expected, received });
    }
    Ok(body)
}

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backend::Backend;
use crate::config::BalancerConfig;
use crate::error::Result;
use crate::probe::Prober;
use crate::protocol::{read_headers, read_line, request_path, strip_leading_slashes};
use crate::ranking::{rank, RankedPool};
use crate::response::{send_response, Status, NO_LOCATION};
use crate::selection::choose;

/// Owns the configured backends and the current ranked pool, and serves
/// clients one at a time between ranking passes.
pub struct Balancer<P> {
    config: BalancerConfig,
    backends: Vec<Backend>,
    prober: P,
    pool: RankedPool,
    rng: StdRng,
    port: Arc<AtomicU16>,
}

impl<P: Prober> Balancer<P> {
    pub fn new(config: BalancerConfig, backends: Vec<Backend>, prober: P) -> Self {
        Balancer {
            config,
            backends,
            prober,
            pool: RankedPool::default(),
            rng: StdRng::from_entropy(),
            port: Arc::new(AtomicU16::new(0)),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn pool(&self) -> &RankedPool {
        &self.pool
    }

    /// Port currently accepting clients, 0 while ranking or between cycles.
    pub fn port_handle(&self) -> Arc<AtomicU16> {
        self.port.clone()
    }

    /// Probes every configured backend and replaces the pool with the result.
    pub fn rerank(&mut self) {
        info!("🔍 Running performance test on {} backends", self.backends.len());
        self.pool = rank(&self.prober, &self.backends);
        info!("🏁 Performance test complete, ready to accept client connections");
    }

    /// Binds a fresh listener on an OS-assigned port.
    pub fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind((self.config.bind_host.as_str(), 0))?;
        listener.set_nonblocking(true)?;
        info!(
            "📡 Load balancer waiting for client connections on port {}",
            listener.local_addr()?.port()
        );
        Ok(listener)
    }

    /// Rank, listen until idle, repeat. Only returns if a listener cannot be
    /// bound.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.cycle()?;
            info!("⌛ Listener idle, re-evaluating backend performance");
        }
    }

    /// One re-evaluation cycle: rank with no listener open, bind a new
    /// ephemeral port, serve until idle, then release the port.
    pub fn cycle(&mut self) -> Result<()> {
        self.port.store(0, Ordering::Relaxed);
        self.rerank();

        let listener = self.bind()?;
        self.port.store(listener.local_addr()?.port(), Ordering::Relaxed);
        self.serve_until_idle(&listener);

        self.port.store(0, Ordering::Relaxed);
        drop(listener);
        Ok(())
    }

    /// Accepts and serves clients until none has arrived for
    /// `idle_timeout`.
    pub fn serve_until_idle(&mut self, listener: &TcpListener) {
        self.accept_until_idle(|| listener.accept());
    }

    fn accept_until_idle<A>(&mut self, mut accept: A)
    where
        A: FnMut() -> io::Result<(TcpStream, SocketAddr)>,
    {
        let mut idle_since = Instant::now();
        loop {
            match accept() {
                Ok((stream, addr)) => {
                    info!("🤝 Accepted connection from {}", addr);
                    if let Err(e) = self.serve_connection(stream) {
                        error!("❌ Failed to serve {}: {}", addr, e);
                    }
                    idle_since = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // Every accept failure counts toward the idle timeout.
                    if e.kind() != io::ErrorKind::WouldBlock {
                        warn!("⚠️ Accept failed: {}", e);
                    }
                    if idle_since.elapsed() >= self.config.idle_timeout {
                        return;
                    }
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    fn serve_connection(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.config.client_timeout))?;
        self.handle_client(&mut stream)
    }

    /// Reads one request and answers it with a redirect to a ranked backend,
    /// or a 503 when the pool is empty.
    pub fn handle_client<S: Read + Write>(&mut self, stream: &mut S) -> Result<()> {
        let request = read_line(stream)?;
        info!("📨 Received request: {}", request);
        read_headers(stream)?;

        let path = match request_path(&request) {
            Some(path) => strip_leading_slashes(path),
            None => {
                warn!("⚠️ Request line has no path, closing connection");
                return Ok(());
            }
        };

        if self.pool.is_empty() {
            warn!("🚨 No backend available, responding with 503");
            return send_response(
                stream,
                Status::ServiceUnavailable,
                &self.config.unavailable_page,
                NO_LOCATION,
            );
        }

        let backend = choose(&self.pool, &mut self.rng);
        let location = backend.url_for(path);
        debug!("chose {} out of {} ranked backends", backend, self.pool.len());
        info!("↪️ Redirecting client to {}", location);
        send_response(
            stream,
            Status::MovedPermanently,
            &self.config.redirect_page,
            &location,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BalancerError, ProbeError};
    use crate::probe::tests::ScriptedConn;
    use crate::probe::ProbeResult;
    use crate::ranking::tests::FixedProber;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Over two backends `a` and `b`: the first pass ranks `b` ahead of
    /// `a`, later passes find `b` down.
    struct ShiftingProber {
        calls: Arc<AtomicUsize>,
    }

    impl Prober for ShiftingProber {
        fn probe(&self, backend: &Backend) -> ProbeResult {
            let pass = self.calls.fetch_add(1, Ordering::Relaxed) / 2;
            match (pass, backend.host.as_str()) {
                (0, "a") => Ok(Duration::from_millis(50)),
                (0, "b") => Ok(Duration::from_millis(10)),
                (_, "a") => Ok(Duration::from_millis(30)),
                _ => Err(ProbeError::Connect(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                ))),
            }
        }
    }

    struct Pages {
        _dir: TempDir,
        redirect: PathBuf,
        unavailable: PathBuf,
    }

    fn pages() -> Pages {
        let dir = TempDir::new().unwrap();
        let redirect = dir.path().join("301.html");
        let unavailable = dir.path().join("503.html");
        fs::write(&redirect, "<h1>Moved</h1>").unwrap();
        fs::write(&unavailable, "<h1>Unavailable</h1>").unwrap();
        Pages {
            _dir: dir,
            redirect,
            unavailable,
        }
    }

    fn config(pages: &Pages) -> BalancerConfig {
        BalancerConfig {
            redirect_page: pages.redirect.clone(),
            unavailable_page: pages.unavailable.clone(),
            ..BalancerConfig::default()
        }
    }

    fn respond(balancer: &mut Balancer<FixedProber>, request: &str) -> String {
        let mut conn = ScriptedConn::new(request.as_bytes());
        balancer.handle_client(&mut conn).unwrap();
        String::from_utf8(conn.written).unwrap()
    }

    #[test]
    fn test_redirects_to_only_backend() {
        let pages = pages();
        let c = Backend::new("h", 8123);
        let prober = FixedProber::default().with(&c, 10);
        let mut balancer = Balancer::new(config(&pages), vec![c], prober);
        balancer.rerank();

        let response = respond(
            &mut balancer,
            "GET /report.html HTTP/1.1\r\nHost: lb\r\nAccept: */*\r\n\r\n",
        );

        assert!(response.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(response.contains("\r\nLocation: http://h:8123/report.html\r\n"));
        assert!(response.ends_with("\r\n\r\n<h1>Moved</h1>"));
    }

    #[test]
    fn test_strips_every_leading_slash() {
        let pages = pages();
        let c = Backend::new("h", 1);
        let prober = FixedProber::default().with(&c, 10);
        let mut balancer = Balancer::new(config(&pages), vec![c], prober);
        balancer.rerank();

        let response = respond(&mut balancer, "GET ///foo/bar HTTP/1.1\r\n\r\n");
        assert!(response.contains("Location: http://h:1/foo/bar\r\n"));

        let response = respond(&mut balancer, "GET / HTTP/1.1\r\n\r\n");
        assert!(response.contains("Location: http://h:1/\r\n"));
    }

    #[test]
    fn test_empty_pool_answers_503() {
        let pages = pages();
        let x = Backend::new("x", 9);
        let mut balancer = Balancer::new(config(&pages), vec![x], FixedProber::default());
        balancer.rerank();
        assert!(balancer.pool().is_empty());

        let response = respond(&mut balancer, "GET /index.html HTTP/1.1\r\n\r\n");

        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(response.contains("\r\nLocation: NULL\r\n"));
        assert!(response.contains("\r\nContent-Length: 20\r\n"));
        assert!(response.ends_with("<h1>Unavailable</h1>"));
    }

    #[test]
    fn test_only_redirects_into_pool() {
        let pages = pages();
        let (a, b, c) = (Backend::new("a", 1), Backend::new("b", 2), Backend::new("c", 3));
        let prober = FixedProber::default().with(&a, 50).with(&c, 10);
        let mut balancer = Balancer::new(config(&pages), vec![a, b, c], prober)
            .with_rng(StdRng::seed_from_u64(9));
        balancer.rerank();
        assert_eq!(balancer.pool().len(), 2);

        for _ in 0..200 {
            let response = respond(&mut balancer, "GET /x HTTP/1.1\r\n\r\n");
            assert!(!response.contains("http://b:2/"));
            assert!(
                response.contains("http://a:1/x") || response.contains("http://c:3/x"),
                "{}",
                response
            );
        }
    }

    #[test]
    fn test_rerank_replaces_pool() {
        let pages = pages();
        let a = Backend::new("a", 1);
        let prober = FixedProber::default().with(&a, 5);
        let mut balancer = Balancer::new(config(&pages), vec![a.clone()], prober);

        assert!(balancer.pool().is_empty());
        balancer.rerank();
        balancer.rerank();
        assert_eq!(balancer.pool().backends(), &[a]);
        assert_eq!(balancer.prober.probed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_request_without_path_gets_no_response() {
        let pages = pages();
        let mut balancer = Balancer::new(config(&pages), vec![], FixedProber::default());
        let response = respond(&mut balancer, "NONSENSE\r\n\r\n");
        assert!(response.is_empty());
    }

    #[test]
    fn test_missing_page_is_an_error() {
        let pages = pages();
        let mut cfg = config(&pages);
        cfg.unavailable_page = PathBuf::from("/no/such/503.html");
        let mut balancer = Balancer::new(cfg, vec![], FixedProber::default());

        let mut conn = ScriptedConn::new(b"GET / HTTP/1.1\r\n\r\n");
        let err = balancer.handle_client(&mut conn).unwrap_err();
        assert!(matches!(err, BalancerError::MissingAsset { .. }));
        assert!(conn.written.is_empty());
    }

    #[test]
    fn test_serve_until_idle_returns_after_timeout() {
        let pages = pages();
        let cfg = BalancerConfig {
            idle_timeout: Duration::from_millis(150),
            poll_interval: Duration::from_millis(10),
            bind_host: "127.0.0.1".to_string(),
            ..config(&pages)
        };
        let mut balancer = Balancer::new(cfg, vec![], FixedProber::default());
        let listener = balancer.bind().unwrap();

        let start = Instant::now();
        balancer.serve_until_idle(&listener);
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_accept_errors_still_reach_idle_timeout() {
        let pages = pages();
        let cfg = BalancerConfig {
            idle_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
            ..config(&pages)
        };
        let mut balancer = Balancer::new(cfg, vec![], FixedProber::default());

        let mut attempts = 0;
        let start = Instant::now();
        balancer.accept_until_idle(|| {
            attempts += 1;
            Err(io::Error::new(io::ErrorKind::Other, "too many open files"))
        });

        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(attempts < 20, "accept retried {} times", attempts);
    }

    #[test]
    fn test_cycle_reranks_and_listens_on_fresh_port() {
        let pages = pages();
        let (a, b) = (Backend::new("a", 1), Backend::new("b", 2));
        let calls = Arc::new(AtomicUsize::new(0));
        let cfg = BalancerConfig {
            idle_timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(10),
            bind_host: "127.0.0.1".to_string(),
            ..config(&pages)
        };
        let prober = ShiftingProber {
            calls: calls.clone(),
        };
        let mut balancer = Balancer::new(cfg, vec![a.clone(), b.clone()], prober);
        let port = balancer.port_handle();

        balancer.cycle().unwrap();
        assert_eq!(balancer.pool().backends(), &[b.clone(), a.clone()]);
        assert_eq!(port.load(Ordering::Relaxed), 0);

        let client = thread::spawn(move || {
            let port = loop {
                match port.load(Ordering::Relaxed) {
                    0 => thread::sleep(Duration::from_millis(5)),
                    p => break p,
                }
            };
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream.write_all(b"GET /page.html HTTP/1.1\r\n\r\n").unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        balancer.cycle().unwrap();
        let response = client.join().unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 4);
        assert_eq!(balancer.pool().backends(), &[a]);
        assert!(!balancer.pool().contains(&b));
        assert!(response.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(response.contains("Location: http://a:1/page.html\r\n"), "{}", response);
    }
}

//! A redirecting load balancer. Backends are ranked by how fast they serve a
//! test file, and each client is answered with a 301 pointing at a backend
//! drawn with odds that favour the faster ranks.

pub mod backend;
pub mod config;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod ranking;
pub mod response;
pub mod selection;
pub mod server;
pub mod transport;

pub use backend::{parse_backends, Backend};
pub use config::BalancerConfig;
pub use error::{BalancerError, ProbeError};
pub use probe::{HttpProber, ProbeResult, Prober};
pub use ranking::{rank, RankedPool};
pub use selection::choose;
pub use server::Balancer;
pub use transport::{Connector, TcpConnector};

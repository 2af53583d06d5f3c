use log::{info, warn};

use crate::backend::Backend;
use crate::probe::Prober;

/// Backends that passed the latest probe pass, fastest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankedPool {
    backends: Vec<Backend>,
}

impl RankedPool {
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn contains(&self, backend: &Backend) -> bool {
        self.backends.contains(backend)
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }
}

impl FromIterator<Backend> for RankedPool {
    fn from_iter<I: IntoIterator<Item = Backend>>(iter: I) -> Self {
        RankedPool {
            backends: iter.into_iter().collect(),
        }
    }
}

/// Probes every backend once, in order, and ranks the survivors by transfer
/// time. Failed backends are left out until the next pass. Equal times keep
/// their input order.
pub fn rank<P: Prober + ?Sized>(prober: &P, backends: &[Backend]) -> RankedPool {
    let mut timed = Vec::with_capacity(backends.len());
    for backend in backends {
        match prober.probe(backend) {
            Ok(elapsed) => timed.push((backend, elapsed)),
            Err(e) => warn!("🚫 Removing {} from the pool: {}", backend, e),
        }
    }

    timed.sort_by_key(|&(_, elapsed)| elapsed);

    let pool: RankedPool = timed.into_iter().map(|(b, _)| b.clone()).collect();
    info!(
        "📊 Ranked {} of {} backends: [{}]",
        pool.len(),
        backends.len(),
        pool.backends()
            .iter()
            .map(Backend::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    pool
}

use rand::Rng;

use crate::backend::Backend;
use crate::ranking::RankedPool;

/// Picks a backend with linearly decreasing odds by rank: in a pool of `n`,
/// rank `i` is chosen with probability `(n - i) / (n(n+1)/2)`.
///
/// The pool must not be empty; callers answer with a 503 instead.
pub fn choose<'a, R: Rng>(pool: &'a RankedPool, rng: &mut R) -> &'a Backend {
    let n = pool.len();
    assert!(n > 0, "choose called on an empty pool");

    let total = n * (n + 1) / 2;
    let ticket = rng.gen_range(1..=total);
    &pool.backends()[rank_for_ticket(n, ticket)]
}

/// Maps a ticket in `1..=n(n+1)/2` to a rank. Rank `i` owns a run of
/// `n - i` consecutive tickets, with runs laid end to end from 1.
fn rank_for_ticket(n: usize, ticket: usize) -> usize {
    debug_assert!(
        n > 0 && (1..=n * (n + 1) / 2).contains(&ticket),
        "ticket {} outside 1..={} for {} ranks",
        ticket,
        n * (n + 1) / 2,
        n
    );
    let mut start = 1;
    for rank in 0..n {
        let width = n - rank;
        if ticket < start + width {
            return rank;
        }
        start += width;
    }
    n - 1
}

//! Candidate address enumeration.
//!
//! Two modes: random (permutation-backed sampling of the public IPv4 space)
//! and sequential (a strictly increasing walk from a starting address). Both
//! skip the non-routable and special-purpose ranges.

use crate::permute::Permutation;
use dragnet_common::{DragnetError, DragnetResult};
use ipnet::Ipv4Net;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::debug;

/// Ranges never emitted by the enumerator.
///
/// 172.16.0.0/12 and 169.254.0.0/16 are intentionally absent; the exclusion
/// set is fixed by the pipeline's downstream consumers.
pub static EXCLUDED_RANGES: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "127.0.0.0/8",
        "192.168.0.0/16",
        "224.0.0.0/4",
        "240.0.0.0/4",
    ]
    .iter()
    .map(|s| s.parse().unwrap())
    .collect()
});

/// Whether an address lies outside every excluded range.
#[must_use]
pub fn is_valid_public(addr: Ipv4Addr) -> bool {
    !EXCLUDED_RANGES.iter().any(|net| net.contains(&addr))
}

/// If `addr` falls inside an excluded range, the last address of that range.
fn excluded_block_end(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    EXCLUDED_RANGES
        .iter()
        .find(|net| net.contains(&addr))
        .map(|net| net.broadcast())
}

/// Attempt budget multiplier for random mode.
const MAX_ATTEMPTS_PER_IP: usize = 100;

/// Enumerates valid public IPv4 addresses.
///
/// The seed drives both the draw source and the permutation, so two
/// generators built with the same seed emit identical sequences.
pub struct IpGenerator {
    rng: StdRng,
    permutation: Permutation,
}

impl IpGenerator {
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed as u64),
            permutation: Permutation::new(seed),
        }
    }

    /// Emit `count` distinct valid public addresses, uniformly scattered.
    ///
    /// Draws 31-bit values, permutes them across the full 32-bit space and
    /// discards duplicates and excluded addresses. Fails if the attempt
    /// budget of `100 * count` runs out before `count` are accepted.
    pub fn random(&mut self, count: usize) -> DragnetResult<Vec<Ipv4Addr>> {
        let mut ips = Vec::with_capacity(count);
        let mut visited: HashSet<u32> = HashSet::with_capacity(count);

        let max_attempts = count.saturating_mul(MAX_ATTEMPTS_PER_IP);
        let mut attempts = 0usize;

        while ips.len() < count && attempts < max_attempts {
            attempts += 1;

            let draw: u32 = self.rng.random_range(0..1u32 << 31);
            let permuted = self.permutation.permute(draw);

            if !visited.insert(permuted) {
                continue;
            }

            let addr = Ipv4Addr::from(permuted);
            if !is_valid_public(addr) {
                continue;
            }

            ips.push(addr);
        }

        if ips.len() < count {
            debug!(produced = ips.len(), requested = count, "attempt budget exhausted");
            return Err(DragnetError::Exhausted {
                produced: ips.len(),
                requested: count,
            });
        }

        Ok(ips)
    }
}

/// Emit `count` valid public addresses walking upward from `start`.
///
/// Excluded ranges are skipped in one step to the end of the block. Running
/// past 255.255.255.255 before `count` addresses are produced is an error.
pub fn sequential(start: Ipv4Addr, count: usize) -> DragnetResult<Vec<Ipv4Addr>> {
    let mut ips = Vec::with_capacity(count);
    let mut cursor = u32::from(start);

    for _ in 0..count {
        // Skip forward past any excluded block the cursor landed in.
        while let Some(end) = excluded_block_end(Ipv4Addr::from(cursor)) {
            cursor = u32::from(end)
                .checked_add(1)
                .ok_or(DragnetError::AddressOverflow)?;
        }

        ips.push(Ipv4Addr::from(cursor));

        match cursor.checked_add(1) {
            Some(next) => cursor = next,
            None => {
                if ips.len() < count {
                    return Err(DragnetError::AddressOverflow);
                }
                break;
            }
        }
    }

    Ok(ips)
}

/// The address one past `last`, for threading sequential generation across
/// batches.
pub fn next_address(last: Ipv4Addr) -> DragnetResult<Ipv4Addr> {
    u32::from(last)
        .checked_add(1)
        .map(Ipv4Addr::from)
        .ok_or(DragnetError::AddressOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_ranges_rejected() {
        for bad in [
            "0.1.2.3",
            "10.0.0.1",
            "10.255.255.255",
            "127.0.0.1",
            "192.168.1.1",
            "224.0.0.1",
            "239.255.255.255",
            "240.0.0.1",
            "255.255.255.255",
        ] {
            assert!(!is_valid_public(bad.parse().unwrap()), "{bad} should be excluded");
        }
    }

    #[test]
    fn routable_ranges_accepted() {
        // 172.16/12 and 169.254/16 stay in-scope by contract.
        for good in ["1.1.1.1", "8.8.8.8", "9.9.9.9", "172.16.0.1", "169.254.1.1", "223.255.255.255"] {
            assert!(is_valid_public(good.parse().unwrap()), "{good} should be valid");
        }
    }

    #[test]
    fn random_emits_distinct_valid_addresses() {
        let mut generator = IpGenerator::new(0xDEAD_BEEF);
        let ips = generator.random(1000).unwrap();
        assert_eq!(ips.len(), 1000);

        let distinct: HashSet<&Ipv4Addr> = ips.iter().collect();
        assert_eq!(distinct.len(), 1000);

        for ip in &ips {
            assert!(is_valid_public(*ip), "{ip} in excluded range");
        }
    }

    #[test]
    fn random_deterministic_under_seed() {
        let mut a = IpGenerator::new(0xDEAD_BEEF);
        let mut b = IpGenerator::new(0xDEAD_BEEF);
        assert_eq!(a.random(1000).unwrap(), b.random(1000).unwrap());
    }

    #[test]
    fn random_different_seeds_differ() {
        let mut a = IpGenerator::new(1);
        let mut b = IpGenerator::new(2);
        assert_ne!(a.random(100).unwrap(), b.random(100).unwrap());
    }

    #[test]
    fn sequential_skips_excluded_block() {
        let ips = sequential("9.255.255.250".parse().unwrap(), 10).unwrap();
        let expected: Vec<Ipv4Addr> = [
            "9.255.255.250",
            "9.255.255.251",
            "9.255.255.252",
            "9.255.255.253",
            "9.255.255.254",
            "9.255.255.255",
            "11.0.0.0",
            "11.0.0.1",
            "11.0.0.2",
            "11.0.0.3",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
        assert_eq!(ips, expected);
    }

    #[test]
    fn sequential_strictly_increasing() {
        let ips = sequential("126.255.255.250".parse().unwrap(), 50).unwrap();
        assert_eq!(ips.len(), 50);
        for pair in ips.windows(2) {
            assert!(u32::from(pair[0]) < u32::from(pair[1]));
        }
        for ip in &ips {
            assert!(is_valid_public(*ip));
        }
    }

    #[test]
    fn sequential_start_inside_excluded_block() {
        let ips = sequential("10.4.5.6".parse().unwrap(), 2).unwrap();
        assert_eq!(ips[0], "11.0.0.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(ips[1], "11.0.0.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn sequential_overflow_is_error() {
        // 223.255.255.254 is the last valid address; everything above sits
        // in 224/4 and 240/4.
        let result = sequential("223.255.255.250".parse().unwrap(), 10);
        assert!(matches!(result, Err(DragnetError::AddressOverflow)));
    }

    #[test]
    fn sequential_zero_count() {
        assert!(sequential("1.2.3.4".parse().unwrap(), 0).unwrap().is_empty());
    }
}

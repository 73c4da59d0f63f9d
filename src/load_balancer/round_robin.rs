//! Round-robin backend selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

/// One generation of a backend list together with its counter.
///
/// The counter lives beside the list so that replacing the list resets the
/// counter in the same atomic swap.
#[derive(Debug)]
struct Rotation {
    backends: Vec<String>,
    counter: AtomicU64,
}

impl Rotation {
    fn new(backends: Vec<String>) -> Self {
        Self {
            backends,
            counter: AtomicU64::new(0),
        }
    }
}

/// Round-robin selector over a list of backend addresses.
///
/// `next` never blocks: it loads the current rotation and bumps its counter.
/// `update` swaps in a whole new rotation, so a concurrent `next` sees either
/// the old list or the new one, never a partially edited list.
#[derive(Debug)]
pub struct RoundRobin {
    rotation: ArcSwap<Rotation>,
}

impl RoundRobin {
    pub fn new(backends: Vec<String>) -> Self {
        Self {
            rotation: ArcSwap::from_pointee(Rotation::new(backends)),
        }
    }

    /// Next address in rotation, or `None` when the list is empty.
    pub fn next(&self) -> Option<String> {
        let rotation = self.rotation.load();
        let len = rotation.backends.len();
        if len == 0 {
            return None;
        }

        let ticket = rotation.counter.fetch_add(1, Ordering::Relaxed);
        let index = (ticket % len as u64) as usize;
        Some(rotation.backends[index].clone())
    }

    /// Replace the backend list and restart the rotation from the first entry.
    pub fn update(&self, backends: Vec<String>) {
        self.rotation.store(Arc::new(Rotation::new(backends)));
    }

    /// Snapshot of the current backend list.
    pub fn backends(&self) -> Vec<String> {
        self.rotation.load().backends.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn addrs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{}:80", i)).collect()
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new(vec!["b1".into(), "b2".into()]);
        assert_eq!(lb.next().unwrap(), "b1");
        assert_eq!(lb.next().unwrap(), "b2");
        assert_eq!(lb.next().unwrap(), "b1");
    }

    #[test]
    fn sequence_is_index_modulo_len() {
        for n in 1..=7 {
            let backends = addrs(n);
            let lb = RoundRobin::new(backends.clone());
            for i in 0..(n * 5 + 3) {
                assert_eq!(lb.next().unwrap(), backends[i % n]);
            }
        }
    }

    #[test]
    fn empty_list_returns_none() {
        let lb = RoundRobin::new(Vec::new());
        for _ in 0..10 {
            assert!(lb.next().is_none());
        }
    }

    #[test]
    fn update_resets_counter() {
        let lb = RoundRobin::new(addrs(3));
        lb.next();
        lb.next();

        let replacement = vec!["x:1".to_string(), "y:2".to_string()];
        lb.update(replacement.clone());
        assert_eq!(lb.backends(), replacement);
        assert_eq!(lb.next().unwrap(), "x:1");
        assert_eq!(lb.next().unwrap(), "y:2");

        lb.update(Vec::new());
        assert!(lb.next().is_none());
    }

    #[test]
    fn concurrent_callers_spread_uniformly() {
        let backends = addrs(4);
        let lb = Arc::new(RoundRobin::new(backends.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || (0..1000).map(|_| lb.next().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for addr in handle.join().unwrap() {
                *counts.entry(addr).or_default() += 1;
            }
        }

        // 8000 tickets over 4 backends with no lost or duplicated increments.
        for addr in &backends {
            assert_eq!(counts[addr], 2000);
        }
    }
}

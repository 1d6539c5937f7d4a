//! Periodic samples of how many packets a switch holds in its queues.

use crate::Cdf;
use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    sync::{Arc, Mutex},
};

#[derive(Debug, Default)]
struct Samples {
    switch: Vec<usize>,
    per_destination: Vec<usize>,
}

/// Log of queue occupancy, in packets.
///
/// Each call to [Occupancy::sample] records the total held by the switch and, separately, the
/// total held for each destination that has at least one queue. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct Occupancy {
    samples: Arc<Mutex<Samples>>,
}

impl Occupancy {
    /// Record one snapshot of the switch, given the destination and length of every live queue.
    pub fn sample<I>(&self, queues: I)
    where
        I: IntoIterator<Item = (Ipv4Addr, usize)>,
    {
        let mut total = 0;
        let mut destinations = BTreeMap::new();
        for (destination, len) in queues {
            total += len;
            *destinations.entry(destination).or_insert(0) += len;
        }

        let mut samples = self.samples.lock().unwrap();
        samples.switch.push(total);
        samples.per_destination.extend(destinations.into_values());
    }

    /// Returns the number of snapshots recorded.
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().switch.len()
    }

    /// Returns whether no snapshot was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distribution of the packets held by the whole switch per snapshot.
    pub fn cdf(&self) -> Cdf<usize> {
        Cdf::from_samples(self.samples.lock().unwrap().switch.iter().copied())
    }

    /// Distribution of the packets held for a single destination per snapshot.
    pub fn per_destination_cdf(&self) -> Cdf<usize> {
        Cdf::from_samples(self.samples.lock().unwrap().per_destination.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn test_groups_by_destination() {
        let occupancy = Occupancy::default();
        occupancy.sample([(A, 3), (B, 1), (A, 2)]);
        occupancy.sample([(B, 4)]);
        occupancy.sample(std::iter::empty());
        assert_eq!(occupancy.len(), 3);

        let switch: Vec<_> = occupancy.cdf().points().iter().map(|p| p.value).collect();
        assert_eq!(switch, vec![0, 4, 6]);

        let per_destination = occupancy.per_destination_cdf();
        assert_eq!(per_destination.total(), 3);
        let values: Vec<_> = per_destination.points().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1, 4, 5]);
    }

    #[test]
    fn test_export() {
        let occupancy = Occupancy::default();
        let clone = occupancy.clone();
        occupancy.sample([(A, 2)]);
        clone.sample([(A, 2), (B, 0)]);

        let mut buffer = Vec::new();
        occupancy.cdf().write(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "2 2 2 1\n");

        let mut buffer = Vec::new();
        occupancy.per_destination_cdf().write(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "0 1 1 0.3333333333333333\n2 2 3 1\n");
    }
}

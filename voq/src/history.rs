//! Append-only sample log and the empirical distribution built from it.

use crate::Error;
use std::{
    collections::BTreeMap,
    fmt::Display,
    io::Write,
    sync::{Arc, Mutex},
};

/// Ordered log of signed estimate-error samples, in nanoseconds.
///
/// Clones share the same log, so every queue in a simulation can append to it and the owner can
/// read it back at any time.
#[derive(Clone, Debug, Default)]
pub struct History {
    samples: Arc<Mutex<Vec<i64>>>,
}

impl History {
    /// Append a sample.
    pub fn record(&self, sample: i64) {
        self.samples.lock().unwrap().push(sample);
    }

    /// Returns the number of samples recorded.
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    /// Returns whether no sample was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of every sample, in the order they were recorded.
    pub fn snapshot(&self) -> Vec<i64> {
        self.samples.lock().unwrap().clone()
    }

    /// Build the empirical distribution of the samples recorded so far.
    pub fn cdf(&self) -> Cdf<i64> {
        Cdf::from_samples(self.samples.lock().unwrap().iter().copied())
    }
}

/// One distinct value of a [Cdf].
#[derive(Clone, Debug, PartialEq)]
pub struct Point<T> {
    pub value: T,
    /// Number of samples equal to `value`.
    pub count: u64,
    /// Number of samples less than or equal to `value`.
    pub cumulative: u64,
    /// Fraction of samples less than or equal to `value`.
    pub probability: f64,
}

/// Empirical cumulative distribution of a set of samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Cdf<T> {
    points: Vec<Point<T>>,
    total: u64,
}

impl<T: Ord + Copy + Display> Cdf<T> {
    /// Build the distribution of `samples`.
    pub fn from_samples<I: IntoIterator<Item = T>>(samples: I) -> Self {
        let mut counts = BTreeMap::new();
        for sample in samples {
            *counts.entry(sample).or_insert(0u64) += 1;
        }
        let total: u64 = counts.values().sum();

        let mut cumulative = 0;
        let points = counts
            .into_iter()
            .map(|(value, count)| {
                cumulative += count;
                Point {
                    value,
                    count,
                    cumulative,
                    probability: cumulative as f64 / total as f64,
                }
            })
            .collect();
        Self { points, total }
    }

    /// Returns the distinct values, in ascending order.
    pub fn points(&self) -> &[Point<T>] {
        &self.points
    }

    /// Returns the number of samples.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the smallest value `v` such that at least a fraction `q` of samples are `<= v`.
    ///
    /// Returns `None` if there are no samples or `q > 1`.
    pub fn quantile(&self, q: f64) -> Option<T> {
        self.points
            .iter()
            .find(|point| point.probability >= q)
            .map(|point| point.value)
    }

    /// Write one line per distinct value: `<value> <count> <cumulative> <probability>`.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), Error> {
        for point in &self.points {
            writeln!(
                writer,
                "{} {} {} {}",
                point.value, point.count, point.cumulative, point.probability
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_shared() {
        let history = History::default();
        let clone = history.clone();
        history.record(40);
        clone.record(-5);
        history.record(40);
        assert_eq!(history.len(), 3);
        assert_eq!(clone.snapshot(), vec![40, -5, 40]);
    }

    #[test]
    fn test_cdf() {
        let history = History::default();
        for sample in [3, -1, 3, 7] {
            history.record(sample);
        }
        let cdf = history.cdf();
        assert_eq!(cdf.total(), 4);
        assert_eq!(
            cdf.points(),
            &[
                Point {
                    value: -1,
                    count: 1,
                    cumulative: 1,
                    probability: 0.25
                },
                Point {
                    value: 3,
                    count: 2,
                    cumulative: 3,
                    probability: 0.75
                },
                Point {
                    value: 7,
                    count: 1,
                    cumulative: 4,
                    probability: 1.0
                },
            ]
        );
    }

    #[test]
    fn test_quantile() {
        let cdf = Cdf::from_samples([10u32, 20, 30, 40]);
        assert_eq!(cdf.quantile(0.0), Some(10));
        assert_eq!(cdf.quantile(0.5), Some(20));
        assert_eq!(cdf.quantile(0.51), Some(30));
        assert_eq!(cdf.quantile(1.0), Some(40));
        assert_eq!(cdf.quantile(1.5), None);
        assert_eq!(Cdf::<u32>::from_samples([]).quantile(0.5), None);
    }

    #[test]
    fn test_write() {
        let cdf = Cdf::from_samples([2usize, 1, 2, 2]);
        let mut buffer = Vec::new();
        cdf.write(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "1 1 1 0.25\n2 3 4 1\n");
    }

    #[test]
    fn test_write_empty() {
        let cdf = History::default().cdf();
        let mut buffer = Vec::new();
        cdf.write(&mut buffer).unwrap();
        assert!(buffer.is_empty());
    }
}

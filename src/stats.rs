//! Running per-dimension statistics and the feature-scaling helpers built on
//! top of them. This is the numeric-helpers leaf every solver and the
//! tensor layer's normalization code sits above (§2).

use crate::E;

const EPS: E = 1e-12;

/// Running `(N, Σx, Σx²)` accumulation for one dimension, finalized by
/// [`ScalarStats::done`] into `mean`/`stdev`/`1/range`/`1/stdev`.
#[derive(Debug, Clone, Default)]
pub struct ScalarStats {
    n: u64,
    min: E,
    max: E,
    sum: E,
    sum_sq: E,
    mean: E,
    stdev: E,
    inv_range: E,
    inv_stdev: E,
    finalized: bool,
}

impl ScalarStats {
    pub fn new() -> Self {
        Self {
            min: E::INFINITY,
            max: E::NEG_INFINITY,
            ..Default::default()
        }
    }

    pub fn push(&mut self, x: E) {
        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self.sum += x;
        self.sum_sq += x * x;
        self.finalized = false;
    }

    /// Finalizes `mean`/`stdev`/`1/range`/`1/stdev`. Safe to call more than
    /// once; a no-op once already finalized for the current sample set.
    pub fn done(&mut self) {
        if self.finalized {
            return;
        }
        if self.n == 0 {
            self.mean = 0.0;
            self.stdev = 0.0;
            self.inv_range = 1.0;
            self.inv_stdev = 1.0;
            self.finalized = true;
            return;
        }
        let n = self.n as E;
        self.mean = self.sum / n;
        self.stdev = if self.n > 1 {
            ((self.sum_sq - self.sum * self.sum / n) / (n - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        };
        let range = self.max - self.min;
        self.inv_range = 1.0 / range.max(EPS);
        self.inv_stdev = 1.0 / self.stdev.max(EPS);
        self.finalized = true;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> E {
        self.mean
    }

    pub fn stdev(&self) -> E {
        self.stdev
    }

    pub fn min(&self) -> E {
        self.min
    }

    pub fn max(&self) -> E {
        self.max
    }

    pub fn inv_range(&self) -> E {
        self.inv_range
    }

    pub fn inv_stdev(&self) -> E {
        self.inv_stdev
    }
}

/// Per-dimension feature-scaling strategy applied by [`scale`]/[`upscale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    /// `(x − mean) / range`
    MeanRange,
    /// `(x − min) / range`
    MinRange,
    /// `(x − mean) / stdev`
    Standard,
}

/// Scales `rows[d]` in place using the per-dimension stats in `stats[d]`.
/// Non-finite inputs are mapped to `0.0` after scaling.
pub fn scale(kind: ScaleKind, stats: &[ScalarStats], rows: &mut [Vec<E>]) {
    assert_eq!(stats.len(), rows.len());
    for (row, s) in rows.iter_mut().zip(stats) {
        let (shift, inv) = match kind {
            ScaleKind::MeanRange => (s.mean(), s.inv_range()),
            ScaleKind::MinRange => (s.min(), s.inv_range()),
            ScaleKind::Standard => (s.mean(), s.inv_stdev()),
        };
        for v in row.iter_mut() {
            let scaled = (*v - shift) * inv;
            *v = if scaled.is_finite() { scaled } else { 0.0 };
        }
    }
}

/// Inverts [`scale`]: reconstructs the original values from scaled ones.
pub fn upscale(kind: ScaleKind, stats: &[ScalarStats], rows: &mut [Vec<E>]) {
    assert_eq!(stats.len(), rows.len());
    for (row, s) in rows.iter_mut().zip(stats) {
        let (shift, inv) = match kind {
            ScaleKind::MeanRange => (s.mean(), s.inv_range()),
            ScaleKind::MinRange => (s.min(), s.inv_range()),
            ScaleKind::Standard => (s.mean(), s.inv_stdev()),
        };
        for v in row.iter_mut() {
            *v = *v / inv + shift;
        }
    }
}

/// Median via quickselect over a scratch copy; never mutates `values`.
pub fn median(values: &[E]) -> E {
    percentile(values, 0.5)
}

/// `p`-quantile (`p ∈ [0, 1]`) via quickselect over a scratch copy.
pub fn percentile(values: &[E], p: E) -> E {
    assert!(!values.is_empty());
    let mut scratch = values.to_vec();
    let rank = (((values.len() - 1) as E) * p).round() as usize;
    let (_, nth, _) = scratch.select_nth_unstable_by(rank, |a, b| a.partial_cmp(b).unwrap());
    *nth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_stats_matches_known_sample() {
        let mut s = ScalarStats::new();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            s.push(x);
        }
        s.done();
        assert!((s.mean() - 3.0).abs() < 1e-12);
        assert!((s.stdev() - 1.5811388300841898).abs() < 1e-9);
    }

    #[test]
    fn scalar_stats_collapses_to_identity_when_empty() {
        let mut s = ScalarStats::new();
        s.done();
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.inv_range(), 1.0);
        assert_eq!(s.inv_stdev(), 1.0);
    }

    #[test]
    fn scale_then_upscale_round_trips() {
        let mut s = ScalarStats::new();
        for x in [1.0, 2.0, 3.0, 4.0] {
            s.push(x);
        }
        s.done();
        let original = vec![1.0, 2.0, 3.0, 4.0];
        let mut rows = vec![original.clone()];
        scale(ScaleKind::Standard, &[s.clone()], &mut rows);
        upscale(ScaleKind::Standard, &[s], &mut rows);
        for (a, b) in original.iter().zip(&rows[0]) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn median_matches_sorted_middle() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
    }
}

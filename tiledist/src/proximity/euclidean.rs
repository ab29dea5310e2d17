//! Exact Euclidean proximity via the separable lower-envelope transform.
//!
//! Squared distances are computed in two 1-D passes (Felzenszwalb &
//! Huttenlocher): first down every column, then along every row using the
//! column result as the sampled function. Each pass is independent per
//! column/row and runs on the rayon pool. Anisotropic pixels are handled by
//! scaling sample positions by the pixel size of the pass's axis.
//!
//! Cells with no target anywhere in the grid stay at `+inf` through both
//! passes and are reported as the configured no-data sentinel.

use rayon::prelude::*;

use super::{ProximityError, ProximityKernel, ProximityOptions};
use crate::grid::Grid;

/// Exact Euclidean distance transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanKernel;

impl EuclideanKernel {
    pub fn new() -> Self {
        Self
    }
}

impl ProximityKernel for EuclideanKernel {
    fn name(&self) -> &str {
        "euclidean"
    }

    fn proximity(
        &self,
        input: &Grid,
        options: &ProximityOptions,
    ) -> Result<Vec<f64>, ProximityError> {
        options.validate()?;
        let (step_x, step_y) = options.spacing(input.meta())?;
        let width = input.width();
        let height = input.height();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let values = input.values();

        // Column pass, stored column-major.
        let mut columns = vec![f64::INFINITY; width * height];
        columns.par_chunks_mut(height).enumerate().for_each_init(
            || (Vec::with_capacity(height), LowerEnvelope::default()),
            |(samples, envelope), (x, column)| {
                samples.clear();
                samples.extend((0..height).map(|y| {
                    if options.is_target(values[y * width + x]) {
                        0.0
                    } else {
                        f64::INFINITY
                    }
                }));
                envelope.transform(samples, step_y, column);
            },
        );

        // Row pass, stored row-major.
        let mut squared = vec![f64::INFINITY; width * height];
        squared.par_chunks_mut(width).enumerate().for_each_init(
            || (Vec::with_capacity(width), LowerEnvelope::default()),
            |(samples, envelope), (y, row)| {
                samples.clear();
                samples.extend((0..width).map(|x| columns[x * height + y]));
                envelope.transform(samples, step_x, row);
            },
        );

        let max_distance = options.max_distance.unwrap_or(f64::INFINITY);
        Ok(squared
            .into_iter()
            .map(|d2| {
                let distance = d2.sqrt();
                if distance.is_finite() && distance <= max_distance {
                    distance
                } else {
                    options.nodata
                }
            })
            .collect())
    }
}

/// Scratch space for the 1-D lower envelope of parabolas.
#[derive(Debug, Default)]
struct LowerEnvelope {
    /// Sample index of each parabola in the envelope.
    sites: Vec<usize>,
    /// Left boundary (in ground units) of each parabola's interval.
    bounds: Vec<f64>,
}

impl LowerEnvelope {
    /// Writes `min_q (step * (p - q))^2 + f[q]` for every `p` into `out`.
    ///
    /// Infinite samples contribute no parabola; if every sample is infinite
    /// the output is all `+inf`.
    fn transform(&mut self, f: &[f64], step: f64, out: &mut [f64]) {
        debug_assert_eq!(f.len(), out.len());
        self.sites.clear();
        self.bounds.clear();

        for (q, &fq) in f.iter().enumerate() {
            if !fq.is_finite() {
                continue;
            }
            let pos_q = q as f64 * step;
            loop {
                let Some(&last) = self.sites.last() else {
                    self.sites.push(q);
                    self.bounds.push(f64::NEG_INFINITY);
                    break;
                };
                let pos_last = last as f64 * step;
                let crossing = ((fq + pos_q * pos_q) - (f[last] + pos_last * pos_last))
                    / (2.0 * (pos_q - pos_last));
                if let Some(&bound) = self.bounds.last() {
                    if crossing <= bound {
                        self.sites.pop();
                        self.bounds.pop();
                        continue;
                    }
                }
                self.sites.push(q);
                self.bounds.push(crossing);
                break;
            }
        }

        if self.sites.is_empty() {
            out.fill(f64::INFINITY);
            return;
        }

        let mut k = 0;
        for (p, slot) in out.iter_mut().enumerate() {
            let pos = p as f64 * step;
            while k + 1 < self.sites.len() && self.bounds[k + 1] < pos {
                k += 1;
            }
            let site = self.sites[k];
            let delta = pos - site as f64 * step;
            *slot = delta * delta + f[site];
        }
    }
}

use crate::common::*;

/// A point on a precision/recall curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecRec<T>
where
    T: Copy,
{
    pub precision: T,
    pub recall: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegralMethod {
    /// Area under the precision envelope, summed where the recall changes.
    Continuous,
    /// Mean of the envelope sampled at evenly spaced recall thresholds.
    Interpolation(usize),
}

#[derive(Debug)]
pub struct ApCalculator {
    integral_method: IntegralMethod,
}

impl ApCalculator {
    pub fn new(integral_method: IntegralMethod) -> Result<Self> {
        if let IntegralMethod::Interpolation(n_points) = integral_method {
            ensure!(
                n_points >= 2,
                "invalid number of interpolated points {}",
                n_points
            );
        }

        Ok(Self { integral_method })
    }

    pub fn integral_method(&self) -> IntegralMethod {
        self.integral_method
    }

    /// Compute average precision from a precision/recall curve.
    ///
    /// The input precision/recall list must be ordered by non-decreasing recall.
    pub fn compute_by_prec_rec(&self, sorted_prec_rec: &[impl Borrow<PrecRec<R64>>]) -> R64 {
        let sorted_prec_rec: Vec<PrecRec<R64>> = sorted_prec_rec
            .iter()
            .map(|prec_rec| *Borrow::<PrecRec<R64>>::borrow(prec_rec))
            .collect();

        match self.integral_method {
            IntegralMethod::Interpolation(n_points) => {
                let sum: R64 = (0..n_points)
                    .map(|index| r64(index as f64 / (n_points - 1) as f64))
                    .map(|thresh| {
                        sorted_prec_rec
                            .iter()
                            .filter(|prec_rec| prec_rec.recall >= thresh)
                            .map(|prec_rec| prec_rec.precision)
                            .max()
                            .unwrap_or_else(|| r64(0.0))
                    })
                    .sum();
                sum / r64(n_points as f64)
            }
            IntegralMethod::Continuous => {
                // append/prepend sentinel values
                let first = PrecRec {
                    precision: r64(0.0),
                    recall: r64(0.0),
                };
                let last = PrecRec {
                    precision: r64(0.0),
                    recall: r64(1.0),
                };
                let mut points: Vec<PrecRec<R64>> = iter::once(first)
                    .chain(sorted_prec_rec.iter().copied())
                    .chain(iter::once(last))
                    .collect();

                // compute precision envelope
                for index in (1..points.len()).rev() {
                    let next = points[index].precision;
                    let prev = &mut points[index - 1].precision;
                    *prev = (*prev).max(next);
                }

                points
                    .iter()
                    .tuple_windows()
                    .filter(|(lhs, rhs)| lhs.recall != rhs.recall)
                    .map(|(lhs, rhs)| (rhs.recall - lhs.recall) * rhs.precision)
                    .sum()
            }
        }
    }

    /// Compute the precision/recall curve of detections ordered by decreasing
    /// confidence, given their true positive flags.
    pub fn prec_rec_curve(
        is_tp: impl IntoIterator<Item = bool>,
        num_ground_truth: usize,
    ) -> Vec<PrecRec<R64>> {
        is_tp
            .into_iter()
            .scan((0, 0), |(acc_tp, acc_fp), is_tp| {
                if is_tp {
                    *acc_tp += 1;
                } else {
                    *acc_fp += 1;
                }
                let acc_tp = *acc_tp as f64;
                let acc_fp = *acc_fp as f64;
                let recall = if num_ground_truth > 0 {
                    acc_tp / num_ground_truth as f64
                } else {
                    0.0
                };
                let precision = acc_tp / (acc_tp + acc_fp).max(f64::EPSILON);

                Some(PrecRec {
                    precision: r64(precision),
                    recall: r64(recall),
                })
            })
            .collect()
    }
}

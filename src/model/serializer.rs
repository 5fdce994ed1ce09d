//! # Flat Parameter Vector Codec
//!
//! Converts the whole partition model to and from a single unconstrained
//! parameter vector for gradient-based MCMC proposals, accumulating the
//! log-Jacobian of the reparameterization as it goes.
//!
//! Traversal order is fixed and identical for encode and decode: the subset
//! relative rates first (only with more than one subset), then for each
//! subset its rate-matrix parameters (exchangeabilities then frequencies for
//! nucleotide data, omega then frequencies for codon data), then pinvar when
//! the subset has an invariable class, then rate variance when it has more
//! than one rate category.
//!
//! Every subset is visited regardless of linkage or fixed flags, so linked
//! storage appears once per subset that references it; on decode the last
//! write wins, which is harmless because linked slots decode from slices
//! carrying the same values.

use crate::error::{PetrelError, Result};
use crate::model::partition::PartitionModel;
use crate::model::transform::{
    log_forward, log_inverse, log_ratio_forward, log_ratio_inverse,
};

/// Cursor over the unconstrained slice handed to
/// [`PartitionModel::decode_params`], with underflow checking.
struct ParamCursor<'a> {
    values: &'a [f64],
    pos: usize,
}

impl<'a> ParamCursor<'a> {
    fn new(values: &'a [f64]) -> Self {
        Self { values, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [f64]> {
        if self.pos + n > self.values.len() {
            return Err(PetrelError::BufferUnderflow {
                needed: self.pos + n,
                available: self.values.len(),
            });
        }
        let slice = &self.values[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_one(&mut self) -> Result<f64> {
        Ok(self.take(1)?[0])
    }
}

impl PartitionModel {
    /// Serialize every model parameter into one unconstrained vector.
    ///
    /// Returns the vector and the accumulated forward log-Jacobian. Fails if
    /// any parameter sits on the boundary of its support (a zero frequency, a
    /// zero pinvar under the invariable-sites model) where the log transform
    /// is undefined.
    pub fn encode_params(&self) -> Result<(Vec<f64>, f64)> {
        let mut out = Vec::new();
        let mut log_jacobian = 0.0;

        if self.num_subsets > 1 {
            let (u, j) = log_ratio_forward(&self.subset_relrates)?;
            out.extend_from_slice(&u);
            log_jacobian += j;
        }

        for k in 0..self.num_subsets {
            let q = self.qmatrix[k].borrow();

            if self.subset_datatypes[k].is_nucleotide() {
                if let Some(xchg) = q.exchangeabilities_param() {
                    let (u, j) = log_ratio_forward(&xchg.borrow())?;
                    out.extend_from_slice(&u);
                    log_jacobian += j;
                }
            } else if let Some(omega) = q.omega() {
                let (y, j) = log_forward(omega)?;
                out.push(y);
                log_jacobian += j;
            }

            let (u, j) = log_ratio_forward(&q.state_freqs_param().borrow())?;
            out.extend_from_slice(&u);
            log_jacobian += j;

            let asrv = self.asrv[k].borrow();
            if asrv.is_invar_model() {
                let (y, j) = log_forward(asrv.pinvar())?;
                out.push(y);
                log_jacobian += j;
            }
            if asrv.num_categ() > 1 {
                let (y, j) = log_forward(asrv.rate_var())?;
                out.push(y);
                log_jacobian += j;
            }
        }

        Ok((out, log_jacobian))
    }

    /// Deserialize an unconstrained vector produced by
    /// [`PartitionModel::encode_params`] back into the model, writing each
    /// value through the installed shared storage.
    ///
    /// `values` is the portion of a larger proposal vector belonging to this
    /// model. Returns the accumulated inverse log-Jacobian. Fails with a
    /// buffer underflow when the slice is shorter than the model requires.
    pub fn decode_params(&mut self, values: &[f64]) -> Result<f64> {
        let mut cursor = ParamCursor::new(values);
        let mut log_jacobian = 0.0;

        if self.num_subsets > 1 {
            let u = cursor.take(self.num_subsets - 1)?;
            let (relrates, j) = log_ratio_inverse(u);
            self.subset_relrates = relrates;
            log_jacobian += j;
        }

        for k in 0..self.num_subsets {
            let nstates = self.subset_datatypes[k].num_states();
            let mut q = self.qmatrix[k].borrow_mut();

            if self.subset_datatypes[k].is_nucleotide() {
                if q.exchangeabilities_param().is_some() {
                    let u = cursor.take(crate::model::qmatrix::NUM_EXCHANGEABILITIES - 1)?;
                    let (xchg, j) = log_ratio_inverse(u);
                    q.set_exchangeabilities(xchg);
                    log_jacobian += j;
                }
            } else if q.omega_param().is_some() {
                let (omega, j) = log_inverse(cursor.take_one()?);
                q.set_omega(omega);
                log_jacobian += j;
            }

            let u = cursor.take(nstates - 1)?;
            let (freqs, j) = log_ratio_inverse(u);
            q.set_state_freqs(freqs);
            log_jacobian += j;
            drop(q);

            let mut asrv = self.asrv[k].borrow_mut();
            if asrv.is_invar_model() {
                let (pinvar, j) = log_inverse(cursor.take_one()?);
                asrv.set_pinvar(pinvar);
                log_jacobian += j;
            }
            if asrv.num_categ() > 1 {
                let (rate_var, j) = log_inverse(cursor.take_one()?);
                asrv.set_rate_var(rate_var);
                log_jacobian += j;
            }
        }

        Ok(log_jacobian)
    }

    /// Length of the vector [`PartitionModel::encode_params`] produces for
    /// the current model configuration.
    pub fn num_encoded_params(&self) -> usize {
        let mut n = 0;
        if self.num_subsets > 1 {
            n += self.num_subsets - 1;
        }
        for k in 0..self.num_subsets {
            let nstates = self.subset_datatypes[k].num_states();
            if self.subset_datatypes[k].is_nucleotide() {
                n += crate::model::qmatrix::NUM_EXCHANGEABILITIES - 1;
            } else {
                n += 1;
            }
            n += nstates - 1;
            let asrv = self.asrv[k].borrow();
            if asrv.is_invar_model() {
                n += 1;
            }
            if asrv.num_categ() > 1 {
                n += 1;
            }
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use crate::model::param::{RealParam, VectorParam};

    const TOL: f64 = 1e-9;

    fn mixed_model() -> PartitionModel {
        let mut model = PartitionModel::new();
        model
            .configure_subsets(vec![
                DataType::Nucleotide,
                DataType::Nucleotide,
                DataType::codon_standard(),
            ])
            .unwrap();
        model.set_subset_sizes(vec![20, 20, 20]).unwrap();
        model
    }

    #[test]
    fn test_encoded_length_mixed_partition() {
        let model = mixed_model();
        // 2 relrates + 2 x (5 exchangeabilities + 3 freqs) + (1 omega + 60 freqs)
        assert_eq!(model.num_encoded_params(), 2 + 8 + 8 + 61);
        let (flat, _) = model.encode_params().unwrap();
        assert_eq!(flat.len(), model.num_encoded_params());
    }

    #[test]
    fn test_round_trip_restores_values() {
        let mut model = mixed_model();
        model
            .set_state_freqs(VectorParam::new(vec![0.1, 0.2, 0.3, 0.4]), 0, false)
            .unwrap();
        model
            .set_exchangeabilities(
                VectorParam::new(vec![0.05, 0.25, 0.1, 0.1, 0.4, 0.1]),
                0,
                false,
            )
            .unwrap();
        model.set_omega(RealParam::new(2.0), 2, false).unwrap();
        // Decode reconstructs a sum-1 simplex, so start from normalized rates
        model
            .set_subset_rel_rates(&[1.0 / 6.0, 2.0 / 6.0, 3.0 / 6.0], false)
            .unwrap();

        let (flat, _) = model.encode_params().unwrap();
        let snapshot_freqs = model.qmatrix(0).borrow().state_freqs_param().borrow().clone();
        let snapshot_relrates = model.subset_rel_rates().to_vec();

        // Perturb, then decode the original vector back
        model
            .set_state_freqs(VectorParam::new(vec![0.25; 4]), 0, false)
            .unwrap();
        model.set_subset_rel_rates(&[-1.0], false).unwrap();
        model.decode_params(&flat).unwrap();

        let freqs = model.qmatrix(0).borrow().state_freqs_param().borrow().clone();
        for (a, b) in snapshot_freqs.iter().zip(freqs.iter()) {
            assert!((a - b).abs() < TOL);
        }
        for (a, b) in snapshot_relrates.iter().zip(model.subset_rel_rates()) {
            assert!((a - b).abs() < TOL);
        }
        assert!((model.qmatrix(2).borrow().omega().unwrap() - 2.0).abs() < TOL);
    }

    #[test]
    fn test_decode_normalizes_rel_rates() {
        let mut model = mixed_model();
        model.set_subset_rel_rates(&[1.0, 1.0, 2.0], false).unwrap();

        let (flat, _) = model.encode_params().unwrap();
        model.decode_params(&flat).unwrap();

        // Unnormalized rates come back as the sum-1 simplex they encode
        let expected = [0.25, 0.25, 0.5];
        for (a, b) in model.subset_rel_rates().iter().zip(expected.iter()) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn test_decode_writes_through_shared_storage() {
        let mut model = PartitionModel::new();
        model
            .configure_subsets(vec![DataType::Nucleotide, DataType::Nucleotide])
            .unwrap();
        model.set_subset_sizes(vec![10, 10]).unwrap();
        let shared = VectorParam::new(vec![0.1, 0.2, 0.3, 0.4]);
        model.set_state_freqs(shared.clone(), 0, false).unwrap();
        model.set_state_freqs(shared.clone(), 1, false).unwrap();

        let (flat, _) = model.encode_params().unwrap();
        shared.set(vec![0.25; 4]);
        model.decode_params(&flat).unwrap();

        // Both subsets still share one allocation and it holds the decoded values
        assert!(model
            .qmatrix(0)
            .borrow()
            .state_freqs_param()
            .same(model.qmatrix(1).borrow().state_freqs_param()));
        let freqs = shared.borrow().clone();
        let expected = [0.1, 0.2, 0.3, 0.4];
        for (a, b) in freqs.iter().zip(expected.iter()) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn test_underflow_reported() {
        let mut model = mixed_model();
        let (flat, _) = model.encode_params().unwrap();
        let err = model.decode_params(&flat[..flat.len() - 1]).unwrap_err();
        assert!(matches!(err, PetrelError::BufferUnderflow { .. }));
    }

    #[test]
    fn test_encode_rejects_boundary_pinvar() {
        let mut model = PartitionModel::new();
        model.configure_subsets(vec![DataType::Nucleotide]).unwrap();
        model.set_subset_sizes(vec![10]).unwrap();
        model.set_is_invar_model(true, 0).unwrap();
        // Default pinvar is 0.0, on the boundary of its support
        assert!(matches!(
            model.encode_params(),
            Err(PetrelError::Domain { .. })
        ));

        model.set_pinvar(RealParam::new(0.1), 0, false).unwrap();
        assert!(model.encode_params().is_ok());
    }

    #[test]
    fn test_fixed_parameters_still_encoded() {
        let mut model = PartitionModel::new();
        model
            .configure_subsets(vec![DataType::Nucleotide, DataType::Nucleotide])
            .unwrap();
        model.set_subset_sizes(vec![10, 10]).unwrap();
        model
            .set_state_freqs(VectorParam::new(vec![0.1, 0.2, 0.3, 0.4]), 0, true)
            .unwrap();
        // Fixing a parameter removes it from the proposal registries, not
        // from the serialized vector
        assert_eq!(model.num_encoded_params(), 1 + 2 * (5 + 3));
        let (flat, _) = model.encode_params().unwrap();
        assert_eq!(flat.len(), 17);
    }
}

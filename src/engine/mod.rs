//! # Likelihood Engine Boundary
//!
//! The model does not compute likelihoods itself; it pushes per-subset
//! buffers into an engine behind the [`LikelihoodEngine`] trait. Engines
//! report status through their own integer codes (zero for success by
//! convention), which the push methods hand back untranslated so callers can
//! interpret them against the engine's documentation.

use crate::error::{PetrelError, Result};
use crate::model::PartitionModel;

/// Receiver for the per-subset buffers a likelihood implementation needs.
pub trait LikelihoodEngine {
    /// Install eigendecomposition buffers for one subset's rate matrix.
    fn set_eigen_decomposition(
        &mut self,
        subset: usize,
        eigenvectors: &[f64],
        inverse_eigenvectors: &[f64],
        eigenvalues: &[f64],
    ) -> i32;

    /// Install one subset's state frequencies.
    fn set_state_frequencies(&mut self, subset: usize, freqs: &[f64]) -> i32;

    /// Install one subset's rate-category scalers.
    fn set_category_rates(&mut self, subset: usize, rates: &[f64]) -> i32;

    /// Install one subset's rate-category weights.
    fn set_category_weights(&mut self, subset: usize, weights: &[f64]) -> i32;
}

impl PartitionModel {
    /// Push one subset's eigendecomposition into the engine. Fails if no
    /// eigen system has been installed for the subset yet; otherwise returns
    /// the engine's status code unchanged.
    pub fn push_eigen_decomposition(
        &self,
        engine: &mut dyn LikelihoodEngine,
        subset: usize,
    ) -> Result<i32> {
        let q = self.qmatrix(subset).borrow();
        let eigen = q.eigen_system().ok_or_else(|| {
            PetrelError::invalid_argument(format!(
                "no eigen system has been computed for subset {}",
                subset
            ))
        })?;
        Ok(engine.set_eigen_decomposition(
            subset,
            &eigen.vectors,
            &eigen.inverse_vectors,
            &eigen.values,
        ))
    }

    /// Push one subset's state frequencies into the engine.
    pub fn push_state_frequencies(
        &self,
        engine: &mut dyn LikelihoodEngine,
        subset: usize,
    ) -> Result<i32> {
        let q = self.qmatrix(subset).borrow();
        let freqs = q.state_freqs_param().borrow();
        Ok(engine.set_state_frequencies(subset, &freqs))
    }

    /// Push one subset's rate-category scalers into the engine.
    pub fn push_category_rates(
        &self,
        engine: &mut dyn LikelihoodEngine,
        subset: usize,
    ) -> Result<i32> {
        let asrv = self.asrv(subset).borrow();
        Ok(engine.set_category_rates(subset, asrv.rates()))
    }

    /// Push one subset's rate-category weights into the engine.
    pub fn push_category_weights(
        &self,
        engine: &mut dyn LikelihoodEngine,
        subset: usize,
    ) -> Result<i32> {
        let asrv = self.asrv(subset).borrow();
        Ok(engine.set_category_weights(subset, asrv.probs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataType;
    use crate::model::EigenSystem;

    /// Records everything pushed into it; returns a fixed status code.
    #[derive(Default)]
    struct MockEngine {
        status: i32,
        eigen_calls: Vec<(usize, usize)>,
        freqs: Vec<(usize, Vec<f64>)>,
        rates: Vec<(usize, Vec<f64>)>,
        weights: Vec<(usize, Vec<f64>)>,
    }

    impl LikelihoodEngine for MockEngine {
        fn set_eigen_decomposition(
            &mut self,
            subset: usize,
            eigenvectors: &[f64],
            _inverse_eigenvectors: &[f64],
            _eigenvalues: &[f64],
        ) -> i32 {
            self.eigen_calls.push((subset, eigenvectors.len()));
            self.status
        }

        fn set_state_frequencies(&mut self, subset: usize, freqs: &[f64]) -> i32 {
            self.freqs.push((subset, freqs.to_vec()));
            self.status
        }

        fn set_category_rates(&mut self, subset: usize, rates: &[f64]) -> i32 {
            self.rates.push((subset, rates.to_vec()));
            self.status
        }

        fn set_category_weights(&mut self, subset: usize, weights: &[f64]) -> i32 {
            self.weights.push((subset, weights.to_vec()));
            self.status
        }
    }

    fn model() -> PartitionModel {
        let mut model = PartitionModel::new();
        model.configure_subsets(vec![DataType::Nucleotide]).unwrap();
        model
    }

    #[test]
    fn test_push_without_eigen_fails() {
        let model = model();
        let mut engine = MockEngine::default();
        assert!(matches!(
            model.push_eigen_decomposition(&mut engine, 0),
            Err(PetrelError::InvalidArgument { .. })
        ));
        assert!(engine.eigen_calls.is_empty());
    }

    #[test]
    fn test_push_eigen_after_install() {
        let model = model();
        model.qmatrix(0).borrow_mut().set_eigen_system(EigenSystem {
            vectors: vec![0.0; 16],
            inverse_vectors: vec![0.0; 16],
            values: vec![0.0; 4],
        });
        let mut engine = MockEngine::default();
        let status = model.push_eigen_decomposition(&mut engine, 0).unwrap();
        assert_eq!(status, 0);
        assert_eq!(engine.eigen_calls, vec![(0, 16)]);
    }

    #[test]
    fn test_engine_status_passed_through() {
        let model = model();
        let mut engine = MockEngine {
            status: -7,
            ..Default::default()
        };
        let status = model.push_state_frequencies(&mut engine, 0).unwrap();
        assert_eq!(status, -7);
    }

    #[test]
    fn test_push_rates_and_weights() {
        let mut model = model();
        model.set_num_categ(4, 0).unwrap();
        let mut engine = MockEngine::default();
        model.push_category_rates(&mut engine, 0).unwrap();
        model.push_category_weights(&mut engine, 0).unwrap();
        assert_eq!(engine.rates[0].1.len(), 4);
        assert_eq!(engine.weights[0].1.len(), 4);
        let total: f64 = engine.weights[0].1.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

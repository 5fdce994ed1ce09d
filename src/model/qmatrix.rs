//! # Rate-Matrix Parameter Holder
//!
//! Per-subset substitution rate matrix parameters: state frequencies for all
//! data types, exchangeabilities for nucleotide subsets, omega (the
//! nonsynonymous/synonymous rate ratio) for codon subsets. Each lives in
//! [`Shared`](crate::model::param::Shared) storage so the partition manager
//! can link parameters across subsets by installing the same handle in more
//! than one holder.
//!
//! The numerical eigendecomposition of the rate matrix is performed by an
//! external collaborator; the holder only stores the resulting
//! [`EigenSystem`] buffers and raises a dirty flag when any parameter change
//! invalidates them.

use std::sync::Arc;

use crate::data::{DataType, GeneticCode};
use crate::model::param::{RealParam, VectorParam};

/// Number of exchangeabilities in the general time-reversible nucleotide
/// model (AC, AG, AT, CG, CT, GT).
pub const NUM_EXCHANGEABILITIES: usize = 6;

/// Eigendecomposition buffers for one rate matrix, produced externally.
#[derive(Debug, Clone)]
pub struct EigenSystem {
    /// Flattened (states x states) matrix of eigenvectors.
    pub vectors: Vec<f64>,
    /// Flattened (states x states) matrix of inverse eigenvectors.
    pub inverse_vectors: Vec<f64>,
    /// Eigenvalues, one per state.
    pub values: Vec<f64>,
}

/// Rate-matrix parameter holder for one subset.
#[derive(Debug)]
pub struct QMatrix {
    datatype: DataType,
    state_freqs: VectorParam,
    exchangeabilities: Option<VectorParam>,
    omega: Option<RealParam>,
    state_freqs_fixed: bool,
    exchangeabilities_fixed: bool,
    omega_fixed: bool,
    active: bool,
    dirty: bool,
    eigen: Option<EigenSystem>,
}

impl QMatrix {
    /// A fresh nucleotide holder with equal frequencies and equal
    /// exchangeabilities, all storage unshared.
    pub fn nucleotide() -> Self {
        Self {
            datatype: DataType::Nucleotide,
            state_freqs: VectorParam::new(vec![0.25; 4]),
            exchangeabilities: Some(VectorParam::new(vec![
                1.0 / NUM_EXCHANGEABILITIES as f64;
                NUM_EXCHANGEABILITIES
            ])),
            omega: None,
            state_freqs_fixed: false,
            exchangeabilities_fixed: false,
            omega_fixed: false,
            active: true,
            dirty: true,
            eigen: None,
        }
    }

    /// A fresh codon holder under the given genetic code, equal frequencies
    /// over the sense codons and omega 1, all storage unshared.
    pub fn codon(code: &Arc<GeneticCode>) -> Self {
        let n = code.num_states();
        Self {
            datatype: DataType::Codon(Arc::clone(code)),
            state_freqs: VectorParam::new(vec![1.0 / n as f64; n]),
            exchangeabilities: None,
            omega: Some(RealParam::new(1.0)),
            state_freqs_fixed: false,
            exchangeabilities_fixed: false,
            omega_fixed: false,
            active: true,
            dirty: true,
            eigen: None,
        }
    }

    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    pub fn num_states(&self) -> usize {
        self.datatype.num_states()
    }

    // === State frequencies ===

    pub fn state_freqs_param(&self) -> &VectorParam {
        &self.state_freqs
    }

    /// Install a (possibly shared) state frequency handle.
    pub fn install_state_freqs(&mut self, handle: VectorParam) {
        self.state_freqs = handle;
        self.mark_dirty();
    }

    /// Fill the supplied handle with equal frequencies and install it. The
    /// handle itself is kept, so linkage expressed through it survives.
    pub fn install_equal_state_freqs(&mut self, handle: VectorParam) {
        let n = self.num_states();
        {
            let mut freqs = handle.borrow_mut();
            freqs.clear();
            freqs.resize(n, 1.0 / n as f64);
        }
        self.install_state_freqs(handle);
    }

    /// Write new frequency values through the currently installed storage.
    pub fn set_state_freqs(&mut self, values: Vec<f64>) {
        self.state_freqs.set(values);
        self.mark_dirty();
    }

    pub fn is_fixed_state_freqs(&self) -> bool {
        self.state_freqs_fixed
    }

    pub fn fix_state_freqs(&mut self, fixed: bool) {
        self.state_freqs_fixed = fixed;
    }

    // === Exchangeabilities (nucleotide only) ===

    pub fn exchangeabilities_param(&self) -> Option<&VectorParam> {
        self.exchangeabilities.as_ref()
    }

    pub fn install_exchangeabilities(&mut self, handle: VectorParam) {
        if self.datatype.is_nucleotide() {
            self.exchangeabilities = Some(handle);
            self.mark_dirty();
        }
    }

    pub fn install_equal_exchangeabilities(&mut self, handle: VectorParam) {
        {
            let mut xchg = handle.borrow_mut();
            xchg.clear();
            xchg.resize(
                NUM_EXCHANGEABILITIES,
                1.0 / NUM_EXCHANGEABILITIES as f64,
            );
        }
        self.install_exchangeabilities(handle);
    }

    pub fn set_exchangeabilities(&mut self, values: Vec<f64>) {
        if let Some(xchg) = &self.exchangeabilities {
            xchg.set(values);
            self.mark_dirty();
        }
    }

    pub fn is_fixed_exchangeabilities(&self) -> bool {
        self.exchangeabilities_fixed
    }

    pub fn fix_exchangeabilities(&mut self, fixed: bool) {
        self.exchangeabilities_fixed = fixed;
    }

    // === Omega (codon only) ===

    pub fn omega_param(&self) -> Option<&RealParam> {
        self.omega.as_ref()
    }

    pub fn omega(&self) -> Option<f64> {
        self.omega.as_ref().map(|w| w.get())
    }

    pub fn install_omega(&mut self, handle: RealParam) {
        if self.datatype.is_codon() {
            self.omega = Some(handle);
            self.mark_dirty();
        }
    }

    pub fn set_omega(&mut self, value: f64) {
        if let Some(omega) = &self.omega {
            omega.set(value);
            self.mark_dirty();
        }
    }

    pub fn is_fixed_omega(&self) -> bool {
        self.omega_fixed
    }

    pub fn fix_omega(&mut self, fixed: bool) {
        self.omega_fixed = fixed;
    }

    // === Activation and eigen system ===

    /// Whether this holder currently contributes to likelihood computation.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Install externally computed eigendecomposition buffers, clearing the
    /// dirty flag.
    pub fn set_eigen_system(&mut self, eigen: EigenSystem) {
        self.eigen = Some(eigen);
        self.dirty = false;
    }

    pub fn eigen_system(&self) -> Option<&EigenSystem> {
        self.eigen.as_ref()
    }

    /// True when a parameter change has invalidated the stored eigen system.
    pub fn needs_recalc(&self) -> bool {
        self.dirty
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nucleotide_defaults() {
        let q = QMatrix::nucleotide();
        assert_eq!(q.num_states(), 4);
        assert_eq!(q.state_freqs_param().borrow().len(), 4);
        assert_eq!(
            q.exchangeabilities_param().unwrap().borrow().len(),
            NUM_EXCHANGEABILITIES
        );
        assert!(q.omega_param().is_none());
        assert!(q.is_active());
        assert!(q.needs_recalc());
    }

    #[test]
    fn test_codon_defaults() {
        let q = QMatrix::codon(&GeneticCode::standard());
        assert_eq!(q.num_states(), 61);
        assert_eq!(q.state_freqs_param().borrow().len(), 61);
        assert!(q.exchangeabilities_param().is_none());
        assert_eq!(q.omega(), Some(1.0));
    }

    #[test]
    fn test_equal_freqs_preserves_handle() {
        let mut q = QMatrix::nucleotide();
        let handle = VectorParam::new(vec![-1.0]);
        q.install_equal_state_freqs(handle.clone());
        assert!(q.state_freqs_param().same(&handle));
        assert_eq!(&*handle.borrow(), &vec![0.25; 4]);
    }

    #[test]
    fn test_omega_ignored_on_nucleotide() {
        let mut q = QMatrix::nucleotide();
        q.install_omega(RealParam::new(2.0));
        assert!(q.omega_param().is_none());
        q.set_omega(3.0);
        assert!(q.omega().is_none());
    }

    #[test]
    fn test_dirty_flag() {
        let mut q = QMatrix::nucleotide();
        q.set_eigen_system(EigenSystem {
            vectors: vec![0.0; 16],
            inverse_vectors: vec![0.0; 16],
            values: vec![0.0; 4],
        });
        assert!(!q.needs_recalc());
        q.set_state_freqs(vec![0.1, 0.2, 0.3, 0.4]);
        assert!(q.needs_recalc());
        assert!(q.eigen_system().is_some());
    }
}

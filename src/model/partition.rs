//! # Partition Model Manager
//!
//! Owns the per-subset rate-matrix and ASRV holders for a partitioned
//! alignment, discovers which parameters are linked across subsets, and
//! exposes the flattened collections of free parameters that proposal
//! machinery is allowed to perturb.
//!
//! Linkage is a property of storage identity: two subsets are linked on a
//! sub-parameter iff their holders reference the identical shared allocation
//! (see [`crate::model::param`]). Numerically equal values in distinct
//! allocations are distinct parameters.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::data::DataType;
use crate::error::{PetrelError, Result};
use crate::model::asrv::Asrv;
use crate::model::param::{RealParam, VectorParam};
use crate::model::qmatrix::QMatrix;

/// Handle to a subset's rate-matrix holder, shared with the free-parameter
/// registries.
pub type QMatrixHandle = Rc<RefCell<QMatrix>>;

/// Handle to a subset's ASRV holder.
pub type AsrvHandle = Rc<RefCell<Asrv>>;

/// One row per sub-parameter kind, one column per subset. Equal values in a
/// row mean the subsets share storage for that kind; `None` means the kind
/// does not apply to that subset (wrong data type, or no invariable class).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkageTable {
    pub state_freqs: Vec<Option<usize>>,
    pub exchangeabilities: Vec<Option<usize>>,
    pub omega: Vec<Option<usize>>,
    pub rate_var: Vec<Option<usize>>,
    pub pinvar: Vec<Option<usize>>,
}

/// Assigns 1-based indices to storage tokens in encounter order.
#[derive(Default)]
struct IdentityIndexer {
    seen: Vec<usize>,
}

impl IdentityIndexer {
    /// Returns the index for this token and whether it is newly seen.
    fn index(&mut self, token: usize) -> (usize, bool) {
        if let Some(pos) = self.seen.iter().position(|&t| t == token) {
            (pos + 1, false)
        } else {
            self.seen.push(token);
            (self.seen.len(), true)
        }
    }
}

/// Partitioned substitution model: an ordered collection of per-subset
/// holders plus the subset relative rates.
pub struct PartitionModel {
    pub(crate) num_subsets: usize,
    pub(crate) num_sites: usize,
    pub(crate) subset_sizes: Vec<usize>,
    pub(crate) subset_npatterns: Vec<usize>,
    pub(crate) subset_datatypes: Vec<DataType>,
    pub(crate) qmatrix: Vec<QMatrixHandle>,
    pub(crate) asrv: Vec<AsrvHandle>,
    pub(crate) subset_relrates: Vec<f64>,
    pub(crate) subset_relrates_fixed: bool,
    state_freq_params: Vec<QMatrixHandle>,
    exchangeability_params: Vec<QMatrixHandle>,
    omega_params: Vec<QMatrixHandle>,
    rate_var_params: Vec<AsrvHandle>,
    pinvar_params: Vec<AsrvHandle>,
}

impl PartitionModel {
    pub fn new() -> Self {
        Self {
            num_subsets: 0,
            num_sites: 0,
            subset_sizes: Vec::new(),
            subset_npatterns: Vec::new(),
            subset_datatypes: Vec::new(),
            qmatrix: Vec::new(),
            asrv: Vec::new(),
            subset_relrates: Vec::new(),
            subset_relrates_fixed: false,
            state_freq_params: Vec::new(),
            exchangeability_params: Vec::new(),
            omega_params: Vec::new(),
            pinvar_params: Vec::new(),
            rate_var_params: Vec::new(),
        }
    }

    /// Fix the partition structure: one rate-matrix holder and one ASRV
    /// holder per subset, each initially unshared. The subset count is
    /// immutable afterwards.
    pub fn configure_subsets(&mut self, datatypes: Vec<DataType>) -> Result<()> {
        let mut qmatrix = Vec::with_capacity(datatypes.len());
        for (i, dt) in datatypes.iter().enumerate() {
            match dt {
                DataType::Nucleotide => qmatrix.push(Rc::new(RefCell::new(QMatrix::nucleotide()))),
                DataType::Codon(code) => {
                    qmatrix.push(Rc::new(RefCell::new(QMatrix::codon(code))))
                }
                other => {
                    return Err(PetrelError::UnsupportedDataType {
                        name: other.name().to_string(),
                        subset: i + 1,
                    })
                }
            }
        }

        self.num_subsets = datatypes.len();
        self.num_sites = 0;
        self.qmatrix = qmatrix;
        self.asrv = (0..self.num_subsets)
            .map(|_| Rc::new(RefCell::new(Asrv::new())))
            .collect();
        self.subset_datatypes = datatypes;
        self.subset_sizes = vec![0; self.num_subsets];
        self.subset_npatterns = vec![0; self.num_subsets];
        self.subset_relrates = vec![1.0; self.num_subsets];
        Ok(())
    }

    pub fn num_subsets(&self) -> usize {
        self.num_subsets
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn subset_datatype(&self, subset: usize) -> &DataType {
        &self.subset_datatypes[subset]
    }

    pub fn subset_num_sites(&self, subset: usize) -> usize {
        self.subset_sizes[subset]
    }

    pub fn subset_num_patterns(&self, subset: usize) -> usize {
        self.subset_npatterns[subset]
    }

    pub fn subset_num_categ(&self, subset: usize) -> usize {
        self.asrv[subset].borrow().num_categ()
    }

    pub fn qmatrix(&self, subset: usize) -> &QMatrixHandle {
        &self.qmatrix[subset]
    }

    pub fn asrv(&self, subset: usize) -> &AsrvHandle {
        &self.asrv[subset]
    }

    fn check_subset(&self, subset: usize) -> Result<()> {
        if subset >= self.num_subsets {
            return Err(PetrelError::invalid_argument(format!(
                "subset index {} out of range for {} subsets",
                subset, self.num_subsets
            )));
        }
        Ok(())
    }

    // === Site and pattern counts ===

    pub fn set_subset_sizes(&mut self, nsites: Vec<usize>) -> Result<()> {
        if nsites.len() != self.num_subsets {
            return Err(PetrelError::invalid_argument(format!(
                "got {} subset sizes for {} subsets",
                nsites.len(),
                self.num_subsets
            )));
        }
        self.num_sites = nsites.iter().sum();
        self.subset_sizes = nsites;
        Ok(())
    }

    pub fn set_subset_num_patterns(&mut self, npatterns: Vec<usize>) -> Result<()> {
        if npatterns.len() != self.num_subsets {
            return Err(PetrelError::invalid_argument(format!(
                "got {} pattern counts for {} subsets",
                npatterns.len(),
                self.num_subsets
            )));
        }
        self.subset_npatterns = npatterns;
        Ok(())
    }

    // === Rate-matrix parameter installation ===

    /// Install a (possibly shared) state frequency handle into a subset's
    /// holder. A single value of -1 requests equal frequencies, written into
    /// the supplied handle so linkage through it is preserved.
    pub fn set_state_freqs(
        &mut self,
        handle: VectorParam,
        subset: usize,
        fixed: bool,
    ) -> Result<()> {
        self.check_subset(subset)?;
        let first = handle.borrow().first().copied().ok_or_else(|| {
            PetrelError::invalid_argument("state frequency vector must not be empty")
        })?;
        let mut q = self.qmatrix[subset].borrow_mut();
        if first == -1.0 {
            q.install_equal_state_freqs(handle);
        } else {
            q.install_state_freqs(handle);
        }
        q.fix_state_freqs(fixed);
        Ok(())
    }

    /// Install a (possibly shared) exchangeability handle. Ignored for codon
    /// subsets, which have no exchangeabilities; this is an accepted no-op,
    /// not an error. The -1 sentinel requests equal rates.
    pub fn set_exchangeabilities(
        &mut self,
        handle: VectorParam,
        subset: usize,
        fixed: bool,
    ) -> Result<()> {
        self.check_subset(subset)?;
        if !self.subset_datatypes[subset].is_nucleotide() {
            return Ok(());
        }
        let first = handle.borrow().first().copied().ok_or_else(|| {
            PetrelError::invalid_argument("exchangeability vector must not be empty")
        })?;
        let mut q = self.qmatrix[subset].borrow_mut();
        if first == -1.0 {
            q.install_equal_exchangeabilities(handle);
        } else {
            q.install_exchangeabilities(handle);
        }
        q.fix_exchangeabilities(fixed);
        Ok(())
    }

    /// Install a (possibly shared) omega handle. Ignored for nucleotide
    /// subsets (accepted no-op), but the value is validated regardless.
    pub fn set_omega(&mut self, handle: RealParam, subset: usize, fixed: bool) -> Result<()> {
        self.check_subset(subset)?;
        let value = handle.get();
        if value <= 0.0 {
            return Err(PetrelError::invalid_value(format!(
                "omega must be greater than zero but the value {} was supplied",
                value
            )));
        }
        if self.subset_datatypes[subset].is_codon() {
            let mut q = self.qmatrix[subset].borrow_mut();
            q.install_omega(handle);
            q.fix_omega(fixed);
        }
        Ok(())
    }

    // === ASRV parameter installation ===

    pub fn set_rate_var(&mut self, handle: RealParam, subset: usize, fixed: bool) -> Result<()> {
        self.check_subset(subset)?;
        let value = handle.get();
        if value < 0.0 {
            return Err(PetrelError::invalid_value(format!(
                "rate variance must be greater than or equal to zero but the value {} was supplied",
                value
            )));
        }
        let mut asrv = self.asrv[subset].borrow_mut();
        asrv.install_rate_var(handle);
        asrv.fix_rate_var(fixed);
        Ok(())
    }

    pub fn set_pinvar(&mut self, handle: RealParam, subset: usize, fixed: bool) -> Result<()> {
        self.check_subset(subset)?;
        let value = handle.get();
        if value < 0.0 {
            return Err(PetrelError::invalid_value(format!(
                "proportion of invariable sites must be greater than or equal to zero but the value {} was supplied",
                value
            )));
        }
        if value >= 1.0 {
            return Err(PetrelError::invalid_value(format!(
                "proportion of invariable sites must be less than one but the value {} was supplied",
                value
            )));
        }
        let mut asrv = self.asrv[subset].borrow_mut();
        asrv.install_pinvar(handle);
        asrv.fix_pinvar(fixed);
        Ok(())
    }

    pub fn set_is_invar_model(&mut self, invar: bool, subset: usize) -> Result<()> {
        self.check_subset(subset)?;
        self.asrv[subset].borrow_mut().set_is_invar_model(invar);
        Ok(())
    }

    pub fn set_num_categ(&mut self, num_categ: usize, subset: usize) -> Result<()> {
        self.check_subset(subset)?;
        if num_categ < 1 {
            return Err(PetrelError::InvalidCategoryCount(num_categ));
        }
        self.asrv[subset].borrow_mut().set_num_categ(num_categ);
        Ok(())
    }

    // === Subset relative rates ===

    /// Set the per-subset relative substitution rates. A first value of -1
    /// resets all rates to 1.0. The fixed flag applies to the whole set.
    pub fn set_subset_rel_rates(&mut self, relrates: &[f64], fixed: bool) -> Result<()> {
        if relrates.first() == Some(&-1.0) {
            self.subset_relrates = vec![1.0; self.num_subsets];
        } else {
            if relrates.len() != self.num_subsets {
                return Err(PetrelError::invalid_argument(format!(
                    "got {} relative rates for {} subsets",
                    relrates.len(),
                    self.num_subsets
                )));
            }
            self.subset_relrates = relrates.to_vec();
        }
        self.subset_relrates_fixed = fixed;
        Ok(())
    }

    pub fn subset_rel_rates(&self) -> &[f64] {
        &self.subset_relrates
    }

    pub fn is_fixed_subset_rel_rates(&self) -> bool {
        self.subset_relrates_fixed
    }

    /// Site-count-weighted mean of the relative rates. Equals 1.0 when the
    /// rates are properly normalized (and trivially at the all-1.0 default).
    pub fn rel_rate_normalizing_constant(&self) -> f64 {
        if self.num_sites == 0 {
            return 0.0;
        }
        let mut normalizing_constant = 0.0;
        for s in 0..self.num_subsets {
            normalizing_constant +=
                self.subset_sizes[s] as f64 * self.subset_relrates[s] / self.num_sites as f64;
        }
        normalizing_constant
    }

    // === Activation ===

    /// Make every rate-matrix holder contribute to likelihood computation.
    pub fn activate(&mut self) {
        for q in &self.qmatrix {
            q.borrow_mut().set_active(true);
        }
    }

    /// Stop every rate-matrix holder from contributing, without destroying
    /// any state (used while evaluating an alternative model).
    pub fn inactivate(&mut self) {
        for q in &self.qmatrix {
            q.borrow_mut().set_active(false);
        }
    }

    // === Linkage discovery and free-parameter registries ===

    /// Discover linkage groups and rebuild the five free-parameter
    /// registries from scratch. Idempotent; call as often as needed.
    ///
    /// Also enforces two auto-fix rules before indexing: a single rate
    /// category makes the rate variance meaningless (forced fixed), and a
    /// single subset makes the relative rates meaningless (forced fixed).
    pub fn resolve_linkage(&mut self) -> LinkageTable {
        if self.num_subsets == 1 {
            self.subset_relrates_fixed = true;
        }

        self.state_freq_params.clear();
        self.exchangeability_params.clear();
        self.omega_params.clear();
        self.rate_var_params.clear();
        self.pinvar_params.clear();

        let mut freq_ids = IdentityIndexer::default();
        let mut xchg_ids = IdentityIndexer::default();
        let mut omega_ids = IdentityIndexer::default();
        let mut ratevar_ids = IdentityIndexer::default();
        let mut pinvar_ids = IdentityIndexer::default();

        let mut table = LinkageTable::default();

        for i in 0..self.num_subsets {
            if self.asrv[i].borrow().num_categ() == 1 {
                self.asrv[i].borrow_mut().fix_rate_var(true);
            }

            let q = self.qmatrix[i].borrow();
            let asrv = self.asrv[i].borrow();

            let (index, first) = freq_ids.index(q.state_freqs_param().token());
            if first && !q.is_fixed_state_freqs() {
                self.state_freq_params.push(Rc::clone(&self.qmatrix[i]));
            }
            table.state_freqs.push(Some(index));

            if let Some(xchg) = q.exchangeabilities_param() {
                let (index, first) = xchg_ids.index(xchg.token());
                if first && !q.is_fixed_exchangeabilities() {
                    self.exchangeability_params.push(Rc::clone(&self.qmatrix[i]));
                }
                table.exchangeabilities.push(Some(index));
            } else {
                table.exchangeabilities.push(None);
            }

            if let Some(omega) = q.omega_param() {
                let (index, first) = omega_ids.index(omega.token());
                if first && !q.is_fixed_omega() {
                    self.omega_params.push(Rc::clone(&self.qmatrix[i]));
                }
                table.omega.push(Some(index));
            } else {
                table.omega.push(None);
            }

            let (index, first) = ratevar_ids.index(asrv.rate_var_param().token());
            if first && !asrv.is_fixed_rate_var() {
                self.rate_var_params.push(Rc::clone(&self.asrv[i]));
            }
            table.rate_var.push(Some(index));

            if asrv.is_invar_model() {
                let (index, first) = pinvar_ids.index(asrv.pinvar_param().token());
                if first && !asrv.is_fixed_pinvar() {
                    self.pinvar_params.push(Rc::clone(&self.asrv[i]));
                }
                table.pinvar.push(Some(index));
            } else {
                table.pinvar.push(None);
            }
        }

        table
    }

    pub fn state_freq_params(&self) -> &[QMatrixHandle] {
        &self.state_freq_params
    }

    pub fn exchangeability_params(&self) -> &[QMatrixHandle] {
        &self.exchangeability_params
    }

    pub fn omega_params(&self) -> &[QMatrixHandle] {
        &self.omega_params
    }

    pub fn rate_var_params(&self) -> &[AsrvHandle] {
        &self.rate_var_params
    }

    pub fn pinvar_params(&self) -> &[AsrvHandle] {
        &self.pinvar_params
    }

    // === Reporting ===

    /// Deterministic human-readable report: per-subset counts, the linkage
    /// table, and current parameter values. Diagnostics only.
    pub fn describe(&mut self) -> String {
        let table = self.resolve_linkage();

        let fmt_cell = |value: Option<usize>| match value {
            Some(v) => format!("{:>12}", v),
            None => format!("{:>12}", "-"),
        };

        let mut subset_row = String::new();
        let mut dashes_row = String::new();
        let mut nsites_row = String::new();
        let mut npatterns_row = String::new();
        let mut nstates_row = String::new();
        let mut ncateg_row = String::new();
        let mut freqs_row = String::new();
        let mut xchg_row = String::new();
        let mut omega_row = String::new();
        let mut ratevar_row = String::new();
        let mut pinvar_row = String::new();

        for i in 0..self.num_subsets {
            let _ = write!(subset_row, "{:>12}", i + 1);
            dashes_row.push_str("------------");
            let _ = write!(nsites_row, "{:>12}", self.subset_sizes[i]);
            let _ = write!(npatterns_row, "{:>12}", self.subset_npatterns[i]);
            let _ = write!(nstates_row, "{:>12}", self.subset_datatypes[i].num_states());
            let _ = write!(ncateg_row, "{:>12}", self.asrv[i].borrow().num_categ());
            freqs_row.push_str(&fmt_cell(table.state_freqs[i]));
            xchg_row.push_str(&fmt_cell(table.exchangeabilities[i]));
            omega_row.push_str(&fmt_cell(table.omega[i]));
            ratevar_row.push_str(&fmt_cell(table.rate_var[i]));
            pinvar_row.push_str(&fmt_cell(table.pinvar[i]));
        }

        let mut s = String::from("Partition information:\n\n");
        let _ = writeln!(s, "{:>20}{}", "data subset", subset_row);
        let _ = writeln!(s, "{:>20}{}", "-----------------", dashes_row);
        let _ = writeln!(s, "{:>20}{}", "num. sites", nsites_row);
        let _ = writeln!(s, "{:>20}{}", "num. patterns", npatterns_row);
        let _ = writeln!(s, "{:>20}{}", "num. states", nstates_row);
        let _ = writeln!(s, "{:>20}{}", "rate categories", ncateg_row);

        s.push_str("\nParameter linkage:\n\n");
        let _ = writeln!(s, "{:>20}{}", "data subset", subset_row);
        let _ = writeln!(s, "{:>20}{}", "-----------------", dashes_row);
        let _ = writeln!(s, "{:>20}{}", "state freqs", freqs_row);
        let _ = writeln!(s, "{:>20}{}", "exchangeabilities", xchg_row);
        let _ = writeln!(s, "{:>20}{}", "omega", omega_row);
        let _ = writeln!(s, "{:>20}{}", "rate variance", ratevar_row);
        let _ = writeln!(s, "{:>20}{}", "pinvar", pinvar_row);

        s.push_str("\nParameter values for each subset:\n");

        s.push_str("\n  relative rate:\n");
        for i in 0..self.num_subsets {
            let _ = writeln!(s, "  {:>12}: {}", i + 1, self.subset_relrates[i]);
        }

        s.push_str("\n  state freqs:\n");
        for i in 0..self.num_subsets {
            let q = self.qmatrix[i].borrow();
            let freqs = q.state_freqs_param().borrow();
            let joined = freqs
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(s, "  {:>12}: ({})", i + 1, joined);
        }

        s.push_str("\n  exchangeabilities:\n");
        for i in 0..self.num_subsets {
            let q = self.qmatrix[i].borrow();
            match q.exchangeabilities_param() {
                Some(xchg) => {
                    let joined = xchg
                        .borrow()
                        .iter()
                        .map(|x| x.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    let _ = writeln!(s, "  {:>12}: ({})", i + 1, joined);
                }
                None => {
                    let _ = writeln!(s, "  {:>12}: -", i + 1);
                }
            }
        }

        s.push_str("\n  omega:\n");
        for i in 0..self.num_subsets {
            match self.qmatrix[i].borrow().omega() {
                Some(omega) => {
                    let _ = writeln!(s, "  {:>12}: {}", i + 1, omega);
                }
                None => {
                    let _ = writeln!(s, "  {:>12}: -", i + 1);
                }
            }
        }

        s.push_str("\n  rate variance:\n");
        for i in 0..self.num_subsets {
            let asrv = self.asrv[i].borrow();
            if asrv.num_categ() > 1 {
                let _ = writeln!(s, "  {:>12}: {}", i + 1, asrv.rate_var());
            } else {
                let _ = writeln!(s, "  {:>12}: -", i + 1);
            }
        }

        s.push_str("\n  pinvar:\n");
        for i in 0..self.num_subsets {
            let asrv = self.asrv[i].borrow();
            if asrv.is_invar_model() {
                let _ = writeln!(s, "  {:>12}: {}", i + 1, asrv.pinvar());
            } else {
                let _ = writeln!(s, "  {:>12}: -", i + 1);
            }
        }

        s
    }

    /// Flat parameter names in serializer traversal order, for sample-file
    /// headers.
    pub fn param_names(&self, sep: &str) -> String {
        let mut s = String::new();
        if self.num_subsets > 1 {
            for k in 0..self.num_subsets {
                let _ = write!(s, "m-{}{}", k, sep);
            }
        }
        for k in 0..self.num_subsets {
            match &self.subset_datatypes[k] {
                DataType::Nucleotide => {
                    for pair in ["AC", "AG", "AT", "CG", "CT", "GT"] {
                        let _ = write!(s, "r{}-{}{}", pair, k, sep);
                    }
                    for base in ["A", "C", "G", "T"] {
                        let _ = write!(s, "pi{}-{}{}", base, k, sep);
                    }
                }
                DataType::Codon(code) => {
                    let _ = write!(s, "omega-{}{}", k, sep);
                    for codon in code.codons() {
                        let _ = write!(s, "pi{}-{}{}", codon, k, sep);
                    }
                }
                DataType::Protein => {}
            }
            let asrv = self.asrv[k].borrow();
            if asrv.is_invar_model() {
                let _ = write!(s, "pinvar-{}{}", k, sep);
            }
            if asrv.num_categ() > 1 {
                let _ = write!(s, "ratevar-{}{}", k, sep);
            }
        }
        s
    }

    /// Flat parameter values matching [`PartitionModel::param_names`].
    pub fn param_values(&self, sep: &str) -> String {
        let mut s = String::new();
        if self.num_subsets > 1 {
            for k in 0..self.num_subsets {
                let _ = write!(s, "{:.5}{}", self.subset_relrates[k], sep);
            }
        }
        for k in 0..self.num_subsets {
            let q = self.qmatrix[k].borrow();
            match &self.subset_datatypes[k] {
                DataType::Nucleotide => {
                    if let Some(xchg) = q.exchangeabilities_param() {
                        for x in xchg.borrow().iter() {
                            let _ = write!(s, "{:.5}{}", x, sep);
                        }
                    }
                    for f in q.state_freqs_param().borrow().iter() {
                        let _ = write!(s, "{:.5}{}", f, sep);
                    }
                }
                DataType::Codon(_) => {
                    if let Some(omega) = q.omega() {
                        let _ = write!(s, "{:.5}{}", omega, sep);
                    }
                    for f in q.state_freqs_param().borrow().iter() {
                        let _ = write!(s, "{:.5}{}", f, sep);
                    }
                }
                DataType::Protein => {}
            }
            let asrv = self.asrv[k].borrow();
            if asrv.is_invar_model() {
                let _ = write!(s, "{:.5}{}", asrv.pinvar(), sep);
            }
            if asrv.num_categ() > 1 {
                let _ = write!(s, "{:.5}{}", asrv.rate_var(), sep);
            }
        }
        s
    }
}

impl Default for PartitionModel {
    fn default() -> Self {
        Self::new()
    }
}

//! # Configuration
//!
//! CLI argument parsing plus the TOML model description format.
//!
//! A model file names parameter groups and assigns them to subsets; two
//! subsets referencing the same group name share one storage allocation and
//! are thereby linked. Example:
//!
//! ```toml
//! [relrates]
//! values = [1.0, 2.0, 0.5]
//!
//! [groups.nucfreqs]
//! value = [0.1, 0.2, 0.3, 0.4]
//!
//! [groups.w]
//! value = 2.0
//! fixed = true
//!
//! [[subsets]]
//! datatype = "nucleotide"
//! nsites = 100
//! ncateg = 4
//! statefreqs = "nucfreqs"
//!
//! [[subsets]]
//! datatype = "codon"
//! code = "standard"
//! nsites = 300
//! omega = "w"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::debug;

use crate::data::{DataType, GeneticCode};
use crate::error::{PetrelError, Result};
use crate::model::{PartitionModel, RealParam, VectorParam};

/// Command-line options.
#[derive(Parser, Debug)]
#[command(name = "petrel", version, about = "Partitioned substitution model tool")]
pub struct Config {
    /// Path to the TOML model description
    #[arg(short, long)]
    pub model: PathBuf,

    /// Also print the unconstrained parameter vector and its log-Jacobian
    #[arg(long)]
    pub encode: bool,

    /// Log filter directive (e.g. "info", "petrel=debug")
    #[arg(long, default_value = "info")]
    pub log: String,
}

impl Config {
    /// Parse the command line and validate what can be checked up front.
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        if !config.model.is_file() {
            return Err(PetrelError::config(format!(
                "model file {:?} does not exist",
                config.model
            )));
        }
        Ok(config)
    }
}

/// Top-level model description.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    #[serde(default)]
    pub relrates: Option<RelRatesSpec>,
    pub subsets: Vec<SubsetSpec>,
    #[serde(default)]
    pub groups: HashMap<String, GroupSpec>,
}

/// Subset relative rates, one value per subset (or the single value -1 for
/// all-equal).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelRatesSpec {
    pub values: Vec<f64>,
    #[serde(default)]
    pub fixed: bool,
}

/// One partition subset and the parameter groups assigned to it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubsetSpec {
    pub datatype: String,
    /// Genetic code name, codon subsets only (default "standard").
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub nsites: usize,
    #[serde(default)]
    pub npatterns: usize,
    #[serde(default = "default_ncateg")]
    pub ncateg: usize,
    #[serde(default)]
    pub invar: bool,
    #[serde(default)]
    pub statefreqs: Option<String>,
    #[serde(default)]
    pub exchangeabilities: Option<String>,
    #[serde(default)]
    pub omega: Option<String>,
    #[serde(default)]
    pub ratevar: Option<String>,
    #[serde(default)]
    pub pinvar: Option<String>,
}

fn default_ncateg() -> usize {
    1
}

/// A named parameter group: every subset referencing it shares one storage
/// allocation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    pub value: GroupValue,
    #[serde(default)]
    pub fixed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GroupValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ModelSpec {
    pub fn from_toml(text: &str) -> Result<Self> {
        let spec: ModelSpec = toml::from_str(text)?;
        if spec.subsets.is_empty() {
            return Err(PetrelError::config(
                "model description must define at least one subset",
            ));
        }
        Ok(spec)
    }

    /// Build a configured partition model: instantiate one shared handle per
    /// referenced group, then install each into the subsets naming it.
    pub fn build_model(&self) -> Result<PartitionModel> {
        let mut datatypes = Vec::with_capacity(self.subsets.len());
        for subset in &self.subsets {
            let dt = match subset.datatype.as_str() {
                "nucleotide" => DataType::Nucleotide,
                "codon" => {
                    let code = GeneticCode::named(subset.code.as_deref().unwrap_or("standard"))?;
                    DataType::Codon(code)
                }
                "protein" => DataType::Protein,
                other => {
                    return Err(PetrelError::config(format!(
                        "unknown data type \"{}\"",
                        other
                    )))
                }
            };
            datatypes.push(dt);
        }

        let mut model = PartitionModel::new();
        model.configure_subsets(datatypes)?;
        model.set_subset_sizes(self.subsets.iter().map(|s| s.nsites).collect())?;
        model.set_subset_num_patterns(self.subsets.iter().map(|s| s.npatterns).collect())?;

        if let Some(relrates) = &self.relrates {
            model.set_subset_rel_rates(&relrates.values, relrates.fixed)?;
        }

        // One handle per group name, created lazily on first reference
        let mut scalars: HashMap<&str, RealParam> = HashMap::new();
        let mut vectors: HashMap<&str, VectorParam> = HashMap::new();

        for (k, subset) in self.subsets.iter().enumerate() {
            if let Some(name) = &subset.statefreqs {
                let (handle, fixed) = self.vector_handle(name, &mut vectors)?;
                model.set_state_freqs(handle, k, fixed)?;
            }
            if let Some(name) = &subset.exchangeabilities {
                let (handle, fixed) = self.vector_handle(name, &mut vectors)?;
                model.set_exchangeabilities(handle, k, fixed)?;
            }
            if let Some(name) = &subset.omega {
                let (handle, fixed) = self.scalar_handle(name, &mut scalars)?;
                model.set_omega(handle, k, fixed)?;
            }
            model.set_num_categ(subset.ncateg, k)?;
            model.set_is_invar_model(subset.invar, k)?;
            if let Some(name) = &subset.ratevar {
                let (handle, fixed) = self.scalar_handle(name, &mut scalars)?;
                model.set_rate_var(handle, k, fixed)?;
            }
            if let Some(name) = &subset.pinvar {
                let (handle, fixed) = self.scalar_handle(name, &mut scalars)?;
                model.set_pinvar(handle, k, fixed)?;
            }
        }

        debug!(
            subsets = self.subsets.len(),
            groups = self.groups.len(),
            "model built from description"
        );
        Ok(model)
    }

    fn group(&self, name: &str) -> Result<&GroupSpec> {
        self.groups.get(name).ok_or_else(|| {
            PetrelError::config(format!("parameter group \"{}\" is not defined", name))
        })
    }

    fn scalar_handle<'a>(
        &'a self,
        name: &'a str,
        cache: &mut HashMap<&'a str, RealParam>,
    ) -> Result<(RealParam, bool)> {
        let group = self.group(name)?;
        let value = match group.value {
            GroupValue::Scalar(v) => v,
            GroupValue::Vector(_) => {
                return Err(PetrelError::config(format!(
                    "parameter group \"{}\" holds a vector but a scalar is required",
                    name
                )))
            }
        };
        let handle = cache
            .entry(name)
            .or_insert_with(|| RealParam::new(value))
            .clone();
        Ok((handle, group.fixed))
    }

    fn vector_handle<'a>(
        &'a self,
        name: &'a str,
        cache: &mut HashMap<&'a str, VectorParam>,
    ) -> Result<(VectorParam, bool)> {
        let group = self.group(name)?;
        let values = match &group.value {
            GroupValue::Vector(v) => v.clone(),
            GroupValue::Scalar(_) => {
                return Err(PetrelError::config(format!(
                    "parameter group \"{}\" holds a scalar but a vector is required",
                    name
                )))
            }
        };
        let handle = cache
            .entry(name)
            .or_insert_with(|| VectorParam::new(values))
            .clone();
        Ok((handle, group.fixed))
    }
}

//! # Subset Data Types
//!
//! A partition subset is either nucleotide data (4 states) or codon data,
//! where the state count is the number of sense codons under a genetic code
//! (61 for the standard code). The genetic code is shared by handle so every
//! subset using the same code sees one table.

use std::sync::Arc;

use crate::error::{PetrelError, Result};

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// A genetic code: the 64-codon table minus the code's stop codons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneticCode {
    name: String,
    codons: Vec<String>,
}

impl GeneticCode {
    /// The standard genetic code (61 sense codons).
    pub fn standard() -> Arc<GeneticCode> {
        Arc::new(Self::from_stops("standard", &["TAA", "TAG", "TGA"]))
    }

    /// The vertebrate mitochondrial code (60 sense codons).
    pub fn vertmito() -> Arc<GeneticCode> {
        Arc::new(Self::from_stops("vertmito", &["TAA", "TAG", "AGA", "AGG"]))
    }

    /// Look up a genetic code by name.
    pub fn named(name: &str) -> Result<Arc<GeneticCode>> {
        match name {
            "standard" => Ok(Self::standard()),
            "vertmito" => Ok(Self::vertmito()),
            other => Err(PetrelError::config(format!(
                "unknown genetic code \"{}\" (expected \"standard\" or \"vertmito\")",
                other
            ))),
        }
    }

    fn from_stops(name: &str, stops: &[&str]) -> GeneticCode {
        let mut codons = Vec::with_capacity(64 - stops.len());
        for a in BASES {
            for b in BASES {
                for c in BASES {
                    let codon: String = [a, b, c].iter().collect();
                    if !stops.contains(&codon.as_str()) {
                        codons.push(codon);
                    }
                }
            }
        }
        GeneticCode {
            name: name.to_string(),
            codons,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sense codons (model states for codon data).
    pub fn num_states(&self) -> usize {
        self.codons.len()
    }

    /// Sense codons in alphabetical order (AAA, AAC, ...).
    pub fn codons(&self) -> &[String] {
        &self.codons
    }
}

/// Data type of one partition subset.
///
/// `Protein` can be described in a model file but is rejected when the
/// partition is configured; only nucleotide and codon models are supported.
#[derive(Debug, Clone)]
pub enum DataType {
    Nucleotide,
    Codon(Arc<GeneticCode>),
    Protein,
}

impl DataType {
    /// Codon data under the standard genetic code.
    pub fn codon_standard() -> DataType {
        DataType::Codon(GeneticCode::standard())
    }

    pub fn is_nucleotide(&self) -> bool {
        matches!(self, DataType::Nucleotide)
    }

    pub fn is_codon(&self) -> bool {
        matches!(self, DataType::Codon(_))
    }

    /// Number of model states for this data type.
    pub fn num_states(&self) -> usize {
        match self {
            DataType::Nucleotide => 4,
            DataType::Codon(code) => code.num_states(),
            DataType::Protein => 20,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Nucleotide => "nucleotide",
            DataType::Codon(_) => "codon",
            DataType::Protein => "protein",
        }
    }
}

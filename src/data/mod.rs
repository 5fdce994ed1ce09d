//! # Data Descriptions
//!
//! Read-only descriptions of the data each partition subset holds: the
//! data type (nucleotide or codon) and, for codon data, the genetic code
//! that determines the sense-codon alphabet.

pub mod datatype;

pub use datatype::{DataType, GeneticCode};

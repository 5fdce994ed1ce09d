//! # Petrel: Partitioned Substitution Model Parameterization
//!
//! Parameter bookkeeping for Bayesian phylogenetic MCMC over a partitioned
//! alignment: per-subset rate-matrix and among-site rate variation holders,
//! cross-subset parameter linkage by shared storage, and a log-ratio
//! reparameterization that flattens the whole model into one unconstrained
//! vector with its Jacobian.
//!
//! ## Module Structure
//! ```text
//! petrel
//! ├── config      # CLI options and the TOML model description
//! ├── data        # Subset data types and genetic codes
//! ├── engine      # Likelihood engine boundary (buffer push operations)
//! └── model       # Parameter holders, linkage, transforms, serializer
//! ```

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod model;

pub use config::{Config, ModelSpec};
pub use data::{DataType, GeneticCode};
pub use engine::LikelihoodEngine;
pub use error::{PetrelError, Result};
pub use model::{Asrv, EigenSystem, PartitionModel, QMatrix, RealParam, Shared, VectorParam};

//! # Substitution Model
//!
//! Parameter holders, shared-storage linkage, and the unconstrained
//! reparameterization for a partitioned substitution model.

pub mod asrv;
pub mod param;
pub mod partition;
pub mod qmatrix;
pub mod serializer;
pub mod transform;

pub use asrv::Asrv;
pub use param::{RealParam, Shared, VectorParam};
pub use partition::{LinkageTable, PartitionModel};
pub use qmatrix::{EigenSystem, QMatrix, NUM_EXCHANGEABILITIES};

//! The entropy generator: a threshold-BLS random beacon advancing in
//! lockstep with block heights, one group signature per height.

pub mod aeon;
pub mod exec;
pub mod file;
pub mod generator;
pub mod store;
pub mod types;

pub use aeon::{AeonDetails, AeonError};
pub use exec::AeonExecUnit;
pub use file::{AeonDetailsFile, AeonFileError};
pub use generator::EntropyGenerator;
pub use types::{ComputedEntropy, EntropyShare};

/// Number of past heights kept in the share and entropy buffers.
pub const ENTROPY_HISTORY_LENGTH: u64 = 10;

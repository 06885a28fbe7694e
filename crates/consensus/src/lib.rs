//! Multi-validator consensus for contested field values.
//!
//! - [`validator`]: the [`Validator`] trait and the opinion types it
//!   produces. Anything that can commit to a value for a record can sit
//!   behind it.
//! - [`aggregator`]: the [`ConsensusAggregator`] fans a record out to all
//!   validators concurrently, excludes timeouts and failures, and runs a
//!   plurality vote over the rest.
//!
//! Agreement below the quorum threshold never fails a round; it flags the
//! result for human review instead.

pub mod aggregator;
pub mod error;
pub mod validator;

pub use aggregator::{AggregatorStats, ConsensusAggregator, ConsensusResult};
pub use error::{ConsensusError, ValidatorError};
pub use validator::{Opinion, SourceOpinion, Validator};

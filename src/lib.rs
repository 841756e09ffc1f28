// Murmur: cluster forum discussion and flag coordinated posting.
//
// This is the library root. Each module corresponds to one stage of the
// clustering run or one of the collaborators around it (storage, import,
// output).

pub mod cluster;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod flag;
pub mod output;
pub mod pipeline;
pub mod records;
pub mod reduce;
pub mod status;
pub mod summary;

pub use error::{PipelineError, Result};

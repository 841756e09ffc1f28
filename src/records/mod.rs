// Records: the value type being clustered, plus the cleaning, tagging and
// import helpers that prepare it.

pub mod clean;
pub mod comments;
pub mod import;
pub mod models;
pub mod tagger;

pub use models::{assign_labels, clear_labels, require_labels, ClusterLabel, Record};

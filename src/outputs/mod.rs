//! Persisted outputs of a harvest.
//!
//! # Submodules
//!
//! - [`artifacts`]: one JSON file per frontier index
//! - [`corpus`]: every artifact merged into a single JSON array
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── articles/
//! │   ├── 0.json
//! │   ├── 2.json
//! │   └── 3.json
//! └── all_articles.json
//! ```

pub mod artifacts;
pub mod corpus;

//! Hand-off of harvested entries to downstream consumers.
//!
//! # Submodules
//!
//! - [`json`]: writes a run's entries as JSON, one file per source and day,
//!   or as JSON lines on stdout
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2024-04-16/
//!     ├── google-research.json
//!     ├── lyft-engineering.json
//!     └── meta-engineering.json
//! ```

pub mod json;

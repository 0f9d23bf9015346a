//! Universal Category System taxonomy engine and filename codec

pub mod engine;
pub mod filename;

pub use engine::{CatInfo, UcsEngine};
pub use filename::{FuzzyMatch, GeneratedFilename, ParsedFilename};

//! UPC/PDS database operations

pub mod datafiles;
pub mod metadata;
pub mod process_runs;
pub mod reference;

pub use datafiles::{DataFile, NewDataFile};
pub use metadata::MetaValue;
pub use reference::KeywordTypeRow;

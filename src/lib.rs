#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

extern crate alloc;

mod config;
mod dict;
mod dict_type;
mod error;
mod hashing;
mod iter;
mod sample;
mod scan;
mod stats;
mod table;

pub use config::DEFAULT_EMPTY_VISITS_PER_STEP;
pub use config::DEFAULT_FORCE_RESIZE_RATIO;
pub use config::DEFAULT_INITIAL_SIZE;
pub use config::DictConfig;
pub use dict::Dict;
pub use dict::ReplaceOutcome;
pub use dict::ResizeOutcome;
pub use dict_type::DictType;
pub use dict_type::HashKeys;
pub use dict_type::HeapStringCopyKey;
pub use dict_type::HeapStringCopyKeyValue;
pub use dict_type::HeapStrings;
pub use dict_type::SharedStr;
pub use dict_type::Value;
pub use error::DictError;
pub use hashing::HashSeed;
pub use hashing::gen_case_hash;
pub use hashing::gen_hash;
pub use iter::DictIterator;
pub use iter::Iter;
pub use scan::ScanBucket;
pub use stats::DictStats;
pub use stats::STATS_BINS;
pub use stats::TableStats;
pub use table::DictEntry;

pub mod collection;
pub mod config;
pub mod key;
pub mod mapper;

pub use collection::{CollectionDiff, merge_collection};
pub use config::{
    ApplyFn, EntityMap, MapperConfig, MapperConfigBuilder, MergePolicy, OrphanPolicy,
    UnmatchedKeyPolicy,
};
pub use key::EntityKey;
pub use mapper::{Mapper, MergeReport, MergeScope, MergeStats};

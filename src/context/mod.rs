pub mod db_context;
pub mod entity;
pub mod options;
pub mod tracker;

pub use db_context::DbContext;
pub use entity::{CollectionVisitor, Entity, InstanceTag};
pub use options::ContextOptions;
pub use tracker::{ChangeTracker, EntityRef, TrackedEntry};

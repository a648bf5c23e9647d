pub mod memory;
pub mod table;

pub use memory::{DeleteRule, DeletedRow, InMemoryStorage};
pub use table::{Table, TableSchema};

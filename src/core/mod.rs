pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Column, ForeignKey, Row, Schema, integer_at, text_at};
pub use value::{DataType, Value};

use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// A value that identifies one element of an entity collection.
///
/// Keys compare by value. Every key type has one "unset" value carried by
/// elements the store has not assigned a key to yet.
pub trait EntityKey: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    fn unset() -> Self;

    fn is_unset(&self) -> bool {
        *self == Self::unset()
    }
}

macro_rules! zero_unset_key {
    ($($ty:ty),*) => {
        $(
            impl EntityKey for $ty {
                fn unset() -> Self {
                    0
                }
            }
        )*
    };
}

zero_unset_key!(i32, i64, u32, u64);

impl EntityKey for Uuid {
    fn unset() -> Self {
        Uuid::nil()
    }
}

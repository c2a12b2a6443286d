//! Identity types usable as record keys.
//!
//! # Responsibility
//! - Define which identity types a store can generate for new records.
//! - Provide a stable text encoding so any store can index keys uniformly.
//!
//! # Invariants
//! - The default value of a key type means "unassigned" (transient record).
//! - `parse_key(encode_key(k)) == Some(k)` for every assigned key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// Identity type of a record, generated by the store on first persistence.
pub trait RecordKey:
    Clone
    + Debug
    + Display
    + Default
    + PartialEq
    + Eq
    + Hash
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Builds a store-assigned key from the store's per-type sequence value.
    ///
    /// Key types without a natural sequence mapping may ignore `sequence`.
    fn from_sequence(sequence: i64) -> Option<Self>;

    /// Stable text form used for indexing and diagnostics.
    fn encode_key(&self) -> String;

    /// Parses the text produced by [`RecordKey::encode_key`].
    fn parse_key(value: &str) -> Option<Self>;

    /// Returns whether this key has not been assigned by a store yet.
    fn is_unassigned(&self) -> bool {
        *self == Self::default()
    }
}

macro_rules! integer_record_key {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl RecordKey for $ty {
                fn from_sequence(sequence: i64) -> Option<Self> {
                    <$ty>::try_from(sequence).ok().filter(|value| *value != 0)
                }

                fn encode_key(&self) -> String {
                    self.to_string()
                }

                fn parse_key(value: &str) -> Option<Self> {
                    value.parse().ok()
                }
            }
        )+
    };
}

integer_record_key!(i32, i64, u32, u64);

impl RecordKey for Uuid {
    fn from_sequence(_sequence: i64) -> Option<Self> {
        Some(Uuid::new_v4())
    }

    fn encode_key(&self) -> String {
        self.to_string()
    }

    fn parse_key(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok()
    }
}

impl RecordKey for String {
    fn from_sequence(sequence: i64) -> Option<Self> {
        Some(sequence.to_string())
    }

    fn encode_key(&self) -> String {
        self.clone()
    }

    fn parse_key(value: &str) -> Option<Self> {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::RecordKey;
    use uuid::Uuid;

    #[test]
    fn integer_keys_reject_zero_and_out_of_range_sequences() {
        assert_eq!(<i64 as RecordKey>::from_sequence(7), Some(7));
        assert_eq!(<i64 as RecordKey>::from_sequence(0), None);
        assert_eq!(<u32 as RecordKey>::from_sequence(-1), None);
        assert_eq!(<i32 as RecordKey>::from_sequence(i64::MAX), None);
    }

    #[test]
    fn default_keys_are_unassigned() {
        assert!(0_i64.is_unassigned());
        assert!(Uuid::nil().is_unassigned());
        assert!(String::new().is_unassigned());
        assert!(!42_u64.is_unassigned());
    }

    #[test]
    fn uuid_keys_are_generated_and_parsed() {
        let key = <Uuid as RecordKey>::from_sequence(1).unwrap();
        assert!(!key.is_unassigned());
        assert_eq!(Uuid::parse_key(&key.encode_key()), Some(key));
        assert_eq!(Uuid::parse_key("not-a-uuid"), None);
    }
}

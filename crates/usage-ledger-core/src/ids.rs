//! Identifier types for the usage ledger.
//!
//! Payment-provider identifiers are opaque strings with a fixed object prefix
//! (`sub_`, `cus_`). Journal entries use ULIDs so that they sort by time.
//!
//! # Macro-based ID Types
//!
//! The `prefixed_id_type!` macro generates the string-backed newtypes, keeping
//! serialization, parsing and display consistent across them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use ulid::{Generator, Ulid};

/// Macro to define a prefixed string identifier with standard trait implementations.
///
/// This macro generates a newtype wrapper around `String` with implementations for:
/// - `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (as string, validated)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`, `AsRef<str>`
///
/// # Example
///
/// ```ignore
/// prefixed_id_type!(PriceId, "price_", "A price identifier.");
/// let id: PriceId = "price_123".parse().unwrap();
/// ```
macro_rules! prefixed_id_type {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// The object prefix every identifier of this type starts with.
            pub const PREFIX: &'static str = $prefix;

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let rest = s.strip_prefix(Self::PREFIX).ok_or(IdError::MissingPrefix {
                    expected: Self::PREFIX,
                })?;
                if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    return Err(IdError::InvalidCharacters);
                }
                Ok(Self(s.to_string()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

prefixed_id_type!(
    SubscriptionId,
    "sub_",
    "A payment-provider subscription identifier (`sub_...`).\n\nOne ledger record exists per subscription."
);
prefixed_id_type!(
    CustomerId,
    "cus_",
    "A payment-provider customer identifier (`cus_...`)."
);

static ENTRY_ID_GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// A journal entry identifier using ULID for time-ordering.
///
/// Entry IDs are time-ordered so a subscription's journal can be listed
/// newest first by iterating keys in reverse.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(Ulid);

impl EntryId {
    /// Generate a new `EntryId` with the current timestamp.
    ///
    /// IDs generated by one process are strictly increasing, even within the
    /// same millisecond.
    #[must_use]
    pub fn generate() -> Self {
        let mut generator = ENTRY_ID_GENERATOR
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Fails only after 2^80 IDs in one millisecond
        generator.generate().map_or_else(|_| Self(Ulid::new()), Self)
    }

    /// Return the bytes of the ULID (16 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }

    /// Create an `EntryId` from bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Ulid::from_bytes(bytes))
    }
}

impl FromStr for EntryId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EntryId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input does not start with the object prefix.
    #[error("identifier must start with {expected:?}")]
    MissingPrefix {
        /// The prefix that was expected.
        expected: &'static str,
    },

    /// The input has an empty or non-alphanumeric body.
    #[error("identifier contains invalid characters")]
    InvalidCharacters,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}

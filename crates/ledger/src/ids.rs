//! Identifier newtypes.
//!
//! Every entity the ledger touches is addressed by a UUID, but owners,
//! accounts, and history records each get their own wrapper so that passing
//! an [`OwnerId`] where an [`AccountId`] is expected is a compile-time error.

use std::{fmt, str::FromStr};

use uuid::Uuid;

/// Macro to define a newtype wrapper around [`Uuid`] with standard trait
/// implementations.
///
/// Each generated type:
/// - Is a transparent wrapper around `Uuid` (zero runtime cost)
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Derives `Serialize` and `Deserialize` (transparent, hyphenated string form)
/// - Implements `From<Uuid>`, `Display`, and `FromStr`
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of an authenticated caller, as resolved by the
    /// authorization layer in front of the ledger.
    ///
    /// The ledger treats owner ids as opaque and never issues them.
    ///
    /// # Examples
    ///
    /// ```
    /// use coffer_ledger::OwnerId;
    ///
    /// let owner: OwnerId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse()?;
    /// assert_eq!(owner.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    /// # Ok::<(), uuid::Error>(())
    /// ```
    OwnerId
);

define_id!(
    /// Identifier of an account, generated when the account is opened.
    AccountId
);

define_id!(
    /// Identifier of a deposit, withdrawal, or balance inquiry record.
    ///
    /// Record ids are time-ordered (UUID v7), so records of one account sort
    /// chronologically by key.
    RecordId
);

impl OwnerId {
    /// Generates a random owner id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl AccountId {
    /// Generates a random account id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl RecordId {
    /// Generates a record id ordered after every id generated earlier by this
    /// process.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

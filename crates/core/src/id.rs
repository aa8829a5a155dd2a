//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

pub use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of an aggregate root (stream key for envelopes).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

/// Declares a UUID-backed identifier newtype with the usual conversions.
///
/// Domain crates use this for `InvoiceId`, `CampaignId`, `ReminderId`, ...
/// The calling crate must depend on `serde`.
#[macro_export]
macro_rules! uuid_id {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t($crate::id::Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self($crate::id::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: $crate::id::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &$crate::id::Uuid {
                &self.0
            }

            /// View as a generic aggregate id (envelope stream key).
            pub fn as_aggregate_id(&self) -> $crate::id::AggregateId {
                $crate::id::AggregateId::from_uuid(self.0)
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$crate::id::Uuid> for $t {
            fn from(value: $crate::id::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $crate::id::Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = <$crate::id::Uuid as core::str::FromStr>::from_str(s).map_err(|e| {
                    $crate::error::DomainError::invalid_id(format!("{}: {}", $name, e))
                })?;
                Ok(Self(uuid))
            }
        }
    };
}

impl AggregateId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AggregateId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("AggregateId: {e}")))?;
        Ok(Self(uuid))
    }
}

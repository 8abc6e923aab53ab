//! Strongly-typed integer identifiers.
//!
//! Every entity is keyed by a 64-bit integer: users by their external
//! (Telegram) id, everything else by a store-assigned rowid. Wrapping them
//! keeps a `VisitId` from being passed where a `UserId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl $name {
      pub fn get(self) -> i64 { self.0 }
    }

    impl From<i64> for $name {
      fn from(value: i64) -> Self { Self(value) }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
      }
    }
  };
}

id_type!(
  /// External user id (the Telegram account id).
  UserId
);
id_type!(CountryId);
id_type!(RegionId);
id_type!(BathId);
id_type!(VisitId);

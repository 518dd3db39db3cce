//! Index types for the model's tables.
//!
//! A model is a set of flat tables (stations, client types, resource groups,
//! transporter fleets) and every reference between them is a position in
//! one of those tables.  Each table gets its own newtype so a resource
//! index can never be passed where a station is expected.  The maximum
//! value is reserved for "none", e.g. a client that has not visited a
//! station yet.

use std::fmt;

macro_rules! table_index {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// No entry.
            pub const INVALID: $name = $name(<$inner>::MAX);

            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            #[inline(always)]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl Default for $name {
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        /// `#3`, or `-` for [`INVALID`](Self::INVALID).
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() { write!(f, "#{}", self.0) } else { f.write_str("-") }
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

table_index! {
    /// Position in `RunModel::stations`.
    pub struct StationId(u32);
}

table_index! {
    pub struct ClientTypeId(u32);
}

table_index! {
    /// Position in `ResourceSet`.
    pub struct ResourceId(u32);
}

table_index! {
    /// Fleet position in `TransporterSystem`.
    pub struct TransporterTypeId(u32);
}

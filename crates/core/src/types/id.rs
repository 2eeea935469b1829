//! Newtype IDs for type-safe entity references.
//!
//! The marketplace API issues integer identifiers for every entity. A basket
//! line and the product it refers to both carry integers, and mixing them up
//! silently updates the wrong row, so each gets its own wrapper.

/// Define a type-safe ID wrapper around a server-issued `i32`.
///
/// The generated type is `Copy`, ordered, hashable and serializes as a bare
/// integer (`#[serde(transparent)]`).
///
/// # Example
///
/// ```rust
/// # use farm_market_core::define_id;
/// define_id!(SellerId);
/// define_id!(ReviewId);
///
/// let seller = SellerId::new(7);
/// assert_eq!(seller.as_i32(), 7);
///
/// // Different types, so this won't compile:
/// // let _: ReviewId = seller;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Create an ID from the raw server value.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Get the raw server value.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<i32>().map(Self)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// A basket entry; distinct from the product it holds.
define_id!(LineId);
define_id!(ProductId);
define_id!(OrderId);
define_id!(FarmId);
define_id!(CategoryId);

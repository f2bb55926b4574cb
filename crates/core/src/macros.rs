// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.
//!
//! - [`simple_display!`] — `Display` impl mapping enum variants to string literals
//! - [`define_id!`] — prefixed, nanoid-backed identifier newtype

/// Generate a `Display` impl that maps enum variants to string literals.
///
/// Unit variants match directly; data-carrying variants use `(..)` or
/// `{..}` to ignore fields.
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident $(( $($pignore:tt)* ))? $({ $($bignore:tt)* })? => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant $(( $($pignore)* ))? $({ $($bignore)* })? => $str, )+
                })
            }
        }
    };
}

/// Define a newtype identifier with a short type prefix.
///
/// Generated IDs are `{prefix}{nanoid(19)}`. `generate()` makes a fresh
/// random ID; `new()` wraps an existing string (for deserialized or
/// caller-supplied IDs, which are not required to carry the prefix).
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct RunId("wfr-");
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random ID with the type prefix.
            pub fn generate() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
            }

            /// Wrap an existing string as an ID.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

//! Macro for defining strongly-typed catalog key newtypes.
//!
//! Catalog keys (enum types, template names) are external contracts looked up
//! by application code, so they share one invariant: non-empty and free of
//! whitespace. The macro generates the wrapper, validation, and the usual
//! string-like trait impls from a single invocation.

/// Returns `true` when `s` is acceptable as a catalog key.
pub(crate) fn is_valid_key(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// Define a strongly-typed, validated string newtype.
///
/// Generates:
/// - The struct with `Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize`
/// - Custom `Deserialize` that rejects invalid keys
/// - `new()` (panics on invalid input), `try_new()`, `as_str()`, `into_inner()`
/// - `Display`, `AsRef<str>`, `Deref<Target=str>`, `Borrow<str>`
/// - `TryFrom<&str>`, `PartialEq<str>`, `PartialEq<&str>`
macro_rules! define_catalog_key {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::try_new(s).ok_or_else(|| {
                    serde::de::Error::custom(concat!(
                        stringify!($Name),
                        " must be non-empty and contain no whitespace"
                    ))
                })
            }
        }

        impl $Name {
            /// Create a new key, panicking if it is empty or contains whitespace.
            ///
            /// Prefer [`try_new`](Self::try_new) when handling untrusted input.
            pub fn new(name: impl Into<String>) -> Self {
                let s = name.into();
                assert!(
                    $crate::newtype_string::is_valid_key(&s),
                    concat!(stringify!($Name), " must be non-empty and contain no whitespace")
                );
                Self(s)
            }

            /// Try to create a new key, returning `None` for invalid input.
            pub fn try_new(name: impl Into<String>) -> Option<Self> {
                let s = name.into();
                if $crate::newtype_string::is_valid_key(&s) {
                    Some(Self(s))
                } else {
                    None
                }
            }

            /// Return the underlying key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str { &self.0 }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl TryFrom<&str> for $Name {
            type Error = &'static str;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                $Name::try_new(s).ok_or(concat!(
                    stringify!($Name),
                    " must be non-empty and contain no whitespace"
                ))
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool { self.0 == *other }
        }
    };
}

pub(crate) use define_catalog_key;

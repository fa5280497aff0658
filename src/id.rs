//! Identifiers for the technology instances declared in a project.
use anyhow::{Context, Result};
use indexmap::IndexSet;
use std::borrow::Borrow;
use std::fmt::Display;
use std::hash::Hash;

/// Define a string-backed ID type with cheap clones
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, serde::Deserialize, serde::Serialize,
        )]
        /// An ID type (e.g. `RenewableID`, `GeneratorID`)
        pub struct $name(pub std::sync::Arc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Get the ID as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id_type!(RenewableID);
define_id_type!(GeneratorID);

/// A collection of IDs which can be checked against user input
pub trait IDCollection<ID> {
    /// Get the ID from the collection matching the supplied string
    ///
    /// # Returns
    ///
    /// A copy of the stored ID or an error if it is not in the collection
    fn get_id(&self, id: &str) -> Result<&ID>;
}

impl<ID> IDCollection<ID> for IndexSet<ID>
where
    ID: Borrow<str> + Eq + Hash + Display,
{
    fn get_id(&self, id: &str) -> Result<&ID> {
        self.get(id).with_context(|| format!("Unknown ID {id} found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_id_known_and_unknown() {
        let ids: IndexSet<RenewableID> = ["PV".into(), "Wind".into()].into_iter().collect();
        assert_eq!(ids.get_id("Wind").unwrap().as_str(), "Wind");
        assert_eq!(
            ids.get_id("Hydro").unwrap_err().to_string(),
            "Unknown ID Hydro found"
        );
    }
}

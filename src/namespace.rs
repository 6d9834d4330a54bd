//! The `(database, collection)` identifier operations are built against.

use std::{fmt, str::FromStr};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// The canonical `database.collection` identifier for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// The name of the database this namespace belongs to.
    pub db: String,

    /// The name of the collection this namespace identifies.
    pub coll: String,
}

impl Namespace {
    /// Construct a `Namespace` with the given database and collection.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            db: String::new(),
            coll: String::new(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');

        let db = parts.next();
        let coll = parts.collect::<Vec<_>>().join(".");

        match (db, coll) {
            (Some(db), coll) if !coll.is_empty() => Ok(Self {
                db: db.to_string(),
                coll,
            }),
            _ => Err(ErrorKind::InvalidArgument {
                message: "missing one or more fields in namespace".to_string(),
            }
            .into()),
        }
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::from_str(&s).map_err(D::Error::custom)
    }
}

impl Serialize for Namespace {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{}.{}", self.db, self.coll))
    }
}

#[cfg(test)]
mod test {
    use super::Namespace;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_display_and_from_str() {
        let ns = Namespace::new("test_db", "test_coll");
        let parsed = Namespace::from_str(&ns.to_string()).unwrap();
        assert_eq!(ns, parsed);
    }

    #[test]
    fn rejects_missing_collection() {
        assert!(Namespace::from_str("only_db").is_err());
    }

    #[test]
    fn keeps_dots_in_collection_name() {
        let ns = Namespace::from_str("db.coll.with.dots").unwrap();
        assert_eq!(ns.db, "db");
        assert_eq!(ns.coll, "coll.with.dots");
    }
}

//! FILENAME: subtotal-engine/src/sector.rs
//! Sector paths: the identity of a position in the grouping hierarchy.
//!
//! A sector path is the ordered list of group-key values from the root down
//! to a node, e.g. `["USA", "Smith"]`. Two rows with the same path belong to
//! the same group; a row whose path extends another's sits under it.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::value::Value;

/// Separator used when a sector path is turned into a string key.
pub const SECTOR_SEPARATOR: &str = "#";

/// Ordered group-key values identifying a node. Empty for the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorPath(SmallVec<[Value; 4]>);

impl SectorPath {
    pub fn root() -> Self {
        SectorPath(SmallVec::new())
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        SectorPath(values.into_iter().collect())
    }

    /// This path extended by one key.
    pub fn child(&self, key: Value) -> Self {
        let mut values = self.0.clone();
        values.push(key);
        SectorPath(values)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Same length and pairwise-equal elements.
    pub fn matches_exactly(&self, other: &SectorPath) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Strictly longer than `ancestor` and starting with it.
    pub fn is_descendant_of(&self, ancestor: &SectorPath) -> bool {
        self.0.len() > ancestor.0.len() && self.0[..ancestor.0.len()] == ancestor.0[..]
    }

    /// String key joining the display text of each element with `#`.
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(Value::display)
            .collect::<Vec<_>>()
            .join(SECTOR_SEPARATOR)
    }
}

impl Deref for SectorPath {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for SectorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl<const N: usize> From<[&str; N]> for SectorPath {
    fn from(values: [&str; N]) -> Self {
        SectorPath::from_values(values.into_iter().map(Value::from))
    }
}

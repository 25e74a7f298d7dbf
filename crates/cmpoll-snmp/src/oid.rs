//! ---
//! cmp_section: "05-networking-external-interfaces"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "SNMP session seam, wire transport and table walker."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::SnmpError;

/// Numeric object identifier. Ordering is lexicographic over the arcs, which is
/// the order agents return variables in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Build an identifier from its arcs.
    pub fn from_arcs(arcs: impl Into<Vec<u32>>) -> Self {
        Self(arcs.into())
    }

    /// Arcs making up the identifier.
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Number of arcs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Arcs below `prefix`, when `self` lies strictly under it.
    pub fn suffix_under(&self, prefix: &Oid) -> Option<&[u32]> {
        if self.0.len() > prefix.0.len() && self.starts_with(prefix) {
            Some(&self.0[prefix.0.len()..])
        } else {
            None
        }
    }

    /// Identifier with one more arc appended.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.0.clone();
        arcs.push(arc);
        Oid(arcs)
    }
}

impl FromStr for Oid {
    type Err = SnmpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(SnmpError::InvalidOid(s.to_owned()));
        }
        trimmed
            .split('.')
            .map(|arc| arc.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map(Oid)
            .map_err(|_| SnmpError::InvalidOid(s.to_owned()))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arc in &self.0 {
            write!(f, ".{}", arc)?;
        }
        Ok(())
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Oid(arcs.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_leading_dot() {
        let a: Oid = ".1.3.6.1.2.1.1.3.0".parse().unwrap();
        let b: Oid = "1.3.6.1.2.1.1.3.0".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), ".1.3.6.1.2.1.1.3.0");
        assert!("".parse::<Oid>().is_err());
        assert!(".1.3.x".parse::<Oid>().is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let root: Oid = ".1.3.6.1.2.1.10.127.1.1.1.1.6".parse().unwrap();
        let row3 = root.child(3);
        let row10 = root.child(10);
        let next_column: Oid = ".1.3.6.1.2.1.10.127.1.1.1.1.7.3".parse().unwrap();
        assert!(root < row3);
        assert!(row3 < row10);
        assert!(row10 < next_column);
    }

    #[test]
    fn suffix_only_for_strict_descendants() {
        let root: Oid = ".1.3.6.1.2.1.10.127.1.1.4.1.5".parse().unwrap();
        assert_eq!(root.child(48).suffix_under(&root), Some(&[48u32][..]));
        assert_eq!(root.suffix_under(&root), None);
        let sibling: Oid = ".1.3.6.1.2.1.10.127.1.1.4.1.6.48".parse().unwrap();
        assert_eq!(sibling.suffix_under(&root), None);
    }
}

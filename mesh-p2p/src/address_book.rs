//! address_book.rs
//!
//! Static mapping from logical node id to hardware address.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use mesh_common::{HwAddress, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressBook {
    entries: HashMap<NodeId, HwAddress>,
}

impl AddressBook {
    pub fn from_map(entries: HashMap<NodeId, HwAddress>) -> Self {
        Self { entries }
    }

    pub fn lookup(&self, id: &NodeId) -> Option<HwAddress> {
        self.entries.get(id).copied()
    }

    /// Finds the node owning a hardware address.
    pub fn reverse_lookup(&self, addr: HwAddress) -> Option<&NodeId> {
        self.entries
            .iter()
            .find(|(_, a)| **a == addr)
            .map(|(id, _)| id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    /// All known ids, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(NodeId, HwAddress)> for AddressBook {
    fn from_iter<T: IntoIterator<Item = (NodeId, HwAddress)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> AddressBook {
        [("A", 0xA), ("B", 0xB), ("C", 0xC)]
            .into_iter()
            .map(|(id, addr)| (NodeId::from(id), HwAddress(addr)))
            .collect()
    }

    #[test]
    fn test_lookup_both_directions() {
        let book = book();
        assert_eq!(book.lookup(&"B".into()), Some(HwAddress(0xB)));
        assert_eq!(book.reverse_lookup(HwAddress(0xC)), Some(&NodeId::from("C")));
        assert_eq!(book.lookup(&"Z".into()), None);
        assert_eq!(book.reverse_lookup(HwAddress(0xFF)), None);
    }

    #[test]
    fn test_ids_are_sorted() {
        assert_eq!(book().ids(), vec![NodeId::from("A"), "B".into(), "C".into()]);
    }

    #[test]
    fn test_deserializes_from_hex_map() {
        let json = r#"{"A":"0013A20041F5B73D","B":"0013A20041F5B73E"}"#;
        let book: AddressBook = serde_json::from_str(json).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.lookup(&"A".into()), Some(HwAddress(0x0013_A200_41F5_B73D)));
    }
}

use serde::{Deserialize, Serialize};

/// Logical identifier for a node in the mesh.
///
/// `NodeId` is a lightweight wrapper around `String`, designed to:
/// - Ensure type safety across APIs
/// - Enable strong `HashMap`/`HashSet` keys
/// - Provide readable formatting and conversions
///
/// Ids are short tokens (`"A"`, `"B"`, ...) since every byte counts on the radio link.
#[derive(Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    /// Converts from a string literal or slice to a `NodeId`.
    ///
    /// Example:
    /// ```rust
    /// use mesh_common::NodeId;
    /// let id: NodeId = "A".into();
    /// ```
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

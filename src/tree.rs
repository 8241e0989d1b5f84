//! Resume content tree – an ordered N-ary tree of named nodes.
//!
//! Nodes live in an arena owned by [`Tree`]; parent/child links are
//! [`NodeId`] indices rather than references, so children stay exclusively
//! owned by their parent and no back-pointers are needed. Sibling names are
//! unique and sibling ordering indices are kept contiguous on every
//! insert/remove/reorder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fallback point size used when a font-size string fails to parse.
/// Inherited legacy default.
pub const DEFAULT_POINT_SIZE: f32 = 12.0;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A single named content node.
#[derive(Debug, Clone)]
pub struct Node {
    /// Name, unique among siblings (e.g. "employment", "employer").
    pub name: String,
    /// Scalar value carried by this node; empty for pure containers.
    pub value: String,
    /// Ordering index within the sibling group, contiguous from 0.
    pub index: usize,
    /// Disabled nodes are skipped when building the render context.
    pub enabled: bool,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena-backed content tree with a single root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree containing only a root node.
    pub fn new(root_name: &str) -> Self {
        let root = Node {
            name: root_name.to_string(),
            value: String::new(),
            index: 0,
            enabled: true,
            children: Vec::new(),
            parent: None,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Ordered child ids of `parent`.
    pub fn children(&self, parent: NodeId) -> &[NodeId] {
        &self.nodes[parent.0].children
    }

    /// Append a child under `parent`. Sibling names are unique: adding a
    /// name that already exists updates that node's value in place and
    /// returns its id (upsert semantics).
    pub fn add_child(&mut self, parent: NodeId, name: &str, value: &str) -> NodeId {
        if let Some(existing) = self.child_by_name(parent, name) {
            self.nodes[existing.0].value = value.to_string();
            return existing;
        }
        let index = self.nodes[parent.0].children.len();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            value: value.to_string(),
            index,
            enabled: true,
            children: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Find a direct child of `parent` by name.
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].name == name)
    }

    /// Update a node's scalar value.
    pub fn set_value(&mut self, id: NodeId, value: &str) {
        self.nodes[id.0].value = value.to_string();
    }

    /// Detach `id` from its parent and reindex the remaining siblings so
    /// their ordering indices stay contiguous. The node and its subtree
    /// remain in the arena but are unreachable afterwards.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id.0].parent else {
            return; // root cannot be removed
        };
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        self.reindex(parent);
    }

    /// Move a child to `new_index` within its sibling group, clamping to the
    /// valid range, then reindex the group.
    pub fn reorder(&mut self, id: NodeId, new_index: usize) {
        let Some(parent) = self.nodes[id.0].parent else {
            return;
        };
        let children = &mut self.nodes[parent.0].children;
        let Some(pos) = children.iter().position(|&c| c == id) else {
            return;
        };
        children.remove(pos);
        let target = new_index.min(children.len());
        children.insert(target, id);
        self.reindex(parent);
    }

    fn reindex(&mut self, parent: NodeId) {
        let children = self.nodes[parent.0].children.clone();
        for (i, child) in children.into_iter().enumerate() {
            self.nodes[child.0].index = i;
        }
    }

    /// Load a tree from its serialized nested form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let root: JsonNode = serde_json::from_str(json)?;
        let mut tree = Tree::new(&root.name);
        tree.node_mut(tree.root()).value = root.value.clone();
        tree.node_mut(tree.root()).enabled = root.enabled;
        let root_id = tree.root();
        for child in &root.children {
            Self::graft(&mut tree, root_id, child);
        }
        Ok(tree)
    }

    /// Serialize the reachable tree to its nested form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_json_node(self.root))
    }

    fn graft(tree: &mut Tree, parent: NodeId, node: &JsonNode) {
        let id = tree.add_child(parent, &node.name, &node.value);
        tree.node_mut(id).enabled = node.enabled;
        for child in &node.children {
            Self::graft(tree, id, child);
        }
    }

    fn to_json_node(&self, id: NodeId) -> JsonNode {
        let node = self.node(id);
        JsonNode {
            name: node.name.clone(),
            value: node.value.clone(),
            enabled: node.enabled,
            children: node
                .children
                .iter()
                .map(|&c| self.to_json_node(c))
                .collect(),
        }
    }
}

/// Nested on-disk form of a tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonNode {
    name: String,
    #[serde(default)]
    value: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    children: Vec<JsonNode>,
}

fn default_enabled() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Font sizes
// ---------------------------------------------------------------------------

/// Font-role name → point-size string, with an independent lifecycle from
/// the content tree. Sizes are stored as the user typed them and parsed on
/// demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FontSizes {
    sizes: HashMap<String, String>,
}

impl FontSizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, role: &str, size: &str) {
        self.sizes.insert(role.to_string(), size.to_string());
    }

    /// Point size for a role, falling back to [`DEFAULT_POINT_SIZE`] when
    /// the stored string does not parse as a number.
    pub fn resolved(&self, role: &str) -> f32 {
        self.sizes
            .get(role)
            .and_then(|s| s.trim().trim_end_matches("pt").trim().parse::<f32>().ok())
            .unwrap_or(DEFAULT_POINT_SIZE)
    }

    /// CSS-ready value, e.g. "12pt".
    pub fn css_value(&self, role: &str) -> String {
        let pt = self.resolved(role);
        if (pt - pt.round()).abs() < f32::EPSILON {
            format!("{}pt", pt.round() as i64)
        } else {
            format!("{pt}pt")
        }
    }

    /// Iterate roles in sorted order for deterministic context output.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.sizes.keys().map(|k| k.as_str()).collect();
        roles.sort_unstable();
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup_children() {
        let mut tree = Tree::new("resume");
        let root = tree.root();
        let skills = tree.add_child(root, "skills", "");
        tree.add_child(skills, "0", "Rust");
        tree.add_child(skills, "1", "Swift");

        assert_eq!(tree.children(skills).len(), 2);
        assert_eq!(tree.child_by_name(root, "skills"), Some(skills));
        assert_eq!(tree.node(tree.children(skills)[1]).value, "Swift");
    }

    #[test]
    fn sibling_names_are_unique() {
        let mut tree = Tree::new("resume");
        let root = tree.root();
        let a = tree.add_child(root, "summary", "first");
        let b = tree.add_child(root, "summary", "second");
        assert_eq!(a, b);
        assert_eq!(tree.node(a).value, "second");
        assert_eq!(tree.children(root).len(), 1);
    }

    #[test]
    fn remove_reindexes_siblings() {
        let mut tree = Tree::new("resume");
        let root = tree.root();
        let a = tree.add_child(root, "a", "");
        let b = tree.add_child(root, "b", "");
        let c = tree.add_child(root, "c", "");
        tree.remove(b);

        assert_eq!(tree.children(root), &[a, c]);
        assert_eq!(tree.node(a).index, 0);
        assert_eq!(tree.node(c).index, 1);
    }

    #[test]
    fn reorder_moves_and_reindexes() {
        let mut tree = Tree::new("resume");
        let root = tree.root();
        let a = tree.add_child(root, "a", "");
        let b = tree.add_child(root, "b", "");
        let c = tree.add_child(root, "c", "");
        tree.reorder(c, 0);

        assert_eq!(tree.children(root), &[c, a, b]);
        assert_eq!(tree.node(c).index, 0);
        assert_eq!(tree.node(b).index, 2);
    }

    #[test]
    fn json_round_trip() {
        let mut tree = Tree::new("resume");
        let root = tree.root();
        let emp = tree.add_child(root, "employment", "");
        let job = tree.add_child(emp, "0", "");
        tree.add_child(job, "employer", "Acme");

        let json = tree.to_json().unwrap();
        let restored = Tree::from_json(&json).unwrap();
        let emp2 = restored.child_by_name(restored.root(), "employment").unwrap();
        let job2 = restored.children(emp2)[0];
        let employer = restored.child_by_name(job2, "employer").unwrap();
        assert_eq!(restored.node(employer).value, "Acme");
    }

    #[test]
    fn font_size_fallback() {
        let mut fonts = FontSizes::new();
        fonts.set("body", "11");
        fonts.set("heading", "not a number");
        assert_eq!(fonts.resolved("body"), 11.0);
        assert_eq!(fonts.resolved("heading"), DEFAULT_POINT_SIZE);
        assert_eq!(fonts.resolved("missing"), DEFAULT_POINT_SIZE);
        assert_eq!(fonts.css_value("body"), "11pt");
    }
}

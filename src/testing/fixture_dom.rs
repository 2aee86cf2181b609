//! In-memory document fixture implementing [`DocumentView`].
//!
//! Nodes are created through the mutator API and inspected through the trait.
//! Inspection failures can be injected per node (`poison`) to exercise the
//! classifier's conservative fallbacks, and nodes can be detached outright to
//! simulate removal between mutation delivery and classification.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::dom::{
    ComputedStyle, DocumentView, InspectError, NodeId, NodeKind, ReadyState, Rect, Size,
};

#[derive(Clone)]
struct FixtureNode {
    kind: NodeKind,
    tag: String,
    element_id: Option<String>,
    class_name: Option<String>,
    attributes: HashMap<String, String>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    style: ComputedStyle,
    rect: Rect,
    svg_animated: bool,
    poisoned: bool,
}

impl FixtureNode {
    fn element(tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            kind: NodeKind::Element,
            tag: tag.to_lowercase(),
            element_id: None,
            class_name: None,
            attributes: HashMap::new(),
            text: None,
            parent,
            children: Vec::new(),
            style: ComputedStyle::default(),
            rect: Rect::new(10.0, 10.0, 110.0, 30.0),
            svg_animated: false,
            poisoned: false,
        }
    }

    fn text(content: &str, parent: NodeId) -> Self {
        Self {
            kind: NodeKind::Text,
            tag: String::new(),
            element_id: None,
            class_name: None,
            attributes: HashMap::new(),
            text: Some(content.to_string()),
            parent: Some(parent),
            children: Vec::new(),
            style: ComputedStyle::default(),
            rect: Rect::default(),
            svg_animated: false,
            poisoned: false,
        }
    }
}

struct DocState {
    nodes: HashMap<u64, FixtureNode>,
    next_id: u64,
    root: NodeId,
    viewport: Size,
    ready_state: ReadyState,
    large_candidates: usize,
}

impl DocState {
    fn collect_text(&self, node: NodeId, out: &mut String) {
        if let Some(n) = self.nodes.get(&node.0) {
            if let Some(text) = &n.text {
                out.push_str(text);
            }
            for child in &n.children {
                self.collect_text(*child, out);
            }
        }
    }
}

/// Mutable in-memory document for tests and replay scenarios.
pub struct FixtureDocument {
    state: Mutex<DocState>,
}

impl FixtureDocument {
    /// Create a document with a viewport-sized `body` root.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        let viewport = Size::new(1280.0, 800.0);
        let root = NodeId(1);
        let mut body = FixtureNode::element("body", None);
        body.rect = viewport.as_rect();
        nodes.insert(root.0, body);

        Self {
            state: Mutex::new(DocState {
                nodes,
                next_id: 2,
                root,
                viewport,
                ready_state: ReadyState::Loading,
                large_candidates: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DocState> {
        self.state.lock().expect("fixture document poisoned")
    }

    /// Add an element under `parent` (the root when `None`).
    pub fn add_element(&self, tag: &str, parent: Option<NodeId>) -> NodeId {
        let mut state = self.lock();
        let parent = parent.unwrap_or(state.root);
        let id = NodeId(state.next_id);
        state.next_id += 1;
        state.nodes.insert(id.0, FixtureNode::element(tag, Some(parent)));
        if let Some(p) = state.nodes.get_mut(&parent.0) {
            p.children.push(id);
        }
        id
    }

    /// Add a text node under `parent`.
    pub fn add_text(&self, content: &str, parent: NodeId) -> NodeId {
        let mut state = self.lock();
        let id = NodeId(state.next_id);
        state.next_id += 1;
        state.nodes.insert(id.0, FixtureNode::text(content, parent));
        if let Some(p) = state.nodes.get_mut(&parent.0) {
            p.children.push(id);
        }
        id
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.rect = rect;
        }
    }

    pub fn set_style(&self, node: NodeId, style: ComputedStyle) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.style = style;
        }
    }

    pub fn set_element_id(&self, node: NodeId, id: &str) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.element_id = Some(id.to_string());
        }
    }

    pub fn set_class(&self, node: NodeId, class: &str) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.class_name = Some(class.to_string());
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn set_text(&self, node: NodeId, content: &str) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.text = Some(content.to_string());
        }
    }

    pub fn set_svg_animated(&self, node: NodeId, animated: bool) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.svg_animated = animated;
        }
    }

    /// Make geometry/style inspection fail for this node.
    pub fn poison(&self, node: NodeId) {
        if let Some(n) = self.lock().nodes.get_mut(&node.0) {
            n.poisoned = true;
        }
    }

    /// Remove the node from the document entirely.
    pub fn detach(&self, node: NodeId) {
        let mut state = self.lock();
        let parent = state.nodes.get(&node.0).and_then(|n| n.parent);
        state.nodes.remove(&node.0);
        if let Some(parent) = parent {
            if let Some(p) = state.nodes.get_mut(&parent.0) {
                p.children.retain(|c| *c != node);
            }
        }
    }

    pub fn set_viewport(&self, viewport: Size) {
        self.lock().viewport = viewport;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.lock().ready_state = ready_state;
    }

    pub fn set_large_candidates(&self, count: usize) {
        self.lock().large_candidates = count;
    }
}

impl Default for FixtureDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentView for FixtureDocument {
    fn root(&self) -> NodeId {
        self.lock().root
    }

    fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.lock().nodes.get(&node.0).map(|n| n.kind)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        let state = self.lock();
        let n = state.nodes.get(&node.0)?;
        (n.kind == NodeKind::Element).then(|| n.tag.clone())
    }

    fn element_id(&self, node: NodeId) -> Option<String> {
        self.lock().nodes.get(&node.0)?.element_id.clone()
    }

    fn class_name(&self, node: NodeId) -> Option<String> {
        self.lock().nodes.get(&node.0)?.class_name.clone()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().nodes.get(&node.0)?.parent
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock().nodes.get(&node.0)?.attributes.get(name).cloned()
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        let state = self.lock();
        state.nodes.get(&node.0)?;
        let mut out = String::new();
        state.collect_text(node, &mut out);
        Some(out)
    }

    fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, InspectError> {
        let state = self.lock();
        match state.nodes.get(&node.0) {
            Some(n) if n.poisoned => Err(InspectError::new("style query refused")),
            Some(n) => Ok(n.style.clone()),
            None => Err(InspectError::detached(node)),
        }
    }

    fn bounding_rect(&self, node: NodeId) -> Result<Rect, InspectError> {
        let state = self.lock();
        match state.nodes.get(&node.0) {
            Some(n) if n.poisoned => Err(InspectError::new("geometry query refused")),
            Some(n) => Ok(n.rect),
            None => Err(InspectError::detached(node)),
        }
    }

    fn viewport(&self) -> Size {
        self.lock().viewport
    }

    fn contains_svg_animation(&self, node: NodeId) -> bool {
        self.lock()
            .nodes
            .get(&node.0)
            .map(|n| n.svg_animated)
            .unwrap_or(false)
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }

    fn large_content_candidates(&self) -> usize {
        self.lock().large_candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_construction_and_text() {
        let doc = FixtureDocument::new();
        let div = doc.add_element("div", None);
        let text = doc.add_text("hello", div);

        assert_eq!(doc.node_kind(div), Some(NodeKind::Element));
        assert_eq!(doc.node_kind(text), Some(NodeKind::Text));
        assert_eq!(doc.parent(text), Some(div));
        assert_eq!(doc.text_content(div).as_deref(), Some("hello"));
    }

    #[test]
    fn test_detached_node_inspection_fails() {
        let doc = FixtureDocument::new();
        let div = doc.add_element("div", None);
        doc.detach(div);

        assert_eq!(doc.node_kind(div), None);
        assert!(doc.bounding_rect(div).is_err());
        assert!(doc.computed_style(div).is_err());
    }

    #[test]
    fn test_poisoned_node_inspection_fails() {
        let doc = FixtureDocument::new();
        let div = doc.add_element("div", None);
        doc.poison(div);

        assert!(doc.bounding_rect(div).is_err());
        assert!(doc.computed_style(div).is_err());
        // Non-geometry queries still answer.
        assert_eq!(doc.tag_name(div).as_deref(), Some("div"));
    }
}

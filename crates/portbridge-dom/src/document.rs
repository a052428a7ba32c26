use portbridge_core::DomError;

/// A resolved node. `Root` is the scrolling element of the page.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Root,
    Element(String),
}

impl NodeRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Element(id) => Some(id),
        }
    }
}

/// The DOM surface the deferred effects need. Nodes are resolved with
/// [`Document::lookup`] first; the other methods are only called with nodes
/// that resolved in the same frame.
pub trait Document {
    fn lookup(&self, id: &str) -> Option<NodeRef>;

    fn scroll_top(&self, node: &NodeRef) -> f64;
    /// Implementations clamp to the scrollable range.
    fn set_scroll_top(&mut self, node: &NodeRef, top: f64);
    fn scroll_height(&self, node: &NodeRef) -> f64;

    /// Top edge relative to the viewport.
    fn bounding_top(&self, node: &NodeRef) -> f64;
    /// Top edge relative to the offset parent.
    fn offset_top(&self, node: &NodeRef) -> f64;

    /// Height the node needs to show its content without scrolling.
    fn content_height(&self, node: &NodeRef) -> f64;
    fn set_height(&mut self, node: &NodeRef, height: f64);

    fn focus(&mut self, node: &NodeRef);
    /// Select the whole text value of a text field.
    fn select_all(&mut self, node: &NodeRef) -> Result<(), DomError>;
}

//! Headless document: geometry and text state without a browser.

use std::collections::HashMap;

use portbridge_core::DomError;

use crate::document::{Document, NodeRef};

pub const LINE_HEIGHT: f64 = 20.0;
/// Vertical padding plus border of a text field.
pub const FIELD_PADDING: f64 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Block,
    TextArea,
    Input,
}

impl ElementKind {
    fn is_text_field(self) -> bool {
        matches!(self, Self::TextArea | Self::Input)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    /// Distance from the top of the document.
    pub offset_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
    pub scroll_top: f64,
    /// Explicit style height, set by autosize.
    pub height: Option<f64>,
    pub value: String,
    /// Selected range in characters.
    pub selection: Option<(usize, usize)>,
}

impl Element {
    fn new(kind: ElementKind, offset_top: f64, client_height: f64, scroll_height: f64) -> Self {
        Self {
            kind,
            offset_top,
            client_height,
            scroll_height,
            scroll_top: 0.0,
            height: None,
            value: String::new(),
            selection: None,
        }
    }

    fn max_scroll(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    fn content_height(&self) -> f64 {
        match self.kind {
            ElementKind::Block => self.scroll_height,
            ElementKind::Input => LINE_HEIGHT + FIELD_PADDING,
            ElementKind::TextArea => {
                let lines = self.value.split('\n').count().max(1);
                lines as f64 * LINE_HEIGHT + FIELD_PADDING
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    viewport_height: f64,
    document_height: f64,
    scroll_top: f64,
    elements: HashMap<String, Element>,
    focused: Option<String>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new(800.0, 800.0)
    }
}

impl Page {
    pub fn new(viewport_height: f64, document_height: f64) -> Self {
        Self {
            viewport_height,
            document_height,
            scroll_top: 0.0,
            elements: HashMap::new(),
            focused: None,
        }
    }

    /// Scrollable block.
    pub fn with_block(
        mut self,
        id: &str,
        offset_top: f64,
        client_height: f64,
        scroll_height: f64,
    ) -> Self {
        let element = Element::new(ElementKind::Block, offset_top, client_height, scroll_height);
        self.elements.insert(id.to_owned(), element);
        self
    }

    pub fn with_textarea(mut self, id: &str, offset_top: f64, value: &str) -> Self {
        let mut element = Element::new(ElementKind::TextArea, offset_top, 0.0, 0.0);
        element.value = value.to_owned();
        element.client_height = element.content_height();
        element.scroll_height = element.client_height;
        self.elements.insert(id.to_owned(), element);
        self
    }

    pub fn with_input(mut self, id: &str, offset_top: f64, value: &str) -> Self {
        let mut element = Element::new(ElementKind::Input, offset_top, 0.0, 0.0);
        element.value = value.to_owned();
        element.client_height = element.content_height();
        element.scroll_height = element.client_height;
        self.elements.insert(id.to_owned(), element);
        self
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn root_scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Replace a field's text, as typing would. Returns false for unknown ids.
    pub fn set_value(&mut self, id: &str, value: &str) -> bool {
        let Some(element) = self.elements.get_mut(id) else {
            return false;
        };
        element.value = value.to_owned();
        element.selection = None;
        if element.kind == ElementKind::TextArea {
            element.scroll_height = element.content_height().max(element.client_height);
        }
        true
    }

    /// Take an element out of the page, as a re-render would.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.focused.as_deref() == Some(id) {
            self.focused = None;
        }
        self.elements.remove(id).is_some()
    }

    fn max_root_scroll(&self) -> f64 {
        (self.document_height - self.viewport_height).max(0.0)
    }
}

impl Document for Page {
    fn lookup(&self, id: &str) -> Option<NodeRef> {
        self.elements
            .contains_key(id)
            .then(|| NodeRef::Element(id.to_owned()))
    }

    fn scroll_top(&self, node: &NodeRef) -> f64 {
        match node {
            NodeRef::Root => self.scroll_top,
            NodeRef::Element(id) => self.elements.get(id).map_or(0.0, |e| e.scroll_top),
        }
    }

    fn set_scroll_top(&mut self, node: &NodeRef, top: f64) {
        match node {
            NodeRef::Root => self.scroll_top = top.clamp(0.0, self.max_root_scroll()),
            NodeRef::Element(id) => {
                if let Some(element) = self.elements.get_mut(id) {
                    element.scroll_top = top.clamp(0.0, element.max_scroll());
                }
            }
        }
    }

    fn scroll_height(&self, node: &NodeRef) -> f64 {
        match node {
            NodeRef::Root => self.document_height,
            NodeRef::Element(id) => self.elements.get(id).map_or(0.0, |e| e.scroll_height),
        }
    }

    fn bounding_top(&self, node: &NodeRef) -> f64 {
        match node {
            NodeRef::Root => -self.scroll_top,
            NodeRef::Element(id) => self
                .elements
                .get(id)
                .map_or(0.0, |e| e.offset_top - self.scroll_top),
        }
    }

    fn offset_top(&self, node: &NodeRef) -> f64 {
        match node {
            NodeRef::Root => 0.0,
            NodeRef::Element(id) => self.elements.get(id).map_or(0.0, |e| e.offset_top),
        }
    }

    fn content_height(&self, node: &NodeRef) -> f64 {
        match node {
            NodeRef::Root => self.document_height,
            NodeRef::Element(id) => self.elements.get(id).map_or(0.0, Element::content_height),
        }
    }

    fn set_height(&mut self, node: &NodeRef, height: f64) {
        if let NodeRef::Element(id) = node {
            if let Some(element) = self.elements.get_mut(id) {
                element.height = Some(height);
                element.client_height = height;
            }
        }
    }

    fn focus(&mut self, node: &NodeRef) {
        self.focused = node.id().map(str::to_owned);
    }

    fn select_all(&mut self, node: &NodeRef) -> Result<(), DomError> {
        let id = node.id().unwrap_or_default();
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| DomError::ElementNotFound { id: id.to_owned() })?;
        if !element.kind.is_text_field() {
            return Err(DomError::NotTextField { id: id.to_owned() });
        }
        element.selection = Some((0, element.value.chars().count()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn el(id: &str) -> NodeRef {
        NodeRef::Element(id.into())
    }

    #[test]
    fn lookup_only_resolves_known_ids() {
        let page = Page::default().with_block("feed", 0.0, 100.0, 400.0);
        assert_eq!(page.lookup("feed"), Some(el("feed")));
        assert_eq!(page.lookup("missing"), None);
    }

    #[test]
    fn root_scroll_is_clamped() {
        let mut page = Page::new(600.0, 1000.0);
        page.set_scroll_top(&NodeRef::Root, 5000.0);
        assert_eq!(page.root_scroll_top(), 400.0);
        page.set_scroll_top(&NodeRef::Root, -20.0);
        assert_eq!(page.root_scroll_top(), 0.0);
    }

    #[test]
    fn element_scroll_is_clamped() {
        let mut page = Page::default().with_block("feed", 0.0, 100.0, 400.0);
        page.set_scroll_top(&el("feed"), 1000.0);
        assert_eq!(page.scroll_top(&el("feed")), 300.0);
    }

    #[test]
    fn bounding_top_follows_root_scroll() {
        let mut page = Page::new(600.0, 2000.0).with_block("card", 900.0, 50.0, 50.0);
        assert_eq!(page.bounding_top(&el("card")), 900.0);
        page.set_scroll_top(&NodeRef::Root, 300.0);
        assert_eq!(page.bounding_top(&el("card")), 600.0);
        assert_eq!(page.offset_top(&el("card")), 900.0);
    }

    #[test]
    fn textarea_content_height_counts_lines() {
        let page = Page::default().with_textarea("composer", 0.0, "one\ntwo\nthree");
        assert_eq!(
            page.content_height(&el("composer")),
            3.0 * LINE_HEIGHT + FIELD_PADDING
        );
    }

    #[test]
    fn select_all_covers_value_in_chars() {
        let mut page = Page::default().with_input("search", 0.0, "héllo");
        page.select_all(&el("search")).unwrap();
        assert_eq!(page.element("search").unwrap().selection, Some((0, 5)));
    }

    #[test]
    fn select_all_rejects_blocks() {
        let mut page = Page::default().with_block("feed", 0.0, 10.0, 10.0);
        assert_matches!(
            page.select_all(&el("feed")),
            Err(DomError::NotTextField { id }) if id == "feed"
        );
    }

    #[test]
    fn set_value_clears_selection() {
        let mut page = Page::default().with_input("search", 0.0, "abc");
        page.select_all(&el("search")).unwrap();
        assert!(page.set_value("search", "abcd"));
        assert_eq!(page.element("search").unwrap().selection, None);
        assert!(!page.set_value("nope", "x"));
    }
}

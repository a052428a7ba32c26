//! Browser document backed by `web-sys`.

use portbridge_core::DomError;
use wasm_bindgen::JsCast;
use web_sys::{HtmlElement, HtmlInputElement, HtmlTextAreaElement};

use crate::document::{Document, NodeRef};

pub struct WebDocument {
    document: web_sys::Document,
}

impl WebDocument {
    pub fn new(document: web_sys::Document) -> Self {
        Self { document }
    }

    /// Document of the current window, if there is one.
    pub fn from_window() -> Option<Self> {
        web_sys::window()?.document().map(Self::new)
    }

    fn element(&self, node: &NodeRef) -> Option<web_sys::Element> {
        match node {
            NodeRef::Root => self
                .document
                .scrolling_element()
                .or_else(|| self.document.document_element()),
            NodeRef::Element(id) => self.document.get_element_by_id(id),
        }
    }

    fn html(&self, node: &NodeRef) -> Option<HtmlElement> {
        self.element(node)?.dyn_into::<HtmlElement>().ok()
    }
}

impl Document for WebDocument {
    fn lookup(&self, id: &str) -> Option<NodeRef> {
        self.document
            .get_element_by_id(id)
            .map(|_| NodeRef::Element(id.to_owned()))
    }

    fn scroll_top(&self, node: &NodeRef) -> f64 {
        self.element(node).map_or(0.0, |e| f64::from(e.scroll_top()))
    }

    fn set_scroll_top(&mut self, node: &NodeRef, top: f64) {
        if let Some(element) = self.element(node) {
            element.set_scroll_top(top.round() as i32);
        }
    }

    fn scroll_height(&self, node: &NodeRef) -> f64 {
        self.element(node).map_or(0.0, |e| f64::from(e.scroll_height()))
    }

    fn bounding_top(&self, node: &NodeRef) -> f64 {
        self.element(node)
            .map_or(0.0, |e| e.get_bounding_client_rect().top())
    }

    fn offset_top(&self, node: &NodeRef) -> f64 {
        self.html(node).map_or(0.0, |e| f64::from(e.offset_top()))
    }

    fn content_height(&self, node: &NodeRef) -> f64 {
        let Some(element) = self.html(node) else {
            return 0.0;
        };
        // Collapse first so scrollHeight reflects the content, not the box.
        let style = element.style();
        let _ = style.set_property("height", "auto");
        let border = f64::from(element.offset_height() - element.client_height());
        f64::from(element.scroll_height()) + border
    }

    fn set_height(&mut self, node: &NodeRef, height: f64) {
        if let Some(element) = self.html(node) {
            let _ = element.style().set_property("height", &format!("{height}px"));
        }
    }

    fn focus(&mut self, node: &NodeRef) {
        if let Some(element) = self.html(node) {
            let _ = element.focus();
        }
    }

    fn select_all(&mut self, node: &NodeRef) -> Result<(), DomError> {
        let id = node.id().unwrap_or_default().to_owned();
        let element = self
            .element(node)
            .ok_or_else(|| DomError::ElementNotFound { id: id.clone() })?;
        if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
            input.select();
        } else if let Some(area) = element.dyn_ref::<HtmlTextAreaElement>() {
            area.select();
        } else {
            return Err(DomError::NotTextField { id });
        }
        Ok(())
    }
}

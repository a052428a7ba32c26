//! Grow-to-fit sizing for text fields.

use std::collections::HashSet;

use portbridge_core::DomError;

use crate::document::{Document, NodeRef};

/// Fields currently sized to their content. Detached fields keep whatever
/// height they had last.
#[derive(Debug, Default)]
pub struct Autosize {
    attached: HashSet<String>,
}

impl Autosize {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `id` and size it now. Attaching twice is harmless.
    pub fn attach(&mut self, doc: &mut dyn Document, id: &str) -> Result<(), DomError> {
        let node = resolve(doc, id)?;
        if self.attached.insert(id.to_owned()) {
            tracing::debug!(id, "autosize attached");
        }
        resize(doc, &node);
        Ok(())
    }

    /// Force a recalculation, e.g. after the value changed programmatically.
    pub fn update(&mut self, doc: &mut dyn Document, id: &str) -> Result<(), DomError> {
        let node = match resolve(doc, id) {
            Ok(node) => node,
            Err(e) => {
                self.forget(id);
                return Err(e);
            }
        };
        if self.attached.contains(id) {
            resize(doc, &node);
        }
        Ok(())
    }

    pub fn destroy(&mut self, id: &str) {
        if self.attached.remove(id) {
            tracing::debug!(id, "autosize detached");
        }
    }

    /// Input event on `id`. Returns whether the field was resized.
    pub fn on_input(&mut self, doc: &mut dyn Document, id: &str) -> bool {
        if !self.attached.contains(id) {
            return false;
        }
        match doc.lookup(id) {
            Some(node) => {
                resize(doc, &node);
                true
            }
            None => {
                self.forget(id);
                false
            }
        }
    }

    // Fields that left the document are dropped on the next touch.
    fn forget(&mut self, id: &str) {
        if self.attached.remove(id) {
            tracing::debug!(id, "autosize target gone, detached");
        }
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.attached.contains(id)
    }
}

fn resolve(doc: &dyn Document, id: &str) -> Result<NodeRef, DomError> {
    doc.lookup(id)
        .ok_or_else(|| DomError::ElementNotFound { id: id.to_owned() })
}

fn resize(doc: &mut dyn Document, node: &NodeRef) {
    let height = doc.content_height(node);
    doc.set_height(node, height);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Page, FIELD_PADDING, LINE_HEIGHT};
    use assert_matches::assert_matches;

    fn height(page: &Page, id: &str) -> Option<f64> {
        page.element(id).and_then(|e| e.height)
    }

    #[test]
    fn attach_sizes_immediately() {
        let mut page = Page::default().with_textarea("composer", 0.0, "a\nb");
        let mut autosize = Autosize::new();
        autosize.attach(&mut page, "composer").unwrap();
        assert!(autosize.is_attached("composer"));
        assert_eq!(height(&page, "composer"), Some(2.0 * LINE_HEIGHT + FIELD_PADDING));
    }

    #[test]
    fn input_resizes_only_while_attached() {
        let mut page = Page::default().with_textarea("composer", 0.0, "a");
        let mut autosize = Autosize::new();
        autosize.attach(&mut page, "composer").unwrap();

        page.set_value("composer", "a\nb\nc");
        assert!(autosize.on_input(&mut page, "composer"));
        assert_eq!(height(&page, "composer"), Some(3.0 * LINE_HEIGHT + FIELD_PADDING));

        autosize.destroy("composer");
        page.set_value("composer", "a\nb\nc\nd\ne");
        assert!(!autosize.on_input(&mut page, "composer"));
        assert_eq!(height(&page, "composer"), Some(3.0 * LINE_HEIGHT + FIELD_PADDING));
    }

    #[test]
    fn removed_fields_are_forgotten() {
        let mut page = Page::default()
            .with_textarea("draft", 0.0, "a")
            .with_textarea("reply", 40.0, "b");
        let mut autosize = Autosize::new();
        autosize.attach(&mut page, "draft").unwrap();
        autosize.attach(&mut page, "reply").unwrap();

        page.remove("draft");
        page.remove("reply");
        assert!(!autosize.on_input(&mut page, "draft"));
        assert!(!autosize.is_attached("draft"));
        assert_matches!(
            autosize.update(&mut page, "reply"),
            Err(DomError::ElementNotFound { .. })
        );
        assert!(!autosize.is_attached("reply"));
    }

    #[test]
    fn attach_missing_element_fails() {
        let mut page = Page::default();
        let mut autosize = Autosize::new();
        assert_matches!(
            autosize.attach(&mut page, "ghost"),
            Err(DomError::ElementNotFound { id }) if id == "ghost"
        );
        assert!(!autosize.is_attached("ghost"));
    }
}

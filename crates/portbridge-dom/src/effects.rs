use portbridge_core::{
    AutosizeArgs, AutosizeMethod, ContainerId, DomError, InboundPort, ScrollToArgs,
    ScrollToBottomArgs,
};

use crate::autosize::Autosize;
use crate::document::{Document, NodeRef};

/// A DOM mutation requested through a port, applied on the next frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DomEffect {
    ScrollTo(ScrollToArgs),
    ScrollToBottom(ScrollToBottomArgs),
    Autosize(AutosizeArgs),
    Select(String),
}

impl DomEffect {
    /// The effect carried by a DOM port, or the port back if it is a socket port.
    pub fn from_port(port: InboundPort) -> Result<Self, InboundPort> {
        match port {
            InboundPort::ScrollTo(args) => Ok(Self::ScrollTo(args)),
            InboundPort::ScrollToBottom(args) => Ok(Self::ScrollToBottom(args)),
            InboundPort::Autosize(args) => Ok(Self::Autosize(args)),
            InboundPort::Select(id) => Ok(Self::Select(id)),
            other => Err(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ScrollTo(_) => "scrollTo",
            Self::ScrollToBottom(_) => "scrollToBottom",
            Self::Autosize(_) => "autosize",
            Self::Select(_) => "select",
        }
    }

    /// Scrolls silently skip unresolved nodes; autosize and select report them.
    pub fn apply(&self, doc: &mut dyn Document, autosize: &mut Autosize) -> Result<(), DomError> {
        match self {
            Self::ScrollTo(args) => {
                scroll_to(doc, args);
                Ok(())
            }
            Self::ScrollToBottom(args) => {
                scroll_to_bottom(doc, &args.container_id);
                Ok(())
            }
            Self::Autosize(args) => {
                autosize.attach(doc, &args.id)?;
                match args.method {
                    AutosizeMethod::Create => Ok(()),
                    AutosizeMethod::Update => autosize.update(doc, &args.id),
                    AutosizeMethod::Destroy => {
                        autosize.destroy(&args.id);
                        Ok(())
                    }
                }
            }
            Self::Select(id) => {
                let node = doc
                    .lookup(id)
                    .ok_or_else(|| DomError::ElementNotFound { id: id.clone() })?;
                doc.focus(&node);
                doc.select_all(&node)
            }
        }
    }
}

// Document scrolling is viewport-relative and subtracts the offset; container
// scrolling uses the anchor's offset-parent position and adds it.
fn scroll_to(doc: &mut dyn Document, args: &ScrollToArgs) {
    match &args.container_id {
        ContainerId::Document => {
            let Some(anchor) = doc.lookup(&args.anchor_id) else {
                return;
            };
            let top = doc.scroll_top(&NodeRef::Root) + doc.bounding_top(&anchor) - args.offset;
            doc.set_scroll_top(&NodeRef::Root, top);
        }
        ContainerId::Element(container_id) => {
            let (Some(container), Some(anchor)) =
                (doc.lookup(container_id), doc.lookup(&args.anchor_id))
            else {
                return;
            };
            let top = doc.offset_top(&anchor) + args.offset;
            doc.set_scroll_top(&container, top);
        }
    }
}

fn scroll_to_bottom(doc: &mut dyn Document, container_id: &ContainerId) {
    let node = match container_id {
        ContainerId::Document => NodeRef::Root,
        ContainerId::Element(id) => match doc.lookup(id) {
            Some(node) => node,
            None => return,
        },
    };
    let bottom = doc.scroll_height(&node);
    doc.set_scroll_top(&node, bottom);
}

//! DOM side of the bridge: a minimal document abstraction, a headless
//! implementation, autosizing, and the per-frame effect queue.

pub mod autosize;
pub mod document;
pub mod effects;
pub mod frame;
pub mod page;
#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub mod web;

pub use autosize::Autosize;
pub use document::{Document, NodeRef};
pub use effects::DomEffect;
pub use frame::{run_effects, FrameQueue, FrameReport};
pub use page::{Element, ElementKind, Page};
#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub use web::WebDocument;

//! Geodata model shared by the clients and the session layer

mod bbox;
mod changeset;
mod element;
mod issue;
mod trace;

pub use bbox::BoundingBox;
pub use changeset::{ChangeSet, Comment};
pub use element::{Author, Element, ElementBody, ElementDraft, ElementKind, ElementRef, Member};
pub use issue::Issue;
pub use trace::{TraceDraft, Visibility};

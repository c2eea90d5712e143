//! Client-side reconciliation: one [`ClientSyncEngine`] per connected teacher
//! or student.

pub mod countdown;
pub mod engine;
pub mod feed;
pub mod source;
pub mod view;

pub use engine::ClientSyncEngine;
pub use feed::FeedMode;
pub use view::{ClientView, Phase, ViewSnapshot, ViewUpdate};

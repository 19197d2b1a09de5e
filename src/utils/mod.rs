//! Utility modules shared by the content, template and comment layers.

pub mod date;
pub mod locks;
pub mod slug;

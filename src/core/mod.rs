//! Core editor state: document sessions, previews, markup and styles.

pub mod fonts;
pub mod markup;
pub mod preview;
pub mod session;
pub mod style;

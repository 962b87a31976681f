//! Pure, deterministic logic: the data model, selection, merge, checkbox
//! parsing, and completion-signal classification. No I/O lives here.

pub mod checkbox;
pub mod merge;
pub mod model;
pub mod outcome;
pub mod selector;

//! Revision diffs for calvault.
//!
//! Two versions of an entity are compared in two steps: [`diff_fields`]
//! reports which hashed fields were added, removed or changed, and
//! [`diff_text`] breaks a changed multi-line text field (typically an
//! event description) into line hunks.
//!
//! # Key Types
//!
//! - [`FieldDiff`] / [`FieldChange`] -- top-level field changes between two content maps
//! - [`TextDiff`] / [`DiffHunk`] / [`DiffLine`] -- line hunks for long text fields

pub mod error;
pub mod field_diff;
pub mod text_diff;

pub use error::{DiffError, DiffResult};
pub use field_diff::{diff_contents, diff_fields, FieldChange, FieldDiff};
pub use text_diff::{diff_text, DiffHunk, DiffLine, TextDiff};

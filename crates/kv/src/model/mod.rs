//! Engine models and traits.
//!
//! The core trait for the engine seam is [`KvEngine`], which provides a
//! transaction factory for creating read and write transactions. The
//! [`EngineRead`] and [`EngineWrite`] traits provide raw transactional
//! read-only and read-write access to named tables, respectively.
//!
//! ## Traversal
//!
//! Engines expose per-table cursors through [`RawCursor`] and
//! [`RawCursorMut`]. These speak the stored layout only: keys and values are
//! raw bytes, and dup-sort tables are traversed duplicate by duplicate.
//!
//! The [`Cursor`] and [`DupCursor`] wrappers in [`db`] add the table
//! configuration on top, including the automatic key/value conversion for
//! dup-sort tables.
//!
//! ## Errors
//!
//! Engine errors implement [`EngineError`], which folds them into the
//! layer-wide [`KvError`].
//!
//! [`Cursor`]: crate::db::Cursor
//! [`DupCursor`]: crate::db::DupCursor
//! [`db`]: crate::db

mod error;
pub use error::{EngineError, KvError, KvResult};

mod traits;
pub use traits::{EngineRead, EngineWrite, KvEngine};

mod traverse;
pub use traverse::{RawCursor, RawCursorMut};

use std::borrow::Cow;

/// A raw key-value pair.
pub type RawKeyValue<'a> = (Cow<'a, [u8]>, RawValue<'a>);

/// A raw value.
pub type RawValue<'a> = Cow<'a, [u8]>;

//! Low-level container, record and XML helpers used by the spreadsheet readers.

pub(crate) mod biff8;
pub(crate) mod cfb;
pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;

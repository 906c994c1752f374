//! # SQL Model
//!
//! Column types, table descriptors, identifiers and the DDL they render to.
pub mod column;
pub mod ddl;
pub mod identifier;
pub mod range;
pub mod table;

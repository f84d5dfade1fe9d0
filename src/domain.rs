//! Domain layer - register entities
//!
//! Pure data types with no I/O. Everything the crawler produces and the
//! search index consumes is expressed with these types.

pub mod practitioner;

pub use practitioner::{BilingualText, Practitioner, Qualification, QualificationError};

//! Domain types, configuration and capability traits shared by the
//! lexical and vector engines and the hybrid facade.

pub mod chunker;
pub mod config;
pub mod error;
pub mod facet;
pub mod traits;
pub mod types;

pub use error::{Result, SearchError};

//! The Parser Port: the compile contract the Registry Core depends on, plus
//! a feature-gated reference implementation of a real subset of the
//! structural type language (§4.4 step 3, §10.5).

pub mod json_schema;
#[cfg(feature = "reference-parser")]
pub mod reference;
pub mod traits;

#[cfg(feature = "reference-parser")]
pub use reference::ReferenceParser;
pub use traits::{CompileInput, CompileOutput, IncludedModule, ParserPort};

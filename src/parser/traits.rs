//! The `ParserPort` contract (§4.4 step 3).

use async_trait::async_trait;
use std::collections::HashMap;

use crate::ast::ModuleAst;
use crate::error::Result;

/// One already-compiled dependency module, keyed by the name it is
/// `#include`d under.
#[derive(Debug, Clone)]
pub struct IncludedModule {
    pub name: String,
    pub ast: ModuleAst,
}

#[derive(Debug, Clone)]
pub struct CompileInput {
    /// The rewritten spec document for the module being compiled (§4.4
    /// step 1 has already normalized its `#include` header).
    pub spec: String,
    /// Every transitively included module's already-compiled AST, in
    /// dependency-closure order (§4.4 step 2).
    pub includes: Vec<IncludedModule>,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub ast: ModuleAst,
    /// `{typeName -> JSON-Schema document}` for every typedef the primary
    /// module declares. Bytes are stored verbatim by the caller; a type's
    /// MD5 is computed over this exact string.
    pub json_schemas: HashMap<String, String>,
}

/// Compiles a specification document (plus its resolved includes) into an
/// AST and a `{type -> JSON-Schema}` table. Expects exactly one service with
/// exactly one module in the primary spec; anything else is a
/// `SpecParseError` (§4.4 step 3).
#[async_trait]
pub trait ParserPort: Send + Sync {
    async fn compile(&self, input: CompileInput) -> Result<CompileOutput>;
}

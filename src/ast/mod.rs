//! The structural type language the Version Engine diffs over, and the
//! `Service -> Module -> Components` shape the Parser Port hands back.
//!
//! This is a minimal but real AST: it carries exactly what §4.3's diff
//! table needs (node kind, struct field optionality, scalar kind, the `@id`
//! annotation text, tuple arity) and nothing the production parser would
//! additionally need for code generation.

use serde::{Deserialize, Serialize};

/// A reference to a named type, as it appears inside another type's body.
/// `module` is `None` for an intra-module reference; the save pipeline fills
/// in a concrete version only when persisting (§4.4 step 8), never in the
/// AST itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRefName {
    pub module: Option<String>,
    pub name: String,
}

impl TypeRefName {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            module: None,
            name: name.into(),
        }
    }

    pub fn qualified(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            name: name.into(),
        }
    }

    pub fn is_cross_module(&self, current_module: &str) -> bool {
        matches!(&self.module, Some(m) if m != current_module)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Int,
    Float,
    String,
    Bool,
}

/// A single field of a `Struct` type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub optional: bool,
    pub ty: TypeNode,
}

/// A node of the structural type language. See §4.3 for the per-kind
/// compatibility rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeNode {
    /// A named alias: a use of another typedef. Diff rule: the referenced
    /// name must match byte-for-byte and the aliased type must itself
    /// recursively match.
    Typedef {
        name: TypeRefName,
        target: Box<TypeNode>,
    },
    List(Box<TypeNode>),
    /// Key type is always string; only the value type is part of the AST.
    Mapping(Box<TypeNode>),
    Tuple(Vec<TypeNode>),
    Scalar {
        kind: ScalarKind,
        /// The `@id` reference-annotation text, if present. Must match
        /// byte-for-byte across versions.
        id_annotation: Option<String>,
    },
    UnspecifiedObject,
    Struct(Vec<StructField>),
}

impl TypeNode {
    pub fn scalar(kind: ScalarKind) -> Self {
        TypeNode::Scalar {
            kind,
            id_annotation: None,
        }
    }

    pub fn scalar_with_id(kind: ScalarKind, id_annotation: impl Into<String>) -> Self {
        TypeNode::Scalar {
            kind,
            id_annotation: Some(id_annotation.into()),
        }
    }

    /// Walk this node collecting every `Typedef` reference reachable from
    /// it, calling `visit` with the reference name. Used by §4.4 step 8's
    /// reference-extraction pass.
    pub fn walk_refs(&self, visit: &mut impl FnMut(&TypeRefName)) {
        match self {
            TypeNode::Typedef { name, target } => {
                visit(name);
                target.walk_refs(visit);
            }
            TypeNode::List(inner) | TypeNode::Mapping(inner) => inner.walk_refs(visit),
            TypeNode::Tuple(items) => items.iter().for_each(|i| i.walk_refs(visit)),
            TypeNode::Scalar { .. } | TypeNode::UnspecifiedObject => {}
            TypeNode::Struct(fields) => fields.iter().for_each(|f| f.ty.walk_refs(visit)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedefComponent {
    pub name: String,
    pub ty: TypeNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncdefComponent {
    pub name: String,
    pub params: Vec<TypeNode>,
    pub returns: Vec<TypeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    Typedef(TypedefComponent),
    Funcdef(FuncdefComponent),
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Component::Typedef(t) => &t.name,
            Component::Funcdef(f) => &f.name,
        }
    }
}

/// `Service -> Module -> Components`, the shape the Parser Port returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAst {
    pub service_name: String,
    pub module_name: String,
    pub components: Vec<Component>,
}

impl ModuleAst {
    pub fn typedef(&self, name: &str) -> Option<&TypedefComponent> {
        self.components.iter().find_map(|c| match c {
            Component::Typedef(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    pub fn funcdef(&self, name: &str) -> Option<&FuncdefComponent> {
        self.components.iter().find_map(|c| match c {
            Component::Funcdef(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// Stable JSON representation used as the input to the module's AST MD5
    /// (§4.4 step 5: "compute the new AST MD5 (stable JSON of
    /// `module.getData()`)").
    pub fn stable_json(&self) -> String {
        serde_json::to_string(self).expect("ModuleAst serialization is infallible")
    }
}

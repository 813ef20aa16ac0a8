//! A minimal but real reference implementation of the structural type
//! language (§4.3/§6): typedefs over scalars, lists, mappings, tuples and
//! structs with optional fields, plus funcdefs. Feature-gated as a test and
//! embedding double; the production parser stays pluggable behind
//! [`ParserPort`](super::traits::ParserPort).
//!
//! Grammar (informal):
//!
//! ```text
//! service <name> { module <name> { <component>* } }
//! component := "typedef" ident "=" type ";"
//!            | "funcdef" ident "(" type,* ")" "->" "(" type,* ")" ";"
//! type := "int" | "float" | "string" | "bool" ["@id" "(" string ")"]
//!       | "any"
//!       | "list" "<" type ">"
//!       | "map" "<" type ">"
//!       | "tuple" "<" type,* ">"
//!       | "struct" "{" (ident ["?"] ":" type ";")* "}"
//!       | [ident "."]* ident   (named reference to another typedef)
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::CharIndices;

use super::traits::{CompileInput, CompileOutput, ParserPort};
use crate::ast::{
    Component, FuncdefComponent, ModuleAst, ScalarKind, StructField, TypeNode, TypeRefName,
    TypedefComponent,
};
use crate::error::{Result, TddbError};

pub struct ReferenceParser;

impl Default for ReferenceParser {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl ParserPort for ReferenceParser {
    async fn compile(&self, input: CompileInput) -> Result<CompileOutput> {
        let known_types: HashMap<String, Vec<String>> = input
            .includes
            .iter()
            .map(|m| {
                let names = m
                    .ast
                    .components
                    .iter()
                    .filter_map(|c| match c {
                        Component::Typedef(t) => Some(t.name.clone()),
                        Component::Funcdef(_) => None,
                    })
                    .collect();
                (m.name.clone(), names)
            })
            .collect();

        let ast = Parser::new(&input.spec, &known_types).parse_service()?;

        let mut json_schemas = HashMap::new();
        for component in &ast.components {
            if let Component::Typedef(t) = component {
                let schema = crate::parser::json_schema::to_json_schema(&t.ty);
                let text = serde_json::to_string(&schema)
                    .map_err(|e| TddbError::parse(format!("schema serialization failed: {e}")))?;
                json_schemas.insert(t.name.clone(), text);
            }
        }

        Ok(CompileOutput { ast, json_schemas })
    }
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
    src: &'a str,
    known_types: &'a HashMap<String, Vec<String>>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, known_types: &'a HashMap<String, Vec<String>>) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            known_types,
        }
    }

    fn skip_ws(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else if c == '#' {
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.chars.next();
                }
            } else {
                break;
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().map(|&(_, c)| c)
    }

    fn next_token(&mut self) -> Result<String> {
        self.skip_ws();
        let start = match self.chars.peek() {
            Some(&(i, _)) => i,
            None => return Err(TddbError::parse("unexpected end of spec")),
        };
        let (_, first) = *self.chars.peek().unwrap();
        if first.is_alphabetic() || first == '_' {
            let mut end = start;
            while let Some(&(i, c)) = self.chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '.' {
                    end = i + c.len_utf8();
                    self.chars.next();
                } else {
                    break;
                }
            }
            Ok(self.src[start..end].to_string())
        } else if first == '-' {
            self.chars.next();
            if self.chars.peek().map(|&(_, c)| c) == Some('>') {
                self.chars.next();
                Ok("->".to_string())
            } else {
                Ok("-".to_string())
            }
        } else {
            let (_, c) = self.chars.next().unwrap();
            Ok(c.to_string())
        }
    }

    fn expect(&mut self, tok: &str) -> Result<()> {
        let found = self.next_token()?;
        if found != tok {
            return Err(TddbError::parse(format!(
                "expected {tok:?}, found {found:?}"
            )));
        }
        Ok(())
    }

    fn parse_string_literal(&mut self) -> Result<String> {
        self.skip_ws();
        match self.chars.next() {
            Some((_, '"')) => {}
            other => {
                return Err(TddbError::parse(format!(
                    "expected string literal, found {other:?}"
                )));
            }
        }
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => break,
                Some((_, c)) => out.push(c),
                None => return Err(TddbError::parse("unterminated string literal")),
            }
        }
        Ok(out)
    }

    fn parse_service(mut self) -> Result<ModuleAst> {
        self.expect("service")?;
        let service_name = self.next_token()?;
        self.expect("{")?;
        self.expect("module")?;
        let module_name = self.next_token()?;
        self.expect("{")?;

        let mut components = Vec::new();
        loop {
            self.skip_ws();
            match self.peek_char() {
                Some('}') => {
                    self.next_token()?;
                    break;
                }
                None => return Err(TddbError::parse("unterminated module body")),
                _ => components.push(self.parse_component()?),
            }
        }
        self.expect("}")?;

        if components.is_empty() {
            return Err(TddbError::parse("module declares no components"));
        }

        Ok(ModuleAst {
            service_name,
            module_name,
            components,
        })
    }

    fn parse_component(&mut self) -> Result<Component> {
        let kind = self.next_token()?;
        match kind.as_str() {
            "typedef" => {
                let name = self.next_token()?;
                self.expect("=")?;
                let ty = self.parse_type()?;
                self.expect(";")?;
                Ok(Component::Typedef(TypedefComponent { name, ty }))
            }
            "funcdef" => {
                let name = self.next_token()?;
                self.expect("(")?;
                let params = self.parse_type_list(")")?;
                self.expect("->")?;
                self.expect("(")?;
                let returns = self.parse_type_list(")")?;
                self.expect(";")?;
                Ok(Component::Funcdef(FuncdefComponent {
                    name,
                    params,
                    returns,
                }))
            }
            other => Err(TddbError::parse(format!(
                "expected 'typedef' or 'funcdef', found {other:?}"
            ))),
        }
    }

    fn parse_type_list(&mut self, close: &str) -> Result<Vec<TypeNode>> {
        let mut items = Vec::new();
        if self.peek_char() == close.chars().next() {
            self.next_token()?;
            return Ok(items);
        }
        loop {
            items.push(self.parse_type()?);
            let sep = self.next_token()?;
            if sep == close {
                break;
            }
            if sep != "," {
                return Err(TddbError::parse(format!(
                    "expected ',' or {close:?}, found {sep:?}"
                )));
            }
        }
        Ok(items)
    }

    fn parse_type(&mut self) -> Result<TypeNode> {
        let tok = self.next_token()?;
        match tok.as_str() {
            "int" => self.maybe_annotate(ScalarKind::Int),
            "float" => self.maybe_annotate(ScalarKind::Float),
            "string" => self.maybe_annotate(ScalarKind::String),
            "bool" => self.maybe_annotate(ScalarKind::Bool),
            "any" => Ok(TypeNode::UnspecifiedObject),
            "list" => {
                self.expect("<")?;
                let inner = self.parse_type()?;
                self.expect(">")?;
                Ok(TypeNode::List(Box::new(inner)))
            }
            "map" => {
                self.expect("<")?;
                let inner = self.parse_type()?;
                self.expect(">")?;
                Ok(TypeNode::Mapping(Box::new(inner)))
            }
            "tuple" => {
                self.expect("<")?;
                let items = self.parse_type_list(">")?;
                Ok(TypeNode::Tuple(items))
            }
            "struct" => {
                self.expect("{")?;
                let mut fields = Vec::new();
                loop {
                    if self.peek_char() == Some('}') {
                        self.next_token()?;
                        break;
                    }
                    let field_name = self.next_token()?;
                    let optional = if self.peek_char() == Some('?') {
                        self.next_token()?;
                        true
                    } else {
                        false
                    };
                    self.expect(":")?;
                    let ty = self.parse_type()?;
                    self.expect(";")?;
                    fields.push(StructField {
                        name: field_name,
                        optional,
                        ty,
                    });
                }
                Ok(TypeNode::Struct(fields))
            }
            name => {
                let target = self.resolve_reference(name)?;
                let ref_name = self.ref_name_for(name);
                Ok(TypeNode::Typedef {
                    name: ref_name,
                    target: Box::new(target),
                })
            }
        }
    }

    fn maybe_annotate(&mut self, kind: ScalarKind) -> Result<TypeNode> {
        if self.peek_char() == Some('@') {
            self.next_token()?;
            self.expect("id")?;
            self.expect("(")?;
            let text = self.parse_string_literal()?;
            self.expect(")")?;
            Ok(TypeNode::scalar_with_id(kind, text))
        } else {
            Ok(TypeNode::scalar(kind))
        }
    }

    fn ref_name_for(&self, name: &str) -> TypeRefName {
        match name.rsplit_once('.') {
            Some((module, bare)) => TypeRefName::qualified(module, bare),
            None => TypeRefName::local(name),
        }
    }

    /// References to already-compiled dependency types resolve to an
    /// opaque placeholder target (the dependency's own AST is the source
    /// of truth for its structure; the save pipeline diffs against the
    /// dependency's stored version, not a copy embedded here).
    fn resolve_reference(&self, name: &str) -> Result<TypeNode> {
        let (module, bare) = match name.rsplit_once('.') {
            Some((m, b)) => (Some(m), b),
            None => (None, name),
        };
        if let Some(module) = module {
            let names = self.known_types.get(module).ok_or_else(|| {
                TddbError::parse(format!("reference to unincluded module {module:?}"))
            })?;
            if !names.iter().any(|n| n == bare) {
                return Err(TddbError::parse(format!(
                    "module {module:?} declares no type {bare:?}"
                )));
            }
        }
        Ok(TypeNode::UnspecifiedObject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::IncludedModule;

    #[tokio::test]
    async fn compiles_struct_and_funcdef() {
        let spec = r#"
            service acme {
                module acme.widget {
                    typedef Gadget = struct {
                        id: string@id("acme.widget.Gadget");
                        weight: float;
                        tags?: list<string>;
                    };
                    funcdef describe(Gadget) -> (string);
                }
            }
        "#;
        let parser = ReferenceParser;
        let output = parser
            .compile(CompileInput {
                spec: spec.to_string(),
                includes: vec![],
            })
            .await
            .unwrap();

        assert_eq!(output.ast.module_name, "acme.widget");
        let gadget = output.ast.typedef("Gadget").unwrap();
        match &gadget.ty {
            TypeNode::Struct(fields) => assert_eq!(fields.len(), 3),
            other => panic!("expected struct, got {other:?}"),
        }
        assert!(output.ast.funcdef("describe").is_some());
        assert!(output.json_schemas.contains_key("Gadget"));
    }

    #[tokio::test]
    async fn rejects_reference_to_unincluded_module() {
        let spec = r#"
            service acme {
                module acme.widget {
                    typedef Gadget = acme.base.Id;
                }
            }
        "#;
        let parser = ReferenceParser;
        let err = parser
            .compile(CompileInput {
                spec: spec.to_string(),
                includes: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TddbError::SpecParseError { .. }));
    }

    #[tokio::test]
    async fn resolves_reference_to_included_module_type() {
        let base_ast = ModuleAst {
            service_name: "acme".into(),
            module_name: "acme.base".into(),
            components: vec![Component::Typedef(TypedefComponent {
                name: "Id".into(),
                ty: TypeNode::scalar(ScalarKind::String),
            })],
        };
        let spec = r#"
            service acme {
                module acme.widget {
                    typedef Gadget = acme.base.Id;
                }
            }
        "#;
        let parser = ReferenceParser;
        let output = parser
            .compile(CompileInput {
                spec: spec.to_string(),
                includes: vec![IncludedModule {
                    name: "acme.base".to_string(),
                    ast: base_ast,
                }],
            })
            .await
            .unwrap();
        let gadget = output.ast.typedef("Gadget").unwrap();
        assert!(matches!(&gadget.ty, TypeNode::Typedef { .. }));
    }
}

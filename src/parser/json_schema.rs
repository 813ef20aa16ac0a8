//! Converts a [`TypeNode`] into the `{type -> JSON-Schema}` table the Parser
//! Port hands back (§4.4 step 3). The structural diff engine never reads
//! this output — it diffs ASTs directly — so this conversion only needs to
//! be a faithful, stable rendering for storage and for an external
//! JSON-Schema validator library to consume.

use serde_json::{Value, json};

use crate::ast::{ScalarKind, TypeNode};

pub fn to_json_schema(node: &TypeNode) -> Value {
    match node {
        TypeNode::Typedef { target, .. } => to_json_schema(target),
        TypeNode::List(inner) => json!({
            "type": "array",
            "items": to_json_schema(inner),
        }),
        TypeNode::Mapping(inner) => json!({
            "type": "object",
            "additionalProperties": to_json_schema(inner),
        }),
        TypeNode::Tuple(items) => json!({
            "type": "array",
            "items": items.iter().map(to_json_schema).collect::<Vec<_>>(),
            "minItems": items.len(),
            "maxItems": items.len(),
        }),
        TypeNode::Scalar { kind, id_annotation } => {
            let mut schema = json!({ "type": scalar_json_type(*kind) });
            if let Some(id) = id_annotation {
                schema["$ref_id"] = Value::String(id.clone());
            }
            schema
        }
        TypeNode::UnspecifiedObject => json!({}),
        TypeNode::Struct(fields) => {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for field in fields {
                properties.insert(field.name.clone(), to_json_schema(&field.ty));
                if !field.optional {
                    required.push(Value::String(field.name.clone()));
                }
            }
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            })
        }
    }
}

fn scalar_json_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Int => "integer",
        ScalarKind::Float => "number",
        ScalarKind::String => "string",
        ScalarKind::Bool => "boolean",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StructField;

    #[test]
    fn struct_required_tracks_optionality() {
        let node = TypeNode::Struct(vec![
            StructField {
                name: "id".into(),
                optional: false,
                ty: TypeNode::scalar(ScalarKind::String),
            },
            StructField {
                name: "nickname".into(),
                optional: true,
                ty: TypeNode::scalar(ScalarKind::String),
            },
        ]);
        let schema = to_json_schema(&node);
        assert_eq!(schema["required"], json!(["id"]));
    }

    #[test]
    fn scalar_with_id_annotation_carries_it_through() {
        let node = TypeNode::scalar_with_id(ScalarKind::String, "acme.base.Id");
        let schema = to_json_schema(&node);
        assert_eq!(schema["$ref_id"], json!("acme.base.Id"));
    }
}

//! The structural compatibility diff (§4.3).

use crate::ast::{FuncdefComponent, StructField, TypeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    NoChange,
    BackwardCompatible,
    NotCompatible,
}

impl ChangeKind {
    fn join(self, other: ChangeKind) -> ChangeKind {
        self.max(other)
    }
}

/// `findChange(oldT, newT)` — see the §4.3 rule table.
pub fn find_change(old: &TypeNode, new: &TypeNode) -> ChangeKind {
    match (old, new) {
        (
            TypeNode::Typedef {
                name: old_name,
                target: old_target,
            },
            TypeNode::Typedef {
                name: new_name,
                target: new_target,
            },
        ) => {
            if old_name != new_name {
                ChangeKind::NotCompatible
            } else {
                find_change(old_target, new_target)
            }
        }
        (TypeNode::List(old_elem), TypeNode::List(new_elem)) => find_change(old_elem, new_elem),
        // Mapping: key type is always string; diff only recurses into the
        // value type (§9 open question — preserved intentionally).
        (TypeNode::Mapping(old_val), TypeNode::Mapping(new_val)) => find_change(old_val, new_val),
        (TypeNode::Tuple(old_items), TypeNode::Tuple(new_items)) => {
            if old_items.len() != new_items.len() {
                ChangeKind::NotCompatible
            } else {
                old_items
                    .iter()
                    .zip(new_items.iter())
                    .map(|(o, n)| find_change(o, n))
                    .fold(ChangeKind::NoChange, ChangeKind::join)
            }
        }
        (
            TypeNode::Scalar {
                kind: old_kind,
                id_annotation: old_id,
            },
            TypeNode::Scalar {
                kind: new_kind,
                id_annotation: new_id,
            },
        ) => {
            if old_kind != new_kind || old_id != new_id {
                ChangeKind::NotCompatible
            } else {
                ChangeKind::NoChange
            }
        }
        (TypeNode::UnspecifiedObject, TypeNode::UnspecifiedObject) => ChangeKind::NoChange,
        (TypeNode::Struct(old_fields), TypeNode::Struct(new_fields)) => {
            find_struct_change(old_fields, new_fields)
        }
        _ => ChangeKind::NotCompatible,
    }
}

fn find_struct_change(old_fields: &[StructField], new_fields: &[StructField]) -> ChangeKind {
    let mut result = ChangeKind::NoChange;

    for old_field in old_fields {
        match new_fields.iter().find(|f| f.name == old_field.name) {
            Some(new_field) => {
                if new_field.optional != old_field.optional {
                    result = result.join(ChangeKind::NotCompatible);
                } else {
                    result = result.join(find_change(&old_field.ty, &new_field.ty));
                }
            }
            // Field removed: always incompatible, optional or not.
            None => result = result.join(ChangeKind::NotCompatible),
        }
    }

    for new_field in new_fields {
        if !old_fields.iter().any(|f| f.name == new_field.name) {
            result = result.join(if new_field.optional {
                ChangeKind::BackwardCompatible
            } else {
                ChangeKind::NotCompatible
            });
        }
    }

    result
}

/// Function diff: parameter count and return-arity must match; pairwise
/// diff parameters and returns and join.
pub fn find_func_change(old: &FuncdefComponent, new: &FuncdefComponent) -> ChangeKind {
    if old.params.len() != new.params.len() || old.returns.len() != new.returns.len() {
        return ChangeKind::NotCompatible;
    }

    old.params
        .iter()
        .zip(new.params.iter())
        .chain(old.returns.iter().zip(new.returns.iter()))
        .map(|(o, n)| find_change(o, n))
        .fold(ChangeKind::NoChange, ChangeKind::join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ScalarKind;

    fn int() -> TypeNode {
        TypeNode::scalar(ScalarKind::Int)
    }

    fn struct_of(fields: &[(&str, bool, TypeNode)]) -> TypeNode {
        TypeNode::Struct(
            fields
                .iter()
                .map(|(name, optional, ty)| StructField {
                    name: name.to_string(),
                    optional: *optional,
                    ty: ty.clone(),
                })
                .collect(),
        )
    }

    #[test]
    fn identical_ast_is_no_change() {
        let t = struct_of(&[("x", false, int())]);
        assert_eq!(find_change(&t, &t), ChangeKind::NoChange);
    }

    #[test]
    fn adding_optional_field_is_backward_compatible() {
        let old = struct_of(&[("x", false, int())]);
        let new = struct_of(&[("x", false, int()), ("y", true, int())]);
        assert_eq!(find_change(&old, &new), ChangeKind::BackwardCompatible);
    }

    #[test]
    fn adding_required_field_is_not_compatible() {
        let old = struct_of(&[("x", false, int())]);
        let new = struct_of(&[("x", false, int()), ("y", false, int())]);
        assert_eq!(find_change(&old, &new), ChangeKind::NotCompatible);
    }

    #[test]
    fn removing_any_field_is_not_compatible() {
        let old = struct_of(&[("x", false, int()), ("y", true, int())]);
        let new = struct_of(&[("x", false, int())]);
        assert_eq!(find_change(&old, &new), ChangeKind::NotCompatible);
    }

    #[test]
    fn changing_scalar_kind_is_not_compatible() {
        assert_eq!(
            find_change(&int(), &TypeNode::scalar(ScalarKind::String)),
            ChangeKind::NotCompatible
        );
    }

    #[test]
    fn changing_id_annotation_is_not_compatible() {
        let old = TypeNode::scalar_with_id(ScalarKind::String, "ws.Object");
        let new = TypeNode::scalar_with_id(ScalarKind::String, "ws.OtherObject");
        assert_eq!(find_change(&old, &new), ChangeKind::NotCompatible);
    }

    #[test]
    fn reordering_tuple_elements_is_not_compatible() {
        let old = TypeNode::Tuple(vec![int(), TypeNode::scalar(ScalarKind::String)]);
        let new = TypeNode::Tuple(vec![TypeNode::scalar(ScalarKind::String), int()]);
        assert_eq!(find_change(&old, &new), ChangeKind::NotCompatible);
    }

    #[test]
    fn mapping_diff_recurses_into_value_type_only() {
        let old = TypeNode::Mapping(Box::new(int()));
        let new = TypeNode::Mapping(Box::new(int()));
        assert_eq!(find_change(&old, &new), ChangeKind::NoChange);

        let changed = TypeNode::Mapping(Box::new(TypeNode::scalar(ScalarKind::String)));
        assert_eq!(find_change(&old, &changed), ChangeKind::NotCompatible);
    }

    #[test]
    fn unspecified_object_is_always_no_change() {
        assert_eq!(
            find_change(&TypeNode::UnspecifiedObject, &TypeNode::UnspecifiedObject),
            ChangeKind::NoChange
        );
    }

    #[test]
    fn different_node_kinds_are_not_compatible() {
        assert_eq!(
            find_change(&int(), &TypeNode::UnspecifiedObject),
            ChangeKind::NotCompatible
        );
    }
}

//! `saveModule` (§4.4).

use std::collections::{HashMap, HashSet};

use tracing::{info, instrument, warn};

use super::types::{SaveModuleInput, SaveModuleOutput, TypeChange};
use super::RegistryCore;
use crate::ast::{Component, TypeNode, TypeRefName};
use crate::error::{Result, TddbError};
use crate::include;
use crate::model::{
    AbsoluteTypeDefId, FuncInfo, FuncParseRecord, ModuleVersion, PendingRef, RefInfo, SchemaRecord,
    TypeDefName, TypeInfo, TypeParseRecord,
};
use crate::ownership::Privilege;
use crate::parser::CompileInput;
use crate::storage::{ModuleCommit, StoragePort};
use crate::version::{find_change, find_func_change, ChangeKind, TypeVersion};

fn md5_hex(s: &str) -> String {
    format!("{:x}", md5::compute(s.as_bytes()))
}

enum ComponentChange {
    Type {
        name: String,
        node: TypeNode,
        new_version: TypeVersion,
        json_schema: String,
    },
    Func {
        name: String,
        ast: crate::ast::FuncdefComponent,
        new_version: TypeVersion,
    },
}

impl RegistryCore {
    #[instrument(skip(self, input), fields(module = %input.module))]
    pub async fn save_module(&self, input: SaveModuleInput) -> Result<SaveModuleOutput> {
        self.ownership
            .require(&input.module, &input.user_id, Privilege::Owner)
            .await?;
        if !self.storage.exists(&input.module).await? {
            return Err(TddbError::NoSuchModule {
                module: input.module.clone(),
            });
        }
        if !self.storage.supported_state(&input.module).await? {
            return Err(TddbError::NoSuchModule {
                module: input.module.clone(),
            });
        }
        let last_unreleased = self
            .storage
            .last_version_including_unreleased(&input.module)
            .await?;
        if let Some(expected) = input.expected_previous_version {
            if last_unreleased != Some(expected) {
                return Err(TddbError::ConcurrentModification {
                    module: input.module.clone(),
                    expected: expected.to_string(),
                    actual: last_unreleased
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                });
            }
        }

        // Step 1: rewrite includes.
        let (rewritten_spec, direct_includes) = include::rewrite_includes(&input.spec)?;

        // Step 2: resolve the dependency closure.
        let resolved = include::resolve_closure(
            self.storage.as_ref(),
            &direct_includes,
            &input.module_version_restrictions,
        )
        .await?;
        let new_included_module_version: HashMap<String, u64> = resolved
            .iter()
            .map(|r| (r.name.clone(), r.version_time))
            .collect();

        // Step 3: compile.
        let compiled = self
            .parser
            .compile(CompileInput {
                spec: rewritten_spec.clone(),
                includes: include::as_parser_includes(&resolved),
            })
            .await?;
        if compiled.ast.module_name != input.module {
            return Err(TddbError::parse(format!(
                "spec declares module {:?}, expected {:?}",
                compiled.ast.module_name, input.module
            )));
        }

        // Step 4: acquire the write lock.
        let token = self.locks.tokens.next_token();
        let _write_guard = self.locks.acquire_write(&input.module, token).await?;

        // Step 5: load current ModuleInfo, compute the new AST MD5.
        let current = self
            .storage
            .get_module_version(
                &input.module,
                last_unreleased.ok_or_else(|| TddbError::NoSuchModule {
                    module: input.module.clone(),
                })?,
            )
            .await?
            .ok_or_else(|| TddbError::NoSuchModule {
                module: input.module.clone(),
            })?;
        let new_ast_md5 = md5_hex(&compiled.ast.stable_json());

        // Step 6: validate caller-declared type lists.
        let previously_supported: HashSet<String> =
            current.supported_type_names().map(str::to_string).collect();
        for name in &input.unregistered_types {
            if !previously_supported.contains(name) {
                return Err(TddbError::parse(format!(
                    "unregisteredTypes names {name:?}, which is not currently supported"
                )));
            }
        }
        for name in &input.added_types {
            if previously_supported.contains(name) {
                return Err(TddbError::parse(format!(
                    "addedTypes names {name:?}, which is already supported"
                )));
            }
            if input.unregistered_types.contains(name) {
                return Err(TddbError::parse(format!(
                    "addedTypes and unregisteredTypes both name {name:?}"
                )));
            }
            if compiled.ast.typedef(name).is_none() {
                return Err(TddbError::parse(format!(
                    "addedTypes names {name:?}, which has no typedef in the spec"
                )));
            }
        }

        let registered_set: HashSet<String> = previously_supported
            .union(&input.added_types)
            .cloned()
            .collect::<HashSet<_>>()
            .difference(&input.unregistered_types)
            .cloned()
            .collect();

        // Step 7: classify components.
        let mut changes = Vec::new();
        let mut newly_unregistered: HashSet<String> = input.unregistered_types.clone();
        let mut type_names_in_new_ast = HashSet::new();
        let mut func_names_in_new_ast = HashSet::new();

        for component in &compiled.ast.components {
            match component {
                Component::Typedef(t) => {
                    type_names_in_new_ast.insert(t.name.clone());
                    if !registered_set.contains(&t.name) {
                        continue;
                    }
                    let prev_info = current.types.get(&t.name);
                    match prev_info {
                        Some(info) => {
                            let prev_record = self
                                .storage
                                .get_type_parse_record(&input.module, &t.name, info.type_version)
                                .await?
                                .ok_or_else(|| {
                                    TddbError::parse(format!(
                                        "missing parse record for {}.{}-{}",
                                        input.module, t.name, info.type_version
                                    ))
                                })?;
                            let diff = find_change(&prev_record.ast, &t.ty);
                            let json_schema = compiled
                                .json_schemas
                                .get(&t.name)
                                .cloned()
                                .unwrap_or_default();
                            let prev_schema = self
                                .storage
                                .get_type_schema_record(&input.module, &t.name, info.type_version)
                                .await?;
                            let schema_unchanged = prev_schema
                                .as_ref()
                                .map(|s| s.json_schema == json_schema)
                                .unwrap_or(false);
                            if diff == ChangeKind::NoChange && schema_unchanged {
                                continue;
                            }
                            changes.push(ComponentChange::Type {
                                name: t.name.clone(),
                                node: t.ty.clone(),
                                new_version: info.type_version.bump(diff),
                                json_schema,
                            });
                        }
                        None => {
                            let json_schema = compiled
                                .json_schemas
                                .get(&t.name)
                                .cloned()
                                .unwrap_or_default();
                            changes.push(ComponentChange::Type {
                                name: t.name.clone(),
                                node: t.ty.clone(),
                                new_version: TypeVersion::INITIAL,
                                json_schema,
                            });
                        }
                    }
                }
                Component::Funcdef(f) => {
                    func_names_in_new_ast.insert(f.name.clone());
                    let prev_info = current.funcs.get(&f.name);
                    match prev_info {
                        Some(info) => {
                            let prev_record = self
                                .storage
                                .get_func_parse_record(&input.module, &f.name, info.func_version)
                                .await?
                                .ok_or_else(|| {
                                    TddbError::parse(format!(
                                        "missing parse record for {}.{}-{}",
                                        input.module, f.name, info.func_version
                                    ))
                                })?;
                            let diff = find_func_change(&prev_record.ast, f);
                            if diff == ChangeKind::NoChange {
                                continue;
                            }
                            changes.push(ComponentChange::Func {
                                name: f.name.clone(),
                                ast: f.clone(),
                                new_version: info.func_version.bump(diff),
                            });
                        }
                        None => changes.push(ComponentChange::Func {
                            name: f.name.clone(),
                            ast: f.clone(),
                            new_version: TypeVersion::INITIAL,
                        }),
                    }
                }
            }
        }

        // Implicit unregistration/deletion of anything dropped from the spec.
        for name in &previously_supported {
            if !type_names_in_new_ast.contains(name) {
                newly_unregistered.insert(name.clone());
            }
        }
        let mut deleted_funcs = HashSet::new();
        for name in current.funcs.keys() {
            if current.funcs[name].supported && !func_names_in_new_ast.contains(name) {
                deleted_funcs.insert(name.clone());
            }
        }

        // Step 8: reference extraction.
        let mut pending_type_refs: Vec<PendingRef> = Vec::new();
        let mut pending_func_refs: Vec<PendingRef> = Vec::new();

        for change in &changes {
            match change {
                ComponentChange::Type { name, node, .. } => {
                    let mut refs = Vec::new();
                    node.walk_refs(&mut |r| refs.push(r.clone()));
                    for r in refs {
                        classify_ref(
                            &input.module,
                            name,
                            &r,
                            &registered_set,
                            &resolved,
                            &mut pending_type_refs,
                        )?;
                    }
                }
                ComponentChange::Func { name, ast, .. } => {
                    let mut refs = Vec::new();
                    for p in ast.params.iter().chain(ast.returns.iter()) {
                        p.walk_refs(&mut |r| refs.push(r.clone()));
                    }
                    for r in refs {
                        classify_ref(
                            &input.module,
                            name,
                            &r,
                            &registered_set,
                            &resolved,
                            &mut pending_func_refs,
                        )?;
                    }
                }
            }
        }

        // Step 9: no-op short-circuit.
        let included_unchanged = current.included_module_version == new_included_module_version;
        if current.ast_md5 == new_ast_md5
            && included_unchanged
            && changes.is_empty()
            && newly_unregistered.is_empty()
            && deleted_funcs.is_empty()
        {
            if current.spec == rewritten_spec {
                return Err(TddbError::parse("no difference"));
            }
        }

        let mut warnings = Vec::new();
        for name in &newly_unregistered {
            if !input.unregistered_types.contains(name) {
                warnings.push(format!(
                    "type {name:?} was dropped from the spec and has been implicitly unregistered"
                ));
            }
        }
        for name in &deleted_funcs {
            warnings.push(format!(
                "function {name:?} was dropped from the spec and has been removed"
            ));
        }

        let mut result = SaveModuleOutput {
            changes: HashMap::new(),
            warnings,
        };
        for name in &newly_unregistered {
            result.changes.insert(
                name.clone(),
                TypeChange {
                    unregistered: true,
                    new_absolute_id: None,
                    json_schema_doc: None,
                },
            );
        }

        if input.dry_run {
            for change in &changes {
                if let ComponentChange::Type {
                    name,
                    new_version,
                    json_schema,
                    ..
                } = change
                {
                    result.changes.insert(
                        name.clone(),
                        TypeChange {
                            unregistered: false,
                            new_absolute_id: Some(AbsoluteTypeDefId::new(
                                TypeDefName::new(&input.module, name),
                                new_version.major,
                                new_version.minor,
                            )),
                            json_schema_doc: Some(json_schema.clone()),
                        },
                    );
                }
            }
            return Ok(result);
        }

        // Step 10: commit, with rollback on failure.
        let version_time = self.storage.generate_new_version(&input.module).await?;
        match self
            .commit(
                &input,
                &current,
                &rewritten_spec,
                new_ast_md5,
                new_included_module_version,
                &changes,
                &newly_unregistered,
                &deleted_funcs,
                pending_type_refs,
                pending_func_refs,
                version_time,
            )
            .await
        {
            Ok(new_types) => {
                for (name, version) in new_types {
                    let json_schema = changes.iter().find_map(|c| match c {
                        ComponentChange::Type {
                            name: n,
                            json_schema,
                            ..
                        } if n == &name => Some(json_schema.clone()),
                        _ => None,
                    });
                    result.changes.insert(
                        name.clone(),
                        TypeChange {
                            unregistered: false,
                            new_absolute_id: Some(AbsoluteTypeDefId::new(
                                TypeDefName::new(&input.module, &name),
                                version.major,
                                version.minor,
                            )),
                            json_schema_doc: json_schema,
                        },
                    );
                }
                info!(module = %input.module, version_time, "saveModule committed");
                Ok(result)
            }
            Err(err) => {
                warn!(module = %input.module, version_time, error = %err, "saveModule commit failed, rolling back");
                if let Err(rollback_err) =
                    self.storage.rollback_version(&input.module, version_time).await
                {
                    warn!(module = %input.module, error = %rollback_err, "rollback itself failed");
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        input: &SaveModuleInput,
        current: &ModuleVersion,
        rewritten_spec: &str,
        new_ast_md5: String,
        new_included_module_version: HashMap<String, u64>,
        changes: &[ComponentChange],
        newly_unregistered: &HashSet<String>,
        deleted_funcs: &HashSet<String>,
        pending_type_refs: Vec<PendingRef>,
        pending_func_refs: Vec<PendingRef>,
        version_time: u64,
    ) -> Result<Vec<(String, TypeVersion)>> {
        let mut types = current.types.clone();
        let mut funcs = current.funcs.clone();
        let mut new_versions: HashMap<String, TypeVersion> = HashMap::new();
        let mut type_schemas = Vec::new();
        let mut type_parses = Vec::new();
        let mut func_parses = Vec::new();

        for change in changes {
            match change {
                ComponentChange::Type {
                    name,
                    node,
                    new_version,
                    json_schema,
                } => {
                    new_versions.insert(name.clone(), *new_version);
                    types.insert(
                        name.clone(),
                        TypeInfo {
                            type_name: name.clone(),
                            type_version: *new_version,
                            supported: true,
                        },
                    );
                    type_schemas.push(SchemaRecord {
                        module_name: input.module.clone(),
                        type_name: name.clone(),
                        type_version: *new_version,
                        module_version: version_time,
                        json_schema: json_schema.clone(),
                        md5: md5_hex(json_schema),
                    });
                    type_parses.push(TypeParseRecord {
                        module_name: input.module.clone(),
                        type_name: name.clone(),
                        type_version: *new_version,
                        module_version: version_time,
                        ast: node.clone(),
                    });
                }
                ComponentChange::Func {
                    name,
                    ast: func_ast,
                    new_version,
                } => {
                    funcs.insert(
                        name.clone(),
                        FuncInfo {
                            func_name: name.clone(),
                            func_version: *new_version,
                            supported: true,
                        },
                    );
                    func_parses.push(FuncParseRecord {
                        module_name: input.module.clone(),
                        func_name: name.clone(),
                        func_version: *new_version,
                        module_version: version_time,
                        ast: func_ast.clone(),
                    });
                }
            }
        }

        for name in newly_unregistered {
            if let Some(info) = types.get_mut(name) {
                info.supported = false;
            }
        }
        for name in deleted_funcs {
            if let Some(info) = funcs.get_mut(name) {
                info.supported = false;
            }
        }

        let resolve_version = |name: &str| -> Option<TypeVersion> {
            new_versions
                .get(name)
                .copied()
                .or_else(|| types.get(name).map(|t| t.type_version))
        };

        // `dep_name` is a type name for `pending_type_refs` (looked up against
        // `types`/`new_versions` above) but a function name for
        // `pending_func_refs`, which isn't tracked in either map, so only the
        // type side resolves its own new version; the func side always
        // reports `TypeVersion::INITIAL`.
        let finalize = |pending: Vec<PendingRef>, resolve_dep_version: bool| -> Result<Vec<RefInfo>> {
            pending
                .into_iter()
                .map(|p| {
                    let ref_version = match p.ref_version {
                        Some(v) => v,
                        None => resolve_version(&p.ref_name).ok_or_else(|| {
                            TddbError::parse(format!(
                                "reference to unknown local type {:?}",
                                p.ref_name
                            ))
                        })?,
                    };
                    let dep_version = if resolve_dep_version {
                        resolve_version(&p.dep_name).unwrap_or(TypeVersion::INITIAL)
                    } else {
                        TypeVersion::INITIAL
                    };
                    Ok(RefInfo {
                        dep_module: input.module.clone(),
                        dep_version,
                        dep_name: p.dep_name,
                        dep_module_version: version_time,
                        ref_module: p.ref_module,
                        ref_name: p.ref_name,
                        ref_version,
                    })
                })
                .collect()
        };

        let type_refs = finalize(pending_type_refs, true)?;
        let func_refs = finalize(pending_func_refs, false)?;

        let new_version = ModuleVersion {
            version_time,
            spec: rewritten_spec.to_string(),
            ast_md5: new_ast_md5,
            description: current.description.clone(),
            uploader: input.user_id.clone(),
            upload_method: input.upload_method.clone(),
            upload_comment: input.upload_comment.clone(),
            released: current.released,
            included_module_version: new_included_module_version,
            types,
            funcs,
        };

        self.storage
            .apply_commit(
                &input.module,
                ModuleCommit {
                    module_version: Some(new_version),
                    type_schemas,
                    type_parses,
                    func_parses,
                    type_refs,
                    func_refs,
                },
            )
            .await?;

        Ok(new_versions.into_iter().collect())
    }
}

fn classify_ref(
    current_module: &str,
    dep_name: &str,
    r: &TypeRefName,
    registered_set: &HashSet<String>,
    resolved: &[include::ResolvedInclude],
    out: &mut Vec<PendingRef>,
) -> Result<()> {
    if r.is_cross_module(current_module) {
        let module = r.module.as_ref().unwrap();
        let dep_module_info = resolved
            .iter()
            .find(|m| &m.name == module)
            .ok_or_else(|| TddbError::parse(format!("reference to unincluded module {module:?}")))?;
        let type_info = dep_module_info
            .module_version
            .types
            .get(&r.name)
            .filter(|t| t.supported)
            .ok_or_else(|| {
                TddbError::parse(format!(
                    "module {module:?} has no supported type {:?}",
                    r.name
                ))
            })?;
        out.push(PendingRef {
            dep_name: dep_name.to_string(),
            ref_module: module.clone(),
            ref_name: r.name.clone(),
            ref_version: Some(type_info.type_version),
        });
    } else if r.module.is_none() && registered_set.contains(&r.name) && r.name != dep_name {
        out.push(PendingRef {
            dep_name: dep_name.to_string(),
            ref_module: current_module.to_string(),
            ref_name: r.name.clone(),
            ref_version: None,
        });
    }
    Ok(())
}

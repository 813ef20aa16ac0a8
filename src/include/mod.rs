//! `#include <path>` header rewriting and dependency-closure resolution
//! (§4.4 steps 1–2).

use std::collections::HashMap;

use crate::ast::{Component, FuncdefComponent, ModuleAst, TypedefComponent};
use crate::error::{Result, TddbError};
use crate::model::{ModuleVersion, VersionTime};
use crate::parser::IncludedModule;
use crate::storage::StoragePort;

/// Scans the header for `#include <path>` lines, normalizes each to
/// `#include <name.types>` (directories and extension stripped), and
/// returns the rewritten spec plus the ordered list of direct dependency
/// module names. The header ends at the first non-include, non-blank line.
/// Fails with `SpecParseError` if an `#include` line is missing its `< >`
/// delimiters.
pub fn rewrite_includes(spec: &str) -> Result<(String, Vec<String>)> {
    let mut deps = Vec::new();
    let mut rewritten_header = Vec::new();
    let mut body_start = 0;

    for (line_no, line) in spec.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#include").map(str::trim) {
            if !rest.starts_with('<') || !rest.ends_with('>') || rest.len() < 2 {
                return Err(TddbError::parse(format!(
                    "malformed #include directive: {trimmed:?}"
                )));
            }
            let path = rest[1..rest.len() - 1].trim();
            let name = bare_module_name(path);
            rewritten_header.push(format!("#include <{name}.types>"));
            deps.push(name.to_string());
        } else {
            body_start = line_offset(spec, line_no);
            break;
        }
    }

    if rewritten_header.is_empty() {
        return Ok((spec.to_string(), deps));
    }

    let mut rewritten = rewritten_header.join("\n");
    rewritten.push('\n');
    rewritten.push_str(&spec[body_start..]);
    Ok((rewritten, deps))
}

fn bare_module_name(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.split('.').next().unwrap_or(base)
}

fn line_offset(spec: &str, line_no: usize) -> usize {
    spec.lines()
        .take(line_no)
        .map(|l| l.len() + 1)
        .sum::<usize>()
        .min(spec.len())
}

/// One member of the resolved dependency closure: the dependency's pinned
/// version and its reconstructed AST, ready to hand to the Parser Port.
#[derive(Debug, Clone)]
pub struct ResolvedInclude {
    pub name: String,
    pub version_time: VersionTime,
    pub module_version: ModuleVersion,
    pub ast: ModuleAst,
}

/// Depth-first resolves every transitive dependency starting from
/// `direct_includes`. `restrictions` pins a direct include's version;
/// transitive dependencies are pinned to whatever version their dependent
/// was itself compiled against. Fails with `SpecParseError` if a module is
/// reached twice at different versions, or if a pinned version doesn't
/// exist.
pub async fn resolve_closure(
    storage: &dyn StoragePort,
    direct_includes: &[String],
    restrictions: &HashMap<String, VersionTime>,
) -> Result<Vec<ResolvedInclude>> {
    let mut visited: HashMap<String, VersionTime> = HashMap::new();
    let mut resolved = Vec::new();
    let mut stack: Vec<(String, Option<VersionTime>)> = direct_includes
        .iter()
        .map(|name| (name.clone(), restrictions.get(name).copied()))
        .collect();

    while let Some((name, pinned)) = stack.pop() {
        let version_time = match pinned {
            Some(v) => v,
            None => storage
                .last_released_version(&name)
                .await?
                .ok_or_else(|| {
                    TddbError::parse(format!("included module {name:?} has no released version"))
                })?,
        };

        if !storage.exists(&name).await? {
            return Err(TddbError::NoSuchModule { module: name });
        }

        if let Some(&existing) = visited.get(&name) {
            if existing != version_time {
                return Err(TddbError::parse(format!(
                    "module {name:?} included at conflicting versions {existing} and {version_time}"
                )));
            }
            continue;
        }
        visited.insert(name.clone(), version_time);

        let module_version = storage
            .get_module_version(&name, version_time)
            .await?
            .ok_or_else(|| {
                TddbError::parse(format!(
                    "pinned version {version_time} of module {name:?} does not exist"
                ))
            })?;

        for (dep_name, &dep_version) in &module_version.included_module_version {
            stack.push((dep_name.clone(), Some(dep_version)));
        }

        let ast = reconstruct_ast(storage, &name, &module_version).await?;
        resolved.push(ResolvedInclude {
            name,
            version_time,
            module_version,
            ast,
        });
    }

    Ok(resolved)
}

/// Rebuilds a module's AST from its stored parse records. Only supported
/// types and functions are included, matching what a fresh compile of that
/// module's own spec would have declared.
async fn reconstruct_ast(
    storage: &dyn StoragePort,
    module: &str,
    version: &ModuleVersion,
) -> Result<ModuleAst> {
    let mut components = Vec::new();
    for type_info in version.types.values() {
        if !type_info.supported {
            continue;
        }
        let record = storage
            .get_type_parse_record(module, &type_info.type_name, type_info.type_version)
            .await?
            .ok_or_else(|| {
                TddbError::parse(format!(
                    "missing parse record for {module}.{}-{}",
                    type_info.type_name, type_info.type_version
                ))
            })?;
        components.push(Component::Typedef(TypedefComponent {
            name: record.type_name,
            ty: record.ast,
        }));
    }
    for func_info in version.funcs.values() {
        if !func_info.supported {
            continue;
        }
        let record = storage
            .get_func_parse_record(module, &func_info.func_name, func_info.func_version)
            .await?
            .ok_or_else(|| {
                TddbError::parse(format!(
                    "missing parse record for {module}.{}-{}",
                    func_info.func_name, func_info.func_version
                ))
            })?;
        components.push(Component::Funcdef(FuncdefComponent {
            name: record.ast.name,
            params: record.ast.params,
            returns: record.ast.returns,
        }));
    }

    Ok(ModuleAst {
        service_name: module.to_string(),
        module_name: module.to_string(),
        components,
    })
}

/// Converts resolved includes into the shape the Parser Port expects.
pub fn as_parser_includes(resolved: &[ResolvedInclude]) -> Vec<IncludedModule> {
    resolved
        .iter()
        .map(|r| IncludedModule {
            name: r.name.clone(),
            ast: r.ast.clone(),
        })
        .collect()
}

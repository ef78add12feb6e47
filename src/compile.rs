//! Compiles the nested rule tree into a flat, ordered definition list.
//!
//! A mapping node containing a `color` key is a leaf definition; anything
//! else is a namespace whose key joins its children's names with `/`.
//! `__defs__` entries become one lexical scope level attached to every
//! definition at or below them. All regexes, guards, and predicate bodies
//! are parsed here, so every syntax problem is a pre-run `ConfigError`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_yaml::Value as Yaml;

use crate::error::ConfigError;
use crate::expr::{self, Predicate, Scope};
use crate::models::label::{
    name_matcher_for, ActionKind, ActionSpec, LabelerDefinition,
};
use crate::selectors::SelectorConfig;

const LEAF_KEYS: &[&str] = &["color", "description", "selectors", "guard", "action", "__defs__"];

/// Compile a raw tree into definitions, in depth-first declaration order.
pub fn compile(tree: &Yaml) -> Result<Vec<LabelerDefinition>, ConfigError> {
    let root = tree
        .as_mapping()
        .ok_or_else(|| ConfigError::malformed("<root>", "rule tree must be a mapping"))?;
    let mut defs = Vec::new();
    walk(root, "", &Scope::root(), &mut defs)?;
    Ok(defs)
}

fn walk(
    node: &serde_yaml::Mapping,
    prefix: &str,
    scope: &Arc<Scope>,
    out: &mut Vec<LabelerDefinition>,
) -> Result<(), ConfigError> {
    let scope = scoped(node, prefix, scope)?;

    for (key, val) in node {
        let key = key.as_str().ok_or_else(|| {
            ConfigError::malformed(display_path(prefix), "mapping keys must be strings")
        })?;
        if key == "__defs__" {
            continue;
        }
        let name = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}/{key}")
        };
        let map = val.as_mapping().ok_or_else(|| {
            ConfigError::malformed(&name, "expected a mapping (namespace or definition)")
        })?;
        if map.contains_key(Yaml::from("color")) {
            let def = compile_leaf(map, &name, &scope)?;
            check_collision(out, &def)?;
            out.push(def);
        } else {
            walk(map, &name, &scope, out)?;
        }
    }
    Ok(())
}

fn display_path(prefix: &str) -> &str {
    if prefix.is_empty() {
        "<root>"
    } else {
        prefix
    }
}

/// Parse this level's `__defs__` (if any) into a child scope.
fn scoped(
    node: &serde_yaml::Mapping,
    prefix: &str,
    parent: &Arc<Scope>,
) -> Result<Arc<Scope>, ConfigError> {
    let raw = match node.get(Yaml::from("__defs__")) {
        Some(v) => v,
        None => return Ok(parent.clone()),
    };
    let path = format!("{}.__defs__", display_path(prefix));
    let map = raw
        .as_mapping()
        .ok_or_else(|| ConfigError::malformed(&path, "__defs__ must be a mapping"))?;

    let mut defs = BTreeMap::new();
    for (key, val) in map {
        let name = key
            .as_str()
            .ok_or_else(|| ConfigError::malformed(&path, "predicate names must be strings"))?;
        let entry_path = format!("{path}.{name}");
        let (params, body_src) = match val {
            Yaml::String(s) => (Vec::new(), s.as_str()),
            Yaml::Mapping(m) => {
                let params = match m.get(Yaml::from("params")) {
                    None | Some(Yaml::Null) => Vec::new(),
                    Some(Yaml::Sequence(seq)) => seq
                        .iter()
                        .map(|p| {
                            p.as_str().map(str::to_string).ok_or_else(|| {
                                ConfigError::malformed(&entry_path, "params must be strings")
                            })
                        })
                        .collect::<Result<_, _>>()?,
                    Some(_) => {
                        return Err(ConfigError::malformed(
                            &entry_path,
                            "'params' must be a list of names",
                        ))
                    }
                };
                let body = m
                    .get(Yaml::from("expr"))
                    .and_then(Yaml::as_str)
                    .ok_or_else(|| {
                        ConfigError::malformed(&entry_path, "predicate requires an 'expr' string")
                    })?;
                (params, body)
            }
            _ => {
                return Err(ConfigError::malformed(
                    &entry_path,
                    "predicate must be an expression string or {params, expr} mapping",
                ))
            }
        };
        let body = expr::parse(body_src)
            .map_err(|e| ConfigError::malformed(&entry_path, e.to_string()))?;
        defs.insert(name.to_string(), Predicate { params, body });
    }
    Ok(Scope::child(parent.clone(), defs))
}

fn compile_leaf(
    map: &serde_yaml::Mapping,
    name: &str,
    scope: &Arc<Scope>,
) -> Result<LabelerDefinition, ConfigError> {
    for key in map.keys() {
        let key = key
            .as_str()
            .ok_or_else(|| ConfigError::malformed(name, "mapping keys must be strings"))?;
        if !LEAF_KEYS.contains(&key) {
            return Err(ConfigError::malformed(
                name,
                format!(
                    "unknown key '{key}' in definition (allowed: {})",
                    LEAF_KEYS.join(", ")
                ),
            ));
        }
    }
    let scope = scoped(map, name, scope)?;

    let color = map
        .get(Yaml::from("color"))
        .and_then(Yaml::as_str)
        .ok_or_else(|| ConfigError::malformed(name, "'color' must be a string"))?
        .to_string();

    let description_template = match map.get(Yaml::from("description")) {
        None | Some(Yaml::Null) => None,
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| ConfigError::malformed(name, "'description' must be a string"))?
                .to_string(),
        ),
    };

    let mut selectors = Vec::new();
    match map.get(Yaml::from("selectors")) {
        None | Some(Yaml::Null) => {}
        Some(Yaml::Mapping(sel_map)) => {
            for (sel_key, sel_val) in sel_map {
                let sel_name = sel_key.as_str().ok_or_else(|| {
                    ConfigError::malformed(name, "selector names must be strings")
                })?;
                let path = format!("{name}.selectors.{sel_name}");
                let cfg = SelectorConfig::from_value(sel_name, sel_val, &path)?;
                selectors.push((sel_name.to_string(), cfg));
            }
        }
        Some(_) => {
            return Err(ConfigError::malformed(name, "'selectors' must be a mapping"));
        }
    }

    let guard = match map.get(Yaml::from("guard")) {
        None | Some(Yaml::Null) => None,
        Some(v) => {
            let src = v
                .as_str()
                .ok_or_else(|| ConfigError::malformed(name, "'guard' must be a string"))?;
            Some(expr::parse(src).map_err(|e| {
                ConfigError::malformed(format!("{name}.guard"), e.to_string())
            })?)
        }
    };

    let action = match map.get(Yaml::from("action")) {
        None | Some(Yaml::Null) => None,
        Some(Yaml::Mapping(act)) => {
            for key in act.keys() {
                match key.as_str() {
                    Some("perform") | Some("comment") => {}
                    _ => {
                        return Err(ConfigError::malformed(
                            format!("{name}.action"),
                            "action accepts only 'perform' and 'comment'",
                        ))
                    }
                }
            }
            let perform = act
                .get(Yaml::from("perform"))
                .and_then(Yaml::as_str)
                .ok_or_else(|| {
                    ConfigError::malformed(
                        format!("{name}.action"),
                        "'perform' must be 'close' or 'reopen'",
                    )
                })?;
            let kind = match perform {
                "close" => ActionKind::Close,
                "reopen" => ActionKind::Reopen,
                other => {
                    return Err(ConfigError::malformed(
                        format!("{name}.action"),
                        format!("unknown action '{other}' (close|reopen)"),
                    ))
                }
            };
            let comment = match act.get(Yaml::from("comment")) {
                None | Some(Yaml::Null) => None,
                Some(v) => Some(
                    v.as_str()
                        .ok_or_else(|| {
                            ConfigError::malformed(
                                format!("{name}.action"),
                                "'comment' must be a string",
                            )
                        })?
                        .to_string(),
                ),
            };
            Some(ActionSpec { kind, comment })
        }
        Some(_) => {
            return Err(ConfigError::malformed(
                format!("{name}.action"),
                "'action' must be a mapping",
            ))
        }
    };

    let templated = expr::has_refs(name);
    let name_matcher =
        name_matcher_for(name).map_err(|source| ConfigError::RegexCompile {
            path: name.to_string(),
            pattern: name.to_string(),
            source,
        })?;

    Ok(LabelerDefinition {
        name_template: name.to_string(),
        templated,
        color,
        description_template,
        selectors,
        guard,
        action,
        scope,
        name_matcher,
    })
}

/// Reject a new definition whose resolved name is already claimed, either
/// verbatim or across the static/templated divide.
fn check_collision(
    existing: &[LabelerDefinition],
    new: &LabelerDefinition,
) -> Result<(), ConfigError> {
    for prev in existing {
        let clash = prev.name_template == new.name_template
            || (!new.templated && prev.templated && prev.manages(&new.name_template))
            || (new.templated && !prev.templated && new.manages(&prev.name_template));
        if clash {
            return Err(ConfigError::DuplicateName {
                name: new.name_template.clone(),
            });
        }
    }
    Ok(())
}

//! Rule-file loading and target specifier parsing.
//!
//! The rule tree is YAML; JSON files load through the same parser since
//! every JSON document is valid YAML.

use std::path::Path;

use crate::error::ConfigError;
use crate::models::label::LabelerDefinition;
use crate::sync::RunScope;

/// Load and compile a rule file into the flat definition list.
pub fn load_definitions(path: &Path) -> Result<Vec<LabelerDefinition>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let tree: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| {
        ConfigError::malformed(path.display().to_string(), format!("invalid YAML: {e}"))
    })?;
    crate::compile::compile(&tree)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Parsed `--target` value: the repository slug plus an optional item.
pub struct TargetSpec {
    pub repo: String,
    pub scope: RunScope,
}

/// Parse `owner/repo`, `owner/repo/pull/N`, or `owner/repo/issue[s]/N`.
pub fn parse_target(spec: &str) -> Result<TargetSpec, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTarget {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = spec.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid("empty path segment"));
    }
    match parts.as_slice() {
        [owner, repo] => Ok(TargetSpec {
            repo: format!("{owner}/{repo}"),
            scope: RunScope::WholeRepo,
        }),
        [owner, repo, kind, number] => {
            match *kind {
                "pull" | "pulls" | "issue" | "issues" => {}
                other => {
                    return Err(invalid(&format!(
                        "expected 'pull' or 'issue', got '{other}'"
                    )))
                }
            }
            let number: u64 = number
                .parse()
                .map_err(|_| invalid("item number must be a positive integer"))?;
            Ok(TargetSpec {
                repo: format!("{owner}/{repo}"),
                scope: RunScope::Item(number),
            })
        }
        _ => Err(invalid(
            "expected owner/repo, owner/repo/pull/N, or owner/repo/issue/N",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_forms() {
        assert_eq!(
            parse_target("octo/widgets").unwrap(),
            TargetSpec {
                repo: "octo/widgets".into(),
                scope: RunScope::WholeRepo
            }
        );
        assert_eq!(
            parse_target("octo/widgets/pull/12").unwrap().scope,
            RunScope::Item(12)
        );
        assert_eq!(
            parse_target("octo/widgets/issues/3").unwrap().scope,
            RunScope::Item(3)
        );
    }

    #[test]
    fn test_parse_target_rejects_bad_specs() {
        for bad in ["octo", "octo/widgets/branch/3", "octo/widgets/pull/x", "octo//x"] {
            assert!(
                matches!(parse_target(bad), Err(ConfigError::InvalidTarget { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_load_definitions_from_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("rules.yaml");
        std::fs::write(&yaml, "bug:\n  color: d73a4a\n").unwrap();
        let defs = load_definitions(&yaml).unwrap();
        assert_eq!(defs[0].name_template, "bug");

        let json = dir.path().join("rules.json");
        std::fs::write(&json, r#"{"docs": {"color": "0075ca"}}"#).unwrap();
        let defs = load_definitions(&json).unwrap();
        assert_eq!(defs[0].name_template, "docs");
    }

    #[test]
    fn test_load_definitions_missing_file() {
        assert!(matches!(
            load_definitions(Path::new("/nonexistent/rules.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}

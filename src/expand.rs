//! Combinatorial expansion of one definition against one target.
//!
//! Every configured selector contributes one factor of results; the cross
//! product of all factors enumerates binding combinations. A selector that
//! produced nothing contributes a single absent placeholder, so the guard
//! decides whether the combination survives. Combinations are materialized
//! one at a time through an index odometer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::expr::{self, Env};
use crate::models::label::{LabelSpec, LabelerDefinition, ResolvedLabel};
use crate::models::target::Target;
use crate::selectors::SelectorResult;

/// Expand one definition, returning resolved labels and the warnings raised
/// for skipped combinations and name collisions.
pub fn expand(
    def: &LabelerDefinition,
    def_index: usize,
    target: &Target,
    now: DateTime<Utc>,
) -> (Vec<ResolvedLabel>, Vec<String>) {
    let mut warnings = Vec::new();

    let mut names: Vec<&str> = Vec::with_capacity(def.selectors.len());
    let mut factors: Vec<Vec<Option<SelectorResult>>> = Vec::with_capacity(def.selectors.len());
    for (name, cfg) in &def.selectors {
        let results = cfg.evaluate(target, now);
        names.push(name.as_str());
        if results.is_empty() {
            factors.push(vec![None]);
        } else {
            factors.push(results.into_iter().map(Some).collect());
        }
    }

    let mut out: Vec<ResolvedLabel> = Vec::new();
    let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
    let mut odometer = vec![0usize; factors.len()];

    loop {
        let slots: BTreeMap<String, Option<&SelectorResult>> = names
            .iter()
            .zip(factors.iter().zip(&odometer))
            .map(|(name, (factor, &i))| (name.to_string(), factor[i].as_ref()))
            .collect();
        let env = Env::new(&slots, &def.scope);

        match check_guard(def, &env, &slots) {
            Ok(true) => match render(def, &env) {
                Ok(Some(spec)) => {
                    let bindings = slots
                        .iter()
                        .map(|(k, v)| (k.clone(), v.cloned()))
                        .collect();
                    let resolved = ResolvedLabel {
                        spec,
                        def_index,
                        bindings,
                    };
                    match by_name.get(&resolved.spec.name) {
                        // Equal names denote the same effective label; the
                        // later combination replaces the earlier one.
                        Some(&at) => {
                            let msg = format!(
                                "'{}': multiple combinations produced label '{}', keeping the last",
                                def.name_template, resolved.spec.name
                            );
                            warn!("{msg}");
                            warnings.push(msg);
                            out[at] = resolved;
                        }
                        None => {
                            by_name.insert(resolved.spec.name.clone(), out.len());
                            out.push(resolved);
                        }
                    }
                }
                Ok(None) => {
                    let msg = format!(
                        "'{}': combination rendered an empty label name, skipped",
                        def.name_template
                    );
                    warn!("{msg}");
                    warnings.push(msg);
                }
                Err(e) => {
                    let msg = format!(
                        "'{}' on {}: template failed: {e}",
                        def.name_template,
                        target.describe()
                    );
                    warn!("{msg}");
                    warnings.push(msg);
                }
            },
            Ok(false) => {}
            Err(e) => {
                let msg = format!(
                    "'{}' on {}: guard failed: {e}",
                    def.name_template,
                    target.describe()
                );
                warn!("{msg}");
                warnings.push(msg);
            }
        }

        if !advance(&mut odometer, &factors) {
            break;
        }
    }

    (out, warnings)
}

fn check_guard(
    def: &LabelerDefinition,
    env: &Env,
    slots: &BTreeMap<String, Option<&SelectorResult>>,
) -> Result<bool, crate::error::EvalError> {
    match &def.guard {
        Some(guard) => Ok(expr::eval(guard, env)?.truthy()),
        // Default guard: every configured selector fired in this combination.
        None => Ok(slots.values().all(|v| v.map_or(false, |r| r.matched))),
    }
}

fn render(
    def: &LabelerDefinition,
    env: &Env,
) -> Result<Option<LabelSpec>, crate::error::EvalError> {
    let name = expr::render_template(&def.name_template, env)?;
    if name.is_empty() {
        return Ok(None);
    }
    let description = match &def.description_template {
        Some(tmpl) => Some(expr::render_template(tmpl, env)?),
        None => None,
    };
    Ok(Some(LabelSpec {
        name,
        color: def.color.clone(),
        description,
    }))
}

fn advance(odometer: &mut [usize], factors: &[Vec<Option<SelectorResult>>]) -> bool {
    for i in (0..odometer.len()).rev() {
        odometer[i] += 1;
        if odometer[i] < factors[i].len() {
            return true;
        }
        odometer[i] = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::models::target::{FileDiff, ItemFacts, ItemState};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn compile_one(src: &str) -> LabelerDefinition {
        let tree: serde_yaml::Value = serde_yaml::from_str(src).unwrap();
        compile(&tree).unwrap().remove(0)
    }

    fn pr_with_files(files: Vec<FileDiff>) -> Target {
        Target::Item(ItemFacts {
            number: 1,
            title: "Refactor storage".into(),
            body: String::new(),
            author: "alice".into(),
            state: ItemState::Open,
            is_pr: true,
            merged: false,
            draft: false,
            approved: false,
            author_role: None,
            source_branch: None,
            target_branch: None,
            source_repo: None,
            comments: vec![],
            files,
            labels: vec![],
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            updated_at: None,
        })
    }

    #[test]
    fn test_cross_product_three_files_times_one_diff() {
        let def = compile_one(
            r#"
            "module/{files.groups[0]}":
              color: ededed
              description: "touches {files.path} ({diff.total} lines)"
              selectors:
                files:
                  name_regex: '^src/(\w+)/'
                diff: {min: 1}
            "#,
        );
        let target = pr_with_files(vec![
            FileDiff { path: "src/auth/mod.rs".into(), additions: 5, deletions: 1 },
            FileDiff { path: "src/store/db.rs".into(), additions: 10, deletions: 0 },
            FileDiff { path: "src/net/tcp.rs".into(), additions: 2, deletions: 2 },
        ]);
        let (labels, warnings) = expand(&def, 0, &target, now());
        assert!(warnings.is_empty());
        let names: Vec<_> = labels.iter().map(|l| l.spec.name.as_str()).collect();
        assert_eq!(names, vec!["module/auth", "module/store", "module/net"]);
        for label in &labels {
            let path = label.bindings["files"].as_ref().unwrap().path.clone().unwrap();
            assert_eq!(
                label.spec.description.as_deref().unwrap(),
                format!("touches {path} (20 lines)").as_str()
            );
        }
    }

    #[test]
    fn test_default_guard_requires_all_selectors() {
        let def = compile_one(
            r#"
            big:
              color: '111111'
              selectors:
                title: 'Refactor'
                diff: {min: 10000}
            "#,
        );
        // Title matches, diff does not: default guard fails, nothing emitted.
        let target = pr_with_files(vec![FileDiff {
            path: "a.rs".into(),
            additions: 3,
            deletions: 0,
        }]);
        let (labels, warnings) = expand(&def, 0, &target, now());
        assert!(labels.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_explicit_guard_admits_partial_combination() {
        let def = compile_one(
            r#"
            bug:
              color: d73a4a
              guard: "title or description"
              selectors:
                title: '(issue|bug|fix|problem|failure|error)'
                description: '(issue|bug|fix|problem|failure|error)'
            "#,
        );
        let mut target = pr_with_files(vec![]);
        if let Target::Item(it) = &mut target {
            it.title = "Fix login bug".into();
        }
        let (labels, warnings) = expand(&def, 0, &target, now());
        assert!(warnings.is_empty());
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].spec.name, "bug");
    }

    #[test]
    fn test_guard_eval_error_skips_combination_with_warning() {
        // Field access on a selector that produced nothing is a hard error;
        // the combination is skipped, not treated as non-matching.
        let def = compile_one(
            r#"
            risky:
              color: '222222'
              guard: "author.match == 'alice'"
              selectors:
                author: '^nobody$'
            "#,
        );
        let target = pr_with_files(vec![]);
        let (labels, warnings) = expand(&def, 0, &target, now());
        assert!(labels.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("guard failed"));
    }

    #[test]
    fn test_name_collision_last_wins_with_warning() {
        // Both matching files render the same static name.
        let def = compile_one(
            r#"
            touched-src:
              color: '333333'
              description: "last: {files.path}"
              selectors:
                files:
                  name_regex: '^src/'
            "#,
        );
        let target = pr_with_files(vec![
            FileDiff { path: "src/a.rs".into(), additions: 1, deletions: 0 },
            FileDiff { path: "src/b.rs".into(), additions: 1, deletions: 0 },
        ]);
        let (labels, warnings) = expand(&def, 0, &target, now());
        assert_eq!(labels.len(), 1);
        assert_eq!(
            labels[0].spec.description.as_deref(),
            Some("last: src/b.rs")
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("keeping the last"));
    }

    #[test]
    fn test_definition_without_selectors_emits_once() {
        let def = compile_one(
            r#"
            always:
              color: '444444'
            "#,
        );
        let (labels, warnings) = expand(&def, 0, &pr_with_files(vec![]), now());
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].spec.name, "always");
        assert!(warnings.is_empty());
    }
}

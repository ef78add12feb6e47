//! Reconciliation of desired labels against remote state.
//!
//! One run re-derives the desired set from the compiled definitions and the
//! provider's current facts, diffs it against the remote registry and
//! per-item assignments, and executes a minimal operation sequence. Nothing
//! is cached between runs; idempotency falls out of diffing fresh state, so
//! a second run over unchanged facts produces an empty plan.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::expand::expand;
use crate::expr::{self, Env};
use crate::models::label::{LabelSpec, LabelerDefinition, PlanOp, ResolvedLabel};
use crate::models::target::{ItemFacts, ItemState, Target};
use crate::provider::RepoProvider;
use crate::selectors::SelectorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Generate,
    Sync,
    Purge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScope {
    WholeRepo,
    Item(u64),
}

#[derive(Debug, Clone, Serialize)]
pub struct OpFailure {
    pub op: PlanOp,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
/// Outcome of one run: the labels touched, the plan, and everything that
/// went wrong. Per-operation and per-target failures never abort the run.
pub struct RunReport {
    /// For generate/sync, the full desired registry set, including entries
    /// that needed no operation; for purge, the deleted entries.
    pub labels: Vec<LabelSpec>,
    pub plan: Vec<PlanOp>,
    pub executed: usize,
    pub failed_ops: Vec<OpFailure>,
    pub failed_targets: Vec<TargetFailure>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn ok(&self) -> bool {
        self.failed_ops.is_empty() && self.failed_targets.is_empty()
    }
}

/// One target's expansion outcome, produced in parallel for repo-wide runs.
struct TargetPlan {
    target: Target,
    resolved: Vec<ResolvedLabel>,
    warnings: Vec<String>,
}

pub fn run(
    defs: &[LabelerDefinition],
    provider: &dyn RepoProvider,
    mode: RunMode,
    scope: RunScope,
    actions_enabled: bool,
    now: DateTime<Utc>,
) -> Result<RunReport, ProviderError> {
    let remote_labels = provider.list_labels()?;
    let mut report = RunReport::default();

    if mode == RunMode::Purge {
        plan_purge(defs, provider, scope, &remote_labels, &mut report)?;
    } else {
        let plans = expand_all(defs, provider, scope, now, &mut report)?;
        for plan in &plans {
            report.warnings.extend(plan.warnings.iter().cloned());
        }
        let desired = desired_registry(&plans);
        plan_registry_ops(&desired, &remote_labels, &mut report);
        for plan in &plans {
            if let Target::Item(item) = &plan.target {
                plan_item_ops(defs, item, &plan.resolved, actions_enabled, &mut report);
            }
        }
        report.labels = desired;
    }

    if mode != RunMode::Generate {
        execute(provider, &mut report);
    }
    Ok(report)
}

/// Fetch facts and expand every definition for every in-scope target.
/// A target whose facts cannot be fetched is skipped and recorded.
fn expand_all(
    defs: &[LabelerDefinition],
    provider: &dyn RepoProvider,
    scope: RunScope,
    now: DateTime<Utc>,
    report: &mut RunReport,
) -> Result<Vec<TargetPlan>, ProviderError> {
    let numbers = match scope {
        RunScope::WholeRepo => provider.list_item_numbers()?,
        RunScope::Item(n) => vec![n],
    };

    let mut plans = Vec::new();
    if scope == RunScope::WholeRepo {
        match provider.fetch_repository() {
            Ok(repo) => plans.push(expand_target(defs, Target::Repository(repo), now)),
            Err(e) => report.failed_targets.push(TargetFailure {
                target: "repository".into(),
                error: e.to_string(),
            }),
        }
    }

    let expanded: Vec<Result<TargetPlan, TargetFailure>> = numbers
        .par_iter()
        .map(|&number| {
            let item = provider.fetch_item(number).map_err(|e| TargetFailure {
                target: format!("#{number}"),
                error: e.to_string(),
            })?;
            Ok(expand_target(defs, Target::Item(item), now))
        })
        .collect();
    for outcome in expanded {
        match outcome {
            Ok(plan) => plans.push(plan),
            Err(failure) => {
                warn!("skipping {}: {}", failure.target, failure.error);
                report.failed_targets.push(failure);
            }
        }
    }
    Ok(plans)
}

fn expand_target(defs: &[LabelerDefinition], target: Target, now: DateTime<Utc>) -> TargetPlan {
    let mut resolved = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = BTreeSet::new();
    for (i, def) in defs.iter().enumerate() {
        let (labels, warns) = expand(def, i, &target, now);
        warnings.extend(warns);
        for label in labels {
            // Across definitions, the earliest declaration keeps the name.
            if seen.insert(label.spec.name.clone()) {
                resolved.push(label);
            }
        }
    }
    debug!(
        "{}: {} label(s) resolved",
        target.describe(),
        resolved.len()
    );
    TargetPlan {
        target,
        resolved,
        warnings,
    }
}

/// Union of all targets' resolved specs, one entry per name in first-seen
/// order. This is the registry-level desired set `D`.
fn desired_registry(plans: &[TargetPlan]) -> Vec<LabelSpec> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for plan in plans {
        for label in &plan.resolved {
            if seen.insert(label.spec.name.clone()) {
                out.push(label.spec.clone());
            }
        }
    }
    out
}

/// Registry ops are keyed by name, so each label is created or updated at
/// most once per run no matter how many targets produced it.
fn plan_registry_ops(desired: &[LabelSpec], remote: &[LabelSpec], report: &mut RunReport) {
    for spec in desired {
        match remote.iter().find(|l| l.name == spec.name) {
            None => report.plan.push(PlanOp::CreateLabel {
                label: spec.clone(),
            }),
            Some(existing) if existing != spec => report.plan.push(PlanOp::UpdateLabel {
                label: spec.clone(),
            }),
            Some(_) => {}
        }
    }
}

fn plan_item_ops(
    defs: &[LabelerDefinition],
    item: &ItemFacts,
    resolved: &[ResolvedLabel],
    actions_enabled: bool,
    report: &mut RunReport,
) {
    let desired_names: BTreeSet<&str> =
        resolved.iter().map(|l| l.spec.name.as_str()).collect();

    for label in resolved {
        if !item.labels.iter().any(|l| l == &label.spec.name) {
            report.plan.push(PlanOp::AssignLabel {
                number: item.number,
                name: label.spec.name.clone(),
            });
        }
    }

    // Only labels this configuration manages are ever detached; anything
    // assigned by hand outside the definition set is left alone.
    for assigned in &item.labels {
        if desired_names.contains(assigned.as_str()) {
            continue;
        }
        if defs.iter().any(|d| d.manages(assigned)) {
            report.plan.push(PlanOp::DetachLabel {
                number: item.number,
                name: assigned.clone(),
            });
        }
    }

    if actions_enabled {
        plan_actions(defs, item, resolved, report);
    }
}

fn plan_actions(
    defs: &[LabelerDefinition],
    item: &ItemFacts,
    resolved: &[ResolvedLabel],
    report: &mut RunReport,
) {
    let mut requested_state: Option<ItemState> = None;
    let mut state_queued = false;
    let mut queued_comments: BTreeSet<String> = BTreeSet::new();

    for label in resolved {
        let def = &defs[label.def_index];
        let action = match &def.action {
            Some(a) => a,
            None => continue,
        };
        let desired_state = action.kind.desired_state();

        let comment = match &action.comment {
            Some(tmpl) => match render_action_comment(tmpl, def, label) {
                Ok(body) => Some(body),
                Err(e) => {
                    let msg = format!(
                        "'{}' on #{}: action comment failed: {e}",
                        def.name_template, item.number
                    );
                    warn!("{msg}");
                    report.warnings.push(msg);
                    continue;
                }
            },
            None => None,
        };

        // Already satisfied: state as requested and the comment (if any)
        // already on the thread. Nothing to do, nothing to repeat.
        let comment_present = comment
            .as_ref()
            .map_or(true, |body| item.comments.iter().any(|c| &c.body == body));
        if item.state == desired_state && comment_present {
            continue;
        }

        match requested_state {
            Some(prior) if prior != desired_state => {
                report.failed_ops.push(OpFailure {
                    op: PlanOp::SetState {
                        number: item.number,
                        state: desired_state,
                    },
                    error: format!(
                        "'{}' requests {} but an earlier action already requested {}",
                        def.name_template,
                        desired_state.as_str(),
                        prior.as_str()
                    ),
                });
                continue;
            }
            Some(_) => {}
            None => requested_state = Some(desired_state),
        }

        if item.state != desired_state && !state_queued {
            report.plan.push(PlanOp::SetState {
                number: item.number,
                state: desired_state,
            });
            state_queued = true;
        }
        if let Some(body) = comment {
            if !comment_present && queued_comments.insert(body.clone()) {
                report.plan.push(PlanOp::PostComment {
                    number: item.number,
                    body,
                });
            }
        }
    }
}

fn render_action_comment(
    tmpl: &str,
    def: &LabelerDefinition,
    label: &ResolvedLabel,
) -> Result<String, crate::error::EvalError> {
    let refs: BTreeMap<String, Option<&SelectorResult>> = label
        .bindings
        .iter()
        .map(|(k, v)| (k.clone(), v.as_ref()))
        .collect();
    let env = Env::new(&refs, &def.scope);
    expr::render_template(tmpl, &env)
}

/// Purge: detach every managed label from every in-scope item; on whole
/// repository runs, also delete managed registry entries.
fn plan_purge(
    defs: &[LabelerDefinition],
    provider: &dyn RepoProvider,
    scope: RunScope,
    remote: &[LabelSpec],
    report: &mut RunReport,
) -> Result<(), ProviderError> {
    let numbers = match scope {
        RunScope::WholeRepo => provider.list_item_numbers()?,
        RunScope::Item(n) => vec![n],
    };
    for number in numbers {
        let item = match provider.fetch_item(number) {
            Ok(it) => it,
            Err(e) => {
                report.failed_targets.push(TargetFailure {
                    target: format!("#{number}"),
                    error: e.to_string(),
                });
                continue;
            }
        };
        for assigned in &item.labels {
            if defs.iter().any(|d| d.manages(assigned)) {
                report.plan.push(PlanOp::DetachLabel {
                    number,
                    name: assigned.clone(),
                });
            }
        }
    }
    if scope == RunScope::WholeRepo {
        for label in remote {
            if defs.iter().any(|d| d.manages(&label.name)) {
                report.plan.push(PlanOp::DeleteLabel {
                    name: label.name.clone(),
                });
                report.labels.push(label.clone());
            }
        }
    }
    Ok(())
}

/// Execute the plan in order. Failures are recorded and the run continues.
fn execute(provider: &dyn RepoProvider, report: &mut RunReport) {
    let ops = report.plan.clone();
    for op in &ops {
        let outcome = match op {
            PlanOp::CreateLabel { label } => provider.create_label(label),
            PlanOp::UpdateLabel { label } => provider.update_label(label),
            PlanOp::DeleteLabel { name } => provider.delete_label(name),
            PlanOp::AssignLabel { number, name } => provider.assign_label(*number, name),
            PlanOp::DetachLabel { number, name } => provider.detach_label(*number, name),
            PlanOp::SetState { number, state } => provider.set_item_state(*number, *state),
            PlanOp::PostComment { number, body } => provider.post_comment(*number, body),
        };
        match outcome {
            Ok(()) => report.executed += 1,
            Err(e) => {
                warn!("{} failed: {e}", op.describe());
                report.failed_ops.push(OpFailure {
                    op: op.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}

//! Label definitions, resolved labels, and plan operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Scope};
use crate::models::target::ItemState;
use crate::selectors::{SelectorConfig, SelectorResult};

/// One concrete label as it exists (or should exist) in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Close,
    Reopen,
}

impl ActionKind {
    pub fn desired_state(&self) -> ItemState {
        match self {
            ActionKind::Close => ItemState::Closed,
            ActionKind::Reopen => ItemState::Open,
        }
    }
}

#[derive(Debug, Clone)]
/// Side effect attached to a definition, applied when the label resolves.
pub struct ActionSpec {
    pub kind: ActionKind,
    /// Comment template posted alongside the state change.
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
/// One compiled leaf of the rule tree: a fully namespaced name template, its
/// selectors in declaration order, an optional guard, and the predicate scope
/// visible at its position in the tree.
pub struct LabelerDefinition {
    pub name_template: String,
    /// Whether the name contains reference tokens and expands per binding.
    pub templated: bool,
    pub color: String,
    pub description_template: Option<String>,
    pub selectors: Vec<(String, SelectorConfig)>,
    pub guard: Option<Expr>,
    pub action: Option<ActionSpec>,
    pub scope: Arc<Scope>,
    /// Matches remote label names this definition could have produced.
    pub name_matcher: Regex,
}

impl LabelerDefinition {
    /// Whether a remote label name is managed by this definition.
    pub fn manages(&self, name: &str) -> bool {
        if self.templated {
            self.name_matcher.is_match(name)
        } else {
            self.name_template == name
        }
    }
}

/// Compile a name template into an anchored matcher: literal text matched
/// verbatim, each `{..}` token a non-greedy wildcard. `{{`/`}}` unescape to
/// literal braces first.
pub fn name_matcher_for(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        break;
                    }
                }
                pattern.push_str(&regex::escape(&literal));
                literal.clear();
                pattern.push_str("(.+?)");
            }
            c => literal.push(c),
        }
    }
    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');
    Regex::new(&pattern)
}

#[derive(Debug, Clone)]
/// One expanded (definition, binding) outcome: the concrete label plus the
/// selector-result combination that produced it, kept for action templates.
pub struct ResolvedLabel {
    pub spec: LabelSpec,
    pub def_index: usize,
    pub bindings: BTreeMap<String, Option<SelectorResult>>,
}

/// One step of a reconciliation plan, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOp {
    CreateLabel { label: LabelSpec },
    UpdateLabel { label: LabelSpec },
    DeleteLabel { name: String },
    AssignLabel { number: u64, name: String },
    DetachLabel { number: u64, name: String },
    SetState { number: u64, state: ItemState },
    PostComment { number: u64, body: String },
}

impl PlanOp {
    pub fn describe(&self) -> String {
        match self {
            PlanOp::CreateLabel { label } => {
                format!("create label '{}' (#{})", label.name, label.color)
            }
            PlanOp::UpdateLabel { label } => {
                format!("update label '{}' (#{})", label.name, label.color)
            }
            PlanOp::DeleteLabel { name } => format!("delete label '{name}'"),
            PlanOp::AssignLabel { number, name } => {
                format!("assign '{name}' to #{number}")
            }
            PlanOp::DetachLabel { number, name } => {
                format!("detach '{name}' from #{number}")
            }
            PlanOp::SetState { number, state } => {
                format!("set #{number} {}", state.as_str())
            }
            PlanOp::PostComment { number, .. } => format!("comment on #{number}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matcher_static_and_templated() {
        let re = name_matcher_for("module/{files.groups[0]}").unwrap();
        assert!(re.is_match("module/auth"));
        assert!(re.is_match("module/deep/path"));
        assert!(!re.is_match("module/"));
        assert!(!re.is_match("other/auth"));

        let re = name_matcher_for("size/{diff.min}-{diff.max}").unwrap();
        assert!(re.is_match("size/100-500"));
        assert!(!re.is_match("size/100"));
    }

    #[test]
    fn test_name_matcher_escapes_regex_metachars_and_braces() {
        let re = name_matcher_for("prio.high+{x}").unwrap();
        assert!(re.is_match("prio.high+1"));
        assert!(!re.is_match("prioXhigh+1"));

        let re = name_matcher_for("lit {{x}} {y}").unwrap();
        assert!(re.is_match("lit {x} z"));
        assert!(!re.is_match("lit q z"));
    }

    #[test]
    fn test_plan_op_json_shape() {
        let op = PlanOp::AssignLabel {
            number: 12,
            name: "bug".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "assign_label");
        assert_eq!(json["number"], 12);
        assert_eq!(json["name"], "bug");
    }
}

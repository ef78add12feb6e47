//! Typed selectors evaluated against a target's facts.
//!
//! Each selector produces zero, one, or many `SelectorResult`s; multi-valued
//! selectors (comments, files) yield one result per matching item, and that
//! multiplicity drives combinatorial expansion downstream. All regexes are
//! compiled while loading the configuration, so a bad pattern is a fatal
//! `ConfigError` rather than a per-target failure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde_yaml::Value as Yaml;

use crate::error::{ConfigError, EvalError};
use crate::expr::{PathSeg, Value};
use crate::models::target::Target;

pub const SELECTOR_NAMES: &[&str] = &[
    "title",
    "description",
    "author",
    "author_role",
    "source_branch",
    "target_branch",
    "source_repo",
    "comments",
    "maintainer_comments",
    "state",
    "files",
    "diff",
    "last_activity",
    "last_comment",
    "merged",
    "draft",
    "approved",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Any,
    All,
    None,
}

impl Strategy {
    fn parse(s: &str) -> Option<Strategy> {
        match s {
            "any" => Some(Strategy::Any),
            "all" => Some(Strategy::All),
            "none" => Some(Strategy::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which single-valued fact a regex selector reads.
pub enum RegexField {
    Title,
    Description,
    Author,
    AuthorRole,
    SourceBranch,
    TargetBranch,
    SourceRepo,
}

#[derive(Debug, Clone)]
pub struct RegexSelector {
    pub field: RegexField,
    pub patterns: Vec<Regex>,
    pub strategy: Strategy,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone)]
/// Comment-stream regex selector; yields one result per matching comment.
pub struct CommentsSelector {
    pub maintainers_only: bool,
    pub patterns: Vec<Regex>,
    pub strategy: Strategy,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMetric {
    Total,
    Net,
    Additions,
    Deletions,
}

impl DiffMetric {
    fn parse(s: &str) -> Option<DiffMetric> {
        match s {
            "total" => Some(DiffMetric::Total),
            "net" => Some(DiffMetric::Net),
            "additions" => Some(DiffMetric::Additions),
            "deletions" => Some(DiffMetric::Deletions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
/// Bounds-checks one diff metric over `[min, max)`; omitted bounds are open.
pub struct DiffSelector {
    pub metric: DiffMetric,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct FilesSelector {
    pub name_regex: Regex,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone)]
/// Lifecycle-state allow-list; empty means any state.
pub struct StateSelector {
    pub allowed: Vec<crate::models::target::ItemState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    LastActivity,
    LastComment,
}

#[derive(Debug, Clone)]
/// Matches when at least `min_days` have elapsed since the tracked event.
pub struct ActivitySelector {
    pub kind: ActivityKind,
    pub min_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Merged,
    Draft,
    Approved,
}

#[derive(Debug, Clone)]
/// Boolean PR-flag selector (`merged`, `draft`, `approved`), optionally
/// pinned to a desired value.
pub struct FlagSelector {
    pub kind: FlagKind,
    pub desired: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum SelectorConfig {
    Regex(RegexSelector),
    Comments(CommentsSelector),
    Diff(DiffSelector),
    Files(FilesSelector),
    State(StateSelector),
    Activity(ActivitySelector),
    Flag(FlagSelector),
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn compile_regex(
    pattern: &str,
    case_insensitive: bool,
    path: &str,
) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| ConfigError::RegexCompile {
            path: path.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

/// Regex-style config: null (catch-all), a pattern string, a list of
/// patterns, or a mapping with `regexes`, `strategy`, `case_insensitive`.
fn parse_regex_body(
    val: &Yaml,
    path: &str,
) -> Result<(Vec<Regex>, Strategy, bool), ConfigError> {
    let mut raw: Vec<String> = vec![".*".to_string()];
    let mut strategy = Strategy::Any;
    let mut case_insensitive = false;

    match val {
        Yaml::Null => {}
        Yaml::String(s) => raw = vec![s.clone()],
        Yaml::Sequence(seq) => {
            raw = Vec::with_capacity(seq.len());
            for item in seq {
                match item.as_str() {
                    Some(s) => raw.push(s.to_string()),
                    None => {
                        return Err(ConfigError::malformed(
                            path,
                            "regex list items must all be strings",
                        ))
                    }
                }
            }
            if raw.is_empty() {
                return Err(ConfigError::malformed(path, "regex list must not be empty"));
            }
        }
        Yaml::Mapping(map) => {
            let regexes = map
                .get(Yaml::from("regexes"))
                .ok_or_else(|| ConfigError::malformed(path, "mapping form requires 'regexes'"))?;
            raw = match regexes {
                Yaml::String(s) => vec![s.clone()],
                Yaml::Sequence(seq) => seq
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_string).ok_or_else(|| {
                            ConfigError::malformed(path, "regex list items must all be strings")
                        })
                    })
                    .collect::<Result<_, _>>()?,
                _ => {
                    return Err(ConfigError::malformed(
                        path,
                        "'regexes' must be a string or list of strings",
                    ))
                }
            };
            if let Some(s) = map.get(Yaml::from("strategy")) {
                let s = s
                    .as_str()
                    .ok_or_else(|| ConfigError::malformed(path, "'strategy' must be a string"))?;
                strategy = Strategy::parse(s).ok_or_else(|| {
                    ConfigError::malformed(path, format!("unknown strategy '{s}' (any|all|none)"))
                })?;
            }
            if let Some(ci) = map.get(Yaml::from("case_insensitive")) {
                case_insensitive = ci.as_bool().ok_or_else(|| {
                    ConfigError::malformed(path, "'case_insensitive' must be a boolean")
                })?;
            }
        }
        _ => {
            return Err(ConfigError::malformed(
                path,
                "expected null, string, list, or mapping",
            ))
        }
    }

    let patterns = raw
        .iter()
        .map(|p| compile_regex(p, case_insensitive, path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((patterns, strategy, case_insensitive))
}

fn yaml_i64(val: &Yaml, key: &str, path: &str) -> Result<Option<i64>, ConfigError> {
    match val.get(Yaml::from(key)) {
        None | Some(Yaml::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| ConfigError::malformed(path, format!("'{key}' must be an integer"))),
    }
}

impl SelectorConfig {
    /// Build one selector from its config key and body. The key picks the
    /// selector kind; unknown keys are configuration errors.
    pub fn from_value(name: &str, val: &Yaml, path: &str) -> Result<SelectorConfig, ConfigError> {
        let field = match name {
            "title" => Some(RegexField::Title),
            "description" => Some(RegexField::Description),
            "author" => Some(RegexField::Author),
            "author_role" => Some(RegexField::AuthorRole),
            "source_branch" => Some(RegexField::SourceBranch),
            "target_branch" => Some(RegexField::TargetBranch),
            "source_repo" => Some(RegexField::SourceRepo),
            _ => None,
        };
        if let Some(field) = field {
            let (patterns, strategy, case_insensitive) = parse_regex_body(val, path)?;
            return Ok(SelectorConfig::Regex(RegexSelector {
                field,
                patterns,
                strategy,
                case_insensitive,
            }));
        }

        match name {
            "comments" | "maintainer_comments" => {
                let (patterns, strategy, case_insensitive) = parse_regex_body(val, path)?;
                Ok(SelectorConfig::Comments(CommentsSelector {
                    maintainers_only: name == "maintainer_comments",
                    patterns,
                    strategy,
                    case_insensitive,
                }))
            }
            "state" => {
                let mut allowed = Vec::new();
                let states: Vec<&str> = match val {
                    Yaml::Null => vec![],
                    Yaml::String(s) => vec![s.as_str()],
                    Yaml::Sequence(seq) => seq
                        .iter()
                        .map(|v| {
                            v.as_str().ok_or_else(|| {
                                ConfigError::malformed(path, "state list items must be strings")
                            })
                        })
                        .collect::<Result<_, _>>()?,
                    _ => {
                        return Err(ConfigError::malformed(
                            path,
                            "expected null, string, or list of states",
                        ))
                    }
                };
                for s in states {
                    let st = crate::models::target::ItemState::parse(s).ok_or_else(|| {
                        ConfigError::malformed(path, format!("unknown state '{s}' (open|closed)"))
                    })?;
                    allowed.push(st);
                }
                Ok(SelectorConfig::State(StateSelector { allowed }))
            }
            "files" => {
                let map = val.as_mapping().ok_or_else(|| {
                    ConfigError::malformed(path, "files selector requires a mapping")
                })?;
                let pattern = map
                    .get(Yaml::from("name_regex"))
                    .and_then(Yaml::as_str)
                    .ok_or_else(|| {
                        ConfigError::malformed(path, "files selector requires 'name_regex'")
                    })?;
                let case_insensitive = match map.get(Yaml::from("case_insensitive")) {
                    None | Some(Yaml::Null) => false,
                    Some(v) => v.as_bool().ok_or_else(|| {
                        ConfigError::malformed(path, "'case_insensitive' must be a boolean")
                    })?,
                };
                Ok(SelectorConfig::Files(FilesSelector {
                    name_regex: compile_regex(pattern, case_insensitive, path)?,
                    case_insensitive,
                }))
            }
            "diff" => {
                let mut metric = DiffMetric::Total;
                let (min, max) = match val {
                    Yaml::Mapping(map) => {
                        for key in map.keys() {
                            match key.as_str() {
                                Some("min") | Some("max") | Some("metric") | Some("type") => {}
                                _ => {
                                    return Err(ConfigError::malformed(
                                        path,
                                        "diff selector accepts only min/max/metric",
                                    ))
                                }
                            }
                        }
                        // `type` kept as an alias for `metric` for configs
                        // written against the historical key name.
                        if let Some(m) = map
                            .get(Yaml::from("metric"))
                            .or_else(|| map.get(Yaml::from("type")))
                        {
                            let s = m.as_str().ok_or_else(|| {
                                ConfigError::malformed(path, "'metric' must be a string")
                            })?;
                            metric = DiffMetric::parse(s).ok_or_else(|| {
                                ConfigError::malformed(
                                    path,
                                    format!(
                                        "unknown metric '{s}' (total|net|additions|deletions)"
                                    ),
                                )
                            })?;
                        }
                        (yaml_i64(val, "min", path)?, yaml_i64(val, "max", path)?)
                    }
                    _ => {
                        return Err(ConfigError::malformed(
                            path,
                            "diff selector requires a mapping",
                        ))
                    }
                };
                if min.is_none() && max.is_none() {
                    return Err(ConfigError::malformed(
                        path,
                        "diff selector requires at least one of min/max",
                    ));
                }
                Ok(SelectorConfig::Diff(DiffSelector { metric, min, max }))
            }
            "last_activity" | "last_comment" => {
                let min_days = match val {
                    Yaml::Null => 0,
                    v => v.as_i64().ok_or_else(|| {
                        ConfigError::malformed(path, "activity selector requires an integer")
                    })?,
                };
                Ok(SelectorConfig::Activity(ActivitySelector {
                    kind: if name == "last_activity" {
                        ActivityKind::LastActivity
                    } else {
                        ActivityKind::LastComment
                    },
                    min_days,
                }))
            }
            "merged" | "draft" | "approved" => {
                let desired = match val {
                    Yaml::Null => None,
                    Yaml::Bool(b) => Some(*b),
                    _ => {
                        return Err(ConfigError::malformed(
                            path,
                            "flag selector requires a boolean or null",
                        ))
                    }
                };
                Ok(SelectorConfig::Flag(FlagSelector {
                    kind: match name {
                        "merged" => FlagKind::Merged,
                        "draft" => FlagKind::Draft,
                        _ => FlagKind::Approved,
                    },
                    desired,
                }))
            }
            other => Err(ConfigError::malformed(
                path,
                format!(
                    "unknown selector '{other}'; supported selectors are: {}",
                    SELECTOR_NAMES.join(", ")
                ),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub additions: i64,
    pub deletions: i64,
}

impl DiffStat {
    pub fn total(&self) -> i64 {
        self.additions + self.deletions
    }

    pub fn net(&self) -> i64 {
        self.additions - self.deletions
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// One match instance of a selector. A closed set of optional members; the
/// evaluator's attribute traversal fails closed on anything unset.
pub struct SelectorResult {
    pub matched: bool,
    /// The full text the match was found in.
    pub full: Option<String>,
    /// Primary match text of the first matching pattern.
    pub matched_text: Option<String>,
    /// Capture groups of the first matching pattern; unmatched groups are
    /// empty strings.
    pub groups: Vec<String>,
    /// Matching path, for files selectors.
    pub path: Option<String>,
    pub state: Option<String>,
    pub check: Option<bool>,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub from_maintainer: Option<bool>,
    /// Elapsed days, for activity selectors.
    pub days_since: Option<i64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub total: Option<i64>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub net: Option<i64>,
    /// Per-file diff breakdown, for diff selectors.
    pub files: BTreeMap<String, DiffStat>,
}

impl SelectorResult {
    /// Typed attribute traversal. `segs` excludes the selector-name root.
    pub fn lookup(&self, segs: &[PathSeg], full_path: &str) -> Result<Value, EvalError> {
        let unresolved = || EvalError::UnresolvedReference {
            path: full_path.to_string(),
        };
        let first = match &segs[0] {
            PathSeg::Key(k) => k.as_str(),
            PathSeg::Index(_) => return Err(unresolved()),
        };
        let rest = &segs[1..];

        let scalar = |v: Value| -> Result<Value, EvalError> {
            if rest.is_empty() {
                Ok(v)
            } else {
                Err(EvalError::Type(format!(
                    "'{full_path}' does not support further access"
                )))
            }
        };

        match first {
            "matched" => scalar(Value::Bool(self.matched)),
            "full" => scalar(Value::Str(self.full.clone().ok_or_else(unresolved)?)),
            "match" => scalar(Value::Str(
                self.matched_text.clone().ok_or_else(unresolved)?,
            )),
            "path" => scalar(Value::Str(self.path.clone().ok_or_else(unresolved)?)),
            "state" => scalar(Value::Str(self.state.clone().ok_or_else(unresolved)?)),
            "author" => scalar(Value::Str(self.author.clone().ok_or_else(unresolved)?)),
            "created_at" => scalar(Value::Str(
                self.created_at.ok_or_else(unresolved)?.to_rfc3339(),
            )),
            "check" => scalar(Value::Bool(self.check.ok_or_else(unresolved)?)),
            "from_maintainer" => {
                scalar(Value::Bool(self.from_maintainer.ok_or_else(unresolved)?))
            }
            "days_since" => scalar(Value::Int(self.days_since.ok_or_else(unresolved)?)),
            "min" => scalar(Value::Int(self.min.ok_or_else(unresolved)?)),
            "max" => scalar(Value::Int(self.max.ok_or_else(unresolved)?)),
            "total" => scalar(Value::Int(self.total.ok_or_else(unresolved)?)),
            "additions" => scalar(Value::Int(self.additions.ok_or_else(unresolved)?)),
            "deletions" => scalar(Value::Int(self.deletions.ok_or_else(unresolved)?)),
            "net" => scalar(Value::Int(self.net.ok_or_else(unresolved)?)),
            "groups" => match rest {
                [] => Ok(Value::Seq(
                    self.groups.iter().cloned().map(Value::Str).collect(),
                )),
                [PathSeg::Index(i)] => match self.groups.get(*i) {
                    Some(g) => Ok(Value::Str(g.clone())),
                    None => Err(EvalError::IndexOutOfRange {
                        path: full_path.to_string(),
                        index: *i,
                    }),
                },
                _ => Err(EvalError::Type(format!(
                    "'{full_path}': groups supports only numeric indexing"
                ))),
            },
            "files" => self.lookup_files(rest, full_path),
            _ => Err(unresolved()),
        }
    }

    fn lookup_files(&self, rest: &[PathSeg], full_path: &str) -> Result<Value, EvalError> {
        fn stat_map(stat: &DiffStat) -> Value {
            Value::Map(BTreeMap::from([
                ("additions".to_string(), Value::Int(stat.additions)),
                ("deletions".to_string(), Value::Int(stat.deletions)),
                ("total".to_string(), Value::Int(stat.total())),
                ("net".to_string(), Value::Int(stat.net())),
            ]))
        }
        match rest {
            [] => Ok(Value::Map(
                self.files
                    .iter()
                    .map(|(p, s)| (p.clone(), stat_map(s)))
                    .collect(),
            )),
            [PathSeg::Key(p), tail @ ..] => {
                let stat = self
                    .files
                    .get(p)
                    .ok_or_else(|| EvalError::UnresolvedReference {
                        path: full_path.to_string(),
                    })?;
                match tail {
                    [] => Ok(stat_map(stat)),
                    [PathSeg::Key(metric)] => {
                        let v = match metric.as_str() {
                            "additions" => stat.additions,
                            "deletions" => stat.deletions,
                            "total" => stat.total(),
                            "net" => stat.net(),
                            _ => {
                                return Err(EvalError::UnresolvedReference {
                                    path: full_path.to_string(),
                                })
                            }
                        };
                        Ok(Value::Int(v))
                    }
                    _ => Err(EvalError::Type(format!(
                        "'{full_path}': file stats do not support further access"
                    ))),
                }
            }
            _ => Err(EvalError::Type(format!(
                "'{full_path}': files supports only key access"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Apply one pattern set with a strategy to one text. Returns the primary
/// match/groups of the first matching pattern when the strategy holds.
fn apply_patterns(
    patterns: &[Regex],
    strategy: Strategy,
    text: &str,
) -> Option<(Option<String>, Vec<String>)> {
    let mut first: Option<(String, Vec<String>)> = None;
    let mut matched_count = 0usize;
    for re in patterns {
        if let Some(caps) = re.captures(text) {
            matched_count += 1;
            if first.is_none() {
                let m = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                first = Some((m, groups));
            }
        }
    }
    let holds = match strategy {
        Strategy::Any => matched_count > 0,
        Strategy::All => matched_count == patterns.len(),
        Strategy::None => matched_count == 0,
    };
    if !holds {
        return None;
    }
    match first {
        Some((m, groups)) => Some((Some(m), groups)),
        None => Some((None, Vec::new())),
    }
}

impl SelectorConfig {
    /// Evaluate against one target's facts. Targets a selector does not
    /// apply to yield zero results, never an error.
    pub fn evaluate(&self, target: &Target, now: DateTime<Utc>) -> Vec<SelectorResult> {
        match self {
            SelectorConfig::Regex(sel) => sel.evaluate(target),
            SelectorConfig::Comments(sel) => sel.evaluate(target),
            SelectorConfig::Diff(sel) => sel.evaluate(target),
            SelectorConfig::Files(sel) => sel.evaluate(target),
            SelectorConfig::State(sel) => sel.evaluate(target),
            SelectorConfig::Activity(sel) => sel.evaluate(target, now),
            SelectorConfig::Flag(sel) => sel.evaluate(target),
        }
    }
}

impl RegexSelector {
    fn evaluate(&self, target: &Target) -> Vec<SelectorResult> {
        let item = match target.item() {
            Some(it) => it,
            None => return vec![],
        };
        let text: &str = match self.field {
            RegexField::Title => &item.title,
            RegexField::Description => &item.body,
            RegexField::Author => &item.author,
            // Optional facts: no value means the selector cannot apply, so
            // it yields nothing rather than matching the empty string.
            RegexField::AuthorRole => match item.author_role.as_deref() {
                Some(r) => r,
                None => return vec![],
            },
            RegexField::SourceBranch => match item.source_branch.as_deref() {
                Some(b) => b,
                None => return vec![],
            },
            RegexField::TargetBranch => match item.target_branch.as_deref() {
                Some(b) => b,
                None => return vec![],
            },
            RegexField::SourceRepo => match item.source_repo.as_deref() {
                Some(r) => r,
                None => return vec![],
            },
        };
        match apply_patterns(&self.patterns, self.strategy, text) {
            Some((matched_text, groups)) => vec![SelectorResult {
                matched: true,
                full: Some(text.to_string()),
                matched_text,
                groups,
                ..Default::default()
            }],
            None => vec![],
        }
    }
}

impl CommentsSelector {
    fn evaluate(&self, target: &Target) -> Vec<SelectorResult> {
        let item = match target.item() {
            Some(it) => it,
            None => return vec![],
        };
        let mut results = Vec::new();
        for comment in &item.comments {
            if self.maintainers_only && !comment.from_maintainer {
                continue;
            }
            if let Some((matched_text, groups)) =
                apply_patterns(&self.patterns, self.strategy, &comment.body)
            {
                results.push(SelectorResult {
                    matched: true,
                    full: Some(comment.body.clone()),
                    matched_text,
                    groups,
                    author: Some(comment.author.clone()),
                    created_at: Some(comment.created_at),
                    from_maintainer: Some(comment.from_maintainer),
                    ..Default::default()
                });
            }
        }
        results
    }
}

impl DiffSelector {
    fn evaluate(&self, target: &Target) -> Vec<SelectorResult> {
        let item = match target {
            // Repo targets have no diff; the selector matches vacuously so
            // repo-level definitions can still reference its bounds.
            Target::Repository(_) => {
                return vec![SelectorResult {
                    matched: true,
                    min: self.min,
                    max: self.max,
                    ..Default::default()
                }]
            }
            Target::Item(it) => it,
        };
        if !item.is_pr {
            return vec![];
        }

        let additions = item.additions();
        let deletions = item.deletions();
        let value = match self.metric {
            DiffMetric::Total => additions + deletions,
            DiffMetric::Net => additions - deletions,
            DiffMetric::Additions => additions,
            DiffMetric::Deletions => deletions,
        };
        if let Some(min) = self.min {
            if value < min {
                return vec![];
            }
        }
        if let Some(max) = self.max {
            if value >= max {
                return vec![];
            }
        }

        let files = item
            .files
            .iter()
            .map(|f| {
                (
                    f.path.clone(),
                    DiffStat {
                        additions: f.additions,
                        deletions: f.deletions,
                    },
                )
            })
            .collect();
        vec![SelectorResult {
            matched: true,
            min: self.min,
            max: self.max,
            total: Some(additions + deletions),
            additions: Some(additions),
            deletions: Some(deletions),
            net: Some(additions - deletions),
            files,
            ..Default::default()
        }]
    }
}

impl FilesSelector {
    fn evaluate(&self, target: &Target) -> Vec<SelectorResult> {
        let mut results = Vec::new();
        for path in target.file_paths() {
            if let Some(caps) = self.name_regex.captures(path) {
                let m = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                results.push(SelectorResult {
                    matched: true,
                    full: Some(path.to_string()),
                    matched_text: Some(m),
                    groups,
                    path: Some(path.to_string()),
                    ..Default::default()
                });
            }
        }
        results
    }
}

impl StateSelector {
    fn evaluate(&self, target: &Target) -> Vec<SelectorResult> {
        let item = match target.item() {
            Some(it) => it,
            None => return vec![],
        };
        if !self.allowed.is_empty() && !self.allowed.contains(&item.state) {
            return vec![];
        }
        vec![SelectorResult {
            matched: true,
            state: Some(item.state.as_str().to_string()),
            ..Default::default()
        }]
    }
}

impl ActivitySelector {
    fn evaluate(&self, target: &Target, now: DateTime<Utc>) -> Vec<SelectorResult> {
        let item = match target.item() {
            Some(it) => it,
            None => return vec![],
        };
        let since = match self.kind {
            ActivityKind::LastActivity => item.last_activity(),
            ActivityKind::LastComment => item.last_comment_at(),
        };
        let days = (now - since).num_days();
        if days < self.min_days {
            return vec![];
        }
        vec![SelectorResult {
            matched: true,
            days_since: Some(days),
            ..Default::default()
        }]
    }
}

impl FlagSelector {
    fn evaluate(&self, target: &Target) -> Vec<SelectorResult> {
        let item = match target.item() {
            Some(it) if it.is_pr => it,
            _ => return vec![],
        };
        let check = match self.kind {
            FlagKind::Merged => item.merged,
            FlagKind::Draft => item.draft,
            FlagKind::Approved => item.approved,
        };
        if let Some(desired) = self.desired {
            if desired != check {
                return vec![];
            }
        }
        vec![SelectorResult {
            matched: true,
            check: Some(check),
            ..Default::default()
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::target::{CommentFacts, FileDiff, ItemFacts, ItemState, RepoFacts};
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn pr() -> ItemFacts {
        ItemFacts {
            number: 7,
            title: "Fix login bug".into(),
            body: String::new(),
            author: "alice".into(),
            state: ItemState::Open,
            is_pr: true,
            merged: false,
            draft: false,
            approved: false,
            author_role: Some("write".into()),
            source_branch: Some("fix/login".into()),
            target_branch: Some("main".into()),
            source_repo: Some("widgets-fork".into()),
            comments: vec![
                CommentFacts {
                    author: "bob".into(),
                    body: "please rebase".into(),
                    created_at: ts(2),
                    from_maintainer: true,
                },
                CommentFacts {
                    author: "carol".into(),
                    body: "works for me".into(),
                    created_at: ts(3),
                    from_maintainer: false,
                },
                CommentFacts {
                    author: "dave".into(),
                    body: "please add tests".into(),
                    created_at: ts(4),
                    from_maintainer: false,
                },
            ],
            files: vec![
                FileDiff {
                    path: "src/auth.rs".into(),
                    additions: 100,
                    deletions: 20,
                },
                FileDiff {
                    path: "docs/auth.md".into(),
                    additions: 10,
                    deletions: 0,
                },
            ],
            labels: vec![],
            created_at: ts(1),
            updated_at: Some(ts(5)),
        }
    }

    fn load(name: &str, yaml: &str) -> SelectorConfig {
        let val: Yaml = serde_yaml::from_str(yaml).unwrap();
        SelectorConfig::from_value(name, &val, "test").unwrap()
    }

    #[test]
    fn test_regex_selector_title_groups() {
        let sel = load("title", "'(issue|bug|fix|problem|failure|error)'");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        // The pattern is lowercase, so the first hit is "bug", not "Fix".
        assert_eq!(res[0].matched_text.as_deref(), Some("bug"));
        assert_eq!(res[0].groups, vec!["bug".to_string()]);
    }

    #[test]
    fn test_null_regex_body_is_catch_all() {
        let sel = load("title", "null");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert!(res[0].matched);
        assert_eq!(res[0].full.as_deref(), Some("Fix login bug"));
    }

    #[test]
    fn test_author_role_selector() {
        let sel = load("author_role", "'^(admin|write)$'");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].matched_text.as_deref(), Some("write"));

        let mut unknown = pr();
        unknown.author_role = None;
        assert!(sel.evaluate(&Target::Item(unknown), ts(6)).is_empty());
    }

    #[test]
    fn test_source_repo_selector() {
        let sel = load("source_repo", "'-fork$'");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].full.as_deref(), Some("widgets-fork"));

        let mut same_repo = pr();
        same_repo.source_repo = None;
        assert!(sel.evaluate(&Target::Item(same_repo), ts(6)).is_empty());
    }

    #[test]
    fn test_regex_strategy_all_requires_every_pattern() {
        let both = load("title", "{regexes: ['Fix', 'bug'], strategy: all}");
        assert_eq!(both.evaluate(&Target::Item(pr()), ts(6)).len(), 1);
        let missing = load("title", "{regexes: ['Fix', 'typo'], strategy: all}");
        assert!(missing.evaluate(&Target::Item(pr()), ts(6)).is_empty());
    }

    #[test]
    fn test_regex_strategy_none() {
        let sel = load("title", "{regexes: ['typo'], strategy: none}");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].matched_text, None);
    }

    #[test]
    fn test_case_insensitive_flag() {
        let sel = load("title", "{regexes: ['fix'], case_insensitive: true}");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res[0].matched_text.as_deref(), Some("Fix"));
    }

    #[test]
    fn test_comments_selector_one_result_per_matching_comment() {
        let sel = load("comments", "'please'");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].author.as_deref(), Some("bob"));
        assert_eq!(res[1].author.as_deref(), Some("dave"));
    }

    #[test]
    fn test_maintainer_comments_filter() {
        let sel = load("maintainer_comments", "'please'");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].author.as_deref(), Some("bob"));
        assert_eq!(res[0].from_maintainer, Some(true));
    }

    #[test]
    fn test_diff_bounds_min_inclusive_max_exclusive() {
        // pr() totals: additions 110, deletions 20, total 130.
        let at_min = load("diff", "{min: 130}");
        assert_eq!(at_min.evaluate(&Target::Item(pr()), ts(6)).len(), 1);
        let at_max = load("diff", "{max: 130}");
        assert!(at_max.evaluate(&Target::Item(pr()), ts(6)).is_empty());
        let below_max = load("diff", "{max: 131}");
        assert_eq!(below_max.evaluate(&Target::Item(pr()), ts(6)).len(), 1);
        let open_max = load("diff", "{min: 10}");
        assert_eq!(open_max.evaluate(&Target::Item(pr()), ts(6)).len(), 1);
    }

    #[test]
    fn test_diff_metrics_and_file_breakdown() {
        let sel = load("diff", "{min: 90, metric: net}");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].net, Some(90));
        assert_eq!(res[0].total, Some(130));
        let stat = res[0].files.get("src/auth.rs").unwrap();
        assert_eq!(stat.total(), 120);
        assert_eq!(stat.net(), 80);
    }

    #[test]
    fn test_diff_on_issue_yields_nothing_and_repo_vacuous() {
        let sel = load("diff", "{min: 1}");
        let mut issue = pr();
        issue.is_pr = false;
        assert!(sel.evaluate(&Target::Item(issue), ts(6)).is_empty());
        let repo = Target::Repository(RepoFacts::default());
        let res = sel.evaluate(&repo, ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].total, None);
    }

    #[test]
    fn test_files_selector_one_result_per_path() {
        let sel = load("files", "{name_regex: '^src/(.*)\\.rs$'}");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].path.as_deref(), Some("src/auth.rs"));
        assert_eq!(res[0].groups, vec!["auth".to_string()]);

        let repo = Target::Repository(RepoFacts {
            full_name: "o/r".into(),
            tree: vec!["src/a.rs".into(), "src/b.rs".into(), "README.md".into()],
        });
        let res = sel.evaluate(&repo, ts(6));
        assert_eq!(res.len(), 2);
    }

    #[test]
    fn test_state_allow_list() {
        let open_only = load("state", "[open]");
        assert_eq!(open_only.evaluate(&Target::Item(pr()), ts(6)).len(), 1);
        let closed_only = load("state", "[closed]");
        assert!(closed_only.evaluate(&Target::Item(pr()), ts(6)).is_empty());
        let any = load("state", "null");
        let res = any.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res[0].state.as_deref(), Some("open"));
    }

    #[test]
    fn test_activity_selector_threshold() {
        // last_activity = updated_at = day 5.
        let stale = load("last_activity", "10");
        assert!(stale.evaluate(&Target::Item(pr()), ts(6)).is_empty());
        let res = load("last_activity", "10").evaluate(&Target::Item(pr()), ts(20));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].days_since, Some(15));
        // last_comment = day 4.
        let res = load("last_comment", "2").evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res[0].days_since, Some(2));
    }

    #[test]
    fn test_flag_selector_desired_value() {
        let want_merged = load("merged", "true");
        assert!(want_merged.evaluate(&Target::Item(pr()), ts(6)).is_empty());
        let want_unmerged = load("merged", "false");
        let res = want_unmerged.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res[0].check, Some(false));
        let mut issue = pr();
        issue.is_pr = false;
        assert!(want_unmerged.evaluate(&Target::Item(issue), ts(6)).is_empty());
    }

    #[test]
    fn test_approved_flag_selector() {
        let want_approved = load("approved", "true");
        assert!(want_approved.evaluate(&Target::Item(pr()), ts(6)).is_empty());
        let mut reviewed = pr();
        reviewed.approved = true;
        let res = want_approved.evaluate(&Target::Item(reviewed), ts(6));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].check, Some(true));

        // Bare form records the flag without pinning it.
        let any = load("approved", "null");
        let res = any.evaluate(&Target::Item(pr()), ts(6));
        assert_eq!(res[0].check, Some(false));
    }

    #[test]
    fn test_bad_regex_is_config_error() {
        let val: Yaml = serde_yaml::from_str("'('").unwrap();
        let err = SelectorConfig::from_value("title", &val, "bug.title").unwrap_err();
        assert!(matches!(err, ConfigError::RegexCompile { .. }));
    }

    #[test]
    fn test_unknown_selector_name() {
        let val = Yaml::Null;
        let err = SelectorConfig::from_value("bogus", &val, "x").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedDefinition { .. }));
    }

    #[test]
    fn test_lookup_typed_traversal() {
        let sel = load("diff", "{min: 10}");
        let res = sel.evaluate(&Target::Item(pr()), ts(6));
        let segs = [PathSeg::Key("files".into()), PathSeg::Key("src/auth.rs".into()), PathSeg::Key("net".into())];
        assert_eq!(
            res[0].lookup(&segs, "diff.files[...]").unwrap(),
            Value::Int(80)
        );
        let missing = [PathSeg::Key("days_since".into())];
        assert!(matches!(
            res[0].lookup(&missing, "diff.days_since"),
            Err(EvalError::UnresolvedReference { .. })
        ));
    }
}

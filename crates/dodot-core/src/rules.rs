//! Rule engine: map each pack file to at most one handler.
//!
//! Rules are (priority, glob, handler). Highest priority wins, ties broken
//! by declaration order. Directory rules (trailing `/`) match a directory as
//! a single unit and stop the walk from descending into it.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::{Error, ErrorCode, Result};
use crate::fsys::{FileType, Filesystem};
use crate::pack::{CONFIG_FILE, IGNORE_MARKER, Pack};

/// Filenames never considered for any handler.
const SKIP_BASENAMES: &[&str] = &[CONFIG_FILE, IGNORE_MARKER, ".DS_Store", ".git"];

/// One matching rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Higher wins.
    pub priority: i32,
    /// Glob over the pack-relative path; trailing `/` marks a directory rule.
    pub pattern: String,
    /// Handler the match is routed to.
    pub handler: String,
    /// Optional handler options (e.g. `timeout` for execute handlers).
    pub options: BTreeMap<String, String>,
}

impl Rule {
    /// Construct a rule without options.
    pub fn new(priority: i32, pattern: &str, handler: &str) -> Self {
        Self {
            priority,
            pattern: pattern.to_string(),
            handler: handler.to_string(),
            options: BTreeMap::new(),
        }
    }

    fn is_dir_rule(&self) -> bool {
        self.pattern.ends_with('/')
    }
}

/// The default rule set.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(100, "install.sh", "install"),
        Rule::new(90, "Brewfile", "homebrew"),
        Rule::new(80, "bin/", "path"),
        Rule::new(70, "*.sh", "shell"),
        Rule::new(0, "**", "symlink"),
    ]
}

/// A (pack, file) pair routed to one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Owning pack name.
    pub pack: String,
    /// Path relative to the pack root.
    pub relative: PathBuf,
    /// Absolute path of the matched entry.
    pub absolute: PathBuf,
    /// Handler name.
    pub handler: String,
    /// Priority of the winning rule.
    pub priority: i32,
    /// Declaration index of the winning rule.
    pub rule_order: usize,
    /// Whether the match is a whole directory (path handler).
    pub is_dir: bool,
    /// Options carried over from the winning rule.
    pub options: BTreeMap<String, String>,
    /// Content digest, filled before code-execution handlers run.
    pub digest: Option<String>,
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn compile(rule: &Rule) -> Result<Pattern> {
    let raw = rule.pattern.trim_end_matches('/');
    Pattern::new(raw).map_err(|err| {
        Error::new(
            ErrorCode::InvalidInput,
            format!("invalid rule pattern {:?}: {err}", rule.pattern),
        )
    })
}

struct CompiledRule<'a> {
    rule: &'a Rule,
    order: usize,
    pattern: Pattern,
}

fn compile_rules<'a>(rules: &'a [Rule], pack: &Pack) -> Result<Vec<CompiledRule<'a>>> {
    let mut compiled: Vec<CompiledRule<'a>> = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| !pack.config.disable.iter().any(|d| d == &rule.handler))
        .map(|(order, rule)| {
            Ok(CompiledRule {
                rule,
                order,
                pattern: compile(rule)?,
            })
        })
        .collect::<Result<_>>()?;
    compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority).then(a.order.cmp(&b.order)));
    Ok(compiled)
}

fn is_ignored(relative: &Path, ignore_patterns: &[Pattern]) -> bool {
    let basename = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if SKIP_BASENAMES.contains(&basename.as_str()) {
        return true;
    }
    ignore_patterns
        .iter()
        .any(|p| p.matches_path_with(relative, match_options()))
}

/// Match every file of a pack against the rule set.
///
/// Enumeration is breadth-first over lexically sorted entries, so the match
/// list is deterministic for a given tree and rule set. An ignored pack
/// yields no matches.
pub fn match_pack(fsys: &dyn Filesystem, pack: &Pack, rules: &[Rule]) -> Result<Vec<RuleMatch>> {
    if pack.ignored {
        return Ok(Vec::new());
    }

    let compiled = compile_rules(rules, pack)?;
    let ignore_patterns: Vec<Pattern> = pack
        .config
        .ignore
        .iter()
        .map(|raw| {
            Pattern::new(raw).map_err(|err| {
                Error::new(
                    ErrorCode::PackInvalid,
                    format!("{}: invalid ignore pattern {raw:?}: {err}", pack.name),
                )
            })
        })
        .collect::<Result<_>>()?;

    let mut matches = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(PathBuf::new());

    while let Some(rel_dir) = queue.pop_front() {
        let abs_dir = pack.dir.join(&rel_dir);
        for entry in fsys.read_dir(&abs_dir)? {
            let relative = rel_dir.join(&entry.name);
            if is_ignored(&relative, &ignore_patterns) {
                continue;
            }
            let absolute = pack.dir.join(&relative);
            let is_dir = entry.file_type == FileType::Dir;

            let winner = compiled.iter().find(|c| {
                c.rule.is_dir_rule() == is_dir
                    && c.pattern.matches_path_with(&relative, match_options())
            });

            if is_dir {
                if let Some(c) = winner {
                    matches.push(RuleMatch {
                        pack: pack.name.clone(),
                        relative,
                        absolute,
                        handler: c.rule.handler.clone(),
                        priority: c.rule.priority,
                        rule_order: c.order,
                        is_dir: true,
                        options: c.rule.options.clone(),
                        digest: None,
                    });
                } else {
                    queue.push_back(relative);
                }
            } else if let Some(c) = winner {
                matches.push(RuleMatch {
                    pack: pack.name.clone(),
                    relative,
                    absolute,
                    handler: c.rule.handler.clone(),
                    priority: c.rule.priority,
                    rule_order: c.order,
                    is_dir: false,
                    options: c.rule.options.clone(),
                    digest: None,
                });
            }
        }
    }

    Ok(matches)
}

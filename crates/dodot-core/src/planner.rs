//! Operation planner: handler outputs plus datastore state in, a
//! three-bucket plan out.
//!
//! Plans are built per pack. Filesystem setup runs first, then commands,
//! then the post-command sentinel writes; skipped operations are retained
//! so the result can show what was already in place.

use std::collections::HashMap;

use tracing::warn;

use crate::digest::sha256_hex;
use crate::error::{Error, ErrorCode, Result};
use crate::fsys::Filesystem;
use crate::handlers::{Handler, HandlerCategory, HandlerRegistry};
use crate::op::{OpIdentity, OpKind, OpStatus, Operation};
use crate::paths::Paths;
use crate::rules::RuleMatch;
use crate::store::Datastore;

/// Which handler categories a verb wants planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Configuration handlers only (`link`).
    Configuration,
    /// Code-execution handlers only (`provision`).
    CodeExecution,
    /// Both (`on`).
    All,
}

impl Selection {
    fn wants(self, category: HandlerCategory) -> bool {
        match self {
            Self::Configuration => category == HandlerCategory::Configuration,
            Self::CodeExecution => category == HandlerCategory::CodeExecution,
            Self::All => true,
        }
    }
}

/// Invocation flags the planner honors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFlags {
    /// Bypass sentinel gates and overwrite divergent user links.
    pub force: bool,
    /// Bypass sentinel gates only (the `on --provision-rerun` path).
    pub force_reprovision: bool,
}

impl PlanFlags {
    fn bypass_sentinels(self) -> bool {
        self.force || self.force_reprovision
    }
}

/// A handler that could not emit its operations.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Owning pack.
    pub pack: String,
    /// Handler name.
    pub handler: String,
    /// Why planning failed.
    pub error: Error,
}

/// The ordered, de-duplicated, three-bucket plan for one pack.
#[derive(Debug, Default)]
pub struct Plan {
    /// Filesystem setup, applied first.
    pub setup: Vec<Operation>,
    /// Child processes, applied after setup.
    pub commands: Vec<Operation>,
    /// Sentinel writes, applied only for groups whose command succeeded.
    pub post: Vec<Operation>,
    /// Operations whose end-state was already satisfied, kept for reporting.
    pub skipped: Vec<Operation>,
    /// Handlers that failed to emit; the rest of the plan is unaffected.
    pub failures: Vec<HandlerFailure>,
}

impl Plan {
    /// Whether nothing would be mutated.
    pub fn is_noop(&self) -> bool {
        self.setup.is_empty() && self.commands.is_empty() && self.post.is_empty()
    }

    /// Count of operations that would run.
    pub fn pending_ops(&self) -> usize {
        self.setup.len() + self.commands.len() + self.post.len()
    }
}

fn is_post_command_write(op: &Operation) -> bool {
    let OpKind::WriteFile { path, .. } = &op.kind else {
        return false;
    };
    let in_marker_dir = path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("sentinels" | "install" | "brewfile")
        )
    });
    let named_sentinel = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("sentinel"));
    in_marker_dir || named_sentinel
}

/// Fill `digest` on code-execution matches by reading the source content.
pub fn enrich_digests(
    fsys: &dyn Filesystem,
    registry: &HandlerRegistry,
    matches: &mut [RuleMatch],
) -> Result<()> {
    for matched in matches.iter_mut() {
        if matched.digest.is_some() {
            continue;
        }
        if registry.category(&matched.handler) == Some(HandlerCategory::CodeExecution) {
            let content = fsys.read_file(&matched.absolute)?;
            matched.digest = Some(sha256_hex(&content));
        }
    }
    Ok(())
}

/// Sentinel name a group would write, extracted from its sentinel op.
fn group_sentinel_name(ops: &[Operation]) -> Option<String> {
    ops.iter().rev().find_map(|op| match &op.kind {
        OpKind::WriteFile { path, .. } if is_post_command_write(op) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        _ => None,
    })
}

fn symlink_state(
    fsys: &dyn Filesystem,
    target: &std::path::Path,
    source: &std::path::Path,
) -> Result<SymlinkState> {
    match fsys.lstat(target)? {
        None => Ok(SymlinkState::Missing),
        Some(meta) if meta.is_symlink() => {
            if fsys.read_link(target)? == source {
                Ok(SymlinkState::Correct)
            } else {
                Ok(SymlinkState::WrongReferent)
            }
        }
        Some(_) => Ok(SymlinkState::NotASymlink),
    }
}

enum SymlinkState {
    Missing,
    Correct,
    WrongReferent,
    NotASymlink,
}

/// Decide how a configuration group lands: already satisfied, deployable,
/// or blocked by an existing entry.
fn prepare_config_group(
    fsys: &dyn Filesystem,
    flags: PlanFlags,
    ops: Vec<Operation>,
) -> Result<(Vec<Operation>, bool)> {
    let mut satisfied = true;
    let mut link_ops = 0usize;
    let mut prepared = Vec::with_capacity(ops.len());

    for op in ops {
        if let OpKind::CreateSymlink { source, target } = &op.kind {
            link_ops += 1;
            match symlink_state(fsys, target, source)? {
                SymlinkState::Correct => {}
                SymlinkState::Missing => satisfied = false,
                SymlinkState::WrongReferent | SymlinkState::NotASymlink => {
                    if !flags.force {
                        return Err(Error::new(
                            ErrorCode::SymlinkExists,
                            format!("refusing to overwrite {}", target.display()),
                        )
                        .with_detail("target", target.display())
                        .with_detail("pack", &op.pack));
                    }
                    satisfied = false;
                    prepared.push(
                        Operation::new(OpKind::DeleteFile {
                            path: target.clone(),
                        })
                        .describe(format!("replace existing {}", target.display()))
                        .attribute(&op.pack, &op.handler),
                    );
                }
            }
        }
        prepared.push(op);
    }

    Ok((prepared, satisfied && link_ops > 0))
}

/// Build the plan for one pack's matches.
///
/// # Errors
///
/// `SymlinkExists` when a user-visible target is occupied and `force` is
/// unset; `ActionConflict` when two planned writes to one target disagree.
/// Handler emit errors do not fail the plan; they are collected in
/// [`Plan::failures`].
pub fn plan_pack(
    fsys: &dyn Filesystem,
    paths: &Paths,
    registry: &HandlerRegistry,
    store: &Datastore<'_>,
    matches: &[RuleMatch],
    selection: Selection,
    flags: PlanFlags,
) -> Result<Plan> {
    let mut plan = Plan::default();
    let mut enriched: Vec<RuleMatch> = matches.to_vec();
    enrich_digests(fsys, registry, &mut enriched)?;

    let mut staged: Vec<Operation> = Vec::new();

    for matched in &enriched {
        let Some(handler) = registry.get(&matched.handler) else {
            plan.failures.push(HandlerFailure {
                pack: matched.pack.clone(),
                handler: matched.handler.clone(),
                error: Error::new(
                    ErrorCode::NotFound,
                    format!("no handler named {:?}", matched.handler),
                ),
            });
            continue;
        };
        if !selection.wants(handler.category()) {
            continue;
        }

        let ops = match handler.plan(matched, paths) {
            Ok(ops) => ops,
            Err(error) => {
                warn!(
                    pack = %matched.pack,
                    handler = %matched.handler,
                    %error,
                    "handler failed to emit operations"
                );
                plan.failures.push(HandlerFailure {
                    pack: matched.pack.clone(),
                    handler: matched.handler.clone(),
                    error,
                });
                continue;
            }
        };

        match handler.category() {
            HandlerCategory::CodeExecution => {
                let gated = !flags.bypass_sentinels()
                    && group_sentinel_name(&ops)
                        .is_some_and(|name| store.has_sentinel(&matched.pack, &matched.handler, &name));
                if gated {
                    // The whole group collapses to one skipped marker.
                    if let Some(mut marker) = ops
                        .into_iter()
                        .find(|op| matches!(op.kind, OpKind::Execute { .. }))
                    {
                        marker.status = OpStatus::Skipped;
                        plan.skipped.push(marker);
                    }
                } else {
                    staged.extend(ops);
                }
            }
            HandlerCategory::Configuration => {
                let (prepared, already_satisfied) = prepare_config_group(fsys, flags, ops)?;
                if already_satisfied {
                    plan.skipped.extend(prepared.into_iter().map(|mut op| {
                        op.status = OpStatus::Skipped;
                        op
                    }));
                } else {
                    staged.extend(prepared);
                }
            }
        }
    }

    // De-duplicate by identity; divergent writes to one location conflict.
    let mut seen: HashMap<(&'static str, std::path::PathBuf), OpIdentity> = HashMap::new();
    for op in staged {
        let identity = op.identity();
        let location = (identity.kind, identity.target.clone());
        match seen.get(&location) {
            Some(existing) if *existing == identity => continue,
            Some(_) => {
                return Err(Error::new(
                    ErrorCode::ActionConflict,
                    format!(
                        "conflicting {} operations for {}",
                        identity.kind,
                        identity.target.display()
                    ),
                )
                .with_detail("pack", &op.pack));
            }
            None => {
                seen.insert(location, identity);
            }
        }

        if matches!(op.kind, OpKind::Execute { .. }) {
            plan.commands.push(op);
        } else if is_post_command_write(&op) {
            plan.post.push(op);
        } else {
            plan.setup.push(op);
        }
    }

    Ok(plan)
}

/// Build the teardown plan for one pack: delete the links a configuration
/// handler would have created, user-visible hop first.
///
/// Links that are absent or do not point where the handler chain expects
/// are left untouched.
pub fn plan_teardown(
    fsys: &dyn Filesystem,
    paths: &Paths,
    registry: &HandlerRegistry,
    matches: &[RuleMatch],
) -> Result<Plan> {
    let mut plan = Plan::default();

    for matched in matches {
        let Some(handler) = registry.get(&matched.handler) else {
            continue;
        };
        if handler.category() != HandlerCategory::Configuration {
            continue;
        }
        let ops = match handler.plan(matched, paths) {
            Ok(ops) => ops,
            Err(error) => {
                plan.failures.push(HandlerFailure {
                    pack: matched.pack.clone(),
                    handler: matched.handler.clone(),
                    error,
                });
                continue;
            }
        };

        // Deployment emits the intermediate link before the user link, so
        // the reverse walk removes the user-visible hop first.
        for op in ops.iter().rev() {
            let OpKind::CreateSymlink { source, target } = &op.kind else {
                continue;
            };
            match symlink_state(fsys, target, source)? {
                SymlinkState::Correct => {
                    plan.setup.push(
                        Operation::new(OpKind::DeleteFile {
                            path: target.clone(),
                        })
                        .describe(format!("remove {}", target.display()))
                        .attribute(&matched.pack, &matched.handler),
                    );
                }
                SymlinkState::Missing => {}
                SymlinkState::WrongReferent | SymlinkState::NotASymlink => {
                    warn!(
                        "not removing {}: not the link this handler deployed",
                        target.display()
                    );
                }
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsys::MemoryFilesystem;
    use crate::handlers::{Handler, HandlerCategory};
    use crate::op::Operation;
    use crate::pack::{Pack, PackConfig};
    use crate::paths::Environment;
    use crate::rules::{self, default_rules};
    use std::path::{Path, PathBuf};

    fn setup() -> (MemoryFilesystem, Paths) {
        let fsys = MemoryFilesystem::new();
        for dir in ["/dots/tools", "/data", "/home/t/.config"] {
            fsys.mkdir_all(Path::new(dir), 0o755).unwrap();
        }
        let paths = Paths::resolve(Environment {
            home: Some("/home/t".into()),
            dotfiles_root: Some("/dots".into()),
            data_dir: Some("/data".into()),
            ..Environment::default()
        })
        .unwrap();
        (fsys, paths)
    }

    fn tools_pack() -> Pack {
        Pack {
            name: "tools".to_string(),
            dir: PathBuf::from("/dots/tools"),
            config: PackConfig::default(),
            ignored: false,
        }
    }

    fn matches_for(fsys: &MemoryFilesystem, pack: &Pack) -> Vec<crate::rules::RuleMatch> {
        rules::match_pack(fsys, pack, &default_rules()).unwrap()
    }

    #[test]
    fn ops_land_in_their_buckets() {
        let (fsys, paths) = setup();
        fsys.write_file(Path::new("/dots/tools/gitconfig"), b"x", 0o644)
            .unwrap();
        fsys.write_file(Path::new("/dots/tools/install.sh"), b"#!/bin/sh\n", 0o755)
            .unwrap();

        let registry = HandlerRegistry::with_defaults();
        let store = Datastore::new(&fsys, &paths);
        let plan = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches_for(&fsys, &tools_pack()),
            Selection::All,
            PlanFlags::default(),
        )
        .unwrap();

        assert!(plan.commands.iter().all(|op| matches!(op.kind, OpKind::Execute { .. })));
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.post.len(), 1);
        let OpKind::WriteFile { path, .. } = &plan.post[0].kind else {
            panic!("post bucket should hold the sentinel write");
        };
        assert!(path.to_string_lossy().contains("/sentinels/"));
        // Setup carries everything else.
        assert!(plan.setup.iter().all(|op| !matches!(op.kind, OpKind::Execute { .. })));
        assert!(!plan.setup.is_empty());
    }

    #[test]
    fn matching_sentinel_collapses_the_group_to_a_marker() {
        let (fsys, paths) = setup();
        let script = b"#!/bin/sh\n";
        fsys.write_file(Path::new("/dots/tools/install.sh"), script, 0o755)
            .unwrap();

        let registry = HandlerRegistry::with_defaults();
        let store = Datastore::new(&fsys, &paths);
        let digest = crate::digest::sha256_hex(script);
        store
            .write_sentinel("tools", "install", &format!("install.sh-{digest}"))
            .unwrap();

        let plan = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches_for(&fsys, &tools_pack()),
            Selection::CodeExecution,
            PlanFlags::default(),
        )
        .unwrap();

        assert!(plan.is_noop());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].status, OpStatus::Skipped);

        // force reopens the gate.
        let forced = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches_for(&fsys, &tools_pack()),
            Selection::CodeExecution,
            PlanFlags {
                force: true,
                force_reprovision: false,
            },
        )
        .unwrap();
        assert_eq!(forced.commands.len(), 1);
    }

    #[test]
    fn satisfied_config_groups_stay_in_the_plan_as_skipped() {
        let (fsys, paths) = setup();
        fsys.write_file(Path::new("/dots/tools/gitconfig"), b"x", 0o644)
            .unwrap();
        fsys.mkdir_all(Path::new("/data/packs/tools/symlink"), 0o755)
            .unwrap();
        fsys.symlink(
            Path::new("/dots/tools/gitconfig"),
            Path::new("/data/packs/tools/symlink/gitconfig"),
        )
        .unwrap();
        fsys.symlink(
            Path::new("/data/packs/tools/symlink/gitconfig"),
            Path::new("/home/t/.gitconfig"),
        )
        .unwrap();

        let registry = HandlerRegistry::with_defaults();
        let store = Datastore::new(&fsys, &paths);
        let plan = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches_for(&fsys, &tools_pack()),
            Selection::Configuration,
            PlanFlags::default(),
        )
        .unwrap();

        assert!(plan.is_noop());
        assert!(!plan.skipped.is_empty());
        assert!(plan.skipped.iter().all(|op| op.status == OpStatus::Skipped));
    }

    #[test]
    fn occupied_target_fails_without_force() {
        let (fsys, paths) = setup();
        fsys.write_file(Path::new("/dots/tools/gitconfig"), b"x", 0o644)
            .unwrap();
        fsys.write_file(Path::new("/home/t/.gitconfig"), b"mine", 0o644)
            .unwrap();

        let registry = HandlerRegistry::with_defaults();
        let store = Datastore::new(&fsys, &paths);
        let err = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches_for(&fsys, &tools_pack()),
            Selection::Configuration,
            PlanFlags::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SymlinkExists);
    }

    #[test]
    fn identical_ops_deduplicate() {
        let (fsys, paths) = setup();
        // Two files, both at pack root: their user-link parents and handler
        // dirs coincide, so the create-directory ops repeat.
        fsys.write_file(Path::new("/dots/tools/gitconfig"), b"x", 0o644)
            .unwrap();
        fsys.write_file(Path::new("/dots/tools/tigrc"), b"y", 0o644)
            .unwrap();

        let registry = HandlerRegistry::with_defaults();
        let store = Datastore::new(&fsys, &paths);
        let plan = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches_for(&fsys, &tools_pack()),
            Selection::Configuration,
            PlanFlags::default(),
        )
        .unwrap();

        let dir_ops: Vec<&Operation> = plan
            .setup
            .iter()
            .filter(|op| {
                matches!(&op.kind, OpKind::CreateDirectory { path, .. }
                    if path == Path::new("/data/packs/tools/symlink"))
            })
            .collect();
        assert_eq!(dir_ops.len(), 1);
    }

    struct ConflictingHandler;

    impl Handler for ConflictingHandler {
        fn name(&self) -> &'static str {
            "conflicting"
        }

        fn category(&self) -> HandlerCategory {
            HandlerCategory::Configuration
        }

        fn plan(
            &self,
            matched: &crate::rules::RuleMatch,
            _paths: &Paths,
        ) -> crate::error::Result<Vec<Operation>> {
            Ok(vec![
                Operation::new(OpKind::WriteFile {
                    path: "/data/generated".into(),
                    content: matched.relative.to_string_lossy().into_owned().into_bytes(),
                    mode: 0o644,
                })
                .attribute(&matched.pack, self.name()),
            ])
        }
    }

    #[test]
    fn divergent_writes_to_one_target_conflict() {
        let (fsys, paths) = setup();
        fsys.write_file(Path::new("/dots/tools/one"), b"1", 0o644)
            .unwrap();
        fsys.write_file(Path::new("/dots/tools/two"), b"2", 0o644)
            .unwrap();

        let mut registry = HandlerRegistry::with_defaults();
        registry.register(Box::new(ConflictingHandler));
        let store = Datastore::new(&fsys, &paths);

        let mut matches = matches_for(&fsys, &tools_pack());
        for matched in &mut matches {
            matched.handler = "conflicting".to_string();
        }

        let err = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches,
            Selection::Configuration,
            PlanFlags::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ActionConflict);
    }

    #[test]
    fn unknown_handlers_fail_softly() {
        let (fsys, paths) = setup();
        fsys.write_file(Path::new("/dots/tools/gitconfig"), b"x", 0o644)
            .unwrap();

        let registry = HandlerRegistry::with_defaults();
        let store = Datastore::new(&fsys, &paths);
        let mut matches = matches_for(&fsys, &tools_pack());
        matches[0].handler = "no-such-handler".to_string();

        let plan = plan_pack(
            &fsys,
            &paths,
            &registry,
            &store,
            &matches,
            Selection::Configuration,
            PlanFlags::default(),
        )
        .unwrap();
        assert_eq!(plan.failures.len(), 1);
        assert!(plan.is_noop());
    }
}

//! The symlink handler: two-hop deployment of plain config files.
//!
//! Every user-visible link points at an intermediate link inside the
//! datastore, never at the source directly, so `readlink` on any deployed
//! file reveals which pack and handler produced it.

use crate::error::Result;
use crate::handlers::{Handler, HandlerCategory, basename};
use crate::op::{OpKind, Operation};
use crate::paths::Paths;
use crate::rules::RuleMatch;

/// Deploys a pack file into the home/XDG tree via the datastore.
#[derive(Debug, Clone, Copy)]
pub struct Symlink;

impl Handler for Symlink {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn category(&self) -> HandlerCategory {
        HandlerCategory::Configuration
    }

    fn plan(&self, matched: &RuleMatch, paths: &Paths) -> Result<Vec<Operation>> {
        let name = basename(matched)?;
        let intermediate = paths
            .pack_handler_dir(&matched.pack, self.name())
            .join(&name);
        let user = paths.user_target(&matched.relative);

        let mut ops = Vec::with_capacity(4);
        ops.push(Operation::new(OpKind::CreateDirectory {
            path: paths.pack_handler_dir(&matched.pack, self.name()),
            mode: 0o755,
        }));
        ops.push(
            Operation::new(OpKind::CreateSymlink {
                source: matched.absolute.clone(),
                target: intermediate.clone(),
            })
            .describe(format!("intermediate link for {}", matched.relative.display())),
        );
        if let Some(parent) = user.parent() {
            ops.push(Operation::new(OpKind::CreateDirectory {
                path: parent.to_path_buf(),
                mode: 0o755,
            }));
        }
        ops.push(
            Operation::new(OpKind::CreateSymlink {
                source: intermediate,
                target: user.clone(),
            })
            .describe(format!("link {}", user.display())),
        );

        Ok(ops
            .into_iter()
            .map(|op| op.attribute(&matched.pack, self.name()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Environment;
    use std::path::{Path, PathBuf};

    fn paths() -> Paths {
        Paths::resolve(Environment {
            home: Some("/home/t".into()),
            dotfiles_root: Some("/dots".into()),
            data_dir: Some("/data".into()),
            ..Environment::default()
        })
        .unwrap()
    }

    fn matched(relative: &str) -> RuleMatch {
        RuleMatch {
            pack: "git".to_string(),
            relative: PathBuf::from(relative),
            absolute: Path::new("/dots/git").join(relative),
            handler: "symlink".to_string(),
            priority: 0,
            rule_order: 4,
            is_dir: false,
            options: Default::default(),
            digest: None,
        }
    }

    #[test]
    fn top_level_file_gets_two_hop_chain_with_dot_restored() {
        let ops = Symlink.plan(&matched("gitconfig"), &paths()).unwrap();
        assert_eq!(ops.len(), 4);

        let OpKind::CreateSymlink { source, target } = &ops[1].kind else {
            panic!("expected intermediate symlink, got {:?}", ops[1].kind);
        };
        assert_eq!(source, Path::new("/dots/git/gitconfig"));
        assert_eq!(target, Path::new("/data/packs/git/symlink/gitconfig"));

        let OpKind::CreateSymlink { source, target } = &ops[3].kind else {
            panic!("expected user symlink, got {:?}", ops[3].kind);
        };
        assert_eq!(source, Path::new("/data/packs/git/symlink/gitconfig"));
        assert_eq!(target, Path::new("/home/t/.gitconfig"));
        assert!(ops.iter().all(|op| op.pack == "git" && op.handler == "symlink"));
    }

    #[test]
    fn nested_file_lands_under_config_home() {
        let ops = Symlink
            .plan(&matched("starship/starship.toml"), &paths())
            .unwrap();
        let OpKind::CreateSymlink { target, .. } = &ops[3].kind else {
            panic!("expected user symlink");
        };
        assert_eq!(target, Path::new("/home/t/.config/starship/starship.toml"));
    }
}

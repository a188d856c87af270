//! The shell handler: pack scripts sourced at shell startup.
//!
//! Same two-hop shape as the symlink handler, but the user-visible link
//! lives under `<data>/shell/profile.d/`, which the installed init script
//! sources on every new shell.

use crate::error::Result;
use crate::handlers::{Handler, HandlerCategory, basename};
use crate::op::{OpKind, Operation};
use crate::paths::Paths;
use crate::rules::RuleMatch;

/// Deploys `*.sh` pack files into the sourced profile directory.
#[derive(Debug, Clone, Copy)]
pub struct Shell;

impl Handler for Shell {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn category(&self) -> HandlerCategory {
        HandlerCategory::Configuration
    }

    fn plan(&self, matched: &RuleMatch, paths: &Paths) -> Result<Vec<Operation>> {
        let name = basename(matched)?;
        let intermediate = paths
            .pack_handler_dir(&matched.pack, self.name())
            .join(&name);
        let profile_link = paths.shell_profile_dir().join(&name);

        let ops = vec![
            Operation::new(OpKind::CreateDirectory {
                path: paths.pack_handler_dir(&matched.pack, self.name()),
                mode: 0o755,
            }),
            Operation::new(OpKind::CreateSymlink {
                source: matched.absolute.clone(),
                target: intermediate.clone(),
            })
            .describe(format!("intermediate link for {}", matched.relative.display())),
            Operation::new(OpKind::CreateDirectory {
                path: paths.shell_profile_dir(),
                mode: 0o755,
            }),
            Operation::new(OpKind::CreateSymlink {
                source: intermediate,
                target: profile_link.clone(),
            })
            .describe(format!("source {} at shell startup", name)),
        ];

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

    #[test]
    fn profile_link_chains_through_the_datastore() {
        let paths = Paths::resolve(Environment {
            home: Some("/home/t".into()),
            data_dir: Some("/data".into()),
            ..Environment::default()
        })
        .unwrap();
        let matched = RuleMatch {
            pack: "zsh".to_string(),
            relative: PathBuf::from("aliases.sh"),
            absolute: PathBuf::from("/home/t/dotfiles/zsh/aliases.sh"),
            handler: "shell".to_string(),
            priority: 70,
            rule_order: 3,
            is_dir: false,
            options: Default::default(),
            digest: None,
        };

        let ops = Shell.plan(&matched, &paths).unwrap();
        let OpKind::CreateSymlink { source, target } = &ops[3].kind else {
            panic!("expected profile symlink");
        };
        assert_eq!(source, Path::new("/data/packs/zsh/shell/aliases.sh"));
        assert_eq!(target, Path::new("/data/shell/profile.d/aliases.sh"));
    }
}

//! The install handler: run a pack's `install.sh` once per content.
//!
//! The script is copied into the datastore and executed from there; the
//! sentinel is written only after the execute operation succeeds, so a
//! failed run leaves the handler eligible for a retry.

use crate::digest::install_sentinel_name;
use crate::error::Result;
use crate::handlers::{Handler, HandlerCategory, basename, require_digest, timeout_option};
use crate::op::{OpKind, Operation};
use crate::paths::Paths;
use crate::rules::RuleMatch;

/// Environment variable naming the pack an install script runs for.
pub const ENV_PACK: &str = "DODOT_PACK";
/// Environment variable with the absolute pack directory.
pub const ENV_PACK_DIR: &str = "DODOT_PACK_DIR";

/// Runs provisioning scripts, gated by a content-digest sentinel.
#[derive(Debug, Clone, Copy)]
pub struct Install;

impl Handler for Install {
    fn name(&self) -> &'static str {
        "install"
    }

    fn category(&self) -> HandlerCategory {
        HandlerCategory::CodeExecution
    }

    fn plan(&self, matched: &RuleMatch, paths: &Paths) -> Result<Vec<Operation>> {
        let name = basename(matched)?;
        let digest = require_digest(matched)?;
        let timeout_secs = timeout_option(&matched.options)?;

        let handler_dir = paths.pack_handler_dir(&matched.pack, self.name());
        let script_copy = handler_dir.join(&name);
        let sentinel = paths
            .sentinel_dir(&matched.pack, self.name())
            .join(install_sentinel_name(&name, digest));

        let ops = vec![
            Operation::new(OpKind::CreateDirectory {
                path: handler_dir.clone(),
                mode: 0o755,
            }),
            Operation::new(OpKind::CreateDirectory {
                path: paths.sentinel_dir(&matched.pack, self.name()),
                mode: 0o755,
            }),
            Operation::new(OpKind::CopyFile {
                source: matched.absolute.clone(),
                target: script_copy.clone(),
            })
            .describe(format!("stage {} in the datastore", name)),
            Operation::new(OpKind::Execute {
                command: script_copy.to_string_lossy().into_owned(),
                args: vec![],
                working_dir: Some(handler_dir),
                env: vec![
                    (ENV_PACK.to_string(), matched.pack.clone()),
                    (
                        ENV_PACK_DIR.to_string(),
                        paths.pack_dir(&matched.pack).to_string_lossy().into_owned(),
                    ),
                ],
                timeout_secs,
            })
            .describe(format!("run {} for pack {}", name, matched.pack)),
            Operation::new(OpKind::WriteFile {
                path: sentinel,
                content: Vec::new(),
                mode: 0o644,
            })
            .describe(format!("mark {} as provisioned", name)),
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
    use crate::digest::sha256_hex;
    use crate::paths::Environment;
    use std::path::{Path, PathBuf};

    fn matched_with_digest() -> (RuleMatch, String) {
        let digest = sha256_hex(b"#!/bin/sh\necho hi\n");
        let matched = RuleMatch {
            pack: "tools".to_string(),
            relative: PathBuf::from("install.sh"),
            absolute: PathBuf::from("/home/t/dotfiles/tools/install.sh"),
            handler: "install".to_string(),
            priority: 100,
            rule_order: 0,
            is_dir: false,
            options: Default::default(),
            digest: Some(digest.clone()),
        };
        (matched, digest)
    }

    fn paths() -> Paths {
        Paths::resolve(Environment {
            home: Some("/home/t".into()),
            data_dir: Some("/data".into()),
            ..Environment::default()
        })
        .unwrap()
    }

    #[test]
    fn copies_executes_then_marks() {
        let (matched, digest) = matched_with_digest();
        let ops = Install.plan(&matched, &paths()).unwrap();
        assert_eq!(ops.len(), 5);

        let OpKind::Execute {
            command,
            working_dir,
            env,
            ..
        } = &ops[3].kind
        else {
            panic!("expected execute op");
        };
        assert_eq!(command, "/data/packs/tools/install/install.sh");
        assert_eq!(
            working_dir.as_deref(),
            Some(Path::new("/data/packs/tools/install"))
        );
        assert!(env.contains(&("DODOT_PACK".to_string(), "tools".to_string())));
        assert!(env.contains(&(
            "DODOT_PACK_DIR".to_string(),
            "/home/t/dotfiles/tools".to_string()
        )));

        let OpKind::WriteFile { path, .. } = &ops[4].kind else {
            panic!("expected sentinel write");
        };
        assert_eq!(
            path,
            &Path::new("/data/packs/tools/install/sentinels")
                .join(format!("install.sh-{digest}"))
        );
    }

    #[test]
    fn missing_digest_is_an_internal_error() {
        let (mut matched, _) = matched_with_digest();
        matched.digest = None;
        assert!(Install.plan(&matched, &paths()).is_err());
    }

    #[test]
    fn timeout_option_overrides_the_default() {
        let (mut matched, _) = matched_with_digest();
        matched
            .options
            .insert("timeout".to_string(), "30".to_string());
        let ops = Install.plan(&matched, &paths()).unwrap();
        let OpKind::Execute { timeout_secs, .. } = &ops[3].kind else {
            panic!("expected execute op");
        };
        assert_eq!(*timeout_secs, Some(30));
    }
}

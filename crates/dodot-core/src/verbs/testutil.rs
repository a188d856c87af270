//! Shared fixtures for verb tests.

use std::path::Path;

use crate::exec::RecordingRunner;
use crate::fsys::{Filesystem, MemoryFilesystem};
use crate::paths::{Environment, Paths};
use crate::verbs::Context;

pub(crate) struct Harness {
    pub fsys: MemoryFilesystem,
    pub paths: Paths,
    pub runner: RecordingRunner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runner(RecordingRunner::new())
    }

    pub fn with_runner(runner: RecordingRunner) -> Self {
        let fsys = MemoryFilesystem::new();
        for dir in ["/dots", "/data", "/home/t/.config"] {
            fsys.mkdir_all(Path::new(dir), 0o755).unwrap();
        }
        let paths = Paths::resolve(Environment {
            home: Some("/home/t".into()),
            dotfiles_root: Some("/dots".into()),
            data_dir: Some("/data".into()),
            ..Environment::default()
        })
        .unwrap();
        Self {
            fsys,
            paths,
            runner,
        }
    }

    pub fn ctx(&self) -> Context<'_> {
        Context::new(&self.fsys, self.paths.clone(), &self.runner)
    }

    pub fn add_pack_file(&self, pack: &str, relative: &str, content: &[u8]) {
        let path = Path::new("/dots").join(pack).join(relative);
        if let Some(parent) = path.parent() {
            self.fsys.mkdir_all(parent, 0o755).unwrap();
        }
        self.fsys.write_file(&path, content, 0o755).unwrap();
    }

    pub fn add_pack_dir(&self, pack: &str, relative: &str) {
        self.fsys
            .mkdir_all(&Path::new("/dots").join(pack).join(relative), 0o755)
            .unwrap();
    }
}

//! Well-known directory resolution.
//!
//! [`Paths`] is a pure function of the captured environment: resolve it once
//! at invocation entry and pass it down. Nothing here touches the filesystem.

use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorCode, Result};

/// Environment variable overriding the dotfiles root.
pub const ENV_DOTFILES_ROOT: &str = "DOTFILES_ROOT";
/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "DODOT_DATA_DIR";
/// Development-time override for bundled shell integration scripts.
pub const ENV_PROJECT_ROOT: &str = "PROJECT_ROOT";

/// Snapshot of the environment variables [`Paths`] derives from.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// `$HOME`.
    pub home: Option<PathBuf>,
    /// `$DOTFILES_ROOT`.
    pub dotfiles_root: Option<PathBuf>,
    /// `$DODOT_DATA_DIR`.
    pub data_dir: Option<PathBuf>,
    /// `$XDG_CONFIG_HOME`.
    pub config_home: Option<PathBuf>,
    /// `$XDG_STATE_HOME`.
    pub state_home: Option<PathBuf>,
    /// `$PROJECT_ROOT`.
    pub project_root: Option<PathBuf>,
}

impl Environment {
    /// Capture the relevant variables from the process environment.
    pub fn capture() -> Self {
        let var = |name: &str| std::env::var_os(name).map(PathBuf::from);
        Self {
            home: var("HOME").or_else(dirs::home_dir),
            dotfiles_root: var(ENV_DOTFILES_ROOT),
            data_dir: var(ENV_DATA_DIR),
            config_home: var("XDG_CONFIG_HOME"),
            state_home: var("XDG_STATE_HOME"),
            project_root: var(ENV_PROJECT_ROOT),
        }
    }
}

/// Resolved well-known directories.
#[derive(Debug, Clone)]
pub struct Paths {
    home: PathBuf,
    dotfiles_root: PathBuf,
    data_dir: PathBuf,
    config_home: PathBuf,
    state_home: PathBuf,
    project_root: Option<PathBuf>,
}

impl Paths {
    /// Resolve all directories from an environment snapshot.
    ///
    /// # Errors
    ///
    /// `PathUnresolvable` when no home directory can be determined and no
    /// override supplies one.
    pub fn resolve(env: Environment) -> Result<Self> {
        let home = env.home.ok_or_else(|| {
            Error::new(
                ErrorCode::PathUnresolvable,
                "could not determine home directory; set HOME",
            )
        })?;

        let dotfiles_root = env
            .dotfiles_root
            .unwrap_or_else(|| home.join("dotfiles"));
        let data_dir = env
            .data_dir
            .unwrap_or_else(|| home.join(".local").join("share").join("dodot"));
        let config_home = env.config_home.unwrap_or_else(|| home.join(".config"));
        let state_home = env
            .state_home
            .unwrap_or_else(|| home.join(".local").join("state"));

        Ok(Self {
            home,
            dotfiles_root,
            data_dir,
            config_home,
            state_home,
            project_root: env.project_root,
        })
    }

    /// Resolve from the live process environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(Environment::capture())
    }

    /// The user's home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// The dotfiles root holding the packs.
    pub fn dotfiles_root(&self) -> &Path {
        &self.dotfiles_root
    }

    /// The data directory owned by the datastore.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The XDG config home (`~/.config` by default).
    pub fn config_home(&self) -> &Path {
        &self.config_home
    }

    /// Development override for bundled shell scripts, when set.
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Directory of a pack under the dotfiles root.
    pub fn pack_dir(&self, pack: &str) -> PathBuf {
        self.dotfiles_root.join(pack)
    }

    /// Handler-owned state directory: `<data>/packs/<pack>/<handler>`.
    pub fn pack_handler_dir(&self, pack: &str, handler: &str) -> PathBuf {
        self.data_dir.join("packs").join(pack).join(handler)
    }

    /// Run-once marker directory: `<data>/packs/<pack>/<handler>/sentinels`.
    pub fn sentinel_dir(&self, pack: &str, handler: &str) -> PathBuf {
        self.pack_handler_dir(pack, handler).join("sentinels")
    }

    /// Shell integration directory: `<data>/shell`.
    pub fn shell_dir(&self) -> PathBuf {
        self.data_dir.join("shell")
    }

    /// Directory of per-pack shell snippets sourced by the init script.
    pub fn shell_profile_dir(&self) -> PathBuf {
        self.shell_dir().join("profile.d")
    }

    /// Serialized pack state captured on "off": `<data>/off-state`.
    pub fn off_state_dir(&self) -> PathBuf {
        self.data_dir.join("off-state")
    }

    /// Log file path: `$XDG_STATE_HOME/dodot/dodot.log`.
    pub fn log_file(&self) -> PathBuf {
        self.state_home.join("dodot").join("dodot.log")
    }

    /// Map a pack-relative file to its user-visible deployment target.
    ///
    /// Files at the pack root deploy into the home directory with the
    /// leading dot restored (`gitconfig` becomes `~/.gitconfig`). Files in
    /// subdirectories keep their structure under the XDG config home.
    pub fn user_target(&self, relative: &Path) -> PathBuf {
        if relative.components().count() == 1 {
            let name = relative.to_string_lossy();
            if let Some(stripped) = name.strip_prefix('.') {
                self.home.join(format!(".{stripped}"))
            } else {
                self.home.join(format!(".{name}"))
            }
        } else {
            self.config_home.join(relative)
        }
    }

    /// Inverse of [`Paths::user_target`], used by adopt.
    ///
    /// Returns the pack-relative destination for a user-owned path, or
    /// `None` when the path lives outside the mappable locations.
    pub fn pack_relative_for(&self, user_path: &Path) -> Option<PathBuf> {
        if let Ok(rest) = user_path.strip_prefix(&self.config_home) {
            if rest.components().count() >= 1 {
                return Some(rest.to_path_buf());
            }
        }
        if let Ok(rest) = user_path.strip_prefix(&self.home) {
            if rest.components().count() == 1 {
                let name = rest.to_string_lossy();
                let stripped = name.strip_prefix('.').unwrap_or(&name);
                return Some(PathBuf::from(stripped));
            }
        }
        None
    }
}

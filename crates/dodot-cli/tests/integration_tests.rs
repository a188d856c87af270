use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test context that sets up a temporary home, dotfiles root, and data dir
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
    dotfiles: PathBuf,
    data: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join("home");
        let dotfiles = temp_dir.path().join("dotfiles");
        let data = temp_dir.path().join("data");
        for dir in [&home, &dotfiles, &data] {
            fs::create_dir_all(dir).expect("failed to create sandbox dir");
        }
        Self {
            temp_dir,
            home,
            dotfiles,
            data,
        }
    }

    fn dodot_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_dodot");
        let mut cmd = Command::new(bin_path);
        cmd.env("HOME", &self.home);
        cmd.env("DOTFILES_ROOT", &self.dotfiles);
        cmd.env("DODOT_DATA_DIR", &self.data);
        cmd.env("XDG_CONFIG_HOME", self.home.join(".config"));
        cmd.env("XDG_STATE_HOME", self.temp_dir.path().join("state"));
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.dodot_cmd()
            .args(args)
            .output()
            .expect("failed to run dodot")
    }

    fn add_pack_file(&self, pack: &str, name: &str, content: &str, executable: bool) {
        let dir = self.dotfiles.join(pack);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        if executable {
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
}

/// Recursive directory image: (relative path, kind, content/referent).
fn snapshot(root: &Path) -> Vec<(String, String, Vec<u8>)> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, String, Vec<u8>)>) {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .map(|it| it.filter_map(Result::ok).collect())
            .unwrap_or_default();
        entries.sort_by_key(std::fs::DirEntry::file_name);
        for entry in entries {
            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
            let meta = fs::symlink_metadata(&path).unwrap();
            if meta.file_type().is_symlink() {
                let referent = fs::read_link(&path).unwrap();
                out.push((
                    rel,
                    "symlink".to_string(),
                    referent.to_string_lossy().into_owned().into_bytes(),
                ));
            } else if meta.is_dir() {
                out.push((rel, "dir".to_string(), Vec::new()));
                walk(root, &path, out);
            } else {
                out.push((rel, "file".to_string(), fs::read(&path).unwrap()));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--version"]);
    assert!(output.status.success());
}

#[test]
fn test_completion_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["completion", "bash"]);
    assert!(output.status.success());
    assert!(!output.stdout.is_empty());
}

#[test]
fn test_init_creates_a_pack_skeleton() {
    let ctx = TestContext::new();
    let output = ctx.run(&["init", "newpack"]);
    assert!(output.status.success(), "{output:?}");

    let pack = ctx.dotfiles.join("newpack");
    for name in [".dodot.toml", "README.md", "aliases.sh", "install.sh", "Brewfile"] {
        assert!(pack.join(name).exists(), "missing {name}");
    }
    assert!(pack.join("bin").is_dir());

    // Re-running init on an existing pack fails.
    let again = ctx.run(&["init", "newpack"]);
    assert!(!again.status.success());
    let stderr = String::from_utf8_lossy(&again.stderr);
    assert!(stderr.contains("[AlreadyExists]"), "stderr: {stderr}");
}

#[test]
fn test_link_creates_the_two_hop_chain() {
    let ctx = TestContext::new();
    ctx.add_pack_file("git", "gitconfig", "[user] name=T", false);

    let output = ctx.run(&["link", "git"]);
    assert!(output.status.success(), "{output:?}");

    let user_link = ctx.home.join(".gitconfig");
    let intermediate = ctx.data.join("packs/git/symlink/gitconfig");
    assert!(fs::symlink_metadata(&user_link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&user_link).unwrap(), intermediate);
    assert_eq!(
        fs::read_link(&intermediate).unwrap(),
        ctx.dotfiles.join("git/gitconfig")
    );
    assert_eq!(fs::read_to_string(&user_link).unwrap(), "[user] name=T");
}

#[test]
fn test_link_conflict_exits_nonzero_without_force() {
    let ctx = TestContext::new();
    ctx.add_pack_file("git", "gitconfig", "[user] from-pack", false);
    fs::write(ctx.home.join(".gitconfig"), "mine").unwrap();

    let output = ctx.run(&["link", "git"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[SymlinkExists]"), "stderr: {stderr}");
    // Nothing changed.
    assert_eq!(fs::read_to_string(ctx.home.join(".gitconfig")).unwrap(), "mine");
    assert!(!ctx.data.join("packs/git/symlink/gitconfig").exists());

    let forced = ctx.run(&["link", "git", "--force"]);
    assert!(forced.status.success());
    assert_eq!(
        fs::read_to_string(ctx.home.join(".gitconfig")).unwrap(),
        "[user] from-pack"
    );
}

#[test]
fn test_adopt_a_top_level_dotfile() {
    let ctx = TestContext::new();
    fs::create_dir_all(ctx.dotfiles.join("git")).unwrap();
    fs::write(ctx.home.join(".gitconfig"), "[user] name=T").unwrap();

    let output = ctx.run(&["adopt", "git", ctx.home.join(".gitconfig").to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");

    assert_eq!(
        fs::read_to_string(ctx.dotfiles.join("git/gitconfig")).unwrap(),
        "[user] name=T"
    );
    let user_link = ctx.home.join(".gitconfig");
    assert!(fs::symlink_metadata(&user_link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&user_link).unwrap(), "[user] name=T");
}

#[test]
fn test_adopt_preserves_xdg_structure() {
    let ctx = TestContext::new();
    fs::create_dir_all(ctx.dotfiles.join("starship")).unwrap();
    let config = ctx.home.join(".config/starship/starship.toml");
    fs::create_dir_all(config.parent().unwrap()).unwrap();
    fs::write(&config, "format = \"$all\"").unwrap();

    let output = ctx.run(&["adopt", "starship", config.to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        fs::read_to_string(ctx.dotfiles.join("starship/starship/starship.toml")).unwrap(),
        "format = \"$all\""
    );
}

#[test]
fn test_provision_is_gated_by_the_sentinel() {
    let ctx = TestContext::new();
    let marker = ctx.temp_dir.path().join("runs.log");
    let script = format!("#!/bin/sh\necho run >> {}\n", marker.display());
    ctx.add_pack_file("tools", "install.sh", &script, true);

    // First run executes.
    assert!(ctx.run(&["provision", "tools"]).status.success());
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 1);

    let sentinel_dir = ctx.data.join("packs/tools/install/sentinels");
    let sentinels: Vec<String> = fs::read_dir(&sentinel_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(sentinels.len(), 1);
    assert!(sentinels[0].starts_with("install.sh-"));

    // Second run is gated.
    assert!(ctx.run(&["provision", "tools"]).status.success());
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 1);

    // Changed content re-runs and adds a second sentinel.
    let script2 = format!("#!/bin/sh\n# v2\necho run >> {}\n", marker.display());
    ctx.add_pack_file("tools", "install.sh", &script2, true);
    assert!(ctx.run(&["provision", "tools"]).status.success());
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 2);
    assert_eq!(fs::read_dir(&sentinel_dir).unwrap().count(), 2);

    // Force bypasses the gate.
    assert!(ctx.run(&["provision", "tools", "--force"]).status.success());
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 3);
}

#[test]
fn test_off_then_on_does_not_reprovision() {
    let ctx = TestContext::new();
    let marker = ctx.temp_dir.path().join("runs.log");
    let script = format!("#!/bin/sh\necho run >> {}\n", marker.display());
    ctx.add_pack_file("tools", "install.sh", &script, true);
    ctx.add_pack_file("tools", "toolrc", "setting=1", false);

    assert!(ctx.run(&["on", "tools"]).status.success());
    assert!(ctx.home.join(".toolrc").exists());
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 1);

    assert!(ctx.run(&["off", "tools"]).status.success());
    assert!(!ctx.home.join(".toolrc").exists());
    assert!(ctx.data.join("off-state/tools.json").exists());
    // Sentinels survive off.
    assert_eq!(
        fs::read_dir(ctx.data.join("packs/tools/install/sentinels")).unwrap().count(),
        1
    );

    assert!(ctx.run(&["on", "tools"]).status.success());
    assert!(ctx.home.join(".toolrc").exists());
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 1);
    assert!(!ctx.data.join("off-state/tools.json").exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let ctx = TestContext::new();
    ctx.add_pack_file("git", "gitconfig", "[user]", false);
    ctx.add_pack_file("tools", "install.sh", "#!/bin/sh\n", true);

    let dotfiles_before = snapshot(&ctx.dotfiles);
    let data_before = snapshot(&ctx.data);
    let home_before = snapshot(&ctx.home);

    assert!(ctx.run(&["on", "--dry-run"]).status.success());

    assert_eq!(dotfiles_before, snapshot(&ctx.dotfiles));
    assert_eq!(data_before, snapshot(&ctx.data));
    assert_eq!(home_before, snapshot(&ctx.home));
}

#[test]
fn test_status_reports_states() {
    let ctx = TestContext::new();
    ctx.add_pack_file("git", "gitconfig", "[user]", false);

    let output = ctx.run(&["status"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("git"));
    assert!(stdout.contains("missing"));

    assert!(ctx.run(&["link"]).status.success());
    let output = ctx.run(&["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ready"));
}

#[test]
fn test_add_ignore_hides_a_pack() {
    let ctx = TestContext::new();
    ctx.add_pack_file("junk", "file", "x", false);

    assert!(ctx.run(&["add-ignore", "junk"]).status.success());
    assert!(ctx.dotfiles.join("junk/.dodotignore").exists());

    assert!(ctx.run(&["link"]).status.success());
    assert!(!ctx.home.join(".file").exists());
}

#[test]
fn test_unknown_pack_fails_with_code() {
    let ctx = TestContext::new();
    let output = ctx.run(&["link", "ghost"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[PackNotFound]"), "stderr: {stderr}");
}

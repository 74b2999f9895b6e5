//! Stateful fake of a target host.
//!
//! Files land in a temp directory; packages, accounts, the hostname, the
//! service state and the git object graph live in memory.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tempfile::TempDir;

use redeploy::errors::DeployError;
use redeploy::exec::{CommandOutput, CommandRunner, LocalHost, ShellCommand};
use redeploy::models::target::{BranchRef, Target};
use redeploy::storage::layout::HostLayout;
use redeploy::storage::settings::Settings;

pub const REPOSITORY: &str = "https://git.example.com/cratebot.git";
pub const INSTALLER: &str = "install-toolchain";
pub const UNIT: &str = "[Unit]\nDescription=cratebot\n\n[Service]\nExecStart=/usr/local/bin/cratebot\nUser=cratebot\n";

pub fn branch(name: &str) -> BranchRef {
    name.parse().unwrap()
}

pub fn target(domain: &str) -> Target {
    domain.parse().unwrap()
}

/// Settings that keep every path under `root`
pub fn settings_in(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.source.repository = REPOSITORY.to_string();
    settings.source.clone_dir = Some(root.join("opt/cratebot/src"));
    settings.host.home_dir = root.join("root");
    settings.host.install_dir = root.join("usr/local/bin");
    settings.host.unit_dir = root.join("etc/systemd/system");
    settings.host.toolchain_installer = INSTALLER.to_string();
    settings
}

#[derive(Debug, Default)]
struct HostState {
    hostname: String,
    packages: HashSet<String>,
    users: HashSet<String>,
    active_units: HashSet<String>,

    /// Branch tips on the origin server
    origin: HashMap<String, String>,
    /// `refs/remotes/origin/*` in the working copy
    tracking: HashMap<String, String>,
    /// `refs/heads/*` in the working copy
    local: HashMap<String, String>,
    head_branch: Option<String>,
    head: Option<String>,
    /// Untracked files in the working tree
    dirty: bool,

    fetch_failure: Option<i32>,
    build_failure: Option<i32>,
}

pub struct FakeHost {
    pub dir: TempDir,
    pub settings: Settings,
    pub layout: HostLayout,
    state: Mutex<HostState>,
    commands: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn failed(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput::failed(status, stderr)
}

impl FakeHost {
    /// A freshly installed host whose origin has `main` at commit `c1`
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let layout = HostLayout::from_settings(&settings);
        let host = Self {
            dir,
            settings,
            layout,
            state: Mutex::new(HostState {
                hostname: "localhost".to_string(),
                ..Default::default()
            }),
            commands: Mutex::new(Vec::new()),
        };
        host.push("main", "c1");
        host
    }

    /// Move a branch on the origin server
    pub fn push(&self, branch: &str, commit: &str) {
        lock(&self.state)
            .origin
            .insert(branch.to_string(), commit.to_string());
    }

    pub fn fail_fetch(&self, status: Option<i32>) {
        lock(&self.state).fetch_failure = status;
    }

    pub fn fail_build(&self, status: Option<i32>) {
        lock(&self.state).build_failure = status;
    }

    /// Commit on the checked-out branch without pushing, putting the
    /// working copy ahead of origin
    pub fn commit_locally(&self, commit: &str) {
        let mut state = lock(&self.state);
        if let Some(branch) = state.head_branch.clone() {
            state.local.insert(branch, commit.to_string());
        }
        state.head = Some(commit.to_string());
    }

    pub fn local_tip(&self, branch: &str) -> Option<String> {
        lock(&self.state).local.get(branch).cloned()
    }

    /// Leave an untracked file in the working copy
    pub fn make_dirty(&self) {
        lock(&self.state).dirty = true;
    }

    pub fn hostname(&self) -> String {
        lock(&self.state).hostname.clone()
    }

    pub fn has_package(&self, name: &str) -> bool {
        lock(&self.state).packages.contains(name)
    }

    pub fn has_user(&self, name: &str) -> bool {
        lock(&self.state).users.contains(name)
    }

    pub fn is_active(&self, unit: &str) -> bool {
        lock(&self.state).active_units.contains(unit)
    }

    pub fn head(&self) -> Option<String> {
        lock(&self.state).head.clone()
    }

    pub fn head_branch(&self) -> Option<String> {
        lock(&self.state).head_branch.clone()
    }

    pub fn is_dirty(&self) -> bool {
        lock(&self.state).dirty
    }

    /// How many executed command lines contain `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        lock(&self.commands)
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    pub fn clear_commands(&self) {
        lock(&self.commands).clear();
    }

    pub async fn binary(&self) -> Option<String> {
        tokio::fs::read_to_string(&self.layout.binary_path).await.ok()
    }

    pub async fn backup(&self) -> Option<String> {
        tokio::fs::read_to_string(self.layout.backup().path()).await.ok()
    }

    fn run(&self, command: &ShellCommand) -> CommandOutput {
        lock(&self.commands).push(command.command_line());
        let script = command.script();
        let words: Vec<&str> = script.split_whitespace().collect();
        let mut state = lock(&self.state);

        if let Some(rest) = script.strip_prefix(". ") {
            return self.sourced(&mut state, rest);
        }

        match words.as_slice() {
            ["hostname"] => CommandOutput::ok(format!("{}\n", state.hostname)),
            ["hostnamectl", "set-hostname", name] => {
                state.hostname = name.to_string();
                CommandOutput::ok("")
            }
            ["dpkg-query", _, _, _, names @ ..] => {
                let listing: String = names
                    .iter()
                    .map(|n| {
                        let status = if state.packages.contains(*n) {
                            "installed"
                        } else {
                            "not-installed"
                        };
                        format!("{} {}\n", n, status)
                    })
                    .collect();
                CommandOutput::ok(listing)
            }
            ["DEBIAN_FRONTEND=noninteractive", "apt-get", "update"] => CommandOutput::ok(""),
            ["DEBIAN_FRONTEND=noninteractive", "apt-get", "install", "--yes", names @ ..] => {
                state.packages.extend(names.iter().map(|n| n.to_string()));
                CommandOutput::ok("")
            }
            [INSTALLER] => {
                let env = &self.layout.toolchain_env;
                std::fs::create_dir_all(env.parent().unwrap()).unwrap();
                std::fs::write(env, "export PATH=\"$HOME/.cargo/bin:$PATH\"\n").unwrap();
                CommandOutput::ok("")
            }
            ["id", "-u", user] => {
                if state.users.contains(*user) {
                    CommandOutput::ok("998\n")
                } else {
                    failed(1, &format!("id: '{}': no such user", user))
                }
            }
            ["useradd", .., user] => {
                state.users.insert(user.to_string());
                CommandOutput::ok("")
            }
            ["systemctl", "restart", unit] => {
                state.active_units.insert(unit.to_string());
                CommandOutput::ok("")
            }
            ["systemctl", "is-active", unit] => {
                if state.active_units.contains(*unit) {
                    CommandOutput::ok("active\n")
                } else {
                    failed(3, "inactive")
                }
            }
            ["systemctl", ..] => CommandOutput::ok(""),
            ["git", args @ ..] => self.git(&mut state, args),
            _ => failed(127, &format!("{}: command not found", script)),
        }
    }

    /// Commands run after `. <toolchain env> && `
    fn sourced(&self, state: &mut HostState, rest: &str) -> CommandOutput {
        let Some((env, command)) = rest.split_once(" && ") else {
            return failed(2, "syntax error");
        };
        if !Path::new(env).is_file() {
            return failed(1, &format!("{}: No such file or directory", env));
        }
        match command {
            "cargo --version" => CommandOutput::ok("cargo 1.84.0 (66221abde 2024-11-19)\n"),
            "cargo build --release" => {
                if let Some(status) = state.build_failure {
                    return failed(status, "error: could not compile `cratebot`");
                }
                let artifact = self.layout.artifact();
                let path: PathBuf = artifact.path().to_path_buf();
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                let head = state.head.clone().unwrap_or_default();
                std::fs::write(&path, format!("build of {}", head)).unwrap();
                CommandOutput::ok("")
            }
            _ => failed(127, "command not found"),
        }
    }

    fn git(&self, state: &mut HostState, args: &[&str]) -> CommandOutput {
        match args {
            ["clone", _, dest] => {
                let dest = Path::new(dest);
                std::fs::create_dir_all(dest.join(".git")).unwrap();
                std::fs::write(dest.join("cratebot.service"), UNIT).unwrap();
                state.tracking = state.origin.clone();
                if let Some(tip) = state.origin.get("main").cloned() {
                    state.local.insert("main".to_string(), tip.clone());
                    state.head_branch = Some("main".to_string());
                    state.head = Some(tip);
                }
                CommandOutput::ok("")
            }
            ["fetch", "--prune", "origin"] => {
                if let Some(status) = state.fetch_failure {
                    return failed(status, "fatal: unable to access origin");
                }
                state.tracking = state.origin.clone();
                CommandOutput::ok("")
            }
            ["rev-parse", "--verify", "--quiet", rev] => {
                let found = if *rev == "HEAD" {
                    state.head.clone()
                } else if let Some(b) = rev.strip_prefix("refs/remotes/origin/") {
                    state.tracking.get(b).cloned()
                } else if let Some(b) = rev.strip_prefix("refs/heads/") {
                    state.local.get(b).cloned()
                } else {
                    None
                };
                match found {
                    Some(sha) => CommandOutput::ok(format!("{}\n", sha)),
                    None => failed(1, ""),
                }
            }
            ["symbolic-ref", "--quiet", "--short", "HEAD"] => match &state.head_branch {
                Some(b) => CommandOutput::ok(format!("{}\n", b)),
                None => failed(1, ""),
            },
            ["checkout", "--force", "-B", name, start] => {
                let Some(sha) = start
                    .strip_prefix("refs/remotes/origin/")
                    .and_then(|b| state.tracking.get(b).cloned())
                else {
                    return failed(128, &format!("fatal: '{}' is not a commit", start));
                };
                state.local.insert(name.to_string(), sha.clone());
                state.head_branch = Some(name.to_string());
                state.head = Some(sha);
                CommandOutput::ok("")
            }
            ["status", "--porcelain"] => {
                CommandOutput::ok(if state.dirty { "?? scratch.log\n" } else { "" })
            }
            ["reset", "--hard", rev] => {
                let Some(sha) = rev
                    .strip_prefix("refs/remotes/origin/")
                    .and_then(|b| state.tracking.get(b).cloned())
                else {
                    return failed(128, "fatal: ambiguous argument");
                };
                if let Some(b) = state.head_branch.clone() {
                    state.local.insert(b, sha.clone());
                }
                state.head = Some(sha);
                CommandOutput::ok("")
            }
            ["clean", "-fd"] => {
                state.dirty = false;
                CommandOutput::ok("")
            }
            _ => failed(129, "usage: git"),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn capture(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        Ok(self.run(command))
    }

    async fn stream(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        let output = self.run(command);
        Ok(CommandOutput {
            status: output.status,
            ..Default::default()
        })
    }

    async fn put_file(&self, path: &Path, contents: &[u8], _mode: u32) -> Result<(), DeployError> {
        lock(&self.commands).push(format!("put {}", path.display()));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

impl LocalHost for FakeHost {}

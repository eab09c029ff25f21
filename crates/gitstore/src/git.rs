//! `SnapshotStore` over the `git` command line
//!
//! Snapshots are orphan commits: the working tree is staged, written as a
//! tree and committed without a parent, then a branch is pointed at the
//! commit. HEAD and the index of the world directory are never used for
//! anything else, so no command here switches branches.

use crate::progress::{parse_progress_line, ProgressMonitor};
use crate::{SnapshotStore, StoreError};
use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Patterns every world repository ignores
pub const IGNORE_RULES: &[&str] = &["session.lock", "*.tmp", "logs/"];

/// World data is binary; keep git from diffing or normalizing it
pub const ATTRIBUTE_RULES: &[&str] = &["*.dat binary", "*.mca binary", "*.nbt binary"];

/// Author and committer used for snapshot commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "worldsnap".to_string(),
            email: "worldsnap@localhost".to_string(),
        }
    }
}

/// A git repository rooted at a world directory
#[derive(Debug, Clone)]
pub struct GitRepo {
    work_dir: PathBuf,
    identity: Identity,
}

impl GitRepo {
    /// Initialize (or reinitialize) a repository in `work_dir`
    pub fn init(work_dir: impl Into<PathBuf>, identity: Identity) -> Result<Self, StoreError> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;

        let repo = Self { work_dir, identity };
        repo.run(["init", "--quiet"])?;
        tracing::info!("Initialized snapshot repository in {}", repo.work_dir.display());
        Ok(repo)
    }

    /// Open an existing repository
    pub fn open(work_dir: impl Into<PathBuf>, identity: Identity) -> Result<Self, StoreError> {
        let work_dir = work_dir.into();
        if !work_dir.join(".git").exists() {
            return Err(StoreError::NotARepository(work_dir));
        }
        Ok(Self { work_dir, identity })
    }

    /// Open `work_dir`, initializing it first when it isn't a repository
    pub fn open_or_init(work_dir: impl Into<PathBuf>, identity: Identity) -> Result<Self, StoreError> {
        let work_dir = work_dir.into();
        if work_dir.join(".git").exists() {
            Self::open(work_dir, identity)
        } else {
            Self::init(work_dir, identity)
        }
    }

    /// Version string of the git binary on PATH, `None` when git is missing
    pub fn git_version() -> Option<String> {
        let output = Command::new("git").arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The `.git` directory
    pub fn git_dir(&self) -> PathBuf {
        self.work_dir.join(".git")
    }

    /// Append missing lines to `.gitignore`; returns true if the file changed
    pub fn update_ignore_file(&self) -> Result<bool, StoreError> {
        ensure_lines(&self.work_dir.join(".gitignore"), IGNORE_RULES)
    }

    /// Append missing lines to `.gitattributes`; returns true if the file changed
    pub fn update_attributes_file(&self) -> Result<bool, StoreError> {
        ensure_lines(&self.work_dir.join(".gitattributes"), ATTRIBUTE_RULES)
    }

    /// Point `remote` at `url`, adding the remote if needed
    pub fn set_remote(&self, remote: &str, url: &str) -> Result<(), StoreError> {
        if self.has_remote(remote)? {
            self.run(["remote", "set-url", remote, url])?;
        } else {
            self.run(["remote", "add", remote, url])?;
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.work_dir)
            .arg("-c")
            .arg(format!("user.name={}", self.identity.name))
            .arg("-c")
            .arg(format!("user.email={}", self.identity.email))
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn run<I, S>(&self, args: I) -> Result<String, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        let output = output_of(&mut cmd)?;
        checked(&cmd, output)
    }

    /// Like `run`, but a failing exit status becomes `Ok(None)`
    fn run_optional<I, S>(&self, args: I) -> Result<Option<String>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        let output = output_of(&mut cmd)?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn rev_parse(&self, rev: &str) -> Result<Option<String>, StoreError> {
        self.run_optional(["rev-parse", "--verify", "--quiet", rev])
    }

    fn require_commit(&self, branch: &str) -> Result<String, StoreError> {
        self.rev_parse(&format!("refs/heads/{}^{{commit}}", branch))?
            .ok_or_else(|| StoreError::RefNotFound(branch.to_string()))
    }

    fn has_remote(&self, remote: &str) -> Result<bool, StoreError> {
        let remotes = self.run(["remote"])?;
        Ok(remotes.lines().any(|line| line.trim() == remote))
    }
}

impl SnapshotStore for GitRepo {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn local_refs(&self) -> Result<Vec<String>, StoreError> {
        let output = self.run(["for-each-ref", "--format=%(refname)", "refs/heads/"])?;
        Ok(output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect())
    }

    fn remote_refs(&self, remote: &str) -> Result<Vec<String>, StoreError> {
        let output = self.run(["ls-remote", "--heads", remote])?;
        Ok(output
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .filter_map(|(_, refname)| refname.trim().strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect())
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.rev_parse(&format!("refs/heads/{}^{{commit}}", name))
    }

    fn commit_snapshot(&self, name: &str, message: &str) -> Result<String, StoreError> {
        if self.resolve_ref(name)?.is_some() {
            return Err(StoreError::RefExists(name.to_string()));
        }

        self.run(["add", "--all", "."])?;
        let tree = self.run(["write-tree"])?;
        let commit = self.run(["commit-tree", tree.as_str(), "-m", message])?;
        self.run([
            "update-ref",
            branch_ref(name).as_str(),
            commit.as_str(),
            "",
        ])?;

        tracing::debug!("Snapshot {} -> {}", name, commit);
        Ok(commit)
    }

    fn create_branch(&self, name: &str, target: &str) -> Result<(), StoreError> {
        let commit = self.require_commit(target)?;
        self.run(["update-ref", branch_ref(name).as_str(), commit.as_str()])?;
        Ok(())
    }

    fn merge_ours(&self, branch: &str, other: &str, message: &str) -> Result<String, StoreError> {
        let head = self.require_commit(branch)?;
        let theirs = self.require_commit(other)?;
        let tree = self
            .rev_parse(&format!("{}^{{tree}}", head))?
            .ok_or_else(|| StoreError::RefNotFound(branch.to_string()))?;

        let merge = self.run([
            "commit-tree",
            tree.as_str(),
            "-p",
            head.as_str(),
            "-p",
            theirs.as_str(),
            "-m",
            message,
        ])?;

        // Old value guards against a concurrent update of the branch
        self.run([
            "update-ref",
            branch_ref(branch).as_str(),
            merge.as_str(),
            head.as_str(),
        ])?;
        Ok(merge)
    }

    fn push(
        &self,
        remote: &str,
        branches: &[String],
        progress: &mut dyn ProgressMonitor,
    ) -> Result<(), StoreError> {
        let mut cmd = self.command();
        cmd.args(["push", "--progress", "--porcelain", remote]);
        cmd.args(
            branches
                .iter()
                .map(|b| format!("refs/heads/{b}:refs/heads/{b}")),
        );
        run_with_progress(cmd, progress)
    }

    fn delete_local_ref(&self, name: &str) -> Result<(), StoreError> {
        self.run(["update-ref", "-d", branch_ref(name).as_str()])?;
        Ok(())
    }

    fn delete_tracking_ref(&self, remote: &str, name: &str) -> Result<bool, StoreError> {
        let refname = format!("refs/remotes/{}/{}", remote, name);
        if self.rev_parse(&refname)?.is_none() {
            return Ok(false);
        }
        self.run(["update-ref", "-d", refname.as_str()])?;
        Ok(true)
    }

    fn delete_remote_refs(&self, remote: &str, names: &[String]) -> Result<(), StoreError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = vec![
            "push".to_string(),
            "--quiet".to_string(),
            remote.to_string(),
            "--delete".to_string(),
        ];
        args.extend(names.iter().map(|name| format!("refs/heads/{}", name)));
        self.run(args)?;
        Ok(())
    }

    fn remote_url(&self, remote: &str) -> Result<Option<String>, StoreError> {
        if !self.has_remote(remote)? {
            return Ok(None);
        }
        self.run_optional(["remote", "get-url", remote])
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run_optional(["config", "--get", key])
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.run(["config", key, value])?;
        Ok(())
    }

    fn clone_branch(
        &self,
        source: &str,
        branch: &str,
        target: &Path,
        progress: &mut dyn ProgressMonitor,
    ) -> Result<(), StoreError> {
        let mut cmd = Command::new("git");
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .args(["clone", "--progress", "--single-branch", "--no-tags", "--branch"])
            .arg(branch)
            .arg(source)
            .arg(target);
        run_with_progress(cmd, progress)
    }

    fn collect_garbage(&self) -> Result<(), StoreError> {
        self.run(["gc", "--quiet", "--prune=now"])?;
        Ok(())
    }
}

fn branch_ref(name: &str) -> String {
    format!("refs/heads/{}", name)
}

fn describe(cmd: &Command) -> String {
    let mut text = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        text.push(' ');
        text.push_str(&arg.to_string_lossy());
    }
    text
}

fn output_of(cmd: &mut Command) -> Result<Output, StoreError> {
    tracing::trace!("Running {}", describe(cmd));
    cmd.output().map_err(|source| StoreError::Spawn {
        command: describe(cmd),
        source,
    })
}

fn checked(cmd: &Command, output: Output) -> Result<String, StoreError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    Err(StoreError::Command {
        command: describe(cmd),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `cmd`, feeding its stderr progress lines to `progress`
///
/// git rewrites progress lines in place with `\r`, so stderr is split on
/// both `\r` and `\n`. stdout is drained on a separate thread.
fn run_with_progress(mut cmd: Command, progress: &mut dyn ProgressMonitor) -> Result<(), StoreError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let command = describe(&cmd);
    tracing::trace!("Running {}", command);
    let mut child = cmd.spawn().map_err(|source| StoreError::Spawn {
        command: command.clone(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        })
    });

    let mut stderr_text = String::new();
    let streamed = match child.stderr.take() {
        Some(stderr) => stream_progress(stderr, &mut stderr_text, progress),
        None => Ok(()),
    };

    if let Err(e) = streamed {
        tracing::warn!("Lost stderr of {}: {}", command, e);
        // Reap the child so the stdout reader sees EOF
        let _ = child.kill();
        let _ = child.wait();
        if let Some(handle) = stdout_reader {
            let _ = handle.join();
        }
        return Err(e.into());
    }

    let status = child.wait()?;
    let stdout = stdout_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if status.success() {
        progress.finish();
        Ok(())
    } else {
        Err(StoreError::Command {
            command,
            code: status.code(),
            stdout,
            stderr: stderr_text,
        })
    }
}

/// Feed `\r`/`\n` separated stderr lines to `progress`, keeping a transcript
fn stream_progress(
    mut stderr: impl Read,
    transcript: &mut String,
    progress: &mut dyn ProgressMonitor,
) -> std::io::Result<()> {
    let mut line = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stderr.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        for &byte in &chunk[..n] {
            if byte == b'\r' || byte == b'\n' {
                flush_line(&mut line, transcript, progress, byte == b'\n');
            } else {
                line.push(byte);
            }
        }
    }
    flush_line(&mut line, transcript, progress, true);
    Ok(())
}

fn flush_line(
    line: &mut Vec<u8>,
    transcript: &mut String,
    progress: &mut dyn ProgressMonitor,
    keep: bool,
) {
    if line.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(line).into_owned();
    line.clear();

    if let Some(update) = parse_progress_line(&text) {
        progress.update(&update.phase, update.completed, update.total);
    }
    // Only the final rendering of a rewritten line is worth keeping
    if keep {
        transcript.push_str(&text);
        transcript.push('\n');
    }
}

fn ensure_lines(path: &Path, lines: &[&str]) -> Result<bool, StoreError> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let missing: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|wanted| !existing.lines().any(|line| line.trim() == *wanted))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file)?;
    }
    for line in missing {
        writeln!(file, "{}", line)?;
    }
    Ok(true)
}

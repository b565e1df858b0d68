//! Local source export and packaging.
//!
//! The release tree is exported with `git archive` (so untracked and ignored
//! files never ship) into `build/{build_dir}/`, then packed into
//! `dist/{tarball}` with `tar cjf`.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::build::BuildInfo;

/// Short hash of the checked-out revision.
pub fn git_rev(workdir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(workdir)
        .output()
        .with_context(|| "Failed to execute 'git rev-parse'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git rev-parse failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Export the revision into `build/{build_dir}/`, replacing any earlier export.
pub fn prep_source(workdir: &Path, build: &BuildInfo) -> Result<PathBuf> {
    export_with(workdir, build, "tar")
}

fn export_with(workdir: &Path, build: &BuildInfo, tar: &str) -> Result<PathBuf> {
    let build_root = workdir.join("build");
    std::fs::create_dir_all(&build_root)
        .with_context(|| format!("Failed to create {}", build_root.display()))?;

    let export_dir = build_root.join(build.build_dir());
    if export_dir.exists() {
        std::fs::remove_dir_all(&export_dir)
            .with_context(|| format!("Failed to remove {}", export_dir.display()))?;
    }

    let mut archive = Command::new("git")
        .args([
            "archive",
            "--format=tar",
            &format!("--prefix={}/", build.build_dir()),
            &build.git_rev,
        ])
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| "Failed to execute 'git archive'")?;

    let archive_out = archive
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("git archive produced no output stream"))?;

    let extract = match Command::new(tar)
        .args(["xf", "-"])
        .current_dir(&build_root)
        .stdin(Stdio::from(archive_out))
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            // git may still be writing; reap it before bailing out
            let _ = archive.kill();
            let _ = archive.wait();
            return Err(e).with_context(|| format!("Failed to execute '{}'", tar));
        }
    };

    let archive_status = archive.wait()?;
    if !archive_status.success() {
        bail!("git archive of {} failed", build.git_rev);
    }
    if !extract.status.success() {
        let stderr = String::from_utf8_lossy(&extract.stderr);
        bail!("tar extract failed: {}", stderr.trim());
    }

    Ok(export_dir)
}

/// Pack `build/{build_dir}` into `dist/{tarball}`.
pub fn package_source(workdir: &Path, build: &BuildInfo) -> Result<PathBuf> {
    let dist = workdir.join("dist");
    std::fs::create_dir_all(&dist)
        .with_context(|| format!("Failed to create {}", dist.display()))?;

    let tarball = dist.join(build.tarball());
    let output = Command::new("tar")
        .arg("cjf")
        .arg(&tarball)
        .arg("-C")
        .arg(workdir.join("build"))
        .arg(build.build_dir())
        .output()
        .with_context(|| "Failed to execute 'tar'")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("tar cjf failed: {}", stderr.trim());
    }

    Ok(tarball)
}

/// Remove local `build/` and `dist/`. Returns the directories removed.
pub fn clean(workdir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in ["build", "dist"] {
        let dir = workdir.join(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
            removed.push(dir);
        }
    }
    Ok(removed)
}

/// Scratch git checkouts for the packaging and deploy tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::Path;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    /// A git checkout with one committed README and one untracked file.
    pub(crate) fn checkout() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("README"), "serendipomatic\n").unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["add", "README"]);
        git(dir.path(), &["commit", "-q", "-m", "initial"]);
        std::fs::write(dir.path().join("scratch.txt"), "not tracked").unwrap();
        dir
    }
}

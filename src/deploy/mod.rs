//! Tarball-based release deployment.
//!
//! Layout on the target (`deploy.remote_path`):
//!
//! ```text
//! /var/www/serendipomatic/
//! ├── serendip.toml                    site settings, copied into each build
//! ├── serendipomatic-0.2.0/            build directories
//! ├── serendipomatic-0.3.0-dev-r1a2b3c/
//! ├── current  -> serendipomatic-0.3.0-dev-r1a2b3c
//! └── previous -> serendipomatic-0.2.0
//! ```
//!
//! `deploy` packages the checked-out revision, uploads and extracts it,
//! builds it, copies the site settings in, swaps the `current`/`previous`
//! links, backs up and migrates the database, restarts the web server and
//! prunes old builds. Every remote step stops the task on a non-zero exit;
//! `revert` is the way back.
//!
//! ```bash
//! serendip deploy build-source-package
//! serendip deploy deploy
//! serendip deploy revert
//! serendip deploy rm-old-builds
//! ```

pub mod build;
pub mod remote;
pub mod source;

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::config::DeployConfig;
use build::{build_dir_pattern, identify_build_dirs, link_name, plan_removals, BuildInfo};
use remote::{shell_quote, LocalRemote, Remote, SshRemote, Target};

/// Outcome of [`Deployer::update_links`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkUpdate {
    /// `current` already pointed at the build.
    Unchanged,
    /// `current` now points at the build; `previous` holds the old target.
    Switched { previous: Option<String> },
}

pub struct Deployer {
    config: DeployConfig,
    target: Target,
    workdir: PathBuf,
}

impl Deployer {
    /// Deployer for the configured host (`local` runs on this machine).
    pub fn new(config: &DeployConfig, workdir: &Path) -> Self {
        let remote: Box<dyn Remote> = if config.host == "local" {
            Box::new(LocalRemote)
        } else {
            Box::new(SshRemote::new(&config.host, config.ssh_port))
        };
        Self::with_remote(config, workdir, remote)
    }

    pub fn with_remote(config: &DeployConfig, workdir: &Path, remote: Box<dyn Remote>) -> Self {
        Self {
            target: Target::new(remote, config.account(), &config.remote_path),
            config: config.clone(),
            workdir: workdir.to_path_buf(),
        }
    }

    /// Build identity from the configured version and the local git revision.
    pub fn configure(&self) -> Result<BuildInfo> {
        let rev = source::git_rev(&self.workdir)?;
        BuildInfo::new(&self.config.project, &self.config.version(), &rev)
    }

    fn in_build(&self, build_dir: &str) -> String {
        self.target.path(build_dir)
    }

    // ============ Local ============

    pub fn build_source_package(&self) -> Result<(BuildInfo, PathBuf)> {
        let build = self.configure()?;
        source::prep_source(&self.workdir, &build)?;
        let tarball = source::package_source(&self.workdir, &build)?;
        println!("Packaged {}", tarball.display());
        Ok((build, tarball))
    }

    // ============ Remote steps ============

    fn upload_source(&self, build: &BuildInfo, tarball: &Path) -> Result<()> {
        self.target
            .put(tarball, &format!("/tmp/{}", build.tarball()))
    }

    fn extract_source(&self, build: &BuildInfo) -> Result<()> {
        let uploaded = format!("/tmp/{}", build.tarball());
        self.target
            .sudo(self.target.root(), &format!("tar xjf {}", shell_quote(&uploaded)))?;
        self.target
            .run(self.target.root(), &format!("rm {}", shell_quote(&uploaded)))?;
        Ok(())
    }

    /// Compile the release inside its build directory.
    fn setup_environment(&self, build_dir: &str) -> Result<()> {
        self.target
            .sudo(&self.in_build(build_dir), &self.config.build_command)?;
        Ok(())
    }

    /// Copy the site settings into the build and hand it to the web group.
    pub fn configure_site(&self, build_dir: &str) -> Result<()> {
        let settings = &self.config.settings_file;
        if !self.target.exists(settings)? {
            bail!(
                "Configuration file is not in expected location: {}",
                self.target.path(settings)
            );
        }
        self.target.sudo(
            self.target.root(),
            &format!(
                "cp {} {}/{}",
                shell_quote(settings),
                shell_quote(build_dir),
                shell_quote(settings)
            ),
        )?;

        if !self.config.webgroup.is_empty() {
            self.target.sudo(
                self.target.root(),
                &format!(
                    "chgrp -R {} {}",
                    shell_quote(&self.config.webgroup),
                    shell_quote(build_dir)
                ),
            )?;
        }
        Ok(())
    }

    /// Point `current` at `build_dir`, shifting the old target to `previous`.
    /// Re-deploying the build `current` already points at changes nothing.
    pub fn update_links(&self, build_dir: &str) -> Result<LinkUpdate> {
        let root = self.target.root();
        let old = self.target.readlink("current")?.map(|t| link_name(&t));

        if old.as_deref() == Some(build_dir) {
            return Ok(LinkUpdate::Unchanged);
        }
        if old.is_some() {
            self.target
                .sudo(root, "rm -f previous; mv current previous")?;
        }
        self.target
            .sudo(root, &format!("ln -sf {} current", shell_quote(build_dir)))?;

        Ok(LinkUpdate::Switched { previous: old })
    }

    /// Diff the settings of `current` and `previous`.
    ///
    /// Returns `None` without a `previous` deploy, otherwise whether the two
    /// files differ.
    pub fn compare_localsettings(&self) -> Result<Option<bool>> {
        if !self.target.exists("previous")? {
            return Ok(None);
        }
        let settings = shell_quote(&self.config.settings_file);
        let output = self.target.sudo_warn_only(
            self.target.root(),
            &format!("diff current/{0} previous/{0}", settings),
        )?;

        let differs = !output.success() || !output.stdout.trim().is_empty();
        if differs {
            println!(
                "{}",
                format!(
                    "WARNING: found differences between current and previous {}",
                    self.config.settings_file
                )
                .yellow()
            );
            let detail = if output.stdout.trim().is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            println!("{}", detail.trim_end());
        } else {
            println!(
                "{}",
                format!(
                    "No differences between current and previous {}",
                    self.config.settings_file
                )
                .green()
            );
        }
        Ok(Some(differs))
    }

    /// Create or update the database schema of the build.
    pub fn syncdb(&self, build_dir: &str) -> Result<()> {
        self.target.sudo(
            &self.in_build(build_dir),
            &format!(
                "{} --config {} init",
                self.config.binary,
                shell_quote(&self.config.settings_file)
            ),
        )?;
        Ok(())
    }

    pub fn backup_db(&self) -> Result<()> {
        self.target
            .sudo(self.target.root(), &self.config.backup_db_command)?;
        Ok(())
    }

    pub fn restore_db(&self) -> Result<()> {
        self.target
            .sudo(self.target.root(), &self.config.restore_db_command)?;
        Ok(())
    }

    pub fn restart(&self) -> Result<()> {
        self.target
            .run(self.target.root(), &self.config.restart_command)?;
        Ok(())
    }

    /// Build directories on the target, newest first.
    pub fn identify_build_dirs(&self) -> Result<Vec<String>> {
        let pattern = build_dir_pattern(&self.config.project)?;
        let listing = self.target.sudo(self.target.root(), "ls -t1p")?;
        Ok(identify_build_dirs(&listing, &pattern))
    }

    /// Remove all but the newest `keep_builds` build directories, never
    /// touching the targets of `current` or `previous`.
    pub fn rm_old_builds(&self) -> Result<Vec<String>> {
        let current = self.target.readlink("current")?;
        let previous = self.target.readlink("previous")?;

        let build_dirs = self.identify_build_dirs()?;
        let rm_dirs = plan_removals(
            &build_dirs,
            current.as_deref(),
            previous.as_deref(),
            self.config.keep_builds,
        );

        if rm_dirs.is_empty() {
            println!("No old build directories to remove");
        }
        for dir in &rm_dirs {
            self.target
                .sudo(self.target.root(), &format!("rm -rf {}", shell_quote(dir)))?;
            println!("Removed {}", dir);
        }
        Ok(rm_dirs)
    }

    // ============ Tasks ============

    /// Full release: package, upload, install, activate, migrate, restart, prune.
    pub fn deploy(&self) -> Result<BuildInfo> {
        let (build, tarball) = self.build_source_package()?;
        let build_dir = build.build_dir();
        println!("Deploying {} to {}", build_dir, self.target.describe());

        self.upload_source(&build, &tarball)?;
        self.extract_source(&build)?;
        self.setup_environment(&build_dir)?;
        self.configure_site(&build_dir)?;

        match self.update_links(&build_dir)? {
            LinkUpdate::Unchanged => println!("current already points at {}", build_dir),
            LinkUpdate::Switched { .. } => println!("current -> {}", build_dir),
        }
        self.compare_localsettings()?;

        self.backup_db()?;
        self.syncdb(&build_dir)?;
        self.restart()?;
        self.rm_old_builds()?;

        println!("{}", format!("Deployed {}", build_dir).green());
        Ok(build)
    }

    /// Make `previous` current again and restore the last database backup.
    /// Returns the build now linked as `current`, if a revert happened.
    pub fn revert(&self) -> Result<Option<String>> {
        let root = self.target.root();
        let mut reverted = None;

        if self.target.exists("previous")? {
            self.target.sudo(root, "rm current")?;
            self.target.sudo(root, "mv previous current")?;
            let now = self
                .target
                .readlink("current")?
                .map(|t| link_name(&t));
            if let Some(dir) = &now {
                println!("current -> {}", dir);
            }
            reverted = now;
        } else {
            println!("{}", "WARNING: no previous deploy to revert to".yellow());
        }

        self.restore_db()?;
        self.restart()?;
        Ok(reverted)
    }
}

//! Build naming and old-build retention.
//!
//! A build directory is named `{project}-{version}`, with `-r{git_rev}`
//! appended for prerelease versions so that successive development deploys
//! of the same version get distinct directories. The retention policy keeps
//! the newest `keep` build directories plus whatever `current` and
//! `previous` point at; everything else matching the naming pattern is
//! proposed for removal.

use anyhow::{Context, Result};
use regex::Regex;

/// Identity of one release build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInfo {
    pub project: String,
    pub version: semver::Version,
    pub git_rev: String,
}

impl BuildInfo {
    pub fn new(project: &str, version: &str, git_rev: &str) -> Result<Self> {
        let version = semver::Version::parse(version)
            .with_context(|| format!("Invalid release version: {}", version))?;
        Ok(Self {
            project: project.to_string(),
            version,
            git_rev: git_rev.trim().to_string(),
        })
    }

    /// Release versions have no prerelease component.
    pub fn is_release(&self) -> bool {
        self.version.pre.is_empty()
    }

    pub fn rev_tag(&self) -> String {
        if self.is_release() {
            String::new()
        } else {
            format!("-r{}", self.git_rev)
        }
    }

    pub fn build_dir(&self) -> String {
        format!("{}-{}{}", self.project, self.version, self.rev_tag())
    }

    pub fn tarball(&self) -> String {
        format!("{}-{}-{}.tar.bz2", self.project, self.version, self.git_rev)
    }
}

/// Pattern matching every build directory name `project` can produce:
/// numeric version, optional prerelease suffix, optional revision tag.
pub fn build_dir_pattern(project: &str) -> Result<Regex> {
    let pattern = format!(
        r"^{}-[0-9.]+(-[A-Za-z0-9_.-]+)?(-r[0-9a-f]+)?$",
        regex::escape(project)
    );
    Ok(Regex::new(&pattern)?)
}

/// Build directories in an `ls -t1p` listing, newest first.
///
/// `-p` marks directories with a trailing `/`; plain files and symlinks are
/// never build directories.
pub fn identify_build_dirs(listing: &str, pattern: &Regex) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_suffix('/'))
        .filter(|name| pattern.is_match(name))
        .map(str::to_string)
        .collect()
}

/// Directory name a link target refers to (`readlink` may print a path).
pub fn link_name(target: &str) -> String {
    target
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Build directories to delete: everything after the newest `keep`, except
/// the targets of `current` and `previous`.
pub fn plan_removals(
    build_dirs: &[String],
    current: Option<&str>,
    previous: Option<&str>,
    keep: usize,
) -> Vec<String> {
    let linked: Vec<String> = [current, previous]
        .into_iter()
        .flatten()
        .map(link_name)
        .collect();

    build_dirs
        .iter()
        .skip(keep)
        .filter(|dir| !linked.contains(dir))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_release_build_names() {
        let build = BuildInfo::new("serendipomatic", "1.2.0", "a1b2c3d\n").unwrap();
        assert!(build.is_release());
        assert_eq!(build.build_dir(), "serendipomatic-1.2.0");
        assert_eq!(build.tarball(), "serendipomatic-1.2.0-a1b2c3d.tar.bz2");
    }

    #[test]
    fn test_prerelease_build_names() {
        let build = BuildInfo::new("serendipomatic", "1.3.0-dev", "a1b2c3d").unwrap();
        assert!(!build.is_release());
        assert_eq!(build.build_dir(), "serendipomatic-1.3.0-dev-ra1b2c3d");
    }

    #[test]
    fn test_invalid_version() {
        assert!(BuildInfo::new("serendipomatic", "1.x", "abc").is_err());
    }

    #[test]
    fn test_pattern_matches_generated_names() {
        let re = build_dir_pattern("serendipomatic").unwrap();
        for version in ["1.2.0", "1.3.0-dev", "2.0.0-rc.1"] {
            let build = BuildInfo::new("serendipomatic", version, "0f9e8d7").unwrap();
            assert!(re.is_match(&build.build_dir()), "{}", build.build_dir());
        }
    }

    #[test]
    fn test_pattern_rejects_other_entries() {
        let re = build_dir_pattern("serendipomatic").unwrap();
        for name in [
            "current",
            "previous",
            "serendip.toml",
            "serendipomatic",
            "serendipomatic-",
            "other-1.0.0",
            "serendipomatic-beta",
            "xserendipomatic-1.0.0",
        ] {
            assert!(!re.is_match(name), "{}", name);
        }
    }

    #[test]
    fn test_pattern_escapes_project() {
        let re = build_dir_pattern("smart.stash").unwrap();
        assert!(re.is_match("smart.stash-1.0.0"));
        assert!(!re.is_match("smartxstash-1.0.0"));
    }

    #[test]
    fn test_identify_only_directories() {
        let re = build_dir_pattern("serendipomatic").unwrap();
        let listing = "current\nserendipomatic-1.3.0/\nserendip.toml\nserendipomatic-1.2.0-x.tar.bz2\n\
                       previous\nserendipomatic-1.2.0/\nlogs/\n";
        assert_eq!(
            identify_build_dirs(listing, &re),
            dirs(&["serendipomatic-1.3.0", "serendipomatic-1.2.0"])
        );
    }

    #[test]
    fn test_plan_removes_all_but_newest_three() {
        let builds = dirs(&["p-1.5", "p-1.4", "p-1.3", "p-1.2", "p-1.1"]);
        assert_eq!(
            plan_removals(&builds, Some("p-1.5"), Some("p-1.4"), 3),
            dirs(&["p-1.2", "p-1.1"])
        );
    }

    #[test]
    fn test_plan_n_minus_keep_for_many() {
        let builds: Vec<String> = (0..10).rev().map(|i| format!("p-1.{}", i)).collect();
        let plan = plan_removals(&builds, None, None, 3);
        assert_eq!(plan.len(), 7);
        assert!(!plan.contains(&"p-1.9".to_string()));
    }

    #[test]
    fn test_plan_protects_old_linked_dirs() {
        let builds = dirs(&["p-1.5", "p-1.4", "p-1.3", "p-1.2", "p-1.1"]);
        let plan = plan_removals(&builds, Some("p-1.1"), Some("/var/www/p/p-1.2/"), 3);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_nothing_when_few_builds() {
        let builds = dirs(&["p-1.2", "p-1.1"]);
        assert!(plan_removals(&builds, None, None, 3).is_empty());
    }

    #[test]
    fn test_link_name() {
        assert_eq!(link_name("p-1.2\n"), "p-1.2");
        assert_eq!(link_name("/var/www/p/p-1.2/"), "p-1.2");
    }
}

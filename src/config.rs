use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::types::RepoRef;

/// Top-level dashboard views, in the order the view switcher cycles through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Notifications,
    #[default]
    Prs,
    Issues,
    Repo,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::Notifications,
        ViewKind::Prs,
        ViewKind::Issues,
        ViewKind::Repo,
    ];

    pub fn next(self) -> Self {
        match self {
            ViewKind::Notifications => ViewKind::Prs,
            ViewKind::Prs => ViewKind::Issues,
            ViewKind::Issues => ViewKind::Repo,
            ViewKind::Repo => ViewKind::Notifications,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewKind::Notifications => "Notifications",
            ViewKind::Prs => "Pull Requests",
            ViewKind::Issues => "Issues",
            ViewKind::Repo => "Repo",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SectionConfig {
    pub title: String,
    #[serde(default)]
    pub filters: String,
    pub limit: Option<u32>,
}

impl SectionConfig {
    fn new(title: &str, filters: &str) -> Self {
        Self {
            title: title.to_string(),
            filters: filters.to_string(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub view: ViewKind,
    pub prs_limit: u32,
    pub issues_limit: u32,
    pub notifications_limit: u32,
    pub refetch_interval_minutes: u64,
    pub preview_open: bool,
    pub preview_width: u16,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            view: ViewKind::Prs,
            prs_limit: 20,
            issues_limit: 20,
            notifications_limit: 20,
            refetch_interval_minutes: 30,
            preview_open: true,
            preview_width: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub smart_filtering_at_launch: bool,
    pub confirm_quit: bool,
    pub repo_paths: HashMap<String, String>,
    pub pr_sections: Vec<SectionConfig>,
    pub issue_sections: Vec<SectionConfig>,
    pub notification_sections: Vec<SectionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            smart_filtering_at_launch: true,
            confirm_quit: false,
            repo_paths: HashMap::new(),
            pr_sections: vec![
                SectionConfig::new("My Pull Requests", "is:open author:@me"),
                SectionConfig::new("Needs My Review", "is:open review-requested:@me"),
                SectionConfig::new("Involved", "is:open involves:@me -author:@me"),
            ],
            issue_sections: vec![
                SectionConfig::new("My Issues", "is:open author:@me"),
                SectionConfig::new("Assigned", "is:open assignee:@me"),
                SectionConfig::new("Involved", "is:open involves:@me -author:@me"),
            ],
            notification_sections: vec![
                SectionConfig::new("All", ""),
                SectionConfig::new("Participating", "reason:participating"),
            ],
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("gitdash").join("config.toml"))
}

impl Config {
    /// Load from `path` (or the default location). Missing or broken files fall back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match config_path() {
                Some(p) => p,
                None => return Config::default(),
            },
        };

        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };

        match Self::parse(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), %err, "invalid config, using defaults");
                Config::default()
            }
        }
    }

    pub fn parse(content: &str) -> crate::error::Result<Self> {
        let mut config = toml::from_str::<Config>(content)?;
        let fallback = Config::default();
        if config.pr_sections.is_empty() {
            config.pr_sections = fallback.pr_sections;
        }
        if config.issue_sections.is_empty() {
            config.issue_sections = fallback.issue_sections;
        }
        if config.notification_sections.is_empty() {
            config.notification_sections = fallback.notification_sections;
        }
        Ok(config)
    }

    pub fn sections_for(&self, view: ViewKind) -> &[SectionConfig] {
        match view {
            ViewKind::Prs => &self.pr_sections,
            ViewKind::Issues => &self.issue_sections,
            ViewKind::Notifications => &self.notification_sections,
            ViewKind::Repo => &[],
        }
    }

    pub fn limit_for(&self, view: ViewKind, section: &SectionConfig) -> u32 {
        section.limit.unwrap_or(match view {
            ViewKind::Prs | ViewKind::Repo => self.defaults.prs_limit,
            ViewKind::Issues => self.defaults.issues_limit,
            ViewKind::Notifications => self.defaults.notifications_limit,
        })
    }

    /// Local clone path for `owner/repo`: exact entry, then `owner/*`, then `:owner/:repo`.
    pub fn repo_local_path(&self, repo_name: &str) -> Option<PathBuf> {
        if let Some(path) = self.repo_paths.get(repo_name) {
            return Some(expand_home(path));
        }

        let (owner, repo) = repo_name.split_once('/')?;
        if repo.contains('/') {
            return None;
        }

        if let Some(wildcard) = self.repo_paths.get(&format!("{}/*", owner)) {
            let base = wildcard.trim_end_matches("/*");
            return Some(expand_home(&format!("{}/{}", base, repo)));
        }

        self.repo_paths.get(":owner/:repo").map(|template| {
            expand_home(&template.replace(":owner", owner).replace(":repo", repo))
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Detect the repository checked out in `dir` from its `origin` remote.
pub fn detect_repo(dir: &Path) -> Option<RepoRef> {
    let output = std::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(dir)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_remote(&url)
}

/// Parse SSH (git@host:owner/repo) or HTTPS (https://host/owner/repo) remote URLs
pub fn parse_remote(url: &str) -> Option<RepoRef> {
    let (host, path) = if let Some(rest) = url.strip_prefix("git@") {
        // SSH: git@host:owner/repo.git
        rest.split_once(':')?
    } else if url.starts_with("https://") || url.starts_with("http://") {
        let without_scheme = url.split("://").nth(1)?;
        without_scheme.split_once('/')?
    } else if url.starts_with("ssh://") {
        // ssh://git@host:port/owner/repo.git
        let without_scheme = url.split("://").nth(1)?;
        let after_at = without_scheme.split('@').next_back()?;
        let (host, path) = after_at.split_once('/')?;
        (host.split(':').next()?, path)
    } else {
        return None;
    };

    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let (owner, name) = path.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }

    Some(RepoRef {
        host: host.to_string(),
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_config() {
        let toml_str = r#"
smart_filtering_at_launch = false
confirm_quit = true

[defaults]
view = "notifications"
prs_limit = 50

[repo_paths]
"dlvhdr/gh-dash" = "/src/gh-dash"

[[pr_sections]]
title = "Mine"
filters = "is:open author:@me"
limit = 10
"#;
        let config = Config::parse(toml_str).unwrap();
        assert!(!config.smart_filtering_at_launch);
        assert!(config.confirm_quit);
        assert_eq!(config.defaults.view, ViewKind::Notifications);
        assert_eq!(config.defaults.prs_limit, 50);
        assert_eq!(config.defaults.issues_limit, 20);
        assert_eq!(config.pr_sections.len(), 1);
        assert_eq!(config.pr_sections[0].limit, Some(10));
        // unspecified lists keep the defaults
        assert_eq!(config.issue_sections.len(), 3);
    }

    #[test]
    fn invalid_config_is_an_error() {
        assert!(Config::parse("defaults = 3").is_err());
    }

    #[test]
    fn missing_config_uses_default() {
        let config = Config::load(Some(Path::new("/nonexistent/gitdash/config.toml")));
        assert!(config.smart_filtering_at_launch);
        assert_eq!(config.pr_sections[0].title, "My Pull Requests");
    }

    #[test]
    fn limit_prefers_section_value() {
        let config = Config::default();
        let section = SectionConfig {
            title: "x".into(),
            filters: String::new(),
            limit: Some(7),
        };
        assert_eq!(config.limit_for(ViewKind::Prs, &section), 7);
        assert_eq!(
            config.limit_for(ViewKind::Issues, &config.issue_sections[0]),
            20
        );
    }

    #[test]
    fn repo_path_exact_match_wins() {
        let mut config = Config::default();
        config
            .repo_paths
            .insert("user/repo".into(), "/path/to/user/repo".into());
        config
            .repo_paths
            .insert("user/*".into(), "/elsewhere/*".into());
        assert_eq!(
            config.repo_local_path("user/repo"),
            Some(PathBuf::from("/path/to/user/repo"))
        );
    }

    #[test]
    fn repo_path_wildcard() {
        let mut config = Config::default();
        config
            .repo_paths
            .insert("user_2/*".into(), "/path/to/user_2/*".into());
        assert_eq!(
            config.repo_local_path("user_2/some_repo"),
            Some(PathBuf::from("/path/to/user_2/some_repo"))
        );
        assert_eq!(config.repo_local_path("user/other_repo"), None);
    }

    #[test]
    fn repo_path_template() {
        let mut config = Config::default();
        config
            .repo_paths
            .insert(":owner/:repo".into(), "/code/:owner/:repo".into());
        assert_eq!(
            config.repo_local_path("acme/widgets"),
            Some(PathBuf::from("/code/acme/widgets"))
        );
        assert_eq!(config.repo_local_path("not-a-repo"), None);
    }

    #[test]
    fn view_cycle_wraps() {
        let mut view = ViewKind::Notifications;
        for _ in 0..4 {
            view = view.next();
        }
        assert_eq!(view, ViewKind::Notifications);
        assert_eq!(ViewKind::Issues.next(), ViewKind::Repo);
    }

    #[test]
    fn parse_remote_ssh() {
        let repo = parse_remote("git@github.com:owner/repo.git").unwrap();
        assert_eq!(repo.host, "github.com");
        assert_eq!(repo.full_name(), "owner/repo");
    }

    #[test]
    fn parse_remote_https() {
        let repo = parse_remote("https://github.com/owner/repo.git").unwrap();
        assert_eq!(repo.full_name(), "owner/repo");
        let repo = parse_remote("https://github.com/owner/repo").unwrap();
        assert_eq!(repo.name, "repo");
    }

    #[test]
    fn parse_remote_ssh_scheme_with_port() {
        let repo = parse_remote("ssh://git@github.example.com:2222/team/project.git").unwrap();
        assert_eq!(repo.host, "github.example.com");
        assert_eq!(repo.full_name(), "team/project");
    }

    #[test]
    fn parse_remote_invalid() {
        assert_eq!(parse_remote("not-a-url"), None);
        assert_eq!(parse_remote("https://github.com/only-owner"), None);
    }
}

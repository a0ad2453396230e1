use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

use crate::error::{DashError, Result};
use crate::types::{Branch, Page, PageInfo, RepoRef};

const BRANCH_FORMAT: &str = "%(HEAD)%00%(refname:short)%00%(committerdate:iso-strict)%00%(contents:subject)%00%(upstream:short)%00%(upstream:track,nobracket)";

/// Run `program args` in `dir`, returning stdout.
pub async fn run_in(dir: &Path, program: &str, args: &[&str]) -> Result<String> {
    debug!(?dir, program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(DashError::Git(if stderr.is_empty() {
            format!("{} {} exited with {}", program, args.join(" "), output.status)
        } else {
            stderr
        }));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// All local branches, current first, then by most recent commit.
pub async fn list_branches(dir: &Path, repo: Option<&RepoRef>) -> Result<Page<Branch>> {
    let format = format!("--format={}", BRANCH_FORMAT);
    let out = run_in(
        dir,
        "git",
        &["for-each-ref", "--sort=-committerdate", &format, "refs/heads"],
    )
    .await?;

    let mut rows = parse_branches(&out, repo);
    sort_branches(&mut rows);
    Ok(Page {
        total_count: rows.len(),
        rows,
        page_info: PageInfo::default(),
    })
}

pub fn sort_branches(rows: &mut [Branch]) {
    rows.sort_by(|a, b| {
        b.is_current
            .cmp(&a.is_current)
            .then_with(|| b.last_commit_at.cmp(&a.last_commit_at))
    });
}

fn parse_track(track: &str) -> (u32, u32) {
    let mut ahead = 0;
    let mut behind = 0;
    for part in track.split(',').map(str::trim) {
        if let Some(n) = part.strip_prefix("ahead ") {
            ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            behind = n.parse().unwrap_or(0);
        }
    }
    (ahead, behind)
}

pub fn parse_branches(output: &str, repo: Option<&RepoRef>) -> Vec<Branch> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\0').collect();
            if fields.len() < 6 {
                return None;
            }
            let name = fields[1].to_string();
            let last_commit_at = DateTime::parse_from_rfc3339(fields[2])
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_default();
            let (ahead, behind) = parse_track(fields[5]);
            let upstream = Some(fields[4]).filter(|u| !u.is_empty()).map(str::to_string);

            Some(Branch {
                repo: repo.map(RepoRef::full_name).unwrap_or_default(),
                url: repo
                    .map(|r| format!("{}/tree/{}", r.web_url(), name))
                    .unwrap_or_default(),
                is_current: fields[0] == "*",
                last_commit_message: fields[3].to_string(),
                last_commit_at,
                upstream,
                ahead,
                behind,
                name,
            })
        })
        .collect()
}

pub async fn checkout(dir: &Path, branch: &str) -> Result<()> {
    run_in(dir, "git", &["checkout", branch]).await.map(|_| ())
}

pub async fn delete_branch(dir: &Path, branch: &str) -> Result<()> {
    run_in(dir, "git", &["branch", "-D", branch]).await.map(|_| ())
}

/// Check out a pull request into the local clone at `dir`.
pub async fn checkout_pr(dir: &Path, repo: &str, number: u64) -> Result<()> {
    let number = number.to_string();
    run_in(dir, "gh", &["pr", "checkout", &number, "-R", repo])
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef {
            host: "github.com".into(),
            owner: "acme".into(),
            name: "widgets".into(),
        }
    }

    #[test]
    fn parses_for_each_ref_output() {
        let out = "*\0main\02024-05-01T10:00:00+00:00\0Initial commit\0origin/main\0\n \0feature/x\02024-05-03T09:30:00+02:00\0Add x\0origin/feature/x\0ahead 2, behind 1\n";
        let branches = parse_branches(out, Some(&repo()));
        assert_eq!(branches.len(), 2);

        let main = &branches[0];
        assert!(main.is_current);
        assert_eq!(main.name, "main");
        assert_eq!(main.upstream.as_deref(), Some("origin/main"));
        assert_eq!((main.ahead, main.behind), (0, 0));
        assert_eq!(main.url, "https://github.com/acme/widgets/tree/main");

        let feature = &branches[1];
        assert!(!feature.is_current);
        assert_eq!((feature.ahead, feature.behind), (2, 1));
        assert_eq!(feature.last_commit_message, "Add x");
        assert_eq!(feature.repo, "acme/widgets");
    }

    #[test]
    fn skips_malformed_lines_and_missing_upstream() {
        let out = "garbage\n \0topic\02024-05-01T10:00:00Z\0wip\0\0gone\n";
        let branches = parse_branches(out, None);
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].upstream, None);
        assert_eq!(branches[0].url, "");
    }

    #[test]
    fn current_branch_sorts_first() {
        let out = " \0new\02024-06-01T00:00:00Z\0n\0\0\n*\0old\02020-01-01T00:00:00Z\0o\0\0\n \0mid\02023-01-01T00:00:00Z\0m\0\0\n";
        let mut branches = parse_branches(out, None);
        sort_branches(&mut branches);
        let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["old", "new", "mid"]);
    }
}

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone};
use git2::{Repository, Sort};

use crate::config::{Config, GitSource};
use crate::models::CommitRecord;

pub const REPORT_NAME: &str = "git-commits";

/// Crawls local mirrors of the configured git repositories for commits
/// authored by tracked users.
pub struct GitCrawler<'a> {
    config: &'a Config,
    repo_root: PathBuf,
}

impl<'a> GitCrawler<'a> {
    pub fn new(config: &'a Config, repo_root: impl Into<PathBuf>) -> Result<Self> {
        let repo_root = repo_root.into();
        std::fs::create_dir_all(&repo_root)
            .with_context(|| format!("failed to create repo root {:?}", repo_root))?;

        Ok(Self { config, repo_root })
    }

    /// Fetch commit records from every configured repository, deduplicated
    /// by hash across repositories and sorted by committer date.
    pub fn fetch(&self) -> Vec<CommitRecord> {
        let mut records = Vec::new();
        let mut seen_hashes = HashSet::new();

        for source in self.config.git_sources() {
            tracing::info!("query commits from git repo \"{}\"", source.name);

            match self.crawl_repo(source, &mut seen_hashes, &mut records) {
                Ok(found) => tracing::info!("- {} commit(s) found", found),
                Err(error) => {
                    tracing::warn!("- skipping repo \"{}\": {:#}", source.name, error)
                }
            }
        }

        records.sort_by_key(|record| record.committer_date);

        records
    }

    fn repo_path(&self, source: &GitSource) -> PathBuf {
        self.repo_root.join(&source.name)
    }

    fn crawl_repo(
        &self,
        source: &GitSource,
        seen_hashes: &mut HashSet<String>,
        records: &mut Vec<CommitRecord>,
    ) -> Result<usize> {
        let repository = match self.open_or_clone(source) {
            Ok(repository) => repository,
            Err(error) => {
                // local copy may be corrupted, delete it and get one more shot
                tracing::warn!("- repo unusable ({:#}), delete entire repo", error);
                let path = self.repo_path(source);
                if path.exists() {
                    std::fs::remove_dir_all(&path)
                        .with_context(|| format!("failed to delete {:?}", path))?;
                }
                self.open_or_clone(source)?
            }
        };

        self.fetch_origin(&repository)?;
        self.collect_commits(&repository, source, seen_hashes, records)
    }

    fn open_or_clone(&self, source: &GitSource) -> Result<Repository> {
        let path = self.repo_path(source);

        if path.is_dir() {
            tracing::info!("- open git repo at {:?}", path);
            Repository::open(&path).with_context(|| format!("failed to open {:?}", path))
        } else {
            tracing::info!("- clone git repo from {}", source.url);
            Repository::clone(&source.url, &path)
                .with_context(|| format!("failed to clone {}", source.url))
        }
    }

    fn fetch_origin(&self, repository: &Repository) -> Result<()> {
        let mut remote = repository
            .find_remote("origin")
            .context("failed to find remote origin")?;

        // empty refspec list means the remote's configured refspecs
        remote
            .fetch(&[] as &[&str], None, None)
            .context("failed to fetch updates")?;

        Ok(())
    }

    fn collect_commits(
        &self,
        repository: &Repository,
        source: &GitSource,
        seen_hashes: &mut HashSet<String>,
        records: &mut Vec<CommitRecord>,
    ) -> Result<usize> {
        let mut revwalk = repository.revwalk()?;

        // Prefer the remote-tracking branch, then a local branch of the same
        // name, then whatever HEAD points at.
        let remote_ref = format!("refs/remotes/origin/{}", source.branch);
        let local_ref = format!("refs/heads/{}", source.branch);

        if let Ok(reference) = repository.find_reference(&remote_ref) {
            let oid = reference.target().context("failed to get branch target")?;
            revwalk.push(oid)?;
        } else if let Ok(reference) = repository.find_reference(&local_ref) {
            let oid = reference.target().context("failed to get branch target")?;
            revwalk.push(oid)?;
        } else {
            tracing::warn!("- branch \"{}\" not found, falling back to HEAD", source.branch);
            revwalk.push_head()?;
        }

        revwalk.set_sorting(Sort::TIME | Sort::REVERSE)?;

        let status = if source.name == "linux" {
            "upstreamed"
        } else {
            // waiting next merge window
            "accepted"
        };

        let mut found = 0;

        for oid in revwalk.flatten() {
            let Ok(commit) = repository.find_commit(oid) else {
                continue;
            };

            let author = commit.author();
            let committer = commit.committer();

            // a commit whose identity fields cannot be read is skipped
            let (Some(author_email), Some(committer_email), Some(subject)) =
                (author.email(), committer.email(), commit.summary())
            else {
                continue;
            };

            if !self.author_is_tracked(author.name().unwrap_or(""), author_email) {
                continue;
            }

            let commit_hash = oid.to_string();

            // already found in another repo sharing history
            if !seen_hashes.insert(commit_hash.clone()) {
                continue;
            }

            let (Some(author_date), Some(committer_date)) = (
                commit_time(author.when()),
                commit_time(committer.when()),
            ) else {
                continue;
            };

            let (user_name, user_function) = match self.config.user_by_email(author_email) {
                Some(user) => (user.name.clone(), user.function.clone()),
                None => {
                    tracing::warn!(
                        "- no tracked user for author <{}>, recording as unknown",
                        author_email
                    );
                    ("unknown".to_string(), "unknown".to_string())
                }
            };

            found += 1;

            records.push(CommitRecord {
                user_name,
                user_function,
                commit_hash,
                author_email: author_email.to_string(),
                author_date,
                committer_email: committer_email.to_string(),
                committer_date,
                subject: subject.to_string(),
                status: status.to_string(),
            });
        }

        Ok(found)
    }

    /// Same matching `git log --author=<alias>` performs: the alias may hit
    /// the author email exactly, or appear inside the email or name.
    fn author_is_tracked(&self, author_name: &str, author_email: &str) -> bool {
        self.config
            .users()
            .iter()
            .flat_map(|user| user.emails.iter())
            .any(|alias| {
                author_email == alias
                    || author_email.contains(alias.as_str())
                    || author_name.contains(alias.as_str())
            })
    }
}

fn commit_time(time: git2::Time) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)?;
    offset.timestamp_opt(time.seconds(), 0).single()
}

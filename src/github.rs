use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::models::{sort_by_date, PullRecord};
use crate::page::{collect_pages, http_client, LinkedPageSource};

pub const REPORT_NAME: &str = "github-pulls";

const API_BASE: &str = "https://api.github.com";

/// Username/token pair passed through to the API.
#[derive(Debug, Clone)]
pub struct GithubAuth {
    pub username: String,
    pub token: String,
}

/// Pull-request list entry, trimmed to the fields we report.
/// https://docs.github.com/en/rest/reference/pulls
#[derive(Debug, Deserialize)]
struct PullSummary {
    number: i64,
    state: String,
    title: String,
    url: String,
    user: PullUser,
    created_at: String,
    updated_at: String,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    merged_at: Option<String>,
    head: RefLabel,
    base: RefLabel,
}

#[derive(Debug, Deserialize)]
struct PullUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RefLabel {
    label: String,
}

/// Diff statistics only present on the per-pull endpoint.
#[derive(Debug, Deserialize)]
struct PullDetail {
    commits: i64,
    additions: i64,
    deletions: i64,
    changed_files: i64,
}

/// Crawls github repositories for pull requests submitted by tracked users.
///
/// The list endpoint has no submitter filter, so every page is fetched and
/// filtered client-side against the tracked github usernames.
pub struct GithubCrawler<'a> {
    config: &'a Config,
    client: Client,
    auth: GithubAuth,
    api_base: String,
}

impl<'a> GithubCrawler<'a> {
    pub fn new(config: &'a Config, auth: GithubAuth) -> Result<Self> {
        Ok(Self {
            config,
            client: http_client()?,
            auth,
            api_base: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_api_base(config: &'a Config, auth: GithubAuth, api_base: &str) -> Result<Self> {
        let mut crawler = Self::new(config, auth)?;
        crawler.api_base = api_base.to_string();
        Ok(crawler)
    }

    /// Fetch pull-request records from every configured repository, sorted
    /// by creation timestamp.
    pub fn fetch(&self) -> Vec<PullRecord> {
        let usernames: Vec<&str> = self
            .config
            .users()
            .iter()
            .filter_map(|user| user.github_username.as_deref())
            .collect();

        let mut records = Vec::new();

        for repo in self.config.github_repos() {
            tracing::info!("query pulls from github repo \"{}\"", repo.name);

            let url = format!(
                "{}/repos/{}/pulls?state=all&per_page=100&direction=asc",
                self.api_base, repo.owner_repo
            );

            let mut source = LinkedPageSource::new(
                &self.client,
                url,
                Some((self.auth.username.clone(), self.auth.token.clone())),
            );

            let (pulls, error) = collect_pages(&mut source);
            if let Some(error) = error {
                // a non-list page is the server reporting rate limiting or
                // an error; give up on this repository, keep the rest
                tracing::warn!("- github error: {:#}", error);
            }

            let checked = pulls.len();
            let mut found = 0;

            for value in pulls {
                match self.pull_to_record(&repo.name, &repo.owner_repo, value, &usernames) {
                    Ok(Some(record)) => {
                        found += 1;
                        records.push(record);
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!("- fail to get pulls from repo: {:#}", error);
                        break;
                    }
                }
            }

            tracing::info!("- {} pull(s) found / total {} pull(s) checked", found, checked);
        }

        sort_by_date(&mut records);

        records
    }

    /// Returns Ok(None) for pulls submitted by untracked users.
    fn pull_to_record(
        &self,
        repo_name: &str,
        owner_repo: &str,
        value: Value,
        usernames: &[&str],
    ) -> Result<Option<PullRecord>> {
        let pull: PullSummary =
            serde_json::from_value(value).context("entry is not a pull request")?;

        if !usernames.contains(&pull.user.login.as_str()) {
            return Ok(None);
        }

        let (user_name, user_function) = match self.config.user_by_github(&pull.user.login) {
            Some(user) => (user.name.clone(), user.function.clone()),
            None => {
                tracing::warn!(
                    "- no tracked user for login \"{}\", recording as unknown",
                    pull.user.login
                );
                ("unknown".to_string(), "unknown".to_string())
            }
        };

        let detail: PullDetail = self
            .client
            .get(&pull.url)
            .basic_auth(&self.auth.username, Some(&self.auth.token))
            .send()
            .with_context(|| format!("request to {} failed", pull.url))?
            .json()
            .with_context(|| format!("invalid JSON from {}", pull.url))?;

        Ok(Some(PullRecord {
            user_name,
            user_function,
            repo_name: repo_name.to_string(),
            repo_url: format!("github.com/{}", owner_repo),
            number: pull.number,
            state: pull.state,
            title: pull.title,
            user: pull.user.login,
            created_at: pull.created_at,
            updated_at: pull.updated_at,
            closed_at: pull.closed_at.unwrap_or_default(),
            merged_at: pull.merged_at.unwrap_or_default(),
            head: pull.head.label,
            base: pull.base.label,
            commits: detail.commits,
            additions: detail.additions,
            deletions: detail.deletions,
            changed_files: detail.changed_files,
        }))
    }
}

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::{Config, RestServer, TrackedUser};
use crate::models::{sort_by_date, ChangeRecord};
use crate::page::{collect_pages, ensure_scheme, http_client, Page, PageSource};

pub const REPORT_NAME: &str = "gerrit-changes";

/// ChangeInfo, trimmed to the fields we report.
/// https://gerrit-review.googlesource.com/Documentation/rest-api-changes.html#change-info
#[derive(Debug, Deserialize)]
struct ChangeInfo {
    project: String,
    branch: String,
    change_id: String,
    subject: String,
    status: String,
    created: String,
    updated: String,
    // optional, and not every merged change has this field set
    #[serde(default)]
    submitted: String,
    #[serde(default)]
    insertions: i64,
    #[serde(default)]
    deletions: i64,
    #[serde(rename = "_more_changes", default)]
    more_changes: bool,
}

/// Offset-based page source over one server's change-search endpoint,
/// filtered by owner email. The server marks the last change of a page
/// with `_more_changes` while further results exist.
struct ChangeQuery<'a> {
    client: &'a Client,
    server: &'a RestServer,
    email: &'a str,
    start: usize,
}

impl PageSource for ChangeQuery<'_> {
    type Item = ChangeInfo;

    fn next_page(&mut self) -> Result<Page<ChangeInfo>> {
        let url = format!(
            "{}/changes/?q=owner:{}&start={}",
            ensure_scheme(&self.server.url),
            self.email,
            self.start
        );

        let body = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("request to {} failed", url))?
            .text()
            .with_context(|| format!("failed to read response from {}", url))?;

        let changes: Vec<ChangeInfo> = serde_json::from_str(strip_xssi_prefix(&body))
            .with_context(|| format!("invalid JSON from {}", url))?;

        tracing::info!("- {} change(s) found", changes.len());

        let has_more = changes.last().is_some_and(|change| change.more_changes);
        self.start += changes.len();

        Ok(Page {
            items: changes,
            has_more,
        })
    }
}

/// gerrit prefixes JSON responses with a cross-site-script-inclusion guard
/// that must go before parsing.
fn strip_xssi_prefix(body: &str) -> &str {
    body.strip_prefix(")]}'").unwrap_or(body)
}

/// Crawls gerrit servers for changes owned by tracked users.
pub struct GerritCrawler<'a> {
    config: &'a Config,
    client: Client,
}

impl<'a> GerritCrawler<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    /// Fetch change records from every configured server, sorted by
    /// creation timestamp.
    pub fn fetch(&self) -> Vec<ChangeRecord> {
        let mut records = Vec::new();

        for server in self.config.gerrit_servers() {
            tracing::info!("query changes from gerrit server \"{}\"", server.name);

            for user in self.config.users() {
                for email in &user.emails {
                    tracing::info!("query changes for \"{} <{}>\"", user.name, email);

                    let mut query = ChangeQuery {
                        client: &self.client,
                        server,
                        email,
                        start: 0,
                    };

                    let (changes, error) = collect_pages(&mut query);
                    if let Some(error) = error {
                        // keep the pages gathered so far, move to the next alias
                        tracing::warn!("- gerrit error: {:#}", error);
                    }

                    for change in changes {
                        records.push(to_record(user, server, email, change));
                    }
                }
            }
        }

        sort_by_date(&mut records);

        records
    }
}

fn to_record(
    user: &TrackedUser,
    server: &RestServer,
    email: &str,
    change: ChangeInfo,
) -> ChangeRecord {
    ChangeRecord {
        user_name: user.name.clone(),
        user_function: user.function.clone(),
        repo_name: server.name.clone(),
        repo_url: server.url.clone(),
        project: change.project,
        branch: change.branch,
        change_id: change.change_id,
        subject: change.subject,
        status: change.status,
        created: change.created,
        updated: change.updated,
        submitted: change.submitted,
        insertions: change.insertions,
        deletions: change.deletions,
        owner: email.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testserver::{serve, Response};
    use std::io::Write;

    const PAGE: &str = r#")]}'
[
  {
    "project": "chromiumos/platform/ec",
    "branch": "main",
    "change_id": "I0123456789abcdef",
    "subject": "ec: fix charger state machine",
    "status": "MERGED",
    "created": "2021-11-02 07:16:18.000000000",
    "updated": "2021-11-03 09:00:00.000000000",
    "insertions": 12,
    "deletions": 4,
    "_more_changes": true
  }
]"#;

    #[test]
    fn parses_guarded_change_page() {
        let changes: Vec<ChangeInfo> =
            serde_json::from_str(strip_xssi_prefix(PAGE)).unwrap();

        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.project, "chromiumos/platform/ec");
        assert_eq!(change.created, "2021-11-02 07:16:18.000000000");
        // absent submitted timestamp defaults to empty
        assert_eq!(change.submitted, "");
        assert!(change.more_changes);
    }

    #[test]
    fn unguarded_body_parses_too() {
        let body = r#"[{"project":"p","branch":"b","change_id":"c","subject":"s",
                       "status":"NEW","created":"2020-01-01 00:00:00.000000000",
                       "updated":"2020-01-02 00:00:00.000000000"}]"#;
        let changes: Vec<ChangeInfo> = serde_json::from_str(strip_xssi_prefix(body)).unwrap();

        assert_eq!(changes.len(), 1);
        assert!(!changes[0].more_changes);
        assert_eq!(changes[0].insertions, 0);
    }

    fn change_body(subject: &str, created: &str, more: bool) -> String {
        format!(
            r#")]}}'
[{{"project": "p", "branch": "main", "change_id": "I{subject}", "subject": "{subject}",
   "status": "MERGED", "created": "{created}", "updated": "{created}",
   "insertions": 1, "deletions": 1, "_more_changes": {more}}}]"#
        )
    }

    #[test]
    fn pages_by_offset_until_more_changes_clears() {
        // alias one takes two pages, alias two none
        let base = serve(vec![
            Response::json(&change_body("second", "2021-02-01 00:00:00.000000000", true)),
            Response::json(&change_body("first", "2021-01-01 00:00:00.000000000", false)),
            Response::json(")]}'\n[]"),
        ]);

        let content = format!(
            "[user alice]\n\
             disable = false\n\
             name = alice\n\
             email1 = a1@x.com\n\
             email2 = a2@x.com\n\
             function = kernel\n\n\
             [gerrit review]\n\
             disable = false\n\
             name = review\n\
             url = {base}\n"
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();

        let crawler = GerritCrawler::new(&config).unwrap();
        let records = crawler.fetch();

        assert_eq!(records.len(), 2);
        // sorted ascending by creation timestamp
        assert_eq!(records[0].subject, "first");
        assert_eq!(records[1].subject, "second");
        assert_eq!(records[0].owner, "a1@x.com");
        assert_eq!(records[0].repo_name, "review");
    }
}

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::models::{sort_by_date, PatchRecord};
use crate::page::{collect_pages, ensure_scheme, http_client, LinkedPageSource};

pub const REPORT_NAME: &str = "patchwork-patches";

/// Patch entry, trimmed to the fields we report.
/// https://patchwork.readthedocs.io/en/latest/api/rest/schemas/v1.2/
#[derive(Debug, Deserialize)]
struct PatchInfo {
    project: PatchProject,
    date: String,
    name: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct PatchProject {
    name: String,
}

/// Crawls patchwork servers for patches submitted by tracked users.
pub struct PatchworkCrawler<'a> {
    config: &'a Config,
    client: Client,
}

impl<'a> PatchworkCrawler<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    /// Fetch patch records from every configured server, sorted by the
    /// patch date.
    pub fn fetch(&self) -> Vec<PatchRecord> {
        let mut records = Vec::new();

        for server in self.config.patchwork_servers() {
            tracing::info!("query patches from patchwork server \"{}\"", server.name);

            for user in self.config.users() {
                for email in &user.emails {
                    tracing::info!("query patches for \"{} <{}>\"", user.name, email);

                    let url = format!(
                        "{}/api/1.2/patches?submitter={}",
                        ensure_scheme(&server.url),
                        email
                    );

                    let mut source = LinkedPageSource::new(&self.client, url, None);

                    let (patches, error) = collect_pages(&mut source);
                    if let Some(error) = error {
                        tracing::warn!("- patchwork error: {:#}", error);
                    }

                    tracing::info!("- {} patch(es) found", patches.len());

                    for value in patches {
                        let patch: PatchInfo = match serde_json::from_value(value)
                            .context("entry is not a patch")
                        {
                            Ok(patch) => patch,
                            Err(error) => {
                                tracing::warn!("- fail to get patches from server: {:#}", error);
                                break;
                            }
                        };

                        records.push(PatchRecord {
                            user_name: user.name.clone(),
                            user_function: user.function.clone(),
                            repo_name: server.name.clone(),
                            repo_url: server.url.clone(),
                            project: patch.project.name,
                            date: patch.date,
                            name: patch.name,
                            state: patch.state,
                            submitter: email.clone(),
                        });
                    }
                }
            }
        }

        sort_by_date(&mut records);

        records
    }
}

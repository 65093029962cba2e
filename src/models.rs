use chrono::{DateTime, FixedOffset};

/// Uniform view the exporters need over every per-platform record shape.
///
/// `FIELDS` is the header row, `values` the matching data row, and
/// `date_value` the designated date field used for ordering and for the
/// per-year spreadsheet grouping (the year is the leading `-`-separated
/// segment of the value).
pub trait ReportRecord {
    const FIELDS: &'static [&'static str];

    fn values(&self) -> Vec<String>;
    fn date_value(&self) -> String;
    fn user_name(&self) -> &str;
}

/// Sort records ascending by their designated date field.
pub fn sort_by_date<T: ReportRecord>(records: &mut [T]) {
    records.sort_by_key(|record| record.date_value());
}

/// One commit authored by a tracked user, found in a mirrored git repository.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub user_name: String,
    pub user_function: String,
    pub commit_hash: String,
    pub author_email: String,
    pub author_date: DateTime<FixedOffset>,
    pub committer_email: String,
    pub committer_date: DateTime<FixedOffset>,
    pub subject: String,
    pub status: String,
}

impl ReportRecord for CommitRecord {
    const FIELDS: &'static [&'static str] = &[
        "user_name",
        "user_function",
        "commit_hash",
        "author_email",
        "author_date",
        "committer_email",
        "committer_date",
        "subject",
        "status",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.user_name.clone(),
            self.user_function.clone(),
            self.commit_hash.clone(),
            self.author_email.clone(),
            self.author_date.to_rfc3339(),
            self.committer_email.clone(),
            self.committer_date.to_rfc3339(),
            self.subject.clone(),
            self.status.clone(),
        ]
    }

    fn date_value(&self) -> String {
        self.committer_date.to_rfc3339()
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }
}

/// One gerrit change owned by a tracked user.
///
/// Timestamps keep the server's `YYYY-MM-DD hh:mm:ss.nnnnnnnnn` form, which
/// orders lexicographically.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub user_name: String,
    pub user_function: String,
    pub repo_name: String,
    pub repo_url: String,
    pub project: String,
    pub branch: String,
    pub change_id: String,
    pub subject: String,
    pub status: String,
    pub created: String,
    pub updated: String,
    pub submitted: String,
    pub insertions: i64,
    pub deletions: i64,
    pub owner: String,
}

impl ReportRecord for ChangeRecord {
    const FIELDS: &'static [&'static str] = &[
        "user_name",
        "user_function",
        "repo_name",
        "repo_url",
        "project",
        "branch",
        "change_id",
        "subject",
        "status",
        "created",
        "updated",
        "submitted",
        "insertions",
        "deletions",
        "owner",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.user_name.clone(),
            self.user_function.clone(),
            self.repo_name.clone(),
            self.repo_url.clone(),
            self.project.clone(),
            self.branch.clone(),
            self.change_id.clone(),
            self.subject.clone(),
            self.status.clone(),
            self.created.clone(),
            self.updated.clone(),
            self.submitted.clone(),
            self.insertions.to_string(),
            self.deletions.to_string(),
            self.owner.clone(),
        ]
    }

    fn date_value(&self) -> String {
        self.created.clone()
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }
}

/// One pull request submitted by a tracked user to a github repository.
#[derive(Debug, Clone)]
pub struct PullRecord {
    pub user_name: String,
    pub user_function: String,
    pub repo_name: String,
    pub repo_url: String,
    pub number: i64,
    pub state: String,
    pub title: String,
    pub user: String,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: String,
    pub merged_at: String,
    pub head: String,
    pub base: String,
    pub commits: i64,
    pub additions: i64,
    pub deletions: i64,
    pub changed_files: i64,
}

impl ReportRecord for PullRecord {
    const FIELDS: &'static [&'static str] = &[
        "user_name",
        "user_function",
        "repo_name",
        "repo_url",
        "number",
        "state",
        "title",
        "user",
        "created_at",
        "updated_at",
        "closed_at",
        "merged_at",
        "head",
        "base",
        "commits",
        "additions",
        "deletions",
        "changed_files",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.user_name.clone(),
            self.user_function.clone(),
            self.repo_name.clone(),
            self.repo_url.clone(),
            self.number.to_string(),
            self.state.clone(),
            self.title.clone(),
            self.user.clone(),
            self.created_at.clone(),
            self.updated_at.clone(),
            self.closed_at.clone(),
            self.merged_at.clone(),
            self.head.clone(),
            self.base.clone(),
            self.commits.to_string(),
            self.additions.to_string(),
            self.deletions.to_string(),
            self.changed_files.to_string(),
        ]
    }

    fn date_value(&self) -> String {
        self.created_at.clone()
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }
}

/// One mailing-list patch submitted by a tracked user.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    pub user_name: String,
    pub user_function: String,
    pub repo_name: String,
    pub repo_url: String,
    pub project: String,
    pub date: String,
    pub name: String,
    pub state: String,
    pub submitter: String,
}

impl ReportRecord for PatchRecord {
    const FIELDS: &'static [&'static str] = &[
        "user_name",
        "user_function",
        "repo_name",
        "repo_url",
        "project",
        "date",
        "name",
        "state",
        "submitter",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.user_name.clone(),
            self.user_function.clone(),
            self.repo_name.clone(),
            self.repo_url.clone(),
            self.project.clone(),
            self.date.clone(),
            self.name.clone(),
            self.state.clone(),
            self.submitter.clone(),
        ]
    }

    fn date_value(&self) -> String {
        self.date.clone()
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(name: &str, date: &str) -> PatchRecord {
        PatchRecord {
            user_name: "Alice".to_string(),
            user_function: "kernel".to_string(),
            repo_name: "lore".to_string(),
            repo_url: "patchwork.example.com".to_string(),
            project: "netdev".to_string(),
            date: date.to_string(),
            name: name.to_string(),
            state: "accepted".to_string(),
            submitter: "a1@x.com".to_string(),
        }
    }

    #[test]
    fn values_line_up_with_field_list() {
        let record = patch("patch", "2021-04-24T11:15:52");
        assert_eq!(record.values().len(), PatchRecord::FIELDS.len());
        assert_eq!(PatchRecord::FIELDS[4], "project");
        assert_eq!(record.values()[4], "netdev");
    }

    #[test]
    fn sort_by_date_is_non_decreasing() {
        let mut records = vec![
            patch("c", "2021-01-01T00:00:00"),
            patch("a", "2019-05-05T00:00:00"),
            patch("b", "2020-12-31T23:59:59"),
        ];
        sort_by_date(&mut records);

        let dates: Vec<String> = records.iter().map(|r| r.date_value()).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(records[0].name, "a");
    }
}

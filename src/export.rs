use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::config::TrackedUser;
use crate::models::ReportRecord;

/// Write the records as delimited text: one header row, one row per record
/// in the given order. Returns whether any data rows were written.
pub fn export_csv<T: ReportRecord>(
    directory: &Path,
    report_name: &str,
    records: &[T],
) -> Result<bool> {
    let path = directory.join(format!("{}.csv", report_name));
    tracing::info!("export data to {}", path.display());

    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("failed to create {:?}", path))?;

    writer.write_record(T::FIELDS)?;
    for record in records {
        writer.write_record(record.values())?;
    }
    writer.flush()?;

    tracing::info!("- {} row(s) saved", records.len());

    Ok(!records.is_empty())
}

/// Write the records as a workbook: a per-user/per-year summary sheet, an
/// "all" sheet, one sheet per year in first-seen (chronological) order, and
/// one sheet per tracked user.
///
/// Known limitation: sheet names are sanitized against the format's
/// character and length rules, but collisions between year, user, and
/// reserved names are not guarded against and fail the export.
pub fn export_xlsx<T: ReportRecord>(
    directory: &Path,
    report_name: &str,
    users: &[TrackedUser],
    records: &[T],
) -> Result<()> {
    let path = directory.join(format!("{}.xlsx", report_name));
    tracing::info!("export data to {}", path.display());

    let mut workbook = Workbook::new();

    workbook.push_worksheet(summary_sheet(report_name, users, records)?);

    workbook.push_worksheet(table_sheet::<T>("all", records.iter())?);
    tracing::info!("- sheet \"all\" added");

    for (year, group) in group_by_year(records) {
        workbook.push_worksheet(table_sheet::<T>(&year, group.into_iter())?);
        tracing::info!("- sheet \"{}\" added", year);
    }

    for user in users {
        let group = records.iter().filter(|r| r.user_name() == user.name);
        workbook.push_worksheet(table_sheet::<T>(&user.name, group)?);
        tracing::info!("- sheet \"{}\" added", user.name);
    }

    workbook
        .save(&path)
        .with_context(|| format!("failed to save {:?}", path))?;

    Ok(())
}

/// Year is the leading dash-separated segment of the designated date field.
fn year_of(date: &str) -> String {
    date.split('-').next().unwrap_or("").to_string()
}

/// Group records by year, years in first-seen order. For date-sorted input
/// first-seen order is chronological, but lookup is by name: commit dates
/// keep their author's UTC offset, so the year prefix may step backwards
/// around a year boundary and a year must never produce two groups.
fn group_by_year<T: ReportRecord>(records: &[T]) -> Vec<(String, Vec<&T>)> {
    let mut groups: Vec<(String, Vec<&T>)> = Vec::new();

    for record in records {
        let year = year_of(&record.date_value());
        match groups.iter_mut().find(|(existing, _)| *existing == year) {
            Some((_, group)) => group.push(record),
            None => groups.push((year, vec![record])),
        }
    }

    groups
}

/// Per-user record counts, one column per year in first-seen order.
fn year_counts<T: ReportRecord>(
    users: &[TrackedUser],
    records: &[T],
) -> (Vec<String>, HashMap<String, Vec<u64>>) {
    let mut years: Vec<String> = Vec::new();
    let mut counts: HashMap<String, Vec<u64>> = users
        .iter()
        .map(|user| (user.name.clone(), Vec::new()))
        .collect();

    for record in records {
        let year = year_of(&record.date_value());

        let idx = match years.iter().position(|y| *y == year) {
            Some(idx) => idx,
            None => {
                years.push(year);
                for column in counts.values_mut() {
                    column.push(0);
                }
                years.len() - 1
            }
        };

        // records attributed to an untracked (unknown) user are not counted
        if let Some(column) = counts.get_mut(record.user_name()) {
            column[idx] += 1;
        }
    }

    (years, counts)
}

fn summary_sheet<T: ReportRecord>(
    report_name: &str,
    users: &[TrackedUser],
    records: &[T],
) -> Result<Worksheet> {
    let (years, counts) = year_counts(users, records);

    let mut sheet = Worksheet::new();
    sheet.set_name("summary")?;

    let timestamp = chrono::Local::now().format("%Y-%m%d");
    sheet.write_string(0, 0, format!("summary of {} ({})", report_name, timestamp))?;

    for (idx, year) in years.iter().enumerate() {
        sheet.write_string(1, idx as u16 + 1, year)?;
    }

    for (row, user) in users.iter().enumerate() {
        let row = row as u32 + 2;
        sheet.write_string(row, 0, &user.name)?;

        if let Some(column) = counts.get(&user.name) {
            for (idx, count) in column.iter().enumerate() {
                sheet.write_string(row, idx as u16 + 1, count.to_string())?;
            }
        }
    }

    Ok(sheet)
}

fn table_sheet<'a, T: ReportRecord + 'a>(
    name: &str,
    records: impl Iterator<Item = &'a T>,
) -> Result<Worksheet> {
    let mut sheet = Worksheet::new();
    sheet.set_name(sanitize_sheet_name(name))?;

    for (col, field) in T::FIELDS.iter().enumerate() {
        sheet.write_string(0, col as u16, *field)?;
    }

    for (row, record) in records.enumerate() {
        for (col, value) in record.values().into_iter().enumerate() {
            sheet.write_string(row as u32 + 1, col as u16, value)?;
        }
    }

    Ok(sheet)
}

/// Strip the characters the xlsx format forbids in sheet names and honor
/// its 31-character limit.
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();

    if cleaned.is_empty() {
        "sheet".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatchRecord;

    fn patch(user: &str, date: &str) -> PatchRecord {
        PatchRecord {
            user_name: user.to_string(),
            user_function: "kernel".to_string(),
            repo_name: "lore".to_string(),
            repo_url: "patchwork.example.com".to_string(),
            project: "netdev".to_string(),
            date: date.to_string(),
            name: "a patch".to_string(),
            state: "accepted".to_string(),
            submitter: "a1@x.com".to_string(),
        }
    }

    fn tracked(name: &str) -> TrackedUser {
        TrackedUser {
            name: name.to_string(),
            emails: ["a1@x.com".to_string(), "a2@x.com".to_string()],
            function: "kernel".to_string(),
            github_username: None,
        }
    }

    #[test]
    fn csv_round_trips_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            patch("alice", "2019-01-01T00:00:00"),
            patch("bob", "2020-06-15T12:00:00"),
        ];

        let wrote = export_csv(dir.path(), "patchwork-patches", &records).unwrap();
        assert!(wrote);

        let mut reader =
            csv::Reader::from_path(dir.path().join("patchwork-patches.csv")).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            PatchRecord::FIELDS
        );

        let rows: Vec<csv::StringRecord> =
            reader.records().map(|row| row.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        for (row, record) in rows.iter().zip(&records) {
            let values: Vec<&str> = row.iter().collect();
            assert_eq!(values, record.values());
        }
    }

    #[test]
    fn empty_export_reports_no_rows_written() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<PatchRecord> = Vec::new();
        assert!(!export_csv(dir.path(), "patchwork-patches", &records).unwrap());
    }

    #[test]
    fn years_are_grouped_in_first_seen_order() {
        let records = vec![
            patch("alice", "2019-03-01T00:00:00"),
            patch("alice", "2019-07-01T00:00:00"),
            patch("bob", "2021-01-01T00:00:00"),
        ];

        let groups = group_by_year(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "2019");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "2021");
    }

    #[test]
    fn interleaved_years_fold_into_one_group_per_year() {
        // instant-sorted commit dates can step back across a year boundary
        // when offsets are mixed
        let records = vec![
            patch("alice", "2021-01-01T00:10:00+02:00"),
            patch("bob", "2020-12-31T23:50:00-01:00"),
            patch("alice", "2021-01-01T01:00:00+00:00"),
        ];

        let groups = group_by_year(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "2021");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "2020");
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn workbook_accepts_interleaved_years() {
        let dir = tempfile::tempdir().unwrap();
        let users = vec![tracked("alice"), tracked("bob")];
        let records = vec![
            patch("alice", "2021-01-01T00:10:00+02:00"),
            patch("bob", "2020-12-31T23:50:00-01:00"),
            patch("alice", "2021-01-01T01:00:00+00:00"),
        ];

        export_xlsx(dir.path(), "git-commits", &users, &records).unwrap();

        let metadata = std::fs::metadata(dir.path().join("git-commits.xlsx")).unwrap();
        assert!(metadata.len() > 0);
    }

    #[test]
    fn summary_counts_records_per_user_per_year() {
        let users = vec![tracked("alice"), tracked("bob")];
        let records = vec![
            patch("alice", "2019-03-01T00:00:00"),
            patch("alice", "2019-07-01T00:00:00"),
            patch("bob", "2021-01-01T00:00:00"),
            patch("unknown", "2021-02-01T00:00:00"),
        ];

        let (years, counts) = year_counts(&users, &records);
        assert_eq!(years, vec!["2019".to_string(), "2021".to_string()]);
        assert_eq!(counts["alice"], vec![2, 0]);
        assert_eq!(counts["bob"], vec![0, 1]);
    }

    #[test]
    fn workbook_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let users = vec![tracked("alice")];
        let records = vec![
            patch("alice", "2019-01-01T00:00:00"),
            patch("alice", "2020-01-01T00:00:00"),
        ];

        export_xlsx(dir.path(), "patchwork-patches", &users, &records).unwrap();

        let metadata = std::fs::metadata(dir.path().join("patchwork-patches.xlsx")).unwrap();
        assert!(metadata.len() > 0);
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sanitize_sheet_name("2021"), "2021");
        assert_eq!(sanitize_sheet_name("a/b:c"), "abc");
        assert_eq!(
            sanitize_sheet_name("a very long worksheet name that keeps going"),
            "a very long worksheet name that"
        );
        assert_eq!(sanitize_sheet_name("///"), "sheet");
    }
}

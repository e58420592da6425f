// src/extract/table.rs
//! Table strategy: one candidate per labelled row, per labelled column
//! when the plan names sit in the header row, or a single candidate when
//! one plan heads a table of unlabelled dated rows.

use scraper::{Html, Selector};

use super::labels::classify_label;
use super::text::{element_text, mentions_application, mentions_notification};
use super::{Candidate, ExtractOptions};
use crate::dates::find_dates;
use crate::model::ExtractionMethod;

pub fn extract_tables(doc: &Html, _opts: &ExtractOptions) -> Option<Vec<Candidate>> {
    let table_sel = Selector::parse("table").ok()?;
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("th, td").ok()?;

    let mut out = Vec::new();
    for table in doc.select(&table_sel) {
        let rows: Vec<Vec<String>> = table
            .select(&row_sel)
            .map(|tr| tr.select(&cell_sel).map(|c| element_text(&c)).collect::<Vec<_>>())
            .filter(|cells: &Vec<String>| cells.iter().any(|c| !c.is_empty()))
            .collect();
        if rows.is_empty() {
            continue;
        }

        let header_labels = rows[0].iter().filter(|c| classify_label(c).is_some()).count();
        let first_has_dates = rows[0].iter().any(|c| !find_dates(c).is_empty());

        let body_labelled = rows[1..]
            .iter()
            .any(|r| r.iter().any(|c| classify_label(c).is_some()));

        if header_labels >= 2 && !first_has_dates {
            out.extend(columns_as_plans(&rows));
        } else if header_labels == 1 && !first_has_dates && !body_labelled {
            out.extend(single_plan(&rows));
        } else if first_has_dates {
            out.extend(rows_as_plans(None, &rows));
        } else {
            out.extend(rows_as_plans(Some(&rows[0]), &rows[1..]));
        }
    }
    Some(out)
}

/// (application column, notification column) named by the header, if any.
fn header_columns(header: &[String]) -> (Option<usize>, Option<usize>) {
    let notif = header.iter().position(|h| mentions_notification(h));
    let app = header
        .iter()
        .position(|h| mentions_application(h) && !mentions_notification(h));
    (app, notif)
}

fn rows_as_plans(header: Option<&Vec<String>>, body: &[Vec<String>]) -> Vec<Candidate> {
    let (app_col, notif_col) = header.map(|h| header_columns(h)).unwrap_or((None, None));
    let mut out = Vec::new();

    for row in body {
        let Some((label_idx, deadline_type)) = row
            .iter()
            .enumerate()
            .find_map(|(i, c)| classify_label(c).map(|t| (i, t)))
        else {
            continue;
        };

        // first date inside each non-label cell
        let dated: Vec<(usize, String)> = row
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .filter_map(|(i, c)| find_dates(c).into_iter().next().map(|s| (i, s.text)))
            .collect();
        if dated.is_empty() {
            continue;
        }

        let at = |col: Option<usize>| col.and_then(|c| dated.iter().find(|(i, _)| *i == c));
        let Some((app_idx, app)) = at(app_col)
            .or_else(|| dated.iter().find(|(i, _)| Some(*i) != notif_col))
            .cloned()
        else {
            continue;
        };
        let notification = match notif_col {
            Some(_) => at(notif_col).map(|(_, t)| t.clone()),
            None => dated
                .iter()
                .find(|(i, _)| *i != app_idx)
                .map(|(_, t)| t.clone()),
        };

        out.push(Candidate {
            raw_label: row[label_idx].clone(),
            deadline_type,
            application_date: app,
            notification_date: notification,
            method: ExtractionMethod::Table,
        });
    }
    out
}

/// Transposed layout: plan names across the header, dates below.
fn columns_as_plans(rows: &[Vec<String>]) -> Vec<Candidate> {
    let header = &rows[0];
    let mut out = Vec::new();

    for (col, label) in header.iter().enumerate() {
        let Some(deadline_type) = classify_label(label) else {
            continue;
        };
        let mut application = None;
        let mut notification = None;
        for row in &rows[1..] {
            let Some(cell) = row.get(col) else { continue };
            let Some(date) = find_dates(cell).into_iter().next() else {
                continue;
            };
            let row_label = row.first().map(String::as_str).unwrap_or_default();
            if mentions_notification(row_label) {
                notification.get_or_insert(date.text);
            } else {
                application.get_or_insert(date.text);
            }
        }
        if let Some(application_date) = application {
            out.push(Candidate {
                raw_label: label.clone(),
                deadline_type,
                application_date,
                notification_date: notification,
                method: ExtractionMethod::Table,
            });
        }
    }
    out
}

/// One plan named in the header; each body row is an application or
/// notification date described by its undated cells.
fn single_plan(rows: &[Vec<String>]) -> Option<Candidate> {
    let (label, deadline_type) = rows[0]
        .iter()
        .find_map(|c| classify_label(c).map(|t| (c.clone(), t)))?;
    let mut application = None;
    let mut notification = None;

    for row in &rows[1..] {
        let Some(date) = row.iter().find_map(|c| find_dates(c).into_iter().next()) else {
            continue;
        };
        let description: Vec<&str> = row
            .iter()
            .filter(|c| find_dates(c).is_empty())
            .map(String::as_str)
            .collect();
        if mentions_notification(&description.join(" ")) {
            notification.get_or_insert(date.text);
        } else {
            application.get_or_insert(date.text);
        }
    }

    Some(Candidate {
        raw_label: label,
        deadline_type,
        application_date: application?,
        notification_date: notification,
        method: ExtractionMethod::Table,
    })
}

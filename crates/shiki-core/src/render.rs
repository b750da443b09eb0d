use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::Local;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::model::{Category, Event, FileRecord, Task};
use crate::stores::events::{CalendarEntry, EntryKind};

/// Prints entity snapshots as aligned text tables. Rendering is idempotent
/// and side-effect-free apart from terminal output, so it is safe to invoke
/// redundantly from every cache-update callback.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn print_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let rows = categories
            .iter()
            .map(|category| vec![category.id.to_string(), category.name.clone()])
            .collect();
        write_table(&mut out, &["ID", "Name"], rows)?;
        Ok(())
    }

    pub fn print_files(&self, records: &[FileRecord]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if records.is_empty() {
            writeln!(out, "no files")?;
            return Ok(());
        }

        let rows = records
            .iter()
            .map(|record| {
                vec![
                    record.category_name.clone(),
                    format!("{} {}", icon_for_name(&record.name), record.name),
                    format!("v{}", record.version),
                    record
                        .date
                        .with_timezone(&Local)
                        .format("%Y-%m-%d")
                        .to_string(),
                    format!("{}B", record.size),
                    record.mime_type.clone(),
                ]
            })
            .collect();
        write_table(
            &mut out,
            &["Category", "Name", "Ver", "Updated", "Size", "Type"],
            rows,
        )?;
        Ok(())
    }

    pub fn print_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let today = Local::now().date_naive();
        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let state = if task.completed { "[x]" } else { "[ ]" };

            let due = task
                .date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let due = match task.date {
                Some(date) if !task.completed && date < today => self.paint(&due, "31"),
                _ => due,
            };

            rows.push(vec![
                self.paint(task.id.as_str(), "33"),
                state.to_string(),
                due,
                task.priority.to_string(),
                task.category.clone(),
                task.text.clone(),
            ]);
        }

        write_table(
            &mut out,
            &["ID", "Done", "Due", "Pri", "Category", "Text"],
            rows,
        )?;
        Ok(())
    }

    pub fn print_events(&self, events: &[Event]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let rows = events
            .iter()
            .map(|event| {
                let start = if event.all_day {
                    event
                        .start
                        .with_timezone(&Local)
                        .format("%Y-%m-%d (all day)")
                        .to_string()
                } else {
                    event
                        .start
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                };
                let end = event
                    .end
                    .map(|end| end.with_timezone(&Local).format("%H:%M").to_string())
                    .unwrap_or_default();
                vec![
                    self.paint(event.id.as_str(), "33"),
                    event.title.clone(),
                    start,
                    end,
                    event.location.clone(),
                    event.event_type.clone(),
                ]
            })
            .collect();
        write_table(
            &mut out,
            &["ID", "Title", "Start", "End", "Location", "Type"],
            rows,
        )?;
        Ok(())
    }

    pub fn print_calendar(&self, entries: &[CalendarEntry]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let rows = entries
            .iter()
            .map(|entry| {
                let when = if entry.all_day {
                    entry
                        .start
                        .with_timezone(&Local)
                        .format("%Y-%m-%d")
                        .to_string()
                } else {
                    entry
                        .start
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string()
                };
                let kind = match entry.kind {
                    EntryKind::Scheduled => "event",
                    EntryKind::TaskDeadline => "task",
                };
                let title = match entry.color {
                    Some("#dc3545") => self.paint(&entry.title, "31"),
                    Some("#ffc107") => self.paint(&entry.title, "33"),
                    Some("#28a745") => self.paint(&entry.title, "32"),
                    _ => entry.title.clone(),
                };
                vec![when, kind.to_string(), title]
            })
            .collect();
        write_table(&mut out, &["When", "Kind", "Title"], rows)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn icon_for_name(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "📄",
        "doc" | "docx" => "📝",
        "xls" | "xlsx" => "📊",
        "ppt" | "pptx" => "📺",
        _ => "📎",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

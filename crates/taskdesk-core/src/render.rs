use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_display;
use crate::org::{Department, User};
use crate::status::{BadgeVariant, classify_for_display, log_on_time};
use crate::task::Task;

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

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Title".to_string(),
            "Deadline".to_string(),
            "Status".to_string(),
            "Assigned To".to_string(),
            "Department".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let class = classify_for_display(&task.status);

            let id = short_id(task);
            let deadline = format_display(task.deadline);
            let deadline = if class.editable && task.is_overdue(now) {
                self.paint(&deadline, "31")
            } else {
                deadline
            };

            rows.push(vec![
                id,
                task.title.clone(),
                deadline,
                self.badge(&task.status),
                task.assignee_name().to_string(),
                task.department_name().to_string(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, now))]
    pub fn print_task_info(&mut self, task: &Task, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let class = classify_for_display(&task.status);

        writeln!(out, "id           {}", task.id)?;
        writeln!(out, "title        {}", task.title)?;
        writeln!(out, "status       {}", self.badge(&task.status))?;

        let deadline = format_display(task.deadline);
        if class.editable && task.is_overdue(now) {
            writeln!(out, "deadline     {} {}", deadline, self.paint("(overdue)", "31"))?;
        } else {
            writeln!(out, "deadline     {deadline}")?;
        }

        writeln!(out, "assigned to  {}", task.assignee_name())?;
        if let Some(by) = &task.assigned_by {
            writeln!(out, "assigned by  {}", by.name)?;
        }
        writeln!(out, "department   {}", task.department_name())?;

        if !task.description.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", task.description)?;
        }

        writeln!(out)?;
        if task.logs.is_empty() {
            writeln!(out, "No logs yet for this task.")?;
        } else {
            for log in task.logs_newest_first() {
                let stamp = format!("[{}]", format_display(log.created_at));
                let stamp = if log_on_time(log.created_at, task.deadline) {
                    self.paint(&stamp, "32")
                } else {
                    self.paint(&stamp, "31")
                };
                writeln!(out, "{} {}", stamp, log.description)?;
            }
        }

        if matches!(class.badge, BadgeVariant::Completed | BadgeVariant::Delayed) {
            writeln!(out)?;
            writeln!(out, "Task marked as {}.", task.status.to_ascii_uppercase())?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, users))]
    pub fn print_user_table(&mut self, users: &[User]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Email".to_string(),
            "Department".to_string(),
            "Role".to_string(),
        ];

        let rows = users
            .iter()
            .map(|user| {
                vec![
                    user.id.to_string()[..8].to_string(),
                    user.name.clone(),
                    user.email.clone(),
                    user.department_name().to_string(),
                    user.role.clone().unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, departments))]
    pub fn print_department_table(&mut self, departments: &[Department]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec!["ID".to_string(), "Name".to_string()];
        let rows = departments
            .iter()
            .map(|dep| vec![dep.id.to_string()[..8].to_string(), dep.name.clone()])
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Status cell: the raw text uppercased, styled by its badge variant.
    /// Styling never looks at the deadline.
    fn badge(&self, raw_status: &str) -> String {
        let label = raw_status.trim().to_ascii_uppercase();
        match classify_for_display(raw_status).badge.ansi_code() {
            Some(code) => self.paint(&label, code),
            None => label,
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(task: &Task) -> String {
    task.id.to_string()[..8].to_string()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
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

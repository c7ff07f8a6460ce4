// 任务表格的文本渲染

use crate::downloader::{TaskSnapshot, TaskStatus};
use std::io::{self, Write};

const HEADERS: [&str; 6] = ["ID", "File", "Status", "Progress", "Speed", "Save Path"];
const SPEED_UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
/// 失败原因在状态列中最多显示的字符数
const ERROR_PREVIEW_CHARS: usize = 36;

/// 格式化下载速度，非正数显示为 `-`
pub fn format_speed(bps: f64) -> String {
    if bps.is_nan() || bps <= 0.0 {
        return "-".to_string();
    }

    let mut size = bps;
    let mut unit = SPEED_UNITS[0];
    for &next in &SPEED_UNITS[1..] {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{:.1} {}", size, unit)
}

pub fn progress_text(task: &TaskSnapshot) -> String {
    match (task.progress, task.total_bytes) {
        (Some(progress), Some(total)) if total > 0 => format!("{:.1}%", progress),
        _ if task.status == TaskStatus::Completed => "100%".to_string(),
        _ => "-".to_string(),
    }
}

pub fn status_text(task: &TaskSnapshot) -> String {
    match (&task.status, &task.error) {
        (TaskStatus::Failed, Some(error)) => {
            let preview: String = error.chars().take(ERROR_PREVIEW_CHARS).collect();
            format!("failed: {}", preview)
        }
        (status, _) => status.to_string(),
    }
}

/// 表格中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub file: String,
    pub status: String,
    pub progress: String,
    pub speed: String,
    pub save_dir: String,
}

impl TaskRow {
    fn cells(&self) -> [&str; 6] {
        [
            self.id.as_str(),
            self.file.as_str(),
            self.status.as_str(),
            self.progress.as_str(),
            self.speed.as_str(),
            self.save_dir.as_str(),
        ]
    }
}

impl From<&TaskSnapshot> for TaskRow {
    fn from(task: &TaskSnapshot) -> Self {
        Self {
            id: task.id.to_string(),
            file: task.file_name.clone(),
            status: status_text(task),
            progress: progress_text(task),
            speed: format_speed(task.speed_bps),
            save_dir: task.save_dir.to_string_lossy().into_owned(),
        }
    }
}

/// 按列对齐渲染表格，第一行为表头
pub fn render_table(tasks: &[TaskSnapshot]) -> String {
    let rows: Vec<TaskRow> = tasks.iter().map(TaskRow::from).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.cells()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_line(HEADERS, &widths));
    lines.extend(rows.iter().map(|row| render_line(row.cells(), &widths)));
    lines.join("\n")
}

/// 输出表格，`clear` 时先清屏并回到左上角
pub fn write_table<W: Write>(out: &mut W, tasks: &[TaskSnapshot], clear: bool) -> io::Result<()> {
    if clear {
        write!(out, "\x1B[2J\x1B[H")?;
    }
    writeln!(out, "{}", render_table(tasks))?;
    out.flush()
}

fn render_line(cells: [&str; 6], widths: &[usize; 6]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

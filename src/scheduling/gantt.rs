// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Gantt export of a schedule: an XML task list or an SVG rendering,
//! selected by the runtime's trace flag.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::scheduling::scheduler::Schedule;
use crate::scheduling::task::TaskType;

/// One renderable bar; post-exec traces reuse this shape.
#[derive(Debug, Clone)]
pub struct GanttTask {
    pub pe: usize,
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub color: u32,
}

/// Deterministic color from a task name; sync stubs get a fixed red.
fn task_color(name: &str, task_type: TaskType) -> u32 {
    if task_type != TaskType::Vertex {
        return 0x00f2_2613;
    }
    let mut hash: u32 = 0;
    for byte in name.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    let red = 100 + (hash & 0x7f);
    let green = 100 + ((hash >> 7) & 0x7f);
    let blue = 100 + ((hash >> 14) & 0x7f);
    (red << 16) | (green << 8) | blue
}

/// Flatten a schedule into renderable bars.
pub fn tasks_of_schedule(schedule: &Schedule) -> Vec<GanttTask> {
    schedule
        .tasks
        .iter()
        .map(|task| GanttTask {
            pe: task.mapped_pe,
            start: task.start_time,
            end: task.end_time,
            name: task.name.clone(),
            color: task_color(&task.name, task.task_type),
        })
        .collect()
}

/// XML form: one `<task>` element per bar.
pub fn render_xml(tasks: &[GanttTask]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    let _ = writeln!(out, "<gantt>");
    for task in tasks {
        let _ = writeln!(
            out,
            "    <task pe=\"{}\" start=\"{}\" end=\"{}\" color=\"#{:06x}\" name=\"{}\"/>",
            task.pe, task.start, task.end, task.color, task.name
        );
    }
    let _ = writeln!(out, "</gantt>");
    out
}

const ROW_HEIGHT: u64 = 30;
const ROW_GAP: u64 = 5;
const TIME_SCALE: u64 = 2;

/// SVG form: one rectangle per bar, one row per PE.
pub fn render_svg(tasks: &[GanttTask]) -> String {
    let pe_count = tasks.iter().map(|t| t.pe + 1).max().unwrap_or(1);
    let makespan = tasks.iter().map(|t| t.end).max().unwrap_or(1).max(1);
    let width = makespan * TIME_SCALE + 20;
    let height = pe_count as u64 * (ROW_HEIGHT + ROW_GAP) + 20;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\">"
    );
    for task in tasks {
        let x = 10 + task.start * TIME_SCALE;
        let y = 10 + task.pe as u64 * (ROW_HEIGHT + ROW_GAP);
        let w = (task.end - task.start).max(1) * TIME_SCALE;
        let _ = writeln!(
            out,
            "    <rect x=\"{x}\" y=\"{y}\" width=\"{w}\" height=\"{ROW_HEIGHT}\" fill=\"#{:06x}\">\
<title>{} [{} - {}]</title></rect>",
            task.color, task.name, task.start, task.end
        );
    }
    let _ = writeln!(out, "</svg>");
    out
}

/// Write the XML form to `<path>.xml`.
pub fn export_xml<P: AsRef<Path>>(tasks: &[GanttTask], path: P) -> io::Result<()> {
    fs::write(path.as_ref().with_extension("xml"), render_xml(tasks))
}

/// Write the SVG form to `<path>.svg`.
pub fn export_svg<P: AsRef<Path>>(tasks: &[GanttTask], path: P) -> io::Result<()> {
    fs::write(path.as_ref().with_extension("svg"), render_svg(tasks))
}

//! Tabular status rendering with ANSI color and tree indentation

mod periodic;
mod wrap;

pub use periodic::PeriodicPrinter;
pub use wrap::wrap_lines;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::status::{ConditionStatus, ObjectStatus, Status, Verdict};
use wrap::pad_visible;

const CELL_SEP: &str = "  ";

/// Rendering options.
#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    /// For each object, show the API group it belongs to.
    pub show_group: bool,
    /// Show details for all objects, including those with OK status.
    pub show_all: bool,
    /// Output width; 0 disables wrapping.
    pub width: usize,
}

struct Column {
    header: &'static str,
    width: usize,
    /// Maximum number of lines to wrap the content to.
    max_line_wrap: usize,
    wrap_prefix: &'static str,
    format: fn(&ConditionStatus) -> String,
}

fn blank(_cond: &ConditionStatus) -> String {
    String::new()
}

/// Blank column aligning condition rows under the object column.
const OBJECT_INDENT: Column = Column {
    header: "OBJECT",
    width: 15,
    max_line_wrap: 0,
    wrap_prefix: "",
    format: blank,
};

const CONDITION_COLS: [Column; 4] = [
    OBJECT_INDENT,
    Column {
        header: "CONDITION",
        width: 30,
        max_line_wrap: 0,
        wrap_prefix: "",
        format: format_condition_type,
    },
    Column {
        header: "AGE",
        width: 5,
        max_line_wrap: 0,
        wrap_prefix: "",
        format: format_condition_age,
    },
    Column {
        header: "REASON",
        width: 30,
        max_line_wrap: 0,
        wrap_prefix: "",
        format: format_condition_reason,
    },
];

const MESSAGE_COLS: [Column; 3] = [
    OBJECT_INDENT,
    // Indent the message under the condition column. The width is 0 but the
    // column is kept to preserve the spacing.
    Column {
        header: "",
        width: 0,
        max_line_wrap: 0,
        wrap_prefix: "",
        format: blank,
    },
    Column {
        header: "MESSAGE",
        // Minimal width; the last column is stretched to the output width.
        width: 40,
        max_line_wrap: 3,
        wrap_prefix: "    ",
        format: format_condition_message,
    },
];

fn colorize(status: &Status, text: &str) -> String {
    if status.progressing {
        return text.yellow().to_string();
    }
    match status.result {
        Verdict::Ok => text.green().to_string(),
        Verdict::Warning => text.yellow().to_string(),
        Verdict::Error => text.red().to_string(),
        Verdict::Unknown => text.to_string(),
    }
}

fn status_message(status: &Status) -> String {
    if status.progressing {
        "Progressing".to_string()
    } else {
        status.message.clone()
    }
}

fn format_condition_type(cond: &ConditionStatus) -> String {
    colorize(&cond.status, &cond.condition.type_)
}

fn format_condition_age(cond: &ConditionStatus) -> String {
    match &cond.condition.last_transition_time {
        Some(t) => format_time_since(t.0),
        None => String::new(),
    }
}

fn format_condition_reason(cond: &ConditionStatus) -> String {
    cond.condition.reason.clone()
}

fn format_condition_message(cond: &ConditionStatus) -> String {
    cond.condition.message.clone()
}

fn format_time_since(t: chrono::DateTime<Utc>) -> String {
    let since = Utc::now().signed_duration_since(t);
    let secs = since.num_seconds().max(0);
    if secs <= 90 {
        format!("{secs}s")
    } else if since.num_minutes() <= 90 {
        format!("{}m", (secs + 30) / 60)
    } else {
        format!("{}h", (secs + 1800) / 3600)
    }
}

fn format_object(obj: &ObjectStatus, root: bool, show_group: bool) -> String {
    let status = colorize(&obj.status, &status_message(&obj.status));

    let mut full_name = String::new();
    if root {
        full_name.push_str(obj.object.namespace().unwrap_or(""));
        full_name.push('/');
    }
    full_name.push_str(&format!("{}/{}", obj.object.types.kind, obj.object.name()));
    if show_group {
        full_name.push_str(&format!(" [{}]", obj.object.types.group));
    }

    format!("{status} {full_name}")
}

fn sort_key(obj: &ObjectStatus) -> String {
    format!(
        "{} {} {}",
        obj.object.namespace().unwrap_or(""),
        obj.object.types.kind,
        obj.object.name()
    )
}

/// Renders status trees in a tabular format.
pub struct TablePrinter {
    opts: PrintOptions,
}

impl TablePrinter {
    pub fn new(opts: PrintOptions) -> Self {
        TablePrinter { opts }
    }

    /// Render a frame for the given root statuses, header included.
    pub fn render(&self, statuses: &[ObjectStatus]) -> String {
        let mut out = String::new();
        self.write_header(&mut out);

        let mut objects: Vec<&ObjectStatus> = statuses.iter().collect();
        objects.sort_by_key(|o| sort_key(o));

        for obj in objects {
            let print_sub = !obj.children.is_empty() && self.should_print_details(obj);
            let prefix_tail = if print_sub { "│ " } else { "" };
            self.write_object_with_conditions(&mut out, obj, "", prefix_tail);
            if print_sub {
                self.write_sub_table(&mut out, &obj.children, "");
            }
        }
        out
    }

    pub fn render_error(&self, err: &impl std::fmt::Display) -> String {
        format!("{}\n", err.to_string().red())
    }

    /// Whether to print the detail rows of the object.
    fn should_print_details(&self, obj: &ObjectStatus) -> bool {
        if self.opts.show_all {
            return true;
        }
        obj.status.result > Verdict::Ok || obj.status.progressing
    }

    fn write_object_with_conditions(
        &self,
        out: &mut String,
        obj: &ObjectStatus,
        prefix_head: &str,
        prefix_tail: &str,
    ) {
        out.push_str(prefix_head);
        out.push_str(&format_object(obj, prefix_head.is_empty(), self.opts.show_group));
        out.push('\n');

        if self.should_print_details(obj) {
            for cond in &obj.conditions {
                self.write_row(out, &CONDITION_COLS, cond, prefix_tail, prefix_tail);
                if cond.status.result > Verdict::Ok || cond.status.progressing {
                    self.write_row(out, &MESSAGE_COLS, cond, prefix_tail, prefix_tail);
                }
            }
        }
    }

    /// Print subresources with the tree structure and indentation.
    fn write_sub_table(&self, out: &mut String, children: &[ObjectStatus], prefix: &str) {
        let mut objects: Vec<&ObjectStatus> = children.iter().collect();
        objects.sort_by_key(|o| sort_key(o));

        let last = objects.len().saturating_sub(1);
        for (j, obj) in objects.iter().enumerate() {
            let (head, mut tail) = if j < last {
                ("├─ ", "│  ".to_string())
            } else {
                ("└─ ", "   ".to_string())
            };
            if self.should_print_details(obj) && !obj.children.is_empty() {
                // Extra level of indentation when there are subresources.
                tail.push_str("│ ");
            }

            self.write_object_with_conditions(
                out,
                obj,
                &format!("{prefix}{head}"),
                &format!("{prefix}{tail}"),
            );

            let next_prefix = if j < last { "│  " } else { "   " };
            if self.should_print_details(obj) {
                self.write_sub_table(out, &obj.children, &format!("{prefix}{next_prefix}"));
            }
        }
    }

    fn write_header(&self, out: &mut String) {
        let mut line = String::new();
        for (i, col) in CONDITION_COLS.iter().enumerate() {
            if i != CONDITION_COLS.len() - 1 {
                line.push_str(&pad_visible(col.header, col.width));
                line.push_str(CELL_SEP);
            } else {
                line.push_str(col.header);
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    fn write_row(
        &self,
        out: &mut String,
        cols: &[Column],
        cond: &ConditionStatus,
        prefix_head: &str,
        prefix_tail: &str,
    ) {
        let mut cell_txt: Vec<String> = Vec::with_capacity(cols.len());
        let mut cur_width = 0;
        for (i, col) in cols.iter().enumerate() {
            let mut txt = (col.format)(cond);
            let mut width = col.width;
            if i == cols.len() - 1 && self.opts.width > 0 {
                // Allocate the rest of the output width for the last column.
                width = width.max(self.opts.width.saturating_sub(cur_width + CELL_SEP.len()));
                txt = wrap_lines(&txt, width, col.max_line_wrap, col.wrap_prefix);
            }
            cell_txt.push(txt.trim().to_string());
            cur_width += width + CELL_SEP.len();
        }

        let cell_lines: Vec<Vec<&str>> = cell_txt.iter().map(|t| t.split('\n').collect()).collect();
        let max_lines = cell_lines.iter().map(Vec::len).max().unwrap_or(0);

        for i in 0..max_lines {
            for (j, col) in cols.iter().enumerate() {
                let mut txt = String::new();
                if j == 0 {
                    txt.push_str(if i == 0 { prefix_head } else { prefix_tail });
                }
                if let Some(line) = cell_lines[j].get(i) {
                    txt.push_str(line);
                }
                // The last column is not padded.
                if j != cols.len() - 1 {
                    txt = pad_visible(&txt, col.width);
                    txt.push_str(CELL_SEP);
                }
                out.push_str(&txt);
            }
            while out.ends_with(' ') {
                out.pop();
            }
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::aggregate_result;
    use crate::analyze::conditions::{synthetic_error, synthetic_ok};
    use crate::object::Object;
    use serde_json::json;
    use std::sync::Arc;

    fn pod(name: &str, ns: &str) -> Arc<Object> {
        Arc::new(
            Object::from_value(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": name, "namespace": ns, "uid": format!("uid-{name}")},
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_render_healthy_object_without_details() {
        let os = aggregate_result(pod("p1", "default"), Vec::new(), vec![synthetic_ok("Ready", "")]);
        let printer = TablePrinter::new(PrintOptions::default());
        let rendered = printer.render(&[os]);

        assert!(rendered.contains("OBJECT"));
        assert!(rendered.contains("default/Pod/p1"));
        // Healthy objects hide their condition rows.
        assert!(!rendered.contains("Ready"));
    }

    #[test]
    fn test_render_failing_object_shows_conditions_and_message() {
        let os = aggregate_result(
            pod("p2", "default"),
            Vec::new(),
            vec![synthetic_error("Ready", "NotReady", "containers not ready")],
        );
        let printer = TablePrinter::new(PrintOptions::default());
        let rendered = printer.render(&[os]);

        assert!(rendered.contains("Ready"));
        assert!(rendered.contains("NotReady"));
        assert!(rendered.contains("containers not ready"));
    }

    #[test]
    fn test_render_show_all_includes_ok_details() {
        let os = aggregate_result(pod("p1", "default"), Vec::new(), vec![synthetic_ok("Ready", "")]);
        let printer = TablePrinter::new(PrintOptions {
            show_all: true,
            ..Default::default()
        });
        assert!(printer.render(&[os]).contains("Ready"));
    }

    #[test]
    fn test_render_sorts_siblings_and_draws_tree() {
        let child_b = aggregate_result(
            pod("b", "default"),
            Vec::new(),
            vec![synthetic_error("Ready", "NotReady", "boom")],
        );
        let child_a = aggregate_result(
            pod("a", "default"),
            Vec::new(),
            vec![synthetic_error("Ready", "NotReady", "boom")],
        );
        let root = aggregate_result(pod("svc", "default"), vec![child_b, child_a], Vec::new());

        let printer = TablePrinter::new(PrintOptions::default());
        let rendered = printer.render(&[root]);

        let pos_a = rendered.find("├─").unwrap();
        let pos_b = rendered.find("└─").unwrap();
        assert!(pos_a < pos_b);
        let a_line = rendered.lines().find(|l| l.contains("Pod/a")).unwrap();
        assert!(a_line.starts_with("├─ "));
    }

    #[test]
    fn test_show_group_appends_group() {
        let rs = Arc::new(
            Object::from_value(json!({
                "apiVersion": "apps/v1",
                "kind": "ReplicaSet",
                "metadata": {"name": "web", "namespace": "default", "uid": "u1"},
            }))
            .unwrap(),
        );
        let os = aggregate_result(rs, Vec::new(), vec![synthetic_ok("Ready", "")]);
        let printer = TablePrinter::new(PrintOptions {
            show_group: true,
            ..Default::default()
        });
        assert!(printer.render(&[os]).contains("ReplicaSet/web [apps]"));
    }
}

use folio_lib::rag::{IndexReport, MatchSource, PresentedResult, QueryOutcome};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Render a query outcome the way it is printed in plain mode.
pub fn render_outcome(question: &str, top_k: usize, outcome: &QueryOutcome, use_color: bool) -> String {
    let mut lines = Vec::new();

    match outcome {
        QueryOutcome::EmptyQuestion => lines.push("No question given.".to_string()),
        QueryOutcome::TooVague => lines.push(paint(
            "Question too vague: every word is a stopword or too short.",
            Color::YELLOW,
            use_color,
        )),
        QueryOutcome::Answered { source, results, .. } => {
            lines.push(header(question, top_k, use_color));
            if *source == MatchSource::LexicalFallback {
                lines.push(fallback_notice(top_k, use_color));
            }
            for result in results {
                lines.push(render_result(result, use_color));
                lines.push(String::new());
            }
        }
        QueryOutcome::NoMatch { keywords } => {
            lines.push(header(question, top_k, use_color));
            if !keywords.is_empty() {
                lines.push(fallback_notice(top_k, use_color));
            }
            let message = if keywords.is_empty() {
                "No match found.".to_string()
            } else {
                format!("No match found for: {}", keywords.join(", "))
            };
            lines.push(paint(&message, Color::RED, use_color));
        }
    }

    while lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn header(question: &str, top_k: usize, use_color: bool) -> String {
    let text = format!("Top {} results for \u{201c}{}\u{201d}:\n", top_k, question.trim());
    paint(&text, Color::BOLD, use_color)
}

fn fallback_notice(top_k: usize, use_color: bool) -> String {
    let text = format!(
        "No keyword in top {} \u{2014} falling back to substring search:\n",
        top_k
    );
    paint(&text, Color::DIM, use_color)
}

pub fn render_result(result: &PresentedResult, use_color: bool) -> String {
    let score = paint(&format!("({:.4})", result.score), Color::CYAN, use_color);
    let page = match result.page {
        Some(page) => page.to_string(),
        None => "n/a".to_string(),
    };
    format!("{} p. {}: {}", score, page, result.snippet)
}

pub fn render_report(report: &IndexReport, use_color: bool) -> String {
    let action = if report.created { "Created" } else { "Updated" };
    let mut lines = vec![format!(
        "{} index {} ({} dims)",
        action,
        paint(&report.index_name, Color::BOLD, use_color),
        report.dimension
    )];
    lines.push(format!(
        "  {} pages, {} chunks upserted",
        report.page_count, report.chunk_count
    ));
    if report.reset {
        lines.push("  previous entries cleared".to_string());
    }
    if report.pruned > 0 {
        lines.push(format!("  {} stale entries pruned", report.pruned));
    }
    lines.push(paint(
        &format!("  finished {}", report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")),
        Color::GRAY,
        use_color,
    ));
    lines.join("\n")
}

use std::fmt::Display;

use colored::*;
use gatescan_core::phase::PhaseReport;
use gatescan_core::{PairReport, RunReport};
use tracing::info;
use unicode_width::UnicodeWidthStr;

use crate::terminal::colors;
use crate::terminal::logging::PRINT_TARGET;

pub const TOTAL_WIDTH: usize = 64;
const TREE_KEY_WIDTH: usize = 10;

pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, "{msg}");
}

pub fn banner(no_banner: bool, q_level: u8) {
    if no_banner || q_level > 0 {
        return;
    }

    let text_content: String = format!("⟦ GATESCAN v{} ⟧ ", env!("CARGO_PKG_VERSION"));
    let text_width: usize = UnicodeWidthStr::width(text_content.as_str());
    let text: ColoredString = text_content.bright_green().bold();
    let sep: ColoredString = "═".repeat(TOTAL_WIDTH.saturating_sub(text_width) / 2).bright_black();
    let output: String = format!("{}{}{}", sep, text, sep);

    print(&output);
}

pub fn header(msg: &str, q_level: u8) {
    if q_level > 0 {
        return;
    }

    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right)
    )
    .bright_black();

    print(&format!("{}", line));
}

pub fn aligned_line<V: Display>(key: &str, value: V) {
    let dots: String = ".".repeat(TREE_KEY_WIDTH.saturating_sub(key.len()));
    let prefix: ColoredString = ">".color(colors::SEPARATOR);
    print(&format!(
        "{} {}{}{} {}",
        prefix,
        key.color(colors::PRIMARY),
        dots.color(colors::SEPARATOR),
        ":".color(colors::SEPARATOR),
        value.to_string().color(colors::TEXT_DEFAULT)
    ));
}

pub fn tree_head(idx: usize, name: &str) {
    let idx_str: String = format!("[{}]", idx.to_string().color(colors::ACCENT));
    let output: String = format!(
        "{} {}",
        idx_str.color(colors::SEPARATOR),
        name.color(colors::PRIMARY)
    );
    print(&output);
}

pub fn as_tree_one_level(key_value_pair: Vec<(String, ColoredString)>) {
    for (i, (key, value)) in key_value_pair.iter().enumerate() {
        let last: bool = i + 1 == key_value_pair.len();
        let branch: ColoredString = if !last {
            "├─".bright_black()
        } else {
            "└─".bright_black()
        };
        let output: String = format!(
            " {} {}{}{} {}",
            branch,
            key.color(colors::TEXT_DEFAULT),
            ".".repeat(TREE_KEY_WIDTH.saturating_sub(key.len())).color(colors::SEPARATOR),
            ":".color(colors::SEPARATOR),
            value
        );
        print(&output);
    }
}

pub fn centerln(msg: &str) {
    let space = " ".repeat(TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2);
    print(&format!("{}{}{}", space, msg, space));
}

fn termination_colored(report: &PhaseReport) -> ColoredString {
    let termination = &report.termination;
    let text = if report.incomplete && !termination.incomplete() {
        format!("{termination} (round cut short)")
    } else {
        termination.to_string()
    };
    if report.incomplete {
        text.color(colors::WARNING)
    } else {
        text.green()
    }
}

fn phase_line(report: &PhaseReport) -> (String, ColoredString) {
    let value = format!(
        "{} -> {} in {} rounds, {}",
        report.input_size,
        report.output_size.to_string().bold(),
        report.iterations(),
        termination_colored(report)
    );
    (format!("phase {}", report.phase.number()), value.normal())
}

pub fn pair_summary(idx: usize, report: &PairReport) {
    tree_head(idx, &report.label);
    let mut lines: Vec<(String, ColoredString)> = report.phases.iter().map(phase_line).collect();
    lines.push((
        "verified".to_string(),
        report.verified.to_string().color(colors::IPV4_ADDR).bold(),
    ));
    as_tree_one_level(lines);
}

pub fn run_summary(report: &RunReport, q_level: u8) {
    header("summary", q_level);
    for (idx, run) in report.pairs.iter().enumerate() {
        if q_level < 2 {
            pair_summary(idx, &run.report);
        }
    }
    let all = report.all_candidates();
    aligned_line("pairs", report.pairs.len());
    aligned_line("candidates", all.len());
    aligned_line(
        "verified",
        report
            .pairs
            .iter()
            .map(|run| run.report.verified)
            .sum::<u64>(),
    );
    if !report.complete() {
        centerln(&format!("{}", "partial results".color(colors::WARNING).bold()));
    }
}

pub fn end_of_program() {
    print(&format!(
        "{}",
        "═".repeat(TOTAL_WIDTH).color(colors::SEPARATOR)
    ));
}

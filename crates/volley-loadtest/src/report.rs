//! Boxed console reports for the CLI
//!
//! Every result type already renders all of its fields through `Display`;
//! these panels are the friendlier summary printed at the end of a run.

use std::fmt::Display;
use volley_core::{CapacityTestResult, DetailedRoundResult, StressTestTrace, SustainedLoadResult};

const INNER_WIDTH: usize = 62;
const LABEL_WIDTH: usize = 24;
const VALUE_WIDTH: usize = INNER_WIDTH - LABEL_WIDTH - 3;

/// Cut `text` to `width` characters, marking the cut with an ellipsis
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

struct Panel {
    out: String,
}

impl Panel {
    fn new(title: &str) -> Self {
        let mut panel = Self { out: String::new() };
        panel.line('╔', '═', '╗');
        panel
            .out
            .push_str(&format!("║{:^width$}║\n", fit(title, INNER_WIDTH), width = INNER_WIDTH));
        panel.line('╠', '═', '╣');
        panel
    }

    fn line(&mut self, left: char, fill: char, right: char) {
        self.out.push(left);
        self.out.extend(std::iter::repeat(fill).take(INNER_WIDTH));
        self.out.push(right);
        self.out.push('\n');
    }

    fn row(&mut self, label: &str, value: impl Display) {
        self.out.push_str(&format!(
            "║ {:<label_w$} {:>value_w$} ║\n",
            fit(label, LABEL_WIDTH),
            fit(&value.to_string(), VALUE_WIDTH),
            label_w = LABEL_WIDTH,
            value_w = VALUE_WIDTH
        ));
    }

    fn section(&mut self, title: &str) {
        self.line('╠', '═', '╣');
        self.out.push_str(&format!(
            "║ {:<width$} ║\n",
            fit(title, INNER_WIDTH - 2),
            width = INNER_WIDTH - 2
        ));
    }

    fn finish(mut self) -> String {
        self.line('╚', '═', '╝');
        self.out
    }
}

fn ms(value: u64) -> String {
    format!("{} ms", value)
}

pub fn detailed_report(result: &DetailedRoundResult) -> String {
    let mut panel = Panel::new("DETAILED ROUND RESULTS");
    panel.row("Workers:", result.width);
    panel.row("Successful:", result.success_count);
    panel.row("Failed:", result.fail_count);
    panel.row("Rejected:", result.rejected);
    panel.row("Unaccounted:", result.unaccounted());
    panel.row("Wall clock:", format!("{} ms", result.wall_clock_ms()));
    panel.section("LATENCY");
    panel.row("  min:", ms(result.min_ms));
    panel.row("  avg:", ms(result.avg_ms));
    panel.row("  p50:", ms(result.median_ms));
    panel.row("  p95:", ms(result.p95_ms));
    panel.row("  p99:", ms(result.p99_ms));
    panel.row("  max:", ms(result.max_ms));
    panel.finish()
}

pub fn sustained_report(result: &SustainedLoadResult) -> String {
    let mut panel = Panel::new("SUSTAINED LOAD RESULTS");
    panel.row(
        "Window:",
        format!("{:.2} s", (result.finished_at - result.started_at).num_milliseconds() as f64 / 1000.0),
    );
    panel.row("Successful:", result.success_count);
    panel.row("Failed:", result.fail_count);
    panel.row("Abandoned:", result.abandoned);
    panel.row("Success rate:", format!("{:.2}%", result.success_rate * 100.0));
    panel.row("Target QPS:", result.target_qps);
    panel.row("Actual QPS:", format!("{:.2}", result.actual_qps));
    panel.section("LATENCY");
    panel.row("  avg:", ms(result.avg_response_time_ms));
    panel.row("  p50:", ms(result.percentile(50.0)));
    panel.row("  p95:", ms(result.percentile(95.0)));
    panel.row("  p99:", ms(result.percentile(99.0)));
    panel.finish()
}

pub fn stress_report(trace: &StressTestTrace) -> String {
    let mut panel = Panel::new("STRESS TEST RESULTS");
    panel.row("Rounds:", trace.rounds.len());
    panel.row("Stopped:", &trace.stop);
    panel.row(
        "Max healthy width:",
        trace
            .max_healthy_width()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );
    panel.section("ROUNDS (width / success / failed / avg)");
    for round in &trace.rounds {
        panel.row(
            &format!("  {}", round.total),
            format!(
                "{} / {} / {}",
                round.success,
                round.failed,
                round
                    .avg_response_time_ms
                    .map(ms)
                    .unwrap_or_else(|| "n/a".to_string())
            ),
        );
    }
    panel.finish()
}

pub fn capacity_report(result: &CapacityTestResult) -> String {
    let mut panel = Panel::new("CAPACITY TEST RESULTS");
    panel.row("Optimal width:", result.optimal_thread_count);
    panel.row("Max throughput:", format!("{:.2} req/s", result.max_throughput));
    panel.row("Stopped:", &result.stop);
    panel.section("STEPS (width / throughput)");
    for point in &result.data_points {
        panel.row(
            &format!("  {}", point.thread_count),
            format!("{:.2} req/s", point.throughput),
        );
    }
    panel.finish()
}

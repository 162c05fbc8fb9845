//! Comparative report rendering
//!
//! Pure formatting over completed [`BenchmarkResult`]s: an overall metrics
//! table, a tag-stratified table, the list of imperfect rankings and, for
//! exactly two providers, a winner/draw verdict.

use std::collections::BTreeSet;
use std::fmt;

use super::runner::{BenchmarkResult, QueryDetail};
use crate::queries::NOTATION_TAG;

/// Relative MRR difference below which two providers draw
pub const DRAW_THRESHOLD: f32 = 0.03;

/// Reciprocal-rank spread between providers that flags a query
pub const DISAGREEMENT_THRESHOLD: f32 = 0.3;

const LABEL_WIDTH: usize = 20;
const COLUMN_WIDTH: usize = 24;

/// Outcome of a two-provider comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Winner {
        provider: String,
        runner_up: String,
        winner_mrr: f32,
        runner_up_mrr: f32,
        /// |a - b| / max(a, b)
        relative_delta: f32,
        /// Winner minus runner-up MRR on notation-tagged queries
        notation_delta: Option<f32>,
    },
    Draw {
        relative_delta: f32,
    },
}

impl Verdict {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. })
    }
}

/// Compare two providers by MRR
///
/// Returns `None` unless exactly two results are given.
pub fn compute_verdict(results: &[BenchmarkResult]) -> Option<Verdict> {
    let [a, b] = results else {
        return None;
    };

    let best = a.mrr.max(b.mrr);
    let relative_delta = if best > 0.0 {
        (a.mrr - b.mrr).abs() / best
    } else {
        0.0
    };

    if relative_delta < DRAW_THRESHOLD {
        return Some(Verdict::Draw { relative_delta });
    }

    let (winner, runner_up) = if a.mrr >= b.mrr { (a, b) } else { (b, a) };
    let notation_delta = match (winner.tag_mrr(NOTATION_TAG), runner_up.tag_mrr(NOTATION_TAG)) {
        (Some(w), Some(r)) => Some(w - r),
        _ => None,
    };

    Some(Verdict::Winner {
        provider: winner.provider.clone(),
        runner_up: runner_up.provider.clone(),
        winner_mrr: winner.mrr,
        runner_up_mrr: runner_up.mrr,
        relative_delta,
        notation_delta,
    })
}

/// Query ids where some provider missed rank 1 or providers disagree
///
/// Ids come out in the order of the first result that carries them.
pub fn flagged_queries(results: &[BenchmarkResult]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut flagged = Vec::new();

    for query_id in results
        .iter()
        .flat_map(|r| r.query_details.iter().map(|d| d.query_id.as_str()))
    {
        if !seen.insert(query_id) {
            continue;
        }
        let ranks: Vec<f32> = results
            .iter()
            .filter_map(|r| r.detail(query_id))
            .map(|d| d.reciprocal_rank)
            .collect();

        let imperfect = ranks.iter().any(|rr| *rr < 1.0);
        let lo = ranks.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = ranks.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let disagree = ranks.len() > 1 && hi - lo > DISAGREEMENT_THRESHOLD;

        if imperfect || disagree {
            flagged.push(query_id.to_string());
        }
    }

    flagged
}

/// Render the full comparative report
pub fn render_report(results: &[BenchmarkResult]) -> String {
    Report::new(results).to_string()
}

/// Report over a set of completed runs, rendered through `Display`
pub struct Report<'a> {
    results: &'a [BenchmarkResult],
}

impl<'a> Report<'a> {
    pub fn new(results: &'a [BenchmarkResult]) -> Self {
        Self { results }
    }

    fn write_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║              RETRIEVAL BENCHMARK REPORT                      ║")?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        writeln!(f)
    }

    fn write_overall(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌─ OVERALL ─────────────────────────────────────────────────────────────┐")?;
        write!(f, "{:LABEL_WIDTH$}", "Metric")?;
        for r in self.results {
            write!(f, " {:>COLUMN_WIDTH$}", clip(&r.provider, COLUMN_WIDTH))?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "─".repeat(LABEL_WIDTH + self.results.len() * (COLUMN_WIDTH + 1)))?;

        self.write_row(f, "Model", |r| clip(&r.model, COLUMN_WIDTH))?;
        self.write_row(f, "Recall@1", |r| format!("{:.1}%", r.recall1 * 100.0))?;
        self.write_row(f, "Recall@3", |r| format!("{:.1}%", r.recall3 * 100.0))?;
        self.write_row(f, "Recall@5", |r| format!("{:.1}%", r.recall5 * 100.0))?;
        self.write_row(f, "MRR", |r| format!("{:.3}", r.mrr))?;
        self.write_row(f, "Avg latency (ms)", |r| format!("{:.0}", r.avg_latency_ms))?;
        self.write_row(f, "Tokens", |r| r.total_tokens.to_string())?;
        self.write_row(f, "Dimensions", |r| r.dimensions.to_string())?;
        self.write_row(f, "Queries", |r| r.total_queries.to_string())?;
        writeln!(f)
    }

    fn write_row(
        &self,
        f: &mut fmt::Formatter<'_>,
        label: &str,
        cell: impl Fn(&BenchmarkResult) -> String,
    ) -> fmt::Result {
        write!(f, "{:LABEL_WIDTH$}", label)?;
        for r in self.results {
            write!(f, " {:>COLUMN_WIDTH$}", cell(r))?;
        }
        writeln!(f)
    }

    fn write_tags(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: BTreeSet<&str> = self
            .results
            .iter()
            .flat_map(|r| r.tag_breakdown.keys().map(String::as_str))
            .collect();
        if tags.is_empty() {
            return Ok(());
        }

        writeln!(f, "┌─ BY TAG (Recall@5 / MRR) ─────────────────────────────────────────────┐")?;
        write!(f, "{:14} {:>5}", "Tag", "Count")?;
        for r in self.results {
            write!(f, " {:>COLUMN_WIDTH$}", clip(&r.provider, COLUMN_WIDTH))?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "─".repeat(20 + self.results.len() * (COLUMN_WIDTH + 1)))?;

        for tag in tags {
            let count = self
                .results
                .iter()
                .find_map(|r| r.tag_breakdown.get(tag))
                .map(|m| m.count)
                .unwrap_or(0);
            write!(f, "{:14} {:>5}", clip(tag, 14), count)?;
            for r in self.results {
                let cell = match r.tag_breakdown.get(tag) {
                    Some(m) => format!("{:.1}% / {:.3}", m.recall5 * 100.0, m.mrr),
                    None => "-".to_string(),
                };
                write!(f, " {:>COLUMN_WIDTH$}", cell)?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }

    fn write_flagged(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flagged = flagged_queries(self.results);
        writeln!(
            f,
            "┌─ IMPERFECT RANKINGS ({}) ─────────────────────────────────────────────┐",
            flagged.len()
        )?;
        if flagged.is_empty() {
            writeln!(f, "  Every provider ranked an expected passage first for every query.")?;
            return writeln!(f);
        }

        for query_id in &flagged {
            let Some(first) = self.results.iter().find_map(|r| r.detail(query_id)) else {
                continue;
            };
            writeln!(f, "▶ {}: \"{}\"", first.query_id, first.query)?;
            if !first.tags.is_empty() {
                let tags: Vec<&str> = first.tags.iter().map(String::as_str).collect();
                writeln!(f, "  tags: {}", tags.join(", "))?;
            }
            let expected: Vec<&str> = first.expected_ids.iter().map(String::as_str).collect();
            writeln!(f, "  expected: {}", expected.join(", "))?;

            for r in self.results {
                if let Some(detail) = r.detail(query_id) {
                    write_matches(f, &r.provider, detail)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }

    fn write_verdict(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(verdict) = compute_verdict(self.results) else {
            return Ok(());
        };

        writeln!(f, "┌─ VERDICT ─────────────────────────────────────────────────────────────┐")?;
        match verdict {
            Verdict::Draw { relative_delta } => {
                writeln!(
                    f,
                    "  Draw: MRR within {:.0}% ({:.1}% apart)",
                    DRAW_THRESHOLD * 100.0,
                    relative_delta * 100.0
                )?;
            }
            Verdict::Winner {
                provider,
                runner_up,
                winner_mrr,
                runner_up_mrr,
                relative_delta,
                notation_delta,
            } => {
                writeln!(
                    f,
                    "  Winner: {} (MRR {:.3} vs {} {:.3}, {:.1}% better)",
                    provider,
                    winner_mrr,
                    runner_up,
                    runner_up_mrr,
                    relative_delta * 100.0
                )?;
                match notation_delta {
                    Some(delta) => writeln!(f, "  Notation MRR delta: {:+.3}", delta)?,
                    None => writeln!(f, "  Notation MRR delta: n/a (no notation queries)")?,
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_header(f)?;
        if self.results.is_empty() {
            return writeln!(f, "No provider completed a run.");
        }
        self.write_overall(f)?;
        self.write_tags(f)?;
        self.write_flagged(f)?;
        self.write_verdict(f)
    }
}

fn write_matches(f: &mut fmt::Formatter<'_>, provider: &str, detail: &QueryDetail) -> fmt::Result {
    let rank = detail
        .first_hit_rank
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());
    writeln!(
        f,
        "  {} (RR {:.3}, first hit at {}):",
        provider, detail.reciprocal_rank, rank
    )?;
    for (idx, m) in detail.top_matches.iter().enumerate() {
        let mark = if detail.is_expected(&m.chunk_id) { "✓" } else { " " };
        writeln!(f, "    {}. {} {:32} {:>7.3}", idx + 1, mark, clip(&m.chunk_id, 32), m.score)?;
    }
    Ok(())
}

/// Truncate to `width` characters for table cells
fn clip(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

//! Cross-run comparison of persisted benchmark summaries.

use crate::artifacts::TestOutcome;
use crate::results::RunResult;
use crate::variant::Variant;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Aggregates for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSummary {
    pub variant: Variant,
    pub runs: usize,
    pub avg_duration: f64,
    /// Average over runs that recorded a cost; 0 when none did.
    pub avg_cost: f64,
    pub passed: usize,
}

/// Duration and cost of a variant relative to the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRatio {
    pub variant: Variant,
    pub time: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub baseline: Variant,
    /// Ordered by variant name.
    pub variants: Vec<VariantSummary>,
    /// Empty unless the baseline and at least one other variant have runs.
    pub ratios: Vec<BaselineRatio>,
}

/// `num / den`, or 0 when `den` is zero.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    ratio(sum, n as f64)
}

/// Per-variant averages over `runs` plus ratios against `baseline`.
pub fn compare(runs: &[RunResult], baseline: Variant) -> Comparison {
    let mut by_variant: BTreeMap<&'static str, Vec<&RunResult>> = BTreeMap::new();
    for run in runs {
        by_variant.entry(run.variant.as_str()).or_default().push(run);
    }

    let variants: Vec<VariantSummary> = by_variant
        .values()
        .map(|group| VariantSummary {
            variant: group[0].variant,
            runs: group.len(),
            avg_duration: mean(group.iter().map(|r| r.duration_seconds)),
            avg_cost: mean(group.iter().filter_map(|r| r.total_cost_usd)),
            passed: group
                .iter()
                .filter(|r| r.tests_pass == TestOutcome::True)
                .count(),
        })
        .collect();

    let base = variants.iter().find(|s| s.variant == baseline);
    let ratios = match base {
        Some(base) if variants.len() > 1 => variants
            .iter()
            .filter(|s| s.variant != baseline)
            .map(|s| BaselineRatio {
                variant: s.variant,
                time: ratio(s.avg_duration, base.avg_duration),
                cost: ratio(s.avg_cost, base.avg_cost),
            })
            .collect(),
        _ => Vec::new(),
    };

    Comparison {
        baseline,
        variants,
        ratios,
    }
}

impl Comparison {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Benchmark Comparison");
        let _ = writeln!(out, "{}", "=".repeat(60));

        if self.variants.is_empty() {
            let _ = writeln!(out, "No results found. Run some benchmarks first.");
            return out;
        }

        let _ = writeln!(
            out,
            "\n{:<12} {:<6} {:<10} {:<12} {:<12}",
            "Variant", "Runs", "Avg Time", "Avg Cost", "Tests Pass"
        );
        let _ = writeln!(out, "{}", "-".repeat(60));
        for s in &self.variants {
            let _ = writeln!(
                out,
                "{:<12} {:<6} {:>7.1}s   ${:>8.4}     {}/{}",
                s.variant.as_str(),
                s.runs,
                s.avg_duration,
                s.avg_cost,
                s.passed,
                s.runs
            );
        }

        if !self.ratios.is_empty() {
            let base = self.baseline.as_str();
            let time_header = format!("Time vs {base}");
            let cost_header = format!("Cost vs {base}");
            let _ = writeln!(out, "\n{:<12} {:<16} {:<16}", "Variant", time_header, cost_header);
            let _ = writeln!(out, "{}", "-".repeat(45));
            for r in &self.ratios {
                let _ = writeln!(
                    out,
                    "{:<12} {:>6.2}x          {:>6.2}x",
                    r.variant.as_str(),
                    r.time,
                    r.cost
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::sample_result;

    fn run(variant: Variant, duration: f64, cost: Option<f64>, tests: TestOutcome) -> RunResult {
        RunResult {
            duration_seconds: duration,
            total_cost_usd: cost,
            tests_pass: tests,
            ..sample_result(variant, 1)
        }
    }

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(0.0, 0.0), 0.0);
        assert_eq!(ratio(6.0, 3.0), 2.0);
    }

    #[test]
    fn test_per_variant_averages() {
        let runs = vec![
            run(Variant::Native, 10.0, Some(1.0), TestOutcome::True),
            run(Variant::Native, 20.0, None, TestOutcome::False),
            run(Variant::Native, 30.0, Some(3.0), TestOutcome::True),
            run(Variant::Lite, 5.0, Some(0.5), TestOutcome::Unknown),
        ];
        let c = compare(&runs, Variant::Native);

        assert_eq!(c.variants.len(), 2);
        // alphabetical: lite, native
        assert_eq!(c.variants[0].variant, Variant::Lite);
        let native = &c.variants[1];
        assert_eq!(native.runs, 3);
        assert_eq!(native.avg_duration, 20.0);
        assert_eq!(native.avg_cost, 2.0);
        assert_eq!(native.passed, 2);

        assert_eq!(
            c.ratios,
            vec![BaselineRatio {
                variant: Variant::Lite,
                time: 0.25,
                cost: 0.25,
            }]
        );
    }

    #[test]
    fn test_baseline_without_cost_gives_zero_ratio() {
        let runs = vec![
            run(Variant::Native, 10.0, None, TestOutcome::True),
            run(Variant::Optimized, 15.0, Some(2.0), TestOutcome::True),
        ];
        let c = compare(&runs, Variant::Native);
        assert_eq!(c.ratios[0].time, 1.5);
        assert_eq!(c.ratios[0].cost, 0.0);
    }

    #[test]
    fn test_no_ratios_without_baseline_or_others() {
        let only_native = vec![run(Variant::Native, 10.0, Some(1.0), TestOutcome::True)];
        assert!(compare(&only_native, Variant::Native).ratios.is_empty());

        let no_native = vec![
            run(Variant::Lite, 10.0, Some(1.0), TestOutcome::True),
            run(Variant::Optimized, 10.0, Some(1.0), TestOutcome::True),
        ];
        assert!(compare(&no_native, Variant::Native).ratios.is_empty());
    }

    #[test]
    fn test_render_empty_state() {
        let out = compare(&[], Variant::Native).render();
        assert!(out.contains("No results found"));
    }

    #[test]
    fn test_render_table() {
        let runs = vec![
            run(Variant::Native, 10.0, Some(1.0), TestOutcome::True),
            run(Variant::Baseline, 20.0, Some(3.0), TestOutcome::False),
        ];
        let out = compare(&runs, Variant::Native).render();
        assert!(out.contains("baseline     1         20.0s   $  3.0000     0/1"));
        assert!(out.contains("Time vs native"));
        assert!(out.contains("baseline       2.00x            3.00x"));
    }
}

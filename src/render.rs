//! Terminal and JSON rendering of comparison reports.
//!
//! Inline mode prints one row per comparison; side-by-side mode aligns base
//! and target in two columns. Both end with the same summary footer. Styling
//! goes through `console`, which already handles non-tty output; `--no-color`
//! turns it off explicitly.

use crate::compare::{CompareResult, CompareSummary, LayerDiff};
use crate::error::Result;
use crate::history::LayerInfo;
use clap::ValueEnum;
use console::style;
use indicatif::HumanBytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One row per layer pair
    Inline,
    /// Machine-readable report
    Json,
    /// Base and target in aligned columns
    SideBySide,
}

pub fn render(result: &CompareResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Inline => Ok(render_inline(result)),
        OutputFormat::SideBySide => Ok(render_side_by_side(result)),
    }
}

fn glyph(diff: LayerDiff) -> String {
    match diff {
        LayerDiff::Equal => style("=").dim().to_string(),
        LayerDiff::NotEqual => style("!").red().bold().to_string(),
        LayerDiff::Added => style("+").green().to_string(),
        LayerDiff::Removed => style("-").yellow().to_string(),
    }
}

/// First 12 hex characters, without the algorithm prefix.
fn short_digest(digest: &str) -> &str {
    let hex = digest.split_once(':').map_or(digest, |(_, hex)| hex);
    hex.get(..12).unwrap_or(hex)
}

fn describe_side(info: &LayerInfo) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(digest) = &info.digest {
        parts.push(short_digest(digest).to_string());
    }
    if let Some(size) = info.compressed_size {
        parts.push(HumanBytes(size.max(0) as u64).to_string());
    }
    if let Some(history) = &info.history {
        parts.push(history.clone());
    }
    if parts.is_empty() {
        "(empty layer)".to_string()
    } else {
        parts.join("  ")
    }
}

fn render_inline(result: &CompareResult) -> String {
    let mut out = String::new();
    for (index, row) in result.comparisons.iter().enumerate() {
        let text = match (&row.base, &row.target) {
            (Some(base), Some(target)) if row.diff == LayerDiff::NotEqual => {
                format!("{} | {}", describe_side(base), describe_side(target))
            }
            (Some(base), _) => describe_side(base),
            (None, Some(target)) => describe_side(target),
            (None, None) => continue,
        };
        out.push_str(&format!("{:>3}  {}  {}\n", index, glyph(row.diff), text));
    }
    out.push('\n');
    out.push_str(&render_summary(&result.summary));
    out
}

fn render_side_by_side(result: &CompareResult) -> String {
    let cells: Vec<(String, String, LayerDiff)> = result
        .comparisons
        .iter()
        .map(|row| {
            let base = row.base.as_ref().map(describe_side).unwrap_or_default();
            let target = row.target.as_ref().map(describe_side).unwrap_or_default();
            (base, target, row.diff)
        })
        .collect();
    let width = cells
        .iter()
        .map(|(base, _, _)| base.chars().count())
        .max()
        .unwrap_or(0)
        .max("base".len());

    let mut out = String::new();
    out.push_str(&format!(
        "{:>3}  {}     {}\n",
        "",
        style(format!("{:<width$}", "base")).bold(),
        style("target").bold(),
    ));
    for (index, (base, target, diff)) in cells.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<width$}  {}  {}\n",
            index,
            base,
            glyph(*diff),
            target,
        ));
    }
    out.push('\n');
    out.push_str(&render_summary(&result.summary));
    out
}

fn render_summary(summary: &CompareSummary) -> String {
    let verdict = if summary.are_equal {
        style("images are identical").green().to_string()
    } else {
        style("images differ").red().to_string()
    };
    let last_common = if summary.last_common_layer_index < 0 {
        "none".to_string()
    } else {
        summary.last_common_layer_index.to_string()
    };
    format!(
        "{}\ntarget includes all base layers: {}\nlast common layer index: {}\n",
        verdict,
        if summary.target_includes_all_base_layers {
            "yes"
        } else {
            "no"
        },
        last_common,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::compare_layers;
    use console::strip_ansi_codes;

    fn layer(digest: &str) -> LayerInfo {
        LayerInfo {
            digest: Some(digest.to_string()),
            history: None,
            compressed_size: None,
        }
    }

    #[test]
    fn short_digest_strips_prefix_and_truncates() {
        assert_eq!(
            short_digest("sha256:0123456789abcdef0123456789abcdef"),
            "0123456789ab"
        );
        assert_eq!(short_digest("short"), "short");
    }

    #[test]
    fn side_with_nothing_set_reads_as_empty_layer() {
        let info = LayerInfo {
            digest: None,
            history: None,
            compressed_size: None,
        };
        assert_eq!(describe_side(&info), "(empty layer)");
    }

    #[test]
    fn side_joins_digest_size_and_history() {
        let info = LayerInfo {
            digest: Some("sha256:aabbccddeeff00112233".to_string()),
            history: Some("RUN apk add curl".to_string()),
            compressed_size: Some(2048),
        };
        let text = describe_side(&info);
        assert!(text.starts_with("aabbccddeeff  2"));
        assert!(text.contains("KiB"));
        assert!(text.ends_with("RUN apk add curl"));
    }

    #[test]
    fn inline_marks_each_row_and_appends_summary() {
        let base = vec![layer("sha256:aaa1111111111111"), layer("sha256:bbb2222222222222")];
        let target = vec![
            layer("sha256:aaa1111111111111"),
            layer("sha256:ccc3333333333333"),
            layer("sha256:ddd4444444444444"),
        ];
        let rendered = render_inline(&compare_layers(&base, &target));
        let plain = strip_ansi_codes(&rendered).to_string();

        assert!(plain.contains("  0  =  aaa111111111"));
        assert!(plain.contains("  1  !  bbb222222222 | ccc333333333"));
        assert!(plain.contains("  2  +  ddd444444444"));
        assert!(plain.contains("images differ"));
        assert!(plain.contains("target includes all base layers: no"));
        assert!(plain.contains("last common layer index: 0"));
    }

    #[test]
    fn inline_reports_identical_images() {
        let layers = vec![layer("sha256:aaa1111111111111")];
        let rendered = render_inline(&compare_layers(&layers, &layers));
        let plain = strip_ansi_codes(&rendered).to_string();

        assert!(plain.contains("images are identical"));
        assert!(plain.contains("target includes all base layers: yes"));
        assert!(plain.contains("last common layer index: 0"));
    }

    #[test]
    fn side_by_side_pads_base_column() {
        let base = vec![layer("sha256:aaa1111111111111")];
        let target = vec![
            layer("sha256:aaa1111111111111"),
            layer("sha256:bbb2222222222222"),
        ];
        let rendered = render_side_by_side(&compare_layers(&base, &target));
        let plain = strip_ansi_codes(&rendered).to_string();
        let lines: Vec<&str> = plain.lines().collect();

        assert!(lines[0].contains("base"));
        assert!(lines[0].contains("target"));
        assert!(lines[1].contains("=  aaa111111111"));
        // removed-side rows keep the base column blank but aligned
        assert!(lines[2].starts_with("  1  "));
        assert!(lines[2].contains("+  bbb222222222"));
    }

    #[test]
    fn json_serializes_the_full_report() {
        let base = vec![layer("sha256:aaa1111111111111")];
        let target = vec![layer("sha256:aaa1111111111111")];
        let rendered = render(&compare_layers(&base, &target), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["summary"]["areEqual"], serde_json::json!(true));
        assert_eq!(value["comparisons"][0]["diff"], serde_json::json!("equal"));
    }
}

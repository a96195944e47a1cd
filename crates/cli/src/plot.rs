//! Charts for `reelsync compare`: per-period bars and cumulative totals.
//!
//! SVG goes to a file; the text chart goes to stdout.

use std::fmt::Write as _;

use reelsync_recon::model::{BucketRow, CumulativeRow};

// ── Layout ──────────────────────────────────────────────────────────

const WIDTH: f64 = 900.0;
const PANEL_HEIGHT: f64 = 220.0;
const MARGIN_LEFT: f64 = 56.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 40.0;
const PANEL_GAP: f64 = 70.0;
const COLOR_A: &str = "#e5a00d";
const COLOR_B: &str = "#00b020";
const TEXT_BAR_WIDTH: usize = 30;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Round up to a tick-friendly maximum.
fn nice_max(max: usize) -> usize {
    if max <= 5 {
        return max.max(1);
    }
    let magnitude = 10usize.pow((max as f64).log10().floor() as u32);
    let step = if max <= 2 * magnitude {
        magnitude / 5
    } else if max <= 5 * magnitude {
        magnitude / 2
    } else {
        magnitude
    }
    .max(1);
    max.div_ceil(step) * step
}

fn axis(svg: &mut String, top: f64, max: usize, title: &str) {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let bottom = top + PANEL_HEIGHT;
    let _ = writeln!(
        svg,
        r#"<text x="{MARGIN_LEFT}" y="{:.1}" font-size="14" font-weight="bold">{}</text>"#,
        top - 12.0,
        escape(title)
    );
    for i in 0..=4 {
        let value = max as f64 * i as f64 / 4.0;
        let y = bottom - PANEL_HEIGHT * i as f64 / 4.0;
        let _ = writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#ddd"/>"##,
            MARGIN_LEFT + plot_w
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 6.0,
            y + 4.0,
            value.round() as usize
        );
    }
}

/// Label every period when few, otherwise about a dozen evenly spaced.
fn label_stride(n: usize) -> usize {
    n.div_ceil(12).max(1)
}

fn x_label(svg: &mut String, x: f64, y: f64, label: &str) {
    let _ = writeln!(
        svg,
        r#"<text x="{x:.1}" y="{:.1}" font-size="10" text-anchor="middle">{}</text>"#,
        y + 14.0,
        escape(label)
    );
}

pub fn render_svg(
    buckets: &[BucketRow],
    cumulative: &[CumulativeRow],
    label_a: &str,
    label_b: &str,
) -> String {
    let height = MARGIN_TOP + 2.0 * PANEL_HEIGHT + PANEL_GAP + 50.0;
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}" font-family="sans-serif">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);

    // Legend
    for (i, (label, color)) in [(label_a, COLOR_A), (label_b, COLOR_B)].iter().enumerate() {
        let x = WIDTH - MARGIN_RIGHT - 260.0 + i as f64 * 130.0;
        let _ = writeln!(
            svg,
            r#"<rect x="{x:.1}" y="10" width="12" height="12" fill="{color}"/><text x="{:.1}" y="20" font-size="12">{}</text>"#,
            x + 16.0,
            escape(label)
        );
    }

    let n = buckets.len();
    if n == 0 {
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="14" text-anchor="middle">no data</text>"#,
            WIDTH / 2.0,
            height / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    }
    let stride = label_stride(n);

    // Per-period bars
    let top = MARGIN_TOP;
    let bar_max = nice_max(buckets.iter().map(|b| b.count_a.max(b.count_b)).max().unwrap_or(0));
    axis(&mut svg, top, bar_max, "Watches per period");
    let slot = plot_w / n as f64;
    let bar_w = (slot * 0.4).max(1.0);
    for (i, b) in buckets.iter().enumerate() {
        let x0 = MARGIN_LEFT + slot * i as f64 + slot * 0.1;
        for (j, (count, color)) in [(b.count_a, COLOR_A), (b.count_b, COLOR_B)].iter().enumerate() {
            let h = PANEL_HEIGHT * *count as f64 / bar_max as f64;
            let _ = writeln!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="{bar_w:.1}" height="{h:.1}" fill="{color}"><title>{} {}: {}</title></rect>"#,
                x0 + bar_w * j as f64,
                top + PANEL_HEIGHT - h,
                escape(&b.label),
                escape(if j == 0 { label_a } else { label_b }),
                count
            );
        }
        if i % stride == 0 {
            x_label(&mut svg, MARGIN_LEFT + slot * (i as f64 + 0.5), top + PANEL_HEIGHT, &b.label);
        }
    }

    // Cumulative lines
    let top = MARGIN_TOP + PANEL_HEIGHT + PANEL_GAP;
    let line_max = nice_max(
        cumulative
            .last()
            .map(|c| c.total_a.max(c.total_b))
            .unwrap_or(0),
    );
    axis(&mut svg, top, line_max, "Cumulative watches");
    for (j, color) in [COLOR_A, COLOR_B].iter().enumerate() {
        let points: Vec<String> = cumulative
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let total = if j == 0 { c.total_a } else { c.total_b };
                format!(
                    "{:.1},{:.1}",
                    MARGIN_LEFT + slot * (i as f64 + 0.5),
                    top + PANEL_HEIGHT - PANEL_HEIGHT * total as f64 / line_max as f64
                )
            })
            .collect();
        let _ = writeln!(
            svg,
            r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="2"/>"#,
            points.join(" ")
        );
    }
    for (i, c) in cumulative.iter().enumerate() {
        if i % stride == 0 {
            x_label(&mut svg, MARGIN_LEFT + slot * (i as f64 + 0.5), top + PANEL_HEIGHT, &c.label);
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// One line per period: both counts as bars, then the running totals.
pub fn render_text(
    buckets: &[BucketRow],
    cumulative: &[CumulativeRow],
    label_a: &str,
    label_b: &str,
) -> String {
    let mut out = String::new();
    if buckets.is_empty() {
        out.push_str("(no data to chart)\n");
        return out;
    }
    let max = buckets
        .iter()
        .map(|b| b.count_a.max(b.count_b))
        .max()
        .unwrap_or(0)
        .max(1);
    let label_w = buckets.iter().map(|b| b.label.len()).max().unwrap_or(0);
    let bar = |n: usize| -> String {
        let len = (n * TEXT_BAR_WIDTH).div_ceil(max);
        "#".repeat(len)
    };

    let _ = writeln!(
        out,
        "{:label_w$}  {:<w$}  {:<w$}  totals",
        "",
        label_a,
        label_b,
        w = TEXT_BAR_WIDTH + 5
    );
    for (b, c) in buckets.iter().zip(cumulative) {
        let _ = writeln!(
            out,
            "{:label_w$}  {:<w$}  {:<w$}  {}/{}",
            b.label,
            format!("{} {}", bar(b.count_a), b.count_a),
            format!("{} {}", bar(b.count_b), b.count_b),
            c.total_a,
            c.total_b,
            w = TEXT_BAR_WIDTH + 5
        );
    }
    out
}

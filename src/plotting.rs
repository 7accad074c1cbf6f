//! Heatmap and scatter PNG output via `plotly` + its `kaleido` static
//! exporter, in place of the source's matplotlib/seaborn figures.

use std::path::Path;

use plotly::common::{ColorScale, ColorScalePalette, Marker, Title};
use plotly::layout::{Axis, Layout};
use plotly::{HeatMap, ImageFormat, Plot, Scatter};

use crate::error::DsaError;
use crate::scorer::PairRow;

const VMIN: f64 = 20.0;
const VMAX: f64 = 130.0;
const VCENTER: f64 = 75.0;

/// `L x L` residue map coloured by score, vmin/vmax 20/130 centred on 75.
pub fn plot_heatmap(rows: &[PairRow], l_prime: usize, path: &Path, title: &str) -> Result<(), DsaError> {
    let mut plot = Plot::new();

    if rows.is_empty() || l_prime == 0 {
        plot.set_layout(Layout::new().title(Title::with_text(format!("{title} (no data)"))));
        return write_png(&plot, path, 1000, 800);
    }

    let mut z = vec![vec![f64::NAN; l_prime]; l_prime];
    for row in rows {
        if let Some((i, j)) = parse_pair_key(&row.key) {
            if i < l_prime && j < l_prime {
                z[i][j] = row.score;
                z[j][i] = row.score;
            }
        }
    }

    let heatmap = HeatMap::new_z(z)
        .zmin(VMIN)
        .zmax(VMAX)
        .zmid(VCENTER)
        .color_scale(ColorScale::Palette(ColorScalePalette::Rainbow))
        .reverse_scale(true);

    plot.add_trace(heatmap);
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(title.to_string()))
            .x_axis(Axis::new().title(Title::with_text("Residue Number")))
            .y_axis(Axis::new().title(Title::with_text("Residue Number")))
            .width(1000)
            .height(900),
    );

    write_png(&plot, path, 1000, 900)
}

/// Scatter of mean Ca-Ca distance vs DSA score.
pub fn plot_distance_score(rows: &[PairRow], path: &Path, title: &str) -> Result<(), DsaError> {
    let mut plot = Plot::new();

    if rows.is_empty() {
        plot.set_layout(Layout::new().title(Title::with_text(format!("{title} (no data)"))));
        return write_png(&plot, path, 1000, 700);
    }

    let x: Vec<f64> = rows.iter().map(|r| r.mean).collect();
    let y: Vec<f64> = rows.iter().map(|r| r.score).collect();

    let scatter = Scatter::new(x, y)
        .mode(plotly::common::Mode::Markers)
        .marker(Marker::new().color_array(rows.iter().map(|r| r.score).collect::<Vec<_>>()).size(6));

    plot.add_trace(scatter);
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(title.to_string()))
            .x_axis(Axis::new().title(Title::with_text("Ca-Ca distance (A)")))
            .y_axis(Axis::new().title(Title::with_text("DSA score (mean / std)")))
            .width(1000)
            .height(700),
    );

    write_png(&plot, path, 1000, 700)
}

fn write_png(plot: &Plot, path: &Path, width: usize, height: usize) -> Result<(), DsaError> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("plot");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    plot.write_image(dir.join(stem), ImageFormat::PNG, width, height, 1.0);
    Ok(())
}

fn parse_pair_key(key: &str) -> Option<(usize, usize)> {
    let (a, b) = key.split_once(", ")?;
    let i: usize = a.trim().parse().ok()?;
    let j: usize = b.trim().parse().ok()?;
    Some((i - 1, j - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_key_converts_to_zero_indexed() {
        assert_eq!(parse_pair_key("1, 3"), Some((0, 2)));
    }
}

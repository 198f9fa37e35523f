// weather_summary - Daily weather summaries for a fixed set of cities
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Temperature trend charts.
//!
//! Charts are drawn into an in-memory RGB buffer and encoded as PNG. Text is
//! rendered with a bundled copy of DejaVu Sans registered as the sans-serif font.

use crate::store::DailySummary;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::register_font;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;
use thiserror::Error;

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 500;

const FONT_FAMILY: &str = "sans-serif";
const FONT_BYTES: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/DejaVuSans.ttf"));

/// Most date labels drawn on the x axis.
const MAX_DATE_LABELS: usize = 10;

const AVG_COLOR: RGBColor = BLUE;
const MAX_COLOR: RGBColor = RED;
const MIN_COLOR: RGBColor = GREEN;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("no summaries to plot")]
    Empty,
    #[error("unable to load chart font: {0}")]
    Font(String),
    #[error("unable to draw chart: {0}")]
    Draw(String),
    #[error("unable to encode chart: {0}")]
    Encode(#[from] image::ImageError),
}

fn draw_err<E: fmt::Display>(e: E) -> ChartError {
    ChartError::Draw(e.to_string())
}

/// Register the bundled font with plotters, once per process.
fn ensure_font() -> Result<(), ChartError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).map_err(|_| "invalid font data".to_string()))
        .clone()
        .map_err(ChartError::Font)
}

/// Render average, max, and min temperature of `series` for `city` in order as a PNG.
pub fn render_trends(city: &str, series: &[DailySummary]) -> Result<Vec<u8>, ChartError> {
    if series.is_empty() {
        return Err(ChartError::Empty);
    }

    ensure_font()?;

    let mut pixels = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let days = series.len() as f64;
        let mut chart = ChartBuilder::on(&root)
            .caption(format!("Temperature Trends for {}", city), (FONT_FAMILY, 24))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5..days - 0.5, temperature_range(series))
            .map_err(draw_err)?;

        let format_x = |x: &f64| date_label(series, *x);
        chart
            .configure_mesh()
            .x_labels(series.len().min(MAX_DATE_LABELS))
            .x_label_formatter(&format_x)
            .x_desc("Date")
            .y_desc("Temperature (°C)")
            .label_style((FONT_FAMILY, 14))
            .light_line_style(BLACK.mix(0.1))
            .draw()
            .map_err(draw_err)?;

        let lines: [(&str, RGBColor, fn(&DailySummary) -> f64); 3] = [
            ("Avg Temp", AVG_COLOR, |s| s.avg_temp),
            ("Max Temp", MAX_COLOR, |s| s.max_temp),
            ("Min Temp", MIN_COLOR, |s| s.min_temp),
        ];

        for (label, color, value) in lines {
            let points: Vec<(f64, f64)> = series
                .iter()
                .enumerate()
                .map(|(i, s)| (i as f64, value(s)))
                .collect();

            chart
                .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
                .map_err(draw_err)?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            chart
                .draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))
                .map_err(draw_err)?;
        }

        chart
            .configure_series_labels()
            .label_font((FONT_FAMILY, 14))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&pixels, WIDTH, HEIGHT, ColorType::Rgb8)?;
    Ok(png)
}

/// Render a chart as with [`render_trends`] and base64 encode it.
pub fn render_trends_base64(city: &str, series: &[DailySummary]) -> Result<String, ChartError> {
    render_trends(city, series).map(|png| base64::engine::general_purpose::STANDARD.encode(png))
}

/// Date of the summary plotted at `x`, empty between days and outside the series.
fn date_label(series: &[DailySummary], x: f64) -> String {
    let index = x.round();
    if (x - index).abs() > 1e-6 || index < 0.0 {
        return String::new();
    }

    series
        .get(index as usize)
        .map(|s| s.date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn temperature_range(series: &[DailySummary]) -> Range<f64> {
    let (lo, hi) = series
        .iter()
        .flat_map(|s| [s.avg_temp, s.max_temp, s.min_temp])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));

    let padding = if hi - lo > 1e-6 { (hi - lo) * 0.1 } else { 1.0 };
    (lo - padding)..(hi + padding)
}

#[cfg(test)]
mod tests {
    use super::{date_label, render_trends, render_trends_base64, temperature_range, ChartError};
    use crate::store::DailySummary;
    use base64::Engine;
    use chrono::NaiveDate;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn series(days: u32) -> Vec<DailySummary> {
        (1..=days)
            .map(|d| DailySummary {
                id: Some(d as i64),
                date: NaiveDate::from_ymd_opt(2024, 7, d).unwrap(),
                city: "Kolkata".to_owned(),
                avg_temp: 30.0 + d as f64,
                max_temp: 34.0 + d as f64,
                min_temp: 26.0 + d as f64,
                dominant_condition: "Clouds".to_owned(),
            })
            .collect()
    }

    #[test]
    fn test_empty_series() {
        assert!(matches!(render_trends("Kolkata", &[]), Err(ChartError::Empty)));
    }

    #[test]
    fn test_renders_png() {
        let png = render_trends("Kolkata", &series(5)).unwrap();
        assert_eq!(PNG_MAGIC, png[..8]);
    }

    #[test]
    fn test_single_day() {
        let png = render_trends("Kolkata", &series(1)).unwrap();
        assert_eq!(PNG_MAGIC, png[..8]);
    }

    #[test]
    fn test_base64_decodes_to_png() {
        let encoded = render_trends_base64("Kolkata", &series(3)).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(PNG_MAGIC, decoded[..8]);
    }

    #[test]
    fn test_renders_repeatedly() {
        // Font registration happens once and must not fail on later charts
        for days in [2, 4] {
            let png = render_trends("Kolkata", &series(days)).unwrap();
            assert_eq!(PNG_MAGIC, png[..8]);
        }
    }

    #[test]
    fn test_date_labels() {
        let days = series(3);
        assert_eq!("2024-07-01", date_label(&days, 0.0));
        assert_eq!("2024-07-03", date_label(&days, 2.0));
        assert_eq!("", date_label(&days, 0.5));
        assert_eq!("", date_label(&days, -1.0));
        assert_eq!("", date_label(&days, 3.0));
    }

    #[test]
    fn test_range_is_padded() {
        let range = temperature_range(&series(2));
        assert!(range.start < 27.0);
        assert!(range.end > 36.0);
    }

    #[test]
    fn test_range_flat_series() {
        let mut flat = series(1);
        flat[0].max_temp = flat[0].avg_temp;
        flat[0].min_temp = flat[0].avg_temp;

        let range = temperature_range(&flat);
        assert_eq!(30.0, range.start);
        assert_eq!(32.0, range.end);
    }
}

//! Rasterization through the plotters bitmap backend.
//!
//! Categories are laid out on an index axis with the labels painted by the
//! tick formatter, which handles season strings and team names uniformly.

use crate::transform::Series;
use crate::RenderError;
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontTransform;
use statviz_model::{ChartKind, ChartSpec, Theme, YFormat};

const WIDTH: u32 = 960;
const HEIGHT: u32 = 540;

struct Palette {
    background: RGBColor,
    foreground: RGBColor,
    grid: RGBColor,
    series: RGBColor,
}

fn palette(theme: &Theme) -> Palette {
    match theme {
        Theme::Light => Palette {
            background: RGBColor(255, 255, 255),
            foreground: RGBColor(40, 40, 40),
            grid: RGBColor(220, 220, 220),
            series: RGBColor(31, 119, 180),
        },
        Theme::Dark => Palette {
            background: RGBColor(24, 26, 27),
            foreground: RGBColor(230, 230, 230),
            grid: RGBColor(70, 70, 70),
            series: RGBColor(99, 184, 255),
        },
    }
}

/// The raster backend only supports quarter-turn text, so requested angles
/// snap to the nearest one.
fn snap_rotation(degrees: i32) -> FontTransform {
    let quarter = ((f64::from(degrees) / 90.0).round() as i32).rem_euclid(4);
    match quarter {
        1 => FontTransform::Rotate90,
        2 => FontTransform::Rotate180,
        3 => FontTransform::Rotate270,
        _ => FontTransform::None,
    }
}

fn format_tick(value: f64, fmt: Option<YFormat>) -> String {
    match fmt {
        Some(fmt) => fmt.format(value),
        None => {
            if value.fract() == 0.0 {
                format!("{:.0}", value)
            } else {
                format!("{:.1}", value)
            }
        }
    }
}

/// Draw the series as the requested chart kind and encode it as PNG.
pub(crate) fn chart(series: &Series, spec: &ChartSpec) -> Result<Vec<u8>, RenderError> {
    let colors = palette(&spec.options.theme);
    let n = series.len();
    let rotated = !matches!(snap_rotation(spec.options.x_rotate), FontTransform::None);

    let (y_low, y_high) = y_range(&series.values, spec.kind);
    let x_range = -0.5f64..(n as f64 - 0.5);

    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&colors.background)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let mut builder = ChartBuilder::on(&root);
        builder
            .margin(18)
            .x_label_area_size(if rotated { 90 } else { 44 })
            .y_label_area_size(64);
        if let Some(title) = &spec.title {
            builder.caption(title, ("sans-serif", 24).into_font().color(&colors.foreground));
        }
        let mut chart = builder
            .build_cartesian_2d(x_range, y_low..y_high)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let labels = &series.labels;
        let x_label_style = ("sans-serif", 13)
            .into_font()
            .color(&colors.foreground)
            .transform(snap_rotation(spec.options.x_rotate));
        let y_fmt = spec.options.y_fmt;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(&colors.grid)
            .axis_style(&colors.foreground)
            .x_labels(n.min(12))
            .x_label_formatter(&|v: &f64| {
                let idx = v.round() as i64;
                if (v - idx as f64).abs() > 0.01 || idx < 0 || idx as usize >= labels.len() {
                    String::new()
                } else {
                    labels[idx as usize].clone()
                }
            })
            .y_label_formatter(&|v: &f64| format_tick(*v, y_fmt))
            .x_desc(spec.x_label.clone().unwrap_or_else(|| spec.x.clone()))
            .y_desc(spec.y_label.clone().unwrap_or_else(|| spec.y.clone()))
            .label_style(("sans-serif", 13).into_font().color(&colors.foreground))
            .x_label_style(x_label_style)
            .axis_desc_style(("sans-serif", 15).into_font().color(&colors.foreground))
            .draw()
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        match spec.kind {
            ChartKind::Line => {
                let points: Vec<(f64, f64)> = series
                    .values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i as f64, *v))
                    .collect();
                chart
                    .draw_series(LineSeries::new(
                        points.iter().copied(),
                        ShapeStyle::from(&colors.series).stroke_width(2),
                    ))
                    .map_err(|e| RenderError::Backend(e.to_string()))?;
                chart
                    .draw_series(
                        points
                            .iter()
                            .map(|(x, y)| Circle::new((*x, *y), 3, colors.series.filled())),
                    )
                    .map_err(|e| RenderError::Backend(e.to_string()))?;
            }
            ChartKind::Bar => {
                chart
                    .draw_series(series.values.iter().enumerate().map(|(i, v)| {
                        let x = i as f64;
                        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, *v)], colors.series.filled())
                    }))
                    .map_err(|e| RenderError::Backend(e.to_string()))?;
            }
        }

        root.present().map_err(|e| RenderError::Backend(e.to_string()))?;
    }

    encode_png(&buffer)
}

/// Explicit placeholder for a result that shaped down to nothing.
pub(crate) fn no_data(theme: &Theme) -> Result<Vec<u8>, RenderError> {
    let colors = palette(theme);

    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&colors.background)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let style = ("sans-serif", 30)
            .into_font()
            .color(&colors.foreground)
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw(&Text::new(
            "no data",
            ((WIDTH / 2) as i32, (HEIGHT / 2) as i32),
            style,
        ))
        .map_err(|e| RenderError::Backend(e.to_string()))?;

        root.present().map_err(|e| RenderError::Backend(e.to_string()))?;
    }

    encode_png(&buffer)
}

fn y_range(values: &[f64], kind: ChartKind) -> (f64, f64) {
    let data_min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let span = data_max - data_min;
    let pad = if span == 0.0 { 1.0 } else { span * 0.1 };

    match kind {
        // Bars grow from the zero line
        ChartKind::Bar => (data_min.min(0.0), data_max.max(0.0) + pad),
        ChartKind::Line => (data_min - pad, data_max + pad),
    }
}

fn encode_png(rgb: &[u8]) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(rgb, WIDTH, HEIGHT, ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out)
}

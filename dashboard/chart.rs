//! PNG charts drawn with `imageproc`: a titled plot area with grid, tick values, axis labels and
//! a legend, holding either per-run polylines or grouped bars.
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use noisy_float::prelude::*;
use std::io;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 400;
const MARGIN_LEFT: u32 = 76;
const MARGIN_RIGHT: u32 = 76;
const MARGIN_TOP: u32 = 64;
const MARGIN_BOTTOM: u32 = 48;
const GRID_LINES: u32 = 5;
const TITLE_PX: f32 = 16.0;
const TEXT_PX: f32 = 12.0;
const SWATCH: u32 = 10;

const FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
];

pub fn font() -> io::Result<FontRef<'static>> {
    FontRef::try_from_slice(FONT_DATA)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// A labelled series of per-run values.
pub struct Series {
    pub label: String,
    pub values: Vec<f64>,
}

/// Value range of one y axis. Always contains zero.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Range {
    lo: f64,
    hi: f64,
}

impl Range {
    /// `[min(0, lo), max(0, hi)]` over the finite values.
    fn including_zero<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Range {
        let finite = values
            .into_iter()
            .filter_map(|&v| R64::try_new(v))
            .collect::<Vec<_>>();
        let lo = finite.iter().min().map_or(0.0, |v| v.raw()).min(0.0);
        let hi = finite.iter().max().map_or(0.0, |v| v.raw()).max(0.0);
        Range { lo, hi }
    }

    fn span(&self) -> f64 {
        self.hi - self.lo
    }

    fn tick(&self, i: u32) -> f64 {
        self.lo + self.span() * i as f64 / GRID_LINES as f64
    }
}

/// The plot area inside the margins, mapping data coordinates to pixels.
struct Frame {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
}

impl Frame {
    fn new(width: u32, height: u32) -> Frame {
        Frame {
            left: MARGIN_LEFT as i32,
            top: MARGIN_TOP as i32,
            width: width.saturating_sub(MARGIN_LEFT + MARGIN_RIGHT).max(1),
            height: height.saturating_sub(MARGIN_TOP + MARGIN_BOTTOM).max(1),
        }
    }
    fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }
    fn right(&self) -> i32 {
        self.left + self.width as i32
    }
    /// Pixel row of `value` on `range`. Values outside the range stick to the frame edge.
    fn y(&self, value: f64, range: Range) -> i32 {
        let t = if range.span() > 0.0 {
            ((value - range.lo) / range.span()).max(0.0).min(1.0)
        } else {
            0.0
        };
        self.bottom() - (t * self.height as f64).round() as i32
    }
    /// Inclusive pixel columns of bar `m` in group `c`.
    fn bar_columns(&self, num_groups: usize, num_metrics: usize, c: usize, m: usize) -> (i32, i32) {
        let slot = self.width as f64 / num_groups as f64;
        let bar = slot * 0.8 / num_metrics as f64;
        let start = self.left as f64 + c as f64 * slot + slot * 0.1;
        let x0 = (start + m as f64 * bar).round() as i32;
        let x1 = (start + (m + 1) as f64 * bar).round() as i32 - 2;
        (x0, x1.max(x0))
    }
}

fn fill(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let (left, top) = (x0.min(x1), y0.min(y1));
    let width = (x0 - x1).unsigned_abs() + 1;
    let height = (y0 - y1).unsigned_abs() + 1;
    draw_filled_rect_mut(img, Rect::at(left, top).of_size(width, height), color);
}

fn hline(img: &mut RgbImage, frame: &Frame, y: i32, color: Rgb<u8>) {
    draw_line_segment_mut(
        img,
        (frame.left as f32, y as f32),
        (frame.right() as f32, y as f32),
        color,
    );
}

fn text(img: &mut RgbImage, font: &FontRef, x: i32, y: i32, px: f32, s: &str) {
    draw_text_mut(img, AXIS, x, y, PxScale::from(px), font, s);
}

fn text_width(font: &FontRef, px: f32, s: &str) -> i32 {
    text_size(PxScale::from(px), font, s).0 as i32
}

fn tick_label(value: f64) -> String {
    if value.abs() >= 100.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.3}", value)
    }
}

fn blank(width: u32, height: u32) -> (RgbImage, Frame) {
    (RgbImage::from_pixel(width, height, BACKGROUND), Frame::new(width, height))
}

/// Title on top, legend entries below it.
fn header(img: &mut RgbImage, font: &FontRef, title: &str, legend: &[(&str, Rgb<u8>)]) {
    text(img, font, MARGIN_LEFT as i32, 6, TITLE_PX, title);
    let mut x = MARGIN_LEFT as i32;
    for &(label, color) in legend.iter() {
        draw_filled_rect_mut(img, Rect::at(x, 30).of_size(SWATCH, SWATCH), color);
        text(img, font, x + SWATCH as i32 + 4, 28, TEXT_PX, label);
        x += SWATCH as i32 + 4 + text_width(font, TEXT_PX, label) + 16;
    }
}

/// Grid lines with tick values along the left axis.
fn grid(img: &mut RgbImage, font: &FontRef, frame: &Frame, range: Range) {
    for i in 0..=GRID_LINES {
        let value = range.tick(i);
        let y = frame.y(value, range);
        hline(img, frame, y, GRID);
        let label = tick_label(value);
        let x = frame.left - 6 - text_width(font, TEXT_PX, &label);
        text(img, font, x, y - TEXT_PX as i32 / 2, TEXT_PX, &label);
    }
}

/// Tick values and a name for an independently scaled axis on the right.
fn right_axis(img: &mut RgbImage, font: &FontRef, frame: &Frame, range: Range, name: &str) {
    draw_line_segment_mut(
        img,
        (frame.right() as f32, frame.top as f32),
        (frame.right() as f32, frame.bottom() as f32),
        AXIS,
    );
    for i in 0..=GRID_LINES {
        let value = range.tick(i);
        let y = frame.y(value, range);
        text(
            img,
            font,
            frame.right() + 6,
            y - TEXT_PX as i32 / 2,
            TEXT_PX,
            &tick_label(value),
        );
    }
    let x = frame.right() - text_width(font, TEXT_PX, name);
    text(img, font, x, frame.top - 16, TEXT_PX, name);
}

fn axes(img: &mut RgbImage, font: &FontRef, frame: &Frame, x_label: &str, y_label: &str) {
    draw_hollow_rect_mut(
        img,
        Rect::at(frame.left, frame.top).of_size(frame.width, frame.height),
        AXIS,
    );
    let x = frame.left + (frame.width as i32 - text_width(font, TEXT_PX, x_label)) / 2;
    text(img, font, x, frame.bottom() + 24, TEXT_PX, x_label);
    text(img, font, frame.left, frame.top - 16, TEXT_PX, y_label);
}

/// One polyline per series over run numbers 1..=n, sharing the y axis.
pub fn line_chart(
    font: &FontRef,
    title: &str,
    y_label: &str,
    series: &[Series],
    width: u32,
    height: u32,
) -> RgbImage {
    let (mut img, frame) = blank(width, height);
    let range = Range::including_zero(series.iter().flat_map(|s| s.values.iter()));
    let legend = series
        .iter()
        .enumerate()
        .map(|(i, s)| (s.label.as_str(), PALETTE[i % PALETTE.len()]))
        .collect::<Vec<_>>();
    header(&mut img, font, title, &legend);
    grid(&mut img, font, &frame, range);
    axes(&mut img, font, &frame, "Run #", y_label);

    let max_len = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let step = frame.width as f64 / max_len.max(2).saturating_sub(1) as f64;
    let x_of = |k: usize| frame.left + (k as f64 * step).round() as i32;

    let every = (max_len + 9) / 10;
    for k in (0..max_len).step_by(every.max(1)) {
        let label = (k + 1).to_string();
        let x = x_of(k) - text_width(font, TEXT_PX, &label) / 2;
        text(&mut img, font, x, frame.bottom() + 6, TEXT_PX, &label);
    }

    for (i, s) in series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let points = s
            .values
            .iter()
            .enumerate()
            .map(|(k, &v)| (x_of(k), frame.y(v, range)))
            .collect::<Vec<_>>();
        for pair in points.windows(2) {
            draw_line_segment_mut(
                &mut img,
                (pair[0].0 as f32, pair[0].1 as f32),
                (pair[1].0 as f32, pair[1].1 as f32),
                color,
            );
        }
        for &(x, y) in points.iter() {
            fill(&mut img, x - 2, y - 2, x + 2, y + 2, color);
        }
    }
    img
}

/// Bars grouped by category, `groups[c][m]` being metric `m` of category `c`. Each metric is
/// scaled to its own range including zero; the first metric is read off the left axis, the
/// second off the right. Negative values hang below their metric's zero row.
pub fn grouped_bar_chart(
    font: &FontRef,
    title: &str,
    categories: &[String],
    metrics: &[&str],
    groups: &[Vec<f64>],
    width: u32,
    height: u32,
) -> RgbImage {
    let (mut img, frame) = blank(width, height);
    let legend = metrics
        .iter()
        .enumerate()
        .map(|(m, &name)| (name, PALETTE[m % PALETTE.len()]))
        .collect::<Vec<_>>();
    header(&mut img, font, title, &legend);

    let num_metrics = groups.iter().map(|g| g.len()).max().unwrap_or(0);
    if groups.is_empty() || num_metrics == 0 {
        axes(&mut img, font, &frame, "", "");
        return img;
    }
    let ranges = (0..num_metrics)
        .map(|m| Range::including_zero(groups.iter().filter_map(|g| g.get(m))))
        .collect::<Vec<Range>>();

    grid(&mut img, font, &frame, ranges[0]);
    if let (Some(range), Some(name)) = (ranges.get(1), metrics.get(1)) {
        right_axis(&mut img, font, &frame, *range, name);
    }
    axes(
        &mut img,
        font,
        &frame,
        "",
        metrics.first().copied().unwrap_or(""),
    );

    for (c, group) in groups.iter().enumerate() {
        for (m, &value) in group.iter().enumerate() {
            let (x0, x1) = frame.bar_columns(groups.len(), num_metrics, c, m);
            let zero = frame.y(0.0, ranges[m]);
            let end = frame.y(value, ranges[m]);
            if end != zero {
                fill(&mut img, x0, zero, x1, end, PALETTE[m % PALETTE.len()]);
            }
        }
        if let Some(category) = categories.get(c) {
            let (x0, _) = frame.bar_columns(groups.len(), num_metrics, c, 0);
            let (_, x1) = frame.bar_columns(groups.len(), num_metrics, c, num_metrics - 1);
            let x = (x0 + x1 - text_width(font, TEXT_PX, category)) / 2;
            text(&mut img, font, x, frame.bottom() + 6, TEXT_PX, category);
        }
    }

    for range in ranges.iter().filter(|r| r.lo < 0.0) {
        hline(&mut img, &frame, frame.y(0.0, *range), AXIS);
    }
    img
}

#[cfg(test)]
mod test {
    use super::*;

    fn series(values: Vec<f64>) -> Vec<Series> {
        vec![Series {
            label: "run.json".to_owned(),
            values,
        }]
    }

    fn categories() -> Vec<String> {
        vec!["Baseline".to_owned(), "Half-Precision".to_owned()]
    }

    /// Rows of column `x` inside the frame painted in `color`.
    fn painted_rows(img: &RgbImage, frame: &Frame, x: i32, color: Rgb<u8>) -> Vec<i32> {
        (frame.top + 1..frame.bottom())
            .filter(|&y| *img.get_pixel(x as u32, y as u32) == color)
            .collect()
    }

    #[test]
    fn charts_have_requested_dimensions() {
        let font = font().unwrap();
        let img = line_chart(
            &font,
            "t",
            "Time (s)",
            &series(vec![0.1, 0.2, 0.15]),
            WIDTH,
            HEIGHT,
        );
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        let groups = [vec![1.0, 2.0], vec![0.5, 2.0]];
        let img = grouped_bar_chart(&font, "t", &categories(), &["a", "b"], &groups, 320, 200);
        assert_eq!(img.dimensions(), (320, 200));
    }

    #[test]
    fn line_is_drawn_in_series_color() {
        let font = font().unwrap();
        let img = line_chart(&font, "t", "y", &series(vec![1.0, 1.0]), 320, 200);
        assert!(img.pixels().any(|p| *p == PALETTE[0]));
        assert!(!img.pixels().any(|p| *p == PALETTE[1]));
    }

    #[test]
    fn title_and_labels_are_rendered() {
        let font = font().unwrap();
        let plain = RgbImage::from_pixel(320, 200, BACKGROUND);
        let empty = series(vec![]);
        let img = line_chart(
            &font,
            "Execution Time per Run",
            "Time (s)",
            &empty,
            320,
            200,
        );
        let header_differs = (0..MARGIN_TOP)
            .flat_map(|y| (0..320).map(move |x| (x, y)))
            .any(|(x, y)| img.get_pixel(x, y) != plain.get_pixel(x, y));
        assert!(header_differs);
    }

    #[test]
    fn tallest_bar_reaches_the_top_of_the_frame() {
        let font = font().unwrap();
        let groups = [vec![2.0], vec![1.0]];
        let img = grouped_bar_chart(&font, "t", &categories(), &["a"], &groups, 320, 200);
        let frame = Frame::new(320, 200);
        let (x0, x1) = frame.bar_columns(2, 1, 0, 0);
        assert_eq!(
            *img.get_pixel(((x0 + x1) / 2) as u32, (frame.top + 1) as u32),
            PALETTE[0]
        );
    }

    #[test]
    fn negative_bars_extend_below_zero_in_proportion() {
        let font = font().unwrap();
        let groups = [vec![0.10, -40.0], vec![0.05, -80.0]];
        let metrics = ["Exec Time (s)", "GPU Mem Diff (MB)"];
        let img = grouped_bar_chart(&font, "t", &categories(), &metrics, &groups, WIDTH, HEIGHT);
        let frame = Frame::new(WIDTH, HEIGHT);
        let range = Range::including_zero([-40.0, -80.0].iter());
        let zero = frame.y(0.0, range);
        assert_eq!(zero, frame.top);

        let heights = (0..2)
            .map(|c| {
                let (x0, x1) = frame.bar_columns(2, 2, c, 1);
                let rows = painted_rows(&img, &frame, (x0 + x1) / 2, PALETTE[1]);
                assert!(rows.iter().all(|&y| y > zero));
                rows.len()
            })
            .collect::<Vec<_>>();
        assert!(heights[0] > 0);
        assert!(heights[1] > heights[0] * 3 / 2);
    }

    #[test]
    fn range_always_contains_zero() {
        assert_eq!(
            Range::including_zero([2.0, 3.0].iter()),
            Range { lo: 0.0, hi: 3.0 }
        );
        assert_eq!(
            Range::including_zero([-2.0, -1.0].iter()),
            Range { lo: -2.0, hi: 0.0 }
        );
        let nan = Range::including_zero([std::f64::NAN].iter());
        assert_eq!(nan, Range { lo: 0.0, hi: 0.0 });
    }

    #[test]
    fn empty_and_nan_input_do_not_panic() {
        let font = font().unwrap();
        line_chart(&font, "t", "y", &[], 100, 80);
        line_chart(&font, "t", "y", &series(vec![std::f64::NAN, 1.0]), 100, 80);
        grouped_bar_chart(&font, "t", &[], &[], &[], 100, 80);
    }
}

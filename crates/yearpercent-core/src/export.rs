//! Image export of the progress view.
//!
//! The exported scene is a [`CaptureArea`]. Before rasterizing, its
//! decorations (transparent background, drop shadow, the label drawn over
//! the progress bar) are neutralized through a [`CaptureGuard`], which puts
//! them back when dropped, on success and on failure alike.
//!
//! [`SvgRasterizer`] draws the scene as SVG; [`PngRasterizer`] renders that
//! drawing into a pixmap with `resvg` and encodes it as PNG.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::view::{DayState, PageView};

pub const EXPORT_FILE_STEM: &str = "year_progress";

const CAPTURE_BACKGROUND: &str = "#ffffff";
const BAND_COLORS: [&str; 3] = ["#4f7cac", "#5e9c76", "#c08552"];
const CURRENT_COLOR: &str = "#e4572e";
const FUTURE_COLOR: &str = "#e3e6ea";
const TEXT_COLOR: &str = "#1f2933";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("capture target does not exist: {0}")]
    MissingTarget(PathBuf),
    #[error("rasterization failed: {0}")]
    Rasterize(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Background {
    #[default]
    Transparent,
    Color(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorations {
    pub background: Background,
    pub shadow: bool,
    pub bar_label: bool,
}

impl Default for Decorations {
    fn default() -> Self {
        Self {
            background: Background::Transparent,
            shadow: true,
            bar_label: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureArea {
    pub view: PageView,
    pub decorations: Decorations,
}

impl CaptureArea {
    #[must_use]
    pub fn new(view: PageView) -> Self {
        Self {
            view,
            decorations: Decorations::default(),
        }
    }

    /// Opaque background, no shadow, no bar label until the guard drops.
    pub fn neutralize(&mut self) -> CaptureGuard<'_> {
        let saved = self.decorations.clone();
        if self.decorations.background == Background::Transparent {
            self.decorations.background = Background::Color(CAPTURE_BACKGROUND.to_string());
        }
        self.decorations.shadow = false;
        self.decorations.bar_label = false;
        debug!(?saved, "neutralized capture decorations");
        CaptureGuard { area: self, saved }
    }
}

pub struct CaptureGuard<'a> {
    area: &'a mut CaptureArea,
    saved: Decorations,
}

impl Deref for CaptureGuard<'_> {
    type Target = CaptureArea;

    fn deref(&self) -> &CaptureArea {
        &*self.area
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.area.decorations = std::mem::take(&mut self.saved);
        debug!("restored capture decorations");
    }
}

pub trait Rasterizer {
    fn extension(&self) -> &'static str;

    fn rasterize(&self, area: &CaptureArea) -> Result<Vec<u8>, ExportError>;
}

/// Draws the capture area as an SVG document.
#[derive(Debug, Clone)]
pub struct SvgRasterizer {
    pub cell: u32,
    pub gap: u32,
    pub margin: u32,
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self {
            cell: 18,
            gap: 3,
            margin: 24,
        }
    }
}

impl Rasterizer for SvgRasterizer {
    fn extension(&self) -> &'static str {
        "svg"
    }

    #[tracing::instrument(skip(self, area))]
    fn rasterize(&self, area: &CaptureArea) -> Result<Vec<u8>, ExportError> {
        if area.view.calendar.is_empty() {
            return Err(ExportError::Rasterize("capture area has no day cells".to_string()));
        }
        self.draw(area)
            .map(String::into_bytes)
            .map_err(|err| ExportError::Rasterize(err.to_string()))
    }
}

impl SvgRasterizer {
    fn draw(&self, area: &CaptureArea) -> Result<String, std::fmt::Error> {
        let view = &area.view;
        let pitch = self.cell + self.gap;
        let label_width = 32;
        let grid_width = label_width + 31 * pitch;
        let width = grid_width + 2 * self.margin;
        let grid_top = self.margin + 120;
        let height = grid_top + 12 * pitch + self.margin;

        let mut svg = String::with_capacity(64 * 1024);
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif">"#
        )?;
        writeln!(svg, "<title>{}</title>", escape_xml(&view.title))?;

        if area.decorations.shadow {
            writeln!(
                svg,
                r##"<defs><filter id="shadow"><feDropShadow dx="0" dy="4" stdDeviation="6" flood-opacity="0.25"/></filter></defs>"##
            )?;
        }
        if let Background::Color(color) = &area.decorations.background {
            writeln!(svg, r#"<rect width="100%" height="100%" fill="{}"/>"#, escape_xml(color))?;
        }
        if area.decorations.shadow {
            writeln!(
                svg,
                r##"<rect x="4" y="4" width="{}" height="{}" rx="12" fill="none" filter="url(#shadow)"/>"##,
                width - 8,
                height - 8
            )?;
        }

        let x0 = self.margin;
        writeln!(
            svg,
            r#"<text x="{x0}" y="{}" font-size="26" font-weight="bold" fill="{TEXT_COLOR}">{}</text>"#,
            self.margin + 26,
            escape_xml(&view.headline)
        )?;
        writeln!(
            svg,
            r#"<text x="{x0}" y="{}" font-size="15" fill="{TEXT_COLOR}">{}</text>"#,
            self.margin + 54,
            escape_xml(&format!("{}  ·  {}", view.date_text, view.progress_text))
        )?;

        let bar_y = self.margin + 72;
        let fill = (f64::from(grid_width) * view.bar.ratio).round() as u32;
        writeln!(
            svg,
            r#"<rect x="{x0}" y="{bar_y}" width="{grid_width}" height="24" rx="6" fill="{FUTURE_COLOR}"/>"#
        )?;
        writeln!(
            svg,
            r#"<rect class="bar" x="{x0}" y="{bar_y}" width="{fill}" height="24" rx="6" fill="{}"/>"#,
            BAND_COLORS[0]
        )?;
        if area.decorations.bar_label {
            writeln!(
                svg,
                r##"<text x="{}" y="{}" font-size="13" fill="#ffffff">{}</text>"##,
                x0 + 8,
                bar_y + 17,
                escape_xml(&view.bar.label)
            )?;
        }

        for (row, month) in view.months().enumerate() {
            let y = grid_top + row as u32 * pitch;
            let Some(first) = month.first() else { continue };
            writeln!(
                svg,
                r#"<text x="{x0}" y="{}" font-size="12" fill="{TEXT_COLOR}">{}</text>"#,
                y + self.cell - 4,
                first.month
            )?;

            for (col, cell) in month.iter().enumerate() {
                let x = x0 + label_width + col as u32 * pitch;
                let color = match cell.state {
                    DayState::Past => BAND_COLORS[usize::from(cell.band) % BAND_COLORS.len()],
                    DayState::Current => CURRENT_COLOR,
                    DayState::Future => FUTURE_COLOR,
                };
                writeln!(
                    svg,
                    r#"<rect class="day {state}" x="{x}" y="{y}" width="{size}" height="{size}" rx="3" fill="{color}"><title>{tooltip}</title></rect>"#,
                    state = state_class(cell.state),
                    size = self.cell,
                    tooltip = escape_xml(&cell.tooltip),
                )?;
            }
        }

        writeln!(svg, "</svg>")?;
        Ok(svg)
    }
}

/// Renders the [`SvgRasterizer`] drawing to PNG at `scale` times its size.
#[derive(Clone)]
pub struct PngRasterizer {
    pub svg: SvgRasterizer,
    pub scale: f32,
    fonts: Arc<fontdb::Database>,
}

impl PngRasterizer {
    #[must_use]
    pub fn new(svg: SvgRasterizer, scale: f32) -> Self {
        let mut fonts = fontdb::Database::new();
        fonts.load_system_fonts();
        debug!(faces = fonts.len(), "loaded system fonts");
        Self {
            svg,
            scale,
            fonts: Arc::new(fonts),
        }
    }
}

impl Default for PngRasterizer {
    fn default() -> Self {
        Self::new(SvgRasterizer::default(), 2.0)
    }
}

impl Rasterizer for PngRasterizer {
    fn extension(&self) -> &'static str {
        "png"
    }

    #[tracing::instrument(skip(self, area), fields(scale = self.scale))]
    fn rasterize(&self, area: &CaptureArea) -> Result<Vec<u8>, ExportError> {
        let svg = self.svg.rasterize(area)?;

        let options = usvg::Options {
            fontdb: Arc::clone(&self.fonts),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_data(&svg, &options)
            .map_err(|err| ExportError::Rasterize(err.to_string()))?;

        let size = tree
            .size()
            .to_int_size()
            .scale_by(self.scale)
            .ok_or_else(|| ExportError::Rasterize(format!("invalid scale {}", self.scale)))?;
        let mut pixmap = Pixmap::new(size.width(), size.height()).ok_or_else(|| {
            ExportError::Rasterize(format!("cannot allocate {}x{} pixmap", size.width(), size.height()))
        })?;

        resvg::render(
            &tree,
            Transform::from_scale(self.scale, self.scale),
            &mut pixmap.as_mut(),
        );
        debug!(width = size.width(), height = size.height(), "rendered pixmap");

        pixmap
            .encode_png()
            .map_err(|err| ExportError::Rasterize(err.to_string()))
    }
}

fn state_class(state: DayState) -> &'static str {
    match state {
        DayState::Past => "past",
        DayState::Current => "current",
        DayState::Future => "future",
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Rasterizes `area` into `dir/year_progress.<ext>`, replacing any earlier export.
#[tracing::instrument(skip(area, rasterizer))]
pub fn export_image(
    area: &mut CaptureArea,
    rasterizer: &dyn Rasterizer,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    if !dir.is_dir() {
        return Err(ExportError::MissingTarget(dir.to_path_buf()));
    }

    let bytes = {
        let guard = area.neutralize();
        rasterizer.rasterize(&guard)?
    };

    let path = dir.join(format!("{EXPORT_FILE_STEM}.{}", rasterizer.extension()));
    let io_error = |source| ExportError::Io {
        path: path.clone(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(&bytes).map_err(io_error)?;
    temp.flush().map_err(io_error)?;
    temp.persist(&path).map_err(|err| io_error(err.error))?;

    info!(path = %path.display(), bytes = bytes.len(), "exported image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::NaiveDate;

    use resvg::tiny_skia::Pixmap;

    use super::{
        Background, CaptureArea, Decorations, ExportError, PngRasterizer, Rasterizer, SvgRasterizer,
        export_image,
    };
    use crate::locale::Language;
    use crate::progress::YearProgress;
    use crate::view::PageView;

    fn area() -> CaptureArea {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        CaptureArea::new(PageView::build(&YearProgress::compute(date), Language::En))
    }

    struct FailingRasterizer {
        seen: RefCell<Option<Decorations>>,
    }

    impl Rasterizer for FailingRasterizer {
        fn extension(&self) -> &'static str {
            "png"
        }

        fn rasterize(&self, area: &CaptureArea) -> Result<Vec<u8>, ExportError> {
            *self.seen.borrow_mut() = Some(area.decorations.clone());
            Err(ExportError::Rasterize("canvas unavailable".to_string()))
        }
    }

    #[test]
    fn guard_restores_decorations_after_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut area = area();
        let rasterizer = FailingRasterizer {
            seen: RefCell::new(None),
        };

        let err = export_image(&mut area, &rasterizer, dir.path()).expect_err("should fail");
        assert!(matches!(err, ExportError::Rasterize(_)));

        let seen = rasterizer.seen.borrow().clone().expect("rasterizer was called");
        assert_eq!(seen.background, Background::Color("#ffffff".to_string()));
        assert!(!seen.shadow);
        assert!(!seen.bar_label);

        assert_eq!(area.decorations, Decorations::default());
        assert!(!dir.path().join("year_progress.png").exists());
    }

    #[test]
    fn opaque_background_is_kept() {
        let mut area = area();
        area.decorations.background = Background::Color("#101010".to_string());
        {
            let guard = area.neutralize();
            assert_eq!(guard.decorations.background, Background::Color("#101010".to_string()));
        }
        assert!(area.decorations.shadow);
    }

    #[test]
    fn writes_svg_with_every_day() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut area = area();
        let path = export_image(&mut area, &SvgRasterizer::default(), dir.path()).expect("export");

        assert_eq!(path, dir.path().join("year_progress.svg"));
        let svg = std::fs::read_to_string(&path).expect("read svg");
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches(r#"class="day "#).count(), 366);
        assert_eq!(svg.matches(r#"class="day current""#).count(), 1);
        assert_eq!(svg.matches(r#"class="day past""#).count(), 59);
        assert!(svg.contains("The year 2024 is 16.4% over"));
        assert!(!svg.contains("feDropShadow"));
        assert!(!svg.contains(">16.4%</text>"));
        assert!(area.decorations.shadow);
    }

    fn rgba(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let pixel = pixmap.pixel(x, y).expect("pixel in bounds");
        (pixel.red(), pixel.green(), pixel.blue(), pixel.alpha())
    }

    #[test]
    fn writes_png_with_day_colors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut area = area();
        let path = export_image(&mut area, &PngRasterizer::default(), dir.path()).expect("export");

        assert_eq!(path, dir.path().join("year_progress.png"));
        let bytes = std::fs::read(&path).expect("read png");
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));

        let pixmap = Pixmap::decode_png(&bytes).expect("decode png");
        // 32 px labels plus 31 cells of 18 px with 3 px gaps, 24 px margins, drawn at 2x.
        assert_eq!(pixmap.width(), (24 * 2 + 32 + 31 * 21) * 2);

        // White capture background in the corner.
        assert_eq!(rgba(&pixmap, 2, 2), (0xff, 0xff, 0xff, 0xff));
        // Feb 29 is today: row 1, column 28.
        assert_eq!(rgba(&pixmap, (24 + 32 + 28 * 21 + 9) * 2, (144 + 21 + 9) * 2), (0xe4, 0x57, 0x2e, 0xff));
        // Dec 31 is still ahead: row 11, column 30.
        assert_eq!(rgba(&pixmap, (24 + 32 + 30 * 21 + 9) * 2, (144 + 11 * 21 + 9) * 2), (0xe3, 0xe6, 0xea, 0xff));
        assert!(area.decorations.shadow);
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let err = export_image(&mut area(), &SvgRasterizer::default(), &missing).expect_err("should fail");
        assert!(matches!(err, ExportError::MissingTarget(path) if path == missing));
    }

    #[test]
    fn escapes_markup_in_text() {
        assert_eq!(super::escape_xml(r#"a<b & "c">"#), "a&lt;b &amp; &quot;c&quot;&gt;");
    }
}

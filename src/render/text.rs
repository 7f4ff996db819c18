use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use anyhow::Context as _;
use image::RgbaImage;

use crate::foundation::core::Point;
use crate::foundation::error::{MediaError, MediaResult};
use crate::render::overlay::{Overlay, OverlayRenderer};

/// Average glyph advance as a fraction of the font size, used for wrapping.
const ADVANCE: f32 = 0.6;
const LINE_HEIGHT: f32 = 1.2;

static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();

/// System font database, loaded once on first use and shared read-only.
fn fonts() -> Arc<usvg::fontdb::Database> {
    Arc::clone(FONTS.get_or_init(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded system fonts");
        Arc::new(db)
    }))
}

/// Default renderer: lays text out as SVG and rasterizes it with `resvg`.
#[derive(Clone, Default)]
pub struct SvgTextRenderer {
    fontdb: Option<Arc<usvg::fontdb::Database>>,
}

impl std::fmt::Debug for SvgTextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgTextRenderer")
            .field("custom_fonts", &self.fontdb.is_some())
            .finish()
    }
}

impl SvgTextRenderer {
    /// Renderer using the process-wide system font database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer with its own font database.
    pub fn with_fonts(db: usvg::fontdb::Database) -> Self {
        Self {
            fontdb: Some(Arc::new(db)),
        }
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> MediaResult<RgbaImage> {
        let fontdb = self.fontdb.clone().unwrap_or_else(fonts);
        let opts = usvg::Options {
            fontdb,
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &opts).context("parse overlay svg")?;
        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| MediaError::validation("failed to allocate overlay pixmap"))?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );
        let mut out = RgbaImage::new(width, height);
        for (dst, px) in out.pixels_mut().zip(pixmap.pixels()) {
            let c = px.demultiply();
            *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok(out)
    }
}

impl OverlayRenderer for SvgTextRenderer {
    fn meme(&self, width: u32, height: u32, top: &str, bottom: &str) -> MediaResult<Overlay> {
        check_size(width, height)?;
        let mut svg = svg_open(width, height);
        let w = width as f32;
        let max_text_h = height as f32 * 0.3;
        for (text, at_top) in [(top, true), (bottom, false)] {
            if text.trim().is_empty() {
                continue;
            }
            let upper = text.to_uppercase();
            let (size, lines) = fit(&upper, w * 0.95, w / 8.0, max_text_h);
            let stroke = (size / 12.0).max(1.0);
            let block = lines.len() as f32 * size * LINE_HEIGHT;
            let first_baseline = if at_top {
                size * 1.05
            } else {
                height as f32 - block + size * 0.95
            };
            let _ = write!(
                svg,
                r#"<g font-family="Impact, Anton, 'Arial Black', sans-serif" font-size="{size:.1}" font-weight="bold" fill="white" stroke="black" stroke-width="{stroke:.1}" paint-order="stroke" text-anchor="middle">"#
            );
            for (i, line) in lines.iter().enumerate() {
                let y = first_baseline + i as f32 * size * LINE_HEIGHT;
                let _ = write!(
                    svg,
                    r#"<text x="{:.1}" y="{y:.1}">{}</text>"#,
                    w / 2.0,
                    escape(line)
                );
            }
            svg.push_str("</g>");
        }
        svg.push_str("</svg>");
        Ok(Overlay::over(self.rasterize(&svg, width, height)?))
    }

    fn caption(&self, width: u32, height: u32, text: &str) -> MediaResult<Overlay> {
        check_size(width, height)?;
        let w = width as f32;
        let size = (w / 10.0).max(8.0);
        let lines = wrap(text, w * 0.92, size);
        let text_h = lines.len().max(1) as f32 * size * LINE_HEIGHT;
        let bar = even((text_h + size).ceil() as u32);
        let total = height + bar;

        let mut svg = svg_open(width, total);
        let _ = write!(
            svg,
            r#"<rect x="0" y="0" width="{width}" height="{bar}" fill="white"/>"#
        );
        let _ = write!(
            svg,
            r#"<g font-family="Futura, 'Futura Condensed', 'DejaVu Sans', sans-serif" font-size="{size:.1}" fill="black" text-anchor="middle">"#
        );
        let first_baseline = (bar as f32 - text_h) / 2.0 + size;
        for (i, line) in lines.iter().enumerate() {
            let y = first_baseline + i as f32 * size * LINE_HEIGHT;
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{y:.1}">{}</text>"#,
                w / 2.0,
                escape(line)
            );
        }
        svg.push_str("</g></svg>");
        let image = self.rasterize(&svg, width, total)?;
        Ok(Overlay::under(image, Point::new(0, -(bar as i32))))
    }
}

fn check_size(width: u32, height: u32) -> MediaResult<()> {
    if width == 0 || height == 0 {
        return Err(MediaError::validation(format!(
            "overlay size must be non-zero, got {width}x{height}"
        )));
    }
    Ok(())
}

fn svg_open(width: u32, height: u32) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    )
}

fn even(v: u32) -> u32 {
    v + (v % 2)
}

/// Shrink the font until the wrapped text fits in `max_h`.
fn fit(text: &str, max_w: f32, start: f32, max_h: f32) -> (f32, Vec<String>) {
    let mut size = start.max(8.0);
    loop {
        let lines = wrap(text, max_w, size);
        if lines.len() as f32 * size * LINE_HEIGHT <= max_h || size <= 8.0 {
            return (size, lines);
        }
        size = (size * 0.85).max(8.0);
    }
}

/// Greedy word wrap using an average glyph advance.
pub(crate) fn wrap(text: &str, max_w: f32, size: f32) -> Vec<String> {
    let max_chars = ((max_w / (size * ADVANCE)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max_chars {
            if !cur.is_empty() {
                lines.push(std::mem::take(&mut cur));
            }
            let cut = word
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            lines.push(word[..cut].to_string());
            word = &word[cut..];
        }
        if word.is_empty() {
            continue;
        }
        let needed = if cur.is_empty() {
            word.chars().count()
        } else {
            cur.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/text.rs"]
mod tests;

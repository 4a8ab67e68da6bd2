//! PDF assembly from ordered page images.
//!
//! Every page is exactly the size of its image (1 px = 1 pt). The document
//! is rendered to memory and written to disk only once complete, so a
//! failed assembly never leaves a truncated PDF behind.

use crate::error::HarvestError;
use crate::ocr::{OcrEngine, OcrError, OcrWord};
use crate::types::FetchReport;
use crate::Result;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Pt, TextRenderingMode,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Average Helvetica glyph advance as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.5;

/// How pages that never reached disk show up in the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPagePolicy {
    /// Leave them out; the document is shorter than the harvest.
    #[default]
    Gap,
    /// Insert a blank page sized like its nearest neighbour.
    Placeholder,
}

impl std::str::FromStr for MissingPagePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gap" | "skip" => Ok(MissingPagePolicy::Gap),
            "placeholder" | "blank" => Ok(MissingPagePolicy::Placeholder),
            other => Err(format!(
                "unknown missing-page policy '{other}' (expected gap or placeholder)"
            )),
        }
    }
}

/// A page left out of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPage {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblySummary {
    pub output: PathBuf,
    /// Pages in the written document
    pub pages: usize,
    /// Inputs that could not be decoded
    pub skipped: Vec<SkippedPage>,
    /// Pages carrying an invisible text layer
    pub text_layer_pages: usize,
    /// Pages kept image-only because OCR failed
    pub ocr_failures: Vec<SkippedPage>,
}

/// One word of the invisible text layer, in PDF points.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord {
    pub text: String,
    /// Left edge
    pub x: f32,
    /// Baseline, measured from the bottom of the page
    pub y: f32,
    pub font_size: f32,
    /// Extra spacing per glyph so the word spans its recognized width
    pub character_spacing: f32,
}

/// Maps words recognized on an image enlarged by `scale` back onto the
/// original page of `page_height` points.
pub fn place_words(words: &[OcrWord], scale: f32, page_height: f32) -> Vec<PlacedWord> {
    let scale = if scale > 0.0 { scale } else { 1.0 };
    words
        .iter()
        .filter_map(|word| {
            let text = pdf_safe_text(word.text.trim());
            if text.is_empty() || word.width == 0 || word.height == 0 {
                return None;
            }
            let x = word.left as f32 / scale;
            let top = word.top as f32 / scale;
            let width = word.width as f32 / scale;
            let height = word.height as f32 / scale;

            let font_size = height.max(1.0);
            let glyphs = text.chars().count() as f32;
            let natural_width = glyphs * font_size * HELVETICA_AVG_ADVANCE;

            Some(PlacedWord {
                text,
                x,
                // Baseline sits about a fifth of the box above its bottom edge.
                y: page_height - top - height * 0.8,
                font_size,
                character_spacing: (width - natural_width) / glyphs,
            })
        })
        .collect()
}

/// Folds text to what the built-in Helvetica encoding renders.
fn pdf_safe_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            c if c.is_ascii() && !c.is_ascii_control() => c,
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            _ => '?',
        })
        .collect()
}

fn page_size(image: &RgbImage) -> (Mm, Mm) {
    (
        Mm::from(Pt(image.width() as f32)),
        Mm::from(Pt(image.height() as f32)),
    )
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Incrementally built document; created with the first decodable page.
struct PdfBuilder {
    title: String,
    doc: Option<PdfDocumentReference>,
    font: Option<IndirectFontRef>,
    pages: usize,
}

impl PdfBuilder {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            doc: None,
            font: None,
            pages: 0,
        }
    }

    fn add_page(&mut self, image: &RgbImage) -> PdfLayerReference {
        let (width, height) = page_size(image);
        self.pages += 1;
        let layer_name = format!("Page {}", self.pages);

        let layer = match &self.doc {
            Some(doc) => {
                let (page, layer) = doc.add_page(width, height, layer_name);
                doc.get_page(page).get_layer(layer)
            }
            None => {
                let (doc, page, layer) = PdfDocument::new(&self.title, width, height, layer_name);
                let layer_ref = doc.get_page(page).get_layer(layer);
                self.doc = Some(doc);
                layer_ref
            }
        };

        Image::from_dynamic_image(&DynamicImage::ImageRgb8(image.clone())).add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(0.0)),
                translate_y: Some(Mm(0.0)),
                dpi: Some(72.0),
                ..Default::default()
            },
        );
        layer
    }

    fn font(&mut self) -> Result<IndirectFontRef> {
        if let Some(font) = &self.font {
            return Ok(font.clone());
        }
        let doc = self
            .doc
            .as_ref()
            .ok_or_else(|| HarvestError::Pdf("font requested before the first page".into()))?;
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| HarvestError::Pdf(format!("PDF font error: {e}")))?;
        self.font = Some(font.clone());
        Ok(font)
    }

    fn write_text_layer(&mut self, layer: &PdfLayerReference, words: &[PlacedWord]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        let font = self.font()?;
        for word in words {
            layer.begin_text_section();
            layer.set_text_rendering_mode(TextRenderingMode::Invisible);
            layer.set_font(&font, word.font_size);
            layer.set_character_spacing(word.character_spacing);
            layer.set_text_cursor(Mm::from(Pt(word.x)), Mm::from(Pt(word.y)));
            layer.write_text(word.text.clone(), &font);
            layer.end_text_section();
        }
        Ok(())
    }

    fn finish(self, output: &Path) -> Result<()> {
        let doc = self
            .doc
            .ok_or_else(|| HarvestError::assembly("no page could be added to the document"))?;
        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| HarvestError::Pdf(format!("PDF save error: {e}")))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| HarvestError::Io(e.into_error()))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, bytes)?;
        Ok(())
    }
}

fn document_title(output: &Path) -> String {
    output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Decodes page `index`; only the first page is required to decode.
fn decode_page(
    path: &Path,
    index: usize,
    skipped: &mut Vec<SkippedPage>,
) -> Result<Option<RgbImage>> {
    match load_rgb(path) {
        Ok(image) => Ok(Some(image)),
        Err(err) if index == 0 => Err(HarvestError::assembly(format!(
            "first page {} cannot be decoded: {err}",
            path.display()
        ))),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping undecodable page image");
            skipped.push(SkippedPage {
                path: path.to_path_buf(),
                reason: err.to_string(),
            });
            Ok(None)
        }
    }
}

/// One page per image, in input order.
pub fn assemble_images(paths: &[PathBuf], output: &Path) -> Result<AssemblySummary> {
    if paths.is_empty() {
        return Err(HarvestError::assembly("no page images to assemble"));
    }

    let mut builder = PdfBuilder::new(&document_title(output));
    let mut summary = AssemblySummary {
        output: output.to_path_buf(),
        ..AssemblySummary::default()
    };

    for (index, path) in paths.iter().enumerate() {
        if let Some(image) = decode_page(path, index, &mut summary.skipped)? {
            builder.add_page(&image);
        }
    }

    summary.pages = builder.pages;
    builder.finish(output)?;
    info!(pages = summary.pages, output = %output.display(), "PDF written");
    Ok(summary)
}

/// Like [`assemble_images`], with an invisible text layer recognized on a
/// copy of each page enlarged by `upscale`.
pub fn assemble_with_text_layer(
    paths: &[PathBuf],
    output: &Path,
    engine: &dyn OcrEngine,
    upscale: u32,
) -> Result<AssemblySummary> {
    if paths.is_empty() {
        return Err(HarvestError::assembly("no page images to assemble"));
    }

    let upscale = upscale.max(1);
    let scratch = tempfile::tempdir()?;
    let mut builder = PdfBuilder::new(&document_title(output));
    let mut summary = AssemblySummary {
        output: output.to_path_buf(),
        ..AssemblySummary::default()
    };

    for (index, path) in paths.iter().enumerate() {
        let Some(image) = decode_page(path, index, &mut summary.skipped)? else {
            continue;
        };
        let layer = builder.add_page(&image);

        match recognize_upscaled(engine, &image, upscale, scratch.path()) {
            Ok(words) => {
                let placed = place_words(&words, upscale as f32, image.height() as f32);
                debug!(page = index + 1, words = placed.len(), "text layer placed");
                builder.write_text_layer(&layer, &placed)?;
                summary.text_layer_pages += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "OCR failed; page stays image-only");
                summary.ocr_failures.push(SkippedPage {
                    path: path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    summary.pages = builder.pages;
    builder.finish(output)?;
    info!(
        pages = summary.pages,
        text_layer_pages = summary.text_layer_pages,
        output = %output.display(),
        "searchable PDF written"
    );
    Ok(summary)
}

fn recognize_upscaled(
    engine: &dyn OcrEngine,
    image: &RgbImage,
    upscale: u32,
    scratch: &Path,
) -> std::result::Result<Vec<OcrWord>, OcrError> {
    let path = scratch.join("ocr_page.png");
    let saved = if upscale > 1 {
        image::imageops::resize(
            image,
            image.width() * upscale,
            image.height() * upscale,
            FilterType::Lanczos3,
        )
        .save(&path)
    } else {
        image.save(&path)
    };
    saved.map_err(|e| OcrError::ImageLoadError(e.to_string()))?;
    engine.recognize(&path)
}

const PAGE_IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff",
];

/// Image files directly inside `dir`, sorted by file name.
pub fn page_images_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    PAGE_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                })
        })
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Ordered page files for assembly under `policy`.
///
/// With [`MissingPagePolicy::Placeholder`], a blank PNG named after each
/// missing ordinal is written next to the fetched pages, sized like the
/// nearest preceding page (or the first page when the gap leads).
pub fn pages_for_assembly(
    report: &FetchReport,
    policy: MissingPagePolicy,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    if policy == MissingPagePolicy::Gap || report.failures.is_empty() {
        return Ok(report.paths());
    }

    let mut ordered: Vec<(usize, PathBuf)> = report
        .files
        .iter()
        .map(|f| (f.ordinal, f.path.clone()))
        .collect();

    for failure in &report.failures {
        let neighbour = report
            .files
            .iter()
            .rev()
            .find(|f| f.ordinal < failure.ordinal)
            .or_else(|| report.files.first());
        let (width, height) = neighbour
            .and_then(|f| image::image_dimensions(&f.path).ok())
            .unwrap_or((612, 792));

        let name = crate::download::page_file_name(failure.ordinal, report.total, "png");
        let path = output_dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255])).save(&path)?;
        debug!(page = failure.ordinal, path = %path.display(), "placeholder page written");
        ordered.push((failure.ordinal, path));
    }

    ordered.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(ordered.into_iter().map(|(_, path)| path).collect())
}

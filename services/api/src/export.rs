//! services/api/src/export.rs
//!
//! Renders the whole story as an A4 PDF: every chapter under a bold heading, the
//! body in Times with word wrapping and automatic page breaks. Embedded pictures
//! are decoded, scaled to at most 250pt wide and placed right-aligned; pictures
//! that cannot be decoded are noted as "[picture]".

use image::{imageops::FilterType, DynamicImage};
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat,
};
use pet_tales_core::{
    domain::{Chapter, ImagePayload},
    text::{is_block_element, parse_markup, Node},
};
use tracing::debug;

/// Name of the downloaded file.
pub const EXPORT_FILE_NAME: &str = "PetTales.pdf";

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const HEADING_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 12.0;
const BODY_LEADING: f32 = BODY_SIZE * 1.5;
const FIRST_HEADING_GAP: f32 = 20.0;
const HEADING_GAP: f32 = 40.0;
const AFTER_HEADING_GAP: f32 = 10.0;
const MAX_IMAGE_WIDTH: f32 = 250.0;
/// Largest pixel size kept for an embedded picture (about 290 dpi at full width).
const MAX_IMAGE_PIXELS: u32 = 1000;
/// Average advance of a Times character at the body size.
const BODY_CHAR_WIDTH: f32 = 6.0;
const PICTURE_PLACEHOLDER: &str = "[picture]";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

//=========================================================================================
// Story layout
//=========================================================================================

/// A piece of chapter content in reading order.
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph(String),
    Image(Picture),
}

/// A decoded picture as 8-bit RGB samples, plus its alpha channel when it has one.
#[derive(Debug, Clone, PartialEq)]
struct Picture {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Flattens chapter markup into paragraphs and images.
fn layout_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut line = String::new();
    for node in &parse_markup(content).nodes {
        collect_blocks(node, &mut line, &mut blocks);
    }
    flush_paragraph(&mut line, &mut blocks);
    blocks
}

fn flush_paragraph(line: &mut String, blocks: &mut Vec<Block>) {
    let text = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        blocks.push(Block::Paragraph(text));
    }
    line.clear();
}

fn collect_blocks(node: &Node, line: &mut String, blocks: &mut Vec<Block>) {
    match node {
        Node::Text(text) => line.push_str(text),
        Node::Element { name, children, .. } if name == "img" => {
            flush_paragraph(line, blocks);
            let image = node
                .attr("src")
                .and_then(ImagePayload::from_data_url)
                .and_then(|payload| Picture::from_payload(&payload));
            match image {
                Some(image) => blocks.push(Block::Image(image)),
                None => blocks.push(Block::Paragraph(PICTURE_PLACEHOLDER.to_string())),
            }
            for child in children {
                collect_blocks(child, line, blocks);
            }
        }
        Node::Element { name, children, .. } => {
            let block = is_block_element(name);
            if block {
                flush_paragraph(line, blocks);
            }
            for child in children {
                collect_blocks(child, line, blocks);
            }
            if block {
                flush_paragraph(line, blocks);
            }
        }
    }
}

impl Picture {
    fn from_payload(payload: &ImagePayload) -> Option<Self> {
        let decoded = match image::load_from_memory(&payload.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("Skipping undecodable {} picture: {}", payload.mime_type, e);
                return None;
            }
        };
        Self::from_image(decoded)
    }

    fn from_image(mut decoded: DynamicImage) -> Option<Self> {
        if decoded.width() == 0 || decoded.height() == 0 {
            return None;
        }
        if decoded.width() > MAX_IMAGE_PIXELS || decoded.height() > MAX_IMAGE_PIXELS {
            decoded = decoded.resize(MAX_IMAGE_PIXELS, MAX_IMAGE_PIXELS, FilterType::Triangle);
        }
        let alpha = decoded
            .color()
            .has_alpha()
            .then(|| decoded.to_rgba8().pixels().map(|p| p[3]).collect());
        Some(Self {
            width: decoded.width(),
            height: decoded.height(),
            rgb: decoded.to_rgb8().into_raw(),
            alpha,
        })
    }
}

/// Greedy word wrap at `max_chars` characters; overlong words are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..max_chars).collect());
        }
        let word: String = word.into_iter().collect();
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encodes text for the standard fonts' WinAnsi encoding.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2026}' => 0x85,
            c if (c as u32) < 0x100 => c as u8,
            _ => b'?',
        })
        .collect()
}

//=========================================================================================
// PDF writer
//=========================================================================================

struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    heading_font: ObjectId,
    body_font: ObjectId,
    pages: Vec<ObjectId>,
    ops: Vec<Operation>,
    page_images: Vec<(String, ObjectId)>,
    image_count: usize,
    /// Baseline of the next line, from the bottom of the page.
    y: f32,
}

impl PdfWriter {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let heading_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let body_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Times-Roman",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            doc,
            pages_id,
            heading_font,
            body_font,
            pages: Vec::new(),
            ops: Vec::new(),
            page_images: Vec::new(),
            image_count: 0,
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn finish_page(&mut self) -> Result<(), ExportError> {
        let content = Content {
            operations: std::mem::take(&mut self.ops),
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut xobjects = Dictionary::new();
        for (name, id) in self.page_images.drain(..) {
            xobjects.set(name, Object::Reference(id));
        }
        let resources = dictionary! {
            "Font" => dictionary! {
                "F1" => self.heading_font,
                "F2" => self.body_font,
            },
            "XObject" => xobjects,
        };
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.pages.push(page_id);
        self.y = PAGE_HEIGHT - MARGIN;
        Ok(())
    }

    /// Starts a new page when `height` more points do not fit.
    fn reserve(&mut self, height: f32) -> Result<(), ExportError> {
        if self.y - height < MARGIN && !self.ops.is_empty() {
            self.finish_page()?;
        }
        Ok(())
    }

    fn text_line(&mut self, font: &str, size: f32, text: &str) {
        self.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), Object::Real(size)]),
            Operation::new("Td", vec![Object::Real(MARGIN), Object::Real(self.y)]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn heading(&mut self, text: &str, first: bool) -> Result<(), ExportError> {
        let gap = if first { FIRST_HEADING_GAP } else { HEADING_GAP };
        if !self.ops.is_empty() {
            self.y -= gap;
        }
        self.reserve(HEADING_SIZE + AFTER_HEADING_GAP + BODY_LEADING)?;
        self.y -= HEADING_SIZE;
        self.text_line("F1", HEADING_SIZE, text);
        self.y -= AFTER_HEADING_GAP;
        Ok(())
    }

    fn paragraph(&mut self, text: &str) -> Result<(), ExportError> {
        let max_chars = ((PAGE_WIDTH - 2.0 * MARGIN) / BODY_CHAR_WIDTH) as usize;
        for line in wrap(text, max_chars) {
            self.reserve(BODY_LEADING)?;
            self.y -= BODY_LEADING;
            self.text_line("F2", BODY_SIZE, &line);
        }
        Ok(())
    }

    /// Adds a Flate-compressed 8-bit image XObject.
    fn image_object(
        &mut self,
        width: u32,
        height: u32,
        color_space: &str,
        samples: Vec<u8>,
        soft_mask: Option<ObjectId>,
    ) -> Result<ObjectId, ExportError> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
        };
        if let Some(mask) = soft_mask {
            dict.set("SMask", mask);
        }
        let mut stream = Stream::new(dict, samples);
        stream.compress()?;
        Ok(self.doc.add_object(stream))
    }

    fn image(&mut self, image: &Picture) -> Result<(), ExportError> {
        let width = (image.width as f32).min(MAX_IMAGE_WIDTH);
        let mut height = width * image.height as f32 / image.width as f32;
        height = height.min(PAGE_HEIGHT - 2.0 * MARGIN);

        self.reserve(height + BODY_SIZE)?;
        self.y -= height + BODY_SIZE / 2.0;

        self.image_count += 1;
        let name = format!("Im{}", self.image_count);
        let soft_mask = match &image.alpha {
            Some(alpha) => Some(self.image_object(
                image.width,
                image.height,
                "DeviceGray",
                alpha.clone(),
                None,
            )?),
            None => None,
        };
        let id = self.image_object(
            image.width,
            image.height,
            "DeviceRGB",
            image.rgb.clone(),
            soft_mask,
        )?;

        let x = PAGE_WIDTH - MARGIN - width;
        self.ops.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(height),
                    Object::Real(x),
                    Object::Real(self.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.page_images.push((name, id));
        self.y -= BODY_SIZE / 2.0;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, ExportError> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.finish_page()?;
        }
        let kids = self.pages.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).map_err(lopdf::Error::from)?;
        Ok(bytes)
    }
}

/// Renders `chapters` (in sort order) to PDF bytes.
pub fn render_story_pdf(chapters: &[Chapter]) -> Result<Vec<u8>, ExportError> {
    let mut writer = PdfWriter::new();
    for (i, chapter) in chapters.iter().enumerate() {
        writer.heading(&chapter.heading(i), i == 0)?;
        for block in layout_blocks(&chapter.content) {
            match block {
                Block::Paragraph(text) => writer.paragraph(&text)?,
                Block::Image(image) => writer.image(&image)?,
            }
        }
    }
    let pages = writer.pages.len() + usize::from(!writer.ops.is_empty());
    debug!(chapters = chapters.len(), pages, "rendered story PDF");
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;
    use uuid::Uuid;

    fn encoded(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn data_url(mime_type: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
    }

    fn portrait_png(width: u32, height: u32) -> Vec<u8> {
        let pixels = RgbaImage::from_pixel(width, height, Rgba([200, 120, 40, 128]));
        encoded(DynamicImage::ImageRgba8(pixels), ImageFormat::Png)
    }

    fn photo_jpeg(width: u32, height: u32) -> Vec<u8> {
        let pixels = RgbImage::from_pixel(width, height, Rgb([90, 160, 220]));
        encoded(DynamicImage::ImageRgb8(pixels), ImageFormat::Jpeg)
    }

    /// Image XObjects in the document as (width, height, has soft mask).
    fn image_objects(doc: &Document) -> Vec<(i64, i64, bool)> {
        doc.objects
            .values()
            .filter_map(|object| match object {
                Object::Stream(stream)
                    if matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
                        && matches!(stream.dict.get(b"ColorSpace"), Ok(Object::Name(n)) if n == b"DeviceRGB") =>
                {
                    let dim = |key: &[u8]| match stream.dict.get(key) {
                        Ok(Object::Integer(v)) => *v,
                        _ => 0,
                    };
                    Some((dim(b"Width"), dim(b"Height"), stream.dict.has(b"SMask")))
                }
                _ => None,
            })
            .collect()
    }

    fn chapter(name: &str, content: &str, sort_order: i32) -> Chapter {
        let mut chapter = Chapter::new(Uuid::new_v4(), name, sort_order);
        chapter.set_content(content.to_string());
        chapter
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn blocks_follow_reading_order() {
        let jpeg = data_url("image/jpeg", &photo_jpeg(10, 20));
        let broken = data_url("image/png", &[1u8, 2, 3]);
        let content = format!(
            "<div>First <b>line</b></div><figure><img src=\"{}\"></figure>Second<br><img src=\"{}\">",
            jpeg, broken
        );
        let blocks = layout_blocks(&content);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0], Block::Paragraph("First line".into()));
        assert!(matches!(&blocks[1], Block::Image(img) if img.width == 10 && img.height == 20));
        assert_eq!(blocks[2], Block::Paragraph("Second".into()));
        assert_eq!(blocks[3], Block::Paragraph(PICTURE_PLACEHOLDER.into()));
    }

    #[test]
    fn inline_markup_does_not_split_words() {
        let blocks = layout_blocks("<div>Ru<b>nn</b>ing <i>fast</i>!</div>");
        assert_eq!(blocks, vec![Block::Paragraph("Running fast!".into())]);
    }

    #[test]
    fn portraits_keep_their_transparency() {
        let content = format!("<img src=\"{}\">", data_url("image/png", &portrait_png(4, 2)));
        match layout_blocks(&content).as_slice() {
            [Block::Image(picture)] => {
                assert_eq!((picture.width, picture.height), (4, 2));
                assert_eq!(picture.rgb.len(), 4 * 2 * 3);
                assert_eq!(picture.alpha.as_deref(), Some(&[128u8; 8][..]));
            }
            other => panic!("unexpected blocks: {:?}", other),
        }
    }

    #[test]
    fn large_photos_are_scaled_down() {
        let picture = Picture::from_image(DynamicImage::ImageRgb8(RgbImage::new(3000, 1500))).unwrap();
        assert_eq!((picture.width, picture.height), (MAX_IMAGE_PIXELS, 500));
        assert!(picture.alpha.is_none());
    }

    #[test]
    fn curly_quotes_map_to_win_ansi() {
        assert_eq!(win_ansi("\u{201C}é\u{201D}"), vec![0x93, 0xE9, 0x94]);
        assert_eq!(win_ansi("🐶"), vec![b'?']);
    }

    #[test]
    fn renders_a_pdf_document() {
        let jpeg = data_url("image/jpeg", &photo_jpeg(500, 250));
        let chapters = vec![
            chapter("The Beach", "<div>Max ran into the waves.</div>", 0),
            chapter("", &format!("<img src=\"{}\">", jpeg), 1),
        ];
        let bytes = render_story_pdf(&chapters).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(image_objects(&doc), vec![(500, 250, false)]);
    }

    #[test]
    fn png_portraits_are_embedded() {
        let portrait = data_url("image/png", &portrait_png(8, 6));
        let chapters = vec![chapter(
            "Portrait",
            &format!("<p>Bella posed.</p><figure><img src=\"{}\"></figure>", portrait),
            0,
        )];
        let doc = Document::load_mem(&render_story_pdf(&chapters).unwrap()).unwrap();
        assert_eq!(image_objects(&doc), vec![(8, 6, true)]);

        let page = *doc.get_pages().values().next().unwrap();
        let text = String::from_utf8_lossy(&doc.get_page_content(page).unwrap()).into_owned();
        assert!(text.contains("/Im1 Do"));
        assert!(!text.contains(PICTURE_PLACEHOLDER));
    }

    #[test]
    fn long_stories_flow_onto_more_pages() {
        let paragraph = "word ".repeat(2000);
        let chapters = vec![chapter("Long", &format!("<p>{}</p>", paragraph), 0)];
        let doc = Document::load_mem(&render_story_pdf(&chapters).unwrap()).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn an_empty_story_is_still_a_valid_document() {
        let doc = Document::load_mem(&render_story_pdf(&[]).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}

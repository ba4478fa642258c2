//! crates/pet_tales_core/src/surface.rs
//!
//! The editable document surface: the rendered copy of the active chapter, its
//! lock, the last known selection and the embedded-image toolbar.
//!
//! Selections are byte offsets into the chapter markup. They are weak references:
//! the markup can change under them, so they are re-validated before every use and
//! an invalid selection falls back to the end of the document.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text::{escape_attr, parse_markup};

/// Class carried by every embedded image block.
pub const IMAGE_CONTAINER_CLASS: &str = "story-image-container";

static ROTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rotate\((\d+)deg\)").expect("valid rotation pattern"));
static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid img pattern"));
static STYLE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"style="([^"]*)""#).expect("valid style pattern"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("The editor is locked")]
    Locked,
    #[error("Image {0} is not part of the document")]
    UnknownImage(String),
    #[error("No image is selected")]
    NoImageSelected,
}

/// A caret or range inside the chapter markup, in UTF-8 byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    pub fn collapsed(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    fn ordered(&self) -> (usize, usize) {
        (self.start.min(self.end), self.start.max(self.end))
    }
}

/// The contextual toolbar shown over a clicked image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageToolbar {
    pub image_id: String,
    pub top: f64,
    pub left: f64,
    pub rotation: u16,
}

/// Result of embedding an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedImage {
    pub image_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentSurface {
    content: String,
    locked: bool,
    selection: Option<SelectionRange>,
    toolbar: Option<ImageToolbar>,
}

impl DocumentSurface {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn selection(&self) -> Option<SelectionRange> {
        self.selection
    }

    pub fn toolbar(&self) -> Option<&ImageToolbar> {
        self.toolbar.as_ref()
    }

    /// Pushes state content down into the surface. Only replaces what is rendered
    /// when it actually differs, so the caret is not disturbed on every keystroke.
    pub fn sync_from_state(&mut self, content: &str) -> bool {
        if self.content == content {
            return false;
        }
        self.content = content.to_string();
        self.toolbar = None;
        true
    }

    /// A direct edit from the writer.
    pub fn edit(&mut self, content: String) -> Result<&str, SurfaceError> {
        if self.locked {
            return Err(SurfaceError::Locked);
        }
        self.toolbar = None;
        self.content = content;
        Ok(&self.content)
    }

    /// Remembers the caret if it lies inside the document text.
    pub fn record_selection(&mut self, range: SelectionRange) -> bool {
        if is_valid_selection(&self.content, range) {
            self.selection = Some(range);
            true
        } else {
            false
        }
    }

    /// Embeds an image block at the last valid selection, or at the end. Allowed
    /// while locked.
    pub fn insert_image(&mut self, src: &str) -> InsertedImage {
        let image_id = Uuid::new_v4().to_string();
        let block = image_block(&image_id, src);

        let (start, end) = self
            .selection
            .filter(|range| is_valid_selection(&self.content, *range))
            .map(|range| range.ordered())
            .unwrap_or((self.content.len(), self.content.len()));

        self.content.replace_range(start..end, &block);
        self.selection = Some(SelectionRange::collapsed(start + block.len()));
        self.toolbar = None;

        InsertedImage {
            image_id,
            content: self.content.clone(),
        }
    }

    /// Shows the toolbar for `image_id` at the given on-screen position.
    pub fn select_image(
        &mut self,
        image_id: &str,
        top: f64,
        left: f64,
    ) -> Result<&ImageToolbar, SurfaceError> {
        let rotation = image_rotation(&self.content, image_id)
            .ok_or_else(|| SurfaceError::UnknownImage(image_id.to_string()))?;
        Ok(self.toolbar.insert(ImageToolbar {
            image_id: image_id.to_string(),
            top,
            left,
            rotation,
        }))
    }

    pub fn dismiss_toolbar(&mut self) -> bool {
        self.toolbar.take().is_some()
    }

    /// Turns the selected image a further 90 degrees. Returns the new content.
    pub fn rotate_selected(&mut self) -> Result<String, SurfaceError> {
        let toolbar = self.toolbar.as_mut().ok_or(SurfaceError::NoImageSelected)?;
        let (start, end) = find_image_block(&self.content, &toolbar.image_id)
            .ok_or_else(|| SurfaceError::UnknownImage(toolbar.image_id.clone()))?;

        let block = &self.content[start..end];
        let rotation = (block_rotation(block) + 90) % 360;
        let rotated = set_block_rotation(block, rotation);
        self.content.replace_range(start..end, &rotated);
        toolbar.rotation = rotation;
        Ok(self.content.clone())
    }

    /// Removes the selected image block entirely. Returns the new content.
    pub fn delete_selected(&mut self) -> Result<String, SurfaceError> {
        let toolbar = self.toolbar.take().ok_or(SurfaceError::NoImageSelected)?;
        let (start, end) = find_image_block(&self.content, &toolbar.image_id)
            .ok_or(SurfaceError::UnknownImage(toolbar.image_id))?;
        self.content.replace_range(start..end, "");
        if let Some(range) = self.selection {
            if !is_valid_selection(&self.content, range) {
                self.selection = None;
            }
        }
        Ok(self.content.clone())
    }
}

//=========================================================================================
// Markup helpers
//=========================================================================================

/// The markup of an embedded, non-editable image block.
pub fn image_block(image_id: &str, src: &str) -> String {
    format!(
        r#"<figure class="{}" contenteditable="false" data-image-id="{}"><img src="{}" class="story-image" style="transform: rotate(0deg)"></figure>"#,
        IMAGE_CONTAINER_CLASS,
        escape_attr(image_id),
        escape_attr(src)
    )
}

/// Ids of the embedded images, in document order.
pub fn image_ids(content: &str) -> Vec<String> {
    parse_markup(content)
        .elements("figure")
        .into_iter()
        .filter_map(|figure| figure.attr("data-image-id").map(str::to_string))
        .collect()
}

/// Current rotation of an image in degrees, `None` when it is not in `content`.
pub fn image_rotation(content: &str, image_id: &str) -> Option<u16> {
    find_image_block(content, image_id).map(|(start, end)| block_rotation(&content[start..end]))
}

/// Whether `range` still resolves to a text position inside `content`.
pub fn is_valid_selection(content: &str, range: SelectionRange) -> bool {
    let (start, end) = range.ordered();
    end <= content.len()
        && content.is_char_boundary(start)
        && content.is_char_boundary(end)
        && is_text_position(content, start)
        && is_text_position(content, end)
        && !content[start..end].contains(['<', '>'])
}

fn is_text_position(content: &str, offset: usize) -> bool {
    let before = &content[..offset];
    let inside_tag = match (before.rfind('<'), before.rfind('>')) {
        (Some(lt), Some(gt)) => lt > gt,
        (Some(_), None) => true,
        _ => false,
    };
    let open_blocks = before.matches("<figure").count();
    let closed_blocks = before.matches("</figure>").count();
    !inside_tag && open_blocks <= closed_blocks
}

/// Byte span of the figure carrying `image_id`, closing tag included.
fn find_image_block(content: &str, image_id: &str) -> Option<(usize, usize)> {
    let marker = format!(r#"data-image-id="{}""#, escape_attr(image_id));
    let marker_at = content.find(&marker)?;
    let start = content[..marker_at].rfind("<figure")?;
    let close = "</figure>";
    let end = content[marker_at..].find(close)? + marker_at + close.len();
    Some((start, end))
}

fn block_rotation(block: &str) -> u16 {
    IMG_TAG
        .find(block)
        .and_then(|img| ROTATION.captures(img.as_str()))
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .map(|deg| deg % 360)
        .unwrap_or(0)
}

fn set_block_rotation(block: &str, rotation: u16) -> String {
    let Some(img) = IMG_TAG.find(block) else {
        return block.to_string();
    };
    let tag = img.as_str();
    let transform = format!("rotate({}deg)", rotation);

    let new_tag = if ROTATION.is_match(tag) {
        ROTATION.replace(tag, transform.as_str()).into_owned()
    } else if let Some(style) = STYLE_ATTR.captures(tag) {
        let existing = style[1].trim().trim_end_matches(';');
        let merged = if existing.is_empty() {
            format!(r#"style="transform: {}""#, transform)
        } else {
            format!(r#"style="{}; transform: {}""#, existing, transform)
        };
        STYLE_ATTR.replace(tag, merged.as_str()).into_owned()
    } else {
        let body = tag.trim_end_matches('>').trim_end_matches('/').trim_end();
        format!(r#"{} style="transform: {}">"#, body, transform)
    };

    let mut out = block.to_string();
    out.replace_range(img.range(), &new_tag);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::word_count;

    const PNG: &str = "data:image/png;base64,AAAA";

    #[test]
    fn sync_only_replaces_differing_content() {
        let mut surface = DocumentSurface::new("hello");
        assert!(!surface.sync_from_state("hello"));
        assert!(surface.sync_from_state("hello world"));
        assert_eq!(surface.content(), "hello world");
    }

    #[test]
    fn locked_surface_rejects_edits_but_accepts_images() {
        let mut surface = DocumentSurface::new("Rex");
        surface.set_locked(true);
        assert_eq!(surface.edit("Rex ran".into()), Err(SurfaceError::Locked));
        let inserted = surface.insert_image(PNG);
        assert!(inserted.content.starts_with("Rex<figure"));
        assert_eq!(image_ids(&inserted.content), vec![inserted.image_id]);
    }

    #[test]
    fn image_goes_to_the_last_valid_selection() {
        let mut surface = DocumentSurface::new("Rex slept.");
        assert!(surface.record_selection(SelectionRange::collapsed(3)));
        let inserted = surface.insert_image(PNG);
        assert!(inserted.content.starts_with("Rex<figure"));
        assert!(inserted.content.ends_with("</figure> slept."));
        let after = surface.selection().unwrap();
        assert_eq!(&inserted.content[after.start..], " slept.");
        assert_eq!(word_count(&inserted.content), 2);
    }

    #[test]
    fn selected_text_is_replaced_by_the_image() {
        let mut surface = DocumentSurface::new("Rex big slept.");
        assert!(surface.record_selection(SelectionRange { start: 8, end: 3 }));
        let inserted = surface.insert_image(PNG);
        assert!(inserted.content.starts_with("Rex<figure"));
        assert!(inserted.content.ends_with("</figure>slept."));
    }

    #[test]
    fn stale_selection_falls_back_to_the_end() {
        let mut surface = DocumentSurface::new("A much longer chapter");
        assert!(surface.record_selection(SelectionRange::collapsed(18)));
        surface.sync_from_state("Short");
        let inserted = surface.insert_image(PNG);
        assert!(inserted.content.starts_with("Short<figure"));
        assert!(inserted.content.ends_with("</figure>"));
    }

    #[test]
    fn selections_inside_markup_are_invalid() {
        let content = format!("ab{}cd", image_block("img-1", PNG));
        assert!(is_valid_selection(&content, SelectionRange::collapsed(2)));
        assert!(!is_valid_selection(&content, SelectionRange::collapsed(5)));
        let inside_img = content.find("<img").unwrap() + 2;
        assert!(!is_valid_selection(&content, SelectionRange::collapsed(inside_img)));
        let after = content.len() - 2;
        assert!(is_valid_selection(&content, SelectionRange::collapsed(after)));
        assert!(!is_valid_selection(&content, SelectionRange { start: 0, end: after }));
        assert!(!is_valid_selection("é", SelectionRange::collapsed(1)));
        assert!(!is_valid_selection("abc", SelectionRange::collapsed(9)));
    }

    #[test]
    fn four_rotations_return_to_zero() {
        let mut surface = DocumentSurface::new("Rex");
        let id = surface.insert_image(PNG).image_id;
        surface.select_image(&id, 10.0, 20.0).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let content = surface.rotate_selected().unwrap();
            seen.push(image_rotation(&content, &id).unwrap());
        }
        assert_eq!(seen, vec![90, 180, 270, 0]);
        assert_eq!(surface.toolbar().unwrap().rotation, 0);
        assert_eq!(surface.content().matches("rotate(").count(), 1);
    }

    #[test]
    fn rotation_merges_into_an_existing_style() {
        let block = r#"<figure class="story-image-container" data-image-id="x"><img src="a.png" style="width: 50%;"></figure>"#;
        let rotated = set_block_rotation(block, 90);
        assert!(rotated.contains(r#"style="width: 50%; transform: rotate(90deg)""#));
        assert_eq!(block_rotation(&rotated), 90);
    }

    #[test]
    fn delete_removes_the_block_and_hides_the_toolbar() {
        let mut surface = DocumentSurface::new("Rex ");
        let id = surface.insert_image(PNG).image_id;
        surface.select_image(&id, 0.0, 0.0).unwrap();
        let content = surface.delete_selected().unwrap();
        assert_eq!(content, "Rex ");
        assert!(surface.toolbar().is_none());
        assert_eq!(surface.delete_selected(), Err(SurfaceError::NoImageSelected));
    }

    #[test]
    fn selecting_an_unknown_image_fails() {
        let mut surface = DocumentSurface::new("Rex");
        assert_eq!(
            surface.select_image("missing", 0.0, 0.0).unwrap_err(),
            SurfaceError::UnknownImage("missing".into())
        );
    }

    #[test]
    fn edits_hide_the_toolbar() {
        let mut surface = DocumentSurface::new("Rex");
        let id = surface.insert_image(PNG).image_id;
        surface.select_image(&id, 0.0, 0.0).unwrap();
        let content = format!("{} ran", surface.content());
        surface.edit(content).unwrap();
        assert!(surface.toolbar().is_none());
    }
}

//! crates/pet_tales_core/src/text.rs
//!
//! Plain-text projection of chapter markup.
//!
//! Chapter content is the HTML-like markup produced by a contentEditable region. It
//! is parsed into a small node tree so that word counting, prompts, tales and
//! exports all see the same text, without any rendering surface involved.

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements that start on their own line when rendered.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

/// Whether `name` starts on its own line when rendered.
pub fn is_block_element(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

/// One node of parsed markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
}

impl Node {
    pub fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Node::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            Node::Text(_) => None,
        }
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element { name, children, .. } => {
                let block = is_block_element(name);
                if block {
                    out.push('\n');
                }
                for child in children {
                    child.write_text(out);
                }
                if block {
                    out.push('\n');
                }
            }
        }
    }

    fn collect_elements<'a>(&'a self, name: &str, out: &mut Vec<&'a Node>) {
        if let Node::Element {
            name: own, children, ..
        } = self
        {
            if own == name {
                out.push(self);
            }
            for child in children {
                child.collect_elements(name, out);
            }
        }
    }
}

/// A parsed markup fragment: the top-level nodes of a chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

impl Fragment {
    /// Text content with line breaks at block boundaries.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_text(&mut out);
        }
        out
    }

    /// All elements named `name`, in document order.
    pub fn elements(&self, name: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        for node in &self.nodes {
            node.collect_elements(name, &mut out);
        }
        out
    }
}

/// Parses markup into a node tree. Never fails: malformed input degrades to text.
pub fn parse_markup(input: &str) -> Fragment {
    let mut parser = Parser {
        src: input,
        pos: 0,
        stack: vec![Frame::root()],
    };
    parser.run();
    parser.finish()
}

/// The plain-text projection of `markup`.
pub fn plain_text(markup: &str) -> String {
    parse_markup(markup).text_content()
}

/// Number of whitespace-delimited words in the plain-text projection of `markup`.
pub fn word_count(markup: &str) -> usize {
    plain_text(markup).split_whitespace().count()
}

/// Plain text with runs of whitespace collapsed to single spaces.
pub fn collapsed_text(markup: &str) -> String {
    plain_text(markup)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escapes text for use inside a double-quoted attribute or as element content.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

//=========================================================================================
// Tokenizer / tree builder
//=========================================================================================

struct Frame {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Frame {
    fn root() -> Self {
        Self {
            name: String::new(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn into_node(self) -> Node {
        Node::Element {
            name: self.name,
            attrs: self.attrs,
            children: self.children,
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    stack: Vec<Frame>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn push_node(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            if let (Node::Text(new), Some(Node::Text(prev))) = (&node, top.children.last_mut()) {
                prev.push_str(new);
                return;
            }
            top.children.push(node);
        }
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if let Some(after) = rest.strip_prefix("<!--") {
                let len = after.find("-->").map(|i| i + 3).unwrap_or(after.len());
                self.pos += 4 + len;
            } else if rest.starts_with("</") {
                if !self.close_tag() {
                    self.text_until_next_tag(2);
                }
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let len = rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
                self.pos += len;
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                if !self.open_tag() {
                    self.text_until_next_tag(1);
                }
            } else {
                let skip = usize::from(rest.starts_with('<'));
                self.text_until_next_tag(skip);
            }
        }
    }

    /// Consumes text up to the next `<` at or after `skip` bytes.
    fn text_until_next_tag(&mut self, skip: usize) {
        let rest = self.rest();
        let end = rest[skip..].find('<').map(|i| i + skip).unwrap_or(rest.len());
        let text = decode_entities(&rest[..end]);
        self.pos += end;
        if !text.is_empty() {
            self.push_node(Node::Text(text));
        }
    }

    fn open_tag(&mut self) -> bool {
        let rest = self.rest();
        let Some(end) = find_tag_end(rest) else {
            return false;
        };
        let inner = &rest[1..end];
        let self_closing = inner.trim_end().ends_with('/');
        let inner = inner.trim_end().trim_end_matches('/');
        let name_len = inner
            .find(|c: char| c.is_whitespace())
            .unwrap_or(inner.len());
        let name = inner[..name_len].to_ascii_lowercase();
        let attrs = parse_attrs(&inner[name_len..]);
        self.pos += end + 1;

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            self.push_node(Node::Element {
                name,
                attrs,
                children: Vec::new(),
            });
        } else {
            self.stack.push(Frame {
                name,
                attrs,
                children: Vec::new(),
            });
        }
        true
    }

    fn close_tag(&mut self) -> bool {
        let rest = self.rest();
        let Some(end) = rest.find('>') else {
            return false;
        };
        let name = rest[2..end].trim().to_ascii_lowercase();
        self.pos += end + 1;

        // Unmatched close tags are dropped; matched ones close everything above them.
        let Some(depth) = self.stack.iter().rposition(|f| f.name == name) else {
            return true;
        };
        if depth == 0 {
            return true;
        }
        while self.stack.len() > depth {
            self.pop_frame();
        }
        true
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.push_node(frame.into_node());
        }
    }

    fn finish(mut self) -> Fragment {
        while self.stack.len() > 1 {
            self.pop_frame();
        }
        let nodes = self.stack.pop().map(|f| f.children).unwrap_or_default();
        Fragment { nodes }
    }
}

/// Index of the `>` closing the tag that starts at byte 0, honouring quoted values.
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, '<') if i > 0 => return None,
            _ => {}
        }
    }
    None
}

fn parse_attrs(src: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut key_end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '=' {
                break;
            }
            key_end = i + c.len_utf8();
            chars.next();
        }
        let key = src[start..key_end].to_ascii_lowercase();
        while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        if matches!(chars.peek(), Some(&(_, '='))) {
            chars.next();
            while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
                chars.next();
            }
            match chars.peek().copied() {
                Some((i, q)) if q == '"' || q == '\'' => {
                    chars.next();
                    let value_start = i + 1;
                    let mut value_end = src.len();
                    for (j, c) in chars.by_ref() {
                        if c == q {
                            value_end = j;
                            break;
                        }
                    }
                    value = decode_entities(&src[value_start..value_end.max(value_start)]);
                }
                Some((i, _)) => {
                    let mut value_end = src.len();
                    while let Some(&(j, c)) = chars.peek() {
                        if c.is_whitespace() {
                            value_end = j;
                            break;
                        }
                        chars.next();
                    }
                    value = decode_entities(&src[i..value_end]);
                }
                None => {}
            }
        }
        if !key.is_empty() {
            attrs.push((key, value));
        }
    }
    attrs
}

/// Decodes the character references a contentEditable region emits.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&candidate[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_markup_and_decodes_entities() {
        let text = plain_text("Rex &amp; Bella <b>played</b>&nbsp;outside");
        assert_eq!(text, "Rex & Bella played\u{a0}outside");
        assert_eq!(word_count("Rex &amp; Bella <b>played</b>&nbsp;outside"), 5);
    }

    #[test]
    fn block_elements_separate_words() {
        assert_eq!(word_count("<div>one</div><div>two</div>"), 2);
        assert_eq!(word_count("one<br>two"), 2);
        assert_eq!(word_count("<p>a</p><p>b c</p>"), 3);
    }

    #[test]
    fn images_contribute_no_words() {
        let markup = r#"Rex <figure class="story-image-container" contenteditable="false"><img src="data:image/png;base64,AAAA" class="story-image"></figure> slept"#;
        assert_eq!(word_count(markup), 2);
        let fragment = parse_markup(markup);
        let images = fragment.elements("img");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].attr("src"), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn empty_and_whitespace_only_content_has_no_words() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n\t"), 0);
        assert_eq!(word_count("<div><br></div>"), 0);
    }

    #[test]
    fn tolerates_malformed_markup() {
        assert_eq!(plain_text("a < b and c > d"), "a < b and c > d");
        assert_eq!(word_count("<div>unclosed <span>tags"), 2);
        assert_eq!(word_count("stray </p> close"), 2);
        assert_eq!(plain_text("<!-- note -->kept"), "kept");
    }

    #[test]
    fn attributes_parse_quoted_and_bare_values() {
        let fragment = parse_markup(r#"<img src='a b.png' alt=dog data-x="1 > 0" hidden>"#);
        let img = &fragment.nodes[0];
        assert_eq!(img.attr("src"), Some("a b.png"));
        assert_eq!(img.attr("alt"), Some("dog"));
        assert_eq!(img.attr("data-x"), Some("1 > 0"));
        assert_eq!(img.attr("hidden"), Some(""));
    }

    #[test]
    fn numeric_references_decode() {
        assert_eq!(decode_entities("&#65;&#x42;&unknown;"), "AB&unknown;");
    }

    proptest! {
        #[test]
        fn word_count_matches_token_count_of_projection(s in "[a-z <>/&;]{0,60}") {
            let text = plain_text(&s);
            prop_assert_eq!(word_count(&s), text.split_whitespace().count());
            prop_assert_eq!(word_count(&s), word_count(&s));
            prop_assert_eq!(collapsed_text(&s).split(' ').filter(|w| !w.is_empty()).count(), word_count(&s));
        }
    }
}

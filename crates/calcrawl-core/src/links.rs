//! Streaming hyperlink extraction.
//!
//! [`LinkScanner`] is a character-driven state machine that pulls `href`
//! targets out of `<a>` elements without building a document tree. It can be
//! fed in arbitrary chunks (text or raw bytes), so memory stays bounded by the
//! links found rather than the size of the listing page.
//!
//! Content of `<script>`, `<style>` and comments is skipped wholesale, so
//! href-looking text inside them is never reported. Ill-formed input never
//! fails: an unterminated tag at end of stream just yields the links that
//! were already complete.
//!
//! ```
//! use calcrawl_core::links::extract_links;
//!
//! let html = r#"<a href="/x">x</a><script>var href="/evil"</script><a href='/y'>"#;
//! assert_eq!(extract_links(html), vec!["/x", "/y"]);
//! ```

use std::io::{self, Read};

/// Tag and attribute names longer than this can never match anything we look
/// for, so they stop growing.
const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Anchor,
    /// Raw-text element; content is skipped until the closing sequence.
    RawText(&'static str),
    Other,
}

impl Element {
    fn classify(name: &str) -> Self {
        match name {
            "a" => Element::Anchor,
            "script" => Element::RawText("</script"),
            "style" => Element::RawText("</style"),
            _ => Element::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    TagOpen,
    TagName { closing: bool },
    /// After `<!`, looking for the `--` of a comment.
    Declaration { dashes: u8 },
    /// Inside something we don't care about; skip to `>`.
    Bogus,
    BeforeAttrName(Element),
    AttrName(Element),
    AfterAttrName(Element),
    BeforeAttrValue { element: Element, capture: bool },
    AttrValue {
        element: Element,
        capture: bool,
        quote: Option<char>,
    },
    Skip { end: &'static str, matched: usize },
}

/// Incremental `<a href>` extractor.
#[derive(Debug)]
pub struct LinkScanner {
    state: State,
    name: String,
    attr: String,
    value: String,
    links: Vec<String>,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last chunk.
    pending: Vec<u8>,
}

impl Default for LinkScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkScanner {
    pub fn new() -> Self {
        Self {
            state: State::Text,
            name: String::new(),
            attr: String::new(),
            value: String::new(),
            links: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Feed a chunk of text.
    pub fn feed(&mut self, chunk: &str) {
        for c in chunk.chars() {
            self.push(c);
        }
    }

    /// Feed a chunk of raw bytes. Multi-byte characters split across chunks
    /// are reassembled; invalid sequences become U+FFFD.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut start = 0;
        while start < buf.len() {
            match std::str::from_utf8(&buf[start..]) {
                Ok(text) => {
                    self.feed(text);
                    start = buf.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&buf[start..start + valid]) {
                        self.feed(text);
                    }
                    start += valid;
                    match e.error_len() {
                        Some(len) => {
                            self.push(char::REPLACEMENT_CHARACTER);
                            start += len;
                        }
                        None => break,
                    }
                }
            }
        }

        buf.drain(..start);
        self.pending = buf;
    }

    /// Links completed so far, in document order.
    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// End the stream. Anything mid-tag is dropped.
    pub fn finish(self) -> Vec<String> {
        self.links
    }

    fn push(&mut self, c: char) {
        self.state = match self.state {
            State::Text => {
                if c == '<' {
                    State::TagOpen
                } else {
                    State::Text
                }
            }
            State::TagOpen => match c {
                '!' => State::Declaration { dashes: 0 },
                '/' => {
                    self.name.clear();
                    State::TagName { closing: true }
                }
                '<' => State::TagOpen,
                c if c.is_ascii_alphabetic() => {
                    self.name.clear();
                    self.name.push(c.to_ascii_lowercase());
                    State::TagName { closing: false }
                }
                '?' => State::Bogus,
                _ => State::Text,
            },
            State::TagName { closing } => match c {
                '>' if closing => State::Text,
                '>' => self.end_tag(Element::classify(&self.name)),
                c if (c.is_whitespace() || c == '/') && closing => State::Bogus,
                c if c.is_whitespace() || c == '/' => {
                    State::BeforeAttrName(Element::classify(&self.name))
                }
                c => {
                    push_bounded(&mut self.name, c.to_ascii_lowercase());
                    State::TagName { closing }
                }
            },
            State::Declaration { dashes } => match c {
                '-' if dashes == 1 => State::Skip {
                    end: "-->",
                    matched: 0,
                },
                '-' => State::Declaration { dashes: 1 },
                '>' => State::Text,
                _ => State::Bogus,
            },
            State::Bogus => {
                if c == '>' {
                    State::Text
                } else {
                    State::Bogus
                }
            }
            State::BeforeAttrName(element) => match c {
                '>' => self.end_tag(element),
                c if c.is_whitespace() || c == '/' => State::BeforeAttrName(element),
                c => {
                    self.attr.clear();
                    self.attr.push(c.to_ascii_lowercase());
                    State::AttrName(element)
                }
            },
            State::AttrName(element) => match c {
                '=' => self.before_value(element),
                '>' => self.end_tag(element),
                '/' => State::BeforeAttrName(element),
                c if c.is_whitespace() => State::AfterAttrName(element),
                c => {
                    push_bounded(&mut self.attr, c.to_ascii_lowercase());
                    State::AttrName(element)
                }
            },
            State::AfterAttrName(element) => match c {
                '=' => self.before_value(element),
                '>' => self.end_tag(element),
                '/' => State::BeforeAttrName(element),
                c if c.is_whitespace() => State::AfterAttrName(element),
                c => {
                    self.attr.clear();
                    self.attr.push(c.to_ascii_lowercase());
                    State::AttrName(element)
                }
            },
            State::BeforeAttrValue { element, capture } => match c {
                '"' | '\'' => {
                    self.value.clear();
                    State::AttrValue {
                        element,
                        capture,
                        quote: Some(c),
                    }
                }
                '>' => self.end_tag(element),
                c if c.is_whitespace() => State::BeforeAttrValue { element, capture },
                c => {
                    self.value.clear();
                    if capture {
                        self.value.push(c);
                    }
                    State::AttrValue {
                        element,
                        capture,
                        quote: None,
                    }
                }
            },
            State::AttrValue {
                element,
                capture,
                quote: Some(quote),
            } => {
                if c == quote {
                    self.emit(capture);
                    State::BeforeAttrName(element)
                } else {
                    if capture {
                        self.value.push(c);
                    }
                    self.state
                }
            }
            State::AttrValue {
                element,
                capture,
                quote: None,
            } => match c {
                '>' => {
                    self.emit(capture);
                    self.end_tag(element)
                }
                c if c.is_whitespace() => {
                    self.emit(capture);
                    State::BeforeAttrName(element)
                }
                c => {
                    if capture {
                        self.value.push(c);
                    }
                    self.state
                }
            },
            State::Skip { end, matched } => {
                let matched = advance(end, matched, c);
                if matched < end.len() {
                    State::Skip { end, matched }
                } else if end == "-->" {
                    State::Text
                } else {
                    // Matched `</script`; the rest of the closing tag follows.
                    State::Bogus
                }
            }
        };
    }

    fn before_value(&self, element: Element) -> State {
        State::BeforeAttrValue {
            element,
            capture: element == Element::Anchor && self.attr == "href",
        }
    }

    fn end_tag(&self, element: Element) -> State {
        match element {
            Element::RawText(end) => State::Skip { end, matched: 0 },
            Element::Anchor | Element::Other => State::Text,
        }
    }

    fn emit(&mut self, capture: bool) {
        if capture {
            let link = self.value.trim();
            if !link.is_empty() {
                self.links.push(link.to_string());
            }
        }
        self.value.clear();
    }
}

fn push_bounded(buf: &mut String, c: char) {
    if buf.len() < MAX_NAME_LEN {
        buf.push(c);
    }
}

/// Advance a case-insensitive match of `end` by one character, falling back
/// to the longest prefix of `end` that is still a suffix of the input.
fn advance(end: &str, matched: usize, c: char) -> usize {
    let c = c.to_ascii_lowercase();
    if !c.is_ascii() {
        return 0;
    }
    let c = c as u8;
    let end = end.as_bytes();
    if end[matched] == c {
        return matched + 1;
    }
    (1..=matched)
        .rev()
        .find(|&k| end[k - 1] == c && end[..k - 1] == end[matched + 1 - k..matched])
        .unwrap_or(0)
}

/// Extract every `<a href>` target from an HTML document.
pub fn extract_links(html: &str) -> Vec<String> {
    let mut scanner = LinkScanner::new();
    scanner.feed(html);
    scanner.finish()
}

/// Extract links from a reader in fixed-size chunks.
pub fn extract_links_from_reader<R: Read>(mut reader: R) -> io::Result<Vec<String>> {
    let mut scanner = LinkScanner::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => scanner.feed_bytes(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(scanner.finish())
}

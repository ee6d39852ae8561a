//! AST-aware chunking via tree-sitter with a character-window fallback.
//!
//! Declaration-level nodes become chunks. Text between them (imports,
//! comments, blank lines) is filler: small filler is folded into an adjacent
//! chunk when the result still fits, larger filler stands alone. Oversized
//! nodes are recursed into when they contain declarations of their own and
//! window-split otherwise.

use std::ops::Range;

use ragdex_memory::Payload;
use tree_sitter::{Node, Parser};

use crate::languages::Lang;
use crate::splitter::split_spans;

pub const WARN_NO_LANGUAGE: &str = "Fallback text splitting applied (no language)";
pub const WARN_PARSE_ERROR: &str = "Fallback text splitting applied (parsing error)";
pub const WARN_MARKDOWN: &str =
    "Fallback text splitting applied (markdown is not AST-supported yet)";
pub const WARN_LARGE_NODE: &str = "Fallback split applied to large node";

/// Filler shorter than this many characters is merged into a neighbour when it fits.
const FILLER_MERGE_THRESHOLD: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// One contiguous piece of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    /// 1-based line of the first non-blank character.
    pub start_line: Option<usize>,
    /// 1-based line of the last non-blank character.
    pub end_line: Option<usize>,
    pub node_type: Option<String>,
    pub entity_name: Option<String>,
    pub language: Option<Lang>,
    pub warning: Option<String>,
    /// Metadata inherited from the source document.
    pub metadata: Payload,
}

impl Chunk {
    /// Flatten provenance and inherited metadata into primitive payload values.
    #[must_use]
    pub fn to_metadata(&self, chunk_index: usize) -> Payload {
        let mut meta = self.metadata.clone();
        meta.insert("chunk_index".into(), chunk_index.into());
        meta.insert(
            "content_hash".into(),
            blake3::hash(self.content.as_bytes()).to_hex().to_string().into(),
        );
        if let Some(line) = self.start_line {
            meta.insert("start_line".into(), line.into());
        }
        if let Some(line) = self.end_line {
            meta.insert("end_line".into(), line.into());
        }
        if let Some(kind) = &self.node_type {
            meta.insert("node_type".into(), kind.clone().into());
        }
        if let Some(name) = &self.entity_name {
            meta.insert("entity_name".into(), name.clone().into());
        }
        if let Some(lang) = self.language {
            meta.insert("language".into(), lang.id().into());
        }
        if let Some(warning) = &self.warning {
            meta.insert("warning".into(), warning.clone().into());
        }
        meta
    }
}

/// Split `text` into chunks of at most `options.max_chunk_size` characters.
///
/// Never fails: documents that cannot be parsed are text-split and every
/// resulting chunk carries a `warning`.
#[must_use]
pub fn chunk_document(
    text: &str,
    language: Option<Lang>,
    options: &ChunkOptions,
    base_metadata: &Payload,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let Some(lang) = language else {
        return text_split(text, None, options, WARN_NO_LANGUAGE, base_metadata);
    };
    if lang.is_ast_deferred() {
        return text_split(text, Some(lang), options, WARN_MARKDOWN, base_metadata);
    }
    let Some(grammar) = lang.grammar() else {
        tracing::debug!(language = %lang, "grammar not compiled in, text splitting");
        return text_split(text, Some(lang), options, WARN_NO_LANGUAGE, base_metadata);
    };

    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&grammar) {
        tracing::warn!(language = %lang, "set_language failed: {e}");
        return text_split(text, Some(lang), options, WARN_PARSE_ERROR, base_metadata);
    }
    let Some(tree) = parser.parse(text, None) else {
        return text_split(text, Some(lang), options, WARN_PARSE_ERROR, base_metadata);
    };
    let root = tree.root_node();
    if root.is_error() || root.child_count() == 0 {
        return text_split(text, Some(lang), options, WARN_PARSE_ERROR, base_metadata);
    }

    let mut walker = Walker {
        text,
        lang,
        max: options.max_chunk_size.max(1),
        overlap: options.chunk_overlap,
        pieces: Vec::new(),
    };

    if walker.has_meaningful_descendant(root) {
        let mut cursor = 0;
        walker.walk(root, &mut cursor);
        walker.push_filler(cursor..text.len());
    } else {
        // whole document stands in for the root node
        let range = 0..text.len();
        if walker.chars(&range) <= walker.max {
            walker.pieces.push(Piece {
                range,
                kind: Some(root.kind().to_owned()),
                name: None,
                warning: None,
                role: Role::Node,
            });
        } else {
            walker.push_split(range, Some(root.kind()), None, Some(WARN_LARGE_NODE));
        }
    }

    let pieces = walker.merge_filler();
    let lines = LineIndex::new(text);
    pieces
        .into_iter()
        .map(|p| Chunk {
            content: text[p.range.clone()].to_owned(),
            start_line: Some(lines.first_line(text, &p.range)),
            end_line: Some(lines.last_line(text, &p.range)),
            node_type: p.kind,
            entity_name: p.name,
            language: Some(lang),
            warning: p.warning.map(str::to_owned),
            metadata: base_metadata.clone(),
        })
        .collect()
}

fn text_split(
    text: &str,
    language: Option<Lang>,
    options: &ChunkOptions,
    warning: &str,
    base_metadata: &Payload,
) -> Vec<Chunk> {
    let lines = LineIndex::new(text);
    split_spans(text, options.max_chunk_size.max(1), options.chunk_overlap)
        .into_iter()
        .map(|range| Chunk {
            content: text[range.clone()].to_owned(),
            start_line: Some(lines.first_line(text, &range)),
            end_line: Some(lines.last_line(text, &range)),
            node_type: None,
            entity_name: None,
            language,
            warning: Some(warning.to_owned()),
            metadata: base_metadata.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// A meaningful node that fits; filler may be merged into it.
    Node,
    /// Final as-is: window-split pieces and standalone filler.
    Fixed,
    /// Text between meaningful nodes awaiting a merge decision.
    Filler,
}

#[derive(Debug)]
struct Piece {
    range: Range<usize>,
    kind: Option<String>,
    name: Option<String>,
    warning: Option<&'static str>,
    role: Role,
}

struct Walker<'a> {
    text: &'a str,
    lang: Lang,
    max: usize,
    overlap: usize,
    pieces: Vec<Piece>,
}

impl Walker<'_> {
    fn chars(&self, range: &Range<usize>) -> usize {
        self.text[range.clone()].chars().count()
    }

    fn walk(&mut self, node: Node<'_>, cursor: &mut usize) {
        let mut tc = node.walk();
        for child in node.children(&mut tc) {
            if self.lang.is_meaningful(child.kind()) {
                self.push_filler(*cursor..child.start_byte());
                self.emit_node(child);
                *cursor = child.end_byte();
            } else if self.has_meaningful_descendant(child) {
                self.walk(child, cursor);
            }
        }
    }

    fn emit_node(&mut self, node: Node<'_>) {
        let range = node.byte_range();
        let name = entity_name(node, self.text);
        if self.chars(&range) <= self.max {
            self.pieces.push(Piece {
                range,
                kind: Some(node.kind().to_owned()),
                name,
                warning: None,
                role: Role::Node,
            });
        } else if self.has_meaningful_descendant(node) {
            let mut cursor = range.start;
            self.walk(node, &mut cursor);
            self.push_filler(cursor..range.end);
        } else {
            self.push_split(range, Some(node.kind()), name, Some(WARN_LARGE_NODE));
        }
    }

    fn has_meaningful_descendant(&self, node: Node<'_>) -> bool {
        let mut cursor = node.walk();
        if !cursor.goto_first_child() {
            return false;
        }
        loop {
            if self.lang.is_meaningful(cursor.node().kind()) {
                return true;
            }
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() || cursor.node().id() == node.id() {
                    return false;
                }
            }
        }
    }

    fn push_filler(&mut self, range: Range<usize>) {
        if range.start >= range.end {
            return;
        }
        if let Some(last) = self.pieces.last_mut()
            && last.role == Role::Filler
            && last.range.end == range.start
        {
            last.range.end = range.end;
            return;
        }
        self.pieces.push(Piece {
            range,
            kind: None,
            name: None,
            warning: None,
            role: Role::Filler,
        });
    }

    fn push_split(
        &mut self,
        range: Range<usize>,
        kind: Option<&str>,
        name: Option<String>,
        warning: Option<&'static str>,
    ) {
        let offset = range.start;
        for window in split_spans(&self.text[range], self.max, self.overlap) {
            self.pieces.push(Piece {
                range: offset + window.start..offset + window.end,
                kind: kind.map(str::to_owned),
                name: name.clone(),
                warning,
                role: Role::Fixed,
            });
        }
    }

    fn merge_filler(&mut self) -> Vec<Piece> {
        let pieces = std::mem::take(&mut self.pieces);
        let mut iter = pieces.into_iter().peekable();

        while let Some(piece) = iter.next() {
            if piece.role != Role::Filler {
                self.pieces.push(piece);
                continue;
            }
            let filler = &self.text[piece.range.clone()];
            let blank = filler.trim().is_empty();
            if blank || filler.chars().count() < FILLER_MERGE_THRESHOLD {
                if let Some(next) = iter.peek_mut()
                    && next.role == Role::Node
                    && next.range.start == piece.range.end
                    && self.chars(&(piece.range.start..next.range.end)) <= self.max
                {
                    next.range.start = piece.range.start;
                    continue;
                }
                let max = self.max;
                let text = self.text;
                if let Some(prev) = self.pieces.last_mut()
                    && prev.role == Role::Node
                    && prev.range.end == piece.range.start
                    && text[prev.range.start..piece.range.end].chars().count() <= max
                {
                    prev.range.end = piece.range.end;
                    continue;
                }
                if blank {
                    continue;
                }
            }
            if self.chars(&piece.range) <= self.max {
                self.pieces.push(Piece {
                    role: Role::Fixed,
                    ..piece
                });
            } else {
                self.push_split(piece.range, None, None, None);
            }
        }

        std::mem::take(&mut self.pieces)
    }
}

fn entity_name(node: Node<'_>, source: &str) -> Option<String> {
    // impl_item names its subject with "type"; JSON pairs use "key"
    node.child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .or_else(|| node.child_by_field_name("key"))
        .map(|n| source[n.byte_range()].trim_matches('"').to_owned())
}

/// Byte offsets of line starts, for 1-based line lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|&s| s <= byte)
    }

    fn first_line(&self, text: &str, range: &Range<usize>) -> usize {
        let slice = &text[range.clone()];
        let lead = slice.len() - slice.trim_start().len();
        if lead == slice.len() {
            return self.line_of(range.start);
        }
        self.line_of(range.start + lead)
    }

    fn last_line(&self, text: &str, range: &Range<usize>) -> usize {
        let slice = &text[range.clone()];
        let trimmed = slice.trim_end().len();
        if trimmed == 0 {
            return self.line_of(range.start);
        }
        self.line_of(range.start + trimmed - 1)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn opts(max: usize, overlap: usize) -> ChunkOptions {
        ChunkOptions {
            max_chunk_size: max,
            chunk_overlap: overlap,
        }
    }

    fn base() -> Payload {
        Payload::from([("file_path".into(), serde_json::json!("src/lib.rs"))])
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_document("", Some(Lang::Rust), &ChunkOptions::default(), &base()).is_empty());
        assert!(chunk_document("  \n\t", None, &ChunkOptions::default(), &base()).is_empty());
    }

    #[test]
    fn short_text_without_language_is_one_warned_chunk() {
        let text = "z".repeat(98);
        let chunks = chunk_document(&text, None, &opts(100, 20), &Payload::new());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].warning.as_deref(), Some(WARN_NO_LANGUAGE));
        assert_eq!(chunks[0].language, None);
        assert_eq!(chunks[0].start_line, Some(1));
    }

    #[test]
    fn long_text_without_language_overlaps() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_document(&text, None, &opts(100, 20), &Payload::new());
        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            assert!(pair[1].content.starts_with(&pair[0].content[80..]));
        }
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 100));
    }

    #[test]
    fn markdown_is_text_split_with_warning() {
        let chunks = chunk_document(
            "# Title\n\nSome prose.\n",
            Some(Lang::Markdown),
            &ChunkOptions::default(),
            &Payload::new(),
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].warning.as_deref(), Some(WARN_MARKDOWN));
        assert_eq!(chunks[0].language, Some(Lang::Markdown));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_functions_become_chunks_with_filler_merged() {
        let source = "use std::io;\n\nfn a() {\n    1\n}\n\nfn b() {\n    2\n}\n";
        let chunks = chunk_document(source, Some(Lang::Rust), &opts(40, 0), &base());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "use std::io;\n\nfn a() {\n    1\n}");
        assert_eq!(chunks[0].node_type.as_deref(), Some("function_item"));
        assert_eq!(chunks[0].entity_name.as_deref(), Some("a"));
        assert_eq!(chunks[0].start_line, Some(1));
        assert_eq!(chunks[0].end_line, Some(5));
        assert_eq!(chunks[1].start_line, Some(7));
        assert_eq!(chunks[1].end_line, Some(9));
        assert!(chunks[1].content.contains("fn b()"));
        assert!(chunks.iter().all(|c| c.warning.is_none()));
        assert_eq!(chunks[0].metadata["file_path"], serde_json::json!("src/lib.rs"));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn node_of_exact_max_size_is_not_split() {
        let source = "fn f() { let x = 1; }";
        let max = source.chars().count();
        let chunks = chunk_document(source, Some(Lang::Rust), &opts(max, 0), &Payload::new());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, source);
        assert!(chunks[0].warning.is_none());
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn large_leaf_node_is_window_split() {
        let mut body = String::from("fn big() {\n");
        for i in 0..30 {
            body.push_str(&format!("    let var{i} = {i};\n"));
        }
        body.push_str("}\n");

        let chunks = chunk_document(&body, Some(Lang::Rust), &opts(100, 10), &Payload::new());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 100);
            assert_eq!(chunk.warning.as_deref(), Some(WARN_LARGE_NODE));
            assert_eq!(chunk.node_type.as_deref(), Some("function_item"));
        }
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn large_node_with_meaningful_children_recurses() {
        let source = r#"impl Foo {
    fn bar(&self) -> i32 {
        42
    }

    fn baz(&self) -> String {
        String::new()
    }

    fn qux(&self) {
        println!("qux");
    }
}
"#;
        let chunks = chunk_document(source, Some(Lang::Rust), &opts(60, 0), &Payload::new());
        let kinds: Vec<_> = chunks.iter().filter_map(|c| c.node_type.as_deref()).collect();
        assert_eq!(kinds, vec!["function_item"; 3]);
        assert!(chunks[0].content.starts_with("impl Foo {"));
        assert!(chunks.iter().all(|c| c.warning.is_none()));
        assert!(chunks.last().unwrap().content.trim_end().ends_with('}'));
    }

    #[cfg(feature = "lang-config")]
    #[test]
    fn large_document_without_meaningful_nodes_splits_root() {
        let items: Vec<String> = (0..40).map(|i| i.to_string()).collect();
        let source = format!("[{}]", items.join(", "));
        assert!(source.chars().count() > 100);
        let chunks = chunk_document(&source, Some(Lang::Json), &opts(100, 0), &Payload::new());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 100);
            assert_eq!(chunk.warning.as_deref(), Some(WARN_LARGE_NODE));
            assert_eq!(chunk.node_type.as_deref(), Some("document"));
        }
    }

    #[cfg(feature = "lang-config")]
    #[test]
    fn small_document_without_meaningful_nodes_is_single_chunk() {
        let chunks =
            chunk_document("[1, 2, 3]", Some(Lang::Json), &opts(100, 0), &Payload::new());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].warning.is_none());
    }

    #[cfg(feature = "lang-config")]
    #[test]
    fn toml_tables_are_boundaries() {
        let source = "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = \"1\"\n";
        let chunks = chunk_document(source, Some(Lang::Toml), &opts(45, 0), &Payload::new());
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("[package]"));
        assert!(chunks[1].content.contains("[dependencies]"));
        assert_eq!(chunks[1].node_type.as_deref(), Some("table"));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_class_recurses_into_methods() {
        let source = "class Greeter:\n    def hello(self):\n        return 'hello'\n\n    def bye(self):\n        return 'bye'\n";
        let chunks = chunk_document(source, Some(Lang::Python), &opts(50, 0), &Payload::new());
        assert!(chunks.len() >= 2);
        assert!(
            chunks
                .iter()
                .any(|c| c.entity_name.as_deref() == Some("bye"))
        );
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 50));
    }

    #[test]
    fn metadata_carries_provenance() {
        let chunk = Chunk {
            content: "fn a() {}".into(),
            start_line: Some(3),
            end_line: Some(3),
            node_type: Some("function_item".into()),
            entity_name: Some("a".into()),
            language: Some(Lang::Rust),
            warning: None,
            metadata: base(),
        };
        let meta = chunk.to_metadata(4);
        assert_eq!(meta["chunk_index"], serde_json::json!(4));
        assert_eq!(meta["language"], serde_json::json!("rust"));
        assert_eq!(meta["node_type"], serde_json::json!("function_item"));
        assert_eq!(meta["start_line"], serde_json::json!(3));
        assert_eq!(meta["file_path"], serde_json::json!("src/lib.rs"));
        assert!(!meta.contains_key("warning"));
        assert_eq!(
            meta["content_hash"],
            serde_json::json!(blake3::hash(b"fn a() {}").to_hex().to_string())
        );
    }

    #[test]
    fn line_index_lookup() {
        let text = "a\nbb\n\nccc\n";
        let idx = LineIndex::new(text);
        assert_eq!(idx.line_of(0), 1);
        assert_eq!(idx.line_of(2), 2);
        assert_eq!(idx.line_of(6), 4);
        assert_eq!(idx.first_line(text, &(1..9)), 2);
        assert_eq!(idx.last_line(text, &(1..10)), 4);
    }

    fn non_ws(s: &str) -> usize {
        s.chars().filter(|c| !c.is_whitespace()).count()
    }

    proptest! {
        #[test]
        fn chunks_bounded_and_cover_text(
            text in "[a-z{}();=\\n ]{0,600}",
            max in 20usize..200,
            overlap in 0usize..20,
            with_lang in any::<bool>(),
        ) {
            let lang = with_lang.then_some(Lang::Rust);
            let chunks = chunk_document(&text, lang, &opts(max, overlap), &Payload::new());
            let mut covered = 0;
            for chunk in &chunks {
                prop_assert!(chunk.content.chars().count() <= max);
                prop_assert!(text.contains(&chunk.content));
                covered += non_ws(&chunk.content);
            }
            prop_assert!(covered >= non_ws(&text));
        }
    }
}

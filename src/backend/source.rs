//! Offset-preserving source preprocessing shared by the backends.
//!
//! Every transformation here replaces bytes with spaces instead of removing
//! them, so byte offsets, lines and columns in the transformed text are the
//! same as in the original.

use lazy_static::lazy_static;
use regex::Regex;

use super::facts::Location;

lazy_static! {
    /// Kernel annotations the C grammar does not know about.
    static ref ANNOTATION_RE: Regex = Regex::new(
        r"\b(?:(?:__aligned|__acquires|__releases)\s*\([^)]*\)|(?:__init|__exit|__initdata|__exitdata|__initconst|__devinit|__devexit|__user|__iomem|__percpu|__rcu|__force|__must_check|__maybe_unused|__always_inline|__cold|__noreturn|__packed|__randomize_layout|__cacheline_aligned|notrace|noinline)\b)"
    )
    .unwrap();
}

const GNU_ATTRIBUTE: &str = "__attribute__";

/// Maps byte offsets to (line, column) pairs.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line and 0-based column of `offset`.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.starts[line])
    }

    pub fn location(&self, file: &str, start: usize, end: usize) -> Location {
        let (sl, sc) = self.position(start);
        let (el, ec) = self.position(end.max(start));
        Location::new(file, sl, sc, el, ec)
    }
}

fn blank(bytes: &mut [u8], range: std::ops::Range<usize>) {
    for b in &mut bytes[range] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

/// Blank out `/* */` and `//` comments, leaving string and character
/// literals untouched.
pub fn mask_comments(source: &str) -> String {
    let src = source.as_bytes();
    let mut out = src.to_vec();
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'"' | b'\'' => i = skip_literal(src, i),
            b'/' if src.get(i + 1) == Some(&b'*') => {
                let end = find_bytes(src, i + 2, b"*/").map(|e| e + 2).unwrap_or(src.len());
                blank(&mut out, i..end);
                i = end;
            }
            b'/' if src.get(i + 1) == Some(&b'/') => {
                let end = src[i..].iter().position(|&b| b == b'\n').map(|p| i + p).unwrap_or(src.len());
                blank(&mut out, i..end);
                i = end;
            }
            _ => i += 1,
        }
    }
    bytes_to_string(out)
}

/// Blank out preprocessor directive lines, including backslash
/// continuations. Returns the masked text and the `#define`d names with
/// their offsets.
pub fn mask_preprocessor(text: &str) -> (String, Vec<(String, usize)>) {
    let mut out = text.as_bytes().to_vec();
    let mut defines = Vec::new();
    let mut offset = 0;
    let mut in_directive = false;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let starts_directive = trimmed.starts_with('#');
        if starts_directive || in_directive {
            if starts_directive {
                let directive = trimmed[1..].trim_start();
                if let Some(rest) = directive.strip_prefix("define") {
                    let name: String = rest
                        .trim_start()
                        .chars()
                        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                        .collect();
                    if !name.is_empty() && rest.starts_with(char::is_whitespace) {
                        let rest_start = line.len() - rest.len();
                        let at = offset + rest_start + (rest.len() - rest.trim_start().len());
                        defines.push((name, at));
                    }
                }
            }
            blank(&mut out, offset..offset + line.len());
            in_directive = line.trim_end_matches(['\n', '\r']).ends_with('\\');
        }
        offset += line.len();
    }
    (bytes_to_string(out), defines)
}

/// Blank out kernel annotations such as `__init` and `__user`, and GNU
/// `__attribute__((...))` specifiers with their argument lists.
pub fn mask_annotations(text: &str) -> String {
    let mut out = text.as_bytes().to_vec();
    for m in ANNOTATION_RE.find_iter(text) {
        blank(&mut out, m.range());
    }
    let mut from = 0;
    while let Some(found) = text[from..].find(GNU_ATTRIBUTE) {
        let start = from + found;
        let after = start + GNU_ATTRIBUTE.len();
        let word_start = start == 0 || !text[..start].ends_with(is_ident_char);
        let word_end = !text[after..].starts_with(is_ident_char);
        from = after;
        if !(word_start && word_end) {
            continue;
        }
        let lead = text[after..].len() - text[after..].trim_start().len();
        let end = if text[after + lead..].starts_with('(') {
            let Some(close) = find_matching(text, after + lead) else {
                continue;
            };
            close + 1
        } else {
            after
        };
        blank(&mut out, start..end);
        from = end;
    }
    bytes_to_string(out)
}

fn bytes_to_string(bytes: Vec<u8>) -> String {
    // Only ASCII bytes are ever replaced, so the result stays valid UTF-8.
    String::from_utf8(bytes).unwrap_or_default()
}

fn find_bytes(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Offset just past the string or character literal opening at `start`.
pub fn skip_literal(src: &[u8], start: usize) -> usize {
    let quote = src[start];
    let mut i = start + 1;
    while i < src.len() {
        match src[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    src.len()
}

/// Offset of the bracket closing the one at `open`, skipping string and
/// character literals.
pub fn find_matching(text: &str, open: usize) -> Option<usize> {
    let src = text.as_bytes();
    let (open_ch, close_ch) = match src.get(open)? {
        b'{' => (b'{', b'}'),
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    while i < src.len() {
        match src[i] {
            b'"' | b'\'' => {
                i = skip_literal(src, i);
                continue;
            }
            b if b == open_ch => depth += 1,
            b if b == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split `text` on `sep` where it appears outside any bracket pair or
/// literal. Pieces are returned with their starting offsets, untrimmed.
pub fn split_top_level(text: &str, sep: u8) -> Vec<(usize, &str)> {
    let src = text.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'"' | b'\'' => {
                i = skip_literal(src, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b if b == sep && depth == 0 => {
                pieces.push((start, &text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < text.len() {
        pieces.push((start, &text[start..]));
    }
    pieces
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical spelling of a type: single spaces, `*` separated from the
/// base type and adjacent stars joined (`struct foo **`).
pub fn tidy_type(text: &str) -> String {
    let mut out = normalize_ws(&text.replace('*', " * "));
    while out.contains("* *") {
        out = out.replace("* *", "**");
    }
    out
}

/// Base type plus `stars` levels of indirection.
pub fn pointer_type(base: &str, stars: usize) -> String {
    if stars == 0 {
        tidy_type(base)
    } else {
        tidy_type(&format!("{} {}", base, "*".repeat(stars)))
    }
}

/// Identifier characters; non-ASCII letters are accepted as GCC does.
fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn is_identifier(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && text.chars().all(is_ident_char)
}

/// Byte offset where the identifier ending `text` starts. Always a char
/// boundary.
pub fn trailing_identifier_start(text: &str) -> usize {
    text.char_indices()
        .rev()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

const TYPE_WORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
    "bool", "const", "volatile", "struct", "union", "enum",
];

/// A declarator split into its parts: base type, pointer depth, name and
/// the first array dimension. The name is empty for abstract declarators
/// such as `unsigned long` or `struct foo *`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declarator {
    pub base: String,
    pub stars: usize,
    pub name: String,
    pub array: Option<String>,
}

/// Strip trailing array dimensions, returning the first one.
fn strip_array(text: &str) -> (&str, Option<String>) {
    let mut rest = text.trim();
    let mut array = None;
    while rest.ends_with(']') {
        let Some(open) = rest.rfind('[') else { break };
        array = Some(rest[open + 1..rest.len() - 1].trim().to_string());
        rest = rest[..open].trim_end();
    }
    (rest, array)
}

/// Split a simple (non function-pointer) declaration such as
/// `const char *names[4]`.
pub fn split_declarator(text: &str) -> Declarator {
    let (rest, array) = strip_array(text);

    let name_start = trailing_identifier_start(rest);
    let name = &rest[name_start..];
    let before = rest[..name_start].trim_end();
    let stars = before
        .chars()
        .rev()
        .take_while(|c| *c == '*' || c.is_whitespace())
        .filter(|c| *c == '*')
        .count();
    let base = before.trim_end_matches(|c: char| c == '*' || c.is_whitespace());

    let tagged = matches!(base.rsplit(' ').next(), Some("struct" | "union" | "enum"));
    let abstract_decl = name.is_empty()
        || (base.is_empty() && stars == 0)
        || TYPE_WORDS.contains(&name)
        || (tagged && stars == 0 && !base.contains(' '));
    if abstract_decl {
        let base = rest.trim_end_matches(|c: char| c == '*' || c.is_whitespace());
        let stars = rest[base.len()..].matches('*').count();
        return Declarator {
            base: normalize_ws(base),
            stars,
            name: String::new(),
            array,
        };
    }

    Declarator {
        base: normalize_ws(base),
        stars,
        name: name.to_string(),
        array,
    }
}

/// Split a declarator that follows its base type elsewhere: the text after
/// the closing brace of `struct s { ... } *p, q[2]`, or a list entry after
/// the first comma of `int a, *b`. A lone identifier is a name here, not a
/// type. Anything with its own base type falls back to [`split_declarator`].
pub fn split_bare_declarator(text: &str) -> Declarator {
    let (rest, array) = strip_array(text);
    let name_start = trailing_identifier_start(rest);
    let name = &rest[name_start..];
    let prefix = &rest[..name_start];
    let only_stars = prefix.chars().all(|c| c == '*' || c.is_whitespace());
    if only_stars && is_identifier(name) && !TYPE_WORDS.contains(&name) {
        return Declarator {
            base: String::new(),
            stars: prefix.matches('*').count(),
            name: name.to_string(),
            array,
        };
    }
    split_declarator(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_comments_preserves_offsets() {
        let src = "int a; /* one\ntwo */ int b; // tail\nint c;";
        let masked = mask_comments(src);
        assert_eq!(masked.len(), src.len());
        assert_eq!(masked.lines().count(), src.lines().count());
        assert!(!masked.contains("one"));
        assert!(!masked.contains("tail"));
        assert!(masked.contains("int b;"));
        assert!(masked.contains("int c;"));
    }

    #[test]
    fn test_mask_comments_ignores_comment_markers_in_strings() {
        let src = r#"printk("http://x /* not */");"#;
        assert_eq!(mask_comments(src), src);
    }

    #[test]
    fn test_mask_preprocessor_collects_defines() {
        let src = "#include <linux/module.h>\n#define DRV_NAME \"x\"\n#define ADD(a, b) \\\n    ((a) + (b))\nint x;\n";
        let (masked, defines) = mask_preprocessor(src);
        let names: Vec<_> = defines.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["DRV_NAME", "ADD"]);
        assert!(!masked.contains("include"));
        assert!(!masked.contains("((a) + (b))"));
        assert!(masked.contains("int x;"));
    }

    #[test]
    fn test_find_matching_skips_literals() {
        let text = r#"{ printk("}"); if (x) { y(); } }"#;
        assert_eq!(find_matching(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn test_split_top_level() {
        let parts: Vec<_> = split_top_level("a, f(b, c), \"d,e\"", b',')
            .into_iter()
            .map(|(_, p)| p.trim())
            .collect();
        assert_eq!(parts, vec!["a", "f(b, c)", "\"d,e\""]);
    }

    #[test]
    fn test_line_index() {
        let idx = LineIndex::new("ab\ncd\n");
        assert_eq!(idx.position(0), (1, 0));
        assert_eq!(idx.position(4), (2, 1));
    }

    #[test]
    fn test_split_declarator() {
        let d = split_declarator("const char *names[4]");
        assert_eq!(d.base, "const char");
        assert_eq!(d.stars, 1);
        assert_eq!(d.name, "names");
        assert_eq!(d.array.as_deref(), Some("4"));

        let d = split_declarator("struct usb_interface *intf");
        assert_eq!((d.base.as_str(), d.stars, d.name.as_str()), ("struct usb_interface", 1, "intf"));

        assert_eq!(split_declarator("unsigned long").name, "");
        assert_eq!(split_declarator("struct inode *").name, "");
        assert_eq!(split_declarator("struct inode").name, "");
        assert_eq!(split_declarator("u32").name, "");
        assert_eq!(split_declarator("*next").name, "next");
    }

    #[test]
    fn test_split_bare_declarator() {
        let d = split_bare_declarator(" point_t");
        assert_eq!((d.base.as_str(), d.stars, d.name.as_str()), ("", 0, "point_t"));

        let d = split_bare_declarator(" **table[8]");
        assert_eq!((d.stars, d.name.as_str(), d.array.as_deref()), (2, "table", Some("8")));

        assert_eq!(split_bare_declarator("").name, "");
        assert_eq!(split_bare_declarator(" const").name, "");
        assert_eq!(split_bare_declarator("unsigned long count").name, "count");
    }

    #[test]
    fn test_trailing_identifier_start_non_ascii() {
        assert_eq!(trailing_identifier_start("int café"), 4);
        assert_eq!(trailing_identifier_start("é x"), "é ".len());
        assert_eq!(trailing_identifier_start("naïve"), 0);
        assert_eq!(trailing_identifier_start("ptr→"), "ptr→".len());
        assert!(is_identifier("café"));
    }

    #[test]
    fn test_tidy_type() {
        assert_eq!(tidy_type("char*"), "char *");
        assert_eq!(tidy_type("struct  foo * *"), "struct foo **");
    }

    #[test]
    fn test_mask_annotations() {
        let src = "static int __init my_init(char __user *buf)";
        let masked = mask_annotations(src);
        assert_eq!(masked.len(), src.len());
        assert!(!masked.contains("__init"));
        assert!(!masked.contains("__user"));
    }

    #[test]
    fn test_mask_gnu_attributes() {
        let src = "static int __attribute__((section(\".x\"), unused)) quiet(void)";
        let masked = mask_annotations(src);
        assert_eq!(masked.len(), src.len());
        assert!(!masked.contains("__attribute__"));
        assert!(!masked.contains("unused"));
        assert_eq!(normalize_ws(&masked), "static int quiet(void)");
        assert_eq!(mask_annotations("my__attribute__x"), "my__attribute__x");
    }
}

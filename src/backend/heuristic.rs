//! Pattern-based C backend.
//!
//! Works on a copy of the source in which comments, preprocessor directives
//! and kernel annotations are blanked out (offsets preserved). The text is
//! cut into top-level chunks by brace and paren balancing, and each chunk is
//! classified as a function definition, an aggregate definition, a typedef,
//! a prototype, a variable, or a registration macro.
//!
//! Known limitations: no macro expansion, so macro-generated definitions
//! are reported as unsupported; call and assignment scanning inside bodies
//! is pattern based and can misfire inside string literals.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::facts::{
    handler_name, header_attributes, is_non_call, registrations_for, AggregateFact,
    AggregateKind, AsyncMechanism, AsyncRegistration, CallSite, EnumFact, EnumeratorFact,
    FieldAssignment, FieldFact, FunctionFact, Location, MacroFact, ModuleEntry, ModuleHook,
    Parameter, PointerAssignment, RawFacts, TypedefFact, VariableFact, FUNCTION_ATTRIBUTES,
    HRTIMER_FUNCTION_FIELD,
};
use super::source::{
    find_matching, is_identifier, mask_annotations, mask_comments, mask_preprocessor,
    normalize_ws, pointer_type, skip_literal, split_bare_declarator, split_declarator,
    split_top_level, tidy_type, trailing_identifier_start, LineIndex,
};
use super::{Backend, Capabilities};
use crate::error::{AnalysisError, Result, Warning, WarningKind};

pub const NAME: &str = "heuristic";
pub const VERSION: &str = "0.1.0";

/// Words that can precede `(` in a declaration or cast without being a call.
const TYPE_KEYWORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "const",
    "volatile", "static", "struct", "union", "enum", "bool", "u8", "u16", "u32", "u64", "s8",
    "s16", "s32", "s64", "size_t",
];

lazy_static! {
    static ref CALL_RE: Regex = Regex::new(
        r"(?P<recv>(?:[A-Za-z_]\w*(?:\[[^\]\n]*\])?\s*(?:->|\.)\s*)+)?(?P<name>[A-Za-z_]\w*)\s*\("
    )
    .unwrap();
    static ref ASSIGN_RE: Regex = Regex::new(
        r"(?P<lhs>[A-Za-z_]\w*(?:\s*(?:\[[^\]\n]*\])?\s*(?:->|\.)\s*[A-Za-z_]\w*)*)\s*=\s*&?\s*(?P<rhs>[A-Za-z_]\w*)\s*;"
    )
    .unwrap();
    static ref FPTR_INIT_RE: Regex = Regex::new(
        r"\(\s*\*\s*(?P<name>[A-Za-z_]\w*)\s*\)\s*\([^;{}]*\)\s*=\s*&?\s*(?P<rhs>[A-Za-z_]\w*)\s*;"
    )
    .unwrap();
    static ref FPTR_DECL_RE: Regex = Regex::new(
        r"^(?P<ret>[^()]*?)\(\s*\*\s*(?P<name>[A-Za-z_]\w*)?\s*\)\s*\((?P<args>.*)\)$"
    )
    .unwrap();
    static ref TYPE_REF_RE: Regex =
        Regex::new(r"\b(?P<kind>struct|union|enum)\s+(?P<name>[A-Za-z_]\w*)").unwrap();
    static ref STRUCT_INIT_RE: Regex = Regex::new(
        r"\bstruct\s+(?P<ty>[A-Za-z_]\w*)\s+(?P<var>[A-Za-z_]\w*)\s*(?:\[[^\]]*\]\s*)*=\s*\{"
    )
    .unwrap();
    static ref DESIGNATOR_RE: Regex = Regex::new(
        r"^\.\s*(?P<field>[A-Za-z_]\w*)\s*=\s*&?\s*(?P<value>[A-Za-z_]\w*)$"
    )
    .unwrap();
    static ref AGGREGATE_HEAD_RE: Regex = Regex::new(
        r"^(?P<typedef>typedef\s+)?(?:(?:static|const|volatile|extern)\s+)*(?P<kind>struct|union|enum)\b\s*(?P<name>[A-Za-z_]\w*)?$"
    )
    .unwrap();
    static ref MACRO_CALL_RE: Regex =
        Regex::new(r"^(?:static\s+)?(?P<name>[A-Za-z_]\w*)\s*\((?P<args>.*)\)$").unwrap();
}

/// Pattern-based backend. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicBackend;

impl HeuristicBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for HeuristicBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn version(&self) -> &'static str {
        VERSION
    }

    fn is_available(&self) -> bool {
        true
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PARSE_FUNCTIONS
            | Capabilities::PARSE_AGGREGATES
            | Capabilities::PARSE_ENUMS
            | Capabilities::PARSE_CALLS
            | Capabilities::PARSE_TYPEDEFS
    }

    fn parse(&self, source: &str, filename: &str) -> Result<RawFacts> {
        let mut scanner = Scanner::new(source, filename);
        let unbalanced = scanner.scan();
        if unbalanced && scanner.facts.has_no_declarations() {
            return Err(AnalysisError::parse(
                filename,
                "unbalanced braces and no recoverable top-level declarations",
            ));
        }
        debug!(
            file = filename,
            functions = scanner.facts.functions.len(),
            calls = scanner.facts.calls.len(),
            "heuristic scan finished"
        );
        Ok(scanner.facts)
    }
}

/// A top-level statement: `[start, end)` plus the first brace block in it.
#[derive(Debug, Clone, Copy)]
struct Chunk {
    start: usize,
    end: usize,
    block: Option<(usize, usize)>,
    is_function: bool,
}

/// Result of splitting a function header.
#[derive(Debug)]
struct Signature {
    name: String,
    /// Offset of the name relative to the start of the header.
    name_offset: usize,
    return_type: String,
    params: Vec<Parameter>,
}

struct Scanner<'a> {
    file: &'a str,
    original: &'a str,
    text: String,
    lines: LineIndex,
    facts: RawFacts,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str, file: &'a str) -> Self {
        let (text, defines) = mask_preprocessor(&mask_comments(source));
        let text = mask_annotations(&text);
        let lines = LineIndex::new(source);
        let mut facts = RawFacts::default();
        for (name, at) in defines {
            facts.macros.push(MacroFact {
                location: lines.location(file, at, at + name.len()),
                name,
            });
        }
        Self {
            file,
            original: source,
            text,
            lines,
            facts,
        }
    }

    fn loc(&self, start: usize, end: usize) -> Location {
        self.lines.location(self.file, start, end)
    }

    fn warn(&mut self, kind: WarningKind, message: impl Into<String>, start: usize, end: usize) {
        let location = self.loc(start, end);
        self.facts.warnings.push(Warning::new(kind, message).at(location));
    }

    /// Scan the whole file. Returns true if an unbalanced bracket stopped
    /// the scan early.
    fn scan(&mut self) -> bool {
        let (chunks, problems) = top_level_chunks(&self.text);
        for chunk in chunks {
            if chunk.is_function {
                self.function_definition(chunk);
            } else if let Some((open, close)) = chunk.block {
                self.block_declaration(chunk, open, close);
            } else {
                self.plain_declaration(chunk);
            }
        }
        self.struct_initializers();

        let mut unbalanced = false;
        for problem in problems {
            let (message, start, end) = match problem {
                Problem::Unclosed(at) => {
                    unbalanced = true;
                    ("unclosed bracket; the rest of the file was skipped", at, self.text.len())
                }
                Problem::Stray(at) => ("unmatched closing bracket", at, at + 1),
                Problem::Trailing(at) => ("incomplete declaration at end of file", at, self.text.len()),
            };
            self.warn(WarningKind::UnparsableRegion, message, start, end);
        }
        unbalanced
    }

    fn function_definition(&mut self, chunk: Chunk) {
        let Some((open, close)) = chunk.block else {
            return;
        };
        let Some(sig) = parse_signature(&self.text[chunk.start..open]) else {
            self.warn(
                WarningKind::UnsupportedConstruct,
                "braced block at file scope is not a recognizable function definition",
                chunk.start,
                open,
            );
            return;
        };

        let name_at = chunk.start + sig.name_offset;
        let attributes = header_attributes(&self.original[chunk.start..name_at]);
        let type_refs = type_refs(&self.text[open..close]);
        let fact = FunctionFact {
            name: sig.name.clone(),
            return_type: sig.return_type,
            params: sig.params,
            attributes,
            location: self.loc(chunk.start, chunk.end),
            body: Some(self.loc(open, close + 1)),
            type_refs,
        };
        self.facts.functions.push(fact);
        self.scan_body(&sig.name, open + 1, close);
    }

    /// Calls, pointer assignments and async registrations in a body.
    fn scan_body(&mut self, caller: &str, start: usize, end: usize) {
        let body = &self.text[start..end];
        let mut calls = Vec::new();
        let mut assignments = Vec::new();
        let mut registrations = Vec::new();

        for caps in CALL_RE.captures_iter(body) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
                continue;
            };
            if is_non_call(name.as_str()) || TYPE_KEYWORDS.contains(&name.as_str()) {
                continue;
            }
            let call_start = start + whole.start();
            let paren = start + whole.end() - 1;
            let close = find_matching(&self.text, paren).unwrap_or(paren);
            let receiver = match caps.name("recv") {
                Some(recv) => Some(receiver_text(recv.as_str())),
                None if preceded_by_member_op(&self.text, call_start) => Some("<expr>".to_string()),
                None => None,
            };
            let location = self.loc(call_start, close + 1);

            if receiver.is_none() {
                let args: Vec<String> = split_top_level(&self.text[paren + 1..close], b',')
                    .into_iter()
                    .map(|(_, arg)| arg.trim().to_string())
                    .collect();
                for (mechanism, handler) in registrations_for(name.as_str(), &args) {
                    registrations.push(AsyncRegistration {
                        mechanism,
                        api: name.as_str().to_string(),
                        handler: handler.to_string(),
                        scope: Some(caller.to_string()),
                        location: location.clone(),
                    });
                }
            }

            calls.push(CallSite {
                caller: caller.to_string(),
                callee: name.as_str().to_string(),
                receiver,
                location,
            });
        }

        for caps in ASSIGN_RE.captures_iter(body) {
            let (Some(whole), Some(lhs), Some(rhs)) = (caps.get(0), caps.name("lhs"), caps.name("rhs"))
            else {
                continue;
            };
            if handler_name(rhs.as_str()).is_none() || is_non_call(rhs.as_str()) {
                continue;
            }
            let at = start + whole.start();
            let (mut receiver, target) = split_member(lhs.as_str());
            if receiver.is_none() && preceded_by_member_op(&self.text, at) {
                receiver = Some("<expr>".to_string());
            }
            let location = self.loc(at, start + whole.end());
            if target == HRTIMER_FUNCTION_FIELD && receiver.is_some() {
                registrations.push(AsyncRegistration {
                    mechanism: AsyncMechanism::Hrtimer,
                    api: format!(".{}", HRTIMER_FUNCTION_FIELD),
                    handler: rhs.as_str().to_string(),
                    scope: Some(caller.to_string()),
                    location: location.clone(),
                });
            }
            assignments.push(PointerAssignment {
                scope: Some(caller.to_string()),
                target,
                receiver,
                value: rhs.as_str().to_string(),
                location,
            });
        }

        for caps in FPTR_INIT_RE.captures_iter(body) {
            let (Some(whole), Some(name), Some(rhs)) = (caps.get(0), caps.name("name"), caps.name("rhs"))
            else {
                continue;
            };
            if handler_name(rhs.as_str()).is_none() {
                continue;
            }
            assignments.push(PointerAssignment {
                scope: Some(caller.to_string()),
                target: name.as_str().to_string(),
                receiver: None,
                value: rhs.as_str().to_string(),
                location: self.loc(start + whole.start(), start + whole.end()),
            });
        }

        assignments.sort_by(|a, b| {
            (a.location.start_line, a.location.start_column)
                .cmp(&(b.location.start_line, b.location.start_column))
        });
        self.facts.calls.extend(calls);
        self.facts.pointer_assignments.extend(assignments);
        self.facts.async_registrations.extend(registrations);
    }

    /// A chunk that contains a brace block but is not a function.
    fn block_declaration(&mut self, chunk: Chunk, open: usize, close: usize) {
        let header_raw = self.text[chunk.start..open].to_string();
        let sides = split_top_level(&header_raw, b'=');
        if sides.len() > 1 {
            // Designators are picked up by `struct_initializers`; only the
            // variable is recorded here.
            let location = self.loc(chunk.start, chunk.end);
            self.variables_from(sides[0].1, location);
            return;
        }

        let header = normalize_ws(&header_raw);
        let Some(caps) = AGGREGATE_HEAD_RE.captures(&header) else {
            self.warn(
                WarningKind::UnsupportedConstruct,
                format!("unrecognized braced declaration '{}'", header),
                chunk.start,
                chunk.end,
            );
            return;
        };
        let is_typedef = caps.name("typedef").is_some();
        let kind = caps.name("kind").map(|m| m.as_str()).unwrap_or("struct").to_string();
        let tag = caps.name("name").map(|m| m.as_str().to_string());

        let trailing = self.text[close + 1..chunk.end - 1].to_string();
        let declarators: Vec<_> = split_top_level(&trailing, b',')
            .into_iter()
            .map(|(_, d)| split_bare_declarator(d))
            .filter(|d| !d.name.is_empty())
            .collect();
        let alias = if is_typedef {
            declarators.iter().find(|d| d.stars == 0).map(|d| d.name.clone())
        } else {
            None
        };
        let location = self.loc(chunk.start, chunk.end);

        if kind == "enum" {
            let members = self.enumerators(open + 1, close);
            self.facts.enums.push(EnumFact {
                name: tag.clone(),
                typedef_alias: alias.clone(),
                members,
                location: location.clone(),
            });
        } else {
            let fields = self.fields(open + 1, close);
            self.facts.aggregates.push(AggregateFact {
                kind: if kind == "union" { AggregateKind::Union } else { AggregateKind::Struct },
                name: tag.clone(),
                typedef_alias: alias.clone(),
                fields,
                location: location.clone(),
            });
        }

        let target_base = match &tag {
            Some(tag) => format!("{} {}", kind, tag),
            None => format!("{} {{ ... }}", kind),
        };
        for declarator in declarators {
            let type_text = pointer_type(&target_base, declarator.stars);
            if is_typedef {
                self.facts.typedefs.push(TypedefFact {
                    alias: declarator.name,
                    target: type_text,
                    location: location.clone(),
                });
            } else {
                self.facts.variables.push(VariableFact {
                    name: declarator.name,
                    type_text,
                    location: location.clone(),
                });
            }
        }
    }

    /// A chunk terminated by `;` without any brace block.
    fn plain_declaration(&mut self, chunk: Chunk) {
        let body = self.text[chunk.start..chunk.end - 1].trim_end().to_string();
        let norm = normalize_ws(&body);
        if norm.is_empty() {
            return;
        }
        let location = self.loc(chunk.start, chunk.end);

        if let Some(caps) = MACRO_CALL_RE.captures(&norm) {
            let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
            let args: Vec<String> = caps
                .name("args")
                .map(|m| split_top_level(m.as_str(), b','))
                .unwrap_or_default()
                .into_iter()
                .map(|(_, a)| a.trim().to_string())
                .collect();
            if let Some(hook) = ModuleHook::from_macro(name) {
                if let Some(function) = args.first().and_then(|a| handler_name(a)) {
                    self.facts.module_entries.push(ModuleEntry {
                        hook,
                        function: function.to_string(),
                        location,
                    });
                }
                return;
            }
            let registrations: Vec<_> = registrations_for(name, &args)
                .map(|(mechanism, handler)| AsyncRegistration {
                    mechanism,
                    api: name.to_string(),
                    handler: handler.to_string(),
                    scope: None,
                    location: location.clone(),
                })
                .collect();
            if !registrations.is_empty() {
                self.facts.async_registrations.extend(registrations);
                return;
            }
        }

        if let Some(rest) = norm.strip_prefix("typedef ") {
            self.typedef(rest, location);
            return;
        }

        let parts = split_top_level(&body, b'=');
        if parts.len() > 1 {
            let lhs = parts[0].1.to_string();
            let rhs = parts[1].1.trim();
            let names = self.variables_from(&lhs, location.clone());
            if let (Some(name), Some(value)) = (names.first(), handler_name(rhs)) {
                self.facts.pointer_assignments.push(PointerAssignment {
                    scope: None,
                    target: name.clone(),
                    receiver: None,
                    value: value.to_string(),
                    location,
                });
            }
            return;
        }

        if let Some(sig) = parse_signature(&body) {
            let name_at = chunk.start + sig.name_offset;
            let attributes = header_attributes(&self.original[chunk.start..name_at]);
            self.facts.functions.push(FunctionFact {
                name: sig.name,
                return_type: sig.return_type,
                params: sig.params,
                attributes,
                location,
                body: None,
                type_refs: Vec::new(),
            });
            return;
        }

        self.variables_from(&body, location);
    }

    fn typedef(&mut self, rest: &str, location: Location) {
        let (alias, target) = match FPTR_DECL_RE.captures(rest) {
            Some(caps) => {
                let Some(name) = caps.name("name") else { return };
                let ret = caps.name("ret").map(|m| m.as_str()).unwrap_or_default();
                let args = caps.name("args").map(|m| m.as_str()).unwrap_or_default();
                (
                    name.as_str().to_string(),
                    format!("{} (*)({})", tidy_type(ret), normalize_ws(args)),
                )
            }
            None => {
                let d = split_declarator(rest);
                if d.name.is_empty() {
                    return;
                }
                let mut target = pointer_type(&d.base, d.stars);
                if let Some(len) = d.array {
                    target.push_str(&format!("[{}]", len));
                }
                (d.name, target)
            }
        };
        self.facts.typedefs.push(TypedefFact {
            alias,
            target,
            location,
        });
    }

    /// Record the variables declared by `decl` and return their names.
    fn variables_from(&mut self, decl: &str, location: Location) -> Vec<String> {
        let norm = normalize_ws(decl);
        if let Some(caps) = FPTR_DECL_RE.captures(&norm) {
            let Some(name) = caps.name("name") else {
                return Vec::new();
            };
            let ret = caps.name("ret").map(|m| m.as_str()).unwrap_or_default();
            let args = caps.name("args").map(|m| m.as_str()).unwrap_or_default();
            self.facts.variables.push(VariableFact {
                name: name.as_str().to_string(),
                type_text: format!("{} (*)({})", strip_storage(&tidy_type(ret)), normalize_ws(args)),
                location,
            });
            return vec![name.as_str().to_string()];
        }

        let mut names = Vec::new();
        let mut base = String::new();
        for (i, (_, piece)) in split_top_level(&norm, b',').into_iter().enumerate() {
            if piece.contains('(') {
                break;
            }
            let d = if i == 0 {
                split_declarator(piece)
            } else {
                split_bare_declarator(piece)
            };
            if i == 0 {
                base = strip_storage(&d.base);
            }
            if d.name.is_empty() || base.is_empty() {
                continue;
            }
            self.facts.variables.push(VariableFact {
                name: d.name.clone(),
                type_text: pointer_type(&base, d.stars),
                location: location.clone(),
            });
            names.push(d.name);
        }
        names
    }

    fn fields(&self, start: usize, end: usize) -> Vec<FieldFact> {
        let mut fields = Vec::new();
        for (_, piece) in split_top_level(&self.text[start..end], b';') {
            let decl = piece.trim();
            if decl.is_empty() {
                continue;
            }

            if let Some(brace) = decl.find('{') {
                let head = normalize_ws(&decl[..brace]);
                let Some(close) = find_matching(decl, brace) else {
                    continue;
                };
                let type_text = if head.contains(' ') {
                    head
                } else {
                    format!("{} {{ ... }}", head)
                };
                for (_, d) in split_top_level(&decl[close + 1..], b',') {
                    let d = split_bare_declarator(d);
                    if d.name.is_empty() {
                        continue;
                    }
                    fields.push(FieldFact {
                        name: d.name,
                        type_text: pointer_type(&type_text, d.stars),
                        is_pointer: d.stars > 0,
                        array_len: d.array,
                        ..FieldFact::default()
                    });
                }
                continue;
            }

            let mut base = String::new();
            for (i, (_, piece)) in split_top_level(decl, b',').into_iter().enumerate() {
                let piece = normalize_ws(piece);
                let (declarator, bit_width) = match split_top_level(&piece, b':').as_slice() {
                    [(_, d), (_, w)] => (d.trim().to_string(), Some(w.trim().to_string())),
                    _ => (piece.clone(), None),
                };

                if let Some(caps) = FPTR_DECL_RE.captures(&declarator) {
                    let Some(name) = caps.name("name") else { continue };
                    let ret = tidy_type(caps.name("ret").map(|m| m.as_str()).unwrap_or_default());
                    let args = normalize_ws(caps.name("args").map(|m| m.as_str()).unwrap_or_default());
                    fields.push(FieldFact {
                        name: name.as_str().to_string(),
                        signature: Some(format!("{} (*)({})", ret, args)),
                        type_text: ret,
                        is_pointer: true,
                        is_function_pointer: true,
                        ..FieldFact::default()
                    });
                    continue;
                }

                let d = if i == 0 {
                    split_declarator(&declarator)
                } else {
                    split_bare_declarator(&declarator)
                };
                if i == 0 {
                    base = d.base.clone();
                }
                if d.name.is_empty() {
                    continue;
                }
                fields.push(FieldFact {
                    name: d.name,
                    type_text: pointer_type(&base, d.stars),
                    is_pointer: d.stars > 0,
                    is_function_pointer: false,
                    signature: None,
                    array_len: d.array,
                    bit_width,
                });
            }
        }
        fields
    }

    fn enumerators(&self, start: usize, end: usize) -> Vec<EnumeratorFact> {
        split_top_level(&self.text[start..end], b',')
            .into_iter()
            .filter_map(|(_, piece)| {
                let parts = split_top_level(piece, b'=');
                let name = parts.first()?.1.trim();
                if !is_identifier(name) {
                    return None;
                }
                let initializer = parts.get(1).map(|(_, v)| normalize_ws(v));
                Some(EnumeratorFact {
                    name: name.to_string(),
                    initializer,
                })
            })
            .collect()
    }

    /// `.field = function` designators inside `struct T var = { ... }`,
    /// including one level of array-of-struct nesting.
    fn struct_initializers(&mut self) {
        let found: Vec<(String, String, usize)> = STRUCT_INIT_RE
            .captures_iter(&self.text)
            .filter_map(|caps| {
                let open = caps.get(0)?.end() - 1;
                Some((caps["ty"].to_string(), caps["var"].to_string(), open))
            })
            .collect();

        for (ty, var, open) in found {
            let Some(close) = find_matching(&self.text, open) else {
                continue;
            };
            self.designators(&ty, &var, open + 1, close, true);
        }
    }

    fn designators(&mut self, ty: &str, var: &str, start: usize, end: usize, nested_ok: bool) {
        let pieces: Vec<(usize, String)> = split_top_level(&self.text[start..end], b',')
            .into_iter()
            .map(|(off, piece)| (off, piece.to_string()))
            .collect();

        for (off, piece) in pieces {
            let lead = piece.len() - piece.trim_start().len();
            let at = start + off + lead;
            let trimmed = piece.trim();
            if nested_ok && trimmed.starts_with('{') {
                if let Some(close) = find_matching(&self.text, at) {
                    self.designators(ty, var, at + 1, close, false);
                }
                continue;
            }
            let Some(caps) = DESIGNATOR_RE.captures(trimmed) else {
                continue;
            };
            let location = self.loc(at, at + trimmed.len());
            self.facts.field_assignments.push(FieldAssignment {
                aggregate_type: ty.to_string(),
                variable: var.to_string(),
                field: caps["field"].to_string(),
                value: caps["value"].to_string(),
                location,
            });
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Problem {
    Unclosed(usize),
    Stray(usize),
    Trailing(usize),
}

/// Cut masked text into top-level statements.
fn top_level_chunks(text: &str) -> (Vec<Chunk>, Vec<Problem>) {
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut problems = Vec::new();
    let mut start: Option<usize> = None;
    let mut block: Option<(usize, usize)> = None;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if start.is_none() && c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let s = *start.get_or_insert(i);
        match c {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i);
                continue;
            }
            b'(' | b'[' => match find_matching(text, i) {
                Some(close) => {
                    i = close + 1;
                    continue;
                }
                None => {
                    problems.push(Problem::Unclosed(i));
                    return (chunks, problems);
                }
            },
            b'{' => {
                let Some(close) = find_matching(text, i) else {
                    problems.push(Problem::Unclosed(i));
                    return (chunks, problems);
                };
                if block.is_none() && looks_like_function_header(&text[s..i]) {
                    chunks.push(Chunk {
                        start: s,
                        end: close + 1,
                        block: Some((i, close)),
                        is_function: true,
                    });
                    start = None;
                } else if block.is_none() {
                    block = Some((i, close));
                }
                i = close + 1;
                continue;
            }
            b';' => {
                chunks.push(Chunk {
                    start: s,
                    end: i + 1,
                    block: block.take(),
                    is_function: false,
                });
                start = None;
            }
            b'}' | b')' | b']' => {
                problems.push(Problem::Stray(i));
                start = None;
                block = None;
            }
            _ => {}
        }
        i += 1;
    }

    if let Some(s) = start {
        problems.push(Problem::Trailing(s));
    }
    (chunks, problems)
}

fn looks_like_function_header(header: &str) -> bool {
    let trimmed = header.trim();
    trimmed.ends_with(')')
        && !trimmed.starts_with("typedef")
        && split_top_level(trimmed, b'=').len() == 1
}

/// Index of the `(` matching the `)` at `close`, scanning backwards.
fn matching_open(text: &str, close: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match bytes[i] {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse `[attrs] ret-type name(params)` from a header.
fn parse_signature(header: &str) -> Option<Signature> {
    let h = header.trim_end();
    if !h.ends_with(')') {
        return None;
    }
    let open = matching_open(h, h.len() - 1)?;
    let before = h[..open].trim_end();
    let name_start = trailing_identifier_start(before);
    let name = &before[name_start..];
    if !is_identifier(name) || is_non_call(name) {
        return None;
    }

    let prefix = &before[..name_start];
    if !prefix
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '*' || c.is_whitespace())
    {
        return None;
    }
    let tidy = tidy_type(prefix);
    let mut return_tokens = Vec::new();
    for token in tidy.split(' ').filter(|t| !t.is_empty()) {
        if matches!(token, "typedef" | "return" | "else" | "goto" | "case") {
            return None;
        }
        if !FUNCTION_ATTRIBUTES.contains(&token) {
            return_tokens.push(token);
        }
    }
    if return_tokens.iter().all(|t| t.starts_with('*')) {
        return None;
    }

    let params = split_top_level(&h[open + 1..h.len() - 1], b',')
        .into_iter()
        .filter_map(|(_, p)| parse_param(p))
        .collect();

    Some(Signature {
        name: name.to_string(),
        name_offset: name_start,
        return_type: return_tokens.join(" "),
        params,
    })
}

fn parse_param(text: &str) -> Option<Parameter> {
    let t = normalize_ws(text);
    if t.is_empty() || t == "void" {
        return None;
    }
    if t == "..." {
        return Some(Parameter {
            name: String::new(),
            type_text: t,
        });
    }
    if let Some(caps) = FPTR_DECL_RE.captures(&t) {
        let ret = caps.name("ret").map(|m| m.as_str()).unwrap_or_default();
        let args = caps.name("args").map(|m| m.as_str()).unwrap_or_default();
        return Some(Parameter {
            name: caps.name("name").map(|m| m.as_str().to_string()).unwrap_or_default(),
            type_text: format!("{} (*)({})", tidy_type(ret), normalize_ws(args)),
        });
    }
    let d = split_declarator(&t);
    let mut type_text = pointer_type(&d.base, d.stars);
    if d.array.is_some() {
        type_text.push_str(" *");
        type_text = tidy_type(&type_text);
    }
    Some(Parameter {
        name: d.name,
        type_text,
    })
}

/// `struct foo`, `union bar` and `enum baz` mentions in a body.
fn type_refs(body: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for caps in TYPE_REF_RE.captures_iter(body) {
        let r = format!("{} {}", &caps["kind"], &caps["name"]);
        if !refs.contains(&r) {
            refs.push(r);
        }
    }
    refs
}

fn strip_storage(type_text: &str) -> String {
    type_text
        .split(' ')
        .filter(|t| !matches!(*t, "static" | "extern" | "register" | "auto"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn receiver_text(recv: &str) -> String {
    let compact: String = recv.split_whitespace().collect();
    compact
        .strip_suffix("->")
        .or_else(|| compact.strip_suffix('.'))
        .unwrap_or(&compact)
        .to_string()
}

/// Split `a->b.c` into (`Some("a->b")`, `"c"`).
fn split_member(lhs: &str) -> (Option<String>, String) {
    let compact: String = lhs.split_whitespace().collect();
    let arrow = compact.rfind("->").map(|i| (i, 2));
    let dot = compact.rfind('.').map(|i| (i, 1));
    match arrow.max(dot) {
        Some((i, len)) => (Some(compact[..i].to_string()), compact[i + len..].to_string()),
        None => (None, compact),
    }
}

fn preceded_by_member_op(text: &str, at: usize) -> bool {
    let before = text[..at].trim_end();
    before.ends_with('.') || before.ends_with("->")
}

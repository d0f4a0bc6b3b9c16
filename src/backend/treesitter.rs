//! tree-sitter C walker behind [`SyntaxTreeBackend`](super::SyntaxTreeBackend).
//!
//! The grammar is fed a copy of the source with kernel annotations blanked
//! out, which keeps `static int __init foo(void)` a well-formed definition.
//! Attributes are recovered from the original text of each header.

use lazy_static::lazy_static;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use super::facts::{
    handler_name, header_attributes, is_non_call, registrations_for, AggregateFact,
    AggregateKind, AsyncMechanism, AsyncRegistration, CallSite, EnumFact, EnumeratorFact,
    FieldAssignment, FieldFact, FunctionFact, Location, MacroFact, ModuleEntry, ModuleHook,
    Parameter, PointerAssignment, RawFacts, TypedefFact, VariableFact, HRTIMER_FUNCTION_FIELD,
};
use super::source::{mask_annotations, normalize_ws, pointer_type, split_top_level, tidy_type};
use crate::error::{AnalysisError, Result, Warning, WarningKind};

/// `#define` names.
const MACRO_QUERY: &str = r#"
(preproc_def
  name: (identifier) @name)

(preproc_function_def
  name: (identifier) @name)
"#;

lazy_static! {
    /// A file-scope macro invocation the grammar could not place.
    static ref MACRO_STATEMENT_RE: Regex =
        Regex::new(r"(?s)^(?:static\s+)?(?P<name>[A-Za-z_]\w*)\s*\((?P<args>.*)\)\s*;?$").unwrap();
}

fn c_language() -> Language {
    tree_sitter_c::LANGUAGE.into()
}

/// True when the compiled grammar is ABI compatible with the runtime.
pub(super) fn language_loads() -> bool {
    Parser::new().set_language(&c_language()).is_ok()
}

pub(super) fn parse(source: &str, file: &str) -> Result<RawFacts> {
    let masked = mask_annotations(source);
    let language = c_language();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| AnalysisError::parse(file, e.to_string()))?;
    let tree = parser
        .parse(&masked, None)
        .ok_or_else(|| AnalysisError::parse(file, "parser produced no syntax tree"))?;
    let root = tree.root_node();

    let mut walker = Walker {
        file,
        original: source,
        text: &masked,
        facts: RawFacts::default(),
        depth: 0,
    };
    walker.collect_macros(&language, root)?;
    walker.visit(root, None);

    if root.has_error() && walker.facts.has_no_declarations() && !source.trim().is_empty() {
        return Err(AnalysisError::parse(
            file,
            "syntax errors and no recoverable top-level declarations",
        ));
    }
    Ok(walker.facts)
}

/// What a declarator chain says about the declared entity.
#[derive(Debug, Default)]
struct DeclaratorInfo<'t> {
    name: Option<Node<'t>>,
    /// Pointer depth outside any function declarator (return-type stars for
    /// functions, plain indirection otherwise).
    stars: usize,
    /// Pointer depth inside the function declarator: `(*fp)` gives 1.
    inner_stars: usize,
    array: Option<String>,
    /// Parameter list of a function or function-pointer declarator.
    params: Option<Node<'t>>,
}

impl DeclaratorInfo<'_> {
    fn is_function_pointer(&self) -> bool {
        self.params.is_some() && self.inner_stars > 0
    }
}

/// Syntax nesting the walker descends into before giving up on a subtree.
const MAX_TREE_DEPTH: usize = 512;

struct Walker<'a> {
    file: &'a str,
    original: &'a str,
    text: &'a str,
    facts: RawFacts,
    depth: usize,
}

impl<'a> Walker<'a> {
    fn node_text(&self, node: Node) -> &'a str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }

    fn loc(&self, node: Node) -> Location {
        Location::from_node(node, self.file)
    }

    fn collect_macros(&mut self, language: &Language, root: Node) -> Result<()> {
        let query = Query::new(language, MACRO_QUERY)
            .map_err(|e| AnalysisError::parse(self.file, e.to_string()))?;
        let text = self.text;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, text.as_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let name = self.node_text(capture.node).to_string();
                let location = self.loc(capture.node);
                self.facts.macros.push(MacroFact { name, location });
            }
        }
        Ok(())
    }

    fn visit(&mut self, node: Node, scope: Option<&str>) {
        match node.kind() {
            "function_definition" => {
                if let Some(name) = self.function_definition(node) {
                    if let Some(body) = node.child_by_field_name("body") {
                        self.visit_children(body, Some(&name));
                    }
                    return;
                }
            }
            "declaration" => self.declaration(node, scope),
            "type_definition" => self.type_definition(node),
            "struct_specifier" | "union_specifier" => self.aggregate(node),
            "enum_specifier" => self.enumeration(node),
            "call_expression" => self.call(node, scope),
            "assignment_expression" => {
                if let Some(scope) = scope {
                    self.assignment(node, scope);
                }
            }
            "ERROR" => self.error_region(node),
            _ => {}
        }
        if node.is_missing() {
            let w = Warning::new(
                WarningKind::UnparsableRegion,
                format!("missing '{}' inserted by the parser", node.kind()),
            )
            .at(self.loc(node));
            self.facts.warnings.push(w);
        }
        self.visit_children(node, scope);
    }

    fn visit_children(&mut self, node: Node, scope: Option<&str>) {
        if self.depth >= MAX_TREE_DEPTH {
            let w = Warning::new(
                WarningKind::UnsupportedConstruct,
                format!("nesting deeper than {} levels was not analyzed", MAX_TREE_DEPTH),
            )
            .at(self.loc(node));
            self.facts.warnings.push(w);
            return;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        self.depth += 1;
        for child in children {
            self.visit(child, scope);
        }
        self.depth -= 1;
    }

    fn error_region(&mut self, node: Node) {
        if node.parent().is_some_and(|p| p.is_error()) {
            return;
        }
        let text = self.node_text(node).trim();
        if text.is_empty() {
            return;
        }
        if let Some(caps) = MACRO_STATEMENT_RE.captures(text) {
            let name = &caps["name"];
            let args = split_args(&caps["args"]);
            if self.file_scope_macro(name, &args, self.loc(node)) {
                return;
            }
        }
        let snippet: String = normalize_ws(text).chars().take(48).collect();
        let w = Warning::new(
            WarningKind::UnparsableRegion,
            format!("could not parse '{}'", snippet),
        )
        .at(self.loc(node));
        self.facts.warnings.push(w);
    }

    /// Type text of a declaration-like node: qualifiers plus the type
    /// specifier, with anonymous aggregates abbreviated.
    fn specifier_type(&self, node: Node) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "type_qualifier" {
                parts.push(self.node_text(child).to_string());
            }
        }
        if let Some(ty) = node.child_by_field_name("type") {
            parts.push(self.type_label(ty));
        }
        normalize_ws(&parts.join(" "))
    }

    fn type_label(&self, node: Node) -> String {
        let keyword = match node.kind() {
            "struct_specifier" => "struct",
            "union_specifier" => "union",
            "enum_specifier" => "enum",
            _ => return normalize_ws(self.node_text(node)),
        };
        match node.child_by_field_name("name") {
            Some(name) => format!("{} {}", keyword, self.node_text(name)),
            None if node.child_by_field_name("body").is_some() => format!("{} {{ ... }}", keyword),
            None => keyword.to_string(),
        }
    }

    fn declarator_info<'t>(&self, node: Node<'t>) -> DeclaratorInfo<'t> {
        let mut info = DeclaratorInfo::default();
        let mut current = Some(node);
        while let Some(node) = current {
            current = match node.kind() {
                "identifier" | "field_identifier" | "type_identifier" => {
                    info.name = Some(node);
                    None
                }
                "pointer_declarator" | "abstract_pointer_declarator" => {
                    if info.params.is_some() {
                        info.inner_stars += 1;
                    } else {
                        info.stars += 1;
                    }
                    node.child_by_field_name("declarator")
                }
                "array_declarator" | "abstract_array_declarator" => {
                    let size = node
                        .child_by_field_name("size")
                        .map(|s| normalize_ws(self.node_text(s)))
                        .unwrap_or_default();
                    info.array.get_or_insert(size);
                    node.child_by_field_name("declarator")
                }
                "function_declarator" | "abstract_function_declarator" => {
                    info.params = node.child_by_field_name("parameters");
                    node.child_by_field_name("declarator")
                }
                "init_declarator" => node.child_by_field_name("declarator"),
                "parenthesized_declarator"
                | "abstract_parenthesized_declarator"
                | "attributed_declarator" => node.named_child(0),
                _ => None,
            };
        }
        info
    }

    fn params_text(&self, params: Node) -> String {
        let text = self.node_text(params).trim();
        let inner = text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .unwrap_or(text);
        normalize_ws(inner)
    }

    fn fptr_signature(&self, base: &str, info: &DeclaratorInfo) -> String {
        let args = info.params.map(|p| self.params_text(p)).unwrap_or_default();
        format!("{} (*)({})", pointer_type(base, info.stars), args)
    }

    fn parameters(&self, params: Node) -> Vec<Parameter> {
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "variadic_parameter" => out.push(Parameter {
                    name: String::new(),
                    type_text: "...".to_string(),
                }),
                "parameter_declaration" => {
                    let base = self.specifier_type(param);
                    let Some(declarator) = param.child_by_field_name("declarator") else {
                        if base != "void" {
                            out.push(Parameter {
                                name: String::new(),
                                type_text: tidy_type(&base),
                            });
                        }
                        continue;
                    };
                    let info = self.declarator_info(declarator);
                    let name = info.name.map(|n| self.node_text(n).to_string()).unwrap_or_default();
                    let type_text = if info.is_function_pointer() {
                        self.fptr_signature(&base, &info)
                    } else if info.array.is_some() {
                        pointer_type(&base, info.stars + 1)
                    } else {
                        pointer_type(&base, info.stars)
                    };
                    out.push(Parameter { name, type_text });
                }
                _ => {}
            }
        }
        out
    }

    /// Returns the function name so its body can be walked in scope.
    fn function_definition(&mut self, node: Node) -> Option<String> {
        let info = self.declarator_info(node.child_by_field_name("declarator")?);
        let (name_node, params) = (info.name?, info.params?);
        if info.inner_stars > 0 || name_node.kind() != "identifier" {
            return None;
        }
        let name = self.node_text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let fact = FunctionFact {
            name: name.clone(),
            return_type: pointer_type(&self.specifier_type(node), info.stars),
            params: self.parameters(params),
            attributes: header_attributes(&self.original[node.start_byte()..name_node.start_byte()]),
            location: self.loc(node),
            body: body.map(|b| self.loc(b)),
            type_refs: body.map(|b| self.type_refs(b)).unwrap_or_default(),
        };
        self.facts.functions.push(fact);
        Some(name)
    }

    fn type_refs(&self, body: Node) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            let found = match node.kind() {
                "struct_specifier" | "union_specifier" | "enum_specifier" => {
                    let label = self.type_label(node);
                    (node.child_by_field_name("name").is_some()).then_some(label)
                }
                "type_identifier" => Some(self.node_text(node).to_string()),
                _ => {
                    let mut cursor = node.walk();
                    let children: Vec<Node> = node.children(&mut cursor).collect();
                    stack.extend(children.into_iter().rev());
                    None
                }
            };
            if let Some(r) = found {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        }
        out
    }

    fn declaration(&mut self, node: Node, scope: Option<&str>) {
        let type_node = node.child_by_field_name("type");
        let base = self.specifier_type(node);
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();

        // `module_init(fn);` reads as a declaration of `fn` with type `module_init`.
        if let Some(ty) = type_node.filter(|t| t.kind() == "type_identifier") {
            if declarators.iter().all(|d| d.kind() == "parenthesized_declarator") && !declarators.is_empty() {
                let args: Vec<String> = declarators
                    .iter()
                    .filter_map(|d| self.declarator_info(*d).name)
                    .map(|n| self.node_text(n).to_string())
                    .collect();
                self.file_scope_macro(self.node_text(ty), &args, self.loc(node));
                return;
            }
        }

        for declarator in declarators {
            let info = self.declarator_info(declarator);
            let Some(name_node) = info.name else { continue };
            let name = self.node_text(name_node).to_string();

            if declarator.kind() == "init_declarator" {
                if let Some(value) = declarator.child_by_field_name("value") {
                    self.initialized_declaration(node, type_node, &name, value, scope);
                }
            } else if info.params.is_some() && !info.is_function_pointer() {
                if let Some(params) = info.params {
                    let fact = FunctionFact {
                        name,
                        return_type: pointer_type(&base, info.stars),
                        params: self.parameters(params),
                        attributes: header_attributes(
                            &self.original[node.start_byte()..name_node.start_byte()],
                        ),
                        location: self.loc(node),
                        body: None,
                        type_refs: Vec::new(),
                    };
                    self.facts.functions.push(fact);
                }
                continue;
            }

            if scope.is_none() {
                let type_text = if info.is_function_pointer() {
                    self.fptr_signature(&base, &info)
                } else {
                    pointer_type(&base, info.stars)
                };
                self.facts.variables.push(VariableFact {
                    name,
                    type_text,
                    location: self.loc(node),
                });
            }
        }
    }

    fn initialized_declaration(
        &mut self,
        decl: Node,
        type_node: Option<Node>,
        name: &str,
        value: Node,
        scope: Option<&str>,
    ) {
        if value.kind() == "initializer_list" {
            let struct_name = type_node
                .filter(|t| t.kind() == "struct_specifier")
                .and_then(|t| t.child_by_field_name("name"))
                .map(|n| self.node_text(n).to_string());
            if let Some(ty) = struct_name {
                self.designators(&ty, name, value, true);
            }
            return;
        }
        if let Some(function) = self.value_identifier(value) {
            self.facts.pointer_assignments.push(PointerAssignment {
                scope: scope.map(str::to_string),
                target: name.to_string(),
                receiver: None,
                value: function,
                location: self.loc(decl),
            });
        }
    }

    fn designators(&mut self, ty: &str, var: &str, list: Node, nested_ok: bool) {
        let mut cursor = list.walk();
        let children: Vec<Node> = list.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "initializer_pair" => {
                    let (Some(designator), Some(value)) = (
                        child.child_by_field_name("designator"),
                        child.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    if designator.kind() != "field_designator" {
                        continue;
                    }
                    let field = self.node_text(designator).trim_start_matches('.').trim().to_string();
                    let Some(function) = self.value_identifier(value) else {
                        continue;
                    };
                    self.facts.field_assignments.push(FieldAssignment {
                        aggregate_type: ty.to_string(),
                        variable: var.to_string(),
                        field,
                        value: function,
                        location: self.loc(child),
                    });
                }
                "initializer_list" if nested_ok => self.designators(ty, var, child, false),
                _ => {}
            }
        }
    }

    /// `fn` or `&fn`.
    fn value_identifier(&self, node: Node) -> Option<String> {
        let ident = match node.kind() {
            "identifier" => node,
            "pointer_expression" => node
                .child_by_field_name("argument")
                .filter(|a| a.kind() == "identifier")?,
            _ => return None,
        };
        handler_name(self.node_text(ident)).map(str::to_string)
    }

    fn type_definition(&mut self, node: Node) {
        let base = self.specifier_type(node);
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        for declarator in declarators {
            let info = self.declarator_info(declarator);
            let Some(alias) = info.name else { continue };
            let target = if info.is_function_pointer() {
                self.fptr_signature(&base, &info)
            } else {
                let mut t = pointer_type(&base, info.stars);
                if let Some(len) = &info.array {
                    t.push_str(&format!("[{}]", len));
                }
                t
            };
            self.facts.typedefs.push(TypedefFact {
                alias: self.node_text(alias).to_string(),
                target,
                location: self.loc(node),
            });
        }
    }

    /// Alias a `typedef` gives to the specifier it contains.
    fn typedef_alias(&self, specifier: Node) -> Option<String> {
        let parent = specifier.parent().filter(|p| p.kind() == "type_definition")?;
        let mut cursor = parent.walk();
        let declarators: Vec<Node> = parent.children_by_field_name("declarator", &mut cursor).collect();
        declarators
            .into_iter()
            .map(|d| self.declarator_info(d))
            .find(|info| info.stars == 0 && info.params.is_none())
            .and_then(|info| info.name)
            .map(|n| self.node_text(n).to_string())
    }

    /// Anonymous specifiers are only types of their own when they stand in
    /// a declaration or typedef; inside a field they are part of the field.
    fn names_a_type(&self, specifier: Node, has_name: bool) -> bool {
        has_name
            || specifier
                .parent()
                .is_some_and(|p| matches!(p.kind(), "declaration" | "type_definition"))
    }

    fn aggregate(&mut self, node: Node) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let name = node.child_by_field_name("name").map(|n| self.node_text(n).to_string());
        if !self.names_a_type(node, name.is_some()) {
            return;
        }
        let kind = if node.kind() == "union_specifier" {
            AggregateKind::Union
        } else {
            AggregateKind::Struct
        };
        let fact = AggregateFact {
            kind,
            name,
            typedef_alias: self.typedef_alias(node),
            fields: self.fields(body),
            location: self.loc(node),
        };
        self.facts.aggregates.push(fact);
    }

    fn fields(&self, body: Node) -> Vec<FieldFact> {
        let mut fields = Vec::new();
        let mut cursor = body.walk();
        for decl in body.named_children(&mut cursor) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let base = self.specifier_type(decl);
            let mut bit_width = None;
            let mut inner = decl.walk();
            for child in decl.children(&mut inner) {
                if child.kind() == "bitfield_clause" {
                    bit_width = Some(normalize_ws(self.node_text(child).trim_start_matches(':')));
                }
            }
            let mut inner = decl.walk();
            for declarator in decl.children_by_field_name("declarator", &mut inner) {
                let info = self.declarator_info(declarator);
                let Some(name) = info.name else { continue };
                let name = self.node_text(name).to_string();
                if info.is_function_pointer() {
                    fields.push(FieldFact {
                        name,
                        type_text: pointer_type(&base, info.stars),
                        is_pointer: true,
                        is_function_pointer: true,
                        signature: Some(self.fptr_signature(&base, &info)),
                        array_len: info.array,
                        bit_width: None,
                    });
                } else {
                    fields.push(FieldFact {
                        name,
                        type_text: pointer_type(&base, info.stars),
                        is_pointer: info.stars > 0,
                        is_function_pointer: false,
                        signature: None,
                        array_len: info.array,
                        bit_width: bit_width.clone(),
                    });
                }
            }
        }
        fields
    }

    fn enumeration(&mut self, node: Node) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let name = node.child_by_field_name("name").map(|n| self.node_text(n).to_string());
        if !self.names_a_type(node, name.is_some()) {
            return;
        }
        let mut members = Vec::new();
        let mut cursor = body.walk();
        for enumerator in body.named_children(&mut cursor) {
            if enumerator.kind() != "enumerator" {
                continue;
            }
            let Some(member) = enumerator.child_by_field_name("name") else {
                continue;
            };
            members.push(EnumeratorFact {
                name: self.node_text(member).to_string(),
                initializer: enumerator
                    .child_by_field_name("value")
                    .map(|v| normalize_ws(self.node_text(v))),
            });
        }
        let fact = EnumFact {
            name,
            typedef_alias: self.typedef_alias(node),
            members,
            location: self.loc(node),
        };
        self.facts.enums.push(fact);
    }

    fn call(&mut self, node: Node, scope: Option<&str>) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let (callee, receiver) = match function.kind() {
            "identifier" => (self.node_text(function).to_string(), None),
            "field_expression" => {
                let (Some(field), Some(argument)) = (
                    function.child_by_field_name("field"),
                    function.child_by_field_name("argument"),
                ) else {
                    return;
                };
                let receiver: String = self.node_text(argument).split_whitespace().collect();
                (self.node_text(field).to_string(), Some(receiver))
            }
            "parenthesized_expression" => {
                let Some(inner) = function.named_child(0) else { return };
                let target = match inner.kind() {
                    "pointer_expression" => inner.child_by_field_name("argument"),
                    "identifier" => Some(inner),
                    _ => None,
                };
                match target.filter(|t| t.kind() == "identifier") {
                    Some(t) => (self.node_text(t).to_string(), None),
                    None => return,
                }
            }
            _ => return,
        };
        if is_non_call(&callee) {
            return;
        }

        let args: Vec<String> = node
            .child_by_field_name("arguments")
            .map(|list| {
                let mut cursor = list.walk();
                list.named_children(&mut cursor)
                    .filter(|a| a.kind() != "comment")
                    .map(|a| normalize_ws(self.node_text(a)))
                    .collect()
            })
            .unwrap_or_default();
        let location = self.loc(node);

        let Some(caller) = scope else {
            self.file_scope_macro(&callee, &args, location);
            return;
        };
        if receiver.is_none() {
            for (mechanism, handler) in registrations_for(&callee, &args) {
                self.facts.async_registrations.push(AsyncRegistration {
                    mechanism,
                    api: callee.clone(),
                    handler: handler.to_string(),
                    scope: Some(caller.to_string()),
                    location: location.clone(),
                });
            }
        }
        self.facts.calls.push(CallSite {
            caller: caller.to_string(),
            callee,
            receiver,
            location,
        });
    }

    fn assignment(&mut self, node: Node, scope: &str) {
        let is_plain = node
            .child_by_field_name("operator")
            .is_some_and(|op| self.node_text(op) == "=");
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if !is_plain {
            return;
        }
        let Some(value) = self.value_identifier(right) else {
            return;
        };
        let (target, receiver) = match left.kind() {
            "identifier" => (self.node_text(left).to_string(), None),
            "field_expression" => {
                let (Some(field), Some(argument)) = (
                    left.child_by_field_name("field"),
                    left.child_by_field_name("argument"),
                ) else {
                    return;
                };
                let receiver: String = self.node_text(argument).split_whitespace().collect();
                (self.node_text(field).to_string(), Some(receiver))
            }
            _ => return,
        };
        let location = self.loc(node);
        if target == HRTIMER_FUNCTION_FIELD && receiver.is_some() {
            self.facts.async_registrations.push(AsyncRegistration {
                mechanism: AsyncMechanism::Hrtimer,
                api: format!(".{}", HRTIMER_FUNCTION_FIELD),
                handler: value.clone(),
                scope: Some(scope.to_string()),
                location: location.clone(),
            });
        }
        self.facts.pointer_assignments.push(PointerAssignment {
            scope: Some(scope.to_string()),
            target,
            receiver,
            value,
            location,
        });
    }

    /// File-scope `module_init(fn)` and `DECLARE_*`-style registrations.
    /// Returns true if `name` was one of them.
    fn file_scope_macro(&mut self, name: &str, args: &[String], location: Location) -> bool {
        if let Some(hook) = ModuleHook::from_macro(name) {
            if let Some(function) = args.first().and_then(|a| handler_name(a)) {
                self.facts.module_entries.push(ModuleEntry {
                    hook,
                    function: function.to_string(),
                    location,
                });
            }
            return true;
        }
        let registrations: Vec<AsyncRegistration> = registrations_for(name, args)
            .map(|(mechanism, handler)| AsyncRegistration {
                mechanism,
                api: name.to_string(),
                handler: handler.to_string(),
                scope: None,
                location: location.clone(),
            })
            .collect();
        let found = !registrations.is_empty();
        self.facts.async_registrations.extend(registrations);
        found
    }
}

fn split_args(args: &str) -> Vec<String> {
    split_top_level(args, b',')
        .into_iter()
        .map(|(_, a)| normalize_ws(a))
        .collect()
}

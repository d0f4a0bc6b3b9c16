//! Semantic model builder.
//!
//! Merges the raw, per-occurrence facts of one or more files into
//! registries keyed by name:
//!
//! - functions: the first body-bearing fact is canonical, declarations only
//!   survive when no definition exists;
//! - structs and unions: named after tag, then typedef alias, then
//!   `__anon_<kind>_<n>`;
//! - enums with evaluated member values;
//! - typedefs, symbols and function-pointer mappings.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::consteval;
use super::model::{
    AggregateType, EnumMember, EnumType, FuncPtrMapping, Function, StructField, Symbol,
    SymbolKind, SymbolTable, Typedef,
};
use crate::backend::{AggregateFact, AggregateKind, EnumFact, FunctionFact, Location, RawFacts};
use crate::error::{Warning, WarningKind};

lazy_static! {
    static ref TAGGED_TYPE_RE: Regex =
        Regex::new(r"\b(?P<kind>struct|union|enum)\s+(?P<name>[A-Za-z_]\w*)").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"[A-Za-z_]\w*").unwrap();
}

/// Owning type recorded for `module_init` / `module_exit` mappings.
pub const MODULE_TYPE: &str = "module";

const QUALIFIERS: &[&str] = &["const", "volatile", "restrict", "__restrict", "register"];

/// LP64 sizes of primitive and common kernel scalar types.
fn primitive_size(base: &str) -> Option<u64> {
    let size = match base {
        "char" | "signed char" | "unsigned char" | "bool" | "_Bool" | "u8" | "s8" | "__u8"
        | "__s8" | "uint8_t" | "int8_t" => 1,
        "short" | "short int" | "unsigned short" | "unsigned short int" | "signed short"
        | "u16" | "s16" | "__u16" | "__s16" | "__le16" | "__be16" | "uint16_t" | "int16_t" => 2,
        "int" | "signed" | "unsigned" | "signed int" | "unsigned int" | "float" | "u32"
        | "s32" | "__u32" | "__s32" | "__le32" | "__be32" | "uint32_t" | "int32_t" => 4,
        "long" | "long int" | "signed long" | "unsigned long" | "unsigned long int"
        | "long long" | "long long int" | "unsigned long long" | "signed long long"
        | "double" | "u64" | "s64" | "__u64" | "__s64" | "__le64" | "__be64" | "uint64_t"
        | "int64_t" | "size_t" | "ssize_t" | "loff_t" | "uintptr_t" | "intptr_t"
        | "ptrdiff_t" | "dma_addr_t" | "phys_addr_t" | "resource_size_t" => 8,
        "long double" => 16,
        _ => return None,
    };
    Some(size)
}

fn strip_qualifiers(ty: &str) -> String {
    ty.split_whitespace()
        .filter(|w| !QUALIFIERS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Registries produced from one set of raw facts.
#[derive(Debug, Clone, Default)]
pub struct SemanticModel {
    pub symbols: SymbolTable,
    pub functions: BTreeMap<String, Function>,
    pub structs: BTreeMap<String, AggregateType>,
    pub unions: BTreeMap<String, AggregateType>,
    pub enums: BTreeMap<String, EnumType>,
    pub typedefs: BTreeMap<String, Typedef>,
    pub func_ptr_mappings: Vec<FuncPtrMapping>,
    pub warnings: Vec<Warning>,
}

impl SemanticModel {
    pub fn aggregate(&self, name: &str) -> Option<&AggregateType> {
        self.structs.get(name).or_else(|| self.unions.get(name))
    }

    /// Canonical aggregate or enum name behind a typedef alias.
    fn alias_target(&self, alias: &str) -> Option<String> {
        self.structs
            .values()
            .chain(self.unions.values())
            .find(|a| a.typedef_alias.as_deref() == Some(alias))
            .map(|a| a.name.clone())
            .or_else(|| {
                self.enums
                    .values()
                    .find(|e| e.typedef_alias.as_deref() == Some(alias))
                    .map(|e| e.name.clone())
            })
    }
}

/// Build the semantic model for `facts`.
pub fn build(facts: &RawFacts) -> SemanticModel {
    let mut builder = ModelBuilder {
        model: SemanticModel {
            warnings: facts.warnings.clone(),
            ..SemanticModel::default()
        },
        anonymous: HashMap::new(),
        enum_values: HashMap::new(),
    };
    builder.functions(&facts.functions);
    builder.typedefs(facts);
    for aggregate in &facts.aggregates {
        builder.aggregate(aggregate);
    }
    for e in &facts.enums {
        builder.enumeration(e);
    }
    builder.link_aggregates();
    builder.function_type_refs(&facts.functions);
    builder.symbols(facts);
    builder.mappings(facts);

    let model = builder.model;
    debug!(
        functions = model.functions.len(),
        structs = model.structs.len(),
        unions = model.unions.len(),
        enums = model.enums.len(),
        "semantic model built"
    );
    model
}

struct ModelBuilder {
    model: SemanticModel,
    /// Anonymous types seen so far, per kind keyword.
    anonymous: HashMap<&'static str, usize>,
    /// Enumerator values known so far, across all enums.
    enum_values: HashMap<String, i64>,
}

impl ModelBuilder {
    fn warn(&mut self, kind: WarningKind, message: String, location: &Location) {
        self.model
            .warnings
            .push(Warning::new(kind, message).at(location.clone()));
    }

    fn anonymous_name(&mut self, keyword: &'static str) -> String {
        let n = self.anonymous.entry(keyword).or_insert(0);
        let name = format!("__anon_{}_{}", keyword, n);
        *n += 1;
        name
    }

    fn functions(&mut self, facts: &[FunctionFact]) {
        for fact in facts {
            let existing = self.model.functions.get(&fact.name).map(|f| f.is_declaration);
            match (existing, fact.is_declaration()) {
                (None, _) | (Some(true), false) => {
                    self.model.functions.insert(fact.name.clone(), new_function(fact));
                }
                (Some(false), false) => {
                    self.warn(
                        WarningKind::Redefinition,
                        format!("function '{}' is defined more than once; keeping the first", fact.name),
                        &fact.location,
                    );
                }
                (Some(_), true) => {}
            }
        }
    }

    fn aggregate(&mut self, fact: &AggregateFact) {
        let name = match (&fact.name, &fact.typedef_alias) {
            (Some(tag), _) => tag.clone(),
            (None, Some(alias)) => alias.clone(),
            (None, None) => self.anonymous_name(fact.kind.as_str()),
        };
        let registry = match fact.kind {
            AggregateKind::Struct => &self.model.structs,
            AggregateKind::Union => &self.model.unions,
        };
        if registry.contains_key(&name) {
            self.warn(
                WarningKind::Redefinition,
                format!("{} '{}' is defined more than once; keeping the first", fact.kind, name),
                &fact.location,
            );
            return;
        }

        let fields: Vec<StructField> = fact
            .fields
            .iter()
            .map(|f| StructField {
                name: f.name.clone(),
                type_text: f.type_text.clone(),
                is_pointer: f.is_pointer,
                is_function_pointer: f.is_function_pointer,
                signature: f.signature.clone(),
                array_len: f.array_len.clone(),
                bit_width: f.bit_width.clone(),
                offset: None,
                size: None,
            })
            .collect();
        let mut aggregate = AggregateType {
            kind: fact.kind,
            name: name.clone(),
            typedef_alias: fact.typedef_alias.clone(),
            location: fact.location.clone(),
            fields,
            size: None,
            referenced: BTreeSet::new(),
            referenced_by: BTreeSet::new(),
        };
        self.layout(&mut aggregate);

        match fact.kind {
            AggregateKind::Struct => self.model.structs.insert(name, aggregate),
            AggregateKind::Union => self.model.unions.insert(name, aggregate),
        };
    }

    /// Best-effort field offsets and total size. Struct fields are laid out
    /// back to back without padding, union fields all sit at offset 0. Once
    /// a size is unknown every later offset and the total are unknown.
    fn layout(&self, aggregate: &mut AggregateType) {
        let is_union = aggregate.kind == AggregateKind::Union;
        let mut cursor = Some(0u64);
        let mut largest = Some(0u64);
        for field in aggregate.fields.iter_mut() {
            let size = self.field_size(field);
            field.size = size;
            field.offset = if is_union { Some(0) } else { cursor };
            cursor = cursor.zip(size).map(|(c, s)| c + s);
            largest = largest.zip(size).map(|(l, s)| l.max(s));
        }
        aggregate.size = if is_union { largest } else { cursor };
    }

    fn field_size(&self, field: &StructField) -> Option<u64> {
        let element = if field.is_pointer || field.is_function_pointer {
            Some(8)
        } else {
            self.type_size(&field.type_text, 0)
        }?;
        match &field.array_len {
            None => Some(element),
            Some(len) => {
                let count = consteval::evaluate(len, &self.enum_values)?;
                element.checked_mul(u64::try_from(count).ok()?)
            }
        }
    }

    fn type_size(&self, ty: &str, depth: usize) -> Option<u64> {
        let base = strip_qualifiers(ty);
        if base.ends_with('*') {
            return Some(8);
        }
        if let Some(size) = primitive_size(&base) {
            return Some(size);
        }
        if let Some(caps) = TAGGED_TYPE_RE.captures(&base) {
            let name = &caps["name"];
            return match &caps["kind"] {
                "enum" => Some(4),
                "union" => self.model.unions.get(name)?.size,
                _ => self.model.structs.get(name)?.size,
            };
        }
        if self.model.enums.values().any(|e| e.typedef_alias.as_deref() == Some(&base)) {
            return Some(4);
        }
        if let Some(aggregate) = self
            .model
            .structs
            .values()
            .chain(self.model.unions.values())
            .find(|a| a.typedef_alias.as_deref() == Some(&base) || (a.name == base && a.typedef_alias.is_some()))
        {
            return aggregate.size;
        }
        // Plain typedefs seen so far, bounded against alias cycles.
        if depth < 8 {
            if let Some(td) = self.model.typedefs.get(&base) {
                return self.type_size(&td.target, depth + 1);
            }
        }
        None
    }

    fn enumeration(&mut self, fact: &EnumFact) {
        let name = match (&fact.name, &fact.typedef_alias) {
            (Some(tag), _) => tag.clone(),
            (None, Some(alias)) => alias.clone(),
            (None, None) => self.anonymous_name("enum"),
        };
        if self.model.enums.contains_key(&name) {
            self.warn(
                WarningKind::Redefinition,
                format!("enum '{}' is defined more than once; keeping the first", name),
                &fact.location,
            );
            return;
        }

        let mut members = Vec::with_capacity(fact.members.len());
        let mut previous: Option<i64> = None;
        for (index, member) in fact.members.iter().enumerate() {
            let value = match &member.initializer {
                Some(expr) => {
                    let value = consteval::evaluate(expr, &self.enum_values);
                    if value.is_none() {
                        self.warn(
                            WarningKind::UnsupportedConstruct,
                            format!(
                                "cannot evaluate initializer '{}' of enumerator '{}'",
                                expr, member.name
                            ),
                            &fact.location,
                        );
                    }
                    value
                }
                None if index == 0 => Some(0),
                None => previous.and_then(|p| p.checked_add(1)),
            };
            if let Some(v) = value {
                self.enum_values.insert(member.name.clone(), v);
            }
            previous = value;
            members.push(EnumMember {
                name: member.name.clone(),
                value,
                expression: member.initializer.clone(),
            });
        }

        self.model.enums.insert(
            name.clone(),
            EnumType {
                name,
                typedef_alias: fact.typedef_alias.clone(),
                location: fact.location.clone(),
                members,
            },
        );
    }

    fn typedefs(&mut self, facts: &RawFacts) {
        for fact in &facts.typedefs {
            match self.model.typedefs.get(&fact.alias) {
                Some(existing) if existing.target != fact.target => {
                    let message = format!(
                        "typedef '{}' redefined as '{}' (was '{}'); keeping the first",
                        fact.alias, fact.target, existing.target
                    );
                    self.warn(WarningKind::Redefinition, message, &fact.location);
                }
                Some(_) => {}
                None => {
                    self.model.typedefs.insert(
                        fact.alias.clone(),
                        Typedef {
                            alias: fact.alias.clone(),
                            target: fact.target.clone(),
                            location: fact.location.clone(),
                        },
                    );
                }
            }
        }
    }

    /// Aggregate names a type text refers to: `struct X`, `union X`, or a
    /// typedef alias of a registered aggregate.
    fn aggregate_refs(&self, ty: &str) -> Vec<String> {
        let mut refs: Vec<String> = TAGGED_TYPE_RE
            .captures_iter(ty)
            .filter(|c| &c["kind"] != "enum")
            .map(|c| c["name"].to_string())
            .collect();
        if refs.is_empty() {
            for word in IDENT_RE.find_iter(ty) {
                if let Some(target) = self.model.alias_target(word.as_str()) {
                    if self.model.aggregate(&target).is_some() {
                        refs.push(target);
                    }
                }
            }
        }
        refs
    }

    fn link_aggregates(&mut self) {
        let mut edges: Vec<(String, String)> = Vec::new();
        for aggregate in self.model.structs.values().chain(self.model.unions.values()) {
            for field in &aggregate.fields {
                for target in self.aggregate_refs(&field.type_text) {
                    edges.push((aggregate.name.clone(), target));
                }
            }
        }
        for (from, to) in edges {
            if let Some(a) = self.aggregate_mut(&from) {
                a.referenced.insert(to.clone());
            }
            if let Some(a) = self.aggregate_mut(&to) {
                a.referenced_by.insert(from);
            }
        }
    }

    fn aggregate_mut(&mut self, name: &str) -> Option<&mut AggregateType> {
        if self.model.structs.contains_key(name) {
            self.model.structs.get_mut(name)
        } else {
            self.model.unions.get_mut(name)
        }
    }

    /// Struct, union and enum names from signatures and body type references.
    fn function_type_refs(&mut self, facts: &[FunctionFact]) {
        let mut refs: HashMap<String, BTreeSet<String>> = HashMap::new();
        for fact in facts {
            let Some(function) = self.model.functions.get(&fact.name) else { continue };
            if function.location != fact.location {
                continue;
            }
            let texts = std::iter::once(fact.return_type.as_str())
                .chain(fact.params.iter().map(|p| p.type_text.as_str()))
                .chain(fact.type_refs.iter().map(String::as_str));
            let set = refs.entry(fact.name.clone()).or_default();
            for text in texts {
                let tagged: Vec<String> = TAGGED_TYPE_RE
                    .captures_iter(text)
                    .map(|c| c["name"].to_string())
                    .collect();
                if tagged.is_empty() {
                    for word in IDENT_RE.find_iter(text) {
                        if let Some(target) = self.model.alias_target(word.as_str()) {
                            set.insert(target);
                        }
                    }
                } else {
                    set.extend(tagged);
                }
            }
        }
        for (name, set) in refs {
            if let Some(function) = self.model.functions.get_mut(&name) {
                function.referenced_types = set;
            }
        }
    }

    fn symbols(&mut self, facts: &RawFacts) {
        let table = &mut self.model.symbols;
        for function in self.model.functions.values() {
            let symbol = Symbol::new(&function.name, SymbolKind::Function, function.location.clone())
                .with_attribute("return_type", &function.return_type)
                .with_attribute("linkage", if function.is_static() { "static" } else { "global" })
                .with_attribute("defined", (!function.is_declaration).to_string());
            table.insert(symbol);
        }
        for aggregate in self.model.structs.values().chain(self.model.unions.values()) {
            let mut symbol = Symbol::new(&aggregate.name, aggregate.kind.into(), aggregate.location.clone())
                .with_attribute("fields", aggregate.fields.len().to_string());
            if let Some(alias) = &aggregate.typedef_alias {
                symbol = symbol.with_attribute("typedef", alias);
            }
            table.insert(symbol);
        }
        for e in self.model.enums.values() {
            let symbol = Symbol::new(&e.name, SymbolKind::Enum, e.location.clone())
                .with_attribute("members", e.members.len().to_string());
            table.insert(symbol);
        }
        for td in self.model.typedefs.values() {
            table.insert(
                Symbol::new(&td.alias, SymbolKind::Typedef, td.location.clone())
                    .with_attribute("target", &td.target),
            );
        }
        for var in &facts.variables {
            table.insert(
                Symbol::new(&var.name, SymbolKind::Variable, var.location.clone())
                    .with_attribute("type", &var.type_text),
            );
        }
        for assignment in &facts.field_assignments {
            table.insert(
                Symbol::new(&assignment.variable, SymbolKind::Variable, assignment.location.clone())
                    .with_attribute("type", format!("struct {}", assignment.aggregate_type)),
            );
        }
        for m in &facts.macros {
            table.insert(Symbol::new(&m.name, SymbolKind::Macro, m.location.clone()));
        }
    }

    fn mappings(&mut self, facts: &RawFacts) {
        for assignment in &facts.field_assignments {
            if !self.model.functions.contains_key(&assignment.value) {
                continue;
            }
            self.model.func_ptr_mappings.push(FuncPtrMapping {
                aggregate_type: assignment.aggregate_type.clone(),
                variable: assignment.variable.clone(),
                field: assignment.field.clone(),
                function: assignment.value.clone(),
                location: assignment.location.clone(),
            });
        }
        for entry in &facts.module_entries {
            self.model.func_ptr_mappings.push(FuncPtrMapping {
                aggregate_type: MODULE_TYPE.to_string(),
                variable: format!("module_{}", entry.hook.field()),
                field: entry.hook.field().to_string(),
                function: entry.function.clone(),
                location: entry.location.clone(),
            });
        }
    }
}

fn new_function(fact: &FunctionFact) -> Function {
    Function {
        name: fact.name.clone(),
        return_type: fact.return_type.clone(),
        params: fact.params.clone(),
        location: fact.location.clone(),
        body: fact.body.clone(),
        attributes: fact.attributes.clone(),
        is_declaration: fact.is_declaration(),
        calls: Vec::new(),
        referenced_types: BTreeSet::new(),
        is_callback: false,
        callback_context: None,
        callback_trigger: None,
        execution_context: None,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::backend::{EnumeratorFact, FieldAssignment, FieldFact, ModuleEntry, ModuleHook};

    fn loc(line: usize) -> Location {
        Location::new("drv.c", line, 0, line, 10)
    }

    fn function(name: &str, line: usize, defined: bool) -> FunctionFact {
        FunctionFact {
            name: name.to_string(),
            return_type: "int".to_string(),
            params: Vec::new(),
            attributes: vec!["static".to_string()],
            location: loc(line),
            body: defined.then(|| loc(line + 1)),
            type_refs: Vec::new(),
        }
    }

    fn field(name: &str, ty: &str) -> FieldFact {
        FieldFact {
            name: name.to_string(),
            type_text: ty.to_string(),
            is_pointer: ty.ends_with('*'),
            ..FieldFact::default()
        }
    }

    fn enum_fact(members: &[(&str, Option<&str>)]) -> EnumFact {
        EnumFact {
            name: Some("e".to_string()),
            typedef_alias: None,
            members: members
                .iter()
                .map(|(n, i)| EnumeratorFact {
                    name: n.to_string(),
                    initializer: i.map(str::to_string),
                })
                .collect(),
            location: loc(1),
        }
    }

    #[test]
    fn test_definition_wins_in_any_order() {
        for facts in [
            vec![function("probe", 1, false), function("probe", 5, true)],
            vec![function("probe", 5, true), function("probe", 1, false)],
        ] {
            let raw = RawFacts {
                functions: facts,
                ..RawFacts::default()
            };
            let model = build(&raw);
            let probe = &model.functions["probe"];
            assert!(!probe.is_declaration);
            assert_eq!(probe.location.start_line, 5);
            assert!(model.warnings.is_empty());
        }
    }

    #[test]
    fn test_redefinition_keeps_first() {
        let raw = RawFacts {
            functions: vec![function("probe", 1, true), function("probe", 9, true)],
            ..RawFacts::default()
        };
        let model = build(&raw);
        assert_eq!(model.functions["probe"].location.start_line, 1);
        assert_eq!(model.warnings.len(), 1);
        assert_eq!(model.warnings[0].kind, WarningKind::Redefinition);
    }

    #[test]
    fn test_enum_values() {
        let raw = RawFacts {
            enums: vec![enum_fact(&[("A", None), ("B", None), ("C", Some("10")), ("D", None)])],
            ..RawFacts::default()
        };
        let model = build(&raw);
        let values: Vec<_> = model.enums["e"].members.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![Some(0), Some(1), Some(10), Some(11)]);
    }

    #[test]
    fn test_unevaluable_enum_initializer() {
        let raw = RawFacts {
            enums: vec![enum_fact(&[
                ("OK", Some("0")),
                ("BUSY", Some("-EBUSY")),
                ("NEXT", None),
                ("BACK", Some("OK + 2")),
            ])],
            ..RawFacts::default()
        };
        let model = build(&raw);
        let e = &model.enums["e"];
        assert_eq!(e.value_of("BUSY"), None);
        assert_eq!(e.members[1].expression.as_deref(), Some("-EBUSY"));
        assert_eq!(e.value_of("NEXT"), None);
        assert_eq!(e.value_of("BACK"), Some(2));
        assert_eq!(model.warnings.len(), 1);
        assert_eq!(model.warnings[0].kind, WarningKind::UnsupportedConstruct);
    }

    #[test]
    fn test_anonymous_naming_and_layout() {
        let raw = RawFacts {
            aggregates: vec![
                AggregateFact {
                    kind: AggregateKind::Struct,
                    name: None,
                    typedef_alias: None,
                    fields: vec![field("a", "int")],
                    location: loc(1),
                },
                AggregateFact {
                    kind: AggregateKind::Struct,
                    name: Some("pkt".to_string()),
                    typedef_alias: None,
                    fields: vec![
                        field("len", "u16"),
                        FieldFact {
                            array_len: Some("4".to_string()),
                            ..field("data", "u8")
                        },
                        field("next", "struct pkt *"),
                        field("lock", "spinlock_t"),
                        field("tail", "int"),
                    ],
                    location: loc(5),
                },
                AggregateFact {
                    kind: AggregateKind::Union,
                    name: None,
                    typedef_alias: Some("word_t".to_string()),
                    fields: vec![field("raw", "u32"), field("bytes", "u8")],
                    location: loc(9),
                },
            ],
            ..RawFacts::default()
        };
        let model = build(&raw);
        assert!(model.structs.contains_key("__anon_struct_0"));
        let pkt = &model.structs["pkt"];
        let offsets: Vec<_> = pkt.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![Some(0), Some(2), Some(6), Some(14), None]);
        assert_eq!(pkt.size, None);
        assert!(pkt.referenced.contains("pkt"));
        assert!(pkt.referenced_by.contains("pkt"));

        let word = &model.unions["word_t"];
        assert_eq!(word.size, Some(4));
        assert!(word.fields.iter().all(|f| f.offset == Some(0)));
    }

    #[test]
    fn test_references_keep_external_tags() {
        let raw = RawFacts {
            aggregates: vec![AggregateFact {
                kind: AggregateKind::Struct,
                name: Some("skel".to_string()),
                typedef_alias: None,
                fields: vec![field("udev", "struct usb_device *"), field("count", "size_t")],
                location: loc(1),
            }],
            ..RawFacts::default()
        };
        let model = build(&raw);
        let skel = &model.structs["skel"];
        assert_eq!(skel.referenced.iter().collect::<Vec<_>>(), vec!["usb_device"]);
        assert!(skel.referenced_by.is_empty());
        assert!(model.aggregate("usb_device").is_none());
    }

    #[test]
    fn test_mappings_require_known_functions() {
        let raw = RawFacts {
            functions: vec![function("my_probe", 1, true), function("my_init", 3, true)],
            field_assignments: vec![
                FieldAssignment {
                    aggregate_type: "usb_driver".to_string(),
                    variable: "drv".to_string(),
                    field: "probe".to_string(),
                    value: "my_probe".to_string(),
                    location: loc(10),
                },
                FieldAssignment {
                    aggregate_type: "usb_driver".to_string(),
                    variable: "drv".to_string(),
                    field: "id_table".to_string(),
                    value: "ids".to_string(),
                    location: loc(11),
                },
            ],
            module_entries: vec![ModuleEntry {
                hook: ModuleHook::Init,
                function: "my_init".to_string(),
                location: loc(20),
            }],
            ..RawFacts::default()
        };
        let model = build(&raw);
        let mapped: Vec<_> = model
            .func_ptr_mappings
            .iter()
            .map(|m| (m.aggregate_type.as_str(), m.field.as_str(), m.function.as_str()))
            .collect();
        assert_eq!(
            mapped,
            vec![("usb_driver", "probe", "my_probe"), ("module", "init", "my_init")]
        );
        assert!(model.symbols.get("drv", SymbolKind::Variable).is_some());
    }

    proptest! {
        #[test]
        fn implicit_members_count_up_from_explicit(start in -1000i64..1000, extra in 0usize..8) {
            let mut members = vec![("FIRST".to_string(), Some(start.to_string()))];
            for i in 0..extra {
                members.push((format!("M{}", i), None));
            }
            let fact = EnumFact {
                name: Some("p".to_string()),
                typedef_alias: None,
                members: members
                    .into_iter()
                    .map(|(name, initializer)| EnumeratorFact { name, initializer })
                    .collect(),
                location: loc(1),
            };
            let model = build(&RawFacts { enums: vec![fact], ..RawFacts::default() });
            for (i, member) in model.enums["p"].members.iter().enumerate() {
                prop_assert_eq!(member.value, Some(start + i as i64));
            }
        }
    }
}

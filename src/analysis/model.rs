//! Semantic entities produced by the model builder.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::backend::{AggregateKind, AsyncMechanism, Location, Parameter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Struct,
    Union,
    Enum,
    Typedef,
    Variable,
    Macro,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Struct => "struct",
            SymbolKind::Union => "union",
            SymbolKind::Enum => "enum",
            SymbolKind::Typedef => "typedef",
            SymbolKind::Variable => "variable",
            SymbolKind::Macro => "macro",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<AggregateKind> for SymbolKind {
    fn from(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Struct => SymbolKind::Struct,
            AggregateKind::Union => SymbolKind::Union,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, location: Location) -> Self {
        Self {
            name: name.into(),
            kind,
            location,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Symbols keyed by (name, kind). The first insertion for a key wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: BTreeMap<(String, SymbolKind), Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the symbol was rejected (empty name or key taken).
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        if symbol.name.is_empty() {
            return false;
        }
        let key = (symbol.name.clone(), symbol.kind);
        if self.symbols.contains_key(&key) {
            return false;
        }
        self.symbols.insert(key, symbol);
        true
    }

    pub fn get(&self, name: &str, kind: SymbolKind) -> Option<&Symbol> {
        self.symbols.get(&(name.to_string(), kind))
    }

    /// Every symbol named `name`, whatever its kind.
    pub fn lookup<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.symbols
            .range((name.to_string(), SymbolKind::Function)..)
            .take_while(move |((n, _), _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().filter(move |s| s.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Serialize for SymbolTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.symbols.values())
    }
}

/// A function after declaration/definition merging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub return_type: String,
    pub params: Vec<Parameter>,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Location>,
    pub attributes: Vec<String>,
    pub is_declaration: bool,
    /// Distinct outgoing call names in first-call order, including
    /// external symbols.
    pub calls: Vec<String>,
    pub referenced_types: BTreeSet<String>,
    pub is_callback: bool,
    pub callback_context: Option<String>,
    pub callback_trigger: Option<String>,
    pub execution_context: Option<String>,
}

impl Function {
    pub fn is_static(&self) -> bool {
        self.attributes.iter().any(|a| a == "static")
    }

    pub(crate) fn add_call(&mut self, callee: &str) {
        if !self.calls.iter().any(|c| c == callee) {
            self.calls.push(callee.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_text: String,
    pub is_pointer: bool,
    pub is_function_pointer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_len: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_width: Option<String>,
    /// Advisory byte offset.
    pub offset: Option<u64>,
    pub size: Option<u64>,
}

/// A struct or union.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateType {
    pub kind: AggregateKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typedef_alias: Option<String>,
    pub location: Location,
    pub fields: Vec<StructField>,
    pub size: Option<u64>,
    /// Struct and union tags named in field types, whether or not they are
    /// defined in the analyzed sources. Typedef aliases count only when they
    /// resolve to a registered aggregate.
    pub referenced: BTreeSet<String>,
    /// Registered aggregates whose fields name this one.
    pub referenced_by: BTreeSet<String>,
}

impl AggregateType {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn function_pointer_fields(&self) -> impl Iterator<Item = &StructField> {
        self.fields.iter().filter(|f| f.is_function_pointer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumMember {
    pub name: String,
    /// `None` when the value could not be computed.
    pub value: Option<i64>,
    /// Initializer text as written, for explicit initializers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumType {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typedef_alias: Option<String>,
    pub location: Location,
    pub members: Vec<EnumMember>,
}

impl EnumType {
    pub fn value_of(&self, member: &str) -> Option<i64> {
        self.members.iter().find(|m| m.name == member)?.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Typedef {
    pub alias: String,
    pub target: String,
    pub location: Location,
}

/// A handler registered with one of the kernel's deferred execution
/// mechanisms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsyncHandler {
    pub handler: String,
    pub mechanism: AsyncMechanism,
    pub api: String,
    pub location: Location,
    /// Execution context from the knowledge base, or `"unknown"`.
    pub context: String,
}

/// A function stored into a structure field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuncPtrMapping {
    /// Type name without the `struct` keyword (`usb_driver`).
    pub aggregate_type: String,
    pub variable: String,
    pub field: String,
    pub function: String,
    pub location: Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: usize) -> Location {
        Location::new("t.c", line, 0, line, 1)
    }

    #[test]
    fn test_symbol_table_first_insertion_wins() {
        let mut table = SymbolTable::new();
        assert!(table.insert(Symbol::new("probe", SymbolKind::Function, loc(1))));
        assert!(!table.insert(Symbol::new("probe", SymbolKind::Function, loc(9))));
        assert!(table.insert(Symbol::new("probe", SymbolKind::Variable, loc(3))));
        assert!(!table.insert(Symbol::new("", SymbolKind::Macro, loc(4))));

        assert_eq!(table.get("probe", SymbolKind::Function).unwrap().location.start_line, 1);
        assert_eq!(table.lookup("probe").count(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_symbol_table_serializes_as_list() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::new("b", SymbolKind::Macro, loc(2)).with_attribute("origin", "define"));
        table.insert(Symbol::new("a", SymbolKind::Macro, loc(1)));
        let json = serde_json::to_value(&table).unwrap();
        let names: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(json[1]["attributes"]["origin"], "define");
    }
}

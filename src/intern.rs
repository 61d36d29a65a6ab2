//! String and symbol interning.
//!
//! Property names, binding names, and opcode literal operands all reference
//! strings indirectly through a small integer id so that hidden-class
//! transitions, inline-cache comparisons, and environment lookups can compare
//! `u32`s instead of hashing/comparing string contents on every access.
//!
//! An id-table pattern trimmed down to the two kinds of interned data the
//! core actually needs: strings and symbols. There is no separate `Bytes` or
//! `LongInt` interning tier here - BigInt literals are boxed directly on the
//! heap since the language has no separate "big string" or "big bytes"
//! interning concept.

use std::fmt;

use ahash::AHashMap;

/// Interned identifier for a property name / binding name / string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interned identifier for a `Symbol` value.
///
/// Unlike strings, two symbols with the same description are never equal, so
/// `SymbolId` equality is solely by id: interning a symbol does not
/// deduplicate by description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A property key: either an interned string name or a symbol.
///
/// `ObjectStructure` transitions and inline-cache comparisons key on this
/// type directly (it is `Copy`), which is what lets the Simple/Complex IC
/// forms stay cheap to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(StringId),
    Symbol(SymbolId),
    /// A non-negative integer index, stored separately from `String` so that
    /// fast-mode array access never has to intern `"0"`, `"1"`, ... The
    /// indexed property/string-index conversion `GetObject`'s fast path
    /// describes uses this variant directly.
    Index(u32),
}

impl From<StringId> for PropertyKey {
    fn from(id: StringId) -> Self {
        Self::String(id)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

/// Well-known interned strings, pre-populated at interner construction so
/// opcode handlers can refer to them without looking up by content
/// (`constructor`, `prototype`, `length`, `name`, ...).
#[derive(Debug, Clone, Copy)]
pub struct StaticStrings {
    pub constructor: StringId,
    pub prototype: StringId,
    pub length: StringId,
    pub name: StringId,
    pub this: StringId,
    pub arguments: StringId,
    pub empty: StringId,
}

/// Owns the string and symbol tables for one engine instance.
///
/// A single `Interns` is shared (by reference) across every `CodeBlock` and
/// `ExecutionState` produced by the same engine; it outlives any individual
/// call.
#[derive(Debug)]
pub struct Interns {
    strings: Vec<String>,
    string_lookup: AHashMap<String, StringId>,
    symbol_descriptions: Vec<Option<String>>,
    next_symbol: u32,
    pub statics: StaticStrings,
}

impl Default for Interns {
    fn default() -> Self {
        Self::new()
    }
}

impl Interns {
    #[must_use]
    pub fn new() -> Self {
        let mut interns = Self {
            strings: Vec::new(),
            string_lookup: AHashMap::new(),
            symbol_descriptions: Vec::new(),
            next_symbol: 0,
            // placeholder, overwritten just below once real ids exist
            statics: StaticStrings {
                constructor: StringId(0),
                prototype: StringId(0),
                length: StringId(0),
                name: StringId(0),
                this: StringId(0),
                arguments: StringId(0),
                empty: StringId(0),
            },
        };
        let constructor = interns.intern("constructor");
        let prototype = interns.intern("prototype");
        let length = interns.intern("length");
        let name = interns.intern("name");
        let this = interns.intern("this");
        let arguments = interns.intern("arguments");
        let empty = interns.intern("");
        interns.statics = StaticStrings {
            constructor,
            prototype,
            length,
            name,
            this,
            arguments,
            empty,
        };
        interns
    }

    /// Interns `s`, returning an existing id if this content was interned
    /// before.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.string_lookup.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.string_lookup.insert(s.to_owned(), id);
        id
    }

    #[must_use]
    pub fn get_str(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Creates a fresh, never-deduplicated symbol with the given description.
    pub fn new_symbol(&mut self, description: Option<&str>) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        self.symbol_descriptions.push(description.map(str::to_owned));
        id
    }

    #[must_use]
    pub fn symbol_description(&self, id: SymbolId) -> Option<&str> {
        self.symbol_descriptions[id.index()].as_deref()
    }

    /// Renders a property key for error messages (`TypeError` text, etc.).
    #[must_use]
    pub fn key_display(&self, key: PropertyKey) -> String {
        match key {
            PropertyKey::String(id) => self.get_str(id).to_owned(),
            PropertyKey::Index(i) => i.to_string(),
            PropertyKey::Symbol(id) => match self.symbol_description(id) {
                Some(d) => format!("Symbol({d})"),
                None => "Symbol()".to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_by_content() {
        let mut interns = Interns::new();
        let a = interns.intern("foo");
        let b = interns.intern("foo");
        let c = interns.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interns.get_str(a), "foo");
    }

    #[test]
    fn symbols_are_never_deduplicated() {
        let mut interns = Interns::new();
        let a = interns.new_symbol(Some("iterator"));
        let b = interns.new_symbol(Some("iterator"));
        assert_ne!(a, b);
    }
}

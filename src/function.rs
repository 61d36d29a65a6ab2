//! Function objects (§6 "Object model vtable": `call`/`construct`/
//! `isConstructor`/`codeBlock`/`homeObject`).
//!
//! Design Notes §9 calls for avoiding deep inheritance between function
//! kinds; this follows the same one-tagged-struct-over-trait-objects
//! preference `value.rs`'s `Value` enum already uses: one flat enum rather
//! than a class tree.

use std::rc::Rc;

use crate::{bytecode::CodeBlock, environment::LexicalEnvironment, heap::HeapId, object::JsObject};

/// What kind of callable this is. Each variant determines which of
/// `[[Call]]`/`[[Construct]]` are present and how `this` is bound (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// An ordinary `function` declaration/expression: constructible, has its
    /// own `this`, `arguments`, and `prototype` property.
    Script,
    /// Lexically binds `this`/`arguments`/`new.target` to the enclosing
    /// scope; never constructible.
    Arrow,
    /// An object literal or class method: not constructible, carries a
    /// `homeObject` for `super` property lookups (§4.5 `SuperReference`).
    Method,
    /// A class's `constructor`; constructible, and for a derived class must
    /// run `super(...)` before `this` is usable (enforced by the class
    /// initialization opcodes, §4.8).
    ClassConstructor { derived: bool },
    /// Pauses instead of returning (§4.7); resumed with `ExecutionResume`.
    Generator,
    Async,
    AsyncGenerator,
}

impl FunctionKind {
    #[must_use]
    pub fn is_constructible(self) -> bool {
        matches!(self, Self::Script | Self::ClassConstructor { .. })
    }

    #[must_use]
    pub fn has_own_this_binding(self) -> bool {
        !matches!(self, Self::Arrow)
    }

    #[must_use]
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Generator | Self::Async | Self::AsyncGenerator)
    }
}

/// A callable heap object: the common `JsObject` header (so it has its own
/// properties, a prototype, etc. like any other object) plus the call
/// machinery §6 requires.
#[derive(Debug)]
pub struct FunctionObject {
    pub object: JsObject,
    pub kind: FunctionKind,
    pub code: Rc<CodeBlock>,
    /// The environment the function closes over, captured at creation time;
    /// each call extends it with a fresh `Function`-kind environment rather
    /// than mutating this one (§3, §4.4).
    pub closure: Option<Rc<LexicalEnvironment>>,
    /// `super` property lookups resolve against this object's prototype
    /// (§4.5 `SuperReference`, §6 `homeObject`). `None` for ordinary
    /// functions that never use `super`.
    pub home_object: Option<HeapId>,
    pub name: Option<crate::intern::StringId>,
    /// Instance field initializers a class constructor replays on every
    /// `new` (§4.8), in declared order. Empty for ordinary functions.
    pub field_inits: Vec<crate::vm::class_init::PendingFieldInit>,
}

impl FunctionObject {
    #[must_use]
    pub fn new(
        object: JsObject,
        kind: FunctionKind,
        code: Rc<CodeBlock>,
        closure: Option<Rc<LexicalEnvironment>>,
    ) -> Self {
        Self {
            object,
            kind,
            code,
            closure,
            home_object: None,
            name: None,
            field_inits: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.kind.is_constructible()
    }
}

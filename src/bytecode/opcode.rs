//! The opcode catalogue (§4.1 "Instruction categories").
//!
//! One `Opcode` tag per instruction mnemonic; operand layout (which
//! registers/offsets/constant-pool indices follow the tag byte) lives in
//! [`super::code_block`] and is decoded with the `fetch_*!` macros in
//! `vm::dispatch`, a cached-frame fetch pattern common to register-based
//! bytecode interpreters. Grouped into the categories §4.1 enumerates; the
//! grouping is documentation only; dispatch matches on the flat tag.

use strum::{Display, EnumString, FromRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    // -- Data movement / literals --------------------------------------
    LoadLiteral = 0,
    Mov,
    LoadRegExp,
    ObjectDefineOwnPropertyOperation,
    ArrayDefineOwnPropertyOperation,
    CreateObject,
    CreateArray,
    CreateFunction,
    CreateClass,

    // -- Binary / unary arithmetic (§4.2) --------------------------------
    BinaryPlus,
    BinaryMinus,
    BinaryMultiply,
    BinaryDivision,
    BinaryMod,
    BinaryExponentiation,
    BinaryBitwiseAnd,
    BinaryBitwiseOr,
    BinaryBitwiseXor,
    BinaryLeftShift,
    BinarySignedRightShift,
    BinaryUnsignedRightShift,
    UnaryMinus,
    UnaryNot,
    UnaryBitwiseNot,
    Increment,
    Decrement,
    ToNumericIncrement,
    ToNumericDecrement,

    // -- Comparison / type -----------------------------------------------
    BinaryEqual,
    BinaryNotEqual,
    BinaryStrictEqual,
    BinaryNotStrictEqual,
    BinaryLessThan,
    BinaryLessThanOrEqual,
    BinaryGreaterThan,
    BinaryGreaterThanOrEqual,
    BinaryInstanceOf,
    BinaryIn,
    UnaryTypeof,
    TemplateOperation,

    // -- Property access (§4.3) ------------------------------------------
    GetObject,
    SetObject,
    GetObjectPreComputedCase,
    SetObjectPreComputedCase,
    GetGlobalVariable,
    SetGlobalVariable,
    InitializeGlobalVariable,
    DeleteObject,

    // -- Variable / environment access (§3 / §4.4) -----------------------
    GetBindingValue,
    InitializeBindingValue,
    SetMutableBinding,
    CreateBinding,
    DeclareBinding,
    ResolveBinding,
    WithOperation,

    // -- Control flow (§4.6) ---------------------------------------------
    Jump,
    JumpIfTrue,
    JumpIfFalse,
    JumpIfUndefinedOrNull,
    TryOperation,
    TryCatchWithBindingOperation,
    FinallyEnd,
    ThrowOperation,
    ThrowStaticErrorOperation,
    ReturnFunctionSlot,
    End,
    BreakpointEnabled,
    BreakpointDisabled,

    // -- Call / construct (§4.5) ------------------------------------------
    CallFunction,
    CallFunctionWithReceiver,
    CallFunctionComplexCase,
    NewOperation,
    NewOperationWithSpreadElement,
    SuperReference,
    SuperSetObjectOperation,
    SuperGetObjectOperation,
    MetaPropertyOperation,
    CallComplexCaseInWithScope,
    CallComplexCaseMayBuiltinApply,
    CallComplexCaseMayBuiltinEval,
    CallComplexCaseWithSpreadElement,

    // -- Scope / block (§3) -----------------------------------------------
    CreateFunctionEnvironment,
    CreateObjectEnvironment,
    PushBlockEnvironment,
    PopBlockEnvironment,
    EnsureArgumentsObject,

    // -- Iteration ----------------------------------------------------
    GetIterator,
    IteratorOperation,
    IteratorClose,
    BindingRestElement,
    CreateEnumerateObject,
    CheckLastEnumerateKey,
    GetEnumerateKey,
    MarkEnumerateKey,
    ForOfHeadOperation,

    // -- Generator / async (§4.7) -----------------------------------------
    ExecutionPause,
    ExecutionResume,
    YieldOperation,
    AwaitOperation,

    // -- Class initialization (§4.8) --------------------------------------
    InitializeClass,
    SetFieldSize,
    InitField,
    InitPrivateField,
    SetFieldData,
    SetPrivateFieldData,
    InitStaticField,
    CleanupStaticData,
    LoadPrivateProperty,
    StorePrivateProperty,
    LoadHomeObject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_variant_name() {
        assert_eq!(Opcode::BinaryPlus.to_string(), "BinaryPlus");
        assert_eq!(Opcode::End.to_string(), "End");
    }
}

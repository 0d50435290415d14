//! Type table for Ember
//!
//! Types are interned by decorated name (`i32`, `mut i32`,
//! `def(i32, ref i32): i32`) and addressed by [`TypeId`]. Two ids are equal
//! iff they name the same entry.

use std::collections::HashMap;
use std::fmt;

use crate::frontend::ast::{PassMode, TypeRef};
use crate::middle::ir::IRType;
use crate::utils::{Error, Result, SourceLoc};

/// Dense handle of an interned type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Closed set of type kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Void,
    I8,
    I16,
    I32,
    I64,
    /// Platform word, pinned to 64 bits
    Int,
    Bool,
    F32,
    F64,
    Float,
    /// Unsigned 8-bit integral
    Byte,
    Char,
    BChar,
    String,
    CString,
    Function,
    Alias,
}

impl Kind {
    pub fn is_integral(self) -> bool {
        matches!(self, Kind::I8 | Kind::I16 | Kind::I32 | Kind::I64 | Kind::Int | Kind::Byte)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Kind::F32 | Kind::F64 | Kind::Float)
    }

    pub fn is_char(self) -> bool {
        matches!(self, Kind::Char | Kind::BChar)
    }

    /// Integral kinds that use unsigned arithmetic and extension
    pub fn is_unsigned(self) -> bool {
        matches!(self, Kind::Byte | Kind::Char | Kind::BChar)
    }

    /// Backend representation of a primitive kind
    fn ir_type(self) -> IRType {
        match self {
            Kind::Void => IRType::Void,
            Kind::I8 | Kind::Byte | Kind::BChar => IRType::I8,
            Kind::I16 => IRType::I16,
            Kind::I32 | Kind::Char => IRType::I32,
            Kind::I64 | Kind::Int => IRType::I64,
            Kind::Bool => IRType::Bool,
            Kind::F32 => IRType::F32,
            Kind::F64 | Kind::Float => IRType::F64,
            Kind::String | Kind::CString => IRType::Ptr,
            Kind::Function | Kind::Alias => IRType::Void,
        }
    }

    fn mangle_code(self) -> &'static str {
        match self {
            Kind::I8 => "I8",
            Kind::I16 => "I16",
            Kind::I32 => "I32",
            Kind::I64 => "I64",
            Kind::Int => "Iw",
            Kind::Bool => "Z",
            Kind::F32 => "F32",
            Kind::F64 => "F64",
            Kind::Float => "Fw",
            Kind::Byte => "Y",
            Kind::Char => "C",
            Kind::BChar => "B",
            Kind::String => "S",
            Kind::CString => "Sc",
            Kind::Void => "V",
            Kind::Function | Kind::Alias => "",
        }
    }
}

/// Primitive names and kinds, created eagerly by [`TypeTable::new`]
const PRIMITIVES: &[(&str, Kind)] = &[
    ("void", Kind::Void),
    ("i8", Kind::I8),
    ("i16", Kind::I16),
    ("i32", Kind::I32),
    ("i64", Kind::I64),
    ("int", Kind::Int),
    ("bool", Kind::Bool),
    ("f32", Kind::F32),
    ("f64", Kind::F64),
    ("float", Kind::Float),
    ("byte", Kind::Byte),
    ("char", Kind::Char),
    ("bchar", Kind::BChar),
    ("string", Kind::String),
    ("cstring", Kind::CString),
];

/// Debug-info encoding of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEncoding {
    Signed,
    Unsigned,
    Float,
    Boolean,
    SignedChar,
    UnsignedChar,
    Address,
}

/// Debug-info record attached to primitives with `--debug-info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugType {
    pub name: String,
    pub size_bits: u32,
    pub encoding: DebugEncoding,
}

impl fmt::Display for DebugEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DebugEncoding::Signed => "DW_ATE_signed",
            DebugEncoding::Unsigned => "DW_ATE_unsigned",
            DebugEncoding::Float => "DW_ATE_float",
            DebugEncoding::Boolean => "DW_ATE_boolean",
            DebugEncoding::SignedChar => "DW_ATE_signed_char",
            DebugEncoding::UnsignedChar => "DW_ATE_unsigned_char",
            DebugEncoding::Address => "DW_ATE_address",
        })
    }
}

impl fmt::Display for DebugType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.size_bits, self.encoding)
    }
}

/// Return and parameter types of a function type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    pub ret: TypeId,
    pub params: Vec<(TypeId, PassMode)>,
}

/// An interned type
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: Kind,
    /// Undecorated name
    pub name: String,
    pub mutable: bool,
    pub ir: IRType,
    pub debug: Option<DebugType>,
    pub signature: Option<FunctionSignature>,
    pub alias_of: Option<TypeId>,
}

impl Type {
    fn primitive(name: &str, kind: Kind, mutable: bool) -> Self {
        Self {
            kind,
            name: name.to_string(),
            mutable,
            ir: kind.ir_type(),
            debug: None,
            signature: None,
            alias_of: None,
        }
    }

    /// Name qualified by mutability; the interning key
    pub fn decorated_name(&self) -> String {
        if self.mutable {
            format!("mut {}", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decorated_name())
    }
}

/// How [`TypeTable::find`] treats mutability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindMode {
    /// The non-mutable entry
    Default,
    /// The `mut` entry
    Mutable,
    /// Whichever entry exists, non-mutable first
    FirstMatch,
}

/// Interning store of all types known to one compilation
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<Type>,
    index: HashMap<String, TypeId>,
    debug_info: bool,
}

impl TypeTable {
    /// Create a table holding `T` and `mut T` for every primitive
    pub fn new(debug_info: bool) -> Self {
        let mut table = Self {
            types: Vec::new(),
            index: HashMap::new(),
            debug_info,
        };
        for (name, kind) in PRIMITIVES {
            for mutable in [false, true] {
                let mut ty = Type::primitive(name, *kind, mutable);
                if debug_info {
                    ty.debug = Self::debug_type(name, *kind);
                }
                table.insert(ty);
            }
        }
        table
    }

    fn debug_type(name: &str, kind: Kind) -> Option<DebugType> {
        let encoding = match kind {
            Kind::Void | Kind::Function | Kind::Alias => return None,
            Kind::Bool => DebugEncoding::Boolean,
            Kind::Byte => DebugEncoding::Unsigned,
            Kind::Char => DebugEncoding::SignedChar,
            Kind::BChar => DebugEncoding::UnsignedChar,
            Kind::String | Kind::CString => DebugEncoding::Address,
            k if k.is_floating() => DebugEncoding::Float,
            _ => DebugEncoding::Signed,
        };
        Some(DebugType {
            name: name.to_string(),
            size_bits: kind.ir_type().bit_width(),
            encoding,
        })
    }

    pub fn debug_info(&self) -> bool {
        self.debug_info
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// Insert if absent; the stored entry's id is returned either way
    pub fn insert(&mut self, ty: Type) -> TypeId {
        let key = ty.decorated_name();
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.index.insert(key, id);
        id
    }

    pub fn find(&self, name: &str, mode: FindMode) -> Option<TypeId> {
        match mode {
            FindMode::Default => self.index.get(name).copied(),
            FindMode::Mutable => self.index.get(&format!("mut {}", name)).copied(),
            FindMode::FirstMatch => self
                .find(name, FindMode::Default)
                .or_else(|| self.find(name, FindMode::Mutable)),
        }
    }

    /// Exact lookup by decorated name
    pub fn find_decorated(&self, decorated: &str, must_exist: bool) -> Result<Option<TypeId>> {
        match self.index.get(decorated) {
            Some(id) => Ok(Some(*id)),
            None if must_exist => Err(Error::TypeNotFound {
                name: decorated.to_string(),
                loc: SourceLoc::default(),
            }),
            None => Ok(None),
        }
    }

    /// Resolve a written type, honouring `mut`
    pub fn resolve(&mut self, ty: &TypeRef) -> Result<TypeId> {
        let base = self.find(&ty.name, FindMode::Default).ok_or_else(|| Error::TypeNotFound {
            name: ty.name.clone(),
            loc: ty.loc,
        })?;
        Ok(if ty.mutable { self.mutable_of(base) } else { base })
    }

    /// Number of entries whose undecorated name is `name`
    pub fn is_defined_undecorated(&self, name: &str) -> usize {
        self.types.iter().filter(|t| t.name == name).count()
    }

    pub fn mutable_of(&mut self, id: TypeId) -> TypeId {
        let ty = self.get(id);
        if ty.mutable {
            return id;
        }
        let mut qualified = ty.clone();
        qualified.mutable = true;
        self.insert(qualified)
    }

    pub fn immutable_of(&mut self, id: TypeId) -> TypeId {
        let ty = self.get(id);
        if !ty.mutable {
            return id;
        }
        let mut plain = ty.clone();
        plain.mutable = false;
        self.insert(plain)
    }

    /// The non-mutable entry sharing this type's name
    pub fn unqualified(&self, id: TypeId) -> TypeId {
        let ty = self.get(id);
        if !ty.mutable {
            return id;
        }
        self.index.get(&ty.name).copied().unwrap_or(id)
    }

    /// Follow aliases down to a concrete type, keeping mutability
    pub fn resolve_alias(&self, mut id: TypeId) -> TypeId {
        while let Some(target) = self.get(id).alias_of {
            id = target;
        }
        id
    }

    /// Kind after alias resolution
    pub fn kind(&self, id: TypeId) -> Kind {
        self.get(self.resolve_alias(id)).kind
    }

    /// Equality ignoring mutability and aliases
    pub fn basic_equal(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.resolve_alias(self.unqualified(a));
        let b = self.resolve_alias(self.unqualified(b));
        self.unqualified(a) == self.unqualified(b)
    }

    pub fn is_sized(&self, id: TypeId) -> bool {
        !matches!(self.kind(id), Kind::Void | Kind::Function)
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        self.kind(id) == Kind::Void
    }

    pub fn void(&self) -> TypeId {
        self.primitive("void")
    }

    pub fn bool(&self) -> TypeId {
        self.primitive("bool")
    }

    pub fn i32(&self) -> TypeId {
        self.primitive("i32")
    }

    pub fn int(&self) -> TypeId {
        self.primitive("int")
    }

    pub fn f64(&self) -> TypeId {
        self.primitive("f64")
    }

    pub fn primitive(&self, name: &str) -> TypeId {
        // Primitives are inserted first, in PRIMITIVES order, two per kind
        let pos = PRIMITIVES.iter().position(|(n, _)| *n == name).unwrap_or(0);
        TypeId(pos as u32 * 2)
    }

    /// Intern the function type `(ret, params)`
    pub fn function_type(&mut self, ret: TypeId, params: Vec<(TypeId, PassMode)>) -> TypeId {
        let param_names: Vec<String> = params
            .iter()
            .map(|(ty, mode)| match mode {
                PassMode::Copy => self.get(*ty).decorated_name(),
                other => format!("{} {}", other, self.get(*ty).decorated_name()),
            })
            .collect();
        let name = format!(
            "def({}): {}",
            param_names.join(", "),
            self.get(ret).decorated_name()
        );
        if let Ok(Some(existing)) = self.find_decorated(&name, false) {
            return existing;
        }

        let ir = IRType::Function {
            params: params
                .iter()
                .map(|(ty, mode)| self.param_ir_type(*ty, *mode))
                .collect(),
            ret: Box::new(self.get(ret).ir.clone()),
        };

        self.insert(Type {
            kind: Kind::Function,
            name,
            mutable: false,
            ir,
            debug: None,
            signature: Some(FunctionSignature { ret, params }),
            alias_of: None,
        })
    }

    /// How a parameter travels: `ref` parameters are addresses
    pub fn param_ir_type(&self, ty: TypeId, mode: PassMode) -> IRType {
        match mode {
            PassMode::Ref => IRType::Ptr,
            PassMode::Copy | PassMode::View => self.get(ty).ir.clone(),
        }
    }

    /// Register `name` as another name for `target`
    pub fn insert_alias(&mut self, name: &str, target: TypeId, loc: SourceLoc) -> Result<TypeId> {
        if self.is_defined_undecorated(name) > 0 {
            return Err(Error::RedefinedSymbol { name: name.to_string(), loc });
        }
        let target = self.unqualified(target);
        let underlying = self.get(target).clone();
        let alias = self.insert(Type {
            kind: Kind::Alias,
            name: name.to_string(),
            mutable: false,
            ir: underlying.ir,
            debug: underlying.debug,
            signature: None,
            alias_of: Some(target),
        });
        let mutable_target = self.mutable_of(target);
        let mut mutable_alias = self.get(alias).clone();
        mutable_alias.mutable = true;
        mutable_alias.alias_of = Some(mutable_target);
        self.insert(mutable_alias);
        Ok(alias)
    }

    /// Short stable encoding of a type
    pub fn mangle(&self, id: TypeId) -> String {
        let ty = self.get(id);
        let prefix = if ty.mutable { "M" } else { "" };
        let code = match (ty.kind, ty.alias_of, &ty.signature) {
            (Kind::Alias, Some(target), _) => return format!("{}{}", prefix, self.mangle(self.unqualified(target))),
            (Kind::Function, _, Some(sig)) => {
                let mut code = format!("F{}", self.mangle(sig.ret));
                for (param, mode) in &sig.params {
                    if *mode == PassMode::Ref {
                        code.push('R');
                    }
                    code.push_str(&self.mangle(*param));
                }
                code.push('E');
                code
            }
            (kind, _, _) => kind.mangle_code().to_string(),
        };
        format!("{}{}", prefix, code)
    }

    /// Companion symbol of a function: `_E<len><name><type code>`
    pub fn mangle_function(&self, name: &str, fn_type: TypeId) -> String {
        format!("_E{}{}{}", name.len(), name, self.mangle(fn_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_eager() {
        let table = TypeTable::new(false);
        for (name, _) in PRIMITIVES {
            let plain = table.find(name, FindMode::Default).unwrap();
            let mutable = table.find(name, FindMode::Mutable).unwrap();
            assert_ne!(plain, mutable);
            assert_eq!(table.get(plain).ir, table.get(mutable).ir);
            assert_eq!(table.is_defined_undecorated(name), 2);
        }
        assert_eq!(table.i32(), table.find("i32", FindMode::Default).unwrap());
        assert_eq!(table.primitive("cstring"), table.find("cstring", FindMode::Default).unwrap());
    }

    #[test]
    fn test_interning() {
        let mut table = TypeTable::new(false);
        let i32_ty = table.i32();
        let again = table.insert(Type::primitive("i32", Kind::I32, false));
        assert_eq!(i32_ty, again);

        let f1 = table.function_type(i32_ty, vec![(i32_ty, PassMode::Copy)]);
        let f2 = table.function_type(i32_ty, vec![(i32_ty, PassMode::Copy)]);
        let f3 = table.function_type(i32_ty, vec![(i32_ty, PassMode::Ref)]);
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
        assert_eq!(table.get(f3).name, "def(ref i32): i32");

        // Identity iff same kind and decorated name
        for a in 0..table.types.len() {
            for b in 0..table.types.len() {
                let (ta, tb) = (table.get(TypeId(a as u32)), table.get(TypeId(b as u32)));
                let same = ta.kind == tb.kind && ta.decorated_name() == tb.decorated_name();
                assert_eq!(a == b, same);
            }
        }
    }

    #[test]
    fn test_find_modes() {
        let table = TypeTable::new(false);
        assert_eq!(table.find("nope", FindMode::FirstMatch), None);
        assert_eq!(table.find("bool", FindMode::FirstMatch), table.find("bool", FindMode::Default));
        assert!(table.find_decorated("mut f64", true).unwrap().is_some());
        assert_eq!(table.find_decorated("mut mut f64", false).unwrap(), None);
        assert_eq!(table.find_decorated("u7", true).unwrap_err().tag(), "TypeNotFound");
    }

    #[test]
    fn test_basic_equal_ignores_mut_and_alias() {
        let mut table = TypeTable::new(false);
        let i32_ty = table.i32();
        let mut_i32 = table.mutable_of(i32_ty);
        assert!(table.basic_equal(i32_ty, mut_i32));
        assert!(!table.basic_equal(i32_ty, table.int()));

        let alias = table.insert_alias("score", i32_ty, SourceLoc::dummy()).unwrap();
        assert!(table.basic_equal(alias, i32_ty));
        let mut_alias = table.mutable_of(alias);
        assert!(table.basic_equal(mut_alias, mut_i32));
        assert_eq!(table.mangle(alias), "I32");
        assert!(table.insert_alias("i8", i32_ty, SourceLoc::dummy()).is_err());
    }

    #[test]
    fn test_mangling() {
        let mut table = TypeTable::new(false);
        let i32_ty = table.i32();
        let mut_int = table.mutable_of(table.int());
        assert_eq!(table.mangle(mut_int), "MIw");
        assert_eq!(table.mangle(table.primitive("cstring")), "Sc");
        let f = table.function_type(i32_ty, vec![(i32_ty, PassMode::Copy), (i32_ty, PassMode::Ref)]);
        assert_eq!(table.mangle(f), "FI32I32RI32E");
        assert_eq!(table.mangle_function("add", f), "_E3addFI32I32RI32E");
    }

    #[test]
    fn test_sizedness_and_debug() {
        let mut table = TypeTable::new(true);
        assert!(!table.is_sized(table.void()));
        let f = table.function_type(table.void(), vec![]);
        assert!(!table.is_sized(f));
        assert!(table.is_sized(table.bool()));
        let debug = table.get(table.primitive("byte")).debug.clone().unwrap();
        assert_eq!(debug.size_bits, 8);
        assert_eq!(debug.encoding, DebugEncoding::Unsigned);
        assert!(table.get(table.void()).debug.is_none());
    }
}

//! The C type model consumed by the semantic core.
//!
//! This is deliberately a value model, not a full type system: the core
//! needs to answer structural questions (is this a pointer? what are the
//! fields? what does it really look like under an abstraction?) and
//! perform loose compatibility checks. Full structural compatibility and
//! promotion rules live with the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A C type as the checker sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ty {
    /// Not yet known; matches everything.
    Unknown,
    Void,
    Bool,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Enum(EnumTy),
    Pointer(Box<Ty>),
    Array(Box<Ty>, Option<usize>),
    Struct(RecordTy),
    Union(RecordTy),
    Function(Box<FnTy>),
    /// An abstract datatype: clients see the name, not the representation.
    Abstract(Box<AbstractTy>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTy {
    pub tag: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTy {
    pub tag: Option<String>,
    pub fields: Vec<Field>,
    /// False for a forward-referenced tag with no definition yet.
    pub defined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnTy {
    pub ret: Ty,
    pub params: Vec<Param>,
    pub varargs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractTy {
    pub name: String,
    pub rep: Ty,
}

/// Byte size and alignment under the LP64 layout model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

fn align_up(off: u64, align: u64) -> u64 {
    (off + align - 1) / align * align
}

impl Ty {
    pub fn pointer(to: Ty) -> Ty {
        Ty::Pointer(Box::new(to))
    }

    pub fn array(elem: Ty, len: Option<usize>) -> Ty {
        Ty::Array(Box::new(elem), len)
    }

    pub fn function(ret: Ty, params: Vec<Param>, varargs: bool) -> Ty {
        Ty::Function(Box::new(FnTy {
            ret,
            params,
            varargs,
        }))
    }

    pub fn abstract_type(name: impl Into<String>, rep: Ty) -> Ty {
        Ty::Abstract(Box::new(AbstractTy {
            name: name.into(),
            rep,
        }))
    }

    /// The type with abstraction unwrapped.
    pub fn real(&self) -> &Ty {
        let mut t = self;
        while let Ty::Abstract(a) = t {
            t = &a.rep;
        }
        t
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Ty::Abstract(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.real(), Ty::Function(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.real(), Ty::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.real(), Ty::Array(..))
    }

    pub fn is_pointer_or_array(&self) -> bool {
        self.is_pointer() || self.is_array()
    }

    pub fn is_struct_or_union(&self) -> bool {
        matches!(self.real(), Ty::Struct(_) | Ty::Union(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.real(), Ty::Enum(_))
    }

    pub fn is_char(&self) -> bool {
        matches!(self.real(), Ty::Char | Ty::UChar)
    }

    /// True for the distinguished boolean type itself, before any
    /// realtype unwrapping of other integral kinds.
    pub fn is_direct_bool(&self) -> bool {
        matches!(self, Ty::Bool)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self.real(),
            Ty::Bool
                | Ty::Char
                | Ty::UChar
                | Ty::Short
                | Ty::UShort
                | Ty::Int
                | Ty::UInt
                | Ty::Long
                | Ty::ULong
                | Ty::Enum(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self.real(), Ty::Float | Ty::Double)
    }

    /// Pointee or element type, through abstraction.
    pub fn base_type(&self) -> Option<&Ty> {
        match self.real() {
            Ty::Pointer(b) => Some(b),
            Ty::Array(b, _) => Some(b),
            _ => None,
        }
    }

    pub fn return_type(&self) -> Option<&Ty> {
        match self.real() {
            Ty::Function(f) => Some(&f.ret),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<&[Param]> {
        match self.real() {
            Ty::Function(f) => Some(&f.params),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match self.real() {
            Ty::Struct(r) | Ty::Union(r) => Some(&r.fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields()?.iter().find(|f| f.name == name)
    }

    pub fn enum_members(&self) -> Option<&[String]> {
        match self.real() {
            Ty::Enum(e) => Some(&e.members),
            _ => None,
        }
    }

    /// Loose compatibility: unknown matches everything, abstraction
    /// compares by name, enums are int-compatible, arrays decay.
    pub fn matches(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Unknown, _) | (_, Ty::Unknown) => true,
            (Ty::Abstract(a), Ty::Abstract(b)) => a.name == b.name,
            (Ty::Abstract(a), t) | (t, Ty::Abstract(a)) => a.rep.matches(t),
            (Ty::Enum(a), Ty::Enum(b)) => match (&a.tag, &b.tag) {
                (Some(x), Some(y)) => x == y,
                _ => a.members == b.members,
            },
            (Ty::Enum(_), Ty::Int) | (Ty::Int, Ty::Enum(_)) => true,
            (Ty::Bool, t) | (t, Ty::Bool) if matches!(t, Ty::Int | Ty::Char) => true,
            (Ty::Pointer(a), Ty::Pointer(b)) => a.matches(b),
            (Ty::Pointer(a), Ty::Array(b, _)) | (Ty::Array(b, _), Ty::Pointer(a)) => a.matches(b),
            (Ty::Array(a, n), Ty::Array(b, m)) => a.matches(b) && (n == m || n.is_none() || m.is_none()),
            (Ty::Struct(a), Ty::Struct(b)) | (Ty::Union(a), Ty::Union(b)) => match (&a.tag, &b.tag)
            {
                (Some(x), Some(y)) => x == y,
                _ => a.fields == b.fields,
            },
            (Ty::Function(a), Ty::Function(b)) => {
                a.ret.matches(&b.ret)
                    && a.params.len() == b.params.len()
                    && a.params
                        .iter()
                        .zip(&b.params)
                        .all(|(x, y)| x.ty.matches(&y.ty))
            }
            (a, b) => a == b,
        }
    }

    /// Fixed layout when the type has one. Incomplete, unknown, function,
    /// and abstract types have no layout visible to clients.
    pub fn layout(&self) -> Option<Layout> {
        match self {
            Ty::Unknown | Ty::Void | Ty::Function(_) | Ty::Abstract(_) => None,
            Ty::Bool | Ty::Char | Ty::UChar => Some(Layout { size: 1, align: 1 }),
            Ty::Short | Ty::UShort => Some(Layout { size: 2, align: 2 }),
            Ty::Int | Ty::UInt | Ty::Float | Ty::Enum(_) => Some(Layout { size: 4, align: 4 }),
            Ty::Long | Ty::ULong | Ty::Double | Ty::Pointer(_) => {
                Some(Layout { size: 8, align: 8 })
            }
            Ty::Array(elem, len) => {
                let el = elem.layout()?;
                let n = (*len)? as u64;
                Some(Layout {
                    size: el.size * n,
                    align: el.align,
                })
            }
            Ty::Struct(r) => {
                if !r.defined {
                    return None;
                }
                let mut off = 0u64;
                let mut align = 1u64;
                for f in &r.fields {
                    let fl = f.ty.layout()?;
                    off = align_up(off, fl.align) + fl.size;
                    align = align.max(fl.align);
                }
                Some(Layout {
                    size: align_up(off, align),
                    align,
                })
            }
            Ty::Union(r) => {
                if !r.defined {
                    return None;
                }
                let mut size = 0u64;
                let mut align = 1u64;
                for f in &r.fields {
                    let fl = f.ty.layout()?;
                    size = size.max(fl.size);
                    align = align.max(fl.align);
                }
                Some(Layout {
                    size: align_up(size, align),
                    align,
                })
            }
        }
    }

    pub fn size_of(&self) -> Option<u64> {
        self.layout().map(|l| l.size)
    }

    pub fn align_of(&self) -> Option<u64> {
        self.layout().map(|l| l.align)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Unknown => write!(f, "?"),
            Ty::Void => write!(f, "void"),
            Ty::Bool => write!(f, "bool"),
            Ty::Char => write!(f, "char"),
            Ty::UChar => write!(f, "unsigned char"),
            Ty::Short => write!(f, "short"),
            Ty::UShort => write!(f, "unsigned short"),
            Ty::Int => write!(f, "int"),
            Ty::UInt => write!(f, "unsigned int"),
            Ty::Long => write!(f, "long"),
            Ty::ULong => write!(f, "unsigned long"),
            Ty::Float => write!(f, "float"),
            Ty::Double => write!(f, "double"),
            Ty::Enum(e) => match &e.tag {
                Some(tag) => write!(f, "enum {}", tag),
                None => write!(f, "enum {{ {} }}", e.members.join(", ")),
            },
            Ty::Pointer(b) => write!(f, "{} *", b),
            Ty::Array(b, Some(n)) => write!(f, "{} [{}]", b, n),
            Ty::Array(b, None) => write!(f, "{} []", b),
            Ty::Struct(r) => match &r.tag {
                Some(tag) => write!(f, "struct {}", tag),
                None => write!(f, "struct"),
            },
            Ty::Union(r) => match &r.tag {
                Some(tag) => write!(f, "union {}", tag),
                None => write!(f, "union"),
            },
            Ty::Function(fun) => {
                write!(f, "{} (", fun.ret)?;
                for (i, p) in fun.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                if fun.varargs {
                    if !fun.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
            Ty::Abstract(a) => write!(f, "{}", a.name),
        }
    }
}

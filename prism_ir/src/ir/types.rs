//! Value kinds and host type descriptors.
//!
//! Two layers of typing live here:
//!
//! - [`Kind`]: the closed set of result kinds a value-producing node carries.
//!   It decides which nodes may feed which slots (an allocation always
//!   produces [`Kind::Object`]).
//! - [`HostType`] / [`FieldDescriptor`]: the compiler's view of the
//!   classes being compiled. These are immutable once published and shared
//!   by reference ([`TypeRef`], [`FieldList`]) between nodes and graphs.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Kind
// =============================================================================

/// Result kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Boolean = 0,
    Byte = 1,
    Short = 2,
    Char = 3,
    Int = 4,
    Float = 5,
    Long = 6,
    Double = 7,
    /// Object reference.
    Object = 8,
    /// Machine word (raw pointer-sized value).
    Word = 9,
    /// No value; control-only nodes.
    Void = 10,
    /// Placeholder for an unset or invalid kind.
    Illegal = 11,
}

impl Kind {
    /// Check if this is a Java primitive kind.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        matches!(
            self,
            Kind::Boolean
                | Kind::Byte
                | Kind::Short
                | Kind::Char
                | Kind::Int
                | Kind::Float
                | Kind::Long
                | Kind::Double
        )
    }

    /// Check if this is an object reference.
    #[inline]
    pub const fn is_object(self) -> bool {
        matches!(self, Kind::Object)
    }

    /// Check if a node of this kind produces a value.
    #[inline]
    pub const fn is_value(self) -> bool {
        !matches!(self, Kind::Void | Kind::Illegal)
    }

    /// Single-character type code used in compact dumps.
    pub const fn type_char(self) -> char {
        match self {
            Kind::Boolean => 'z',
            Kind::Byte => 'b',
            Kind::Short => 's',
            Kind::Char => 'c',
            Kind::Int => 'i',
            Kind::Float => 'f',
            Kind::Long => 'l',
            Kind::Double => 'd',
            Kind::Object => 'a',
            Kind::Word => 'w',
            Kind::Void => 'v',
            Kind::Illegal => '-',
        }
    }

    /// Source-level name of the kind.
    pub const fn java_name(self) -> &'static str {
        match self {
            Kind::Boolean => "boolean",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Char => "char",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Long => "long",
            Kind::Double => "double",
            Kind::Object => "Object",
            Kind::Word => "word",
            Kind::Void => "void",
            Kind::Illegal => "illegal",
        }
    }

    /// Kind a value of this kind has once loaded.
    ///
    /// Sub-int kinds widen to `int`; every other kind is unchanged.
    #[inline]
    pub const fn stack_kind(self) -> Kind {
        match self {
            Kind::Byte | Kind::Short | Kind::Char => Kind::Int,
            other => other,
        }
    }

    /// The zero value a freshly allocated field of this kind holds.
    ///
    /// Sub-int kinds widen to an `int` zero, as the JVM stores them.
    pub const fn default_constant(self) -> Option<Constant> {
        match self {
            Kind::Boolean => Some(Constant::Boolean(false)),
            Kind::Byte | Kind::Short | Kind::Char | Kind::Int => Some(Constant::Int(0)),
            Kind::Float => Some(Constant::Float(0)),
            Kind::Long => Some(Constant::Long(0)),
            Kind::Double => Some(Constant::Double(0)),
            Kind::Object => Some(Constant::Null),
            Kind::Word | Kind::Void | Kind::Illegal => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.java_name())
    }
}

// =============================================================================
// Constant
// =============================================================================

/// A typed literal carried by a constant node.
///
/// Floating-point values are stored as raw bits so constants stay `Eq` and
/// `Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Boolean(bool),
    Null,
}

impl Constant {
    /// Build a float constant.
    pub fn float(value: f32) -> Self {
        Constant::Float(value.to_bits())
    }

    /// Build a double constant.
    pub fn double(value: f64) -> Self {
        Constant::Double(value.to_bits())
    }

    /// Kind of value this constant produces.
    pub const fn kind(self) -> Kind {
        match self {
            Constant::Int(_) => Kind::Int,
            Constant::Long(_) => Kind::Long,
            Constant::Float(_) => Kind::Float,
            Constant::Double(_) => Kind::Double,
            Constant::Boolean(_) => Kind::Boolean,
            Constant::Null => Kind::Object,
        }
    }

    /// Integral view, used for array lengths and indices.
    pub const fn as_int(self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(v as i64),
            Constant::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(bits) => write!(f, "{}f", f32::from_bits(*bits)),
            Constant::Double(bits) => write!(f, "{}d", f64::from_bits(*bits)),
            Constant::Boolean(v) => write!(f, "{v}"),
            Constant::Null => f.write_str("null"),
        }
    }
}

// =============================================================================
// Field Descriptors
// =============================================================================

/// One field of a host type, identified by name and offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// Declared field name.
    pub name: Arc<str>,
    /// Offset identifying the field within its holder.
    pub offset: u32,
    /// Declared kind of the field.
    pub kind: Kind,
}

impl FieldDescriptor {
    /// Create a field descriptor.
    pub fn new(name: impl Into<Arc<str>>, offset: u32, kind: Kind) -> Self {
        Self {
            name: name.into(),
            offset,
            kind,
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.name, self.kind, self.offset)
    }
}

/// Immutable, shareable list of field descriptors.
///
/// Cloning a `FieldList` shares the same allocation; use
/// [`Arc::ptr_eq`] to test whether two nodes share one list.
pub type FieldList = Arc<[FieldDescriptor]>;

// =============================================================================
// Host Types
// =============================================================================

/// Element description for array types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    /// Primitive element kind.
    Primitive(Kind),
    /// Reference elements of the given type.
    Reference(TypeRef),
}

impl ElementType {
    /// Kind stored in each element slot.
    pub fn kind(&self) -> Kind {
        match self {
            ElementType::Primitive(kind) => *kind,
            ElementType::Reference(_) => Kind::Object,
        }
    }
}

/// A class or array type as seen by the compiler.
#[derive(Debug, PartialEq, Eq)]
pub struct HostType {
    name: Arc<str>,
    fields: FieldList,
    element: Option<ElementType>,
}

/// Shared handle to a published [`HostType`].
pub type TypeRef = Arc<HostType>;

impl HostType {
    /// Describe an instance type with the given fields.
    pub fn instance(name: impl Into<Arc<str>>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into(),
            element: None,
        }
    }

    /// Describe an array type.
    pub fn array(element: ElementType) -> Self {
        let name: Arc<str> = match &element {
            ElementType::Primitive(kind) => format!("{}[]", kind.java_name()).into(),
            ElementType::Reference(ty) => format!("{}[]", ty.name()).into(),
        };
        Self {
            name,
            fields: Arc::from(Vec::new()),
            element: Some(element),
        }
    }

    /// Type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared instance fields (empty for arrays).
    #[inline]
    pub fn fields(&self) -> &FieldList {
        &self.fields
    }

    /// Element type if this is an array type.
    #[inline]
    pub fn element(&self) -> Option<&ElementType> {
        self.element.as_ref()
    }

    /// Check if this is an array type.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.element.is_some()
    }

    /// Position of the field with the given offset.
    pub fn field_index(&self, offset: u32) -> Option<usize> {
        self.fields.iter().position(|f| f.offset == offset)
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// Type Registry
// =============================================================================

/// A thread-safe registry of published host types.
///
/// Compilations running on different threads share one registry; the
/// types it hands out are immutable, so readers never need the lock past
/// the lookup itself.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<FxHashMap<Arc<str>, TypeRef>>,
}

impl TypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an instance type, or return the already-published one.
    ///
    /// Descriptors never change after publication, so a second registration
    /// under the same name does not replace the first.
    pub fn register_instance(&self, name: &str, fields: Vec<FieldDescriptor>) -> TypeRef {
        self.publish(HostType::instance(name, fields))
    }

    /// Publish an array type, or return the already-published one.
    pub fn register_array(&self, element: ElementType) -> TypeRef {
        self.publish(HostType::array(element))
    }

    fn publish(&self, ty: HostType) -> TypeRef {
        if let Some(existing) = self.types.read().get(ty.name()) {
            return Arc::clone(existing);
        }
        let mut types = self.types.write();
        let entry = types
            .entry(Arc::clone(&ty.name))
            .or_insert_with(|| Arc::new(ty));
        Arc::clone(entry)
    }

    /// Look up a type by name.
    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.types.read().get(name).cloned()
    }

    /// Number of published types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

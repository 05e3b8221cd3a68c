//! Assembly description consumed by the compiler
//!
//! Loading managed assemblies is left to external tooling. The compiler reads a
//! plain JSON description: types with their fields and methods, IL bodies and a
//! table mapping every 4-byte IL token to the entity it names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::TypeResult;
use crate::kind::VariableKind;
use crate::native::NativeMethod;
use crate::region::ExceptionRegion;

/// Identity of a method: declaring type, name and parameter type names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    /// Full name of the declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Parameter type names, receiver excluded
    #[serde(default)]
    pub signature: Vec<String>,
}

impl MethodKey {
    /// Create a key
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>, signature: Vec<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            signature,
        }
    }

    /// Split `Type::method` into its parts
    pub fn split_path(path: &str) -> Option<(&str, &str)> {
        let (ty, name) = path.rsplit_once("::")?;
        if ty.is_empty() || name.is_empty() {
            return None;
        }
        Some((ty, name))
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}({})", self.declaring_type, self.name, self.signature.join(", "))
    }
}

/// Named, typed parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name as declared
    pub name: String,
    /// Full type name
    #[serde(rename = "type")]
    pub ty: String,
}

/// Local variable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDef {
    /// Full type name
    #[serde(rename = "type")]
    pub ty: String,
}

/// Field of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Full type name
    #[serde(rename = "type")]
    pub ty: String,
    /// Lives in the static area
    #[serde(default)]
    pub is_static: bool,
}

fn default_void() -> String {
    "System.Void".to_string()
}

fn default_max_stack() -> u8 {
    8
}

/// Method of a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name; `.ctor` and `.cctor` for constructors
    pub name: String,
    /// Declared parameters, receiver excluded
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Return type name
    #[serde(default = "default_void")]
    pub return_type: String,
    /// Has no receiver
    #[serde(default)]
    pub is_static: bool,
    /// Virtual dispatch
    #[serde(default)]
    pub is_virtual: bool,
    /// No body
    #[serde(default)]
    pub is_abstract: bool,
    /// Holds the receiver's monitor for the call
    #[serde(default)]
    pub is_synchronized: bool,
    /// Number of generic parameters
    #[serde(default)]
    pub generic_arity: u8,
    /// Evaluation stack depth
    #[serde(default = "default_max_stack")]
    pub max_stack: u8,
    /// Local variable slots
    #[serde(default)]
    pub locals: Vec<LocalDef>,
    /// IL code
    #[serde(default)]
    pub body: Option<Vec<u8>>,
    /// Declared exception clauses, innermost first
    #[serde(default)]
    pub exception_clauses: Vec<ExceptionRegion>,
    /// Methods this one overrides or implements
    #[serde(default)]
    pub overrides: Vec<MethodKey>,
    /// Runtime services the body depends on (reflection, globalization, ...)
    #[serde(default)]
    pub requires_services: Vec<String>,
    /// Firmware operation implementing this method
    #[serde(default)]
    pub native: Option<NativeMethod>,
}

impl MethodDef {
    /// Instance constructor
    pub fn is_ctor(&self) -> bool {
        self.name == ".ctor"
    }

    /// Type initializer
    pub fn is_type_initializer(&self) -> bool {
        self.name == ".cctor"
    }

    /// Parameter type names
    pub fn signature(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }

    /// Parameter names
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Arguments including the receiver
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + usize::from(!self.is_static)
    }

    /// Whether the method returns nothing
    pub fn is_void(&self) -> bool {
        self.return_type == "System.Void"
    }
}

/// Type declared in the assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Full type name
    pub name: String,
    /// Parent type name
    #[serde(default)]
    pub parent: Option<String>,
    /// Instances are stored inline
    #[serde(default)]
    pub is_value_type: bool,
    /// Interface type
    #[serde(default)]
    pub is_interface: bool,
    /// Implemented interfaces
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Methods in declaration order
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Key of one of this type's methods
    pub fn method_key(&self, method: &MethodDef) -> MethodKey {
        MethodKey::new(&self.name, &method.name, method.signature())
    }

    /// Method matching a key's name and signature
    pub fn find_method(&self, name: &str, signature: &[String]) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameters.len() == signature.len() && m.signature() == signature)
    }
}

/// Entity named by an IL token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum MetadataRef {
    /// Type reference
    Type {
        /// Full type name
        name: String,
    },
    /// Method reference
    Method {
        /// Method identity
        #[serde(flatten)]
        key: MethodKey,
    },
    /// Field reference
    Field {
        /// Declaring type
        declaring_type: String,
        /// Field name
        name: String,
    },
    /// String literal
    String {
        /// Literal text
        value: String,
    },
}

/// Assembly description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    /// Assembly name
    pub name: String,
    /// Declared types
    #[serde(default)]
    pub types: Vec<TypeDef>,
    /// IL token table
    #[serde(default)]
    pub tokens: BTreeMap<u32, MetadataRef>,
}

impl Assembly {
    /// Parse a JSON description
    pub fn from_json(text: &str) -> TypeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Type by full name
    pub fn find_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Method by key
    pub fn find_method(&self, key: &MethodKey) -> Option<(&TypeDef, &MethodDef)> {
        let ty = self.find_type(&key.declaring_type)?;
        let method = ty.find_method(&key.name, &key.signature)?;
        Some((ty, method))
    }

    /// First method with the given `Type::name` path
    pub fn find_method_by_path(&self, path: &str) -> Option<MethodKey> {
        let (ty_name, name) = MethodKey::split_path(path)?;
        let ty = self.find_type(ty_name)?;
        let method = ty.methods.iter().find(|m| m.name == name)?;
        Some(ty.method_key(method))
    }

    /// Entity named by an IL token
    pub fn resolve_token(&self, token: u32) -> Option<&MetadataRef> {
        self.tokens.get(&token)
    }

    /// Parent type name, if declared
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.find_type(name)?.parent.as_deref()
    }

    /// Slot tag and storage size of a value of the named type
    pub fn layout_of(&self, type_name: &str) -> (VariableKind, u16) {
        if let Some(element) = type_name.strip_suffix("[]") {
            let element_is_value = VariableKind::for_primitive(element).is_some()
                || self.find_type(element).is_some_and(|t| t.is_value_type);
            let kind = if element_is_value {
                VariableKind::ValueArray
            } else {
                VariableKind::ReferenceArray
            };
            return (kind, 4);
        }
        if let Some(kind) = VariableKind::for_primitive(type_name) {
            return (kind, kind.slot_size() as u16);
        }
        match self.find_type(type_name) {
            Some(ty) if ty.is_value_type => {
                let size = self.instance_size(type_name);
                if size <= 4 {
                    (VariableKind::Uint32, 4)
                } else {
                    (VariableKind::LargeValueType, size.min(u32::from(u16::MAX)) as u16)
                }
            }
            _ => (VariableKind::Object, 4),
        }
    }

    /// Bytes of instance data, parent fields included
    pub fn instance_size(&self, type_name: &str) -> u32 {
        let mut total = 0u32;
        let mut current = self.find_type(type_name);
        let mut depth = 0;
        while let Some(ty) = current {
            for field in ty.fields.iter().filter(|f| !f.is_static) {
                total += u32::from(self.field_size(&field.ty));
            }
            depth += 1;
            // Cyclic parent chains end the walk
            if depth > 64 {
                break;
            }
            current = ty.parent.as_deref().and_then(|p| self.find_type(p));
        }
        total
    }

    /// Bytes of static data declared directly on a type
    pub fn static_size(&self, type_name: &str) -> u32 {
        self.find_type(type_name)
            .map(|ty| {
                ty.fields
                    .iter()
                    .filter(|f| f.is_static)
                    .map(|f| u32::from(self.field_size(&f.ty)))
                    .sum()
            })
            .unwrap_or(0)
    }

    fn field_size(&self, type_name: &str) -> u16 {
        if VariableKind::for_primitive(type_name).is_some() || type_name.ends_with("[]") {
            return self.layout_of(type_name).1;
        }
        match self.find_type(type_name) {
            Some(ty) if ty.is_value_type => {
                // Value types nested in themselves are malformed; size them as a slot
                let size = ty
                    .fields
                    .iter()
                    .filter(|f| !f.is_static && f.ty != type_name)
                    .map(|f| u32::from(self.field_size(&f.ty)))
                    .sum::<u32>();
                size.clamp(4, u32::from(u16::MAX)) as u16
            }
            _ => 4,
        }
    }
}

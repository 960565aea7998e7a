//! Per-function symbol table and per-unit struct registry.

use crate::language::{
    ast::FieldDef,
    errors::{CompileError, SymbolKind},
    types::{TypeKeyword, TypeTag},
};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, PartialEq)]
pub struct Binding<S> {
    pub slot: S,
    pub tag: TypeTag,
}

/// Flat, function-scoped mapping from identifiers to storage slots.
///
/// Iteration is ordered by name so anything derived from the table (such as
/// captured environments) is laid out deterministically.
#[derive(Clone, Debug)]
pub struct SymbolTable<S> {
    bindings: BTreeMap<String, Binding<S>>,
}

impl<S> Default for SymbolTable<S> {
    fn default() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }
}

impl<S> SymbolTable<S> {
    pub fn begin_function(&mut self) {
        self.bindings.clear();
    }

    pub fn ensure_undefined(&self, name: &str) -> Result<(), CompileError> {
        if self.bindings.contains_key(name) {
            return Err(CompileError::Redefinition {
                kind: SymbolKind::Variable,
                name: name.into(),
            });
        }
        Ok(())
    }

    pub fn define(&mut self, name: &str, slot: S, tag: TypeTag) -> Result<(), CompileError> {
        self.ensure_undefined(name)?;
        self.bindings.insert(name.into(), Binding { slot, tag });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Binding<S>, CompileError> {
        self.bindings.get(name).ok_or_else(|| CompileError::Undeclared {
            kind: SymbolKind::Variable,
            name: name.into(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding<S>)> {
        self.bindings.iter().map(|(name, binding)| (name.as_str(), binding))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub tag: TypeTag,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl StructDescriptor {
    pub fn field(&self, field: &str) -> Result<(u32, &TypeTag), CompileError> {
        self.fields
            .iter()
            .position(|candidate| candidate.name == field)
            .map(|index| (index as u32, &self.fields[index].tag))
            .ok_or_else(|| CompileError::UnknownField {
                structure: self.name.clone(),
                field: field.into(),
            })
    }
}

/// Struct layouts for one compilation unit; entries live until the unit ends.
#[derive(Clone, Debug, Default)]
pub struct StructRegistry {
    structs: HashMap<String, StructDescriptor>,
}

impl StructRegistry {
    pub fn resolve_struct(&self, name: &str) -> Result<&StructDescriptor, CompileError> {
        self.structs.get(name).ok_or_else(|| CompileError::Undeclared {
            kind: SymbolKind::Struct,
            name: name.into(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    /// Map a type keyword onto a tag. `void` is returned as-is; callers that
    /// cannot hold a void reject it themselves.
    pub fn resolve_type(&self, keyword: &str) -> Result<TypeTag, CompileError> {
        self.resolve_type_within(keyword, None)
    }

    fn resolve_type_within(
        &self,
        keyword: &str,
        defining: Option<&str>,
    ) -> Result<TypeTag, CompileError> {
        let parsed = TypeKeyword::parse(keyword);
        if parsed.pointer_depth > 1 {
            return Err(CompileError::UnsupportedType {
                keyword: keyword.into(),
            });
        }
        let base = match parsed.builtin() {
            Some(TypeTag::Void) if parsed.pointer_depth > 0 => {
                return Err(CompileError::UnsupportedType {
                    keyword: keyword.into(),
                });
            }
            Some(tag) => tag,
            None if defining == Some(parsed.base) => TypeTag::Struct(parsed.base.into()),
            None => {
                self.resolve_struct(parsed.base)?;
                TypeTag::Struct(parsed.base.into())
            }
        };
        if parsed.pointer_depth == 1 {
            Ok(TypeTag::pointer_to(base))
        } else {
            Ok(base)
        }
    }

    /// Validate and record a struct. Field types must already be known, except
    /// for pointers back to the struct being defined.
    pub fn register(&mut self, name: &str, fields: &[FieldDef]) -> Result<&StructDescriptor, CompileError> {
        if self.structs.contains_key(name) {
            return Err(CompileError::Redefinition {
                kind: SymbolKind::Struct,
                name: name.into(),
            });
        }
        let mut descriptors: Vec<FieldDescriptor> = Vec::with_capacity(fields.len());
        for field in fields {
            if descriptors.iter().any(|existing| existing.name == field.name) {
                return Err(CompileError::Redefinition {
                    kind: SymbolKind::Field,
                    name: format!("{name}.{}", field.name),
                });
            }
            let tag = self.resolve_type_within(&field.ty, Some(name))?;
            match &tag {
                TypeTag::Void => {
                    return Err(CompileError::VoidNotAllowed {
                        context: format!("field `{}`", field.name),
                    });
                }
                TypeTag::Struct(inner) if inner == name => {
                    return Err(CompileError::RecursiveStruct {
                        name: name.into(),
                        field: field.name.clone(),
                    });
                }
                _ => {}
            }
            descriptors.push(FieldDescriptor {
                name: field.name.clone(),
                tag,
            });
        }
        let descriptor = StructDescriptor {
            name: name.into(),
            fields: descriptors,
        };
        Ok(&*self.structs.entry(name.into()).or_insert(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::StructDef;

    #[test]
    fn redefinition_in_one_function_is_rejected() {
        let mut table = SymbolTable::default();
        table.define("x", 0_u32, TypeTag::Integer64).unwrap();
        let err = table.define("x", 1, TypeTag::Float64).unwrap_err();
        assert_eq!(
            err,
            CompileError::Redefinition {
                kind: SymbolKind::Variable,
                name: "x".into()
            }
        );
        assert_eq!(table.lookup("x").unwrap().slot, 0);
    }

    #[test]
    fn beginning_a_function_clears_the_scope() {
        let mut table = SymbolTable::default();
        table.define("x", 0_u32, TypeTag::Integer64).unwrap();
        table.begin_function();
        assert!(table.is_empty());
        assert!(table.lookup("x").is_err());
        table.define("x", 3, TypeTag::Float64).unwrap();
        assert_eq!(table.lookup("x").unwrap().tag, TypeTag::Float64);
    }

    #[test]
    fn iteration_is_name_ordered() {
        let mut table = SymbolTable::default();
        table.define("zeta", 0_u32, TypeTag::Integer64).unwrap();
        table.define("alpha", 1, TypeTag::Integer64).unwrap();
        let names: Vec<_> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn structs_may_point_to_themselves() {
        let mut registry = StructRegistry::default();
        let node = StructDef::new("Node", &[("int", "value"), ("Node*", "next")]);
        let descriptor = registry.register(&node.name, &node.fields).unwrap();
        assert_eq!(
            descriptor.fields[1].tag,
            TypeTag::pointer_to(TypeTag::Struct("Node".into()))
        );
        assert_eq!(registry.resolve_type("Node*").unwrap().struct_name(), Some("Node"));
    }

    #[test]
    fn by_value_self_reference_is_rejected() {
        let mut registry = StructRegistry::default();
        let bad = StructDef::new("Loop", &[("Loop", "inner")]);
        let err = registry.register(&bad.name, &bad.fields).unwrap_err();
        assert!(matches!(err, CompileError::RecursiveStruct { .. }));
        assert!(!registry.contains("Loop"));
    }

    #[test]
    fn fields_must_reference_known_structs() {
        let mut registry = StructRegistry::default();
        let line = StructDef::new("Line", &[("Point", "start")]);
        let err = registry.register(&line.name, &line.fields).unwrap_err();
        assert_eq!(
            err,
            CompileError::Undeclared {
                kind: SymbolKind::Struct,
                name: "Point".into()
            }
        );

        let point = StructDef::new("Point", &[("int", "x"), ("int", "y")]);
        registry.register(&point.name, &point.fields).unwrap();
        let descriptor = registry.register(&line.name, &line.fields).unwrap();
        assert_eq!(descriptor.fields[0].tag, TypeTag::Struct("Point".into()));
    }

    #[test]
    fn field_lookup_reports_offsets() {
        let mut registry = StructRegistry::default();
        let point = StructDef::new("Point", &[("int", "x"), ("float", "y")]);
        registry.register(&point.name, &point.fields).unwrap();
        let descriptor = registry.resolve_struct("Point").unwrap();
        assert_eq!(descriptor.field("y").unwrap(), (1, &TypeTag::Float64));
        assert!(matches!(
            descriptor.field("z"),
            Err(CompileError::UnknownField { .. })
        ));
    }

    #[test]
    fn type_keywords_resolve_builtins_and_reject_odd_shapes() {
        let registry = StructRegistry::default();
        assert_eq!(registry.resolve_type("float").unwrap(), TypeTag::Float64);
        assert_eq!(
            registry.resolve_type("int*").unwrap(),
            TypeTag::pointer_to(TypeTag::Integer64)
        );
        assert_eq!(registry.resolve_type("void").unwrap(), TypeTag::Void);
        assert!(registry.resolve_type("void*").is_err());
        assert!(registry.resolve_type("int**").is_err());
        assert!(registry.resolve_type("Missing").is_err());
    }
}

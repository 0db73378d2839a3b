//! Class metadata, instance layout and FNV-1a property hashing
//! (spec §4.6), grounded on `class_system_performance.h`.

use rustc_hash::FxHashMap;

use ultrascript_sdk::DataType;

use crate::parser::ast::ClassDecl;

const FNV_OFFSET_BASIS_32: u32 = 0x811C_9DC5;
const FNV_PRIME_32: u32 = 0x0100_0193;

/// FNV-1a 32-bit hash, used for both static property offsets and the
/// dynamic-property fallback path (spec §3 "Property hashing").
pub fn hash_property_name(name: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// First user-assigned type id; ids below this are reserved for built-in
/// object kinds (spec §3 "ObjectTypeId").
pub const USER_CLASS_TYPE_ID_BASE: u32 = 1000;

/// Fixed 12-byte header every class instance starts with (spec §3
/// "Instance header layout"): `type_id:u32 | ref_count:u32 |
/// property_count:u16 | flags:u16`.
pub const INSTANCE_HEADER_SIZE: u64 = 12;

#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub name_hash: u32,
    pub data_type: DataType,
    pub offset: u64,
    pub is_static: bool,
}

/// Layout and method table for one declared class.
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    pub name: String,
    pub type_id: u32,
    pub parent: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub property_hash_to_index: FxHashMap<u32, u16>,
    pub instance_size: u64,
    pub has_constructor: bool,
    pub method_names: Vec<String>,
    /// Mangled label of this class's constructor, if it has one — same
    /// `__fn_{scope_id}_{name}` scheme `FunctionCompilationManager` uses,
    /// recomputed here since a constructor's name ("constructor") is
    /// always real, never anonymized.
    pub constructor_function_name: Option<String>,
    /// Method name to mangled label, for `super.method(...)` dispatch.
    pub method_function_names: FxHashMap<String, String>,
}

impl ClassMetadata {
    pub fn find_property_by_hash(&self, hash: u32) -> Option<&PropertyDescriptor> {
        self.property_hash_to_index
            .get(&hash)
            .and_then(|idx| self.properties.get(*idx as usize))
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.find_property_by_hash(hash_property_name(name))
    }
}

/// Assigns type ids and packs instance layout for every declared class
/// (spec §4.6 "ClassRegistry").
pub struct ClassRegistry {
    classes: FxHashMap<String, ClassMetadata>,
    next_type_id: u32,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self { classes: FxHashMap::default(), next_type_id: USER_CLASS_TYPE_ID_BASE }
    }

    /// Register `decl`, packing its own fields after its parent's (parent
    /// must already be registered — classes are declared in source order
    /// and `extends` can only name a previously-declared class).
    pub fn register(&mut self, decl: &ClassDecl) -> u32 {
        let type_id = self.next_type_id;
        self.next_type_id += 1;

        let parent_meta = decl.parent.as_ref().and_then(|p| self.classes.get(p));
        let mut offset = parent_meta.map(|p| p.instance_size).unwrap_or(INSTANCE_HEADER_SIZE);
        let mut properties: Vec<PropertyDescriptor> = parent_meta.map(|p| p.properties.clone()).unwrap_or_default();
        let mut hash_to_index: FxHashMap<u32, u16> =
            parent_meta.map(|p| p.property_hash_to_index.clone()).unwrap_or_default();

        for field in &decl.fields {
            let data_type = field.declared_type.unwrap_or(DataType::Any);
            let align = data_type.alignment().max(1) as u64;
            offset = (offset + align - 1) / align * align;
            let hash = hash_property_name(&field.name);
            let index = properties.len() as u16;
            properties.push(PropertyDescriptor {
                name: field.name.clone(),
                name_hash: hash,
                data_type,
                offset,
                is_static: field.is_static,
            });
            hash_to_index.insert(hash, index);
            offset += data_type.size_bytes().max(1) as u64;
        }

        let instance_size = (offset + 7) / 8 * 8;
        let method_names = decl.methods.iter().map(|m| m.name.clone()).collect();

        let constructor_function_name =
            decl.constructor.as_ref().and_then(|c| c.scope_id.borrow().map(|id| format!("__fn_{}_constructor", id.0)));
        let mut method_function_names = FxHashMap::default();
        for m in &decl.methods {
            if let Some(id) = *m.function.scope_id.borrow() {
                method_function_names.insert(m.name.clone(), format!("__fn_{}_{}", id.0, m.name));
            }
        }

        self.classes.insert(
            decl.name.clone(),
            ClassMetadata {
                name: decl.name.clone(),
                type_id,
                parent: decl.parent.clone(),
                properties,
                property_hash_to_index: hash_to_index,
                instance_size,
                has_constructor: decl.constructor.is_some(),
                method_names,
                constructor_function_name,
                method_function_names,
            },
        );
        type_id
    }

    pub fn get(&self, name: &str) -> Option<&ClassMetadata> {
        self.classes.get(name)
    }

    pub fn get_by_type_id(&self, type_id: u32) -> Option<&ClassMetadata> {
        self.classes.values().find(|c| c.type_id == type_id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn inherits_from(&self, class_name: &str, ancestor_name: &str) -> bool {
        let mut current = self.classes.get(class_name);
        while let Some(meta) = current {
            if meta.name == ancestor_name {
                return true;
            }
            current = meta.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        false
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_known_anchors() {
        assert_eq!(hash_property_name(""), 0x811C_9DC5);
    }

    #[test]
    fn fnv1a_is_deterministic_and_distinguishes_names() {
        assert_eq!(hash_property_name("age"), hash_property_name("age"));
        assert_ne!(hash_property_name("age"), hash_property_name("name"));
    }

    #[test]
    fn first_user_class_gets_base_type_id() {
        let mut registry = ClassRegistry::new();
        let decl = ClassDecl {
            name: "Point".into(),
            parent: None,
            fields: vec![],
            constructor: None,
            methods: vec![],
            operator_overloads: vec![],
            span: ultrascript_sdk::Span::synthetic(),
        };
        let id = registry.register(&decl);
        assert_eq!(id, USER_CLASS_TYPE_ID_BASE);
    }

    #[test]
    fn subclass_inherits_parent_properties() {
        use crate::parser::ast::ClassField;
        let mut registry = ClassRegistry::new();
        let base = ClassDecl {
            name: "Animal".into(),
            parent: None,
            fields: vec![ClassField { name: "age".into(), declared_type: Some(DataType::Int32), default_value: None, is_static: false }],
            constructor: None,
            methods: vec![],
            operator_overloads: vec![],
            span: ultrascript_sdk::Span::synthetic(),
        };
        registry.register(&base);
        let derived = ClassDecl {
            name: "Dog".into(),
            parent: Some("Animal".into()),
            fields: vec![ClassField { name: "breed".into(), declared_type: Some(DataType::String), default_value: None, is_static: false }],
            constructor: None,
            methods: vec![],
            operator_overloads: vec![],
            span: ultrascript_sdk::Span::synthetic(),
        };
        registry.register(&derived);
        let meta = registry.get("Dog").unwrap();
        assert!(meta.find_property("age").is_some());
        assert!(meta.find_property("breed").is_some());
        assert!(registry.inherits_from("Dog", "Animal"));
    }
}

//! Type descriptors: the introspected field table a [`Builder`](crate::Builder) plans against.
//!
//! A descriptor is compiled once per root shape. It walks the shape's
//! `Def`/`Type` metadata and records, for every reachable type, whether it is
//! a struct (and which of its fields are selectable), a wrapper around another
//! type (option, smart pointer, list/array/slice), or opaque.
//!
//! Nodes live in an indextree arena. Each distinct type gets one node. When a
//! type is reached again while it is still being compiled (a recursive type),
//! a [`NodeKind::BackRef`] to the in-progress node is emitted instead of
//! recursing, so self-referential and mutually referential types terminate.
//!
//! Fields of a `#[facet(flatten)]` struct field are inlined into the parent's
//! field table, matching how the serialized form presents them.

use alloc::vec;
use alloc::vec::Vec;

use facet_core::{ConstTypeId, Def, FieldFlags, Shape, StructKind, Type, UserType};
use hashbrown::HashMap;
use indextree::Arena;

/// Handle to a node in a [`TypeDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(indextree::NodeId);

/// Introspected field table for one root shape and every type reachable from it.
#[derive(Debug)]
pub struct TypeDescriptor {
    arena: Arena<TypeNode>,
    root: NodeId,
}

/// One type in a [`TypeDescriptor`].
#[derive(Debug)]
pub struct TypeNode {
    /// The shape this node was built from
    pub shape: &'static Shape,
    /// How fields are selected through this type
    pub kind: NodeKind,
}

/// What a type looks like to field selection.
#[derive(Debug)]
pub enum NodeKind {
    /// No selectable fields: scalars, maps, sets, enums, tuple structs.
    Opaque,
    /// A struct with named fields.
    Struct(StructNode),
    /// `Option<T>`, pointing at `T`.
    Option(NodeId),
    /// A smart pointer with a known pointee.
    Pointer(NodeId),
    /// A list, array, or slice, pointing at the element type.
    Sequence(NodeId),
    /// A type that was still being compiled when it was reached again.
    BackRef(NodeId),
}

/// The selectable fields of a struct, in declaration order.
#[derive(Debug)]
pub struct StructNode {
    /// Fields that survive serialization, in declaration order
    pub fields: Vec<FieldNode>,
}

/// A selectable struct field.
#[derive(Debug, Clone)]
pub struct FieldNode {
    /// External name: the `rename` if present, else the identifier
    pub name: &'static str,
    /// Field indices from this struct down to the field, as used by
    /// `PeekStruct::field`. Longer than one for fields inlined from a
    /// flattened struct.
    pub path: Vec<usize>,
    /// Node describing the field's type
    pub node: NodeId,
}

impl StructNode {
    /// Looks up a field by external name.
    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl TypeDescriptor {
    /// Compiles the descriptor for `shape`.
    pub fn compile(shape: &'static Shape) -> Self {
        let mut compiler = DescriptorCompiler::default();
        let root = compiler.node(shape);
        Self {
            arena: compiler.arena,
            root,
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root shape.
    pub fn shape(&self) -> &'static Shape {
        self.arena[self.root.0].get().shape
    }

    /// Get a node by id.
    pub fn get(&self, id: NodeId) -> Option<&TypeNode> {
        self.arena.get(id.0).map(|node| node.get())
    }

    /// Number of nodes, back references included.
    pub fn len(&self) -> usize {
        self.arena.count()
    }

    /// Always false: a descriptor has at least its root.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Follows a back reference to the node it stands for.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        match self.get(id).map(|node| &node.kind) {
            Some(NodeKind::BackRef(target)) => *target,
            _ => id,
        }
    }

    /// Follows option, pointer, and sequence wrappers until a struct is
    /// reached. Returns `None` if the chain ends at an opaque type.
    pub fn struct_target(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.resolve(id);
        // a wrapper chain can't visit more nodes than exist
        for _ in 0..=self.len() {
            match &self.get(current)?.kind {
                NodeKind::Struct(_) => return Some(current),
                NodeKind::Option(inner) | NodeKind::Pointer(inner) | NodeKind::Sequence(inner) => {
                    current = self.resolve(*inner);
                }
                NodeKind::Opaque | NodeKind::BackRef(_) => return None,
            }
        }
        None
    }

    /// The struct reached from `id`, if any.
    pub fn as_struct(&self, id: NodeId) -> Option<&StructNode> {
        let target = self.struct_target(id)?;
        match &self.get(target)?.kind {
            NodeKind::Struct(node) => Some(node),
            _ => None,
        }
    }

    /// Looks up a field by external name in the struct reached from `id`.
    pub fn field(&self, id: NodeId, name: &str) -> Option<&FieldNode> {
        self.as_struct(id)?.field(name)
    }
}

#[derive(Default)]
struct DescriptorCompiler {
    arena: Arena<TypeNode>,
    /// Types whose node is complete
    built: HashMap<ConstTypeId, NodeId>,
    /// Types currently being compiled (ancestors on the call stack)
    building: HashMap<ConstTypeId, NodeId>,
}

impl DescriptorCompiler {
    fn node(&mut self, shape: &'static Shape) -> NodeId {
        let type_id = shape.id;

        if let Some(&existing) = self.built.get(&type_id) {
            return existing;
        }

        if let Some(&in_progress) = self.building.get(&type_id) {
            return NodeId(self.arena.new_node(TypeNode {
                shape,
                kind: NodeKind::BackRef(in_progress),
            }));
        }

        // Placeholder, replaced once the children are compiled
        let node_id = NodeId(self.arena.new_node(TypeNode {
            shape,
            kind: NodeKind::Opaque,
        }));
        self.building.insert(type_id, node_id);

        let kind = self.kind(shape);
        if let Some(node) = self.arena.get_mut(node_id.0) {
            node.get_mut().kind = kind;
        }

        self.building.remove(&type_id);
        self.built.insert(type_id, node_id);
        node_id
    }

    fn kind(&mut self, shape: &'static Shape) -> NodeKind {
        match shape.def {
            Def::Option(def) => return NodeKind::Option(self.node(def.t())),
            Def::Pointer(def) => {
                if let Some(pointee) = def.pointee() {
                    return NodeKind::Pointer(self.node(pointee));
                }
            }
            Def::List(def) => return NodeKind::Sequence(self.node(def.t())),
            Def::Array(def) => return NodeKind::Sequence(self.node(def.t())),
            Def::Slice(def) => return NodeKind::Sequence(self.node(def.t())),
            _ => {}
        }

        if let Type::User(UserType::Struct(struct_type)) = shape.ty
            && struct_type.kind == StructKind::Struct
        {
            let mut fields = Vec::with_capacity(struct_type.fields.len());
            for (index, field) in struct_type.fields.iter().enumerate() {
                if field.flags.contains(FieldFlags::SKIP)
                    || field.flags.contains(FieldFlags::SKIP_SERIALIZING)
                {
                    continue;
                }
                let node = self.node(field.shape());
                if field.is_flattened() {
                    self.inline_flattened(index, node, &mut fields);
                    continue;
                }
                fields.push(FieldNode {
                    name: field.rename.unwrap_or(field.name),
                    path: vec![index],
                    node,
                });
            }
            return NodeKind::Struct(StructNode { fields });
        }

        NodeKind::Opaque
    }

    /// Appends the fields of the flattened struct at `node`, reached through
    /// field `index`. Flattened enums, maps, and options have no fixed field
    /// names and are left out.
    fn inline_flattened(&self, index: usize, node: NodeId, fields: &mut Vec<FieldNode>) {
        let Some(NodeKind::Struct(inner)) = self.arena.get(node.0).map(|n| &n.get().kind) else {
            return;
        };
        for child in &inner.fields {
            let mut path = Vec::with_capacity(child.path.len() + 1);
            path.push(index);
            path.extend_from_slice(&child.path);
            fields.push(FieldNode {
                name: child.name,
                path,
                node: child.node,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::vec;
    use facet::Facet;

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Inner {
        value: u32,
    }

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Outer {
        #[facet(rename = "displayName")]
        name: String,
        #[facet(skip_serializing)]
        secret: String,
        first: Inner,
        second: Option<Inner>,
        many: Vec<Inner>,
    }

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Tree {
        label: String,
        #[facet(recursive_type)]
        children: Vec<Tree>,
        #[facet(recursive_type)]
        parent: Option<Box<Tree>>,
    }

    #[test]
    fn struct_fields_use_external_names_and_skip_hidden() {
        let desc = TypeDescriptor::compile(Outer::SHAPE);
        let root = desc.as_struct(desc.root()).unwrap();
        let names: Vec<_> = root.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["displayName", "first", "second", "many"]);
        assert!(root.field("name").is_none());
        assert!(root.field("secret").is_none());
        // indices still point into the declared fields
        assert_eq!(root.field("first").unwrap().path, [2]);
    }

    #[test]
    fn one_node_per_type() {
        let desc = TypeDescriptor::compile(Outer::SHAPE);
        let root = desc.root();
        let first = desc.field(root, "first").unwrap().node;
        let second = desc.field(root, "second").unwrap().node;
        let many = desc.field(root, "many").unwrap().node;
        assert_eq!(desc.struct_target(second), Some(first));
        assert_eq!(desc.struct_target(many), Some(first));
    }

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Audit {
        created: u64,
        #[facet(flatten)]
        inner: Inner,
    }

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Record {
        id: u64,
        #[facet(flatten)]
        audit: Audit,
    }

    #[test]
    fn flattened_fields_are_inlined() {
        let desc = TypeDescriptor::compile(Record::SHAPE);
        let root = desc.as_struct(desc.root()).unwrap();
        let names: Vec<_> = root.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["id", "created", "value"]);
        assert!(root.field("audit").is_none());
        assert_eq!(root.field("created").unwrap().path, [1, 0]);
        assert_eq!(root.field("value").unwrap().path, [1, 1, 0]);
    }

    #[test]
    fn recursive_types_terminate() {
        let desc = TypeDescriptor::compile(Tree::SHAPE);
        let root = desc.root();
        let children = desc.field(root, "children").unwrap().node;
        assert_eq!(desc.struct_target(children), Some(root));
        let parent = desc.field(root, "parent").unwrap().node;
        assert_eq!(desc.struct_target(parent), Some(root));
        // nested lookups walk back through the same node
        let grandchild = desc.field(children, "children").unwrap().node;
        assert_eq!(desc.struct_target(grandchild), Some(root));
    }

    #[test]
    fn wrappers_reach_the_struct() {
        let desc = TypeDescriptor::compile(<Vec<Option<Box<Inner>>>>::SHAPE);
        let target = desc.struct_target(desc.root()).unwrap();
        assert_eq!(desc.get(target).unwrap().shape.id, Inner::SHAPE.id);
        assert!(desc.field(desc.root(), "value").is_some());
    }

    #[test]
    fn scalars_are_opaque() {
        let desc = TypeDescriptor::compile(u32::SHAPE);
        assert!(matches!(desc.get(desc.root()).unwrap().kind, NodeKind::Opaque));
        assert_eq!(desc.struct_target(desc.root()), None);

        let desc = TypeDescriptor::compile(<Vec<String>>::SHAPE);
        assert_eq!(desc.struct_target(desc.root()), None);
    }
}

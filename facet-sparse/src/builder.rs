use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use facet_core::Shape;
use indexmap::IndexMap;

use crate::descriptor::{NodeId, NodeKind, StructNode, TypeDescriptor};
use crate::formatter::{Action, Projection, Step};
use crate::{FormatError, Formatter, debug};

/// A reusable plan for one type that turns field lists into [`Formatter`]s.
///
/// Compiling a builder introspects the type once. Every later
/// [`build`](Self::build) only intersects a field list with the recorded
/// descriptor.
#[derive(Debug)]
pub struct Builder {
    descriptor: TypeDescriptor,
}

/// The paths that share a first segment.
#[derive(Default)]
struct Group<'a> {
    /// First full path seen for this segment, for error messages
    first_path: &'a str,
    /// Whether the segment was requested on its own
    bare: bool,
    /// What follows the first dot, for each dotted path
    rest: Vec<&'a str>,
}

impl Builder {
    /// Introspects `shape`.
    ///
    /// Fails with [`FormatError::UnsupportedType`] unless the shape is a
    /// struct with named fields, or reaches one through option, pointer, or
    /// sequence wrappers.
    pub fn compile(shape: &'static Shape) -> Result<Self, FormatError> {
        let descriptor = TypeDescriptor::compile(shape);
        if descriptor.struct_target(descriptor.root()).is_none() {
            debug!(%shape, "rejecting shape with no struct to select from");
            return Err(FormatError::UnsupportedType { shape });
        }
        debug!(%shape, nodes = descriptor.len(), "compiled builder");
        Ok(Self { descriptor })
    }

    /// The shape this builder was compiled for.
    pub fn shape(&self) -> &'static Shape {
        self.descriptor.shape()
    }

    /// The introspected descriptor.
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Builds a formatter that keeps exactly `fields`.
    ///
    /// `prefix` is prepended to paths in [`FormatError::FieldNotFound`], for
    /// callers building a formatter for a value nested inside a larger
    /// request. Pass `""` otherwise.
    ///
    /// Fields are emitted in order of first appearance of their first segment.
    /// An empty list yields a formatter that emits empty objects.
    pub fn build<S: AsRef<str>>(
        &self,
        fields: &[S],
        prefix: &str,
    ) -> Result<Formatter, FormatError> {
        let paths: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
        let prefix = if prefix.is_empty() || prefix.ends_with('.') {
            String::from(prefix)
        } else {
            format!("{prefix}.")
        };

        let projection = self.project(self.descriptor.root(), &paths, &prefix)?;
        Ok(Formatter::new(
            self.shape(),
            projection,
            paths.into_iter().map(String::from).collect(),
        ))
    }

    fn project(&self, id: NodeId, paths: &[&str], prefix: &str) -> Result<Projection, FormatError> {
        let id = self.descriptor.resolve(id);
        let Some(node) = self.descriptor.get(id) else {
            // every id handed out by the descriptor is live
            return Err(FormatError::UnsupportedType {
                shape: self.shape(),
            });
        };

        match &node.kind {
            NodeKind::Struct(struct_node) => {
                self.project_struct(node.shape, struct_node, paths, prefix)
            }
            NodeKind::Option(inner) => Ok(Projection::Option(Box::new(
                self.project(*inner, paths, prefix)?,
            ))),
            NodeKind::Pointer(inner) => Ok(Projection::Pointer(Box::new(
                self.project(*inner, paths, prefix)?,
            ))),
            NodeKind::Sequence(inner) => Ok(Projection::Sequence(Box::new(
                self.project(*inner, paths, prefix)?,
            ))),
            NodeKind::Opaque | NodeKind::BackRef(_) => {
                let path = paths.first().copied().unwrap_or_default();
                let segment = path.split('.').next().unwrap_or_default();
                Err(FormatError::not_found(
                    &format!("{prefix}{path}"),
                    segment,
                    node.shape,
                ))
            }
        }
    }

    fn project_struct(
        &self,
        shape: &'static Shape,
        struct_node: &StructNode,
        paths: &[&str],
        prefix: &str,
    ) -> Result<Projection, FormatError> {
        let mut groups: IndexMap<&str, Group<'_>> = IndexMap::with_capacity(paths.len());
        for &path in paths {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let group = groups.entry(head).or_insert_with(|| Group {
                first_path: path,
                ..Group::default()
            });
            match rest {
                Some(rest) => group.rest.push(rest),
                None => group.bare = true,
            }
        }

        let mut steps = Vec::with_capacity(groups.len());
        for (head, group) in groups {
            let Some(field) = struct_node.field(head) else {
                return Err(FormatError::not_found(
                    &format!("{prefix}{}", group.first_path),
                    head,
                    shape,
                ));
            };

            let nested = if group.rest.is_empty() {
                None
            } else {
                if self.descriptor.struct_target(field.node).is_none() {
                    let rest = group.rest[0];
                    let segment = rest.split('.').next().unwrap_or_default();
                    let field_shape = self
                        .descriptor
                        .get(field.node)
                        .map_or(shape, |node| node.shape);
                    return Err(FormatError::not_found(
                        &format!("{prefix}{head}.{rest}"),
                        segment,
                        field_shape,
                    ));
                }
                let nested_prefix = format!("{prefix}{head}.");
                Some(self.project(field.node, &group.rest, &nested_prefix)?)
            };

            // a bare selection copies the whole branch, even if dotted paths
            // into it were requested too
            let action = match nested {
                Some(projection) if !group.bare => Action::Project(projection),
                _ => Action::Copy,
            };

            steps.push(Step {
                key: field.name,
                path: field.path.clone(),
                action,
            });
        }

        Ok(Projection::Struct(steps))
    }
}

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use facet_core::Shape;
use facet_reflect::{Peek, PeekStruct};
use facet_value::{VArray, VObject, Value, peek_to_value};

use crate::FormatError;

/// An immutable plan that projects values of one type onto one field set.
///
/// Formatters are produced by [`Builder::build`](crate::Builder::build) and
/// hold no reference back to the builder, so they can be shared freely.
#[derive(Debug)]
pub struct Formatter {
    shape: &'static Shape,
    projection: Projection,
    fields: Vec<String>,
}

/// What to extract from one level of a value.
#[derive(Debug)]
pub(crate) enum Projection {
    /// Keep these fields, in this order
    Struct(Vec<Step>),
    /// Project the `Some` value; `None` becomes null
    Option(Box<Projection>),
    /// Project the pointee; a pointer with no target becomes null
    Pointer(Box<Projection>),
    /// Project every element
    Sequence(Box<Projection>),
}

#[derive(Debug)]
pub(crate) struct Step {
    /// External name, used as the output key
    pub(crate) key: &'static str,
    /// Field indices for `PeekStruct::field`, more than one when the field
    /// was inlined from a flattened struct
    pub(crate) path: Vec<usize>,
    pub(crate) action: Action,
}

#[derive(Debug)]
pub(crate) enum Action {
    /// Convert the whole field
    Copy,
    /// Filter the field further
    Project(Projection),
}

impl Formatter {
    pub(crate) fn new(shape: &'static Shape, projection: Projection, fields: Vec<String>) -> Self {
        Self {
            shape,
            projection,
            fields,
        }
    }

    /// The shape this formatter accepts.
    pub fn shape(&self) -> &'static Shape {
        self.shape
    }

    /// The field paths this formatter was built from, in build order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[cfg(test)]
    pub(crate) fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Projects `peek` onto this formatter's field set.
    ///
    /// The input is only read. Fails with [`FormatError::TypeMismatch`] if
    /// `peek` is not of the type this formatter was compiled for.
    pub fn format(&self, peek: Peek<'_, '_>) -> Result<Value, FormatError> {
        let actual = peek.shape();
        if actual.id != self.shape.id {
            return Err(FormatError::TypeMismatch {
                expected: self.shape,
                actual,
            });
        }
        apply(&self.projection, peek)
    }
}

fn apply(projection: &Projection, peek: Peek<'_, '_>) -> Result<Value, FormatError> {
    let shape = peek.shape();
    match projection {
        Projection::Struct(steps) => {
            let peek_struct = peek
                .into_struct()
                .map_err(|err| FormatError::traversal(shape, err))?;
            let mut object = VObject::with_capacity(steps.len());
            for step in steps {
                let field = field_at(peek_struct, shape, &step.path)?;
                let value = match &step.action {
                    Action::Copy => copy(field)?,
                    Action::Project(nested) => apply(nested, field)?,
                };
                object.insert(step.key, value);
            }
            Ok(object.into())
        }
        Projection::Option(inner) => {
            let option = peek
                .into_option()
                .map_err(|err| FormatError::traversal(shape, err))?;
            match option.value() {
                Some(value) => apply(inner, value),
                None => Ok(Value::NULL),
            }
        }
        Projection::Pointer(inner) => {
            let pointer = peek
                .into_pointer()
                .map_err(|err| FormatError::traversal(shape, err))?;
            match pointer.borrow_inner() {
                Some(pointee) => apply(inner, pointee),
                None => Ok(Value::NULL),
            }
        }
        Projection::Sequence(inner) => {
            let list = peek
                .into_list_like()
                .map_err(|err| FormatError::traversal(shape, err))?;
            let mut array = VArray::with_capacity(list.len());
            for item in list.iter() {
                array.push(apply(inner, item)?);
            }
            Ok(array.into())
        }
    }
}

/// Reads the field at `path`, descending through flattened structs.
fn field_at<'mem, 'facet>(
    peek_struct: PeekStruct<'mem, 'facet>,
    shape: &'static Shape,
    path: &[usize],
) -> Result<Peek<'mem, 'facet>, FormatError> {
    let Some((&first, rest)) = path.split_first() else {
        return Err(FormatError::traversal(shape, "empty field path"));
    };
    let field = peek_struct
        .field(first)
        .map_err(|err| FormatError::traversal(shape, err))?;
    rest.iter().try_fold(field, |current, &index| {
        let shape = current.shape();
        current
            .into_struct()
            .map_err(|err| FormatError::traversal(shape, err))?
            .field(index)
            .map_err(|err| FormatError::traversal(shape, err))
    })
}

fn copy(peek: Peek<'_, '_>) -> Result<Value, FormatError> {
    let shape = peek.shape();
    peek_to_value(peek).map_err(|err| FormatError::traversal(shape, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;
    use alloc::string::ToString;
    use alloc::vec;
    use facet::Facet;

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Point {
        x: i32,
        y: i32,
        label: String,
    }

    #[derive(Facet)]
    #[allow(dead_code)]
    struct Other {
        x: i32,
    }

    #[test]
    fn keeps_only_selected_fields() {
        let formatter = Builder::compile(Point::SHAPE)
            .unwrap()
            .build(&["y", "x"], "")
            .unwrap();
        let point = Point {
            x: 1,
            y: 2,
            label: "p".to_string(),
        };
        let value = formatter.format(Peek::new(&point)).unwrap();
        let object = value.as_object().unwrap();
        let keys: Vec<&str> = object.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["y", "x"]);
        assert_eq!(object.get("y").unwrap().as_number().unwrap().to_i64(), Some(2));
        assert!(object.get("label").is_none());
    }

    #[test]
    fn rejects_other_types() {
        let formatter = Builder::compile(Point::SHAPE)
            .unwrap()
            .build(&["x"], "")
            .unwrap();
        let err = formatter.format(Peek::new(&Other { x: 1 })).unwrap_err();
        match err {
            FormatError::TypeMismatch { expected, actual } => {
                assert_eq!(expected.id, Point::SHAPE.id);
                assert_eq!(actual.id, Other::SHAPE.id);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_field_list_emits_empty_objects() {
        let formatter = Builder::compile(Point::SHAPE)
            .unwrap()
            .build::<&str>(&[], "")
            .unwrap();
        let point = Point {
            x: 1,
            y: 2,
            label: "p".to_string(),
        };
        let value = formatter.format(Peek::new(&point)).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 0);
    }
}

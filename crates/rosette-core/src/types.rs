use crate::error::{Error, Result};
use std::fmt;

/// The type of a single message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Float64,
    String,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Float64 => "float64",
            FieldType::String => "string",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed slot in a message shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// The value held by a message field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float64(f64),
    String(String),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Float64(_) => FieldType::Float64,
            Value::String(_) => FieldType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(value) => Some(*value),
            Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            Value::Float64(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float64(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "'{value}'"),
        }
    }
}

/// An immutable record of a registered message type.
///
/// Fields are positional and follow the order of the type's shape. A
/// `Message` is only checked against its shape when it enters the bus, so
/// hand-built messages that do not fit are rejected at publish time.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    type_name: String,
    fields: Vec<Value>,
}

impl Message {
    pub fn new(type_name: impl Into<String>, fields: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn into_fields(self) -> Vec<Value> {
        self.fields
    }
}

/// A Rust type that maps one-to-one onto a registered message shape.
///
/// Implement it with [impl_message_type](crate::impl_message_type) rather
/// than by hand.
pub trait MessageType: Sized + Send + 'static {
    /// The name the shape is registered under.
    const TYPE_NAME: &'static str;

    /// The ordered field list of the shape.
    fn fields() -> Vec<Field>;

    fn to_message(&self) -> Message;

    fn from_message(message: &Message) -> Result<Self>;
}

/// Conversion between a Rust field type and a [Value].
pub trait FieldValue: Sized {
    const FIELD_TYPE: FieldType;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FieldValue for f64 {
    const FIELD_TYPE: FieldType = FieldType::Float64;

    fn to_value(&self) -> Value {
        Value::Float64(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FieldValue for String {
    const FIELD_TYPE: FieldType = FieldType::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

/// Reads the field at `index` of `message` as `T`.
#[doc(hidden)]
pub fn take_field<T: FieldValue>(message: &Message, index: usize, name: &str) -> Result<T> {
    let value = message.field(index).ok_or_else(|| {
        Error::schema_mismatch(message.type_name(), format!("missing field '{name}'"))
    })?;

    T::from_value(value).ok_or_else(|| {
        Error::schema_mismatch(
            message.type_name(),
            format!(
                "field '{name}' expected {}, found {}",
                T::FIELD_TYPE,
                value.field_type()
            ),
        )
    })
}

/// Implements [MessageType] for a struct whose fields are all
/// [FieldValue]s.
///
/// ```
/// use rosette_core::impl_message_type;
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct Temperature {
///     pub celsius: f64,
///     pub sensor: String,
/// }
///
/// impl_message_type!(Temperature, "sensor_msgs/Temperature", {
///     celsius: f64,
///     sensor: String,
/// });
/// ```
#[macro_export]
macro_rules! impl_message_type {
    ($msg_type:ident, $type_name:literal, { $($field:ident : $field_ty:ty),+ $(,)? }) => {
        impl $crate::MessageType for $msg_type {
            const TYPE_NAME: &'static str = $type_name;

            fn fields() -> ::std::vec::Vec<$crate::Field> {
                ::std::vec![
                    $($crate::Field::new(
                        stringify!($field),
                        <$field_ty as $crate::FieldValue>::FIELD_TYPE,
                    )),+
                ]
            }

            fn to_message(&self) -> $crate::Message {
                $crate::Message::new(
                    $type_name,
                    ::std::vec![$($crate::FieldValue::to_value(&self.$field)),+],
                )
            }

            #[allow(unused_assignments)]
            fn from_message(message: &$crate::Message) -> $crate::Result<Self> {
                if message.type_name() != $type_name {
                    return Err($crate::Error::SchemaMismatch {
                        type_name: $type_name.to_string(),
                        reason: format!("cannot read a '{}' message", message.type_name()),
                    });
                }

                let expected = [$(stringify!($field)),+].len();
                if message.fields().len() != expected {
                    return Err($crate::Error::SchemaMismatch {
                        type_name: $type_name.to_string(),
                        reason: format!(
                            "expected {} fields, found {}",
                            expected,
                            message.fields().len()
                        ),
                    });
                }

                let mut index = 0;
                Ok(Self {
                    $($field: {
                        let value: $field_ty =
                            $crate::take_field(message, index, stringify!($field))?;
                        index += 1;
                        value
                    }),+
                })
            }
        }
    };
}

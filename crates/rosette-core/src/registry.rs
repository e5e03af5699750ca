use crate::{
    codec,
    error::{Error, Result},
    msgs::{ColorNumber, Text, Vector3},
    types::{Field, FieldType, Message, MessageType},
};
use bytes::Bytes;
use indexmap::IndexMap;

/// The shape of a registered message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Checks that `message` carries every field of this shape, in order
    /// and with the declared types.
    pub fn validate(&self, message: &Message) -> Result<()> {
        if message.type_name() != self.name {
            return Err(Error::schema_mismatch(
                &self.name,
                format!("message is a '{}'", message.type_name()),
            ));
        }

        if message.fields().len() != self.fields.len() {
            return Err(Error::schema_mismatch(
                &self.name,
                format!(
                    "expected {} fields, found {}",
                    self.fields.len(),
                    message.fields().len()
                ),
            ));
        }

        for (field, value) in self.fields.iter().zip(message.fields()) {
            if field.ty != value.field_type() {
                return Err(Error::schema_mismatch(
                    &self.name,
                    format!(
                        "field '{}' expected {}, found {}",
                        field.name,
                        field.ty,
                        value.field_type()
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Renders `message` as `name: value` pairs, e.g. `x: 1, y: 2, z: 0`.
    pub fn describe(&self, message: &Message) -> String {
        self.fields
            .iter()
            .zip(message.fields())
            .map(|(field, value)| format!("{}: {}", field.name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The table of message shapes known to a [Context](crate::Context).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    schemas: IndexMap<String, Schema>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding [Text], [Vector3] and [ColorNumber].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for (name, fields) in [
            (Text::TYPE_NAME, Text::fields()),
            (Vector3::TYPE_NAME, Vector3::fields()),
            (ColorNumber::TYPE_NAME, ColorNumber::fields()),
        ] {
            registry.insert(name, fields);
        }
        registry
    }

    /// Registers a message shape.
    ///
    /// Defining the same shape twice is accepted. Defining a known name with
    /// a different field list fails with
    /// [DuplicateDefinition](Error::DuplicateDefinition).
    pub fn define<I, S>(&mut self, name: &str, fields: I) -> Result<&Schema>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let fields: Vec<Field> = fields
            .into_iter()
            .map(|(field_name, ty)| Field::new(field_name, ty))
            .collect();

        if name.is_empty() {
            return Err(Error::schema_mismatch(name, "type name cannot be empty"));
        }
        if fields.is_empty() {
            return Err(Error::schema_mismatch(name, "a message needs at least one field"));
        }
        for (index, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::schema_mismatch(
                    name,
                    format!("field at index {index} has an empty name"),
                ));
            }
            if fields[..index].iter().any(|other| other.name == field.name) {
                return Err(Error::schema_mismatch(
                    name,
                    format!("duplicate field '{}'", field.name),
                ));
            }
        }

        if let Some(existing) = self.schemas.get(name)
            && existing.fields != fields
        {
            return Err(Error::DuplicateDefinition {
                type_name: name.to_string(),
            });
        }

        Ok(self.insert(name, fields))
    }

    /// Registers the shape of a [MessageType].
    pub fn define_type<M: MessageType>(&mut self) -> Result<&Schema> {
        self.define(M::TYPE_NAME, M::fields().into_iter().map(|f| (f.name, f.ty)))
    }

    fn insert(&mut self, name: &str, fields: Vec<Field>) -> &Schema {
        self.schemas
            .entry(name.to_string())
            .or_insert_with(|| Schema {
                name: name.to_string(),
                fields,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn schema(&self, name: &str) -> Result<&Schema> {
        self.schemas.get(name).ok_or_else(|| Error::UnknownType {
            type_name: name.to_string(),
        })
    }

    /// Names of all registered types in definition order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn validate(&self, message: &Message) -> Result<()> {
        self.schema(message.type_name())?.validate(message)
    }

    /// Validates and encodes `message`. See [codec] for the layout.
    pub fn encode(&self, message: &Message) -> Result<Bytes> {
        self.validate(message)?;
        Ok(codec::encode(message))
    }

    /// Decodes bytes produced by [encode](Self::encode) as an
    /// `expected_type` message.
    pub fn decode(&self, bytes: &[u8], expected_type: &str) -> Result<Message> {
        codec::decode(bytes, self.schema(expected_type)?)
    }
}

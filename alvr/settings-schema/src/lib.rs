//! Minimal schema-introspection support for settings structs.
//!
//! A type deriving [`SettingsSchema`] can describe its own shape as a
//! [`SchemaNode`] tree. Nothing here touches serialization: `Settings` still
//! derives `serde::{Serialize, Deserialize}` separately. This only exists so
//! settings changes can be described generically (e.g. for a future
//! dashboard) without hand-writing a parallel schema.

// Lets the derive macro's generated code refer to `::settings_schema::...`
// uniformly, whether invoked from a downstream crate or from this crate's
// own tests.
extern crate self as settings_schema;

pub use settings_schema_derive::SettingsSchema;

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Section(Vec<(String, SchemaNode)>),
    Choice(Vec<String>),
    Switch(Box<SchemaNode>),
    Leaf(String),
}

pub trait SettingsSchema {
    fn schema() -> SchemaNode;
}

macro_rules! leaf_impl {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl SettingsSchema for $ty {
                fn schema() -> SchemaNode {
                    SchemaNode::Leaf($name.to_string())
                }
            }
        )*
    };
}

leaf_impl! {
    bool => "boolean",
    u8 => "integer",
    u16 => "integer",
    u32 => "integer",
    u64 => "integer",
    i8 => "integer",
    i16 => "integer",
    i32 => "integer",
    i64 => "integer",
    f32 => "float",
    f64 => "float",
    String => "text",
}

impl<T: SettingsSchema> SettingsSchema for Vec<T> {
    fn schema() -> SchemaNode {
        SchemaNode::Section(vec![("item".to_string(), T::schema())])
    }
}

impl<T: SettingsSchema> SettingsSchema for Option<T> {
    fn schema() -> SchemaNode {
        SchemaNode::Switch(Box::new(T::schema()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(SettingsSchema)]
    #[allow(dead_code)]
    struct Example {
        bitrate_bps: u64,
        codec_preference: Codec,
        foveation_override: Option<f32>,
    }

    #[derive(SettingsSchema)]
    #[allow(dead_code)]
    enum Codec {
        H264,
        H265,
        Av1,
    }

    #[test]
    fn schema_shape() {
        let SchemaNode::Section(fields) = Example::schema() else {
            panic!("expected section");
        };
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].0, "bitrateBps");
        assert!(matches!(fields[1].1, SchemaNode::Choice(_)));
        assert!(matches!(fields[2].1, SchemaNode::Switch(_)));
    }
}

//! Built-in message types.
//!
//! These are the shapes exercised by the talker/listener tutorial. Every
//! [Context](crate::Context) created with [Context::new](crate::Context::new)
//! registers them.

use crate::impl_message_type;

/// A string payload, registered as `std_msgs/String`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Text {
    pub data: String,
}

impl Text {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

impl_message_type!(Text, "std_msgs/String", { data: String });

/// A 3-vector, registered as `geometry_msgs/Vector3`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl_message_type!(Vector3, "geometry_msgs/Vector3", {
    x: f64,
    y: f64,
    z: f64,
});

/// A color name paired with a number, registered as
/// `tutorial_interfaces/ColorNumber`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorNumber {
    pub color: String,
    pub number: f64,
}

impl ColorNumber {
    pub fn new(color: impl Into<String>, number: f64) -> Self {
        Self {
            color: color.into(),
            number,
        }
    }
}

impl_message_type!(ColorNumber, "tutorial_interfaces/ColorNumber", {
    color: String,
    number: f64,
});

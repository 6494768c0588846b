//! field_objects.rs
//! Self-localisation estimate shared with behaviour and the team port.

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfLocation {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub sd_x: f32,
    pub sd_y: f32,
    pub sd_heading: f32,
    pub lost: bool,
}

impl Default for SelfLocation {
    fn default() -> Self {
        // Unknown until localisation reports.
        Self {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            sd_x: f32::INFINITY,
            sd_y: f32::INFINITY,
            sd_heading: f32::INFINITY,
            lost: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct FieldObjects {
    self_location: RwLock<SelfLocation>,
}

impl FieldObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_self(&self, location: SelfLocation) {
        *self.self_location.write() = location;
    }

    pub fn self_location(&self) -> SelfLocation {
        *self.self_location.read()
    }
}

//! Named uniform values shared by every shader of a device.
//!
//! Each entry carries a version pair `(global_id, revision)`. Setting a value
//! bumps the revision; shaders remember the pair they last committed per
//! uniform and skip the native call while it is unchanged.

use std::collections::HashMap;

use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::arena::TextureId;

/// A value a shader uniform or sampler can read.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Int(i32),
    IVec2(IVec2),
    IVec3(IVec3),
    IVec4(IVec4),
    Bool(bool),
    Mat3(Mat3),
    Mat4(Mat4),
    /// Flat float data for `float[N]`, `vecN[M]` and matrix arrays.
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Texture(TextureId),
    TextureArray(Vec<TextureId>),
}

impl UniformValue {
    pub fn is_texture(&self) -> bool {
        matches!(self, UniformValue::Texture(_) | UniformValue::TextureArray(_))
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<Vec2> for UniformValue {
    fn from(value: Vec2) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value)
    }
}

impl From<TextureId> for UniformValue {
    fn from(value: TextureId) -> Self {
        UniformValue::Texture(value)
    }
}

/// When a scope value last changed. The default pair never matches a live
/// entry, so a fresh uniform always commits once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UniformVersion {
    pub global_id: u32,
    pub revision: u32,
}

/// Handle to one named entry of a [`ScopeSpace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct ScopeEntry {
    name: String,
    value: Option<UniformValue>,
    version: UniformVersion,
}

/// The device's named value store.
#[derive(Debug, Default)]
pub struct ScopeSpace {
    entries: Vec<ScopeEntry>,
    by_name: HashMap<String, ScopeId>,
}

impl ScopeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `name`, creating an empty one on first use.
    pub fn resolve(&mut self, name: &str) -> ScopeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = ScopeId(self.entries.len());
        self.entries.push(ScopeEntry {
            name: name.to_string(),
            value: None,
            version: UniformVersion {
                global_id: id.0 as u32 + 1,
                revision: 0,
            },
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn find(&self, name: &str) -> Option<ScopeId> {
        self.by_name.get(name).copied()
    }

    pub fn set_value(&mut self, id: ScopeId, value: impl Into<UniformValue>) {
        let entry = &mut self.entries[id.0];
        entry.value = Some(value.into());
        entry.version.revision = entry.version.revision.wrapping_add(1);
    }

    /// Resolves `name` and sets its value.
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> ScopeId {
        let id = self.resolve(name);
        self.set_value(id, value);
        id
    }

    pub fn value(&self, id: ScopeId) -> Option<&UniformValue> {
        self.entries.get(id.0)?.value.as_ref()
    }

    pub fn version(&self, id: ScopeId) -> UniformVersion {
        self.entries
            .get(id.0)
            .map(|e| e.version)
            .unwrap_or_default()
    }

    pub fn name(&self, id: ScopeId) -> &str {
        self.entries.get(id.0).map(|e| e.name.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Vertex array objects and the cache of multi-buffer combinations.
//!
//! A buffer drawn on its own keeps its vertex array on itself. Combinations
//! of several buffers are keyed by each buffer's identity and layout hash
//! and live here until the cache is cleared, the device is destroyed or the
//! context is lost.

use std::collections::HashMap;

use crate::buffer::VertexFormat;
use crate::constants::NativeEnums;
use crate::error::DeviceError;
use crate::gl::Gl;
use crate::state::StateCache;

/// Identity of one bound buffer within a combination: buffer id bits and
/// the layout's rendering hash.
pub type VertexArrayKey = Vec<(u64, u64)>;

/// Builds a vertex array for `buffers`, leaving no vertex array bound.
///
/// The vertex array binding goes through `state` so the cache stays in step
/// with the driver.
pub(crate) fn build_vertex_array<G: Gl>(
    gl: &G,
    state: &mut StateCache<G>,
    enums: &NativeEnums,
    integer_attributes: bool,
    buffers: &[(&VertexFormat, G::Buffer)],
) -> Result<G::VertexArray, DeviceError> {
    let vao = gl
        .create_vertex_array()
        .map_err(DeviceError::creation("vertex array"))?;
    state.set_vertex_array(gl, Some(vao));
    gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);

    let mut location_zero = false;
    for (format, buffer) in buffers {
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(*buffer));
        for element in format.elements() {
            let location = element.semantic.location();
            location_zero |= location == 0;
            let data_type = enums.vertex_type(element.data_type);
            if element.as_int && integer_attributes {
                gl.vertex_attrib_pointer_i32(
                    location,
                    element.components as i32,
                    data_type,
                    element.stride as i32,
                    element.offset as i32,
                );
            } else {
                gl.vertex_attrib_pointer_f32(
                    location,
                    element.components as i32,
                    data_type,
                    element.normalize,
                    element.stride as i32,
                    element.offset as i32,
                );
            }
            gl.enable_vertex_attrib_array(location);
            if format.instancing() {
                gl.vertex_attrib_divisor(location, 1);
            }
        }
    }

    state.set_vertex_array(gl, None);
    gl.bind_buffer(glow::ARRAY_BUFFER, None);

    if !location_zero {
        log::warn!(
            "no vertex attribute is mapped to location 0, which may disable rendering on some drivers"
        );
    }
    log::trace!("built vertex array for {} buffer(s)", buffers.len());
    Ok(vao)
}

/// Vertex arrays for multi-buffer combinations.
#[derive(Debug)]
pub struct VertexArrayCache<G: Gl> {
    entries: HashMap<VertexArrayKey, G::VertexArray>,
}

impl<G: Gl> Default for VertexArrayCache<G> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<G: Gl> VertexArrayCache<G> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &VertexArrayKey) -> Option<G::VertexArray> {
        self.entries.get(key).copied()
    }

    /// Returns the cached vertex array for `key`, building one on a miss.
    /// The flag is true when a new vertex array was built.
    pub(crate) fn get_or_create(
        &mut self,
        gl: &G,
        state: &mut StateCache<G>,
        enums: &NativeEnums,
        integer_attributes: bool,
        key: VertexArrayKey,
        buffers: &[(&VertexFormat, G::Buffer)],
    ) -> Result<(G::VertexArray, bool), DeviceError> {
        if let Some(vao) = self.entries.get(&key) {
            return Ok((*vao, false));
        }
        let vao = build_vertex_array(gl, state, enums, integer_attributes, buffers)?;
        self.entries.insert(key, vao);
        Ok((vao, true))
    }

    /// Deletes every cached vertex array.
    pub fn clear(&mut self, gl: &G, state: &mut StateCache<G>) {
        for (_, vao) in self.entries.drain() {
            state.forget_vertex_array(vao);
            gl.delete_vertex_array(vao);
        }
    }

    /// Deletes the combinations that include `buffer_bits`.
    pub(crate) fn evict_buffer(&mut self, gl: &G, state: &mut StateCache<G>, buffer_bits: u64) {
        self.entries.retain(|key, vao| {
            let keep = !key.iter().any(|(bits, _)| *bits == buffer_bits);
            if !keep {
                state.forget_vertex_array(*vao);
                gl.delete_vertex_array(*vao);
            }
            keep
        });
    }

    /// Forgets every handle without native calls.
    pub(crate) fn on_lost(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{VertexElementDesc, VertexSemantic};
    use crate::caps::Capabilities;
    use crate::config::DeviceOptions;
    use crate::constants::VertexType;
    use crate::gl::{GlCall, RecordingGl};

    struct Fixture {
        gl: RecordingGl,
        state: StateCache<RecordingGl>,
        enums: NativeEnums,
    }

    fn fixture() -> Fixture {
        let gl = RecordingGl::webgl2();
        let caps = Capabilities::detect(&gl, &DeviceOptions::default()).unwrap();
        let enums = NativeEnums::new(&caps);
        let state = StateCache::new(&caps, enums.clone());
        Fixture { gl, state, enums }
    }

    fn positions() -> VertexFormat {
        VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::Position, 3, VertexType::F32)])
    }

    fn colors() -> VertexFormat {
        VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::Color, 4, VertexType::U8).normalized()])
            .with_instancing(true)
    }

    #[test]
    fn build_sets_pointers_and_unbinds() {
        let mut fx = fixture();
        let (a, b) = (fx.gl.create_buffer().unwrap(), fx.gl.create_buffer().unwrap());
        let (p, c) = (positions(), colors());
        build_vertex_array(&fx.gl, &mut fx.state, &fx.enums, true, &[(&p, a), (&c, b)]).unwrap();
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::VertexAttribPointer { .. })), 2);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::VertexAttribDivisor { index: 4, divisor: 1 })), 1);
        assert_eq!(fx.state.vertex_array(), None);
        assert_eq!(fx.gl.calls().last(), Some(&GlCall::BindBuffer { target: glow::ARRAY_BUFFER, buffer: None }));
    }

    #[test]
    fn same_key_reuses_vertex_array() {
        let mut fx = fixture();
        let mut cache = VertexArrayCache::default();
        let (a, b) = (fx.gl.create_buffer().unwrap(), fx.gl.create_buffer().unwrap());
        let (p, c) = (positions(), colors());
        let key = vec![(1, p.rendering_hash()), (2, c.rendering_hash())];
        let (first, built) = cache
            .get_or_create(&fx.gl, &mut fx.state, &fx.enums, true, key.clone(), &[(&p, a), (&c, b)])
            .unwrap();
        assert!(built);
        let (second, built) = cache
            .get_or_create(&fx.gl, &mut fx.state, &fx.enums, true, key, &[(&p, a), (&c, b)])
            .unwrap();
        assert!(!built);
        assert_eq!(first, second);
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::CreateVertexArray(_))), 1);
    }

    #[test]
    fn combinations_sharing_a_buffer_are_distinct() {
        let mut fx = fixture();
        let mut cache = VertexArrayCache::default();
        let bufs: Vec<_> = (0..3).map(|_| fx.gl.create_buffer().unwrap()).collect();
        let (p, c) = (positions(), colors());
        let (ab, _) = cache
            .get_or_create(&fx.gl, &mut fx.state, &fx.enums, true, vec![(1, p.rendering_hash()), (2, c.rendering_hash())], &[(&p, bufs[0]), (&c, bufs[1])])
            .unwrap();
        let (ac, _) = cache
            .get_or_create(&fx.gl, &mut fx.state, &fx.enums, true, vec![(1, p.rendering_hash()), (3, c.rendering_hash())], &[(&p, bufs[0]), (&c, bufs[2])])
            .unwrap();
        assert_ne!(ab, ac);
        assert_eq!(cache.len(), 2);

        cache.evict_buffer(&fx.gl, &mut fx.state, 3);
        assert_eq!(cache.len(), 1);
        cache.clear(&fx.gl, &mut fx.state);
        assert!(cache.is_empty());
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::DeleteVertexArray(_))), 2);
    }

    #[test]
    fn integer_attributes_fall_back_without_support() {
        let mut fx = fixture();
        let buffer = fx.gl.create_buffer().unwrap();
        let format = VertexFormat::new(&[
            VertexElementDesc::new(VertexSemantic::Position, 3, VertexType::F32),
            VertexElementDesc::new(VertexSemantic::BlendIndices, 4, VertexType::U8).integer(),
        ]);
        build_vertex_array(&fx.gl, &mut fx.state, &fx.enums, false, &[(&format, buffer)]).unwrap();
        assert_eq!(fx.gl.count(|c| matches!(c, GlCall::VertexAttribPointer { integer: true, .. })), 0);
    }
}

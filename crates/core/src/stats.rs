//! VRAM and per-frame counters.

use serde::Serialize;

/// Estimated GPU memory held by live resources, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VramStats {
    pub textures: u64,
    pub vertex_buffers: u64,
    pub index_buffers: u64,
}

impl VramStats {
    pub fn total(&self) -> u64 {
        self.textures + self.vertex_buffers + self.index_buffers
    }

    /// Replaces a previous texture estimate with a new one.
    pub(crate) fn retrack_texture(&mut self, previous: u64, current: u64) {
        retrack(&mut self.textures, previous, current);
    }

    pub(crate) fn retrack_vertex_buffer(&mut self, previous: u64, current: u64) {
        retrack(&mut self.vertex_buffers, previous, current);
    }

    pub(crate) fn retrack_index_buffer(&mut self, previous: u64, current: u64) {
        retrack(&mut self.index_buffers, previous, current);
    }
}

fn retrack(pool: &mut u64, previous: u64, current: u64) {
    *pool = pool.saturating_sub(previous) + current;
}

/// Counters reset by the caller at frame boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub instanced_draw_calls: u32,
    pub primitives: u64,
    pub shader_switches: u32,
    pub vaos_created: u32,
    pub texture_uploads: u32,
    pub render_passes: u32,
    pub skipped_draws: u32,
}

impl FrameStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

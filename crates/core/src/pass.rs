//! Render pass descriptions.
//!
//! A pass names a target and what happens to its attachments at the start
//! (clear) and at the end (store, resolve, mipmaps). The device executes the
//! pass in `start_pass` / `end_pass`.

use crate::arena::RenderTargetId;

/// Start and end behavior of the color attachments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorOps {
    pub clear: bool,
    pub clear_value: [f32; 4],
    /// Keep the rendered color after the pass.
    pub store: bool,
    /// Resolve a multisampled target into its textures.
    pub resolve: bool,
    /// Regenerate the color textures' mip chains.
    pub mipmaps: bool,
}

impl Default for ColorOps {
    fn default() -> Self {
        Self {
            clear: false,
            clear_value: [0.0, 0.0, 0.0, 1.0],
            store: false,
            resolve: true,
            mipmaps: false,
        }
    }
}

/// Start and end behavior of the depth and stencil attachments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilOps {
    pub clear_depth: bool,
    pub clear_depth_value: f32,
    pub clear_stencil: bool,
    pub clear_stencil_value: i32,
    pub store_depth: bool,
    pub store_stencil: bool,
}

impl Default for DepthStencilOps {
    fn default() -> Self {
        Self {
            clear_depth: false,
            clear_depth_value: 1.0,
            clear_stencil: false,
            clear_stencil_value: 0,
            store_depth: false,
            store_stencil: false,
        }
    }
}

/// A unit of rendering into one target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub name: String,
    /// `None` renders to the back buffer.
    pub target: Option<RenderTargetId>,
    /// Applied to every color attachment.
    pub color_ops: ColorOps,
    pub depth_stencil_ops: DepthStencilOps,
    /// The pass covers the whole target, so discarded attachments can be
    /// invalidated wholesale.
    pub full_size_clear_rect: bool,
}

impl Default for RenderPass {
    fn default() -> Self {
        Self {
            name: String::from("pass"),
            target: None,
            color_ops: ColorOps::default(),
            depth_stencil_ops: DepthStencilOps::default(),
            full_size_clear_rect: true,
        }
    }
}

impl RenderPass {
    pub fn new(name: &str, target: Option<RenderTargetId>) -> Self {
        Self {
            name: name.to_string(),
            target,
            ..Self::default()
        }
    }

    /// Clears color, depth and stencil at the start of the pass.
    pub fn with_clear(mut self, color: [f32; 4]) -> Self {
        self.color_ops.clear = true;
        self.color_ops.clear_value = color;
        self.depth_stencil_ops.clear_depth = true;
        self.depth_stencil_ops.clear_stencil = true;
        self
    }

    /// Keeps every attachment after the pass.
    pub fn storing_all(mut self) -> Self {
        self.color_ops.store = true;
        self.depth_stencil_ops.store_depth = true;
        self.depth_stencil_ops.store_stencil = true;
        self
    }

    /// The clear the pass issues when it starts, if any.
    pub fn start_clear(&self) -> Option<ClearOptions> {
        let options = ClearOptions {
            color: self.color_ops.clear.then_some(self.color_ops.clear_value),
            depth: self
                .depth_stencil_ops
                .clear_depth
                .then_some(self.depth_stencil_ops.clear_depth_value),
            stencil: self
                .depth_stencil_ops
                .clear_stencil
                .then_some(self.depth_stencil_ops.clear_stencil_value),
        };
        (!options.is_empty()).then_some(options)
    }

    /// Attachments whose contents are discarded at the end of the pass.
    ///
    /// The back buffer is addressed with `COLOR`/`DEPTH`/`STENCIL`; its
    /// depth and stencil are never invalidated.
    pub fn discarded_attachments(&self, color_count: usize, back_buffer: bool) -> Vec<u32> {
        let mut attachments = Vec::new();
        if !(self.color_ops.store || self.color_ops.resolve) {
            if back_buffer {
                attachments.push(glow::COLOR);
            } else {
                attachments.extend((0..color_count as u32).map(|i| glow::COLOR_ATTACHMENT0 + i));
            }
        }
        if !back_buffer {
            if !self.depth_stencil_ops.store_depth {
                attachments.push(glow::DEPTH_ATTACHMENT);
            }
            if !self.depth_stencil_ops.store_stencil {
                attachments.push(glow::STENCIL_ATTACHMENT);
            }
        }
        attachments
    }
}

/// What `clear` writes. `None` leaves that buffer untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearOptions {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<i32>,
}

impl ClearOptions {
    /// Color, depth and stencil with the usual reset values.
    pub fn all(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
            stencil: Some(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none() && self.stencil.is_none()
    }

    /// The `glClear` mask.
    pub fn mask(&self) -> u32 {
        let mut mask = 0;
        if self.color.is_some() {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if self.depth.is_some() {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if self.stencil.is_some() {
            mask |= glow::STENCIL_BUFFER_BIT;
        }
        mask
    }
}

/// Whether a pass is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Idle,
    Began,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pass_clears_nothing() {
        assert_eq!(RenderPass::default().start_clear(), None);
    }

    #[test]
    fn with_clear_clears_everything() {
        let clear = RenderPass::new("main", None).with_clear([0.1, 0.2, 0.3, 1.0]).start_clear().unwrap();
        assert_eq!(clear.color, Some([0.1, 0.2, 0.3, 1.0]));
        assert_eq!(clear.depth, Some(1.0));
        assert_eq!(clear.stencil, Some(0));
        assert_eq!(
            clear.mask(),
            glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT
        );
    }

    #[test]
    fn resolving_color_is_never_discarded() {
        let pass = RenderPass::default();
        let discarded = pass.discarded_attachments(2, false);
        assert_eq!(discarded, vec![glow::DEPTH_ATTACHMENT, glow::STENCIL_ATTACHMENT]);
    }

    #[test]
    fn unstored_unresolved_color_is_discarded() {
        let mut pass = RenderPass::default();
        pass.color_ops.resolve = false;
        pass.depth_stencil_ops.store_depth = true;
        pass.depth_stencil_ops.store_stencil = true;
        assert_eq!(
            pass.discarded_attachments(2, false),
            vec![glow::COLOR_ATTACHMENT0, glow::COLOR_ATTACHMENT0 + 1]
        );
    }

    #[test]
    fn back_buffer_keeps_depth_and_stencil() {
        let mut pass = RenderPass::default();
        pass.color_ops.resolve = false;
        assert_eq!(pass.discarded_attachments(1, true), vec![glow::COLOR]);
        assert!(pass.storing_all().discarded_attachments(1, true).is_empty());
    }

    #[test]
    fn clear_mask_matches_requested_buffers() {
        let options = ClearOptions {
            depth: Some(0.5),
            ..ClearOptions::default()
        };
        assert_eq!(options.mask(), glow::DEPTH_BUFFER_BIT);
        assert!(ClearOptions::default().is_empty());
    }
}

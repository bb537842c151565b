//! Context loss and restore.
//!
//! A context moves Live -> Lost -> Live, or ends in Destroyed from either
//! state. On loss every wrapper forgets its native handles without issuing
//! calls. On restore the device rebuilds capabilities and caches against the
//! fresh binding, then gives every wrapper a [`RestoreContext`] to recreate
//! what it needs eagerly.

use crate::buffer::{IndexBuffer, VertexBuffer};
use crate::caps::Capabilities;
use crate::constants::NativeEnums;
use crate::error::DeviceError;
use crate::gl::Gl;
use crate::render_target::RenderTarget;
use crate::scope::ScopeSpace;
use crate::shader::{Shader, ShaderCache};
use crate::stats::VramStats;
use crate::texture::Texture;

/// Where the native context stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    #[default]
    Live,
    Lost,
    Destroyed,
}

impl ContextState {
    pub fn is_live(self) -> bool {
        self == ContextState::Live
    }
}

/// Lifecycle notification delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Lost,
    Restored,
}

/// Handle returned by [`EventListeners::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(DeviceEvent)>;

/// Registered lifecycle listeners, called in registration order.
#[derive(Default)]
pub struct EventListeners {
    next: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl std::fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

impl EventListeners {
    pub fn on(&mut self, listener: impl FnMut(DeviceEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn emit(&mut self, event: DeviceEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}

/// What a wrapper may use while being restored.
pub struct RestoreContext<'a, G: Gl> {
    pub(crate) gl: &'a G,
    pub(crate) caps: &'a Capabilities,
    pub(crate) enums: &'a NativeEnums,
    pub(crate) vram: &'a mut VramStats,
    pub(crate) shaders: &'a mut ShaderCache<G>,
    pub(crate) scope: &'a mut ScopeSpace,
}

/// A device-owned object holding native handles.
pub trait ContextResource<G: Gl> {
    /// Drops native handles. Must not issue native calls.
    fn on_lost(&mut self);

    /// Recreates whatever must exist before the next frame.
    ///
    /// # Errors
    ///
    /// Returns the error that kept the resource from being recreated; the
    /// device logs it and carries on with the remaining resources.
    fn on_restored(&mut self, ctx: &mut RestoreContext<'_, G>) -> Result<(), DeviceError>;
}

/// Textures keep their dirty flags and re-upload on the next bind.
impl<G: Gl> ContextResource<G> for Texture<G> {
    fn on_lost(&mut self) {
        self.forget_native();
    }

    fn on_restored(&mut self, _ctx: &mut RestoreContext<'_, G>) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl<G: Gl> ContextResource<G> for VertexBuffer<G> {
    fn on_lost(&mut self) {
        self.forget_native();
    }

    fn on_restored(&mut self, ctx: &mut RestoreContext<'_, G>) -> Result<(), DeviceError> {
        self.upload(ctx.gl, ctx.enums, ctx.vram)
    }
}

/// The caller guarantees no vertex array is bound; a freshly reset state
/// cache satisfies that.
impl<G: Gl> ContextResource<G> for IndexBuffer<G> {
    fn on_lost(&mut self) {
        self.forget_native();
    }

    fn on_restored(&mut self, ctx: &mut RestoreContext<'_, G>) -> Result<(), DeviceError> {
        self.upload(ctx.gl, ctx.enums, ctx.vram)
    }
}

impl<G: Gl> ContextResource<G> for Shader<G> {
    fn on_lost(&mut self) {
        self.forget_native();
    }

    fn on_restored(&mut self, ctx: &mut RestoreContext<'_, G>) -> Result<(), DeviceError> {
        self.link(ctx.gl, ctx.shaders, ctx.scope)?;
        Ok(())
    }
}

/// Framebuffers rebuild lazily on the next pass. Sample counts are clamped
/// again in case the restored context offers fewer.
impl<G: Gl> ContextResource<G> for RenderTarget<G> {
    fn on_lost(&mut self) {
        self.forget_native();
    }

    fn on_restored(&mut self, ctx: &mut RestoreContext<'_, G>) -> Result<(), DeviceError> {
        self.clamp_samples(ctx.caps);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_fire_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = EventListeners::default();
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            listeners.on(move |event| seen.borrow_mut().push((tag, event)));
        }
        listeners.emit(DeviceEvent::Lost);
        assert_eq!(
            *seen.borrow(),
            vec![("first", DeviceEvent::Lost), ("second", DeviceEvent::Lost)]
        );
    }

    #[test]
    fn off_removes_only_that_listener() {
        let count = Rc::new(RefCell::new(0));
        let mut listeners = EventListeners::default();
        let c = Rc::clone(&count);
        let a = listeners.on(move |_| *c.borrow_mut() += 1);
        let c = Rc::clone(&count);
        listeners.on(move |_| *c.borrow_mut() += 10);
        assert!(listeners.off(a));
        assert!(!listeners.off(a), "second removal must report false");
        listeners.emit(DeviceEvent::Restored);
        assert_eq!(*count.borrow(), 10);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn only_live_is_live() {
        assert!(ContextState::Live.is_live());
        assert!(!ContextState::Lost.is_live());
        assert!(!ContextState::Destroyed.is_live());
    }
}

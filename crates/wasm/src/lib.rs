#![deny(unsafe_code)]
//! Browser bindings: drives a canvas' WebGL context through the device layer
//! and forwards the canvas' context-loss events into the device lifecycle.

use webgl_device_core::DeviceOptions;

/// Context ids to request from the canvas, in order of preference.
pub fn context_ids(options: &DeviceOptions) -> &'static [&'static str] {
    if options.prefer_webgl2 {
        &["webgl2", "webgl", "experimental-webgl"]
    } else {
        &["webgl", "experimental-webgl"]
    }
}

/// `WebGLContextAttributes` entries for `options`.
pub fn context_attributes(options: &DeviceOptions) -> Vec<(&'static str, bool)> {
    vec![
        ("antialias", options.antialias),
        ("alpha", options.alpha),
        ("depth", options.depth),
        ("stencil", options.stencil),
        ("preserveDrawingBuffer", options.preserve_drawing_buffer),
    ]
}

// The binding itself only exists on wasm32.
#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::cell::RefCell;
    use std::rc::Rc;

    use js_sys::{Object, Reflect};
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use web_sys::{Event, HtmlCanvasElement, WebGl2RenderingContext, WebGlRenderingContext};
    use webgl_device_core::{Device, DeviceOptions};

    use super::{context_attributes, context_ids};

    type SharedDevice = Rc<RefCell<Device<glow::Context>>>;
    type Listener = Closure<dyn FnMut(Event)>;

    fn js_error(err: impl std::fmt::Display) -> JsValue {
        JsValue::from_str(&err.to_string())
    }

    /// Wraps the canvas' current context, creating it on first call.
    fn acquire_context(canvas: &HtmlCanvasElement, options: &DeviceOptions) -> Result<glow::Context, JsValue> {
        let attributes = Object::new();
        for (key, value) in context_attributes(options) {
            Reflect::set(&attributes, &JsValue::from_str(key), &JsValue::from_bool(value))?;
        }
        Reflect::set(
            &attributes,
            &JsValue::from_str("powerPreference"),
            &JsValue::from_str(options.power_preference.as_str()),
        )?;

        for id in context_ids(options) {
            let Some(context) = canvas.get_context_with_context_options(id, &attributes)? else {
                continue;
            };
            if let Ok(webgl2) = context.clone().dyn_into::<WebGl2RenderingContext>() {
                return Ok(glow::Context::from_webgl2_context(webgl2));
            }
            if let Ok(webgl1) = context.dyn_into::<WebGlRenderingContext>() {
                return Ok(glow::Context::from_webgl1_context(webgl1));
            }
        }
        Err(JsValue::from_str("no WebGL context is available on this canvas"))
    }

    /// A device bound to one canvas.
    #[wasm_bindgen]
    pub struct WebDevice {
        device: SharedDevice,
        canvas: HtmlCanvasElement,
        on_lost: Listener,
        on_restored: Listener,
    }

    #[wasm_bindgen]
    impl WebDevice {
        /// Creates a device on `canvas`. `options` is a JSON object of
        /// device options; missing fields take their defaults.
        #[wasm_bindgen(constructor)]
        pub fn new(canvas: HtmlCanvasElement, options: Option<String>) -> Result<WebDevice, JsValue> {
            let options = match options {
                Some(json) => DeviceOptions::from_json(&json).map_err(js_error)?,
                None => DeviceOptions::default(),
            };
            let gl = acquire_context(&canvas, &options)?;
            let device = Device::new(gl, options.clone(), canvas.width(), canvas.height()).map_err(js_error)?;
            let device: SharedDevice = Rc::new(RefCell::new(device));

            // Without preventDefault the browser never restores the context.
            let lost = Rc::clone(&device);
            let on_lost = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                event.prevent_default();
                lost.borrow_mut().lose_context();
            });

            let restored = Rc::clone(&device);
            let restore_canvas = canvas.clone();
            let on_restored = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                let result = acquire_context(&restore_canvas, &options)
                    .and_then(|gl| restored.borrow_mut().restore_context(gl).map_err(js_error));
                if let Err(err) = result {
                    log::error!("context restore failed: {err:?}");
                }
            });

            canvas.add_event_listener_with_callback("webglcontextlost", on_lost.as_ref().unchecked_ref())?;
            canvas.add_event_listener_with_callback("webglcontextrestored", on_restored.as_ref().unchecked_ref())?;

            Ok(WebDevice {
                device,
                canvas,
                on_lost,
                on_restored,
            })
        }

        /// Follows a canvas resize.
        pub fn resize(&self, width: u32, height: u32) {
            self.canvas.set_width(width.max(1));
            self.canvas.set_height(height.max(1));
            self.device.borrow_mut().set_back_buffer_size(width, height);
        }

        /// `"Live"`, `"Lost"` or `"Destroyed"`.
        #[wasm_bindgen(js_name = contextState)]
        pub fn context_state(&self) -> String {
            format!("{:?}", self.device.borrow().context_state())
        }

        /// Detected capabilities as JSON.
        pub fn capabilities(&self) -> Result<String, JsValue> {
            serde_json::to_string(self.device.borrow().capabilities()).map_err(js_error)
        }

        /// Counters since the last call, as JSON.
        #[wasm_bindgen(js_name = takeFrameStats)]
        pub fn take_frame_stats(&self) -> Result<String, JsValue> {
            let mut device = self.device.borrow_mut();
            let stats = serde_json::to_string(&device.frame_stats()).map_err(js_error)?;
            device.reset_frame_stats();
            Ok(stats)
        }

        /// Estimated VRAM use as JSON.
        pub fn vram(&self) -> Result<String, JsValue> {
            serde_json::to_string(&self.device.borrow().vram()).map_err(js_error)
        }

        /// Releases every GPU resource; the device is unusable afterwards.
        pub fn destroy(&self) {
            self.device.borrow_mut().destroy();
        }
    }

    impl WebDevice {
        /// The shared device, for Rust callers rendering through it.
        pub fn device(&self) -> SharedDevice {
            Rc::clone(&self.device)
        }
    }

    impl Drop for WebDevice {
        fn drop(&mut self) {
            let _ = self
                .canvas
                .remove_event_listener_with_callback("webglcontextlost", self.on_lost.as_ref().unchecked_ref());
            let _ = self
                .canvas
                .remove_event_listener_with_callback("webglcontextrestored", self.on_restored.as_ref().unchecked_ref());
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm::*;

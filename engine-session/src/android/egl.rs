//! EGL through glutin.
//!
//! glutin only exposes whether a config is hardware accelerated, not the raw
//! `EGL_CONFIG_CAVEAT`, so candidates from this platform are only ever
//! reported with [`Caveat::None`] or [`Caveat::Slow`]; non-conformant
//! configs aren't told apart.

use std::ffi::c_void;
use std::mem;
use std::num::NonZeroU32;
use std::ptr;

use glutin::api::egl::config::Config;
use glutin::api::egl::context::{NotCurrentContext, PossiblyCurrentContext};
use glutin::api::egl::display::Display;
use glutin::api::egl::surface::Surface;
use glutin::config::{Api, AsRawConfig, ColorBufferType, ConfigSurfaceTypes, ConfigTemplateBuilder, RawConfig};
use glutin::context::{AsRawContext, ContextApi, ContextAttributesBuilder, RawContext, Version};
use glutin::display::{AsRawDisplay, RawDisplay};
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, WindowSurface};
use ndk::native_window::NativeWindow;
use raw_window_handle::{AndroidDisplayHandle, AndroidNdkWindowHandle, RawDisplayHandle, RawWindowHandle};

use crate::error::DeviceError;
use crate::platform::{DisplayPlatform, RawGraphicsHandles};
use crate::scorer::{Caveat, ConfigurationCandidate, RenderableTypes, SurfaceTypes};

/// A rendering context, which glutin models as a different type depending
/// on whether it may be current
pub enum EglContext {
    NotCurrent(NotCurrentContext),
    PossiblyCurrent(PossiblyCurrentContext),
    /// A failed make-current consumed the context
    Lost,
}

impl EglContext {
    fn take(&mut self) -> EglContext {
        mem::replace(self, EglContext::Lost)
    }
}

/// The default EGL display of the device, with window surfaces for
/// [`NativeWindow`]s handed over by the UI
#[derive(Debug, Default)]
pub struct EglPlatform;

impl EglPlatform {
    pub fn new() -> Self {
        Self
    }
}

fn raw_window_handle(window: &NativeWindow) -> RawWindowHandle {
    let mut handle = AndroidNdkWindowHandle::empty();
    handle.a_native_window = window.ptr().as_ptr().cast();
    RawWindowHandle::AndroidNdk(handle)
}

fn describe_config(id: i32, config: &Config) -> ConfigurationCandidate {
    let (red_bits, green_bits, blue_bits) = match config.color_buffer_type() {
        Some(ColorBufferType::Rgb {
            r_size,
            g_size,
            b_size,
        }) => (r_size as i32, g_size as i32, b_size as i32),
        _ => (0, 0, 0),
    };

    let api = config.api();
    let mut renderable_types = RenderableTypes::empty();
    renderable_types.set(RenderableTypes::OPENGL, api.contains(Api::OPENGL));
    renderable_types.set(RenderableTypes::OPENGL_ES, api.contains(Api::GLES1));
    renderable_types.set(RenderableTypes::OPENGL_ES2, api.contains(Api::GLES2));
    renderable_types.set(RenderableTypes::OPENGL_ES3, api.contains(Api::GLES3));

    let surfaces = config.config_surface_types();
    let mut surface_types = SurfaceTypes::empty();
    surface_types.set(SurfaceTypes::WINDOW, surfaces.contains(ConfigSurfaceTypes::WINDOW));
    surface_types.set(SurfaceTypes::PBUFFER, surfaces.contains(ConfigSurfaceTypes::PBUFFER));
    surface_types.set(SurfaceTypes::PIXMAP, surfaces.contains(ConfigSurfaceTypes::PIXMAP));

    ConfigurationCandidate {
        id,
        red_bits,
        green_bits,
        blue_bits,
        alpha_bits: config.alpha_size() as i32,
        depth_bits: config.depth_size() as i32,
        stencil_bits: config.stencil_size() as i32,
        samples: config.num_samples() as i32,
        surface_types,
        renderable_types,
        caveat: if config.hardware_accelerated() {
            Caveat::None
        } else {
            Caveat::Slow
        },
    }
}

impl DisplayPlatform for EglPlatform {
    type Display = Display;
    type Config = Config;
    type Context = EglContext;
    type Surface = Surface<WindowSurface>;
    type Window = NativeWindow;

    fn open_display(&mut self) -> Result<Self::Display, DeviceError> {
        let raw_display = RawDisplayHandle::Android(AndroidDisplayHandle::empty());
        unsafe { Display::new(raw_display) }.map_err(|err| DeviceError::Display(err.to_string()))
    }

    fn query_configs(
        &mut self,
        display: &Self::Display,
    ) -> Result<Vec<(Self::Config, ConfigurationCandidate)>, DeviceError> {
        // EGL color sizes are minimums, so this matches every RGB config
        let template = ConfigTemplateBuilder::new()
            .with_buffer_type(ColorBufferType::Rgb {
                r_size: 1,
                g_size: 1,
                b_size: 1,
            })
            .build();
        let configs = unsafe { display.find_configs(template) }
            .map_err(|err| DeviceError::Display(err.to_string()))?;

        Ok(configs
            .enumerate()
            .map(|(index, config)| {
                let candidate = describe_config(index as i32, &config);
                (config, candidate)
            })
            .collect())
    }

    fn create_context(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
        api_version: u8,
    ) -> Result<Self::Context, DeviceError> {
        let attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::Gles(Some(Version::new(api_version, 0))))
            .build(None);
        let context = unsafe { display.create_context(config, &attributes) }
            .map_err(|err| DeviceError::Context(err.to_string()))?;
        Ok(EglContext::NotCurrent(context))
    }

    fn bind_window(
        &mut self,
        display: &Self::Display,
        config: &Self::Config,
        context: &mut Self::Context,
        window: &Self::Window,
    ) -> Result<Self::Surface, DeviceError> {
        let (width, height) = match (
            NonZeroU32::new(window.width() as u32),
            NonZeroU32::new(window.height() as u32),
        ) {
            (Some(width), Some(height)) => (width, height),
            _ => {
                return Err(DeviceError::Surface(format!(
                    "window has no area ({}x{})",
                    window.width(),
                    window.height()
                )))
            }
        };
        let attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window_handle(window),
            width,
            height,
        );
        let surface = unsafe { display.create_window_surface(config, &attributes) }
            .map_err(|err| DeviceError::Surface(err.to_string()))?;

        let not_current = match context.take() {
            EglContext::NotCurrent(not_current) => not_current,
            EglContext::PossiblyCurrent(current) => current
                .make_not_current()
                .map_err(|err| DeviceError::MakeCurrent(err.to_string()))?,
            EglContext::Lost => return Err(DeviceError::Context("context was lost".to_owned())),
        };
        let current = not_current
            .make_current(&surface)
            .map_err(|err| DeviceError::MakeCurrent(err.to_string()))?;
        *context = EglContext::PossiblyCurrent(current);

        Ok(surface)
    }

    fn unbind(
        &mut self,
        _display: &Self::Display,
        context: &mut Self::Context,
        surface: Option<Self::Surface>,
    ) {
        *context = match context.take() {
            EglContext::PossiblyCurrent(current) => match current.make_not_current() {
                Ok(not_current) => EglContext::NotCurrent(not_current),
                Err(err) => {
                    log::error!("Failed to release context: {err}");
                    EglContext::Lost
                }
            },
            other => other,
        };
        // The surface is destroyed when dropped, after nothing is current
        drop(surface);
    }

    fn destroy_context(&mut self, _display: &Self::Display, context: Self::Context) {
        drop(context);
    }

    fn terminate_display(&mut self, display: Self::Display) {
        drop(display);
    }

    fn describe(&self, display: &Self::Display) -> Option<String> {
        Some(display.version_string())
    }

    fn raw_handles(
        &self,
        display: &Self::Display,
        config: &Self::Config,
        context: &Self::Context,
    ) -> RawGraphicsHandles {
        #[allow(unreachable_patterns)]
        let display = match display.raw_display() {
            RawDisplay::Egl(display) => display as *mut c_void,
            _ => ptr::null_mut(),
        };
        #[allow(unreachable_patterns)]
        let config = match config.raw_config() {
            RawConfig::Egl(config) => config as *mut c_void,
            _ => ptr::null_mut(),
        };
        #[allow(unreachable_patterns)]
        let context = match context {
            EglContext::NotCurrent(context) => match context.raw_context() {
                RawContext::Egl(context) => context as *mut c_void,
                _ => ptr::null_mut(),
            },
            EglContext::PossiblyCurrent(context) => match context.raw_context() {
                RawContext::Egl(context) => context as *mut c_void,
                _ => ptr::null_mut(),
            },
            EglContext::Lost => ptr::null_mut(),
        };
        RawGraphicsHandles {
            display,
            config,
            context,
        }
    }
}

//! Hosting an engine that lives on the other side of a C ABI.
//!
//! The native engine exports an [`EngineVTable`]. When the session creates
//! it, the engine is handed its devices as opaque pointers in
//! [`CreateParams`] plus a [`HostCallbacks`] table it can use to call back
//! into its host for as long as it lives. Raw codes coming back through the
//! callbacks are decoded here; unknown ones are logged and dropped.

use std::ffi::{c_void, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use libc::{c_char, c_float, c_int, size_t};

use crate::engine::{Engine, EngineContext, EngineControl, EngineHost, SurfaceChange};
use crate::events::{GameEvent, GameOption, InputEvent, ShaderKind};
use crate::platform::{AudioPlatform, DisplayPlatform};
use crate::util::{abort_on_panic, try_get_str_from_ptr};

/// [`HostCallbacks::poll_surface`]: nothing changed
pub const SURFACE_UNCHANGED: c_int = 0;
/// [`HostCallbacks::poll_surface`]: a new surface is bound, its size was written out
pub const SURFACE_RESIZED: c_int = 1;
/// [`HostCallbacks::poll_surface`]: the surface is gone
pub const SURFACE_LOST: c_int = 2;
/// [`HostCallbacks::poll_surface`]: a new surface couldn't be bound, the run should end
pub const SURFACE_ERROR: c_int = -1;

/// Devices and settings handed to the native engine on creation
#[repr(C)]
#[derive(Debug)]
pub struct CreateParams {
    pub audio_device: *mut c_void,
    pub sample_rate: c_int,
    pub buffer_size: c_int,
    pub display: *mut c_void,
    pub config: *mut c_void,
    pub context: *mut c_void,
    pub surface_width: c_int,
    pub surface_height: c_int,
    pub scaling_option: c_int,
    pub game_type: c_int,
}

pub type PathVisitor = unsafe extern "C" fn(user: *mut c_void, path: *const c_char);

/// Entry points into the host, valid from `create` until `destroy` returns.
///
/// Every function takes the `host` pointer from this table as its first
/// argument. `poll_surface` takes `run` instead, which is only non-null
/// while the engine's `main` is running.
#[repr(C)]
pub struct HostCallbacks {
    pub host: *const c_void,
    pub run: *mut c_void,

    /// Writes the horizontal and vertical DPI to `values[0]` and `values[1]`
    pub get_dpi: unsafe extern "C" fn(host: *const c_void, values: *mut c_float),
    pub display_message: unsafe extern "C" fn(host: *const c_void, message: *const c_char),
    pub set_window_caption: unsafe extern "C" fn(host: *const c_void, caption: *const c_char),
    pub show_virtual_keyboard: unsafe extern "C" fn(host: *const c_void, visible: c_int),
    pub for_each_plugin_directory:
        unsafe extern "C" fn(host: *const c_void, visit: PathVisitor, user: *mut c_void),
    pub for_each_sys_archive:
        unsafe extern "C" fn(host: *const c_void, visit: PathVisitor, user: *mut c_void),
    pub on_game_option: unsafe extern "C" fn(host: *const c_void, option: c_int),
    pub on_game_display_started: unsafe extern "C" fn(host: *const c_void),
    pub on_game_event: unsafe extern "C" fn(host: *const c_void, event: c_int),

    /// Applies any pending surface change; returns one of the `SURFACE_*` codes
    pub poll_surface:
        unsafe extern "C" fn(run: *mut c_void, width: *mut c_int, height: *mut c_int) -> c_int,
}

/// The functions a native engine exports.
///
/// Everything except `create`, `main` and `destroy` may be called from any
/// thread while `main` is running.
#[repr(C)]
pub struct EngineVTable {
    pub create: unsafe extern "C" fn(params: *const CreateParams, callbacks: *const HostCallbacks),
    pub main: unsafe extern "C" fn(argc: c_int, argv: *const *const c_char) -> c_int,
    pub destroy: unsafe extern "C" fn(),

    pub set_pause: unsafe extern "C" fn(paused: c_int),
    pub set_touchpad_mode: unsafe extern "C" fn(enabled: c_int),
    pub enable_zoning: unsafe extern "C" fn(enabled: c_int),
    pub save_game: unsafe extern "C" fn(slot: c_int, force: c_int),
    pub load_game: unsafe extern "C" fn(slot: c_int),
    pub check_load_conditions: unsafe extern "C" fn() -> c_int,
    pub set_auto_load_slot: unsafe extern "C" fn(slot: c_int),
    pub push_event: unsafe extern "C" fn(
        kind: c_int,
        arg1: c_int,
        arg2: c_int,
        arg3: c_int,
        arg4: c_int,
        arg5: c_int,
    ),
    pub game_event: unsafe extern "C" fn(event: c_int),
    pub add_bitmap_resource:
        unsafe extern "C" fn(name: *const c_char, bitmap: *const u8, len: size_t),
    pub add_shader_source: unsafe extern "C" fn(source: *const u8, len: size_t, kind: c_int),
}

struct NativeControl {
    vtable: &'static EngineVTable,
}

impl EngineControl for NativeControl {
    fn set_pause(&self, paused: bool) {
        unsafe { (self.vtable.set_pause)(paused as c_int) }
    }

    fn set_touchpad_mode(&self, enabled: bool) {
        unsafe { (self.vtable.set_touchpad_mode)(enabled as c_int) }
    }

    fn enable_zoning(&self, enabled: bool) {
        unsafe { (self.vtable.enable_zoning)(enabled as c_int) }
    }

    fn save_game(&self, slot: i32, force: bool) {
        unsafe { (self.vtable.save_game)(slot, force as c_int) }
    }

    fn load_game(&self, slot: i32) {
        unsafe { (self.vtable.load_game)(slot) }
    }

    fn check_load_conditions(&self) -> bool {
        unsafe { (self.vtable.check_load_conditions)() != 0 }
    }

    fn set_auto_load_slot(&self, slot: i32) {
        unsafe { (self.vtable.set_auto_load_slot)(slot) }
    }

    fn push_event(&self, event: InputEvent) {
        let [a1, a2, a3, a4, a5] = event.args;
        unsafe { (self.vtable.push_event)(event.kind.into(), a1, a2, a3, a4, a5) }
    }

    fn game_event(&self, event: GameEvent) {
        unsafe { (self.vtable.game_event)(event.into()) }
    }

    fn add_bitmap_resource(&self, name: &str, bitmap: &[u8]) {
        let name = match CString::new(name) {
            Ok(name) => name,
            Err(_) => {
                log::warn!("Skipping bitmap resource with interior nul: {name:?}");
                return;
            }
        };
        unsafe { (self.vtable.add_bitmap_resource)(name.as_ptr(), bitmap.as_ptr(), bitmap.len()) }
    }

    fn add_shader_source(&self, kind: ShaderKind, source: &[u8]) {
        unsafe { (self.vtable.add_shader_source)(source.as_ptr(), source.len(), kind.into()) }
    }
}

/// An [`Engine`] implemented in native code
pub struct NativeEngine {
    vtable: &'static EngineVTable,
    control: Arc<NativeControl>,

    // Both are pointed to by the native engine between create and destroy
    host: Option<Box<Arc<dyn EngineHost>>>,
    callbacks: Option<Box<HostCallbacks>>,
}

// The raw pointers in `callbacks` only refer to `host` (owned) and to the
// run context, which is only set while `main` runs on the worker thread
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    /// # Safety
    ///
    /// Every function in `vtable` must be safe to call with the arguments
    /// documented on [`EngineVTable`], and the command functions must be
    /// safe to call from any thread.
    pub unsafe fn new(vtable: &'static EngineVTable) -> Self {
        Self {
            vtable,
            control: Arc::new(NativeControl { vtable }),
            host: None,
            callbacks: None,
        }
    }
}

impl<D: DisplayPlatform, A: AudioPlatform> Engine<D, A> for NativeEngine {
    fn control(&self) -> Arc<dyn EngineControl> {
        self.control.clone()
    }

    fn create(&mut self, ctx: &mut EngineContext<'_, D, A>) {
        let host = Box::new(ctx.host_handle());
        let callbacks = Box::new(HostCallbacks {
            host: &*host as *const Arc<dyn EngineHost> as *const c_void,
            run: ptr::null_mut(),
            get_dpi,
            display_message,
            set_window_caption,
            show_virtual_keyboard,
            for_each_plugin_directory,
            for_each_sys_archive,
            on_game_option,
            on_game_display_started,
            on_game_event,
            poll_surface: poll_surface::<D, A>,
        });

        let handles = ctx.raw_graphics_handles();
        let (width, height) = ctx.surface_size();
        let params = CreateParams {
            audio_device: ctx.raw_audio_device(),
            sample_rate: ctx.sample_rate() as c_int,
            buffer_size: ctx.buffer_size() as c_int,
            display: handles.display,
            config: handles.config,
            context: handles.context,
            surface_width: width as c_int,
            surface_height: height as c_int,
            scaling_option: ctx.scaling_option().into(),
            game_type: ctx.game_type().into(),
        };
        unsafe { (self.vtable.create)(&params, &*callbacks) };

        self.host = Some(host);
        self.callbacks = Some(callbacks);
    }

    fn run(&mut self, ctx: &mut EngineContext<'_, D, A>) -> i32 {
        let args: Vec<CString> = ctx
            .args()
            .iter()
            .filter_map(|arg| match CString::new(arg.as_str()) {
                Ok(arg) => Some(arg),
                Err(_) => {
                    log::warn!("Dropping engine argument with interior nul: {arg:?}");
                    None
                }
            })
            .collect();
        let argv: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();

        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.run = ctx as *mut EngineContext<'_, D, A> as *mut c_void;
        }
        let status = unsafe { (self.vtable.main)(argv.len() as c_int, argv.as_ptr()) };
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.run = ptr::null_mut();
        }

        status
    }

    fn destroy(&mut self) {
        unsafe { (self.vtable.destroy)() };
        self.callbacks = None;
        self.host = None;
    }
}

unsafe fn host_from_ptr<'a>(host: *const c_void) -> &'a dyn EngineHost {
    &**host.cast::<Arc<dyn EngineHost>>()
}

fn visit_paths(paths: Vec<PathBuf>, visit: PathVisitor, user: *mut c_void) {
    for path in paths {
        match CString::new(path.as_os_str().as_bytes()) {
            Ok(path) => unsafe { visit(user, path.as_ptr()) },
            Err(_) => log::warn!("Skipping path with interior nul: {}", path.display()),
        }
    }
}

extern "C" fn get_dpi(host: *const c_void, values: *mut c_float) {
    abort_on_panic(|| {
        let (x, y) = unsafe { host_from_ptr(host) }.dpi();
        if !values.is_null() {
            unsafe {
                *values = x;
                *values.add(1) = y;
            }
        }
    })
}

extern "C" fn display_message(host: *const c_void, message: *const c_char) {
    abort_on_panic(|| {
        if let Some(message) = try_get_str_from_ptr(message) {
            unsafe { host_from_ptr(host) }.display_message(&message);
        }
    })
}

extern "C" fn set_window_caption(host: *const c_void, caption: *const c_char) {
    abort_on_panic(|| {
        if let Some(caption) = try_get_str_from_ptr(caption) {
            unsafe { host_from_ptr(host) }.set_window_caption(&caption);
        }
    })
}

extern "C" fn show_virtual_keyboard(host: *const c_void, visible: c_int) {
    abort_on_panic(|| unsafe { host_from_ptr(host) }.show_virtual_keyboard(visible != 0))
}

extern "C" fn for_each_plugin_directory(host: *const c_void, visit: PathVisitor, user: *mut c_void) {
    abort_on_panic(|| {
        let paths = unsafe { host_from_ptr(host) }.plugin_directories();
        visit_paths(paths, visit, user)
    })
}

extern "C" fn for_each_sys_archive(host: *const c_void, visit: PathVisitor, user: *mut c_void) {
    abort_on_panic(|| {
        let paths = unsafe { host_from_ptr(host) }.sys_archives();
        visit_paths(paths, visit, user)
    })
}

extern "C" fn on_game_option(host: *const c_void, option: c_int) {
    abort_on_panic(|| match GameOption::try_from(option) {
        Ok(option) => unsafe { host_from_ptr(host) }.on_game_option(option),
        Err(_) => log::warn!("Ignoring unknown game option {option}"),
    })
}

extern "C" fn on_game_display_started(host: *const c_void) {
    abort_on_panic(|| unsafe { host_from_ptr(host) }.on_game_display_started())
}

extern "C" fn on_game_event(host: *const c_void, event: c_int) {
    abort_on_panic(|| match GameEvent::try_from(event) {
        Ok(event) => unsafe { host_from_ptr(host) }.on_game_event(event),
        Err(_) => log::warn!("Ignoring unknown game event {event}"),
    })
}

extern "C" fn poll_surface<D: DisplayPlatform, A: AudioPlatform>(
    run: *mut c_void,
    width: *mut c_int,
    height: *mut c_int,
) -> c_int {
    abort_on_panic(|| {
        if run.is_null() {
            log::error!("Surface polled outside of the engine's main loop");
            return SURFACE_ERROR;
        }
        let ctx = unsafe { &mut *run.cast::<EngineContext<'_, D, A>>() };

        let mut result = SURFACE_UNCHANGED;
        let polled = ctx.poll_surface_events(|change| match change {
            SurfaceChange::Resized {
                width: new_width,
                height: new_height,
            } => {
                unsafe {
                    if !width.is_null() {
                        *width = new_width as c_int;
                    }
                    if !height.is_null() {
                        *height = new_height as c_int;
                    }
                }
                result = SURFACE_RESIZED;
            }
            SurfaceChange::Lost => result = SURFACE_LOST,
        });
        match polled {
            Ok(()) => result,
            Err(err) => {
                log::error!("{err}");
                SURFACE_ERROR
            }
        }
    })
}

// Platform surface creation from raw window handles.
//
// ash has no surface helper for the raw-window-handle types winit hands
// out, so the platform branches live here.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

use crate::error::SetupError;

/// Instance extensions the current windowing platform needs.
pub fn required_instance_extensions(
    display: RawDisplayHandle,
) -> Result<Vec<&'static CStr>, SetupError> {
    let mut extensions = vec![ash::extensions::khr::Surface::name()];

    match display {
        RawDisplayHandle::Xlib(_) => {
            extensions.push(ash::extensions::khr::XlibSurface::name());
        }
        RawDisplayHandle::Wayland(_) => {
            extensions.push(ash::extensions::khr::WaylandSurface::name());
        }
        RawDisplayHandle::Windows(_) => {
            extensions.push(ash::extensions::khr::Win32Surface::name());
        }
        _ => return Err(SetupError::UnsupportedPlatform("display handle")),
    }

    Ok(extensions)
}

/// Create a VkSurfaceKHR for the window behind the raw handles.
pub fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR, SetupError> {
    match (display, window) {
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .map(|ptr| ptr.as_ptr())
                .unwrap_or(std::ptr::null_mut());

            let info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy as *mut _)
                .window(window.window);

            let loader = ash::extensions::khr::XlibSurface::new(entry, instance);
            unsafe { loader.create_xlib_surface(&info, None) }.map_err(SetupError::Instance)
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());

            let loader = ash::extensions::khr::WaylandSurface::new(entry, instance);
            unsafe { loader.create_wayland_surface(&info, None) }.map_err(SetupError::Instance)
        }
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(window)) => {
            let hinstance = window
                .hinstance
                .map(|h| h.get() as *const std::ffi::c_void)
                .unwrap_or(std::ptr::null());

            let info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(window.hwnd.get() as *const std::ffi::c_void);

            let loader = ash::extensions::khr::Win32Surface::new(entry, instance);
            unsafe { loader.create_win32_surface(&info, None) }.map_err(SetupError::Instance)
        }
        _ => Err(SetupError::UnsupportedPlatform("window handle")),
    }
}

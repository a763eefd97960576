//! Live enumeration of attached pointing devices (IOKit).
//!
//! The gesture engine needs to know, per event, whether an external mouse is
//! currently attached. Devices come and go between events, so every call hits
//! the IOKit registry; nothing is cached here.

use core_foundation::{
    base::{CFAllocatorRef, CFTypeRef, TCFType},
    dictionary::CFMutableDictionaryRef,
    string::{CFString, CFStringRef},
};
use libc::{c_char, kern_return_t, mach_port_t};
use tracing::trace;

/// IOKit object handles are mach ports.
type IoObject = mach_port_t;

// Minimal IOKit surface needed for the pointing-device query.
#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    fn IOServiceMatching(name: *const c_char) -> CFMutableDictionaryRef;
    fn IOServiceGetMatchingServices(
        main_port: mach_port_t,
        matching: CFMutableDictionaryRef,
        existing: *mut IoObject,
    ) -> kern_return_t;
    fn IOIteratorNext(iterator: IoObject) -> IoObject;
    fn IOObjectRelease(object: IoObject) -> kern_return_t;
    fn IORegistryEntryCreateCFProperty(
        entry: IoObject,
        key: CFStringRef,
        allocator: CFAllocatorRef,
        options: u32,
    ) -> CFTypeRef;
}

/// Live check against the OS device registry.
///
/// Implementations must be cheap enough to run on every ambiguous event and
/// must not cache across calls: attach/detach has to be observed live.
pub trait DeviceQuery: Send + Sync {
    /// Is an external pointing device currently attached?
    fn external_pointer_present(&self) -> bool;
}

/// [`DeviceQuery`] backed by the IOKit registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDeviceQuery;

impl DeviceQuery for SystemDeviceQuery {
    fn external_pointer_present(&self) -> bool {
        external_pointer_present()
    }
}

/// Built-in trackpads and touch surfaces register under the pointing class
/// too; they are excluded by product name so only genuinely external mice
/// count.
fn is_builtin_surface(product: &str) -> bool {
    let name = product.to_ascii_lowercase();
    name.contains("trackpad") || name.contains("touch")
}

/// Read the "Product" registry property of a service, if it has one.
fn device_product_name(service: IoObject) -> Option<String> {
    let key = CFString::new("Product");
    // NULL allocator selects the default.
    let allocator: CFAllocatorRef = std::ptr::null();
    let prop =
        unsafe { IORegistryEntryCreateCFProperty(service, key.as_concrete_TypeRef(), allocator, 0) };
    if prop.is_null() {
        return None;
    }
    // The Product property is a registry string.
    let s = unsafe { CFString::wrap_under_create_rule(prop as CFStringRef) };
    Some(s.to_string())
}

/// Walk every registered `IOHIDPointing` service (the class external USB and
/// Bluetooth mice register under) and report whether any of them is not a
/// built-in touch surface.
fn external_pointer_present() -> bool {
    let matching = unsafe { IOServiceMatching(c"IOHIDPointing".as_ptr()) };
    if matching.is_null() {
        return false;
    }

    let mut iter: IoObject = 0;
    // Port 0 selects the default main port. The call consumes the matching
    // dictionary reference, so no release on our side.
    let kr = unsafe { IOServiceGetMatchingServices(0, matching, &mut iter) };
    if kr != 0 || iter == 0 {
        return false;
    }

    let mut found = false;
    loop {
        let service = unsafe { IOIteratorNext(iter) };
        if service == 0 {
            break;
        }
        let name = device_product_name(service);
        unsafe { IOObjectRelease(service) };
        match name {
            Some(n) if is_builtin_surface(&n) => {
                trace!(device = %n, "skipping_builtin_pointing_device");
            }
            Some(n) => {
                trace!(device = %n, "external_pointing_device_present");
                found = true;
            }
            // A class-matched device without a product name still counts:
            // prefer suppressing the feature over misfiring on mouse input.
            None => found = true,
        }
        if found {
            break;
        }
    }
    unsafe { IOObjectRelease(iter) };
    found
}

//! IOKit HID manager for the device-matching backend (macOS only).

use std::ffi::c_void;
use std::ptr;
use std::time::Duration;

use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{kCFAllocatorDefault, CFAllocatorRef, CFIndex, CFRelease, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRef};
use core_foundation::string::{CFString, CFStringRef};
use tracing::{debug, error};

use crate::controller::hid::{DeviceMatch, HidEvent, HidEventSink, HidManager};
use crate::controller::source::SourceError;

type IOReturn = i32;
type IOOptionBits = u32;
type IOHIDManagerRef = *mut c_void;
type IOHIDDeviceRef = *mut c_void;
type IOHIDValueRef = *mut c_void;
type IOHIDElementRef = *mut c_void;

type IOHIDDeviceCallback =
    extern "C" fn(context: *mut c_void, result: IOReturn, sender: *mut c_void, device: IOHIDDeviceRef);
type IOHIDValueCallback =
    extern "C" fn(context: *mut c_void, result: IOReturn, sender: *mut c_void, value: IOHIDValueRef);

const K_IO_RETURN_SUCCESS: IOReturn = 0;
const K_IOHID_OPTIONS_TYPE_NONE: IOOptionBits = 0;
const K_IOHID_VENDOR_ID_KEY: &str = "VendorID";
const K_IOHID_PRODUCT_ID_KEY: &str = "ProductID";

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    fn IOHIDManagerCreate(allocator: CFAllocatorRef, options: IOOptionBits) -> IOHIDManagerRef;
    fn IOHIDManagerSetDeviceMatchingMultiple(manager: IOHIDManagerRef, multiple: CFArrayRef);
    fn IOHIDManagerRegisterDeviceMatchingCallback(
        manager: IOHIDManagerRef,
        callback: IOHIDDeviceCallback,
        context: *mut c_void,
    );
    fn IOHIDManagerRegisterDeviceRemovalCallback(
        manager: IOHIDManagerRef,
        callback: IOHIDDeviceCallback,
        context: *mut c_void,
    );
    fn IOHIDManagerRegisterInputValueCallback(
        manager: IOHIDManagerRef,
        callback: IOHIDValueCallback,
        context: *mut c_void,
    );
    fn IOHIDManagerOpen(manager: IOHIDManagerRef, options: IOOptionBits) -> IOReturn;
    fn IOHIDManagerClose(manager: IOHIDManagerRef, options: IOOptionBits) -> IOReturn;
    fn IOHIDManagerScheduleWithRunLoop(
        manager: IOHIDManagerRef,
        run_loop: CFRunLoopRef,
        mode: CFStringRef,
    );
    fn IOHIDManagerUnscheduleFromRunLoop(
        manager: IOHIDManagerRef,
        run_loop: CFRunLoopRef,
        mode: CFStringRef,
    );
    fn IOHIDValueGetElement(value: IOHIDValueRef) -> IOHIDElementRef;
    fn IOHIDValueGetIntegerValue(value: IOHIDValueRef) -> CFIndex;
    fn IOHIDElementGetUsagePage(element: IOHIDElementRef) -> u32;
    fn IOHIDElementGetUsage(element: IOHIDElementRef) -> u32;
}

/// Owns one `IOHIDManager` and the sink its callbacks write to.
///
/// The manager is scheduled on the run loop of the thread that opened it, so
/// this type must stay on that thread. Raw pointers keep it `!Send`.
pub struct IoKitManager {
    manager: IOHIDManagerRef,
    run_loop: Option<CFRunLoop>,
    opened: bool,
    // Boxed sink passed as callback context, freed on drop
    context: *mut HidEventSink,
}

impl IoKitManager {
    pub fn new() -> Self {
        Self {
            manager: ptr::null_mut(),
            run_loop: None,
            opened: false,
            context: ptr::null_mut(),
        }
    }

    fn matching_array(matches: &[DeviceMatch]) -> CFArray<CFDictionary<CFString, CFNumber>> {
        let vendor_key = CFString::from_static_string(K_IOHID_VENDOR_ID_KEY);
        let product_key = CFString::from_static_string(K_IOHID_PRODUCT_ID_KEY);
        let dictionaries: Vec<CFDictionary<CFString, CFNumber>> = matches
            .iter()
            .map(|m| {
                CFDictionary::from_CFType_pairs(&[
                    (vendor_key.clone(), CFNumber::from(m.vendor_id as i32)),
                    (product_key.clone(), CFNumber::from(m.product_id as i32)),
                ])
            })
            .collect();
        CFArray::from_CFTypes(&dictionaries)
    }
}

impl Default for IoKitManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HidManager for IoKitManager {
    fn open(&mut self, matches: &[DeviceMatch], sink: HidEventSink) -> Result<(), SourceError> {
        let manager = unsafe { IOHIDManagerCreate(kCFAllocatorDefault, K_IOHID_OPTIONS_TYPE_NONE) };
        if manager.is_null() {
            return Err(SourceError::ManagerCreate);
        }
        self.manager = manager;
        self.context = Box::into_raw(Box::new(sink));
        let context = self.context.cast::<c_void>();

        let matching = Self::matching_array(matches);
        unsafe {
            IOHIDManagerSetDeviceMatchingMultiple(manager, matching.as_concrete_TypeRef());
            IOHIDManagerRegisterDeviceMatchingCallback(manager, device_added, context);
            IOHIDManagerRegisterDeviceRemovalCallback(manager, device_removed, context);
            IOHIDManagerRegisterInputValueCallback(manager, input_value, context);
        }

        let result = unsafe { IOHIDManagerOpen(manager, K_IOHID_OPTIONS_TYPE_NONE) };
        if result != K_IO_RETURN_SUCCESS {
            return Err(SourceError::ManagerOpen(result));
        }
        self.opened = true;

        let run_loop = CFRunLoop::get_current();
        unsafe {
            IOHIDManagerScheduleWithRunLoop(
                manager,
                run_loop.as_concrete_TypeRef(),
                kCFRunLoopDefaultMode,
            );
        }
        self.run_loop = Some(run_loop);
        debug!("IOHIDManager scheduled on current run loop");
        Ok(())
    }

    fn pump(&mut self, timeout: Duration) {
        CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, timeout, false);
    }
}

impl Drop for IoKitManager {
    fn drop(&mut self) {
        if !self.manager.is_null() {
            unsafe {
                if let Some(run_loop) = &self.run_loop {
                    IOHIDManagerUnscheduleFromRunLoop(
                        self.manager,
                        run_loop.as_concrete_TypeRef(),
                        kCFRunLoopDefaultMode,
                    );
                }
                if self.opened {
                    let result = IOHIDManagerClose(self.manager, K_IOHID_OPTIONS_TYPE_NONE);
                    if result != K_IO_RETURN_SUCCESS {
                        error!("Failed to close HID manager: IOReturn {:#x}", result);
                    }
                }
                CFRelease(self.manager as *const c_void);
            }
        }
        // Released above, no callback can observe the sink anymore
        if !self.context.is_null() {
            drop(unsafe { Box::from_raw(self.context) });
        }
    }
}

fn sink<'a>(context: *mut c_void) -> Option<&'a HidEventSink> {
    unsafe { context.cast::<HidEventSink>().as_ref() }
}

extern "C" fn device_added(
    context: *mut c_void,
    _result: IOReturn,
    _sender: *mut c_void,
    _device: IOHIDDeviceRef,
) {
    if let Some(sink) = sink(context) {
        sink.push(HidEvent::DeviceAdded);
    }
}

extern "C" fn device_removed(
    context: *mut c_void,
    _result: IOReturn,
    _sender: *mut c_void,
    _device: IOHIDDeviceRef,
) {
    if let Some(sink) = sink(context) {
        sink.push(HidEvent::DeviceRemoved);
    }
}

extern "C" fn input_value(
    context: *mut c_void,
    _result: IOReturn,
    _sender: *mut c_void,
    value: IOHIDValueRef,
) {
    let Some(sink) = sink(context) else {
        return;
    };
    let element = unsafe { IOHIDValueGetElement(value) };
    if element.is_null() {
        return;
    }
    let (page, usage, value) = unsafe {
        (
            IOHIDElementGetUsagePage(element),
            IOHIDElementGetUsage(element),
            IOHIDValueGetIntegerValue(value),
        )
    };
    sink.push(HidEvent::InputValue {
        page,
        usage,
        value: value as i64,
    });
}

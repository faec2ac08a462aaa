//! C ABI for the telemetry and crash engines
//!
//! Host applications create a handle, call `update` once per sample with the
//! elapsed ride time, and free the handle when the ride ends:
//!
//! ```c
//! OrtTelemetryHandle *h = ort_telemetry_new();
//! OrtTelemetryOutput out;
//! while (riding) {
//!     OrtTelemetryInput in = sample_bus();
//!     if (ort_telemetry_update(h, now_s(), &in, &out) == ORT_OK) show(&out);
//! }
//! ort_telemetry_free(&h);  /* h is NULL afterwards */
//! ```
//!
//! Records are plain structs of `double` with the same field names and order
//! as the vehicle bus, so hosts can fill them field by field.

#![allow(non_snake_case)]

use ort_core::{
    CrashInput, CrashOutput, Engine, EngineError, EngineHandle, TelemetryInput, TelemetryOutput,
};
use ort_engines::{CrashEngine, TelemetryEngine};
use tracing::{debug, warn};

/// Result of every C entry point
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtStatus {
    Ok = 0,
    /// Handle was null (never created, or already freed)
    NullHandle = 1,
    /// Input or output pointer was null
    NullPointer = 2,
    NonMonotonicTime = 3,
    NonFiniteTime = 4,
    NonFiniteInput = 5,
}

impl From<&EngineError> for OrtStatus {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::NonMonotonicTime { .. } => Self::NonMonotonicTime,
            EngineError::NonFiniteTime(_) => Self::NonFiniteTime,
            EngineError::NonFiniteInput { .. } => Self::NonFiniteInput,
        }
    }
}

// Declares a `#[repr(C)]` mirror of a frame record. Fields must be listed in
// the record's positional order; the conversions go through `to_array` and
// `from_array`, so a wrong count fails to compile and a wrong order fails
// `test_c_records_match_wire_names`.
macro_rules! c_record {
    ($(#[$meta:meta])* $name:ident <=> $record:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default, PartialEq)]
        pub struct $name {
            $(pub $field: f64,)+
        }

        impl $name {
            #[cfg(test)]
            const FIELD_NAMES: &'static [&'static str] = &[$(stringify!($field)),+];
        }

        impl From<$name> for $record {
            fn from(c: $name) -> Self {
                $record::from_array([$(c.$field),+])
            }
        }

        impl From<$record> for $name {
            fn from(record: $record) -> Self {
                let [$($field),+] = record.to_array();
                Self { $($field),+ }
            }
        }
    };
}

c_record! {
    /// Vehicle bus sample for the telemetry engine
    OrtTelemetryInput <=> TelemetryInput {
        Voltage, Current, Speed, VehicleMode, SOC, BMSRemCap, Subridemodes, RPM,
        CurrentGear, ClutchStatus, Torque, DeAcc, Ax, Ay, Az, motorswitchstatus,
        VICFlag, Vacationmodeoff, RightIndicator,
    }
}

c_record! {
    /// Derived telemetry
    OrtTelemetryOutput <=> TelemetryOutput {
        CurrentMaxSpeed, CurrentAvgSpeed, Current_distancetravelledraw,
        Current_Mintime0to60kmph, Current_RideDuration, CO2cons_current,
        Current_EnergykWhr, Current_RideEffWhkm, Amperehour_Calc,
        FallDetect_Stationary, FallDetect_Motion, gForce, LeanAngle,
        Leftguageeff, power, Range, CTFullcharge, FullchargeECORange,
        CT25percharge, CT50percharge, CT75percharge, EcoRange25percharge,
        EcoRange50percharge, EcoRange75percharge, SuggestedGear, RIndiflag,
        pitchangle,
    }
}

c_record! {
    /// Sample for the crash engine
    OrtCrashInput <=> CrashInput { Speed, Curr, Ay, EntropyDiff }
}

c_record! {
    OrtCrashOutput <=> CrashOutput { CrashFlag }
}

/// Opaque telemetry session
pub struct OrtTelemetryHandle(EngineHandle<TelemetryEngine>);

/// Opaque crash session
pub struct OrtCrashHandle(EngineHandle<CrashEngine>);

/// Shared body of the `update` entry points
///
/// # Safety
/// Non-null pointers must be valid and properly aligned; `handle` must not be
/// used concurrently from another thread.
unsafe fn update_raw<E, I, O>(
    handle: Option<&mut EngineHandle<E>>,
    time: f64,
    input: *const I,
    output: *mut O,
) -> OrtStatus
where
    E: Engine,
    I: Copy + Into<E::Input>,
    O: From<E::Output>,
{
    let Some(handle) = handle else {
        return OrtStatus::NullHandle;
    };
    if input.is_null() || output.is_null() {
        return OrtStatus::NullPointer;
    }

    let input: E::Input = (*input).into();
    match handle.update(time, &input) {
        Ok(result) => {
            output.write(O::from(result));
            OrtStatus::Ok
        }
        Err(e) => {
            warn!("{} update rejected: {}", handle.name(), e);
            OrtStatus::from(&e)
        }
    }
}

/// Create a telemetry session. Free it with [`ort_telemetry_free`].
#[no_mangle]
pub extern "C" fn ort_telemetry_new() -> *mut OrtTelemetryHandle {
    debug!("Creating telemetry handle");
    Box::into_raw(Box::new(OrtTelemetryHandle(EngineHandle::create())))
}

/// Free a telemetry session and null the caller's pointer
///
/// # Safety
/// `handle` must be null or point to a pointer returned by
/// [`ort_telemetry_new`] (or already nulled by a previous free).
#[no_mangle]
pub unsafe extern "C" fn ort_telemetry_free(handle: *mut *mut OrtTelemetryHandle) -> OrtStatus {
    if handle.is_null() || (*handle).is_null() {
        return OrtStatus::NullHandle;
    }
    let owned = Box::from_raw(*handle);
    *handle = std::ptr::null_mut();
    let summary = owned.0.destroy();
    debug!("Freed telemetry handle after {} steps", summary.steps);
    OrtStatus::Ok
}

/// Apply one sample at elapsed ride time `app_time_s`
///
/// `output` is written only when `Ok` is returned.
///
/// # Safety
/// `handle` must be null or a live handle from [`ort_telemetry_new`];
/// `input` and `output` must be null or valid for reads/writes.
#[no_mangle]
pub unsafe extern "C" fn ort_telemetry_update(
    handle: *mut OrtTelemetryHandle,
    app_time_s: f64,
    input: *const OrtTelemetryInput,
    output: *mut OrtTelemetryOutput,
) -> OrtStatus {
    update_raw(handle.as_mut().map(|h| &mut h.0), app_time_s, input, output)
}

/// Create a crash session. Free it with [`ort_crash_free`].
#[no_mangle]
pub extern "C" fn ort_crash_new() -> *mut OrtCrashHandle {
    debug!("Creating crash handle");
    Box::into_raw(Box::new(OrtCrashHandle(EngineHandle::create())))
}

/// Free a crash session and null the caller's pointer
///
/// # Safety
/// Same contract as [`ort_telemetry_free`].
#[no_mangle]
pub unsafe extern "C" fn ort_crash_free(handle: *mut *mut OrtCrashHandle) -> OrtStatus {
    if handle.is_null() || (*handle).is_null() {
        return OrtStatus::NullHandle;
    }
    let owned = Box::from_raw(*handle);
    *handle = std::ptr::null_mut();
    let summary = owned.0.destroy();
    debug!("Freed crash handle after {} steps", summary.steps);
    OrtStatus::Ok
}

/// Apply one crash sample at elapsed ride time `app_time_s`
///
/// # Safety
/// Same contract as [`ort_telemetry_update`].
#[no_mangle]
pub unsafe extern "C" fn ort_crash_update(
    handle: *mut OrtCrashHandle,
    app_time_s: f64,
    input: *const OrtCrashInput,
    output: *mut OrtCrashOutput,
) -> OrtStatus {
    update_raw(handle.as_mut().map(|h| &mut h.0), app_time_s, input, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn cruising(speed: f64) -> OrtTelemetryInput {
        OrtTelemetryInput {
            Voltage: 72.0,
            Speed: speed,
            SOC: 80.0,
            Az: 9.80665,
            ..Default::default()
        }
    }

    #[test]
    fn test_c_records_match_wire_names() {
        assert_eq!(OrtTelemetryInput::FIELD_NAMES, TelemetryInput::FIELD_NAMES);
        assert_eq!(OrtTelemetryOutput::FIELD_NAMES, TelemetryOutput::FIELD_NAMES);
        assert_eq!(OrtCrashInput::FIELD_NAMES, CrashInput::FIELD_NAMES);
        assert_eq!(OrtCrashOutput::FIELD_NAMES, CrashOutput::FIELD_NAMES);
        assert_eq!(
            std::mem::size_of::<OrtTelemetryOutput>(),
            27 * std::mem::size_of::<f64>()
        );
    }

    #[test]
    fn test_telemetry_lifecycle() {
        unsafe {
            let mut handle = ort_telemetry_new();
            assert!(!handle.is_null());
            let mut out = OrtTelemetryOutput::default();

            let status = ort_telemetry_update(handle, 1.0, &cruising(36.0), &mut out);
            assert_eq!(status, OrtStatus::Ok);
            let before = out.Current_distancetravelledraw;

            let status = ort_telemetry_update(handle, 2.0, &cruising(36.0), &mut out);
            assert_eq!(status, OrtStatus::Ok);
            assert_eq!(out.CurrentMaxSpeed, 36.0);
            assert!((out.Current_distancetravelledraw - before - 0.01).abs() < 1e-9);

            assert_eq!(ort_telemetry_free(&mut handle), OrtStatus::Ok);
            assert!(handle.is_null());
            assert_eq!(ort_telemetry_free(&mut handle), OrtStatus::NullHandle);
            assert_eq!(
                ort_telemetry_update(handle, 3.0, &cruising(36.0), &mut out),
                OrtStatus::NullHandle
            );
        }
    }

    #[test]
    fn test_rejected_update_leaves_output_untouched() {
        unsafe {
            let mut handle = ort_telemetry_new();
            let mut out = OrtTelemetryOutput::default();
            assert_eq!(
                ort_telemetry_update(handle, 5.0, &cruising(20.0), &mut out),
                OrtStatus::Ok
            );
            let snapshot = out;

            assert_eq!(
                ort_telemetry_update(handle, 4.0, &cruising(50.0), &mut out),
                OrtStatus::NonMonotonicTime
            );
            assert_eq!(
                ort_telemetry_update(handle, f64::NAN, &cruising(50.0), &mut out),
                OrtStatus::NonFiniteTime
            );
            let mut bad = cruising(50.0);
            bad.Ay = f64::INFINITY;
            assert_eq!(
                ort_telemetry_update(handle, 6.0, &bad, &mut out),
                OrtStatus::NonFiniteInput
            );
            assert_eq!(out, snapshot);

            assert_eq!(
                ort_telemetry_update(handle, 6.0, ptr::null(), &mut out),
                OrtStatus::NullPointer
            );
            assert_eq!(
                ort_telemetry_update(handle, 6.0, &cruising(50.0), ptr::null_mut()),
                OrtStatus::NullPointer
            );
            ort_telemetry_free(&mut handle);
        }
    }

    #[test]
    fn test_crash_zero_input_is_not_a_crash() {
        unsafe {
            let mut handle = ort_crash_new();
            let mut out = OrtCrashOutput { CrashFlag: -1.0 };
            assert_eq!(
                ort_crash_update(handle, 0.0, &OrtCrashInput::default(), &mut out),
                OrtStatus::Ok
            );
            assert_eq!(out.CrashFlag, 0.0);
            assert_eq!(ort_crash_free(&mut handle), OrtStatus::Ok);
            assert_eq!(ort_crash_free(ptr::null_mut()), OrtStatus::NullHandle);
        }
    }

    #[test]
    fn test_handles_are_isolated() {
        unsafe {
            let mut a = ort_telemetry_new();
            let mut b = ort_telemetry_new();
            let mut out_a = OrtTelemetryOutput::default();
            let mut out_b = OrtTelemetryOutput::default();

            for step in 0..20 {
                let t = step as f64 * 0.5;
                ort_telemetry_update(a, t, &cruising(60.0), &mut out_a);
                ort_telemetry_update(b, t, &cruising(10.0), &mut out_b);
            }
            assert_eq!(out_a.CurrentMaxSpeed, 60.0);
            assert_eq!(out_b.CurrentMaxSpeed, 10.0);

            ort_telemetry_free(&mut a);
            ort_telemetry_free(&mut b);
        }
    }
}

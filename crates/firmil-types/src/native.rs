//! Device-native operations
//!
//! Methods resolved to one of these run firmware code instead of a managed body.
//! The numeric ids are part of the wire contract; firmware built against another
//! table version reports them as unknown.

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

macro_rules! native_methods {
    ($($(#[$doc:meta])* $name:ident = $id:literal),* $(,)?) => {
        /// Numbered operation implemented by the firmware
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum NativeMethod {
            $($(#[$doc])* $name = $id,)*
        }

        impl NativeMethod {
            /// Every entry of the table
            pub const ALL: &'static [NativeMethod] = &[$(Self::$name,)*];

            /// Look up an id
            pub fn from_u16(id: u16) -> Option<Self> {
                match id {
                    $($id => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Get the name of this operation
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }
        }
    };
}

native_methods! {
    /// No operation
    None = 0,
    /// `Object.Equals`
    ObjectEquals = 1,
    /// `Object.ToString`
    ObjectToString = 2,
    /// `Object.GetHashCode`
    ObjectGetHashCode = 3,
    /// `Object.MemberwiseClone`
    ObjectMemberwiseClone = 4,
    /// `Object.GetType`
    ObjectGetType = 5,
    /// Empty string constructor
    StringCtor0 = 10,
    /// String from char and count
    StringCtor1 = 11,
    /// String from char array
    StringCtor2 = 12,
    /// `String.Equals`
    StringEquals = 13,
    /// `String.GetHashCode`
    StringGetHashCode = 14,
    /// Indexer read
    StringGetElem = 15,
    /// Indexer write, used by string builders
    StringSetElem = 16,
    /// `String.FastAllocateString`
    StringFastAllocateString = 17,
    /// `String.Length`
    StringLength = 18,
    /// Query a pin's mode
    HardwareGetPinMode = 30,
    /// Set a pin's mode
    HardwareSetPinMode = 31,
    /// Read a digital pin
    HardwareReadPin = 32,
    /// Write a digital pin
    HardwareWritePin = 33,
    /// Whether a pin supports a mode
    HardwareIsPinModeSupported = 34,
    /// Number of pins
    HardwareGetPinCount = 35,
    /// Millisecond tick counter
    EnvironmentTickCount = 40,
    /// 64-bit millisecond tick counter
    EnvironmentTickCount64 = 41,
    /// Microsecond counter
    StopwatchGetTimestamp = 42,
    /// Busy-wait for microseconds
    SleepMicroseconds = 43,
    /// Suspend the task for milliseconds
    ThreadSleep = 44,
    /// Give up the processor to another task
    ThreadYield = 45,
    /// `Monitor.Enter`
    MonitorEnter = 50,
    /// `Monitor.Exit`
    MonitorExit = 51,
    /// `Interlocked.CompareExchange` on 32-bit slots
    InterlockedCompareExchangeInt32 = 52,
    /// `Interlocked.CompareExchange` on references
    InterlockedCompareExchangeObject = 53,
    /// `Interlocked.Exchange` on 32-bit slots
    InterlockedExchangeInt32 = 54,
    /// `Interlocked.Increment`
    InterlockedIncrement = 55,
    /// `Interlocked.Decrement`
    InterlockedDecrement = 56,
    /// Performance counter
    InteropQueryPerformanceCounter = 60,
    /// Performance counter frequency
    InteropQueryPerformanceFrequency = 61,
    /// Hardware random bytes
    InteropGetRandomBytes = 62,
    /// `ByReference<T>` constructor
    ByReferenceCtor = 70,
    /// `ByReference<T>.Value`
    ByReferenceValue = 71,
    /// `Array.Copy`
    ArrayCopy = 80,
    /// `Array.Clear`
    ArrayClear = 81,
    /// Array length
    ArrayGetLength = 82,
    /// `Math.Sqrt`
    MathSqrt = 90,
    /// `Math.Sin`
    MathSin = 91,
    /// `Math.Cos`
    MathCos = 92,
    /// `Math.Pow`
    MathPow = 93,
    /// Debug output of an integer
    DebugWriteInt = 100,
    /// Debug output of a string
    DebugWriteString = 101,
}

impl NativeMethod {
    /// Look up an id or fail
    pub fn try_from_u16(id: u16) -> TypeResult<Self> {
        Self::from_u16(id).ok_or(TypeError::UnknownNativeMethod(id))
    }

    /// Wire id
    #[inline]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Whether this operation belongs to the hardware capability surface
    pub const fn is_hardware(self) -> bool {
        matches!(
            self,
            Self::HardwareGetPinMode
                | Self::HardwareSetPinMode
                | Self::HardwareReadPin
                | Self::HardwareWritePin
                | Self::HardwareIsPinModeSupported
                | Self::HardwareGetPinCount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip_the_table() {
        for &op in NativeMethod::ALL {
            assert_eq!(NativeMethod::from_u16(op.id()), Some(op), "{}", op.name());
        }
    }

    #[test]
    fn test_unknown_id() {
        assert!(matches!(
            NativeMethod::try_from_u16(999),
            Err(TypeError::UnknownNativeMethod(999))
        ));
    }

    #[test]
    fn test_hardware_surface() {
        let hw: Vec<_> = NativeMethod::ALL.iter().filter(|m| m.is_hardware()).collect();
        assert_eq!(hw.len(), 6);
    }
}

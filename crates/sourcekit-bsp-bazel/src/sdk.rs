//! Apple SDK selection for a compile action.
//!
//! Bazel leaves `__BAZEL_XCODE_SDKROOT__` in the command line and records the
//! platform in the action environment. The paths below assume Xcode's default
//! install location; a future version could ask `xcode-select -p` and
//! `xcrun --sdk <platform> --show-sdk-path` instead.

use crate::aquery::Action;
use crate::error::{Error, Result};

pub const XCODE_DEVELOPER_DIR: &str = "/Applications/Xcode.app/Contents/Developer/";

pub const MACOS_SDK_ROOT: &str = "/Applications/Xcode.app/Contents/Developer/Platforms/MacOSX.platform/Developer/SDKs/MacOSX.sdk";

pub const IPHONE_SIMULATOR_SDK_ROOT: &str = "/Applications/Xcode.app/Contents/Developer/Platforms/iPhoneSimulator.platform/Developer/SDKs/iPhoneSimulator.sdk";

const SDK_PLATFORM_VAR: &str = "APPLE_SDK_PLATFORM";

/// Pick the SDK root that substitutes the SDK placeholder in this action's
/// arguments. Anything that is not the iPhone simulator compiles against the
/// macOS SDK.
pub fn select_sdk_root(action: &Action) -> Result<&'static str> {
    let platform = action.env(SDK_PLATFORM_VAR).ok_or_else(|| {
        Error::Custom(format!("action environment has no {SDK_PLATFORM_VAR}"))
    })?;
    if platform == "iPhoneSimulator" {
        Ok(IPHONE_SIMULATOR_SDK_ROOT)
    } else {
        Ok(MACOS_SDK_ROOT)
    }
}

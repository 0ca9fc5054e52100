//! Device identifier space (spec §6): one enum tagging every tracked
//! input/output sink, shared verbatim by both sides of the wire so a
//! `device_id` byte means the same thing to host and headset.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceId {
    Head,

    LeftGrip,
    LeftAim,
    LeftPalm,
    RightGrip,
    RightAim,
    RightPalm,

    LeftPinchPose,
    LeftPokePose,
    RightPinchPose,
    RightPokePose,

    EyeGaze,
    Face,
    Body,

    LeftControllerHaptic,
    RightControllerHaptic,
    LeftTriggerHaptic,
    RightTriggerHaptic,
    LeftThumbHaptic,
    RightThumbHaptic,

    XClick,
    XTouch,
    YClick,
    YTouch,
    MenuClick,
    SystemClick,
    SystemTouch,

    LeftSqueezeValue,
    LeftSqueezeForce,
    LeftSqueezeTouch,
    LeftTriggerValue,
    LeftTriggerTouch,
    LeftTriggerProximity,
    LeftTriggerCurl,
    LeftTriggerSlide,
    LeftThumbstickX,
    LeftThumbstickY,
    LeftThumbstickClick,
    LeftThumbstickTouch,
    LeftTrackpadX,
    LeftTrackpadY,
    LeftTrackpadClick,
    LeftTrackpadTouch,
    LeftTrackpadForce,
    LeftThumbrestTouch,
    LeftThumbrestForce,
    LeftStylusForce,

    AClick,
    ATouch,
    BClick,
    BTouch,

    RightSqueezeValue,
    RightSqueezeForce,
    RightSqueezeTouch,
    RightTriggerValue,
    RightTriggerTouch,
    RightTriggerProximity,
    RightTriggerCurl,
    RightTriggerSlide,
    RightThumbstickX,
    RightThumbstickY,
    RightThumbstickClick,
    RightThumbstickTouch,
    RightTrackpadX,
    RightTrackpadY,
    RightTrackpadClick,
    RightTrackpadTouch,
    RightTrackpadForce,
    RightThumbrestTouch,
    RightThumbrestForce,
    RightStylusForce,

    LeftHandInteractionPinchPose,
    LeftHandInteractionPokePose,
    LeftHandInteractionAimActivateValue,
    LeftHandInteractionGraspValue,
    LeftHandInteractionPinchValue,
    LeftHandInteractionPinchReady,
    RightHandInteractionPinchPose,
    RightHandInteractionPokePose,
    RightHandInteractionAimActivateValue,
    RightHandInteractionGraspValue,
    RightHandInteractionPinchValue,
    RightHandInteractionPinchReady,

    GenericTracker(u8),
}

impl DeviceId {
    /// Devices polled at high frequency (3ms step) by the tracking
    /// controller's resolver rather than at frame cadence (spec §4.5).
    pub fn is_high_frequency(self) -> bool {
        matches!(
            self,
            DeviceId::Head
                | DeviceId::LeftGrip
                | DeviceId::LeftAim
                | DeviceId::LeftPalm
                | DeviceId::RightGrip
                | DeviceId::RightAim
                | DeviceId::RightPalm
                | DeviceId::LeftPinchPose
                | DeviceId::LeftPokePose
                | DeviceId::RightPinchPose
                | DeviceId::RightPokePose
                | DeviceId::EyeGaze
        )
    }

    /// Face tracking can't extrapolate (spec §4.5): always sampled at
    /// prediction zero.
    pub fn is_face(self) -> bool {
        matches!(self, DeviceId::Face)
    }
}

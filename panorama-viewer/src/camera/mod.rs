//! Interior camera: pose, gesture reducer and animation curves

mod controller;
mod easing;
mod state;

pub use controller::{
    reduce, Animation, AnimationKind, CameraController, CameraSignal, ControllerState, GestureEvent, Phase, Pose,
    ZoomDirection,
};
pub use easing::ease_out_cubic;
pub use state::{wrap_angle, CameraState};

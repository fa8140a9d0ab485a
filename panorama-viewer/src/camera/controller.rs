//! Gesture state machine for the interior camera
//!
//! `reduce` is a pure, total function over `ControllerState`; the
//! `CameraController` owns one and feeds it events on the render thread.
//! Every new gesture-begin replaces whatever animation was running.

use glam::{Mat4, Vec2};

use super::easing::{ease_out_cubic, lerp};
use super::state::{wrap_angle, CameraState};
use crate::settings::CameraConfig;

/// Input to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    PanBegan,
    /// Drag delta in points since the previous change
    PanChanged { dx: f32, dy: f32 },
    /// Release velocity in points per second
    PanEnded { velocity: Vec2 },
    PinchBegan,
    /// Scale relative to the previous change; callers reset to 1 after each
    PinchChanged { scale: f32 },
    PinchEnded,
    DoubleTap,
    LongPressBegan,
    LongPressEnded,
    /// Frame advance in seconds
    Tick { dt: f32 },
    Cancel,
}

impl GestureEvent {
    fn begins_gesture(&self) -> bool {
        matches!(
            self,
            GestureEvent::PanBegan
                | GestureEvent::PinchBegan
                | GestureEvent::DoubleTap
                | GestureEvent::LongPressBegan
        )
    }
}

/// Acknowledgements emitted by the reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSignal {
    ResetComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Momentum,
    Reset,
    QuickZoom(ZoomDirection),
}

/// Yaw, pitch and field of view an animation moves between
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub yaw: f32,
    pub pitch: f32,
    pub field_of_view: f32,
}

impl Pose {
    fn of(camera: &CameraState) -> Self {
        Self {
            yaw: camera.yaw,
            pitch: camera.pitch,
            field_of_view: camera.field_of_view,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    pub kind: AnimationKind,
    pub from: Pose,
    pub to: Pose,
    pub duration: f32,
    pub elapsed: f32,
}

impl Animation {
    fn new(kind: AnimationKind, from: Pose, to: Pose, duration: f32) -> Self {
        Self {
            kind,
            from,
            to,
            duration,
            elapsed: 0.0,
        }
    }

    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    fn sample(&self) -> Pose {
        let t = ease_out_cubic(self.progress());
        Pose {
            yaw: lerp(self.from.yaw, self.to.yaw, t),
            pitch: lerp(self.from.pitch, self.to.pitch, t),
            field_of_view: lerp(self.from.field_of_view, self.to.field_of_view, t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Idle,
    Panning,
    Pinching,
    Animating(Animation),
    /// Long-press zoom finished, finger still down
    QuickZoomHeld,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub camera: CameraState,
    pub phase: Phase,
    /// A long press is down; survives other gestures interrupting the zoom
    pub long_press_held: bool,
}

impl ControllerState {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            camera: CameraState::new(config.default_fov),
            phase: Phase::Idle,
            long_press_held: false,
        }
    }
}

/// Apply one event. Never fails; unknown combinations leave the state as is.
pub fn reduce(
    state: ControllerState,
    event: GestureEvent,
    config: &CameraConfig,
) -> (ControllerState, Option<CameraSignal>) {
    let mut camera = state.camera;
    let mut phase = state.phase;
    let mut long_press_held = state.long_press_held;
    let mut signal = None;

    if event.begins_gesture() && matches!(phase, Phase::Animating(_)) {
        // Last writer wins: freeze the animation where it is
        phase = Phase::Idle;
    }

    match event {
        GestureEvent::PanBegan => {
            if phase != Phase::QuickZoomHeld {
                phase = Phase::Panning;
            }
        }
        GestureEvent::PanChanged { dx, dy } => {
            if dx.is_finite() && dy.is_finite() {
                camera.yaw += dx * config.sensitivity;
                camera.pitch += dy * config.sensitivity;
            }
            if !matches!(phase, Phase::QuickZoomHeld | Phase::Panning) {
                phase = Phase::Panning;
            }
        }
        GestureEvent::PanEnded { velocity } => {
            if phase != Phase::QuickZoomHeld {
                phase = start_momentum(&mut camera, velocity, config);
            }
        }
        GestureEvent::PinchBegan => {
            if phase != Phase::QuickZoomHeld {
                phase = Phase::Pinching;
            }
        }
        GestureEvent::PinchChanged { scale } => {
            if scale.is_finite() && scale > 0.0 {
                camera.field_of_view = config.clamp_fov(camera.field_of_view / scale);
            }
            if matches!(phase, Phase::Idle | Phase::Animating(_)) {
                phase = Phase::Pinching;
            }
        }
        GestureEvent::PinchEnded => {
            if phase == Phase::Pinching {
                phase = Phase::Idle;
            }
        }
        GestureEvent::DoubleTap => {
            let to = Pose {
                yaw: 0.0,
                pitch: 0.0,
                field_of_view: config.default_fov,
            };
            phase = Phase::Animating(Animation::new(
                AnimationKind::Reset,
                Pose::of(&camera),
                to,
                config.reset_duration,
            ));
        }
        GestureEvent::LongPressBegan => {
            long_press_held = true;
            let from = Pose::of(&camera);
            let to = Pose {
                field_of_view: config.quick_zoom_fov,
                ..from
            };
            phase = Phase::Animating(Animation::new(
                AnimationKind::QuickZoom(ZoomDirection::In),
                from,
                to,
                config.quick_zoom_duration,
            ));
        }
        GestureEvent::LongPressEnded => {
            if long_press_held {
                long_press_held = false;
                let from = Pose::of(&camera);
                let to = Pose {
                    field_of_view: config.default_fov,
                    ..from
                };
                phase = Phase::Animating(Animation::new(
                    AnimationKind::QuickZoom(ZoomDirection::Out),
                    from,
                    to,
                    config.quick_zoom_duration,
                ));
            }
        }
        GestureEvent::Tick { dt } => {
            if let Phase::Animating(mut animation) = phase {
                if dt.is_finite() && dt > 0.0 {
                    animation.elapsed += dt;
                }
                if animation.progress() >= 1.0 {
                    apply_pose(&mut camera, animation.to);
                    phase = match animation.kind {
                        AnimationKind::QuickZoom(ZoomDirection::In) => Phase::QuickZoomHeld,
                        AnimationKind::Reset => {
                            signal = Some(CameraSignal::ResetComplete);
                            Phase::Idle
                        }
                        AnimationKind::Momentum | AnimationKind::QuickZoom(ZoomDirection::Out) => {
                            Phase::Idle
                        }
                    };
                } else {
                    apply_pose(&mut camera, animation.sample());
                    phase = Phase::Animating(animation);
                }
            }
        }
        GestureEvent::Cancel => {
            phase = Phase::Idle;
            long_press_held = false;
        }
    }

    normalize(&mut camera, &phase, config);
    (
        ControllerState {
            camera,
            phase,
            long_press_held,
        },
        signal,
    )
}

fn start_momentum(camera: &mut CameraState, velocity: Vec2, config: &CameraConfig) -> Phase {
    if !velocity.is_finite() || velocity == Vec2::ZERO {
        return Phase::Idle;
    }

    let max_pitch = config.max_pitch();
    let from = Pose::of(camera);
    let scale = config.momentum_factor * config.sensitivity;
    let to = Pose {
        // Not wrapped, so the sweep follows the fling direction
        yaw: from.yaw + velocity.x * scale,
        pitch: (from.pitch + velocity.y * scale).clamp(-max_pitch, max_pitch),
        field_of_view: from.field_of_view,
    };

    camera.momentum_velocity = velocity;
    Phase::Animating(Animation::new(
        AnimationKind::Momentum,
        from,
        to,
        config.momentum_duration,
    ))
}

fn apply_pose(camera: &mut CameraState, pose: Pose) {
    camera.yaw = pose.yaw;
    camera.pitch = pose.pitch;
    camera.field_of_view = pose.field_of_view;
}

/// Re-establish the camera invariants after a transition
fn normalize(camera: &mut CameraState, phase: &Phase, config: &CameraConfig) {
    let max_pitch = config.max_pitch();
    camera.yaw = wrap_angle(camera.yaw);
    camera.pitch = if camera.pitch.is_finite() {
        camera.pitch.clamp(-max_pitch, max_pitch)
    } else {
        0.0
    };
    camera.field_of_view = if camera.field_of_view.is_finite() {
        config.clamp_fov(camera.field_of_view)
    } else {
        config.default_fov
    };

    let in_momentum = matches!(
        phase,
        Phase::Animating(Animation {
            kind: AnimationKind::Momentum,
            ..
        })
    );
    if !in_momentum {
        camera.momentum_velocity = Vec2::ZERO;
    }
}

/// Owner of the controller state on the render thread
pub struct CameraController {
    state: ControllerState,
    config: CameraConfig,
    aspect: f32,
}

impl CameraController {
    pub fn new(mut config: CameraConfig) -> Self {
        config.sanitize();
        Self {
            state: ControllerState::new(&config),
            config,
            aspect: 16.0 / 9.0,
        }
    }

    /// Feed one gesture event
    pub fn handle(&mut self, event: GestureEvent) -> Option<CameraSignal> {
        let (next, signal) = reduce(self.state, event, &self.config);
        if next.phase != self.state.phase {
            tracing::trace!(?event, phase = ?next.phase, "camera transition");
        }
        self.state = next;
        signal
    }

    /// Advance running animations by `dt` seconds
    pub fn tick(&mut self, dt: f32) -> Option<CameraSignal> {
        self.handle(GestureEvent::Tick { dt })
    }

    /// Snap back to the default pose, dropping any gesture in progress
    pub fn reset_to_defaults(&mut self) {
        self.state = ControllerState::new(&self.config);
    }

    pub fn camera(&self) -> &CameraState {
        &self.state.camera
    }

    pub fn phase(&self) -> &Phase {
        &self.state.phase
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.state.phase, Phase::Animating(_))
    }

    /// Update aspect ratio on resize
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.state.camera.view_matrix()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.state
            .camera
            .projection_matrix(self.aspect, self.config.near_plane, self.config.far_plane)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

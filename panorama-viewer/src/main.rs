//! Panorama Viewer - Main Entry Point
//!
//! Opens one panorama in a window and maps mouse, trackpad and keyboard input
//! onto the viewer's gestures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use panorama_viewer::camera::GestureEvent;
use panorama_viewer::render::{GpuContext, PanoramaRenderer, WindowSurface};
use panorama_viewer::resolver::{
    BundleAccessor, DirectoryBundle, EmptyBundle, FsStorageRoot, HttpFetcher, LocatorResolver,
};
use panorama_viewer::telemetry::{init_logging, LogConfig};
use panorama_viewer::{GeometryKind, PanoramaViewer, PanoramicImage, ViewerSettings, ViewerSignal};

const WINDOW_TITLE: &str = "Panorama Viewer";

/// Two presses closer than this count as a double tap
const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(300);
const DOUBLE_CLICK_SLOP: f32 = 8.0;

/// A drag that paused longer than this before release has no fling
const FLING_IDLE: Duration = Duration::from_millis(100);

/// Wake-up interval while waiting for resolution or animating
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(about = "Immersive viewer for 360° room panoramas", version)]
struct Args {
    /// Directory locators are resolved against (default: user data directory)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Directory of bundled fallback images
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Start with the cylinder projection
    #[arg(long)]
    cylinder: bool,

    /// Panorama locator: local://, file://, http(s):// or a bare path
    locator: String,
}

/// Everything needed to start the viewer once a window exists
struct Launch {
    settings: ViewerSettings,
    resolver: Arc<LocatorResolver>,
    runtime: tokio::runtime::Handle,
    image: PanoramicImage,
}

/// Mouse state turned into pan and double-tap gestures
#[derive(Default)]
struct PointerTracker {
    cursor: Option<Vec2>,
    dragging: bool,
    last_move: Option<Instant>,
    velocity: Vec2,
    last_press: Option<(Instant, Vec2)>,
}

impl PointerTracker {
    /// Returns the gestures a left-button press produces
    fn press(&mut self) -> Option<GestureEvent> {
        let now = Instant::now();
        let position = self.cursor.unwrap_or(Vec2::ZERO);

        let is_double = self.last_press.is_some_and(|(at, pos)| {
            now.duration_since(at) <= DOUBLE_CLICK_INTERVAL && pos.distance(position) <= DOUBLE_CLICK_SLOP
        });
        if is_double {
            self.last_press = None;
            self.dragging = false;
            return Some(GestureEvent::DoubleTap);
        }

        self.last_press = Some((now, position));
        self.dragging = true;
        self.velocity = Vec2::ZERO;
        self.last_move = Some(now);
        Some(GestureEvent::PanBegan)
    }

    fn release(&mut self) -> Option<GestureEvent> {
        if !self.dragging {
            return None;
        }
        self.dragging = false;
        let velocity = match self.last_move {
            Some(at) if at.elapsed() <= FLING_IDLE => self.velocity,
            _ => Vec2::ZERO,
        };
        Some(GestureEvent::PanEnded { velocity })
    }

    /// `position` is in logical points
    fn moved(&mut self, position: Vec2) -> Option<GestureEvent> {
        let previous = self.cursor.replace(position);
        if !self.dragging {
            return None;
        }
        let delta = position - previous?;

        let now = Instant::now();
        if let Some(at) = self.last_move {
            let dt = now.duration_since(at).as_secs_f32();
            if dt > 0.0 {
                self.velocity = self.velocity * 0.2 + (delta / dt) * 0.8;
            }
        }
        self.last_move = Some(now);
        Some(GestureEvent::PanChanged { dx: delta.x, dy: delta.y })
    }
}

/// Viewer with its window and GPU surface
struct Running {
    window: Arc<Window>,
    gpu: Arc<GpuContext>,
    surface: WindowSurface,
    viewer: PanoramaViewer<PanoramaRenderer>,
    pointer: PointerTracker,
    last_frame: Instant,
}

impl Running {
    fn start(event_loop: &ActiveEventLoop, launch: Launch) -> anyhow::Result<Self> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(event_loop.create_window(attributes).context("creating window")?);

        let (gpu, surface) =
            pollster::block_on(GpuContext::for_window(Arc::clone(&window))).context("initializing GPU")?;
        let gpu = Arc::new(gpu);

        let mut settings = launch.settings.sanitized();
        settings.scene.max_texture_dimension = settings.scene.max_texture_dimension.min(gpu.max_texture_dimension());

        let mut renderer = PanoramaRenderer::new(Arc::clone(&gpu), &settings.camera);
        let (width, height) = surface.size();
        renderer.ensure_render_target(width, height);

        let mut viewer = PanoramaViewer::new(settings, launch.resolver, launch.runtime, renderer);
        viewer
            .camera_controller_mut()
            .set_aspect(width as f32 / height.max(1) as f32);
        viewer.open(launch.image);
        window.request_redraw();

        Ok(Self {
            window,
            gpu,
            surface,
            viewer,
            pointer: PointerTracker::default(),
            last_frame: Instant::now(),
        })
    }

    fn gesture(&mut self, event: Option<GestureEvent>) {
        if let Some(event) = event {
            self.viewer.handle_gesture(event);
            self.window.request_redraw();
        }
    }

    fn needs_frames(&self) -> bool {
        self.viewer.camera_controller().is_animating() || self.viewer.is_awaiting_resolution()
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32().min(0.1);
        self.last_frame = now;

        self.viewer.frame(dt);
        self.handle_signals();

        let surface_texture = match self.surface.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.reconfigure(&self.gpu);
                self.window.request_redraw();
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to get window surface: {:?}", e);
                return;
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Panorama Frame Encoder"),
        });
        let (width, height) = self.surface.size();
        self.viewer.backend_mut().render(&mut encoder, &view, width, height);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        surface_texture.present();
    }

    fn handle_signals(&mut self) {
        for signal in self.viewer.drain_signals() {
            match signal {
                ViewerSignal::Resolution(report) => match (&report.winner, &report.failure) {
                    (Some(tier), _) => tracing::info!(
                        image_id = %report.image_id,
                        tier = tier.display_name(),
                        attempts = report.trace.attempts.len(),
                        "panorama ready"
                    ),
                    (None, failure) => tracing::info!(
                        image_id = %report.image_id,
                        failure = ?failure,
                        "showing fallback panorama"
                    ),
                },
                ViewerSignal::RenderReady { image_id, geometry } => {
                    let title = self
                        .viewer
                        .current_image()
                        .map(|image| image.title.clone())
                        .unwrap_or(image_id);
                    self.window
                        .set_title(&format!("{} - {} ({})", WINDOW_TITLE, title, geometry.display_name()));
                }
                ViewerSignal::ResetComplete => tracing::debug!("camera reset complete"),
                ViewerSignal::Dismissed => {}
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.surface
            .resize(&self.gpu, winit::dpi::PhysicalSize::new(width, height));
        let (width, height) = self.surface.size();
        self.viewer.backend_mut().ensure_render_target(width, height);
        self.viewer
            .camera_controller_mut()
            .set_aspect(width as f32 / height.max(1) as f32);
        self.window.request_redraw();
    }

    fn logical(&self, position: PhysicalPosition<f64>) -> Vec2 {
        let logical = position.to_logical::<f32>(self.window.scale_factor());
        Vec2::new(logical.x, logical.y)
    }

    /// Returns false once the viewer should close
    fn key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Escape => {
                self.viewer.dismiss();
                return false;
            }
            KeyCode::KeyG => {
                let geometry = self.viewer.geometry().toggled();
                tracing::info!("Switching to {}", geometry.display_name());
                self.viewer.set_geometry(geometry, false);
                self.handle_signals();
                self.window.request_redraw();
            }
            KeyCode::KeyR => self.gesture(Some(GestureEvent::DoubleTap)),
            _ => {}
        }
        true
    }
}

/// Main application handler implementing winit's ApplicationHandler trait
struct ViewerApp {
    launch: Option<Launch>,
    running: Option<Running>,
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        let Some(launch) = self.launch.take() else {
            return;
        };

        match Running::start(event_loop, launch) {
            Ok(running) => self.running = Some(running),
            Err(e) => {
                tracing::error!("Failed to start viewer: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                running.viewer.dismiss();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => running.resize(size.width, size.height),
            WindowEvent::RedrawRequested => running.redraw(),
            WindowEvent::Focused(false) => {
                running.pointer.dragging = false;
                running.gesture(Some(GestureEvent::Cancel));
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = running.logical(position);
                let event = running.pointer.moved(position);
                running.gesture(event);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let event = match (button, state) {
                    (MouseButton::Left, ElementState::Pressed) => running.pointer.press(),
                    (MouseButton::Left, ElementState::Released) => running.pointer.release(),
                    (MouseButton::Right, ElementState::Pressed) => Some(GestureEvent::LongPressBegan),
                    (MouseButton::Right, ElementState::Released) => Some(GestureEvent::LongPressEnded),
                    _ => None,
                };
                running.gesture(event);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scale = match delta {
                    MouseScrollDelta::LineDelta(_, y) => 1.1_f32.powf(y),
                    MouseScrollDelta::PixelDelta(pos) => (pos.y as f32 / 300.0).exp(),
                };
                running.gesture(Some(GestureEvent::PinchBegan));
                running.gesture(Some(GestureEvent::PinchChanged { scale }));
                running.gesture(Some(GestureEvent::PinchEnded));
            }
            WindowEvent::PinchGesture { delta, phase, .. } => {
                let event = match phase {
                    TouchPhase::Started => GestureEvent::PinchBegan,
                    TouchPhase::Moved => GestureEvent::PinchChanged {
                        scale: 1.0 + delta as f32,
                    },
                    TouchPhase::Ended | TouchPhase::Cancelled => GestureEvent::PinchEnded,
                };
                running.gesture(Some(event));
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if !running.key(code) {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match &self.running {
            Some(running) if running.needs_frames() => {
                running.window.request_redraw();
                event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FRAME_INTERVAL));
            }
            _ => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&LogConfig::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Panorama Viewer v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = ViewerSettings::load();
    if args.cylinder {
        settings.default_geometry = GeometryKind::Cylinder;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("panorama-resolve")
        .build()
        .context("creating async runtime")?;

    let storage_dir = args
        .storage
        .or_else(|| dirs::data_dir().map(|dir| dir.join("PanoramaViewer")))
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::info!("Storage root: {}", storage_dir.display());

    let bundle: Arc<dyn BundleAccessor> = match args.bundle {
        Some(dir) => Arc::new(DirectoryBundle::new(dir)),
        None => Arc::new(EmptyBundle),
    };
    let fetcher = HttpFetcher::new(
        settings.resolver.request_timeout(),
        settings.resolver.max_download_bytes,
    )
    .context("creating HTTP client")?;

    let resolver = LocatorResolver::new(
        Arc::new(FsStorageRoot::new(storage_dir)),
        bundle,
        Arc::new(fetcher),
        settings.resolver.clone(),
    );

    let title = args
        .locator
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("Panorama")
        .to_string();
    let image = PanoramicImage::new(title.clone(), args.locator, title);

    let event_loop = EventLoop::new().context("creating event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = ViewerApp {
        launch: Some(Launch {
            settings,
            resolver: Arc::new(resolver),
            runtime: runtime.handle().clone(),
            image,
        }),
        running: None,
    };
    event_loop.run_app(&mut app).context("event loop error")?;

    // Let in-flight resolution work wind down without blocking exit
    runtime.shutdown_timeout(Duration::from_millis(200));
    Ok(())
}

//! Preview window using winit + softbuffer.
//!
//! The window runs its own event loop on a dedicated display thread
//! (`any_thread`, Linux only). Frames go to it latest-only through a
//! one-slot channel; key presses and window close come back over a second
//! channel that `poll_key` drains.

use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::convert::{PixelBuffer, PixelFormat};
use crate::error::{RelayError, Result};

use super::preview::PreviewSurface;
use super::Key;

/// How long `open` waits for the window to appear.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
/// Event loop wake-up period while idle.
const FRAME_POLL: Duration = Duration::from_millis(8);
const INITIAL_SIZE: (u32, u32) = (1280, 720);

/// Frame data sent to the display thread.
struct DisplayFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// A native window showing the relayed frames.
pub struct WindowSurface {
    frames: Option<SyncSender<DisplayFrame>>,
    keys: Option<Receiver<Key>>,
    running: Arc<AtomicBool>,
    display_thread: Option<JoinHandle<()>>,
}

impl WindowSurface {
    pub fn new() -> Self {
        Self {
            frames: None,
            keys: None,
            running: Arc::new(AtomicBool::new(false)),
            display_thread: None,
        }
    }

    fn failed(reason: impl Into<String>) -> RelayError {
        RelayError::SinkFailed {
            sink: "preview window".to_string(),
            reason: reason.into(),
        }
    }

    fn stop_display(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.frames.take();
        self.keys.take();
        if let Some(handle) = self.display_thread.take() {
            if handle.join().is_err() {
                warn!("preview display thread panicked");
            }
        }
    }
}

impl Default for WindowSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        self.stop_display();
    }
}

impl PreviewSurface for WindowSurface {
    fn open(&mut self, title: &str) -> Result<()> {
        if self.display_thread.is_some() {
            return Ok(());
        }
        let unavailable = |reason: String| RelayError::SinkUnavailable {
            sink: "preview window".to_string(),
            reason,
        };

        let (frame_tx, frame_rx) = mpsc::sync_channel::<DisplayFrame>(1);
        let (key_tx, key_rx) = mpsc::channel::<Key>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let title = title.to_string();

        let handle = thread::Builder::new()
            .name("preview-window".to_string())
            .spawn(move || {
                let failure = ready_tx.clone();
                if let Err(e) = run_display_loop(frame_rx, key_tx, ready_tx, running, &title) {
                    let _ = failure.send(Err(e.clone()));
                    warn!("preview window: {e}");
                }
            })
            .map_err(|e| unavailable(format!("failed to spawn display thread: {e}")))?;
        self.display_thread = Some(handle);

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                self.frames = Some(frame_tx);
                self.keys = Some(key_rx);
                Ok(())
            }
            Ok(Err(reason)) => {
                self.stop_display();
                Err(unavailable(reason))
            }
            Err(_) => {
                self.stop_display();
                Err(unavailable("window did not appear".to_string()))
            }
        }
    }

    fn show(&mut self, buffer: &PixelBuffer) -> Result<()> {
        let Some(frames) = &self.frames else {
            return Err(Self::failed("window is not open"));
        };
        let frame = DisplayFrame {
            data: buffer.data().to_vec(),
            width: buffer.width(),
            height: buffer.height(),
            format: buffer.format(),
        };
        match frames.try_send(frame) {
            // The display thread still has an unrendered frame; drop this one.
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(Self::failed("display thread exited")),
        }
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<Key>> {
        let Some(keys) = &self.keys else {
            return Ok(None);
        };
        match keys.recv_timeout(wait) {
            Ok(key) => Ok(Some(key)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // The window is gone without having reported a close.
            Err(RecvTimeoutError::Disconnected) => Ok(Some(Key::WindowClosed)),
        }
    }

    fn close(&mut self) -> Result<()> {
        debug!("closing preview window");
        self.stop_display();
        Ok(())
    }
}

/// Run the winit event loop on the display thread.
fn run_display_loop(
    frames: Receiver<DisplayFrame>,
    keys: mpsc::Sender<Key>,
    ready: mpsc::Sender<std::result::Result<(), String>>,
    running: Arc<AtomicBool>,
    title: &str,
) -> std::result::Result<(), String> {
    use winit::application::ApplicationHandler;
    use winit::dpi::{LogicalSize, PhysicalSize};
    use winit::event::{ElementState, WindowEvent};
    use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
    use winit::keyboard::{Key as WinitKey, NamedKey};
    use winit::platform::x11::EventLoopBuilderExtX11;
    use winit::window::{Window, WindowAttributes, WindowId};

    struct PreviewApp {
        window: Option<Rc<Window>>,
        _context: Option<softbuffer::Context<Rc<Window>>>,
        surface: Option<softbuffer::Surface<Rc<Window>, Rc<Window>>>,
        frames: Receiver<DisplayFrame>,
        keys: mpsc::Sender<Key>,
        ready: mpsc::Sender<std::result::Result<(), String>>,
        running: Arc<AtomicBool>,
        current_frame: Option<DisplayFrame>,
        sized: bool,
        title: String,
    }

    impl PreviewApp {
        fn fail(&mut self, event_loop: &ActiveEventLoop, reason: String) {
            let _ = self.ready.send(Err(reason));
            self.running.store(false, Ordering::SeqCst);
            event_loop.exit();
        }

        fn render(&mut self) {
            let (Some(window), Some(surface), Some(frame)) =
                (&self.window, &mut self.surface, &self.current_frame)
            else {
                return;
            };
            let size = window.inner_size();
            let (Some(w), Some(h)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
            else {
                return;
            };
            if surface.resize(w, h).is_err() {
                return;
            }
            if let Ok(mut buffer) = surface.buffer_mut() {
                blit_frame(frame, &mut buffer, size.width as usize, size.height as usize);
                let _ = buffer.present();
            }
        }
    }

    impl ApplicationHandler for PreviewApp {
        fn resumed(&mut self, event_loop: &ActiveEventLoop) {
            if self.window.is_some() {
                return;
            }
            let attrs = WindowAttributes::default()
                .with_title(&self.title)
                .with_inner_size(LogicalSize::new(INITIAL_SIZE.0, INITIAL_SIZE.1));

            let window = match event_loop.create_window(attrs) {
                Ok(window) => Rc::new(window),
                Err(e) => return self.fail(event_loop, format!("failed to create window: {e}")),
            };
            let context = match softbuffer::Context::new(Rc::clone(&window)) {
                Ok(context) => context,
                Err(e) => return self.fail(event_loop, format!("softbuffer context: {e}")),
            };
            match softbuffer::Surface::new(&context, Rc::clone(&window)) {
                Ok(surface) => {
                    self._context = Some(context);
                    self.surface = Some(surface);
                    self.window = Some(window);
                    let _ = self.ready.send(Ok(()));
                }
                Err(e) => self.fail(event_loop, format!("softbuffer surface: {e}")),
            }
        }

        fn window_event(
            &mut self,
            event_loop: &ActiveEventLoop,
            _window_id: WindowId,
            event: WindowEvent,
        ) {
            match event {
                WindowEvent::CloseRequested => {
                    let _ = self.keys.send(Key::WindowClosed);
                    self.running.store(false, Ordering::SeqCst);
                    event_loop.exit();
                }
                WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                    let key = match event.logical_key {
                        WinitKey::Named(NamedKey::Escape) => Some(Key::Escape),
                        WinitKey::Character(text) => text.chars().next().map(Key::Char),
                        _ => None,
                    };
                    if let Some(key) = key {
                        let _ = self.keys.send(key);
                    }
                }
                WindowEvent::RedrawRequested => self.render(),
                WindowEvent::Resized(_) => {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
                _ => {}
            }
        }

        fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
            if !self.running.load(Ordering::SeqCst) {
                event_loop.exit();
                return;
            }

            let mut fresh = false;
            while let Ok(frame) = self.frames.try_recv() {
                self.current_frame = Some(frame);
                fresh = true;
            }

            if let (true, Some(window)) = (fresh, &self.window) {
                if !self.sized {
                    if let Some(frame) = &self.current_frame {
                        let _ = window.request_inner_size(PhysicalSize::new(frame.width, frame.height));
                    }
                    self.sized = true;
                }
                window.request_redraw();
            }

            event_loop.set_control_flow(ControlFlow::wait_duration(FRAME_POLL));
        }
    }

    let event_loop = EventLoop::builder()
        .with_any_thread(true)
        .build()
        .map_err(|e| format!("failed to create event loop: {e}"))?;

    let mut app = PreviewApp {
        window: None,
        _context: None,
        surface: None,
        frames,
        keys,
        ready,
        running,
        current_frame: None,
        sized: false,
        title: title.to_string(),
    };

    event_loop
        .run_app(&mut app)
        .map_err(|e| format!("event loop error: {e}"))
}

/// Blit a 3-channel frame to a 0RGB softbuffer with nearest-neighbour scaling.
fn blit_frame(frame: &DisplayFrame, buffer: &mut [u32], dst_width: usize, dst_height: usize) {
    let src_width = frame.width as usize;
    let src_height = frame.height as usize;
    if src_width == 0 || src_height == 0 {
        return;
    }
    let (r_at, b_at) = match frame.format {
        PixelFormat::Rgb8 => (0, 2),
        PixelFormat::Bgr8 => (2, 0),
    };

    for dst_y in 0..dst_height {
        let src_y = (dst_y * src_height) / dst_height;
        for dst_x in 0..dst_width {
            let src_x = (dst_x * src_width) / dst_width;
            let src_idx = (src_y * src_width + src_x) * 3;
            let Some(px) = frame.data.get(src_idx..src_idx + 3) else {
                continue;
            };
            if let Some(out) = buffer.get_mut(dst_y * dst_width + dst_x) {
                *out = (u32::from(px[r_at]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[b_at]);
            }
        }
    }
}

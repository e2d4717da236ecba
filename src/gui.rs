//! Preview window for the live loop.
//!
//! winit requires the event loop to run on the main thread, so [`run`] takes over the main thread
//! and runs the application on a background thread. The application talks to the window through
//! a [`Preview`] handle.

mod renderer;

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use image::RgbImage;
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy},
};

use crate::live::{Control, Display};

use self::renderer::{Gpu, Renderer, Window};

#[derive(Debug)]
enum Msg {
    Frame {
        width: u32,
        height: u32,
        /// RGBA8 pixel data.
        data: Vec<u8>,
    },
}

/// Handle for showing frames in the preview window.
///
/// Reports [`Control::Stop`] once the user pressed Escape or closed the window.
pub struct Preview {
    proxy: EventLoopProxy<Msg>,
    stop: Arc<AtomicBool>,
}

impl Display for Preview {
    fn show(&mut self, image: &RgbImage) -> anyhow::Result<Control> {
        if self.stop.load(Ordering::Relaxed) {
            return Ok(Control::Stop);
        }

        let data = image
            .pixels()
            .flat_map(|p| [p[0], p[1], p[2], 0xff])
            .collect();
        let msg = Msg::Frame {
            width: image.width(),
            height: image.height(),
            data,
        };
        if self.proxy.send_event(msg).is_err() {
            log::debug!("event loop closed");
            return Ok(Control::Stop);
        }
        Ok(Control::Continue)
    }
}

struct Gui {
    title: String,
    gpu: Option<Rc<Gpu>>,
    renderer: Option<Renderer>,
    stop: Arc<AtomicBool>,
}

impl Gui {
    fn on_frame<T>(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<T>,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if self.stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        let renderer = match &mut self.renderer {
            Some(renderer) => renderer,
            renderer @ None => {
                let gpu = match &self.gpu {
                    Some(gpu) => gpu.clone(),
                    None => {
                        let gpu = Rc::new(pollster::block_on(Gpu::open())?);
                        self.gpu = Some(gpu.clone());
                        gpu
                    }
                };
                log::debug!("creating {width}x{height} window '{}'", self.title);
                let win = Window::open(target, &self.title, width, height)?;
                renderer.insert(Renderer::new(win, gpu)?)
            }
        };

        renderer.update_texture(width, height, data);
        renderer.window().request_redraw();
        Ok(())
    }

    fn close(&mut self) {
        if !self.stop.swap(true, Ordering::Relaxed) {
            log::info!("window closed");
        }
        self.renderer = None;
    }
}

/// Runs `app` on a background thread while the calling thread drives the window.
///
/// The process exits when `app` returns: with status 0 on success, 1 on error (after logging it),
/// and 101 if it panicked.
pub fn run<F>(title: &str, app: F) -> !
where
    F: FnOnce(Preview) -> anyhow::Result<()> + Send + 'static,
{
    let event_loop = EventLoopBuilder::<Msg>::with_user_event().build();
    let stop = Arc::new(AtomicBool::new(false));
    let preview = Preview {
        proxy: event_loop.create_proxy(),
        stop: stop.clone(),
    };

    std::thread::spawn(move || match catch_unwind(AssertUnwindSafe(|| app(preview))) {
        Ok(Ok(())) => process::exit(0),
        Ok(Err(e)) => {
            log::error!("{e:#}");
            process::exit(1);
        }
        // The panic hook has printed the message already, exit like libstd does.
        Err(_payload) => process::exit(101),
    });

    let mut gui = Gui {
        title: title.to_string(),
        gpu: None,
        renderer: None,
        stop,
    };
    event_loop.run(move |event, target, flow| {
        *flow = ControlFlow::Wait;
        match event {
            Event::UserEvent(Msg::Frame {
                width,
                height,
                data,
            }) => {
                if let Err(e) = gui.on_frame(target, width, height, &data) {
                    log::error!("failed to show frame: {e:#}");
                    gui.close();
                }
            }
            Event::RedrawRequested(_) => {
                if let Some(renderer) = &mut gui.renderer {
                    renderer.redraw();
                }
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            }
            | Event::WindowEvent {
                event:
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode: Some(VirtualKeyCode::Escape),
                                ..
                            },
                        ..
                    },
                ..
            } => gui.close(),
            _ => {}
        }
    })
}

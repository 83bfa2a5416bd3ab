// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use tessera_core::{init_tracing, Clock};
use tessera_render::{RenderPacket, RenderSize, Renderer};
use tracing::{error, info};

use tessera_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;
mod headless;

use config::{load_cfg, AppCfg};

const DEFAULT_HEADLESS_FRAMES: u64 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    Vk,
    Headless,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Renderer backend
    #[arg(long, value_enum, default_value_t = BackendChoice::Vk)]
    backend: BackendChoice,
    /// Engine config with a [render] table
    #[arg(long, default_value = "tessera.toml")]
    config: PathBuf,
    /// Stop after this many frames (headless default: 120)
    #[arg(long)]
    frames: Option<u64>,
    /// Headless only: resize the surface before this frame
    #[arg(long)]
    resize_at: Option<u64>,
}

struct App {
    cfg: AppCfg,
    max_frames: Option<u64>,

    // renderer before window: it holds the surface
    renderer: Option<Box<dyn Renderer>>,
    window: Option<Window>,
    render_size: RenderSize,
    clock: Clock,

    exiting: bool,
    fatal: Option<anyhow::Error>,
    fps_frames: u64,
    last_fps_instant: Instant,

    paused: bool,
    focused: bool,
    next_frame_deadline: Option<Instant>,
}

impl App {
    fn new(cfg: AppCfg, max_frames: Option<u64>) -> Self {
        App {
            cfg,
            max_frames,
            renderer: None,
            window: None,
            render_size: RenderSize::new(0, 0),
            clock: Clock::new(),
            exiting: false,
            fatal: None,
            fps_frames: 0,
            last_fps_instant: Instant::now(),
            paused: false,
            focused: true,
            next_frame_deadline: None,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            event_loop.create_window(Window::default_attributes().with_title("tessera"))?;
        let (w, h) = tessera_platform::framebuffer_size(&window);
        self.render_size = RenderSize::new(w, h);

        let renderer = tessera_render_vk::create_renderer(
            &window,
            &window,
            self.render_size,
            "tessera",
            self.cfg.render.frame_config(),
        )?;
        info!(
            size = %self.render_size,
            vsync = self.cfg.render.vsync,
            "backend = vk"
        );

        self.renderer = Some(Box::new(renderer));
        self.window = Some(window);
        self.clock.start();
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(mut r) = self.renderer.take() {
            r.shutdown();
        }
        self.window = None;
        event_loop.exit();
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn update_paused(&mut self, occluded: bool) {
        let minimized = self.render_size.is_zero()
            || self
                .window
                .as_ref()
                .is_some_and(tessera_platform::is_minimized);
        let now_paused = occluded || minimized;
        if self.paused != now_paused {
            self.paused = now_paused;
            info!(paused = self.paused, "pause state changed");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_window(event_loop) {
                error!("startup failed: {e:#}");
                self.fatal = Some(e);
                self.shutdown(event_loop);
                return;
            }
        }

        event_loop.set_control_flow(if self.cfg.render.vsync {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        });

        self.update_paused(false);
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            self.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize::new(new_size.width, new_size.height);
                self.update_paused(false);
                info!(size = %self.render_size, paused = self.paused, "Resized");

                // Only records the size; the swapchain follows on the next frame.
                if let Some(r) = &mut self.renderer {
                    r.on_resized(self.render_size);
                }
                if !self.paused {
                    self.request_redraw();
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.update_paused(occluded);
                info!("Occluded={} → paused={}", occluded, self.paused);
            }

            WindowEvent::Focused(focused) => {
                if self.focused != focused {
                    self.focused = focused;
                    info!("Focused({})", focused);
                    if focused {
                        self.next_frame_deadline = None;
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };

                let before = renderer.frame_number();
                let packet = RenderPacket {
                    delta_time: self.clock.tick(),
                };
                if let Err(e) = renderer.draw_frame(&packet) {
                    error!("render error: {e:#}");
                    self.fatal = Some(e);
                    self.shutdown(event_loop);
                    return;
                }

                // count only frames that were actually presented
                let presented = renderer.frame_number();
                self.fps_frames += presented - before;
                if self.max_frames.is_some_and(|max| presented >= max) {
                    info!(frames = presented, "frame limit reached");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // minimized or occluded: sleep until the next window event
            event_loop.set_control_flow(ControlFlow::Wait);
            self.fps_frames = 0;
            return;
        }

        let cap = if self.focused {
            None
        } else {
            self.cfg.render.unfocused_fps_cap()
        };

        match cap {
            None => {
                event_loop.set_control_flow(if self.cfg.render.vsync {
                    ControlFlow::Wait
                } else {
                    ControlFlow::Poll
                });
                self.request_redraw();
            }
            Some(fps) => {
                let now = Instant::now();
                match self.next_frame_deadline {
                    Some(deadline) if now < deadline => {
                        // not time yet, no redraw
                        event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
                    }
                    _ => {
                        let next = now + Duration::from_nanos(1_000_000_000 / u64::from(fps));
                        self.next_frame_deadline = Some(next);
                        event_loop.set_control_flow(ControlFlow::WaitUntil(next));
                        self.request_redraw();
                    }
                }
            }
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.fps_frames);
            self.fps_frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);

    match args.backend {
        BackendChoice::Headless => {
            let frames = args.frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
            headless::run(cfg.render.frame_config(), frames, args.resize_at)?;
            Ok(())
        }
        BackendChoice::Vk => {
            if args.resize_at.is_some() {
                info!("--resize-at only applies to headless runs");
            }
            let event_loop: EventLoop<()> = EventLoop::new()?;
            let mut app = App::new(cfg, args.frames);
            event_loop.run_app(&mut app)?;
            match app.fatal.take() {
                Some(e) => Err(anyhow!("{e:#}")),
                None => Ok(()),
            }
        }
    }
}

mod scene;

use color_eyre::Result;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use raxa_graph::renderer::RenderConfig;
use crate::app::scene::Scene;

pub struct App {
    // The scene holds the surface, so it must drop before the window
    scene: Option<Scene>,
    window: Option<Arc<Window>>,
    config: RenderConfig,

    close_requested: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        Ok(Self {
            scene: None,
            window: None,
            config: RenderConfig::default(),

            close_requested: false,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(self)?;
        Ok(())
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let attributes = Window::default_attributes().with_title("raxa-graph");
            self.window = Some(Arc::new(event_loop.create_window(attributes)?));
        }

        if self.scene.is_none() {
            if let Some(window) = self.window.as_ref() {
                self.scene = Some(Scene::new(window, &self.config)?);
            }
        }

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.init(event_loop) {
            log::error!("Failed to initialize: {:?}", e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::RedrawRequested => {
                if let Some(scene) = self.scene.as_mut() {
                    if let Err(e) = scene.draw() {
                        log::error!("Failed to draw frame: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: key,
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => match key.as_ref() {
                Key::Named(NamedKey::Escape) => {
                    self.close_requested = true;
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }

        if self.close_requested {
            self.scene = None;
            event_loop.exit();
        }
    }
}

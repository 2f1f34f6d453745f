//! A minimal image viewer GUI.
//!
//! The windowing event loop has to own the main thread on most platforms, so [`run`] starts it there
//! and moves the application code to a background thread. The application then talks to the GUI
//! through [`show_image`] and [`wait_key`].

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::{
    image::{Image, Resolution},
    termination::{self, Termination},
};

use self::renderer::{Gpu, Renderer, Window};

/// Input events delivered by [`wait_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A character was typed into one of the windows.
    Char(char),
    /// The user asked to close a window.
    Close,
}

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
    keys: Sender<Key>,
}

impl Gui {
    fn new(keys: Sender<Key>) -> anyhow::Result<Self> {
        Ok(Self {
            gpu: Rc::new(pollster::block_on(Gpu::open())?),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
            keys,
        })
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn show(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window '{key}' at {res}");
            let win = Window::open(target, &key, res)?;
            let win_id = win.win.id();
            let renderer = Renderer::new(win, self.gpu.clone())?;
            self.win_id_to_key.insert(win_id, key.clone());
            self.windows.insert(key.clone(), renderer);
        }

        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, data)?;
            renderer.window().request_redraw();
        }
        Ok(())
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show(target, key, res, &data) {
                        log::error!("failed to display image: {e:#}");
                    }
                }
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.renderer_mut(window) {
                        if let Err(e) = renderer.redraw() {
                            log::error!("{e:#}");
                        }
                    }
                }
                Event::WindowEvent { event, .. } => {
                    let key = match event {
                        WindowEvent::ReceivedCharacter(c) => Key::Char(c),
                        WindowEvent::CloseRequested => Key::Close,
                        _ => return,
                    };
                    // The application thread may already be gone.
                    self.keys.send(key).ok();
                }
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

/// The application side of the GUI.
struct Connection {
    proxy: Mutex<EventLoopProxy<Msg>>,
    keys: Mutex<Receiver<Key>>,
}

static CONNECTION: OnceCell<Connection> = OnceCell::new();

fn connection() -> anyhow::Result<&'static Connection> {
    CONNECTION
        .get()
        .ok_or_else(|| anyhow!("GUI not initialized (the application must be started via `run`)"))
}

/// Starts the GUI event loop on the current thread and runs `app` on a new thread.
///
/// The process exits when `app` returns, with status 0 on success and 1 on error. If `app`
/// panics, the process exits with status 101 like a panicking `main` would.
pub(crate) fn run<F, R>(app: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    let (key_tx, key_rx) = mpsc::channel();
    let connection = Connection {
        proxy: Mutex::new(event_loop.create_proxy()),
        keys: Mutex::new(key_rx),
    };
    if CONNECTION.set(connection).is_err() {
        eprintln!("GUI already initialized; exiting");
        process::exit(1);
    }

    let gui = match Gui::new(key_tx) {
        Ok(gui) => gui,
        Err(e) => {
            eprintln!("Error: {e:?}");
            process::exit(1);
        }
    };

    std::thread::spawn(move || {
        let code = match catch_unwind(AssertUnwindSafe(app)) {
            Ok(result) => termination::exit_code(result),
            // The panic hook has already printed the message.
            Err(_payload) => 101,
        };
        process::exit(code);
    });

    gui.run(event_loop);
}

/// Displays an image in the window titled `key`, opening the window on first use.
pub fn show_image(key: impl Into<String>, image: &Image) -> anyhow::Result<()> {
    let msg = Msg::Image {
        key: key.into(),
        res: image.resolution(),
        // Images are RGBA8 internally, so they can be uploaded as-is.
        data: image.data().to_vec(),
    };

    connection()?
        .proxy
        .lock()
        .map_err(|_| anyhow!("GUI connection poisoned"))?
        .send_event(msg)
        .map_err(|_| anyhow!("GUI event loop has exited"))
}

/// Waits up to `timeout` for a key press or window close, like OpenCV's `waitKey`.
///
/// Returns `None` if nothing happened within `timeout` or if the GUI is not running.
pub fn wait_key(timeout: Duration) -> Option<Key> {
    let connection = connection().ok()?;
    let keys = connection.keys.lock().ok()?;
    match keys.recv_timeout(timeout) {
        Ok(key) => Some(key),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Key::Close),
    }
}

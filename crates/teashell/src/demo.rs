//! The demo program: shows the terminal size, the negotiated color profile
//! and a key counter.

use teashell_core::{Color, Msg, WindowSize};
use teashell_middleware::{Command, Model, Renderer};

const CTRL_C: u8 = 0x03;

/// Counts keystrokes until `q` or Ctrl-C.
pub struct CounterModel {
    renderer: Renderer,
    size: Option<WindowSize>,
    keys: usize,
}

impl CounterModel {
    /// New model styling through `renderer`.
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            size: None,
            keys: 0,
        }
    }
}

impl Model for CounterModel {
    fn update(&mut self, msg: &Msg) -> Command {
        match msg {
            Msg::Input(bytes) => {
                if bytes.iter().any(|&b| b == b'q' || b == CTRL_C) {
                    return Command::Quit;
                }
                self.keys += bytes.len();
            }
            Msg::WindowSize(size) => self.size = Some(*size),
            Msg::Custom(_) => {}
        }
        Command::None
    }

    fn view(&self) -> String {
        let title = self.renderer.style(
            "teashell",
            Color::Rgb {
                r: 0x5f,
                g: 0xaf,
                b: 0xff,
            },
        );
        let size = match self.size {
            Some(size) => size.to_string(),
            None => "unknown".to_string(),
        };
        let keys = self.renderer.style(&self.keys.to_string(), Color::Ansi(2));

        format!(
            "{title}\n\nwindow: {size}\nprofile: {}\nkeys: {keys}\n\npress q to quit",
            self.renderer.color_profile().name()
        )
    }
}

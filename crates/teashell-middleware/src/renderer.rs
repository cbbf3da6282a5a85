//! Color-aware renderer bound to a session.

use teashell_core::{Color, ColorProfile};

use crate::profile::negotiated_profile;
use crate::session::{Session, SessionWriter};

/// Styles text for one session's terminal.
#[derive(Debug, Clone)]
pub struct Renderer {
    profile: ColorProfile,
    output: SessionWriter,
}

impl Renderer {
    /// Create a renderer writing to `output` with the given profile.
    pub fn new(output: SessionWriter, profile: ColorProfile) -> Self {
        Self { profile, output }
    }

    /// Profile this renderer styles for.
    pub fn color_profile(&self) -> ColorProfile {
        self.profile
    }

    /// Override the profile.
    pub fn set_color_profile(&mut self, profile: ColorProfile) {
        self.profile = profile;
    }

    /// Color `text`, or return it unstyled if the profile cannot show `fg`.
    pub fn style(&self, text: &str, fg: Color) -> String {
        if !self.profile.supports(fg) {
            return text.to_string();
        }
        match fg.fg_params() {
            Some(params) => format!("\x1b[{params}m{text}\x1b[39m"),
            None => text.to_string(),
        }
    }

    /// The session output stream.
    pub fn output(&self) -> &SessionWriter {
        &self.output
    }
}

/// Renderer for `session`, using its negotiated profile.
///
/// Sessions that never went through negotiation get [`ColorProfile::Ascii`].
pub fn make_renderer(session: &dyn Session) -> Renderer {
    Renderer::new(session.writer(), negotiated_profile(session))
}

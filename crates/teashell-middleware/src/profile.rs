//! Color profile negotiation.
//!
//! The effective profile of a session is the lower of what the client
//! terminal advertises and the ceiling the application declares. It is
//! stored in the session context as [`NegotiatedProfile`] for
//! [`make_renderer`](crate::renderer::make_renderer) to pick up.

use tracing::debug;

use teashell_core::{ColorProfile, Environ};

use crate::session::Session;

/// Terminals known to render 24-bit color regardless of `COLORTERM`.
const TRUECOLOR_TERMS: &[&str] = &[
    "alacritty",
    "contour",
    "foot",
    "kitty",
    "wezterm",
    "xterm-ghostty",
    "xterm-kitty",
];

/// TERM prefixes of terminals that render at least the 16 ANSI colors.
const ANSI_TERMS: &[&str] = &["cygwin", "linux", "putty", "rxvt", "screen", "tmux", "xterm"];

/// Detects the color profile a client terminal supports.
pub trait ProfileDetector: Send + Sync {
    /// Detect the profile from the client's environment.
    fn detect(&self, env: &Environ) -> ColorProfile;
}

/// Detector reading `NO_COLOR`, `COLORTERM` and `TERM`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProfileDetector;

impl ProfileDetector for EnvProfileDetector {
    fn detect(&self, env: &Environ) -> ColorProfile {
        if !env.getenv("NO_COLOR").is_empty() {
            return ColorProfile::Ascii;
        }

        let colorterm = env.getenv("COLORTERM").to_ascii_lowercase();
        if colorterm == "truecolor" || colorterm == "24bit" {
            return ColorProfile::TrueColor;
        }

        let term = env.getenv("TERM").to_ascii_lowercase();
        if term.is_empty() || term == "dumb" {
            return ColorProfile::Ascii;
        }
        if TRUECOLOR_TERMS.iter().any(|t| term.starts_with(t))
            || term.ends_with("-direct")
            || term.contains("truecolor")
        {
            return ColorProfile::TrueColor;
        }
        if term.contains("256color") {
            return ColorProfile::Ansi256;
        }
        if !colorterm.is_empty()
            || term.contains("color")
            || term.contains("ansi")
            || ANSI_TERMS.iter().any(|t| term.starts_with(t))
        {
            return ColorProfile::Ansi;
        }

        ColorProfile::Ascii
    }
}

/// Session context entry holding the negotiated profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedProfile(pub ColorProfile);

/// Outcome of comparing a client profile with the application ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// What the client terminal supports
    pub client: ColorProfile,
    /// Highest profile the application renders with
    pub ceiling: ColorProfile,
    /// Effective profile: `min(client, ceiling)`
    pub profile: ColorProfile,
}

impl Negotiation {
    /// Whether the client profile had to be lowered.
    pub fn downgraded(&self) -> bool {
        self.client > self.ceiling
    }

    /// Advisory line for the client, present only when downgraded.
    pub fn warning(&self) -> Option<String> {
        self.downgraded().then(|| {
            format!(
                "Warning: Client's terminal is {:?}, forcing {:?}\r\n",
                self.client.name(),
                self.ceiling.name()
            )
        })
    }
}

/// Compare a client profile with the application ceiling.
pub fn resolve(client: ColorProfile, ceiling: ColorProfile) -> Negotiation {
    Negotiation {
        client,
        ceiling,
        profile: client.min(ceiling),
    }
}

/// The client's environment, with `TERM` filled in from the pty if absent.
pub fn client_environ(session: &dyn Session) -> Environ {
    let mut env = session.environ();
    if let Some(pty) = session.pty() {
        env.set_default("TERM", &pty.term);
    }
    env
}

/// Negotiate with the default detector.
pub async fn negotiate(session: &dyn Session, ceiling: ColorProfile) -> ColorProfile {
    negotiate_with(session, ceiling, &EnvProfileDetector).await
}

/// Detect the client profile, cap it at `ceiling`, warn the client if it was
/// lowered, and store the result in the session context.
pub async fn negotiate_with(
    session: &dyn Session,
    ceiling: ColorProfile,
    detector: &dyn ProfileDetector,
) -> ColorProfile {
    let client = detector.detect(&client_environ(session));
    let negotiation = resolve(client, ceiling);

    if let Some(warning) = negotiation.warning() {
        debug!(
            session = %session.id(),
            client = %negotiation.client,
            ceiling = %negotiation.ceiling,
            "Forcing lower color profile"
        );
        // Advisory only: a closed or stalled client must not hold up the session.
        let writer = session.writer();
        tokio::select! {
            biased;
            _ = session.context().done() => {
                debug!(session = %session.id(), "Session cancelled before color warning was delivered");
            }
            written = writer.write_str(&warning) => {
                if let Err(e) = written {
                    debug!(session = %session.id(), "Could not deliver color warning: {}", e);
                }
            }
        }
    }

    session
        .context()
        .set_value(NegotiatedProfile(negotiation.profile));
    negotiation.profile
}

/// The profile negotiated for `session`, or [`ColorProfile::Ascii`] if none was.
pub fn negotiated_profile(session: &dyn Session) -> ColorProfile {
    session
        .context()
        .value::<NegotiatedProfile>()
        .map(|NegotiatedProfile(profile)| profile)
        .unwrap_or(ColorProfile::Ascii)
}

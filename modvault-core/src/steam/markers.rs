//! The steamcmd output classification table.
//!
//! steamcmd has no machine-readable protocol; its textual output is the
//! protocol. Every substring the adapter reacts to is listed here, in
//! one place, so the brittleness is at least centralised and covered by
//! table-driven tests.

/// Which kind of second factor the platform is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFactorKind {
    /// `Steam Guard code` prompt, delivered by email.
    Email,
    /// `Two-factor code` prompt, from the mobile authenticator.
    Mobile,
}

/// A single classified observation from one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    SecondFactor(SecondFactorKind),
    SessionExpired,
    AccessDenied,
    NotFound,
    Transient,
    LoginSuccess,
}

impl Marker {
    pub fn is_second_factor(&self) -> bool {
        matches!(self, Marker::SecondFactor(_))
    }
}

const TABLE: &[(&str, Marker)] = &[
    ("Steam Guard code", Marker::SecondFactor(SecondFactorKind::Email)),
    ("Two-factor code", Marker::SecondFactor(SecondFactorKind::Mobile)),
    ("Invalid Password", Marker::SessionExpired),
    ("Login Failure", Marker::SessionExpired),
    ("No subscription", Marker::AccessDenied),
    ("Access Denied", Marker::AccessDenied),
    ("Item not found", Marker::NotFound),
    ("ERROR!", Marker::Transient),
    ("failed (Failure)", Marker::Transient),
    ("Logged in OK", Marker::LoginSuccess),
    ("Waiting for client config...OK", Marker::LoginSuccess),
    ("Loading Steam API...OK", Marker::LoginSuccess),
];

/// Classifies one output line; the first matching substring wins.
pub fn classify_line(line: &str) -> Option<Marker> {
    TABLE
        .iter()
        .find(|(needle, _)| line.contains(needle))
        .map(|(_, marker)| *marker)
}

/// Whether a line looks like a download-state report. Used only to
/// advance the progress heuristic, never for outcome classification.
pub fn is_download_hint(line: &str) -> bool {
    line.contains("downloading") || line.contains("Downloading item")
}

/// Flags accumulated over the whole run, resolved with the fixed
/// precedence: second factor > session expired > access/availability >
/// transient > login success.
#[derive(Debug, Default, Clone)]
pub struct ObservedMarkers {
    second_factor: Option<SecondFactorKind>,
    session_expired: bool,
    access_denied: bool,
    not_found: bool,
    transient: Option<String>,
    login_success: bool,
}

impl ObservedMarkers {
    /// Feeds one line into the accumulator and returns its marker, if any.
    pub fn observe(&mut self, line: &str) -> Option<Marker> {
        let marker = classify_line(line)?;
        match marker {
            Marker::SecondFactor(kind) => {
                self.second_factor.get_or_insert(kind);
            }
            Marker::SessionExpired => self.session_expired = true,
            Marker::AccessDenied => self.access_denied = true,
            Marker::NotFound => self.not_found = true,
            Marker::Transient => {
                self.transient.get_or_insert_with(|| line.trim().to_string());
            }
            Marker::LoginSuccess => self.login_success = true,
        }
        Some(marker)
    }

    pub fn login_succeeded(&self) -> bool {
        self.login_success && self.second_factor.is_none() && !self.session_expired
    }

    /// The highest-precedence resolution of everything observed.
    pub fn resolve(&self) -> Option<Marker> {
        if let Some(kind) = self.second_factor {
            Some(Marker::SecondFactor(kind))
        } else if self.session_expired {
            Some(Marker::SessionExpired)
        } else if self.access_denied {
            Some(Marker::AccessDenied)
        } else if self.not_found {
            Some(Marker::NotFound)
        } else if self.transient.is_some() {
            Some(Marker::Transient)
        } else if self.login_success {
            Some(Marker::LoginSuccess)
        } else {
            None
        }
    }

    /// Detail text of the first transient failure line, for diagnostics.
    pub fn transient_detail(&self) -> Option<&str> {
        self.transient.as_deref()
    }
}

use chrono::{DateTime, Utc};

/// Credentials handed out by the last READY.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Established {
    id: String,
    resume_url: Option<String>,
    at: DateTime<Utc>,
}

/// Resume credentials from the last READY. Outlives individual connections.
///
/// The bot user id survives [`SessionInfo::clear`]: a fresh identify with the
/// same token announces the same account.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    established: Option<Established>,
    user_id: Option<String>,
}

impl SessionInfo {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            established: None,
            user_id: None,
        }
    }

    /// Records the session announced by READY, replacing any earlier one.
    pub fn establish(&mut self, session_id: String, resume_url: Option<String>, user_id: String) {
        self.established = Some(Established {
            id: session_id,
            resume_url: resume_url.filter(|url| !url.is_empty()),
            at: Utc::now(),
        });
        self.user_id = Some(user_id);
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.established.as_ref().map(|s| s.id.as_str())
    }

    #[must_use]
    pub fn resume_gateway_url(&self) -> Option<&str> {
        self.established.as_ref()?.resume_url.as_deref()
    }

    #[must_use]
    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        self.established.as_ref().map(|s| s.at)
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// A resume also needs a sequence; the caller holds that in `SessionState`.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.established.is_some()
    }

    pub fn clear(&mut self) {
        self.established = None;
    }
}

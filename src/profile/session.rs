//! Per-link profile sessions.
//!
//! Entries are created lazily by the first enable of a profile on the
//! link and dropped with the link.

use heapless::Vec;

use super::racp::RacpState;
use super::{HandleBlob, ProfileDescriptor, ProfileId, SessionHint};
use crate::config::MAX_PROFILES_PER_LINK;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnableState {
    Disabled,
    Enabling(SessionHint),
    Enabled(SessionHint),
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileSession {
    pub profile: ProfileId,
    pub state: EnableState,
    /// Handles in use (supplied for Normal, discovered for Discovery).
    pub handles: Option<HandleBlob>,
    pub racp: RacpState,
}

impl ProfileSession {
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, EnableState::Enabled(_))
    }
}

/// Result of applying an enable confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnableOutcome {
    Enabled { hint: SessionHint, handles: HandleBlob },
    Failed { hint: SessionHint },
    /// Discovery succeeded but reported no table, or one the profile
    /// cannot use. The session is back to disabled.
    UnusableTable,
    /// No enable was outstanding for that profile.
    Unexpected,
}

#[derive(Default)]
pub struct ProfileSessions {
    sessions: Vec<ProfileSession, MAX_PROFILES_PER_LINK>,
}

impl ProfileSessions {
    pub const fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    pub fn get(&self, profile: ProfileId) -> Option<&ProfileSession> {
        self.sessions.iter().find(|s| s.profile == profile)
    }

    fn get_mut(&mut self, profile: ProfileId) -> Option<&mut ProfileSession> {
        self.sessions.iter_mut().find(|s| s.profile == profile)
    }

    /// Check that `profile` may be enabled without changing anything.
    pub fn can_enable(&self, profile: ProfileId) -> Result<()> {
        match self.get(profile) {
            Some(session) if session.state != EnableState::Disabled => Err(Error::Busy),
            Some(_) => Ok(()),
            None if self.sessions.is_full() => Err(Error::NoSlotAvailable),
            None => Ok(()),
        }
    }

    /// Mark an enable as outstanding.
    pub fn begin_enable(
        &mut self,
        profile: ProfileId,
        hint: SessionHint,
        handles: Option<HandleBlob>,
    ) -> Result<()> {
        self.can_enable(profile)?;
        match self.get_mut(profile) {
            Some(session) => {
                session.state = EnableState::Enabling(hint);
                session.handles = handles;
                session.racp = RacpState::Idle;
            }
            None => {
                self.sessions
                    .push(ProfileSession {
                        profile,
                        state: EnableState::Enabling(hint),
                        handles,
                        racp: RacpState::Idle,
                    })
                    .map_err(|_| Error::NoSlotAvailable)?;
            }
        }
        Ok(())
    }

    /// Apply the enable confirmation for `profile`.
    ///
    /// A Discovery enable takes the discovered table, which must satisfy
    /// `descriptor`; a Normal enable keeps the one it was started with.
    pub fn complete_enable(
        &mut self,
        descriptor: &ProfileDescriptor,
        success: bool,
        discovered: Option<HandleBlob>,
    ) -> EnableOutcome {
        let Some(session) = self.get_mut(descriptor.id) else {
            return EnableOutcome::Unexpected;
        };
        let EnableState::Enabling(hint) = session.state else {
            return EnableOutcome::Unexpected;
        };

        if !success {
            session.state = EnableState::Disabled;
            session.handles = None;
            return EnableOutcome::Failed { hint };
        }

        let handles = match hint {
            SessionHint::Discovery => match discovered {
                Some(table) if descriptor.accepts(&table) => table,
                _ => {
                    session.state = EnableState::Disabled;
                    session.handles = None;
                    return EnableOutcome::UnusableTable;
                }
            },
            SessionHint::Normal => session.handles.clone().unwrap_or_default(),
        };
        session.state = EnableState::Enabled(hint);
        session.handles = Some(handles.clone());
        EnableOutcome::Enabled { hint, handles }
    }

    /// Stop using `profile` on this link. Returns whether it was active.
    pub fn disable(&mut self, profile: ProfileId) -> bool {
        match self.get_mut(profile) {
            Some(session) if session.state != EnableState::Disabled => {
                session.state = EnableState::Disabled;
                session.racp = RacpState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn racp_mut(&mut self, profile: ProfileId) -> Option<&mut RacpState> {
        self.get_mut(profile)
            .filter(|s| s.is_enabled())
            .map(|s| &mut s.racp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfileSession> {
        self.sessions.iter()
    }
}

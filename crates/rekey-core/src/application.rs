//! Applications that derive keys from a team seed.

use std::fmt;

use thiserror::Error;

/// Application a team key is derived for.
///
/// The numeric id is mixed into the derivation and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Application {
    /// Encrypted file system
    Kbfs,
    /// Team chat
    Chat,
    /// Saltpack encryption to the team
    Saltpack,
    /// Git repository metadata
    GitMetadata,
    /// Invite tokens
    SeitanInviteToken,
    /// Payment relays
    StellarRelay,
}

impl Application {
    /// All applications, in id order.
    pub const ALL: [Application; 6] = [
        Self::Kbfs,
        Self::Chat,
        Self::Saltpack,
        Self::GitMetadata,
        Self::SeitanInviteToken,
        Self::StellarRelay,
    ];

    /// Stable identifier used in key derivation.
    pub fn id(self) -> u32 {
        match self {
            Self::Kbfs => 1,
            Self::Chat => 2,
            Self::Saltpack => 3,
            Self::GitMetadata => 4,
            Self::SeitanInviteToken => 5,
            Self::StellarRelay => 6,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Kbfs => "kbfs",
            Self::Chat => "chat",
            Self::Saltpack => "saltpack",
            Self::GitMetadata => "git-metadata",
            Self::SeitanInviteToken => "seitan-invite-token",
            Self::StellarRelay => "stellar-relay",
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognised application name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown application: {0}")]
pub struct UnknownApplication(pub String);

impl std::str::FromStr for Application {
    type Err = UnknownApplication;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|app| app.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownApplication(s.to_string()))
    }
}

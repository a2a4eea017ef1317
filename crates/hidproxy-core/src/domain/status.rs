//! Device status: the closed set of states the command interpreter can be in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the command interpreter currently is.
///
/// "Sealed" states hold no key material; "unsealed" states have the derived
/// key in RAM and can reach private macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// No password has ever been set.
    Blank,
    BlankSeenMagic,
    /// Locked at rest: pass-through plus public macros only.
    Sealed,
    SealedSeenMagic,
    SealedExpectingCommand,
    EnteringPassword,
    EnteringNewPassword,
    /// Operational with the derived key in RAM.
    Unsealed,
    SeenMagic,
    ExpectingCommand,
    SeenAssign,
    Defining,
}

impl DeviceStatus {
    /// Initial status after boot.
    pub fn at_boot(password_hash_exists: bool) -> Self {
        if password_hash_exists {
            DeviceStatus::Sealed
        } else {
            DeviceStatus::Blank
        }
    }

    /// States in which no key material may be held in RAM.
    pub fn is_sealed_family(self) -> bool {
        matches!(
            self,
            DeviceStatus::Blank
                | DeviceStatus::BlankSeenMagic
                | DeviceStatus::Sealed
                | DeviceStatus::SealedSeenMagic
                | DeviceStatus::SealedExpectingCommand
        )
    }

    /// States the idle watchdog leaves alone.
    pub fn is_idle_exempt(self) -> bool {
        matches!(
            self,
            DeviceStatus::Blank
                | DeviceStatus::BlankSeenMagic
                | DeviceStatus::Sealed
                | DeviceStatus::SealedSeenMagic
                | DeviceStatus::EnteringPassword
                | DeviceStatus::EnteringNewPassword
        )
    }

    /// Returns `true` while a password is being typed.
    pub fn is_entering_password(self) -> bool {
        matches!(
            self,
            DeviceStatus::EnteringPassword | DeviceStatus::EnteringNewPassword
        )
    }

    /// Short name used in logs and the status endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Blank => "blank",
            DeviceStatus::BlankSeenMagic => "blank_seen_magic",
            DeviceStatus::Sealed => "sealed",
            DeviceStatus::SealedSeenMagic => "sealed_seen_magic",
            DeviceStatus::SealedExpectingCommand => "sealed_expecting_command",
            DeviceStatus::EnteringPassword => "entering_password",
            DeviceStatus::EnteringNewPassword => "entering_new_password",
            DeviceStatus::Unsealed => "unsealed",
            DeviceStatus::SeenMagic => "seen_magic",
            DeviceStatus::ExpectingCommand => "expecting_command",
            DeviceStatus::SeenAssign => "seen_assign",
            DeviceStatus::Defining => "defining",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_status_depends_on_password_hash() {
        assert_eq!(DeviceStatus::at_boot(true), DeviceStatus::Sealed);
        assert_eq!(DeviceStatus::at_boot(false), DeviceStatus::Blank);
    }

    #[test]
    fn test_sealed_family_excludes_password_entry() {
        assert!(DeviceStatus::SealedExpectingCommand.is_sealed_family());
        assert!(!DeviceStatus::EnteringPassword.is_sealed_family());
        assert!(!DeviceStatus::Unsealed.is_sealed_family());
    }

    #[test]
    fn test_idle_exemptions() {
        assert!(DeviceStatus::Sealed.is_idle_exempt());
        assert!(DeviceStatus::BlankSeenMagic.is_idle_exempt());
        assert!(DeviceStatus::SealedSeenMagic.is_idle_exempt());
        assert!(DeviceStatus::EnteringNewPassword.is_idle_exempt());
        assert!(!DeviceStatus::SeenMagic.is_idle_exempt());
        assert!(!DeviceStatus::Unsealed.is_idle_exempt());
        assert!(!DeviceStatus::Defining.is_idle_exempt());
        assert!(!DeviceStatus::ExpectingCommand.is_idle_exempt());
    }

    #[test]
    fn test_display_uses_snake_case_names() {
        assert_eq!(DeviceStatus::SealedExpectingCommand.to_string(), "sealed_expecting_command");
    }
}

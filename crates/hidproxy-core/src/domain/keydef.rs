//! Macro definitions ("keydefs").
//!
//! A keydef binds a trigger keycode to an ordered list of actions.  Private
//! keydefs (`require_unlock = true`) are stored encrypted and are only usable
//! while the device is unsealed; public keydefs are stored in plaintext and
//! also fire while sealed.

use thiserror::Error;

use crate::domain::report::KeyboardReport;

/// Maximum number of actions in one keydef.
pub const MAX_ACTIONS: usize = 64;

/// Maximum MQTT topic or payload length, excluding the terminator the
/// firmware's fixed 64-byte fields reserve.
pub const MAX_MQTT_FIELD_LEN: usize = 63;

/// Errors raised while building a keydef.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeydefError {
    /// Trigger 0 means "unused" and can never be bound.
    #[error("trigger 0x00 is reserved")]
    ReservedTrigger,

    /// The keydef already holds [`MAX_ACTIONS`] actions.
    #[error("keydef 0x{trigger:02X} is full ({MAX_ACTIONS} actions)")]
    Full { trigger: u8 },

    /// An MQTT topic or payload does not fit its fixed-size field.
    #[error("MQTT {field} is {len} bytes, limit is {MAX_MQTT_FIELD_LEN}")]
    MqttFieldTooLong { field: &'static str, len: usize },
}

/// One step of a macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroAction {
    /// Emit this keyboard report to the host.
    Hid(KeyboardReport),
    /// Publish `payload` on `topic` through the MQTT adapter.
    Mqtt { topic: String, payload: String },
    /// Pause playback.  Reserved: persisted and parsed, skipped at playback.
    Delay { millis: u32 },
    /// Move the pointer.  Reserved: persisted and parsed, skipped at playback.
    MouseMove {
        buttons: u8,
        dx: i8,
        dy: i8,
        wheel: i8,
    },
}

impl MacroAction {
    /// Builds an MQTT action, enforcing the field limits.
    ///
    /// # Errors
    ///
    /// Returns [`KeydefError::MqttFieldTooLong`] if either string exceeds
    /// [`MAX_MQTT_FIELD_LEN`] bytes.
    pub fn mqtt(topic: impl Into<String>, payload: impl Into<String>) -> Result<Self, KeydefError> {
        let topic = topic.into();
        let payload = payload.into();
        if topic.len() > MAX_MQTT_FIELD_LEN {
            return Err(KeydefError::MqttFieldTooLong {
                field: "topic",
                len: topic.len(),
            });
        }
        if payload.len() > MAX_MQTT_FIELD_LEN {
            return Err(KeydefError::MqttFieldTooLong {
                field: "payload",
                len: payload.len(),
            });
        }
        Ok(MacroAction::Mqtt { topic, payload })
    }

    /// Clears the reserved byte of keyboard reports; hosts ignore it and the
    /// text format has no way to express it.
    fn normalized(self) -> Self {
        match self {
            MacroAction::Hid(report) => MacroAction::Hid(KeyboardReport {
                reserved: 0,
                ..report
            }),
            other => other,
        }
    }
}

/// A macro definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keydef {
    trigger: u8,
    pub require_unlock: bool,
    actions: Vec<MacroAction>,
}

impl Keydef {
    /// Creates an empty keydef for `trigger`.
    ///
    /// # Errors
    ///
    /// Returns [`KeydefError::ReservedTrigger`] for trigger 0.
    pub fn new(trigger: u8, require_unlock: bool) -> Result<Self, KeydefError> {
        if trigger == 0 {
            return Err(KeydefError::ReservedTrigger);
        }
        Ok(Self {
            trigger,
            require_unlock,
            actions: Vec::with_capacity(MAX_ACTIONS),
        })
    }

    /// Creates a keydef from a list of actions.
    ///
    /// # Errors
    ///
    /// Fails for trigger 0 or more than [`MAX_ACTIONS`] actions.
    pub fn with_actions(
        trigger: u8,
        require_unlock: bool,
        actions: Vec<MacroAction>,
    ) -> Result<Self, KeydefError> {
        if actions.len() > MAX_ACTIONS {
            return Err(KeydefError::Full { trigger });
        }
        let mut def = Self::new(trigger, require_unlock)?;
        def.actions = actions.into_iter().map(MacroAction::normalized).collect();
        Ok(def)
    }

    pub fn trigger(&self) -> u8 {
        self.trigger
    }

    pub fn actions(&self) -> &[MacroAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.actions.len() >= MAX_ACTIONS
    }

    /// Appends an action.
    ///
    /// # Errors
    ///
    /// Returns [`KeydefError::Full`] once [`MAX_ACTIONS`] actions are held;
    /// the keydef is left unchanged.
    pub fn push(&mut self, action: MacroAction) -> Result<(), KeydefError> {
        if self.is_full() {
            return Err(KeydefError::Full {
                trigger: self.trigger,
            });
        }
        self.actions.push(action.normalized());
        Ok(())
    }

    /// Appends a keyboard report.
    ///
    /// # Errors
    ///
    /// See [`Keydef::push`].
    pub fn push_report(&mut self, report: KeyboardReport) -> Result<(), KeydefError> {
        self.push(MacroAction::Hid(report))
    }
}

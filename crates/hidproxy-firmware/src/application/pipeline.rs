//! Executor D: the host-computer side and the owner of every secret.
//!
//! Each [`Pipeline::tick`] runs the steps below in order:
//!
//! 1. poll the downstream device (completions, host LED reports, mount);
//! 2. apply upstream mount changes to the interface table;
//! 3. drain the upstream queue: mouse reports go straight to the host,
//!    generic reports are classified, keyboard reports go through
//!    [`step`] and the resulting [`Effect`]s are carried out;
//! 4. seal if the idle watchdog expired;
//! 5. poll the NFC reader while sealed;
//! 6. answer queued web requests;
//! 7. pump the downstream emitter;
//! 8. refresh the keyboard LEDs;
//! 9. log the periodic status line.
//!
//! The key/value store, the derived key and the password accumulator are
//! only ever touched from here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidproxy_core::crypto::{derive_key, AeadKey, PasswordBuffer};
use hidproxy_core::domain::{
    DeviceStatus, DownstreamRecord, KeyboardReport, Keydef, MacroAction, SourceId, UpstreamPayload,
};
use hidproxy_core::keymap::ModifierFlags;
use hidproxy_core::protocol::{
    classify_report, parse_macros, serialize_macros, ClassifiedReport, ReportInfo,
};
use hidproxy_web::application::WebCommand;
use hidproxy_web::domain::{StatusReport, UnsealResult, WebError, WebRequest, WebResponse};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, trace, warn};

use crate::application::diagnostics::{Counters, Diagnostics, StatusSnapshot};
use crate::application::emitter::{DownstreamEmitter, Submission};
use crate::application::leds::LedController;
use crate::application::macro_store::{MacroStore, MacroStoreError};
use crate::application::settings::WifiSettings;
use crate::application::state_machine::{step, Effect};
use crate::application::watchdog::IdleWatchdog;
use crate::infrastructure::mqtt::{lock_topic, status_topic, LockState, MqttPublisher};
use crate::infrastructure::nfc::{NfcKeyService, NfcRead, NullNfc};
use crate::infrastructure::queues::{MountEvent, QueuedReport, Queues};
use crate::infrastructure::storage::config::{AppConfig, ConfigError};
use crate::infrastructure::usb::{DeviceEvent, DownstreamDevice};

/// Pause between loop iterations when idle.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

// ── Device state ──────────────────────────────────────────────────────────────

/// The interpreter's mutable record, owned by the pipeline.
#[derive(Debug)]
pub struct DeviceState {
    status: DeviceStatus,
    password: PasswordBuffer,
    key: Option<AeadKey>,
    staging: Option<Keydef>,
}

impl DeviceState {
    fn new(status: DeviceStatus) -> Self {
        Self {
            status,
            password: PasswordBuffer::new(),
            key: None,
            staging: None,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn key(&self) -> Option<&AeadKey> {
        self.key.as_ref()
    }

    pub fn is_unsealed(&self) -> bool {
        self.key.is_some()
    }

    pub fn password_is_clear(&self) -> bool {
        self.password.is_zeroed()
    }

    /// The macro being recorded, if any.
    pub fn staging(&self) -> Option<&Keydef> {
        self.staging.as_ref()
    }

    /// Drops the key (wiped on drop), the accumulator and any recording.
    fn forget_secrets(&mut self) {
        self.key = None;
        self.password.clear();
        self.staging = None;
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// The settings executor D needs, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Board unique id; salts the password KDF.
    pub device_id: Vec<u8>,
    pub idle_timeout: Duration,
    pub web_access_window: Duration,
    pub nfc_write_timeout: Duration,
    pub status_interval: Option<Duration>,
    pub mqtt_prefix: String,
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDeviceId`] if the board id is not hex.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            device_id: config.device_id_bytes()?,
            idle_timeout: config.idle_timeout(),
            web_access_window: config.web_access_window(),
            nfc_write_timeout: config.nfc_write_timeout(),
            status_interval: config.status_interval(),
            mqtt_prefix: config.mqtt_topic_prefix()?,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let config = AppConfig::default();
        let device_id = config.device_id_bytes().unwrap_or_default();
        Self {
            mqtt_prefix: crate::infrastructure::mqtt::default_topic_prefix(&device_id),
            device_id,
            idle_timeout: config.idle_timeout(),
            web_access_window: config.web_access_window(),
            nfc_write_timeout: config.nfc_write_timeout(),
            status_interval: config.status_interval(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    device: Box<dyn DownstreamDevice>,
    queues: Arc<Queues>,
    store: MacroStore,
    state: DeviceState,
    config: PipelineConfig,
    emitter: DownstreamEmitter,
    watchdog: IdleWatchdog,
    leds: LedController,
    diagnostics: Diagnostics,
    interfaces: HashMap<SourceId, Vec<ReportInfo>>,
    nfc: Box<dyn NfcKeyService>,
    mqtt: Option<Arc<dyn MqttPublisher>>,
    web: Option<mpsc::Receiver<WebCommand>>,
    web_access_until: Option<Instant>,
}

impl Pipeline {
    /// Builds executor D over a mounted store.  The initial status is
    /// `sealed` when a password hash exists and `blank` otherwise.
    pub fn new(
        device: Box<dyn DownstreamDevice>,
        queues: Arc<Queues>,
        store: MacroStore,
        counters: Arc<Counters>,
        config: PipelineConfig,
        now: Instant,
    ) -> Self {
        let status = DeviceStatus::at_boot(store.has_password_hash());
        queues.flags.mark_kvstore_ready();
        info!(%status, macros = store.list().len(), "storage ready");
        match WifiSettings::load(store.kv(), None) {
            Ok(wifi) if !wifi.ssid.is_empty() => {
                info!(ssid = %wifi.ssid, country = %wifi.country, enabled = wifi.enabled, "wifi settings");
            }
            Ok(_) => debug!("no wifi settings stored"),
            Err(e) => warn!(error = %e, "wifi settings unreadable"),
        }
        Self {
            device,
            queues,
            store,
            state: DeviceState::new(status),
            watchdog: IdleWatchdog::new(config.idle_timeout, now),
            diagnostics: Diagnostics::new(counters, config.status_interval, now),
            config,
            emitter: DownstreamEmitter::new(),
            leds: LedController::new(now),
            interfaces: HashMap::new(),
            nfc: Box::new(NullNfc),
            mqtt: None,
            web: None,
            web_access_until: None,
        }
    }

    pub fn with_nfc(mut self, nfc: Box<dyn NfcKeyService>) -> Self {
        self.nfc = nfc;
        self
    }

    pub fn with_mqtt(mut self, mqtt: Arc<dyn MqttPublisher>) -> Self {
        self.mqtt = Some(mqtt);
        self
    }

    /// Answers requests from the HTTP service.
    pub fn with_web(mut self, rx: mpsc::Receiver<WebCommand>) -> Self {
        self.web = Some(rx);
        self
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.status
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn store(&self) -> &MacroStore {
        &self.store
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn web_access_enabled(&self, now: Instant) -> bool {
        self.web_access_until.is_some_and(|until| now < until)
    }

    /// One pass of the loop.  Returns how many events were handled.
    pub async fn tick(&mut self, now: Instant) -> usize {
        let mut handled = self.poll_device();
        handled += self.drain_mounts();

        while let Some(queued) = self.queues.upstream.pop() {
            handled += 1;
            let was_unsealed = self.state.is_unsealed();
            self.handle_upstream(queued, now).await;
            self.announce_lock(was_unsealed).await;
        }

        if self.watchdog.expired(self.state.status, now) {
            info!(status = %self.state.status, "idle timeout; sealing");
            let was_unsealed = self.state.is_unsealed();
            self.seal();
            self.announce_lock(was_unsealed).await;
        }

        let was_unsealed = self.state.is_unsealed();
        self.poll_nfc(now);
        handled += self.serve_web(now);
        self.announce_lock(was_unsealed).await;

        self.pump(now);
        self.leds.tick(self.state.status, now, &self.queues.leds);

        let snapshot = StatusSnapshot {
            status: self.state.status,
            upstream_dropped: self.queues.upstream.dropped(),
            upstream_depth: self.queues.upstream.len(),
            downstream_depth: self.queues.downstream.len(),
            macros: 0,
        };
        let store = &self.store;
        self.diagnostics.maybe_log_status(now, || StatusSnapshot {
            macros: store.list().len(),
            ..snapshot
        });
        handled
    }

    /// Runs until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!(status = %self.state.status, "executor D started");
        if let Some(mqtt) = &self.mqtt {
            if let Err(e) = mqtt.publish(&status_topic(&self.config.mqtt_prefix), "online").await {
                warn!(error = %e, "mqtt online announcement failed");
            }
        }
        while running.load(Ordering::Relaxed) {
            if self.tick(Instant::now()).await == 0 {
                tokio::time::sleep(IDLE_SLEEP).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        self.state.forget_secrets();
        info!("executor D stopped");
    }

    // ── Device and mounts ─────────────────────────────────────────────────────

    fn poll_device(&mut self) -> usize {
        let events = self.device.poll();
        for event in &events {
            match *event {
                DeviceEvent::Mounted => {
                    if !self.queues.flags.usb_device_ever_mounted() {
                        info!("host computer configured the device");
                    }
                    self.queues.flags.mark_usb_device_mounted();
                }
                DeviceEvent::ReportComplete => self.emitter.on_complete(),
                DeviceEvent::LedReport(leds) => self.leds.set_host_state(leds),
            }
        }
        events.len()
    }

    fn drain_mounts(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.queues.mounts.pop() {
            handled += 1;
            match event {
                MountEvent::Mounted { source, reports, .. } => {
                    debug!(?source, collections = reports.len(), "interface table updated");
                    self.interfaces.insert(source, reports);
                }
                MountEvent::Unmounted { source } => {
                    self.interfaces.remove(&source);
                }
            }
        }
        handled
    }

    // ── Upstream reports ──────────────────────────────────────────────────────

    async fn handle_upstream(&mut self, queued: QueuedReport, now: Instant) {
        self.watchdog.touch(now);
        let QueuedReport { seq, report } = queued;
        match report.payload {
            UpstreamPayload::Keyboard(kb) => self.handle_keyboard(seq, kb, now).await,
            UpstreamPayload::Mouse(mouse) => self.enqueue(DownstreamRecord::mouse(&mouse), now).await,
            UpstreamPayload::Raw { len, bytes } => {
                let infos = self
                    .interfaces
                    .get(&report.source)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let classified = classify_report(infos, &bytes[..usize::from(len)]);
                match classified {
                    ClassifiedReport::Keyboard(kb) => self.handle_keyboard(seq, kb, now).await,
                    ClassifiedReport::Mouse(mouse) => {
                        self.enqueue(DownstreamRecord::mouse(&mouse), now).await;
                    }
                    ClassifiedReport::Other => {
                        trace!(source = ?report.source, len, "unclassified report dropped");
                    }
                }
            }
        }
    }

    async fn handle_keyboard(&mut self, seq: u32, report: KeyboardReport, now: Instant) {
        self.diagnostics.record_received(seq, report, now);
        let transition = step(self.state.status, &report);
        if transition.next != self.state.status {
            debug!(from = %self.state.status, to = %transition.next, "status change");
        }
        self.state.status = transition.next;
        for effect in transition.effects {
            self.apply(effect, now).await;
        }
    }

    async fn apply(&mut self, effect: Effect, now: Instant) {
        match effect {
            Effect::PassThrough(report) => {
                self.enqueue(DownstreamRecord::keyboard(&report), now).await;
            }
            Effect::RebootToBootloader => {
                warn!("rebooting into the bootloader");
                self.device.reboot_to_bootloader();
            }
            Effect::DumpDiagnostics => {
                let dump = self.diagnostics.dump(self.queues.upstream.dropped());
                for line in dump.lines() {
                    info!("{line}");
                }
            }
            Effect::ClearPassword => self.state.password.clear(),
            Effect::AppendPassword(keycode) => self.state.password.push(keycode),
            Effect::Unlock => self.unlock_from_keyboard(now),
            Effect::SetNewPassword => self.set_new_password(),
            Effect::Seal => self.seal(),
            Effect::Wipe => self.wipe(),
            Effect::Evaluate {
                trigger,
                report,
                public_only,
            } => self.evaluate(trigger, report, public_only, now).await,
            Effect::EnableWebAccess => self.enable_web_access(now),
            Effect::WriteNfcKey => match &self.state.key {
                Some(key) => {
                    self.nfc.write_key(key, now + self.config.nfc_write_timeout);
                    info!("present a tag to store the key");
                }
                None => warn!("no key to write"),
            },
            Effect::BeginDefinition(trigger) => self.begin_definition(trigger),
            Effect::Record(report) => self.record(report),
            Effect::SaveDefinition => self.save_definition(),
        }
    }

    // ── Passwords and sealing ─────────────────────────────────────────────────

    /// Derives the key from the accumulator, then wipes the accumulator.
    fn take_password_key(&mut self) -> Option<AeadKey> {
        let derived = derive_key(self.state.password.as_bytes(), &self.config.device_id);
        self.state.password.clear();
        match derived {
            Ok(derived) => Some(derived.aead_key()),
            Err(e) => {
                error!(error = %e, "key derivation failed");
                None
            }
        }
    }

    /// Installs `key` if it matches the stored hash.
    fn try_unseal(&mut self, key: AeadKey, now: Instant) -> bool {
        match self.store.validate_password(&key) {
            Ok(true) => {
                self.state.password.clear();
                self.state.key = Some(key);
                self.state.status = DeviceStatus::Unsealed;
                self.watchdog.touch(now);
                info!("unsealed");
                true
            }
            Ok(false) => {
                info!("password rejected");
                false
            }
            Err(e) => {
                error!(error = %e, "password hash unreadable");
                false
            }
        }
    }

    fn unlock_from_keyboard(&mut self, now: Instant) {
        let unsealed = match self.take_password_key() {
            Some(key) => self.try_unseal(key, now),
            None => false,
        };
        if !unsealed {
            self.state.forget_secrets();
            self.state.status = DeviceStatus::at_boot(self.store.has_password_hash());
        }
    }

    /// ENTER in `entering_new_password`.
    ///
    /// - With a key in RAM (reached from unsealed): re-seal every private
    ///   value under the new key, then store its hash.
    /// - Without a key and without a hash (reached from blank): first-time
    ///   setup.
    /// - Without a key but with a hash (reached from sealed): refused.
    fn set_new_password(&mut self) {
        let Some(new_key) = self.take_password_key() else {
            self.fall_back_after_password_failure();
            return;
        };
        match self.state.key.take() {
            Some(old_key) => match self.store.change_password(&old_key, &new_key) {
                Ok(resealed) => {
                    info!(resealed, "password changed");
                    self.state.key = Some(new_key);
                }
                Err(e) => {
                    error!(error = %e, "password change incomplete; old password still applies");
                    self.state.key = Some(old_key);
                }
            },
            None if self.store.has_password_hash() => {
                warn!("unseal before changing the password");
                self.fall_back_after_password_failure();
            }
            None => match self.store.set_password_hash(&new_key) {
                Ok(()) => {
                    info!("password set");
                    self.state.key = Some(new_key);
                }
                Err(e) => {
                    error!(error = %e, "could not store the password hash");
                    self.fall_back_after_password_failure();
                }
            },
        }
    }

    fn fall_back_after_password_failure(&mut self) {
        if self.state.key.is_some() {
            self.state.status = DeviceStatus::Unsealed;
        } else {
            self.state.forget_secrets();
            self.state.status = DeviceStatus::at_boot(self.store.has_password_hash());
        }
    }

    fn seal(&mut self) {
        self.state.forget_secrets();
        self.state.status = DeviceStatus::Sealed;
        info!("sealed");
    }

    fn wipe(&mut self) {
        if let Err(e) = self.store.wipe() {
            error!(error = %e, "wipe incomplete");
        }
        self.state.forget_secrets();
        self.state.status = DeviceStatus::Blank;
        self.web_access_until = None;
    }

    async fn announce_lock(&mut self, was_unsealed: bool) {
        let unsealed = self.state.is_unsealed();
        if unsealed == was_unsealed {
            return;
        }
        let lock = if unsealed {
            LockState::Unlocked
        } else {
            LockState::Locked
        };
        let Some(mqtt) = self.mqtt.clone() else {
            debug!(state = lock.as_str(), "lock state changed; mqtt not wired");
            return;
        };
        if let Err(e) = mqtt
            .publish(&lock_topic(&self.config.mqtt_prefix), lock.as_str())
            .await
        {
            warn!(error = %e, "lock state not published");
        }
    }

    // ── Macros ────────────────────────────────────────────────────────────────

    async fn evaluate(&mut self, trigger: u8, report: KeyboardReport, public_only: bool, now: Instant) {
        let key = self.state.key.as_ref().filter(|_| !public_only);
        let def = match self.store.load(trigger, key) {
            Ok(def) => def,
            Err(e) => {
                match e {
                    MacroStoreError::NotFound
                    | MacroStoreError::AuthFailed
                    | MacroStoreError::Locked => {
                        debug!(trigger, reason = %e, "no usable macro; passing key through");
                    }
                    other => warn!(trigger, error = %other, "macro unreadable; passing key through"),
                }
                self.enqueue(DownstreamRecord::keyboard(&report), now).await;
                self.enqueue(DownstreamRecord::keyboard(&KeyboardReport::RELEASE_ALL), now)
                    .await;
                return;
            }
        };

        debug!(trigger, actions = def.len(), "playing macro");
        self.enqueue(DownstreamRecord::keyboard(&KeyboardReport::RELEASE_ALL), now)
            .await;
        for action in def.actions() {
            match action {
                MacroAction::Hid(report) => {
                    self.enqueue(DownstreamRecord::keyboard(report), now).await;
                }
                MacroAction::Mqtt { topic, payload } => match &self.mqtt {
                    Some(mqtt) => {
                        if let Err(e) = mqtt.publish(topic, payload).await {
                            warn!(error = %e, "macro mqtt action failed");
                        }
                    }
                    None => info!(%topic, "mqtt not wired; action skipped"),
                },
                MacroAction::Delay { .. } | MacroAction::MouseMove { .. } => {
                    debug!(?action, "reserved action skipped");
                }
            }
        }
    }

    fn begin_definition(&mut self, trigger: u8) {
        match self.store.delete(trigger) {
            Ok(true) => debug!(trigger, "previous macro deleted"),
            Ok(false) => {}
            Err(e) => warn!(trigger, error = %e, "could not delete previous macro"),
        }
        match Keydef::new(trigger, true) {
            Ok(def) => {
                info!(trigger = format_args!("{trigger:#04x}"), "recording macro");
                self.state.staging = Some(def);
            }
            Err(e) => {
                warn!(trigger, error = %e, "cannot record this trigger");
                self.state.status = DeviceStatus::Unsealed;
            }
        }
    }

    fn record(&mut self, report: KeyboardReport) {
        let Some(def) = self.state.staging.as_mut() else {
            warn!("recording without a staging macro");
            return;
        };
        // The trigger key's own release arrives before anything worth keeping.
        if def.is_empty() && report.is_release_all() {
            return;
        }
        if let Err(e) = def.push_report(report) {
            error!(error = %e, "macro is full; report not recorded");
        }
    }

    fn save_definition(&mut self) {
        let Some(def) = self.state.staging.take() else {
            warn!("nothing recorded");
            return;
        };
        let def = strip_magic_prefix(def);
        match self.store.save(&def, self.state.key.as_ref()) {
            Ok(()) => info!(
                trigger = format_args!("{:#04x}", def.trigger()),
                actions = def.len(),
                "macro saved"
            ),
            Err(e) => error!(trigger = def.trigger(), error = %e, "macro not saved"),
        }
    }

    fn enable_web_access(&mut self, now: Instant) {
        self.web_access_until = Some(now + self.config.web_access_window);
        info!(
            secs = self.config.web_access_window.as_secs(),
            "web access enabled"
        );
        for def in self.store.load_all(self.state.key.as_ref()) {
            info!(
                trigger = format_args!("{:#04x}", def.trigger()),
                private = def.require_unlock,
                actions = def.len(),
                "macro"
            );
        }
    }

    // ── Downstream ────────────────────────────────────────────────────────────

    /// Queues `record` for the host, pumping the emitter until there is room.
    async fn enqueue(&mut self, mut record: DownstreamRecord, now: Instant) {
        loop {
            match self.queues.downstream.try_push(record) {
                Ok(()) => return,
                Err(back) => {
                    record = back;
                    self.poll_device();
                    self.pump(now);
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    fn pump(&mut self, now: Instant) {
        while let Some(submission) = self
            .emitter
            .tick(&self.queues.downstream, self.device.as_mut())
        {
            match submission {
                Submission::Sent(record) => {
                    if let Some(report) = record.as_keyboard() {
                        self.diagnostics.record_sent(report, now);
                    }
                }
                Submission::Refused(record) => {
                    if record.as_keyboard().is_some() {
                        self.diagnostics.record_refused();
                    }
                }
            }
        }
    }

    // ── Side channels ─────────────────────────────────────────────────────────

    fn poll_nfc(&mut self, now: Instant) {
        if !self.state.status.is_sealed_family() || !self.store.has_password_hash() {
            return;
        }
        match self.nfc.try_read_key() {
            NfcRead::NoTag => {}
            NfcRead::BadKey => {
                warn!("nfc tag carries no key");
                self.nfc.bad_key();
            }
            NfcRead::Key(key) => {
                if !self.try_unseal(key, now) {
                    self.nfc.bad_key();
                }
            }
        }
    }

    fn serve_web(&mut self, now: Instant) -> usize {
        let Some(mut rx) = self.web.take() else {
            return 0;
        };
        let mut handled = 0;
        loop {
            match rx.try_recv() {
                Ok(cmd) => {
                    handled += 1;
                    let result = self.answer(&cmd.request, now);
                    cmd.respond(result);
                }
                Err(TryRecvError::Empty) => {
                    self.web = Some(rx);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    info!("web service stopped");
                    break;
                }
            }
        }
        handled
    }

    /// Web window first (403), then the key (423).
    fn web_key(&self, now: Instant) -> Result<AeadKey, WebError> {
        if !self.web_access_enabled(now) {
            return Err(WebError::AccessDenied);
        }
        self.state.key.clone().ok_or(WebError::Locked)
    }

    fn answer(&mut self, request: &WebRequest, now: Instant) -> Result<WebResponse, WebError> {
        debug!(?request, "web request");
        match request {
            WebRequest::GetMacros => {
                let key = self.web_key(now)?;
                let defs = self.store.load_all(Some(&key));
                Ok(WebResponse::Macros(serialize_macros(&defs)))
            }
            WebRequest::PutMacros(text) => {
                let key = self.web_key(now)?;
                let defs = parse_macros(text).map_err(|e| WebError::BadRequest(e.to_string()))?;
                let stored = self
                    .store
                    .replace_all(&defs, Some(&key))
                    .map_err(|e| WebError::Storage(e.to_string()))?;
                Ok(WebResponse::Stored(stored))
            }
            WebRequest::Status => {
                let expires_in = self
                    .web_access_until
                    .map(|until| until.saturating_duration_since(now).as_millis() as u64)
                    .unwrap_or(0);
                Ok(WebResponse::Status(StatusReport {
                    sealed: !self.state.is_unsealed(),
                    web_enabled: self.web_access_enabled(now),
                    expires_in,
                    macros: self.store.list().len(),
                    uptime: self.diagnostics.uptime(now).as_secs(),
                }))
            }
            WebRequest::Unseal { password } => {
                if self.state.is_unsealed() {
                    return Ok(WebResponse::Unseal(UnsealResult::ok("Device already unsealed")));
                }
                // Same accumulator as the keyboard path, so long passwords
                // truncate identically.
                let mut typed = PasswordBuffer::new();
                for &keycode in password.iter() {
                    typed.push(keycode);
                }
                let key = derive_key(typed.as_bytes(), &self.config.device_id)
                    .map_err(|e| WebError::Storage(e.to_string()))?
                    .aead_key();
                let result = if self.try_unseal(key, now) {
                    UnsealResult::ok("Device unsealed successfully")
                } else {
                    UnsealResult::failed("Incorrect password")
                };
                Ok(WebResponse::Unseal(result))
            }
        }
    }
}

/// Drops the shift-only reports recorded while the user was reaching for
/// the closing magic sequence.
fn strip_magic_prefix(def: Keydef) -> Keydef {
    let mut actions = def.actions().to_vec();
    while let Some(MacroAction::Hid(report)) = actions.last() {
        let shift_only = report.modifier != 0
            && report.modifier & !ModifierFlags::BOTH_SHIFTS == 0
            && report.has_no_keys();
        if !shift_only {
            break;
        }
        actions.pop();
    }
    if actions.len() == def.len() {
        return def;
    }
    Keydef::with_actions(def.trigger(), def.require_unlock, actions).unwrap_or(def)
}

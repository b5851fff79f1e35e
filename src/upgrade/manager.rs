//! Upgrade orchestration.
//!
//! `UpgradeManager` owns the session and interprets every upgrade packet the
//! device sends. It never blocks: packets, link acknowledgements, timer
//! expiries and listener decisions are all fed in by the host, one at a time,
//! and every reaction goes out through the [`UpgradeListener`].
//!
//! Sequence of a full upgrade:
//! 1. Sync - identify the file with the tail of its MD5, learn the resume point
//! 2. Start - retried while the device application is not ready
//! 3. Data transfer - the device requests ranges, the host drains them
//! 4. Validation - polled until the device is done
//! 5. Transfer complete - the device reboots on the new image
//! 6. In progress / Commit - the listener confirms, the device completes

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::codes::{
    action_byte, ConfirmationKind, OpCode, ResumePoint, ReturnCode, Severity, StartStatus,
    DATA_LAST_PACKET, DATA_MORE_PACKETS,
};
use super::image::{FirmwareImage, FirmwareSource};
use super::packet::UpgradePacket;
use super::progress::UploadProgress;
use crate::config::UpgradeConfig;
use crate::error::{ExceptionKind, UpgradeError};
use crate::gaia::{GaiaFramer, GaiaStatus, Inbound};
use crate::traits::{Scheduler, TimerAction, TimerHandle, TimerToken, UpgradeListener};

/// Where the state machine stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "step")]
pub enum Phase {
    /// No session.
    Idle,
    /// Waiting for the sync confirmation.
    Syncing,
    /// Waiting for the start confirmation.
    Starting,
    /// Working through the upgrade from the given step.
    Upgrading(ResumePoint),
    /// Abort requested, waiting for the device to confirm it.
    Aborting,
}

impl Phase {
    /// Get a human-readable message for this phase.
    pub fn message(&self) -> String {
        match self {
            Phase::Idle => "Idle".into(),
            Phase::Syncing => "Synchronising with device...".into(),
            Phase::Starting => "Starting upgrade...".into(),
            Phase::Upgrading(point) => format!("{}...", point.description()),
            Phase::Aborting => "Aborting upgrade...".into(),
        }
    }
}

/// What the next successful link acknowledgement triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PendingAfterAck {
    #[default]
    None,
    /// The last data packet went out: move on to validation.
    FinishDataPhase,
    /// The listener declined a step: abort once the answer is delivered.
    Abort,
}

#[derive(Debug)]
struct UpgradeSession {
    id: u64,
    image: FirmwareImage,
    resume_point: ResumePoint,
    cursor: usize,
    pending_send_len: usize,
    start_attempts: u8,
    after_ack: PendingAfterAck,
    transfer_started_at: Option<Instant>,
}

impl UpgradeSession {
    fn new(id: u64, image: FirmwareImage) -> Self {
        Self {
            id,
            image,
            resume_point: ResumePoint::default(),
            cursor: 0,
            pending_send_len: 0,
            start_attempts: 0,
            after_ack: PendingAfterAck::None,
            transfer_started_at: None,
        }
    }

    /// Forget transfer progress ahead of a new synchronisation.
    fn reset(&mut self, id: u64) {
        self.id = id;
        self.cursor = 0;
        self.pending_send_len = 0;
        self.start_attempts = 0;
        self.after_ack = PendingAfterAck::None;
        self.transfer_started_at = None;
    }
}

/// The upgrade state machine.
pub struct UpgradeManager<L: UpgradeListener, S: Scheduler> {
    listener: L,
    scheduler: S,
    framer: GaiaFramer,
    max_start_attempts: u8,
    start_retry_delay: Duration,
    acknowledge_notifications: bool,
    chunk_size: usize,
    phase: Phase,
    session: Option<UpgradeSession>,
    next_session_id: u64,
    pending_timers: Vec<(TimerHandle, TimerToken)>,
    restart_after_abort: Option<FirmwareImage>,
}

impl<L: UpgradeListener, S: Scheduler> UpgradeManager<L, S> {
    pub fn new(listener: L, scheduler: S, config: &UpgradeConfig) -> Self {
        Self {
            listener,
            scheduler,
            framer: config.framer(),
            max_start_attempts: config.max_start_attempts,
            start_retry_delay: config.start_retry_delay(),
            acknowledge_notifications: config.acknowledge_notifications,
            chunk_size: config.data_chunk_size().max(1),
            phase: Phase::Idle,
            session: None,
            next_session_id: 0,
            pending_timers: Vec::new(),
            restart_after_abort: None,
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Resume point of the active session.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        self.session.as_ref().map(|session| session.resume_point)
    }

    /// Whether a session is active.
    pub fn is_upgrading(&self) -> bool {
        self.session.is_some()
    }

    /// Transfer progress of the active session.
    pub fn progress(&self) -> Option<UploadProgress> {
        self.session.as_ref().map(|session| {
            let elapsed = session
                .transfer_started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();
            UploadProgress::compute(session.cursor, session.image.len(), elapsed)
        })
    }

    pub fn framer(&self) -> &GaiaFramer {
        &self.framer
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    // ========================================================================
    // Host entry points
    // ========================================================================

    /// Start an upgrade with the given file.
    ///
    /// Rejected with [`UpgradeError::AlreadyUpgrading`] while a session is
    /// active, and also while an abort is waiting for the device's
    /// confirmation even though [`Self::is_upgrading`] is already false.
    /// [`Self::reset`] clears an abort that will never be confirmed.
    ///
    /// Local faults are reported to the listener and returned; no session is
    /// created for them.
    pub fn start(&mut self, source: impl FirmwareSource) -> Result<(), UpgradeError> {
        if self.session.is_some() || self.phase == Phase::Aborting {
            return Err(self.reject(UpgradeError::AlreadyUpgrading));
        }

        let image = match source.load() {
            Ok(image) => image,
            Err(e) => return Err(self.reject(e)),
        };

        info!(
            "Starting upgrade: {} bytes, md5 {}",
            image.len(),
            hex(image.md5())
        );

        let id = self.new_session_id();
        self.session = Some(UpgradeSession::new(id, image));
        self.synchronize();
        Ok(())
    }

    /// Synchronise again with the file of the active session, typically after
    /// the link dropped and was re-established.
    ///
    /// Returns false if there is no session to resume.
    pub fn resume(&mut self) -> bool {
        if self.session.is_none() {
            debug!("Nothing to resume");
            return false;
        }

        info!("Resuming upgrade");
        self.cancel_timers();
        self.synchronize();
        true
    }

    /// Abort the active session. No-op when no session is active.
    pub fn abort(&mut self) {
        if self.session.is_none() {
            debug!("Abort requested with no active session");
            return;
        }

        info!("Aborting upgrade");
        self.send_upgrade(OpCode::AbortReq, Vec::new());
        self.end_session();
        self.phase = Phase::Aborting;
    }

    /// Feed bytes received from the device.
    pub fn receive_inbound(&mut self, bytes: &[u8]) {
        let packet = match self.framer.decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping undecodable GAIA packet: {}", e);
                return;
            }
        };

        match self.framer.classify(packet) {
            Inbound::ControlAck(Some(GaiaStatus::Success)) => self.on_link_ack(),
            Inbound::ControlAck(status) => self.on_control_refused(status),
            Inbound::UpgradePacket { notification, data } => {
                if self.acknowledge_notifications {
                    match self.framer.acknowledge(&notification, GaiaStatus::Success) {
                        Ok(ack) => self.listener.send_bytes(ack),
                        Err(e) => warn!("Failed to acknowledge notification: {}", e),
                    }
                }
                self.handle_upgrade_packet(&data);
            }
            Inbound::Acknowledgement { command, status } => {
                debug!("Acknowledgement of 0x{:04X}: {:?}", command, status);
            }
            Inbound::Other(packet) => {
                debug!("Ignoring GAIA command 0x{:04X}", packet.command());
            }
        }
    }

    /// The last packet sent was delivered.
    pub fn on_link_ack(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match std::mem::take(&mut session.after_ack) {
            PendingAfterAck::FinishDataPhase => {
                info!("Last data packet delivered, validating");
                self.set_resume_point(ResumePoint::Validation);
                self.send_upgrade(OpCode::IsValidationDoneReq, Vec::new());
            }
            PendingAfterAck::Abort => self.abort(),
            PendingAfterAck::None => {
                if self.phase == Phase::Upgrading(ResumePoint::DataTransfer)
                    && session.pending_send_len > 0
                {
                    self.send_next_data_packet();
                }
            }
        }
    }

    /// A timer scheduled by this manager fired.
    pub fn on_timer(&mut self, token: TimerToken) {
        if let Some(index) = self.pending_timers.iter().position(|(_, t)| *t == token) {
            self.pending_timers.remove(index);
        }

        let current = self.session.as_ref().map(|session| session.id);
        if current != Some(token.session) {
            debug!("Ignoring stale timer {:?}", token);
            return;
        }

        match token.action {
            TimerAction::RetryStart if self.phase == Phase::Starting => {
                debug!("Retrying start request");
                self.send_upgrade(OpCode::StartReq, Vec::new());
            }
            TimerAction::PollValidation
                if self.phase == Phase::Upgrading(ResumePoint::Validation) =>
            {
                self.send_upgrade(OpCode::IsValidationDoneReq, Vec::new());
            }
            action => debug!("Timer {:?} fired in phase {:?}", action, self.phase),
        }
    }

    /// Answer a confirmation asked through [`UpgradeListener::ask_confirmation`].
    pub fn confirm(&mut self, kind: ConfirmationKind, accepted: bool) {
        if self.session.is_none() {
            warn!("Confirmation {:?} with no active session", kind);
            return;
        }

        info!("Confirmation {:?}: accepted={}", kind, accepted);
        match kind {
            ConfirmationKind::TransferComplete => {
                self.answer_then_maybe_abort(OpCode::TransferCompleteRes, accepted)
            }
            ConfirmationKind::Commit => self.answer_then_maybe_abort(OpCode::CommitCfm, accepted),
            ConfirmationKind::InProgress => {
                self.send_upgrade(OpCode::InProgressRes, vec![action_byte(accepted)]);
                if !accepted {
                    self.abort();
                }
            }
            ConfirmationKind::BatteryLow => {
                if accepted {
                    self.synchronize();
                } else {
                    self.abort();
                }
            }
            ConfirmationKind::FileDiffersWarning => {
                self.restart_after_abort = if accepted {
                    self.session.as_ref().map(|session| session.image.clone())
                } else {
                    None
                };
                self.abort();
            }
        }
    }

    /// Drop any session and pending abort without talking to the device.
    pub fn reset(&mut self) {
        self.end_session();
        self.restart_after_abort = None;
        self.phase = Phase::Idle;
    }

    // ========================================================================
    // Upgrade packet handlers
    // ========================================================================

    fn handle_upgrade_packet(&mut self, bytes: &[u8]) {
        let packet = match UpgradePacket::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                if bytes.first() == Some(&OpCode::AbortCfm.value()) {
                    warn!("Malformed abort confirmation, honouring it: {}", e);
                    self.on_abort_cfm();
                } else if self.is_upgrading() {
                    self.fail(e.into());
                } else {
                    warn!("Dropping malformed upgrade packet: {}", e);
                }
                return;
            }
        };

        debug!(
            "Received {:?} ({} bytes) in phase {:?}",
            packet.opcode,
            packet.data.len(),
            self.phase
        );

        match packet.opcode {
            OpCode::AbortCfm => return self.on_abort_cfm(),
            OpCode::ErrorWarnInd => return self.on_error_warn_ind(&packet.data),
            _ => {}
        }

        if !self.is_upgrading() {
            debug!("No active session, ignoring {:?}", packet.opcode);
            return;
        }

        match packet.opcode {
            OpCode::SyncCfm => self.on_sync_cfm(&packet.data),
            OpCode::StartCfm => self.on_start_cfm(&packet.data),
            OpCode::DataBytesReq => self.on_data_bytes_req(&packet.data),
            OpCode::IsValidationDoneCfm => self.on_validation_done_cfm(&packet.data),
            OpCode::TransferCompleteInd => {
                self.set_resume_point(ResumePoint::TransferComplete);
                self.listener
                    .ask_confirmation(ConfirmationKind::TransferComplete);
            }
            OpCode::CommitReq => {
                self.set_resume_point(ResumePoint::Commit);
                self.listener.ask_confirmation(ConfirmationKind::Commit);
            }
            OpCode::CompleteInd => self.on_complete_ind(),
            other => self.fail(ExceptionKind::UnexpectedOpCode(other).into()),
        }
    }

    fn on_sync_cfm(&mut self, data: &[u8]) {
        let point = match data.first().copied().and_then(ResumePoint::from_byte) {
            Some(point) => point,
            None => {
                debug!("No valid resume point in sync confirmation, starting from data transfer");
                ResumePoint::default()
            }
        };

        if let Some(session) = self.session.as_mut() {
            session.resume_point = point;
        }
        info!("Synchronised, resume point {:?}", point);
        self.listener.on_resume_point_changed(point);

        self.phase = Phase::Starting;
        self.send_upgrade(OpCode::StartReq, Vec::new());
    }

    fn on_start_cfm(&mut self, data: &[u8]) {
        if data.len() < 3 {
            warn!("Start confirmation too short: {} bytes", data.len());
            return self.fail(UpgradeError::WrongDataParameter);
        }

        let battery_level = u16::from_be_bytes([data[1], data[2]]);
        match StartStatus::from_byte(data[0]) {
            StartStatus::Success => {
                debug!("Start confirmed, battery level {}", battery_level);
                let point = match self.session.as_mut() {
                    Some(session) => {
                        session.start_attempts = 0;
                        session.resume_point
                    }
                    None => return,
                };
                self.resume_from(point);
            }
            StartStatus::AppNotReady => self.retry_start(),
            StartStatus::Other(status) => {
                warn!("Unexpected start status 0x{:02X}", status);
                self.fail(UpgradeError::WrongDataParameter);
            }
        }
    }

    /// Dispatch on the resume point adopted at synchronisation.
    fn resume_from(&mut self, point: ResumePoint) {
        self.phase = Phase::Upgrading(point);
        match point {
            ResumePoint::DataTransfer => self.send_upgrade(OpCode::StartDataReq, Vec::new()),
            ResumePoint::Validation => self.send_upgrade(OpCode::IsValidationDoneReq, Vec::new()),
            ResumePoint::TransferComplete => self
                .listener
                .ask_confirmation(ConfirmationKind::TransferComplete),
            ResumePoint::InProgress => self.listener.ask_confirmation(ConfirmationKind::InProgress),
            ResumePoint::Commit => self.listener.ask_confirmation(ConfirmationKind::Commit),
        }
    }

    fn retry_start(&mut self) {
        let max_attempts = self.max_start_attempts;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.start_attempts >= max_attempts {
            warn!("Device still not ready after {} attempts", max_attempts);
            return self.fail(UpgradeError::BoardNotReady);
        }

        session.start_attempts += 1;
        info!(
            "Device application not ready, retrying start ({}/{})",
            session.start_attempts, max_attempts
        );
        self.schedule(self.start_retry_delay, TimerAction::RetryStart);
    }

    fn on_data_bytes_req(&mut self, data: &[u8]) {
        if data.len() < 8 {
            warn!("Data bytes request too short: {} bytes", data.len());
            return self.fail(UpgradeError::WrongDataParameter);
        }

        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let offset = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let file_len = session.image.len();

        if offset > 0 {
            match session.cursor.checked_add(offset) {
                Some(target) if target < file_len => session.cursor = target,
                _ => warn!(
                    "Ignoring offset {} beyond end of file (cursor {}, size {})",
                    offset, session.cursor, file_len
                ),
            }
        }

        let remaining = file_len - session.cursor;
        session.pending_send_len = length.min(remaining);
        session.transfer_started_at.get_or_insert_with(Instant::now);
        debug!(
            "Device requested {} bytes at offset {}, sending {} from {}",
            length, offset, session.pending_send_len, session.cursor
        );

        if session.pending_send_len == 0 {
            debug!("Nothing left to send, answering with an empty data packet");
        }

        self.phase = Phase::Upgrading(ResumePoint::DataTransfer);
        self.send_next_data_packet();
    }

    fn send_next_data_packet(&mut self) {
        let chunk_size = self.chunk_size;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let len = session.pending_send_len.min(chunk_size);
        let start = session.cursor;
        let end = start + len;
        let is_last = end >= session.image.len();

        let mut data = Vec::with_capacity(len + 1);
        data.push(if is_last {
            DATA_LAST_PACKET
        } else {
            DATA_MORE_PACKETS
        });
        data.extend_from_slice(&session.image.bytes()[start..end]);

        session.cursor = end;
        session.pending_send_len -= len;
        if is_last {
            session.pending_send_len = 0;
            session.after_ack = PendingAfterAck::FinishDataPhase;
        }

        let elapsed = session
            .transfer_started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();
        let progress = UploadProgress::compute(end, session.image.len(), elapsed);

        self.send_upgrade(OpCode::Data, data);
        self.listener.on_progress(progress);
    }

    fn on_validation_done_cfm(&mut self, data: &[u8]) {
        if data.len() < 2 {
            debug!("Malformed validation confirmation, polling again now");
            return self.send_upgrade(OpCode::IsValidationDoneReq, Vec::new());
        }

        let wait = Duration::from_millis(u64::from(u16::from_be_bytes([data[0], data[1]])));
        debug!("Validation in progress, polling again in {:?}", wait);
        self.schedule(wait, TimerAction::PollValidation);
    }

    fn on_complete_ind(&mut self) {
        info!("Upgrade complete");
        self.end_session();
        self.phase = Phase::Idle;
        self.listener.on_finished();
        self.listener.disconnect();
    }

    fn on_abort_cfm(&mut self) {
        if self.phase == Phase::Idle {
            debug!("Abort confirmation with nothing to abort");
            return;
        }

        info!("Device confirmed abort");
        self.end_session();
        self.phase = Phase::Idle;

        match self.restart_after_abort.take() {
            Some(image) => {
                info!("Restarting upgrade");
                // Failures are reported to the listener by start.
                let _ = self.start(image);
            }
            None => self.listener.disconnect(),
        }
    }

    fn on_error_warn_ind(&mut self, data: &[u8]) {
        // The device waits for its indication to be echoed back.
        self.send_upgrade(OpCode::ErrorWarnRes, data.to_vec());

        if !self.is_upgrading() {
            debug!("Error/warning indication with no active session");
            return;
        }

        if data.len() < 2 {
            warn!("Error/warning indication too short: {} bytes", data.len());
            return self.fail(UpgradeError::WrongDataParameter);
        }

        let code = ReturnCode::from_u16(u16::from_be_bytes([data[0], data[1]]));
        match code.severity() {
            Severity::None => debug!("Device reported success"),
            Severity::Warning => {
                warn!("Device warning: {}", code.description());
                let kind = if code == ReturnCode::ErrorBatteryLow {
                    ConfirmationKind::BatteryLow
                } else {
                    ConfirmationKind::FileDiffersWarning
                };
                self.listener.ask_confirmation(kind);
            }
            Severity::Fatal => {
                error!(
                    "Device error 0x{:02X}: {}",
                    code.value(),
                    code.description()
                );
                self.fail(UpgradeError::ReceivedErrorFromBoard { code });
            }
        }
    }

    fn on_control_refused(&mut self, status: Option<GaiaStatus>) {
        if !self.is_upgrading() {
            debug!("Upgrade control refused with no active session: {:?}", status);
            return;
        }

        match status {
            Some(status) => {
                warn!("Upgrade control refused: {}", status.description());
                self.fail(ExceptionKind::UnsuccessfulAcknowledgement(status).into());
            }
            None => self.fail(UpgradeError::WrongDataParameter),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Send the sync request for the session file and wait for the answer.
    fn synchronize(&mut self) {
        let id = self.new_session_id();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.reset(id);
        let sync_id = session.image.sync_id().to_vec();

        self.phase = Phase::Syncing;
        self.send_upgrade(OpCode::SyncReq, sync_id);
    }

    fn answer_then_maybe_abort(&mut self, opcode: OpCode, accepted: bool) {
        self.send_upgrade(opcode, vec![action_byte(accepted)]);
        if !accepted {
            if let Some(session) = self.session.as_mut() {
                session.after_ack = PendingAfterAck::Abort;
            }
        }
    }

    fn set_resume_point(&mut self, point: ResumePoint) {
        if let Some(session) = self.session.as_mut() {
            session.resume_point = point;
        }
        self.phase = Phase::Upgrading(point);
        self.listener.on_resume_point_changed(point);
    }

    /// Report an error and abort the session.
    fn fail(&mut self, error: UpgradeError) {
        error!("Upgrade failed [{}]: {}", error.error_code(), error);
        self.listener.on_error(error);
        self.abort();
    }

    /// Report a fault raised before a session exists.
    fn reject(&mut self, error: UpgradeError) -> UpgradeError {
        warn!("Cannot start upgrade [{}]: {}", error.error_code(), error);
        self.listener.on_error(error.clone());
        error
    }

    fn send_upgrade(&mut self, opcode: OpCode, data: Vec<u8>) {
        let packet = UpgradePacket::new(opcode, data);
        match packet
            .to_bytes()
            .and_then(|bytes| self.framer.upgrade_control(&bytes))
        {
            Ok(bytes) => {
                debug!("Sending {:?} ({} bytes)", opcode, packet.data.len());
                self.listener.send_bytes(bytes);
            }
            Err(e) => error!("Failed to frame {:?}: {}", opcode, e),
        }
    }

    fn schedule(&mut self, delay: Duration, action: TimerAction) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let token = TimerToken {
            session: session.id,
            action,
        };
        let handle = self.scheduler.schedule(delay, token);
        self.pending_timers.push((handle, token));
    }

    fn cancel_timers(&mut self) {
        for (handle, _) in self.pending_timers.drain(..) {
            self.scheduler.cancel(handle);
        }
    }

    fn end_session(&mut self) {
        self.cancel_timers();
        self.session = None;
    }

    fn new_session_id(&mut self) -> u64 {
        self.next_session_id += 1;
        self.next_session_id
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

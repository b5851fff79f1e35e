//! End-to-end runs of the state machine against scripted device frames.

use std::time::Duration;

use super::codes::{ConfirmationKind, OpCode, ResumePoint, ReturnCode};
use super::manager::{Phase, UpgradeManager};
use super::packet::UpgradePacket;
use super::scheduler::ManualScheduler;
use crate::config::UpgradeConfig;
use crate::error::{ExceptionKind, UpgradeError};
use crate::gaia::commands::{ACKNOWLEDGMENT_MASK, COMMAND_EVENT_NOTIFICATION};
use crate::gaia::{GaiaPacket, GaiaStatus, TransportKind};
use crate::test_helpers::{DeviceFrames, RecordingListener, TestContext};
use crate::traits::TimerAction;

/// Tail of md5("AB").
const AB_SYNC_ID: [u8; 4] = [0x34, 0xE3, 0xA0, 0xA9];

struct Harness {
    manager: UpgradeManager<RecordingListener, ManualScheduler>,
    device: DeviceFrames,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(UpgradeConfig::default())
    }

    fn with_config(config: UpgradeConfig) -> Self {
        let device = match config.transport {
            TransportKind::Ble => DeviceFrames::new(),
            TransportKind::Serial => DeviceFrames::new().serial(config.serial_checksum),
        };
        Self {
            manager: UpgradeManager::new(
                RecordingListener::new(config.transport),
                ManualScheduler::new(),
                &config,
            ),
            device,
        }
    }

    fn receive(&mut self, frame: Vec<u8>) {
        self.manager.receive_inbound(&frame);
    }

    fn link_ack(&mut self) {
        let frame = self.device.control_ack(GaiaStatus::Success);
        self.receive(frame);
    }

    fn advance(&mut self, by: Duration) {
        let fired = self.manager.scheduler_mut().advance(by);
        for token in fired {
            self.manager.on_timer(token);
        }
    }

    fn listener(&self) -> &RecordingListener {
        self.manager.listener()
    }

    fn sent(&self) -> Vec<UpgradePacket> {
        self.listener().upgrade_packets()
    }

    fn opcodes(&self) -> Vec<OpCode> {
        self.listener().opcodes()
    }

    fn clear(&mut self) {
        self.manager.listener_mut().clear_sent();
    }

    /// Start with `file` and walk through sync and start up to data transfer.
    fn into_data_transfer(mut self, file: &[u8]) -> Self {
        self.manager.start(file.to_vec()).unwrap();
        let frame = self.device.sync_cfm(ResumePoint::DataTransfer);
        self.receive(frame);
        let frame = self.device.start_cfm(0x00, 90);
        self.receive(frame);
        self.clear();
        self
    }

    /// Start and resume at `point` after synchronisation.
    fn resumed_at(mut self, point: ResumePoint) -> Self {
        self.manager.start(b"AB".to_vec()).unwrap();
        let frame = self.device.sync_cfm(point);
        self.receive(frame);
        let frame = self.device.start_cfm(0x00, 90);
        self.receive(frame);
        self.clear();
        self
    }
}

fn data(last: bool, bytes: &[u8]) -> UpgradePacket {
    let mut data = vec![u8::from(last)];
    data.extend_from_slice(bytes);
    UpgradePacket::new(OpCode::Data, data)
}

fn counting(size: usize) -> Vec<u8> {
    (0..size).map(|i| i as u8).collect()
}

// ============================================================================
// Sync and start
// ============================================================================

#[test]
fn test_start_sync_start_data() {
    let mut h = Harness::new();

    h.manager.start(b"AB".to_vec()).unwrap();
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::SyncReq, AB_SYNC_ID.to_vec())]
    );
    assert_eq!(h.manager.phase(), Phase::Syncing);
    assert!(h.manager.is_upgrading());
    h.clear();

    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    assert_eq!(h.opcodes(), vec![OpCode::StartReq]);
    assert_eq!(h.manager.phase(), Phase::Starting);
    h.clear();

    let frame = h.device.start_cfm(0x00, 90);
    h.receive(frame);
    assert_eq!(h.opcodes(), vec![OpCode::StartDataReq]);
    assert_eq!(
        h.manager.phase(),
        Phase::Upgrading(ResumePoint::DataTransfer)
    );
    assert_eq!(h.listener().resume_points, vec![ResumePoint::DataTransfer]);
    assert!(h.listener().errors.is_empty());
}

#[test]
fn test_start_from_file_on_disk() {
    let ctx = TestContext::new();
    let path = ctx.create_file_bytes("app.bin", b"AB");
    let mut h = Harness::new();

    h.manager.start(path).unwrap();
    assert_eq!(h.sent()[0].data, AB_SYNC_ID.to_vec());
}

#[test]
fn test_start_missing_file_reports_error() {
    let ctx = TestContext::new();
    let mut h = Harness::new();

    let result = h.manager.start(ctx.path("missing.bin"));

    assert!(matches!(
        result,
        Err(UpgradeError::Exception {
            kind: ExceptionKind::FileReadFailed { .. }
        })
    ));
    assert_eq!(h.listener().errors.len(), 1);
    assert!(!h.manager.is_upgrading());
}

#[test]
fn test_sync_cfm_without_resume_point_defaults_to_data_transfer() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();

    let frame = h.device.upgrade(OpCode::SyncCfm, &[]);
    h.receive(frame);
    assert_eq!(h.manager.resume_point(), Some(ResumePoint::DataTransfer));

    let frame = h.device.start_cfm(0x00, 90);
    h.receive(frame);
    assert_eq!(h.listener().opcodes().last(), Some(&OpCode::StartDataReq));
}

#[test]
fn test_start_retry_bound() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    h.clear();

    for attempt in 1..=5 {
        let frame = h.device.start_cfm(0x09, 50);
        h.receive(frame);
        assert_eq!(h.manager.scheduler().pending().len(), 1);
        assert_eq!(
            h.manager.scheduler().pending()[0].action,
            TimerAction::RetryStart
        );

        // Nothing goes out before the delay elapses.
        h.advance(Duration::from_millis(1999));
        assert_eq!(h.sent().len(), attempt - 1);

        h.advance(Duration::from_millis(1));
        assert_eq!(h.sent().len(), attempt);
        assert_eq!(h.opcodes().last(), Some(&OpCode::StartReq));
    }
    assert!(h.listener().errors.is_empty());

    let frame = h.device.start_cfm(0x09, 50);
    h.receive(frame);

    assert_eq!(h.listener().errors, vec![UpgradeError::BoardNotReady]);
    assert_eq!(h.opcodes().last(), Some(&OpCode::AbortReq));
    let start_requests = h
        .opcodes()
        .into_iter()
        .filter(|op| *op == OpCode::StartReq)
        .count();
    assert_eq!(start_requests, 5);
    assert!(h.manager.scheduler().pending().is_empty());
    assert_eq!(h.manager.phase(), Phase::Aborting);
}

#[test]
fn test_start_cfm_success_resets_retry_counter() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);

    for _ in 0..4 {
        let frame = h.device.start_cfm(0x09, 50);
        h.receive(frame);
        h.advance(Duration::from_secs(2));
    }

    // A resync after success starts counting from zero again.
    let frame = h.device.start_cfm(0x00, 50);
    h.receive(frame);
    h.manager.resume();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    for _ in 0..5 {
        let frame = h.device.start_cfm(0x09, 50);
        h.receive(frame);
        h.advance(Duration::from_secs(2));
    }

    assert!(h.listener().errors.is_empty());
}

#[test]
fn test_start_cfm_malformed() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    h.clear();

    let frame = h.device.upgrade(OpCode::StartCfm, &[0x00, 0x50]);
    h.receive(frame);

    assert_eq!(h.listener().errors, vec![UpgradeError::WrongDataParameter]);
    assert_eq!(h.opcodes(), vec![OpCode::AbortReq]);
}

#[test]
fn test_start_cfm_unexpected_status() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);

    let frame = h.device.start_cfm(0x03, 90);
    h.receive(frame);

    assert_eq!(h.listener().errors, vec![UpgradeError::WrongDataParameter]);
    assert_eq!(h.manager.phase(), Phase::Aborting);
}

// ============================================================================
// Data transfer
// ============================================================================

#[test]
fn test_two_byte_file_single_last_packet() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.data_bytes_req(2, 0);
    h.receive(frame);
    assert_eq!(h.sent(), vec![data(true, b"AB")]);
    h.clear();

    h.link_ack();
    assert_eq!(h.opcodes(), vec![OpCode::IsValidationDoneReq]);
    assert_eq!(h.manager.phase(), Phase::Upgrading(ResumePoint::Validation));
    assert_eq!(
        h.listener().resume_points,
        vec![ResumePoint::DataTransfer, ResumePoint::Validation]
    );
}

#[test]
fn test_request_drained_one_chunk_per_ack() {
    let file = counting(30);
    let mut h = Harness::new().into_data_transfer(&file);

    let frame = h.device.data_bytes_req(30, 0);
    h.receive(frame);
    assert_eq!(h.sent(), vec![data(false, &file[..12])]);

    h.link_ack();
    h.link_ack();
    assert_eq!(
        h.sent(),
        vec![
            data(false, &file[..12]),
            data(false, &file[12..24]),
            data(true, &file[24..]),
        ]
    );

    let percentages: Vec<f64> = h
        .listener()
        .progress
        .iter()
        .map(|progress| progress.percentage)
        .collect();
    assert_eq!(percentages, vec![40.0, 80.0, 100.0]);

    h.link_ack();
    assert_eq!(h.opcodes().last(), Some(&OpCode::IsValidationDoneReq));
}

#[test]
fn test_request_longer_than_file_is_clamped() {
    let mut h = Harness::new().into_data_transfer(&counting(5));

    let frame = h.device.data_bytes_req(100, 0);
    h.receive(frame);

    assert_eq!(h.sent(), vec![data(true, &counting(5))]);
    assert_eq!(h.manager.progress().map(|p| p.percentage), Some(100.0));
}

#[test]
fn test_request_offsets() {
    let file = counting(30);
    let mut h = Harness::new().into_data_transfer(&file);

    let frame = h.device.data_bytes_req(4, 0);
    h.receive(frame);
    // The request is drained, the ack sends nothing more.
    h.link_ack();
    assert_eq!(h.sent(), vec![data(false, &file[0..4])]);
    h.clear();

    // Offset beyond the end of the file leaves the cursor alone.
    let frame = h.device.data_bytes_req(4, 100);
    h.receive(frame);
    assert_eq!(h.sent(), vec![data(false, &file[4..8])]);
    h.clear();

    // Offsets skip ahead from the cursor.
    let frame = h.device.data_bytes_req(4, 10);
    h.receive(frame);
    assert_eq!(h.sent(), vec![data(false, &file[18..22])]);
}

#[test]
fn test_request_after_end_of_file_sends_empty_last_packet() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.data_bytes_req(2, 0);
    h.receive(frame);
    let frame = h.device.data_bytes_req(2, 0);
    h.receive(frame);
    assert_eq!(h.listener().last_upgrade_packet(), Some(data(true, b"")));
    h.clear();

    h.link_ack();
    assert_eq!(h.opcodes(), vec![OpCode::IsValidationDoneReq]);
    assert_eq!(h.manager.phase(), Phase::Upgrading(ResumePoint::Validation));
}

#[test]
fn test_data_bytes_req_malformed() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.upgrade(OpCode::DataBytesReq, &[0x00, 0x00, 0x00, 0x02]);
    h.receive(frame);

    assert_eq!(h.listener().errors, vec![UpgradeError::WrongDataParameter]);
    assert_eq!(h.opcodes(), vec![OpCode::AbortReq]);
}

#[test]
fn test_serial_link_uses_larger_chunks() {
    let config = UpgradeConfig {
        transport: TransportKind::Serial,
        serial_checksum: true,
        ..UpgradeConfig::default()
    };
    let file = counting(300);
    let mut h = Harness::with_config(config).into_data_transfer(&file);

    let frame = h.device.data_bytes_req(300, 0);
    h.receive(frame);
    h.link_ack();

    assert_eq!(
        h.sent(),
        vec![data(false, &file[..250]), data(true, &file[250..])]
    );
}

// ============================================================================
// Validation and completion
// ============================================================================

#[test]
fn test_validation_polling() {
    let mut h = Harness::new().into_data_transfer(b"AB");
    let frame = h.device.data_bytes_req(2, 0);
    h.receive(frame);
    h.link_ack();
    h.clear();

    let frame = h.device.validation_done_cfm(500);
    h.receive(frame);
    h.advance(Duration::from_millis(499));
    assert!(h.sent().is_empty());

    h.advance(Duration::from_millis(1));
    assert_eq!(h.opcodes(), vec![OpCode::IsValidationDoneReq]);
}

#[test]
fn test_malformed_validation_cfm_polls_immediately() {
    let mut h = Harness::new().resumed_at(ResumePoint::Validation);
    assert_eq!(h.manager.phase(), Phase::Upgrading(ResumePoint::Validation));

    let frame = h.device.upgrade(OpCode::IsValidationDoneCfm, &[0x01]);
    h.receive(frame);

    assert_eq!(h.opcodes(), vec![OpCode::IsValidationDoneReq]);
    assert!(h.manager.scheduler().pending().is_empty());
    assert!(h.listener().errors.is_empty());
}

#[test]
fn test_full_upgrade() {
    let mut h = Harness::new().into_data_transfer(b"AB");
    let frame = h.device.data_bytes_req(2, 0);
    h.receive(frame);
    h.link_ack();

    let frame = h.device.validation_done_cfm(0);
    h.receive(frame);
    h.advance(Duration::ZERO);

    let frame = h.device.upgrade(OpCode::TransferCompleteInd, &[]);
    h.receive(frame);
    assert_eq!(
        h.listener().confirmations,
        vec![ConfirmationKind::TransferComplete]
    );
    h.clear();
    h.manager.confirm(ConfirmationKind::TransferComplete, true);
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::TransferCompleteRes, vec![0x00])]
    );

    // The device reboots; the host reconnects and resumes.
    h.clear();
    assert!(h.manager.resume());
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::SyncReq, AB_SYNC_ID.to_vec())]
    );
    let frame = h.device.sync_cfm(ResumePoint::InProgress);
    h.receive(frame);
    let frame = h.device.start_cfm(0x00, 80);
    h.receive(frame);
    assert_eq!(
        h.listener().confirmations.last(),
        Some(&ConfirmationKind::InProgress)
    );
    h.clear();
    h.manager.confirm(ConfirmationKind::InProgress, true);
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::InProgressRes, vec![0x00])]
    );

    let frame = h.device.upgrade(OpCode::CommitReq, &[]);
    h.receive(frame);
    assert_eq!(h.manager.phase(), Phase::Upgrading(ResumePoint::Commit));
    h.clear();
    h.manager.confirm(ConfirmationKind::Commit, true);
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::CommitCfm, vec![0x00])]
    );

    let frame = h.device.upgrade(OpCode::CompleteInd, &[]);
    h.receive(frame);
    assert_eq!(h.listener().finished, 1);
    assert_eq!(h.listener().disconnects, 1);
    assert_eq!(h.manager.phase(), Phase::Idle);
    assert!(!h.manager.is_upgrading());
    assert!(h.listener().errors.is_empty());
}

#[test]
fn test_resume_point_dispatch() {
    let h = Harness::new().resumed_at(ResumePoint::Commit);
    assert_eq!(h.listener().confirmations, vec![ConfirmationKind::Commit]);

    let h = Harness::new().resumed_at(ResumePoint::TransferComplete);
    assert_eq!(
        h.listener().confirmations,
        vec![ConfirmationKind::TransferComplete]
    );
    assert!(h.sent().is_empty());
}

// ============================================================================
// Confirmations and abort
// ============================================================================

#[test]
fn test_declined_transfer_complete_aborts_after_ack() {
    let mut h = Harness::new().resumed_at(ResumePoint::TransferComplete);

    h.manager.confirm(ConfirmationKind::TransferComplete, false);
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::TransferCompleteRes, vec![0x01])]
    );
    assert!(h.manager.is_upgrading());

    h.link_ack();
    assert_eq!(h.opcodes().last(), Some(&OpCode::AbortReq));
    assert_eq!(h.manager.phase(), Phase::Aborting);
}

#[test]
fn test_declined_commit_aborts_after_ack() {
    let mut h = Harness::new().resumed_at(ResumePoint::Commit);

    h.manager.confirm(ConfirmationKind::Commit, false);
    h.link_ack();

    assert_eq!(h.opcodes(), vec![OpCode::CommitCfm, OpCode::AbortReq]);
}

#[test]
fn test_declined_in_progress_aborts_immediately() {
    let mut h = Harness::new().resumed_at(ResumePoint::InProgress);

    h.manager.confirm(ConfirmationKind::InProgress, false);

    assert_eq!(
        h.sent(),
        vec![
            UpgradePacket::new(OpCode::InProgressRes, vec![0x01]),
            UpgradePacket::new(OpCode::AbortReq, Vec::new()),
        ]
    );
}

#[test]
fn test_abort_is_idempotent() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    h.manager.abort();
    h.manager.abort();

    assert_eq!(h.opcodes(), vec![OpCode::AbortReq]);
    assert!(!h.manager.is_upgrading());

    let frame = h.device.upgrade(OpCode::AbortCfm, &[]);
    h.receive(frame);
    assert_eq!(h.listener().disconnects, 1);
    assert_eq!(h.manager.phase(), Phase::Idle);

    // A second confirmation has nothing to unblock.
    let frame = h.device.upgrade(OpCode::AbortCfm, &[]);
    h.receive(frame);
    assert_eq!(h.listener().disconnects, 1);
}

#[test]
fn test_malformed_abort_cfm_is_honoured() {
    let mut h = Harness::new().into_data_transfer(b"AB");
    h.manager.abort();

    let frame = h.device.raw_upgrade(&[0x08, 0x00]);
    h.receive(frame);

    assert_eq!(h.listener().disconnects, 1);
    assert_eq!(h.manager.phase(), Phase::Idle);
}

#[test]
fn test_start_rejected_while_abort_pending() {
    let mut h = Harness::new().into_data_transfer(b"AB");
    h.manager.abort();

    assert_eq!(
        h.manager.start(b"AB".to_vec()),
        Err(UpgradeError::AlreadyUpgrading)
    );

    let frame = h.device.upgrade(OpCode::AbortCfm, &[]);
    h.receive(frame);
    assert!(h.manager.start(b"AB".to_vec()).is_ok());
}

#[test]
fn test_stale_timer_is_ignored() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    let frame = h.device.start_cfm(0x09, 50);
    h.receive(frame);
    let stale = h.manager.scheduler().pending()[0];

    h.manager.abort();
    assert!(h.manager.scheduler().pending().is_empty());
    let frame = h.device.upgrade(OpCode::AbortCfm, &[]);
    h.receive(frame);

    // A new session waiting for its start confirmation.
    h.manager.start(b"AB".to_vec()).unwrap();
    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    assert_eq!(h.manager.phase(), Phase::Starting);
    h.clear();

    h.manager.on_timer(stale);
    assert!(h.sent().is_empty());
}

// ============================================================================
// Errors and warnings
// ============================================================================

#[test]
fn test_file_differs_warning_restarts() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.error_warn_ind(ReturnCode::WarnSyncIdIsDifferent);
    h.receive(frame);
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::ErrorWarnRes, vec![0x00, 0x81])]
    );
    assert_eq!(
        h.listener().confirmations,
        vec![ConfirmationKind::FileDiffersWarning]
    );
    h.clear();

    h.manager.confirm(ConfirmationKind::FileDiffersWarning, true);
    assert_eq!(h.opcodes(), vec![OpCode::AbortReq]);
    h.clear();

    let frame = h.device.upgrade(OpCode::AbortCfm, &[]);
    h.receive(frame);
    assert_eq!(
        h.sent(),
        vec![UpgradePacket::new(OpCode::SyncReq, AB_SYNC_ID.to_vec())]
    );
    assert_eq!(h.manager.phase(), Phase::Syncing);
    assert_eq!(h.listener().disconnects, 0);
}

#[test]
fn test_file_differs_warning_declined() {
    let mut h = Harness::new().into_data_transfer(b"AB");
    let frame = h.device.error_warn_ind(ReturnCode::WarnSyncIdIsDifferent);
    h.receive(frame);

    h.manager.confirm(ConfirmationKind::FileDiffersWarning, false);
    let frame = h.device.upgrade(OpCode::AbortCfm, &[]);
    h.receive(frame);

    assert_eq!(h.listener().disconnects, 1);
    assert_eq!(h.manager.phase(), Phase::Idle);
    assert_eq!(h.opcodes().last(), Some(&OpCode::AbortReq));
}

#[test]
fn test_battery_low_warning() {
    let mut h = Harness::new().into_data_transfer(b"AB");
    let frame = h.device.error_warn_ind(ReturnCode::ErrorBatteryLow);
    h.receive(frame);
    assert_eq!(h.listener().confirmations, vec![ConfirmationKind::BatteryLow]);
    assert!(h.listener().errors.is_empty());
    h.clear();

    h.manager.confirm(ConfirmationKind::BatteryLow, true);
    assert_eq!(h.opcodes(), vec![OpCode::SyncReq]);
    assert_eq!(h.manager.phase(), Phase::Syncing);
    h.clear();

    let frame = h.device.error_warn_ind(ReturnCode::ErrorBatteryLow);
    h.receive(frame);
    h.manager.confirm(ConfirmationKind::BatteryLow, false);
    assert_eq!(h.opcodes(), vec![OpCode::ErrorWarnRes, OpCode::AbortReq]);
}

#[test]
fn test_fatal_error_from_board() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.error_warn_ind(ReturnCode::ErrorLoaderError);
    h.receive(frame);

    assert_eq!(h.opcodes(), vec![OpCode::ErrorWarnRes, OpCode::AbortReq]);
    assert_eq!(
        h.listener().errors,
        vec![UpgradeError::ReceivedErrorFromBoard {
            code: ReturnCode::ErrorLoaderError
        }]
    );
    assert!(h.listener().confirmations.is_empty());
}

#[test]
fn test_short_error_warn_ind() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.upgrade(OpCode::ErrorWarnInd, &[0x21]);
    h.receive(frame);

    assert_eq!(h.listener().errors, vec![UpgradeError::WrongDataParameter]);
    assert_eq!(h.opcodes(), vec![OpCode::ErrorWarnRes, OpCode::AbortReq]);
}

#[test]
fn test_unexpected_opcode_is_fatal() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.upgrade(OpCode::ProgressCfm, &[]);
    h.receive(frame);

    assert_eq!(
        h.listener().errors,
        vec![UpgradeError::from(ExceptionKind::UnexpectedOpCode(
            OpCode::ProgressCfm
        ))]
    );
    assert_eq!(h.opcodes(), vec![OpCode::AbortReq]);
}

#[test]
fn test_refused_control_packet_aborts() {
    let mut h = Harness::new().into_data_transfer(b"AB");

    let frame = h.device.control_ack(GaiaStatus::IncorrectState);
    h.receive(frame);

    assert_eq!(
        h.listener().errors,
        vec![UpgradeError::from(ExceptionKind::UnsuccessfulAcknowledgement(
            GaiaStatus::IncorrectState
        ))]
    );
    assert_eq!(h.opcodes(), vec![OpCode::AbortReq]);
}

// ============================================================================
// Inbound handling without a session
// ============================================================================

#[test]
fn test_packets_ignored_when_idle() {
    let mut h = Harness::new();

    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);
    let frame = h.device.raw_upgrade(&[0x02]);
    h.receive(frame);
    h.receive(vec![0x00, 0x0A]);

    assert!(h.sent().is_empty());
    assert!(h.listener().errors.is_empty());
    assert_eq!(h.manager.phase(), Phase::Idle);
}

#[test]
fn test_notifications_acknowledged() {
    let mut h = Harness::new();
    h.manager.start(b"AB".to_vec()).unwrap();
    h.clear();

    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);

    let ack = GaiaPacket::from_bytes(TransportKind::Ble, &h.listener().sent[0]).unwrap();
    assert_eq!(
        ack.command_id(),
        COMMAND_EVENT_NOTIFICATION | ACKNOWLEDGMENT_MASK
    );
    assert_eq!(ack.status(), Some(GaiaStatus::Success));
    assert_eq!(h.listener().sent.len(), 2);
}

#[test]
fn test_notification_acks_disabled() {
    let config = UpgradeConfig {
        acknowledge_notifications: false,
        ..UpgradeConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.manager.start(b"AB".to_vec()).unwrap();
    h.clear();

    let frame = h.device.sync_cfm(ResumePoint::DataTransfer);
    h.receive(frame);

    assert_eq!(h.listener().sent.len(), 1);
    assert_eq!(h.opcodes(), vec![OpCode::StartReq]);
}

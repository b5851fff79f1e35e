use crate::error::UpgradeError;
use crate::gaia::commands::{
    ACKNOWLEDGMENT_MASK, COMMAND_EVENT_NOTIFICATION, COMMAND_VM_UPGRADE_CONTROL, EVENT_VMU_PACKET,
    VENDOR_QUALCOMM,
};
use crate::gaia::{GaiaFramer, GaiaPacket, GaiaStatus, TransportKind};
use crate::traits::UpgradeListener;
use crate::upgrade::codes::{ConfirmationKind, OpCode, ResumePoint, ReturnCode};
use crate::upgrade::packet::UpgradePacket;
use crate::upgrade::progress::UploadProgress;

/// Builder for the frames a device sends to the host
pub struct DeviceFrames {
    framer: GaiaFramer,
}

impl DeviceFrames {
    pub fn new() -> Self {
        Self {
            framer: GaiaFramer::new(TransportKind::Ble, VENDOR_QUALCOMM, false),
        }
    }

    pub fn serial(mut self, checksum: bool) -> Self {
        self.framer = GaiaFramer::new(TransportKind::Serial, VENDOR_QUALCOMM, checksum);
        self
    }

    /// Upgrade packet wrapped in a `VMU_PACKET` event notification
    pub fn upgrade(&self, opcode: OpCode, data: &[u8]) -> Vec<u8> {
        let mut payload = vec![EVENT_VMU_PACKET];
        payload.extend_from_slice(
            &UpgradePacket::new(opcode, data.to_vec())
                .to_bytes()
                .expect("Failed to encode upgrade packet"),
        );
        self.notification(payload)
    }

    /// Event notification carrying raw bytes after the event id
    pub fn raw_upgrade(&self, bytes: &[u8]) -> Vec<u8> {
        let mut payload = vec![EVENT_VMU_PACKET];
        payload.extend_from_slice(bytes);
        self.notification(payload)
    }

    pub fn sync_cfm(&self, point: ResumePoint) -> Vec<u8> {
        self.upgrade(OpCode::SyncCfm, &[point as u8, 0x00, 0x00, 0x00, 0x00])
    }

    pub fn start_cfm(&self, status: u8, battery_level: u16) -> Vec<u8> {
        let [high, low] = battery_level.to_be_bytes();
        self.upgrade(OpCode::StartCfm, &[status, high, low])
    }

    pub fn data_bytes_req(&self, length: u32, offset: u32) -> Vec<u8> {
        let mut data = length.to_be_bytes().to_vec();
        data.extend_from_slice(&offset.to_be_bytes());
        self.upgrade(OpCode::DataBytesReq, &data)
    }

    pub fn validation_done_cfm(&self, wait_ms: u16) -> Vec<u8> {
        self.upgrade(OpCode::IsValidationDoneCfm, &wait_ms.to_be_bytes())
    }

    pub fn error_warn_ind(&self, code: ReturnCode) -> Vec<u8> {
        self.upgrade(OpCode::ErrorWarnInd, &code.value().to_be_bytes())
    }

    /// Acknowledgement of a `VM_UPGRADE_CONTROL` command
    pub fn control_ack(&self, status: GaiaStatus) -> Vec<u8> {
        self.framer
            .packet(COMMAND_VM_UPGRADE_CONTROL | ACKNOWLEDGMENT_MASK, vec![status.value()])
            .expect("Failed to build control ack")
            .to_bytes()
            .to_vec()
    }

    fn notification(&self, payload: Vec<u8>) -> Vec<u8> {
        self.framer
            .packet(COMMAND_EVENT_NOTIFICATION, payload)
            .expect("Failed to build notification")
            .to_bytes()
            .to_vec()
    }
}

impl Default for DeviceFrames {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that records every call for later assertions
#[derive(Debug, Default)]
pub struct RecordingListener {
    kind: TransportKind,
    pub sent: Vec<Vec<u8>>,
    pub errors: Vec<UpgradeError>,
    pub resume_points: Vec<ResumePoint>,
    pub progress: Vec<UploadProgress>,
    pub confirmations: Vec<ConfirmationKind>,
    pub finished: usize,
    pub disconnects: usize,
}

impl RecordingListener {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Upgrade packets sent inside `VM_UPGRADE_CONTROL` commands, in order
    pub fn upgrade_packets(&self) -> Vec<UpgradePacket> {
        self.sent
            .iter()
            .map(|bytes| GaiaPacket::from_bytes(self.kind, bytes).expect("Host sent a bad frame"))
            .filter(|packet| packet.command_id() == COMMAND_VM_UPGRADE_CONTROL)
            .map(|packet| {
                UpgradePacket::from_bytes(packet.payload()).expect("Host sent a bad upgrade packet")
            })
            .collect()
    }

    /// Opcodes of the upgrade packets sent so far
    pub fn opcodes(&self) -> Vec<OpCode> {
        self.upgrade_packets()
            .into_iter()
            .map(|packet| packet.opcode)
            .collect()
    }

    pub fn last_upgrade_packet(&self) -> Option<UpgradePacket> {
        self.upgrade_packets().pop()
    }

    /// Forget everything sent so far
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl UpgradeListener for RecordingListener {
    fn send_bytes(&mut self, bytes: Vec<u8>) {
        self.sent.push(bytes);
    }

    fn on_error(&mut self, error: UpgradeError) {
        self.errors.push(error);
    }

    fn on_resume_point_changed(&mut self, point: ResumePoint) {
        self.resume_points.push(point);
    }

    fn on_finished(&mut self) {
        self.finished += 1;
    }

    fn on_progress(&mut self, progress: UploadProgress) {
        self.progress.push(progress);
    }

    fn ask_confirmation(&mut self, kind: ConfirmationKind) {
        self.confirmations.push(kind);
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

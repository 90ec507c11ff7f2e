//! The packet-level TS writer.

use crate::pes::build_pes_packet;
use crate::psi::{build_pat, build_pmt};
use crate::{Result, StreamType, TsMuxError, PID_PMT, SYNC_BYTE, TS_PACKET_SIZE};

const MAX_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - 4;

/// One elementary stream registered with the writer.
#[derive(Debug, Clone)]
pub struct TsStream {
    /// Elementary stream PID.
    pub pid: u16,
    /// PMT stream type.
    pub stream_type: StreamType,
    /// PES stream id (0xE0 video, 0xC0 audio).
    pub stream_id: u8,
    continuity_counter: u8,
}

impl TsStream {
    /// Register a stream on the given PID.
    pub fn new(pid: u16, stream_type: StreamType, stream_id: u8) -> Self {
        Self { pid, stream_type, stream_id, continuity_counter: 0 }
    }
}

/// Writes a single-program transport stream.
///
/// Continuity counters persist across segments; PSI packets are emitted at
/// the head of every segment via [`TsWriter::write_psi`].
#[derive(Debug)]
pub struct TsWriter {
    transport_stream_id: u16,
    program_number: u16,
    pcr_pid: u16,
    streams: Vec<TsStream>,
    pat_continuity: u8,
    pmt_continuity: u8,
}

impl TsWriter {
    /// Create a writer for the given streams. The PCR PID is the first
    /// stream's PID.
    pub fn new(streams: Vec<TsStream>) -> Result<Self> {
        let pcr_pid = streams.first().map(|s| s.pid).unwrap_or(0x1FFF);
        for stream in &streams {
            if stream.pid < 0x0020 || stream.pid > 0x1FFE {
                return Err(TsMuxError::InvalidPid(stream.pid));
            }
        }
        Ok(Self {
            transport_stream_id: 1,
            program_number: 1,
            pcr_pid,
            streams,
            pat_continuity: 0,
            pmt_continuity: 0,
        })
    }

    /// Append PAT and PMT packets.
    pub fn write_psi(&mut self, out: &mut Vec<u8>) {
        let pat = build_pat(
            self.transport_stream_id,
            self.program_number,
            PID_PMT,
            self.pat_continuity,
        );
        self.pat_continuity = (self.pat_continuity + 1) & 0x0F;
        out.extend_from_slice(&pat);

        let entries: Vec<(u16, StreamType)> =
            self.streams.iter().map(|s| (s.pid, s.stream_type)).collect();
        let pmt = build_pmt(
            self.program_number,
            PID_PMT,
            self.pcr_pid,
            &entries,
            self.pmt_continuity,
        );
        self.pmt_continuity = (self.pmt_continuity + 1) & 0x0F;
        out.extend_from_slice(&pmt);
    }

    /// Wrap one access unit in a PES packet and append its TS packets.
    ///
    /// `pts`/`dts` are 90 kHz values. `random_access` sets the
    /// random-access indicator on the first packet; the PCR PID also
    /// carries `PCR = dts * 300` there.
    pub fn write_sample(
        &mut self,
        out: &mut Vec<u8>,
        pid: u16,
        payload: &[u8],
        pts: u64,
        dts: u64,
        random_access: bool,
    ) -> Result<()> {
        if payload.is_empty() {
            return Err(TsMuxError::EmptyPayload);
        }
        let stream = self
            .streams
            .iter_mut()
            .find(|s| s.pid == pid)
            .ok_or(TsMuxError::UnknownPid(pid))?;

        let video = stream.stream_type.is_video();
        let pes = build_pes_packet(stream.stream_id, payload, pts, dts, video);
        let pcr = (pid == self.pcr_pid).then_some(dts.wrapping_mul(300));

        let mut offset = 0;
        let mut first = true;
        while offset < pes.len() {
            let remaining = pes.len() - offset;
            let cc = stream.continuity_counter;
            stream.continuity_counter = (stream.continuity_counter + 1) & 0x0F;

            let mut packet = [0xFFu8; TS_PACKET_SIZE];
            packet[0] = SYNC_BYTE;
            packet[1] = if first { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
            packet[2] = (pid & 0xFF) as u8;

            // Adaptation field body: flags byte + optional PCR on the first
            // packet, stuffing whenever the payload cannot fill the packet.
            let mut field = Vec::new();
            if first && (random_access || pcr.is_some()) {
                let mut flags = 0u8;
                if random_access {
                    flags |= 0x40;
                }
                if pcr.is_some() {
                    flags |= 0x10;
                }
                field.push(flags);
                if let Some(pcr) = pcr {
                    let pcr_base = (pcr / 300) & 0x1_FFFF_FFFF;
                    let pcr_ext = (pcr % 300) as u16;
                    field.push((pcr_base >> 25) as u8);
                    field.push((pcr_base >> 17) as u8);
                    field.push((pcr_base >> 9) as u8);
                    field.push((pcr_base >> 1) as u8);
                    field.push(((pcr_base as u8 & 0x01) << 7) | 0x7E | ((pcr_ext >> 8) as u8 & 0x01));
                    field.push((pcr_ext & 0xFF) as u8);
                }
            }

            let adaptation = !field.is_empty() || remaining < MAX_PAYLOAD_SIZE;
            let payload_len = if adaptation {
                let max_payload = MAX_PAYLOAD_SIZE - 1 - field.len();
                let payload_len = remaining.min(max_payload);
                let field_len = MAX_PAYLOAD_SIZE - 1 - payload_len;
                // Stuff with 0xFF up to the required field length. An empty
                // field of length zero is the one-byte stuffing case.
                if field.is_empty() && field_len > 0 {
                    field.push(0x00); // flags byte, nothing set
                }
                field.resize(field_len, 0xFF);

                packet[3] = 0x30 | (cc & 0x0F);
                packet[4] = field.len() as u8;
                packet[5..5 + field.len()].copy_from_slice(&field);
                let start = 5 + field.len();
                packet[start..start + payload_len]
                    .copy_from_slice(&pes[offset..offset + payload_len]);
                payload_len
            } else {
                packet[3] = 0x10 | (cc & 0x0F);
                packet[4..].copy_from_slice(&pes[offset..offset + MAX_PAYLOAD_SIZE]);
                MAX_PAYLOAD_SIZE
            };

            out.extend_from_slice(&packet);
            offset += payload_len;
            first = false;
        }

        Ok(())
    }
}

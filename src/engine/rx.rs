//! Receive path: frame validation, dispatch to the state machines and
//! egress timestamp correlation.

use crate::clock::ClockInterface;
use crate::net::{NetworkInterface, RxFrame, TxKind, TxTimestamp};
use crate::protocol::bmca::PriorityVector;
use crate::protocol::message::{
    AnnounceBody, Body, DOMAIN_NUMBER_MAX, Header, Message, MessageType, SDO_ID_CMLDS,
    SignalingTlv, flags,
};

use super::TimeAwareSystem;
use super::capable::CapableRcvEvent;
use super::md_sync::{FollowUpRx, SyncRcvEvent, SyncSendEvent};
use super::pdelay::{PdelayReqEvent, PdelayRespEvent};
use super::port::{
    AnnounceRx, LinkRef, PdelayReqRx, PdelayRespFupRx, PdelayRespRx, SyncRx, SyncSendState,
    TimeProperties,
};

/// Apply a signed delay compensation to a timestamp.
fn compensate(timestamp: u64, compensation_ns: i32) -> u64 {
    timestamp.saturating_add_signed(i64::from(compensation_ns))
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    /// Validate and dispatch one received frame.
    pub fn on_frame(&mut self, frame: &RxFrame) {
        let Some(net_port) = self.net_ports.get_mut(frame.port) else {
            tracing::warn!(port = frame.port, "frame on unknown port dropped");
            return;
        };
        let header = match Header::decode(&frame.data) {
            Ok(header) => header,
            Err(e) => {
                net_port.counters.rx_err_parse += 1;
                tracing::warn!(port = frame.port, "invalid frame: {}", e);
                return;
            }
        };

        let cmlds = header.major_sdo_id == SDO_ID_CMLDS;
        let cmlds_allowed = header.message_type.is_pdelay()
            || header.message_type == MessageType::Signaling;
        if header.major_sdo_id > SDO_ID_CMLDS
            || (cmlds && (!cmlds_allowed || net_port.cmlds_link.is_none()))
        {
            net_port.counters.rx_err_sdoid += 1;
            tracing::warn!(port = frame.port, sdo_id = header.major_sdo_id, "invalid SdoId");
            return;
        }
        if header.domain_number > DOMAIN_NUMBER_MAX
            || (header.message_type.is_pdelay() && header.domain_number != 0)
        {
            net_port.counters.rx_err_domain += 1;
            tracing::warn!(port = frame.port, domain = header.domain_number, "invalid domain");
            return;
        }

        net_port.counters.rx_frames += 1;
        let timestamp = compensate(frame.timestamp, net_port.rx_comp);

        let msg = match Message::decode(&frame.data) {
            Ok(msg) => msg,
            Err(e) => {
                self.net_ports[frame.port].counters.rx_err_parse += 1;
                tracing::warn!(port = frame.port, "invalid {}: {}", header.message_type, e);
                return;
            }
        };
        tracing::debug!(
            port = frame.port,
            domain = header.domain_number,
            seq = header.sequence_id,
            "rx {}",
            header.message_type
        );

        if header.message_type.is_pdelay() {
            self.rx_pdelay(frame.port, cmlds, &msg, timestamp);
            return;
        }
        if cmlds {
            if let Body::Signaling { tlv: SignalingTlv::IntervalRequest(tlv), .. } = msg.body {
                if let Some(l) = self.net_ports[frame.port].cmlds_link {
                    self.link_interval_sm(l, Some(tlv));
                }
            }
            return;
        }

        let Some(i) = self.instance_for_domain(header.domain_number) else {
            self.net_ports[frame.port].counters.rx_err_domain_unknown += 1;
            tracing::debug!(port = frame.port, domain = header.domain_number, "no such domain");
            return;
        };
        self.rx_instance(i, frame.port, msg, timestamp);
    }

    fn instance_for_domain(&self, domain: u8) -> Option<usize> {
        self.instances.iter().position(|instance| instance.domain == domain)
    }

    fn rx_pdelay(&mut self, net_port: usize, cmlds: bool, msg: &Message, timestamp: u64) {
        let link = if cmlds {
            self.net_ports[net_port].cmlds_link
        } else {
            self.net_ports[net_port].domain_link
        };
        let Some(l) = link else {
            self.net_ports[net_port].counters.rx_err_domain_unknown += 1;
            tracing::debug!(port = net_port, cmlds, "no peer delay on this port");
            return;
        };
        let header = &msg.header;
        match msg.body {
            Body::PdelayReq => {
                let link = &mut self.links[l];
                link.counters.rx_pdelay_req += 1;
                link.peer_clock_id = header.source_port_identity.clock_identity;
                link.rcvd_req = Some(PdelayReqRx {
                    sequence_id: header.sequence_id,
                    source: header.source_port_identity,
                    correction_field: header.correction_field,
                    timestamp,
                });
                self.pdelay_resp_sm(l, PdelayRespEvent::ReqReceived);
            }
            Body::PdelayResp {
                request_receipt_timestamp,
                requesting_port_identity,
            } => {
                let link = &mut self.links[l];
                link.counters.rx_pdelay_resp += 1;
                link.rcvd_resp = Some(PdelayRespRx {
                    sequence_id: header.sequence_id,
                    source: header.source_port_identity,
                    requesting: requesting_port_identity,
                    correction_field: header.correction_field,
                    request_receipt_timestamp,
                    timestamp,
                });
                self.pdelay_req_sm(l, PdelayReqEvent::RespReceived);
            }
            Body::PdelayRespFollowUp {
                response_origin_timestamp,
                requesting_port_identity,
            } => {
                let link = &mut self.links[l];
                link.counters.rx_pdelay_resp_follow_up += 1;
                link.rcvd_resp_fup = Some(PdelayRespFupRx {
                    sequence_id: header.sequence_id,
                    source: header.source_port_identity,
                    requesting: requesting_port_identity,
                    correction_field: header.correction_field,
                    response_origin_timestamp,
                });
                self.pdelay_req_sm(l, PdelayReqEvent::RespFollowUpReceived);
            }
            _ => {}
        }
    }

    fn rx_instance(&mut self, i: usize, p: usize, msg: Message, timestamp: u64) {
        let header = msg.header;
        match msg.body {
            Body::Sync { .. } => {
                self.instances[i].ports[p].counters.rx_sync += 1;
                let sync = SyncRx {
                    sequence_id: header.sequence_id,
                    source: header.source_port_identity,
                    log_message_interval: header.log_message_interval,
                    correction_field: header.correction_field,
                    timestamp,
                };
                self.md_sync_rcv_sm(i, p, SyncRcvEvent::Sync(sync));
            }
            Body::FollowUp {
                precise_origin_timestamp,
                tlv,
            } => {
                self.instances[i].ports[p].counters.rx_follow_up += 1;
                let fup = FollowUpRx {
                    sequence_id: header.sequence_id,
                    correction_field: header.correction_field,
                    log_message_interval: header.log_message_interval,
                    precise_origin_timestamp,
                    tlv,
                };
                self.md_sync_rcv_sm(i, p, SyncRcvEvent::FollowUp(fup));
            }
            Body::Announce(body) => self.rx_announce(i, p, &header, body),
            Body::Signaling { tlv, .. } => self.rx_signaling(i, p, tlv),
            Body::PdelayReq | Body::PdelayResp { .. } | Body::PdelayRespFollowUp { .. } => {}
        }
    }

    fn rx_announce(&mut self, i: usize, p: usize, header: &Header, body: AnnounceBody) {
        let gm_id_static = self.instances[i].gm_id_static;
        let domain = self.instances[i].domain;
        let port = &mut self.instances[i].ports[p];
        port.counters.rx_announce += 1;
        if gm_id_static || usize::from(header.message_length) > AnnounceBody::MAX_MESSAGE_SIZE {
            port.counters.rx_announce_dropped += 1;
            tracing::warn!(
                port = p,
                domain,
                length = header.message_length,
                "Announce dropped"
            );
            return;
        }
        let props = TimeProperties {
            leap61: header.flags & flags::LEAP_61 != 0,
            leap59: header.flags & flags::LEAP_59 != 0,
            current_utc_offset_valid: header.flags & flags::CURRENT_UTC_OFFSET_VALID != 0,
            time_traceable: header.flags & flags::TIME_TRACEABLE != 0,
            frequency_traceable: header.flags & flags::FREQUENCY_TRACEABLE != 0,
            current_utc_offset: body.current_utc_offset,
            time_source: body.time_source,
        };
        port.rcvd_announce = Some(AnnounceRx {
            vector: PriorityVector::from_announce(header, &body, port.port_number()),
            props,
            log_message_interval: header.log_message_interval,
            path_trace: body.path_trace,
        });
        self.announce_rcv_sm(i, p);
    }

    fn rx_signaling(&mut self, i: usize, p: usize, tlv: SignalingTlv) {
        self.instances[i].ports[p].counters.rx_signaling += 1;
        match tlv {
            SignalingTlv::IntervalRequest(request) => {
                if let LinkRef::Domain(l) = self.instances[i].ports[p].link {
                    if self.instances[i].domain == 0 {
                        self.link_interval_sm(l, Some(request));
                    }
                }
                self.announce_interval_sm(i, p, Some(request.announce_interval));
                self.sync_interval_sm(i, p, Some(request.time_sync_interval));
            }
            SignalingTlv::GptpCapable(capable) => {
                self.capable_rcv_sm(i, p, CapableRcvEvent::Tlv(capable));
            }
            SignalingTlv::GptpCapableInterval {
                log_gptp_capable_message_interval,
            } => {
                self.capable_interval_sm(i, p, Some(log_gptp_capable_message_interval));
            }
            SignalingTlv::Other { .. } => {
                tracing::debug!(port = p, "unsupported signaling TLV ignored");
            }
        }
    }

    // ===== Egress timestamps =====

    /// Correlate an egress timestamp with the message waiting for it.
    pub fn on_tx_timestamp(&mut self, ts: &TxTimestamp) {
        let Some(net_port) = self.net_ports.get(ts.port) else {
            return;
        };
        let timestamp = compensate(ts.timestamp, net_port.tx_comp);
        let tag = ts.tag;
        let matched = match tag.kind {
            TxKind::Sync => {
                let port = self
                    .instances
                    .get_mut(tag.owner)
                    .and_then(|instance| instance.ports.get_mut(ts.port));
                match port {
                    Some(port)
                        if port.sync_seq == tag.sequence_id
                            && port.sync_send_state == SyncSendState::SendSync =>
                    {
                        port.sync_tx_ts = Some(timestamp);
                        self.md_sync_send_sm(tag.owner, ts.port, SyncSendEvent::TimestampReceived);
                        true
                    }
                    _ => false,
                }
            }
            TxKind::PdelayReq => match self.links.get_mut(tag.owner) {
                Some(link) if link.req_seq == tag.sequence_id => {
                    link.req_tx_ts = Some(timestamp);
                    self.pdelay_req_sm(tag.owner, PdelayReqEvent::TimestampReceived);
                    true
                }
                _ => false,
            },
            TxKind::PdelayResp => match self.links.get_mut(tag.owner) {
                Some(link) if link.rcvd_req.is_some_and(|r| r.sequence_id == tag.sequence_id) => {
                    link.resp_tx_ts = Some(timestamp);
                    self.pdelay_resp_sm(tag.owner, PdelayRespEvent::TimestampReceived);
                    true
                }
                _ => false,
            },
        };
        if !matched {
            self.net_ports[ts.port].counters.tx_timestamp_unmatched += 1;
            tracing::warn!(port = ts.port, tag = %tag, "egress timestamp matches no message");
        }
    }
}

use crate::protocol::message::tlv::*;
use crate::protocol::message::{Body, Message, PortIdentity};

// ===== Follow_Up TLV =====

#[test]
fn test_follow_up_rate_ratio_scaling() {
    let tlv = FollowUpTlv::with_rate_ratio(1.0);
    assert_eq!(tlv.cumulative_scaled_rate_offset, 0);

    let tlv = FollowUpTlv::with_rate_ratio(1.0 + 1e-6);
    assert_eq!(tlv.cumulative_scaled_rate_offset, 2_199_023);
    assert!((tlv.rate_ratio() - (1.0 + 1e-6)).abs() < 1e-12);
}

#[test]
fn test_follow_up_negative_offset_floors() {
    let tlv = FollowUpTlv::with_rate_ratio(1.0 - 1e-6);
    assert_eq!(tlv.cumulative_scaled_rate_offset, -2_199_024);
}

#[test]
fn test_follow_up_tlv_header_bytes() {
    let mut buf = Vec::new();
    FollowUpTlv::default().encode_into(&mut buf);
    assert_eq!(buf.len(), FollowUpTlv::SIZE);
    assert_eq!(&buf[0..10], &[0, 3, 0, 28, 0x00, 0x80, 0xC2, 0, 0, 1]);
}

// ===== Signaling TLVs =====

#[test]
fn test_gptp_capable_encoding() {
    let tlv = SignalingTlv::GptpCapable(GptpCapableTlv {
        log_gptp_capable_message_interval: 3,
        flags: 0,
    });
    let mut buf = Vec::new();
    tlv.encode_into(&mut buf);
    assert_eq!(buf.len(), SignalingTlv::SIZE);
    assert_eq!(&buf[0..4], &[0x80, 0x00, 0, 12]);
    assert_eq!(buf[9], SUBTYPE_GPTP_CAPABLE_MESSAGE);
    assert_eq!(buf[10], 3);
    assert_eq!(SignalingTlv::decode(&buf).unwrap(), tlv);
}

#[test]
fn test_gptp_capable_interval_roundtrip() {
    let tlv = SignalingTlv::GptpCapableInterval {
        log_gptp_capable_message_interval: INTERVAL_RESET_TO_INITIAL,
    };
    let mut buf = Vec::new();
    tlv.encode_into(&mut buf);
    assert_eq!(SignalingTlv::decode(&buf).unwrap(), tlv);
}

#[test]
fn test_foreign_organization_is_other() {
    let tlv = SignalingTlv::Other {
        tlv_type: TLV_TYPE_ORGANIZATION_EXTENSION,
        organization_id: [0x00, 0x1B, 0x19],
        organization_sub_type: [0, 0, SUBTYPE_INTERVAL_REQUEST],
    };
    let mut buf = Vec::new();
    tlv.encode_into(&mut buf);
    assert_eq!(SignalingTlv::decode(&buf).unwrap(), tlv);
}

#[test]
fn test_interval_request_flags() {
    let t = IntervalRequestTlv::default();
    assert!(t.compute_neighbor_rate_ratio());
    assert!(t.compute_mean_link_delay());
    let t = IntervalRequestTlv {
        flags: ITLV_FLAG_COMPUTE_DELAY,
        ..IntervalRequestTlv::default()
    };
    assert!(!t.compute_neighbor_rate_ratio());
    assert!(t.compute_mean_link_delay());
}

#[test]
fn test_signaling_target_all() {
    let msg = Message::signaling(
        PortIdentity::new(1, 1),
        0,
        0,
        PortIdentity::ALL,
        SignalingTlv::GptpCapable(GptpCapableTlv::default()),
    );
    let bytes = msg.encode();
    assert!(bytes[34..44].iter().all(|b| *b == 0xFF));
    let decoded = Message::decode(&bytes).unwrap();
    assert!(matches!(
        decoded.body,
        Body::Signaling { target_port_identity, .. } if target_port_identity == PortIdentity::ALL
    ));
}

// ===== Path trace =====

#[test]
fn test_path_trace_absent() {
    assert!(decode_path_trace(&[]).is_empty());
    assert!(decode_path_trace(&[0, 9, 0, 8, 1, 2, 3, 4, 5, 6, 7, 8]).is_empty());
}

#[test]
fn test_path_trace_ignores_partial_entry() {
    let mut buf = Vec::new();
    encode_path_trace(&[7, 8], &mut buf);
    buf.truncate(buf.len() - 3);
    assert_eq!(decode_path_trace(&buf), vec![7]);
}

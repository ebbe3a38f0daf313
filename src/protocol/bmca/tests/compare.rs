use crate::protocol::bmca::*;
use crate::protocol::message::{AnnounceBody, Header, MessageType, PortIdentity};

fn vector(priority1: u8, clock: u64, steps: u16, source: PortIdentity) -> PriorityVector {
    PriorityVector {
        root_system_identity: SystemIdentity {
            priority1,
            clock_quality: ClockQuality {
                clock_class: 248,
                clock_accuracy: 0xFE,
                offset_scaled_log_variance: 0x4100,
            },
            priority2: 248,
            clock_identity: clock,
        },
        steps_removed: steps,
        source_port_identity: source,
        port_number: 1,
    }
}

// ===== Priority vector ordering =====

#[test]
fn test_lower_priority1_wins() {
    let a = vector(100, 9, 0, PortIdentity::new(9, 1));
    let b = vector(200, 1, 0, PortIdentity::new(1, 1));
    assert_eq!(compare_priority_vector(&a, &b), VectorOrder::ABetter);
    assert_eq!(compare_priority_vector(&b, &a), VectorOrder::BBetter);
}

#[test]
fn test_clock_identity_breaks_tie() {
    let a = vector(248, 2, 0, PortIdentity::new(2, 1));
    let b = vector(248, 1, 0, PortIdentity::new(1, 1));
    assert_eq!(compare_priority_vector(&a, &b), VectorOrder::BBetter);
}

#[test]
fn test_steps_removed_after_identity() {
    let a = vector(248, 1, 1, PortIdentity::new(5, 1));
    let b = vector(248, 1, 2, PortIdentity::new(4, 1));
    assert_eq!(compare_priority_vector(&a, &b), VectorOrder::ABetter);
    assert_eq!(compare_system_identity(&a, &b), VectorOrder::Same);
}

#[test]
fn test_same_vector() {
    let a = vector(248, 1, 1, PortIdentity::new(5, 1));
    assert_eq!(compare_priority_vector(&a, &a), VectorOrder::Same);
}

#[test]
fn test_quality_compared_before_priority2() {
    let mut a = vector(248, 1, 0, PortIdentity::default());
    let mut b = a;
    a.root_system_identity.clock_quality.clock_class = 6;
    b.root_system_identity.priority2 = 0;
    assert_eq!(compare_priority_vector(&a, &b), VectorOrder::ABetter);
}

// ===== Message vector =====

#[test]
fn test_message_from_same_master_port_replaces() {
    let master = PortIdentity::new(7, 2);
    let port = vector(100, 7, 0, master);
    let worse = vector(200, 7, 3, master);
    assert_eq!(compare_message_vector(&worse, &port), VectorOrder::ABetter);
}

#[test]
fn test_message_from_other_port_uses_generic_order() {
    let port = vector(100, 7, 0, PortIdentity::new(7, 2));
    let worse = vector(200, 8, 0, PortIdentity::new(8, 1));
    assert_eq!(compare_message_vector(&worse, &port), VectorOrder::BBetter);
}

#[test]
fn test_vector_from_announce() {
    let header = Header::new(MessageType::Announce, PortIdentity::new(0xAB, 3), 1);
    let announce = AnnounceBody {
        grandmaster_priority1: 10,
        grandmaster_identity: 0xCD,
        steps_removed: 4,
        ..AnnounceBody::default()
    };
    let v = PriorityVector::from_announce(&header, &announce, 2);
    assert_eq!(v.root_system_identity.priority1, 10);
    assert_eq!(v.root_system_identity.clock_identity, 0xCD);
    assert_eq!(v.steps_removed, 4);
    assert_eq!(v.source_port_identity, PortIdentity::new(0xAB, 3));
    assert_eq!(v.port_number, 2);
    assert!(v.is_gm_capable());
}

#[test]
fn test_byte_image_layout() {
    let v = vector(1, 0x0102_0304_0506_0708, 0x090A, PortIdentity::new(0x1112, 0x1314));
    let bytes = v.to_bytes();
    assert_eq!(bytes[0], 1);
    assert_eq!(&bytes[1..5], &[248, 0xFE, 0x41, 0x00]);
    assert_eq!(bytes[5], 248);
    assert_eq!(&bytes[6..14], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&bytes[14..16], &[0x09, 0x0A]);
    assert_eq!(&bytes[24..26], &[0x13, 0x14]);
    assert_eq!(&bytes[26..28], &[0, 1]);
}

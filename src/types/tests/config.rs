use crate::error::ConfigError;
use crate::measure::FilterKind;
use crate::types::{
    DelayMechanism, DomainConfig, GptpConfig, PdelayMode, PortConfig, PortRole, Profile,
};

// ===== Defaults =====

#[test]
fn test_config_defaults() {
    let config = GptpConfig::default();
    assert_eq!(config.profile, Profile::Standard);
    assert_eq!(config.domains.len(), 1);
    assert_eq!(config.domains[0].priority1, 248);
    assert_eq!(config.domains[0].clock_class, 248);
    assert_eq!(config.domains[0].offset_scaled_log_variance, 17258);
    assert_eq!(config.ports.len(), 1);
    assert_eq!(config.ports[0].initial_log_sync_interval, -3);
    assert_eq!(config.ports[0].allowed_lost_responses, 9);
    assert_eq!(config.neighbor_prop_delay_threshold_ns, 800);
    assert_eq!(config.sync_thresh_low_ns, 450);
    assert_eq!(config.sync_thresh_high_ns, 550);
    assert!((config.max_rate_ratio_deviation - 0.01).abs() < f64::EPSILON);
    assert_eq!(config.phase_discont_threshold_ns, 4000);
    assert_eq!(config.pdelay_filter, FilterKind::ExpDecay { coef: 0.125 });
    assert_eq!(config.stats_interval_s, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_builder() {
    let config = GptpConfig::builder()
        .profile(Profile::Automotive)
        .clock_identity(0x0011_22ff_fe33_4455)
        .gm_id(0xAABB)
        .port_count(3)
        .priority1(100)
        .pdelay_mode(PdelayMode::Silent)
        .neighbor_prop_delay_threshold_ns(1000)
        .stats_interval_s(0)
        .build();

    assert!(config.is_automotive());
    assert_eq!(config.ports.len(), 3);
    assert_eq!(config.domains[0].priority1, 100);
    assert_eq!(config.pdelay_mode, PdelayMode::Silent);
    assert_eq!(config.gm_id, 0xAABB);
    assert_eq!(config.stats_interval_s, 0);
}

#[test]
fn test_default_delay_mechanism_by_domain() {
    let port = PortConfig::default();
    assert_eq!(port.delay_mechanism_for(0), DelayMechanism::P2p);
    assert_eq!(port.delay_mechanism_for(1), DelayMechanism::CommonP2p);

    let port = PortConfig {
        delay_mechanism: vec![DelayMechanism::CommonP2p],
        ..PortConfig::default()
    };
    assert_eq!(port.delay_mechanism_for(0), DelayMechanism::CommonP2p);
}

// ===== Validation =====

#[test]
fn test_automotive_rejects_multiple_domains() {
    let config = GptpConfig::builder()
        .profile(Profile::Automotive)
        .domains(vec![DomainConfig::with_number(0), DomainConfig::with_number(1)])
        .build();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors, vec![ConfigError::AutomotiveMultipleDomains]);
}

#[test]
fn test_automotive_allows_disabled_domains() {
    let config = GptpConfig::builder()
        .profile(Profile::Automotive)
        .domains(vec![DomainConfig::with_number(0), DomainConfig::with_number(-1)])
        .build();
    assert!(config.validate().is_ok());
}

#[test]
fn test_first_domain_must_be_zero() {
    let config = GptpConfig::builder()
        .domains(vec![DomainConfig::with_number(3)])
        .build();
    let errors = config.validate().unwrap_err();
    assert!(errors.contains(&ConfigError::FirstDomainNotZero(3)));
}

#[test]
fn test_domain_range_and_duplicates() {
    let config = GptpConfig::builder()
        .domains(vec![
            DomainConfig::with_number(0),
            DomainConfig::with_number(200),
            DomainConfig::with_number(5),
            DomainConfig::with_number(5),
            DomainConfig::with_number(-1),
            DomainConfig::with_number(-1),
        ])
        .build();
    let errors = config.validate().unwrap_err();
    assert!(errors.contains(&ConfigError::DomainOutOfRange { index: 1, number: 200 }));
    assert!(errors.contains(&ConfigError::DuplicateDomain(5)));
    assert!(!errors.contains(&ConfigError::DuplicateDomain(-1)));
}

#[test]
fn test_delay_mechanism_rules() {
    let config = GptpConfig::builder()
        .domains(vec![DomainConfig::with_number(0), DomainConfig::with_number(1)])
        .ports(vec![PortConfig {
            delay_mechanism: vec![DelayMechanism::Special, DelayMechanism::P2p],
            ..PortConfig::default()
        }])
        .build();
    let errors = config.validate().unwrap_err();
    assert!(errors.contains(&ConfigError::UnsupportedDelayMechanism {
        domain: 0,
        port: 0,
        mechanism: "Special".to_string(),
    }));
    assert!(errors.contains(&ConfigError::P2pOnNonZeroDomain { domain: 1, port: 0 }));
}

#[test]
fn test_port_count() {
    let config = GptpConfig::builder().port_count(0).build();
    assert!(config.validate().unwrap_err().contains(&ConfigError::PortCount(0)));
    let config = GptpConfig::builder().port_count(65).build();
    assert!(config.validate().unwrap_err().contains(&ConfigError::PortCount(65)));
}

#[test]
fn test_interval_ranges() {
    let config = GptpConfig::builder()
        .ports(vec![PortConfig {
            initial_log_sync_interval: 1,
            initial_log_pdelay_req_interval: -1,
            ..PortConfig::default()
        }])
        .build();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(matches!(
        errors[0],
        ConfigError::InvalidValue { name: "initial_log_sync_interval", .. }
    ));
}

#[test]
fn test_tunables_validated() {
    let config = GptpConfig::builder()
        .max_rate_ratio_deviation(0.0)
        .phase_discont_threshold_ns(0)
        .build();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
}

// ===== JSON =====

#[test]
fn test_json_round_trip() {
    let config = GptpConfig::builder()
        .clock_identity(42)
        .port_count(2)
        .pdelay_filter(FilterKind::Mean { window: 4 })
        .build();
    let text = config.to_json().unwrap();
    let back = GptpConfig::from_json(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_json_partial_document_uses_defaults() {
    let config = GptpConfig::from_json(
        r#"{ "profile": "automotive", "ports": [ { "port_role": "slave" }, {} ] }"#,
    )
    .unwrap();
    assert!(config.is_automotive());
    assert_eq!(config.ports[0].port_role, PortRole::Slave);
    assert_eq!(config.ports[1].port_role, PortRole::Disabled);
    assert_eq!(config.ports[1].initial_log_sync_interval, -3);
    assert_eq!(config.domains.len(), 1);
}

#[test]
fn test_json_malformed() {
    let err = GptpConfig::from_json("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Malformed(_)));
}

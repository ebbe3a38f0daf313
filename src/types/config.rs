use serde::{Deserialize, Serialize};

use super::PortRole;
use crate::error::ConfigError;
use crate::measure::FilterKind;
use crate::protocol::message::{ClockIdentity, DOMAIN_NUMBER_MAX};
use crate::protocol::time::{LOG_INTERVAL_MAX, LOG_INTERVAL_MIN};

/// Maximum number of network ports.
pub const MAX_PORTS: usize = 64;
/// Maximum number of gPTP domains.
pub const MAX_DOMAINS: usize = 8;

/// Operating profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// IEEE 802.1AS-2020 behaviour
    #[default]
    Standard,
    /// Fixed topology: static grandmaster, static roles and link delays
    Automotive,
}

/// Link delay mechanism of one port in one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMechanism {
    /// Domain-owned peer delay (domain 0 only)
    P2p,
    /// Shared Common Mean Link Delay Service
    CommonP2p,
    /// Link delay provided by the medium
    Special,
}

/// How link delay is obtained under the automotive profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PdelayMode {
    /// Use the configured delay, still answer peer delay requests
    #[default]
    Static,
    /// Measure with the standard peer delay exchange
    Standard,
    /// Use the configured delay, never transmit `Pdelay_Req`
    Silent,
}

/// Per-domain grandmaster parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Domain number, -1 disables the instance
    pub domain_number: i16,
    /// Whether this system may become grandmaster
    pub gm_capable: bool,
    /// BMCA priority1 (255 when not grandmaster capable)
    pub priority1: u8,
    /// BMCA priority2
    pub priority2: u8,
    /// Clock class
    pub clock_class: u8,
    /// Clock accuracy
    pub clock_accuracy: u8,
    /// Offset scaled log variance
    pub offset_scaled_log_variance: u16,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            domain_number: 0,
            gm_capable: true,
            priority1: 248,
            priority2: 248,
            clock_class: 248,
            clock_accuracy: 0xFF,
            offset_scaled_log_variance: 17258,
        }
    }
}

impl DomainConfig {
    /// Default parameters for `domain_number`.
    #[must_use]
    pub fn with_number(domain_number: i16) -> Self {
        Self {
            domain_number,
            ..Self::default()
        }
    }

    /// Whether the instance runs.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.domain_number >= 0
    }
}

/// Per-port parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Take part in gPTP on this port
    pub ptp_port_enabled: bool,
    /// Static role, automotive profile only
    pub port_role: PortRole,
    /// Delay mechanism per domain index; missing entries use the default
    pub delay_mechanism: Vec<DelayMechanism>,
    /// Sync interval before synchronization
    pub initial_log_sync_interval: i8,
    /// Sync interval requested once synchronized
    pub oper_log_sync_interval: i8,
    /// Announce interval
    pub initial_log_announce_interval: i8,
    /// `Pdelay_Req` interval before the link is stable
    pub initial_log_pdelay_req_interval: i8,
    /// `Pdelay_Req` interval once the link is stable
    pub oper_log_pdelay_req_interval: i8,
    /// `gPTP-capable` signaling interval
    pub log_gptp_capable_message_interval: i8,
    /// Missing or bad responses tolerated before the link is dropped
    pub allowed_lost_responses: u16,
    /// Static link delay, automotive profile only
    pub initial_neighbor_prop_delay_ns: f64,
    /// Added to every ingress timestamp
    pub rx_delay_compensation_ns: i32,
    /// Added to every egress timestamp
    pub tx_delay_compensation_ns: i32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            ptp_port_enabled: true,
            port_role: PortRole::Disabled,
            delay_mechanism: Vec::new(),
            initial_log_sync_interval: -3,
            oper_log_sync_interval: -3,
            initial_log_announce_interval: 0,
            initial_log_pdelay_req_interval: 0,
            oper_log_pdelay_req_interval: 0,
            log_gptp_capable_message_interval: 0,
            allowed_lost_responses: 9,
            initial_neighbor_prop_delay_ns: 250.0,
            rx_delay_compensation_ns: 0,
            tx_delay_compensation_ns: 0,
        }
    }
}

impl PortConfig {
    /// Delay mechanism used in domain index `domain`.
    #[must_use]
    pub fn delay_mechanism_for(&self, domain: usize) -> DelayMechanism {
        self.delay_mechanism.get(domain).copied().unwrap_or(if domain == 0 {
            DelayMechanism::P2p
        } else {
            DelayMechanism::CommonP2p
        })
    }
}

/// Configuration of one time-aware system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GptpConfig {
    /// Operating profile
    pub profile: Profile,
    /// EUI-64 clock identity of the system
    pub clock_identity: ClockIdentity,
    /// Grandmaster identity for the automotive static topology
    pub gm_id: ClockIdentity,
    /// One entry per gPTP instance; entry 0 must be domain 0
    pub domains: Vec<DomainConfig>,
    /// One entry per network port
    pub ports: Vec<PortConfig>,
    /// Link delay above which a port is not AS-capable, in ns
    pub neighbor_prop_delay_threshold_ns: u64,
    /// Link delay source under the automotive profile
    pub pdelay_mode: PdelayMode,
    /// Link delay change that triggers a new indication, in ns
    pub neighbor_prop_delay_sensitivity_ns: f64,
    /// Offset below which a slave reports synchronized, in ns
    pub sync_thresh_low_ns: u64,
    /// Offset above which a slave reports not synchronized, in ns
    pub sync_thresh_high_ns: u64,
    /// Largest accepted deviation of a neighbor rate ratio from 1.0
    pub max_rate_ratio_deviation: f64,
    /// Phase error that restarts the clock control loop, in ns
    pub phase_discont_threshold_ns: u64,
    /// Smoothing applied to measured link delays
    pub pdelay_filter: FilterKind,
    /// Lower clamp for log intervals
    pub log_interval_min: i8,
    /// Upper clamp for log intervals
    pub log_interval_max: i8,
    /// Seconds between statistics dumps, 0 disables them
    pub stats_interval_s: u32,
}

impl Default for GptpConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Standard,
            clock_identity: 0,
            gm_id: 0,
            domains: vec![DomainConfig::default()],
            ports: vec![PortConfig::default()],
            neighbor_prop_delay_threshold_ns: 800,
            pdelay_mode: PdelayMode::Static,
            neighbor_prop_delay_sensitivity_ns: 1.0,
            sync_thresh_low_ns: 450,
            sync_thresh_high_ns: 550,
            max_rate_ratio_deviation: 0.01,
            phase_discont_threshold_ns: 4000,
            pdelay_filter: FilterKind::default(),
            log_interval_min: LOG_INTERVAL_MIN,
            log_interval_max: LOG_INTERVAL_MAX,
            stats_interval_s: 10,
        }
    }
}

fn check_range(
    errors: &mut Vec<ConfigError>,
    name: &'static str,
    value: i8,
    min: i8,
    max: i8,
) {
    if value < min || value > max {
        errors.push(ConfigError::InvalidValue {
            name,
            message: format!("{value} outside {min}..={max}"),
        });
    }
}

impl GptpConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> GptpConfigBuilder {
        GptpConfigBuilder::default()
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] when the text is not a valid
    /// configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Whether the automotive profile is selected.
    #[must_use]
    pub fn is_automotive(&self) -> bool {
        self.profile == Profile::Automotive
    }

    /// Check every constraint, collecting all violations.
    ///
    /// # Errors
    ///
    /// Returns every violated constraint, in discovery order.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.ports.is_empty() || self.ports.len() > MAX_PORTS {
            errors.push(ConfigError::PortCount(self.ports.len()));
        }
        if self.domains.is_empty() || self.domains.len() > MAX_DOMAINS {
            errors.push(ConfigError::DomainCount(self.domains.len()));
        }

        if self.is_automotive() && self.domains.iter().skip(1).any(DomainConfig::is_enabled) {
            errors.push(ConfigError::AutomotiveMultipleDomains);
            return Err(errors);
        }

        if let Some(first) = self.domains.first() {
            if first.domain_number != 0 {
                errors.push(ConfigError::FirstDomainNotZero(first.domain_number));
            }
        }

        for (index, domain) in self.domains.iter().enumerate() {
            let number = domain.domain_number;
            if number < -1 || number > i16::from(DOMAIN_NUMBER_MAX) {
                errors.push(ConfigError::DomainOutOfRange { index, number });
            }
            if number != -1
                && self.domains[index + 1..]
                    .iter()
                    .any(|other| other.domain_number == number)
            {
                errors.push(ConfigError::DuplicateDomain(number));
            }
        }

        for (d, domain) in self.domains.iter().enumerate() {
            for (p, port) in self.ports.iter().enumerate() {
                let mechanism = port.delay_mechanism_for(d);
                if !matches!(mechanism, DelayMechanism::P2p | DelayMechanism::CommonP2p) {
                    errors.push(ConfigError::UnsupportedDelayMechanism {
                        domain: d,
                        port: p,
                        mechanism: format!("{mechanism:?}"),
                    });
                }
                if domain.domain_number > 0 && mechanism == DelayMechanism::P2p {
                    errors.push(ConfigError::P2pOnNonZeroDomain { domain: d, port: p });
                }
            }
        }

        for port in &self.ports {
            let e = &mut errors;
            check_range(e, "initial_log_sync_interval", port.initial_log_sync_interval, -5, 0);
            check_range(e, "oper_log_sync_interval", port.oper_log_sync_interval, -5, 0);
            let announce = port.initial_log_announce_interval;
            check_range(e, "initial_log_announce_interval", announce, 0, 3);
            let pdelay = port.initial_log_pdelay_req_interval;
            check_range(e, "initial_log_pdelay_req_interval", pdelay, 0, 3);
            let pdelay = port.oper_log_pdelay_req_interval;
            check_range(e, "oper_log_pdelay_req_interval", pdelay, 0, 3);
            check_range(
                &mut errors,
                "log_gptp_capable_message_interval",
                port.log_gptp_capable_message_interval,
                self.log_interval_min,
                self.log_interval_max,
            );
            if !(0.0..=10_000.0).contains(&port.initial_neighbor_prop_delay_ns) {
                errors.push(ConfigError::InvalidValue {
                    name: "initial_neighbor_prop_delay_ns",
                    message: format!("{} outside 0..=10000", port.initial_neighbor_prop_delay_ns),
                });
            }
        }

        if self.log_interval_min > self.log_interval_max {
            errors.push(ConfigError::InvalidValue {
                name: "log_interval_min",
                message: "greater than log_interval_max".to_string(),
            });
        }
        if self.neighbor_prop_delay_threshold_ns > 10_000_000 {
            errors.push(ConfigError::InvalidValue {
                name: "neighbor_prop_delay_threshold_ns",
                message: format!("{} above 10000000", self.neighbor_prop_delay_threshold_ns),
            });
        }
        if self.sync_thresh_low_ns > self.sync_thresh_high_ns {
            errors.push(ConfigError::InvalidValue {
                name: "sync_thresh_low_ns",
                message: "greater than sync_thresh_high_ns".to_string(),
            });
        }
        if !(self.max_rate_ratio_deviation > 0.0 && self.max_rate_ratio_deviation < 1.0) {
            errors.push(ConfigError::InvalidValue {
                name: "max_rate_ratio_deviation",
                message: format!("{} outside (0, 1)", self.max_rate_ratio_deviation),
            });
        }
        if self.phase_discont_threshold_ns == 0 {
            errors.push(ConfigError::InvalidValue {
                name: "phase_discont_threshold_ns",
                message: "must be positive".to_string(),
            });
        }

        if errors.is_empty() {
            tracing::info!("gptp config is valid");
            Ok(())
        } else {
            for e in &errors {
                tracing::error!("{}", e);
            }
            Err(errors)
        }
    }
}

/// Builder for `GptpConfig`
#[derive(Debug, Clone, Default)]
pub struct GptpConfigBuilder {
    config: GptpConfig,
}

impl GptpConfigBuilder {
    /// Set the operating profile
    #[must_use]
    pub fn profile(mut self, profile: Profile) -> Self {
        self.config.profile = profile;
        self
    }

    /// Set the system clock identity
    #[must_use]
    pub fn clock_identity(mut self, id: ClockIdentity) -> Self {
        self.config.clock_identity = id;
        self
    }

    /// Set the static grandmaster identity
    #[must_use]
    pub fn gm_id(mut self, id: ClockIdentity) -> Self {
        self.config.gm_id = id;
        self
    }

    /// Replace the domain list
    #[must_use]
    pub fn domains(mut self, domains: Vec<DomainConfig>) -> Self {
        self.config.domains = domains;
        self
    }

    /// Use `n` ports with default settings
    #[must_use]
    pub fn port_count(mut self, n: usize) -> Self {
        self.config.ports = vec![PortConfig::default(); n];
        self
    }

    /// Replace the port list
    #[must_use]
    pub fn ports(mut self, ports: Vec<PortConfig>) -> Self {
        self.config.ports = ports;
        self
    }

    /// Set BMCA priority1 of domain index 0
    #[must_use]
    pub fn priority1(mut self, priority1: u8) -> Self {
        if let Some(domain) = self.config.domains.first_mut() {
            domain.priority1 = priority1;
        }
        self
    }

    /// Set grandmaster capability of every domain
    #[must_use]
    pub fn gm_capable(mut self, gm_capable: bool) -> Self {
        for domain in &mut self.config.domains {
            domain.gm_capable = gm_capable;
        }
        self
    }

    /// Set the link delay threshold
    #[must_use]
    pub fn neighbor_prop_delay_threshold_ns(mut self, ns: u64) -> Self {
        self.config.neighbor_prop_delay_threshold_ns = ns;
        self
    }

    /// Set the automotive link delay mode
    #[must_use]
    pub fn pdelay_mode(mut self, mode: PdelayMode) -> Self {
        self.config.pdelay_mode = mode;
        self
    }

    /// Set the link delay filter
    #[must_use]
    pub fn pdelay_filter(mut self, filter: FilterKind) -> Self {
        self.config.pdelay_filter = filter;
        self
    }

    /// Set the neighbor rate ratio bound
    #[must_use]
    pub fn max_rate_ratio_deviation(mut self, deviation: f64) -> Self {
        self.config.max_rate_ratio_deviation = deviation;
        self
    }

    /// Set the phase discontinuity threshold
    #[must_use]
    pub fn phase_discont_threshold_ns(mut self, ns: u64) -> Self {
        self.config.phase_discont_threshold_ns = ns;
        self
    }

    /// Set the statistics interval (0 disables)
    #[must_use]
    pub fn stats_interval_s(mut self, seconds: u32) -> Self {
        self.config.stats_interval_s = seconds;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> GptpConfig {
        self.config
    }
}

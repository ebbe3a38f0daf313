//! PortStateSelection: role assignment over the ports of one instance.
//!
//! Every port contributes its received priority vector, one step further
//! from the root. The best of those and the system's own vector is the
//! grandmaster vector; each port's role follows from where its own
//! information came from and how it ranks against that vector.

use crate::clock::ClockInterface;
use crate::net::NetworkInterface;
use crate::protocol::bmca::{
    ClockQuality, PriorityVector, SystemIdentity, VectorOrder, compare_priority_vector,
    compare_system_identity,
};
use crate::protocol::message::PortIdentity;
use crate::types::PortRole;

use super::announce::{AnnounceInfoEvent, AnnounceTxEvent};
use super::port::{InfoIs, SelectionState};
use super::{GptpEvent, TimeAwareSystem};

/// Bound on selections requested while a selection is running.
const MAX_SELECTION_PASSES: usize = 8;

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    pub(crate) fn port_state_selection_init(&mut self, i: usize) {
        let instance = &mut self.instances[i];
        let this_clock = instance.this_clock;
        instance.selection_state = SelectionState::InitBridge;
        instance.gm_priority = instance.system_priority;
        instance.last_gm_priority = PriorityVector {
            root_system_identity: SystemIdentity {
                priority1: u8::MAX,
                clock_quality: ClockQuality {
                    clock_class: u8::MAX,
                    clock_accuracy: u8::MAX,
                    offset_scaled_log_variance: u16::MAX,
                },
                priority2: u8::MAX,
                clock_identity: u64::MAX,
            },
            steps_removed: u16::MAX,
            source_port_identity: PortIdentity::ALL,
            port_number: u16::MAX,
        };
        instance.path_trace = vec![this_clock];
        for port in &mut instance.ports {
            port.role = PortRole::Disabled;
            port.selected = false;
            port.reselect = true;
        }
    }

    /// Run the selection, deferring requests made by the state machines it
    /// drives to a further pass.
    pub(crate) fn port_state_selection(&mut self, i: usize) {
        let instance = &mut self.instances[i];
        if !instance.enabled || instance.gm_id_static {
            return;
        }
        if instance.selecting {
            instance.reselect_pending = true;
            return;
        }
        instance.selecting = true;
        for _ in 0..MAX_SELECTION_PASSES {
            self.instances[i].reselect_pending = false;
            self.port_state_selection_pass(i);
            if !self.instances[i].reselect_pending {
                break;
            }
        }
        self.instances[i].selecting = false;
    }

    fn port_state_selection_pass(&mut self, i: usize) {
        let instance = &mut self.instances[i];
        if instance.selection_state == SelectionState::InitBridge {
            tracing::debug!(
                domain = instance.domain,
                "port state selection: {} -> {}",
                SelectionState::InitBridge,
                SelectionState::Selection
            );
            instance.selection_state = SelectionState::Selection;
        }
        for port in &mut instance.ports {
            port.reselect = false;
        }
        self.update_roles_tree(i);
        let instance = &mut self.instances[i];
        for port in &mut instance.ports {
            port.selected = true;
        }
        for p in 0..instance.ports.len() {
            self.announce_info_sm(i, p, AnnounceInfoEvent::Run);
            self.announce_tx_sm(i, p, AnnounceTxEvent::Run);
        }
    }

    fn update_roles_tree(&mut self, i: usize) {
        let instance = &mut self.instances[i];
        let this_clock = instance.this_clock;
        let domain = instance.domain;

        let mut gm = instance.system_priority;
        let mut gm_props = instance.sys_props;
        let mut winner = None;
        for (p, port) in instance.ports.iter().enumerate() {
            if port.info_is != InfoIs::Received {
                continue;
            }
            let mut path = port.port_priority;
            path.steps_removed = path.steps_removed.saturating_add(1);
            if path.root_system_identity.clock_identity == this_clock {
                continue;
            }
            if compare_priority_vector(&path, &gm) == VectorOrder::ABetter {
                gm = path;
                gm_props = port.ann;
                winner = Some(p);
            }
        }

        let steps_removed = if winner.is_some() { gm.steps_removed } else { 0 };
        instance.gm_priority = gm;
        instance.props = gm_props;
        instance.master_steps_removed = steps_removed;

        for (p, port) in instance.ports.iter_mut().enumerate() {
            let number = port.port_number();
            port.master_priority = PriorityVector {
                root_system_identity: gm.root_system_identity,
                steps_removed,
                source_port_identity: PortIdentity::new(this_clock, number),
                port_number: number,
            };
            let previous = port.role;
            let (role, updt_info) = match port.info_is {
                InfoIs::Disabled => (PortRole::Disabled, false),
                InfoIs::Aged => (PortRole::Master, true),
                InfoIs::Mine => (
                    PortRole::Master,
                    port.port_priority != port.master_priority
                        || port.port_steps_removed != steps_removed,
                ),
                InfoIs::Received if winner == Some(p) => (PortRole::Slave, false),
                InfoIs::Received => {
                    match compare_priority_vector(&port.master_priority, &port.port_priority) {
                        VectorOrder::ABetter => (PortRole::Master, true),
                        _ => (PortRole::Passive, false),
                    }
                }
            };
            port.role = role;
            port.updt_info = updt_info;
            if role != previous {
                tracing::info!(port = p, domain, "port role {} -> {}", previous, role);
            }
        }

        let gm_identity = gm.root_system_identity.clock_identity;
        instance.gm_present = gm.is_gm_capable();
        instance.system_role = if instance.ports.iter().any(|port| port.role == PortRole::Slave) {
            PortRole::Passive
        } else {
            PortRole::Slave
        };
        if gm_identity == this_clock {
            instance.path_trace = vec![this_clock];
        }
        let is_grandmaster = gm_identity == this_clock && instance.gm_present;
        if compare_system_identity(&gm, &instance.last_gm_priority) != VectorOrder::Same {
            tracing::debug!(domain, "grandmaster vector {}", gm);
            instance.last_gm_priority = gm;
        }

        if is_grandmaster != instance.is_grandmaster {
            instance.is_grandmaster = is_grandmaster;
            instance
                .adjuster
                .system_role_change(is_grandmaster, &mut self.clock, &mut self.local_clock);
        }
        self.report_grandmaster(i);
    }

    /// Queue a grandmaster indication when the elected grandmaster changed.
    fn report_grandmaster(&mut self, i: usize) {
        let instance = &mut self.instances[i];
        if !instance.gm_present {
            instance.reported_gm = None;
            return;
        }
        let gm_identity = instance.gm_priority.root_system_identity.clock_identity;
        let current = (gm_identity, instance.is_grandmaster);
        if instance.reported_gm == Some(current) {
            return;
        }
        instance.reported_gm = Some(current);
        if instance.is_grandmaster {
            tracing::info!(domain = instance.domain, "acting as grandmaster");
        } else {
            tracing::info!(domain = instance.domain, "grandmaster is {:016x}", gm_identity);
        }
        self.events.push_back(GptpEvent::GmChange {
            instance: i,
            domain: instance.domain,
            gm_identity,
            gm_present: instance.gm_present,
            is_grandmaster: instance.is_grandmaster,
        });
    }

    /// Fixed roles of the automotive profile.
    pub(crate) fn static_port_roles(&mut self, i: usize) {
        let gm_id = self.config.gm_id;
        let instance = &mut self.instances[i];
        let this_clock = instance.this_clock;
        for port in &mut instance.ports {
            port.role = port.static_role;
            port.selected = true;
            port.reselect = false;
        }
        let has_slave = instance.ports.iter().any(|port| port.role == PortRole::Slave);
        instance.gm_present = true;
        instance.is_grandmaster = instance.gm_capable && !has_slave;
        instance.system_role = if has_slave { PortRole::Passive } else { PortRole::Slave };
        instance.gm_priority = instance.system_priority;
        instance.gm_priority.root_system_identity.clock_identity =
            if instance.is_grandmaster { this_clock } else { gm_id };
        instance.path_trace = vec![this_clock];
        instance.selection_state = SelectionState::Selection;
        tracing::info!(
            domain = instance.domain,
            is_grandmaster = instance.is_grandmaster,
            "static port roles"
        );
        self.report_grandmaster(i);
    }
}

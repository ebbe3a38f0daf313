//! SiteSyncSync: fans the slave port's sync information out to every port
//! and to the clock slave entity.

use crate::clock::ClockInterface;
use crate::net::NetworkInterface;
use crate::types::PortRole;

use super::TimeAwareSystem;
use super::port::{SiteSyncState, SyncInfo};
use super::port_sync::PortSyncSendEvent;

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    pub(crate) fn site_sync_sm(&mut self, i: usize, info: SyncInfo) {
        let instance = &mut self.instances[i];
        if !instance.enabled {
            instance.site_sync_state = SiteSyncState::Initializing;
            return;
        }
        if instance.site_sync_state == SiteSyncState::Initializing {
            tracing::debug!(
                domain = instance.domain,
                "site sync: {} -> {}",
                SiteSyncState::Initializing,
                SiteSyncState::ReceivingSync
            );
            instance.site_sync_state = SiteSyncState::ReceivingSync;
        }

        let role = instance.role_of(info.local_port_number);
        if role != PortRole::Slave || !instance.gm_present {
            return;
        }
        instance.parent_log_sync_interval = info.log_message_interval;

        for p in 0..instance.ports.len() {
            let port = &mut self.instances[i].ports[p];
            port.pssync = Some(info);
            port.rcvd_pssync = true;
            self.port_sync_send_sm(i, p, PortSyncSendEvent::PsSync);
        }

        if info.local_port_number != 0 {
            self.clock_slave_sync(i, &info);
        }
    }
}

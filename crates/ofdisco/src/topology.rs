// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory switch / port / link table.
//!
//! The store is the only place link and port-external transitions are
//! computed. Every observable change is queued as a [`TopologyEvent`] and
//! handed out by [`TopologyStore::drain_events`].

use crate::error::CommitError;
use crate::linkprobe::LinkStatusSink;
use crate::types::{LinkStatus, MacAddr, PortKey, PortNo, SwitchId};
use crate::wire::LinkStatusRecord;
use std::collections::BTreeMap;

/// Far end of a port as last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTo {
    pub peer: PortKey,
    /// Both directions observed.
    pub up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    pub key: PortKey,
    pub name: String,
    pub mac: MacAddr,
    pub up: bool,
    /// Up with no link recorded.
    pub external: bool,
    pub link_to: Option<LinkTo>,
}

impl PortRecord {
    fn new(key: PortKey) -> Self {
        Self {
            key,
            name: String::new(),
            mac: MacAddr::default(),
            up: false,
            external: false,
            link_to: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRecord {
    pub id: SwitchId,
    ports: BTreeMap<PortNo, PortRecord>,
}

impl SwitchRecord {
    pub fn port(&self, port: PortNo) -> Option<&PortRecord> {
        self.ports.get(&port)
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.values()
    }
}

/// Change notification produced by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    SwitchUp(SwitchId),
    SwitchDown(SwitchId),
    PortUp { key: PortKey, mac: MacAddr },
    PortDown(PortKey),
    Link(LinkStatusRecord),
    PortExternal { key: PortKey, external: bool },
}

fn link_record(local: PortKey, peer: PortKey, status: LinkStatus) -> LinkStatusRecord {
    LinkStatusRecord {
        from_switch: local.switch,
        to_switch: peer.switch,
        from_port: local.port,
        to_port: peer.port,
        status,
    }
}

/// Switch / port / link table.
#[derive(Debug, Default)]
pub struct TopologyStore {
    switches: BTreeMap<SwitchId, SwitchRecord>,
    events: Vec<TopologyEvent>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_switch(&self, id: SwitchId) -> Option<&SwitchRecord> {
        self.switches.get(&id)
    }

    pub fn lookup_port(&self, key: PortKey) -> Option<&PortRecord> {
        self.switches.get(&key.switch)?.ports.get(&key.port)
    }

    pub fn lookup_port_by_name(&self, switch: SwitchId, name: &str) -> Option<&PortRecord> {
        self.switches
            .get(&switch)?
            .ports
            .values()
            .find(|port| port.name == name)
    }

    pub fn switches(&self) -> impl Iterator<Item = &SwitchRecord> {
        self.switches.values()
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.switches.values().flat_map(|sw| sw.ports.values())
    }

    /// Take every queued change notification.
    pub fn drain_events(&mut self) -> Vec<TopologyEvent> {
        std::mem::take(&mut self.events)
    }

    /// Record a switch connecting (`up`) or disconnecting.
    ///
    /// A disconnect drops the switch, its ports and every link they carry.
    pub fn update_switch(&mut self, id: SwitchId, up: bool) {
        if up {
            if self.switches.contains_key(&id) {
                return;
            }
            self.switches.insert(
                id,
                SwitchRecord {
                    id,
                    ports: BTreeMap::new(),
                },
            );
            self.events.push(TopologyEvent::SwitchUp(id));
            return;
        }

        let Some(switch) = self.switches.remove(&id) else {
            return;
        };
        for port in switch.ports.values() {
            if let Some(link) = port.link_to {
                self.events.push(TopologyEvent::Link(link_record(
                    port.key,
                    link.peer,
                    LinkStatus::Down,
                )));
            }
            if port.up {
                self.events.push(TopologyEvent::PortDown(port.key));
            }
        }
        self.events.push(TopologyEvent::SwitchDown(id));
    }

    /// Add or modify a port of a known switch.
    pub fn update_port(
        &mut self,
        key: PortKey,
        name: &str,
        mac: MacAddr,
        up: bool,
    ) -> Result<(), CommitError> {
        let switch = self
            .switches
            .get_mut(&key.switch)
            .ok_or(CommitError::SwitchNotFound(key.switch))?;
        let port = switch
            .ports
            .entry(key.port)
            .or_insert_with(|| PortRecord::new(key));
        let was_up = port.up;
        port.name = name.to_string();
        port.mac = mac;
        port.up = up;

        if up && !was_up {
            self.events.push(TopologyEvent::PortUp { key, mac });
        } else if !up && was_up {
            if let Some(link) = port.link_to.take() {
                self.events.push(TopologyEvent::Link(link_record(
                    key,
                    link.peer,
                    LinkStatus::Down,
                )));
            }
            self.events.push(TopologyEvent::PortDown(key));
        }
        self.refresh_external(key);
        Ok(())
    }

    /// Remove a port entirely.
    pub fn remove_port(&mut self, key: PortKey) -> Result<(), CommitError> {
        let switch = self
            .switches
            .get_mut(&key.switch)
            .ok_or(CommitError::SwitchNotFound(key.switch))?;
        let port = switch
            .ports
            .remove(&key.port)
            .ok_or(CommitError::PortNotFound(key))?;
        if let Some(link) = port.link_to {
            self.events.push(TopologyEvent::Link(link_record(
                key,
                link.peer,
                LinkStatus::Down,
            )));
        }
        if port.up {
            self.events.push(TopologyEvent::PortDown(key));
        }
        Ok(())
    }

    /// Record `local` as wired to `peer`.
    ///
    /// Rejected when `local` is unknown or down. Replacing a link to a
    /// different peer reports the old one down first.
    pub fn update_link_to(
        &mut self,
        local: PortKey,
        peer: PortKey,
        up: bool,
    ) -> Result<LinkTo, CommitError> {
        let port = self.port_mut(local)?;
        if !port.up {
            return Err(CommitError::PortDown(local));
        }
        let link = LinkTo { peer, up };
        let previous = port.link_to.replace(link);
        if previous != Some(link) {
            if let Some(old) = previous.filter(|old| old.peer != peer) {
                self.events.push(TopologyEvent::Link(link_record(
                    local,
                    old.peer,
                    LinkStatus::Down,
                )));
            }
            let status = if up {
                LinkStatus::Up
            } else {
                LinkStatus::Unstable
            };
            self.events
                .push(TopologyEvent::Link(link_record(local, peer, status)));
        }
        self.refresh_external(local);
        Ok(link)
    }

    /// Forget the link recorded on `local`, returning it.
    pub fn delete_link_to(&mut self, local: PortKey) -> Result<Option<LinkTo>, CommitError> {
        let removed = self.port_mut(local)?.link_to.take();
        if let Some(link) = removed {
            self.events.push(TopologyEvent::Link(link_record(
                local,
                link.peer,
                LinkStatus::Down,
            )));
        }
        self.refresh_external(local);
        Ok(removed)
    }

    /// Apply a link-status update received from another process.
    pub fn apply_link_status(&mut self, record: &LinkStatusRecord) -> Result<(), CommitError> {
        let local = record.from_port_key();
        match record.status {
            LinkStatus::Up => self.update_link_to(local, record.to_port_key(), true).map(drop),
            LinkStatus::Unstable => self
                .update_link_to(local, record.to_port_key(), false)
                .map(drop),
            LinkStatus::Down => self.delete_link_to(local).map(drop),
        }
    }

    fn port_mut(&mut self, key: PortKey) -> Result<&mut PortRecord, CommitError> {
        self.switches
            .get_mut(&key.switch)
            .ok_or(CommitError::SwitchNotFound(key.switch))?
            .ports
            .get_mut(&key.port)
            .ok_or(CommitError::PortNotFound(key))
    }

    fn refresh_external(&mut self, key: PortKey) {
        let Ok(port) = self.port_mut(key) else {
            return;
        };
        let external = port.up && port.link_to.is_none();
        if port.external != external {
            port.external = external;
            self.events
                .push(TopologyEvent::PortExternal { key, external });
        }
    }
}

impl LinkStatusSink for TopologyStore {
    fn commit(
        &mut self,
        local: PortKey,
        peer: Option<PortKey>,
        status: LinkStatus,
    ) -> Result<(), CommitError> {
        match (status, peer) {
            (LinkStatus::Up, Some(peer)) => self.update_link_to(local, peer, true).map(drop),
            (LinkStatus::Up, None) => Err(CommitError::NoLink(local)),
            (LinkStatus::Unstable, Some(peer)) => {
                self.update_link_to(local, peer, false).map(drop)
            }
            (LinkStatus::Unstable, None) => {
                let existing = self
                    .lookup_port(local)
                    .ok_or(CommitError::PortNotFound(local))?
                    .link_to
                    .ok_or(CommitError::NoLink(local))?;
                self.update_link_to(local, existing.peer, false).map(drop)
            }
            (LinkStatus::Down, _) => self.delete_link_to(local).map(drop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);

    fn store_with_ports() -> TopologyStore {
        let mut store = TopologyStore::new();
        store.update_switch(1, true);
        store.update_switch(2, true);
        store.update_port(PortKey::new(1, 1), "eth1", MAC, true).unwrap();
        store.update_port(PortKey::new(2, 3), "eth3", MAC, true).unwrap();
        store.drain_events();
        store
    }

    #[test]
    fn test_switch_and_port_events() {
        let mut store = TopologyStore::new();
        store.update_switch(1, true);
        store.update_switch(1, true);
        store.update_port(PortKey::new(1, 4), "eth4", MAC, true).unwrap();

        let events = store.drain_events();
        assert_eq!(
            events,
            vec![
                TopologyEvent::SwitchUp(1),
                TopologyEvent::PortUp {
                    key: PortKey::new(1, 4),
                    mac: MAC
                },
                TopologyEvent::PortExternal {
                    key: PortKey::new(1, 4),
                    external: true
                },
            ]
        );
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn test_port_on_unknown_switch() {
        let mut store = TopologyStore::new();
        assert_eq!(
            store.update_port(PortKey::new(9, 1), "eth1", MAC, true),
            Err(CommitError::SwitchNotFound(9))
        );
    }

    #[test]
    fn test_link_up_clears_external() {
        let mut store = store_with_ports();
        let local = PortKey::new(1, 1);
        let link = store.update_link_to(local, PortKey::new(2, 3), true).unwrap();
        assert!(link.up);

        let port = store.lookup_port(local).unwrap();
        assert!(!port.external);
        assert_eq!(port.link_to, Some(link));

        let events = store.drain_events();
        assert!(events.contains(&TopologyEvent::Link(LinkStatusRecord {
            from_switch: 1,
            to_switch: 2,
            from_port: 1,
            to_port: 3,
            status: LinkStatus::Up,
        })));
        assert!(events.contains(&TopologyEvent::PortExternal {
            key: local,
            external: false
        }));
    }

    #[test]
    fn test_repeated_link_update_is_silent() {
        let mut store = store_with_ports();
        let local = PortKey::new(1, 1);
        store.update_link_to(local, PortKey::new(2, 3), true).unwrap();
        store.drain_events();
        store.update_link_to(local, PortKey::new(2, 3), true).unwrap();
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn test_link_to_new_peer_reports_old_down() {
        let mut store = store_with_ports();
        let local = PortKey::new(1, 1);
        store.update_link_to(local, PortKey::new(2, 3), true).unwrap();
        store.drain_events();
        store.update_link_to(local, PortKey::new(2, 4), true).unwrap();

        let events = store.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            TopologyEvent::Link(LinkStatusRecord {
                to_port: 3,
                status: LinkStatus::Down,
                ..
            })
        ));
    }

    #[test]
    fn test_link_on_down_port_rejected() {
        let mut store = store_with_ports();
        let local = PortKey::new(1, 1);
        store.update_port(local, "eth1", MAC, false).unwrap();
        assert_eq!(
            store.update_link_to(local, PortKey::new(2, 3), true),
            Err(CommitError::PortDown(local))
        );
        assert_eq!(
            store.update_link_to(PortKey::new(1, 9), PortKey::new(2, 3), true),
            Err(CommitError::PortNotFound(PortKey::new(1, 9)))
        );
    }

    #[test]
    fn test_port_down_removes_link() {
        let mut store = store_with_ports();
        let local = PortKey::new(1, 1);
        store.update_link_to(local, PortKey::new(2, 3), true).unwrap();
        store.drain_events();

        store.update_port(local, "eth1", MAC, false).unwrap();
        let port = store.lookup_port(local).unwrap();
        assert!(port.link_to.is_none());
        assert!(!port.external);

        let events = store.drain_events();
        assert!(matches!(
            events[0],
            TopologyEvent::Link(LinkStatusRecord {
                status: LinkStatus::Down,
                ..
            })
        ));
        assert_eq!(events[1], TopologyEvent::PortDown(local));
    }

    #[test]
    fn test_switch_down_drops_everything() {
        let mut store = store_with_ports();
        store
            .update_link_to(PortKey::new(1, 1), PortKey::new(2, 3), true)
            .unwrap();
        store.drain_events();

        store.update_switch(1, false);
        assert!(store.lookup_switch(1).is_none());
        let events = store.drain_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], TopologyEvent::PortDown(PortKey::new(1, 1)));
        assert_eq!(events[2], TopologyEvent::SwitchDown(1));
    }

    #[test]
    fn test_lookup_by_name() {
        let store = store_with_ports();
        let port = store.lookup_port_by_name(2, "eth3").unwrap();
        assert_eq!(port.key, PortKey::new(2, 3));
        assert!(store.lookup_port_by_name(2, "eth9").is_none());
        assert_eq!(store.ports().count(), 2);
    }

    #[test]
    fn test_commit_unstable_without_peer() {
        let mut store = store_with_ports();
        let local = PortKey::new(1, 1);
        assert_eq!(
            store.commit(local, None, LinkStatus::Unstable),
            Err(CommitError::NoLink(local))
        );

        store.update_link_to(local, PortKey::new(2, 3), true).unwrap();
        store.commit(local, None, LinkStatus::Unstable).unwrap();
        assert_eq!(
            store.lookup_port(local).unwrap().link_to,
            Some(LinkTo {
                peer: PortKey::new(2, 3),
                up: false
            })
        );
    }

    #[test]
    fn test_apply_link_status_down() {
        let mut store = store_with_ports();
        let record = LinkStatusRecord {
            from_switch: 1,
            to_switch: 2,
            from_port: 1,
            to_port: 3,
            status: LinkStatus::Up,
        };
        store.apply_link_status(&record).unwrap();
        assert!(store.lookup_port(PortKey::new(1, 1)).unwrap().link_to.is_some());

        store
            .apply_link_status(&LinkStatusRecord {
                status: LinkStatus::Down,
                ..record
            })
            .unwrap();
        let port = store.lookup_port(PortKey::new(1, 1)).unwrap();
        assert!(port.link_to.is_none());
        assert!(port.external);
    }
}

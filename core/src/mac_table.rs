use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::addr::MacAddr;
use crate::topology::{DeviceId, Endpoint, Topology};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacEntry {
    pub interface: String,
    /// Far end of `interface` when the address was learned.
    pub peer: Endpoint,
    pub last_seen_us: u64,
}

/// Learned hardware addresses of one switch.
#[derive(Debug, Clone)]
pub struct MacTable {
    entries: HashMap<MacAddr, MacEntry>,
    aging_us: u64,
}

impl MacTable {
    pub fn new(aging_us: u64) -> Self {
        Self {
            entries: HashMap::new(),
            aging_us,
        }
    }

    /// Records `mac` as reachable through `interface`. Only an observation at
    /// least as recent as the stored one replaces it, so replaying learns in
    /// any order converges on the same table.
    pub fn learn(&mut self, mac: MacAddr, interface: &str, peer: &Endpoint, now_us: u64) {
        if mac.is_broadcast() {
            return;
        }
        match self.entries.get_mut(&mac) {
            Some(entry) if entry.last_seen_us > now_us => {}
            Some(entry) => {
                entry.interface = interface.to_string();
                entry.peer = peer.clone();
                entry.last_seen_us = now_us;
            }
            None => {
                self.entries.insert(
                    mac,
                    MacEntry {
                        interface: interface.to_string(),
                        peer: peer.clone(),
                        last_seen_us: now_us,
                    },
                );
            }
        }
    }

    /// The port for `mac`, ignoring entries older than the aging window.
    pub fn lookup(&self, mac: MacAddr, now_us: u64) -> Option<&str> {
        self.entries
            .get(&mac)
            .filter(|e| !self.is_expired(e, now_us))
            .map(|e| e.interface.as_str())
    }

    pub fn purge_expired(&mut self, now_us: u64) {
        let aging = self.aging_us;
        self.entries
            .retain(|_, e| now_us.saturating_sub(e.last_seen_us) <= aging);
    }

    /// Forgets entries whose port is now unplugged or cabled to something else.
    pub fn forget_recabled<'t>(&mut self, peer_of: impl Fn(&str) -> Option<&'t Endpoint>) {
        self.entries
            .retain(|_, e| peer_of(&e.interface) == Some(&e.peer));
    }

    /// Live entries sorted by port, then address.
    pub fn entries(&self, now_us: u64) -> Vec<(MacAddr, MacEntry)> {
        let mut live: Vec<(MacAddr, MacEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| !self.is_expired(e, now_us))
            .map(|(mac, e)| (*mac, e.clone()))
            .collect();
        live.sort_by(|(ma, a), (mb, b)| a.interface.cmp(&b.interface).then(ma.cmp(mb)));
        live
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &MacEntry, now_us: u64) -> bool {
        now_us.saturating_sub(entry.last_seen_us) > self.aging_us
    }
}

/// Per-switch tables. Each table sits behind its own lock so invocations
/// crossing different switches never contend, while two invocations crossing
/// the same switch apply their updates one at a time.
#[derive(Debug)]
pub struct MacTables {
    tables: Mutex<HashMap<DeviceId, Arc<Mutex<MacTable>>>>,
    aging_us: u64,
}

impl MacTables {
    pub fn new(aging_us: u64) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            aging_us,
        }
    }

    fn table(&self, device: &DeviceId) -> Arc<Mutex<MacTable>> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            tables
                .entry(device.clone())
                .or_insert_with(|| Arc::new(Mutex::new(MacTable::new(self.aging_us)))),
        )
    }

    /// Runs `f` with exclusive access to `device`'s table.
    pub fn with_table<T>(&self, device: &DeviceId, f: impl FnOnce(&mut MacTable) -> T) -> T {
        let table = self.table(device);
        let mut guard = table.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self, device: &DeviceId) -> Option<MacTable> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(device).map(|t| {
            t.lock().unwrap_or_else(PoisonError::into_inner).clone()
        })
    }

    /// Brings the tables in line with `topology`. Tables of devices that left
    /// it (or no longer learn) are dropped; aged and re-cabled entries go.
    pub fn prune(&self, topology: &Topology, now_us: u64) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.retain(|id, _| topology.device(id).map_or(false, |d| d.kind.learns()));
        for (id, table) in tables.iter() {
            let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
            table.purge_expired(now_us);
            table.forget_recabled(|port| topology.peer(id, port));
        }
    }
}

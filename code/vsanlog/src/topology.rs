/// The reconciled view of a CMMDS dump: objects with their components, the disks the components
/// live on, the hosts that own objects and disks, and the friendly names of object groups.
///
/// The host and disk maps are seeded with zero-UUID sentinels and every lookup of a host or a disk
/// falls back to the sentinel, so reporting code never has to deal with a dangling reference.
/// Objects keep the order in which they were first seen in the dump, and components keep their
/// order within the object.
///
/// The graph is built once and not changed after that.

use crate::dump::{RawRecord, RecordKind};
use crate::errors::VsanError;
use crate::extract::{Component, EntityExtractor, FriendlyName};

use anyhow::Result;
use std::collections::HashMap;
use ustr::Ustr;
use vsanutils::ZERO_UUID;

pub const NOT_FOUND: &str = "Not found";
pub const EMPTY_NAME: &str = "<none>";

/// componentState codes.  The enumeration on the vSAN side is bracketed by "First" and "Last"
/// markers; "Last" is not a state and is not in the table.

const COMPONENT_STATES: &[(i64, &str)] = &[
    (0, "First"),
    (1, "None"),
    (2, "Need Config"),
    (3, "Initialize"),
    (4, "Initialized"),
    (5, "Active"),
    (6, "Absent"),
    (7, "Stale"),
    (8, "Resyncing"),
    (9, "Degraded"),
    (10, "Reconfiguring"),
    (11, "Cleanup"),
    (12, "Transient"),
];

pub const ACTIVE_STATE: i64 = 5;

/// objClass codes.

const OBJECT_CLASSES: &[(i64, &str)] = &[
    (0, "VMDK"),
    (1, "Snapshot"),
    (2, "Namespace"),
    (3, "VSWP"),
    (4, "VMEM"),
    (5, "Sidecar"),
    (6, "HBR"),
    (7, "Coredump"),
    (8, "DPCONSISTENCYGRP"),
    (9, "VDFS"),
    (10, "VDFS_ROOT"),
];

fn lookup_label(table: &[(i64, &'static str)], what: &'static str, code: i64) -> Result<&'static str> {
    match table.iter().find(|(c, _)| *c == code) {
        Some((_, label)) => Ok(label),
        None => Err(VsanError::OutOfRange { what, code }.into()),
    }
}

pub fn resolve_component_state(code: i64) -> Result<&'static str> {
    lookup_label(COMPONENT_STATES, "component state", code)
}

pub fn resolve_object_class(code: i64) -> Result<&'static str> {
    lookup_label(OBJECT_CLASSES, "object class", code)
}

/// How to show a friendly name that is present but empty.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyNamePolicy {
    /// Show it as "<none>".
    Literal,
    /// Show it as "Not found", as if there were no name at all.
    AsNotFound,
}

#[derive(Debug, Clone)]
pub struct StorageObject {
    pub uuid: Ustr,

    /// The DOM owner, a host UUID.
    pub owner: Ustr,

    /// objClass, 0 when the entry did not have one.
    pub class_code: i64,

    /// groupUuid, NOT_FOUND when the entry did not have one.
    pub group_uuid: Ustr,

    pub components: Vec<Component>,
}

impl StorageObject {
    /// An object is affected if any of its components is in a state other than Active.

    pub fn is_affected(&self) -> bool {
        self.components.iter().any(|c| c.state != ACTIVE_STATE)
    }
}

#[derive(Debug, Clone)]
pub struct DiskDevice {
    pub uuid: Ustr,
    pub device_id: String,
    pub host_uuid: Ustr,
}

#[derive(Debug, Clone)]
pub struct HostRecord {
    pub uuid: Ustr,
    pub name: String,
}

pub struct Topology {
    objects: Vec<StorageObject>,
    object_index: HashMap<Ustr, usize>,
    names: HashMap<Ustr, FriendlyName>,
    hosts: HashMap<Ustr, HostRecord>,
    disks: HashMap<Ustr, DiskDevice>,
    zero: Ustr,
}

impl Topology {
    /// An empty graph holding only the sentinel host and disk.

    pub fn new() -> Topology {
        let zero = Ustr::from(ZERO_UUID);
        let mut hosts = HashMap::new();
        hosts.insert(
            zero,
            HostRecord {
                uuid: zero,
                name: NOT_FOUND.to_string(),
            },
        );
        let mut disks = HashMap::new();
        disks.insert(
            zero,
            DiskDevice {
                uuid: zero,
                device_id: NOT_FOUND.to_string(),
                host_uuid: zero,
            },
        );
        Topology {
            objects: vec![],
            object_index: HashMap::new(),
            names: HashMap::new(),
            hosts,
            disks,
            zero,
        }
    }

    /// Build the graph from the records of a dump, in dump order.

    pub fn from_records(records: Vec<RawRecord>) -> Result<Topology> {
        let extractor = EntityExtractor::new()?;
        let mut topo = Topology::new();
        for r in records {
            topo.add_record(&extractor, r);
        }
        log::info!(
            "Topology: {} objects, {} names, {} hosts, {} disks",
            topo.objects.len(),
            topo.names.len(),
            topo.hosts.len() - 1,
            topo.disks.len() - 1
        );
        Ok(topo)
    }

    fn add_record(&mut self, extractor: &EntityExtractor, r: RawRecord) {
        match r.kind {
            RecordKind::Object => {
                let attrs = extractor.object_attributes(&r.content);
                let ix = match self.object_index.get(&r.uuid) {
                    Some(ix) => *ix,
                    None => {
                        self.objects.push(StorageObject {
                            uuid: r.uuid,
                            owner: r.owner,
                            class_code: 0,
                            group_uuid: Ustr::from(NOT_FOUND),
                            components: vec![],
                        });
                        self.object_index.insert(r.uuid, self.objects.len() - 1);
                        self.objects.len() - 1
                    }
                };
                // A repeated entry for the same object refines what we have.
                let obj = &mut self.objects[ix];
                obj.owner = r.owner;
                if let Some(g) = attrs.group_uuid {
                    obj.group_uuid = g;
                }
                if let Some(c) = attrs.class_code {
                    obj.class_code = c;
                }
                for c in attrs.components {
                    if let Some(probe) = obj.components.iter_mut().find(|x| x.uuid == c.uuid) {
                        *probe = c;
                    } else {
                        obj.components.push(c);
                    }
                }
            }
            RecordKind::Name => {
                self.names.insert(r.uuid, extractor.friendly_name(&r.content));
            }
            RecordKind::Host => {
                let name = extractor
                    .host_name(&r.content)
                    .unwrap_or_else(|| NOT_FOUND.to_string());
                self.hosts.insert(r.uuid, HostRecord { uuid: r.uuid, name });
            }
            RecordKind::Disk => {
                let device_id = extractor
                    .device_id(&r.content)
                    .unwrap_or_else(|| NOT_FOUND.to_string());
                self.disks.insert(
                    r.uuid,
                    DiskDevice {
                        uuid: r.uuid,
                        device_id,
                        host_uuid: r.owner,
                    },
                );
            }
        }
    }

    /// All objects, in order of first appearance in the dump.

    pub fn objects(&self) -> &[StorageObject] {
        &self.objects
    }

    pub fn object(&self, uuid: &str) -> Option<&StorageObject> {
        self.object_index
            .get(&Ustr::from(uuid))
            .map(|ix| &self.objects[*ix])
    }

    /// The host with the given UUID, or the sentinel host.

    pub fn host(&self, uuid: Ustr) -> &HostRecord {
        self.hosts.get(&uuid).unwrap_or_else(|| &self.hosts[&self.zero])
    }

    /// The disk with the given UUID, or the sentinel disk.

    pub fn disk(&self, uuid: Ustr) -> &DiskDevice {
        self.disks.get(&uuid).unwrap_or_else(|| &self.disks[&self.zero])
    }

    /// True iff a disk with this UUID was in the dump.

    pub fn has_disk(&self, uuid: Ustr) -> bool {
        uuid != self.zero && self.disks.contains_key(&uuid)
    }

    /// The friendly-name outcome for a group.  Groups without a DOM_NAME entry are NotFound.

    pub fn friendly_name(&self, group_uuid: Ustr) -> FriendlyName {
        self.names
            .get(&group_uuid)
            .cloned()
            .unwrap_or(FriendlyName::NotFound)
    }

    /// The friendly name of a group as display text.

    pub fn display_name(&self, group_uuid: Ustr, policy: EmptyNamePolicy) -> String {
        match self.friendly_name(group_uuid) {
            FriendlyName::Named(s) => s,
            FriendlyName::Empty => match policy {
                EmptyNamePolicy::Literal => EMPTY_NAME.to_string(),
                EmptyNamePolicy::AsNotFound => NOT_FOUND.to_string(),
            },
            FriendlyName::NotFound => NOT_FOUND.to_string(),
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
use crate::dump::parse_dump;

#[cfg(test)]
fn whitebox_topology() -> Topology {
    let text = std::fs::read_to_string("../tests/vsanlog/whitebox-cmmds.txt").unwrap();
    let records = parse_dump(&crate::dump::repair_dump(&text).unwrap()).unwrap();
    Topology::from_records(records).unwrap()
}

#[test]
fn test_labels() {
    assert!(resolve_component_state(5).unwrap() == "Active");
    assert!(resolve_component_state(0).unwrap() == "First");
    assert!(resolve_component_state(12).unwrap() == "Transient");
    assert!(resolve_object_class(0).unwrap() == "VMDK");
    assert!(resolve_object_class(10).unwrap() == "VDFS_ROOT");

    for (code, res) in [
        (13, resolve_component_state(13)),
        (-1, resolve_component_state(-1)),
        (11, resolve_object_class(11)),
        (99, resolve_object_class(99)),
    ] {
        let e = res.unwrap_err();
        match e.downcast_ref::<VsanError>() {
            Some(VsanError::OutOfRange { code: c, .. }) => assert!(*c == code),
            _ => assert!(false),
        }
    }
}

#[test]
fn test_sentinels() {
    let topo = Topology::new();
    assert!(topo.objects().is_empty());
    assert!(topo.host(Ustr::from("nobody")).name == NOT_FOUND);
    let d = topo.disk(Ustr::from("nothing"));
    assert!(d.device_id == NOT_FOUND);
    assert!(d.host_uuid == ZERO_UUID);
    assert!(topo.host(d.host_uuid).name == NOT_FOUND);
    assert!(!topo.has_disk(Ustr::from(ZERO_UUID)));
    assert!(topo.display_name(Ustr::from("g"), EmptyNamePolicy::Literal) == NOT_FOUND);
}

#[test]
fn test_whitebox_topology() {
    let topo = whitebox_topology();
    assert!(topo.objects().len() == 3);

    let obj = topo.object("5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c").unwrap();
    assert!(obj.class_code == 0);
    assert!(obj.group_uuid == "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c");
    assert!(topo.host(obj.owner).name == "esx01.example.com");
    assert!(obj.components.len() == 2);
    assert!(!obj.is_affected());
    let d = topo.disk(obj.components[1].disk_uuid);
    assert!(d.device_id == "naa.5000c500a1b2c3d5:2");
    assert!(topo.host(d.host_uuid).name == "esx02.example.com");
    assert!(
        topo.display_name(obj.group_uuid, EmptyNamePolicy::Literal) == "vm-01"
    );

    // Second object: a component on a disk that is not in the dump, an owner that is not in the
    // dump, a stale absent component, and an empty friendly name.
    let obj = topo.object("5d8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c").unwrap();
    assert!(obj.is_affected());
    assert!(obj.class_code == 2);
    assert!(topo.host(obj.owner).name == NOT_FOUND);
    assert!(obj.components[0].stale);
    assert!(!topo.has_disk(obj.components[1].disk_uuid));
    assert!(topo.disk(obj.components[1].disk_uuid).device_id == NOT_FOUND);
    assert!(topo.friendly_name(obj.group_uuid) == FriendlyName::Empty);
    assert!(topo.display_name(obj.group_uuid, EmptyNamePolicy::Literal) == EMPTY_NAME);
    assert!(topo.display_name(obj.group_uuid, EmptyNamePolicy::AsNotFound) == NOT_FOUND);

    // Third object: no groupUuid, no objClass.
    let obj = topo.object("5e8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c").unwrap();
    assert!(obj.group_uuid == NOT_FOUND);
    assert!(obj.class_code == 0);
    assert!(topo.display_name(obj.group_uuid, EmptyNamePolicy::Literal) == NOT_FOUND);
}

#[test]
fn test_every_disk_reference_resolves() {
    let topo = whitebox_topology();
    for obj in topo.objects() {
        for c in &obj.components {
            let d = topo.disk(c.disk_uuid);
            assert!(d.uuid == c.disk_uuid || (d.uuid == ZERO_UUID && !topo.has_disk(c.disk_uuid)));
            // and the disk's host always resolves too
            let _ = topo.host(d.host_uuid);
        }
    }
}

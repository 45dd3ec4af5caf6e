/// Pull typed attributes out of the `content` text of dump records.
///
/// The content is a Python-style dict rendered as text, with nested dicts and lists, and it is not
/// reliably parseable as JSON (single quotes, truncation, odd escapes).  So we don't parse it, we
/// scan it for `"key": value` pairs in order of appearance and interpret the keys we know.

use anyhow::Result;
use regex::Regex;
use ustr::Ustr;
use vsanutils::UUID_PATTERN;

/// Outcome of looking for a friendly name.  An empty name is a real answer and is kept apart from
/// no answer at all; callers decide how to show it.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FriendlyName {
    Named(String),
    Empty,
    NotFound,
}

/// A component as it appears inside a DOM_OBJECT entry.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub uuid: Ustr,

    /// "Component" or "Witness", mostly.
    pub kind: String,

    /// Raw componentState code, see topology::resolve_component_state().  Unparseable codes are
    /// stored as -1 so that they are caught by the same range check as unknown codes.
    pub state: i64,

    /// The entry carried a staleCsn attribute for this component.
    pub stale: bool,

    pub disk_uuid: Ustr,
}

/// What a DOM_OBJECT entry says about its object.  The scalars are None when not present.

#[derive(Debug, Clone, Default)]
pub struct ObjectAttributes {
    pub group_uuid: Option<Ustr>,
    pub class_code: Option<i64>,
    pub components: Vec<Component>,
}

pub struct EntityExtractor {
    key_value: Regex,
    empty_name: Regex,
    name_with_cid: Regex,
    name_plain: Regex,
}

impl EntityExtractor {
    pub fn new() -> Result<EntityExtractor> {
        Ok(EntityExtractor {
            key_value: Regex::new(r#""([^"]+)":\s*"?([^",}]+)"#)?,
            empty_name: Regex::new(r#"ufn": """#)?,
            name_with_cid: Regex::new(&format!(r#"ufn": "(.+)", "cid": "{UUID_PATTERN}""#))?,
            name_plain: Regex::new(r#"ufn": "(.+)"}"#)?,
        })
    }

    fn pairs<'a>(&self, content: &'a str) -> Vec<(&'a str, &'a str)> {
        self.key_value
            .captures_iter(content)
            .filter_map(|c| match (c.get(1), c.get(2)) {
                (Some(k), Some(v)) => Some((k.as_str(), v.as_str())),
                _ => None,
            })
            .collect()
    }

    /// The fields of a component come in a fixed order: its `type`, then its attributes (among
    /// them `componentState` and possibly `staleCsn`), then `componentUuid`, and `diskUuid` last.
    /// The component is complete when `diskUuid` is seen.  A `type` also appears on the RAID
    /// nodes above the components, but the component's own `type` always comes later and wins.

    pub fn object_attributes(&self, content: &str) -> ObjectAttributes {
        let mut attrs = ObjectAttributes::default();
        let mut kind: Option<&str> = None;
        let mut state = 0i64;
        let mut stale = false;
        let mut component_uuid: Option<Ustr> = None;

        for (key, value) in self.pairs(content) {
            match key {
                "groupUuid" => attrs.group_uuid = Some(Ustr::from(value.trim())),
                "objClass" => attrs.class_code = value.trim().parse::<i64>().ok(),
                "type" => kind = Some(value),
                "componentState" => state = value.trim().parse::<i64>().unwrap_or(-1),
                "staleCsn" => stale = true,
                "componentUuid" => component_uuid = Some(Ustr::from(value.trim())),
                "diskUuid" => {
                    if let Some(uuid) = component_uuid.take() {
                        let c = Component {
                            uuid,
                            kind: kind.unwrap_or("Unknown").to_string(),
                            state,
                            stale,
                            disk_uuid: Ustr::from(value.trim()),
                        };
                        if let Some(probe) = attrs.components.iter_mut().find(|x| x.uuid == uuid) {
                            *probe = c;
                        } else {
                            attrs.components.push(c);
                        }
                    } else {
                        log::debug!("diskUuid without a componentUuid, ignored");
                    }
                    state = 0;
                    stale = false;
                }
                _ => {}
            }
        }
        attrs
    }

    /// The user-friendly name (`ufn`) of a DOM_NAME entry.  Some entries have a `cid` field after
    /// the name and some don't, so there are two patterns to try, the stricter one first.

    pub fn friendly_name(&self, content: &str) -> FriendlyName {
        if self.empty_name.is_match(content) {
            return FriendlyName::Empty;
        }
        let found = self
            .name_with_cid
            .captures(content)
            .or_else(|| self.name_plain.captures(content));
        match found.and_then(|c| c.get(1)) {
            Some(m) => FriendlyName::Named(m.as_str().to_string()),
            None => FriendlyName::NotFound,
        }
    }

    /// The name of a HOSTNAME entry: the second whitespace-separated token, stripped of quotes and
    /// the closing brace.

    pub fn host_name(&self, content: &str) -> Option<String> {
        let token = content.split_whitespace().nth(1)?;
        let name = token.trim_start_matches('"').trim_end_matches(['"', '}']);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// The device name (`devName`) of a DISK entry.  Nothing else in the entry is of interest.

    pub fn device_id(&self, content: &str) -> Option<String> {
        self.pairs(content)
            .into_iter()
            .find(|(k, _)| *k == "devName")
            .map(|(_, v)| v.to_string())
    }
}

#[cfg(test)]
const OBJECT_CONTENT: &str = r#"{"type": "Configuration", "attributes": {"CSN": 51, "SCSN": 49, "addressSpace": 273804165120, "compositeUuid": "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c", "objClass": 2, "groupUuid": "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c"}, "child-1": {"type": "RAID_1", "attributes": {"scope": 3}, "child-1": {"type": "Component", "attributes": {"capacity": 273804165120, "addressSpace": 273804165120, "componentState": 5, "componentStateTS": 1557141072, "faultDomainId": "5c000000-0000-0000-0000-000000000001"}, "componentUuid": "6c8a6a5e-0000-0000-0000-0050569a1b2c", "diskUuid": "52000000-0000-0000-0000-0000000000d1"}, "child-2": {"type": "Component", "attributes": {"capacity": 273804165120, "componentState": 6, "staleLsn": 0, "staleCsn": 48}, "componentUuid": "6c8a6a5e-0000-0000-0001-0050569a1b2c", "diskUuid": "52000000-0000-0000-0000-0000000000d2"}}, "child-2": {"type": "Witness", "attributes": {"componentState": 8}, "componentUuid": "6c8a6a5e-0000-0000-0002-0050569a1b2c", "diskUuid": "52000000-0000-0000-0000-0000000000d9"}}"#;

#[test]
fn test_object_attributes() {
    let x = EntityExtractor::new().unwrap();
    let attrs = x.object_attributes(OBJECT_CONTENT);
    assert!(attrs.group_uuid == Some(Ustr::from("5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c")));
    assert!(attrs.class_code == Some(2));
    assert!(attrs.components.len() == 3);

    let c = &attrs.components[0];
    assert!(c.uuid == "6c8a6a5e-0000-0000-0000-0050569a1b2c");
    assert!(c.kind == "Component");
    assert!(c.state == 5);
    assert!(!c.stale);
    assert!(c.disk_uuid == "52000000-0000-0000-0000-0000000000d1");

    let c = &attrs.components[1];
    assert!(c.state == 6);
    assert!(c.stale);

    // Stale marker does not leak into the next component
    let c = &attrs.components[2];
    assert!(c.kind == "Witness");
    assert!(c.state == 8);
    assert!(!c.stale);
    assert!(c.disk_uuid == "52000000-0000-0000-0000-0000000000d9");
}

#[test]
fn test_object_attributes_missing_scalars() {
    let x = EntityExtractor::new().unwrap();
    let attrs = x.object_attributes(r#"{"type": "Component", "attributes": {"componentState": "x"}, "componentUuid": "c1", "diskUuid": "d1"}"#);
    assert!(attrs.group_uuid.is_none());
    assert!(attrs.class_code.is_none());
    assert!(attrs.components.len() == 1);
    assert!(attrs.components[0].state == -1);

    let attrs = x.object_attributes("garbage");
    assert!(attrs.components.is_empty());
}

#[test]
fn test_friendly_name() {
    let x = EntityExtractor::new().unwrap();
    assert!(
        x.friendly_name(r#"{"ufn": "vm-01", "cid": "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c"}"#)
            == FriendlyName::Named("vm-01".to_string())
    );
    assert!(
        x.friendly_name(r#"{"ufn": "vm-02.vmdk"}"#) == FriendlyName::Named("vm-02.vmdk".to_string())
    );
    assert!(
        x.friendly_name(r#"{"ufn": "", "cid": "5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c"}"#)
            == FriendlyName::Empty
    );
    assert!(x.friendly_name(r#"{"ufn": ""}"#) == FriendlyName::Empty);
    assert!(x.friendly_name(r#"{"name": "vm-03"}"#) == FriendlyName::NotFound);
    assert!(x.friendly_name("") == FriendlyName::NotFound);
}

#[test]
fn test_host_name() {
    let x = EntityExtractor::new().unwrap();
    assert!(x.host_name(r#"{"hostname": "esx01.example.com"}"#) == Some("esx01.example.com".to_string()));
    assert!(x.host_name(r#"{"hostname": "esx02"} "#) == Some("esx02".to_string()));
    assert!(x.host_name(r#"{"hostname":"esx03"}"#).is_none());
    assert!(x.host_name("").is_none());
}

#[test]
fn test_device_id() {
    let x = EntityExtractor::new().unwrap();
    assert!(
        x.device_id(r#"{"capacity": 12, "devName": "naa.5000c500a1b2c3d4:2", "ssdUuid": "x"}"#)
            == Some("naa.5000c500a1b2c3d4:2".to_string())
    );
    assert!(x.device_id(r#"{"capacity": 12}"#).is_none());
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use strum::{EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    IntoStaticStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceKind {
    #[strum(to_string = "control", serialize = "controls")]
    Control,
    #[strum(to_string = "subprocess", serialize = "subprocesses")]
    Subprocess,
    #[strum(to_string = "process", serialize = "processes")]
    Process,
    #[strum(to_string = "entity", serialize = "entities")]
    Entity,
    #[strum(to_string = "region", serialize = "regions")]
    Region,
}

/// How resources of one kind are found beneath a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRelation {
    /// Child records carry the parent id in `field`.
    Direct {
        child: ResourceKind,
        field: &'static str,
    },
    /// Children are reached through rows of a link table.
    Linked {
        child: ResourceKind,
        link: LinkKind,
        parent_field: &'static str,
        child_field: &'static str,
    },
}

impl ChildRelation {
    pub fn child(&self) -> ResourceKind {
        match self {
            Self::Direct { child, .. } | Self::Linked { child, .. } => *child,
        }
    }
}

impl ResourceKind {
    /// REST collection name, also the envelope key of API responses.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Region => "regions",
            Self::Entity => "entities",
            Self::Process => "processes",
            Self::Subprocess => "subprocesses",
            Self::Control => "controls",
        }
    }

    pub fn label(self) -> &'static str {
        self.into()
    }

    pub fn child_relations(self) -> &'static [ChildRelation] {
        match self {
            Self::Region => &[
                ChildRelation::Direct {
                    child: Self::Entity,
                    field: "region_id",
                },
                ChildRelation::Direct {
                    child: Self::Process,
                    field: "region_id",
                },
            ],
            Self::Entity => &[ChildRelation::Linked {
                child: Self::Process,
                link: LinkKind::ProcessesData,
                parent_field: "entity_id",
                child_field: "process_id",
            }],
            Self::Process => &[ChildRelation::Direct {
                child: Self::Subprocess,
                field: "process_id",
            }],
            Self::Subprocess => &[ChildRelation::Direct {
                child: Self::Control,
                field: "subprocess_id",
            }],
            Self::Control => &[],
        }
    }

    /// Field pointing at the record's ancestor, used to rebuild lineage in search results.
    pub fn lineage_field(self) -> Option<(ResourceKind, &'static str)> {
        match self {
            Self::Control => Some((Self::Subprocess, "subprocess_id")),
            Self::Subprocess => Some((Self::Process, "process_id")),
            Self::Process => Some((Self::Region, "region_id")),
            Self::Entity => Some((Self::Region, "region_id")),
            Self::Region => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkKind {
    ProcessesData,
    SubprocessesData,
    ControlsData,
}

impl LinkKind {
    pub fn collection(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i64,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Equality filter applied to list calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListFilter {
    pub field: &'static str,
    pub value: i64,
}

impl ListFilter {
    pub fn new(field: &'static str, value: i64) -> Self {
        Self { field, value }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.int_field(self.field) == Some(self.value)
    }
}

/// Raw API record. Kept as an untyped JSON object so snapshots round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.int_field("id")
    }

    pub fn uid(&self) -> Option<&str> {
        self.str_field("uid")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// Integer field; numeric strings are accepted since some endpoints quote ids.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Human-readable label: name, then uid, then `N/A`.
    pub fn display_name(&self) -> &str {
        self.name().or_else(|| self.uid()).unwrap_or("N/A")
    }
}

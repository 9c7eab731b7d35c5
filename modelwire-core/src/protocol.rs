//! Protocol generations and the facade table
//!
//! Two generations of the controller API are spoken. They expose the same
//! operations under different facades and use different field naming:
//!
//! | generation | facades                       | field names            |
//! |------------|-------------------------------|------------------------|
//! | `V1`       | unversioned `Client`/`Service` | `CamelCase`            |
//! | `V2`       | versioned per-concern facades  | `hyphen-case`          |
//!
//! A session is bound to exactly one generation for its whole life. The
//! [`FacadeTable`] for that generation is built once and never mutated, so it
//! can be shared freely between tasks.

use crate::types::MethodDescriptor;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Major version of the controller API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolGeneration {
    /// Environment-era API: unversioned facades, CamelCase fields
    V1,
    /// Model-era API: versioned facades, hyphenated fields
    #[default]
    V2,
}

impl ProtocolGeneration {
    /// Pick the generation matching a server version string such as `"2.0.1"`
    pub fn from_server_version(version: &str) -> Option<Self> {
        let major = version.trim().trim_start_matches('v').split('.').next()?;
        match major.parse::<u32>().ok()? {
            1 => Some(ProtocolGeneration::V1),
            2 => Some(ProtocolGeneration::V2),
            _ => None,
        }
    }

    /// Translate a canonical (hyphenated) field name to this generation
    ///
    /// ```rust
    /// use modelwire_core::ProtocolGeneration;
    ///
    /// assert_eq!(ProtocolGeneration::V2.field("watcher-id"), "watcher-id");
    /// assert_eq!(ProtocolGeneration::V1.field("watcher-id"), "AllWatcherId");
    /// assert_eq!(ProtocolGeneration::V1.field("space-name"), "NetworkName");
    /// assert_eq!(ProtocolGeneration::V1.field("instance-id"), "InstanceId");
    /// ```
    pub fn field(self, name: &'static str) -> Cow<'static, str> {
        match self {
            ProtocolGeneration::V2 => Cow::Borrowed(name),
            ProtocolGeneration::V1 => match V1_FIELDS.iter().find(|(from, _)| *from == name) {
                Some((_, to)) => Cow::Borrowed(*to),
                None => Cow::Owned(camel_case(name)),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolGeneration::V1 => "v1",
            ProtocolGeneration::V2 => "v2",
        }
    }
}

impl fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(ProtocolGeneration::V1),
            "v2" | "2" => Ok(ProtocolGeneration::V2),
            other => Err(format!("unknown protocol generation: {}", other)),
        }
    }
}

// Field names whose V1 spelling is not the CamelCase of the V2 spelling.
const V1_FIELDS: &[(&str, &str)] = &[
    ("agent-status", "JujuStatus"),
    ("application", "Service"),
    ("application-name", "ServiceName"),
    ("charm-url", "CharmURL"),
    ("config-yaml", "ConfigYAML"),
    ("model-tag", "EnvironTag"),
    ("params", "MachineParams"),
    ("space-name", "NetworkName"),
    ("watcher-id", "AllWatcherId"),
    ("uuid", "UUID"),
];

fn camel_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Logical operations a session can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    WatchAll,
    WatcherNext,
    WatcherStop,
    ModelInfo,
    CloudInfo,
    AddMachines,
    DestroyMachines,
    SetAnnotations,
    ApplicationGet,
    ApplicationSet,
    AddRelation,
    Deploy,
    AddUnits,
    DestroyApplication,
    AddCharm,
    Run,
    RunOnAllMachines,
    EnqueueAction,
}

impl Operation {
    pub const ALL: [Operation; 19] = [
        Operation::Login,
        Operation::WatchAll,
        Operation::WatcherNext,
        Operation::WatcherStop,
        Operation::ModelInfo,
        Operation::CloudInfo,
        Operation::AddMachines,
        Operation::DestroyMachines,
        Operation::SetAnnotations,
        Operation::ApplicationGet,
        Operation::ApplicationSet,
        Operation::AddRelation,
        Operation::Deploy,
        Operation::AddUnits,
        Operation::DestroyApplication,
        Operation::AddCharm,
        Operation::Run,
        Operation::RunOnAllMachines,
        Operation::EnqueueAction,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Immutable mapping from operations to method descriptors
#[derive(Debug, Clone)]
pub struct FacadeTable {
    generation: ProtocolGeneration,
    entries: HashMap<Operation, MethodDescriptor>,
}

impl FacadeTable {
    /// Build the table for `generation`
    pub fn for_generation(generation: ProtocolGeneration) -> Self {
        let entries: &[(Operation, MethodDescriptor)] = match generation {
            ProtocolGeneration::V1 => V1_TABLE,
            ProtocolGeneration::V2 => V2_TABLE,
        };
        Self {
            generation,
            entries: entries.iter().copied().collect(),
        }
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    /// Descriptor for `operation`, or `None` if this generation lacks it
    pub fn lookup(&self, operation: Operation) -> Option<MethodDescriptor> {
        self.entries.get(&operation).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const V1_TABLE: &[(Operation, MethodDescriptor)] = &[
    (Operation::Login, MethodDescriptor::new("Admin", "Login")),
    (Operation::WatchAll, MethodDescriptor::new("Client", "WatchAll")),
    (Operation::WatcherNext, MethodDescriptor::new("AllWatcher", "Next")),
    (Operation::WatcherStop, MethodDescriptor::new("AllWatcher", "Stop")),
    (Operation::ModelInfo, MethodDescriptor::new("Client", "EnvironmentInfo")),
    (Operation::AddMachines, MethodDescriptor::new("Client", "AddMachines")),
    (Operation::DestroyMachines, MethodDescriptor::new("Client", "DestroyMachines")),
    (Operation::SetAnnotations, MethodDescriptor::new("Client", "SetAnnotations")),
    (Operation::ApplicationGet, MethodDescriptor::new("Client", "ServiceGet")),
    (Operation::ApplicationSet, MethodDescriptor::new("Client", "ServiceSet")),
    (Operation::AddRelation, MethodDescriptor::new("Client", "AddRelation")),
    (Operation::Deploy, MethodDescriptor::new("Client", "ServiceDeploy")),
    (Operation::AddUnits, MethodDescriptor::new("Client", "AddServiceUnits")),
    (Operation::DestroyApplication, MethodDescriptor::new("Service", "Destroy")),
    (Operation::AddCharm, MethodDescriptor::new("Client", "AddCharm")),
    (Operation::Run, MethodDescriptor::new("Client", "Run")),
    (Operation::RunOnAllMachines, MethodDescriptor::new("Client", "RunOnAllMachines")),
    (Operation::EnqueueAction, MethodDescriptor::new("Action", "Enqueue")),
];

const V2_TABLE: &[(Operation, MethodDescriptor)] = &[
    (Operation::Login, MethodDescriptor::versioned("Admin", "Login", 3)),
    (Operation::WatchAll, MethodDescriptor::versioned("Client", "WatchAll", 1)),
    (Operation::WatcherNext, MethodDescriptor::versioned("AllWatcher", "Next", 1)),
    (Operation::WatcherStop, MethodDescriptor::versioned("AllWatcher", "Stop", 1)),
    (Operation::ModelInfo, MethodDescriptor::versioned("ModelManager", "ModelInfo", 2)),
    (Operation::CloudInfo, MethodDescriptor::versioned("Cloud", "Cloud", 1)),
    (Operation::AddMachines, MethodDescriptor::versioned("Client", "AddMachines", 1)),
    (Operation::DestroyMachines, MethodDescriptor::versioned("Client", "DestroyMachines", 1)),
    (Operation::SetAnnotations, MethodDescriptor::versioned("Annotations", "Set", 2)),
    (Operation::ApplicationGet, MethodDescriptor::versioned("Application", "Get", 1)),
    (Operation::ApplicationSet, MethodDescriptor::versioned("Application", "Set", 1)),
    (Operation::AddRelation, MethodDescriptor::versioned("Application", "AddRelation", 1)),
    (Operation::Deploy, MethodDescriptor::versioned("Application", "Deploy", 1)),
    (Operation::AddUnits, MethodDescriptor::versioned("Application", "AddUnits", 1)),
    (Operation::DestroyApplication, MethodDescriptor::versioned("Application", "Destroy", 1)),
    (Operation::AddCharm, MethodDescriptor::versioned("Client", "AddCharm", 1)),
    (Operation::Run, MethodDescriptor::versioned("Action", "Run", 2)),
    (Operation::RunOnAllMachines, MethodDescriptor::versioned("Action", "RunOnAllMachines", 2)),
    (Operation::EnqueueAction, MethodDescriptor::versioned("Action", "Enqueue", 2)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_table_is_complete() {
        let table = FacadeTable::for_generation(ProtocolGeneration::V2);
        for operation in Operation::ALL {
            let descriptor = table.lookup(operation).unwrap();
            assert!(descriptor.version.is_some(), "{} has no version", operation);
        }
        assert_eq!(table.len(), Operation::ALL.len());
    }

    #[test]
    fn test_v1_table_is_unversioned() {
        let table = FacadeTable::for_generation(ProtocolGeneration::V1);
        for operation in Operation::ALL {
            if let Some(descriptor) = table.lookup(operation) {
                assert_eq!(descriptor.version, None, "{} is versioned", operation);
            }
        }
    }

    #[test]
    fn test_cloud_info_missing_from_v1() {
        let table = FacadeTable::for_generation(ProtocolGeneration::V1);
        assert!(table.lookup(Operation::CloudInfo).is_none());
        assert_eq!(table.len(), Operation::ALL.len() - 1);
    }

    #[test]
    fn test_generations_differ() {
        let v1 = FacadeTable::for_generation(ProtocolGeneration::V1);
        let v2 = FacadeTable::for_generation(ProtocolGeneration::V2);

        assert_eq!(
            v1.lookup(Operation::ApplicationGet),
            Some(MethodDescriptor::new("Client", "ServiceGet"))
        );
        assert_eq!(
            v2.lookup(Operation::ApplicationGet),
            Some(MethodDescriptor::versioned("Application", "Get", 1))
        );
        assert_eq!(
            v2.lookup(Operation::Login),
            Some(MethodDescriptor::versioned("Admin", "Login", 3))
        );
    }

    #[test]
    fn test_field_translation() {
        assert_eq!(ProtocolGeneration::V1.field("model-tag"), "EnvironTag");
        assert_eq!(ProtocolGeneration::V1.field("deltas"), "Deltas");
        assert_eq!(ProtocolGeneration::V1.field("has-vote"), "HasVote");
        assert_eq!(ProtocolGeneration::V2.field("model-tag"), "model-tag");
    }

    #[test]
    fn test_generation_parsing() {
        assert_eq!("v1".parse::<ProtocolGeneration>().unwrap(), ProtocolGeneration::V1);
        assert_eq!("2".parse::<ProtocolGeneration>().unwrap(), ProtocolGeneration::V2);
        assert!("v3".parse::<ProtocolGeneration>().is_err());

        assert_eq!(
            ProtocolGeneration::from_server_version("1.25.6"),
            Some(ProtocolGeneration::V1)
        );
        assert_eq!(
            ProtocolGeneration::from_server_version("2.0-beta15"),
            Some(ProtocolGeneration::V2)
        );
        assert_eq!(ProtocolGeneration::from_server_version("3.1"), None);
    }
}

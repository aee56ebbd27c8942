//! Image resolution: decide which image each instance type should launch
//! with.
//!
//! Instance types are partitioned by the set of image candidates whose
//! requirements they satisfy.  Each partition takes the newest compatible
//! candidate; a strictly newer creation date wins, ties keep the earlier
//! candidate in list order.  Instance types no candidate accepts are reported
//! back rather than silently dropped.  An empty result is a valid outcome,
//! not an error.

use chrono::{DateTime, Utc};
use launch_options::InstanceTypeInfo;
use std::collections::BTreeMap;

/// One `key In values` constraint an instance type must satisfy to use an
/// image, e.g. `kubernetes.io/arch In [amd64]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub values: Vec<String>,
}

impl Requirement {
    pub fn new<K: Into<String>>(key: K, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn matches(&self, instance_type: &InstanceTypeInfo) -> bool {
        match instance_type.requirement_value(&self.key) {
            Some(value) => self.values.contains(&value),
            None => false,
        }
    }
}

/// An image candidate, typically one row of a describe-images response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ami {
    pub id: String,
    pub creation_date: DateTime<Utc>,
    pub requirements: Vec<Requirement>,
}

impl Ami {
    fn compatible_with(&self, instance_type: &InstanceTypeInfo) -> bool {
        self.requirements
            .iter()
            .all(|requirement| requirement.matches(instance_type))
    }
}

/// One resolved image and the instance types that will launch with it.
#[derive(Debug, Clone, PartialEq)]
pub struct AmiAssignment {
    pub ami: Ami,
    pub instance_types: Vec<InstanceTypeInfo>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub assignments: Vec<AmiAssignment>,
    /// Instance types that satisfied no candidate's requirements.
    pub incompatible: Vec<InstanceTypeInfo>,
}

pub fn resolve(candidates: &[Ami], instance_types: &[InstanceTypeInfo]) -> Resolution {
    let mut resolution = Resolution::default();
    if candidates.is_empty() {
        resolution.incompatible = instance_types.to_vec();
        return resolution;
    }

    // Partition instance types by the exact set of candidates they are
    // compatible with; candidate indices keep partitions deterministic.
    let mut partitions: BTreeMap<Vec<usize>, Vec<InstanceTypeInfo>> = BTreeMap::new();
    for instance_type in instance_types {
        let compatible: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.compatible_with(instance_type))
            .map(|(index, _)| index)
            .collect();
        if compatible.is_empty() {
            resolution.incompatible.push(instance_type.clone());
        } else {
            partitions
                .entry(compatible)
                .or_default()
                .push(instance_type.clone());
        }
    }

    // Newest creation date per partition; earlier list position wins ties.
    let mut assignments: BTreeMap<usize, Vec<InstanceTypeInfo>> = BTreeMap::new();
    for (compatible, types) in partitions {
        let mut best = compatible[0];
        for &index in &compatible[1..] {
            if candidates[index].creation_date > candidates[best].creation_date {
                best = index;
            }
        }
        assignments.entry(best).or_default().extend(types);
    }

    resolution.assignments = assignments
        .into_iter()
        .map(|(index, instance_types)| AmiAssignment {
            ami: candidates[index].clone(),
            instance_types,
        })
        .collect();
    resolution
}

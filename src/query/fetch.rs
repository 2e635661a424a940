//! Fetch-spec builder
//!
//! A fetch spec is a plain dict describing what to retrieve for each match
//! of a collection and how to group and aggregate it. The builder only
//! encodes; interpreting (and rejecting) a spec is the evaluator's job.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::value::{Dict, Value};

pub const KEY_TYPE: &str = "type";
pub const KEY_AGGREGATE: &str = "aggregate";
pub const KEY_GET: &str = "get";
pub const KEY_CLUSTER_BY: &str = "cluster-by";
pub const KEY_DATA: &str = "data";

/// Clusters keyed by stream position, one cluster per match
pub const CLUSTER_BY_POSITION: &str = "position";
/// Clusters keyed by media id
pub const CLUSTER_BY_ID: &str = "id";

/// Shape of a fetch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchType {
    /// Property values of the matches
    Metadata,
    /// List of clusters, in order of first appearance
    ClusterList,
    /// Dict of clusters keyed by the cluster value
    ClusterDict,
    /// Number of matches
    Count,
    /// Dict of named sub-specs, each evaluated over all matches
    Organize,
}

impl FetchType {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchType::Metadata => "metadata",
            FetchType::ClusterList => "cluster-list",
            FetchType::ClusterDict => "cluster-dict",
            FetchType::Count => "count",
            FetchType::Organize => "organize",
        }
    }

    pub fn is_cluster(self) -> bool {
        matches!(self, FetchType::ClusterList | FetchType::ClusterDict)
    }
}

impl FromStr for FetchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "metadata" => FetchType::Metadata,
            "cluster-list" => FetchType::ClusterList,
            "cluster-dict" => FetchType::ClusterDict,
            "count" => FetchType::Count,
            "organize" => FetchType::Organize,
            other => return Err(Error::invalid(format!("unknown fetch type {:?}", other))),
        })
    }
}

impl fmt::Display for FetchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the values of one property are folded across the matches of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Aggregate {
    #[default]
    First,
    List,
    Sum,
    Max,
    Min,
    Avg,
    Random,
}

impl Aggregate {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregate::First => "first",
            Aggregate::List => "list",
            Aggregate::Sum => "sum",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Avg => "avg",
            Aggregate::Random => "random",
        }
    }
}

impl FromStr for Aggregate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "first" => Aggregate::First,
            "list" => Aggregate::List,
            "sum" => Aggregate::Sum,
            "max" => Aggregate::Max,
            "min" => Aggregate::Min,
            "avg" => Aggregate::Avg,
            "random" => Aggregate::Random,
            other => return Err(Error::invalid(format!("unknown aggregate {:?}", other))),
        })
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed constructor for fetch-spec dicts
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSpec {
    dict: Dict,
}

impl FetchSpec {
    fn of_type(kind: FetchType) -> Self {
        let mut dict = Dict::new();
        dict.insert(KEY_TYPE.to_string(), Value::from(kind.as_str()));
        Self { dict }
    }

    /// Fetch `get` properties, folded with `aggregate`
    pub fn metadata<S: AsRef<str>>(get: &[S], aggregate: Aggregate) -> Self {
        let mut spec = Self::of_type(FetchType::Metadata);
        spec.dict
            .insert(KEY_AGGREGATE.to_string(), Value::from(aggregate.as_str()));
        spec.dict.insert(
            KEY_GET.to_string(),
            Value::list(get.iter().map(|p| p.as_ref())),
        );
        spec
    }

    /// Group matches by `cluster_by` and evaluate `data` per group
    pub fn cluster_list(cluster_by: &str, data: FetchSpec) -> Self {
        Self::cluster(FetchType::ClusterList, cluster_by, data)
    }

    /// Like [`FetchSpec::cluster_list`] but keyed by the cluster value
    pub fn cluster_dict(cluster_by: &str, data: FetchSpec) -> Self {
        Self::cluster(FetchType::ClusterDict, cluster_by, data)
    }

    fn cluster(kind: FetchType, cluster_by: &str, data: FetchSpec) -> Self {
        let mut spec = Self::of_type(kind);
        spec.dict
            .insert(KEY_CLUSTER_BY.to_string(), Value::from(cluster_by));
        spec.dict.insert(KEY_DATA.to_string(), data.into_value());
        spec
    }

    pub fn count() -> Self {
        Self::of_type(FetchType::Count)
    }

    /// Evaluate several named specs over the same matches
    pub fn organize<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, FetchSpec)>,
        K: Into<String>,
    {
        let data: Dict = entries
            .into_iter()
            .map(|(name, spec)| (name.into(), spec.into_value()))
            .collect();
        let mut spec = Self::of_type(FetchType::Organize);
        spec.dict.insert(KEY_DATA.to_string(), Value::from(data));
        spec
    }

    pub fn as_dict(&self) -> &Dict {
        &self.dict
    }

    pub fn into_value(self) -> Value {
        Value::from(self.dict)
    }
}

impl From<FetchSpec> for Value {
    fn from(spec: FetchSpec) -> Self {
        spec.into_value()
    }
}

/// The spec behind `query_ids`: one cluster per stream position, holding
/// the first `id` of that position
///
/// ```text
/// {type: cluster-list, cluster-by: position,
///  data: {type: metadata, aggregate: first, get: [id]}}
/// ```
pub fn ids_fetch_spec() -> FetchSpec {
    FetchSpec::cluster_list(
        CLUSTER_BY_POSITION,
        FetchSpec::metadata(&["id"], Aggregate::First),
    )
}

//! Fetch-spec evaluation
//!
//! Applies a fetch spec to the ids a collection evaluated to. The spec is
//! checked here, not by the client: `get` must be non-empty exactly for
//! `metadata`, and `cluster-by` must be present exactly for the cluster
//! types. Violations come back as remote errors.

use indexmap::IndexMap;
use rand::seq::IndexedRandom;

use crate::error::{Error, Result};
use crate::query::fetch::{
    KEY_AGGREGATE, KEY_CLUSTER_BY, KEY_DATA, KEY_GET, KEY_TYPE, CLUSTER_BY_ID, CLUSTER_BY_POSITION,
};
use crate::query::{Aggregate, FetchType};
use crate::value::{Dict, Value};

use super::eval::{compare_values, display_key, numeric, window, Evaluator};

impl Evaluator<'_> {
    /// Evaluate `spec` over `ids`
    pub fn fetch(&mut self, ids: &[i64], spec: &Value, strict: bool) -> Result<Value> {
        let dict = spec
            .as_dict()
            .ok_or_else(|| remote(format!("fetch spec must be a dict, got {}", spec.type_name())))?;
        let kind: FetchType = dict
            .get(KEY_TYPE)
            .and_then(Value::as_str)
            .ok_or_else(|| remote("fetch spec without a type"))?
            .parse()
            .map_err(|e: Error| remote(e.to_string()))?;

        validate_shape(kind, dict, strict)?;

        match kind {
            FetchType::Count => Ok(Value::Int64(ids.len() as i64)),
            FetchType::Metadata => self.metadata(ids, dict),
            FetchType::ClusterList | FetchType::ClusterDict => {
                self.cluster(kind, ids, dict, strict)
            }
            FetchType::Organize => {
                let entries = dict
                    .get(KEY_DATA)
                    .and_then(Value::as_dict)
                    .ok_or_else(|| remote("organize spec without a data dict"))?;
                let mut out = Dict::new();
                for (name, sub) in entries {
                    out.insert(name.clone(), self.fetch(ids, sub, strict)?);
                }
                Ok(Value::from(out))
            }
        }
    }

    fn metadata(&mut self, ids: &[i64], dict: &Dict) -> Result<Value> {
        let aggregate: Aggregate = match dict.get(KEY_AGGREGATE) {
            None => Aggregate::default(),
            Some(v) => v
                .as_str()
                .ok_or_else(|| remote("aggregate must be a string"))?
                .parse()
                .map_err(|e: Error| remote(e.to_string()))?,
        };
        let get = dict
            .get(KEY_GET)
            .and_then(Value::string_list)
            .ok_or_else(|| remote("get must be a list of property names"))?;

        if let [single] = get.as_slice() {
            return Ok(self.aggregate(ids, single, aggregate));
        }

        let mut out = Dict::new();
        for property in &get {
            let value = self.aggregate(ids, property, aggregate);
            if !value.is_none() {
                out.insert(property.clone(), value);
            }
        }
        Ok(Value::from(out))
    }

    fn aggregate(&mut self, ids: &[i64], property: &str, aggregate: Aggregate) -> Value {
        let values: Vec<Value> = ids
            .iter()
            .filter_map(|id| self.library.property(*id, property))
            .collect();
        if values.is_empty() {
            return Value::None;
        }

        match aggregate {
            Aggregate::First => values.into_iter().next().unwrap_or_default(),
            Aggregate::List => Value::list(values),
            Aggregate::Random => values.choose(&mut *self.rng).cloned().unwrap_or_default(),
            Aggregate::Max => values
                .into_iter()
                .max_by(compare_values)
                .unwrap_or_default(),
            Aggregate::Min => values
                .into_iter()
                .min_by(compare_values)
                .unwrap_or_default(),
            Aggregate::Sum => {
                let exact = values
                    .iter()
                    .try_fold(0i64, |acc, v| v.as_int().and_then(|n| acc.checked_add(n)));
                match exact {
                    Some(total) => Value::Int64(total),
                    // mixed types or i64 overflow
                    None => Value::Float64(values.iter().filter_map(numeric).sum()),
                }
            }
            Aggregate::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(numeric).collect();
                if numbers.is_empty() {
                    Value::None
                } else {
                    Value::Float64(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
        }
    }

    fn cluster(
        &mut self,
        kind: FetchType,
        ids: &[i64],
        dict: &Dict,
        strict: bool,
    ) -> Result<Value> {
        let by = dict
            .get(KEY_CLUSTER_BY)
            .and_then(Value::as_str)
            .ok_or_else(|| remote("cluster-by must be a string"))?;
        let data = dict
            .get(KEY_DATA)
            .ok_or_else(|| remote("cluster spec without data"))?;

        // cluster key -> member ids, in order of first appearance
        let mut clusters: IndexMap<String, Vec<i64>> = IndexMap::new();
        for (position, id) in ids.iter().enumerate() {
            let key = match by {
                CLUSTER_BY_POSITION => position.to_string(),
                CLUSTER_BY_ID => id.to_string(),
                property => match self.library.property(*id, property) {
                    Some(value) => display_key(&value),
                    None => continue,
                },
            };
            clusters.entry(key).or_default().push(*id);
        }

        if kind == FetchType::ClusterList {
            let mut out = Vec::with_capacity(clusters.len());
            for members in clusters.values() {
                out.push(self.fetch(members, data, strict)?);
            }
            Ok(Value::list(out))
        } else {
            let mut out = Dict::new();
            for (key, members) in &clusters {
                out.insert(key.clone(), self.fetch(members, data, strict)?);
            }
            Ok(Value::from(out))
        }
    }

    /// Rows for `query_infos`: one per match, or one per distinct
    /// combination of `group` values, holding the `fetch` properties
    pub fn infos(
        &mut self,
        ids: &[i64],
        fetch: &[String],
        group: &[String],
        start: u64,
        length: u64,
    ) -> Vec<Value> {
        let mut groups: IndexMap<Vec<String>, Vec<i64>> = IndexMap::new();
        for id in ids {
            let key = if group.is_empty() {
                vec![id.to_string()]
            } else {
                group
                    .iter()
                    .map(|p| {
                        self.library
                            .property(*id, p)
                            .map(|v| display_key(&v))
                            .unwrap_or_default()
                    })
                    .collect()
            };
            groups.entry(key).or_default().push(*id);
        }

        let rows: Vec<Value> = groups
            .values()
            .map(|members| {
                let mut row = Dict::new();
                for property in fetch {
                    let value = self.aggregate(members, property, Aggregate::First);
                    if !value.is_none() {
                        row.insert(property.clone(), value);
                    }
                }
                Value::from(row)
            })
            .collect();
        window(rows, start, length)
    }
}

fn remote(msg: impl Into<String>) -> Error {
    Error::Remote(msg.into())
}

fn validate_shape(kind: FetchType, dict: &Dict, strict: bool) -> Result<()> {
    let has_get = dict
        .get(KEY_GET)
        .and_then(Value::as_list)
        .is_some_and(|items| !items.is_empty());
    let has_cluster_by = dict.contains_key(KEY_CLUSTER_BY);

    if kind == FetchType::Metadata && !has_get {
        return Err(remote("metadata fetch needs a non-empty get list"));
    }
    if kind.is_cluster() && !has_cluster_by {
        return Err(remote(format!("{} fetch needs cluster-by", kind)));
    }
    if strict {
        if kind != FetchType::Metadata && dict.contains_key(KEY_GET) {
            return Err(remote(format!("get is only valid for metadata, not {}", kind)));
        }
        if !kind.is_cluster() && has_cluster_by {
            return Err(remote(format!("cluster-by is not valid for {}", kind)));
        }
    }
    Ok(())
}

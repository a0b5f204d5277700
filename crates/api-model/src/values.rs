/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Helpers for walking and editing generic JSON trees (cloud-config documents,
//! SMBIOS facts).

use serde_json::{Map, Value};

use crate::{ModelError, ModelResult};

/// Follows `path` through nested maps. Returns `None` as soon as a segment is
/// missing or a non-map value is reached before the end of the path.
pub fn get_value<'a, S: AsRef<str>>(data: &'a Map<String, Value>, path: &[S]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut current = data;
    for segment in parents {
        current = current.get(segment.as_ref())?.as_object()?;
    }
    current.get(last.as_ref())
}

/// Sets `value` at `path`, creating intermediate maps as needed.
///
/// An intermediate segment that already holds something other than a map is an
/// error; the existing value is left untouched.
pub fn put_value<S: AsRef<str>>(
    data: &mut Map<String, Value>,
    value: Value,
    path: &[S],
) -> ModelResult<()> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };

    let mut current = data;
    for segment in parents {
        let entry = current
            .entry(segment.as_ref())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(ModelError::NotAMap {
                    path: join(path),
                    segment: segment.as_ref().to_string(),
                });
            }
        };
    }
    current.insert(last.as_ref().to_string(), value);
    Ok(())
}

/// Deep merge of `overlay` on top of `base`. Maps are merged recursively,
/// arrays are concatenated (base first), anything else is replaced by the
/// overlay value.
pub fn merge_maps_concat_slice(
    base: &Map<String, Value>,
    overlay: &Map<String, Value>,
) -> Map<String, Value> {
    let mut result = base.clone();
    for (key, value) in overlay {
        let merged = match (result.get(key), value) {
            (Some(Value::Object(b)), Value::Object(o)) => {
                Value::Object(merge_maps_concat_slice(b, o))
            }
            (Some(Value::Array(b)), Value::Array(o)) => {
                Value::Array(b.iter().chain(o.iter()).cloned().collect())
            }
            _ => value.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

fn join<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_value() {
        let data = map(json!({"System Information": {"Manufacturer": "Acme"}, "flat": 1}));
        assert_eq!(
            get_value(&data, &["System Information", "Manufacturer"]),
            Some(&json!("Acme"))
        );
        assert_eq!(get_value(&data, &["System Information", "Serial"]), None);
        assert_eq!(get_value(&data, &["flat", "deeper"]), None);
        assert_eq!(get_value::<&str>(&data, &[]), None);
    }

    #[test]
    fn test_put_value_creates_parents() {
        let mut data = map(json!({"rancheros": {"install": {"device": "/dev/sda"}}}));
        put_value(&mut data, json!(true), &["rancheros", "install", "automatic"]).unwrap();
        put_value(&mut data, json!("tpm://"), &["rancherd", "token"]).unwrap();
        assert_eq!(
            Value::Object(data),
            json!({
                "rancheros": {"install": {"device": "/dev/sda", "automatic": true}},
                "rancherd": {"token": "tpm://"},
            })
        );
    }

    #[test]
    fn test_put_value_refuses_to_replace_scalar_parent() {
        let mut data = map(json!({"rancherd": "oops"}));
        let err = put_value(&mut data, json!("x"), &["rancherd", "server"]).unwrap_err();
        assert_eq!(
            err,
            ModelError::NotAMap {
                path: "rancherd.server".to_string(),
                segment: "rancherd".to_string()
            }
        );
        assert_eq!(data.get("rancherd"), Some(&json!("oops")));
    }

    #[test]
    fn test_merge_concatenates_slices() {
        let base = map(json!({
            "users": [{"name": "root"}],
            "rancheros": {"install": {"device": "/dev/sda", "automatic": false}},
            "keep": 1,
        }));
        let overlay = map(json!({
            "users": [{"name": "admin"}],
            "rancheros": {"install": {"automatic": true}},
            "keep": "replaced",
        }));
        let merged = merge_maps_concat_slice(&base, &overlay);
        assert_eq!(
            Value::Object(merged),
            json!({
                "users": [{"name": "root"}, {"name": "admin"}],
                "rancheros": {"install": {"device": "/dev/sda", "automatic": true}},
                "keep": "replaced",
            })
        );
    }
}

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

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::values::get_value;

/// Naming template used when a registration does not carry its own.
pub const DEFAULT_NAME_TEMPLATE: &str = "m-${System Information/Manufacturer}-${System Information/Product Name}-${System Information/Serial Number}-";

/// Generated machine names never exceed this many characters.
pub const MAX_NAME_PREFIX_LEN: usize = 58;

lazy_static! {
    static ref INVALID_CHARS: Regex = Regex::new("[^0-9a-zA-Z]").unwrap();
    static ref DOUBLE_DASH: Regex = Regex::new("--+").unwrap();
    static ref STARTS_WITH_LETTER: Regex = Regex::new("^[a-zA-Z]").unwrap();
}

/// Expands every `${Section/Field}` placeholder of `template` against
/// `facts`, then sanitizes the result into a DNS-safe name prefix.
///
/// Placeholders whose path does not resolve, or resolves to anything other than
/// a string, expand to the empty string. A `${` without a closing `}` is kept
/// literally (and then sanitized like any other text).
pub fn build_name(facts: &Map<String, Value>, template: &str) -> String {
    sanitize(&substitute(facts, template))
}

fn substitute(facts: &Map<String, Value>, template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);

        let path: Vec<&str> = rest[start + 2..start + len].split('/').collect();
        if let Some(Value::String(s)) = get_value(facts, &path) {
            result.push_str(s);
        }
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Replaces anything outside `[0-9a-zA-Z]` with `-`, collapses dash runs,
/// forces a leading letter, truncates and lowercases.
pub fn sanitize(name: &str) -> String {
    let replaced = INVALID_CHARS.replace_all(name, "-");
    let collapsed = DOUBLE_DASH.replace_all(&replaced, "-");

    let mut result = if STARTS_WITH_LETTER.is_match(&collapsed) {
        collapsed.into_owned()
    } else {
        format!("m{collapsed}")
    };
    // Only ASCII is left at this point, so byte truncation is safe.
    result.truncate(MAX_NAME_PREFIX_LEN);
    result.to_lowercase()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn facts(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn assert_valid(name: &str) {
        assert!(name.len() <= MAX_NAME_PREFIX_LEN, "{name} is too long");
        assert!(!name.contains("--"), "{name} has consecutive dashes");
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "{name} has invalid characters"
        );
        assert!(
            name.chars().next().is_some_and(|c| c.is_ascii_lowercase()),
            "{name} does not start with a letter"
        );
    }

    #[test]
    fn test_special_characters_stripped() {
        let data = facts(json!({"Sys": {"Vendor": "Acme!!", "Serial": "007"}}));
        let name = build_name(&data, "m-${Sys/Vendor}-${Sys/Serial}");
        assert_eq!(name, "m-acme-007");
        assert_valid(&name);
    }

    #[test]
    fn test_default_template() {
        let data = facts(json!({
            "System Information": {
                "Manufacturer": "Dell Inc.",
                "Product Name": "PowerEdge R640",
                "Serial Number": "ABC1234",
            }
        }));
        let name = build_name(&data, DEFAULT_NAME_TEMPLATE);
        assert_eq!(name, "m-dell-inc-poweredge-r640-abc1234-");
        assert_valid(&name);
    }

    #[test]
    fn test_missing_placeholders_become_empty() {
        let name = build_name(&Map::new(), DEFAULT_NAME_TEMPLATE);
        assert_eq!(name, "m-");

        let data = facts(json!({"Sys": {"Count": 4}}));
        assert_eq!(build_name(&data, "node-${Sys/Count}-x"), "node-x");
    }

    #[test]
    fn test_leading_digit_gets_prefix() {
        let data = facts(json!({"Sys": {"Serial": "42abc"}}));
        let name = build_name(&data, "${Sys/Serial}");
        assert_eq!(name, "m42abc");
        assert_valid(&name);
    }

    #[test]
    fn test_truncated_and_lowercased() {
        let data = facts(json!({"Sys": {"Serial": "X".repeat(100)}}));
        let name = build_name(&data, "Machine-${Sys/Serial}");
        assert_eq!(name.len(), MAX_NAME_PREFIX_LEN);
        assert!(name.starts_with("machine-xxxx"));
        assert_valid(&name);
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        let name = build_name(&Map::new(), "abc-${Sys/Serial");
        assert_eq!(name, "abc-sys-serial");
    }
}

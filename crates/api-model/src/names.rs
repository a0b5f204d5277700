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

use rand::Rng;
use sha2::{Digest, Sha256};

/// Alphabet for registration tokens and generated name suffixes. No vowels, so
/// the output never spells words, and no look-alike characters.
pub const TOKEN_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

pub const REGISTRATION_TOKEN_LEN: usize = 54;

const GENERATED_SUFFIX_LEN: usize = 5;

const MAX_CONCAT_NAME_LEN: usize = 63;

/// Draws `len` characters from [`TOKEN_ALPHABET`] using the thread-local CSPRNG.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// A fresh registration token.
pub fn random_token() -> String {
    random_string(REGISTRATION_TOKEN_LEN)
}

/// Appends a random suffix to a `generate_name` prefix.
pub fn generated_name(prefix: &str) -> String {
    format!("{prefix}{}", random_string(GENERATED_SUFFIX_LEN))
}

/// Joins `parts` with `-`. Results that would not fit in a 63 character
/// resource name are cut and suffixed with a short digest of the full joined
/// string, so distinct inputs keep distinct names.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let full = parts.join("-");
    if full.len() <= MAX_CONCAT_NAME_LEN {
        return full;
    }

    let digest = hex::encode(Sha256::digest(full.as_bytes()));
    // The cut must not leave a trailing character that is invalid at the end of a name.
    let c = full.as_bytes()[56];
    if c.is_ascii_lowercase() || c.is_ascii_digit() {
        format!("{}-{}", &full[..57], &digest[..5])
    } else {
        format!("{}-{}", &full[..floor_char_boundary(&full, 56)], &digest[..6])
    }
}

/// The largest index `<= index` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    (0..=index.min(s.len()))
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token() {
        let token = random_token();
        assert_eq!(token.len(), REGISTRATION_TOKEN_LEN);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        assert_ne!(token, random_token());
    }

    #[test]
    fn test_generated_name() {
        let name = generated_name("m-acme-007-");
        assert_eq!(name.len(), "m-acme-007-".len() + 5);
        assert!(name.starts_with("m-acme-007-"));
    }

    #[test]
    fn test_safe_concat_name_short() {
        assert_eq!(
            safe_concat_name(&["c-abc12", "m-acme-007-x7k2p", "token"]),
            "c-abc12-m-acme-007-x7k2p-token"
        );
    }

    #[test]
    fn test_safe_concat_name_long() {
        let machine = "m-".to_string() + &"a".repeat(70);
        let name = safe_concat_name(&["c-abc12", &machine, "token"]);
        assert_eq!(name.len(), 63);
        assert!(name.starts_with("c-abc12-m-aaaa"));
        assert_eq!(name, safe_concat_name(&["c-abc12", &machine, "token"]));
        assert_ne!(name, safe_concat_name(&["c-abc13", &machine, "token"]));
    }

    #[test]
    fn test_safe_concat_name_cut_on_dash() {
        // 56 characters, then a dash at index 56.
        let first = "a".repeat(56);
        let name = safe_concat_name(&[&first, "bbbbbbbbbbbbbbbbbbbb"]);
        assert_eq!(&name[..56], first.as_str());
        assert_eq!(name.as_bytes()[56], b'-');
        assert_eq!(name.len(), 63);
    }

    #[test]
    fn test_safe_concat_name_multibyte_at_cut() {
        // 'é' occupies bytes 55..57, across the cut.
        let cluster = "c".repeat(55) + "é";
        let name = safe_concat_name(&[&cluster, "m-acme-007-x7k2p", "token"]);
        assert!(name.starts_with(&format!("{}-", "c".repeat(55))));
        assert_eq!(name.len(), 62);
        assert_eq!(
            name,
            safe_concat_name(&[&cluster, "m-acme-007-x7k2p", "token"])
        );
    }

    #[test]
    fn test_safe_concat_name_multibyte_starts_at_cut() {
        // The fourth 'é' starts at byte 56 and is cut off whole.
        let cluster = "c".repeat(50) + "éééé";
        let name = safe_concat_name(&[&cluster, "m-acme-007-x7k2p", "token"]);
        assert!(name.starts_with(&format!("{}ééé-", "c".repeat(50))));
        assert_eq!(name.len(), 63);
    }
}

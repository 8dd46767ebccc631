// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for client path normalization

#![no_main]

use libfuzzer_sys::fuzz_target;
use rfm_core::{normalize_name, VirtualPath};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let vpath = VirtualPath::new(input);

        // never climbs above the root
        assert!(vpath.segments.iter().all(|s| s != ".." && s != "." && !s.is_empty()));
        assert!(vpath.to_path_string().starts_with('/'));

        // normalization is idempotent
        let again = VirtualPath::new(vpath.to_path_string());
        assert_eq!(again, vpath);

        let _ = vpath.name();
        let _ = vpath.extension();
        let _ = vpath.to_key_suffix();
        if let Some(parent) = vpath.parent() {
            assert!(vpath.starts_with(&parent));
        }

        let name = normalize_name(input);
        assert!(!name.contains('/') && !name.contains('\\'));
        if !name.is_empty() {
            let _ = vpath.child_file(&name);
        }
    }
});

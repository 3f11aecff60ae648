// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use sonomkr_storage::record::parse_record;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = parse_record(data) {
        let _ = record.epoch_millis();
        let reparsed = parse_record(record.to_payload().as_bytes());
        assert_eq!(reparsed.as_ref(), Ok(&record));
    }
});

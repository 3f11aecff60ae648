// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use sonomkr_storage::{ChannelSession, SinkFormat, WindowPolicy};

fuzz_target!(|data: &[u8]| {
    let dir = std::env::temp_dir().join(format!("sonomkr-fuzz-{}", std::process::id()));
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }

    // One payload per line
    let mut session = ChannelSession::new(
        "fuzz",
        &dir,
        "",
        WindowPolicy::new(1),
        SinkFormat::Csv.create_sink(),
    );
    for line in data.split(|b| *b == b'\n') {
        let _ = session.submit(line);
    }
    session.shutdown();

    let _ = std::fs::remove_dir_all(&dir);
});

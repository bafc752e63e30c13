// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::env;

fn main() -> anyhow::Result<()> {
    // Skip installing dependencies when generating documents.
    if env::var("CARGO_DOC").is_ok() {
        return Ok(());
    }

    if env::var("CARGO_FEATURE_HYBRIS").is_ok() {
        pkg_config::Config::new().probe("egl")?;
        pkg_config::Config::new().probe("glesv2")?;
    }

    Ok(())
}

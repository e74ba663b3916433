use anyhow::Result;
use chrono::TimeZone;
use std::env;
use std::fs;

fn main() -> Result<()> {
    // Add build timestamp, honouring reproducible-build environments
    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => chrono::Utc
            .timestamp_opt(val.parse::<i64>().unwrap(), 0)
            .unwrap(),
        Err(_) => chrono::Utc::now(),
    };

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    // Embed the spdif library version
    let spdif_version = read_spdif_version().unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=SPDIF_VERSION={spdif_version}");

    println!("cargo:rerun-if-changed=spdif/Cargo.toml");

    Ok(())
}

/// Parse the version out of spdif/Cargo.toml
fn read_spdif_version() -> Result<String> {
    let toml_content = fs::read_to_string("spdif/Cargo.toml")?;

    for line in toml_content.lines() {
        let line = line.trim();
        if line.starts_with("version") && line.contains("=") {
            if let Some(equals_pos) = line.find('=') {
                let version_part = line[equals_pos + 1..].trim();
                let version = version_part.trim_matches('"').trim_matches('\'');
                return Ok(version.to_string());
            }
        }
    }

    anyhow::bail!("Could not find version in spdif/Cargo.toml");
}

//! Prints the JSON schema of the diagram-live configuration file.
//!
//! Usage: `cargo run -p diagram-config --bin schemagen > config.schema.json`

use diagram_config::Config;

fn main() -> Result<(), serde_json::Error> {
    let schema = schemars::schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

use anyhow::Result;
use std::env;

use country_pipelines::{init_logging, run_family, Family, PipelineConfig, CONFIG_FILE, VERSION};

fn main() -> Result<()> {
    init_logging();

    let config = PipelineConfig::load_or_default(CONFIG_FILE)?;

    // No argument: every family. One argument: just that family.
    let families: Vec<Family> = match env::args().nth(1) {
        Some(name) => vec![Family::from_name(&name)?],
        None => Family::all().to_vec(),
    };

    println!("🌍 country-pipelines {}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for family in families {
        let output = run_family(family, &config)?;
        println!("✓ {}", output.summary());
    }

    Ok(())
}

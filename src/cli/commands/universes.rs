//! List universes command.

use anyhow::Result;
use trading_config::AppConfig;

pub async fn run(config: &AppConfig) -> Result<()> {
    let catalog = config.catalog();

    println!("Available universes:");
    println!();
    for (name, count) in catalog.list() {
        let marker = if name.eq_ignore_ascii_case(&config.session.universe) {
            " (configured)"
        } else {
            ""
        };
        println!("  {:<20} {:>3} symbols{}", name, count, marker);
    }

    Ok(())
}

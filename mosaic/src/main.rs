mod options;
mod progress;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use options::Cli;
use valleys::Mosaic;

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init();

    let ledger_path = cli.ledger_path();
    let mosaic = Mosaic::new(cli.config())?;

    #[allow(clippy::cast_possible_truncation)]
    let pb = progress::bar(
        format!("Mosaicking {}", cli.input_dir.display()),
        mosaic.groups().len() as u64,
    );
    let ledger = mosaic.run(|_group| pb.inc(1));
    pb.finish();

    let groups = mosaic.groups().len();
    if ledger.is_empty() {
        info!("{groups} groups mosaicked into {:?}", cli.output_dir);
    } else {
        warn!(
            "{} of {groups} groups failed:\n{}",
            ledger.len(),
            ledger.summary()
        );
        ledger.write_csv(&ledger_path)?;
        info!("failures written to {ledger_path:?}");
    }
    Ok(())
}

use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, ServiceOptions};
use crate::pipeline;

#[derive(Parser, Debug, Clone)]
pub struct StatsCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
}

impl SubCommandExtend for StatsCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let ctx = self.service.open(&opts.conf_dir).await?;
        let stats = pipeline::stats(&ctx).await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::{Opts, SearchOptions, ServiceOptions};
use crate::model::SearchResponse;
use crate::pipeline;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 检索文本
    pub text: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let ctx = self.service.open(&opts.conf_dir).await?.with_limits((&self.search).into());
        let result = pipeline::search(&ctx, &self.text).await?;
        ctx.flush().await?;
        print_result(&result, self)
    }
}

fn print_result(result: &SearchResponse, opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for (i, hit) in result.results.iter().enumerate() {
                println!("{}\t{}\t{}", i + 1, hit.id, hit.path);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

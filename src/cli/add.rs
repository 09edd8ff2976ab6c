use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;
use futures::StreamExt;
use image::ImageFormat;
use indicatif::ProgressBar;
use log::info;
use regex::Regex;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, ServiceOptions};
use crate::pipeline;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp")]
    pub suffix: String,
    /// 同时处理的图片数量，默认为 CPU 核数
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = format!("(?i)^({})$", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf)?;

        let ctx = self.service.open(&opts.conf_dir).await?;

        info!("开始扫描目录: {}", self.path.display());
        let entries = scan_directory(&self.path, &re_suf);
        info!("扫描完成，共 {} 张图片", entries.len());

        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());
        let failed = AtomicUsize::new(0);
        let concurrency = self.concurrency.unwrap_or_else(num_cpus::get).max(1);

        futures::stream::iter(entries)
            .for_each_concurrent(concurrency, |entry| {
                let (ctx, pb, failed) = (&ctx, &pb, &failed);
                async move {
                    let name = entry.to_string_lossy().to_string();
                    let result = match tokio::fs::read(&entry).await {
                        Ok(data) => {
                            let content_type = guess_content_type(&entry);
                            pipeline::ingest(ctx, &data, content_type, &name)
                                .await
                                .map_err(anyhow::Error::from)
                        }
                        Err(e) => Err(e.into()),
                    };
                    match result {
                        Ok(resp) if resp.inserted => pb.set_message(resp.id),
                        Ok(resp) => pb.set_message(format!("跳过已添加图片: {}", resp.id)),
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            pb.println(format!("添加失败 {name}: {e}"));
                        }
                    }
                    pb.inc(1);
                }
            })
            .await;

        pb.finish_with_message("图片添加完成");
        ctx.flush().await?;
        let failed = failed.load(Ordering::Relaxed);
        if failed > 0 {
            anyhow::bail!("{failed} 张图片添加失败");
        }
        Ok(())
    }
}

fn scan_directory(path: &Path, re_suf: &Regex) -> Vec<PathBuf> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
        })
        .collect()
}

/// 根据扩展名推断内容类型，无法识别时交给后续解码步骤判断
fn guess_content_type(path: &Path) -> &'static str {
    ImageFormat::from_path(path).map(|f| f.to_mime_type()).unwrap_or("image/unknown")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn scan_filters_by_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["a.jpg", "b.PNG", "sub/c.webp", "d.txt", "e"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let re = Regex::new("(?i)^(jpg|png|webp)$").unwrap();
        let mut found = scan_directory(dir.path(), &re)
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        found.sort();
        assert_eq!(found, ["a.jpg", "b.PNG", "c.webp"]);
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(guess_content_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("a.png")), "image/png");
        assert_eq!(guess_content_type(Path::new("a.xyz")), "image/unknown");
    }
}

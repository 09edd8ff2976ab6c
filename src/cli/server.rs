use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::SubCommandExtend;
use crate::config::{SearchOptions, ServiceOptions};
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 监听地址
    #[arg(long, env = "IMVEC_ADDR", default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH", value_parser = parse_auth)]
    pub prometheus_auth: Option<(String, String)>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let ctx = self.service.open(&opts.conf_dir).await?.with_limits((&self.search).into());

        // 创建应用状态
        let state = server::AppState::new(ctx);

        // 创建应用
        let app = server::create_app(state.clone());

        // 定期保存近似索引，没有新数据时不写文件
        tokio::spawn({
            let state = state.clone();
            async move {
                loop {
                    sleep(Duration::from_secs(300)).await;
                    if let Err(e) = state.ctx.flush().await {
                        error!("保存近似索引失败: {e}");
                    }
                }
            }
        });

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = self.prometheus_auth.clone();
            tokio::spawn(async move {
                loop {
                    let metric_families = prometheus::gather();
                    let url = url.clone();
                    let instance = instance.clone();
                    let auth = auth.clone();
                    let r = spawn_blocking(move || {
                        prometheus::push_metrics(
                            "imvec",
                            labels! {
                                "instance".to_string() => instance.clone(),
                            },
                            &url,
                            metric_families,
                            auth.map(|(username, password)| BasicAuthentication {
                                username,
                                password,
                            }),
                        )
                    })
                    .await;
                    match r {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!("推送指标失败: {e}"),
                        Err(e) => error!("推送指标任务异常: {e}"),
                    }
                    sleep(Duration::from_secs(30)).await;
                }
            });
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        info!("服务器已停止，保存近似索引");
        state.ctx.flush().await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听退出信号: {e}");
        std::future::pending::<()>().await;
    }
}

fn parse_auth(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(username, password)| (username.to_string(), password.to_string()))
        .ok_or_else(|| "认证信息格式应为 username:password".to_string())
}

use app_socket::socket::socket_server::start_server;
use app_socket::socket::socket_sink::SocketSink;
use biz_service::biz_service::chat_service::ChatService;
use biz_service::manager::job_manager::JobManager;
use common::config::AppConfig;
use common::util::log_util::init_log;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    AppConfig::init("socket-config.toml")?;
    let config = AppConfig::get();
    init_log(&config)?;

    //初始化业务
    let sink = Arc::new(SocketSink::new());
    let service = ChatService::new(config.clone(), sink.clone());
    let jobs = JobManager::start(service.clone());

    //socket-server
    let server = config.get_server();
    let listener = TcpListener::bind(format!("{}:{}", server.host, server.port)).await?;
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(start_server(listener, service, sink, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("🛑 收到退出信号，开始关闭");
    shutdown.cancel();
    server_task.await??;
    jobs.shutdown().await;
    Ok(())
}
